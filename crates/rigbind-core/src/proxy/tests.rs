//! Tests for proxy parsing.

use std::io::Write;
use std::path::Path;

use glam::DVec3;
use pretty_assertions::assert_eq;

use super::*;
use crate::error::WarningCode;
use crate::mesh::VertexBuffer;

fn grid_mesh(n: usize) -> VertexBuffer {
    VertexBuffer::new((0..n).map(|i| DVec3::new(i as f64, 0.0, 0.0)).collect())
}

fn parse(mesh: &VertexBuffer, text: &str) -> ProxyLoad {
    ProxyParser::new(mesh)
        .parse_str(text, Path::new("/data/clothes/tshirt.mhclo"))
        .unwrap()
}

// ============================================================================
// Metadata Tests
// ============================================================================

#[test]
fn test_defaults_from_file_name() {
    let mesh = grid_mesh(4);
    let load = ProxyParser::new(&mesh)
        .parse_str("", Path::new("/data/clothes/short skirt.mhclo"))
        .unwrap();
    let proxy = load.proxy;

    assert_eq!(proxy.name, "Short_skirt");
    assert_eq!(proxy.uuid(), "Short_skirt");
    assert_eq!(proxy.proxy_type, ProxyType::Clothes);
    assert_eq!(proxy.layer, DEFAULT_LAYER);
    assert_eq!(proxy.z_depth, 50);
    assert_eq!(proxy.basemesh, "alpha_7");
    assert_eq!(proxy.mask_layer, -1);
    assert_eq!(proxy.delete_verts, vec![false; 4]);
    assert_eq!(proxy.scale, DVec3::ONE);
    assert!(proxy.weights.is_none());
}

#[test]
fn test_directives() {
    let mesh = grid_mesh(4);
    let text = "\
# a comment
// another comment
name  Fancy   Shirt
uuid 1234-abcd
tag shirt
tag Casual Wear
z_depth 31
obj_file tshirt
material tshirt.mhmat
mhx_material blender
useBaseMaterials
backface_culling ENABLED
transparent no
uvLayer 1 tshirt_alt
uvLayer tshirt_main.mhuv
use_projection 0
ignoreOffset 1
delete torso
delete_connected 2
mask_uv_layer 1
texture_uv_layer 2
clothing tshirt-a 77
transparencies 1234 yes
textures diffuse.png normal.png
wire
cage
subsurf 1
subsurf 2 4
shrinkwrap 0.25
solidify 0.01 -1
shapekey smile
shapekey frown
basemesh hm08
";
    let load = parse(&mesh, text);
    assert!(load.warnings.is_empty(), "{:?}", load.warnings);
    let proxy = load.proxy;

    assert_eq!(proxy.name, "Fancy Shirt");
    assert_eq!(proxy.uuid(), "1234-abcd");
    assert_eq!(proxy.tags, vec!["shirt", "Casual Wear"]);
    assert_eq!(proxy.z_depth, 31);
    assert_eq!(proxy.obj_file.as_deref(), Some(Path::new("/data/clothes/tshirt.obj")));
    assert_eq!(
        proxy.material_file.as_deref(),
        Some(Path::new("/data/clothes/tshirt.mhmat"))
    );
    assert_eq!(
        proxy.mhx_material_file.as_deref(),
        Some(Path::new("/data/clothes/blender.mhx"))
    );
    assert!(proxy.use_base_materials);
    assert!(proxy.cull);
    assert!(!proxy.transparent);
    assert_eq!(
        proxy.uv_layers.get(&1).map(|p| p.as_path()),
        Some(Path::new("/data/clothes/tshirt_alt.mhuv"))
    );
    assert_eq!(
        proxy.uv_layers.get(&0).map(|p| p.as_path()),
        Some(Path::new("/data/clothes/tshirt_main.mhuv"))
    );
    assert!(!proxy.use_projection);
    assert!(proxy.ignore_offset);
    assert_eq!(proxy.delete_groups, vec!["torso"]);
    assert_eq!(proxy.delete_connected, vec![2]);
    assert_eq!(proxy.mask_layer, 1);
    assert_eq!(proxy.texture_layer, 2);
    assert_eq!(
        proxy.clothings,
        vec![ClothingPiece {
            name: "tshirt-a".to_string(),
            uuid: Some("77".to_string())
        }]
    );
    assert_eq!(proxy.transparencies.get("1234"), Some(&true));
    assert_eq!(
        proxy.textures,
        vec![("diffuse.png".to_string(), "normal.png".to_string())]
    );
    assert!(proxy.wire);
    assert!(proxy.cage);
    assert_eq!(
        proxy.modifiers,
        vec![
            ProxyModifier::Subsurf { levels: 1, render: 2 },
            ProxyModifier::Subsurf { levels: 2, render: 4 },
            ProxyModifier::Shrinkwrap { offset: 0.25 },
            ProxyModifier::Solidify {
                thickness: 0.01,
                offset: -1.0
            },
        ]
    );
    assert_eq!(proxy.shapekeys, vec!["smile", "frown"]);
    assert_eq!(proxy.basemesh_kind().unwrap(), BaseMeshKind::Hm08);
}

#[test]
fn test_unknown_keyword_warns_and_continues() {
    let mesh = grid_mesh(4);
    let load = parse(&mesh, "basemesh hm08\nsparkles 3\nname Vest\nverts\n1\n");

    assert_eq!(load.warnings.len(), 1);
    assert_eq!(load.warnings[0].code, WarningCode::UnknownKeyword);
    assert_eq!(load.warnings[0].line, Some(2));
    assert_eq!(load.proxy.name, "Vest");
    assert_eq!(load.proxy.vertex_count(), 1);
}

#[test]
fn test_missing_optional_value_warns() {
    let mesh = grid_mesh(4);
    let load = parse(&mesh, "mask_uv_layer\nuuid\n");
    let codes: Vec<_> = load.warnings.iter().map(|w| w.code).collect();
    assert_eq!(
        codes,
        vec![WarningCode::MissingDirectiveValue, WarningCode::MissingDirectiveValue]
    );
    assert_eq!(load.proxy.mask_layer, -1);
    assert!(load.proxy.uuid.is_none());
}

#[test]
fn test_unknown_basemesh_is_fatal() {
    let mesh = grid_mesh(4);
    let err = ProxyParser::new(&mesh)
        .parse_str("basemesh hm09\n", Path::new("x.mhclo"))
        .unwrap_err();
    assert_eq!(err.code(), "RIG_005");
}

#[test]
fn test_blank_line_does_not_reset_section() {
    let mesh = grid_mesh(4);
    let load = parse(&mesh, "basemesh hm08\nverts\n0\n\n1\n\n2\n");
    assert_eq!(load.proxy.vertex_count(), 3);
    assert!(load.warnings.is_empty());
}

// ============================================================================
// Reference Vertex and Scale Tests
// ============================================================================

#[test]
fn test_scale_calibration() {
    let mesh = VertexBuffer::from_arrays(&[[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 3.0, 0.0]]);
    let text = "basemesh hm08\nx_scale 1 0 4.0\ny_scale 2 0 1.5\nverts\n0 1 2 1 0 0 1 1 1\n";
    let load = parse(&mesh, text);
    let proxy = &load.proxy;

    assert_eq!(
        proxy.x_scale,
        Some(ScaleCalibration {
            v1: 1,
            v2: 0,
            denominator: 4.0
        })
    );
    assert_eq!(proxy.scale, DVec3::new(0.5, 2.0, 1.0));
    assert_eq!(proxy.calibrated_scale(&mesh, None).unwrap(), proxy.scale);

    let coords = proxy.coords(&mesh, None).unwrap();
    assert_eq!(coords, vec![DVec3::new(0.5, 2.0, 1.0)]);
}

#[test]
fn test_scale_calibration_bad_vertex() {
    let mesh = grid_mesh(2);
    let err = ProxyParser::new(&mesh)
        .parse_str("basemesh hm08\nz_scale 0 7 1.0\n", Path::new("x.mhclo"))
        .unwrap_err();
    assert_eq!(err.code(), "RIG_001");
    assert!(err.to_string().starts_with("x.mhclo:2:"));
}

#[test]
fn test_reverse_mapping_recorded() {
    let mesh = grid_mesh(4);
    let load = parse(&mesh, "basemesh hm08\nverts\n3\n0 1 3 0.5 0.25 0.25\n");
    let reverse = &load.proxy.vertex_weights;
    assert_eq!(reverse.get(3), &[(0, 1.0), (1, 0.25)]);
    assert_eq!(reverse.get(0), &[(1, 0.5)]);
    assert!(reverse.get(2).is_empty());
}

#[test]
fn test_extra_reference_tokens_warn() {
    let mesh = grid_mesh(4);
    let load = parse(&mesh, "basemesh hm08\nverts\n0 1 2 1 0 0 0 0 1\n0 1 2 1 0 0 0 0 1 7 7\n");
    assert_eq!(load.proxy.ref_verts.len(), 2);
    assert_eq!(load.proxy.ref_verts[0], load.proxy.ref_verts[1]);
    assert_eq!(load.warnings.len(), 1);
    assert_eq!(load.warnings[0].code, WarningCode::ExtraReferenceTokens);
    assert_eq!(load.warnings[0].line, Some(4));
}

#[test]
fn test_malformed_reference_aborts_load() {
    let mesh = grid_mesh(4);
    let err = ProxyParser::new(&mesh)
        .parse_str("basemesh hm08\nverts\n0\n1 2\n", Path::new("bad.mhclo"))
        .unwrap_err();
    assert_eq!(err.code(), "RIG_001");
    assert!(err.to_string().starts_with("bad.mhclo:4:"));
}

#[test]
fn test_converter_coords() {
    // Base mesh with 3 vertices; the converter exposes 2 legacy vertices.
    let mesh = VertexBuffer::from_arrays(&[[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0]]);
    let converter = ProxyParser::new(&mesh)
        .proxy_type(ProxyType::Converter)
        .parse_str("basemesh hm08\nverts\n0 1 2 0.5 0.5 0\n2\n", Path::new("a7.proxy"))
        .unwrap()
        .proxy;
    assert_eq!(converter.vertex_count(), 2);

    let text = "basemesh alpha7\ny_scale 0 1 1.0\nverts\n1\n0 1 1 0.5 0.5 0\n";
    let load = ProxyParser::new(&mesh)
        .converter(Some(&converter))
        .parse_str(text, Path::new("legacy.mhclo"))
        .unwrap();

    // Legacy vertex 0 is (1, 0, 0) and 1 is (0, 2, 0).
    assert_eq!(load.proxy.scale, DVec3::new(1.0, 2.0, 1.0));
    let coords = load.proxy.coords(&mesh, Some(&converter)).unwrap();
    assert_eq!(coords[0], DVec3::new(0.0, 2.0, 0.0));
    assert_eq!(coords[1], DVec3::new(0.5, 1.0, 0.0));
}

#[test]
fn test_legacy_reference_out_of_converter_range() {
    let mesh = grid_mesh(5);
    let converter = ProxyParser::new(&mesh)
        .parse_str("basemesh hm08\nverts\n0\n1\n", Path::new("a7.proxy"))
        .unwrap()
        .proxy;
    let err = ProxyParser::new(&mesh)
        .converter(Some(&converter))
        .parse_str("verts\n4\n", Path::new("legacy.mhclo"))
        .unwrap_err();
    assert!(err.to_string().contains("2 vertices"));
}

// ============================================================================
// Weights and Deletion Tests
// ============================================================================

#[test]
fn test_weight_blocks() {
    let mesh = grid_mesh(4);
    let text = "weights spine\n0 0.5\n1 0.25\nweights neck\n2 1.0\nweights spine\n3 0.1\n";
    let load = parse(&mesh, text);

    assert_eq!(load.warnings.len(), 1);
    assert_eq!(load.warnings[0].code, WarningCode::DuplicateWeightBlock);
    let weights = load.proxy.weights.unwrap();
    assert_eq!(weights.keys().collect::<Vec<_>>(), vec!["spine", "neck"]);
    assert_eq!(weights.get("spine").unwrap().entries(), &[(3, 0.1)]);
    assert_eq!(weights.get("neck").unwrap().entries(), &[(2, 1.0)]);
}

#[test]
fn test_weight_line_must_have_two_tokens() {
    let mesh = grid_mesh(4);
    let err = ProxyParser::new(&mesh)
        .parse_str("weights spine\n0 0.5 1\n", Path::new("w.mhclo"))
        .unwrap_err();
    assert_eq!(err.code(), "RIG_001");
}

#[test]
fn test_delete_range() {
    let mesh = grid_mesh(12);
    let load = parse(&mesh, "delete_verts\n3 - 6 9\n");
    assert_eq!(load.proxy.deleted_vertices(), vec![3, 4, 5, 6, 9]);
}

#[test]
fn test_delete_range_across_lines() {
    let mesh = grid_mesh(12);
    let load = parse(&mesh, "delete_verts\n1\n- 3\n10 - 11\n");
    assert_eq!(load.proxy.deleted_vertices(), vec![1, 2, 3, 10, 11]);
}

#[test]
fn test_delete_out_of_range_warns() {
    let mesh = grid_mesh(5);
    let load = parse(&mesh, "delete_verts\n3 - 8\n20\n");
    assert_eq!(load.proxy.deleted_vertices(), vec![3, 4]);
    assert_eq!(load.warnings.len(), 2);
    assert!(load
        .warnings
        .iter()
        .all(|w| w.code == WarningCode::DeleteIndexOutOfRange));
}

#[test]
fn test_delete_index_at_usize_max() {
    let mesh = grid_mesh(5);
    let load = parse(&mesh, "basemesh hm08\ndelete_verts\n18446744073709551615\n");
    assert!(load.proxy.deleted_vertices().is_empty());
    assert_eq!(load.warnings.len(), 1);
    assert_eq!(load.warnings[0].code, WarningCode::DeleteIndexOutOfRange);

    let load = parse(&mesh, "basemesh hm08\ndelete_verts\n3 - 18446744073709551615\n");
    assert_eq!(load.proxy.deleted_vertices(), vec![3, 4]);
    assert_eq!(load.warnings.len(), 1);
}

#[test]
fn test_delete_dash_without_start() {
    let mesh = grid_mesh(5);
    let err = ProxyParser::new(&mesh)
        .parse_str("delete_verts\n- 3\n", Path::new("d.mhclo"))
        .unwrap_err();
    assert!(err.to_string().contains("preceding"));
}

// ============================================================================
// File Tests
// ============================================================================

#[test]
fn test_read_file_and_hash() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hat.mhclo");
    let text = "uuid hat-1\ntag headwear\nbasemesh hm08\nverts\n0\n";
    std::fs::File::create(&path)
        .unwrap()
        .write_all(text.as_bytes())
        .unwrap();

    let mesh = grid_mesh(2);
    let load = ProxyParser::new(&mesh)
        .proxy_type(ProxyType::Hair)
        .layer(2)
        .read_file(&path)
        .unwrap()
        .unwrap();
    assert_eq!(load.proxy.proxy_type, ProxyType::Hair);
    assert_eq!(load.proxy.layer, 2);
    assert_eq!(load.source_hash, blake3::hash(text.as_bytes()).to_hex().to_string());

    assert_eq!(scan_uuid(&path).unwrap().as_deref(), Some("hat-1"));
    // scan stops at the first non-tag line
    let tags = scan_tags(&path).unwrap();
    assert!(tags.is_empty());
}

#[test]
fn test_scan_helpers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("boots.mhclo");
    std::fs::write(
        &path,
        "# boots\ntag shoes\ntag leather\nname Boots\ntag ignored\nverts\nuuid late\n",
    )
    .unwrap();

    let tags: Vec<_> = scan_tags(&path).unwrap().into_iter().collect();
    assert_eq!(tags, vec!["leather", "shoes"]);
    assert_eq!(scan_uuid(&path).unwrap(), None);
}

#[test]
fn test_unopenable_file_is_none() {
    let mesh = grid_mesh(2);
    let result = ProxyParser::new(&mesh)
        .read_file(Path::new("/nonexistent/dir/missing.mhclo"))
        .unwrap();
    assert!(result.is_none());
}
