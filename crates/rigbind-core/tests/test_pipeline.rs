//! End-to-end tests for the bind pipeline with file-backed inputs.
//!
//! Rig tables, presets, poses and proxy files are written to a temporary
//! directory and loaded the way a caller would load them.

use std::fs;
use std::path::{Path, PathBuf};

use glam::{DMat4, DVec3};
use rigbind_core::proxy::scan_uuid;
use rigbind_core::{
    collect_objects, BindConfig, ConverterCache, ProxyParser, ProxyType, ReferencePose,
    RigDefinition, RigOptions, VertexBuffer,
};

// =============================================================================
// Helper Functions
// =============================================================================

const RIG_JSON: &str = r#"{
    "name": "mini",
    "joints": [
        {"name": "hips", "vertex": 0},
        {"name": "neck", "vertex": 1},
        {"name": "top", "vertex": 2}
    ],
    "groups": [{
        "name": "body",
        "bones": [
            {"name": "spine", "head": "hips", "tail": "neck", "flags": "DEF"},
            {"name": "head", "head": "neck", "tail": "top", "parent": "spine", "flags": "DEF | CON"}
        ]
    }],
    "vertex_weights": {
        "spine": [[0, 1.0], [1, 0.5]],
        "head": [[1, 0.5], [2, 1.0], [3, 1.0]]
    }
}"#;

const PRESET_JSON: &str = r#"{
    "name": "Engine",
    "settings": {"useTPose": true},
    "bones": {"spine": "Hips", "head": "Head"}
}"#;

const POSE_JSON: &str = r#"[["head", [0.7071067811865476, 0.0, 0.0, 0.7071067811865476]]]"#;

fn mesh() -> VertexBuffer {
    VertexBuffer::from_arrays(&[
        [0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 2.0, 0.0],
        [0.5, 2.0, 0.0],
    ])
}

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

fn assert_identity(mat: DMat4) {
    assert!(
        mat.abs_diff_eq(DMat4::IDENTITY, 1e-9),
        "expected identity, got {:?}",
        mat
    );
}

// =============================================================================
// Pipeline Tests
// =============================================================================

#[test]
fn test_pipeline_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let rig_path = write(dir.path(), "rig.json", RIG_JSON);
    let preset_path = write(dir.path(), "engine.json", PRESET_JSON);
    let pose_path = write(dir.path(), "tpose.json", POSE_JSON);
    let shirt_path = write(
        dir.path(),
        "shirt.mhclo",
        "name Shirt\nuuid shirt-001\nbasemesh hm08\ndelete_verts\n0\nverts\n0\n1\n",
    );

    let mesh = mesh();
    let rig = RigDefinition::from_file(&rig_path).unwrap();
    let options = RigOptions::from_preset_file(&preset_path).unwrap();
    assert!(options.use_t_pose);
    let pose = ReferencePose::from_file(&pose_path).unwrap();

    let shirt = ProxyParser::new(&mesh)
        .read_file(&shirt_path)
        .unwrap()
        .unwrap()
        .proxy;
    let config = BindConfig {
        scale: 2.0,
        reference_pose: Some(pose),
        ..Default::default()
    };
    let collected = collect_objects(
        "human",
        &mesh,
        &rig,
        options,
        &[shirt],
        &config,
        &ConverterCache::empty(),
    )
    .unwrap();

    let amt = &collected.armature;
    let names: Vec<&str> = amt.bones().keys().collect();
    assert_eq!(names, vec!["Hips", "Head"]);
    assert_eq!(amt.bone("Head").unwrap().parent.as_deref(), Some("Hips"));
    assert!(amt.vertex_weights().contains("Head"));

    let head = amt.bone("Head").unwrap();
    assert!(head.tail.abs_diff_eq(DVec3::new(0.0, 4.0, 0.0), 1e-12));
    for bone in amt.bones().values() {
        let bind = *bone.bind_matrix().unwrap();
        let inverse = *bone.bind_inverse().unwrap();
        assert_identity(bind * inverse);
    }
    // the posed bone differs from its rest matrix
    assert!(!head
        .posed_rest_matrix()
        .unwrap()
        .abs_diff_eq(*head.rest_matrix().unwrap(), 1e-6));

    assert_eq!(collected.delete_verts, vec![true, false, false, false]);
    let body = collected.body.as_ref().unwrap();
    assert_eq!(body.coords.len(), 3);
    assert!(body.coords[0].abs_diff_eq(DVec3::new(0.0, 2.0, 0.0), 1e-12));

    let shirt = &collected.proxies[0];
    assert_eq!(shirt.uuid, "shirt-001");
    assert_eq!(shirt.proxy_type, ProxyType::Clothes);
    assert!(shirt.weights.contains("Hips"));
}

#[test]
fn test_legacy_proxy_through_converter() {
    let dir = tempfile::tempdir().unwrap();
    let converter_path = write(
        dir.path(),
        "alpha7.mhclo",
        "basemesh hm08\nverts\n3\n0 1 2 0.5 0.5 0\n",
    );
    let hat_path = write(dir.path(), "hat.mhclo", "basemesh alpha7\nverts\n0\n1\n");

    let mesh = mesh();
    let cache = ConverterCache::new(converter_path.clone());
    let converter = cache.get_or_load(&mesh).unwrap().unwrap();
    assert!(cache.is_loaded(&mesh.identity()));

    let hat = ProxyParser::new(&mesh)
        .converter(Some(&*converter))
        .read_file(&hat_path)
        .unwrap()
        .unwrap()
        .proxy;

    let rig = RigDefinition::from_json(RIG_JSON).unwrap();
    let collected = collect_objects(
        "human",
        &mesh,
        &rig,
        RigOptions::default(),
        &[hat],
        &BindConfig::default(),
        &cache,
    )
    .unwrap();

    let hat = &collected.proxies[0];
    assert_eq!(
        hat.coords,
        vec![DVec3::new(0.5, 2.0, 0.0), DVec3::new(0.0, 0.5, 0.0)]
    );
}

#[test]
fn test_unknown_pose_bone() {
    let mesh = mesh();
    let rig = RigDefinition::from_json(RIG_JSON).unwrap();
    let pose = ReferencePose::from_json(r#"[["tail", [1, 0, 0, 0]]]"#).unwrap();
    let options = RigOptions {
        use_t_pose: true,
        ..Default::default()
    };
    let config = BindConfig {
        reference_pose: Some(pose),
        ..Default::default()
    };
    let err = collect_objects(
        "human",
        &mesh,
        &rig,
        options,
        &[],
        &config,
        &ConverterCache::empty(),
    )
    .unwrap_err();
    assert_eq!(err.code(), "RIG_009");
}

#[test]
fn test_scan_uuid_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "boots.mhclo", "# boots\nuuid boots-7\nverts\n0\n");
    assert_eq!(scan_uuid(&path).unwrap().as_deref(), Some("boots-7"));
}
