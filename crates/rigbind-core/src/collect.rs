//! The bind pipeline: armature plus every proxy, ready for export.
//!
//! [`collect_objects`] builds the armature, binds each proxy to it in a
//! fixed type order, unions the proxies' deletion masks and applies the
//! export scale last so every output shares one unit.

use std::collections::BTreeMap;

use glam::DVec3;

use crate::error::RigResult;
use crate::mesh::{BaseMesh, VertexBuffer};
use crate::proxy::{BaseMeshKind, ConverterCache, ProxyDefinition, ProxyType};
use crate::rig::{Armature, ArmatureBuilder, ReferencePose, RigDefinition, RigOptions};
use crate::weights::{remap_weights, transfer_shapes, transfer_weights, ShapeTarget, WeightTable};

/// Proxy types bound by the pipeline, in binding order.
pub const BIND_ORDER: [ProxyType; 4] = [
    ProxyType::Clothes,
    ProxyType::Hair,
    ProxyType::Eyes,
    ProxyType::Proxy,
];

/// Settings for one [`collect_objects`] run.
#[derive(Debug, Clone)]
pub struct BindConfig {
    /// Export scale applied to the armature and every bound mesh.
    pub scale: f64,
    /// Pose used for bind matrices when the options ask for a T-pose.
    pub reference_pose: Option<ReferencePose>,
    /// Morph targets of the base mesh.
    pub shapes: Vec<ShapeTarget>,
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            reference_pose: None,
            shapes: Vec::new(),
        }
    }
}

/// A proxy bound to the armature.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundProxy {
    pub name: String,
    pub uuid: String,
    pub proxy_type: ProxyType,
    pub coords: Vec<DVec3>,
    pub weights: WeightTable,
    pub shapes: Vec<ShapeTarget>,
}

/// The base mesh after deletion masks, with vertices renumbered densely.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundMesh {
    pub name: String,
    pub coords: Vec<DVec3>,
    pub weights: WeightTable,
    pub shapes: Vec<ShapeTarget>,
}

/// Everything [`collect_objects`] produces.
#[derive(Debug)]
pub struct CollectedObjects {
    pub armature: Armature,
    /// `None` when a full-body proxy replaced the base mesh.
    pub body: Option<BoundMesh>,
    pub proxies: Vec<BoundProxy>,
    /// Union of the proxies' deletion masks over base vertices.
    pub delete_verts: Vec<bool>,
}

impl CollectedObjects {
    /// Number of exported meshes, the body included.
    pub fn mesh_count(&self) -> usize {
        self.proxies.len() + usize::from(self.body.is_some())
    }
}

/// Builds the armature for `rig` and binds `proxies` to it.
///
/// Proxies are bound in [`BIND_ORDER`]; cages and converters are skipped.
/// Only the first full-body proxy is used, and it replaces the base mesh.
/// Proxies on the legacy base mesh read it through `converters`.
pub fn collect_objects(
    name: &str,
    mesh: &VertexBuffer,
    rig: &RigDefinition,
    options: RigOptions,
    proxies: &[ProxyDefinition],
    config: &BindConfig,
    converters: &ConverterCache,
) -> RigResult<CollectedObjects> {
    let pose = if options.use_t_pose {
        if config.reference_pose.is_none() {
            log::warn!("T-pose requested but no reference pose given, using the rest pose");
        }
        config.reference_pose.as_ref()
    } else {
        None
    };

    let mut builder = ArmatureBuilder::new(name, rig, options, mesh);
    if let Some(pose) = pose {
        builder = builder.reference_pose(pose);
    }
    let mut armature = builder.build()?;

    let mut ordered: Vec<&ProxyDefinition> = Vec::with_capacity(proxies.len());
    for proxy_type in BIND_ORDER {
        ordered.extend(proxies.iter().filter(|p| p.proxy_type == proxy_type));
    }
    for skipped in proxies.iter().filter(|p| !BIND_ORDER.contains(&p.proxy_type)) {
        log::debug!("not binding {} '{}'", skipped.proxy_type.as_str(), skipped.name);
    }

    let mut delete_verts = vec![false; mesh.vertex_count()];
    let mut bound = Vec::with_capacity(ordered.len());
    let mut found_body = false;
    for proxy in ordered {
        if proxy.proxy_type == ProxyType::Proxy {
            if found_body {
                log::warn!("ignoring extra full-body proxy '{}'", proxy.name);
                continue;
            }
            found_body = true;
        }
        for (dst, &src) in delete_verts.iter_mut().zip(&proxy.delete_verts) {
            *dst |= src;
        }
        bound.push(bind_proxy(proxy, &armature, mesh, &config.shapes, converters)?);
    }

    let body = if found_body {
        None
    } else {
        let keep: Vec<bool> = delete_verts.iter().map(|d| !d).collect();
        Some(BoundMesh {
            name: name.to_string(),
            coords: mesh
                .coords()
                .iter()
                .zip(&keep)
                .filter_map(|(&co, &k)| k.then_some(co))
                .collect(),
            weights: remap_weights(armature.vertex_weights(), &keep),
            shapes: remap_shapes(&config.shapes, &keep),
        })
    };

    let mut collected = CollectedObjects {
        armature: {
            if config.scale != 1.0 {
                armature.rescale(config.scale)?;
                armature.rebuild_matrices(pose)?;
            }
            armature
        },
        body,
        proxies: bound,
        delete_verts,
    };
    if config.scale != 1.0 {
        rescale_meshes(&mut collected, config.scale);
    }

    log::info!(
        "collected '{}': {} bones, {} meshes",
        name,
        collected.armature.bones().len(),
        collected.mesh_count()
    );
    Ok(collected)
}

/// Reconstructs one proxy and transfers the armature's weights and the
/// base shapes onto it.
///
/// Weights declared by the proxy itself take precedence; they are moved
/// onto the armature's current bone names.
pub fn bind_proxy(
    proxy: &ProxyDefinition,
    armature: &Armature,
    mesh: &VertexBuffer,
    shapes: &[ShapeTarget],
    converters: &ConverterCache,
) -> RigResult<BoundProxy> {
    let converter = match proxy.basemesh_kind()? {
        BaseMeshKind::Alpha7 => converters.get_or_load(mesh)?,
        BaseMeshKind::Hm08 => None,
    };
    let coords = proxy.coords(mesh, converter.as_deref())?;
    let weights = match &proxy.weights {
        Some(own) => armature.retarget_weights(own, &coords),
        None => transfer_weights(armature.vertex_weights(), &proxy.vertex_weights),
    };
    let shapes = transfer_shapes(shapes, &proxy.vertex_weights, proxy.proxy_type, 1.0);
    log::debug!(
        "bound {} '{}': {} vertices, {} weight groups, {} shapes",
        proxy.proxy_type.as_str(),
        proxy.name,
        coords.len(),
        weights.len(),
        shapes.len()
    );
    Ok(BoundProxy {
        name: proxy.name.clone(),
        uuid: proxy.uuid().to_string(),
        proxy_type: proxy.proxy_type,
        coords,
        weights,
        shapes,
    })
}

/// Drops deleted vertices from every target and renumbers the rest.
fn remap_shapes(shapes: &[ShapeTarget], keep: &[bool]) -> Vec<ShapeTarget> {
    let mut new_index = Vec::with_capacity(keep.len());
    let mut next = 0;
    for &k in keep {
        new_index.push(k.then_some(next));
        if k {
            next += 1;
        }
    }
    shapes
        .iter()
        .map(|shape| ShapeTarget {
            name: shape.name.clone(),
            deltas: shape
                .deltas
                .iter()
                .filter_map(|(&v, &d)| new_index.get(v).copied().flatten().map(|nv| (nv, d)))
                .collect::<BTreeMap<_, _>>(),
        })
        .filter(|shape| !shape.deltas.is_empty())
        .collect()
}

fn rescale_meshes(collected: &mut CollectedObjects, scale: f64) {
    let rescale = |coords: &mut Vec<DVec3>, shapes: &mut Vec<ShapeTarget>| {
        for co in coords.iter_mut() {
            *co *= scale;
        }
        for shape in shapes.iter_mut() {
            for delta in shape.deltas.values_mut() {
                *delta *= scale;
            }
        }
    };
    if let Some(body) = &mut collected.body {
        rescale(&mut body.coords, &mut body.shapes);
    }
    for proxy in &mut collected.proxies {
        rescale(&mut proxy.coords, &mut proxy.shapes);
    }
}
