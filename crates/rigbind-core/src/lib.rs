//! rigbind core library
//!
//! This crate binds secondary meshes (clothes, hair, eyes, full-body
//! proxies) to a base mesh and builds the skeletal armature that deforms
//! them.
//!
//! # Overview
//!
//! - **Proxies**: line-oriented proxy files map every proxy vertex to base
//!   mesh vertices, either exactly or by barycentric weights plus offset
//! - **Armature**: declarative rig tables are resolved against the base
//!   mesh into bones with rest and bind matrices
//! - **Weights**: base mesh skin weights and morph targets are carried
//!   over to each proxy
//!
//! # Example
//!
//! ```
//! use rigbind_core::{ArmatureBuilder, RigDefinition, RigOptions, VertexBuffer};
//!
//! let rig = RigDefinition::from_json(r#"{
//!     "name": "stick",
//!     "joints": [{"name": "a", "vertex": 0}, {"name": "b", "vertex": 1}],
//!     "groups": [{"name": "body", "bones": [{"name": "root", "head": "a", "tail": "b"}]}]
//! }"#).unwrap();
//! let mesh = VertexBuffer::from_arrays(&[[0.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
//!
//! let amt = ArmatureBuilder::new("stick", &rig, RigOptions::default(), &mesh)
//!     .build()
//!     .unwrap();
//! assert_eq!(amt.bones().len(), 1);
//! ```
//!
//! # Modules
//!
//! - [`error`]: Error and warning types
//! - [`mesh`]: Base mesh access
//! - [`proxy`]: Proxy files, parser and converter cache
//! - [`rig`]: Rig tables, armature build phases and retargeting
//! - [`weights`]: Weight groups, weight and shape transfer
//! - [`collect`]: The full bind pipeline

pub mod collect;
pub mod error;
pub mod math;
pub mod mesh;
pub mod name_table;
pub mod proxy;
pub mod rig;
pub mod weights;

// Re-export commonly used types at the crate root
pub use collect::{collect_objects, BindConfig, BoundMesh, BoundProxy, CollectedObjects};
pub use error::{ParseWarning, RigError, RigResult, WarningCode};
pub use mesh::{BaseMesh, VertexBuffer};
pub use name_table::NameTable;
pub use proxy::{ConverterCache, ProxyDefinition, ProxyLoad, ProxyParser, ProxyType};
pub use rig::{
    Armature, ArmatureBuilder, Bone, BuildPhase, Locale, ReferencePose, RigDefinition, RigOptions,
};
pub use weights::{ShapeTarget, WeightGroup, WeightTable};
