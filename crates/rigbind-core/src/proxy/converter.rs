//! Legacy base mesh conversion.
//!
//! Proxies authored on the older `alpha_7` base mesh index vertices of that
//! mesh. A converter proxy maps each of those vertices onto the current
//! base mesh, and is shared by every proxy that needs it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

use super::{ProxyDefinition, ProxyParser, ProxyType};
use crate::error::{RigError, RigResult};
use crate::mesh::{BaseMesh, VertexBuffer};

/// Base mesh conventions a proxy may be authored against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseMeshKind {
    /// The legacy mesh, converted on use.
    Alpha7,
    /// The current mesh.
    Hm08,
}

impl BaseMeshKind {
    /// Resolves a `basemesh` directive value.
    pub fn from_id(id: &str) -> RigResult<Self> {
        match id {
            "alpha_7" | "alpha7" => Ok(BaseMeshKind::Alpha7),
            "hm08" => Ok(BaseMeshKind::Hm08),
            other => Err(RigError::UnknownBaseMesh {
                name: other.to_string(),
            }),
        }
    }

    /// True when reference vertices must go through a converter.
    pub fn needs_conversion(&self) -> bool {
        matches!(self, BaseMeshKind::Alpha7)
    }
}

type Slot = Arc<OnceCell<Arc<ProxyDefinition>>>;

/// Process-wide converter cache keyed by base mesh identity.
///
/// Each base mesh gets one slot. The first caller for a mesh builds the
/// converter; concurrent callers block on the same slot and share the
/// result.
#[derive(Debug)]
pub struct ConverterCache {
    source: Option<PathBuf>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ConverterCache {
    /// Creates a cache that reads the converter from `source` on first use.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: Some(source.into()),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a cache with no converter file; only preloaded entries resolve.
    pub fn empty() -> Self {
        Self {
            source: None,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Path the converter is loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Installs a pre-built converter for `identity`.
    ///
    /// Returns false if the slot already holds a converter.
    pub fn preload(&self, identity: impl Into<String>, converter: ProxyDefinition) -> bool {
        self.slot(identity.into()).set(Arc::new(converter)).is_ok()
    }

    /// True once a converter has been built or installed for `identity`.
    pub fn is_loaded(&self, identity: &str) -> bool {
        self.slots
            .lock()
            .map(|slots| slots.get(identity).is_some_and(|s| s.get().is_some()))
            .unwrap_or(false)
    }

    /// Returns the converter for `identity`, building it with `load` on first use.
    pub fn get_or_init_with<F>(&self, identity: &str, load: F) -> RigResult<Arc<ProxyDefinition>>
    where
        F: FnOnce() -> RigResult<ProxyDefinition>,
    {
        let slot = self.slot(identity.to_string());
        slot.get_or_try_init(|| load().map(Arc::new)).cloned()
    }

    /// Returns the converter for `mesh`, reading the cache's source file on first use.
    ///
    /// Returns `Ok(None)` when the cache has no source and nothing was preloaded,
    /// or when the source file cannot be opened.
    pub fn get_or_load(&self, mesh: &VertexBuffer) -> RigResult<Option<Arc<ProxyDefinition>>> {
        let identity = mesh.identity();
        let slot = self.slot(identity);
        if let Some(conv) = slot.get() {
            return Ok(Some(Arc::clone(conv)));
        }
        let Some(source) = self.source.as_deref() else {
            return Ok(None);
        };
        let loaded = slot.get_or_try_init(|| {
            let parser = ProxyParser::new(mesh as &dyn BaseMesh).proxy_type(ProxyType::Converter);
            match parser.read_file(source)? {
                Some(load) => {
                    log::debug!(
                        "loaded converter {} ({} vertices)",
                        source.display(),
                        load.proxy.vertex_count()
                    );
                    Ok(Arc::new(load.proxy))
                }
                None => Err(RigError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("cannot open converter {}", source.display()),
                ))),
            }
        });
        match loaded {
            Ok(conv) => Ok(Some(Arc::clone(conv))),
            Err(RigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn slot(&self, identity: String) -> Slot {
        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(slots.entry(identity).or_default())
    }
}

impl Default for ConverterCache {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_basemesh_ids() {
        assert_eq!(BaseMeshKind::from_id("alpha_7").unwrap(), BaseMeshKind::Alpha7);
        assert_eq!(BaseMeshKind::from_id("alpha7").unwrap(), BaseMeshKind::Alpha7);
        assert_eq!(BaseMeshKind::from_id("hm08").unwrap(), BaseMeshKind::Hm08);
        assert!(BaseMeshKind::Alpha7.needs_conversion());

        let err = BaseMeshKind::from_id("hm09").unwrap_err();
        assert_eq!(err.code(), "RIG_005");
        assert!(err.to_string().contains("hm09"));
    }

    #[test]
    fn test_concurrent_first_use_builds_once() {
        let cache = Arc::new(ConverterCache::empty());
        let builds = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let builds = Arc::clone(&builds);
                std::thread::spawn(move || {
                    cache
                        .get_or_init_with("mesh-a", || {
                            builds.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(10));
                            Ok(ProxyDefinition::new(
                                Path::new("a7_converter.proxy"),
                                ProxyType::Converter,
                                4,
                                0,
                            ))
                        })
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        for conv in &results[1..] {
            assert!(Arc::ptr_eq(conv, &results[0]));
        }
        assert!(cache.is_loaded("mesh-a"));
        assert!(!cache.is_loaded("mesh-b"));
    }

    #[test]
    fn test_preload_and_missing_source() {
        let mesh = VertexBuffer::from_arrays(&[[0.0, 0.0, 0.0]]);
        let cache = ConverterCache::empty();
        assert!(cache.get_or_load(&mesh).unwrap().is_none());

        let conv = ProxyDefinition::new(Path::new("conv.proxy"), ProxyType::Converter, 4, 1);
        assert!(cache.preload(mesh.identity(), conv.clone()));
        assert!(!cache.preload(mesh.identity(), conv));
        assert!(cache.get_or_load(&mesh).unwrap().is_some());

        let missing = ConverterCache::new("/nonexistent/a7_converter.proxy");
        assert!(missing.get_or_load(&mesh).unwrap().is_none());
        assert!(!missing.is_loaded(&mesh.identity()));
    }
}
