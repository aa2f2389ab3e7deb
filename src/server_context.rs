//! Top-level registry tying every collection, the tick source, and server
//! metrics together (§9 Design Notes: "a `ServerContext` value replacing
//! globals"). Grounded on the teacher's `database_manager::DatabaseManager`
//! for the thread-safe name/id registry, generalized from multiple
//! independent `GraphEngine` databases to multiple `Collection`s sharing one
//! [`TickGenerator`] and one [`Metrics`] instance, the way a single ArangoDB
//! database owns all of its collections' tick allocation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::collection::{Collection, CollectionParameters};
use crate::error::{Result, StorageError};
use crate::metrics::Metrics;
use crate::tick::TickGenerator;

struct Registry {
    by_id: HashMap<u64, Arc<Collection>>,
    by_name: HashMap<String, u64>,
    next_cid: u64,
}

/// Owns every open collection plus the process-wide tick counter and
/// metrics aggregator, and is threaded through every Core API call instead
/// of being reached for as a global (§9).
pub struct ServerContext {
    dir: PathBuf,
    ticks: Arc<TickGenerator>,
    metrics: Arc<Metrics>,
    registry: RwLock<Registry>,
}

fn collection_dir(base: &Path, name: &str) -> PathBuf {
    base.join("collections").join(name)
}

impl ServerContext {
    /// Open (or initialize) the database directory at `dir`, recovering
    /// every collection found under `collections/` by replaying its
    /// datafiles (§4.4 startup recovery). Collections are opened in
    /// parallel with `rayon`, the way the teacher parallelizes per-database
    /// startup scans.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let ticks = Arc::new(TickGenerator::new());
        let collections_dir = dir.join("collections");
        std::fs::create_dir_all(&collections_dir)?;

        let entries: Vec<_> = std::fs::read_dir(&collections_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .collect();

        let opened: Vec<Result<Arc<Collection>>> = {
            use rayon::prelude::*;
            entries
                .par_iter()
                .map(|entry| Collection::open(&entry.path(), &ticks).map(Arc::new))
                .collect()
        };

        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();
        let mut next_cid = 1u64;
        for result in opened {
            let collection = result?;
            next_cid = next_cid.max(collection.id + 1);
            by_name.insert(collection.name.clone(), collection.id);
            by_id.insert(collection.id, collection);
        }

        Ok(ServerContext {
            dir: dir.to_path_buf(),
            ticks,
            metrics: Arc::new(Metrics::new()),
            registry: RwLock::new(Registry {
                by_id,
                by_name,
                next_cid,
            }),
        })
    }

    pub fn ticks(&self) -> &Arc<TickGenerator> {
        &self.ticks
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Create and register a new collection, assigning it the next free id.
    pub fn create_collection(&self, name: &str, kind: crate::collection::CollectionKind, wait_for_sync: bool, maximal_size: usize) -> Result<Arc<Collection>> {
        let mut registry = self.registry.write().unwrap();
        if registry.by_name.contains_key(name) {
            return Err(StorageError::CollectionExists(name.to_string()));
        }
        let cid = registry.next_cid;
        registry.next_cid += 1;

        let params = CollectionParameters {
            cid,
            name: name.to_string(),
            kind,
            wait_for_sync,
            maximal_size,
        };
        let collection = Arc::new(Collection::create(&collection_dir(&self.dir, name), params)?);
        registry.by_name.insert(name.to_string(), cid);
        registry.by_id.insert(cid, collection.clone());
        Ok(collection)
    }

    pub fn collection(&self, cid: u64) -> Result<Arc<Collection>> {
        self.registry
            .read()
            .unwrap()
            .by_id
            .get(&cid)
            .cloned()
            .ok_or(StorageError::CollectionNotFound(cid))
    }

    pub fn collection_by_name(&self, name: &str) -> Result<Arc<Collection>> {
        let registry = self.registry.read().unwrap();
        let cid = registry
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::CollectionNotFound(0))?;
        registry.by_id.get(&cid).cloned().ok_or(StorageError::CollectionNotFound(cid))
    }

    pub fn drop_collection(&self, cid: u64) -> Result<()> {
        let mut registry = self.registry.write().unwrap();
        let collection = registry.by_id.remove(&cid).ok_or(StorageError::CollectionNotFound(cid))?;
        registry.by_name.remove(&collection.name);
        std::fs::remove_dir_all(collection_dir(&self.dir, &collection.name))?;
        Ok(())
    }

    pub fn list_collections(&self) -> Vec<Arc<Collection>> {
        self.registry.read().unwrap().by_id.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionKind;
    use tempfile::tempdir;

    #[test]
    fn create_then_find_by_id_and_name() {
        let dir = tempdir().unwrap();
        let ctx = ServerContext::open(dir.path()).unwrap();
        let col = ctx.create_collection("docs", CollectionKind::Document, false, 1 << 20).unwrap();
        assert_eq!(ctx.collection(col.id).unwrap().name, "docs");
        assert_eq!(ctx.collection_by_name("docs").unwrap().id, col.id);
    }

    #[test]
    fn duplicate_collection_name_is_rejected() {
        let dir = tempdir().unwrap();
        let ctx = ServerContext::open(dir.path()).unwrap();
        ctx.create_collection("docs", CollectionKind::Document, false, 1 << 20).unwrap();
        let err = ctx.create_collection("docs", CollectionKind::Document, false, 1 << 20).unwrap_err();
        assert!(matches!(err, StorageError::CollectionExists(_)));
    }

    #[test]
    fn reopening_the_directory_recovers_every_collection() {
        let dir = tempdir().unwrap();
        {
            let ctx = ServerContext::open(dir.path()).unwrap();
            let col = ctx.create_collection("docs", CollectionKind::Document, true, 1 << 20).unwrap();
            col.insert(ctx.ticks(), Some("k1".to_string()), &serde_json::json!({"a": 1}), true, None)
                .unwrap();
        }
        let ctx = ServerContext::open(dir.path()).unwrap();
        let col = ctx.collection_by_name("docs").unwrap();
        assert_eq!(col.document_count(), 1);
        let doc = col.read("k1").unwrap();
        assert_eq!(doc["a"], serde_json::json!(1));
    }
}
