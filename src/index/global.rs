//! Per-collection secondary-index registry, grounded on the teacher's
//! `storage_v2::index::global` responsibility of tracking the set of
//! secondary indexes defined over a collection.

use serde_json::Value;

use super::{builder, Index, IndexDescriptor, IndexHandler, IndexId, IndexKind};
use crate::error::Result;

#[derive(Debug, Default)]
pub struct IndexRegistry {
    indexes: Vec<Index>,
    next_id: IndexId,
}

impl IndexRegistry {
    pub fn new() -> Self {
        IndexRegistry {
            indexes: Vec::new(),
            next_id: 1,
        }
    }

    /// Define a new index, backfilling it from whatever documents already
    /// exist in the collection.
    pub fn create<'a>(
        &mut self,
        kind: IndexKind,
        fields: Vec<String>,
        unique: bool,
        sparse: bool,
        existing: impl Iterator<Item = (&'a str, &'a Value)>,
    ) -> Result<IndexId> {
        let id = self.next_id;
        self.next_id += 1;
        let descriptor = IndexDescriptor {
            id,
            kind,
            fields,
            unique,
            sparse,
        };
        let index = builder::build_index(descriptor, existing)?;
        self.indexes.push(index);
        Ok(id)
    }

    pub fn drop(&mut self, id: IndexId) -> bool {
        if let Some(pos) = self.indexes.iter().position(|i| i.descriptor().id == id) {
            self.indexes[pos].cleanup();
            self.indexes.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn get(&self, id: IndexId) -> Option<&Index> {
        self.indexes.iter().find(|i| i.descriptor().id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Index> {
        self.indexes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Index> {
        self.indexes.iter_mut()
    }

    /// Invoke every index's callback for an insert, rolling back (`forget`)
    /// on every index already applied if one rejects it (§4.4 unique
    /// constraint rollback).
    pub fn on_insert(&mut self, key: &str, document: &Value) -> Result<()> {
        for applied in 0..self.indexes.len() {
            if let Err(e) = self.indexes[applied].insert(key, document) {
                for idx in &mut self.indexes[..applied] {
                    idx.forget(key, document);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn on_update(&mut self, key: &str, old: &Value, new: &Value) -> Result<()> {
        for applied in 0..self.indexes.len() {
            if let Err(e) = self.indexes[applied].update(key, old, new) {
                for idx in &mut self.indexes[..applied] {
                    idx.update(key, new, old).ok();
                }
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn on_remove(&mut self, key: &str, document: &Value) -> Result<()> {
        for idx in &mut self.indexes {
            idx.remove(key, document)?;
        }
        Ok(())
    }
}
