//! Building a fresh [`Index`] from an `IndexCreate` descriptor, optionally
//! backfilling it over documents already in the collection.

use serde_json::Value;

use super::{GeoIndex, HashIndex, Index, IndexDescriptor, IndexHandler, IndexKind};
use crate::error::Result;

pub fn new_index(descriptor: IndexDescriptor) -> Index {
    match descriptor.kind {
        IndexKind::Hash => Index::Hash(HashIndex::new(descriptor)),
        IndexKind::SkipList => Index::SkipList(super::SkipListIndex::new(descriptor)),
        IndexKind::Geo => Index::Geo(GeoIndex::new(descriptor)),
    }
}

/// Construct an index and backfill it from every existing `(key, document)`
/// pair. Used when `index-create` runs against a non-empty collection.
pub fn build_index<'a>(
    descriptor: IndexDescriptor,
    existing: impl Iterator<Item = (&'a str, &'a Value)>,
) -> Result<Index> {
    let mut index = new_index(descriptor);
    for (key, document) in existing {
        index.insert(key, document)?;
    }
    Ok(index)
}
