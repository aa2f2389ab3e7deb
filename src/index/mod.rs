//! Secondary index capability set (§4.4, §9 Design Notes).
//!
//! The source models index types as an abstract-base hierarchy; per §9
//! that becomes a closed sum type dispatched by exhaustive matching
//! instead. Each variant implements the narrow [`IndexHandler`] interface,
//! mirroring the teacher's `storage_v2::index` module split: construction
//! lives in [`builder`], lookups in [`query`], and the per-collection
//! registry in [`global`].

pub mod builder;
pub mod global;
pub mod query;

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

use serde_json::Value;

use crate::error::{Result, StorageError};

pub type IndexId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum IndexKind {
    Hash,
    SkipList,
    Geo,
}

/// Persisted index metadata (the body of an `IndexCreate` marker).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IndexDescriptor {
    pub id: IndexId,
    pub kind: IndexKind,
    pub fields: Vec<String>,
    pub unique: bool,
    /// Sparse semantics (§9 open question, resolved in DESIGN.md): a
    /// document missing any indexed field, or holding JSON `null` there,
    /// is simply not indexed rather than indexed under a null key.
    pub sparse: bool,
}

/// A scalar pulled out of a document at one of an index's `fields`.
/// `serde_json::Value` isn't `Ord`/`Hash`, so indexed values are narrowed
/// to this comparable projection.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
}

impl Eq for IndexValue {}

impl PartialOrd for IndexValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use IndexValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Bool(_), _) => Ordering::Less,
            (_, Bool(_)) => Ordering::Greater,
            (Number(a), Number(b)) => a.total_cmp(b),
            (Number(_), _) => Ordering::Less,
            (_, Number(_)) => Ordering::Greater,
            (Str(a), Str(b)) => a.cmp(b),
        }
    }
}

impl Hash for IndexValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            IndexValue::Null => 0u8.hash(state),
            IndexValue::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            IndexValue::Number(n) => {
                2u8.hash(state);
                n.to_bits().hash(state);
            }
            IndexValue::Str(s) => {
                3u8.hash(state);
                s.hash(state);
            }
        }
    }
}

impl From<&Value> for IndexValue {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => IndexValue::Null,
            Value::Bool(b) => IndexValue::Bool(*b),
            Value::Number(n) => IndexValue::Number(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => IndexValue::Str(s.clone()),
            other => IndexValue::Str(other.to_string()),
        }
    }
}

/// Project a document onto its indexed fields. Returns `None` when the
/// index is sparse and at least one field is absent or `null`.
fn extract_key(fields: &[String], document: &Value, sparse: bool) -> Option<Vec<IndexValue>> {
    let obj = document.as_object()?;
    let mut values = Vec::with_capacity(fields.len());
    for field in fields {
        match obj.get(field) {
            Some(Value::Null) | None if sparse => return None,
            Some(v) => values.push(IndexValue::from(v)),
            None => values.push(IndexValue::Null),
        }
    }
    Some(values)
}

/// Narrow interface every secondary index implements — `(insert, update,
/// remove, forget, pre_commit, cleanup)` per §4.4, in place of an
/// inheritance hierarchy.
pub trait IndexHandler {
    fn insert(&mut self, key: &str, document: &Value) -> Result<()>;
    fn update(&mut self, key: &str, old: &Value, new: &Value) -> Result<()>;
    fn remove(&mut self, key: &str, document: &Value) -> Result<()>;
    /// Drop a key without further bookkeeping — used to roll back a
    /// partially-applied insert when a later index in the chain rejects it.
    fn forget(&mut self, key: &str, document: &Value);
    /// Runs once per transaction commit, after all operations have been
    /// applied to every index. A no-op for the index kinds in this crate.
    fn pre_commit(&mut self) -> Result<()> {
        Ok(())
    }
    /// Drop all state, e.g. when the owning collection is dropped.
    fn cleanup(&mut self) {}
}

#[derive(Debug, Default)]
pub struct HashIndex {
    descriptor_: Option<IndexDescriptor>,
    map: HashMap<Vec<IndexValue>, Vec<String>>,
}

impl HashIndex {
    pub fn new(descriptor: IndexDescriptor) -> Self {
        HashIndex {
            descriptor_: Some(descriptor),
            map: HashMap::new(),
        }
    }

    fn descriptor(&self) -> &IndexDescriptor {
        self.descriptor_.as_ref().expect("descriptor set at construction")
    }
}

impl IndexHandler for HashIndex {
    fn insert(&mut self, key: &str, document: &Value) -> Result<()> {
        let d = self.descriptor().clone();
        let Some(values) = extract_key(&d.fields, document, d.sparse) else {
            return Ok(());
        };
        if d.unique {
            if let Some(existing) = self.map.get(&values) {
                if existing.iter().any(|k| k != key) {
                    return Err(StorageError::UniqueConstraintViolated {
                        index: d.id.to_string(),
                        key: key.to_string(),
                    });
                }
            }
            self.map.insert(values, vec![key.to_string()]);
        } else {
            self.map.entry(values).or_default().push(key.to_string());
        }
        Ok(())
    }

    fn update(&mut self, key: &str, old: &Value, new: &Value) -> Result<()> {
        self.remove(key, old)?;
        self.insert(key, new)
    }

    fn remove(&mut self, key: &str, document: &Value) -> Result<()> {
        let d = self.descriptor().clone();
        if let Some(values) = extract_key(&d.fields, document, d.sparse) {
            if let Some(keys) = self.map.get_mut(&values) {
                keys.retain(|k| k != key);
                if keys.is_empty() {
                    self.map.remove(&values);
                }
            }
        }
        Ok(())
    }

    fn forget(&mut self, key: &str, document: &Value) {
        let _ = self.remove(key, document);
    }

    fn cleanup(&mut self) {
        self.map.clear();
    }
}

#[derive(Debug, Default)]
pub struct SkipListIndex {
    descriptor_: Option<IndexDescriptor>,
    map: BTreeMap<Vec<IndexValue>, Vec<String>>,
}

impl SkipListIndex {
    pub fn new(descriptor: IndexDescriptor) -> Self {
        SkipListIndex {
            descriptor_: Some(descriptor),
            map: BTreeMap::new(),
        }
    }

    fn descriptor(&self) -> &IndexDescriptor {
        self.descriptor_.as_ref().expect("descriptor set at construction")
    }

    pub fn range(&self, lower: Option<&[IndexValue]>, upper: Option<&[IndexValue]>) -> Vec<String> {
        use std::ops::Bound::*;
        let lo = lower.map(|v| v.to_vec());
        let hi = upper.map(|v| v.to_vec());
        let lo_bound = lo.map(Included).unwrap_or(Unbounded);
        let hi_bound = hi.map(Included).unwrap_or(Unbounded);
        self.map
            .range((lo_bound, hi_bound))
            .flat_map(|(_, keys)| keys.clone())
            .collect()
    }
}

impl IndexHandler for SkipListIndex {
    fn insert(&mut self, key: &str, document: &Value) -> Result<()> {
        let d = self.descriptor().clone();
        let Some(values) = extract_key(&d.fields, document, d.sparse) else {
            return Ok(());
        };
        if d.unique && self.map.get(&values).is_some_and(|ks| ks.iter().any(|k| k != key)) {
            return Err(StorageError::UniqueConstraintViolated {
                index: d.id.to_string(),
                key: key.to_string(),
            });
        }
        self.map.entry(values).or_default().push(key.to_string());
        Ok(())
    }

    fn update(&mut self, key: &str, old: &Value, new: &Value) -> Result<()> {
        self.remove(key, old)?;
        self.insert(key, new)
    }

    fn remove(&mut self, key: &str, document: &Value) -> Result<()> {
        let d = self.descriptor().clone();
        if let Some(values) = extract_key(&d.fields, document, d.sparse) {
            if let Some(keys) = self.map.get_mut(&values) {
                keys.retain(|k| k != key);
                if keys.is_empty() {
                    self.map.remove(&values);
                }
            }
        }
        Ok(())
    }

    fn forget(&mut self, key: &str, document: &Value) {
        let _ = self.remove(key, document);
    }

    fn cleanup(&mut self) {
        self.map.clear();
    }
}

/// Grid-bucketed geo index: two fields (lat, lon) truncated to a fixed
/// number of decimal places form the bucket key. Coarse but adequate for
/// the capability-set contract this crate needs; spatial refinement (R-tree,
/// distance sort) is out of scope (see spec.md §1 non-goals on query layers).
#[derive(Debug, Default)]
pub struct GeoIndex {
    descriptor_: Option<IndexDescriptor>,
    buckets: HashMap<(i64, i64), Vec<String>>,
}

const GEO_PRECISION: f64 = 1e4;

impl GeoIndex {
    pub fn new(descriptor: IndexDescriptor) -> Self {
        GeoIndex {
            descriptor_: Some(descriptor),
            buckets: HashMap::new(),
        }
    }

    fn descriptor(&self) -> &IndexDescriptor {
        self.descriptor_.as_ref().expect("descriptor set at construction")
    }

    fn bucket_of(&self, document: &Value) -> Option<(i64, i64)> {
        let d = self.descriptor();
        let lat = document.get(d.fields.first()?)?.as_f64()?;
        let lon = document.get(d.fields.get(1)?)?.as_f64()?;
        Some(((lat * GEO_PRECISION) as i64, (lon * GEO_PRECISION) as i64))
    }

    pub fn near(&self, lat: f64, lon: f64, radius_buckets: i64) -> Vec<String> {
        let center = ((lat * GEO_PRECISION) as i64, (lon * GEO_PRECISION) as i64);
        self.buckets
            .iter()
            .filter(|((blat, blon), _)| {
                (*blat - center.0).abs() <= radius_buckets && (*blon - center.1).abs() <= radius_buckets
            })
            .flat_map(|(_, keys)| keys.clone())
            .collect()
    }
}

impl IndexHandler for GeoIndex {
    fn insert(&mut self, key: &str, document: &Value) -> Result<()> {
        if let Some(bucket) = self.bucket_of(document) {
            self.buckets.entry(bucket).or_default().push(key.to_string());
        }
        Ok(())
    }

    fn update(&mut self, key: &str, old: &Value, new: &Value) -> Result<()> {
        self.remove(key, old)?;
        self.insert(key, new)
    }

    fn remove(&mut self, key: &str, document: &Value) -> Result<()> {
        if let Some(bucket) = self.bucket_of(document) {
            if let Some(keys) = self.buckets.get_mut(&bucket) {
                keys.retain(|k| k != key);
                if keys.is_empty() {
                    self.buckets.remove(&bucket);
                }
            }
        }
        Ok(())
    }

    fn forget(&mut self, key: &str, document: &Value) {
        let _ = self.remove(key, document);
    }

    fn cleanup(&mut self) {
        self.buckets.clear();
    }
}

/// Closed sum type over the index kinds this crate supports (§9: capability
/// set in place of an inheritance hierarchy).
#[derive(Debug)]
pub enum Index {
    Hash(HashIndex),
    SkipList(SkipListIndex),
    Geo(GeoIndex),
}

impl Index {
    pub fn descriptor(&self) -> &IndexDescriptor {
        match self {
            Index::Hash(h) => h.descriptor(),
            Index::SkipList(s) => s.descriptor(),
            Index::Geo(g) => g.descriptor(),
        }
    }
}

impl IndexHandler for Index {
    fn insert(&mut self, key: &str, document: &Value) -> Result<()> {
        match self {
            Index::Hash(h) => h.insert(key, document),
            Index::SkipList(s) => s.insert(key, document),
            Index::Geo(g) => g.insert(key, document),
        }
    }

    fn update(&mut self, key: &str, old: &Value, new: &Value) -> Result<()> {
        match self {
            Index::Hash(h) => h.update(key, old, new),
            Index::SkipList(s) => s.update(key, old, new),
            Index::Geo(g) => g.update(key, old, new),
        }
    }

    fn remove(&mut self, key: &str, document: &Value) -> Result<()> {
        match self {
            Index::Hash(h) => h.remove(key, document),
            Index::SkipList(s) => s.remove(key, document),
            Index::Geo(g) => g.remove(key, document),
        }
    }

    fn forget(&mut self, key: &str, document: &Value) {
        match self {
            Index::Hash(h) => h.forget(key, document),
            Index::SkipList(s) => s.forget(key, document),
            Index::Geo(g) => g.forget(key, document),
        }
    }

    fn cleanup(&mut self) {
        match self {
            Index::Hash(h) => h.cleanup(),
            Index::SkipList(s) => s.cleanup(),
            Index::Geo(g) => g.cleanup(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(kind: IndexKind, unique: bool) -> IndexDescriptor {
        IndexDescriptor {
            id: 1,
            kind,
            fields: vec!["a".to_string()],
            unique,
            sparse: false,
        }
    }

    #[test]
    fn hash_index_rejects_duplicate_unique_key() {
        let mut idx = HashIndex::new(descriptor(IndexKind::Hash, true));
        idx.insert("k1", &json!({"a": 1})).unwrap();
        let err = idx.insert("k2", &json!({"a": 1})).unwrap_err();
        assert!(matches!(err, StorageError::UniqueConstraintViolated { .. }));
    }

    #[test]
    fn skiplist_range_returns_keys_in_bounds() {
        let mut idx = SkipListIndex::new(descriptor(IndexKind::SkipList, false));
        idx.insert("k1", &json!({"a": 1})).unwrap();
        idx.insert("k2", &json!({"a": 5})).unwrap();
        idx.insert("k3", &json!({"a": 10})).unwrap();
        let got = idx.range(Some(&[IndexValue::Number(2.0)]), Some(&[IndexValue::Number(9.0)]));
        assert_eq!(got, vec!["k2".to_string()]);
    }

    #[test]
    fn sparse_index_skips_documents_missing_field() {
        let mut d = descriptor(IndexKind::Hash, false);
        d.sparse = true;
        let mut idx = HashIndex::new(d);
        idx.insert("k1", &json!({"b": 1})).unwrap();
        assert!(idx.map.is_empty());
    }
}
