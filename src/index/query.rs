//! Read-only lookups against a secondary index, kept separate from
//! mutation (`IndexHandler`) and construction ([`super::builder`]) the way
//! the teacher splits `storage_v2::index::{builder, query}`.

use super::{Index, IndexValue};

/// Exact-match lookup. Only [`Index::Hash`] and [`Index::SkipList`] support
/// it; other kinds return an empty result rather than erroring, since an
/// equality probe against a geo index is simply not meaningful.
pub fn lookup_eq(index: &Index, values: &[IndexValue]) -> Vec<String> {
    match index {
        Index::Hash(h) => h.lookup(values),
        Index::SkipList(s) => s.range(Some(values), Some(values)),
        Index::Geo(_) => Vec::new(),
    }
}

/// Range lookup; only meaningful for [`Index::SkipList`].
pub fn lookup_range(index: &Index, lower: Option<&[IndexValue]>, upper: Option<&[IndexValue]>) -> Vec<String> {
    match index {
        Index::SkipList(s) => s.range(lower, upper),
        _ => Vec::new(),
    }
}

impl super::HashIndex {
    pub fn lookup(&self, values: &[IndexValue]) -> Vec<String> {
        self.map.get(values).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::super::{builder, IndexDescriptor, IndexKind};
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_eq_finds_indexed_document() {
        let docs = vec![("k1".to_string(), json!({"a": 7}))];
        let descriptor = IndexDescriptor {
            id: 1,
            kind: IndexKind::Hash,
            fields: vec!["a".to_string()],
            unique: false,
            sparse: false,
        };
        let index = builder::build_index(descriptor, docs.iter().map(|(k, v)| (k.as_str(), v))).unwrap();
        let found = lookup_eq(&index, &[IndexValue::Number(7.0)]);
        assert_eq!(found, vec!["k1".to_string()]);
    }
}
