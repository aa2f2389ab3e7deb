//! Per-collection CRUD over datafiles with MVCC revisions (§4.4, C4).
//!
//! Grounded on the teacher's `graph::engine_v2::GraphEngineV2` for the
//! single-collection mutation surface (one `RwLock` guarding all mutable
//! state, `Result`-returning mutators) and on
//! `database_manager::DatabaseManager` for how collections are registered
//! and looked up by id (see [`crate::server_context::ServerContext`]).

pub mod datafile_set;
pub mod marker_body;

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::datafile::visitor::MarkerVisitor;
use crate::datafile::Datafile;
use crate::error::{Result, StorageError};
use crate::header_index::{HeaderHandle, HeaderIndex};
use crate::index::global::IndexRegistry;
use crate::index::IndexKind;
use crate::marker::{align, compute_crc, MarkerHeader, MarkerType, PREFIX_SIZE};
use crate::shaper::Shaper;
use crate::tick::TickGenerator;
use datafile_set::DatafileSet;
use marker_body::{
    decode_attribute_marker, decode_deletion_body, decode_document_body, decode_shape_marker, encode_attribute_marker,
    encode_deletion_body, encode_document_body, encode_shape_marker, EdgeFields,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionKind {
    Document,
    Edge,
}

/// `policy` argument to `update`/`remove` (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    Error,
    LastWrite,
    /// Present in the original sources as a reachable-in-theory state
    /// (§4.4 Supplemented); kept as an explicit error so matches over
    /// `ConflictPolicy` stay total instead of silently falling through.
    Illegal,
}

/// The master pointer handed back to callers after a successful mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MPtr {
    pub cid: u64,
    pub key: String,
    pub rev: u64,
}

/// On-disk collection metadata (`parameter.json`, §6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionParameters {
    pub cid: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CollectionKind,
    #[serde(rename = "waitForSync")]
    pub wait_for_sync: bool,
    #[serde(rename = "maximalSize")]
    pub maximal_size: usize,
}

struct CollectionInner {
    shaper: Shaper,
    headers: HeaderIndex,
    sealed: Vec<Datafile>,
    journal: Option<Datafile>,
    next_fid: u64,
    next_key: u64,
    indexes: IndexRegistry,
}

/// A document (or edge) collection: a directory of datafiles plus the
/// in-memory shaper and header index built over them (§3 Collection).
pub struct Collection {
    pub id: u64,
    pub name: String,
    pub kind: CollectionKind,
    pub wait_for_sync: bool,
    pub maximal_size: usize,
    path: PathBuf,
    inner: RwLock<CollectionInner>,
}

fn parameter_path(dir: &Path) -> PathBuf {
    dir.join("parameter.json")
}

impl Collection {
    pub fn create(dir: &Path, params: CollectionParameters) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let data = serde_json::to_vec_pretty(&params)?;
        std::fs::write(parameter_path(dir), data)?;
        Ok(Collection {
            id: params.cid,
            name: params.name,
            kind: params.kind,
            wait_for_sync: params.wait_for_sync,
            maximal_size: params.maximal_size,
            path: dir.to_path_buf(),
            inner: RwLock::new(CollectionInner {
                shaper: Shaper::new(),
                headers: HeaderIndex::new(),
                sealed: Vec::new(),
                journal: None,
                next_fid: 1,
                next_key: 1,
                indexes: IndexRegistry::new(),
            }),
        })
    }

    /// Recover a collection from disk: load `parameter.json`, open every
    /// sealed datafile in fid order plus the journal, replaying markers to
    /// rebuild the header index (§4.4 startup recovery).
    pub fn open(dir: &Path, ticks: &TickGenerator) -> Result<Self> {
        let data = std::fs::read(parameter_path(dir))?;
        let params: CollectionParameters = serde_json::from_slice(&data)?;

        let mut sealed = Vec::new();
        let mut journal = None;
        let mut entries: Vec<_> = std::fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
        entries.sort_by_key(|e| e.file_name());

        let mut next_fid = 1u64;
        let mut shaper = Shaper::new();
        let mut headers = HeaderIndex::new();
        let indexes = IndexRegistry::new();

        for entry in entries {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_sealed = name.starts_with("datafile-") && name.ends_with(".db");
            let is_journal = name.starts_with("journal-") && name.ends_with(".db");
            if is_sealed {
                let df = Datafile::open(&entry.path(), ticks)?;
                next_fid = next_fid.max(df.fid + 1);
                sealed.push(df);
            } else if is_journal {
                let df = Datafile::open(&entry.path(), ticks)?;
                next_fid = next_fid.max(df.fid + 1);
                journal = Some(df);
            }
        }
        sealed.sort_by_key(|d| d.fid);

        let mut next_key = 1u64;
        let is_edge = params.kind == CollectionKind::Edge;
        for df in &sealed {
            let mut visitor = ReplayVisitor {
                fid: df.fid,
                shaper: &mut shaper,
                headers: &mut headers,
                next_key: &mut next_key,
                is_edge,
            };
            df.iterate(&mut visitor, false)?;
        }
        if let Some(df) = &journal {
            let mut visitor = ReplayVisitor {
                fid: df.fid,
                shaper: &mut shaper,
                headers: &mut headers,
                next_key: &mut next_key,
                is_edge,
            };
            df.iterate(&mut visitor, true)?;
        }

        Ok(Collection {
            id: params.cid,
            name: params.name,
            kind: params.kind,
            wait_for_sync: params.wait_for_sync,
            maximal_size: params.maximal_size,
            path: dir.to_path_buf(),
            inner: RwLock::new(CollectionInner {
                shaper,
                headers,
                sealed,
                journal,
                next_fid,
                next_key,
                indexes,
            }),
        })
    }

    fn reserve_with_rotation(
        inner: &mut CollectionInner,
        path: &Path,
        maximal_size: usize,
        total_len: usize,
        ticks: &TickGenerator,
    ) -> Result<u64> {
        if inner.journal.is_none() {
            let fid = inner.next_fid;
            inner.next_fid += 1;
            let journal_path = path.join(format!("journal-{fid}.db"));
            inner.journal = Some(Datafile::create(&journal_path, maximal_size, fid, ticks)?);
        }
        let first = {
            let journal = inner.journal.as_mut().unwrap();
            journal.reserve(total_len)
        };
        match first {
            Ok(pos) => Ok(pos),
            Err(StorageError::DatafileFull) => {
                let mut sealed = inner.journal.take().unwrap();
                sealed.seal(ticks)?;
                inner.sealed.push(sealed);
                let fid = inner.next_fid;
                inner.next_fid += 1;
                let journal_path = path.join(format!("journal-{fid}.db"));
                let mut fresh = Datafile::create(&journal_path, maximal_size, fid, ticks)?;
                let pos = fresh.reserve(total_len)?;
                inner.journal = Some(fresh);
                Ok(pos)
            }
            Err(e) => Err(e),
        }
    }

    fn write_marker(
        inner: &mut CollectionInner,
        path: &Path,
        maximal_size: usize,
        marker_type: MarkerType,
        body: &[u8],
        force_sync: bool,
        ticks: &TickGenerator,
    ) -> Result<(u64, u64, usize)> {
        let total_len = align(PREFIX_SIZE + body.len());
        let position = Self::reserve_with_rotation(inner, path, maximal_size, total_len, ticks)?;
        // `iterate` recomputes the crc over the full aligned body slice, so
        // the padding has to be part of what gets hashed and written here.
        let mut padded_body = body.to_vec();
        padded_body.resize(total_len - PREFIX_SIZE, 0);
        let tick = ticks.next();
        let header = MarkerHeader {
            size: total_len as u32,
            marker_type,
            crc: 0,
            tick,
        };
        let mut prefix = Vec::with_capacity(PREFIX_SIZE);
        header.write_to(&mut prefix)?;
        let crc = compute_crc(&prefix, &padded_body);
        let header = MarkerHeader { crc, ..header };
        let mut bytes = Vec::with_capacity(PREFIX_SIZE);
        header.write_to(&mut bytes)?;

        let journal = inner.journal.as_mut().expect("journal created by reserve_with_rotation");
        journal.write(position, &bytes, &padded_body, force_sync)?;
        let fid = journal.fid;
        Ok((fid, position, total_len))
    }

    /// Persist any attribute names and shapes interned by the `to_shaped`
    /// call just made, as their own markers, before the document marker that
    /// references them is written. Without this, a restarted process can
    /// never resolve the opaque ids inside a replayed document's body.
    fn persist_new_interning(
        inner: &mut CollectionInner,
        path: &Path,
        maximal_size: usize,
        attrs_before: usize,
        shapes_before: usize,
        force_sync: bool,
        ticks: &TickGenerator,
    ) -> Result<()> {
        for id in attrs_before as u32..inner.shaper.attribute_count() as u32 {
            let name = inner.shaper.lookup_attribute_id(id).expect("just interned").to_string();
            let body = encode_attribute_marker(id, &name);
            Self::write_marker(inner, path, maximal_size, MarkerType::AttributeName, &body, force_sync, ticks)?;
        }
        for id in shapes_before as u32..inner.shaper.shape_count() as u32 {
            let shape = inner.shaper.lookup_shape_id(id).expect("just interned").clone();
            let body = encode_shape_marker(id, &shape)?;
            Self::write_marker(inner, path, maximal_size, MarkerType::Shape, &body, force_sync, ticks)?;
        }
        Ok(())
    }

    fn read_document_at(inner: &CollectionInner, fid: u64, offset: u64, marker_size: u64) -> Result<(String, u32, Option<EdgeFields>, Vec<u8>)> {
        let set = DatafileSet::new(inner.journal.as_ref(), &inner.sealed);
        let marker_bytes = set.resolve(fid, offset, marker_size as usize)?;
        let header = MarkerHeader::from_bytes(marker_bytes)?;
        let body = &marker_bytes[PREFIX_SIZE..];
        match header.marker_type {
            MarkerType::Document | MarkerType::Edge => {
                let parsed = decode_document_body(body, matches!(header.marker_type, MarkerType::Edge))?;
                Ok((parsed.key.to_string(), parsed.shape_id, parsed.edge, parsed.shaped_body.to_vec()))
            }
            other => Err(StorageError::IllegalState(format!("unexpected marker type at header: {other:?}"))),
        }
    }

    fn decode_full_document(&self, inner: &CollectionInner, handle: HeaderHandle) -> Result<Value> {
        let header = inner.headers.get(handle);
        let (key, shape_id, edge, shaped_body) = Self::read_document_at(inner, header.fid, header.offset, header.marker_size)?;
        let mut value = inner.shaper.from_shaped(shape_id, &shaped_body)?;
        if let Value::Object(ref mut map) = value {
            map.insert("_key".to_string(), Value::String(key));
            map.insert("_rev".to_string(), Value::String(header.revision.to_string()));
            if let Some(edge) = edge {
                map.insert("_from".to_string(), Value::String(format!("{}/{}", edge.from_cid, edge.from_key)));
                map.insert("_to".to_string(), Value::String(format!("{}/{}", edge.to_cid, edge.to_key)));
            }
        }
        Ok(value)
    }

    pub fn insert(
        &self,
        ticks: &TickGenerator,
        key: Option<String>,
        document: &Value,
        wait_for_sync: bool,
        edge: Option<EdgeFields>,
    ) -> Result<MPtr> {
        if !document.is_object() {
            return Err(StorageError::DocumentTypeInvalid("document must be a JSON object".into()));
        }
        let mut inner = self.inner.write().unwrap();

        let key = match key {
            Some(k) => k,
            None => loop {
                let candidate = format!("{:x}", inner.next_key);
                inner.next_key += 1;
                if inner.headers.find(&candidate).is_none() {
                    break candidate;
                }
            },
        };

        if let Some(existing) = inner.headers.find(&key) {
            if !inner.headers.get(existing).is_tombstone() {
                return Err(StorageError::DuplicateIdentifier(key));
            }
            inner.headers.release(existing, true);
        }

        let attrs_before = inner.shaper.attribute_count();
        let shapes_before = inner.shaper.shape_count();
        let (shape_id, shaped_body) = inner.shaper.to_shaped(document)?;
        let marker_type = if edge.is_some() { MarkerType::Edge } else { MarkerType::Document };
        let body = encode_document_body(&key, shape_id, &shaped_body, edge.as_ref());

        let force_sync = wait_for_sync || self.wait_for_sync;
        Self::persist_new_interning(&mut inner, &self.path, self.maximal_size, attrs_before, shapes_before, force_sync, ticks)?;
        let (fid, position, total_len) = Self::write_marker(&mut inner, &self.path, self.maximal_size, marker_type, &body, force_sync, ticks)?;

        // The revision is the marker's tick; re-read it from the marker we
        // just wrote rather than minting a second one.
        let revision = {
            let set = DatafileSet::new(inner.journal.as_ref(), &inner.sealed);
            let marker_bytes = set.resolve(fid, position, total_len)?;
            MarkerHeader::from_bytes(marker_bytes)?.tick
        };

        let handle = inner.headers.request(&key, total_len);
        {
            let h = inner.headers.get_mut(handle);
            h.fid = fid;
            h.offset = position;
            h.revision = revision;
        }

        if let Err(e) = inner.indexes.on_insert(&key, document) {
            inner.headers.release(handle, true);
            return Err(e);
        }

        Ok(MPtr {
            cid: self.id,
            key,
            rev: revision,
        })
    }

    pub fn update(
        &self,
        ticks: &TickGenerator,
        key: &str,
        document: &Value,
        expected_rev: Option<u64>,
        policy: ConflictPolicy,
        wait_for_sync: bool,
    ) -> Result<MPtr> {
        let mut inner = self.inner.write().unwrap();
        let handle = inner
            .headers
            .find(key)
            .filter(|h| !inner.headers.get(*h).is_tombstone())
            .ok_or_else(|| StorageError::DocumentNotFound(key.to_string()))?;

        let current_rev = inner.headers.get(handle).revision;
        if let Some(expected) = expected_rev {
            if expected != current_rev {
                match policy {
                    ConflictPolicy::Error => {
                        return Err(StorageError::Conflict {
                            key: key.to_string(),
                            expected,
                            found: current_rev,
                        })
                    }
                    ConflictPolicy::LastWrite => {}
                    ConflictPolicy::Illegal => {
                        return Err(StorageError::IllegalState(format!(
                            "ILLEGAL conflict policy reached for key '{key}'"
                        )))
                    }
                }
            }
        }

        let (old_fid, old_offset, old_marker_size) = {
            let h = inner.headers.get(handle);
            (h.fid, h.offset, h.marker_size)
        };
        let (_, old_shape_id, old_edge, old_shaped) = Self::read_document_at(&inner, old_fid, old_offset, old_marker_size)?;
        let old_value = inner.shaper.from_shaped(old_shape_id, &old_shaped)?;

        let attrs_before = inner.shaper.attribute_count();
        let shapes_before = inner.shaper.shape_count();
        let (shape_id, shaped_body) = inner.shaper.to_shaped(document)?;
        let marker_type = if old_edge.is_some() { MarkerType::Edge } else { MarkerType::Document };
        let body = encode_document_body(key, shape_id, &shaped_body, old_edge.as_ref());

        let force_sync = wait_for_sync || self.wait_for_sync;
        Self::persist_new_interning(&mut inner, &self.path, self.maximal_size, attrs_before, shapes_before, force_sync, ticks)?;
        let (fid, position, total_len) = Self::write_marker(&mut inner, &self.path, self.maximal_size, marker_type, &body, force_sync, ticks)?;
        let revision = {
            let set = DatafileSet::new(inner.journal.as_ref(), &inner.sealed);
            let marker_bytes = set.resolve(fid, position, total_len)?;
            MarkerHeader::from_bytes(marker_bytes)?.tick
        };

        let snapshot = inner.headers.snapshot(handle);
        {
            let h = inner.headers.get_mut(handle);
            h.fid = fid;
            h.offset = position;
            h.revision = revision;
            h.marker_size = align(total_len) as u64;
        }
        inner.headers.move_back(handle, snapshot);

        inner.indexes.on_update(key, &old_value, document)?;

        Ok(MPtr {
            cid: self.id,
            key: key.to_string(),
            rev: revision,
        })
    }

    pub fn remove(
        &self,
        ticks: &TickGenerator,
        key: &str,
        expected_rev: Option<u64>,
        policy: ConflictPolicy,
        wait_for_sync: bool,
    ) -> Result<MPtr> {
        let mut inner = self.inner.write().unwrap();
        let handle = inner
            .headers
            .find(key)
            .filter(|h| !inner.headers.get(*h).is_tombstone())
            .ok_or_else(|| StorageError::DocumentNotFound(key.to_string()))?;

        let current_rev = inner.headers.get(handle).revision;
        if let Some(expected) = expected_rev {
            if expected != current_rev {
                match policy {
                    ConflictPolicy::Error => {
                        return Err(StorageError::Conflict {
                            key: key.to_string(),
                            expected,
                            found: current_rev,
                        })
                    }
                    ConflictPolicy::LastWrite => {}
                    ConflictPolicy::Illegal => {
                        return Err(StorageError::IllegalState(format!(
                            "ILLEGAL conflict policy reached for key '{key}'"
                        )))
                    }
                }
            }
        }

        let (old_fid, old_offset, old_marker_size) = {
            let h = inner.headers.get(handle);
            (h.fid, h.offset, h.marker_size)
        };
        let (_, old_shape_id, _, old_shaped) = Self::read_document_at(&inner, old_fid, old_offset, old_marker_size)?;
        let old_value = inner.shaper.from_shaped(old_shape_id, &old_shaped)?;

        let body = encode_deletion_body(key);
        let force_sync = wait_for_sync || self.wait_for_sync;
        let (fid, position, total_len) = Self::write_marker(&mut inner, &self.path, self.maximal_size, MarkerType::Deletion, &body, force_sync, ticks)?;
        let revision = {
            let set = DatafileSet::new(inner.journal.as_ref(), &inner.sealed);
            let marker_bytes = set.resolve(fid, position, total_len)?;
            MarkerHeader::from_bytes(marker_bytes)?.tick
        };

        let snapshot = inner.headers.snapshot(handle);
        {
            let h = inner.headers.get_mut(handle);
            h.fid = fid;
            h.offset = position;
            h.revision = revision;
            h.marker_size = align(total_len) as u64;
            h.deletion_tick = revision;
        }
        inner.headers.move_back(handle, snapshot);

        inner.indexes.on_remove(key, &old_value)?;

        Ok(MPtr {
            cid: self.id,
            key: key.to_string(),
            rev: revision,
        })
    }

    pub fn read(&self, key: &str) -> Result<Value> {
        let inner = self.inner.read().unwrap();
        let handle = inner
            .headers
            .find(key)
            .filter(|h| !inner.headers.get(*h).is_tombstone())
            .ok_or_else(|| StorageError::DocumentNotFound(key.to_string()))?;
        self.decode_full_document(&inner, handle)
    }

    pub fn create_index(&self, kind: IndexKind, fields: Vec<String>, unique: bool, sparse: bool) -> Result<u64> {
        let mut inner = self.inner.write().unwrap();
        let mut docs_cache: Vec<(String, Value)> = Vec::new();
        for handle in inner.headers.iter().collect::<Vec<_>>() {
            if inner.headers.get(handle).is_tombstone() {
                continue;
            }
            let value = self.decode_full_document(&inner, handle)?;
            docs_cache.push((inner.headers.get(handle).key.clone(), value));
        }
        inner
            .indexes
            .create(kind, fields, unique, sparse, docs_cache.iter().map(|(k, v)| (k.as_str(), v)))
    }

    pub fn drop_index(&self, id: u64) -> bool {
        self.inner.write().unwrap().indexes.drop(id)
    }

    pub fn document_count(&self) -> usize {
        self.inner.read().unwrap().headers.count()
    }
}

struct ReplayVisitor<'a> {
    fid: u64,
    shaper: &'a mut Shaper,
    headers: &'a mut HeaderIndex,
    next_key: &'a mut u64,
    is_edge: bool,
}

impl<'a> MarkerVisitor for ReplayVisitor<'a> {
    fn visit(&mut self, offset: u64, header: &MarkerHeader, body: &[u8]) -> Result<bool> {
        match header.marker_type {
            MarkerType::AttributeName => {
                let (id, name) = decode_attribute_marker(body)?;
                self.shaper.register_attribute_name(id, name);
            }
            MarkerType::Shape => {
                let (id, shape) = decode_shape_marker(body)?;
                self.shaper.register_shape(id, shape);
            }
            MarkerType::Document | MarkerType::Edge => {
                let parsed = decode_document_body(body, self.is_edge)?;
                let handle = match self.headers.find(parsed.key) {
                    Some(h) => h,
                    None => self.headers.request(parsed.key, header.size as usize),
                };
                let snapshot = self.headers.snapshot(handle);
                {
                    let h = self.headers.get_mut(handle);
                    h.fid = self.fid;
                    h.offset = offset;
                    h.marker_size = header.size as u64;
                    h.revision = header.tick;
                    h.deletion_tick = 0;
                }
                self.headers.move_back(handle, snapshot);
                if let Ok(n) = parsed.key.parse::<u64>() {
                    *self.next_key = (*self.next_key).max(n + 1);
                }
            }
            MarkerType::Deletion => {
                let key = decode_deletion_body(body)?;
                if let Some(handle) = self.headers.find(key) {
                    let h = self.headers.get_mut(handle);
                    h.deletion_tick = header.tick;
                }
            }
            _ => {}
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn params(dir: &Path) -> CollectionParameters {
        CollectionParameters {
            cid: 1,
            name: "docs".to_string(),
            kind: CollectionKind::Document,
            wait_for_sync: false,
            maximal_size: 1 << 20,
        }
        .with_dir(dir)
    }

    trait WithDir {
        fn with_dir(self, _dir: &Path) -> Self;
    }
    impl WithDir for CollectionParameters {
        fn with_dir(self, _dir: &Path) -> Self {
            self
        }
    }

    #[test]
    fn insert_then_read_roundtrips() {
        let dir = tempdir().unwrap();
        let col = Collection::create(dir.path(), params(dir.path())).unwrap();
        let ticks = TickGenerator::new();
        let doc = json!({"a": 1, "b": "x"});
        let mptr = col.insert(&ticks, Some("k1".to_string()), &doc, true, None).unwrap();
        assert_eq!(mptr.key, "k1");

        let read_back = col.read("k1").unwrap();
        assert_eq!(read_back["a"], json!(1));
        assert_eq!(read_back["b"], json!("x"));
        assert_eq!(read_back["_key"], json!("k1"));
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let dir = tempdir().unwrap();
        let col = Collection::create(dir.path(), params(dir.path())).unwrap();
        let ticks = TickGenerator::new();
        col.insert(&ticks, Some("k1".to_string()), &json!({"a": 1}), true, None).unwrap();
        let err = col
            .insert(&ticks, Some("k1".to_string()), &json!({"a": 2}), true, None)
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateIdentifier(_)));
    }

    #[test]
    fn update_with_error_policy_reports_conflict() {
        let dir = tempdir().unwrap();
        let col = Collection::create(dir.path(), params(dir.path())).unwrap();
        let ticks = TickGenerator::new();
        let mptr = col.insert(&ticks, Some("k1".to_string()), &json!({"a": 1}), true, None).unwrap();

        let err = col
            .update(&ticks, "k1", &json!({"a": 2}), Some(mptr.rev - 1), ConflictPolicy::Error, true)
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));

        let updated = col
            .update(&ticks, "k1", &json!({"a": 2}), Some(mptr.rev - 1), ConflictPolicy::LastWrite, true)
            .unwrap();
        assert!(updated.rev > mptr.rev);
        let read_back = col.read("k1").unwrap();
        assert_eq!(read_back["a"], json!(2));
        assert!(read_back.get("b").is_none());
    }

    #[test]
    fn remove_leaves_a_tombstone_header() {
        let dir = tempdir().unwrap();
        let col = Collection::create(dir.path(), params(dir.path())).unwrap();
        let ticks = TickGenerator::new();
        col.insert(&ticks, Some("k1".to_string()), &json!({"a": 1}), true, None).unwrap();
        col.remove(&ticks, "k1", None, ConflictPolicy::Error, true).unwrap();
        let err = col.read("k1").unwrap_err();
        assert!(matches!(err, StorageError::DocumentNotFound(_)));
    }

    #[test]
    fn edge_insert_carries_from_to_fields() {
        let dir = tempdir().unwrap();
        let mut p = params(dir.path());
        p.kind = CollectionKind::Edge;
        p.name = "edges".to_string();
        let col = Collection::create(dir.path(), p).unwrap();
        let ticks = TickGenerator::new();
        let edge = EdgeFields {
            from_cid: 1,
            from_key: "k1".to_string(),
            to_cid: 1,
            to_key: "k2".to_string(),
        };
        col.insert(&ticks, Some("e1".to_string()), &json!({"w": 0.5}), true, Some(edge))
            .unwrap();
        let read_back = col.read("e1").unwrap();
        assert_eq!(read_back["_from"], json!("1/k1"));
        assert_eq!(read_back["_to"], json!("1/k2"));
        assert_eq!(read_back["w"], json!(0.5));
    }
}
