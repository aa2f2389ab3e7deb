//! Append-only, memory-mapped, CRC-checked marker log (§4.1, C1).
//!
//! A [`Datafile`] is a pre-allocated sparse file mapped into memory. Markers
//! are appended contiguously between the header marker and an optional
//! footer marker. Grounded on the teacher's `storage_v2::segment` mmap-open
//! path and `storage_v2::types` header/footer layout, generalized from an
//! immutable columnar segment into an append-in-place journal per
//! `original_source/arangod/VocBase/datafile.c`.

pub mod visitor;

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut};

use crate::error::{Result, StorageError};
use crate::marker::{align, compute_crc, MarkerHeader, MarkerType, BLOCK_ALIGNMENT, PREFIX_SIZE};
use crate::tick::TickGenerator;
use visitor::MarkerVisitor;

/// On-disk format version. `open` refuses anything else.
pub const DATAFILE_VERSION: u32 = 1;

/// Header-marker type-specific payload: version(4) + fid(8) + maximal_size(8).
const HEADER_FIELDS_SIZE: usize = 20;

/// A datafile is in exactly one of these states (§3 Datafile invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatafileState {
    WriteOpen,
    WriteError,
    Sealed,
    Corrupted,
    Closed,
}

enum Mapping {
    Writable(MmapMut),
    ReadOnly(Mmap),
}

impl Mapping {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Mapping::Writable(m) => &m[..],
            Mapping::ReadOnly(m) => &m[..],
        }
    }
}

/// Append-only marker log backed by a single memory-mapped file.
pub struct Datafile {
    path: PathBuf,
    file: File,
    mapping: Mapping,
    pub fid: u64,
    maximal_size: usize,
    /// Offset of the next free byte (the write cursor).
    current_size: usize,
    state: DatafileState,
    sealed: bool,
}

/// Space permanently reserved at the tail of every datafile for its footer.
fn footer_reserve() -> usize {
    align(PREFIX_SIZE)
}

impl Datafile {
    /// Create a new datafile, pre-allocated sparse to `maximal_size` (rounded
    /// up to [`BLOCK_ALIGNMENT`]), and write its header marker.
    pub fn create(path: &Path, maximal_size: usize, fid: u64, ticks: &TickGenerator) -> Result<Self> {
        let maximal_size = align(maximal_size.max(HEADER_FIELDS_SIZE + footer_reserve() + PREFIX_SIZE));

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.set_len(maximal_size as u64)?;
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };

        let header_size = align(PREFIX_SIZE + HEADER_FIELDS_SIZE);
        let tick = ticks.next();
        let header = MarkerHeader {
            size: header_size as u32,
            marker_type: MarkerType::DatafileHeader,
            crc: 0,
            tick,
        };
        let mut prefix_bytes = Vec::with_capacity(PREFIX_SIZE);
        header.write_to(&mut prefix_bytes)?;

        let mut fields = Vec::with_capacity(HEADER_FIELDS_SIZE);
        fields.extend_from_slice(&DATAFILE_VERSION.to_ne_bytes());
        fields.extend_from_slice(&fid.to_ne_bytes());
        fields.extend_from_slice(&(maximal_size as u64).to_ne_bytes());

        let crc = compute_crc(&prefix_bytes, &fields);
        let header = MarkerHeader { crc, ..header };
        let mut final_bytes = Vec::with_capacity(header_size);
        header.write_to(&mut final_bytes)?;
        final_bytes.extend_from_slice(&fields);
        final_bytes.resize(header_size, 0);

        mmap[0..header_size].copy_from_slice(&final_bytes);
        mmap.flush_range(0, header_size)?;

        tracing::info!(fid, path = %path.display(), "created datafile");

        Ok(Datafile {
            path: path.to_path_buf(),
            file,
            mapping: Mapping::Writable(mmap),
            fid,
            maximal_size,
            current_size: header_size,
            state: DatafileState::WriteOpen,
            sealed: false,
        })
    }

    /// Open an existing datafile. Maps read-only if a footer marker is
    /// present, read-write otherwise. Updates `ticks` from every marker's
    /// tick as part of recovery.
    pub fn open(path: &Path, ticks: &TickGenerator) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len() as usize;

        let mmap = unsafe { Mmap::map(&file)? };
        if mmap.len() < align(PREFIX_SIZE + HEADER_FIELDS_SIZE) {
            return Err(StorageError::CorruptedDatafile {
                offset: 0,
                reason: "file too small to contain a header marker".into(),
            });
        }

        let header = MarkerHeader::from_bytes(&mmap[..])?;
        if !matches!(header.marker_type, MarkerType::DatafileHeader) {
            return Err(StorageError::CorruptedDatafile {
                offset: 0,
                reason: "first marker is not a datafile header".into(),
            });
        }
        let fields = &mmap[PREFIX_SIZE..PREFIX_SIZE + HEADER_FIELDS_SIZE];
        let version = u32::from_ne_bytes(fields[0..4].try_into().unwrap());
        if version != DATAFILE_VERSION {
            return Err(StorageError::UnsupportedVersion(version));
        }
        let fid = u64::from_ne_bytes(fields[4..12].try_into().unwrap());
        ticks.update(header.tick);

        let sealed = has_footer(&mmap, len)?;

        let mut datafile = if sealed {
            Datafile {
                path: path.to_path_buf(),
                file,
                mapping: Mapping::ReadOnly(mmap),
                fid,
                maximal_size: len,
                current_size: len,
                state: DatafileState::Sealed,
                sealed: true,
            }
        } else {
            drop(mmap);
            let mmap = unsafe { MmapMut::map_mut(&file)? };
            Datafile {
                path: path.to_path_buf(),
                file,
                mapping: Mapping::Writable(mmap),
                fid,
                maximal_size: len,
                current_size: align(PREFIX_SIZE + HEADER_FIELDS_SIZE),
                state: DatafileState::WriteOpen,
                sealed: false,
            }
        };

        if !datafile.sealed {
            let mut scan = visitor::CountingVisitor::default();
            scan.last_tick = header.tick;
            match datafile.iterate(&mut scan, true) {
                Ok(()) => {
                    ticks.update(scan.last_tick);
                }
                Err(StorageError::CorruptedDatafile { offset, reason }) => {
                    tracing::warn!(fid, offset, %reason, "truncating corrupted datafile at recovery");
                    datafile.truncate(offset as usize)?;
                }
                Err(e) => return Err(e),
            }
            datafile.current_size = scan_cursor(&datafile)?;
        }

        Ok(datafile)
    }

    /// Reserve `body_len` bytes of marker body. Returns the aligned byte
    /// position the caller should write the whole marker at, or
    /// `DatafileFull` without moving the cursor if there is no room.
    pub fn reserve(&mut self, total_len: usize) -> Result<u64> {
        if self.state != DatafileState::WriteOpen {
            return Err(StorageError::DatafileWriteError(
                self.path.display().to_string(),
            ));
        }
        let needed = align(total_len);
        let available = self.maximal_size.saturating_sub(self.current_size + footer_reserve());
        if needed > available {
            return Err(StorageError::DatafileFull);
        }
        let position = self.current_size as u64;
        self.current_size += needed;
        Ok(position)
    }

    /// Write a fully-formed marker (prefix already stamped with crc/tick) at
    /// `position`. `force_sync` triggers an `msync` over the written range.
    pub fn write(
        &mut self,
        position: u64,
        header_bytes: &[u8],
        body_bytes: &[u8],
        force_sync: bool,
    ) -> Result<()> {
        let mmap = match &mut self.mapping {
            Mapping::Writable(m) => m,
            Mapping::ReadOnly(_) => {
                return Err(StorageError::DatafileWriteError(
                    self.path.display().to_string(),
                ))
            }
        };
        let pos = position as usize;
        let total = header_bytes.len() + body_bytes.len();
        mmap[pos..pos + header_bytes.len()].copy_from_slice(header_bytes);
        mmap[pos + header_bytes.len()..pos + total].copy_from_slice(body_bytes);

        if force_sync {
            mmap.flush_range(pos, align(total)).map_err(|e| {
                if e.raw_os_error() == Some(libc_enospc()) {
                    StorageError::FilesystemFull
                } else {
                    StorageError::Io(e)
                }
            })?;
        }
        Ok(())
    }

    /// Walk markers in order, stopping at the first zero-size marker unless
    /// `journal` is set, in which case the still-open tail is considered
    /// live and scanned to the write cursor.
    pub fn iterate(&self, visitor: &mut dyn MarkerVisitor, journal: bool) -> Result<()> {
        let bytes = self.mapping.as_bytes();
        let limit = if journal { bytes.len() } else { self.current_size };
        let mut offset = 0usize;

        while offset + PREFIX_SIZE <= limit {
            let prefix = &bytes[offset..offset + PREFIX_SIZE];
            let size = u32::from_ne_bytes(prefix[0..4].try_into().unwrap());
            if size == 0 {
                break;
            }
            let header = match MarkerHeader::from_bytes(prefix) {
                Ok(h) => h,
                Err(_) => {
                    return Err(StorageError::CorruptedDatafile {
                        offset: offset as u64,
                        reason: "unreadable marker header".into(),
                    })
                }
            };
            let size = size as usize;
            if offset + size > limit {
                return Err(StorageError::CorruptedDatafile {
                    offset: offset as u64,
                    reason: "marker extends past end of written data".into(),
                });
            }
            let body = &bytes[offset + PREFIX_SIZE..offset + size];
            let expected_crc = compute_crc(prefix, body);
            if expected_crc != header.crc {
                return Err(StorageError::CorruptedDatafile {
                    offset: offset as u64,
                    reason: "CRC mismatch".into(),
                });
            }
            if !visitor.visit(offset as u64, &header, body)? {
                break;
            }
            offset += size;
        }
        Ok(())
    }

    /// Write the footer marker, sync, switch to read-only, and truncate any
    /// unused tail.
    pub fn seal(&mut self, ticks: &TickGenerator) -> Result<()> {
        let footer_len = align(PREFIX_SIZE);
        let position = self.reserve(footer_len).map_err(|_| StorageError::DatafileFull)?;

        let header = MarkerHeader {
            size: footer_len as u32,
            marker_type: MarkerType::DatafileFooter,
            crc: 0,
            tick: ticks.next(),
        };
        let mut prefix_bytes = Vec::with_capacity(PREFIX_SIZE);
        header.write_to(&mut prefix_bytes)?;
        // The crc covers the full aligned region after the prefix, padding
        // included, since `iterate` recomputes it over that same slice.
        let padded_body = vec![0u8; footer_len - PREFIX_SIZE];
        let crc = compute_crc(&prefix_bytes, &padded_body);
        let header = MarkerHeader { crc, ..header };
        let mut final_bytes = Vec::with_capacity(footer_len);
        header.write_to(&mut final_bytes)?;
        final_bytes.extend_from_slice(&padded_body);

        self.write(position, &final_bytes, &[], true)?;

        let current_size = self.current_size;
        match &mut self.mapping {
            Mapping::Writable(m) => m.flush()?,
            Mapping::ReadOnly(_) => {}
        }
        self.file.set_len(current_size as u64)?;
        self.maximal_size = current_size;

        let mmap = unsafe { Mmap::map(&self.file)? };
        self.mapping = Mapping::ReadOnly(mmap);
        self.state = DatafileState::Sealed;
        self.sealed = true;

        tracing::info!(fid = self.fid, size = current_size, "sealed datafile");
        Ok(())
    }

    /// Rewrite this datafile keeping only `[0, at)`, renaming the original
    /// aside as `<name>.corrupted`, then seal the replacement. Used by
    /// startup recovery after a CRC mismatch.
    pub fn truncate(&mut self, at: usize) -> Result<()> {
        let bytes = self.mapping.as_bytes()[..at].to_vec();

        let new_path = self.path.with_extension("new");
        let corrupted_path = self.path.with_extension("corrupted");

        let maximal_size = align(at + footer_reserve());
        let new_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&new_path)?;
        new_file.set_len(maximal_size as u64)?;
        {
            let mut mmap = unsafe { MmapMut::map_mut(&new_file)? };
            mmap[..bytes.len()].copy_from_slice(&bytes);
            mmap.flush()?;
        }
        drop(new_file);

        std::fs::rename(&self.path, &corrupted_path)?;
        std::fs::rename(&new_path, &self.path)?;

        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        self.file = file;
        self.mapping = Mapping::Writable(mmap);
        self.maximal_size = maximal_size;
        self.current_size = at;
        self.state = DatafileState::WriteOpen;
        self.sealed = false;
        Ok(())
    }

    pub fn state(&self) -> DatafileState {
        self.state
    }

    pub fn current_size(&self) -> usize {
        self.current_size
    }

    pub fn maximal_size(&self) -> usize {
        self.maximal_size
    }

    pub fn mark_write_error(&mut self) {
        self.state = DatafileState::WriteError;
    }

    /// Flush a previously-written byte range without writing anything new.
    /// Used by the WAL sync thread to perform one `msync` over a group of
    /// slots already copied into the mapping by their writers.
    pub fn sync_range(&self, offset: usize, len: usize) -> Result<()> {
        match &self.mapping {
            Mapping::Writable(m) => m.flush_range(offset, align(len)).map_err(|e| {
                if e.raw_os_error() == Some(libc_enospc()) {
                    StorageError::FilesystemFull
                } else {
                    StorageError::Io(e)
                }
            }),
            Mapping::ReadOnly(_) => Ok(()),
        }
    }

    /// Raw bytes of the mapping, for resolving `(fid, offset)` header
    /// references into live data (§9 Design Notes: `DatafileSet` façade).
    pub(crate) fn bytes(&self) -> &[u8] {
        self.mapping.as_bytes()
    }
}

/// Whether the tail of the file (last aligned-footer-sized block before
/// `len`) already holds a valid footer marker.
fn has_footer(mmap: &Mmap, len: usize) -> Result<bool> {
    let footer_len = align(PREFIX_SIZE);
    if len < footer_len {
        return Ok(false);
    }
    // Scan backwards from the logical end looking for the footer; sparse
    // files may have zeroed trailing pages, so an exact offset isn't known
    // without a full scan. Datafiles always call `seal` immediately after
    // writing the footer and truncate to size, so the footer is always the
    // last `footer_len` bytes of a sealed file.
    let tail = &mmap[len - footer_len..len];
    if tail.len() < PREFIX_SIZE {
        return Ok(false);
    }
    match MarkerHeader::from_bytes(tail) {
        Ok(h) => Ok(matches!(h.marker_type, MarkerType::DatafileFooter)),
        Err(_) => Ok(false),
    }
}

fn scan_cursor(datafile: &Datafile) -> Result<usize> {
    struct CursorVisitor {
        end: usize,
    }
    impl MarkerVisitor for CursorVisitor {
        fn visit(&mut self, _offset: u64, header: &MarkerHeader, _body: &[u8]) -> Result<bool> {
            self.end += header.size as usize;
            Ok(true)
        }
    }
    let mut v = CursorVisitor { end: 0 };
    datafile.iterate(&mut v, true)?;
    Ok(v.end)
}

fn libc_enospc() -> i32 {
    // ENOSPC is 28 on Linux and every other platform this crate targets.
    28
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_then_reserve_and_write_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal-1.db");
        let ticks = TickGenerator::new();
        let mut df = Datafile::create(&path, 4096, 1, &ticks).unwrap();

        let body = b"hello world";
        let total = align(PREFIX_SIZE + body.len());
        let position = df.reserve(total).unwrap();
        let mut padded_body = body.to_vec();
        padded_body.resize(total - PREFIX_SIZE, 0);

        let header = MarkerHeader {
            size: total as u32,
            marker_type: MarkerType::Document,
            crc: 0,
            tick: ticks.next(),
        };
        let mut prefix = Vec::new();
        header.write_to(&mut prefix).unwrap();
        let crc = compute_crc(&prefix, &padded_body);
        let header = MarkerHeader { crc, ..header };
        let mut bytes = Vec::new();
        header.write_to(&mut bytes).unwrap();

        df.write(position, &bytes, &padded_body, true).unwrap();

        let mut visitor = visitor::CountingVisitor::default();
        df.iterate(&mut visitor, true).unwrap();
        assert_eq!(visitor.counts.get(&(MarkerType::Document as u32)), Some(&1));
    }

    #[test]
    fn reserve_fails_without_moving_cursor_when_full() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal-2.db");
        let ticks = TickGenerator::new();
        let mut df = Datafile::create(&path, 128, 1, &ticks).unwrap();
        let before = df.current_size();
        let err = df.reserve(1_000_000).unwrap_err();
        assert!(matches!(err, StorageError::DatafileFull));
        assert_eq!(df.current_size(), before);
    }

    #[test]
    fn seal_makes_datafile_read_only_and_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal-3.db");
        let ticks = TickGenerator::new();
        let mut df = Datafile::create(&path, 4096, 1, &ticks).unwrap();
        df.seal(&ticks).unwrap();
        assert_eq!(df.state(), DatafileState::Sealed);
        assert_eq!(std::fs::metadata(&path).unwrap().len() as usize, df.current_size());
    }
}
