//! Non-owning view over a collection's datafiles (§9 Design Notes:
//! `(fid, offset)` header references resolved through a `DatafileSet`
//! façade rather than raw pointers).

use crate::datafile::Datafile;
use crate::error::{Result, StorageError};

pub struct DatafileSet<'a> {
    journal: Option<&'a Datafile>,
    sealed: &'a [Datafile],
}

impl<'a> DatafileSet<'a> {
    pub fn new(journal: Option<&'a Datafile>, sealed: &'a [Datafile]) -> Self {
        DatafileSet { journal, sealed }
    }

    fn find(&self, fid: u64) -> Option<&'a Datafile> {
        if let Some(j) = self.journal {
            if j.fid == fid {
                return Some(j);
            }
        }
        self.sealed.iter().find(|d| d.fid == fid)
    }

    /// Resolve a `(fid, offset, len)` header reference to its bytes. Only
    /// valid while the datafile set this was built from is still live.
    pub fn resolve(&self, fid: u64, offset: u64, len: usize) -> Result<&'a [u8]> {
        let df = self
            .find(fid)
            .ok_or_else(|| StorageError::IllegalState(format!("datafile {fid} is not mapped")))?;
        let start = offset as usize;
        let bytes = df.bytes();
        if start + len > bytes.len() {
            return Err(StorageError::CorruptedDatafile {
                offset: offset,
                reason: "header reference extends past datafile end".into(),
            });
        }
        Ok(&bytes[start..start + len])
    }
}
