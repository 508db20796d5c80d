//! Write-ahead log of committed transactions
//!
//! The WAL is a single append-only file. Every committed write set is
//! appended (and, depending on [`DurabilityMode`], fsynced) before it becomes
//! visible to readers. On open the log is replayed from the beginning.
//!
//! ## Recovery rules
//!
//! - A record cut short at the end of the file is a torn write from a crash;
//!   it is truncated away with a warning.
//! - A CRC mismatch anywhere is corruption and fails the open.
//! - An append whose write, flush or sync fails is cut back off the file
//!   before the error is returned, so a commit the caller saw fail is never
//!   replayed. If that cut itself fails the log refuses further appends.

use crate::encoding::{decode_record, encode_record, Decoded};
use periodo_core::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// When appended records reach stable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// Flush to the OS after every commit; fsync left to the OS
    #[default]
    Standard,
    /// fsync after every commit, zero data loss
    Always,
}

/// Append-only record log
#[derive(Debug)]
pub struct Wal {
    path: PathBuf,
    file: File,
    mode: DurabilityMode,
    size: u64,
    /// Set when a failed append could not be rolled back
    poisoned: bool,
    #[cfg(test)]
    fail_after: Option<usize>,
}

impl Wal {
    /// Open an existing WAL or create a new one
    ///
    /// Returns the log together with every record it already holds, in
    /// append order.
    pub fn open<T: DeserializeOwned>(
        path: impl AsRef<Path>,
        mode: DurabilityMode,
    ) -> Result<(Self, Vec<T>)> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let bytes = std::fs::read(&path)?;
        let mut records = Vec::new();
        let mut offset = 0usize;
        while offset < bytes.len() {
            match decode_record::<T>(&bytes[offset..], offset as u64)? {
                Decoded::Record(record, consumed) => {
                    records.push(record);
                    offset += consumed;
                }
                Decoded::Incomplete => {
                    tracing::warn!(
                        path = %path.display(),
                        offset,
                        dropped_bytes = bytes.len() - offset,
                        "Truncating torn record at WAL tail"
                    );
                    file.set_len(offset as u64)?;
                    file.sync_all()?;
                    break;
                }
            }
        }

        tracing::debug!(path = %path.display(), records = records.len(), "WAL replayed");
        let wal = Wal {
            path,
            file,
            mode,
            size: offset as u64,
            poisoned: false,
            #[cfg(test)]
            fail_after: None,
        };
        Ok((wal, records))
    }

    /// Append one record; durable per the configured mode on return
    ///
    /// On error nothing of the record remains in the file and `size` is
    /// unchanged.
    pub fn append<T: Serialize>(&mut self, record: &T) -> Result<u64> {
        if self.poisoned {
            return Err(Error::Storage(format!(
                "WAL {} holds an unacknowledged record and accepts no appends",
                self.path.display()
            )));
        }
        let bytes = encode_record(record)?;
        let offset = self.size;
        if let Err(e) = self.write_record(&bytes) {
            tracing::error!(path = %self.path.display(), offset, error = %e, "WAL append failed");
            if let Err(cut) = self.file.set_len(offset) {
                tracing::error!(path = %self.path.display(), offset, error = %cut, "WAL rollback failed");
                self.poisoned = true;
            }
            return Err(Error::Io(e));
        }
        self.size += bytes.len() as u64;
        Ok(offset)
    }

    fn write_record(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        #[cfg(test)]
        if let Some(limit) = self.fail_after {
            self.file.write_all(&bytes[..limit.min(bytes.len())])?;
            self.file.flush()?;
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "injected write failure"));
        }
        self.file.write_all(bytes)?;
        self.file.flush()?;
        if self.mode == DurabilityMode::Always {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Force buffered records to disk
    pub fn fsync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Current file size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// File location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configured durability mode
    pub fn mode(&self) -> DurabilityMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Commit {
        generation: u64,
        note: String,
    }

    fn commit(generation: u64) -> Commit {
        Commit {
            generation,
            note: format!("commit {}", generation),
        }
    }

    #[test]
    fn test_new_wal_is_empty() {
        let dir = TempDir::new().unwrap();
        let (wal, records) = Wal::open::<Commit>(dir.path().join("x.wal"), DurabilityMode::Always).unwrap();
        assert!(records.is_empty());
        assert_eq!(wal.size(), 0);
    }

    #[test]
    fn test_append_then_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.wal");
        {
            let (mut wal, _) = Wal::open::<Commit>(&path, DurabilityMode::Standard).unwrap();
            assert_eq!(wal.append(&commit(1)).unwrap(), 0);
            let second = wal.append(&commit(2)).unwrap();
            assert!(second > 0);
        }
        let (wal, records) = Wal::open::<Commit>(&path, DurabilityMode::Standard).unwrap();
        assert_eq!(records, vec![commit(1), commit(2)]);
        assert_eq!(wal.size(), std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.wal");
        {
            let (mut wal, _) = Wal::open::<Commit>(&path, DurabilityMode::Always).unwrap();
            wal.append(&commit(1)).unwrap();
            wal.append(&commit(2)).unwrap();
        }
        let full = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full - 3).unwrap();
        drop(file);

        let (mut wal, records) = Wal::open::<Commit>(&path, DurabilityMode::Always).unwrap();
        assert_eq!(records, vec![commit(1)]);

        wal.append(&commit(3)).unwrap();
        drop(wal);
        let (_, records) = Wal::open::<Commit>(&path, DurabilityMode::Always).unwrap();
        assert_eq!(records, vec![commit(1), commit(3)]);
    }

    #[test]
    fn test_failed_append_leaves_no_trace() {
        // A partial write, then a complete write whose sync fails
        for fail_after in [5, usize::MAX] {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("x.wal");
            let (mut wal, _) = Wal::open::<Commit>(&path, DurabilityMode::Always).unwrap();
            wal.append(&commit(1)).unwrap();
            let size = wal.size();

            wal.fail_after = Some(fail_after);
            let err = wal.append(&commit(2)).unwrap_err();
            assert!(matches!(err, Error::Io(_)));
            assert_eq!(wal.size(), size);
            assert_eq!(std::fs::metadata(&path).unwrap().len(), size);

            wal.fail_after = None;
            assert_eq!(wal.append(&commit(3)).unwrap(), size);
            drop(wal);

            let (_, records) = Wal::open::<Commit>(&path, DurabilityMode::Always).unwrap();
            assert_eq!(records, vec![commit(1), commit(3)]);
        }
    }

    #[test]
    fn test_corruption_fails_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.wal");
        {
            let (mut wal, _) = Wal::open::<Commit>(&path, DurabilityMode::Always).unwrap();
            wal.append(&commit(1)).unwrap();
            wal.append(&commit(2)).unwrap();
        }
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[6] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        let err = Wal::open::<Commit>(&path, DurabilityMode::Always).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }
}
