//! Table store with optimistic commit
//!
//! [`TableStore`] implements [`Storage`] using:
//! - `Arc<Tables>` snapshots handed to each transaction at `begin`
//! - a store-wide generation counter, bumped once per write commit
//! - an optional [`Wal`] written before the new tables become visible
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. take the table write lock
//! 2. compare the transaction's start generation with the store's
//! 3. IF different and the transaction wrote anything: TransactionConflict
//! 4. append { generation + 1, write set } to the WAL (DURABILITY POINT)
//! 5. apply the write set to the tables, bump the generation
//! ```
//!
//! Comparing whole-store generations makes every write commit serializable:
//! a transaction commits only if nothing else committed since it began.
//! Read-only transactions never conflict.

use crate::transaction::{Tables, Transaction, WriteSet};
use parking_lot::{Mutex, RwLock};
use periodo_core::error::{Error, Result};
use periodo_durability::{DurabilityMode, Wal};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Transactional row store
///
/// This is the only seam through which dataset state is read or changed.
pub trait Storage: Send + Sync {
    /// Start a transaction on the latest committed state
    fn begin(&self) -> Transaction;

    /// Commit a transaction, returning the store generation it produced
    ///
    /// # Errors
    ///
    /// `Error::TransactionConflict` if another write commit happened after
    /// `begin`; durability errors if the WAL append fails. In both cases
    /// nothing becomes visible.
    fn commit(&self, txn: Transaction) -> Result<u64>;

    /// Discard a transaction
    fn rollback(&self, txn: Transaction);
}

/// One WAL record: a committed write set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Generation after applying this record
    pub generation: u64,
    /// Rows written
    pub writes: WriteSet,
}

/// In-memory tables, optionally backed by a write-ahead log
#[derive(Debug)]
pub struct TableStore {
    tables: RwLock<Arc<Tables>>,
    wal: Option<Mutex<Wal>>,
}

impl TableStore {
    /// Store with no durability
    pub fn new() -> Self {
        TableStore {
            tables: RwLock::new(Arc::new(Tables::default())),
            wal: None,
        }
    }

    /// Open a WAL-backed store, replaying every committed record
    pub fn open(path: impl AsRef<Path>, mode: DurabilityMode) -> Result<Self> {
        let (wal, records) = Wal::open::<CommitRecord>(path.as_ref(), mode)?;
        let mut tables = Tables::default();
        for record in &records {
            if record.generation != tables.generation + 1 {
                return Err(Error::Corruption(format!(
                    "WAL record for generation {} follows generation {}",
                    record.generation, tables.generation
                )));
            }
            tables.apply(&record.writes);
        }
        tracing::info!(
            path = %path.as_ref().display(),
            generation = tables.generation,
            versions = tables.versions.len(),
            patch_requests = tables.patch_requests.len(),
            "Store recovered from WAL"
        );
        Ok(TableStore {
            tables: RwLock::new(Arc::new(tables)),
            wal: Some(Mutex::new(wal)),
        })
    }

    /// Number of write commits applied
    pub fn generation(&self) -> u64 {
        self.tables.read().generation
    }

    /// Whether commits are logged to disk
    pub fn is_durable(&self) -> bool {
        self.wal.is_some()
    }

    /// Force every logged commit to stable storage
    pub fn sync(&self) -> Result<()> {
        match &self.wal {
            Some(wal) => wal.lock().fsync(),
            None => Ok(()),
        }
    }

    /// Bytes of WAL on disk, 0 without durability
    pub fn wal_size(&self) -> u64 {
        self.wal.as_ref().map_or(0, |wal| wal.lock().size())
    }
}

impl Default for TableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for TableStore {
    fn begin(&self) -> Transaction {
        Transaction::new(Arc::clone(&*self.tables.read()))
    }

    fn commit(&self, txn: Transaction) -> Result<u64> {
        let mut guard = self.tables.write();
        let current = guard.generation;

        if txn.is_read_only() {
            return Ok(current);
        }
        if txn.start_generation() != current {
            tracing::warn!(
                started = txn.start_generation(),
                current,
                "Commit rejected: store advanced since transaction began"
            );
            return Err(Error::TransactionConflict {
                started: txn.start_generation(),
                current,
            });
        }

        let record = CommitRecord {
            generation: current + 1,
            writes: txn.into_writes(),
        };
        if let Some(wal) = &self.wal {
            wal.lock().append(&record)?;
        }

        Arc::make_mut(&mut *guard).apply(&record.writes);
        tracing::debug!(
            generation = record.generation,
            versions = record.writes.versions.len(),
            patch_requests = record.writes.patch_requests.len(),
            comments = record.writes.comments.len(),
            "Transaction committed"
        );
        Ok(record.generation)
    }

    fn rollback(&self, txn: Transaction) {
        tracing::debug!(
            started = txn.start_generation(),
            discarded_writes = !txn.is_read_only(),
            "Transaction rolled back"
        );
    }
}
