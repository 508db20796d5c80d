//! Version store
//!
//! The append-only sequence of dataset snapshots. "Current" is always the
//! highest version id in the transaction's view; nothing caches it.

use crate::description::describe;
use periodo_core::{Dataset, NotFoundError, Result, Timestamp, VersionId};
use periodo_storage::{Transaction, VersionRow};
use std::sync::Arc;

/// Highest-numbered version
///
/// # Errors
///
/// `NotFoundError::NoVersions` before the initial load.
pub fn current(txn: &Transaction) -> Result<Arc<VersionRow>> {
    txn.current_version()
        .ok_or_else(|| NotFoundError::NoVersions.into())
}

/// Version by id
pub fn at(txn: &Transaction, id: VersionId) -> Result<Arc<VersionRow>> {
    txn.version(id)
        .ok_or_else(|| NotFoundError::Version(id).into())
}

/// Append `data` as the next version, computing and storing its description
pub fn append(txn: &mut Transaction, data: Dataset, created_at: Timestamp) -> VersionId {
    let description = describe(&data, created_at);
    let id = txn.append_version(data, description, created_at);
    tracing::info!(version = %id, "Version appended");
    id
}
