//! Snapshot transactions
//!
//! A [`Transaction`] reads from the committed [`Tables`] it started on and
//! buffers its own writes in a [`WriteSet`]. Reads see the write set layered
//! over the snapshot. Nothing is visible to other transactions until the
//! store commits the write set; see [`crate::store::Storage::commit`].
//!
//! Row ids are assigned inside the transaction as "current maximum + 1", so
//! a transaction that loses the commit race never leaves a gap.

use crate::rows::{CommentRow, PatchRequestRow, VersionRow};
use periodo_core::{CommentId, Dataset, PatchRequestId, Timestamp, VersionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Committed table contents at one store generation
#[derive(Debug, Clone, Default)]
pub struct Tables {
    /// Number of write commits applied so far
    pub generation: u64,
    /// `versions` table
    pub versions: BTreeMap<VersionId, Arc<VersionRow>>,
    /// `patch_requests` table
    pub patch_requests: BTreeMap<PatchRequestId, PatchRequestRow>,
    /// `comments` table
    pub comments: BTreeMap<CommentId, CommentRow>,
}

impl Tables {
    /// Apply a committed write set and advance the generation
    pub fn apply(&mut self, writes: &WriteSet) {
        for (id, row) in &writes.versions {
            self.versions.insert(*id, Arc::clone(row));
        }
        for (id, row) in &writes.patch_requests {
            self.patch_requests.insert(*id, row.clone());
        }
        for (id, row) in &writes.comments {
            self.comments.insert(*id, row.clone());
        }
        self.generation += 1;
    }
}

/// Rows written by one transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteSet {
    /// Appended versions
    pub versions: BTreeMap<VersionId, Arc<VersionRow>>,
    /// Inserted or replaced patch requests
    pub patch_requests: BTreeMap<PatchRequestId, PatchRequestRow>,
    /// Inserted comments
    pub comments: BTreeMap<CommentId, CommentRow>,
}

impl WriteSet {
    /// Whether nothing was written
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty() && self.patch_requests.is_empty() && self.comments.is_empty()
    }
}

/// A unit of work against the store
#[derive(Debug)]
pub struct Transaction {
    snapshot: Arc<Tables>,
    writes: WriteSet,
}

impl Transaction {
    pub(crate) fn new(snapshot: Arc<Tables>) -> Self {
        Transaction {
            snapshot,
            writes: WriteSet::default(),
        }
    }

    /// Store generation this transaction started at
    pub fn start_generation(&self) -> u64 {
        self.snapshot.generation
    }

    /// Whether the transaction has buffered no writes
    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }

    /// Buffered writes
    pub fn writes(&self) -> &WriteSet {
        &self.writes
    }

    pub(crate) fn into_writes(self) -> WriteSet {
        self.writes
    }

    // =========================================================================
    // versions
    // =========================================================================

    /// Highest-numbered version, `None` if the store is empty
    pub fn current_version(&self) -> Option<Arc<VersionRow>> {
        let written = self.writes.versions.values().next_back();
        let committed = self.snapshot.versions.values().next_back();
        match (written, committed) {
            (Some(w), Some(c)) => Some(Arc::clone(if w.id > c.id { w } else { c })),
            (Some(row), None) | (None, Some(row)) => Some(Arc::clone(row)),
            (None, None) => None,
        }
    }

    /// Version by id
    pub fn version(&self, id: VersionId) -> Option<Arc<VersionRow>> {
        self.writes
            .versions
            .get(&id)
            .or_else(|| self.snapshot.versions.get(&id))
            .cloned()
    }

    /// Every version in id order
    pub fn versions(&self) -> Vec<Arc<VersionRow>> {
        let mut all: BTreeMap<VersionId, Arc<VersionRow>> = self.snapshot.versions.clone();
        all.extend(self.writes.versions.iter().map(|(k, v)| (*k, Arc::clone(v))));
        all.into_values().collect()
    }

    /// Append a snapshot as the next version (0 for an empty store)
    pub fn append_version(
        &mut self,
        data: Dataset,
        description: Value,
        created_at: Timestamp,
    ) -> VersionId {
        let id = self
            .current_version()
            .map(|v| v.id.next())
            .unwrap_or(VersionId::new(0));
        let row = VersionRow {
            id,
            data,
            description,
            created_at,
        };
        self.writes.versions.insert(id, Arc::new(row));
        id
    }

    // =========================================================================
    // patch_requests
    // =========================================================================

    /// Patch request by id
    pub fn patch_request(&self, id: PatchRequestId) -> Option<&PatchRequestRow> {
        self.writes
            .patch_requests
            .get(&id)
            .or_else(|| self.snapshot.patch_requests.get(&id))
    }

    /// Every patch request in id order
    pub fn patch_requests(&self) -> Vec<&PatchRequestRow> {
        let mut all: BTreeMap<PatchRequestId, &PatchRequestRow> =
            self.snapshot.patch_requests.iter().map(|(k, v)| (*k, v)).collect();
        all.extend(self.writes.patch_requests.iter().map(|(k, v)| (*k, v)));
        all.into_values().collect()
    }

    /// Id the next inserted patch request will get
    pub fn next_patch_request_id(&self) -> PatchRequestId {
        let written = self.writes.patch_requests.keys().next_back();
        let committed = self.snapshot.patch_requests.keys().next_back();
        written
            .into_iter()
            .chain(committed)
            .max()
            .map(|id| id.next())
            .unwrap_or(PatchRequestId::new(1))
    }

    /// Insert or replace a patch request row
    pub fn put_patch_request(&mut self, row: PatchRequestRow) {
        self.writes.patch_requests.insert(row.id, row);
    }

    // =========================================================================
    // comments
    // =========================================================================

    /// Comments on a request in posting order
    pub fn comments_for(&self, patch_request: PatchRequestId) -> Vec<&CommentRow> {
        let mut all: BTreeMap<CommentId, &CommentRow> = self
            .snapshot
            .comments
            .iter()
            .filter(|(_, c)| c.patch_request == patch_request)
            .map(|(k, v)| (*k, v))
            .collect();
        all.extend(
            self.writes
                .comments
                .iter()
                .filter(|(_, c)| c.patch_request == patch_request)
                .map(|(k, v)| (*k, v)),
        );
        all.into_values().collect()
    }

    /// Append a comment
    pub fn insert_comment(
        &mut self,
        patch_request: PatchRequestId,
        author: &str,
        message: &str,
        posted_at: Timestamp,
    ) -> CommentId {
        let written = self.writes.comments.keys().next_back();
        let committed = self.snapshot.comments.keys().next_back();
        let id = written
            .into_iter()
            .chain(committed)
            .max()
            .map(|id| id.next())
            .unwrap_or(CommentId::new(1));
        self.writes.comments.insert(
            id,
            CommentRow {
                id,
                patch_request,
                author: author.to_string(),
                posted_at,
                message: message.to_string(),
            },
        );
        id
    }

    // =========================================================================
    // identifier registries
    // =========================================================================

    /// Every identifier present in the current version
    pub fn all_identifiers_in_use(&self) -> BTreeSet<String> {
        self.current_version()
            .map(|v| v.data.identifiers())
            .unwrap_or_default()
    }

    /// Every identifier removed by a merged patch request
    pub fn removed_entity_ids(&self) -> BTreeSet<String> {
        self.patch_requests()
            .into_iter()
            .filter(|r| r.merged)
            .flat_map(|r| r.removed_entities.iter().cloned())
            .collect()
    }
}
