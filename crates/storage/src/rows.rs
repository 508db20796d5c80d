//! Persisted row types
//!
//! Three logical tables:
//! - `versions`: immutable dataset snapshots keyed by increasing integer id
//! - `patch_requests`: the reviewable unit, keyed by increasing integer id
//! - `comments`: append-only remarks referencing a patch request

use periodo_core::{CommentId, Dataset, PatchRequestId, Timestamp, VersionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// One immutable snapshot of the whole dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRow {
    /// Position in the version sequence
    pub id: VersionId,
    /// Full dataset document
    pub data: Dataset,
    /// Derived description, computed once at append time
    pub description: Value,
    /// When the version was appended
    pub created_at: Timestamp,
}

/// Lifecycle state derived from the open/merged flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    /// Awaiting review; may be updated
    Open,
    /// Applied; produced a version
    Merged,
    /// Closed without merging
    Rejected,
}

/// A proposed change and its review outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchRequestRow {
    /// Request id
    pub id: PatchRequestId,
    /// Submitter identity
    pub created_by: String,
    /// Identity of the last update
    pub updated_by: String,
    /// Submission time
    pub created_at: Timestamp,
    /// Last update time
    pub updated_at: Timestamp,
    /// Version current at submission
    pub created_from: VersionId,
    /// Current patch text; after merge, the resolved patch that was applied
    pub text: String,
    /// Existing entities the patch modifies
    pub updated_entities: BTreeSet<String>,
    /// Existing entities the patch deletes
    pub removed_entities: BTreeSet<String>,
    /// Whether the request still accepts transitions
    pub open: bool,
    /// Whether the request was merged
    pub merged: bool,
    /// Merger identity
    pub merged_by: Option<String>,
    /// Merge time
    pub merged_at: Option<Timestamp>,
    /// Version the patch was applied to
    pub applied_to: Option<VersionId>,
    /// Version the merge produced
    pub resulted_in: Option<VersionId>,
    /// Identifiers minted for new entities at merge
    pub created_entities: BTreeSet<String>,
    /// Skolem reference to permanent identifier
    pub identifier_map: BTreeMap<String, String>,
    /// Rejecting identity
    pub rejected_by: Option<String>,
    /// Rejection time
    pub rejected_at: Option<Timestamp>,
}

impl PatchRequestRow {
    /// A freshly submitted, open request
    pub fn new(
        id: PatchRequestId,
        actor: &str,
        created_from: VersionId,
        text: String,
        now: Timestamp,
    ) -> Self {
        PatchRequestRow {
            id,
            created_by: actor.to_string(),
            updated_by: actor.to_string(),
            created_at: now,
            updated_at: now,
            created_from,
            text,
            updated_entities: BTreeSet::new(),
            removed_entities: BTreeSet::new(),
            open: true,
            merged: false,
            merged_by: None,
            merged_at: None,
            applied_to: None,
            resulted_in: None,
            created_entities: BTreeSet::new(),
            identifier_map: BTreeMap::new(),
            rejected_by: None,
            rejected_at: None,
        }
    }

    /// Lifecycle state
    pub fn state(&self) -> RequestState {
        match (self.open, self.merged) {
            (_, true) => RequestState::Merged,
            (true, false) => RequestState::Open,
            (false, false) => RequestState::Rejected,
        }
    }

    /// Whether update, merge and reject are still allowed
    pub fn is_pending(&self) -> bool {
        self.open && !self.merged
    }
}

/// A remark on a patch request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRow {
    /// Comment id
    pub id: CommentId,
    /// Request commented on
    pub patch_request: PatchRequestId,
    /// Author identity
    pub author: String,
    /// Posting time
    pub posted_at: Timestamp,
    /// Comment body
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_states() {
        let mut row = PatchRequestRow::new(
            PatchRequestId::new(1),
            "orcid:a",
            VersionId::new(0),
            "[]".into(),
            chrono::Utc::now(),
        );
        assert_eq!(row.state(), RequestState::Open);
        assert!(row.is_pending());

        row.open = false;
        assert_eq!(row.state(), RequestState::Rejected);
        assert!(!row.is_pending());

        row.merged = true;
        assert_eq!(row.state(), RequestState::Merged);
    }
}
