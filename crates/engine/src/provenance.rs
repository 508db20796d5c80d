//! Read-only projections over merged patch requests
//!
//! Nothing here writes. The feed and entity histories are computed from the
//! `patch_requests` table on every call.

use crate::versions;
use periodo_core::identifier;
use periodo_core::{PatchRequestId, Result, Timestamp, ValidationMode, VersionId};
use periodo_storage::{CommentRow, PatchRequestRow, Transaction};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// One merged patch request as reported to provenance consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvenanceEntry {
    /// The merged request
    pub patch_request: PatchRequestId,
    /// Submitter
    pub created_by: String,
    /// Merger
    pub merged_by: Option<String>,
    /// Merge time
    pub merged_at: Option<Timestamp>,
    /// Version current at submission
    pub created_from: VersionId,
    /// Version the patch was applied to
    pub applied_to: Option<VersionId>,
    /// Version the merge produced
    pub resulted_in: Option<VersionId>,
    /// Identifiers minted by the merge
    pub created_entities: BTreeSet<String>,
    /// Existing entities modified
    pub updated_entities: BTreeSet<String>,
    /// Entities deleted
    pub removed_entities: BTreeSet<String>,
    /// Review discussion in posting order
    pub comments: Vec<CommentRow>,
}

impl ProvenanceEntry {
    fn new(row: &PatchRequestRow, comments: Vec<CommentRow>) -> Self {
        ProvenanceEntry {
            patch_request: row.id,
            created_by: row.created_by.clone(),
            merged_by: row.merged_by.clone(),
            merged_at: row.merged_at,
            created_from: row.created_from,
            applied_to: row.applied_to,
            resulted_in: row.resulted_in,
            created_entities: row.created_entities.clone(),
            updated_entities: row.updated_entities.clone(),
            removed_entities: row.removed_entities.clone(),
            comments,
        }
    }
}

fn merged_in_version_order<'t>(txn: &'t Transaction) -> Vec<&'t PatchRequestRow> {
    let mut merged: Vec<_> = txn.patch_requests().into_iter().filter(|r| r.merged).collect();
    merged.sort_by_key(|r| r.resulted_in);
    merged
}

/// Merged requests ordered by the version each produced
pub fn feed(txn: &Transaction) -> Vec<ProvenanceEntry> {
    merged_in_version_order(txn)
        .into_iter()
        .map(|row| {
            let comments = txn.comments_for(row.id).into_iter().cloned().collect();
            ProvenanceEntry::new(row, comments)
        })
        .collect()
}

/// What an identifier currently denotes
#[derive(Debug, Clone, PartialEq)]
pub enum EntityStatus {
    /// Present in the current version
    Live {
        /// The current version
        version: VersionId,
        /// The entity definition
        value: Value,
    },
    /// Removed by a merged patch request (HTTP 410)
    Gone {
        /// Request that removed it
        removed_by: PatchRequestId,
        /// Version in which it disappeared
        version: VersionId,
    },
    /// Never issued (HTTP 404)
    NotFound,
}

/// Resolve an identifier against the current version and the removed-entity
/// registry
///
/// `mode` governs only the shape check of `id`; pass
/// [`ValidationMode::AllowLegacy`] to accept identifiers minted under the
/// retired check scheme.
///
/// # Errors
///
/// `IdentifierError` if `id` is not a well-formed identifier.
pub fn resolve_entity(txn: &Transaction, id: &str, mode: ValidationMode) -> Result<EntityStatus> {
    identifier::validate(id, mode)?;
    let current = versions::current(txn)?;
    if let Some(entity) = current.data.entity(id) {
        return Ok(EntityStatus::Live {
            version: current.id,
            value: entity.value().clone(),
        });
    }
    let removal = merged_in_version_order(txn)
        .into_iter()
        .rev()
        .find(|r| r.removed_entities.contains(id));
    Ok(match removal {
        Some(row) => EntityStatus::Gone {
            removed_by: row.id,
            version: row.resulted_in.unwrap_or(current.id),
        },
        None => EntityStatus::NotFound,
    })
}

/// How a merged request touched an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Identifier minted
    Created,
    /// Definition modified
    Updated,
    /// Entity deleted
    Removed,
}

/// One entry of an entity's history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityChange {
    /// Request that made the change
    pub patch_request: PatchRequestId,
    /// Version the change appeared in
    pub version: Option<VersionId>,
    /// What happened
    pub change: ChangeKind,
}

/// Every merged change to `id`, oldest first
pub fn entity_history(txn: &Transaction, id: &str) -> Vec<EntityChange> {
    merged_in_version_order(txn)
        .into_iter()
        .filter_map(|row| {
            let change = if row.created_entities.contains(id) {
                ChangeKind::Created
            } else if row.removed_entities.contains(id) {
                ChangeKind::Removed
            } else if row.updated_entities.contains(id) {
                ChangeKind::Updated
            } else {
                return None;
            };
            Some(EntityChange {
                patch_request: row.id,
                version: row.resulted_in,
                change,
            })
        })
        .collect()
}
