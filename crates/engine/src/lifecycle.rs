//! Patch request lifecycle
//!
//! ```text
//!            create
//!              |
//!              v
//!   update -> open ----reject----> rejected
//!              |
//!            merge
//!              v
//!           merged
//! ```
//!
//! Comments may be posted in every state. Each function here runs inside a
//! caller-supplied transaction and either returns `Ok` with its writes
//! buffered, or an error the caller answers by rolling back.
//!
//! # Permissions
//!
//! | Operation | Allowed to                        |
//! |-----------|-----------------------------------|
//! | create    | anyone                            |
//! | update    | the request's creator, reviewers  |
//! | comment   | anyone                            |
//! | reject    | reviewers                         |
//! | merge     | reviewers                         |

use crate::skolem::SkolemResolver;
use crate::validator::{validate_patch, validate_patch_text};
use crate::versions;
use periodo_core::dataset::AUTHORITIES;
use periodo_core::{
    Actor, CommentId, Dataset, Error, IdMinter, InvalidPatchError, MergeError, NotFoundError, Patch,
    PatchRequestId, Result, Timestamp, UnmergeablePatchError, VersionId,
};
use periodo_storage::{PatchRequestRow, Transaction};
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// Guards
// ============================================================================

fn require_reviewer(actor: &Actor, action: &str, id: PatchRequestId) -> Result<()> {
    if actor.is_reviewer() {
        Ok(())
    } else {
        Err(Error::PermissionDenied(format!(
            "{} may not {} patch request {}",
            actor.id, action, id
        )))
    }
}

fn ensure_pending(row: &PatchRequestRow) -> std::result::Result<(), MergeError> {
    if row.merged {
        Err(MergeError::AlreadyMerged(row.id))
    } else if !row.open {
        Err(MergeError::Closed(row.id))
    } else {
        Ok(())
    }
}

fn existing(txn: &Transaction, id: PatchRequestId) -> Result<PatchRequestRow> {
    txn.patch_request(id)
        .cloned()
        .ok_or_else(|| NotFoundError::PatchRequest(id).into())
}

fn existing_for_transition(txn: &Transaction, id: PatchRequestId) -> Result<PatchRequestRow> {
    txn.patch_request(id)
        .cloned()
        .ok_or_else(|| MergeError::UnknownRequest(id).into())
}

// ============================================================================
// Transitions
// ============================================================================

/// Submit a patch against the current version
///
/// # Errors
///
/// `InvalidPatchError` if the text does not parse or does not apply.
pub fn create(txn: &mut Transaction, actor: &Actor, text: &str, now: Timestamp) -> Result<PatchRequestId> {
    let current = versions::current(txn)?;
    let (_, affected) = validate_patch_text(text, &current.data)?;

    let id = txn.next_patch_request_id();
    let mut row = PatchRequestRow::new(id, &actor.id, current.id, text.to_string(), now);
    row.updated_entities = affected.updated;
    row.removed_entities = affected.removed;
    txn.put_patch_request(row);

    tracing::debug!(request = %id, actor = %actor.id, created_from = %current.id, "Patch request created");
    Ok(id)
}

/// Replace the patch of an open request, re-validating against the current
/// version; `created_from` is kept
pub fn update(
    txn: &mut Transaction,
    id: PatchRequestId,
    actor: &Actor,
    text: &str,
    now: Timestamp,
) -> Result<()> {
    let mut row = existing(txn, id)?;
    if row.created_by != actor.id && !actor.is_reviewer() {
        return Err(Error::PermissionDenied(format!(
            "{} may not update patch request {} created by {}",
            actor.id, id, row.created_by
        )));
    }
    ensure_pending(&row)?;

    let current = versions::current(txn)?;
    let (_, affected) = validate_patch_text(text, &current.data)?;
    row.text = text.to_string();
    row.updated_entities = affected.updated;
    row.removed_entities = affected.removed;
    row.updated_by = actor.id.clone();
    row.updated_at = now;
    txn.put_patch_request(row);

    tracing::debug!(request = %id, actor = %actor.id, "Patch request updated");
    Ok(())
}

/// Post a comment, whatever the request's state
pub fn comment(
    txn: &mut Transaction,
    id: PatchRequestId,
    actor: &Actor,
    message: &str,
    now: Timestamp,
) -> Result<CommentId> {
    existing(txn, id)?;
    Ok(txn.insert_comment(id, &actor.id, message, now))
}

/// Close an open request without merging
pub fn reject(txn: &mut Transaction, id: PatchRequestId, actor: &Actor, now: Timestamp) -> Result<()> {
    let mut row = existing_for_transition(txn, id)?;
    require_reviewer(actor, "reject", id)?;
    ensure_pending(&row)?;

    row.open = false;
    row.merged = false;
    row.rejected_by = Some(actor.id.clone());
    row.rejected_at = Some(now);
    txn.put_patch_request(row);

    tracing::info!(request = %id, actor = %actor.id, "Patch request rejected");
    Ok(())
}

/// Apply an open request to the current version, producing a new version
///
/// Everything happens in `txn`: the re-validation, identifier minting, the
/// version append and the request update. Committing `txn` is what makes the
/// merge happen; a conflicting commit means another writer got there first
/// and the whole merge must be re-run against the new current version.
///
/// # Errors
///
/// - `MergeError` if the request is unknown or no longer open
/// - `UnmergeablePatchError` if the patch no longer applies, or identifier
///   resolution fails
pub fn merge(
    txn: &mut Transaction,
    id: PatchRequestId,
    actor: &Actor,
    minter: &mut IdMinter,
    max_mint_attempts: usize,
    now: Timestamp,
) -> Result<VersionId> {
    let mut row = existing_for_transition(txn, id)?;
    require_reviewer(actor, "merge", id)?;
    ensure_pending(&row)?;

    let patch = Patch::parse(&row.text)?;
    let current = versions::current(txn)?;
    let base = current.id;
    let no_longer_applies = move |source: InvalidPatchError| UnmergeablePatchError::NoLongerApplies {
        version: base,
        source,
    };
    let affected = validate_patch(&patch, &current.data).map_err(no_longer_applies)?;

    let retired = txn.removed_entity_ids();
    let resolution = SkolemResolver::new(&retired, minter, max_mint_attempts)
        .resolve_patch(&patch, txn.all_identifiers_in_use())
        .map_err(UnmergeablePatchError::Identifier)?;
    let data = Dataset::from_value(
        resolution
            .resolved
            .apply(current.data.as_value())
            .map_err(no_longer_applies)?,
    );

    // Identifiers issued to entities the same patch dropped are retired too
    let mut removed = affected.removed.clone();
    removed.extend(resolution.created.difference(&data.identifiers()).cloned());

    let version = versions::append(txn, data, now);

    row.open = false;
    row.merged = true;
    row.merged_by = Some(actor.id.clone());
    row.merged_at = Some(now);
    row.applied_to = Some(current.id);
    row.resulted_in = Some(version);
    row.text = resolution.resolved.to_json_string();
    row.updated_entities = affected.updated_not_removed();
    row.removed_entities = removed;
    row.created_entities = resolution.created;
    row.identifier_map = resolution.identifier_map;
    txn.put_patch_request(row);

    tracing::info!(
        request = %id,
        actor = %actor.id,
        applied_to = %current.id,
        resulted_in = %version,
        "Patch request merged"
    );
    Ok(version)
}

/// Whether an open request's patch still applies to the current version
pub fn is_mergeable(txn: &Transaction, id: PatchRequestId) -> Result<bool> {
    let row = existing(txn, id)?;
    if !row.is_pending() {
        return Ok(false);
    }
    let current = versions::current(txn)?;
    Ok(validate_patch_text(&row.text, &current.data).is_ok())
}

/// Load the first version from a full document, resolving its skolem
/// references
///
/// # Errors
///
/// `AlreadyInitialized` if any version exists.
pub fn initialize(
    txn: &mut Transaction,
    document: &Value,
    minter: &mut IdMinter,
    max_mint_attempts: usize,
    now: Timestamp,
) -> Result<(VersionId, BTreeMap<String, String>)> {
    if let Some(current) = txn.current_version() {
        return Err(Error::AlreadyInitialized(current.id));
    }
    if !document.get(AUTHORITIES).map_or(false, Value::is_object) {
        return Err(InvalidPatchError::Malformed(format!(
            "initial document must hold an '{}' object",
            AUTHORITIES
        ))
        .into());
    }

    let retired = txn.removed_entity_ids();
    let resolution = SkolemResolver::new(&retired, minter, max_mint_attempts)
        .resolve_document(document, txn.all_identifiers_in_use())?;
    let version = versions::append(txn, Dataset::from_value(resolution.resolved), now);

    tracing::info!(
        version = %version,
        created = resolution.created.len(),
        "Initial dataset loaded"
    );
    Ok((version, resolution.identifier_map))
}
