//! Patch validation and affected-entity classification
//!
//! A patch is valid against a dataset when its operations apply in order to
//! a copy of the data without structural error. While applying, each
//! operation's path is matched against the entity grammar
//!
//! ```text
//! /authorities[/<a>[/periods[/<p>[/...]]|/...]]
//! ```
//!
//! and classified against the document as it stands just before that
//! operation, giving the entities the patch updates and removes.

use crate::skolem::is_skolem;
use periodo_core::dataset::{AUTHORITIES, PERIODS};
use periodo_core::{Dataset, InvalidPatchError, JsonPointer, Patch, PatchOp};
use serde_json::Value;
use std::collections::BTreeSet;

/// Existing entities a patch touches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AffectedEntities {
    /// Entities whose definitions change
    pub updated: BTreeSet<String>,
    /// Entities deleted outright
    pub removed: BTreeSet<String>,
}

impl AffectedEntities {
    /// `updated` without anything also in `removed`
    pub fn updated_not_removed(&self) -> BTreeSet<String> {
        self.updated.difference(&self.removed).cloned().collect()
    }

    fn update(&mut self, id: &str) {
        if !is_skolem(id) {
            self.updated.insert(id.to_string());
        }
    }

    fn remove(&mut self, id: &str) {
        if !is_skolem(id) {
            self.removed.insert(id.to_string());
        }
    }
}

/// Where a path points in the entity grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityPath<'p> {
    /// The whole document
    Root,
    /// `/authorities`
    Authorities,
    /// `/authorities/<a>`
    Authority(&'p str),
    /// `/authorities/<a>/<member>...` other than the periods map
    AuthorityMember(&'p str),
    /// `/authorities/<a>/periods`
    Periods(&'p str),
    /// `/authorities/<a>/periods/<p>`
    Period(&'p str, &'p str),
    /// `/authorities/<a>/periods/<p>/<member>...`
    PeriodMember(&'p str, &'p str),
    /// Anything else (context, metadata)
    Unclassified,
}

fn entity_path(path: &JsonPointer) -> EntityPath<'_> {
    let tokens: Vec<&str> = path.tokens().iter().map(String::as_str).collect();
    match tokens.as_slice() {
        [] => EntityPath::Root,
        [AUTHORITIES] => EntityPath::Authorities,
        [AUTHORITIES, a] => EntityPath::Authority(*a),
        [AUTHORITIES, a, PERIODS] => EntityPath::Periods(*a),
        [AUTHORITIES, a, PERIODS, p] => EntityPath::Period(*a, *p),
        [AUTHORITIES, a, PERIODS, p, _, ..] => EntityPath::PeriodMember(*a, *p),
        [AUTHORITIES, a, _, ..] => EntityPath::AuthorityMember(*a),
        _ => EntityPath::Unclassified,
    }
}

fn keys(map: Option<&Value>) -> BTreeSet<String> {
    map.and_then(Value::as_object)
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}

fn authority_in<'d>(doc: &'d Value, id: &str) -> Option<&'d Value> {
    doc.get(AUTHORITIES)?.get(id)
}

fn period_ids_in(doc: &Value, authority: &str) -> BTreeSet<String> {
    keys(authority_in(doc, authority).and_then(|a| a.get(PERIODS)))
}

/// Record every period of `old` that `new` no longer holds
fn periods_dropped(affected: &mut AffectedEntities, old: &BTreeSet<String>, new: Option<&Value>) {
    let kept = keys(new);
    for period in old.difference(&kept) {
        affected.remove(period);
    }
}

/// Authorities map `old` replaced by `new`
fn authorities_replaced(affected: &mut AffectedEntities, doc: &Value, new: Option<&Value>) {
    for authority in keys(doc.get(AUTHORITIES)) {
        let old_periods = period_ids_in(doc, &authority);
        match new.and_then(|n| n.get(&authority)) {
            Some(replacement) => {
                affected.update(&authority);
                periods_dropped(affected, &old_periods, replacement.get(PERIODS));
            }
            None => {
                affected.remove(&authority);
                for period in &old_periods {
                    affected.remove(period);
                }
            }
        }
    }
}

/// Classify one operation against the document it is about to be applied to
fn classify(op: &PatchOp, doc: &Value, affected: &mut AffectedEntities) {
    match (entity_path(op.path()), op) {
        (EntityPath::Unclassified, _) => {}

        (EntityPath::Root, PatchOp::Remove { .. }) => authorities_replaced(affected, doc, None),
        (EntityPath::Root, PatchOp::Add { value, .. } | PatchOp::Replace { value, .. }) => {
            authorities_replaced(affected, doc, value.get(AUTHORITIES))
        }

        (EntityPath::Authorities, PatchOp::Remove { .. }) => authorities_replaced(affected, doc, None),
        (EntityPath::Authorities, PatchOp::Add { value, .. } | PatchOp::Replace { value, .. }) => {
            authorities_replaced(affected, doc, Some(value))
        }

        (EntityPath::Authority(a), PatchOp::Remove { .. }) => {
            affected.remove(a);
            for period in period_ids_in(doc, a) {
                affected.remove(&period);
            }
        }
        (EntityPath::Authority(a), PatchOp::Add { value, .. } | PatchOp::Replace { value, .. }) => {
            if authority_in(doc, a).is_some() {
                affected.update(a);
                periods_dropped(affected, &period_ids_in(doc, a), value.get(PERIODS));
            }
        }

        (EntityPath::AuthorityMember(a), _) => affected.update(a),

        (EntityPath::Periods(a), PatchOp::Remove { .. }) => {
            affected.update(a);
            periods_dropped(affected, &period_ids_in(doc, a), None);
        }
        (EntityPath::Periods(a), PatchOp::Add { value, .. } | PatchOp::Replace { value, .. }) => {
            affected.update(a);
            periods_dropped(affected, &period_ids_in(doc, a), Some(value));
        }

        (EntityPath::Period(a, p), PatchOp::Remove { .. }) => {
            affected.update(a);
            affected.remove(p);
        }
        (EntityPath::Period(a, p), _) | (EntityPath::PeriodMember(a, p), _) => {
            affected.update(a);
            affected.update(p);
        }
    }
}

/// Check that `patch` applies to `dataset` and classify what it touches
///
/// The dataset is never modified.
///
/// # Errors
///
/// `InvalidPatchError::DoesNotApply` naming the first failing operation.
pub fn validate_patch(patch: &Patch, dataset: &Dataset) -> Result<AffectedEntities, InvalidPatchError> {
    let mut doc = dataset.as_value().clone();
    let mut affected = AffectedEntities::default();
    for (index, op) in patch.ops().iter().enumerate() {
        classify(op, &doc, &mut affected);
        op.apply(&mut doc)
            .map_err(|reason| InvalidPatchError::DoesNotApply {
                index,
                path: op.path().to_string(),
                reason,
            })?;
    }
    tracing::debug!(
        ops = patch.len(),
        updated = affected.updated.len(),
        removed = affected.removed.len(),
        "Patch validated"
    );
    Ok(affected)
}

/// Parse patch text, then [`validate_patch`]
///
/// # Errors
///
/// `InvalidPatchError::Malformed` if the text is not a JSON Patch document.
pub fn validate_patch_text(
    text: &str,
    dataset: &Dataset,
) -> Result<(Patch, AffectedEntities), InvalidPatchError> {
    let patch = Patch::parse(text)?;
    let affected = validate_patch(&patch, dataset)?;
    Ok((patch, affected))
}
