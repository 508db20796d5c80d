//! Patch request lifecycle tests
//!
//! End-to-end scenarios through the Gazetteer facade: submit, review, merge,
//! and what the merged requests record about the entities they touched.

use periodo_core::identifier::{self, with_check_char};
use periodo_core::{
    Actor, EntityKind, Error, JsonPointer, MergeError, UnmergeablePatchError, ValidationMode,
    VersionId,
};
use periodo_engine::{EntityStatus, Gazetteer, RequestFilter};
use serde_json::{json, Value};
use std::sync::Arc;

// ============================================================================
// Helpers
// ============================================================================

fn sk(name: &str) -> String {
    format!("http://localhost:5000/.well-known/genid/{}", name)
}

fn ptr(tokens: &[&str]) -> String {
    JsonPointer::from_tokens(tokens.iter().copied()).to_string()
}

fn alice() -> Actor {
    Actor::contributor("orcid:0000-0001")
}

fn reviewer() -> Actor {
    Actor::reviewer("orcid:0000-0009")
}

/// Gazetteer at version 0 holding one authority with two periods
fn seeded() -> (Arc<Gazetteer>, String, String, String) {
    let authority = with_check_char("p0bcdf");
    let early = with_check_char(&format!("{}bcd", authority));
    let late = with_check_char(&format!("{}fgh", authority));
    let gz = Gazetteer::ephemeral();
    gz.initialize(&json!({
        "@context": {"@base": "http://n2t.net/ark:/99152/"},
        "authorities": {
            authority.clone(): {
                "id": authority.clone(),
                "source": {"title": "Chronology of the Aegean"},
                "periods": {
                    early.clone(): {"id": early.clone(), "label": "Early Helladic"},
                    late.clone(): {"id": late.clone(), "label": "Late Helladic"}
                }
            }
        }
    }))
    .unwrap();
    (gz, authority, early, late)
}

fn text(value: Value) -> String {
    serde_json::to_string(&value).unwrap()
}

// ============================================================================
// Merging new entities
// ============================================================================

#[test]
fn test_new_authority_with_two_periods_mints_three_identifiers() {
    let (gz, _, _, _) = seeded();
    let patch = text(json!([{
        "op": "add",
        "path": ptr(&["authorities", &sk("a")]),
        "value": {
            "id": sk("a"),
            "periods": {
                sk("p1"): {"id": sk("p1"), "label": "Neolithic"},
                sk("p2"): {"id": sk("p2"), "label": "Chalcolithic", "broader": sk("p1")}
            }
        }
    }]));

    let id = gz.create_patch_request(&alice(), &patch).unwrap();
    let pending = gz.patch_request(id).unwrap();
    assert!(pending.created_entities.is_empty());
    assert!(pending.updated_entities.is_empty());
    assert_eq!(pending.created_from, VersionId::new(0));

    let version = gz.merge(id, &reviewer()).unwrap();
    assert_eq!(version, VersionId::new(1));

    let merged = gz.patch_request(id).unwrap();
    assert_eq!(merged.applied_to, Some(VersionId::new(0)));
    assert_eq!(merged.resulted_in, Some(VersionId::new(1)));
    assert_eq!(merged.merged_by.as_deref(), Some("orcid:0000-0009"));
    assert_eq!(merged.created_entities.len(), 3);
    assert_eq!(merged.identifier_map.len(), 3);

    let authorities: Vec<_> = merged
        .created_entities
        .iter()
        .filter(|id| identifier::validate(id, ValidationMode::Strict) == Ok(EntityKind::Authority))
        .collect();
    assert_eq!(authorities.len(), 1);
    for created in &merged.created_entities {
        assert!(identifier::validate(created, ValidationMode::Strict).is_ok());
        assert!(created.starts_with(authorities[0].as_str()));
        assert!(matches!(gz.resolve_entity(created).unwrap(), EntityStatus::Live { .. }));
    }

    // The stored patch is the resolved one
    assert!(!merged.text.contains("/.well-known/genid/"));
    let current = gz.current_version().unwrap();
    let p1 = &merged.identifier_map[&sk("p1")];
    let p2 = &merged.identifier_map[&sk("p2")];
    assert_eq!(
        current.data.entity(p2).unwrap().value()["broader"],
        json!(p1)
    );
}

#[test]
fn test_merged_request_stays_merged() {
    let (gz, authority, _, _) = seeded();
    let patch = text(json!([{
        "op": "replace",
        "path": ptr(&["authorities", &authority, "source", "title"]),
        "value": "Aegean Chronology"
    }]));
    let id = gz.create_patch_request(&alice(), &patch).unwrap();
    gz.merge(id, &reviewer()).unwrap();

    let err = gz.merge(id, &reviewer()).unwrap_err();
    assert!(matches!(err, Error::Merge(MergeError::AlreadyMerged(r)) if r == id));
    assert_eq!(gz.versions().len(), 2);
    assert!(matches!(
        gz.reject(id, &reviewer()),
        Err(Error::Merge(MergeError::AlreadyMerged(_)))
    ));
}

// ============================================================================
// Competing requests
// ============================================================================

#[test]
fn test_second_removal_of_same_period_is_unmergeable() {
    let (gz, authority, early, _) = seeded();
    let remove = text(json!([{
        "op": "remove",
        "path": ptr(&["authorities", &authority, "periods", &early])
    }]));
    let first = gz.create_patch_request(&alice(), &remove).unwrap();
    let second = gz.create_patch_request(&alice(), &remove).unwrap();

    gz.merge(first, &reviewer()).unwrap();
    assert!(!gz.is_mergeable(second).unwrap());
    let err = gz.merge(second, &reviewer()).unwrap_err();
    assert!(matches!(
        err,
        Error::Unmergeable(UnmergeablePatchError::NoLongerApplies { .. })
    ));

    // The failed merge changed nothing
    assert_eq!(gz.versions().len(), 2);
    let row = gz.patch_request(second).unwrap();
    assert!(row.open);
    assert!(!row.merged);

    assert!(gz.removed_entity_ids().contains(&early));
    assert!(!gz.all_identifiers_in_use().contains(&early));
    let first_row = gz.patch_request(first).unwrap();
    assert!(first_row.removed_entities.contains(&early));
    assert!(first_row.updated_entities.contains(&authority));
    assert!(!first_row.updated_entities.contains(&early));
}

#[test]
fn test_independent_requests_merge_in_sequence() {
    let (gz, authority, early, late) = seeded();
    let relabel = |period: &str, label: &str| {
        text(json!([{
            "op": "replace",
            "path": ptr(&["authorities", &authority, "periods", period, "label"]),
            "value": label
        }]))
    };
    let a = gz.create_patch_request(&alice(), &relabel(&early, "EH")).unwrap();
    let b = gz.create_patch_request(&alice(), &relabel(&late, "LH")).unwrap();

    assert_eq!(gz.merge(a, &reviewer()).unwrap(), VersionId::new(1));
    assert!(gz.is_mergeable(b).unwrap());
    assert_eq!(gz.merge(b, &reviewer()).unwrap(), VersionId::new(2));

    let row = gz.patch_request(b).unwrap();
    assert_eq!(row.created_from, VersionId::new(0));
    assert_eq!(row.applied_to, Some(VersionId::new(1)));
    assert_eq!(row.resulted_in, Some(VersionId::new(2)));

    let feed = gz.provenance();
    let order: Vec<_> = feed.iter().map(|e| e.patch_request).collect();
    assert_eq!(order, vec![a, b]);
}

// ============================================================================
// Retired identifiers
// ============================================================================

#[test]
fn test_removed_identifier_resolves_as_gone() {
    let (gz, authority, early, late) = seeded();
    let remove = text(json!([{
        "op": "remove",
        "path": ptr(&["authorities", &authority])
    }]));
    let id = gz.create_patch_request(&alice(), &remove).unwrap();
    let version = gz.merge(id, &reviewer()).unwrap();

    for gone in [&authority, &early, &late] {
        assert_eq!(
            gz.resolve_entity(gone).unwrap(),
            EntityStatus::Gone {
                removed_by: id,
                version
            }
        );
    }

    // A pre-assigned skolem may not claim a retired identifier
    let reclaim = text(json!([{
        "op": "add",
        "path": ptr(&["authorities", &sk(&format!("assigned/{}", authority))]),
        "value": {"id": sk(&format!("assigned/{}", authority))}
    }]));
    let req = gz.create_patch_request(&alice(), &reclaim).unwrap();
    assert!(matches!(
        gz.merge(req, &reviewer()),
        Err(Error::Unmergeable(UnmergeablePatchError::Identifier(_)))
    ));
}

#[test]
fn test_authority_added_and_removed_in_one_patch_is_retired() {
    let (gz, _, _, _) = seeded();
    let patch = text(json!([
        {"op": "add", "path": ptr(&["authorities", &sk("a")]), "value": {"id": sk("a")}},
        {"op": "remove", "path": ptr(&["authorities", &sk("a")])}
    ]));
    let id = gz.create_patch_request(&alice(), &patch).unwrap();
    let version = gz.merge(id, &reviewer()).unwrap();

    let row = gz.patch_request(id).unwrap();
    assert_eq!(row.created_entities.len(), 1);
    let minted = row.created_entities.iter().next().unwrap().clone();
    assert!(row.removed_entities.contains(&minted));
    assert!(gz.removed_entity_ids().contains(&minted));
    assert!(!gz.all_identifiers_in_use().contains(&minted));
    assert_eq!(
        gz.resolve_entity(&minted).unwrap(),
        EntityStatus::Gone {
            removed_by: id,
            version
        }
    );
}

#[test]
fn test_period_dropped_by_periods_replace_in_same_patch_is_retired() {
    let (gz, authority, early, late) = seeded();
    let patch = text(json!([
        {
            "op": "add",
            "path": ptr(&["authorities", &authority, "periods", &sk("p")]),
            "value": {"id": sk("p"), "label": "Middle Helladic"}
        },
        {
            "op": "replace",
            "path": ptr(&["authorities", &authority, "periods"]),
            "value": {
                early.clone(): {"id": early.clone(), "label": "Early Helladic"},
                late.clone(): {"id": late.clone(), "label": "Late Helladic"}
            }
        }
    ]));
    let id = gz.create_patch_request(&alice(), &patch).unwrap();
    let version = gz.merge(id, &reviewer()).unwrap();

    let row = gz.patch_request(id).unwrap();
    assert_eq!(row.created_entities.len(), 1);
    let minted = row.created_entities.iter().next().unwrap().clone();
    assert!(minted.starts_with(authority.as_str()));
    assert!(row.removed_entities.contains(&minted));
    assert!(!row.removed_entities.contains(&early));
    assert!(!gz.all_identifiers_in_use().contains(&minted));
    assert!(gz.all_identifiers_in_use().contains(&early));
    assert_eq!(
        gz.resolve_entity(&minted).unwrap(),
        EntityStatus::Gone {
            removed_by: id,
            version
        }
    );
}

// ============================================================================
// Review workflow
// ============================================================================

#[test]
fn test_update_is_validated_against_current_version() {
    let (gz, authority, early, _) = seeded();
    let first = text(json!([
        {"op": "remove", "path": ptr(&["authorities", &authority, "periods", &early])},
        {"op": "add", "path": ptr(&["authorities", &authority, "note"]), "value": "x"}
    ]));
    let first = gz.create_patch_request(&alice(), &first).unwrap();
    let second = gz.create_patch_request(&alice(), "[]").unwrap();
    assert_eq!(gz.merge(first, &reviewer()).unwrap(), VersionId::new(1));

    // Applies only once the note exists
    let at_v1 = text(json!([{
        "op": "replace",
        "path": ptr(&["authorities", &authority, "note"]),
        "value": "y"
    }]));
    gz.update_patch_request(second, &alice(), &at_v1).unwrap();
    let row = gz.patch_request(second).unwrap();
    assert_eq!(row.created_from, VersionId::new(0));
    assert_eq!(row.text, at_v1);
    assert!(row.updated_entities.contains(&authority));

    // Applies only while the early period exists
    let at_v0 = text(json!([{
        "op": "replace",
        "path": ptr(&["authorities", &authority, "periods", &early, "label"]),
        "value": "EH"
    }]));
    assert!(matches!(
        gz.update_patch_request(second, &alice(), &at_v0),
        Err(Error::InvalidPatch(_))
    ));
    assert_eq!(gz.patch_request(second).unwrap().text, at_v1);
}

#[test]
fn test_review_discussion_survives_merge() {
    let (gz, authority, _, _) = seeded();
    let patch = text(json!([{
        "op": "add",
        "path": ptr(&["authorities", &authority, "editorialNote"]),
        "value": "Dates revised"
    }]));
    let id = gz.create_patch_request(&alice(), &patch).unwrap();
    gz.comment(id, &reviewer(), "Please cite the revision").unwrap();

    let revised = text(json!([{
        "op": "add",
        "path": ptr(&["authorities", &authority, "editorialNote"]),
        "value": "Dates revised after Manning 2010"
    }]));
    gz.update_patch_request(id, &alice(), &revised).unwrap();
    gz.comment(id, &alice(), "Done").unwrap();
    gz.merge(id, &reviewer()).unwrap();

    let comments = gz.comments(id).unwrap();
    let messages: Vec<_> = comments.iter().map(|c| c.message.as_str()).collect();
    assert_eq!(messages, vec!["Please cite the revision", "Done"]);

    let entry = &gz.provenance()[0];
    assert_eq!(entry.comments.len(), 2);
    assert!(entry.updated_entities.contains(&authority));

    let history = gz.entity_history(&authority);
    assert_eq!(history.len(), 1);
    assert!(gz.patch_requests(RequestFilter::Open).is_empty());
}

#[test]
fn test_contributor_cannot_merge_or_reject() {
    let (gz, _, _, _) = seeded();
    let id = gz.create_patch_request(&alice(), "[]").unwrap();
    assert!(matches!(gz.merge(id, &alice()), Err(Error::PermissionDenied(_))));
    assert!(matches!(gz.reject(id, &alice()), Err(Error::PermissionDenied(_))));
    assert!(gz.patch_request(id).unwrap().open);
}

#[test]
fn test_invalid_patch_is_refused_at_submission() {
    let (gz, _, _, _) = seeded();
    let missing = with_check_char("p0zzzz");
    let patch = text(json!([{
        "op": "remove",
        "path": ptr(&["authorities", &missing])
    }]));
    assert!(matches!(
        gz.create_patch_request(&alice(), &patch),
        Err(Error::InvalidPatch(_))
    ));
    assert!(gz.patch_requests(RequestFilter::All).is_empty());
}
