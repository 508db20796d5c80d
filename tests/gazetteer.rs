//! Public API tests
//!
//! Drives a gazetteer only through the `periodo` crate's re-exports, the way
//! an HTTP front end would, and checks the error kinds it would map to
//! status codes.

use periodo::{Actor, EntityStatus, ErrorKind, Gazetteer, JsonPointer, RequestFilter, VersionId};
use serde_json::json;
use tempfile::TempDir;

fn authority_patch(skolem: &str, title: &str) -> String {
    json!([{
        "op": "add",
        "path": JsonPointer::from_tokens(["authorities", skolem]).to_string(),
        "value": {"id": skolem, "source": {"title": title}}
    }])
    .to_string()
}

#[test]
fn test_submit_review_merge_and_resolve() {
    let temp_dir = TempDir::new().unwrap();
    let gz = Gazetteer::open(temp_dir.path()).unwrap();
    let (version, map) = gz.initialize(&json!({"authorities": {}})).unwrap();
    assert_eq!(version, VersionId::new(0));
    assert!(map.is_empty());

    let contributor = Actor::contributor("orcid:0000-0002-1825-0097");
    let reviewer = Actor::reviewer("orcid:0000-0001-5109-3700");
    let skolem = "http://localhost:5000/.well-known/genid/first";

    let id = gz
        .create_patch_request(&contributor, &authority_patch(skolem, "Dynastic Egypt"))
        .unwrap();
    gz.comment(id, &reviewer, "Thanks").unwrap();
    assert_eq!(gz.merge(id, &reviewer).unwrap(), VersionId::new(1));

    let minted = gz.patch_request(id).unwrap().identifier_map[skolem].clone();
    match gz.resolve_entity(&minted).unwrap() {
        EntityStatus::Live { version, value } => {
            assert_eq!(version, VersionId::new(1));
            assert_eq!(value["source"]["title"], json!("Dynastic Egypt"));
        }
        other => panic!("expected a live entity, got {:?}", other),
    }

    let description = &gz.current_version().unwrap().description;
    assert_eq!(description["authorities"], json!(1));
    assert_eq!(gz.provenance().len(), 1);
    assert!(gz.patch_requests(RequestFilter::Open).is_empty());
}

#[test]
fn test_error_kinds() {
    let gz = Gazetteer::ephemeral();
    gz.initialize(&json!({"authorities": {}})).unwrap();
    let contributor = Actor::contributor("orcid:a");
    let reviewer = Actor::reviewer("orcid:r");

    assert_eq!(
        gz.create_patch_request(&contributor, "{not json").unwrap_err().kind(),
        ErrorKind::InvalidPatch
    );
    assert_eq!(gz.resolve_entity("p0bad").unwrap_err().kind(), ErrorKind::Identifier);
    assert_eq!(
        gz.patch_request(periodo::PatchRequestId::new(42)).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        gz.initialize(&json!({"authorities": {}})).unwrap_err().kind(),
        ErrorKind::Merge
    );

    let id = gz.create_patch_request(&contributor, "[]").unwrap();
    assert_eq!(
        gz.merge(id, &contributor).unwrap_err().kind(),
        ErrorKind::PermissionDenied
    );
    gz.reject(id, &reviewer).unwrap();
    assert_eq!(gz.merge(id, &reviewer).unwrap_err().kind(), ErrorKind::Merge);
}
