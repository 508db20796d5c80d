//! Version descriptions
//!
//! A description summarizes one dataset snapshot. It is computed once when
//! the version is appended and stored next to the data.

use periodo_core::{Dataset, Timestamp};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// Hex SHA-256 of the canonical dataset serialization
pub fn digest(dataset: &Dataset) -> String {
    let hash = Sha256::digest(dataset.to_canonical_bytes());
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Describe a snapshot appended at `modified`
pub fn describe(dataset: &Dataset, modified: Timestamp) -> Value {
    let stats = dataset.stats();
    json!({
        "authorities": stats.authorities,
        "periods": stats.periods,
        "modified": modified.to_rfc3339(),
        "sha256": digest(dataset),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_describe_is_deterministic() {
        let data = Dataset::from_value(json!({
            "authorities": {"p0a": {"periods": {"p0a1": {}, "p0a2": {}}}, "p0b": {}}
        }));
        let at = chrono::Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let first = describe(&data, at);
        assert_eq!(first, describe(&data.clone(), at));
        assert_eq!(first["authorities"], json!(2));
        assert_eq!(first["periods"], json!(2));
        assert_eq!(first["modified"], json!("2024-03-01T12:00:00+00:00"));
        assert_eq!(first["sha256"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn test_digest_tracks_content() {
        assert_ne!(
            digest(&Dataset::empty()),
            digest(&Dataset::from_value(json!({"authorities": {"p0a": {}}})))
        );
    }
}
