//! Dataset document view
//!
//! The whole gazetteer is one JSON document:
//!
//! ```text
//! {
//!   "authorities": {
//!     "<authority id>": {
//!       "id": "<authority id>",
//!       "source": { ... },
//!       "periods": {
//!         "<period id>": { "id": "<period id>", "label": "...", ... }
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! Authorities and periods are keyed by their identifiers. Anything else in
//! the document (`@context`, metadata) is carried along untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Top-level member holding all authorities
pub const AUTHORITIES: &str = "authorities";

/// Authority member holding its periods
pub const PERIODS: &str = "periods";

/// An entity located in a dataset
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityRef<'a> {
    /// An authority and its full definition
    Authority(&'a Value),
    /// A period, with the id of the authority that holds it
    Period {
        /// Containing authority id
        authority: &'a str,
        /// Period definition
        value: &'a Value,
    },
}

impl<'a> EntityRef<'a> {
    /// The entity definition
    pub fn value(&self) -> &'a Value {
        match self {
            EntityRef::Authority(value) => value,
            EntityRef::Period { value, .. } => value,
        }
    }
}

/// Counts used in version descriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatasetStats {
    /// Number of authorities
    pub authorities: usize,
    /// Number of periods across all authorities
    pub periods: usize,
}

/// A full dataset document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset(Value);

impl Dataset {
    /// A dataset with no authorities
    pub fn empty() -> Self {
        let mut root = Map::new();
        root.insert(AUTHORITIES.to_string(), Value::Object(Map::new()));
        Dataset(Value::Object(root))
    }

    /// Wrap a JSON document
    pub fn from_value(value: Value) -> Self {
        Dataset(value)
    }

    /// Borrow the underlying document
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Take the underlying document
    pub fn into_value(self) -> Value {
        self.0
    }

    fn authority_map(&self) -> Option<&Map<String, Value>> {
        self.0.get(AUTHORITIES)?.as_object()
    }

    /// Authority ids in key order
    pub fn authority_ids(&self) -> impl Iterator<Item = &str> {
        self.authority_map()
            .into_iter()
            .flat_map(|m| m.keys().map(String::as_str))
    }

    /// Authority definition
    pub fn authority(&self, id: &str) -> Option<&Value> {
        self.authority_map()?.get(id)
    }

    /// Period ids currently under `authority_id`
    pub fn period_ids(&self, authority_id: &str) -> Vec<String> {
        self.authority(authority_id)
            .and_then(|a| a.get(PERIODS))
            .and_then(Value::as_object)
            .map(|periods| periods.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every authority and period identifier in the document
    pub fn identifiers(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        for authority in self.authority_ids() {
            ids.insert(authority.to_string());
            ids.extend(self.period_ids(authority));
        }
        ids
    }

    /// Find an authority or period by id
    pub fn entity(&self, id: &str) -> Option<EntityRef<'_>> {
        let authorities = self.authority_map()?;
        if let Some(authority) = authorities.get(id) {
            return Some(EntityRef::Authority(authority));
        }
        authorities.iter().find_map(|(authority_id, authority)| {
            authority
                .get(PERIODS)
                .and_then(Value::as_object)
                .and_then(|periods| periods.get(id))
                .map(|value| EntityRef::Period {
                    authority: authority_id.as_str(),
                    value,
                })
        })
    }

    /// Authority and period counts
    pub fn stats(&self) -> DatasetStats {
        let mut stats = DatasetStats::default();
        for authority in self.authority_ids() {
            stats.authorities += 1;
            stats.periods += self.period_ids(authority).len();
        }
        stats
    }

    /// Canonical serialization (object members in key order)
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.0).unwrap_or_default()
    }
}

impl Default for Dataset {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Value> for Dataset {
    fn from(value: Value) -> Self {
        Dataset(value)
    }
}
