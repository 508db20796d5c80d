//! Row identifiers and actor types
//!
//! All persisted rows are keyed by monotonically increasing integers. The
//! newtypes below keep version ids, patch request ids and comment ids from
//! being mixed up at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wall-clock timestamp used for every persisted row
pub type Timestamp = chrono::DateTime<chrono::Utc>;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw row id
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw row id
            pub const fn as_u64(&self) -> u64 {
                self.0
            }

            /// The id that follows this one
            pub const fn next(&self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

row_id!(
    /// Id of an immutable dataset snapshot. Version 0 is the initial load.
    VersionId
);

row_id!(
    /// Id of a patch request
    PatchRequestId
);

row_id!(
    /// Id of a comment attached to a patch request
    CommentId
);

/// What an actor may do to a patch request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May submit, update their own requests, and comment
    Contributor,
    /// May additionally update any open request, merge and reject
    Reviewer,
}

/// The identity performing an operation
///
/// Authentication happens at the boundary; the core only records who acted
/// and enforces the lifecycle permissions tied to [`Role`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    /// Stable identity (for example an ORCID URI)
    pub id: String,
    /// Granted role
    pub role: Role,
}

impl Actor {
    /// A contributor identity
    pub fn contributor(id: impl Into<String>) -> Self {
        Actor {
            id: id.into(),
            role: Role::Contributor,
        }
    }

    /// A reviewer identity
    pub fn reviewer(id: impl Into<String>) -> Self {
        Actor {
            id: id.into(),
            role: Role::Reviewer,
        }
    }

    /// Whether this actor holds the reviewer role
    pub fn is_reviewer(&self) -> bool {
        self.role == Role::Reviewer
    }
}
