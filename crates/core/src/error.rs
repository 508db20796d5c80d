//! Error types for the gazetteer engine
//!
//! Every fallible operation returns [`Error`]. The variants that callers act
//! on map one-to-one onto the failure kinds the boundary layer translates
//! into transport status codes; see [`Error::kind`].
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::types::{PatchRequestId, VersionId};
use std::io;
use thiserror::Error;

/// Result type alias for gazetteer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Malformed or colliding permanent identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Identifier does not have the shape of an authority or period id
    #[error("malformed identifier '{id}': {reason}")]
    Malformed {
        /// The offending identifier
        id: String,
        /// What is wrong with it
        reason: String,
    },

    /// Trailing check character does not match the recomputed one
    #[error("bad check character in '{id}': expected '{expected}', found '{actual}'")]
    ChecksumMismatch {
        /// The offending identifier
        id: String,
        /// Check character computed from the preceding characters
        expected: char,
        /// Check character present in the identifier
        actual: char,
    },

    /// Identifier is already assigned to a live or removed entity
    #[error("identifier '{0}' has already been issued")]
    Collision(String),

    /// Minting kept producing identifiers that were already issued
    #[error("too many collisions: no unused identifier after {0} attempts")]
    TooManyCollisions(usize),

    /// A skolem reference appears outside any entity-insertion path
    #[error("unrecognized skolem reference '{uri}'")]
    UnrecognizedSkolem {
        /// The skolem URI
        uri: String,
    },
}

/// Patch that fails to parse or fails to apply
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidPatchError {
    /// Text is not a JSON Patch document
    #[error("patch is not well-formed: {0}")]
    Malformed(String),

    /// An operation failed against the target data
    #[error("operation {index} at '{path}' does not apply: {reason}")]
    DoesNotApply {
        /// Zero-based position of the failing operation
        index: usize,
        /// Path of the failing operation
        path: String,
        /// Structural reason
        reason: String,
    },
}

/// Patch request that can no longer be merged
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnmergeablePatchError {
    /// Patch does not apply cleanly to the current version
    #[error("patch no longer applies to version {version}: {source}")]
    NoLongerApplies {
        /// The version it was checked against
        version: VersionId,
        /// Why application failed
        source: InvalidPatchError,
    },

    /// Skolem resolution failed while minting identifiers
    #[error("identifier resolution failed: {0}")]
    Identifier(#[source] IdentifierError),
}

/// Invalid lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MergeError {
    /// No patch request with this id
    #[error("patch request {0} does not exist")]
    UnknownRequest(PatchRequestId),

    /// Request was already merged
    #[error("patch request {0} has already been merged")]
    AlreadyMerged(PatchRequestId),

    /// Request was already rejected
    #[error("patch request {0} is closed")]
    Closed(PatchRequestId),
}

/// Unknown row id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NotFoundError {
    /// No patch request with this id
    #[error("patch request {0} not found")]
    PatchRequest(PatchRequestId),

    /// No version with this id
    #[error("version {0} not found")]
    Version(VersionId),

    /// The store holds no versions yet
    #[error("dataset has not been initialized")]
    NoVersions,
}

/// Flat classification handed to the boundary layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// [`IdentifierError`]
    Identifier,
    /// [`InvalidPatchError`]
    InvalidPatch,
    /// [`UnmergeablePatchError`]
    UnmergeablePatch,
    /// [`MergeError`]
    Merge,
    /// [`NotFoundError`]
    NotFound,
    /// Actor lacks the role for the transition
    PermissionDenied,
    /// Storage, durability or configuration failure
    Internal,
}

/// Error types for the gazetteer engine
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or colliding identifier
    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    /// Patch fails to parse or fails to apply
    #[error(transparent)]
    InvalidPatch(#[from] InvalidPatchError),

    /// Patch applied at submission time but cannot be merged now
    #[error(transparent)]
    Unmergeable(#[from] UnmergeablePatchError),

    /// Invalid lifecycle transition
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Unknown request or version
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// Actor may not perform the transition
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Initial load attempted on a store that already holds versions
    #[error("dataset already initialized at version {0}")]
    AlreadyInitialized(VersionId),

    /// Another transaction committed first (first-committer-wins)
    #[error("transaction conflict: started at generation {started}, store is at {current}")]
    TransactionConflict {
        /// Store generation when the transaction began
        started: u64,
        /// Store generation at commit time
        current: u64,
    },

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Data corruption detected
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Classification for transport mapping
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Identifier(_) => ErrorKind::Identifier,
            Error::InvalidPatch(_) => ErrorKind::InvalidPatch,
            Error::Unmergeable(_) => ErrorKind::UnmergeablePatch,
            Error::Merge(_) | Error::AlreadyInitialized(_) => ErrorKind::Merge,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::TransactionConflict { .. }
            | Error::Storage(_)
            | Error::Serialization(_)
            | Error::Corruption(_)
            | Error::Config(_)
            | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether re-running the whole unit of work may succeed unchanged
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::TransactionConflict { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
