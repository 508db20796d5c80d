//! Core types for the PeriodO gazetteer engine
//!
//! This crate defines the foundational types used throughout the system:
//! - Error: error hierarchy for every failure kind the engine reports
//! - Identifiers: minting and validating checksummed authority/period ids
//! - JSON types: JsonPointer, PatchOp, Patch
//! - Dataset: read-only view of the whole gazetteer document
//! - Row ids and actors: VersionId, PatchRequestId, CommentId, Actor

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dataset;
pub mod error;
pub mod identifier;
pub mod json;
pub mod types;

pub use dataset::{Dataset, DatasetStats, EntityRef};
pub use error::{
    Error, ErrorKind, IdentifierError, InvalidPatchError, MergeError, NotFoundError, Result,
    UnmergeablePatchError,
};
pub use identifier::{EntityKind, IdMinter, ValidationMode};
pub use json::{JsonPointer, Patch, PatchOp, PointerParseError};
pub use types::{Actor, CommentId, PatchRequestId, Role, Timestamp, VersionId};
