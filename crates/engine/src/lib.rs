//! Patch-and-merge engine for the gazetteer
//!
//! This crate orchestrates the lower layers:
//! - Gazetteer: open/ephemeral construction, one retried transaction per call
//! - Patch validation and affected-entity classification
//! - Skolem resolution: minting permanent identifiers for new entities
//! - Version store: append-only dataset snapshots with stored descriptions
//! - Patch request lifecycle: create, update, comment, reject, merge
//! - Provenance: merged-request feed, entity resolution and history
//!
//! The engine holds no state between operations beyond the store itself.
//! Every operation re-reads the current version inside its own transaction.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod database;
pub mod description;
pub mod lifecycle;
pub mod provenance;
pub mod skolem;
pub mod validator;
pub mod versions;

pub use database::{
    with_transaction, Gazetteer, GazetteerConfig, IdentifierConfig, RequestFilter, RetryConfig,
    TransactionConfig,
};
pub use provenance::{ChangeKind, EntityChange, EntityStatus, ProvenanceEntry};
pub use skolem::{is_skolem, preassigned_id, Resolution, SkolemResolver};
pub use validator::{validate_patch, validate_patch_text, AffectedEntities};
