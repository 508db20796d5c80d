//! PeriodO - versioned patch-and-merge engine for a period gazetteer
//!
//! The gazetteer is one JSON document of authorities and the periods they
//! define. Contributors submit JSON Patches against the current version;
//! reviewers merge them, producing a new immutable version and minting
//! permanent identifiers for new entities.
//!
//! # Quick Start
//!
//! ```ignore
//! use periodo::{Actor, Gazetteer};
//!
//! let gz = Gazetteer::open("./data")?;
//! gz.initialize(&serde_json::json!({"authorities": {}}))?;
//!
//! let id = gz.create_patch_request(&Actor::contributor("orcid:0000"), patch_text)?;
//! let version = gz.merge(id, &Actor::reviewer("orcid:0001"))?;
//! ```
//!
//! # Architecture
//!
//! All operations go through the [`Gazetteer`] facade. Storage and WAL
//! internals are not exposed; only the engine API and the core value types
//! it speaks in are public.

pub use periodo_core::{
    Actor, CommentId, Dataset, EntityKind, Error, ErrorKind, IdentifierError, InvalidPatchError,
    JsonPointer, MergeError, NotFoundError, Patch, PatchOp, PatchRequestId, Result, Role,
    UnmergeablePatchError, ValidationMode, VersionId,
};
pub use periodo_engine::{
    ChangeKind, EntityChange, EntityStatus, Gazetteer, GazetteerConfig, ProvenanceEntry,
    RequestFilter,
};
