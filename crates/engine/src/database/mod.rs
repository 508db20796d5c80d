//! Gazetteer struct and open logic
//!
//! This module provides the [`Gazetteer`] facade that orchestrates:
//! - Configuration loading (`periodo.toml`)
//! - Store opening and WAL recovery
//! - One retried transaction per operation
//!
//! Every public operation is a single unit of work. Writers that lose the
//! commit race are re-run against the new current version, as configured in
//! the `[transactions]` table; all other failures are returned unchanged and
//! leave the store as it was.

pub mod config;
mod registry;
mod transactions;

pub use config::{
    GazetteerConfig, IdentifierConfig, TransactionConfig, CONFIG_FILE_NAME, WAL_FILE_NAME,
};
pub use registry::OPEN_GAZETTEERS;
pub use transactions::{with_transaction, RetryConfig};

use crate::lifecycle;
use crate::provenance::{self, EntityChange, EntityStatus, ProvenanceEntry};
use crate::versions;
use chrono::Utc;
use periodo_core::{
    Actor, CommentId, Error, IdMinter, NotFoundError, PatchRequestId, Result, VersionId,
};
use periodo_storage::{
    CommentRow, PatchRequestRow, RequestState, Storage, TableStore, Transaction, VersionRow,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Which patch requests a listing returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestFilter {
    /// Every request
    #[default]
    All,
    /// Awaiting review
    Open,
    /// Merged
    Merged,
    /// Rejected
    Rejected,
}

impl RequestFilter {
    fn accepts(&self, row: &PatchRequestRow) -> bool {
        match self {
            RequestFilter::All => true,
            RequestFilter::Open => row.state() == RequestState::Open,
            RequestFilter::Merged => row.state() == RequestState::Merged,
            RequestFilter::Rejected => row.state() == RequestState::Rejected,
        }
    }
}

// ============================================================================
// Gazetteer Struct
// ============================================================================

/// The patch-and-merge engine over one versioned dataset
///
/// Create one with [`Gazetteer::open`] for an on-disk store or
/// [`Gazetteer::ephemeral`] for an in-memory one.
///
/// # Example
///
/// ```text
/// use periodo_engine::Gazetteer;
/// use periodo_core::Actor;
///
/// let gz = Gazetteer::open("/var/lib/periodo")?;
/// let id = gz.create_patch_request(&Actor::contributor("orcid:0000"), patch_text)?;
/// let version = gz.merge(id, &Actor::reviewer("orcid:0001"))?;
/// ```
#[derive(Debug)]
pub struct Gazetteer {
    store: TableStore,
    config: GazetteerConfig,
    retry: RetryConfig,
    data_dir: Option<PathBuf>,
}

impl Gazetteer {
    /// Open (or create) a gazetteer in `path`
    ///
    /// A default `periodo.toml` is written on first open; the file is then
    /// read for every setting.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Arc<Self>> {
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let config_path = data_dir.join(CONFIG_FILE_NAME);
        GazetteerConfig::write_default_if_missing(&config_path)?;
        let cfg = GazetteerConfig::from_file(&config_path)?;

        Self::open_with_config(path, cfg)
    }

    /// Open a gazetteer in `path` with an explicit configuration
    ///
    /// The configuration is written to `periodo.toml` so later
    /// [`Gazetteer::open`] calls pick up the same settings. If the directory
    /// is already open in this process, the existing instance is returned.
    pub fn open_with_config<P: AsRef<Path>>(path: P, cfg: GazetteerConfig) -> Result<Arc<Self>> {
        cfg.validate()?;
        let mode = cfg.durability_mode()?;

        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        let canonical_path = data_dir.canonicalize()?;

        let mut registry = OPEN_GAZETTEERS.lock();
        if let Some(existing) = registry.get(&canonical_path).and_then(|weak| weak.upgrade()) {
            info!(path = ?canonical_path, "Returning existing gazetteer instance");
            return Ok(existing);
        }

        cfg.write_to_file(&canonical_path.join(CONFIG_FILE_NAME))?;
        let store = TableStore::open(canonical_path.join(WAL_FILE_NAME), mode)?;
        let gazetteer = Arc::new(Gazetteer {
            store,
            retry: cfg.retry(),
            config: cfg,
            data_dir: Some(canonical_path.clone()),
        });
        registry.insert(canonical_path.clone(), Arc::downgrade(&gazetteer));

        info!(
            path = ?canonical_path,
            durability = %gazetteer.config.durability,
            "Gazetteer opened"
        );
        Ok(gazetteer)
    }

    /// In-memory gazetteer with default settings; nothing touches disk
    pub fn ephemeral() -> Arc<Self> {
        Self::ephemeral_with_config(GazetteerConfig::default())
    }

    /// In-memory gazetteer; `durability` is ignored
    pub fn ephemeral_with_config(cfg: GazetteerConfig) -> Arc<Self> {
        Arc::new(Gazetteer {
            store: TableStore::new(),
            retry: cfg.retry(),
            config: cfg,
            data_dir: None,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &GazetteerConfig {
        &self.config
    }

    /// Data directory, `None` when ephemeral
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Whether commits survive a restart
    pub fn is_durable(&self) -> bool {
        self.store.is_durable()
    }

    /// fsync the WAL regardless of durability mode
    pub fn flush(&self) -> Result<()> {
        self.store.sync()
    }

    /// Run `f` as one unit of work with the configured conflict retry
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnMut(&mut Transaction) -> Result<T>,
    {
        with_transaction(&self.store, &self.retry, f)
    }

    fn read<T>(&self, f: impl FnOnce(&Transaction) -> T) -> T {
        f(&self.store.begin())
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Load the first version from a full dataset document
    ///
    /// Skolem references in the document are resolved; pre-assigned
    /// identifiers are honoured. Returns the new version and the skolem map.
    pub fn initialize(&self, document: &Value) -> Result<(VersionId, BTreeMap<String, String>)> {
        let attempts = self.config.identifiers.max_mint_attempts;
        self.transaction(|txn| {
            let mut minter = IdMinter::from_entropy();
            lifecycle::initialize(txn, document, &mut minter, attempts, Utc::now())
        })
    }

    /// Submit a patch against the current version
    pub fn create_patch_request(&self, actor: &Actor, text: &str) -> Result<PatchRequestId> {
        self.transaction(|txn| lifecycle::create(txn, actor, text, Utc::now()))
    }

    /// Replace the patch of an open request
    pub fn update_patch_request(&self, id: PatchRequestId, actor: &Actor, text: &str) -> Result<()> {
        self.transaction(|txn| lifecycle::update(txn, id, actor, text, Utc::now()))
    }

    /// Comment on a request in any state
    pub fn comment(&self, id: PatchRequestId, actor: &Actor, message: &str) -> Result<CommentId> {
        self.transaction(|txn| lifecycle::comment(txn, id, actor, message, Utc::now()))
    }

    /// Reject an open request
    pub fn reject(&self, id: PatchRequestId, actor: &Actor) -> Result<()> {
        self.transaction(|txn| lifecycle::reject(txn, id, actor, Utc::now()))?;
        info!(request = %id, "Rejection committed");
        Ok(())
    }

    /// Merge an open request, returning the version it produced
    pub fn merge(&self, id: PatchRequestId, actor: &Actor) -> Result<VersionId> {
        let attempts = self.config.identifiers.max_mint_attempts;
        let version = self.transaction(|txn| {
            let mut minter = IdMinter::from_entropy();
            lifecycle::merge(txn, id, actor, &mut minter, attempts, Utc::now())
        })?;
        info!(request = %id, version = %version, "Merge committed");
        Ok(version)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Whether an open request still applies to the current version
    pub fn is_mergeable(&self, id: PatchRequestId) -> Result<bool> {
        self.read(|txn| lifecycle::is_mergeable(txn, id))
    }

    /// A patch request by id
    pub fn patch_request(&self, id: PatchRequestId) -> Result<PatchRequestRow> {
        self.read(|txn| txn.patch_request(id).cloned())
            .ok_or_else(|| NotFoundError::PatchRequest(id).into())
    }

    /// Patch requests in id order
    pub fn patch_requests(&self, filter: RequestFilter) -> Vec<PatchRequestRow> {
        self.read(|txn| {
            txn.patch_requests()
                .into_iter()
                .filter(|row| filter.accepts(row))
                .cloned()
                .collect()
        })
    }

    /// Comments on a request in posting order
    pub fn comments(&self, id: PatchRequestId) -> Result<Vec<CommentRow>> {
        self.read(|txn| {
            if txn.patch_request(id).is_none() {
                return Err(Error::from(NotFoundError::PatchRequest(id)));
            }
            Ok(txn.comments_for(id).into_iter().cloned().collect())
        })
    }

    /// Highest-numbered version
    pub fn current_version(&self) -> Result<Arc<VersionRow>> {
        self.read(versions::current)
    }

    /// Version by id
    pub fn version(&self, id: VersionId) -> Result<Arc<VersionRow>> {
        self.read(|txn| versions::at(txn, id))
    }

    /// Every version in id order
    pub fn versions(&self) -> Vec<Arc<VersionRow>> {
        self.read(Transaction::versions)
    }

    /// Merged requests in the order of the versions they produced
    pub fn provenance(&self) -> Vec<ProvenanceEntry> {
        self.read(provenance::feed)
    }

    /// What an identifier denotes now: live data, gone, or never issued
    ///
    /// Identifiers with the retired check character are accepted when
    /// `identifiers.accept_legacy_checksums` is set.
    pub fn resolve_entity(&self, id: &str) -> Result<EntityStatus> {
        let mode = self.config.identifiers.read_validation();
        self.read(|txn| provenance::resolve_entity(txn, id, mode))
    }

    /// Merged changes to one entity, oldest first
    pub fn entity_history(&self, id: &str) -> Vec<EntityChange> {
        self.read(|txn| provenance::entity_history(txn, id))
    }

    /// Identifiers present in the current version
    pub fn all_identifiers_in_use(&self) -> BTreeSet<String> {
        self.read(Transaction::all_identifiers_in_use)
    }

    /// Identifiers removed by merged requests
    pub fn removed_entity_ids(&self) -> BTreeSet<String> {
        self.read(Transaction::removed_entity_ids)
    }
}
