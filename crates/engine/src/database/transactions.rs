//! Transaction configuration and retry logic
//!
//! Every gazetteer operation is one unit of work: begin a transaction, run a
//! closure against it, commit. When another writer commits first, the store
//! rejects the commit with `Error::TransactionConflict` and the whole closure
//! is re-run against fresh state. Any other error is returned as is.

use periodo_core::{Error, Result};
use periodo_storage::{Storage, Transaction};
use std::time::Duration;

// ============================================================================
// Retry Policy
// ============================================================================

/// How often, and how patiently, a unit of work is re-run after losing a
/// commit race
///
/// Built from the `[transactions]` table of `periodo.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Re-runs allowed after the first attempt
    pub max_retries: usize,
    /// Sleep before the first re-run; doubles on each further one
    pub base_delay_ms: u64,
    /// Ceiling for the sleep
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Policy that surfaces the first conflict
    pub fn no_retry() -> Self {
        RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        }
    }

    /// Sleep before re-run number `attempt + 1`
    pub(crate) fn calculate_delay(&self, attempt: usize) -> Duration {
        let factor = u32::try_from(attempt).map_or(u64::MAX, |n| 2u64.saturating_pow(n));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

// ============================================================================
// Unit of work
// ============================================================================

/// Run `f` in a transaction, committing on `Ok` and rolling back on `Err`
///
/// Commit conflicts re-run `f` from the start on a new snapshot, up to
/// `config.max_retries` times. `f` must therefore derive everything it writes
/// from the transaction it is handed.
pub fn with_transaction<S, F, T>(store: &S, config: &RetryConfig, mut f: F) -> Result<T>
where
    S: Storage + ?Sized,
    F: FnMut(&mut Transaction) -> Result<T>,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        let mut txn = store.begin();
        let value = match f(&mut txn) {
            Ok(value) => value,
            Err(e) => {
                store.rollback(txn);
                return Err(e);
            }
        };
        match store.commit(txn) {
            Ok(_) => return Ok(value),
            Err(e) if e.is_conflict() && attempt < config.max_retries => {
                tracing::debug!(attempt, error = %e, "Retrying transaction after conflict");
                last_error = Some(e);
                std::thread::sleep(config.calculate_delay(attempt));
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error
        .unwrap_or_else(|| Error::Storage("retry loop exited without a result".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use periodo_core::{Dataset, MergeError, PatchRequestId};
    use periodo_storage::TableStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_delay_is_exponential_and_capped() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 50,
        };
        assert_eq!(config.calculate_delay(0), Duration::from_millis(10));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(20));
        assert_eq!(config.calculate_delay(2), Duration::from_millis(40));
        assert_eq!(config.calculate_delay(3), Duration::from_millis(50));
        assert_eq!(config.calculate_delay(200), Duration::from_millis(50));
    }

    #[test]
    fn test_error_rolls_back_and_is_not_retried() {
        let store = TableStore::new();
        let mut calls = 0;
        let result: Result<()> = with_transaction(&store, &RetryConfig::default(), |txn| {
            calls += 1;
            txn.insert_comment(PatchRequestId::new(1), "a", "lost", Utc::now());
            Err(MergeError::UnknownRequest(PatchRequestId::new(1)).into())
        });
        assert!(matches!(result, Err(Error::Merge(_))));
        assert_eq!(calls, 1);
        assert_eq!(store.generation(), 0);
    }

    /// Store that fails the first `n` write commits with a conflict
    struct Contended {
        inner: TableStore,
        conflicts_left: AtomicU64,
    }

    impl Storage for Contended {
        fn begin(&self) -> Transaction {
            self.inner.begin()
        }

        fn commit(&self, txn: Transaction) -> Result<u64> {
            if self.conflicts_left.load(Ordering::SeqCst) > 0 {
                self.conflicts_left.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::TransactionConflict { started: 0, current: 1 });
            }
            self.inner.commit(txn)
        }

        fn rollback(&self, txn: Transaction) {
            self.inner.rollback(txn)
        }
    }

    #[test]
    fn test_conflict_reruns_closure() {
        let store = Contended {
            inner: TableStore::new(),
            conflicts_left: AtomicU64::new(2),
        };
        let config = RetryConfig {
            base_delay_ms: 0,
            ..RetryConfig::default()
        };
        let mut calls = 0;
        let id = with_transaction(&store, &config, |txn| {
            calls += 1;
            Ok(txn.append_version(Dataset::empty(), json!({}), Utc::now()))
        })
        .unwrap();
        assert_eq!(calls, 3);
        assert_eq!(id.as_u64(), 0);
        assert_eq!(store.inner.generation(), 1);
    }

    #[test]
    fn test_conflict_surfaces_when_retries_exhausted() {
        let store = Contended {
            inner: TableStore::new(),
            conflicts_left: AtomicU64::new(5),
        };
        let result = with_transaction(&store, &RetryConfig::no_retry(), |txn| {
            Ok(txn.append_version(Dataset::empty(), json!({}), Utc::now()))
        });
        assert!(result.unwrap_err().is_conflict());
    }
}
