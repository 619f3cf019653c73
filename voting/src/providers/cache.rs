//! Key-value cache capability.
//!
//! # Contract
//!
//! The cache is never the source of truth. Callers treat every
//! [`CacheError`] as a miss and fall back to the store, so implementations
//! should fail fast rather than retry.

use crate::error::CacheError;
use std::future::Future;
use std::time::Duration;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// One command of an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOp {
    /// Set with expiry.
    Set {
        /// Key
        key: String,
        /// Serialized value
        value: String,
        /// Lifetime
        ttl: Duration,
    },
    /// Delete one key.
    Delete {
        /// Key
        key: String,
    },
    /// Increment an integer counter by one.
    Increment {
        /// Key
        key: String,
    },
    /// Set expiry on an existing key.
    Expire {
        /// Key
        key: String,
        /// Lifetime
        ttl: Duration,
    },
    /// Remaining lifetime of a key.
    Ttl {
        /// Key
        key: String,
    },
}

/// Reply to one [`CacheOp`], positionally matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheReply {
    /// `Set` acknowledged.
    Ok,
    /// `Delete` / `Expire`: number of keys affected.
    Affected(u64),
    /// `Increment`: value after increment.
    Counter(i64),
    /// `Ttl`: remaining lifetime, `None` if the key is missing or has no expiry.
    Ttl(Option<Duration>),
}

/// Cache client.
///
/// Implementations must be cheap to clone: the core clones the client into
/// detached background tasks.
///
/// # Example
///
/// ```no_run
/// use voting_core::providers::CacheClient;
/// use std::time::Duration;
///
/// # async fn example(cache: impl CacheClient) -> Result<(), Box<dyn std::error::Error>> {
/// // First caller wins the lock for 60 seconds
/// let first = cache.set_if_absent("dev:vote:idem:abc", "1", Duration::from_secs(60)).await?;
/// # Ok(())
/// # }
/// ```
pub trait CacheClient: Send + Sync {
    /// Get a value.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn get(&self, key: &str) -> impl Future<Output = CacheResult<Option<String>>> + Send;

    /// Set a value with expiry, overwriting any previous value.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = CacheResult<()>> + Send;

    /// Atomically set a value only if the key does not exist.
    ///
    /// # Returns
    ///
    /// `true` if this call created the key.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = CacheResult<bool>> + Send;

    /// Delete exact keys.
    ///
    /// # Returns
    ///
    /// Number of keys removed.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn delete(&self, keys: &[String]) -> impl Future<Output = CacheResult<u64>> + Send;

    /// Delete every key matching a glob pattern (`*` wildcard).
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn delete_pattern(&self, pattern: &str) -> impl Future<Output = CacheResult<u64>> + Send;

    /// Atomically increment an integer counter, creating it at 1.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails or the value is not an integer.
    fn increment(&self, key: &str) -> impl Future<Output = CacheResult<i64>> + Send;

    /// Set expiry on an existing key.
    ///
    /// # Returns
    ///
    /// `true` if the key exists.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = CacheResult<bool>> + Send;

    /// Remaining lifetime of a key.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    fn ttl(&self, key: &str) -> impl Future<Output = CacheResult<Option<Duration>>> + Send;

    /// Execute commands as one atomic batch.
    ///
    /// # Returns
    ///
    /// One reply per op, in order.
    ///
    /// # Errors
    ///
    /// Returns error if the batch fails; no partial replies are returned.
    fn pipeline(
        &self,
        ops: Vec<CacheOp>,
    ) -> impl Future<Output = CacheResult<Vec<CacheReply>>> + Send;
}
