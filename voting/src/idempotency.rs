//! Short-lived duplicate-suppression locks.
//!
//! A lock is an atomic set-if-absent on `{prefix}:vote:idem:{seed}`. The
//! first request holding a given seed wins; every later request with the
//! same seed inside the TTL is a duplicate and must answer from current
//! state without mutating anything. Locks are never released, they expire.
//!
//! The cache is an accelerator only: when it cannot answer, the request
//! proceeds and the store's uniqueness rules stay authoritative.

use crate::cache_aside::CacheAside;
use crate::keys::KeyNamespace;
use crate::model::UserId;
use crate::providers::CacheClient;
use crate::utils::hex_digest;
use std::fmt;
use std::time::Duration;

/// Mutating operation a lock is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Personal info submission.
    PersonalInfo,
    /// Vote submission.
    Vote,
}

impl Operation {
    /// Stable name, part of the seed.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PersonalInfo => "personal_info",
            Self::Vote => "vote",
        }
    }
}

/// Digest identifying one logical request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencySeed(String);

impl IdempotencySeed {
    const SEPARATOR: &'static [u8] = &[0x1f];

    /// Seed from a client-supplied idempotency token.
    ///
    /// # Examples
    ///
    /// ```
    /// use voting_core::idempotency::{IdempotencySeed, Operation};
    /// use voting_core::model::UserId;
    ///
    /// let user = UserId::new("u1");
    /// let a = IdempotencySeed::from_token(&user, Operation::Vote, "tok-1");
    /// let b = IdempotencySeed::from_token(&user, Operation::Vote, "tok-1");
    /// let c = IdempotencySeed::from_token(&user, Operation::PersonalInfo, "tok-1");
    /// assert_eq!(a, b);
    /// assert_ne!(a, c);
    /// ```
    #[must_use]
    pub fn from_token(user_id: &UserId, operation: Operation, token: &str) -> Self {
        Self(hex_digest(&[
            user_id.as_str().as_bytes(),
            Self::SEPARATOR,
            operation.as_str().as_bytes(),
            Self::SEPARATOR,
            b"token",
            Self::SEPARATOR,
            token.as_bytes(),
        ]))
    }

    /// Seed from the normalized request body.
    #[must_use]
    pub fn from_body(user_id: &UserId, operation: Operation, fields: &[&str]) -> Self {
        let mut parts: Vec<&[u8]> = vec![
            user_id.as_str().as_bytes(),
            Self::SEPARATOR,
            operation.as_str().as_bytes(),
            Self::SEPARATOR,
            b"body",
        ];
        for field in fields {
            parts.push(Self::SEPARATOR);
            parts.push(field.as_bytes());
        }
        Self(hex_digest(&parts))
    }

    /// Hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencySeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lock acquisition outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// This request owns the seed.
    Acquired,
    /// An equivalent request already owns the seed.
    Duplicate,
    /// The cache could not answer; proceed without a lock.
    Bypassed,
}

/// Lock manager bound to one cache and namespace.
#[derive(Debug, Clone)]
pub struct IdempotencyLocks<C> {
    aside: CacheAside<C>,
    keys: KeyNamespace,
    ttl: Duration,
}

impl<C> IdempotencyLocks<C>
where
    C: CacheClient + Clone + 'static,
{
    /// Create a lock manager.
    #[must_use]
    pub const fn new(aside: CacheAside<C>, keys: KeyNamespace, ttl: Duration) -> Self {
        Self { aside, keys, ttl }
    }

    /// Try to take the lock for `seed`.
    pub async fn try_acquire(&self, seed: &IdempotencySeed) -> LockOutcome {
        let key = self.keys.idempotency(seed.as_str());
        let cache = self.aside.client();
        match self.aside.call(cache.set_if_absent(&key, "1", self.ttl)).await {
            Ok(true) => LockOutcome::Acquired,
            Ok(false) => {
                metrics::counter!("voting.idempotency.duplicate").increment(1);
                tracing::warn!(seed = %seed, "Duplicate request suppressed");
                LockOutcome::Duplicate
            }
            Err(e) => {
                metrics::counter!("voting.cache.error", "op" => "set_if_absent").increment(1);
                tracing::warn!(seed = %seed, error = %e, "Idempotency lock unavailable, proceeding");
                LockOutcome::Bypassed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockCacheClient;

    fn locks(cache: MockCacheClient, ttl: Duration) -> IdempotencyLocks<MockCacheClient> {
        IdempotencyLocks::new(
            CacheAside::new(cache, Duration::from_secs(1), Duration::from_secs(1)),
            KeyNamespace::new("test"),
            ttl,
        )
    }

    #[test]
    fn test_body_seed_depends_on_every_field() {
        let user = UserId::new("u1");
        let a = IdempotencySeed::from_body(&user, Operation::PersonalInfo, &["ab", "c"]);
        let b = IdempotencySeed::from_body(&user, Operation::PersonalInfo, &["a", "bc"]);
        let c = IdempotencySeed::from_body(&UserId::new("u2"), Operation::PersonalInfo, &["ab", "c"]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_token_and_body_seeds_differ() {
        let user = UserId::new("u1");
        assert_ne!(
            IdempotencySeed::from_token(&user, Operation::Vote, "x"),
            IdempotencySeed::from_body(&user, Operation::Vote, &["x"])
        );
    }

    #[tokio::test]
    async fn test_second_acquire_is_duplicate() {
        let locks = locks(MockCacheClient::new(), Duration::from_secs(60));
        let seed = IdempotencySeed::from_token(&UserId::new("u1"), Operation::Vote, "t");
        assert_eq!(locks.try_acquire(&seed).await, LockOutcome::Acquired);
        assert_eq!(locks.try_acquire(&seed).await, LockOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_lock_expires() {
        let locks = locks(MockCacheClient::new(), Duration::from_millis(20));
        let seed = IdempotencySeed::from_token(&UserId::new("u1"), Operation::Vote, "t");
        assert_eq!(locks.try_acquire(&seed).await, LockOutcome::Acquired);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(locks.try_acquire(&seed).await, LockOutcome::Acquired);
    }

    #[tokio::test]
    async fn test_cache_outage_bypasses_lock() {
        let locks = locks(MockCacheClient::unavailable(), Duration::from_secs(60));
        let seed = IdempotencySeed::from_token(&UserId::new("u1"), Operation::Vote, "t");
        assert_eq!(locks.try_acquire(&seed).await, LockOutcome::Bypassed);
    }
}
