//! The consistency core.
//!
//! [`VotingCore`] orchestrates every user-facing operation over a
//! [`VoterStore`] (authoritative) and a [`CacheClient`] (disposable):
//!
//! | Operation                        | Module             |
//! |----------------------------------|--------------------|
//! | `accept_welcome`                 | [`welcome`]        |
//! | `submit_personal_info`           | [`personal_info`]  |
//! | `submit_vote`                    | [`vote`]           |
//! | status, lookups, results, random | [`queries`]        |
//!
//! # Invariants
//!
//! - Store writes are the only authoritative path. Cache state only ever
//!   short-circuits a request into a rejection or a replay, never into a
//!   write.
//! - Cache maintenance after a write is detached: a slow or failing cache
//!   never fails or delays the response.
//! - Every store call runs under the store deadline; a timeout surfaces as
//!   [`VotingError::Store`].

pub mod personal_info;
pub mod queries;
pub mod vote;
pub mod welcome;

mod fetchers;

use crate::cache_aside::CacheAside;
use crate::config::VotingConfig;
use crate::error::{Result, VotingError};
use crate::idempotency::IdempotencyLocks;
use crate::keys::KeyNamespace;
use crate::providers::{CacheClient, Clock, SystemClock, VoterStore};
use crate::random::RandomSelector;
use crate::rate_limit::FixedWindowRateLimiter;
use crate::results::ResultsAggregator;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Run a store call under `timeout`.
pub(crate) async fn bounded<T, F>(timeout: Duration, op: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if let Ok(result) = tokio::time::timeout(timeout, fut).await {
        result
    } else {
        metrics::counter!("voting.store.timeout", "op" => op).increment(1);
        tracing::error!(
            op = op,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "Store call timed out"
        );
        Err(VotingError::Store(format!("{op} timed out")))
    }
}

/// Voting consistency core.
///
/// Cheap to share: wrap it in an [`Arc`] and call it from any task.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use voting_core::config::{Environment, VotingConfig};
/// use voting_core::mocks::{MockCacheClient, MockVoterStore};
/// use voting_core::model::{Candidate, CandidateId, UserId};
/// use voting_core::VotingCore;
///
/// # tokio_test::block_on(async {
/// let store = MockVoterStore::with_candidates([Candidate {
///     id: CandidateId(1),
///     name: "Team A".into(),
///     description: String::new(),
///     member_count: 3,
///     active: true,
/// }]);
/// let core = VotingCore::with_system_clock(
///     store,
///     MockCacheClient::new(),
///     VotingConfig::new(Environment::Development),
/// );
///
/// let status = core.get_user_status(&UserId::new("u1")).await.unwrap();
/// assert!(!status.welcome_accepted);
/// # });
/// ```
pub struct VotingCore<S, C> {
    store: Arc<S>,
    aside: CacheAside<C>,
    keys: KeyNamespace,
    clock: Arc<dyn Clock>,
    config: VotingConfig,
    locks: IdempotencyLocks<C>,
    results: ResultsAggregator<S, C>,
    random: RandomSelector<S, C>,
    limiter: FixedWindowRateLimiter<C>,
}

impl<S, C> VotingCore<S, C>
where
    S: VoterStore,
    C: CacheClient + Clone + 'static,
{
    /// Assemble the core from its collaborators.
    #[must_use]
    pub fn new(store: S, cache: C, clock: Arc<dyn Clock>, config: VotingConfig) -> Self {
        let store = Arc::new(store);
        let aside = CacheAside::new(cache, config.cache_timeout, config.background_timeout);
        let keys = KeyNamespace::new(&config.key_prefix);

        let locks = IdempotencyLocks::new(aside.clone(), keys.clone(), config.ttls.idempotency);
        let results = ResultsAggregator::new(
            Arc::clone(&store),
            aside.clone(),
            keys.clone(),
            Arc::clone(&clock),
            config.ttls.results,
            config.store_timeout,
        );
        let random = RandomSelector::new(
            Arc::clone(&store),
            aside.clone(),
            keys.clone(),
            config.ttls.served_vote,
            config.random_max_attempts,
            config.store_timeout,
        );
        let limiter = FixedWindowRateLimiter::new(
            aside.clone(),
            keys.clone(),
            Arc::clone(&clock),
            config.rate_limit.limit,
            config.rate_limit.window,
        );

        tracing::info!(
            environment = config.environment.as_str(),
            key_prefix = %config.key_prefix,
            "Voting core initialized"
        );

        Self {
            store,
            aside,
            keys,
            clock,
            config,
            locks,
            results,
            random,
            limiter,
        }
    }

    /// Assemble the core with the wall clock.
    #[must_use]
    pub fn with_system_clock(store: S, cache: C, config: VotingConfig) -> Self {
        Self::new(store, cache, Arc::new(SystemClock), config)
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &VotingConfig {
        &self.config
    }

    /// The authoritative store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Key builder for this deployment.
    #[must_use]
    pub const fn keys(&self) -> &KeyNamespace {
        &self.keys
    }

    async fn store_call<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        bounded(self.config.store_timeout, op, fut).await
    }
}
