//! Random display of finalized votes with best-effort anti-repeat.

use crate::cache_aside::CacheAside;
use crate::consistency::bounded;
use crate::error::{Result, VotingError};
use crate::keys::KeyNamespace;
use crate::model::VoterRecord;
use crate::providers::{CacheClient, VoterStore};
use std::sync::Arc;
use std::time::Duration;

/// Picks complete vote records, preferring ones not served recently.
///
/// A record counts as served once a set-if-absent on its served marker
/// succeeds. Up to `max_attempts` records are drawn; if every draw collides
/// (or the cache cannot answer) the last draw is returned anyway.
pub struct RandomSelector<S, C> {
    store: Arc<S>,
    aside: CacheAside<C>,
    keys: KeyNamespace,
    served_ttl: Duration,
    max_attempts: u32,
    store_timeout: Duration,
}

impl<S, C> RandomSelector<S, C>
where
    S: VoterStore,
    C: CacheClient + Clone + 'static,
{
    /// Create a selector.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        aside: CacheAside<C>,
        keys: KeyNamespace,
        served_ttl: Duration,
        max_attempts: u32,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            aside,
            keys,
            served_ttl,
            max_attempts: max_attempts.max(1),
            store_timeout,
        }
    }

    /// Draw one record.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - No complete vote exists → `VotingError::NoVotesAvailable`
    /// - Store fails → `VotingError::Store`
    pub async fn pick_unserved(&self) -> Result<VoterRecord> {
        let mut last = None;

        for attempt in 1..=self.max_attempts {
            let record = bounded(
                self.store_timeout,
                "random_complete_vote",
                self.store.random_complete_vote(),
            )
            .await?
            .ok_or(VotingError::NoVotesAvailable)?;

            let Some(vote_id) = record.vote_id.clone() else {
                last = Some(record);
                continue;
            };

            let key = self.keys.served_vote(&vote_id);
            let cache = self.aside.client();
            match self.aside.call(cache.set_if_absent(&key, "1", self.served_ttl)).await {
                Ok(true) => {
                    tracing::debug!(vote_id = %vote_id, attempt = attempt, "Serving vote");
                    return Ok(record);
                }
                Ok(false) => {
                    metrics::counter!("voting.random.collision").increment(1);
                    tracing::debug!(vote_id = %vote_id, attempt = attempt, "Vote served recently, redrawing");
                    last = Some(record);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Served marker unavailable, serving without anti-repeat");
                    return Ok(record);
                }
            }
        }

        tracing::debug!(attempts = self.max_attempts, "Every draw collided, repeating last draw");
        last.ok_or(VotingError::NoVotesAvailable)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mocks::{MockCacheClient, MockVoterStore};
    use crate::model::{CandidateId, UserId, VoteId};
    use chrono::Utc;
    use std::collections::HashSet;

    fn voted(user: &str, vote: &str) -> VoterRecord {
        let mut record = VoterRecord::new(UserId::new(user), Utc::now());
        record.phone = Some(format!("08{:08}", user.len()));
        record.candidate_id = Some(CandidateId(1));
        record.vote_id = Some(VoteId(vote.to_string()));
        record.voted_at = Some(Utc::now());
        record
    }

    fn selector_with_attempts(
        store: MockVoterStore,
        cache: MockCacheClient,
        attempts: u32,
    ) -> RandomSelector<MockVoterStore, MockCacheClient> {
        RandomSelector::new(
            Arc::new(store),
            CacheAside::new(cache, Duration::from_secs(1), Duration::from_secs(1)),
            KeyNamespace::new("test"),
            Duration::from_secs(3600),
            attempts,
            Duration::from_secs(1),
        )
    }

    fn selector(store: MockVoterStore, cache: MockCacheClient) -> RandomSelector<MockVoterStore, MockCacheClient> {
        selector_with_attempts(store, cache, 10)
    }

    #[tokio::test]
    async fn test_empty_pool() {
        let selector = selector(MockVoterStore::new(), MockCacheClient::new());
        assert_eq!(
            selector.pick_unserved().await.unwrap_err(),
            VotingError::NoVotesAvailable
        );
    }

    #[tokio::test]
    async fn test_single_record_repeats_after_collisions() {
        let store = MockVoterStore::new();
        store.insert_voter(voted("u1", "V2026-AAAAAAAAAA"));
        let selector = selector(store, MockCacheClient::new());

        let first = selector.pick_unserved().await.unwrap();
        let second = selector.pick_unserved().await.unwrap();
        assert_eq!(first.user_id, second.user_id);
    }

    #[tokio::test]
    async fn test_prefers_unserved_records() {
        let store = MockVoterStore::new();
        store.insert_voter(voted("u1", "V2026-AAAAAAAAAA"));
        store.insert_voter(voted("u22", "V2026-BBBBBBBBBB"));
        let selector = selector_with_attempts(store, MockCacheClient::new(), 64);

        let mut seen = HashSet::new();
        for _ in 0..2 {
            seen.insert(selector.pick_unserved().await.unwrap().user_id);
        }
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn test_cache_outage_still_serves() {
        let store = MockVoterStore::new();
        store.insert_voter(voted("u1", "V2026-AAAAAAAAAA"));
        let selector = selector(store, MockCacheClient::unavailable());
        assert!(selector.pick_unserved().await.is_ok());
    }
}
