//! Read-only operations.

use super::VotingCore;
use super::fetchers::{CandidateFetcher, PersonalInfoFetcher};
use crate::error::{Result, VotingError};
use crate::model::{
    Candidate, CandidateId, PersonalInfoRecord, RateLimitDecision, UserId, UserStatus, VoterRecord,
};
use crate::providers::{CacheClient, VoterStore};
use crate::results::{RankedResults, VoteTotals};

impl<S, C> VotingCore<S, C>
where
    S: VoterStore,
    C: CacheClient + Clone + 'static,
{
    /// Progression status of `user_id`.
    ///
    /// Always read from the store: a cached status could lag behind a write
    /// whose invalidation is still in flight and show a step going backwards.
    /// Unknown users are at [`Step::Welcome`](crate::model::Step::Welcome).
    ///
    /// # Errors
    ///
    /// Returns `VotingError::Store` if the store fails.
    pub async fn get_user_status(&self, user_id: &UserId) -> Result<UserStatus> {
        let record = self
            .store_call("get_voter", self.store.get_voter(user_id))
            .await?;
        Ok(UserStatus::from_record(record.as_ref()))
    }

    /// Personal info of `user_id`, cache-aside.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Nothing was submitted yet → `VotingError::UserNotFound`
    /// - Cache misses and the store fails → `VotingError::Store`
    pub async fn get_personal_info(&self, user_id: &UserId) -> Result<PersonalInfoRecord> {
        let fetcher = PersonalInfoFetcher {
            store: self.store.as_ref(),
            user_id,
            timeout: self.config.store_timeout,
        };
        self.aside
            .get_or_fetch(
                &self.keys.personal_info(user_id),
                self.config.ttls.personal_info,
                &fetcher,
            )
            .await?
            .ok_or(VotingError::UserNotFound)
    }

    /// Candidate by id, cache-aside. Inactive candidates are returned too.
    ///
    /// # Errors
    ///
    /// Returns `VotingError::Store` if the cache misses and the store fails.
    pub async fn get_candidate(&self, id: CandidateId) -> Result<Option<Candidate>> {
        let fetcher = CandidateFetcher {
            store: self.store.as_ref(),
            id,
            timeout: self.config.store_timeout,
        };
        self.aside
            .get_or_fetch(&self.keys.candidate(id), self.config.ttls.candidate, &fetcher)
            .await
    }

    /// Ranked results, cached for a short TTL.
    ///
    /// # Errors
    ///
    /// Returns `VotingError::Store` if the cache misses and the store fails.
    pub async fn get_voting_results(&self) -> Result<RankedResults> {
        self.results.results().await
    }

    /// Vote counts, served from cached results when present.
    ///
    /// # Errors
    ///
    /// Returns `VotingError::Store` if the cache misses and the store fails.
    pub async fn get_vote_totals(&self) -> Result<VoteTotals> {
        self.results.totals().await
    }

    /// A random complete vote, avoiding recently served ones.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - No complete vote exists → `VotingError::NoVotesAvailable`
    /// - Store fails → `VotingError::Store`
    pub async fn get_random_unserved_vote(&self) -> Result<VoterRecord> {
        self.random.pick_unserved().await
    }

    /// Count one request for `subject_hash` against the configured window.
    ///
    /// Pass a [`hash_subject`](crate::utils::hash_subject) digest, never a
    /// raw address. Allows the request when the cache is down.
    pub async fn check_rate_limit(&self, subject_hash: &str) -> RateLimitDecision {
        self.limiter.check_and_increment(subject_hash).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{Environment, VotingConfig};
    use crate::mocks::{MockCacheClient, MockVoterStore};
    use crate::model::{Candidate, RequestContext, Step};
    use std::time::Duration;

    fn candidate(id: u32, name: &str, active: bool) -> Candidate {
        Candidate {
            id: CandidateId(id),
            name: name.to_string(),
            description: format!("{name} team"),
            member_count: 4,
            active,
        }
    }

    fn core(store: MockVoterStore, cache: MockCacheClient) -> VotingCore<MockVoterStore, MockCacheClient> {
        VotingCore::with_system_clock(store, cache, VotingConfig::new(Environment::Development))
    }

    #[tokio::test]
    async fn test_unknown_user_starts_at_welcome() {
        let core = core(MockVoterStore::new(), MockCacheClient::new());
        let status = core.get_user_status(&UserId::new("nobody")).await.unwrap();
        assert_eq!(status.current_step, Step::Welcome);
    }

    #[tokio::test]
    async fn test_status_follows_store_not_cache() {
        let cache = MockCacheClient::new();
        let core = core(MockVoterStore::new(), cache.clone());
        let user = UserId::new("u1");
        core.accept_welcome(&user, "v1", &RequestContext::default())
            .await
            .unwrap();

        // A stale marker must not move status
        cache
            .set(&core.keys().vote_status(&user), "{}", Duration::from_secs(60))
            .await
            .unwrap();
        let status = core.get_user_status(&user).await.unwrap();
        assert_eq!(status.current_step, Step::PersonalInfo);
    }

    #[tokio::test]
    async fn test_candidate_lookup_is_cached() {
        let cache = MockCacheClient::new();
        let core = core(
            MockVoterStore::with_candidates([candidate(1, "A", true), candidate(2, "B", false)]),
            cache.clone(),
        );

        let found = core.get_candidate(CandidateId(2)).await.unwrap().unwrap();
        assert!(!found.active);
        assert!(core.get_candidate(CandidateId(9)).await.unwrap().is_none());

        let key = core.keys().candidate(CandidateId(2));
        for _ in 0..100 {
            if cache.peek(&key).is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(cache.peek(&key).is_some());
        assert!(cache.peek(&core.keys().candidate(CandidateId(9))).is_none());
    }

    #[tokio::test]
    async fn test_personal_info_missing() {
        let core = core(MockVoterStore::new(), MockCacheClient::new());
        assert_eq!(
            core.get_personal_info(&UserId::new("u1")).await.unwrap_err(),
            VotingError::UserNotFound
        );
    }

    #[tokio::test]
    async fn test_totals_without_cached_results() {
        let core = core(
            MockVoterStore::with_candidates([candidate(1, "A", true), candidate(2, "B", true)]),
            MockCacheClient::new(),
        );
        let totals = core.get_vote_totals().await.unwrap();
        assert_eq!(totals.total_votes, 0);
        assert_eq!(totals.candidates.len(), 2);
    }

    #[tokio::test]
    async fn test_results_exclude_inactive_candidates() {
        let core = core(
            MockVoterStore::with_candidates([candidate(1, "A", true), candidate(2, "B", false)]),
            MockCacheClient::new(),
        );
        let results = core.get_voting_results().await.unwrap();
        assert_eq!(results.entries.len(), 1);
        assert!(results.winner.is_none());
    }

    #[tokio::test]
    async fn test_store_outage_surfaces_as_store_error() {
        let store = MockVoterStore::new();
        store.set_available(false);
        let core = core(store, MockCacheClient::new());
        assert!(matches!(
            core.get_user_status(&UserId::new("u1")).await,
            Err(VotingError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_uses_configured_limit() {
        let config = VotingConfig::new(Environment::Development)
            .with_rate_limit(2, Duration::from_secs(60));
        let core = VotingCore::with_system_clock(MockVoterStore::new(), MockCacheClient::new(), config);
        assert!(core.check_rate_limit("h").await.allowed);
        assert!(core.check_rate_limit("h").await.allowed);
        let decision = core.check_rate_limit("h").await;
        assert!(!decision.allowed);
        assert_eq!(decision.limit, 2);
    }
}
