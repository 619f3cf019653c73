//! Vote finalization.
//!
//! A vote is written once. Duplicate detection runs cheapest first:
//!
//! 1. idempotency lock (only with a client token) → replay the stored vote
//! 2. cached vote marker → `VoteFinalized`
//! 3. stored record → `VoteFinalized`, or `StepNotReached` before personal info
//! 4. conditional store update → `VoteFinalized` when it matches no row
//!
//! Only step 4 is authoritative. Steps 1-3 only ever reject early.

use super::VotingCore;
use crate::error::{Result, UniqueField, VotingError};
use crate::idempotency::{IdempotencySeed, LockOutcome, Operation};
use crate::model::{
    Candidate, CandidateId, RequestContext, UserId, UserStatus, VoteConfirmation, VoteId,
    VoteMarker, VoteUpdate, VoterRecord,
};
use crate::providers::{CacheClient, CacheOp, VoterStore};

impl<S, C> VotingCore<S, C>
where
    S: VoterStore,
    C: CacheClient + Clone + 'static,
{
    /// Finalize the vote of `user_id` for `candidate_id`.
    ///
    /// A retry carrying the same `ctx.idempotency_token` receives the
    /// original confirmation; any other repeat is rejected.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `candidate_id` is zero → `VotingError::Validation`
    /// - No voter record exists → `VotingError::UserNotFound`
    /// - Welcome or personal info is missing → `VotingError::StepNotReached`
    /// - Candidate is unknown or inactive → `VotingError::CandidateNotFound`
    /// - The user already voted → `VotingError::VoteFinalized`
    /// - An equivalent request has not committed yet → `VotingError::AlreadyProcessing`
    /// - The store fails → `VotingError::Store`
    pub async fn submit_vote(
        &self,
        user_id: &UserId,
        candidate_id: CandidateId,
        ctx: &RequestContext,
    ) -> Result<VoteConfirmation> {
        if candidate_id.0 == 0 {
            return Err(VotingError::validation("candidate_id", "must be positive"));
        }

        if let Some(token) = ctx.idempotency_token.as_deref() {
            let seed = IdempotencySeed::from_token(user_id, Operation::Vote, token);
            if self.locks.try_acquire(&seed).await == LockOutcome::Duplicate {
                return self.replay_vote(user_id).await;
            }
        }

        let marker_key = self.keys.vote_status(user_id);
        if let Some(marker) = self.aside.read::<VoteMarker>(&marker_key).await {
            return Err(Self::already_voted(user_id, marker.candidate_id, "cache"));
        }

        let record = self
            .store_call("get_voter", self.store.get_voter(user_id))
            .await?
            .ok_or(VotingError::UserNotFound)?;
        if let Some(marker) = VoteMarker::from_record(&record) {
            // Repair the cache so the next attempt stops at step 2
            self.aside
                .spawn_write(&marker_key, &marker, self.config.ttls.vote_status);
            return Err(Self::already_voted(user_id, marker.candidate_id, "store"));
        }

        if !record.welcome_accepted || !record.has_personal_info() {
            let step = UserStatus::from_record(Some(&record)).current_step;
            tracing::warn!(user_id = %user_id, step = %step, "Vote before completing earlier steps");
            return Err(VotingError::StepNotReached { step });
        }

        let candidate = self
            .get_candidate(candidate_id)
            .await?
            .filter(|candidate| candidate.active)
            .ok_or(VotingError::CandidateNotFound)?;

        let now = self.clock.now();
        let update = VoteUpdate {
            user_id: user_id.clone(),
            candidate_id,
            vote_id: record.vote_id.clone().unwrap_or_else(|| VoteId::generate(now)),
            voted_at: now,
            ip: ctx.ip.clone(),
            user_agent: ctx.user_agent.clone(),
        };

        let stored = self
            .store_call("finalize_vote", self.store.finalize_vote(&update))
            .await
            .map_err(|e| match e {
                VotingError::ConstraintViolation {
                    field: UniqueField::Vote,
                } => Self::already_voted(user_id, candidate_id, "constraint"),
                VotingError::ConstraintViolation { field } => {
                    tracing::error!(user_id = %user_id, field = field.as_str(), "Unexpected constraint violation");
                    VotingError::Store(format!("constraint violation on {}", field.as_str()))
                }
                VotingError::UserNotFound | VotingError::CandidateNotFound => e,
                other => {
                    tracing::error!(user_id = %user_id, error = %other, "Failed to finalize vote");
                    other
                }
            })?;

        let confirmation = Self::confirmation(&stored, &candidate, &update);
        self.after_vote(&stored, candidate_id);

        metrics::counter!("voting.vote.finalized").increment(1);
        tracing::info!(
            user_id = %user_id,
            candidate_id = candidate_id.0,
            vote_id = %confirmation.vote_id,
            "Vote finalized"
        );
        Ok(confirmation)
    }

    /// Answer a token retry from stored state, without writing.
    async fn replay_vote(&self, user_id: &UserId) -> Result<VoteConfirmation> {
        let record = self
            .store_call("get_voter", self.store.get_voter(user_id))
            .await?
            .filter(VoterRecord::has_voted)
            .ok_or(VotingError::AlreadyProcessing)?;

        let (Some(candidate_id), Some(vote_id), Some(voted_at)) =
            (record.candidate_id, record.vote_id, record.voted_at)
        else {
            return Err(VotingError::AlreadyProcessing);
        };

        let candidate_name = self
            .get_candidate(candidate_id)
            .await?
            .map(|candidate| candidate.name)
            .unwrap_or_default();

        tracing::debug!(user_id = %user_id, vote_id = %vote_id, "Replaying stored vote");
        Ok(VoteConfirmation {
            user_id: record.user_id,
            vote_id,
            candidate_id,
            candidate_name,
            voted_at,
        })
    }

    fn already_voted(user_id: &UserId, candidate_id: CandidateId, source: &'static str) -> VotingError {
        metrics::counter!("voting.vote.duplicate", "source" => source).increment(1);
        tracing::warn!(
            user_id = %user_id,
            candidate_id = candidate_id.0,
            source = source,
            "Vote already finalized"
        );
        VotingError::VoteFinalized
    }

    fn confirmation(stored: &VoterRecord, candidate: &Candidate, update: &VoteUpdate) -> VoteConfirmation {
        VoteConfirmation {
            user_id: stored.user_id.clone(),
            vote_id: stored.vote_id.clone().unwrap_or_else(|| update.vote_id.clone()),
            candidate_id: stored.candidate_id.unwrap_or(update.candidate_id),
            candidate_name: candidate.name.clone(),
            voted_at: stored.voted_at.unwrap_or(update.voted_at),
        }
    }

    /// Detached cache maintenance: set the vote marker, drop derived entries.
    fn after_vote(&self, stored: &VoterRecord, candidate_id: CandidateId) {
        let mut ops = vec![CacheOp::Delete {
            key: self.keys.candidate(candidate_id),
        }];
        if let Some(marker) = VoteMarker::from_record(stored) {
            match serde_json::to_string(&marker) {
                Ok(value) => ops.push(CacheOp::Set {
                    key: self.keys.vote_status(&stored.user_id),
                    value,
                    ttl: self.config.ttls.vote_status,
                }),
                Err(e) => {
                    tracing::error!(user_id = %stored.user_id, error = %e, "Failed to serialize vote marker");
                }
            }
        }
        self.aside.spawn_pipeline(ops);
        self.aside
            .spawn_invalidate(Vec::new(), vec![self.keys.results_pattern()]);
    }
}
