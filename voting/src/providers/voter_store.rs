//! Voter store trait.

use crate::error::Result;
use crate::model::{
    Candidate, CandidateAggregate, CandidateId, PersonalInfoUpdate, UserId, VoteUpdate,
    VoterRecord, WelcomeUpdate,
};
use std::future::Future;

/// Authoritative store of voter records and candidates (`PostgreSQL`).
///
/// # Uniqueness
///
/// Implementations enforce, atomically with the write:
/// - one record per `user_id`
/// - one record per non-empty `phone`
/// - `candidate_id` set at most once
///
/// Violations are reported as
/// [`VotingError::ConstraintViolation`](crate::VotingError::ConstraintViolation)
/// with the guarded [`UniqueField`](crate::error::UniqueField), never as an
/// opaque message.
pub trait VoterStore: Send + Sync {
    /// Get a voter record.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn get_voter(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Option<VoterRecord>>> + Send;

    /// Find the owner of a normalized phone number.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn find_user_by_phone(
        &self,
        phone: &str,
    ) -> impl Future<Output = Result<Option<UserId>>> + Send;

    /// Create the record with acceptance fields, or update acceptance fields
    /// of an existing record.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn upsert_welcome(
        &self,
        update: &WelcomeUpdate,
    ) -> impl Future<Output = Result<VoterRecord>> + Send;

    /// Create the record with personal info, or update personal info of an
    /// existing record in place.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Phone belongs to another record → `ConstraintViolation { field: Phone }`
    /// - Write fails → `VotingError::Store`
    fn upsert_personal_info(
        &self,
        update: &PersonalInfoUpdate,
    ) -> impl Future<Output = Result<VoterRecord>> + Send;

    /// Finalize a vote if, and only if, none is recorded yet.
    ///
    /// Keeps an existing `vote_id`, otherwise persists `update.vote_id`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - No record → `VotingError::UserNotFound`
    /// - Already voted → `ConstraintViolation { field: Vote }`
    /// - Unknown candidate → `VotingError::CandidateNotFound`
    /// - Write fails → `VotingError::Store`
    fn finalize_vote(
        &self,
        update: &VoteUpdate,
    ) -> impl Future<Output = Result<VoterRecord>> + Send;

    /// Get a candidate (active or not).
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn get_candidate(
        &self,
        id: CandidateId,
    ) -> impl Future<Output = Result<Option<Candidate>>> + Send;

    /// Running tally of every active candidate, zero-vote candidates included.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn candidate_tallies(&self) -> impl Future<Output = Result<Vec<CandidateAggregate>>> + Send;

    /// Number of finalized votes.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn total_votes(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Uniformly random record with a finalized vote and personal info.
    ///
    /// # Returns
    ///
    /// `None` when no such record exists.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    fn random_complete_vote(&self) -> impl Future<Output = Result<Option<VoterRecord>>> + Send;
}
