//! Store fallbacks for the cached entity types.

use super::bounded;
use crate::cache_aside::Fetcher;
use crate::error::Result;
use crate::model::{Candidate, CandidateId, PersonalInfoRecord, UserId};
use crate::providers::VoterStore;
use std::time::Duration;

pub(super) struct CandidateFetcher<'a, S> {
    pub store: &'a S,
    pub id: CandidateId,
    pub timeout: Duration,
}

impl<S: VoterStore> Fetcher<Candidate> for CandidateFetcher<'_, S> {
    async fn fetch(&self) -> Result<Option<Candidate>> {
        bounded(self.timeout, "get_candidate", self.store.get_candidate(self.id)).await
    }
}

pub(super) struct PersonalInfoFetcher<'a, S> {
    pub store: &'a S,
    pub user_id: &'a UserId,
    pub timeout: Duration,
}

impl<S: VoterStore> Fetcher<PersonalInfoRecord> for PersonalInfoFetcher<'_, S> {
    async fn fetch(&self) -> Result<Option<PersonalInfoRecord>> {
        let record = bounded(self.timeout, "get_voter", self.store.get_voter(self.user_id)).await?;
        Ok(record.as_ref().and_then(PersonalInfoRecord::from_record))
    }
}

/// Owner of a phone number.
pub(super) struct PhoneOwnerFetcher<'a, S> {
    pub store: &'a S,
    pub phone: &'a str,
    pub timeout: Duration,
}

impl<S: VoterStore> Fetcher<UserId> for PhoneOwnerFetcher<'_, S> {
    async fn fetch(&self) -> Result<Option<UserId>> {
        bounded(self.timeout, "find_user_by_phone", self.store.find_user_by_phone(self.phone)).await
    }
}
