//! Mock voter store for testing.

use crate::error::{Result, UniqueField, VotingError};
use crate::model::{
    Candidate, CandidateAggregate, CandidateId, PersonalInfoUpdate, UserId, VoteUpdate,
    VoterRecord, WelcomeUpdate,
};
use crate::providers::VoterStore;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Tables {
    voters: HashMap<UserId, VoterRecord>,
    phones: HashMap<String, UserId>,
    candidates: BTreeMap<CandidateId, Candidate>,
}

#[derive(Debug, Default)]
struct WriteCounters {
    welcome: AtomicUsize,
    personal_info: AtomicUsize,
    vote: AtomicUsize,
}

/// In-memory voter store.
///
/// Enforces the same uniqueness rules as the `PostgreSQL` schema, under one
/// lock per write, so concurrent callers observe exactly one winner.
#[derive(Debug, Clone)]
pub struct MockVoterStore {
    tables: Arc<Mutex<Tables>>,
    writes: Arc<WriteCounters>,
    available: Arc<AtomicBool>,
}

impl MockVoterStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            writes: Arc::new(WriteCounters::default()),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Create a store seeded with candidates.
    #[must_use]
    pub fn with_candidates(candidates: impl IntoIterator<Item = Candidate>) -> Self {
        let store = Self::new();
        for candidate in candidates {
            store.add_candidate(candidate);
        }
        store
    }

    /// Insert or replace a candidate.
    pub fn add_candidate(&self, candidate: Candidate) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.candidates.insert(candidate.id, candidate);
        }
    }

    /// Insert a voter record directly, bypassing uniqueness checks.
    pub fn insert_voter(&self, record: VoterRecord) {
        if let Ok(mut tables) = self.tables.lock() {
            if let Some(phone) = record.phone.clone() {
                tables.phones.insert(phone, record.user_id.clone());
            }
            tables.voters.insert(record.user_id.clone(), record);
        }
    }

    /// Snapshot of a voter record.
    #[must_use]
    pub fn voter(&self, user_id: &UserId) -> Option<VoterRecord> {
        self.tables.lock().ok()?.voters.get(user_id).cloned()
    }

    /// Toggle a simulated outage: every call fails with `VotingError::Store`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Successful welcome writes.
    #[must_use]
    pub fn welcome_writes(&self) -> usize {
        self.writes.welcome.load(Ordering::SeqCst)
    }

    /// Successful personal info writes.
    #[must_use]
    pub fn personal_info_writes(&self) -> usize {
        self.writes.personal_info.load(Ordering::SeqCst)
    }

    /// Successful vote finalizations.
    #[must_use]
    pub fn vote_writes(&self) -> usize {
        self.writes.vote.load(Ordering::SeqCst)
    }

    fn tables(&self) -> Result<std::sync::MutexGuard<'_, Tables>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(VotingError::Store("mock store offline".into()));
        }
        self.tables
            .lock()
            .map_err(|_| VotingError::Store("Mutex lock failed".into()))
    }
}

impl Default for MockVoterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VoterStore for MockVoterStore {
    async fn get_voter(&self, user_id: &UserId) -> Result<Option<VoterRecord>> {
        Ok(self.tables()?.voters.get(user_id).cloned())
    }

    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<UserId>> {
        Ok(self.tables()?.phones.get(phone).cloned())
    }

    async fn upsert_welcome(&self, update: &WelcomeUpdate) -> Result<VoterRecord> {
        let mut tables = self.tables()?;
        let record = tables
            .voters
            .entry(update.user_id.clone())
            .or_insert_with(|| VoterRecord::new(update.user_id.clone(), update.accepted_at));

        record.welcome_accepted = true;
        record.welcome_accepted_at = Some(update.accepted_at);
        record.rules_version = Some(update.rules_version.clone());
        record.updated_at = update.accepted_at;

        self.writes.welcome.fetch_add(1, Ordering::SeqCst);
        Ok(record.clone())
    }

    async fn upsert_personal_info(&self, update: &PersonalInfoUpdate) -> Result<VoterRecord> {
        let mut tables = self.tables()?;

        if let Some(owner) = tables.phones.get(&update.phone) {
            if *owner != update.user_id {
                return Err(VotingError::ConstraintViolation {
                    field: UniqueField::Phone,
                });
            }
        }

        let previous_phone = tables
            .voters
            .get(&update.user_id)
            .and_then(|record| record.phone.clone());
        if let Some(previous) = previous_phone.filter(|p| *p != update.phone) {
            tables.phones.remove(&previous);
        }
        tables
            .phones
            .insert(update.phone.clone(), update.user_id.clone());

        let record = tables
            .voters
            .entry(update.user_id.clone())
            .or_insert_with(|| VoterRecord::new(update.user_id.clone(), update.updated_at));
        record.first_name.clone_from(&update.first_name);
        record.last_name.clone_from(&update.last_name);
        record.email.clone_from(&update.email);
        record.phone = Some(update.phone.clone());
        record.free_text_answer.clone_from(&update.free_text_answer);
        record.consent = update.consent.clone();
        record.updated_at = update.updated_at;

        self.writes.personal_info.fetch_add(1, Ordering::SeqCst);
        Ok(record.clone())
    }

    async fn finalize_vote(&self, update: &VoteUpdate) -> Result<VoterRecord> {
        let mut tables = self.tables()?;

        if !tables.candidates.contains_key(&update.candidate_id) {
            return Err(VotingError::CandidateNotFound);
        }

        let record = tables
            .voters
            .get_mut(&update.user_id)
            .ok_or(VotingError::UserNotFound)?;

        if record.has_voted() {
            return Err(VotingError::ConstraintViolation {
                field: UniqueField::Vote,
            });
        }

        record.candidate_id = Some(update.candidate_id);
        if record.vote_id.is_none() {
            record.vote_id = Some(update.vote_id.clone());
        }
        record.voted_at = Some(update.voted_at);
        record.vote_ip = Some(update.ip.clone());
        record.vote_user_agent = Some(update.user_agent.clone());
        record.updated_at = update.voted_at;

        self.writes.vote.fetch_add(1, Ordering::SeqCst);
        Ok(record.clone())
    }

    async fn get_candidate(&self, id: CandidateId) -> Result<Option<Candidate>> {
        Ok(self.tables()?.candidates.get(&id).cloned())
    }

    async fn candidate_tallies(&self) -> Result<Vec<CandidateAggregate>> {
        let tables = self.tables()?;
        Ok(tables
            .candidates
            .values()
            .filter(|candidate| candidate.active)
            .map(|candidate| {
                let votes: Vec<&VoterRecord> = tables
                    .voters
                    .values()
                    .filter(|record| record.candidate_id == Some(candidate.id))
                    .collect();
                CandidateAggregate {
                    id: candidate.id,
                    name: candidate.name.clone(),
                    description: candidate.description.clone(),
                    member_count: candidate.member_count,
                    vote_count: votes.len() as u64,
                    last_vote_at: votes.iter().filter_map(|record| record.voted_at).max(),
                }
            })
            .collect())
    }

    async fn total_votes(&self) -> Result<u64> {
        Ok(self
            .tables()?
            .voters
            .values()
            .filter(|record| record.has_voted())
            .count() as u64)
    }

    async fn random_complete_vote(&self) -> Result<Option<VoterRecord>> {
        let tables = self.tables()?;
        let complete: Vec<&VoterRecord> = tables
            .voters
            .values()
            .filter(|record| record.is_complete_vote())
            .collect();
        Ok(complete
            .choose(&mut rand::thread_rng())
            .map(|record| (*record).clone()))
    }
}
