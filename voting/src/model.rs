//! Domain types shared by the core, its providers and callers.

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Opaque user identity, issued by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Wrap a raw identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Candidate identifier. Zero never names a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateId(pub u32);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a finalized vote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoteId(pub String);

impl VoteId {
    const SUFFIX_LEN: usize = 10;

    /// Generate `V{year}-{suffix}` where the suffix is ten random uppercase alphanumerics.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use voting_core::model::VoteId;
    ///
    /// let id = VoteId::generate(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
    /// assert!(id.as_str().starts_with("V2026-"));
    /// assert_eq!(id.as_str().len(), 16);
    /// ```
    #[must_use]
    pub fn generate(now: DateTime<Utc>) -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(Self::SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_uppercase())
            .collect();
        Self(format!("V{}-{suffix}", now.year()))
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Consent captured with personal information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consent {
    /// Personal data protection consent (required).
    pub pdpa_accepted: bool,
    /// Optional marketing consent.
    pub marketing_accepted: bool,
    /// When consent was given.
    pub consent_timestamp: Option<DateTime<Utc>>,
    /// Client address consent was given from.
    pub consent_source_ip: Option<String>,
    /// Privacy policy version the user agreed to.
    pub policy_version: Option<String>,
}

/// The unified per-user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterRecord {
    /// Primary identity.
    pub user_id: UserId,
    /// Canonical national phone number, unique across records once set.
    pub phone: Option<String>,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Contact email.
    pub email: String,
    /// Optional free-text answer (at most 1000 code points).
    pub free_text_answer: Option<String>,
    /// Consent block.
    pub consent: Consent,
    /// Rules accepted.
    pub welcome_accepted: bool,
    /// When rules were accepted.
    pub welcome_accepted_at: Option<DateTime<Utc>>,
    /// Accepted rules version.
    pub rules_version: Option<String>,
    /// Finalized candidate. Immutable once set.
    pub candidate_id: Option<CandidateId>,
    /// Vote identifier, generated at the first real vote.
    pub vote_id: Option<VoteId>,
    /// When the vote was cast.
    pub voted_at: Option<DateTime<Utc>>,
    /// Client address of the vote.
    pub vote_ip: Option<String>,
    /// Client user agent of the vote.
    pub vote_user_agent: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl VoterRecord {
    /// Empty record for a user seen for the first time.
    #[must_use]
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            phone: None,
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            free_text_answer: None,
            consent: Consent::default(),
            welcome_accepted: false,
            welcome_accepted_at: None,
            rules_version: None,
            candidate_id: None,
            vote_id: None,
            voted_at: None,
            vote_ip: None,
            vote_user_agent: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Personal information has been submitted (phone is the marker).
    #[must_use]
    pub fn has_personal_info(&self) -> bool {
        self.phone.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// A candidate has been finalized.
    #[must_use]
    pub fn has_voted(&self) -> bool {
        self.candidate_id.is_some_and(|c| c.0 > 0)
    }

    /// Finalized vote with personal information attached, eligible for random display.
    #[must_use]
    pub fn is_complete_vote(&self) -> bool {
        self.has_voted() && self.vote_id.is_some() && self.has_personal_info()
    }

    /// Derive the progression status.
    #[must_use]
    pub fn status(&self) -> UserStatus {
        UserStatus::from_record(Some(self))
    }
}

/// Progression step.
///
/// Ordered: a user only ever moves to a later step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    /// Rules not yet accepted.
    Welcome,
    /// Rules accepted, personal info missing.
    PersonalInfo,
    /// Personal info submitted, no vote yet.
    Vote,
    /// Vote finalized.
    Complete,
}

impl Step {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::PersonalInfo => "personal-info",
            Self::Vote => "vote",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progression status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatus {
    /// Rules accepted.
    pub welcome_accepted: bool,
    /// Personal info submitted.
    pub has_personal_info: bool,
    /// Vote finalized.
    pub has_voted: bool,
    /// Derived step.
    pub current_step: Step,
}

impl UserStatus {
    /// Derive status from a stored record (`None` means the user is unknown).
    #[must_use]
    pub fn from_record(record: Option<&VoterRecord>) -> Self {
        let Some(record) = record else {
            return Self {
                welcome_accepted: false,
                has_personal_info: false,
                has_voted: false,
                current_step: Step::Welcome,
            };
        };

        let welcome_accepted = record.welcome_accepted;
        let has_personal_info = record.has_personal_info();
        let has_voted = record.has_voted();

        let current_step = if !welcome_accepted {
            Step::Welcome
        } else if !has_personal_info {
            Step::PersonalInfo
        } else if !has_voted {
            Step::Vote
        } else {
            Step::Complete
        };

        Self {
            welcome_accepted,
            has_personal_info,
            has_voted,
            current_step,
        }
    }
}

/// Candidate row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Identifier.
    pub id: CandidateId,
    /// Display name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Number of team members.
    pub member_count: u32,
    /// Accepting votes.
    pub active: bool,
}

/// Candidate with its running tally. Derived, never authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateAggregate {
    /// Identifier.
    pub id: CandidateId,
    /// Display name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Number of team members.
    pub member_count: u32,
    /// Finalized votes.
    pub vote_count: u64,
    /// Most recent vote.
    pub last_vote_at: Option<DateTime<Utc>>,
}

/// Raw personal info as submitted by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalInfoFields {
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Contact email.
    pub email: String,
    /// Phone in any common notation.
    pub phone: String,
    /// Optional free-text answer.
    pub free_text_answer: Option<String>,
    /// Personal data protection consent. Must be `true`.
    pub pdpa_consent: bool,
    /// Marketing consent.
    pub marketing_consent: bool,
}

/// Personal info write handed to the store. Fields are already validated and normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonalInfoUpdate {
    /// Owner.
    pub user_id: UserId,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Contact email.
    pub email: String,
    /// Canonical phone.
    pub phone: String,
    /// Optional free-text answer.
    pub free_text_answer: Option<String>,
    /// Consent block.
    pub consent: Consent,
    /// Write time.
    pub updated_at: DateTime<Utc>,
}

/// Welcome acceptance write handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WelcomeUpdate {
    /// Owner.
    pub user_id: UserId,
    /// Accepted rules version.
    pub rules_version: String,
    /// Acceptance time.
    pub accepted_at: DateTime<Utc>,
}

/// Vote finalization handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteUpdate {
    /// Voter.
    pub user_id: UserId,
    /// Chosen candidate.
    pub candidate_id: CandidateId,
    /// Vote identifier to persist when the record has none.
    pub vote_id: VoteId,
    /// Vote time.
    pub voted_at: DateTime<Utc>,
    /// Client address.
    pub ip: String,
    /// Client user agent.
    pub user_agent: String,
}

/// Personal info as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalInfoRecord {
    /// Owner.
    pub user_id: UserId,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Contact email.
    pub email: String,
    /// Canonical phone.
    pub phone: String,
    /// Optional free-text answer.
    pub free_text_answer: Option<String>,
    /// Personal data protection consent.
    pub pdpa_accepted: bool,
    /// Marketing consent.
    pub marketing_accepted: bool,
    /// Consent time.
    pub consent_timestamp: Option<DateTime<Utc>>,
    /// Policy version.
    pub policy_version: Option<String>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl PersonalInfoRecord {
    /// Project a voter record; `None` while personal info is missing.
    #[must_use]
    pub fn from_record(record: &VoterRecord) -> Option<Self> {
        let phone = record.phone.clone().filter(|p| !p.is_empty())?;
        Some(Self {
            user_id: record.user_id.clone(),
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            email: record.email.clone(),
            phone,
            free_text_answer: record.free_text_answer.clone(),
            pdpa_accepted: record.consent.pdpa_accepted,
            marketing_accepted: record.consent.marketing_accepted,
            consent_timestamp: record.consent.consent_timestamp,
            policy_version: record.consent.policy_version.clone(),
            updated_at: record.updated_at,
        })
    }
}

/// Result of a welcome acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomeAcceptance {
    /// Owner.
    pub user_id: UserId,
    /// Accepted rules version.
    pub rules_version: String,
    /// Acceptance time.
    pub accepted_at: DateTime<Utc>,
}

impl WelcomeAcceptance {
    /// Project a voter record; `None` while rules are not accepted.
    #[must_use]
    pub fn from_record(record: &VoterRecord) -> Option<Self> {
        if !record.welcome_accepted {
            return None;
        }
        Some(Self {
            user_id: record.user_id.clone(),
            rules_version: record.rules_version.clone().unwrap_or_default(),
            accepted_at: record.welcome_accepted_at.unwrap_or(record.updated_at),
        })
    }
}

/// Cached proof that a user voted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteMarker {
    /// Finalized candidate.
    pub candidate_id: CandidateId,
    /// Vote identifier.
    pub vote_id: Option<VoteId>,
    /// Vote time.
    pub voted_at: Option<DateTime<Utc>>,
}

impl VoteMarker {
    /// Project a voter record; `None` while the user has not voted.
    #[must_use]
    pub fn from_record(record: &VoterRecord) -> Option<Self> {
        let candidate_id = record.candidate_id.filter(|c| c.0 > 0)?;
        Some(Self {
            candidate_id,
            vote_id: record.vote_id.clone(),
            voted_at: record.voted_at,
        })
    }
}

/// Result of a vote submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteConfirmation {
    /// Voter.
    pub user_id: UserId,
    /// Vote identifier.
    pub vote_id: VoteId,
    /// Chosen candidate.
    pub candidate_id: CandidateId,
    /// Candidate display name.
    pub candidate_name: String,
    /// Vote time.
    pub voted_at: DateTime<Utc>,
}

/// Per-request client context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Client address.
    pub ip: String,
    /// Client user agent.
    pub user_agent: String,
    /// Optional client-supplied idempotency token.
    pub idempotency_token: Option<String>,
}

impl RequestContext {
    /// Create a context without idempotency token.
    #[must_use]
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: user_agent.into(),
            idempotency_token: None,
        }
    }

    /// Attach a client idempotency token.
    #[must_use]
    pub fn with_idempotency_token(mut self, token: impl Into<String>) -> Self {
        self.idempotency_token = Some(token.into());
        self
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    /// Request is within the limit.
    pub allowed: bool,
    /// Requests counted in the current window, this one included.
    pub count: u64,
    /// Configured limit.
    pub limit: u64,
    /// Start of the current window.
    pub window_start: DateTime<Utc>,
    /// Time until the window resets.
    pub ttl: Duration,
}
