//! Error types for the voting consistency core.

use crate::model::Step;
use thiserror::Error;

/// Result type alias for voting operations.
pub type Result<T> = std::result::Result<T, VotingError>;

/// Column guarded by a uniqueness rule in the voter store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    /// One record per user identifier.
    UserId,
    /// One record per normalized phone number.
    Phone,
    /// One finalized vote per user (the conditional finalization update matched no row).
    Vote,
}

impl UniqueField {
    /// Stable name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserId => "user_id",
            Self::Phone => "phone",
            Self::Vote => "vote",
        }
    }
}

/// Error taxonomy for the voting core.
///
/// Cache failures never appear here: they are [`CacheError`]s, logged and
/// treated as misses by the core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VotingError {
    // ═══════════════════════════════════════════════════════════
    // Client Errors
    // ═══════════════════════════════════════════════════════════

    /// Input failed validation. Never retried internally.
    #[error("Invalid {field}: {reason}")]
    Validation {
        /// Offending input field
        field: &'static str,
        /// Human readable reason
        reason: String,
    },

    /// No voter record for this user.
    #[error("User not found")]
    UserNotFound,

    /// Candidate does not exist or is inactive.
    #[error("Candidate not found")]
    CandidateNotFound,

    /// The user has not reached the vote step yet.
    #[error("Cannot vote yet: user is at the {step} step")]
    StepNotReached {
        /// Step the user is currently at
        step: Step,
    },

    /// No finalized votes exist to pick from.
    #[error("No votes available")]
    NoVotesAvailable,

    // ═══════════════════════════════════════════════════════════
    // Conflicts
    // ═══════════════════════════════════════════════════════════

    /// The user already cast a vote; votes are never overwritten.
    #[error("Vote already finalized")]
    VoteFinalized,

    /// Another user already registered this phone number.
    #[error("Phone number already registered")]
    DuplicatePhone,

    /// An equivalent request is in flight and its result is not readable yet.
    ///
    /// Benign: the client should poll status rather than treat this as a failure.
    #[error("Request already processing")]
    AlreadyProcessing,

    // ═══════════════════════════════════════════════════════════
    // Store Signals
    // ═══════════════════════════════════════════════════════════

    /// Uniqueness rule rejected a write. Raised by [`VoterStore`](crate::providers::VoterStore)
    /// implementations and mapped by the core to [`VoteFinalized`](Self::VoteFinalized)
    /// or [`DuplicatePhone`](Self::DuplicatePhone).
    #[error("Constraint violation on {}", field.as_str())]
    ConstraintViolation {
        /// Guarded column
        field: UniqueField,
    },

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// Creating or updating the record at the welcome step failed.
    #[error("Failed to create user: {0}")]
    UserCreationFailed(String),

    /// Authoritative store failed or timed out.
    #[error("Store error: {0}")]
    Store(String),
}

impl VotingError {
    /// Build a validation error.
    #[must_use]
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Returns `true` if the client can fix the request.
    ///
    /// # Examples
    ///
    /// ```
    /// # use voting_core::VotingError;
    /// assert!(VotingError::validation("email", "missing @").is_user_error());
    /// assert!(!VotingError::Store("down".into()).is_user_error());
    /// ```
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::UserNotFound
                | Self::CandidateNotFound
                | Self::StepNotReached { .. }
        )
    }

    /// Returns `true` for state conflicts (409-equivalent).
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::VoteFinalized | Self::DuplicatePhone | Self::ConstraintViolation { .. }
        )
    }

    /// Returns `true` if the outcome is not a failure from the client's point of view.
    #[must_use]
    pub const fn is_benign(&self) -> bool {
        matches!(self, Self::AlreadyProcessing)
    }
}

/// Failures of the key-value cache.
///
/// The core logs these and falls back to the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Backend unreachable.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// Command rejected by the backend.
    #[error("Cache command failed: {0}")]
    Command(String),

    /// Call exceeded its deadline.
    #[error("Cache operation timed out")]
    Timeout,
}

/// Configuration loading failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Unknown environment name.
    #[error("Invalid environment: {0}")]
    InvalidEnvironment(String),

    /// Environment variable present but unparsable.
    #[error("Invalid value for {key}: {value}")]
    InvalidValue {
        /// Variable or field name
        key: String,
        /// Raw value
        value: String,
    },

    /// Configuration file could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Parsed values are inconsistent.
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}
