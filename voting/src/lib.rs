//! # Voting Consistency Core
//!
//! Guarantees at most one finalized vote and one phone registration per
//! user in a single-event voting application, while serving reads from a
//! disposable cache.
//!
//! ## Guarantees
//!
//! - **One vote per user**: the store finalizes conditionally; the cache
//!   only short-circuits obvious repeats
//! - **One phone per user**: enforced by a store uniqueness rule, checked
//!   early against a cached owner marker
//! - **Idempotent retries**: duplicate submissions inside a short window
//!   replay stored state and write nothing
//! - **Monotonic progression**: `welcome → personal-info → vote → complete`
//! - **Cache is optional**: every cache failure degrades to a store read
//!
//! ## Architecture
//!
//! ```text
//! caller ─▶ VotingCore ─┬─▶ VoterStore  (authoritative, PostgreSQL)
//!                       ├─▶ CacheClient (accelerator, Redis)
//!                       └─▶ Clock
//! ```
//!
//! Providers are traits ([`providers`]); production implementations live in
//! [`stores`], in-memory ones in `mocks` (feature `test-utils`).
//!
//! ## Example
//!
//! ```rust,ignore
//! use voting_core::{VotingCore, VotingConfig};
//! use voting_core::stores::{PostgresVoterStore, RedisCacheClient};
//!
//! let config = VotingConfig::from_env()?;
//! let cache = RedisCacheClient::new(&config.redis_url).await?;
//! let core = VotingCore::with_system_clock(store, cache, config);
//!
//! core.accept_welcome(&user, "2026-rules-v1", &ctx).await?;
//! core.submit_personal_info(&user, &fields, &ctx).await?;
//! let confirmation = core.submit_vote(&user, CandidateId(2), &ctx).await?;
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod cache_aside;
pub mod config;
pub mod consistency;
pub mod error;
pub mod idempotency;
pub mod keys;
pub mod model;
pub mod providers;
pub mod random;
pub mod rate_limit;
pub mod results;
pub mod stores;
pub mod utils;
pub mod validation;

// Mock implementations (only available with test-utils feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-export main types for convenience
pub use config::{Environment, VotingConfig};
pub use consistency::VotingCore;
pub use error::{CacheError, ConfigError, Result, UniqueField, VotingError};
pub use model::{
    Candidate, CandidateId, PersonalInfoFields, PersonalInfoRecord, RequestContext, Step,
    UserId, UserStatus, VoteConfirmation, VoteId, VoterRecord, WelcomeAcceptance,
};
pub use results::{RankedResults, VoteTotals};
