//! Provider traits for the collaborators the core consumes.
//!
//! The core never talks to `Redis` or `PostgreSQL` directly; it is generic
//! over these traits and receives implementations at construction:
//!
//! - [`CacheClient`] - disposable, non-authoritative key-value accelerator
//! - [`VoterStore`] - authoritative relational store of voter records
//! - [`Clock`] - time source for timestamps and vote identifiers

pub mod cache;
pub mod clock;
pub mod voter_store;

pub use cache::{CacheClient, CacheOp, CacheReply, CacheResult};
pub use clock::{Clock, SystemClock};
pub use voter_store::VoterStore;
