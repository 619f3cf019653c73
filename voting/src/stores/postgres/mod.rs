//! `PostgreSQL` storage implementations.
//!
//! Migrations live in `voting/migrations` and are embedded at compile time.

pub mod voter;

// Re-exports
pub use voter::PostgresVoterStore;
