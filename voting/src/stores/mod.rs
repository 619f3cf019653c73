//! Storage implementations for the voting core.
//!
//! - **Cache** (`Redis`) - disposable accelerator with TTLs
//! - **Voter Store** (`PostgreSQL`) - authoritative voter records, behind the `postgres` feature

#[cfg(feature = "postgres")]
pub mod postgres;
pub mod redis_cache;

// Re-exports
#[cfg(feature = "postgres")]
pub use postgres::PostgresVoterStore;
pub use redis_cache::RedisCacheClient;
