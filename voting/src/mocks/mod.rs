//! In-memory provider implementations for testing.
//!
//! Both mocks can simulate an outage with `set_available(false)`, which is
//! how the degraded-cache and store-failure paths of the core are tested.

pub mod cache;
pub mod clock;
pub mod voter_store;

pub use cache::MockCacheClient;
pub use clock::FixedClock;
pub use voter_store::MockVoterStore;
