//! Shared fixtures for integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use voting_core::mocks::{FixedClock, MockCacheClient, MockVoterStore};
use voting_core::{
    Candidate, CandidateId, Environment, PersonalInfoFields, RequestContext, UserId, VotingConfig,
    VotingCore,
};

pub type TestCore = VotingCore<MockVoterStore, MockCacheClient>;

/// Install a test subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn candidates() -> Vec<Candidate> {
    [(1, "Alpha"), (2, "Bravo"), (3, "Charlie")]
        .into_iter()
        .map(|(id, name)| Candidate {
            id: CandidateId(id),
            name: name.to_string(),
            description: format!("Team {name}"),
            member_count: 4,
            active: true,
        })
        .collect()
}

pub fn clock() -> FixedClock {
    FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap())
}

pub fn config() -> VotingConfig {
    VotingConfig::new(Environment::Development)
        .with_background_timeout(Duration::from_secs(1))
        .with_store_timeout(Duration::from_secs(2))
        .with_cache_timeout(Duration::from_millis(500))
}

/// Core over fresh mocks; returns handles to the mocks for inspection.
pub fn core() -> (Arc<TestCore>, MockVoterStore, MockCacheClient) {
    init_tracing();
    let store = MockVoterStore::with_candidates(candidates());
    let cache = MockCacheClient::new();
    let core = VotingCore::new(store.clone(), cache.clone(), Arc::new(clock()), config());
    (Arc::new(core), store, cache)
}

pub fn ctx() -> RequestContext {
    RequestContext::new("203.0.113.7", "integration-test")
}

pub fn fields(phone: &str) -> PersonalInfoFields {
    PersonalInfoFields {
        first_name: "Somchai".into(),
        last_name: "Jaidee".into(),
        email: "somchai@example.com".into(),
        phone: phone.into(),
        free_text_answer: Some("Looking forward to it".into()),
        pdpa_consent: true,
        marketing_consent: false,
    }
}

/// Welcome plus personal info, so the user can vote.
pub async fn registered(core: &TestCore, user: &str, phone: &str) -> UserId {
    let user_id = UserId::new(user);
    core.accept_welcome(&user_id, "v1", &ctx())
        .await
        .unwrap();
    core.submit_personal_info(&user_id, &fields(phone), &ctx())
        .await
        .unwrap();
    user_id
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
