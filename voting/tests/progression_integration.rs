//! End-to-end progression through welcome, personal info and vote.

#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use common::{core, ctx, fields};
use voting_core::{CandidateId, PersonalInfoFields, Step, UserId, VotingError};

#[tokio::test]
async fn test_thai_voter_completes_the_flow() {
    let (core, store, _) = core();
    let user = UserId::new("line-U1");

    assert_eq!(
        core.get_user_status(&user).await.unwrap().current_step,
        Step::Welcome
    );

    let welcome = core.accept_welcome(&user, "2026-rules-v1", &ctx()).await.unwrap();
    assert_eq!(welcome.rules_version, "2026-rules-v1");
    assert_eq!(
        core.get_user_status(&user).await.unwrap().current_step,
        Step::PersonalInfo
    );

    let info = PersonalInfoFields {
        first_name: "สม".into(),
        last_name: "ชาย".into(),
        email: "a@b.com".into(),
        phone: "0812345678".into(),
        free_text_answer: None,
        pdpa_consent: true,
        marketing_consent: true,
    };
    let record = core.submit_personal_info(&user, &info, &ctx()).await.unwrap();
    assert_eq!(record.first_name, "สม");
    assert!(record.marketing_accepted);
    assert_eq!(
        core.get_user_status(&user).await.unwrap().current_step,
        Step::Vote
    );

    let confirmation = core.submit_vote(&user, CandidateId(2), &ctx()).await.unwrap();
    assert_eq!(confirmation.candidate_id, CandidateId(2));

    let status = core.get_user_status(&user).await.unwrap();
    assert_eq!(status.current_step, Step::Complete);
    assert!(status.welcome_accepted && status.has_personal_info && status.has_voted);

    let stored = store.voter(&user).unwrap();
    assert_eq!(stored.vote_ip.as_deref(), Some("203.0.113.7"));
    assert_eq!(stored.consent.consent_source_ip.as_deref(), Some("203.0.113.7"));
}

#[tokio::test]
async fn test_status_never_moves_backwards() {
    let (core, _, _) = core();
    let user = UserId::new("u1");
    let mut seen = Vec::new();

    core.accept_welcome(&user, "v1", &ctx()).await.unwrap();
    seen.push(core.get_user_status(&user).await.unwrap().current_step);

    core.accept_welcome(&user, "v1", &ctx()).await.unwrap();
    seen.push(core.get_user_status(&user).await.unwrap().current_step);

    core.submit_personal_info(&user, &fields("0812345678"), &ctx())
        .await
        .unwrap();
    seen.push(core.get_user_status(&user).await.unwrap().current_step);

    core.submit_vote(&user, CandidateId(1), &ctx()).await.unwrap();
    seen.push(core.get_user_status(&user).await.unwrap().current_step);

    // Late edits after voting keep the user complete
    core.accept_welcome(&user, "v2", &ctx()).await.unwrap();
    seen.push(core.get_user_status(&user).await.unwrap().current_step);

    let mut late = fields("0812345678");
    late.email = "late@example.com".into();
    core.submit_personal_info(&user, &late, &ctx()).await.unwrap();
    seen.push(core.get_user_status(&user).await.unwrap().current_step);

    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]), "{seen:?}");
    assert_eq!(seen.last(), Some(&Step::Complete));
}

#[tokio::test]
async fn test_rewelcome_keeps_vote() {
    let (core, store, _) = core();
    let user = common::registered(&core, "u1", "0812345678").await;
    let confirmation = core.submit_vote(&user, CandidateId(3), &ctx()).await.unwrap();

    core.accept_welcome(&user, "v2", &ctx()).await.unwrap();

    let stored = store.voter(&user).unwrap();
    assert_eq!(stored.rules_version.as_deref(), Some("v2"));
    assert_eq!(stored.vote_id, Some(confirmation.vote_id));
}

#[tokio::test]
async fn test_welcome_rejects_bad_rules_version() {
    let (core, store, _) = core();
    let user = UserId::new("u1");

    let long = "x".repeat(33);
    for version in ["", "   ", long.as_str()] {
        assert!(matches!(
            core.accept_welcome(&user, version, &ctx()).await,
            Err(VotingError::Validation { field: "rules_version", .. })
        ));
    }
    assert_eq!(store.welcome_writes(), 0);
}

#[tokio::test]
async fn test_welcome_store_failure_is_user_creation_failure() {
    let (core, store, _) = core();
    store.set_available(false);

    assert!(matches!(
        core.accept_welcome(&UserId::new("u1"), "v1", &ctx()).await,
        Err(VotingError::UserCreationFailed(_))
    ));
}

#[tokio::test]
async fn test_unknown_user_personal_info_not_found() {
    let (core, _, _) = core();
    assert_eq!(
        core.get_personal_info(&UserId::new("nobody")).await.unwrap_err(),
        VotingError::UserNotFound
    );
}
