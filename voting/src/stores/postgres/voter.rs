//! `PostgreSQL` voter store.
//!
//! # Schema
//!
//! One row per user in `voters`, guarded by:
//! - `voters_pkey` on `user_id`
//! - `voters_phone_key` on `phone`
//! - `voters_vote_id_key` on `vote_id`
//! - a foreign key from `candidate_id` to `candidates`
//!
//! Vote finalization is a conditional update (`WHERE candidate_id IS NULL`),
//! so two concurrent finalizations of one user cannot both match a row.
//!
//! # Example
//!
//! ```no_run
//! use voting_core::stores::PostgresVoterStore;
//! use sqlx::PgPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = PgPool::connect("postgresql://localhost/voting").await?;
//! let store = PostgresVoterStore::new(pool);
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, UniqueField, VotingError};
use crate::model::{
    Candidate, CandidateAggregate, CandidateId, Consent, PersonalInfoUpdate, UserId, VoteId,
    VoteUpdate, VoterRecord, WelcomeUpdate,
};
use crate::providers::VoterStore;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

const VOTER_COLUMNS: &str = "user_id, phone, first_name, last_name, email, free_text_answer, \
     pdpa_accepted, marketing_accepted, consent_timestamp, consent_source_ip, policy_version, \
     welcome_accepted, welcome_accepted_at, rules_version, \
     candidate_id, vote_id, voted_at, vote_ip, vote_user_agent, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct VoterRow {
    user_id: String,
    phone: Option<String>,
    first_name: String,
    last_name: String,
    email: String,
    free_text_answer: Option<String>,
    pdpa_accepted: bool,
    marketing_accepted: bool,
    consent_timestamp: Option<DateTime<Utc>>,
    consent_source_ip: Option<String>,
    policy_version: Option<String>,
    welcome_accepted: bool,
    welcome_accepted_at: Option<DateTime<Utc>>,
    rules_version: Option<String>,
    candidate_id: Option<i32>,
    vote_id: Option<String>,
    voted_at: Option<DateTime<Utc>>,
    vote_ip: Option<String>,
    vote_user_agent: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<VoterRow> for VoterRecord {
    fn from(row: VoterRow) -> Self {
        Self {
            user_id: UserId(row.user_id),
            phone: row.phone,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            free_text_answer: row.free_text_answer,
            consent: Consent {
                pdpa_accepted: row.pdpa_accepted,
                marketing_accepted: row.marketing_accepted,
                consent_timestamp: row.consent_timestamp,
                consent_source_ip: row.consent_source_ip,
                policy_version: row.policy_version,
            },
            welcome_accepted: row.welcome_accepted,
            welcome_accepted_at: row.welcome_accepted_at,
            rules_version: row.rules_version,
            candidate_id: row
                .candidate_id
                .and_then(|id| u32::try_from(id).ok())
                .map(CandidateId),
            vote_id: row.vote_id.map(VoteId),
            voted_at: row.voted_at,
            vote_ip: row.vote_ip,
            vote_user_agent: row.vote_user_agent,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CandidateRow {
    id: i32,
    name: String,
    description: String,
    member_count: i32,
    active: bool,
}

impl From<CandidateRow> for Candidate {
    fn from(row: CandidateRow) -> Self {
        Self {
            id: CandidateId(u32::try_from(row.id).unwrap_or(0)),
            name: row.name,
            description: row.description,
            member_count: u32::try_from(row.member_count).unwrap_or(0),
            active: row.active,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TallyRow {
    id: i32,
    name: String,
    description: String,
    member_count: i32,
    vote_count: i64,
    last_vote_at: Option<DateTime<Utc>>,
}

impl From<TallyRow> for CandidateAggregate {
    fn from(row: TallyRow) -> Self {
        Self {
            id: CandidateId(u32::try_from(row.id).unwrap_or(0)),
            name: row.name,
            description: row.description,
            member_count: u32::try_from(row.member_count).unwrap_or(0),
            vote_count: u64::try_from(row.vote_count).unwrap_or(0),
            last_vote_at: row.last_vote_at,
        }
    }
}

/// Uniqueness rule behind a constraint name.
///
/// `voters_vote_id_key` maps to nothing: two users drawing the same
/// random vote id is a store fault, not a repeat vote.
fn unique_field(constraint: Option<&str>) -> Option<UniqueField> {
    match constraint {
        Some("voters_pkey") => Some(UniqueField::UserId),
        Some("voters_phone_key") => Some(UniqueField::Phone),
        _ => None,
    }
}

/// Translate a driver error, surfacing uniqueness rules as typed signals.
fn map_db_err(context: &str, e: &sqlx::Error) -> VotingError {
    if let sqlx::Error::Database(db_err) = e {
        if db_err.is_unique_violation() {
            if let Some(field) = unique_field(db_err.constraint()) {
                return VotingError::ConstraintViolation { field };
            }
        }
        if db_err.is_foreign_key_violation() {
            return VotingError::CandidateNotFound;
        }
    }
    VotingError::Store(format!("Failed to {context}: {e}"))
}

fn candidate_param(id: CandidateId) -> Result<i32> {
    i32::try_from(id.0).map_err(|_| VotingError::CandidateNotFound)
}

/// `PostgreSQL` implementation of [`VoterStore`].
#[derive(Clone)]
pub struct PostgresVoterStore {
    /// `PostgreSQL` connection pool.
    pool: PgPool,
}

impl PostgresVoterStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns error if migrations fail.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| VotingError::Store(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Insert or update a candidate row.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    pub async fn upsert_candidate(&self, candidate: &Candidate) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO candidates (id, name, description, member_count, active)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                description = EXCLUDED.description,
                member_count = EXCLUDED.member_count,
                active = EXCLUDED.active
            ",
        )
        .bind(candidate_param(candidate.id)?)
        .bind(&candidate.name)
        .bind(&candidate.description)
        .bind(i32::try_from(candidate.member_count).unwrap_or(i32::MAX))
        .bind(candidate.active)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_err("upsert candidate", &e))?;
        Ok(())
    }
}

impl VoterStore for PostgresVoterStore {
    async fn get_voter(&self, user_id: &UserId) -> Result<Option<VoterRecord>> {
        let row: Option<VoterRow> = sqlx::query_as(&format!(
            "SELECT {VOTER_COLUMNS} FROM voters WHERE user_id = $1"
        ))
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("get voter", &e))?;

        Ok(row.map(VoterRecord::from))
    }

    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<UserId>> {
        let owner: Option<String> =
            sqlx::query_scalar("SELECT user_id FROM voters WHERE phone = $1")
                .bind(phone)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_db_err("find user by phone", &e))?;

        Ok(owner.map(UserId))
    }

    async fn upsert_welcome(&self, update: &WelcomeUpdate) -> Result<VoterRecord> {
        let row: VoterRow = sqlx::query_as(&format!(
            r"
            INSERT INTO voters (user_id, welcome_accepted, welcome_accepted_at, rules_version,
                                created_at, updated_at)
            VALUES ($1, TRUE, $2, $3, $2, $2)
            ON CONFLICT (user_id) DO UPDATE
            SET welcome_accepted = TRUE,
                welcome_accepted_at = EXCLUDED.welcome_accepted_at,
                rules_version = EXCLUDED.rules_version,
                updated_at = EXCLUDED.updated_at
            RETURNING {VOTER_COLUMNS}
            "
        ))
        .bind(update.user_id.as_str())
        .bind(update.accepted_at)
        .bind(&update.rules_version)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err("upsert welcome", &e))?;

        Ok(row.into())
    }

    async fn upsert_personal_info(&self, update: &PersonalInfoUpdate) -> Result<VoterRecord> {
        let row: VoterRow = sqlx::query_as(&format!(
            r"
            INSERT INTO voters (user_id, phone, first_name, last_name, email, free_text_answer,
                                pdpa_accepted, marketing_accepted, consent_timestamp,
                                consent_source_ip, policy_version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            ON CONFLICT (user_id) DO UPDATE
            SET phone = EXCLUDED.phone,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                email = EXCLUDED.email,
                free_text_answer = EXCLUDED.free_text_answer,
                pdpa_accepted = EXCLUDED.pdpa_accepted,
                marketing_accepted = EXCLUDED.marketing_accepted,
                consent_timestamp = EXCLUDED.consent_timestamp,
                consent_source_ip = EXCLUDED.consent_source_ip,
                policy_version = EXCLUDED.policy_version,
                updated_at = EXCLUDED.updated_at
            RETURNING {VOTER_COLUMNS}
            "
        ))
        .bind(update.user_id.as_str())
        .bind(&update.phone)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.email)
        .bind(update.free_text_answer.as_deref())
        .bind(update.consent.pdpa_accepted)
        .bind(update.consent.marketing_accepted)
        .bind(update.consent.consent_timestamp)
        .bind(update.consent.consent_source_ip.as_deref())
        .bind(update.consent.policy_version.as_deref())
        .bind(update.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err("upsert personal info", &e))?;

        Ok(row.into())
    }

    async fn finalize_vote(&self, update: &VoteUpdate) -> Result<VoterRecord> {
        let row: Option<VoterRow> = sqlx::query_as(&format!(
            r"
            UPDATE voters
            SET candidate_id = $2,
                vote_id = COALESCE(vote_id, $3),
                voted_at = $4,
                vote_ip = $5,
                vote_user_agent = $6,
                updated_at = $4
            WHERE user_id = $1
              AND (candidate_id IS NULL OR candidate_id = 0)
            RETURNING {VOTER_COLUMNS}
            "
        ))
        .bind(update.user_id.as_str())
        .bind(candidate_param(update.candidate_id)?)
        .bind(update.vote_id.as_str())
        .bind(update.voted_at)
        .bind(&update.ip)
        .bind(&update.user_agent)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("finalize vote", &e))?;

        if let Some(row) = row {
            return Ok(row.into());
        }

        // No row matched: either the user is unknown or the vote is final
        let exists: Option<String> = sqlx::query_scalar("SELECT user_id FROM voters WHERE user_id = $1")
            .bind(update.user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_err("check voter", &e))?;

        match exists {
            Some(_) => Err(VotingError::ConstraintViolation {
                field: UniqueField::Vote,
            }),
            None => Err(VotingError::UserNotFound),
        }
    }

    async fn get_candidate(&self, id: CandidateId) -> Result<Option<Candidate>> {
        let Ok(id) = i32::try_from(id.0) else {
            return Ok(None);
        };
        let row: Option<CandidateRow> = sqlx::query_as(
            "SELECT id, name, description, member_count, active FROM candidates WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("get candidate", &e))?;

        Ok(row.map(Candidate::from))
    }

    async fn candidate_tallies(&self) -> Result<Vec<CandidateAggregate>> {
        let rows: Vec<TallyRow> = sqlx::query_as(
            r"
            SELECT id, name, description, member_count, vote_count, last_vote_at
            FROM candidate_tallies
            ORDER BY id
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("load candidate tallies", &e))?;

        Ok(rows.into_iter().map(CandidateAggregate::from).collect())
    }

    async fn total_votes(&self) -> Result<u64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM voters WHERE candidate_id > 0")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_db_err("count votes", &e))?;

        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn random_complete_vote(&self) -> Result<Option<VoterRecord>> {
        let row: Option<VoterRow> = sqlx::query_as(&format!(
            r"
            SELECT {VOTER_COLUMNS}
            FROM voters
            WHERE candidate_id > 0
              AND vote_id IS NOT NULL
              AND phone IS NOT NULL
            ORDER BY random()
            LIMIT 1
            "
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("pick random vote", &e))?;

        Ok(row.map(VoterRecord::from))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row() -> VoterRow {
        VoterRow {
            user_id: "u1".into(),
            phone: Some("0812345678".into()),
            first_name: "Anna".into(),
            last_name: "Smith".into(),
            email: "a@b.com".into(),
            free_text_answer: None,
            pdpa_accepted: true,
            marketing_accepted: false,
            consent_timestamp: None,
            consent_source_ip: None,
            policy_version: Some("1.0".into()),
            welcome_accepted: true,
            welcome_accepted_at: None,
            rules_version: Some("v1".into()),
            candidate_id: Some(2),
            vote_id: Some("V2026-ABCDEFGHIJ".into()),
            voted_at: Some(Utc::now()),
            vote_ip: None,
            vote_user_agent: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_vote_id_collision_is_not_a_repeat_vote() {
        assert_eq!(unique_field(Some("voters_phone_key")), Some(UniqueField::Phone));
        assert_eq!(unique_field(Some("voters_pkey")), Some(UniqueField::UserId));
        assert_eq!(unique_field(Some("voters_vote_id_key")), None);
        assert_eq!(unique_field(None), None);
    }

    #[test]
    fn test_row_conversion() {
        let record = VoterRecord::from(row());
        assert_eq!(record.candidate_id, Some(CandidateId(2)));
        assert!(record.is_complete_vote());
        assert_eq!(record.consent.policy_version.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_negative_candidate_is_not_a_vote() {
        let mut row = row();
        row.candidate_id = Some(-1);
        assert!(!VoterRecord::from(row).has_voted());
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (DATABASE_URL)"]
    async fn test_finalize_vote_once_against_postgres() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let store = PostgresVoterStore::new(PgPool::connect(&url).await.unwrap());
        store.migrate().await.unwrap();
        store
            .upsert_candidate(&Candidate {
                id: CandidateId(1),
                name: "A".into(),
                description: String::new(),
                member_count: 3,
                active: true,
            })
            .await
            .unwrap();

        let user = UserId::new(format!("pg-{}", rand::random::<u64>()));
        let now = Utc::now();
        store
            .upsert_welcome(&WelcomeUpdate {
                user_id: user.clone(),
                rules_version: "v1".into(),
                accepted_at: now,
            })
            .await
            .unwrap();

        let update = VoteUpdate {
            user_id: user.clone(),
            candidate_id: CandidateId(1),
            vote_id: VoteId::generate(now),
            voted_at: now,
            ip: "127.0.0.1".into(),
            user_agent: "test".into(),
        };
        store.finalize_vote(&update).await.unwrap();
        assert_eq!(
            store.finalize_vote(&update).await.unwrap_err(),
            VotingError::ConstraintViolation {
                field: UniqueField::Vote
            }
        );
    }
}
