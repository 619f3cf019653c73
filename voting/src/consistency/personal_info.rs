//! Personal info submission.
//!
//! # Flow
//!
//! ```text
//! validate ─▶ idempotency lock ─ duplicate ─▶ replay stored record
//!                   │
//!                   ▼
//!     phone owner (cache, then store) ─ other user ─▶ DuplicatePhone
//!                   │
//!                   ▼
//!     upsert (store arbitrates phone races) ─▶ detached write-through
//! ```

use super::VotingCore;
use super::fetchers::PhoneOwnerFetcher;
use crate::error::{Result, UniqueField, VotingError};
use crate::idempotency::{IdempotencySeed, LockOutcome, Operation};
use crate::model::{
    Consent, PersonalInfoFields, PersonalInfoRecord, PersonalInfoUpdate, RequestContext, UserId,
};
use crate::providers::{CacheClient, CacheOp, VoterStore};
use crate::validation::{ValidatedPersonalInfo, validate_personal_info};

impl<S, C> VotingCore<S, C>
where
    S: VoterStore,
    C: CacheClient + Clone + 'static,
{
    /// Create or update the personal info of `user_id`.
    ///
    /// Fields are validated and the phone normalized before any I/O. A
    /// repeated submission (same client token, or same normalized body,
    /// inside the idempotency window) performs no write and returns the
    /// stored record.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - A field is invalid → `VotingError::Validation`
    /// - The phone belongs to another user → `VotingError::DuplicatePhone`
    /// - An equivalent request has not committed yet → `VotingError::AlreadyProcessing`
    /// - The store fails → `VotingError::Store`
    pub async fn submit_personal_info(
        &self,
        user_id: &UserId,
        fields: &PersonalInfoFields,
        ctx: &RequestContext,
    ) -> Result<PersonalInfoRecord> {
        let info = validate_personal_info(fields)?;

        let seed = match ctx.idempotency_token.as_deref() {
            Some(token) => IdempotencySeed::from_token(user_id, Operation::PersonalInfo, token),
            None => IdempotencySeed::from_body(
                user_id,
                Operation::PersonalInfo,
                &[
                    info.first_name.as_str(),
                    info.last_name.as_str(),
                    info.email.as_str(),
                    info.phone.as_str(),
                    info.free_text_answer.as_deref().unwrap_or(""),
                    if info.marketing_consent { "1" } else { "0" },
                ],
            ),
        };
        if self.locks.try_acquire(&seed).await == LockOutcome::Duplicate {
            let with_token = ctx.idempotency_token.is_some();
            if let Some(record) = self.replay_personal_info(user_id, &info, with_token).await? {
                return Ok(record);
            }
            // Same body as an earlier submission but the stored state moved on
            // since (A, B, then A again): a new edit, not a retry
            tracing::debug!(user_id = %user_id, "Body matches an earlier submission, writing again");
        }

        self.ensure_phone_available(user_id, &info.phone).await?;

        let previous_phone = self
            .store_call("get_voter", self.store.get_voter(user_id))
            .await?
            .and_then(|record| record.phone);

        let now = self.clock.now();
        let update = PersonalInfoUpdate {
            user_id: user_id.clone(),
            first_name: info.first_name,
            last_name: info.last_name,
            email: info.email,
            phone: info.phone,
            free_text_answer: info.free_text_answer,
            consent: Consent {
                pdpa_accepted: true,
                marketing_accepted: info.marketing_consent,
                consent_timestamp: Some(now),
                consent_source_ip: Some(ctx.ip.clone()),
                policy_version: Some(self.config.policy_version.clone()),
            },
            updated_at: now,
        };

        let stored = self
            .store_call("upsert_personal_info", self.store.upsert_personal_info(&update))
            .await
            .map_err(|e| match e {
                VotingError::ConstraintViolation {
                    field: UniqueField::Phone,
                } => {
                    metrics::counter!("voting.personal_info.duplicate_phone").increment(1);
                    tracing::warn!(user_id = %user_id, "Phone claimed concurrently by another user");
                    VotingError::DuplicatePhone
                }
                VotingError::ConstraintViolation { field } => {
                    tracing::error!(user_id = %user_id, field = field.as_str(), "Unexpected constraint violation");
                    VotingError::Store(format!("constraint violation on {}", field.as_str()))
                }
                other => {
                    tracing::error!(user_id = %user_id, error = %other, "Failed to store personal info");
                    other
                }
            })?;

        let record = PersonalInfoRecord::from_record(&stored)
            .ok_or_else(|| VotingError::Store("personal info missing after write".into()))?;

        self.write_through_personal_info(&record);
        if let Some(previous) = previous_phone.filter(|p| *p != record.phone) {
            self.aside
                .spawn_invalidate(vec![self.keys.phone_used(&previous)], Vec::new());
        }

        metrics::counter!("voting.personal_info.saved").increment(1);
        tracing::info!(user_id = %user_id, "Personal info saved");
        Ok(record)
    }

    /// Reject a phone already owned by another user.
    ///
    /// The cached owner only clears the caller early. Naming anyone else, it
    /// is confirmed against the store before rejecting, and repaired when
    /// the store disagrees.
    async fn ensure_phone_available(&self, user_id: &UserId, phone: &str) -> Result<()> {
        let key = self.keys.phone_used(phone);
        let fetcher = PhoneOwnerFetcher {
            store: self.store.as_ref(),
            phone,
            timeout: self.config.store_timeout,
        };
        let owner = self
            .aside
            .get_or_fetch(&key, self.config.ttls.phone_used, &fetcher)
            .await?;

        let Some(owner) = owner.filter(|owner| owner != user_id) else {
            return Ok(());
        };

        let confirmed = self
            .store_call("find_user_by_phone", self.store.find_user_by_phone(phone))
            .await?;
        match confirmed {
            Some(current) if current != *user_id => {
                if current != owner {
                    self.aside.spawn_write(&key, &current, self.config.ttls.phone_used);
                }
                metrics::counter!("voting.personal_info.duplicate_phone").increment(1);
                tracing::warn!(user_id = %user_id, "Phone already registered to another user");
                Err(VotingError::DuplicatePhone)
            }
            Some(current) => {
                metrics::counter!("voting.cache.stale", "entity" => "phone_owner").increment(1);
                tracing::warn!(user_id = %user_id, "Stale phone owner in cache, repairing");
                self.aside.spawn_write(&key, &current, self.config.ttls.phone_used);
                Ok(())
            }
            None => {
                metrics::counter!("voting.cache.stale", "entity" => "phone_owner").increment(1);
                tracing::warn!(user_id = %user_id, "Stale phone owner in cache, dropping");
                self.aside.spawn_invalidate(vec![key], Vec::new());
                Ok(())
            }
        }
    }

    /// Answer a duplicate submission from stored state, without writing.
    ///
    /// `Ok(None)` when the request should be written after all: no client
    /// token was sent and the stored record differs from the body.
    async fn replay_personal_info(
        &self,
        user_id: &UserId,
        info: &ValidatedPersonalInfo,
        with_token: bool,
    ) -> Result<Option<PersonalInfoRecord>> {
        let stored = self
            .store_call("get_voter", self.store.get_voter(user_id))
            .await?
            .as_ref()
            .and_then(PersonalInfoRecord::from_record);

        match stored {
            Some(record) if Self::matches(&record, info) => {
                tracing::debug!(user_id = %user_id, "Replaying stored personal info");
                Ok(Some(record))
            }
            Some(_) if !with_token => Ok(None),
            // Not committed yet, or the first attempt was rejected
            _ => {
                self.ensure_phone_available(user_id, &info.phone).await?;
                Err(VotingError::AlreadyProcessing)
            }
        }
    }

    fn matches(record: &PersonalInfoRecord, info: &ValidatedPersonalInfo) -> bool {
        record.first_name == info.first_name
            && record.last_name == info.last_name
            && record.email == info.email
            && record.phone == info.phone
            && record.free_text_answer == info.free_text_answer
            && record.marketing_accepted == info.marketing_consent
    }

    fn write_through_personal_info(&self, record: &PersonalInfoRecord) {
        let (Ok(info), Ok(owner)) = (
            serde_json::to_string(record),
            serde_json::to_string(&record.user_id),
        ) else {
            tracing::error!(user_id = %record.user_id, "Failed to serialize personal info for cache");
            return;
        };

        self.aside.spawn_pipeline(vec![
            CacheOp::Set {
                key: self.keys.personal_info(&record.user_id),
                value: info,
                ttl: self.config.ttls.personal_info,
            },
            CacheOp::Set {
                key: self.keys.phone_used(&record.phone),
                value: owner,
                ttl: self.config.ttls.phone_used,
            },
        ]);
    }
}
