//! Rules acceptance.

use super::VotingCore;
use crate::error::{Result, VotingError};
use crate::model::{RequestContext, UserId, WelcomeAcceptance, WelcomeUpdate};
use crate::providers::{CacheClient, VoterStore};

/// Longest accepted rules version string.
const MAX_RULES_VERSION_CHARS: usize = 32;

impl<S, C> VotingCore<S, C>
where
    S: VoterStore,
    C: CacheClient + Clone + 'static,
{
    /// Record that `user_id` accepted the voting rules.
    ///
    /// Creates the voter record on first contact. Repeating the call only
    /// refreshes the acceptance fields, so it is safe to retry.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `rules_version` is empty or too long → `VotingError::Validation`
    /// - The store write fails → `VotingError::UserCreationFailed`
    pub async fn accept_welcome(
        &self,
        user_id: &UserId,
        rules_version: &str,
        ctx: &RequestContext,
    ) -> Result<WelcomeAcceptance> {
        let rules_version = rules_version.trim();
        if rules_version.is_empty() {
            return Err(VotingError::validation("rules_version", "is required"));
        }
        if rules_version.chars().count() > MAX_RULES_VERSION_CHARS {
            return Err(VotingError::validation(
                "rules_version",
                format!("must be at most {MAX_RULES_VERSION_CHARS} characters"),
            ));
        }

        let update = WelcomeUpdate {
            user_id: user_id.clone(),
            rules_version: rules_version.to_string(),
            accepted_at: self.clock.now(),
        };

        let record = self
            .store_call("upsert_welcome", self.store.upsert_welcome(&update))
            .await
            .map_err(|e| {
                tracing::error!(user_id = %user_id, error = %e, "Failed to record welcome acceptance");
                VotingError::UserCreationFailed(e.to_string())
            })?;

        tracing::info!(
            user_id = %user_id,
            rules_version = %rules_version,
            ip = %ctx.ip,
            "Welcome accepted"
        );

        Ok(WelcomeAcceptance::from_record(&record).unwrap_or(WelcomeAcceptance {
            user_id: update.user_id,
            rules_version: update.rules_version,
            accepted_at: update.accepted_at,
        }))
    }
}
