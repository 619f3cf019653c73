//! Cache key derivation.
//!
//! Every key is `{prefix}:vote:{kind}:{id}` where the prefix is the
//! deployment environment, so staging and production can share one `Redis`
//! instance without colliding.

use crate::model::{CandidateId, UserId, VoteId};

/// Environment-scoped key builder. Pure; cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNamespace {
    root: String,
}

impl KeyNamespace {
    /// Create a namespace under `prefix` (usually the environment name).
    ///
    /// # Examples
    ///
    /// ```
    /// use voting_core::keys::KeyNamespace;
    /// use voting_core::model::UserId;
    ///
    /// let keys = KeyNamespace::new("prod");
    /// assert_eq!(keys.vote_status(&UserId::new("u1")), "prod:vote:status:u1");
    /// ```
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            root: format!("{prefix}:vote"),
        }
    }

    fn key(&self, kind: &str, id: &str) -> String {
        format!("{}:{kind}:{id}", self.root)
    }

    /// Candidate by id.
    #[must_use]
    pub fn candidate(&self, id: CandidateId) -> String {
        self.key("candidate", &id.0.to_string())
    }

    /// Owner of a phone number.
    #[must_use]
    pub fn phone_used(&self, phone: &str) -> String {
        self.key("phone", phone)
    }

    /// Personal info of a user.
    #[must_use]
    pub fn personal_info(&self, user_id: &UserId) -> String {
        self.key("personal", user_id.as_str())
    }

    /// Vote marker of a user.
    #[must_use]
    pub fn vote_status(&self, user_id: &UserId) -> String {
        self.key("status", user_id.as_str())
    }

    /// Idempotency lock for a derived seed.
    #[must_use]
    pub fn idempotency(&self, seed: &str) -> String {
        self.key("idem", seed)
    }

    /// Served marker for a vote shown by the random picker.
    #[must_use]
    pub fn served_vote(&self, vote_id: &VoteId) -> String {
        self.key("served", vote_id.as_str())
    }

    /// Rate-limit window counter for a hashed subject.
    #[must_use]
    pub fn rate_limit(&self, subject_hash: &str) -> String {
        self.key("ratelimit", subject_hash)
    }

    /// Full ranked results.
    #[must_use]
    pub fn results(&self) -> String {
        self.key("results", "summary")
    }

    /// Pattern matching every results/aggregate entry.
    #[must_use]
    pub fn results_pattern(&self) -> String {
        self.key("results", "*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_environment_scoped() {
        let dev = KeyNamespace::new("dev");
        let prod = KeyNamespace::new("prod");
        let user = UserId::new("u1");
        assert_ne!(dev.personal_info(&user), prod.personal_info(&user));
        assert!(dev.personal_info(&user).starts_with("dev:vote:"));
    }

    #[test]
    fn test_key_kinds_do_not_collide() {
        let keys = KeyNamespace::new("dev");
        let user = UserId::new("42");
        let all = [
            keys.candidate(CandidateId(42)),
            keys.phone_used("42"),
            keys.personal_info(&user),
            keys.vote_status(&user),
            keys.idempotency("42"),
            keys.served_vote(&VoteId("42".into())),
            keys.rate_limit("42"),
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_results_pattern_covers_results_key() {
        let keys = KeyNamespace::new("dev");
        let pattern = keys.results_pattern();
        let prefix = pattern.trim_end_matches('*');
        assert!(keys.results().starts_with(prefix));
        assert_eq!(keys.candidate(CandidateId(3)), "dev:vote:candidate:3");
    }
}
