//! Voting core configuration.
//!
//! Values are supplied by the application. Defaults follow the production
//! deployment: short-lived results, day-long user entries, one-minute
//! idempotency windows.
//!
//! # Example
//!
//! ```
//! use voting_core::config::{Environment, VotingConfig};
//! use std::time::Duration;
//!
//! let config = VotingConfig::new(Environment::Staging)
//!     .with_rate_limit(50, Duration::from_secs(600))
//!     .with_random_max_attempts(5);
//!
//! assert_eq!(config.key_prefix, "staging");
//! assert_eq!(config.rate_limit.limit, 50);
//! ```

use crate::error::ConfigError;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Deployment environment. Scopes every cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    /// Local development.
    Development,
    /// Pre-production.
    Staging,
    /// Production.
    Production,
}

impl Environment {
    /// Parse an environment name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnvironment`] for unknown names.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Development),
            "staging" | "stage" => Ok(Self::Staging),
            "prod" | "production" => Ok(Self::Production),
            _ => Err(ConfigError::InvalidEnvironment(s.to_string())),
        }
    }

    /// Short name used as the default cache key prefix.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "dev",
            Self::Staging => "staging",
            Self::Production => "prod",
        }
    }

    /// Check if this is production.
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache entry lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    /// Candidate by id. Default: 15 minutes
    pub candidate: Duration,
    /// Ranked results and totals. Default: 30 seconds
    pub results: Duration,
    /// Vote marker per user. Default: 24 hours
    pub vote_status: Duration,
    /// Personal info per user. Default: 24 hours
    pub personal_info: Duration,
    /// Phone owner marker. Default: 2 hours
    pub phone_used: Duration,
    /// Served marker for random picks. Default: 6 hours
    pub served_vote: Duration,
    /// Idempotency locks. Default: 60 seconds
    pub idempotency: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            candidate: Duration::from_secs(15 * 60),
            results: Duration::from_secs(30),
            vote_status: Duration::from_secs(24 * 3600),
            personal_info: Duration::from_secs(24 * 3600),
            phone_used: Duration::from_secs(2 * 3600),
            served_vote: Duration::from_secs(6 * 3600),
            idempotency: Duration::from_secs(60),
        }
    }
}

/// Fixed-window rate limit settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per window.
    pub limit: u64,
    /// Window length. Default: 1 hour
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            window: Duration::from_secs(3600),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotingConfig {
    /// Deployment environment.
    pub environment: Environment,
    /// Prefix for every cache key. Defaults to the environment short name.
    pub key_prefix: String,
    /// Cache entry lifetimes.
    pub ttls: CacheTtls,
    /// Deadline for detached cache maintenance tasks. Default: 5 seconds
    pub background_timeout: Duration,
    /// Deadline for each store call. Default: 10 seconds
    pub store_timeout: Duration,
    /// Deadline for each inline cache call. Default: 2 seconds
    pub cache_timeout: Duration,
    /// Attempts before the random picker accepts a repeat. Default: 10
    pub random_max_attempts: u32,
    /// Rate limit settings.
    pub rate_limit: RateLimitConfig,
    /// Privacy policy version stamped on consent.
    pub policy_version: String,
    /// `Redis` connection URL.
    pub redis_url: String,
    /// `PostgreSQL` connection URL.
    pub database_url: Option<String>,
}

impl VotingConfig {
    /// Create configuration with defaults for `environment`.
    #[must_use]
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            key_prefix: environment.as_str().to_string(),
            ttls: CacheTtls::default(),
            background_timeout: Duration::from_secs(5),
            store_timeout: Duration::from_secs(10),
            cache_timeout: Duration::from_secs(2),
            random_max_attempts: 10,
            rate_limit: RateLimitConfig::default(),
            policy_version: "1.0".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            database_url: None,
        }
    }

    /// Override the cache key prefix.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Replace the TTL table.
    #[must_use]
    pub const fn with_ttls(mut self, ttls: CacheTtls) -> Self {
        self.ttls = ttls;
        self
    }

    /// Set the detached task deadline.
    #[must_use]
    pub const fn with_background_timeout(mut self, timeout: Duration) -> Self {
        self.background_timeout = timeout;
        self
    }

    /// Set the per-call store deadline.
    #[must_use]
    pub const fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Set the per-call cache deadline.
    #[must_use]
    pub const fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    /// Set random pick attempts.
    #[must_use]
    pub const fn with_random_max_attempts(mut self, attempts: u32) -> Self {
        self.random_max_attempts = attempts;
        self
    }

    /// Set rate limit.
    #[must_use]
    pub const fn with_rate_limit(mut self, limit: u64, window: Duration) -> Self {
        self.rate_limit = RateLimitConfig { limit, window };
        self
    }

    /// Set consent policy version.
    #[must_use]
    pub fn with_policy_version(mut self, version: impl Into<String>) -> Self {
        self.policy_version = version.into();
        self
    }

    /// Load from `VOTING_*` environment variables on top of defaults.
    ///
    /// Recognized: `VOTING_ENV`, `VOTING_KEY_PREFIX`, `VOTING_REDIS_URL`,
    /// `VOTING_DATABASE_URL`, `VOTING_POLICY_VERSION`,
    /// `VOTING_RATE_LIMIT`, `VOTING_RATE_WINDOW_SECS`,
    /// `VOTING_RANDOM_MAX_ATTEMPTS`, `VOTING_RESULTS_TTL_SECS`.
    ///
    /// # Errors
    ///
    /// Returns error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns error if a variable is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let environment = match lookup("VOTING_ENV") {
            Some(env) => Environment::parse(&env)?,
            None => Environment::Development,
        };
        let mut config = Self::new(environment);

        if let Some(prefix) = lookup("VOTING_KEY_PREFIX") {
            config.key_prefix = prefix;
        }
        if let Some(url) = lookup("VOTING_REDIS_URL") {
            config.redis_url = url;
        }
        if let Some(url) = lookup("VOTING_DATABASE_URL") {
            config.database_url = Some(url);
        }
        if let Some(version) = lookup("VOTING_POLICY_VERSION") {
            config.policy_version = version;
        }
        if let Some(raw) = lookup("VOTING_RATE_LIMIT") {
            config.rate_limit.limit = parse_number("VOTING_RATE_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("VOTING_RATE_WINDOW_SECS") {
            config.rate_limit.window =
                Duration::from_secs(parse_number("VOTING_RATE_WINDOW_SECS", &raw)?);
        }
        if let Some(raw) = lookup("VOTING_RANDOM_MAX_ATTEMPTS") {
            let attempts: u64 = parse_number("VOTING_RANDOM_MAX_ATTEMPTS", &raw)?;
            config.random_max_attempts =
                u32::try_from(attempts).map_err(|_| ConfigError::InvalidValue {
                    key: "VOTING_RANDOM_MAX_ATTEMPTS".to_string(),
                    value: raw.clone(),
                })?;
        }
        if let Some(raw) = lookup("VOTING_RESULTS_TTL_SECS") {
            config.ttls.results =
                Duration::from_secs(parse_number("VOTING_RESULTS_TTL_SECS", &raw)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML document. Missing keys keep their defaults.
    ///
    /// ```
    /// use voting_core::config::VotingConfig;
    ///
    /// let config = VotingConfig::from_toml_str(r#"
    ///     environment = "production"
    ///     random_max_attempts = 3
    ///
    ///     [ttls]
    ///     results_secs = 15
    /// "#).unwrap();
    ///
    /// assert!(config.environment.is_production());
    /// assert_eq!(config.ttls.results.as_secs(), 15);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns error if the document does not parse or fails validation.
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(document).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let environment = match file.environment.as_deref() {
            Some(env) => Environment::parse(env)?,
            None => Environment::Development,
        };
        let mut config = Self::new(environment);

        if let Some(prefix) = file.key_prefix {
            config.key_prefix = prefix;
        }
        if let Some(url) = file.redis_url {
            config.redis_url = url;
        }
        if file.database_url.is_some() {
            config.database_url = file.database_url;
        }
        if let Some(version) = file.policy_version {
            config.policy_version = version;
        }
        if let Some(attempts) = file.random_max_attempts {
            config.random_max_attempts = attempts;
        }
        if let Some(secs) = file.background_timeout_secs {
            config.background_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.store_timeout_secs {
            config.store_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.cache_timeout_secs {
            config.cache_timeout = Duration::from_secs(secs);
        }
        if let Some(rate) = file.rate_limit {
            if let Some(limit) = rate.limit {
                config.rate_limit.limit = limit;
            }
            if let Some(secs) = rate.window_secs {
                config.rate_limit.window = Duration::from_secs(secs);
            }
        }
        if let Some(ttls) = file.ttls {
            let apply = |target: &mut Duration, secs: Option<u64>| {
                if let Some(secs) = secs {
                    *target = Duration::from_secs(secs);
                }
            };
            apply(&mut config.ttls.candidate, ttls.candidate_secs);
            apply(&mut config.ttls.results, ttls.results_secs);
            apply(&mut config.ttls.vote_status, ttls.vote_status_secs);
            apply(&mut config.ttls.personal_info, ttls.personal_info_secs);
            apply(&mut config.ttls.phone_used, ttls.phone_used_secs);
            apply(&mut config.ttls.served_vote, ttls.served_vote_secs);
            apply(&mut config.ttls.idempotency, ttls.idempotency_secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_prefix.is_empty() {
            return Err(ConfigError::Validation("key_prefix must not be empty".into()));
        }
        if self.random_max_attempts == 0 {
            return Err(ConfigError::Validation(
                "random_max_attempts must be at least 1".into(),
            ));
        }
        if self.rate_limit.window.is_zero() {
            return Err(ConfigError::Validation("rate limit window must be non-zero".into()));
        }
        let ttls = [
            ("candidate", self.ttls.candidate),
            ("results", self.ttls.results),
            ("vote_status", self.ttls.vote_status),
            ("personal_info", self.ttls.personal_info),
            ("phone_used", self.ttls.phone_used),
            ("served_vote", self.ttls.served_vote),
            ("idempotency", self.ttls.idempotency),
        ];
        if let Some((name, _)) = ttls.iter().find(|(_, ttl)| ttl.as_secs() == 0) {
            return Err(ConfigError::Validation(format!(
                "ttl {name} must be at least one second"
            )));
        }
        Ok(())
    }
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self::new(Environment::Development)
    }
}

fn parse_number(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    environment: Option<String>,
    key_prefix: Option<String>,
    redis_url: Option<String>,
    database_url: Option<String>,
    policy_version: Option<String>,
    random_max_attempts: Option<u32>,
    background_timeout_secs: Option<u64>,
    store_timeout_secs: Option<u64>,
    cache_timeout_secs: Option<u64>,
    rate_limit: Option<RateLimitFile>,
    ttls: Option<TtlFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RateLimitFile {
    limit: Option<u64>,
    window_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TtlFile {
    candidate_secs: Option<u64>,
    results_secs: Option<u64>,
    vote_status_secs: Option<u64>,
    personal_info_secs: Option<u64>,
    phone_used_secs: Option<u64>,
    served_vote_secs: Option<u64>,
    idempotency_secs: Option<u64>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = VotingConfig::default();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.key_prefix, "dev");
        assert_eq!(config.ttls.candidate, Duration::from_secs(900));
        assert_eq!(config.ttls.results, Duration::from_secs(30));
        assert_eq!(config.ttls.phone_used, Duration::from_secs(7200));
        assert_eq!(config.ttls.idempotency, Duration::from_secs(60));
        assert_eq!(config.background_timeout, Duration::from_secs(5));
        assert_eq!(config.random_max_attempts, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("PROD").unwrap(), Environment::Production);
        assert_eq!(Environment::parse("stage").unwrap(), Environment::Staging);
        assert!(matches!(
            Environment::parse("qa"),
            Err(ConfigError::InvalidEnvironment(_))
        ));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("VOTING_ENV", "production"),
            ("VOTING_RATE_LIMIT", "25"),
            ("VOTING_RATE_WINDOW_SECS", "120"),
            ("VOTING_POLICY_VERSION", "2.1"),
        ]
        .into_iter()
        .collect();

        let config =
            VotingConfig::from_lookup(|key| vars.get(key).map(ToString::to_string)).unwrap();
        assert_eq!(config.key_prefix, "prod");
        assert_eq!(config.rate_limit.limit, 25);
        assert_eq!(config.rate_limit.window, Duration::from_secs(120));
        assert_eq!(config.policy_version, "2.1");
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let result = VotingConfig::from_lookup(|key| {
            (key == "VOTING_RATE_LIMIT").then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_from_toml() {
        let config = VotingConfig::from_toml_str(
            r#"
            environment = "staging"
            key_prefix = "vote-staging"

            [rate_limit]
            limit = 10
            window_secs = 60

            [ttls]
            served_vote_secs = 3600
            "#,
        )
        .unwrap();

        assert_eq!(config.key_prefix, "vote-staging");
        assert_eq!(config.rate_limit.limit, 10);
        assert_eq!(config.ttls.served_vote, Duration::from_secs(3600));
        assert_eq!(config.ttls.results, Duration::from_secs(30));
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        let result = VotingConfig::from_toml_str("colour = \"blue\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validation() {
        let config = VotingConfig::default().with_random_max_attempts(0);
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let config = VotingConfig::default().with_key_prefix("");
        assert!(config.validate().is_err());
    }
}
