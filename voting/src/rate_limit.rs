//! Fixed-window request counter.
//!
//! One counter per subject hash and window: the first increment of a window
//! sets its expiry, later increments only count. The counter never sees a
//! raw client address, callers pass [`hash_subject`](crate::utils::hash_subject)
//! output.
//!
//! Best-effort: when the cache cannot answer, requests are allowed.

use crate::cache_aside::CacheAside;
use crate::keys::KeyNamespace;
use crate::model::RateLimitDecision;
use crate::providers::{CacheClient, CacheOp, CacheReply, Clock};
use std::sync::Arc;
use std::time::Duration;

/// Fixed-window rate limiter.
pub struct FixedWindowRateLimiter<C> {
    aside: CacheAside<C>,
    keys: KeyNamespace,
    clock: Arc<dyn Clock>,
    limit: u64,
    window: Duration,
}

impl<C> FixedWindowRateLimiter<C>
where
    C: CacheClient + Clone + 'static,
{
    /// Create a limiter allowing `limit` requests per `window`.
    #[must_use]
    pub fn new(
        aside: CacheAside<C>,
        keys: KeyNamespace,
        clock: Arc<dyn Clock>,
        limit: u64,
        window: Duration,
    ) -> Self {
        Self {
            aside,
            keys,
            clock,
            limit,
            window,
        }
    }

    /// Count one request for `subject_hash` and decide whether it is allowed.
    pub async fn check_and_increment(&self, subject_hash: &str) -> RateLimitDecision {
        let key = self.keys.rate_limit(subject_hash);
        let now = self.clock.now();
        let cache = self.aside.client();

        let ops = vec![
            CacheOp::Increment { key: key.clone() },
            CacheOp::Ttl { key: key.clone() },
        ];
        let replies = match self.aside.call(cache.pipeline(ops)).await {
            Ok(replies) => replies,
            Err(e) => {
                metrics::counter!("voting.cache.error", "op" => "rate_limit").increment(1);
                tracing::warn!(subject = %subject_hash, error = %e, "Rate limiter unavailable, allowing request");
                return self.fail_open(now);
            }
        };

        let (count, ttl) = match replies.as_slice() {
            [CacheReply::Counter(count), CacheReply::Ttl(ttl)] => {
                (u64::try_from(*count).unwrap_or(0), *ttl)
            }
            other => {
                tracing::warn!(subject = %subject_hash, replies = ?other, "Unexpected rate limiter replies, allowing request");
                return self.fail_open(now);
            }
        };

        // First hit of the window, or a counter that lost its expiry
        let ttl = match ttl {
            Some(ttl) if count > 1 => ttl,
            _ => {
                if let Err(e) = self.aside.call(cache.expire(&key, self.window)).await {
                    tracing::warn!(subject = %subject_hash, error = %e, "Failed to set rate limit window");
                }
                self.window
            }
        };

        let elapsed = self.window.saturating_sub(ttl);
        let window_start = chrono::Duration::from_std(elapsed)
            .ok()
            .and_then(|elapsed| now.checked_sub_signed(elapsed))
            .unwrap_or(now);

        let allowed = count <= self.limit;
        if !allowed {
            metrics::counter!("voting.rate_limit.rejected").increment(1);
            tracing::warn!(subject = %subject_hash, count = count, limit = self.limit, "Rate limit exceeded");
        }

        RateLimitDecision {
            allowed,
            count,
            limit: self.limit,
            window_start,
            ttl,
        }
    }

    fn fail_open(&self, now: chrono::DateTime<chrono::Utc>) -> RateLimitDecision {
        RateLimitDecision {
            allowed: true,
            count: 0,
            limit: self.limit,
            window_start: now,
            ttl: self.window,
        }
    }
}
