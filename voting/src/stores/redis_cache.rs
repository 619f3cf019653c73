//! `Redis` cache client.
//!
//! # Commands
//!
//! | Operation        | Command                             |
//! |------------------|-------------------------------------|
//! | `set`            | `SET key value PX ttl`              |
//! | `set_if_absent`  | `SET key value NX PX ttl`           |
//! | `delete_pattern` | `SCAN MATCH pattern` then `DEL`     |
//! | `pipeline`       | `MULTI` / `EXEC`                    |
//!
//! Expiries are sent in milliseconds so sub-second TTLs survive.

use crate::error::CacheError;
use crate::providers::{CacheClient, CacheOp, CacheReply, CacheResult};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Value};
use std::time::Duration;

/// Keys requested per `SCAN` round trip.
const SCAN_BATCH: usize = 500;

/// `Redis`-backed [`CacheClient`].
///
/// # Example
///
/// ```no_run
/// use voting_core::stores::RedisCacheClient;
/// use voting_core::providers::CacheClient;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let cache = RedisCacheClient::new("redis://127.0.0.1:6379").await?;
/// cache.set("dev:vote:candidate:1", "{}", Duration::from_secs(900)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisCacheClient {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,
}

impl RedisCacheClient {
    /// Connect to `Redis`.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - `Redis` connection URL (e.g., "<redis://127.0.0.1:6379>")
    ///
    /// # Errors
    ///
    /// Returns error if connection to `Redis` fails.
    pub async fn new(redis_url: &str) -> CacheResult<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            CacheError::Unavailable(format!("Failed to create Redis client: {e}"))
        })?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::Unavailable(format!("Failed to create Redis connection manager: {e}"))
        })?;

        Ok(Self { conn_manager })
    }

    fn millis(ttl: Duration) -> u64 {
        u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
    }

    fn ttl_from_pttl(pttl: i64) -> Option<Duration> {
        // -2: missing key, -1: no expiry
        u64::try_from(pttl).ok().map(Duration::from_millis)
    }

    fn decode(op: &CacheOp, value: &Value) -> CacheResult<CacheReply> {
        let reply = match op {
            CacheOp::Set { .. } => CacheReply::Ok,
            CacheOp::Delete { .. } | CacheOp::Expire { .. } => {
                CacheReply::Affected(redis::from_redis_value(value).map_err(map_err)?)
            }
            CacheOp::Increment { .. } => {
                CacheReply::Counter(redis::from_redis_value(value).map_err(map_err)?)
            }
            CacheOp::Ttl { .. } => {
                let pttl: i64 = redis::from_redis_value(value).map_err(map_err)?;
                CacheReply::Ttl(Self::ttl_from_pttl(pttl))
            }
        };
        Ok(reply)
    }
}

fn map_err(e: RedisError) -> CacheError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
        CacheError::Unavailable(e.to_string())
    } else if e.is_timeout() {
        CacheError::Timeout
    } else {
        CacheError::Command(e.to_string())
    }
}

impl CacheClient for RedisCacheClient {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn_manager.clone();
        let value: Option<String> = conn.get(key).await.map_err(map_err)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(Self::millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        let mut conn = self.conn_manager.clone();

        // Nil reply when the key already exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(Self::millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;

        Ok(reply.is_some())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn_manager.clone();
        let removed: u64 = conn.del(keys).await.map_err(map_err)?;
        Ok(removed)
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let mut conn = self.conn_manager.clone();
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(map_err)?;

            if !keys.is_empty() {
                let count: u64 = conn.del(&keys).await.map_err(map_err)?;
                removed += count;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!(pattern = %pattern, removed = removed, "Deleted keys by pattern");
        Ok(removed)
    }

    async fn increment(&self, key: &str) -> CacheResult<i64> {
        let mut conn = self.conn_manager.clone();
        let value: i64 = conn.incr(key, 1).await.map_err(map_err)?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let mut conn = self.conn_manager.clone();
        let millis = i64::try_from(Self::millis(ttl)).unwrap_or(i64::MAX);
        let applied: bool = conn.pexpire(key, millis).await.map_err(map_err)?;
        Ok(applied)
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let mut conn = self.conn_manager.clone();
        let pttl: i64 = conn.pttl(key).await.map_err(map_err)?;
        Ok(Self::ttl_from_pttl(pttl))
    }

    async fn pipeline(&self, ops: Vec<CacheOp>) -> CacheResult<Vec<CacheReply>> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &ops {
            match op {
                CacheOp::Set { key, value, ttl } => {
                    pipe.cmd("SET")
                        .arg(key)
                        .arg(value)
                        .arg("PX")
                        .arg(Self::millis(*ttl));
                }
                CacheOp::Delete { key } => {
                    pipe.del(key);
                }
                CacheOp::Increment { key } => {
                    pipe.incr(key, 1);
                }
                CacheOp::Expire { key, ttl } => {
                    pipe.pexpire(key, i64::try_from(Self::millis(*ttl)).unwrap_or(i64::MAX));
                }
                CacheOp::Ttl { key } => {
                    pipe.pttl(key);
                }
            }
        }

        let mut conn = self.conn_manager.clone();
        let values: Vec<Value> = pipe.query_async(&mut conn).await.map_err(map_err)?;

        if values.len() != ops.len() {
            return Err(CacheError::Command(format!(
                "pipeline returned {} replies for {} commands",
                values.len(),
                ops.len()
            )));
        }

        ops.iter()
            .zip(values.iter())
            .map(|(op, value)| Self::decode(op, value))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pttl_decoding() {
        assert_eq!(RedisCacheClient::ttl_from_pttl(-2), None);
        assert_eq!(RedisCacheClient::ttl_from_pttl(-1), None);
        assert_eq!(
            RedisCacheClient::ttl_from_pttl(1500),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_sub_millisecond_ttl_rounds_up() {
        assert_eq!(RedisCacheClient::millis(Duration::from_micros(10)), 1);
        assert_eq!(RedisCacheClient::millis(Duration::from_secs(2)), 2000);
    }

    #[tokio::test]
    #[ignore = "requires Redis at 127.0.0.1:6379"]
    async fn test_set_if_absent_against_redis() {
        let cache = RedisCacheClient::new("redis://127.0.0.1:6379").await.unwrap();
        let key = format!("test:vote:idem:{}", rand::random::<u64>());
        let ttl = Duration::from_secs(5);

        assert!(cache.set_if_absent(&key, "1", ttl).await.unwrap());
        assert!(!cache.set_if_absent(&key, "1", ttl).await.unwrap());
        assert_eq!(cache.delete(&[key]).await.unwrap(), 1);
    }

    #[tokio::test]
    #[ignore = "requires Redis at 127.0.0.1:6379"]
    async fn test_pipeline_and_pattern_delete_against_redis() {
        let cache = RedisCacheClient::new("redis://127.0.0.1:6379").await.unwrap();
        let prefix = format!("test{}:vote:results", rand::random::<u64>());
        let counter = format!("{prefix}:counter");

        let replies = cache
            .pipeline(vec![
                CacheOp::Set {
                    key: format!("{prefix}:summary"),
                    value: "{}".into(),
                    ttl: Duration::from_secs(30),
                },
                CacheOp::Increment { key: counter.clone() },
                CacheOp::Ttl { key: counter },
            ])
            .await
            .unwrap();
        assert_eq!(replies[0], CacheReply::Ok);
        assert_eq!(replies[1], CacheReply::Counter(1));
        assert_eq!(replies[2], CacheReply::Ttl(None));

        assert_eq!(cache.delete_pattern(&format!("{prefix}:*")).await.unwrap(), 2);
    }
}
