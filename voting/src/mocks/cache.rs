//! Mock cache client for testing.

use crate::error::CacheError;
use crate::providers::{CacheClient, CacheOp, CacheReply, CacheResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-memory cache with TTL support.
///
/// Expired entries are dropped lazily on access. [`set_available`](Self::set_available)
/// simulates an outage: every call fails with [`CacheError::Unavailable`].
#[derive(Debug, Clone)]
pub struct MockCacheClient {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    available: Arc<AtomicBool>,
}

impl MockCacheClient {
    /// Create an empty, available cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Create a cache that fails every call.
    #[must_use]
    pub fn unavailable() -> Self {
        let cache = Self::new();
        cache.set_available(false);
        cache
    }

    /// Toggle the simulated outage.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Read a live value without going through the trait (ignores outage).
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .lock()
            .ok()?
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    /// `true` when no live entries exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live keys matching a glob pattern.
    #[must_use]
    pub fn keys(&self, pattern: &str) -> Vec<String> {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(key, entry)| entry.is_live(now) && glob_match(pattern, key))
                    .map(|(key, _)| key.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn guard(&self) -> CacheResult<std::sync::MutexGuard<'_, HashMap<String, Entry>>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("mock cache offline".into()));
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CacheError::Command("Mutex lock failed".into()))?;
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(entries)
    }

    fn apply(entries: &mut HashMap<String, Entry>, op: &CacheOp) -> CacheResult<CacheReply> {
        let now = Instant::now();
        match op {
            CacheOp::Set { key, value, ttl } => {
                entries.insert(
                    key.clone(),
                    Entry {
                        value: value.clone(),
                        expires_at: Some(now + *ttl),
                    },
                );
                Ok(CacheReply::Ok)
            }
            CacheOp::Delete { key } => Ok(CacheReply::Affected(u64::from(
                entries.remove(key).is_some(),
            ))),
            CacheOp::Increment { key } => {
                let entry = entries.entry(key.clone()).or_insert_with(|| Entry {
                    value: "0".to_string(),
                    expires_at: None,
                });
                let current: i64 = entry
                    .value
                    .parse()
                    .map_err(|_| CacheError::Command(format!("{key} is not an integer")))?;
                let next = current + 1;
                entry.value = next.to_string();
                Ok(CacheReply::Counter(next))
            }
            CacheOp::Expire { key, ttl } => match entries.get_mut(key) {
                Some(entry) => {
                    entry.expires_at = Some(now + *ttl);
                    Ok(CacheReply::Affected(1))
                }
                None => Ok(CacheReply::Affected(0)),
            },
            CacheOp::Ttl { key } => Ok(CacheReply::Ttl(
                entries
                    .get(key)
                    .and_then(|entry| entry.expires_at)
                    .map(|at| at.saturating_duration_since(now)),
            )),
        }
    }
}

impl Default for MockCacheClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheClient for MockCacheClient {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.guard()?.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let op = CacheOp::Set {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        };
        let mut entries = self.guard()?;
        Self::apply(&mut entries, &op).map(|_| ())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        let mut entries = self.guard()?;
        if entries.contains_key(key) {
            return Ok(false);
        }
        let op = CacheOp::Set {
            key: key.to_string(),
            value: value.to_string(),
            ttl,
        };
        Self::apply(&mut entries, &op)?;
        Ok(true)
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        let mut entries = self.guard()?;
        Ok(keys
            .iter()
            .filter(|key| entries.remove(key.as_str()).is_some())
            .count() as u64)
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let mut entries = self.guard()?;
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        Ok((before - entries.len()) as u64)
    }

    async fn increment(&self, key: &str) -> CacheResult<i64> {
        let op = CacheOp::Increment {
            key: key.to_string(),
        };
        let mut entries = self.guard()?;
        match Self::apply(&mut entries, &op)? {
            CacheReply::Counter(value) => Ok(value),
            other => Err(CacheError::Command(format!("unexpected reply {other:?}"))),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let op = CacheOp::Expire {
            key: key.to_string(),
            ttl,
        };
        let mut entries = self.guard()?;
        Ok(Self::apply(&mut entries, &op)? == CacheReply::Affected(1))
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let op = CacheOp::Ttl {
            key: key.to_string(),
        };
        let mut entries = self.guard()?;
        match Self::apply(&mut entries, &op)? {
            CacheReply::Ttl(ttl) => Ok(ttl),
            other => Err(CacheError::Command(format!("unexpected reply {other:?}"))),
        }
    }

    async fn pipeline(&self, ops: Vec<CacheOp>) -> CacheResult<Vec<CacheReply>> {
        let mut entries = self.guard()?;
        // Apply to a scratch copy so a failing op leaves no partial effects
        let mut scratch = entries.clone();
        let replies = ops
            .iter()
            .map(|op| Self::apply(&mut scratch, op))
            .collect::<CacheResult<Vec<_>>>()?;
        *entries = scratch;
        Ok(replies)
    }
}

/// Glob match supporting only the `*` wildcard.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    let Some(mut remaining) = text.strip_prefix(first) else {
        return false;
    };

    for part in &parts[1..parts.len() - 1] {
        match remaining.find(part) {
            Some(idx) => remaining = &remaining[idx + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last)
}
