//! In-process store with Redis-like semantics.
//!
//! Used by tests and local development. Expiry is evaluated lazily against
//! the injected clock, so a `ManualClock` can walk counters across a day
//! boundary without sleeping.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::backend::KvStore;
use crate::calendar::{Clock, SystemClock};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Value {
    Int(i64),
    Str(String),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<i64>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn wrong_type(key: &str, expected: &str) -> StoreError {
    StoreError::Malformed {
        key: key.to_string(),
        detail: format!("WRONGTYPE value is not {}", expected),
    }
}

/// A [`KvStore`] held entirely in memory.
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store that evaluates expiry against `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Number of live keys.
    pub fn key_count(&self) -> usize {
        let now = self.now_secs();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    /// Expiry of `key` in epoch seconds, if it has one.
    pub fn expiry_of(&self, key: &str) -> Option<i64> {
        let now = self.now_secs();
        self.entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.expires_at)
    }

    fn now_secs(&self) -> i64 {
        self.clock.now().timestamp()
    }

    /// Drop `key` if its TTL has passed.
    fn purge_expired(&self, key: &str) {
        let now = self.now_secs();
        self.entries.remove_if(key, |_, e| e.is_expired(now));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get_int(&self, key: &str) -> StoreResult<Option<i64>> {
        self.purge_expired(key);
        match self.entries.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Int(v) => Ok(Some(*v)),
                Value::Str(s) => s
                    .parse()
                    .map(Some)
                    .map_err(|_| wrong_type(key, "an integer")),
                Value::Set(_) => Err(wrong_type(key, "an integer")),
            },
        }
    }

    async fn incr_by_expire_at(&self, key: &str, delta: i64, epoch_secs: i64) -> StoreResult<i64> {
        self.purge_expired(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Int(0)));
        let value = match &mut entry.value {
            Value::Int(v) => {
                *v += delta;
                *v
            }
            _ => return Err(wrong_type(key, "an integer")),
        };
        entry.expires_at = Some(epoch_secs);
        Ok(value)
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        self.purge_expired(key);
        Ok(self.entries.remove(key).is_some())
    }

    async fn sadd(&self, set: &str, member: &str) -> StoreResult<bool> {
        self.purge_expired(set);
        let mut entry = self
            .entries
            .entry(set.to_string())
            .or_insert_with(|| Entry::new(Value::Set(HashSet::new())));
        match &mut entry.value {
            Value::Set(members) => Ok(members.insert(member.to_string())),
            _ => Err(wrong_type(set, "a set")),
        }
    }

    async fn sadd_expire_at(&self, set: &str, member: &str, epoch_secs: i64) -> StoreResult<bool> {
        self.purge_expired(set);
        let mut entry = self
            .entries
            .entry(set.to_string())
            .or_insert_with(|| Entry::new(Value::Set(HashSet::new())));
        let added = match &mut entry.value {
            Value::Set(members) => members.insert(member.to_string()),
            _ => return Err(wrong_type(set, "a set")),
        };
        entry.expires_at = Some(epoch_secs);
        Ok(added)
    }

    async fn srem(&self, set: &str, member: &str) -> StoreResult<bool> {
        self.purge_expired(set);
        let removed = match self.entries.get_mut(set) {
            None => return Ok(false),
            Some(mut entry) => match &mut entry.value {
                Value::Set(members) => members.remove(member),
                _ => return Err(wrong_type(set, "a set")),
            },
        };
        // Redis drops a set once its last member is gone
        self.entries
            .remove_if(set, |_, e| matches!(&e.value, Value::Set(m) if m.is_empty()));
        Ok(removed)
    }

    async fn scard(&self, set: &str) -> StoreResult<u64> {
        self.purge_expired(set);
        match self.entries.get(set) {
            None => Ok(0),
            Some(entry) => match &entry.value {
                Value::Set(members) => Ok(members.len() as u64),
                _ => Err(wrong_type(set, "a set")),
            },
        }
    }

    async fn smembers(&self, set: &str) -> StoreResult<Vec<String>> {
        self.purge_expired(set);
        match self.entries.get(set) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::Set(members) => Ok(members.iter().cloned().collect()),
                _ => Err(wrong_type(set, "a set")),
            },
        }
    }

    async fn sismember(&self, set: &str, member: &str) -> StoreResult<bool> {
        self.purge_expired(set);
        match self.entries.get(set) {
            None => Ok(false),
            Some(entry) => match &entry.value {
                Value::Set(members) => Ok(members.contains(member)),
                _ => Err(wrong_type(set, "a set")),
            },
        }
    }

    async fn set_nx(&self, key: &str, value: &str) -> StoreResult<bool> {
        self.purge_expired(key);
        match self.entries.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Entry::new(Value::Str(value.to_string())));
                Ok(true)
            }
        }
    }

    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        Ok(keys
            .iter()
            .map(|key| {
                self.purge_expired(key);
                // Like MGET, non-string values read as absent
                self.entries.get(key).and_then(|entry| match &entry.value {
                    Value::Str(s) => Some(s.clone()),
                    Value::Int(v) => Some(v.to_string()),
                    Value::Set(_) => None,
                })
            })
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
