//! Key-value store access.
//!
//! The ledger owns key names and accounting rules; everything it persists goes
//! through the [`KvStore`] primitives defined here.

mod backend;
mod memory;
mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

pub use self::redis::RedisStore;
pub use backend::KvStore;
pub use memory::MemoryStore;

use crate::error::{StoreError, StoreResult};

/// Stand-in used when no store URL is configured.
///
/// Every call fails with [`StoreError::NotConfigured`], so the ledger reports
/// "store unavailable" instead of pretending usage is zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredStore;

#[async_trait]
impl KvStore for UnconfiguredStore {
    async fn get_int(&self, _key: &str) -> StoreResult<Option<i64>> {
        Err(StoreError::NotConfigured)
    }

    async fn incr_by_expire_at(&self, _key: &str, _delta: i64, _epoch_secs: i64) -> StoreResult<i64> {
        Err(StoreError::NotConfigured)
    }

    async fn del(&self, _key: &str) -> StoreResult<bool> {
        Err(StoreError::NotConfigured)
    }

    async fn sadd(&self, _set: &str, _member: &str) -> StoreResult<bool> {
        Err(StoreError::NotConfigured)
    }

    async fn sadd_expire_at(&self, _set: &str, _member: &str, _epoch_secs: i64) -> StoreResult<bool> {
        Err(StoreError::NotConfigured)
    }

    async fn srem(&self, _set: &str, _member: &str) -> StoreResult<bool> {
        Err(StoreError::NotConfigured)
    }

    async fn scard(&self, _set: &str) -> StoreResult<u64> {
        Err(StoreError::NotConfigured)
    }

    async fn smembers(&self, _set: &str) -> StoreResult<Vec<String>> {
        Err(StoreError::NotConfigured)
    }

    async fn sismember(&self, _set: &str, _member: &str) -> StoreResult<bool> {
        Err(StoreError::NotConfigured)
    }

    async fn set_nx(&self, _key: &str, _value: &str) -> StoreResult<bool> {
        Err(StoreError::NotConfigured)
    }

    async fn get_many(&self, _keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        Err(StoreError::NotConfigured)
    }

    fn backend_name(&self) -> &'static str {
        "unconfigured"
    }
}

/// Build the store named by `redis_url`.
///
/// A missing URL yields an [`UnconfiguredStore`]; a URL that cannot be
/// connected to is an error.
pub async fn connect(redis_url: Option<&str>) -> StoreResult<Arc<dyn KvStore>> {
    match redis_url.map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => Ok(Arc::new(RedisStore::connect(url).await?)),
        None => {
            warn!("No Redis URL configured; ledger operations will report the store as unavailable");
            Ok(Arc::new(UnconfiguredStore))
        }
    }
}
