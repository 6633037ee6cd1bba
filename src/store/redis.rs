//! Redis-backed store.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use tracing::{info, trace};

use super::backend::KvStore;
use crate::error::{StoreError, StoreResult};

/// A [`KvStore`] talking to Redis through a multiplexed connection manager.
///
/// The manager reconnects on its own; a command that fails in the meantime
/// surfaces as [`StoreError::Unreachable`].
#[derive(Clone)]
pub struct RedisStore {
    connection_manager: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to the Redis server at `url`.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = Client::open(url)?;
        let connection_manager = client.get_connection_manager().await?;
        info!("Connected to Redis");
        Ok(Self::from_connection_manager(connection_manager))
    }

    /// Wrap an existing connection manager.
    pub fn from_connection_manager(connection_manager: ConnectionManager) -> Self {
        Self { connection_manager }
    }

    fn conn(&self) -> ConnectionManager {
        self.connection_manager.clone()
    }
}

/// Attach the key to shape errors so logs say where the bad value lives.
fn keyed(key: &str) -> impl FnOnce(RedisError) -> StoreError + '_ {
    move |err| match StoreError::from(err) {
        StoreError::Malformed { detail, .. } => StoreError::Malformed {
            key: key.to_string(),
            detail,
        },
        other => other,
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get_int(&self, key: &str) -> StoreResult<Option<i64>> {
        let value: Option<i64> = self.conn().get(key).await.map_err(keyed(key))?;
        Ok(value)
    }

    async fn incr_by_expire_at(&self, key: &str, delta: i64, epoch_secs: i64) -> StoreResult<i64> {
        let mut conn = self.conn();
        let (value, _): (i64, bool) = redis::pipe()
            .atomic()
            .incr(key, delta)
            .expire_at(key, epoch_secs)
            .query_async(&mut conn)
            .await
            .map_err(keyed(key))?;
        trace!(key = %key, delta = delta, value = value, expires_at = epoch_secs, "INCRBY+EXPIREAT");
        Ok(value)
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let removed: u64 = self.conn().del(key).await.map_err(keyed(key))?;
        Ok(removed > 0)
    }

    async fn sadd(&self, set: &str, member: &str) -> StoreResult<bool> {
        let added: u64 = self.conn().sadd(set, member).await.map_err(keyed(set))?;
        Ok(added > 0)
    }

    async fn sadd_expire_at(&self, set: &str, member: &str, epoch_secs: i64) -> StoreResult<bool> {
        let mut conn = self.conn();
        let (added, _): (u64, bool) = redis::pipe()
            .atomic()
            .sadd(set, member)
            .expire_at(set, epoch_secs)
            .query_async(&mut conn)
            .await
            .map_err(keyed(set))?;
        Ok(added > 0)
    }

    async fn srem(&self, set: &str, member: &str) -> StoreResult<bool> {
        let removed: u64 = self.conn().srem(set, member).await.map_err(keyed(set))?;
        Ok(removed > 0)
    }

    async fn scard(&self, set: &str) -> StoreResult<u64> {
        let count: u64 = self.conn().scard(set).await.map_err(keyed(set))?;
        Ok(count)
    }

    async fn smembers(&self, set: &str) -> StoreResult<Vec<String>> {
        let members: Vec<String> = self.conn().smembers(set).await.map_err(keyed(set))?;
        Ok(members)
    }

    async fn sismember(&self, set: &str, member: &str) -> StoreResult<bool> {
        let present: bool = self
            .conn()
            .sismember(set, member)
            .await
            .map_err(keyed(set))?;
        Ok(present)
    }

    async fn set_nx(&self, key: &str, value: &str) -> StoreResult<bool> {
        let written: bool = self.conn().set_nx(key, value).await.map_err(keyed(key))?;
        Ok(written)
    }

    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        // Explicit MGET so a single key still answers with an array
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut self.conn())
            .await
            .map_err(StoreError::from)?;
        Ok(values)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_errors_keep_the_key() {
        let err = RedisError::from((redis::ErrorKind::TypeError, "not an integer"));
        match keyed("aff:usage:2025-10-07:global")(err) {
            StoreError::Malformed { key, .. } => assert_eq!(key, "aff:usage:2025-10-07:global"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_io_errors_are_unreachable() {
        let err = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(matches!(keyed("k")(err), StoreError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let err = RedisStore::connect("not a url").await.unwrap_err();
        assert!(matches!(err, StoreError::Unreachable(_)));
    }
}
