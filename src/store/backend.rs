//! Key-value store trait for abstracting Redis and in-process implementations.

use async_trait::async_trait;

use crate::error::StoreResult;

/// The store primitives the ledger relies on.
///
/// Each call is a single round trip and atomic per key. Nothing stronger is
/// assumed: multi-key sequences built on top of this trait are not isolated.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Integer value at `key`, `None` if absent.
    async fn get_int(&self, key: &str) -> StoreResult<Option<i64>>;

    /// Add `delta` to the integer at `key` and expire it at `epoch_secs`.
    ///
    /// The key is created at 0 first if absent. Both steps apply together or
    /// not at all, so a counter is never left behind without a deadline.
    /// Returns the post-value.
    async fn incr_by_expire_at(&self, key: &str, delta: i64, epoch_secs: i64) -> StoreResult<i64>;

    /// Delete `key`. Returns whether it existed.
    async fn del(&self, key: &str) -> StoreResult<bool>;

    /// Add `member` to `set`. Returns whether it was newly added.
    async fn sadd(&self, set: &str, member: &str) -> StoreResult<bool>;

    /// Add `member` to `set` and expire the set at `epoch_secs`, together.
    ///
    /// Returns whether the member was newly added.
    async fn sadd_expire_at(&self, set: &str, member: &str, epoch_secs: i64) -> StoreResult<bool>;

    /// Remove `member` from `set`. Returns whether it was present.
    async fn srem(&self, set: &str, member: &str) -> StoreResult<bool>;

    /// Cardinality of `set`, 0 if absent.
    async fn scard(&self, set: &str) -> StoreResult<u64>;

    /// Snapshot of the members of `set`, in no particular order.
    async fn smembers(&self, set: &str) -> StoreResult<Vec<String>>;

    /// Whether `member` belongs to `set`.
    async fn sismember(&self, set: &str, member: &str) -> StoreResult<bool>;

    /// Store `value` at `key` unless the key exists. Returns whether it was written.
    async fn set_nx(&self, key: &str, value: &str) -> StoreResult<bool>;

    /// String values at `keys`, in order, `None` where absent.
    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>>;

    /// Short name used in logs.
    fn backend_name(&self) -> &'static str;
}
