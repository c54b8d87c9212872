//! Row cache store.
//!
//! [`CacheStore`] is the contract the table layer consumes: batched
//! save/get/remove over string keys plus the atomic pointer read.
//! [`RedisCache`] implements it against Redis with a key prefix and one
//! fixed TTL; the pointer read runs as a server-side Lua script so the two
//! hops can never race a concurrent invalidation.

use crate::error::{Error, Result};
use redis::aio::ConnectionManager;
use redis::Script;
use std::future::Future;

/// One cache entry to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheItem {
    /// Unprefixed cache key.
    pub key: String,
    /// Stored text (a serialized row, or a primary key string for pointer
    /// entries).
    pub data: String,
}

impl CacheItem {
    /// Convenience constructor.
    pub fn new(key: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            data: data.into(),
        }
    }
}

/// The cache store contract consumed by the table layer.
pub trait CacheStore: Send + Sync {
    /// Write every item with the configured TTL as one batched operation.
    /// Returns the (prefixed) keys written.
    fn save_list(&self, items: Vec<CacheItem>) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Batched multi-get; missing keys yield `None` at their position.
    fn get_list(&self, keys: &[String]) -> impl Future<Output = Result<Vec<Option<String>>>> + Send;

    /// Single-key convenience over [`get_list`](Self::get_list).
    fn get_item(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send {
        async move {
            let keys = [key.to_string()];
            let values = self.get_list(&keys).await?;
            Ok(values.into_iter().next().flatten())
        }
    }

    /// Batched multi-delete. Returns the (prefixed) keys removed.
    fn remove_list(&self, keys: &[String]) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Atomic two-hop read: read the value at `key` (expected to be another
    /// cache key), then return the value stored at that second key. Either
    /// hop missing yields `None`. Must be one server-side operation.
    fn get_pointer_item(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Release underlying resources.
    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Lua script for the atomic pointer read. Pointer entries store the
/// unprefixed primary key, so the second hop re-applies the prefix (ARGV[1]).
const GET_BY_POINTER_SCRIPT: &str = r#"local k = redis.call("get", KEYS[1])
if (k) then
  return redis.call("get", ARGV[1] .. k)
end"#;

/// Options for [`RedisCache::connect`].
#[derive(Debug, Clone)]
pub struct RedisCacheOptions {
    /// Redis connection URL, e.g. `redis://127.0.0.1/0`.
    pub url: String,
    /// TTL in seconds applied to every entry. Must be greater than zero.
    pub ttl: u64,
    /// Prefix prepended to every key.
    pub prefix: String,
}

/// Redis-backed [`CacheStore`] with a key prefix and one fixed TTL.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    script: Script,
    ttl: u64,
    prefix: String,
}

impl RedisCache {
    /// Connect to Redis and build the store.
    pub async fn connect(options: RedisCacheOptions) -> Result<Self> {
        if options.ttl == 0 {
            return Err(Error::config("cache ttl must be greater than zero"));
        }
        let client = redis::Client::open(options.url.as_str())?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            script: Script::new(GET_BY_POINTER_SCRIPT),
            ttl: options.ttl,
            prefix: options.prefix,
        })
    }

    /// The prefixed form of `key`.
    pub fn prefixed_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

impl CacheStore for RedisCache {
    async fn save_list(&self, items: Vec<CacheItem>) -> Result<Vec<String>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            let key = self.prefixed_key(&item.key);
            pipe.cmd("SETEX").arg(&key).arg(self.ttl).arg(item.data).ignore();
            keys.push(key);
        }
        let () = pipe.query_async(&mut conn).await?;
        tracing::debug!(target: "rowcache.cache", count = keys.len(), "save list");
        Ok(keys)
    }

    async fn get_list(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("MGET");
        for key in keys {
            cmd.arg(self.prefixed_key(key));
        }
        let values: Vec<Option<String>> = cmd.query_async(&mut conn).await?;
        Ok(values)
    }

    async fn remove_list(&self, keys: &[String]) -> Result<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            let key = self.prefixed_key(key);
            pipe.cmd("DEL").arg(&key).ignore();
            removed.push(key);
        }
        let () = pipe.query_async(&mut conn).await?;
        tracing::debug!(target: "rowcache.cache", count = removed.len(), "remove list");
        Ok(removed)
    }

    async fn get_pointer_item(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = self
            .script
            .key(self.prefixed_key(key))
            .arg(&self.prefix)
            .invoke_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn close(&self) -> Result<()> {
        // ConnectionManager tears the connection down when the last clone
        // drops; nothing to flush server-side.
        Ok(())
    }
}
