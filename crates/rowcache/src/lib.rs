//! # rowcache
//!
//! A cache-consistent table access layer for a MySQL-dialect store.
//!
//! ## Features
//!
//! - **Fluent SQL builder**: SELECT/INSERT/UPDATE/DELETE/custom statements
//!   rendered as fully escaped SQL text, with operator maps (`$in`, `$like`,
//!   `$incr`), template substitution and MySQL `LIMIT skip,count` pagination
//! - **Read-through row cache**: primary-key entries hold serialized rows,
//!   unique-key entries hold pointers to the primary entry; every keyed
//!   write runs an invalidate-then-repopulate protocol so the cache never
//!   serves stale rows
//! - **Safe defaults**: UPDATE requires SET, UPDATE/DELETE require WHERE,
//!   statement kind is settable exactly once
//! - **Pluggable collaborators**: the relational engine is anything
//!   implementing [`Executor`]; the cache store contract ships with a
//!   Redis implementation whose pointer reads run as one server-side script
//!
//! ## Example
//!
//! ```ignore
//! use rowcache::{Manager, RedisCache, RedisCacheOptions, TableOptions, FieldType};
//! use serde_json::json;
//!
//! let cache = RedisCache::connect(RedisCacheOptions {
//!     url: "redis://127.0.0.1/0".into(),
//!     ttl: 30,
//!     prefix: "app:".into(),
//! })
//! .await?;
//! let manager = Manager::new(pool, std::sync::Arc::new(cache));
//! manager.register_table(TableOptions {
//!     table: "users".into(),
//!     primary_key: vec!["id".into()],
//!     auto_increment: true,
//!     unique_keys: vec![vec!["email".into()]],
//!     fields: vec![
//!         ("id".into(), FieldType::Any),
//!         ("email".into(), FieldType::Any),
//!         ("profile".into(), FieldType::Json),
//!     ],
//! })?;
//!
//! let users = manager.table("users")?;
//! let user = users.get_by_unique(&row(json!({ "email": "a@example.com" }))).await?;
//! ```

pub mod cache;
pub mod condition;
pub mod error;
pub mod escape;
pub mod executor;
pub mod manager;
pub mod query;
pub mod schema;
pub mod table;

/// A data row: field name → JSON value, in insertion order.
pub type Row = serde_json::Map<String, serde_json::Value>;

pub use cache::{CacheItem, CacheStore, RedisCache, RedisCacheOptions};
pub use condition::{CondValue, SetValue};
pub use error::{Error, Result};
pub use escape::{escape_id, escape_value, format_named_template, format_template};
pub use executor::{ExecuteResult, Executor, Replication, WriteMeta, is_update_sql};
pub use manager::Manager;
pub use query::{QueryBuilder, QueryOptions};
pub use schema::{FieldType, Schema};
pub use table::{RowCacheKeys, Table, TableOptions};
