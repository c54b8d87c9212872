//! Table access layer: keyed reads and writes kept consistent with the row
//! cache.
//!
//! A [`Table`] binds one table's key definitions and schema to a shared
//! executor and cache store. Reads go cache-first; every keyed write runs
//! the invalidate-then-repopulate protocol:
//!
//! 1. re-read the target row from the primary (its *current* key field
//!    values decide which cache entries exist),
//! 2. execute the mutation scoped to the reduced key condition,
//! 3. batch-remove the pre-mutation row's whole key set,
//! 4. for updates, re-read the row and repopulate the primary entry plus
//!    one pointer entry per satisfied unique-key group.
//!
//! A failure after step 2 leaves the cache unrepaired; callers needing
//! strict consistency should treat it as requiring a
//! [`remove_all_cache`](Table::remove_all_cache) repair.

use crate::Row;
use crate::cache::{CacheItem, CacheStore};
use crate::error::{Error, Result};
use crate::escape::value_text;
use crate::executor::Executor;
use crate::query::QueryBuilder;
use crate::schema::{FieldType, Schema};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Registration-time table description.
#[derive(Debug, Clone, Default)]
pub struct TableOptions {
    /// Table name, used (escaped) in all generated SQL.
    pub table: String,
    /// Primary key field names; empty means the table has no primary key.
    pub primary_key: Vec<String>,
    /// Whether the (single-field) primary key is auto-increment.
    pub auto_increment: bool,
    /// Unique key groups; each group independently identifies at most one
    /// row.
    pub unique_keys: Vec<Vec<String>>,
    /// Field codec definitions.
    pub fields: Vec<(String, FieldType)>,
}

/// The full cache-key set derived from one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowCacheKeys {
    /// Primary entry key, when every primary field is present.
    pub primary: Option<String>,
    /// One pointer key per satisfied unique-key group.
    pub uniques: Vec<String>,
}

impl RowCacheKeys {
    /// Every key in the set.
    pub fn all(&self) -> Vec<String> {
        self.primary
            .iter()
            .cloned()
            .chain(self.uniques.iter().cloned())
            .collect()
    }
}

/// Cache-consistent access to one table.
///
/// Immutable after construction and safely shared across tasks; the
/// executor and cache store are shared collaborators with their own
/// concurrency control.
pub struct Table<E, S> {
    connection: Arc<E>,
    cache: Arc<S>,
    table_name: String,
    primary_key: Vec<String>,
    primary_key_auto_increment: bool,
    unique_keys: Vec<Vec<String>>,
    important_fields: Vec<String>,
    schema: Arc<Schema>,
}

impl<E: Executor, S: CacheStore> Table<E, S> {
    /// Validate the options and build the table handle.
    pub fn new(options: TableOptions, connection: Arc<E>, cache: Arc<S>) -> Result<Self> {
        if options.table.is_empty() {
            return Err(Error::config("table name cannot be empty"));
        }
        let mut primary_key = options.primary_key;
        primary_key.sort();
        if options.auto_increment && primary_key.len() != 1 {
            return Err(Error::config(format!(
                "table \"{}\": auto-increment requires exactly one primary key field",
                options.table
            )));
        }
        let mut unique_keys = Vec::with_capacity(options.unique_keys.len());
        for mut group in options.unique_keys {
            if group.is_empty() {
                return Err(Error::config(format!(
                    "table \"{}\": unique key group cannot be empty",
                    options.table
                )));
            }
            group.sort();
            unique_keys.push(group);
        }
        let important_fields: BTreeSet<&String> =
            primary_key.iter().chain(unique_keys.iter().flatten()).collect();
        let important_fields = important_fields.into_iter().cloned().collect();
        Ok(Self {
            connection,
            cache,
            table_name: options.table,
            primary_key,
            primary_key_auto_increment: options.auto_increment,
            unique_keys,
            important_fields,
            schema: Arc::new(Schema::new(options.fields)),
        })
    }

    /// Table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Canonically sorted primary key fields.
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// Canonically sorted unique key groups.
    pub fn unique_keys(&self) -> &[Vec<String>] {
        &self.unique_keys
    }

    /// Sorted union of all key fields: the minimal projection needed to
    /// compute every cache key for a row.
    pub fn important_fields(&self) -> &[String] {
        &self.important_fields
    }

    /// Field codec registry.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    // ==================== Query builders ====================

    /// A builder bound to this table (and its schema).
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::with_schema(&self.table_name, self.schema.clone())
    }

    /// `SELECT *` builder.
    pub fn find(&self) -> QueryBuilder {
        self.query().select(&["*"])
    }

    /// `SELECT * ... LIMIT 1` builder.
    pub fn find_one(&self) -> QueryBuilder {
        self.find().limit(1)
    }

    /// UPDATE builder from a field→value map; unknown fields are stripped by
    /// the schema before SQL generation.
    pub fn update(&self, update: &Row) -> QueryBuilder {
        match self.schema.format_input(update) {
            Ok(formatted) => self.query().update_fields(Value::Object(formatted)),
            Err(error) => self.query().update().fail(error),
        }
    }

    /// [`update`](Self::update) limited to one row.
    pub fn update_one(&self, update: &Row) -> QueryBuilder {
        self.update(update).limit(1)
    }

    /// DELETE builder.
    pub fn delete(&self) -> QueryBuilder {
        self.query().delete()
    }

    /// [`delete`](Self::delete) limited to one row.
    pub fn delete_one(&self) -> QueryBuilder {
        self.delete().limit(1)
    }

    /// UPDATE builder incrementing each field by the paired amount.
    pub fn incr(&self, amounts: &Row) -> QueryBuilder {
        let mut builder = self.query().update();
        for (name, amount) in amounts {
            builder = builder.set_template(
                "?? = ?? + (?)",
                &[Value::String(name.clone()), Value::String(name.clone()), amount.clone()],
            );
        }
        builder
    }

    /// Raw-SQL escape hatch. Mutations routed through here bypass the cache
    /// protocol; follow up with [`remove_all_cache`](Self::remove_all_cache)
    /// when key-relevant rows may have changed.
    pub fn sql(&self, template: &str) -> QueryBuilder {
        self.query().sql(template)
    }

    /// [`sql`](Self::sql) with positional `?`/`??` values.
    pub fn sql_template(&self, template: &str, values: &[Value]) -> QueryBuilder {
        self.query().sql_template(template, values)
    }

    /// Count rows matching a condition map.
    pub async fn count(&self, condition: Value) -> Result<u64> {
        let rows = self
            .query()
            .count("c")
            .and_fields(condition)
            .limit(1)
            .exec(self.connection.as_ref())
            .await?
            .into_rows()?;
        let value = rows
            .first()
            .and_then(|row| row.get("c"))
            .ok_or_else(|| Error::query("count query returned no rows"))?;
        value
            .as_u64()
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
            .ok_or_else(|| Error::query(format!("unexpected count value: {value}")))
    }

    // ==================== Key derivation ====================

    /// Build the primary cache key from a row; every primary field must be
    /// present.
    pub fn primary_cache_key(&self, row: &Row) -> Result<String> {
        if self.primary_key.is_empty() {
            return Err(Error::validation(format!(
                "table \"{}\" does not have primary key",
                self.table_name
            )));
        }
        let mut parts = Vec::with_capacity(self.primary_key.len());
        for name in &self.primary_key {
            let value = row.get(name).ok_or_else(|| {
                Error::validation(format!("missing primary key \"{name}\" in this data row"))
            })?;
            parts.push(format!("{name}:{}", value_text(value)));
        }
        Ok(format!("{}:r:{}", self.table_name, parts.join(":")))
    }

    /// Non-strict form of [`primary_cache_key`](Self::primary_cache_key):
    /// `None` when the table has no primary key or the row projection is
    /// missing a field.
    pub fn try_primary_cache_key(&self, row: &Row) -> Option<String> {
        if self.primary_key.is_empty() {
            return None;
        }
        let mut parts = Vec::with_capacity(self.primary_key.len());
        for name in &self.primary_key {
            parts.push(format!("{name}:{}", value_text(row.get(name)?)));
        }
        Some(format!("{}:r:{}", self.table_name, parts.join(":")))
    }

    /// One pointer key per unique-key group fully present in the row;
    /// groups with missing fields are skipped.
    pub fn unique_cache_keys(&self, row: &Row) -> Vec<String> {
        let mut keys = Vec::new();
        for group in &self.unique_keys {
            let parts: Option<Vec<String>> = group
                .iter()
                .map(|name| {
                    row.get(name)
                        .map(|value| format!("{name}:{}", value_text(value)))
                })
                .collect();
            if let Some(parts) = parts {
                keys.push(format!("{}:u:{}", self.table_name, parts.join(":")));
            }
        }
        keys
    }

    /// Reduce a row to its primary key fields; every field must be present.
    pub fn keep_primary_fields(&self, row: &Row) -> Result<Row> {
        if self.primary_key.is_empty() {
            return Err(Error::validation(format!(
                "table \"{}\" does not have primary key",
                self.table_name
            )));
        }
        let mut out = Row::new();
        for name in &self.primary_key {
            let value = row.get(name).ok_or_else(|| {
                Error::validation(format!("missing primary key \"{name}\" in this data row"))
            })?;
            out.insert(name.clone(), value.clone());
        }
        Ok(out)
    }

    /// Reduce a row to the first unique-key group it fully satisfies.
    pub fn keep_unique_fields(&self, row: &Row) -> Result<Row> {
        for group in &self.unique_keys {
            if group.iter().all(|name| row.contains_key(name)) {
                let mut out = Row::new();
                for name in group {
                    if let Some(value) = row.get(name) {
                        out.insert(name.clone(), value.clone());
                    }
                }
                return Ok(out);
            }
        }
        let groups = self
            .unique_keys
            .iter()
            .map(|group| group.join(","))
            .collect::<Vec<_>>()
            .join(" | ");
        Err(Error::validation(format!(
            "missing unique key in this data row, must include one of {groups}"
        )))
    }

    /// The full cache-key set implied by a row.
    pub fn cache_keys_for_row(&self, row: &Row) -> RowCacheKeys {
        RowCacheKeys {
            primary: self.try_primary_cache_key(row),
            uniques: self.unique_cache_keys(row),
        }
    }

    // ==================== Cache orchestration ====================

    /// Invalidate-then-repopulate the cache from a freshly read row: the
    /// primary entry stores the serialized row, each satisfied unique-key
    /// group stores a pointer to the primary key string.
    pub async fn update_cache_for_row(&self, row: &Row) -> Result<Vec<String>> {
        let keys = self.cache_keys_for_row(row);
        let Some(primary) = keys.primary.clone() else {
            return Err(Error::validation(format!(
                "cannot cache a row without its primary key (table \"{}\")",
                self.table_name
            )));
        };
        let all = keys.all();
        self.cache.remove_list(&all).await?;
        let mut items = Vec::with_capacity(1 + keys.uniques.len());
        items.push(CacheItem::new(primary.clone(), self.schema.serialize(row)?));
        for unique in &keys.uniques {
            items.push(CacheItem::new(unique.clone(), primary.clone()));
        }
        self.cache.save_list(items).await?;
        debug!(target: "rowcache.table", table = %self.table_name, primary = %primary, "cache repopulated");
        Ok(all)
    }

    /// Remove every cache entry implied by a row.
    pub async fn remove_cache_for_row(&self, row: &Row) -> Result<Vec<String>> {
        let keys = self.cache_keys_for_row(row).all();
        self.cache.remove_list(&keys).await?;
        Ok(keys)
    }

    // ==================== Read paths ====================

    /// Get one row by primary key, cache first. Absence is `Ok(None)`.
    pub async fn get_by_primary(&self, query: &Row) -> Result<Option<Row>> {
        self.get_by_primary_from(query, false).await
    }

    async fn get_by_primary_from(&self, query: &Row, master: bool) -> Result<Option<Row>> {
        let query = self.keep_primary_fields(query)?;
        let key = self.primary_cache_key(&query)?;
        if let Some(text) = self.cache.get_item(&key).await? {
            debug!(target: "rowcache.table", table = %self.table_name, key = %key, "primary cache hit");
            return Ok(Some(self.schema.deserialize(&text)?));
        }
        let row = self.fetch_one(&query, master).await?;
        if let Some(row) = &row {
            self.update_cache_for_row(row).await?;
        }
        Ok(row)
    }

    /// Get one row by unique key, cache first via the pointer entry.
    /// A dangling pointer counts as a miss. Absence is `Ok(None)`.
    pub async fn get_by_unique(&self, query: &Row) -> Result<Option<Row>> {
        let query = self.keep_unique_fields(query)?;
        if let Some(key) = self.unique_cache_keys(&query).first() {
            if let Some(text) = self.cache.get_pointer_item(key).await? {
                debug!(target: "rowcache.table", table = %self.table_name, key = %key, "unique cache hit");
                return Ok(Some(self.schema.deserialize(&text)?));
            }
        }
        let row = self.fetch_one(&query, false).await?;
        if let Some(row) = &row {
            self.update_cache_for_row(row).await?;
        }
        Ok(row)
    }

    // ==================== Write paths ====================

    /// Update one row addressed by primary key. Returns the fresh row, or
    /// `Ok(None)` without mutating anything when no row matches.
    pub async fn update_by_primary(&self, query: &Row, update: &Row) -> Result<Option<Row>> {
        let query = self.keep_primary_fields(query)?;
        self.update_by_key(query, update).await
    }

    /// Update one row addressed by unique key.
    pub async fn update_by_unique(&self, query: &Row, update: &Row) -> Result<Option<Row>> {
        let query = self.keep_unique_fields(query)?;
        self.update_by_key(query, update).await
    }

    async fn update_by_key(&self, query: Row, update: &Row) -> Result<Option<Row>> {
        // The pre-mutation row decides which cache entries exist; its unique
        // field values may differ from the update payload.
        let Some(old_row) = self.fetch_one(&query, true).await? else {
            return Ok(None);
        };
        let update = self.schema.format_input(update)?;
        self.query()
            .update_fields(Value::Object(update))
            .and_fields(Value::Object(query.clone()))
            .limit(1)
            .exec(self.connection.as_ref())
            .await?;
        self.remove_cache_for_row(&old_row).await?;
        let fresh = self.fetch_one(&query, true).await?;
        if let Some(row) = &fresh {
            self.update_cache_for_row(row).await?;
        }
        Ok(fresh)
    }

    /// Delete one row addressed by primary key. Returns the removed row, or
    /// `Ok(None)` without mutating anything when no row matches.
    pub async fn delete_by_primary(&self, query: &Row) -> Result<Option<Row>> {
        let query = self.keep_primary_fields(query)?;
        self.delete_by_key(query).await
    }

    /// Delete one row addressed by unique key.
    pub async fn delete_by_unique(&self, query: &Row) -> Result<Option<Row>> {
        let query = self.keep_unique_fields(query)?;
        self.delete_by_key(query).await
    }

    async fn delete_by_key(&self, query: Row) -> Result<Option<Row>> {
        let Some(old_row) = self.fetch_one(&query, true).await? else {
            return Ok(None);
        };
        self.delete_one()
            .and_fields(Value::Object(query))
            .exec(self.connection.as_ref())
            .await?;
        self.remove_cache_for_row(&old_row).await?;
        Ok(Some(old_row))
    }

    /// Insert rows. For non-auto-increment tables every row must carry the
    /// whole primary key (checked before any I/O); auto-increment primary
    /// values are resolved from the executor's `insert_id`.
    ///
    /// With `refresh_new_data` each inserted row is re-read from the primary
    /// (populating the cache) and the fresh rows are returned.
    pub async fn insert(&self, rows: Vec<Row>, refresh_new_data: bool) -> Result<Vec<Row>> {
        let rows = self.schema.format_input_list(&rows)?;
        if !self.primary_key_auto_increment {
            for row in &rows {
                for name in &self.primary_key {
                    if !row.contains_key(name) {
                        return Err(Error::validation(format!("missing primary key \"{name}\"")));
                    }
                }
            }
        }
        let mut out = Vec::with_capacity(rows.len());
        for mut row in rows {
            let meta = self
                .query()
                .insert(Value::Object(row.clone()))
                .exec(self.connection.as_ref())
                .await?
                .into_write()?;
            if self.primary_key_auto_increment {
                row.insert(self.primary_key[0].clone(), Value::from(meta.insert_id));
            }
            if refresh_new_data {
                match self.get_by_primary_from(&row, true).await? {
                    Some(fresh) => out.push(fresh),
                    None => out.push(row),
                }
            } else {
                out.push(row);
            }
        }
        Ok(out)
    }

    // ==================== Maintenance ====================

    /// Remove every cache entry for rows matching `condition`.
    ///
    /// This is the repair tool for mutations that bypassed the table layer
    /// (raw SQL, external bulk statements): it scans the minimal key
    /// projection from the primary, computes each row's full key set and
    /// batch-removes them. Returns the scanned projections.
    pub async fn remove_all_cache(&self, condition: Value) -> Result<Vec<Row>> {
        if self.important_fields.is_empty() {
            return Ok(Vec::new());
        }
        let fields: Vec<&str> = self.important_fields.iter().map(String::as_str).collect();
        let sql = self
            .find()
            .fields(&fields)
            .and_fields(condition)
            .build()?;
        let rows = self.connection.execute_primary(&sql).await?.into_rows()?;
        let rows = self.schema.format_output_list(&rows)?;
        let mut keys = Vec::new();
        for row in &rows {
            keys.extend(self.cache_keys_for_row(row).all());
        }
        self.cache.remove_list(&keys).await?;
        debug!(target: "rowcache.table", table = %self.table_name, count = keys.len(), "cache repair sweep");
        Ok(rows)
    }

    // ==================== Internals ====================

    /// Read one row matching the reduced key condition, decoded by the
    /// schema. `master` forces the primary (used for every pre/post-write
    /// read).
    async fn fetch_one(&self, condition: &Row, master: bool) -> Result<Option<Row>> {
        let sql = self
            .find_one()
            .and_fields(Value::Object(condition.clone()))
            .build()?;
        let result = if master {
            self.connection.execute_primary(&sql).await?
        } else {
            self.connection.execute(&sql).await?
        };
        let rows = result.into_rows()?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(self.schema.format_output(&row)?)),
            None => Ok(None),
        }
    }
}
