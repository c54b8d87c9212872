//! Fluent SQL statement builder.
//!
//! A [`QueryBuilder`] is bound to one table and owns all per-statement
//! state. The statement kind is a one-shot state machine: the first call to
//! [`select`](QueryBuilder::select), [`insert`](QueryBuilder::insert),
//! [`update`](QueryBuilder::update), [`delete`](QueryBuilder::delete) or
//! [`sql`](QueryBuilder::sql) pins it, and any later attempt to switch kinds
//! is an error.
//!
//! Builder misuse is captured as a deferred error and surfaced by
//! [`build`](QueryBuilder::build), so chains stay ergonomic while usage
//! errors never reach the executor.
//!
//! ```ignore
//! let sql = QueryBuilder::new("users")
//!     .select(&["name", "age"])
//!     .where_fields(json!({ "status": "active" }))
//!     .order_by("`id` DESC")
//!     .limit(10)
//!     .build()?;
//! ```

use crate::Row;
use crate::condition::{CondValue, SetValue};
use crate::error::{Error, Result};
use crate::escape::{escape_id, escape_value, format_named_template, format_template, join_sql};
use crate::executor::{ExecuteResult, Executor, is_update_sql};
use crate::schema::Schema;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Statement kind, settable exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryKind {
    Unset,
    Select,
    Insert,
    Update,
    Delete,
    Custom,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unset => "",
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Custom => "CUSTOM",
        })
    }
}

/// Batch query options applied via [`QueryBuilder::options`].
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Rows to skip.
    pub skip: Option<u64>,
    /// Rows to return.
    pub limit: Option<u64>,
    /// ORDER BY fragment.
    pub order_by: Option<String>,
    /// GROUP BY fragment.
    pub group_by: Option<String>,
    /// Projection field list.
    pub fields: Option<Vec<String>>,
}

/// Mutable statement-construction state bound to one table.
#[must_use]
#[derive(Debug)]
pub struct QueryBuilder {
    table_escaped: String,
    schema: Option<Arc<Schema>>,
    kind: QueryKind,
    fields: String,
    conditions: Vec<String>,
    updates: Vec<String>,
    insert: Option<String>,
    sql_template: Option<String>,
    sql_values: Vec<Value>,
    order_by: String,
    group_by: String,
    skip_rows: u64,
    limit_rows: u64,
    limit: String,
    build_error: Option<Error>,
}

impl QueryBuilder {
    /// Create a builder for `table` with no schema attached.
    pub fn new(table: &str) -> Self {
        Self {
            table_escaped: escape_id(table),
            schema: None,
            kind: QueryKind::Unset,
            fields: "*".to_string(),
            conditions: Vec::new(),
            updates: Vec::new(),
            insert: None,
            sql_template: None,
            sql_values: Vec::new(),
            order_by: String::new(),
            group_by: String::new(),
            skip_rows: 0,
            limit_rows: 0,
            limit: String::new(),
            build_error: None,
        }
    }

    /// Create a builder whose operator dispatch consults a table schema
    /// (json-typed fields never sniff `$`-operators).
    pub fn with_schema(table: &str, schema: Arc<Schema>) -> Self {
        let mut builder = Self::new(table);
        builder.schema = Some(schema);
        builder
    }

    /// Record the first usage error; it surfaces at [`build`](Self::build).
    pub(crate) fn fail(mut self, error: Error) -> Self {
        if self.build_error.is_none() {
            self.build_error = Some(error);
        }
        self
    }

    fn set_kind(self, kind: QueryKind) -> Self {
        if self.kind == QueryKind::Unset {
            let mut builder = self;
            builder.kind = kind;
            builder
        } else {
            let current = self.kind;
            self.fail(Error::validation(format!(
                "cannot change query type after it was set to \"{current}\""
            )))
        }
    }

    fn is_json_field(&self, name: &str) -> bool {
        self.schema.as_ref().is_some_and(|s| s.is_json_field(name))
    }

    // ==================== Projection ====================

    /// Start a SELECT. An empty field list keeps the current projection
    /// (default `*`).
    pub fn select<S: AsRef<str>>(self, fields: &[S]) -> Self {
        let builder = self.set_kind(QueryKind::Select);
        if fields.is_empty() {
            builder
        } else {
            builder.fields(fields)
        }
    }

    /// Set the projection; `*` passes through unescaped.
    pub fn fields<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.fields = fields
            .iter()
            .map(|name| {
                let name = name.as_ref();
                if name == "*" {
                    name.to_string()
                } else {
                    escape_id(name)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        self
    }

    /// SELECT a row count stored under `name`.
    pub fn count(mut self, name: &str) -> Self {
        match self.kind {
            QueryKind::Unset => self.kind = QueryKind::Select,
            QueryKind::Select => {}
            other => {
                return self.fail(Error::validation(format!(
                    "cannot change query type after it was set to \"{other}\""
                )));
            }
        }
        self.fields = format!("COUNT(*) AS {}", escape_id(name));
        self
    }

    // ==================== Conditions ====================

    /// Add conditions from a field→value map; pairs become escaped
    /// equalities in the order supplied, single-key `$`-maps dispatch as
    /// operators (`$in`, `$like`).
    pub fn where_fields(self, condition: Value) -> Self {
        self.and_fields(condition)
    }

    /// Alias of [`where_fields`](Self::where_fields); repeated calls
    /// accumulate with AND.
    pub fn and_fields(mut self, condition: Value) -> Self {
        let Value::Object(map) = condition else {
            return self.fail(Error::validation("condition must be an object"));
        };
        for (name, value) in &map {
            match CondValue::from_field_value(name, value, self.is_json_field(name)) {
                Ok(cond) => self.conditions.push(cond.render(name)),
                Err(error) => return self.fail(error),
            }
        }
        self
    }

    /// Add one typed operator condition.
    pub fn and_op(mut self, field: &str, op: CondValue) -> Self {
        self.conditions.push(op.render(field));
        self
    }

    /// Add a raw condition fragment.
    pub fn where_raw(self, condition: &str) -> Self {
        self.and_raw(condition)
    }

    /// Alias of [`where_raw`](Self::where_raw).
    pub fn and_raw(mut self, condition: &str) -> Self {
        self.conditions.push(condition.to_string());
        self
    }

    /// Add a condition template with positional `?`/`??` values.
    pub fn where_template(self, template: &str, values: &[Value]) -> Self {
        self.and_template(template, values)
    }

    /// Alias of [`where_template`](Self::where_template).
    pub fn and_template(mut self, template: &str, values: &[Value]) -> Self {
        self.conditions.push(format_template(template, values));
        self
    }

    /// Add a condition template with named `:name`/`::name` values.
    pub fn where_named(self, template: &str, params: Value) -> Self {
        self.and_named(template, params)
    }

    /// Alias of [`where_named`](Self::where_named).
    pub fn and_named(mut self, template: &str, params: Value) -> Self {
        let Value::Object(map) = params else {
            return self.fail(Error::validation("named condition values must be an object"));
        };
        self.conditions
            .push(format_named_template(template, &map, false));
        self
    }

    // ==================== Update ====================

    /// Start an UPDATE with no assignments yet.
    pub fn update(self) -> Self {
        self.set_kind(QueryKind::Update)
    }

    /// Start an UPDATE from a field→value map (`{"$incr": n}` increments).
    pub fn update_fields(self, data: Value) -> Self {
        self.update().set_fields(data)
    }

    /// Add assignments from a field→value map.
    pub fn set_fields(mut self, data: Value) -> Self {
        if self.kind != QueryKind::Update {
            return self.fail(Error::validation(
                "query type must be UPDATE, please call .update() before",
            ));
        }
        let Value::Object(map) = data else {
            return self.fail(Error::validation("update data must be an object"));
        };
        for (name, value) in &map {
            match SetValue::from_field_value(value, self.is_json_field(name)) {
                Ok(set) => self.updates.push(set.render(name)),
                Err(error) => return self.fail(error),
            }
        }
        self
    }

    /// Add one typed assignment.
    pub fn set_op(mut self, field: &str, set: SetValue) -> Self {
        if self.kind != QueryKind::Update {
            return self.fail(Error::validation(
                "query type must be UPDATE, please call .update() before",
            ));
        }
        self.updates.push(set.render(field));
        self
    }

    /// Add a raw assignment fragment (e.g. `` `a`=`a`*2 ``).
    pub fn set_raw(mut self, fragment: &str) -> Self {
        if self.kind != QueryKind::Update {
            return self.fail(Error::validation(
                "query type must be UPDATE, please call .update() before",
            ));
        }
        self.updates.push(fragment.to_string());
        self
    }

    /// Add an assignment template with positional `?`/`??` values.
    pub fn set_template(mut self, template: &str, values: &[Value]) -> Self {
        if self.kind != QueryKind::Update {
            return self.fail(Error::validation(
                "query type must be UPDATE, please call .update() before",
            ));
        }
        self.updates.push(format_template(template, values));
        self
    }

    /// Add an assignment template with named `:name`/`::name` values.
    pub fn set_named(mut self, template: &str, params: Value) -> Self {
        if self.kind != QueryKind::Update {
            return self.fail(Error::validation(
                "query type must be UPDATE, please call .update() before",
            ));
        }
        let Value::Object(map) = params else {
            return self.fail(Error::validation("named update values must be an object"));
        };
        self.updates.push(format_named_template(template, &map, false));
        self
    }

    // ==================== Insert ====================

    /// Start an INSERT from one row object or an array of row objects.
    ///
    /// The column list comes from the first row's own keys; every later row
    /// must contain exactly those keys.
    pub fn insert(self, data: Value) -> Self {
        let mut builder = self.set_kind(QueryKind::Insert);
        let rows: Vec<&Row> = match &data {
            Value::Object(map) => vec![map],
            Value::Array(items) => {
                if items.is_empty() {
                    return builder
                        .fail(Error::validation("data array must have at least 1 item"));
                }
                let mut rows = Vec::with_capacity(items.len());
                for item in items {
                    let Value::Object(map) = item else {
                        return builder.fail(Error::validation(
                            "every item of data array must be an object",
                        ));
                    };
                    rows.push(map);
                }
                rows
            }
            _ => {
                return builder
                    .fail(Error::validation("insert data must be an object or array"));
            }
        };
        // First-row keys define the column list.
        let columns: Vec<&String> = rows[0].keys().collect();
        let column_list = columns
            .iter()
            .map(|c| escape_id(c))
            .collect::<Vec<_>>()
            .join(", ");
        let mut tuples = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut line = Vec::with_capacity(columns.len());
            for column in &columns {
                match row.get(*column) {
                    Some(value) => line.push(escape_value(value)),
                    None => {
                        return builder.fail(Error::validation(format!(
                            "every item of data array must have field \"{column}\""
                        )));
                    }
                }
            }
            tuples.push(format!("({})", line.join(", ")));
        }
        builder.insert = Some(format!("({column_list}) VALUES {}", tuples.join(",\n")));
        builder
    }

    // ==================== Delete ====================

    /// Start a DELETE.
    pub fn delete(self) -> Self {
        self.set_kind(QueryKind::Delete)
    }

    // ==================== Custom SQL ====================

    /// Start a custom statement from a SQL template.
    ///
    /// At build time the template is first resolved against the internal
    /// placeholders `:$table`, `:$fields`, `:$orderBy`, `:$limit`,
    /// `:$skipRows` and `:$limitRows` (inserted unescaped, since they are
    /// internally computed fragments), then against the caller values with
    /// escaped substitution.
    pub fn sql(self, template: &str) -> Self {
        self.sql_template(template, &[])
    }

    /// [`sql`](Self::sql) with positional `?`/`??` values.
    pub fn sql_template(self, template: &str, values: &[Value]) -> Self {
        let mut builder = self.set_kind(QueryKind::Custom);
        builder.sql_template = Some(template.to_string());
        builder.sql_values = values.to_vec();
        builder
    }

    // ==================== Ordering and pagination ====================

    /// Set the ORDER BY fragment.
    pub fn order_by(self, template: &str) -> Self {
        self.order_by_template(template, &[])
    }

    /// Set the ORDER BY fragment from a template with positional values.
    ///
    /// `'DESC'`/`'ASC'` string literals produced by value substitution are
    /// normalized to bare keywords.
    pub fn order_by_template(mut self, template: &str, values: &[Value]) -> Self {
        let fragment = if values.is_empty() {
            template.to_string()
        } else {
            format_template(template, values)
        };
        self.order_by = normalize_order_keywords(&format!("ORDER BY {fragment}"));
        self
    }

    /// Set the GROUP BY fragment (may carry HAVING).
    pub fn group_by(self, template: &str) -> Self {
        self.group_by_template(template, &[])
    }

    /// Set the GROUP BY fragment from a template with positional values.
    pub fn group_by_template(mut self, template: &str, values: &[Value]) -> Self {
        let fragment = if values.is_empty() {
            template.to_string()
        } else {
            format_template(template, values)
        };
        self.group_by = format!("GROUP BY {fragment}");
        self
    }

    /// Skip `rows` rows.
    ///
    /// With no limit set this emits `LIMIT skip,18446744073709551615` so
    /// "skip N, unlimited" works on engines that require an explicit count.
    pub fn skip(mut self, rows: u64) -> Self {
        self.skip_rows = rows;
        self.limit = limit_clause(self.skip_rows, self.limit_rows);
        self
    }

    /// Return at most `rows` rows.
    pub fn limit(mut self, rows: u64) -> Self {
        self.limit_rows = rows;
        self.limit = limit_clause(self.skip_rows, self.limit_rows);
        self
    }

    /// Apply a batch of options in one call.
    pub fn options(mut self, options: QueryOptions) -> Self {
        if let Some(rows) = options.skip {
            self = self.skip(rows);
        }
        if let Some(rows) = options.limit {
            self = self.limit(rows);
        }
        if let Some(order_by) = options.order_by {
            self = self.order_by(&order_by);
        }
        if let Some(group_by) = options.group_by {
            self = self.group_by(&group_by);
        }
        if let Some(fields) = options.fields {
            self = self.fields(&fields);
        }
        self
    }

    // ==================== Build and execute ====================

    /// Render the final SQL string.
    ///
    /// Surfaces any deferred usage error; fails when no statement kind was
    /// set, when an UPDATE accumulated no assignments, or when an
    /// UPDATE/DELETE would run without a condition.
    pub fn build(self) -> Result<String> {
        if let Some(error) = self.build_error {
            return Err(error);
        }
        let conditions: Vec<&str> = self
            .conditions
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        match self.kind {
            QueryKind::Select => Ok(join_sql(&[
                "SELECT",
                &self.fields,
                "FROM",
                &self.table_escaped,
                &where_clause,
                &self.group_by,
                &self.order_by,
                &self.limit,
            ])),
            QueryKind::Insert => {
                let insert = self
                    .insert
                    .as_deref()
                    .ok_or_else(|| Error::validation("insert data cannot be empty"))?;
                Ok(join_sql(&["INSERT INTO", &self.table_escaped, insert]))
            }
            QueryKind::Update => {
                if self.updates.is_empty() {
                    return Err(Error::validation("update data cannot be empty"));
                }
                if where_clause.is_empty() {
                    return Err(Error::validation(
                        "condition for modify operation cannot be empty",
                    ));
                }
                Ok(join_sql(&[
                    "UPDATE",
                    &self.table_escaped,
                    "SET",
                    &self.updates.join(", "),
                    &where_clause,
                    &self.limit,
                ]))
            }
            QueryKind::Delete => {
                if where_clause.is_empty() {
                    return Err(Error::validation(
                        "condition for modify operation cannot be empty",
                    ));
                }
                Ok(join_sql(&[
                    "DELETE FROM",
                    &self.table_escaped,
                    &where_clause,
                    &self.limit,
                ]))
            }
            QueryKind::Custom => {
                let template = self
                    .sql_template
                    .as_deref()
                    .ok_or_else(|| Error::validation("missing custom SQL template"))?;
                let mut internal = Row::new();
                internal.insert("$table".to_string(), Value::String(self.table_escaped.clone()));
                internal.insert("$fields".to_string(), Value::String(self.fields.clone()));
                internal.insert("$orderBy".to_string(), Value::String(self.order_by.clone()));
                internal.insert("$limit".to_string(), Value::String(self.limit.clone()));
                internal.insert("$skipRows".to_string(), Value::from(self.skip_rows));
                internal.insert("$limitRows".to_string(), Value::from(self.limit_rows));
                let resolved = format_named_template(template, &internal, true);
                Ok(format_template(&resolved, &self.sql_values).trim().to_string())
            }
            QueryKind::Unset => Err(Error::validation(
                "no query type set, call select/insert/update/delete/sql first",
            )),
        }
    }

    /// Build and run the statement on the supplied executor.
    ///
    /// SELECTs may be served by a replica; everything else goes to the
    /// primary. This is the sole integration point with the executor
    /// collaborator.
    pub async fn exec<E: Executor>(self, executor: &E) -> Result<ExecuteResult> {
        let sql = self.build()?;
        tracing::debug!(target: "rowcache.query", sql = %sql, "exec");
        if is_update_sql(&sql) {
            executor.execute_primary(&sql).await
        } else {
            executor.execute(&sql).await
        }
    }
}

/// Derive the LIMIT clause from skip/limit counters.
fn limit_clause(skip: u64, limit: u64) -> String {
    if limit > 0 {
        if skip > 0 {
            format!("LIMIT {skip},{limit}")
        } else {
            format!("LIMIT {limit}")
        }
    } else {
        format!("LIMIT {skip},{}", u64::MAX)
    }
}

/// Normalize `'DESC'`/`'ASC'` literals that template escaping produced into
/// bare keywords.
fn normalize_order_keywords(fragment: &str) -> String {
    let mut out = fragment.to_string();
    for keyword in ["DESC", "ASC"] {
        let quoted = format!("'{keyword}'");
        loop {
            let upper = out.to_ascii_uppercase();
            let Some(pos) = upper.find(&quoted) else {
                break;
            };
            out.replace_range(pos..pos + quoted.len(), keyword);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn select_fields() {
        let sql = QueryBuilder::new("test1")
            .select(&["name", "age"])
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT `name`, `age` FROM `test1`");
    }

    #[test]
    fn select_with_field_map_condition() {
        let sql = QueryBuilder::new("test1")
            .select(&["name", "age"])
            .where_fields(json!({ "a": 123, "b": 456 }))
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT `name`, `age` FROM `test1` WHERE `a`=123 AND `b`=456");
    }

    #[test]
    fn template_and_map_conditions_render_identically() {
        let from_map = QueryBuilder::new("test1")
            .select(&["name", "age"])
            .where_fields(json!({ "a": 123, "b": 456 }))
            .build()
            .unwrap();
        let from_named = QueryBuilder::new("test1")
            .select(&["name", "age"])
            .where_named("`a`=:a AND `b`=:b", json!({ "a": 123, "b": 456 }))
            .build()
            .unwrap();
        let from_positional = QueryBuilder::new("test1")
            .select(&["name", "age"])
            .where_template("`a`=? AND `b`=?", &[json!(123), json!(456)])
            .build()
            .unwrap();
        assert_eq!(from_map, from_named);
        assert_eq!(from_map, from_positional);
    }

    #[test]
    fn repeated_where_calls_accumulate() {
        let sql = QueryBuilder::new("test1")
            .select(&["name", "age"])
            .where_fields(json!({ "a": 123 }))
            .and_fields(json!({ "b": 456 }))
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT `name`, `age` FROM `test1` WHERE `a`=123 AND `b`=456");
    }

    #[test]
    fn limit_alone() {
        let sql = QueryBuilder::new("test1")
            .select(&["name"])
            .limit(10)
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT `name` FROM `test1` LIMIT 10");
    }

    #[test]
    fn skip_alone_uses_max_row_sentinel() {
        let sql = QueryBuilder::new("test1")
            .select(&["name"])
            .skip(10)
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT `name` FROM `test1` LIMIT 10,18446744073709551615");
    }

    #[test]
    fn skip_and_limit_combine() {
        let sql = QueryBuilder::new("test1")
            .select(&["name"])
            .skip(10)
            .limit(5)
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT `name` FROM `test1` LIMIT 10,5");
    }

    #[test]
    fn order_by_template_normalizes_direction_literals() {
        let sql = QueryBuilder::new("test1")
            .select(&["name"])
            .order_by_template("`a` ?, `b` ?", &[json!("DESC"), json!("ASC")])
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT `name` FROM `test1` ORDER BY `a` DESC, `b` ASC");
    }

    #[test]
    fn group_by_with_having() {
        let sql = QueryBuilder::new("test1")
            .select(&["name", "age"])
            .where_fields(json!({ "a": 123 }))
            .skip(10)
            .limit(20)
            .group_by_template("`name` HAVING `b`=?", &[json!(22)])
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT `name`, `age` FROM `test1` WHERE `a`=123 GROUP BY `name` HAVING `b`=22 LIMIT 10,20"
        );
    }

    #[test]
    fn clause_order_is_where_group_order_limit() {
        let sql = QueryBuilder::new("test1")
            .select(&[] as &[&str])
            .options(QueryOptions {
                skip: Some(1),
                limit: Some(2),
                order_by: Some("`id` DESC".to_string()),
                group_by: Some("`name`".to_string()),
                fields: Some(vec!["id".to_string(), "name".to_string()]),
            })
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT `id`, `name` FROM `test1` GROUP BY `name` ORDER BY `id` DESC LIMIT 1,2"
        );
    }

    #[test]
    fn count_projection() {
        let sql = QueryBuilder::new("test1")
            .count("c")
            .where_fields(json!({ "a": 456, "b": 789 }))
            .limit(1)
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(*) AS `c` FROM `test1` WHERE `a`=456 AND `b`=789 LIMIT 1"
        );
    }

    #[test]
    fn insert_single_row() {
        let sql = QueryBuilder::new("test1")
            .insert(json!({ "a": 123, "b": 456 }))
            .build()
            .unwrap();
        assert_eq!(sql, "INSERT INTO `test1` (`a`, `b`) VALUES (123, 456)");
    }

    #[test]
    fn insert_multiple_rows() {
        let sql = QueryBuilder::new("test1")
            .insert(json!([
                { "a": 123, "b": 456 },
                { "a": 789, "b": 110 }
            ]))
            .build()
            .unwrap();
        assert_eq!(sql, "INSERT INTO `test1` (`a`, `b`) VALUES (123, 456),\n(789, 110)");
    }

    #[test]
    fn insert_rows_must_share_fields() {
        let err = QueryBuilder::new("test1")
            .insert(json!([{ "a": 1, "b": 2 }, { "a": 3 }]))
            .build()
            .unwrap_err();
        assert!(
            err.to_string().contains("must have field \"b\""),
            "{err}"
        );
    }

    #[test]
    fn update_from_map() {
        let sql = QueryBuilder::new("test1")
            .update_fields(json!({ "a": 123, "b": 456 }))
            .where_fields(json!({ "b": 777 }))
            .limit(12)
            .build()
            .unwrap();
        assert_eq!(sql, "UPDATE `test1` SET `a`=123, `b`=456 WHERE `b`=777 LIMIT 12");
    }

    #[test]
    fn update_then_set_accumulates() {
        let sql = QueryBuilder::new("test1")
            .update_fields(json!({ "a": 123 }))
            .set_fields(json!({ "b": 456 }))
            .where_fields(json!({ "b": 777 }))
            .build()
            .unwrap();
        assert_eq!(sql, "UPDATE `test1` SET `a`=123, `b`=456 WHERE `b`=777");
    }

    #[test]
    fn update_incr_operator() {
        let sql = QueryBuilder::new("test1")
            .update_fields(json!({ "a": { "$incr": 1 } }))
            .where_fields(json!({ "a": 2 }))
            .build()
            .unwrap();
        assert_eq!(sql, "UPDATE `test1` SET `a`=`a`+1 WHERE `a`=2");
    }

    #[test]
    fn set_before_update_is_an_error() {
        let err = QueryBuilder::new("test1")
            .set_fields(json!({ "a": 1 }))
            .build()
            .unwrap_err();
        assert!(
            err.to_string()
                .contains("query type must be UPDATE, please call .update() before"),
            "{err}"
        );
    }

    #[test]
    fn update_without_assignments_is_an_error() {
        let err = QueryBuilder::new("test1")
            .update()
            .where_fields(json!({ "a": 1 }))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("update data cannot be empty"), "{err}");

        // An empty map contributes no assignments either.
        let err = QueryBuilder::new("test1")
            .update_fields(json!({}))
            .where_fields(json!({ "a": 1 }))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("update data cannot be empty"), "{err}");
    }

    #[test]
    fn empty_condition_allowed_for_select_only() {
        let sql = QueryBuilder::new("test1")
            .select(&["name", "age"])
            .where_fields(json!({}))
            .where_raw("   ")
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT `name`, `age` FROM `test1`");

        let err = QueryBuilder::new("test1")
            .update_fields(json!({ "a": 123 }))
            .where_fields(json!({}))
            .build()
            .unwrap_err();
        assert!(
            err.to_string().contains("condition for modify operation cannot be empty"),
            "{err}"
        );

        let err = QueryBuilder::new("test1")
            .delete()
            .where_raw("   ")
            .build()
            .unwrap_err();
        assert!(
            err.to_string().contains("condition for modify operation cannot be empty"),
            "{err}"
        );
    }

    #[test]
    fn delete_with_condition_and_limit() {
        let sql = QueryBuilder::new("test1")
            .delete()
            .where_raw("`a`=2")
            .limit(1)
            .build()
            .unwrap();
        assert_eq!(sql, "DELETE FROM `test1` WHERE `a`=2 LIMIT 1");
    }

    #[test]
    fn statement_kind_is_set_once() {
        let err = QueryBuilder::new("test1")
            .select(&["a"])
            .delete()
            .build()
            .unwrap_err();
        assert!(
            err.to_string()
                .contains("cannot change query type after it was set to \"SELECT\""),
            "{err}"
        );
    }

    #[test]
    fn build_requires_a_kind() {
        let err = QueryBuilder::new("test1")
            .where_fields(json!({ "a": 1 }))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("no query type set"), "{err}");
    }

    #[test]
    fn in_and_like_operators() {
        let sql = QueryBuilder::new("test1")
            .select(&["name", "age"])
            .where_fields(json!({
                "a": { "$in": [1, 2, 3] },
                "b": { "$like": "%hello%" }
            }))
            .skip(10)
            .limit(20)
            .order_by("`a` DESC, `b` ASC")
            .build()
            .unwrap();
        assert_eq!(
            sql,
            "SELECT `name`, `age` FROM `test1` WHERE `a` IN (1, 2, 3) AND `b` LIKE '%hello%' ORDER BY `a` DESC, `b` ASC LIMIT 10,20"
        );
    }

    #[test]
    fn in_with_non_array_is_a_build_error() {
        let err = QueryBuilder::new("test1")
            .select(&["name"])
            .where_fields(json!({ "a": { "$in": "x" } }))
            .build()
            .unwrap_err();
        assert!(
            err.to_string()
                .contains("value for condition type $in in field a must be an array"),
            "{err}"
        );
    }

    #[test]
    fn unknown_operator_is_a_named_build_error() {
        let err = QueryBuilder::new("test1")
            .select(&["name"])
            .where_fields(json!({ "a": { "$between": [1, 2] } }))
            .build()
            .unwrap_err();
        assert!(
            err.to_string().contains("condition type $between does not supported"),
            "{err}"
        );
    }

    #[test]
    fn custom_sql_plain() {
        let sql = QueryBuilder::new("test1")
            .sql("SELECT JSON_OBJECT(\"k\", 1) as `data`")
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT JSON_OBJECT(\"k\", 1) as `data`");
    }

    #[test]
    fn custom_sql_internal_placeholders() {
        let sql = QueryBuilder::new("test1")
            .sql("SELECT `data` FROM :$table :$orderBy :$limit")
            .order_by("`id` ASC")
            .skip(5)
            .limit(10)
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT `data` FROM `test1` ORDER BY `id` ASC LIMIT 5,10");
    }

    #[test]
    fn custom_sql_fields_placeholder() {
        let sql = QueryBuilder::new("test1")
            .sql("SELECT :$fields FROM `test1`")
            .fields(&["a", "b", "c"])
            .build()
            .unwrap();
        assert_eq!(sql, "SELECT `a`, `b`, `c` FROM `test1`");
    }

    #[test]
    fn custom_sql_caller_values_are_escaped() {
        let sql = QueryBuilder::new("test1")
            .sql_template("SELECT * FROM :$table WHERE `name`=?", &[json!("O'Brien")])
            .build()
            .unwrap();
        assert_eq!(sql, r"SELECT * FROM `test1` WHERE `name`='O\'Brien'");
    }

    #[test]
    fn string_values_are_escaped_in_conditions() {
        let sql = QueryBuilder::new("test1")
            .select(&["*"])
            .where_fields(json!({ "name": "a'; DROP TABLE test1; --" }))
            .build()
            .unwrap();
        assert_eq!(
            sql,
            r"SELECT * FROM `test1` WHERE `name`='a\'; DROP TABLE test1; --'"
        );
    }
}
