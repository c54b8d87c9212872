//! Test doubles for the table layer: a single-table in-memory executor that
//! interprets the narrow SQL shapes the builder emits, and an in-memory
//! cache store with TTL and atomic pointer reads.

#![allow(dead_code)]

use rowcache::{CacheItem, CacheStore, Error, ExecuteResult, Executor, Result, Row, WriteMeta};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

// ==================== Executor double ====================

pub struct MemoryDb {
    table: String,
    auto_field: Option<String>,
    state: Mutex<DbState>,
    selects: AtomicUsize,
    log: Mutex<Vec<String>>,
}

struct DbState {
    rows: Vec<Row>,
    next_id: u64,
}

impl MemoryDb {
    pub fn new(table: &str, auto_field: Option<&str>) -> Self {
        Self {
            table: table.to_string(),
            auto_field: auto_field.map(str::to_string),
            state: Mutex::new(DbState {
                rows: Vec::new(),
                next_id: 1,
            }),
            selects: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Insert a row directly, bypassing SQL (and bumping the id sequence).
    pub fn seed(&self, row: Row) {
        let mut state = self.state.lock().unwrap();
        if let Some(auto) = &self.auto_field {
            if let Some(id) = row.get(auto).and_then(Value::as_u64) {
                state.next_id = state.next_id.max(id + 1);
            }
        }
        state.rows.push(row);
    }

    pub fn rows(&self) -> Vec<Row> {
        self.state.lock().unwrap().rows.clone()
    }

    /// Number of SELECT statements served so far.
    pub fn select_count(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    /// Every statement executed, in order.
    pub fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn run(&self, sql: &str) -> Result<ExecuteResult> {
        self.log.lock().unwrap().push(sql.to_string());
        if let Some(rest) = sql.strip_prefix("SELECT ") {
            self.selects.fetch_add(1, Ordering::SeqCst);
            return self.run_select(rest);
        }
        if let Some(rest) = sql.strip_prefix("INSERT INTO ") {
            return self.run_insert(rest);
        }
        if let Some(rest) = sql.strip_prefix("UPDATE ") {
            return self.run_update(rest);
        }
        if let Some(rest) = sql.strip_prefix("DELETE FROM ") {
            return self.run_delete(rest);
        }
        Err(Error::query(format!("unsupported test SQL: {sql}")))
    }

    fn run_select(&self, rest: &str) -> Result<ExecuteResult> {
        let (projection, rest) = rest
            .split_once(" FROM ")
            .ok_or_else(|| Error::query(format!("bad SELECT: {rest}")))?;
        let rest = self.strip_table(rest)?;
        let (conds, limit) = split_where_limit(rest);
        let state = self.state.lock().unwrap();
        let matched: Vec<&Row> = state
            .rows
            .iter()
            .filter(|row| row_matches(row, &conds))
            .collect();
        if projection == "COUNT(*) AS `c`" {
            let mut row = Row::new();
            row.insert("c".to_string(), Value::from(matched.len() as u64));
            return Ok(ExecuteResult::Rows(vec![row]));
        }
        let taken = matched.iter().take(limit);
        let rows: Vec<Row> = if projection == "*" {
            taken.map(|row| (*row).clone()).collect()
        } else {
            let fields: Vec<String> = projection.split(", ").map(strip_ticks).collect();
            taken
                .map(|row| {
                    let mut out = Row::new();
                    for field in &fields {
                        if let Some(value) = row.get(field) {
                            out.insert(field.clone(), value.clone());
                        }
                    }
                    out
                })
                .collect()
        };
        Ok(ExecuteResult::Rows(rows))
    }

    fn run_insert(&self, rest: &str) -> Result<ExecuteResult> {
        let rest = self.strip_table(rest)?;
        let rest = rest
            .strip_prefix('(')
            .ok_or_else(|| Error::query(format!("bad INSERT: {rest}")))?;
        let (cols_part, tuples) = rest
            .split_once(") VALUES ")
            .ok_or_else(|| Error::query(format!("bad INSERT: {rest}")))?;
        let columns: Vec<String> = cols_part.split(", ").map(strip_ticks).collect();
        let mut state = self.state.lock().unwrap();
        let mut insert_id = 0;
        let mut inserted = 0;
        for tuple in tuples.split(",\n") {
            let inner = tuple
                .trim()
                .strip_prefix('(')
                .and_then(|t| t.strip_suffix(')'))
                .ok_or_else(|| Error::query(format!("bad VALUES tuple: {tuple}")))?;
            let values: Vec<Value> = inner.split(", ").map(parse_value).collect();
            let mut row = Row::new();
            for (column, value) in columns.iter().zip(values) {
                row.insert(column.clone(), value);
            }
            if let Some(auto) = &self.auto_field {
                match row.get(auto).and_then(Value::as_u64) {
                    Some(id) => insert_id = id,
                    None => {
                        insert_id = state.next_id;
                        row.insert(auto.clone(), Value::from(insert_id));
                        state.next_id += 1;
                    }
                }
            }
            state.rows.push(row);
            inserted += 1;
        }
        Ok(ExecuteResult::Write(WriteMeta {
            affected_rows: inserted,
            changed_rows: 0,
            insert_id,
        }))
    }

    fn run_update(&self, rest: &str) -> Result<ExecuteResult> {
        let rest = self.strip_table(rest)?;
        let rest = rest
            .strip_prefix("SET ")
            .ok_or_else(|| Error::query(format!("bad UPDATE: {rest}")))?;
        let (sets_part, rest) = rest
            .split_once(" WHERE ")
            .ok_or_else(|| Error::query(format!("UPDATE without WHERE: {rest}")))?;
        let (clause, limit) = split_limit(rest);
        let conds = parse_conds(clause);
        let sets: Vec<SetOp> = sets_part.split(", ").map(parse_set).collect();
        let mut state = self.state.lock().unwrap();
        let mut affected = 0;
        for row in state.rows.iter_mut() {
            if affected >= limit || !row_matches(row, &conds) {
                continue;
            }
            for set in &sets {
                match set {
                    SetOp::Assign(field, value) => {
                        row.insert(field.clone(), value.clone());
                    }
                    SetOp::Incr(field, amount) => {
                        let current = row.get(field).and_then(Value::as_i64).unwrap_or(0);
                        row.insert(field.clone(), Value::from(current + amount));
                    }
                }
            }
            affected += 1;
        }
        Ok(ExecuteResult::Write(WriteMeta {
            affected_rows: affected as u64,
            changed_rows: affected as u64,
            insert_id: 0,
        }))
    }

    fn run_delete(&self, rest: &str) -> Result<ExecuteResult> {
        let rest = self.strip_table(rest)?;
        let (conds, limit) = split_where_limit(rest);
        let mut state = self.state.lock().unwrap();
        let mut removed = 0;
        state.rows.retain(|row| {
            if removed < limit && row_matches(row, &conds) {
                removed += 1;
                false
            } else {
                true
            }
        });
        Ok(ExecuteResult::Write(WriteMeta {
            affected_rows: removed as u64,
            changed_rows: removed as u64,
            insert_id: 0,
        }))
    }

    fn strip_table<'a>(&self, rest: &'a str) -> Result<&'a str> {
        let quoted = format!("`{}`", self.table);
        rest.strip_prefix(&quoted)
            .map(str::trim_start)
            .ok_or_else(|| Error::query(format!("unexpected table in: {rest}")))
    }
}

impl Executor for MemoryDb {
    async fn execute(&self, sql: &str) -> Result<ExecuteResult> {
        self.run(sql)
    }

    async fn execute_primary(&self, sql: &str) -> Result<ExecuteResult> {
        self.run(sql)
    }
}

enum SetOp {
    Assign(String, Value),
    Incr(String, i64),
}

fn parse_set(text: &str) -> SetOp {
    let (lhs, rhs) = text.split_once('=').expect("assignment");
    let field = strip_ticks(lhs);
    if let Some(rest) = rhs.strip_prefix(&format!("`{field}`+")) {
        SetOp::Incr(field, rest.parse().expect("increment amount"))
    } else {
        SetOp::Assign(field, parse_value(rhs))
    }
}

fn split_where_limit(rest: &str) -> (Vec<(String, Value)>, usize) {
    if let Some(after) = rest.strip_prefix("WHERE ") {
        let (clause, limit) = split_limit(after);
        (parse_conds(clause), limit)
    } else {
        let (_, limit) = split_limit(rest);
        (Vec::new(), limit)
    }
}

fn split_limit(rest: &str) -> (&str, usize) {
    match rest.split_once("LIMIT ") {
        Some((head, tail)) => (head.trim_end(), parse_limit(tail)),
        None => (rest, usize::MAX),
    }
}

fn parse_limit(text: &str) -> usize {
    // "n" or "skip,count"; the doubles only ever need the count.
    let count = text.rsplit(',').next().unwrap_or(text).trim();
    count.parse().unwrap_or(usize::MAX)
}

fn parse_conds(clause: &str) -> Vec<(String, Value)> {
    clause
        .split(" AND ")
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            let (lhs, rhs) = part.split_once('=').expect("condition");
            (strip_ticks(lhs), parse_value(rhs))
        })
        .collect()
}

fn parse_value(text: &str) -> Value {
    if text == "NULL" {
        return Value::Null;
    }
    if let Some(inner) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        return Value::String(inner.to_string());
    }
    serde_json::from_str(text).unwrap_or_else(|_| panic!("unparseable SQL value: {text}"))
}

fn strip_ticks(text: &str) -> String {
    text.trim().trim_matches('`').to_string()
}

fn row_matches(row: &Row, conds: &[(String, Value)]) -> bool {
    conds
        .iter()
        .all(|(field, value)| row.get(field) == Some(value))
}

// ==================== Cache store double ====================

pub struct MemoryCache {
    prefix: String,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

struct CacheEntry {
    data: String,
    expires_at: Instant,
}

impl MemoryCache {
    pub fn new(prefix: &str, ttl: Duration) -> Self {
        Self {
            prefix: prefix.to_string(),
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Whether an unexpired entry exists under the (unprefixed) key.
    pub fn contains(&self, key: &str) -> bool {
        let entries = self.entries.lock().unwrap();
        entries
            .get(&self.prefixed(key))
            .is_some_and(|e| e.expires_at > Instant::now())
    }

    /// Count of unexpired entries.
    pub fn live_entries(&self) -> usize {
        let entries = self.entries.lock().unwrap();
        let now = Instant::now();
        entries.values().filter(|e| e.expires_at > now).count()
    }
}

impl CacheStore for MemoryCache {
    async fn save_list(&self, items: Vec<CacheItem>) -> Result<Vec<String>> {
        let mut entries = self.entries.lock().unwrap();
        let expires_at = Instant::now() + self.ttl;
        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            let key = self.prefixed(&item.key);
            entries.insert(
                key.clone(),
                CacheEntry {
                    data: item.data,
                    expires_at,
                },
            );
            keys.push(key);
        }
        Ok(keys)
    }

    async fn get_list(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let entries = self.entries.lock().unwrap();
        let now = Instant::now();
        Ok(keys
            .iter()
            .map(|key| {
                entries
                    .get(&self.prefixed(key))
                    .filter(|e| e.expires_at > now)
                    .map(|e| e.data.clone())
            })
            .collect())
    }

    async fn remove_list(&self, keys: &[String]) -> Result<Vec<String>> {
        let mut entries = self.entries.lock().unwrap();
        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            let key = self.prefixed(key);
            entries.remove(&key);
            removed.push(key);
        }
        Ok(removed)
    }

    async fn get_pointer_item(&self, key: &str) -> Result<Option<String>> {
        // Both hops under one lock, mirroring the server-side script.
        let entries = self.entries.lock().unwrap();
        let now = Instant::now();
        let pointer = entries
            .get(&self.prefixed(key))
            .filter(|e| e.expires_at > now)
            .map(|e| e.data.clone());
        let Some(target) = pointer else {
            return Ok(None);
        };
        Ok(entries
            .get(&self.prefixed(&target))
            .filter(|e| e.expires_at > now)
            .map(|e| e.data.clone()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
