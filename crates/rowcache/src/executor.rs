//! Executor contract and primary/replica routing.
//!
//! The relational engine itself is a collaborator: anything that can take a
//! SQL string and return rows or write metadata implements [`Executor`].
//! [`Replication`] composes one primary executor with any number of replicas
//! and routes statements the way the original pool multiplexer did: SELECTs
//! go round-robin to a replica, everything else to the primary.

use crate::Row;
use crate::error::{Error, Result};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Metadata returned for a mutating statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteMeta {
    /// Rows matched by the statement.
    pub affected_rows: u64,
    /// Rows actually changed.
    pub changed_rows: u64,
    /// Auto-increment id assigned by an INSERT, `0` otherwise.
    pub insert_id: u64,
}

/// Result of executing one SQL statement.
#[derive(Debug, Clone)]
pub enum ExecuteResult {
    /// Row set from a SELECT (or row-returning custom statement).
    Rows(Vec<Row>),
    /// Metadata from an INSERT/UPDATE/DELETE.
    Write(WriteMeta),
}

impl ExecuteResult {
    /// Unwrap a row set, erroring on write metadata.
    pub fn into_rows(self) -> Result<Vec<Row>> {
        match self {
            Self::Rows(rows) => Ok(rows),
            Self::Write(_) => Err(Error::query("statement did not return a row set")),
        }
    }

    /// Unwrap write metadata, erroring on a row set.
    pub fn into_write(self) -> Result<WriteMeta> {
        match self {
            Self::Write(meta) => Ok(meta),
            Self::Rows(_) => Err(Error::query("statement returned rows, not write metadata")),
        }
    }
}

/// A database executor: accepts SQL text, returns rows or write metadata.
///
/// Implementations are shared, task-safe collaborators (connection pools,
/// test doubles); the core never assumes exclusive access.
pub trait Executor: Send + Sync {
    /// Execute on any pool member; reads may be served by a replica.
    fn execute(&self, sql: &str) -> impl Future<Output = Result<ExecuteResult>> + Send;

    /// Execute on the primary. Mutations and read-after-write reads use this.
    fn execute_primary(&self, sql: &str) -> impl Future<Output = Result<ExecuteResult>> + Send;
}

/// Whether a statement must run on the primary.
///
/// Deliberately case-sensitive: the builder always emits uppercase `SELECT`,
/// and anything else coming through the raw-SQL escape hatch routes to the
/// primary, which is the safe side.
pub fn is_update_sql(sql: &str) -> bool {
    let trimmed = sql.trim_start();
    !(trimmed.starts_with("SELECT")
        && trimmed[6..].chars().next().is_some_and(|c| c.is_whitespace()))
}

/// Primary/replica router.
///
/// SELECT statements rotate round-robin across the replicas (falling back to
/// the primary when none are configured); every other statement, and every
/// explicit primary request, goes to the primary.
pub struct Replication<E> {
    primary: E,
    replicas: Vec<E>,
    next: AtomicUsize,
}

impl<E> Replication<E> {
    /// Create a router over one primary and zero or more replicas.
    pub fn new(primary: E, replicas: Vec<E>) -> Self {
        Self {
            primary,
            replicas,
            next: AtomicUsize::new(0),
        }
    }

    /// The primary executor.
    pub fn primary(&self) -> &E {
        &self.primary
    }
}

impl<E: Executor> Executor for Replication<E> {
    async fn execute(&self, sql: &str) -> Result<ExecuteResult> {
        if is_update_sql(sql) || self.replicas.is_empty() {
            return self.primary.execute_primary(sql).await;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.replicas.len();
        self.replicas[index].execute(sql).await
    }

    async fn execute_primary(&self, sql: &str) -> Result<ExecuteResult> {
        self.primary.execute_primary(sql).await
    }
}
