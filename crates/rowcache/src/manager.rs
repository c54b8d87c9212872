//! Table registry over shared collaborators.
//!
//! A [`Manager`] owns one executor and one cache store and hands out
//! [`Table`] handles registered against them.

use crate::cache::CacheStore;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::table::{Table, TableOptions};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Shared executor + cache store + table registry.
pub struct Manager<E, S> {
    connection: Arc<E>,
    cache: Arc<S>,
    tables: RwLock<HashMap<String, Arc<Table<E, S>>>>,
}

impl<E: Executor, S: CacheStore> Manager<E, S> {
    /// Create a manager over the given collaborators.
    pub fn new(connection: Arc<E>, cache: Arc<S>) -> Self {
        Self {
            connection,
            cache,
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// The shared executor.
    pub fn connection(&self) -> &Arc<E> {
        &self.connection
    }

    /// The shared cache store.
    pub fn cache(&self) -> &Arc<S> {
        &self.cache
    }

    /// Register a table; later registrations under the same name replace
    /// earlier ones.
    pub fn register_table(&self, options: TableOptions) -> Result<()> {
        let name = options.table.clone();
        let table = Table::new(options, self.connection.clone(), self.cache.clone())?;
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables.insert(name, Arc::new(table));
        Ok(())
    }

    /// Whether `name` is registered.
    pub fn has_table(&self, name: &str) -> bool {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables.contains_key(name)
    }

    /// Look up a registered table.
    pub fn table(&self, name: &str) -> Result<Arc<Table<E, S>>> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        tables
            .get(name)
            .cloned()
            .ok_or_else(|| Error::validation(format!("table \"{name}\" is not registered")))
    }

    /// Close the cache store and drop the registry.
    pub async fn close(&self) -> Result<()> {
        self.cache.close().await?;
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables.clear();
        Ok(())
    }
}
