//! Named database handles owned by the application.

use crate::client::Connection;
use crate::db::Db;
use crate::error::DbResult;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A get-or-create registry of [`Db`] handles keyed by name.
///
/// Owned by whoever wires the application together and passed to the code that needs
/// it; there is no process-wide instance.
pub struct DbRegistry<C: Connection> {
    entries: Mutex<HashMap<String, Arc<Db<C>>>>,
}

impl<C: Connection> Default for DbRegistry<C> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<C: Connection> DbRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Db<C>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Db<C>>> {
        self.lock().get(name).cloned()
    }

    /// Register `db` under `name`, returning the handle it replaced.
    pub fn insert(&self, name: impl Into<String>, db: Db<C>) -> Option<Arc<Db<C>>> {
        self.lock().insert(name.into(), Arc::new(db))
    }

    /// The handle registered under `name`, creating it with `create` when absent.
    pub fn get_or_try_insert_with(
        &self,
        name: &str,
        create: impl FnOnce() -> DbResult<Db<C>>,
    ) -> DbResult<Arc<Db<C>>> {
        let mut entries = self.lock();
        if let Some(db) = entries.get(name) {
            return Ok(db.clone());
        }
        let db = Arc::new(create()?);
        entries.insert(name.to_string(), db.clone());
        Ok(db)
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Db<C>>> {
        self.lock().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl DbRegistry<tokio_postgres::Client> {
    /// The handle registered under `name`, connecting with `config` when absent.
    ///
    /// Two concurrent calls for a missing name may both connect; the first one to
    /// finish is kept.
    pub async fn get_or_connect(
        &self,
        name: &str,
        config: &crate::config::DbConfig,
    ) -> DbResult<Arc<Db<tokio_postgres::Client>>> {
        if let Some(db) = self.get(name) {
            return Ok(db);
        }
        let db = Arc::new(Db::connect(config.clone()).await?);
        Ok(self
            .lock()
            .entry(name.to_string())
            .or_insert(db)
            .clone())
    }
}
