use crate::error::DbError;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Prepared statement cache configuration (per-connection).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StatementCacheConfig {
    pub enabled: bool,
    /// Maximum number of cached statements. `None` keeps every statement.
    pub capacity: Option<usize>,
    /// Never cache statements that produce result columns.
    pub bypass_cursor_statements: bool,
}

impl Default for StatementCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: None,
            bypass_cursor_statements: false,
        }
    }
}

/// Counters describing cache behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Statements compiled outside the cache (disabled, bypassed, or leased).
    pub uncached: u64,
    pub entries: usize,
}

/// Prepared statements keyed by exact SQL text.
///
/// Entries with result columns are leased while their result is consumed; a second
/// request for the same text while the lease is held is told to compile privately.
#[derive(Debug)]
pub(crate) struct StatementCache<S> {
    config: StatementCacheConfig,
    inner: Mutex<StatementCacheInner<S>>,
    hits: AtomicU64,
    misses: AtomicU64,
    uncached: AtomicU64,
}

#[derive(Debug)]
struct Entry<S> {
    statement: S,
    columns: usize,
    leased: bool,
}

#[derive(Debug)]
struct StatementCacheInner<S> {
    map: HashMap<String, Entry<S>>,
    /// Recency order, oldest first. Only kept when a capacity is set.
    order: VecDeque<String>,
}

#[derive(Debug)]
pub(crate) enum StmtCacheLookup<S> {
    Disabled,
    /// Reusable entry. For cursor statements the lease is now held by the caller.
    Hit { statement: S, columns: usize },
    /// Entry exists but its cursor is in use.
    Leased,
    Miss,
}

impl<S: Clone> StatementCache<S> {
    pub(crate) fn new(config: StatementCacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(StatementCacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            uncached: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatementCacheInner<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lookup(&self, sql: &str) -> StmtCacheLookup<S> {
        if !self.config.enabled {
            self.uncached.fetch_add(1, Ordering::Relaxed);
            return StmtCacheLookup::Disabled;
        }

        let mut inner = self.lock();
        let Some(entry) = inner.map.get_mut(sql) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return StmtCacheLookup::Miss;
        };
        if entry.columns > 0 {
            if entry.leased {
                self.uncached.fetch_add(1, Ordering::Relaxed);
                return StmtCacheLookup::Leased;
            }
            entry.leased = true;
        }
        let found = StmtCacheLookup::Hit {
            statement: entry.statement.clone(),
            columns: entry.columns,
        };
        if self.config.capacity.is_some() {
            inner.touch(sql);
        }
        self.hits.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store a freshly compiled statement. Returns whether the caller now holds the
    /// entry's lease (always false for statements without result columns or when the
    /// statement was not stored).
    pub(crate) fn insert(&self, sql: &str, statement: S, columns: usize) -> bool {
        if columns > 0 && self.config.bypass_cursor_statements {
            self.uncached.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let mut inner = self.lock();
        if inner.map.contains_key(sql) {
            // Another caller compiled the same text first; keep theirs.
            return false;
        }
        inner.map.insert(
            sql.to_string(),
            Entry {
                statement,
                columns,
                leased: columns > 0,
            },
        );
        if let Some(capacity) = self.config.capacity {
            inner.order.push_back(sql.to_string());
            inner.evict_if_needed(capacity);
        }
        columns > 0 && inner.map.contains_key(sql)
    }

    pub(crate) fn release(&self, sql: &str) {
        if let Some(entry) = self.lock().map.get_mut(sql) {
            entry.leased = false;
        }
    }

    pub(crate) fn remove(&self, sql: &str) -> bool {
        let mut inner = self.lock();
        let removed = inner.map.remove(sql).is_some();
        if removed && self.config.capacity.is_some() {
            inner.remove_from_order(sql);
        }
        removed
    }

    pub(crate) fn clear(&self) {
        let mut inner = self.lock();
        inner.map.clear();
        inner.order.clear();
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            uncached: self.uncached.load(Ordering::Relaxed),
            entries: self.lock().map.len(),
        }
    }
}

impl<S> StatementCacheInner<S> {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k.as_str() == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }

    fn remove_from_order(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k.as_str() == key) {
            let _ = self.order.remove(pos);
        }
    }

    fn evict_if_needed(&mut self, capacity: usize) {
        // Leased entries stay; their lease holder releases by key.
        let mut skipped = 0;
        while self.map.len() > capacity && skipped < self.order.len() {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if self.map.get(&oldest).is_some_and(|e| e.leased) {
                self.order.push_back(oldest);
                skipped += 1;
                continue;
            }
            let _ = self.map.remove(&oldest);
        }
    }
}

/// Releases a cursor lease when dropped, including when the owning future is cancelled.
pub(crate) struct CacheLease<'a, S: Clone> {
    cache: &'a StatementCache<S>,
    sql: String,
}

impl<'a, S: Clone> CacheLease<'a, S> {
    pub(crate) fn new(cache: &'a StatementCache<S>, sql: &str) -> Self {
        Self {
            cache,
            sql: sql.to_string(),
        }
    }
}

impl<S: Clone> Drop for CacheLease<'_, S> {
    fn drop(&mut self) {
        self.cache.release(&self.sql);
    }
}

/// Whether a failure on a cached statement means the statement itself went stale and
/// should be dropped and prepared again.
pub(crate) fn is_retryable_prepared_error(err: &DbError) -> bool {
    let DbError::QueryExecution { code, message, .. } = err else {
        return false;
    };

    match code.as_deref() {
        // "cached plan must not change result type" (e.g. after schema change)
        Some("0A000") => message
            .to_ascii_lowercase()
            .contains("cached plan must not change result type"),
        // invalid_sql_statement_name
        Some("26000") => true,
        _ => false,
    }
}
