//! Resolution cache with classification-keyed retry
//!
//! One row per PMID holding the last `(url, reason, verified)` result. A
//! cached row is returned as-is unless the retry policy says its reason is
//! worth another attempt; either way at most one fresh resolution runs per
//! call. Store failures are logged and never reach the caller.

use super::{ResolutionOutcome, ResolveOptions};
use crate::article::ArticleRecord;
use crate::error::{CacheError, ReasonCode};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;

type Result<T> = std::result::Result<T, CacheError>;

/// Anything that resolves an article to a `(url, reason)` pair
pub trait ArticleResolver {
    fn resolve(&mut self, article: &ArticleRecord, options: &ResolveOptions) -> ResolutionOutcome;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub url: Option<String>,
    pub reason: Option<String>,
    pub verified: bool,
    /// Unix seconds of the attempt
    pub timestamp: i64,
}

impl CacheEntry {
    pub fn outcome(&self) -> ResolutionOutcome {
        ResolutionOutcome {
            url: self.url.clone(),
            reason: self.reason.clone(),
        }
    }

    fn is_found(&self) -> bool {
        self.outcome().is_found()
    }
}

/// Which cached failures get a fresh attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retry every failure class
    pub retry_errors: bool,
    /// Retry `PAYWALL`; access models change
    pub retry_paywall: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_errors: false,
            retry_paywall: true,
        }
    }
}

impl RetryPolicy {
    pub fn should_retry(&self, entry: &CacheEntry, verify: bool) -> bool {
        if entry.is_found() {
            // an offline-built link does not satisfy a caller who wants it checked
            return verify && !entry.verified;
        }
        match entry.reason.as_deref().and_then(ReasonCode::parse) {
            Some(ReasonCode::NoFormat) => true,
            Some(ReasonCode::Paywall) => self.retry_paywall || self.retry_errors,
            _ => self.retry_errors,
        }
    }
}

/// SQLite store for cache entries
pub struct CacheStore {
    conn: Mutex<Connection>,
    path: String,
}

impl CacheStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path_ref)?;
        let store = Self {
            conn: Mutex::new(conn),
            path: path_ref.to_string_lossy().to_string(),
        };
        store.init()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: ":memory:".to_string(),
        };
        store.init()?;
        Ok(store)
    }

    pub fn get_path(&self) -> String {
        self.path.clone()
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS findit_cache (
                id INTEGER PRIMARY KEY,
                url TEXT,
                reason TEXT,
                verified INTEGER NOT NULL DEFAULT 0,
                timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_findit_cache_timestamp ON findit_cache(timestamp);",
        )?;
        Ok(())
    }

    pub fn get(&self, id: i64) -> Result<Option<CacheEntry>> {
        let conn = self.conn.lock().unwrap();
        let entry = conn
            .query_row(
                "SELECT url, reason, verified, timestamp FROM findit_cache WHERE id = ?1",
                params![id],
                |row| {
                    Ok(CacheEntry {
                        url: row.get(0)?,
                        reason: row.get(1)?,
                        verified: row.get(2)?,
                        timestamp: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    /// Whole-row replace
    pub fn put(&self, id: i64, entry: &CacheEntry) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO findit_cache (id, url, reason, verified, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, entry.url, entry.reason, entry.verified, entry.timestamp],
        )?;
        Ok(())
    }

    /// Drop entries written before `timestamp`; returns how many went
    pub fn purge_older_than(&self, timestamp: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute("DELETE FROM findit_cache WHERE timestamp < ?1", params![timestamp])?;
        Ok(removed)
    }

    pub fn len(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM findit_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Cache/retry layer in front of any [`ArticleResolver`]
pub struct CachedResolver<R> {
    inner: R,
    store: Option<CacheStore>,
    policy: RetryPolicy,
    pub hits: u32,
}

impl<R: ArticleResolver> CachedResolver<R> {
    pub fn new(inner: R, store: CacheStore, policy: RetryPolicy) -> Self {
        Self {
            inner,
            store: Some(store),
            policy,
            hits: 0,
        }
    }

    /// Pass-through with no persistence
    pub fn uncached(inner: R, policy: RetryPolicy) -> Self {
        Self {
            inner,
            store: None,
            policy,
            hits: 0,
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: RetryPolicy) {
        self.policy = policy;
    }

    pub fn store(&self) -> Option<&CacheStore> {
        self.store.as_ref()
    }

    pub fn resolve(&mut self, article: &ArticleRecord, options: &ResolveOptions) -> ResolutionOutcome {
        let (Some(store), Some(id)) = (self.store.as_ref(), article.cache_key()) else {
            return self.inner.resolve(article, options);
        };

        match store.get(id) {
            Ok(Some(entry)) if !self.policy.should_retry(&entry, options.verify) => {
                tracing::debug!(pmid = id, "cache hit");
                self.hits += 1;
                return entry.outcome();
            }
            Ok(Some(entry)) => {
                tracing::debug!(pmid = id, reason = entry.reason.as_deref().unwrap_or(""), "retrying cached result");
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(pmid = id, "cache read failed: {}", e),
        }

        let outcome = self.inner.resolve(article, options);
        let entry = CacheEntry {
            url: outcome.url.clone(),
            reason: outcome.reason.clone(),
            verified: options.verify && outcome.is_found(),
            timestamp: Utc::now().timestamp(),
        };
        if let Err(e) = store.put(id, &entry) {
            tracing::warn!(pmid = id, "cache write failed: {}", e);
        }
        outcome
    }
}

impl<R: ArticleResolver> ArticleResolver for CachedResolver<R> {
    fn resolve(&mut self, article: &ArticleRecord, options: &ResolveOptions) -> ResolutionOutcome {
        CachedResolver::resolve(self, article, options)
    }
}
