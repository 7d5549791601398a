//! Counting backends for the rate limiter

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("remote store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote store returned an unexpected response: {0}")]
    Protocol(String),
}

/// Result of recording one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    /// Requests counted in the current window, including this one
    pub count: u64,
    /// Time until the oldest counted request leaves the window
    pub reset_after: Duration,
}

/// A backend that can record a request and report the window count
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn hit(&self, key: &str, window: Duration) -> Result<Hit, StoreError>;

    /// Drop bookkeeping older than `older_than`; returns how many entries went
    async fn cleanup(&self, older_than: Duration) -> Result<u64, StoreError>;
}

/// In-process sliding log, one timestamp queue per key
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn tracked_keys(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn hit(&self, key: &str, window: Duration) -> Result<Hit, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let log = entries.entry(key.to_string()).or_default();

        while let Some(&oldest) = log.front() {
            if now.duration_since(oldest) >= window {
                log.pop_front();
            } else {
                break;
            }
        }
        log.push_back(now);

        let oldest = log.front().copied().unwrap_or(now);
        let reset_after = window.saturating_sub(now.duration_since(oldest));

        Ok(Hit {
            count: log.len() as u64,
            reset_after,
        })
    }

    async fn cleanup(&self, older_than: Duration) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let mut removed = 0u64;

        for log in entries.values_mut() {
            let before = log.len();
            log.retain(|t| now.duration_since(*t) < older_than);
            removed += (before - log.len()) as u64;
        }
        entries.retain(|_, log| !log.is_empty());

        Ok(removed)
    }
}

/// Sliding window over the `rate_limits` table
pub struct DatabaseStore {
    pool: PgPool,
}

impl DatabaseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitStore for DatabaseStore {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn hit(&self, key: &str, window: Duration) -> Result<Hit, StoreError> {
        let window_secs = window.as_secs_f64();

        sqlx::query("INSERT INTO rate_limits (key) VALUES ($1)")
            .bind(key)
            .execute(&self.pool)
            .await?;

        let (count, oldest_age): (i64, Option<f64>) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   EXTRACT(EPOCH FROM (NOW() - MIN(created_at)))::FLOAT8
            FROM rate_limits
            WHERE key = $1 AND created_at > NOW() - ($2::FLOAT8 * INTERVAL '1 second')
            "#,
        )
        .bind(key)
        .bind(window_secs)
        .fetch_one(&self.pool)
        .await?;

        let elapsed = oldest_age.unwrap_or(0.0).clamp(0.0, window_secs);
        Ok(Hit {
            count: count.max(1) as u64,
            reset_after: Duration::from_secs_f64(window_secs - elapsed),
        })
    }

    async fn cleanup(&self, older_than: Duration) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM rate_limits WHERE created_at < NOW() - ($1::FLOAT8 * INTERVAL '1 second')",
        )
        .bind(older_than.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_counts_per_key() {
        let store = MemoryStore::new();
        let window = Duration::from_secs(60);

        assert_eq!(store.hit("a", window).await.unwrap().count, 1);
        assert_eq!(store.hit("a", window).await.unwrap().count, 2);
        assert_eq!(store.hit("b", window).await.unwrap().count, 1);
        assert_eq!(store.tracked_keys().await, 2);
    }

    #[tokio::test]
    async fn test_memory_store_window_slides() {
        let store = MemoryStore::new();
        let window = Duration::from_millis(50);

        store.hit("k", window).await.unwrap();
        store.hit("k", window).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        let hit = store.hit("k", window).await.unwrap();
        assert_eq!(hit.count, 1);
        assert!(hit.reset_after <= window);
    }

    #[tokio::test]
    async fn test_memory_store_cleanup_drops_stale_keys() {
        let store = MemoryStore::new();
        store.hit("old", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let removed = store.cleanup(Duration::from_millis(10)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.tracked_keys().await, 0);
    }
}
