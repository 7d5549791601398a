//! Sliding-window request rate limiting.
//!
//! Requests are counted per key (client IP plus policy name). When a remote
//! counter store is configured it is preferred for its atomic increments;
//! any remote failure falls back to the local store (database table, or
//! memory when no database is in use). If the local store fails too the
//! request is allowed and the failure is logged.

pub mod remote;
pub mod store;

pub use remote::RemoteCounterStore;
pub use store::{DatabaseStore, Hit, MemoryStore, RateLimitStore, StoreError};

use crate::config::RateLimitConfig;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Limit applied to one class of routes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub name: &'static str,
    pub max_requests: u64,
    pub window: Duration,
}

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    #[serde(skip)]
    pub reset_after: Duration,
}

impl RateLimitDecision {
    fn from_hit(hit: Hit, policy: &RateLimitPolicy) -> Self {
        Self {
            allowed: hit.count <= policy.max_requests,
            limit: policy.max_requests,
            remaining: policy.max_requests.saturating_sub(hit.count),
            reset_after: hit.reset_after,
        }
    }

    fn fail_open(policy: &RateLimitPolicy) -> Self {
        Self {
            allowed: true,
            limit: policy.max_requests,
            remaining: policy.max_requests,
            reset_after: policy.window,
        }
    }

    /// Whole seconds for the `Retry-After` header, never zero
    pub fn retry_after_secs(&self) -> u64 {
        self.reset_after.as_secs().max(1)
    }
}

/// Paths that get the stricter authentication policy
const AUTH_PATHS: &[&str] = &["/api/auth/login", "/api/auth/register", "/api/admin/login"];

pub struct RateLimiter {
    remote: Option<Arc<dyn RateLimitStore>>,
    local: Arc<dyn RateLimitStore>,
    general: RateLimitPolicy,
    auth: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(
        config: &RateLimitConfig,
        remote: Option<Arc<dyn RateLimitStore>>,
        local: Arc<dyn RateLimitStore>,
    ) -> Self {
        Self {
            remote,
            local,
            general: RateLimitPolicy {
                name: "general",
                max_requests: config.max_requests,
                window: config.window(),
            },
            auth: RateLimitPolicy {
                name: "auth",
                max_requests: config.auth_max_requests,
                window: config.window(),
            },
        }
    }

    /// Build the limiter from configuration: remote store when credentials
    /// are present, the database table as the local store
    pub fn from_config(config: &RateLimitConfig, pool: sqlx::PgPool) -> Self {
        let remote: Option<Arc<dyn RateLimitStore>> = match config.remote_credentials() {
            Some((url, token)) => match RemoteCounterStore::new(url, token) {
                Ok(store) => {
                    info!("Rate limiter using remote counter store at {}", url);
                    Some(Arc::new(store))
                }
                Err(e) => {
                    warn!("Remote rate-limit store unavailable, using local counting: {}", e);
                    None
                }
            },
            None => None,
        };

        Self::new(config, remote, Arc::new(DatabaseStore::new(pool)))
    }

    pub fn general_policy(&self) -> &RateLimitPolicy {
        &self.general
    }

    pub fn auth_policy(&self) -> &RateLimitPolicy {
        &self.auth
    }

    /// Policy for a request path
    pub fn policy_for_path(&self, path: &str) -> &RateLimitPolicy {
        if AUTH_PATHS.contains(&path) {
            &self.auth
        } else {
            &self.general
        }
    }

    /// Record a request for `key` and decide whether it may proceed
    pub async fn check(&self, key: &str, policy: &RateLimitPolicy) -> RateLimitDecision {
        let namespaced = format!("rl:{}:{}", policy.name, key);

        if let Some(remote) = &self.remote {
            match remote.hit(&namespaced, policy.window).await {
                Ok(hit) => return RateLimitDecision::from_hit(hit, policy),
                Err(e) => warn!(
                    "Remote rate-limit store failed for {}, falling back to {}: {}",
                    namespaced,
                    self.local.name(),
                    e
                ),
            }
        }

        match self.local.hit(&namespaced, policy.window).await {
            Ok(hit) => RateLimitDecision::from_hit(hit, policy),
            Err(e) => {
                warn!("Rate-limit store {} failed, allowing request: {}", self.local.name(), e);
                RateLimitDecision::fail_open(policy)
            }
        }
    }

    /// Remove local bookkeeping that no policy window can still see
    pub async fn cleanup(&self) -> u64 {
        let horizon = self.general.window.max(self.auth.window);
        match self.local.cleanup(horizon).await {
            Ok(removed) => {
                if removed > 0 {
                    debug!("Rate-limit cleanup removed {} entries", removed);
                }
                removed
            }
            Err(e) => {
                warn!("Rate-limit cleanup failed: {}", e);
                0
            }
        }
    }

    /// Run `cleanup` every `interval` until the task is aborted
    pub fn spawn_cleanup_task(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.cleanup().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FailingStore;

    #[async_trait]
    impl RateLimitStore for FailingStore {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn hit(&self, _key: &str, _window: Duration) -> Result<Hit, StoreError> {
            Err(StoreError::Protocol("unreachable".to_string()))
        }

        async fn cleanup(&self, _older_than: Duration) -> Result<u64, StoreError> {
            Err(StoreError::Protocol("unreachable".to_string()))
        }
    }

    fn config(max: u64) -> RateLimitConfig {
        RateLimitConfig {
            window_secs: 60,
            max_requests: max,
            auth_max_requests: 2,
            ..RateLimitConfig::default()
        }
    }

    #[tokio::test]
    async fn test_allows_up_to_limit_then_denies() {
        let limiter = RateLimiter::new(&config(3), None, Arc::new(MemoryStore::new()));
        let policy = limiter.general_policy().clone();

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check("10.0.0.1", &policy).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = limiter.check("10.0.0.1", &policy).await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.retry_after_secs() >= 1);

        // Other clients are unaffected
        assert!(limiter.check("10.0.0.2", &policy).await.allowed);
    }

    #[tokio::test]
    async fn test_policies_are_counted_separately() {
        let limiter = RateLimiter::new(&config(100), None, Arc::new(MemoryStore::new()));
        let auth = limiter.auth_policy().clone();
        let general = limiter.general_policy().clone();

        assert!(limiter.check("ip", &auth).await.allowed);
        assert!(limiter.check("ip", &auth).await.allowed);
        assert!(!limiter.check("ip", &auth).await.allowed);
        assert!(limiter.check("ip", &general).await.allowed);
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_to_local() {
        let limiter = RateLimiter::new(
            &config(1),
            Some(Arc::new(FailingStore)),
            Arc::new(MemoryStore::new()),
        );
        let policy = limiter.general_policy().clone();

        assert!(limiter.check("ip", &policy).await.allowed);
        // Local store still enforces the limit
        assert!(!limiter.check("ip", &policy).await.allowed);
    }

    #[tokio::test]
    async fn test_local_failure_fails_open() {
        let limiter = RateLimiter::new(&config(1), None, Arc::new(FailingStore));
        let policy = limiter.general_policy().clone();

        for _ in 0..5 {
            assert!(limiter.check("ip", &policy).await.allowed);
        }
        assert_eq!(limiter.cleanup().await, 0);
    }

    #[test]
    fn test_policy_for_path() {
        let limiter = RateLimiter::new(&config(10), None, Arc::new(MemoryStore::new()));
        assert_eq!(limiter.policy_for_path("/api/auth/login").name, "auth");
        assert_eq!(limiter.policy_for_path("/api/admin/login").name, "auth");
        assert_eq!(limiter.policy_for_path("/api/quizzes").name, "general");
    }
}
