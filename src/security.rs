//! Security-event monitoring.
//!
//! Every suspicious or noteworthy request outcome is persisted to
//! `security_events` and mirrored to the log. Failed logins are counted per
//! IP and escalate to a `brute_force_suspected` event at the threshold.

use crate::config::SecurityConfig;
use crate::error::AppResult;
use crate::models::{
    NewSecurityEvent, SecurityEvent, SecurityEventCount, SecurityEventType, SecuritySeverity,
};
use crate::repositories::SecurityEventRepository;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Event counts for the admin security overview
#[derive(Debug, Clone, Serialize)]
pub struct SecuritySummary {
    pub since: DateTime<Utc>,
    pub total: i64,
    pub by_type: Vec<SecurityEventCount>,
}

pub struct SecurityMonitor {
    repo: Arc<SecurityEventRepository>,
    failed_login_threshold: i64,
    failed_login_window: Duration,
}

impl SecurityMonitor {
    pub fn new(repo: Arc<SecurityEventRepository>, config: &SecurityConfig) -> Self {
        Self {
            repo,
            failed_login_threshold: config.failed_login_threshold.max(1),
            failed_login_window: Duration::seconds(config.failed_login_window_secs),
        }
    }

    fn log(event: &NewSecurityEvent) {
        let ip = event.ip_address.as_deref().unwrap_or("-");
        let path = event.path.as_deref().unwrap_or("-");
        match event.severity {
            SecuritySeverity::Low => info!(
                "security event {} ip={} path={}",
                event.event_type.as_str(),
                ip,
                path
            ),
            SecuritySeverity::Medium | SecuritySeverity::High => warn!(
                "security event {} [{}] ip={} path={} details={}",
                event.event_type.as_str(),
                event.severity.as_str(),
                ip,
                path,
                event.details
            ),
            SecuritySeverity::Critical => error!(
                "security event {} [critical] ip={} path={} details={}",
                event.event_type.as_str(),
                ip,
                path,
                event.details
            ),
        }
    }

    /// Log and persist an event
    pub async fn record(&self, event: NewSecurityEvent) -> AppResult<SecurityEvent> {
        Self::log(&event);
        Ok(self.repo.insert(&event).await?)
    }

    /// Record from a background task; persistence failures are only logged
    pub fn record_detached(self: &Arc<Self>, event: NewSecurityEvent) {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = monitor.record(event).await {
                warn!("Failed to persist security event: {}", e);
            }
        });
    }

    /// Record a failed login and escalate when the IP crosses the threshold
    ///
    /// Returns `true` when a brute-force event was raised by this call.
    pub async fn record_failed_login(&self, ip: &str, email: &str) -> AppResult<bool> {
        self.record(
            NewSecurityEvent::new(SecurityEventType::LoginFailed)
                .ip(ip)
                .details(serde_json::json!({ "email": email })),
        )
        .await?;

        let since = Utc::now() - self.failed_login_window;
        let failures = self
            .repo
            .count_for_ip(SecurityEventType::LoginFailed.as_str(), ip, since)
            .await?;

        let raised = self
            .repo
            .count_for_ip(SecurityEventType::BruteForceSuspected.as_str(), ip, since)
            .await?;

        if !should_escalate(failures, self.failed_login_threshold, raised) {
            return Ok(false);
        }

        self.record(
            NewSecurityEvent::new(SecurityEventType::BruteForceSuspected)
                .severity(SecuritySeverity::High)
                .ip(ip)
                .details(serde_json::json!({
                    "failed_logins": failures,
                    "window_secs": self.failed_login_window.num_seconds(),
                    "last_email": email,
                })),
        )
        .await?;
        Ok(true)
    }

    pub async fn recent_events(
        &self,
        limit: i64,
        min_severity: SecuritySeverity,
    ) -> AppResult<Vec<SecurityEvent>> {
        Ok(self.repo.recent(limit.clamp(1, 500), min_severity).await?)
    }

    pub async fn events_for_ip(&self, ip: &str, since: DateTime<Utc>) -> AppResult<Vec<SecurityEvent>> {
        Ok(self.repo.for_ip(ip, since).await?)
    }

    pub async fn summary(&self, since: DateTime<Utc>) -> AppResult<SecuritySummary> {
        let by_type = self.repo.counts_by_type(since).await?;
        let total = by_type.iter().map(|c| c.count).sum();
        Ok(SecuritySummary {
            since,
            total,
            by_type,
        })
    }
}

/// True once per threshold crossed: failures may jump past an exact
/// multiple when logins fail concurrently
fn should_escalate(failures: i64, threshold: i64, raised: i64) -> bool {
    failures >= threshold && failures / threshold > raised
}
