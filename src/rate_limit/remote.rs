//! Remote atomic counter store speaking the Upstash Redis REST protocol

use super::store::{Hit, RateLimitStore, StoreError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Deserialize)]
struct PipelineReply {
    result: Option<serde_json::Value>,
    error: Option<String>,
}

/// Fixed-window counters kept in a remote Redis behind a REST endpoint
///
/// `INCR` is atomic on the server, so concurrent instances share one count.
pub struct RemoteCounterStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl RemoteCounterStore {
    pub fn new(base_url: &str, token: &str) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Key for the fixed window containing `now`, plus time left in that window
    pub fn window_key(key: &str, window: Duration, now: Duration) -> (String, Duration) {
        let window_ms = window.as_millis().max(1);
        let now_ms = now.as_millis();
        let index = now_ms / window_ms;
        let remaining_ms = window_ms - (now_ms % window_ms);
        (
            format!("{}:{}", key, index),
            Duration::from_millis(remaining_ms as u64),
        )
    }

    fn parse_count(replies: &[PipelineReply]) -> Result<u64, StoreError> {
        let first = replies
            .first()
            .ok_or_else(|| StoreError::Protocol("empty pipeline reply".to_string()))?;

        if let Some(err) = &first.error {
            return Err(StoreError::Protocol(err.clone()));
        }

        first
            .result
            .as_ref()
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .ok_or_else(|| StoreError::Protocol("INCR did not return an integer".to_string()))
    }
}

#[async_trait]
impl RateLimitStore for RemoteCounterStore {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn hit(&self, key: &str, window: Duration) -> Result<Hit, StoreError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let (window_key, reset_after) = Self::window_key(key, window, now);
        let ttl_secs = window.as_secs().max(1).to_string();

        let replies: Vec<PipelineReply> = self
            .client
            .post(format!("{}/pipeline", self.base_url))
            .bearer_auth(&self.token)
            .json(&json!([
                ["INCR", window_key],
                ["EXPIRE", window_key, ttl_secs, "NX"]
            ]))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(Hit {
            count: Self::parse_count(&replies)?,
            reset_after,
        })
    }

    async fn cleanup(&self, _older_than: Duration) -> Result<u64, StoreError> {
        // Keys carry their own TTL
        Ok(0)
    }
}
