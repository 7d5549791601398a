//! Timeout and retry wrapper for multi-step database operations.
//!
//! Each attempt is raced against a deadline. Failures are classified as
//! retryable (transient connection trouble, serialization conflicts) or
//! fatal; retryable failures are retried with capped exponential backoff.

use crate::config::TransactionConfig;
use crate::database::DatabaseError;
use crate::error::AppError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use tokio::time::error::Elapsed;
use tracing::{debug, warn};

/// How a failed attempt should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    Fatal,
}

/// Implemented by error types the manager can classify
pub trait RetryClassify {
    fn classify(&self) -> RetryClass;
}

/// SQLSTATE codes worth another attempt
const RETRYABLE_SQLSTATES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "57P01", // admin_shutdown
    "53300", // too_many_connections
];

const TRANSIENT_MESSAGE_MARKERS: &[&str] = &[
    "connection reset",
    "connection refused",
    "connection closed",
    "broken pipe",
    "timeout",
    "timed out",
    "network",
    "econnreset",
];

fn is_transient_message(message: &str) -> bool {
    let message = message.to_lowercase();
    TRANSIENT_MESSAGE_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

impl RetryClassify for sqlx::Error {
    fn classify(&self) -> RetryClass {
        match self {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Protocol(_) => RetryClass::Retryable,
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
                // Class 08: connection exception
                if code.starts_with("08") || RETRYABLE_SQLSTATES.contains(&code.as_str()) {
                    RetryClass::Retryable
                } else {
                    RetryClass::Fatal
                }
            }
            other => {
                if is_transient_message(&other.to_string()) {
                    RetryClass::Retryable
                } else {
                    RetryClass::Fatal
                }
            }
        }
    }
}

impl RetryClassify for AppError {
    fn classify(&self) -> RetryClass {
        match self {
            AppError::Sqlx(e) => e.classify(),
            AppError::Database(DatabaseError::QueryError(e)) => e.classify(),
            AppError::Database(DatabaseError::ConnectionTimeout) | AppError::Timeout(_) => {
                RetryClass::Retryable
            }
            _ => RetryClass::Fatal,
        }
    }
}

/// Terminal failure of a managed operation
#[derive(Error, Debug)]
pub enum TransactionError<E>
where
    E: std::error::Error + 'static,
{
    /// Every attempt ran past its deadline
    #[error("{label} timed out after {attempts} attempt(s)")]
    Timeout { label: String, attempts: u32 },

    /// Retryable failures continued past the retry budget
    #[error("{label} failed after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        label: String,
        attempts: u32,
        #[source]
        last: E,
    },

    /// Non-retryable failure, returned as soon as it happened
    #[error("{0}")]
    Fatal(#[source] E),
}

impl From<TransactionError<AppError>> for AppError {
    fn from(err: TransactionError<AppError>) -> Self {
        match err {
            TransactionError::Timeout { label, attempts } => {
                AppError::Timeout(format!("{} ({} attempts)", label, attempts))
            }
            TransactionError::RetriesExhausted { last, .. } => last,
            TransactionError::Fatal(e) => e,
        }
    }
}

enum Attempt<T> {
    Done(T),
    Retry(Duration),
}

/// Runs operations with a per-attempt timeout and bounded retries
#[derive(Debug, Clone)]
pub struct TransactionManager {
    timeout: Duration,
    max_retries: u32,
    base_backoff: Duration,
    max_backoff: Duration,
}

impl TransactionManager {
    pub fn new(config: &TransactionConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_retries: config.max_retries,
            base_backoff: config.base_backoff(),
            max_backoff: config.max_backoff(),
        }
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`, capped
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let delay = self.base_backoff.saturating_mul(1u32 << exponent);
        delay.min(self.max_backoff)
    }

    /// Total attempts the manager will make, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Run `op` until it succeeds, fails fatally, or the retry budget runs out
    ///
    /// `op` is invoked once per attempt and must produce a fresh future each
    /// time; any database transaction it opens is dropped (rolled back) when
    /// the attempt times out.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, TransactionError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClassify + Display + std::error::Error + 'static,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = tokio::time::timeout(self.timeout, op()).await;
            match self.settle(label, attempt, outcome)? {
                Attempt::Done(value) => return Ok(value),
                Attempt::Retry(delay) => tokio::time::sleep(delay).await,
            }
        }
    }

    /// Run `op` inside a fresh Postgres transaction per attempt
    ///
    /// `op` receives the open transaction and hands it back with its result;
    /// the manager commits it. An error from `op` drops the transaction,
    /// which rolls it back, and a failed commit is classified like any other
    /// attempt failure.
    pub async fn run_in_transaction<T, E, F, Fut>(
        &self,
        pool: &PgPool,
        label: &str,
        mut op: F,
    ) -> Result<T, TransactionError<E>>
    where
        F: FnMut(Transaction<'static, Postgres>) -> Fut,
        Fut: Future<Output = Result<(Transaction<'static, Postgres>, T), E>>,
        E: RetryClassify + Display + std::error::Error + From<sqlx::Error> + 'static,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = tokio::time::timeout(self.timeout, async {
                let tx = pool.begin().await?;
                let (tx, value) = op(tx).await?;
                tx.commit().await?;
                Ok::<T, E>(value)
            })
            .await;
            match self.settle(label, attempt, outcome)? {
                Attempt::Done(value) => return Ok(value),
                Attempt::Retry(delay) => tokio::time::sleep(delay).await,
            }
        }
    }

    /// Decide what follows attempt number `attempt`
    fn settle<T, E>(
        &self,
        label: &str,
        attempt: u32,
        outcome: Result<Result<T, E>, Elapsed>,
    ) -> Result<Attempt<T>, TransactionError<E>>
    where
        E: RetryClassify + Display + std::error::Error + 'static,
    {
        let max_attempts = self.max_attempts();
        let failure = match outcome {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", label, attempt);
                }
                return Ok(Attempt::Done(value));
            }
            Ok(Err(err)) => match err.classify() {
                RetryClass::Fatal => return Err(TransactionError::Fatal(err)),
                RetryClass::Retryable => Some(err),
            },
            // Timed-out attempts are retryable
            Err(_) => None,
        };

        if attempt >= max_attempts {
            return Err(match failure {
                Some(last) => {
                    warn!("{} exhausted {} attempts: {}", label, attempt, last);
                    TransactionError::RetriesExhausted {
                        label: label.to_string(),
                        attempts: attempt,
                        last,
                    }
                }
                None => {
                    warn!("{} timed out on all {} attempts", label, attempt);
                    TransactionError::Timeout {
                        label: label.to_string(),
                        attempts: attempt,
                    }
                }
            });
        }

        let delay = self.backoff_for(attempt);
        match &failure {
            Some(err) => warn!(
                "{} attempt {}/{} failed ({}), retrying in {:?}",
                label, attempt, max_attempts, err, delay
            ),
            None => warn!(
                "{} attempt {}/{} timed out after {:?}, retrying in {:?}",
                label, attempt, max_attempts, self.timeout, delay
            ),
        }
        Ok(Attempt::Retry(delay))
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(&TransactionConfig::default())
    }
}
