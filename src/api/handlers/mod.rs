pub mod admin;
pub mod auth;
pub mod health;
pub mod prizes;
pub mod quizzes;
pub mod wallet;

use serde::Deserialize;

/// `?limit=&offset=` with defaults
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

