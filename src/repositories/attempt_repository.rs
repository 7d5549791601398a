use crate::error::RepositoryError;
use crate::models::{AttemptStatus, LeaderboardEntry, QuizAttempt};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Result as SqlxResult};
use uuid::Uuid;

const ATTEMPT_COLUMNS: &str = "id, user_id, quiz_id, status, score, total_questions, \
                               reward_amount, started_at, completed_at";

/// Repository for quiz attempts and their graded answers
pub struct AttemptRepository {
    pool: PgPool,
}

impl AttemptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        quiz_id: Uuid,
        total_questions: i32,
    ) -> Result<QuizAttempt, RepositoryError> {
        let attempt = sqlx::query_as::<_, QuizAttempt>(&format!(
            r#"
            INSERT INTO quiz_attempts (user_id, quiz_id, total_questions)
            VALUES ($1, $2, $3)
            RETURNING {ATTEMPT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(quiz_id)
        .bind(total_questions)
        .fetch_one(&self.pool)
        .await?;

        Ok(attempt)
    }

    pub async fn find_by_id(&self, id: Uuid) -> SqlxResult<Option<QuizAttempt>> {
        sqlx::query_as::<_, QuizAttempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// The user's in-progress attempt for a quiz, if any
    pub async fn find_open(&self, user_id: Uuid, quiz_id: Uuid) -> SqlxResult<Option<QuizAttempt>> {
        sqlx::query_as::<_, QuizAttempt>(&format!(
            r#"
            SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts
            WHERE user_id = $1 AND quiz_id = $2 AND status = 'in_progress'
            ORDER BY started_at DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Lock the attempt row for grading
    pub async fn lock_for_update(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<QuizAttempt, RepositoryError> {
        let attempt = sqlx::query_as::<_, QuizAttempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Attempt {} not found", id)))?;

        Ok(attempt)
    }

    pub async fn record_answer(
        &self,
        conn: &mut PgConnection,
        attempt_id: Uuid,
        question_id: Uuid,
        answer_id: Uuid,
        is_correct: bool,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO attempt_answers (attempt_id, question_id, answer_id, is_correct)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(attempt_id)
        .bind(question_id)
        .bind(answer_id)
        .bind(is_correct)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn finish(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        status: AttemptStatus,
        score: i32,
        reward_amount: Decimal,
    ) -> Result<QuizAttempt, RepositoryError> {
        let attempt = sqlx::query_as::<_, QuizAttempt>(&format!(
            r#"
            UPDATE quiz_attempts
            SET status = $2, score = $3, reward_amount = $4, completed_at = NOW()
            WHERE id = $1
            RETURNING {ATTEMPT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(score)
        .bind(reward_amount)
        .fetch_one(&mut *conn)
        .await?;

        Ok(attempt)
    }

    pub async fn list_for_user(&self, user_id: Uuid, limit: i64) -> SqlxResult<Vec<QuizAttempt>> {
        sqlx::query_as::<_, QuizAttempt>(&format!(
            r#"
            SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts
            WHERE user_id = $1
            ORDER BY started_at DESC
            LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Best completed score per user, earliest completion breaking ties
    pub async fn leaderboard(&self, quiz_id: Uuid, limit: i64) -> SqlxResult<Vec<LeaderboardEntry>> {
        sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT user_id, display_name, best_score, completed_at FROM (
                SELECT DISTINCT ON (a.user_id)
                       a.user_id, u.display_name, a.score AS best_score, a.completed_at
                FROM quiz_attempts a
                JOIN users u ON u.id = a.user_id
                WHERE a.quiz_id = $1 AND a.status = 'completed' AND a.completed_at IS NOT NULL
                ORDER BY a.user_id, a.score DESC, a.completed_at ASC
            ) best
            ORDER BY best_score DESC, completed_at ASC
            LIMIT $2
            "#,
        )
        .bind(quiz_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Attempts of any status recorded against a quiz
    pub async fn count_for_quiz(
        &self,
        conn: &mut PgConnection,
        quiz_id: Uuid,
    ) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM quiz_attempts WHERE quiz_id = $1")
            .bind(quiz_id)
            .fetch_one(&mut *conn)
            .await?;

        Ok(count)
    }

    pub async fn count_started_since(&self, since: DateTime<Utc>) -> SqlxResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM quiz_attempts WHERE started_at >= $1")
            .bind(since)
            .fetch_one(&self.pool)
            .await
    }
}
