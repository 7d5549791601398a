//! Repository for quizzes, their questions and answer options

use crate::error::RepositoryError;
use crate::models::{Answer, Question, QuestionWithAnswers, Quiz, QuizDetail, QuizSummary};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Result as SqlxResult};
use std::collections::HashMap;
use uuid::Uuid;

const QUIZ_COLUMNS: &str = "id, title, description, category, difficulty, reward_per_correct, \
                            time_limit_secs, is_published, created_by, created_at, updated_at";

/// Quiz header fields shared by insert and update
pub struct QuizFields<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub category: &'a str,
    pub difficulty: &'a str,
    pub reward_per_correct: Decimal,
    pub time_limit_secs: Option<i32>,
}

pub struct QuizRepository {
    pool: PgPool,
}

impl QuizRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Writes (run on the caller's transaction)
    // =========================================================================

    pub async fn insert_quiz(
        &self,
        conn: &mut PgConnection,
        fields: &QuizFields<'_>,
        created_by: Uuid,
    ) -> Result<Quiz, RepositoryError> {
        let quiz = sqlx::query_as::<_, Quiz>(&format!(
            r#"
            INSERT INTO quizzes (title, description, category, difficulty, reward_per_correct, time_limit_secs, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {QUIZ_COLUMNS}
            "#
        ))
        .bind(fields.title)
        .bind(fields.description)
        .bind(fields.category)
        .bind(fields.difficulty)
        .bind(fields.reward_per_correct)
        .bind(fields.time_limit_secs)
        .bind(created_by)
        .fetch_one(&mut *conn)
        .await?;

        Ok(quiz)
    }

    pub async fn update_quiz(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        fields: &QuizFields<'_>,
    ) -> Result<Quiz, RepositoryError> {
        let quiz = sqlx::query_as::<_, Quiz>(&format!(
            r#"
            UPDATE quizzes
            SET title = $2, description = $3, category = $4, difficulty = $5,
                reward_per_correct = $6, time_limit_secs = $7, updated_at = NOW()
            WHERE id = $1
            RETURNING {QUIZ_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(fields.title)
        .bind(fields.description)
        .bind(fields.category)
        .bind(fields.difficulty)
        .bind(fields.reward_per_correct)
        .bind(fields.time_limit_secs)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Quiz {} not found", id)))?;

        Ok(quiz)
    }

    pub async fn insert_question(
        &self,
        conn: &mut PgConnection,
        quiz_id: Uuid,
        prompt: &str,
        position: i32,
        points: i32,
    ) -> Result<Question, RepositoryError> {
        let question = sqlx::query_as::<_, Question>(
            r#"
            INSERT INTO questions (quiz_id, prompt, position, points)
            VALUES ($1, $2, $3, $4)
            RETURNING id, quiz_id, prompt, position, points
            "#,
        )
        .bind(quiz_id)
        .bind(prompt)
        .bind(position)
        .bind(points)
        .fetch_one(&mut *conn)
        .await?;

        Ok(question)
    }

    pub async fn insert_answer(
        &self,
        conn: &mut PgConnection,
        question_id: Uuid,
        text: &str,
        is_correct: bool,
    ) -> Result<Answer, RepositoryError> {
        let answer = sqlx::query_as::<_, Answer>(
            r#"
            INSERT INTO answers (question_id, text, is_correct)
            VALUES ($1, $2, $3)
            RETURNING id, question_id, text, is_correct
            "#,
        )
        .bind(question_id)
        .bind(text)
        .bind(is_correct)
        .fetch_one(&mut *conn)
        .await?;

        Ok(answer)
    }

    /// Remove every question (answers cascade) before a full replacement
    ///
    /// Only valid while no attempt references the quiz.
    pub async fn delete_questions(
        &self,
        conn: &mut PgConnection,
        quiz_id: Uuid,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM questions WHERE quiz_id = $1")
            .bind(quiz_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn set_published(&self, id: Uuid, published: bool) -> Result<Quiz, RepositoryError> {
        let quiz = sqlx::query_as::<_, Quiz>(&format!(
            "UPDATE quizzes SET is_published = $2, updated_at = NOW() WHERE id = $1 RETURNING {QUIZ_COLUMNS}"
        ))
        .bind(id)
        .bind(published)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Quiz {} not found", id)))?;

        Ok(quiz)
    }

    /// Take the quiz row lock; new attempts wait until the caller commits
    pub async fn lock_for_update(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Quiz, RepositoryError> {
        let quiz = sqlx::query_as::<_, Quiz>(&format!(
            "SELECT {QUIZ_COLUMNS} FROM quizzes WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Quiz {} not found", id)))?;

        Ok(quiz)
    }

    pub async fn delete(&self, conn: &mut PgConnection, id: Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM quizzes WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Quiz {} not found", id)));
        }
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn find_by_id(&self, id: Uuid) -> SqlxResult<Option<Quiz>> {
        sqlx::query_as::<_, Quiz>(&format!("SELECT {QUIZ_COLUMNS} FROM quizzes WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Quiz with questions in position order and their answers
    pub async fn find_detail(&self, id: Uuid) -> SqlxResult<Option<QuizDetail>> {
        let Some(quiz) = self.find_by_id(id).await? else {
            return Ok(None);
        };

        let questions = sqlx::query_as::<_, Question>(
            r#"
            SELECT id, quiz_id, prompt, position, points
            FROM questions
            WHERE quiz_id = $1
            ORDER BY position
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let answers = sqlx::query_as::<_, Answer>(
            r#"
            SELECT a.id, a.question_id, a.text, a.is_correct
            FROM answers a
            JOIN questions q ON q.id = a.question_id
            WHERE q.quiz_id = $1
            ORDER BY a.id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_question: HashMap<Uuid, Vec<Answer>> = HashMap::new();
        for answer in answers {
            by_question.entry(answer.question_id).or_default().push(answer);
        }

        let questions = questions
            .into_iter()
            .map(|question| QuestionWithAnswers {
                answers: by_question.remove(&question.id).unwrap_or_default(),
                question,
            })
            .collect();

        Ok(Some(QuizDetail { quiz, questions }))
    }

    /// Published quizzes, optionally filtered by category and difficulty
    pub async fn list_published(
        &self,
        category: Option<&str>,
        difficulty: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> SqlxResult<Vec<QuizSummary>> {
        sqlx::query_as::<_, QuizSummary>(
            r#"
            SELECT z.id, z.title, z.description, z.category, z.difficulty,
                   z.reward_per_correct, z.time_limit_secs,
                   COUNT(q.id) AS question_count
            FROM quizzes z
            LEFT JOIN questions q ON q.quiz_id = z.id
            WHERE z.is_published = TRUE
              AND ($1::TEXT IS NULL OR z.category = $1)
              AND ($2::TEXT IS NULL OR z.difficulty = $2)
            GROUP BY z.id
            ORDER BY z.created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(category)
        .bind(difficulty)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn count(&self) -> SqlxResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM quizzes")
            .fetch_one(&self.pool)
            .await
    }
}
