use crate::error::{AppError, AppResult, RepositoryError};
use crate::models::{
    AttemptStatus, Difficulty, LeaderboardEntry, PublicQuiz, QuizAttempt, QuizDetail, QuizSummary,
    SubmittedAnswer, TransactionKind,
};
use crate::repositories::{AttemptRepository, QuizRepository, WalletChange, WalletRepository};
use crate::transaction::TransactionManager;
use crate::websocket::WsHub;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// One submitted answer after grading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GradedAnswer {
    pub question_id: Uuid,
    pub answer_id: Uuid,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grade {
    pub answers: Vec<GradedAnswer>,
    pub correct: i32,
    pub total_questions: i32,
}

/// Outcome returned to the player after submitting
#[derive(Debug, Clone, Serialize)]
pub struct AttemptResult {
    pub attempt: QuizAttempt,
    pub correct: i32,
    pub total_questions: i32,
    pub reward: Decimal,
    pub expired: bool,
    pub answers: Vec<GradedAnswer>,
}

/// Grade answers against a quiz; each question may be answered at most once
pub fn grade_submission(detail: &QuizDetail, submitted: &[SubmittedAnswer]) -> AppResult<Grade> {
    // question id -> (answer id -> is_correct)
    let key: HashMap<Uuid, HashMap<Uuid, bool>> = detail
        .questions
        .iter()
        .map(|q| {
            (
                q.question.id,
                q.answers.iter().map(|a| (a.id, a.is_correct)).collect(),
            )
        })
        .collect();

    let mut seen = HashSet::new();
    let mut answers = Vec::with_capacity(submitted.len());
    for answer in submitted {
        let options = key.get(&answer.question_id).ok_or_else(|| {
            AppError::Validation(format!("Unknown question {}", answer.question_id))
        })?;
        if !seen.insert(answer.question_id) {
            return Err(AppError::Validation(format!(
                "Question {} answered more than once",
                answer.question_id
            )));
        }
        let is_correct = *options.get(&answer.answer_id).ok_or_else(|| {
            AppError::Validation(format!(
                "Answer {} does not belong to question {}",
                answer.answer_id, answer.question_id
            ))
        })?;

        answers.push(GradedAnswer {
            question_id: answer.question_id,
            answer_id: answer.answer_id,
            is_correct,
        });
    }

    let correct = answers.iter().filter(|a| a.is_correct).count() as i32;
    Ok(Grade {
        answers,
        correct,
        total_questions: detail.questions.len() as i32,
    })
}

pub fn compute_reward(correct: i32, reward_per_correct: Decimal) -> Decimal {
    if correct <= 0 {
        return Decimal::ZERO;
    }
    Decimal::from(correct) * reward_per_correct
}

/// Whether an attempt started at `started_at` is past the quiz time limit
pub fn is_expired(started_at: DateTime<Utc>, time_limit_secs: Option<i32>, now: DateTime<Utc>) -> bool {
    match time_limit_secs {
        Some(limit) if limit > 0 => now > started_at + Duration::seconds(i64::from(limit)),
        _ => false,
    }
}

/// Service for browsing quizzes and taking attempts
pub struct QuizService {
    pool: PgPool,
    quiz_repo: Arc<QuizRepository>,
    attempt_repo: Arc<AttemptRepository>,
    wallet_repo: Arc<WalletRepository>,
    transactions: Arc<TransactionManager>,
    hub: Arc<WsHub>,
}

impl QuizService {
    pub fn new(
        pool: PgPool,
        quiz_repo: Arc<QuizRepository>,
        attempt_repo: Arc<AttemptRepository>,
        wallet_repo: Arc<WalletRepository>,
        transactions: Arc<TransactionManager>,
        hub: Arc<WsHub>,
    ) -> Self {
        Self {
            pool,
            quiz_repo,
            attempt_repo,
            wallet_repo,
            transactions,
            hub,
        }
    }

    pub async fn list_published(
        &self,
        category: Option<&str>,
        difficulty: Option<Difficulty>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<QuizSummary>> {
        let quizzes = self
            .quiz_repo
            .list_published(
                category,
                difficulty.map(|d| d.as_str()),
                limit.clamp(1, 100),
                offset.max(0),
            )
            .await?;
        Ok(quizzes)
    }

    async fn published_detail(&self, quiz_id: Uuid) -> AppResult<QuizDetail> {
        self.quiz_repo
            .find_detail(quiz_id)
            .await?
            .filter(|detail| detail.quiz.is_published)
            .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", quiz_id)))
    }

    /// Player view of a published quiz, without correct flags
    pub async fn get_public_quiz(&self, quiz_id: Uuid) -> AppResult<PublicQuiz> {
        Ok(self.published_detail(quiz_id).await?.into())
    }

    /// Start (or resume) the user's attempt at a published quiz
    pub async fn start_attempt(&self, user_id: Uuid, quiz_id: Uuid) -> AppResult<QuizAttempt> {
        let detail = self.published_detail(quiz_id).await?;
        if detail.questions.is_empty() {
            return Err(AppError::BusinessLogic("Quiz has no questions".to_string()));
        }

        if let Some(open) = self.attempt_repo.find_open(user_id, quiz_id).await? {
            return Ok(open);
        }

        let attempt = match self
            .attempt_repo
            .create(user_id, quiz_id, detail.questions.len() as i32)
            .await
        {
            Ok(attempt) => attempt,
            // A concurrent request opened the attempt first
            Err(RepositoryError::Duplicate(_)) => {
                return self
                    .attempt_repo
                    .find_open(user_id, quiz_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Conflict("Attempt could not be started, please retry".to_string())
                    });
            }
            Err(e) => return Err(e.into()),
        };
        info!("User {} started attempt {} on quiz {}", user_id, attempt.id, quiz_id);
        Ok(attempt)
    }

    /// Grade an attempt, close it and credit the reward in one transaction
    pub async fn submit_attempt(
        &self,
        user_id: Uuid,
        attempt_id: Uuid,
        submitted: &[SubmittedAnswer],
    ) -> AppResult<AttemptResult> {
        let attempt = self
            .attempt_repo
            .find_by_id(attempt_id)
            .await?
            .filter(|a| a.user_id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("Attempt {} not found", attempt_id)))?;
        if !attempt.is_open() {
            return Err(AppError::Conflict("Attempt has already been submitted".to_string()));
        }

        let detail = self
            .quiz_repo
            .find_detail(attempt.quiz_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", attempt.quiz_id)))?;

        let grade = grade_submission(&detail, submitted)?;
        let expired = is_expired(attempt.started_at, detail.quiz.time_limit_secs, Utc::now());
        let reward = if expired {
            Decimal::ZERO
        } else {
            compute_reward(grade.correct, detail.quiz.reward_per_correct)
        };
        let status = if expired {
            AttemptStatus::Expired
        } else {
            AttemptStatus::Completed
        };

        let reference = attempt_id.to_string();
        let reference = reference.as_str();
        let graded = &grade.answers;
        let score = grade.correct;
        let pool = &self.pool;
        let attempt_repo = &self.attempt_repo;
        let wallet_repo = &self.wallet_repo;

        let (finished, balance) = self
            .transactions
            .run_in_transaction(pool, "submit_attempt", move |mut tx| async move {
                let locked = attempt_repo.lock_for_update(&mut tx, attempt_id).await?;
                if !locked.is_open() {
                    return Err(AppError::Conflict(
                        "Attempt has already been submitted".to_string(),
                    ));
                }

                for answer in graded.iter() {
                    attempt_repo
                        .record_answer(
                            &mut tx,
                            attempt_id,
                            answer.question_id,
                            answer.answer_id,
                            answer.is_correct,
                        )
                        .await?;
                }
                let finished = attempt_repo
                    .finish(&mut tx, attempt_id, status, score, reward)
                    .await?;

                let balance = if reward > Decimal::ZERO {
                    let change = WalletChange {
                        user_id,
                        amount: reward,
                        kind: TransactionKind::QuizReward,
                        reference: Some(reference),
                        description: Some("Quiz reward"),
                    };
                    let (wallet, _) = wallet_repo.apply_change(&mut tx, &change).await?;
                    Some(wallet.balance)
                } else {
                    None
                };

                Ok::<_, AppError>((tx, (finished, balance)))
            })
            .await?;

        info!(
            "Attempt {} {} with {}/{} correct, reward {}",
            attempt_id,
            status.as_str(),
            grade.correct,
            grade.total_questions,
            reward
        );

        if let Some(balance) = balance {
            self.hub
                .notify_user(
                    user_id,
                    "wallet_credited",
                    serde_json::json!({
                        "amount": reward,
                        "balance": balance,
                        "reason": "quiz_reward",
                        "attempt_id": attempt_id,
                    }),
                )
                .await;
        }

        Ok(AttemptResult {
            attempt: finished,
            correct: grade.correct,
            total_questions: grade.total_questions,
            reward,
            expired,
            answers: grade.answers,
        })
    }

    pub async fn attempt_history(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<QuizAttempt>> {
        Ok(self
            .attempt_repo
            .list_for_user(user_id, limit.clamp(1, 100))
            .await?)
    }

    pub async fn leaderboard(&self, quiz_id: Uuid, limit: i64) -> AppResult<Vec<LeaderboardEntry>> {
        self.published_detail(quiz_id).await?;
        Ok(self
            .attempt_repo
            .leaderboard(quiz_id, limit.clamp(1, 100))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Answer, Question, QuestionWithAnswers, Quiz};
    use std::str::FromStr;

    struct Fixture {
        detail: QuizDetail,
        /// (question id, correct answer id, wrong answer id)
        questions: Vec<(Uuid, Uuid, Uuid)>,
    }

    fn fixture(question_count: usize) -> Fixture {
        let quiz_id = Uuid::new_v4();
        let mut questions = Vec::new();
        let mut ids = Vec::new();
        for position in 0..question_count {
            let question_id = Uuid::new_v4();
            let right = Uuid::new_v4();
            let wrong = Uuid::new_v4();
            ids.push((question_id, right, wrong));
            questions.push(QuestionWithAnswers {
                question: Question {
                    id: question_id,
                    quiz_id,
                    prompt: format!("Question {}", position + 1),
                    position: position as i32,
                    points: 1,
                },
                answers: vec![
                    Answer {
                        id: right,
                        question_id,
                        text: "right".to_string(),
                        is_correct: true,
                    },
                    Answer {
                        id: wrong,
                        question_id,
                        text: "wrong".to_string(),
                        is_correct: false,
                    },
                ],
            });
        }

        let now = Utc::now();
        Fixture {
            detail: QuizDetail {
                quiz: Quiz {
                    id: quiz_id,
                    title: "General knowledge".to_string(),
                    description: None,
                    category: "general".to_string(),
                    difficulty: "easy".to_string(),
                    reward_per_correct: Decimal::from_str("2.50").unwrap(),
                    time_limit_secs: Some(60),
                    is_published: true,
                    created_by: Uuid::new_v4(),
                    created_at: now,
                    updated_at: now,
                },
                questions,
            },
            questions: ids,
        }
    }

    #[test]
    fn test_grading_counts_correct_answers() {
        let f = fixture(3);
        let submitted = vec![
            SubmittedAnswer {
                question_id: f.questions[0].0,
                answer_id: f.questions[0].1,
            },
            SubmittedAnswer {
                question_id: f.questions[1].0,
                answer_id: f.questions[1].2,
            },
            SubmittedAnswer {
                question_id: f.questions[2].0,
                answer_id: f.questions[2].1,
            },
        ];

        let grade = grade_submission(&f.detail, &submitted).unwrap();
        assert_eq!(grade.correct, 2);
        assert_eq!(grade.total_questions, 3);
        assert!(!grade.answers[1].is_correct);
    }

    #[test]
    fn test_unanswered_questions_score_nothing() {
        let f = fixture(4);
        let submitted = vec![SubmittedAnswer {
            question_id: f.questions[3].0,
            answer_id: f.questions[3].1,
        }];
        let grade = grade_submission(&f.detail, &submitted).unwrap();
        assert_eq!(grade.correct, 1);
        assert_eq!(grade.total_questions, 4);
    }

    #[test]
    fn test_duplicate_question_is_rejected() {
        let f = fixture(2);
        let answer = SubmittedAnswer {
            question_id: f.questions[0].0,
            answer_id: f.questions[0].1,
        };
        let err = grade_submission(&f.detail, &[answer, answer]).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_unknown_ids_are_rejected() {
        let f = fixture(2);
        let unknown_question = SubmittedAnswer {
            question_id: Uuid::new_v4(),
            answer_id: f.questions[0].1,
        };
        assert!(grade_submission(&f.detail, &[unknown_question]).is_err());

        // Answer from a different question
        let crossed = SubmittedAnswer {
            question_id: f.questions[0].0,
            answer_id: f.questions[1].1,
        };
        let err = grade_submission(&f.detail, &[crossed]).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_reward_computation() {
        let per = Decimal::from_str("2.50").unwrap();
        assert_eq!(compute_reward(4, per), Decimal::from_str("10.00").unwrap());
        assert_eq!(compute_reward(0, per), Decimal::ZERO);
        assert_eq!(compute_reward(-1, per), Decimal::ZERO);
    }

    #[test]
    fn test_expiry() {
        let started = Utc::now() - Duration::seconds(90);
        let now = Utc::now();
        assert!(is_expired(started, Some(60), now));
        assert!(!is_expired(started, Some(120), now));
        assert!(!is_expired(started, None, now));
        assert!(!is_expired(started, Some(0), now));
    }
}
