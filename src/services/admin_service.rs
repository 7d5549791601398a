use crate::error::{AppError, AppResult};
use crate::models::{QuizDetail, QuizDraft, SessionKind, User};
use crate::repositories::{
    AttemptRepository, PrizeRepository, QuizFields, QuizRepository, SessionRepository,
    UserRepository, WalletRepository,
};
use crate::transaction::TransactionManager;
use crate::websocket::{AdminUpdate, Channel, WsHub};
use chrono::{Timelike, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_TITLE_LEN: usize = 200;
const MAX_QUESTIONS: usize = 100;

/// Reject drafts that players could not answer sensibly
pub fn validate_quiz_draft(draft: &QuizDraft) -> AppResult<()> {
    let title = draft.title.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::Validation(format!(
            "Title must be 1 to {} characters",
            MAX_TITLE_LEN
        )));
    }
    if draft.category.trim().is_empty() {
        return Err(AppError::Validation("Category is required".to_string()));
    }
    if let Some(reward) = draft.reward_per_correct {
        if reward < Decimal::ZERO {
            return Err(AppError::Validation("Reward cannot be negative".to_string()));
        }
    }
    if matches!(draft.time_limit_secs, Some(limit) if limit <= 0) {
        return Err(AppError::Validation("Time limit must be positive".to_string()));
    }
    if draft.questions.is_empty() || draft.questions.len() > MAX_QUESTIONS {
        return Err(AppError::Validation(format!(
            "A quiz needs 1 to {} questions",
            MAX_QUESTIONS
        )));
    }

    for (index, question) in draft.questions.iter().enumerate() {
        let number = index + 1;
        if question.prompt.trim().is_empty() {
            return Err(AppError::Validation(format!("Question {} has no prompt", number)));
        }
        if question.points < 1 {
            return Err(AppError::Validation(format!(
                "Question {} must be worth at least 1 point",
                number
            )));
        }
        if question.answers.len() < 2 {
            return Err(AppError::Validation(format!(
                "Question {} needs at least 2 answers",
                number
            )));
        }
        if question.answers.iter().any(|a| a.text.trim().is_empty()) {
            return Err(AppError::Validation(format!(
                "Question {} has an empty answer",
                number
            )));
        }
        let correct = question.answers.iter().filter(|a| a.is_correct).count();
        if correct != 1 {
            return Err(AppError::Validation(format!(
                "Question {} must have exactly one correct answer (found {})",
                number, correct
            )));
        }
    }
    Ok(())
}

/// True when the draft carries exactly the stored questions, in order, with
/// the same answer options (answer order is not significant)
pub fn same_questions(detail: &QuizDetail, draft: &QuizDraft) -> bool {
    detail.questions.len() == draft.questions.len()
        && detail
            .questions
            .iter()
            .zip(&draft.questions)
            .all(|(stored, drafted)| {
                let mut stored_answers: Vec<(&str, bool)> = stored
                    .answers
                    .iter()
                    .map(|a| (a.text.as_str(), a.is_correct))
                    .collect();
                let mut drafted_answers: Vec<(&str, bool)> = drafted
                    .answers
                    .iter()
                    .map(|a| (a.text.trim(), a.is_correct))
                    .collect();
                stored_answers.sort_unstable();
                drafted_answers.sort_unstable();

                stored.question.prompt == drafted.prompt.trim()
                    && stored.question.points == drafted.points
                    && stored_answers == drafted_answers
            })
}

/// Headline numbers for the admin dashboard
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub users: i64,
    pub quizzes: i64,
    pub attempts_today: i64,
    pub total_balance: Decimal,
    pub pending_redemptions: i64,
    pub admins_online: usize,
}

/// Service behind the admin surface: quiz management, users, dashboard
pub struct AdminService {
    pool: PgPool,
    user_repo: Arc<UserRepository>,
    quiz_repo: Arc<QuizRepository>,
    attempt_repo: Arc<AttemptRepository>,
    wallet_repo: Arc<WalletRepository>,
    prize_repo: Arc<PrizeRepository>,
    session_repo: Arc<SessionRepository>,
    transactions: Arc<TransactionManager>,
    hub: Arc<WsHub>,
    default_reward: Decimal,
}

impl AdminService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        user_repo: Arc<UserRepository>,
        quiz_repo: Arc<QuizRepository>,
        attempt_repo: Arc<AttemptRepository>,
        wallet_repo: Arc<WalletRepository>,
        prize_repo: Arc<PrizeRepository>,
        session_repo: Arc<SessionRepository>,
        transactions: Arc<TransactionManager>,
        hub: Arc<WsHub>,
        default_reward: Decimal,
    ) -> Self {
        Self {
            pool,
            user_repo,
            quiz_repo,
            attempt_repo,
            wallet_repo,
            prize_repo,
            session_repo,
            transactions,
            hub,
            default_reward,
        }
    }

    async fn announce_quiz(&self, admin_id: Uuid, quiz_id: Uuid, action: &str, payload: serde_json::Value) {
        for channel in [Channel::AdminDashboard, Channel::AdminQuiz(quiz_id)] {
            let update = AdminUpdate::new(channel, "quiz", Some(quiz_id), action)
                .author(admin_id)
                .payload(payload.clone());
            self.hub.publish_admin_update(update, None).await;
        }
    }

    /// Insert a quiz, or update one in place, in one transaction
    ///
    /// Questions are replaced only while no attempt references the quiz.
    /// Afterwards the header can still change, but the questions must
    /// match what attempts were graded against.
    async fn write_quiz(&self, admin_id: Uuid, existing: Option<Uuid>, draft: &QuizDraft) -> AppResult<QuizDetail> {
        validate_quiz_draft(draft)?;

        let questions_unchanged = match existing {
            Some(id) => same_questions(&self.get_quiz(id).await?, draft),
            None => false,
        };

        let fields = QuizFields {
            title: draft.title.trim(),
            description: draft.description.as_deref(),
            category: draft.category.trim(),
            difficulty: draft.difficulty.as_str(),
            reward_per_correct: draft.reward_per_correct.unwrap_or(self.default_reward),
            time_limit_secs: draft.time_limit_secs,
        };
        let fields = &fields;
        let quiz_repo = &self.quiz_repo;
        let attempt_repo = &self.attempt_repo;
        let label = if existing.is_some() { "update_quiz" } else { "create_quiz" };

        let quiz_id = self
            .transactions
            .run_in_transaction(&self.pool, label, move |mut tx| async move {
                let quiz = match existing {
                    Some(id) => {
                        quiz_repo.lock_for_update(&mut tx, id).await?;
                        let attempts = attempt_repo.count_for_quiz(&mut tx, id).await?;
                        if attempts > 0 && !questions_unchanged {
                            return Err(AppError::Conflict(format!(
                                "Quiz {} has {} attempt(s); its questions can no longer change",
                                id, attempts
                            )));
                        }

                        let quiz = quiz_repo.update_quiz(&mut tx, id, fields).await?;
                        if questions_unchanged {
                            return Ok((tx, quiz.id));
                        }
                        quiz_repo.delete_questions(&mut tx, id).await?;
                        quiz
                    }
                    None => quiz_repo.insert_quiz(&mut tx, fields, admin_id).await?,
                };

                for (position, question) in draft.questions.iter().enumerate() {
                    let stored = quiz_repo
                        .insert_question(
                            &mut tx,
                            quiz.id,
                            question.prompt.trim(),
                            position as i32,
                            question.points,
                        )
                        .await?;
                    for answer in &question.answers {
                        quiz_repo
                            .insert_answer(&mut tx, stored.id, answer.text.trim(), answer.is_correct)
                            .await?;
                    }
                }

                Ok::<_, AppError>((tx, quiz.id))
            })
            .await?;

        self.get_quiz(quiz_id).await
    }

    pub async fn create_quiz(&self, admin_id: Uuid, draft: &QuizDraft) -> AppResult<QuizDetail> {
        let detail = self.write_quiz(admin_id, None, draft).await?;
        info!(
            "Admin {} created quiz {} with {} question(s)",
            admin_id,
            detail.quiz.id,
            detail.questions.len()
        );
        self.announce_quiz(
            admin_id,
            detail.quiz.id,
            "created",
            serde_json::json!({ "title": detail.quiz.title }),
        )
        .await;
        Ok(detail)
    }

    pub async fn update_quiz(&self, admin_id: Uuid, quiz_id: Uuid, draft: &QuizDraft) -> AppResult<QuizDetail> {
        let detail = self.write_quiz(admin_id, Some(quiz_id), draft).await?;
        info!("Admin {} updated quiz {}", admin_id, quiz_id);
        self.announce_quiz(
            admin_id,
            quiz_id,
            "updated",
            serde_json::json!({ "title": detail.quiz.title }),
        )
        .await;
        Ok(detail)
    }

    pub async fn get_quiz(&self, quiz_id: Uuid) -> AppResult<QuizDetail> {
        self.quiz_repo
            .find_detail(quiz_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", quiz_id)))
    }

    pub async fn set_published(&self, admin_id: Uuid, quiz_id: Uuid, published: bool) -> AppResult<QuizDetail> {
        let detail = self.get_quiz(quiz_id).await?;
        if published && detail.questions.is_empty() {
            return Err(AppError::BusinessLogic(
                "Cannot publish a quiz without questions".to_string(),
            ));
        }

        let quiz = self.quiz_repo.set_published(quiz_id, published).await?;
        let action = if published { "published" } else { "unpublished" };
        info!("Admin {} {} quiz {}", admin_id, action, quiz_id);
        self.announce_quiz(
            admin_id,
            quiz_id,
            action,
            serde_json::json!({ "is_published": quiz.is_published }),
        )
        .await;

        Ok(QuizDetail {
            quiz,
            questions: detail.questions,
        })
    }

    /// Delete a quiz nobody has attempted; attempted quizzes can only be unpublished
    pub async fn delete_quiz(&self, admin_id: Uuid, quiz_id: Uuid) -> AppResult<()> {
        let quiz_repo = &self.quiz_repo;
        let attempt_repo = &self.attempt_repo;
        self.transactions
            .run_in_transaction(&self.pool, "delete_quiz", move |mut tx| async move {
                quiz_repo.lock_for_update(&mut tx, quiz_id).await?;
                let attempts = attempt_repo.count_for_quiz(&mut tx, quiz_id).await?;
                if attempts > 0 {
                    return Err(AppError::Conflict(format!(
                        "Quiz {} has {} attempt(s); unpublish it instead",
                        quiz_id, attempts
                    )));
                }
                quiz_repo.delete(&mut tx, quiz_id).await?;
                Ok::<_, AppError>((tx, ()))
            })
            .await?;
        info!("Admin {} deleted quiz {}", admin_id, quiz_id);
        self.announce_quiz(admin_id, quiz_id, "deleted", serde_json::Value::Null)
            .await;
        Ok(())
    }

    pub async fn list_users(&self, limit: i64, offset: i64) -> AppResult<Vec<User>> {
        Ok(self
            .user_repo
            .list(limit.clamp(1, 200), offset.max(0))
            .await?)
    }

    /// Enable or disable an account; disabling revokes its sessions
    pub async fn set_user_active(&self, admin_id: Uuid, user_id: Uuid, active: bool) -> AppResult<User> {
        if admin_id == user_id && !active {
            return Err(AppError::Validation("Admins cannot disable their own account".to_string()));
        }

        let user = self.user_repo.set_active(user_id, active).await?;
        if !active {
            for kind in [SessionKind::User, SessionKind::Admin] {
                match self.session_repo.revoke_all_for_user(kind, user_id).await {
                    Ok(revoked) if revoked > 0 => {
                        info!("Revoked {} {:?} session(s) of {}", revoked, kind, user_id)
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Failed to revoke sessions of {}: {}", user_id, e),
                }
            }
        }

        let action = if active { "activated" } else { "deactivated" };
        info!("Admin {} {} user {}", admin_id, action, user_id);
        let update = AdminUpdate::new(Channel::AdminDashboard, "user", Some(user_id), action)
            .author(admin_id);
        self.hub.publish_admin_update(update, None).await;
        Ok(user)
    }

    pub async fn dashboard_stats(&self) -> AppResult<DashboardStats> {
        let now = Utc::now();
        let start_of_day = now
            .with_hour(0)
            .and_then(|t| t.with_minute(0))
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);

        let (users, quizzes, attempts_today, total_balance, pending_redemptions) = tokio::try_join!(
            async { self.user_repo.count().await.map_err(AppError::from) },
            async { self.quiz_repo.count().await.map_err(AppError::from) },
            async {
                self.attempt_repo
                    .count_started_since(start_of_day)
                    .await
                    .map_err(AppError::from)
            },
            async { self.wallet_repo.total_balance().await.map_err(AppError::from) },
            async { self.prize_repo.count_pending().await.map_err(AppError::from) },
        )?;

        let admins_online = self
            .hub
            .channel_members(&Channel::AdminDashboard.to_string())
            .await
            .len();

        Ok(DashboardStats {
            users,
            quizzes,
            attempts_today,
            total_balance,
            pending_redemptions,
            admins_online,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Answer, AnswerDraft, Difficulty, Question, QuestionDraft, QuestionWithAnswers, Quiz};

    fn answer(text: &str, is_correct: bool) -> AnswerDraft {
        AnswerDraft {
            text: text.to_string(),
            is_correct,
        }
    }

    fn draft() -> QuizDraft {
        QuizDraft {
            title: "European capitals".to_string(),
            description: Some("Warm-up round".to_string()),
            category: "geography".to_string(),
            difficulty: Difficulty::Easy,
            reward_per_correct: None,
            time_limit_secs: Some(120),
            questions: vec![QuestionDraft {
                prompt: "Capital of France?".to_string(),
                points: 1,
                answers: vec![answer("Paris", true), answer("Lyon", false)],
            }],
        }
    }

    fn stored(draft: &QuizDraft) -> QuizDetail {
        let quiz_id = Uuid::new_v4();
        let now = Utc::now();
        let questions = draft
            .questions
            .iter()
            .enumerate()
            .map(|(position, q)| {
                let question_id = Uuid::new_v4();
                QuestionWithAnswers {
                    question: Question {
                        id: question_id,
                        quiz_id,
                        prompt: q.prompt.clone(),
                        position: position as i32,
                        points: q.points,
                    },
                    answers: q
                        .answers
                        .iter()
                        .rev()
                        .map(|a| Answer {
                            id: Uuid::new_v4(),
                            question_id,
                            text: a.text.clone(),
                            is_correct: a.is_correct,
                        })
                        .collect(),
                }
            })
            .collect();

        QuizDetail {
            quiz: Quiz {
                id: quiz_id,
                title: draft.title.clone(),
                description: draft.description.clone(),
                category: draft.category.clone(),
                difficulty: draft.difficulty.as_str().to_string(),
                reward_per_correct: Decimal::ONE,
                time_limit_secs: draft.time_limit_secs,
                is_published: true,
                created_by: Uuid::new_v4(),
                created_at: now,
                updated_at: now,
            },
            questions,
        }
    }

    #[test]
    fn test_same_questions_ignores_header_and_answer_order() {
        let detail = stored(&draft());

        let mut renamed = draft();
        renamed.title = "Capitals, revised".to_string();
        renamed.time_limit_secs = None;
        renamed.questions[0].prompt = "  Capital of France?  ".to_string();
        assert!(same_questions(&detail, &renamed));

        let mut reworded = draft();
        reworded.questions[0].answers[1].text = "Marseille".to_string();
        assert!(!same_questions(&detail, &reworded));

        let mut flipped = draft();
        flipped.questions[0].answers[0].is_correct = false;
        flipped.questions[0].answers[1].is_correct = true;
        assert!(!same_questions(&detail, &flipped));

        let mut extended = draft();
        extended.questions.push(extended.questions[0].clone());
        assert!(!same_questions(&detail, &extended));

        let mut weighted = draft();
        weighted.questions[0].points = 2;
        assert!(!same_questions(&detail, &weighted));
    }

    #[test]
    fn test_valid_draft_passes() {
        assert!(validate_quiz_draft(&draft()).is_ok());
    }

    #[test]
    fn test_question_needs_two_answers() {
        let mut d = draft();
        d.questions[0].answers.truncate(1);
        assert!(validate_quiz_draft(&d).is_err());
    }

    #[test]
    fn test_question_needs_exactly_one_correct_answer() {
        let mut d = draft();
        d.questions[0].answers[1].is_correct = true;
        let err = validate_quiz_draft(&d).unwrap_err();
        assert!(err.to_string().contains("exactly one correct"));

        d.questions[0].answers[0].is_correct = false;
        d.questions[0].answers[1].is_correct = false;
        assert!(validate_quiz_draft(&d).is_err());
    }

    #[test]
    fn test_draft_header_rules() {
        let mut d = draft();
        d.title = "   ".to_string();
        assert!(validate_quiz_draft(&d).is_err());

        let mut d = draft();
        d.questions.clear();
        assert!(validate_quiz_draft(&d).is_err());

        let mut d = draft();
        d.time_limit_secs = Some(0);
        assert!(validate_quiz_draft(&d).is_err());

        let mut d = draft();
        d.reward_per_correct = Some(Decimal::from(-1));
        assert!(validate_quiz_draft(&d).is_err());
    }

    #[test]
    fn test_draft_deserializes_with_default_points() {
        let d: QuizDraft = serde_json::from_str(
            r#"{
                "title": "Space",
                "description": null,
                "category": "science",
                "difficulty": "hard",
                "reward_per_correct": null,
                "time_limit_secs": null,
                "questions": [
                    {"prompt": "Largest planet?", "answers": [
                        {"text": "Jupiter", "is_correct": true},
                        {"text": "Mars", "is_correct": false}
                    ]}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(d.questions[0].points, 1);
        assert_eq!(d.difficulty, Difficulty::Hard);
        assert!(validate_quiz_draft(&d).is_ok());
    }
}
