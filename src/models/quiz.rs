use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Quiz difficulty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(format!("Invalid difficulty: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Quiz {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub difficulty: String,
    pub reward_per_correct: Decimal,
    pub time_limit_secs: Option<i32>,
    pub is_published: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub prompt: String,
    pub position: i32,
    pub points: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Answer {
    pub id: Uuid,
    pub question_id: Uuid,
    pub text: String,
    pub is_correct: bool,
}

/// A question together with all of its answer options
#[derive(Debug, Clone, Serialize)]
pub struct QuestionWithAnswers {
    #[serde(flatten)]
    pub question: Question,
    pub answers: Vec<Answer>,
}

/// Quiz with its full question set (admin view, includes correct flags)
#[derive(Debug, Clone, Serialize)]
pub struct QuizDetail {
    #[serde(flatten)]
    pub quiz: Quiz,
    pub questions: Vec<QuestionWithAnswers>,
}

/// Player-facing answer option; never carries the correct flag
#[derive(Debug, Clone, Serialize)]
pub struct PublicAnswer {
    pub id: Uuid,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: Uuid,
    pub prompt: String,
    pub position: i32,
    pub points: i32,
    pub answers: Vec<PublicAnswer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicQuiz {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub difficulty: String,
    pub reward_per_correct: Decimal,
    pub time_limit_secs: Option<i32>,
    pub questions: Vec<PublicQuestion>,
}

impl From<QuizDetail> for PublicQuiz {
    fn from(detail: QuizDetail) -> Self {
        let QuizDetail { quiz, questions } = detail;
        Self {
            id: quiz.id,
            title: quiz.title,
            description: quiz.description,
            category: quiz.category,
            difficulty: quiz.difficulty,
            reward_per_correct: quiz.reward_per_correct,
            time_limit_secs: quiz.time_limit_secs,
            questions: questions
                .into_iter()
                .map(|q| PublicQuestion {
                    id: q.question.id,
                    prompt: q.question.prompt,
                    position: q.question.position,
                    points: q.question.points,
                    answers: q
                        .answers
                        .into_iter()
                        .map(|a| PublicAnswer { id: a.id, text: a.text })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Listing row for the quiz catalogue
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuizSummary {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub difficulty: String,
    pub reward_per_correct: Decimal,
    pub time_limit_secs: Option<i32>,
    pub question_count: i64,
}

/// Admin input for one answer option
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerDraft {
    pub text: String,
    pub is_correct: bool,
}

/// Admin input for one question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub prompt: String,
    #[serde(default = "default_points")]
    pub points: i32,
    pub answers: Vec<AnswerDraft>,
}

fn default_points() -> i32 {
    1
}

/// Admin input for creating or replacing a quiz
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizDraft {
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub difficulty: Difficulty,
    pub reward_per_correct: Option<Decimal>,
    pub time_limit_secs: Option<i32>,
    pub questions: Vec<QuestionDraft>,
}
