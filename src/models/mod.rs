//! Domain models for the QuizVault backend.
//!
//! Database-backed rows for users, quizzes, attempts, wallets, prizes,
//! sessions and security events. Enum-like columns are stored as TEXT and
//! exposed through typed accessors.

pub mod attempt;
pub mod prize;
pub mod quiz;
pub mod security_event;
pub mod session;
pub mod user;
pub mod wallet;

pub use attempt::{AttemptAnswer, AttemptStatus, LeaderboardEntry, QuizAttempt, SubmittedAnswer};
pub use prize::{Prize, PrizeRedemption, RedemptionStatus};
pub use quiz::{
    Answer, AnswerDraft, Difficulty, PublicAnswer, PublicQuestion, PublicQuiz, Question,
    QuestionDraft, QuestionWithAnswers, Quiz, QuizDetail, QuizDraft, QuizSummary,
};
pub use security_event::{
    NewSecurityEvent, SecurityEvent, SecurityEventCount, SecurityEventType, SecuritySeverity,
};
pub use session::{Session, SessionKind};
pub use user::{User, UserRole};
pub use wallet::{TransactionKind, Wallet, WalletTransaction};
