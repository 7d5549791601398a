pub mod attempt_repository;
pub mod prize_repository;
pub mod quiz_repository;
pub mod security_event_repository;
pub mod session_repository;
pub mod user_repository;
pub mod wallet_repository;

// Re-export all repositories for convenient access
pub use attempt_repository::AttemptRepository;
pub use prize_repository::{PrizeFields, PrizeRepository};
pub use quiz_repository::{QuizFields, QuizRepository};
pub use security_event_repository::SecurityEventRepository;
pub use session_repository::SessionRepository;
pub use user_repository::UserRepository;
pub use wallet_repository::{WalletChange, WalletRepository};
