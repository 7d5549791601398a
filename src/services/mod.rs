pub mod admin_service;
pub mod prize_service;
pub mod quiz_service;
pub mod session_service;
pub mod wallet_service;

pub use admin_service::{AdminService, DashboardStats};
pub use prize_service::{PrizeInput, PrizeService};
pub use quiz_service::{AttemptResult, GradedAnswer, QuizService};
pub use session_service::{AuthContext, ClientMeta, LoginOutcome, SessionService};
pub use wallet_service::WalletService;
