//! End-to-end flows through the services against a real database.
//!
//! Run with `DATABASE_URL` pointing at a scratch PostgreSQL server:
//! `cargo test -- --ignored`.

mod helpers;

use helpers::*;
use quizvault_backend::error::AppError;
use quizvault_backend::models::*;
use quizvault_backend::services::{ClientMeta, PrizeInput};
use rust_decimal::Decimal;
use sqlx::PgPool;

fn dec(units: i64, scale: u32) -> Decimal {
    Decimal::new(units, scale)
}

// ============================================================================
// Accounts and sessions
// ============================================================================

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_register_login_authenticate_logout(pool: PgPool) {
    let state = app_state(pool);
    let user = create_test_user(&state, "alice").await;

    let wallet = state.wallets.balance(user.id).await.unwrap();
    assert_eq!(wallet.balance, Decimal::ZERO);

    let outcome = login(&state, &user).await;
    assert_eq!(outcome.token.len(), 64);

    let ctx = state
        .sessions
        .authenticate(&outcome.token, SessionKind::User)
        .await
        .unwrap();
    assert_eq!(ctx.user.id, user.id);
    assert!(!ctx.is_admin);

    // CSRF tokens are bound to the session
    assert!(state.csrf.verify(&ctx.token_hash, &outcome.csrf_token));

    assert!(state.sessions.end_session(&ctx).await.unwrap());
    let err = state
        .sessions
        .authenticate(&outcome.token, SessionKind::User)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_duplicate_email_is_conflict(pool: PgPool) {
    let state = app_state(pool);
    let user = create_test_user(&state, "bob").await;

    let err = state
        .sessions
        .register(&user.email.to_uppercase(), "Bob again", TEST_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_failed_logins_escalate_to_brute_force(pool: PgPool) {
    let state = app_state(pool);
    let user = create_test_user(&state, "carol").await;
    let meta = ClientMeta {
        ip: Some("198.51.100.1"),
        user_agent: Some("test"),
    };

    for _ in 0..5 {
        let err = state
            .sessions
            .login(&user.email, "wrong-password", meta)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    let events = state
        .security
        .recent_events(50, SecuritySeverity::High)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "brute_force_suspected");
    assert_eq!(events[0].ip_address.as_deref(), Some("198.51.100.1"));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_admin_login_refuses_players(pool: PgPool) {
    let state = app_state(pool.clone());
    let player = create_test_user(&state, "dave").await;
    let admin = create_test_admin(&state, &pool, "erin").await;

    let err = state
        .sessions
        .admin_login(&player.email, TEST_PASSWORD, ClientMeta::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let outcome = state
        .sessions
        .admin_login(&admin.email, TEST_PASSWORD, ClientMeta::default())
        .await
        .unwrap();
    assert_eq!(outcome.kind, SessionKind::Admin);

    // Admin tokens are not player sessions
    let ctx = state.sessions.authenticate_any(&outcome.token).await.unwrap();
    assert!(ctx.is_admin);
    assert!(state
        .sessions
        .authenticate(&outcome.token, SessionKind::User)
        .await
        .is_err());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_disabling_user_revokes_sessions(pool: PgPool) {
    let state = app_state(pool.clone());
    let admin = create_test_admin(&state, &pool, "frank").await;
    let user = create_test_user(&state, "grace").await;
    let outcome = login(&state, &user).await;

    let updated = state.admin.set_user_active(admin.id, user.id, false).await.unwrap();
    assert!(!updated.is_active);

    assert!(state
        .sessions
        .authenticate(&outcome.token, SessionKind::User)
        .await
        .is_err());
    let err = state
        .sessions
        .login(&user.email, TEST_PASSWORD, ClientMeta::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Admins cannot lock themselves out
    assert!(state.admin.set_user_active(admin.id, admin.id, false).await.is_err());
}

// ============================================================================
// Quizzes
// ============================================================================

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_quiz_attempt_awards_reward_once(pool: PgPool) {
    let state = app_state(pool.clone());
    let admin = create_test_admin(&state, &pool, "quizmaster").await;
    let player = create_test_user(&state, "player").await;
    let detail = create_published_quiz(&state, &admin, "Capitals").await;

    let listed = state
        .quizzes
        .list_published(Some("geography"), None, 20, 0)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].question_count, 3);

    let attempt = state.quizzes.start_attempt(player.id, detail.quiz.id).await.unwrap();
    let again = state.quizzes.start_attempt(player.id, detail.quiz.id).await.unwrap();
    assert_eq!(attempt.id, again.id);

    let result = state
        .quizzes
        .submit_attempt(player.id, attempt.id, &answers_for(&detail, 2))
        .await
        .unwrap();
    assert_eq!(result.correct, 2);
    assert_eq!(result.total_questions, 3);
    assert_eq!(result.reward, dec(500, 2));
    assert!(!result.expired);
    assert_eq!(result.attempt.status, "completed");

    let wallet = state.wallets.balance(player.id).await.unwrap();
    assert_eq!(wallet.balance, dec(500, 2));

    // A finished attempt cannot be submitted again
    let err = state
        .quizzes
        .submit_attempt(player.id, attempt.id, &answers_for(&detail, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(state.wallets.balance(player.id).await.unwrap().balance, dec(500, 2));

    let history = state.wallets.history(player.id, 10, 0).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind_enum(), Some(TransactionKind::QuizReward));
    assert_eq!(history[0].reference.as_deref(), Some(attempt.id.to_string().as_str()));

    let board = state.quizzes.leaderboard(detail.quiz.id, 10).await.unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].user_id, player.id);
    assert_eq!(board[0].best_score, 2);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_unpublished_quiz_is_hidden(pool: PgPool) {
    let state = app_state(pool.clone());
    let admin = create_test_admin(&state, &pool, "drafter").await;
    let player = create_test_user(&state, "curious").await;

    let draft = state
        .admin
        .create_quiz(admin.id, &sample_draft("Draft"))
        .await
        .unwrap();

    assert!(state.quizzes.get_public_quiz(draft.quiz.id).await.unwrap_err().is_not_found());
    assert!(state
        .quizzes
        .start_attempt(player.id, draft.quiz.id)
        .await
        .is_err());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_submission_with_foreign_answer_is_rejected(pool: PgPool) {
    let state = app_state(pool.clone());
    let admin = create_test_admin(&state, &pool, "author").await;
    let player = create_test_user(&state, "tester").await;
    let detail = create_published_quiz(&state, &admin, "Capitals").await;

    let attempt = state.quizzes.start_attempt(player.id, detail.quiz.id).await.unwrap();
    let mut answers = answers_for(&detail, 3);
    // Answer of question two submitted for question one
    answers[0].answer_id = answers[1].answer_id;

    let err = state
        .quizzes
        .submit_attempt(player.id, attempt.id, &answers)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // The attempt is still open and nothing was credited
    assert_eq!(state.wallets.balance(player.id).await.unwrap().balance, Decimal::ZERO);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_update_quiz_replaces_questions(pool: PgPool) {
    let state = app_state(pool.clone());
    let admin = create_test_admin(&state, &pool, "editor").await;
    let detail = state
        .admin
        .create_quiz(admin.id, &sample_draft("Capitals"))
        .await
        .unwrap();

    let mut draft = sample_draft("Capitals, shorter");
    draft.questions.truncate(1);
    let updated = state
        .admin
        .update_quiz(admin.id, detail.quiz.id, &draft)
        .await
        .unwrap();

    assert_eq!(updated.quiz.id, detail.quiz.id);
    assert_eq!(updated.quiz.title, "Capitals, shorter");
    assert_eq!(updated.questions.len(), 1);

    state.admin.delete_quiz(admin.id, detail.quiz.id).await.unwrap();
    assert!(state.admin.get_quiz(detail.quiz.id).await.unwrap_err().is_not_found());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_editing_attempted_quiz_keeps_history(pool: PgPool) {
    let state = app_state(pool.clone());
    let admin = create_test_admin(&state, &pool, "curator").await;
    let finished = create_test_user(&state, "finished").await;
    let midway = create_test_user(&state, "midway").await;
    let detail = create_published_quiz(&state, &admin, "Capitals").await;

    let done = state.quizzes.start_attempt(finished.id, detail.quiz.id).await.unwrap();
    state
        .quizzes
        .submit_attempt(finished.id, done.id, &answers_for(&detail, 3))
        .await
        .unwrap();
    let open = state.quizzes.start_attempt(midway.id, detail.quiz.id).await.unwrap();

    // Different questions would orphan both attempts
    let mut draft = sample_draft("Capitals");
    draft.questions.truncate(1);
    let err = state
        .admin
        .update_quiz(admin.id, detail.quiz.id, &draft)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // Header changes with the same questions still go through
    let renamed = state
        .admin
        .update_quiz(admin.id, detail.quiz.id, &sample_draft("Capitals of Europe"))
        .await
        .unwrap();
    assert_eq!(renamed.quiz.title, "Capitals of Europe");
    assert!(renamed.quiz.is_published);
    let before: Vec<_> = detail.questions.iter().map(|q| q.question.id).collect();
    let after: Vec<_> = renamed.questions.iter().map(|q| q.question.id).collect();
    assert_eq!(before, after);

    let recorded: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM attempt_answers WHERE attempt_id = $1")
            .bind(done.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(recorded, 3);

    // The attempt started before the edit still grades
    let result = state
        .quizzes
        .submit_attempt(midway.id, open.id, &answers_for(&renamed, 1))
        .await
        .unwrap();
    assert_eq!(result.correct, 1);

    let err = state.admin.delete_quiz(admin.id, detail.quiz.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(state.quizzes.attempt_history(finished.id, 10).await.unwrap().len(), 1);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_expired_attempt_records_score_without_reward(pool: PgPool) {
    let state = app_state(pool.clone());
    let admin = create_test_admin(&state, &pool, "timekeeper").await;
    let player = create_test_user(&state, "slowpoke").await;

    let mut draft = sample_draft("Timed capitals");
    draft.time_limit_secs = Some(60);
    let created = state.admin.create_quiz(admin.id, &draft).await.unwrap();
    let detail = state
        .admin
        .set_published(admin.id, created.quiz.id, true)
        .await
        .unwrap();

    let attempt = state.quizzes.start_attempt(player.id, detail.quiz.id).await.unwrap();
    sqlx::query("UPDATE quiz_attempts SET started_at = NOW() - INTERVAL '10 minutes' WHERE id = $1")
        .bind(attempt.id)
        .execute(&pool)
        .await
        .unwrap();

    let result = state
        .quizzes
        .submit_attempt(player.id, attempt.id, &answers_for(&detail, 3))
        .await
        .unwrap();
    assert!(result.expired);
    assert_eq!(result.correct, 3);
    assert_eq!(result.reward, Decimal::ZERO);
    assert_eq!(result.attempt.status, "expired");
    assert_eq!(result.attempt.score, 3);

    assert_eq!(state.wallets.balance(player.id).await.unwrap().balance, Decimal::ZERO);
    assert!(state.wallets.history(player.id, 10, 0).await.unwrap().is_empty());

    let history = state.quizzes.attempt_history(player.id, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, "expired");
    assert!(state.quizzes.leaderboard(detail.quiz.id, 10).await.unwrap().is_empty());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_starts_share_one_open_attempt(pool: PgPool) {
    let state = app_state(pool.clone());
    let admin = create_test_admin(&state, &pool, "host").await;
    let player = create_test_user(&state, "eager").await;
    let detail = create_published_quiz(&state, &admin, "Capitals").await;

    let (a, b, c) = tokio::join!(
        state.quizzes.start_attempt(player.id, detail.quiz.id),
        state.quizzes.start_attempt(player.id, detail.quiz.id),
        state.quizzes.start_attempt(player.id, detail.quiz.id),
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert_eq!(a.id, b.id);
    assert_eq!(b.id, c.id);

    let open: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM quiz_attempts WHERE user_id = $1 AND status = 'in_progress'",
    )
    .bind(player.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(open, 1);
}

// ============================================================================
// Wallet
// ============================================================================

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_deposit_rules(pool: PgPool) {
    let state = app_state(pool);
    let user = create_test_user(&state, "saver").await;

    let entry = state
        .wallets
        .deposit(user.id, dec(1050, 2), "psp-123")
        .await
        .unwrap();
    assert_eq!(entry.balance_before, Decimal::ZERO);
    assert_eq!(entry.balance_after, dec(1050, 2));

    let err = state
        .wallets
        .deposit(user.id, dec(1050, 2), "psp-123")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = state
        .wallets
        .deposit(user.id, dec(10_001, 0), "psp-124")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    assert_eq!(state.wallets.balance(user.id).await.unwrap().balance, dec(1050, 2));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_deposits_keep_ledger_consistent(pool: PgPool) {
    let state = app_state(pool);
    let user = create_test_user(&state, "busy").await;

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let state = state.clone();
            let user_id = user.id;
            tokio::spawn(async move {
                state
                    .wallets
                    .deposit(user_id, Decimal::ONE, &format!("parallel-{}", i))
                    .await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(state.wallets.balance(user.id).await.unwrap().balance, dec(10, 0));
    let history = state.wallets.history(user.id, 50, 0).await.unwrap();
    assert_eq!(history.len(), 10);
    for entry in &history {
        assert_eq!(entry.balance_after - entry.balance_before, entry.amount);
    }
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_admin_adjust_cannot_overdraw(pool: PgPool) {
    let state = app_state(pool.clone());
    let admin = create_test_admin(&state, &pool, "treasurer").await;
    let user = create_test_user(&state, "holder").await;
    fund(&state, user.id, dec(5, 0)).await;

    let err = state
        .wallets
        .admin_adjust(admin.id, user.id, dec(-6, 0), "chargeback")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BusinessLogic(_)));

    let entry = state
        .wallets
        .admin_adjust(admin.id, user.id, dec(-5, 0), "chargeback")
        .await
        .unwrap();
    assert_eq!(entry.balance_after, Decimal::ZERO);
    assert_eq!(entry.kind_enum(), Some(TransactionKind::AdminAdjustment));
}

// ============================================================================
// Prizes
// ============================================================================

fn prize_input(cost: Decimal, stock: i32) -> PrizeInput {
    PrizeInput {
        name: "Sticker pack".to_string(),
        description: Some("Five stickers".to_string()),
        cost,
        stock,
        is_active: true,
    }
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_redeem_debits_and_decrements_stock(pool: PgPool) {
    let state = app_state(pool.clone());
    let admin = create_test_admin(&state, &pool, "shopkeeper").await;
    let first = create_test_user(&state, "first").await;
    let second = create_test_user(&state, "second").await;
    fund(&state, first.id, dec(10, 0)).await;
    fund(&state, second.id, dec(10, 0)).await;

    let prize = state
        .prizes
        .create_prize(admin.id, &prize_input(dec(4, 0), 1))
        .await
        .unwrap();

    let redemption = state.prizes.redeem(first.id, prize.id).await.unwrap();
    assert_eq!(redemption.status_enum(), Some(RedemptionStatus::Pending));
    assert_eq!(state.wallets.balance(first.id).await.unwrap().balance, dec(6, 0));

    let err = state.prizes.redeem(second.id, prize.id).await.unwrap_err();
    assert!(matches!(err, AppError::BusinessLogic(_)));
    assert_eq!(state.wallets.balance(second.id).await.unwrap().balance, dec(10, 0));

    // Cancelling refunds and restocks
    let cancelled = state
        .prizes
        .update_redemption_status(admin.id, redemption.id, RedemptionStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(cancelled.status_enum(), Some(RedemptionStatus::Cancelled));
    assert_eq!(state.wallets.balance(first.id).await.unwrap().balance, dec(10, 0));

    state.prizes.redeem(second.id, prize.id).await.unwrap();

    // Terminal states do not move again
    let err = state
        .prizes
        .update_redemption_status(admin.id, redemption.id, RedemptionStatus::Fulfilled)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_redeem_with_insufficient_balance_changes_nothing(pool: PgPool) {
    let state = app_state(pool.clone());
    let admin = create_test_admin(&state, &pool, "merchant").await;
    let user = create_test_user(&state, "broke").await;
    fund(&state, user.id, dec(3, 0)).await;

    let prize = state
        .prizes
        .create_prize(admin.id, &prize_input(dec(4, 0), 2))
        .await
        .unwrap();

    let err = state.prizes.redeem(user.id, prize.id).await.unwrap_err();
    assert!(matches!(err, AppError::BusinessLogic(_)));

    let prizes = state.prizes.list_active().await.unwrap();
    assert_eq!(prizes[0].stock, 2);
    assert!(state.prizes.user_redemptions(user.id).await.unwrap().is_empty());
    assert_eq!(state.wallets.balance(user.id).await.unwrap().balance, dec(3, 0));
}

// ============================================================================
// Dashboard
// ============================================================================

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_dashboard_stats(pool: PgPool) {
    let state = app_state(pool.clone());
    let admin = create_test_admin(&state, &pool, "owner").await;
    let player = create_test_user(&state, "visitor").await;
    fund(&state, player.id, dec(20, 0)).await;
    let detail = create_published_quiz(&state, &admin, "Capitals").await;
    state.quizzes.start_attempt(player.id, detail.quiz.id).await.unwrap();

    let stats = state.admin.dashboard_stats().await.unwrap();
    assert_eq!(stats.users, 2);
    assert_eq!(stats.quizzes, 1);
    assert_eq!(stats.attempts_today, 1);
    assert_eq!(stats.total_balance, dec(20, 0));
    assert_eq!(stats.pending_redemptions, 0);
    assert_eq!(stats.admins_online, 0);
}
