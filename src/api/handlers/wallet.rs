use super::Pagination;
use crate::api::extract::AuthUser;
use crate::error::AppResult;
use crate::models::{Wallet, WalletTransaction};
use crate::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: Decimal,
    pub reference: String,
}

pub async fn get_wallet(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
) -> AppResult<Json<Wallet>> {
    Ok(Json(state.wallets.balance(ctx.user.id).await?))
}

pub async fn deposit(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
    Json(payload): Json<DepositRequest>,
) -> AppResult<(StatusCode, Json<WalletTransaction>)> {
    let entry = state
        .wallets
        .deposit(ctx.user.id, payload.amount, &payload.reference)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn transactions(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Vec<WalletTransaction>>> {
    let entries = state
        .wallets
        .history(ctx.user.id, page.limit, page.offset)
        .await?;
    Ok(Json(entries))
}
