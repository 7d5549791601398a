use crate::api::extract::AuthUser;
use crate::error::AppResult;
use crate::models::{Prize, PrizeRedemption};
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

pub async fn list_prizes(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Prize>>> {
    Ok(Json(state.prizes.list_active().await?))
}

pub async fn redeem(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
    Path(prize_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<PrizeRedemption>)> {
    let redemption = state.prizes.redeem(ctx.user.id, prize_id).await?;
    Ok((StatusCode::CREATED, Json(redemption)))
}

pub async fn my_redemptions(
    State(state): State<Arc<AppState>>,
    AuthUser(ctx): AuthUser,
) -> AppResult<Json<Vec<PrizeRedemption>>> {
    Ok(Json(state.prizes.user_redemptions(ctx.user.id).await?))
}
