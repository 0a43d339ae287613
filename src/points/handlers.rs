use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tracing::{info, instrument};

use super::{
    dto::{CompleteTaskRequest, RedeemReferrerRequest},
    ledger::PointsLedger,
    referral::{Redemption, ReferralRedemption},
};
use crate::{
    auth::extractors::AuthUser,
    error::{ApiJson, ApiPath, AppError, Envelope},
    state::AppState,
};

pub const TELEGRAM_SIGN_POINTS: i64 = 50;
pub const X_SIGN_POINTS: i64 = 75;

type Accepted = (StatusCode, Json<Envelope<()>>);

fn accepted(message: String) -> Accepted {
    (StatusCode::ACCEPTED, Json(Envelope::message(message)))
}

pub fn points_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:id/task/complete", post(complete_task))
        .route("/users/:id/task/telegramSign", post(complete_telegram_sign))
        .route("/users/:id/task/XSign", post(complete_x_sign))
        .route("/users/:id/referrer", post(redeem_referrer))
}

async fn credit(state: &AppState, user_id: i64, points: i64) -> Result<(), AppError> {
    PointsLedger::new(state.store.clone())
        .add_points(user_id, points)
        .await
        .map_err(AppError::store("couldn't add points to the user"))
}

#[instrument(skip(state, payload))]
pub async fn complete_task(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<CompleteTaskRequest>,
) -> Result<Accepted, AppError> {
    if payload.points < 0 {
        return Err(AppError::Validation("points must not be negative".into()));
    }
    credit(&state, id, payload.points).await?;
    info!(caller, user_id = id, points = payload.points, "task completed");
    Ok(accepted(format!(
        "complete task worked for user with id {id}, added points {}",
        payload.points
    )))
}

#[instrument(skip(state))]
pub async fn complete_telegram_sign(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Accepted, AppError> {
    credit(&state, id, TELEGRAM_SIGN_POINTS).await?;
    info!(caller, user_id = id, "telegram sign completed");
    Ok(accepted(format!(
        "complete telegram sign worked for user with id {id}, added points {TELEGRAM_SIGN_POINTS}"
    )))
}

#[instrument(skip(state))]
pub async fn complete_x_sign(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Accepted, AppError> {
    credit(&state, id, X_SIGN_POINTS).await?;
    info!(caller, user_id = id, "X sign completed");
    Ok(accepted(format!(
        "complete X sign worked for user with id {id}, added points {X_SIGN_POINTS}"
    )))
}

#[instrument(skip(state, payload))]
pub async fn redeem_referrer(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(payload): ApiJson<RedeemReferrerRequest>,
) -> Result<Accepted, AppError> {
    let outcome = ReferralRedemption::new(state.store.clone())
        .redeem(id, &payload.referrer)
        .await
        .map_err(AppError::store("couldn't redeem referrer"))?;

    let message = match outcome {
        Redemption::Credited { .. } => "Referrer redeemed",
        Redemption::UnknownCode => "Referrer not found, nothing redeemed",
    };
    info!(caller, user_id = id, ?outcome, "referrer redemption attempted");
    Ok(accepted(message.to_string()))
}
