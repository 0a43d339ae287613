use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::{debug, instrument, warn};

use super::repo_types::User;
use crate::{
    auth::extractors::AuthUser,
    error::{ApiPath, AppError, Envelope},
    state::AppState,
    users::store::StoreError,
};

pub fn users_routes() -> Router<AppState> {
    Router::new()
        .route("/users/leaderboard", get(leaderboard))
        .route("/users/:id/status", get(status))
}

#[instrument(skip(state))]
pub async fn leaderboard(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<(StatusCode, Json<Envelope<Vec<User>>>), AppError> {
    let users = state
        .store
        .list_by_score()
        .await
        .map_err(AppError::store("couldn't fetch all users"))?;
    debug!(caller, count = users.len(), "leaderboard fetched");
    Ok((
        StatusCode::ACCEPTED,
        Json(Envelope::ok("Fetched all users", users)),
    ))
}

#[instrument(skip(state))]
pub async fn status(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<(StatusCode, Json<Envelope<User>>), AppError> {
    let user = state
        .store
        .find_by_id(id)
        .await
        .map_err(AppError::store("couldn't fetch user"))?
        .ok_or_else(|| {
            warn!(user_id = id, "user not found");
            AppError::store("couldn't fetch user")(StoreError::NotFound)
        })?;
    debug!(caller, user_id = id, "status fetched");
    Ok((
        StatusCode::ACCEPTED,
        Json(Envelope::ok("Retrieved one user from the database", user)),
    ))
}
