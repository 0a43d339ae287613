use std::time::Duration;

use axum::{
    extract::{FromRef, State},
    http::{header, StatusCode},
    response::AppendHeaders,
    routing::post,
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthenticateRequest, RegisterRequest, Registered},
        extractors::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE},
        jwt::JwtKeys,
        password::{hash_password, verify_login},
        tokens::TokenIssuer,
    },
    error::{ApiJson, AppError, Envelope},
    state::AppState,
    users::repo_types::{normalize_code, NewUser, User},
};

const MIN_PASSWORD_LEN: usize = 8;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/registrate", post(registrate))
        .route("/authenticate", post(authenticate))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

/// `HttpOnly; Secure; SameSite=Strict` cookie scoped to the whole site.
fn session_cookie(name: &str, value: &str, max_age: Duration) -> String {
    format!(
        "{name}={value}; Path=/; Max-Age={}; HttpOnly; Secure; SameSite=Strict",
        max_age.as_secs()
    )
}

#[instrument(skip(state, payload))]
pub async fn registrate(
    State(state): State<AppState>,
    ApiJson(mut payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<Envelope<Registered>>), AppError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::Validation("invalid email".into()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AppError::Validation("password too short".into()));
    }
    if payload.score < 0 {
        return Err(AppError::Validation("score must not be negative".into()));
    }

    let password_hash = hash_password(&payload.password)?;

    let id = state
        .store
        .insert(NewUser {
            email: payload.email.clone(),
            first_name: normalize_name(payload.first_name),
            last_name: normalize_name(payload.last_name),
            password_hash,
            active: payload.active,
            score: payload.score,
            referrer: normalize_code(payload.referrer),
        })
        .await
        .map_err(AppError::store("couldn't create user"))?;

    info!(user_id = id, email = %payload.email, "user registered");
    Ok((
        StatusCode::ACCEPTED,
        Json(Envelope::ok(
            format!("Successfully created new user, id: {id}"),
            Registered { id },
        )),
    ))
}

#[instrument(skip(state, payload))]
pub async fn authenticate(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<AuthenticateRequest>,
) -> Result<
    (
        StatusCode,
        AppendHeaders<[(header::HeaderName, String); 2]>,
        Json<Envelope<User>>,
    ),
    AppError,
> {
    let email = payload.email.trim().to_lowercase();

    let found = state
        .store
        .find_by_email(&email)
        .await
        .map_err(AppError::store("couldn't authenticate"))?;

    let stored_hash = found.as_ref().map(|u| u.password_hash.as_str());
    let verified = verify_login(&payload.password, stored_hash)?;
    let user = match found {
        Some(u) if verified => u,
        Some(u) => {
            warn!(user_id = u.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }
        None => {
            warn!(email = %email, "login unknown email");
            return Err(AppError::InvalidCredentials);
        }
    };

    let keys = JwtKeys::from_ref(&state);
    let access_ttl = keys.access_ttl;
    let pair = TokenIssuer::new(keys).issue(user.id)?;

    state
        .store
        .set_refresh_hash(user.id, &pair.refresh_token_hash)
        .await
        .map_err(AppError::store("couldn't authenticate"))?;

    let refresh_ttl = state.config.jwt.refresh_ttl();
    let cookies = AppendHeaders([
        (
            header::SET_COOKIE,
            session_cookie(ACCESS_TOKEN_COOKIE, &pair.access_token, access_ttl),
        ),
        (
            header::SET_COOKIE,
            session_cookie(REFRESH_TOKEN_COOKIE, &pair.refresh_token, refresh_ttl),
        ),
    ]);

    info!(user_id = user.id, "user logged in");
    let message = format!("Logged in user {}", user.email);
    Ok((StatusCode::ACCEPTED, cookies, Json(Envelope::ok(message, user))))
}
