use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{Cookie, HeaderMapExt},
    TypedHeader,
};
use tracing::{trace, warn};

use super::jwt::JwtKeys;
use crate::{error::AppError, state::AppState};

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// Caller identity, attached to the request once the access token checks out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub i64);

fn authenticate(cookies: Option<&Cookie>, keys: &JwtKeys) -> Result<AuthUser, AppError> {
    let Some(token) = cookies.and_then(|c| c.get(ACCESS_TOKEN_COOKIE)) else {
        trace!("no access_token cookie");
        return Err(AppError::Unauthorized);
    };

    match keys.verify(token) {
        Ok(claims) => Ok(AuthUser(claims.sub)),
        Err(e) => {
            warn!(error = %e, "invalid or expired token");
            Err(AppError::Unauthorized)
        }
    }
}

/// Gate for the protected router: rejects with 401 before the handler runs.
pub async fn require_access_token(
    State(state): State<AppState>,
    cookies: Option<TypedHeader<Cookie>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let keys = JwtKeys::from_ref(&state);
    let user = authenticate(cookies.as_ref().map(|TypedHeader(c)| c), &keys)?;
    trace!(user_id = user.0, "request authenticated");
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(*user);
        }
        let cookies = parts.headers.typed_get::<Cookie>();
        authenticate(cookies.as_ref(), &JwtKeys::from_ref(state))
    }
}
