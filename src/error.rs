use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::users::store::StoreError;

/// Errors surfaced at the HTTP boundary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("unauthorized")]
    Unauthorized,

    #[error("{message}")]
    Store {
        message: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

/// The uniform `{ error, message, data? }` body.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub error: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            error: false,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl Envelope<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            error: false,
            message: message.into(),
            data: None,
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            error: true,
            message: message.into(),
            data: None,
        }
    }
}

impl AppError {
    /// Wraps a store failure with the message shown to the client.
    pub fn store(message: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Store { message, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidCredentials => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Store { source, .. } => match source {
                StoreError::NotFound | StoreError::Conflict(_) | StoreError::Constraint(_) => {
                    StatusCode::BAD_REQUEST
                }
                StoreError::Timeout | StoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::Store { message, source } if status.is_server_error() => {
                error!(error = %source, %message, "store failure");
            }
            AppError::Store { message, source } => {
                warn!(error = %source, %message, "store rejected request");
            }
            AppError::Internal(e) => error!(error = ?e, "internal error"),
            _ => {}
        }
        (status, Json(Envelope::failure(self.to_string()))).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(_: PathRejection) -> Self {
        AppError::Validation("couldn't convert id string to int".into())
    }
}

/// `Json` whose rejection renders the error envelope.
#[derive(axum::extract::FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// `Path` whose rejection renders the error envelope.
#[derive(axum::extract::FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_client_or_server_status() {
        let not_found = AppError::store("couldn't fetch user")(StoreError::NotFound);
        assert_eq!(not_found.status(), StatusCode::BAD_REQUEST);
        assert_eq!(not_found.to_string(), "couldn't fetch user");

        let timeout = AppError::store("couldn't fetch user")(StoreError::Timeout);
        assert_eq!(timeout.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err = AppError::from(anyhow::anyhow!("argon2 parse failure at byte 3"));
        assert_eq!(err.to_string(), "internal error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn envelope_shapes() {
        let ok = serde_json::to_value(Envelope::ok("done", 5)).unwrap();
        assert_eq!(ok["error"], false);
        assert_eq!(ok["data"], 5);

        let msg = serde_json::to_value(Envelope::message("pong")).unwrap();
        assert!(msg.get("data").is_none());

        let failed = serde_json::to_value(Envelope::failure("unauthorized")).unwrap();
        assert_eq!(failed["error"], true);
        assert_eq!(failed["message"], "unauthorized");
    }
}
