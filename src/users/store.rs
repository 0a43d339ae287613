use async_trait::async_trait;
use thiserror::Error;

use super::repo_types::{NewUser, ProfileUpdate, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no matching user")]
    NotFound,

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("store call timed out")]
    Timeout,

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

/// SQLSTATE raised when `score + delta` leaves the BIGINT range.
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

impl StoreError {
    /// Classifies driver errors so constraint failures don't surface as opaque 500s.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return Self::Conflict(db.constraint().unwrap_or("unique").to_string());
            }
            if db.is_check_violation() {
                return Self::Constraint(db.constraint().unwrap_or("check").to_string());
            }
            if db.code().as_deref() == Some(NUMERIC_VALUE_OUT_OF_RANGE) {
                return Self::Constraint("numeric_value_out_of_range".to_string());
            }
        }
        if let sqlx::Error::RowNotFound = err {
            return Self::NotFound;
        }
        Self::Database(err)
    }
}

/// Persistence port for user records.
///
/// Every score mutation goes through `add_points` or `redeem_referral`; there is
/// no way to overwrite a score.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user and return the assigned id.
    async fn insert(&self, user: NewUser) -> Result<i64, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// All users, highest score first.
    async fn list_by_score(&self) -> Result<Vec<User>, StoreError>;

    async fn update_profile(&self, id: i64, profile: ProfileUpdate) -> Result<(), StoreError>;

    async fn reset_password(&self, id: i64, password_hash: &str) -> Result<(), StoreError>;

    async fn delete_by_id(&self, id: i64) -> Result<(), StoreError>;

    /// `score = score + delta` as a single relative update.
    async fn add_points(&self, id: i64, delta: i64) -> Result<(), StoreError>;

    async fn set_refresh_hash(&self, id: i64, hash: &str) -> Result<(), StoreError>;

    /// Credits every owner of `code` with `owner_bonus` and the redeemer with
    /// `redeemer_bonus`, all or nothing. Returns how many owners were credited;
    /// zero means the code is unknown and nothing changed.
    async fn redeem_referral(
        &self,
        redeemer_id: i64,
        code: &str,
        owner_bonus: i64,
        redeemer_bonus: i64,
    ) -> Result<u64, StoreError>;
}
