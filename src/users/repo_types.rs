use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_name: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub active: i32,
    pub score: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub referrer: Option<String>, // the user's own referral code
    #[serde(skip_serializing, default)]
    pub refresh_token_hash: Option<String>,
}

/// Everything needed to insert a user. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: String,
    pub active: i32,
    pub score: i64,
    pub referrer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub active: i32,
}

/// Blank referral codes are stored as absent so they never match a redemption.
pub fn normalize_code(code: Option<String>) -> Option<String> {
    code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty())
}
