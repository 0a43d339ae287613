use serde::{Deserialize, Serialize};

/// Request body for `POST /registrate`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    pub password: String,
    #[serde(default = "default_active")]
    pub active: i32,
    #[serde(default)]
    pub score: i64,
    /// Referral code this user will own.
    #[serde(default)]
    pub referrer: Option<String>,
}

fn default_active() -> i32 {
    1
}

/// Request body for `POST /authenticate`.
#[derive(Debug, Deserialize)]
pub struct AuthenticateRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct Registered {
    pub id: i64,
}
