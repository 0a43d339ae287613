use serde::{Deserialize, Serialize};

/// JWT payload carried by the `access_token` cookie.
///
/// `sub` is decoded as an integer; a string or float subject fails
/// deserialization and the token is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Claims {
    pub sub: i64,    // user ID
    pub iat: usize,  // issued at (unix timestamp)
    pub exp: usize,  // expires at (unix timestamp)
    pub iss: String, // issuer
    pub aud: String, // audience
}
