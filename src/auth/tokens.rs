use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use tracing::debug;

use super::{jwt::JwtKeys, password};

const REFRESH_TOKEN_LEN: usize = 64;

/// Result of a successful login. `refresh_token` is handed to the client once
/// and never stored; only `refresh_token_hash` is persisted.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_token_hash: String,
}

#[derive(Clone)]
pub struct TokenIssuer {
    keys: JwtKeys,
}

impl TokenIssuer {
    pub fn new(keys: JwtKeys) -> Self {
        Self { keys }
    }

    pub fn issue(&self, user_id: i64) -> anyhow::Result<TokenPair> {
        let access_token = self.keys.sign_access(user_id)?;
        let refresh_token = generate_refresh_token();
        let refresh_token_hash = password::hash_password(&refresh_token)?;
        debug!(user_id, "token pair issued");
        Ok(TokenPair {
            access_token,
            refresh_token,
            refresh_token_hash,
        })
    }

    pub fn verify_refresh(&self, refresh_token: &str, stored_hash: &str) -> anyhow::Result<bool> {
        password::verify_password(refresh_token, stored_hash)
    }
}

fn generate_refresh_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(JwtKeys::from_config(&JwtConfig {
            secret: "dev-secret".into(),
            issuer: "iss".into(),
            audience: "aud".into(),
            ttl_minutes: 15,
            refresh_ttl_minutes: 60,
        }))
    }

    #[test]
    fn issued_pair_carries_subject_and_matching_refresh_hash() {
        let issuer = issuer();
        let pair = issuer.issue(9).unwrap();

        assert_eq!(issuer.keys.verify(&pair.access_token).unwrap().sub, 9);
        assert_eq!(pair.refresh_token.len(), REFRESH_TOKEN_LEN);
        assert!(pair.refresh_token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(pair.refresh_token, pair.refresh_token_hash);
        assert!(issuer
            .verify_refresh(&pair.refresh_token, &pair.refresh_token_hash)
            .unwrap());
        assert!(!issuer
            .verify_refresh("not-the-token", &pair.refresh_token_hash)
            .unwrap());
    }

    #[test]
    fn refresh_values_are_fresh_per_issuance() {
        let issuer = issuer();
        let a = issuer.issue(1).unwrap();
        let b = issuer.issue(1).unwrap();
        assert_ne!(a.refresh_token, b.refresh_token);
        assert!(!issuer.verify_refresh(&a.refresh_token, &b.refresh_token_hash).unwrap());
    }

    #[test]
    fn refresh_value_is_not_the_signing_secret() {
        let pair = issuer().issue(1).unwrap();
        assert!(!pair.refresh_token.contains("dev-secret"));
    }
}
