use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use tracing::error;

lazy_static! {
    // Stand-in for accounts that don't exist, hashed with the same params as real ones.
    static ref UNKNOWN_ACCOUNT_HASH: String =
        hash_password("no-such-account").expect("argon2 defaults hash any input");
}

/// Argon2id hash in PHC string form, salted from the OS RNG.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// `Ok(false)` on mismatch; `Err` only when `hash` is not a parseable PHC string.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Login check that costs one Argon2 verification whether or not the account
/// exists. A missing account is always `Ok(false)`.
pub fn verify_login(plain: &str, stored: Option<&str>) -> anyhow::Result<bool> {
    verify_login_against(plain, stored).map(|(_, ok)| ok)
}

fn verify_login_against<'a>(
    plain: &str,
    stored: Option<&'a str>,
) -> anyhow::Result<(&'a str, bool)> {
    match stored {
        Some(hash) => Ok((hash, verify_password(plain, hash)?)),
        None => {
            let hash: &'static str = UNKNOWN_ACCOUNT_HASH.as_str();
            verify_password(plain, hash)?;
            Ok((hash, false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn unknown_account_still_runs_an_argon2_verification() {
        let real = hash_password("whatever-password").unwrap();
        let (checked, ok) = verify_login_against("whatever-password", None).unwrap();
        assert!(!ok);
        assert_eq!(checked, UNKNOWN_ACCOUNT_HASH.as_str());

        let checked = PasswordHash::new(checked).unwrap();
        let real = PasswordHash::new(&real).unwrap();
        assert_eq!(checked.algorithm.as_str(), real.algorithm.as_str());
        assert_eq!(checked.version, real.version);
        assert_eq!(checked.params.to_string(), real.params.to_string());
    }

    #[test]
    fn unknown_account_never_matches_even_the_placeholder_password() {
        assert!(!verify_login("no-such-account", None).unwrap());
    }

    #[test]
    fn known_account_checks_its_own_hash() {
        let hash = hash_password("correct-horse").unwrap();
        let (checked, ok) = verify_login_against("correct-horse", Some(&hash)).unwrap();
        assert!(ok);
        assert_eq!(checked, hash);
        assert!(!verify_login("battery-staple", Some(&hash)).unwrap());
    }
}
