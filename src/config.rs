use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Longest lifetime accepted for either token: one year.
pub const MAX_TTL_MINUTES: i64 = 60 * 24 * 365;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

fn minutes(m: i64) -> Duration {
    Duration::from_secs(m.clamp(0, MAX_TTL_MINUTES) as u64 * 60)
}

impl JwtConfig {
    pub fn access_ttl(&self) -> Duration {
        minutes(self.ttl_minutes)
    }

    pub fn refresh_ttl(&self) -> Duration {
        minutes(self.refresh_ttl_minutes)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.secret.is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }
        for (key, value) in [
            ("JWT_TTL_MINUTES", self.ttl_minutes),
            ("JWT_REFRESH_TTL_MINUTES", self.refresh_ttl_minutes),
        ] {
            if !(1..=MAX_TTL_MINUTES).contains(&value) {
                anyhow::bail!("{key} must be between 1 and {MAX_TTL_MINUTES}, got {value}");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => anyhow::bail!("unknown STORE_BACKEND {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub timeout_secs: u64,
    pub connect_attempts: u32,
    pub connect_backoff_secs: u64,
}

impl DbConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub db: DbConfig,
    pub jwt: JwtConfig,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let backend = match std::env::var("STORE_BACKEND") {
            Ok(v) => v.parse()?,
            Err(_) => StoreBackend::Postgres,
        };
        let database_url = std::env::var("DATABASE_URL").ok();
        if backend == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set for the postgres store backend");
        }

        let db = DbConfig {
            backend,
            database_url,
            timeout_secs: env_or("DB_TIMEOUT_SECS", 3),
            connect_attempts: env_or("DB_CONNECT_ATTEMPTS", 10),
            connect_backoff_secs: env_or("DB_CONNECT_BACKOFF_SECS", 2),
        };

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "reward-service".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "reward-service-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 15),
            refresh_ttl_minutes: env_or("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };
        jwt.validate()?;

        Ok(Self { db, jwt })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_store_backend_names() {
        assert_eq!("postgres".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert_eq!(" Memory ".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    fn jwt(ttl_minutes: i64, refresh_ttl_minutes: i64) -> JwtConfig {
        JwtConfig {
            secret: "s".into(),
            issuer: "i".into(),
            audience: "a".into(),
            ttl_minutes,
            refresh_ttl_minutes,
        }
    }

    #[test]
    fn ttl_durations_are_clamped() {
        let cfg = jwt(i64::MAX, i64::MIN);
        assert_eq!(cfg.access_ttl(), Duration::from_secs(MAX_TTL_MINUTES as u64 * 60));
        assert_eq!(cfg.refresh_ttl(), Duration::ZERO);
        assert_eq!(jwt(15, 60).access_ttl(), Duration::from_secs(900));
    }

    #[test]
    fn validation_rejects_out_of_range_ttls_and_empty_secret() {
        assert!(jwt(15, 20160).validate().is_ok());
        assert!(jwt(0, 20160).validate().is_err());
        assert!(jwt(15, i64::MAX).validate().is_err());

        let mut no_secret = jwt(15, 60);
        no_secret.secret.clear();
        assert!(no_secret.validate().is_err());
    }
}
