use std::{future::Future, time::Duration};

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use super::{
    repo_types::{NewUser, ProfileUpdate, User},
    store::{StoreError, UserStore},
};

/// Postgres-backed user store. Every call is bounded by `timeout`.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgUserStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn timed<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .unwrap_or(Err(StoreError::Timeout))
    }

    async fn redeem_tx(
        &self,
        redeemer_id: i64,
        code: &str,
        owner_bonus: i64,
        redeemer_bonus: i64,
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;

        let rows: Vec<(i64, Option<String>)> = sqlx::query_as(LOCK_REDEMPTION_ROWS)
            .bind(code)
            .bind(redeemer_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?;
        let locked = LockedRedemption::from_rows(&rows, redeemer_id, code);

        if locked.owners == 0 {
            tx.rollback().await.map_err(StoreError::from_sqlx)?;
            return Ok(0);
        }
        if !locked.redeemer_found {
            tx.rollback().await.map_err(StoreError::from_sqlx)?;
            return Err(StoreError::NotFound);
        }

        sqlx::query(
            r#"
            UPDATE users
               SET score = score + $1, updated_at = now()
             WHERE referrer = $2
            "#,
        )
        .bind(owner_bonus)
        .bind(code)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        sqlx::query(
            r#"
            UPDATE users
               SET score = score + $1, updated_at = now()
             WHERE id = $2
            "#,
        )
        .bind(redeemer_bonus)
        .bind(redeemer_id)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_sqlx)?;

        tx.commit().await.map_err(StoreError::from_sqlx)?;
        debug!(redeemer_id, owners = locked.owners, "referral transaction committed");
        Ok(locked.owners)
    }
}

// Owners and redeemer are locked together in id order, so two redemptions
// touching the same pair of users always acquire the rows in the same order.
const LOCK_REDEMPTION_ROWS: &str = r#"
    SELECT id, referrer
      FROM users
     WHERE referrer = $1 OR id = $2
     ORDER BY id
       FOR UPDATE
"#;

#[derive(Debug, PartialEq, Eq)]
struct LockedRedemption {
    owners: u64,
    redeemer_found: bool,
}

impl LockedRedemption {
    fn from_rows(rows: &[(i64, Option<String>)], redeemer_id: i64, code: &str) -> Self {
        Self {
            owners: rows
                .iter()
                .filter(|(_, referrer)| referrer.as_deref() == Some(code))
                .count() as u64,
            redeemer_found: rows.iter().any(|(id, _)| *id == redeemer_id),
        }
    }
}

fn expect_one_row(rows: u64) -> Result<(), StoreError> {
    if rows == 0 {
        Err(StoreError::NotFound)
    } else {
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: NewUser) -> Result<i64, StoreError> {
        self.timed(async {
            sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO users (email, first_name, last_name, password_hash, active, score, referrer)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id
                "#,
            )
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.password_hash)
            .bind(user.active)
            .bind(user.score)
            .bind(&user.referrer)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
        })
        .await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        self.timed(async {
            sqlx::query_as::<_, User>(
                r#"
                SELECT id, email, first_name, last_name, password_hash, active, score,
                       created_at, updated_at, referrer, refresh_token_hash
                FROM users
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
        })
        .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.timed(async {
            sqlx::query_as::<_, User>(
                r#"
                SELECT id, email, first_name, last_name, password_hash, active, score,
                       created_at, updated_at, referrer, refresh_token_hash
                FROM users
                WHERE email = $1
                "#,
            )
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
        })
        .await
    }

    async fn list_by_score(&self) -> Result<Vec<User>, StoreError> {
        self.timed(async {
            sqlx::query_as::<_, User>(
                r#"
                SELECT id, email, first_name, last_name, password_hash, active, score,
                       created_at, updated_at, referrer, refresh_token_hash
                FROM users
                ORDER BY score DESC, id ASC
                "#,
            )
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)
        })
        .await
    }

    async fn update_profile(&self, id: i64, profile: ProfileUpdate) -> Result<(), StoreError> {
        self.timed(async {
            let res = sqlx::query(
                r#"
                UPDATE users
                   SET email = $1, first_name = $2, last_name = $3, active = $4, updated_at = now()
                 WHERE id = $5
                "#,
            )
            .bind(&profile.email)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(profile.active)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
            expect_one_row(res.rows_affected())
        })
        .await
    }

    async fn reset_password(&self, id: i64, password_hash: &str) -> Result<(), StoreError> {
        self.timed(async {
            let res = sqlx::query(
                "UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2",
            )
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
            expect_one_row(res.rows_affected())
        })
        .await
    }

    async fn delete_by_id(&self, id: i64) -> Result<(), StoreError> {
        self.timed(async {
            let res = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(StoreError::from_sqlx)?;
            expect_one_row(res.rows_affected())
        })
        .await
    }

    async fn add_points(&self, id: i64, delta: i64) -> Result<(), StoreError> {
        self.timed(async {
            let res = sqlx::query(
                r#"
                UPDATE users
                   SET score = score + $1, updated_at = now()
                 WHERE id = $2
                "#,
            )
            .bind(delta)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
            expect_one_row(res.rows_affected())
        })
        .await
    }

    async fn set_refresh_hash(&self, id: i64, hash: &str) -> Result<(), StoreError> {
        self.timed(async {
            let res = sqlx::query("UPDATE users SET refresh_token_hash = $1 WHERE id = $2")
                .bind(hash)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(StoreError::from_sqlx)?;
            expect_one_row(res.rows_affected())
        })
        .await
    }

    async fn redeem_referral(
        &self,
        redeemer_id: i64,
        code: &str,
        owner_bonus: i64,
        redeemer_bonus: i64,
    ) -> Result<u64, StoreError> {
        self.timed(self.redeem_tx(redeemer_id, code, owner_bonus, redeemer_bonus))
            .await
    }
}
