use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use time::OffsetDateTime;

use super::{
    repo_types::{NewUser, ProfileUpdate, User},
    store::{StoreError, UserStore},
};

#[derive(Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, User>,
}

impl Table {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.rows
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }

    fn code_taken(&self, code: &str) -> bool {
        self.rows
            .values()
            .any(|u| u.referrer.as_deref() == Some(code))
    }

    fn row_mut(&mut self, id: i64) -> Result<&mut User, StoreError> {
        self.rows.get_mut(&id).ok_or(StoreError::NotFound)
    }
}

/// Process-local user store with the same constraints as the `users` table:
/// unique email, unique referral code, non-negative score. One lock covers
/// the whole table, so multi-row operations are atomic.
#[derive(Default)]
pub struct MemoryUserStore {
    table: Mutex<Table>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn checked_score(score: i64, delta: i64) -> Result<i64, StoreError> {
    match score.checked_add(delta) {
        Some(next) if next >= 0 => Ok(next),
        _ => Err(StoreError::Constraint("users_score_check".into())),
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: NewUser) -> Result<i64, StoreError> {
        let mut table = self.lock();
        if table.email_taken(&user.email, None) {
            return Err(StoreError::Conflict("users_email_key".into()));
        }
        if let Some(code) = user.referrer.as_deref() {
            if table.code_taken(code) {
                return Err(StoreError::Conflict("users_referrer_key".into()));
            }
        }
        if user.score < 0 {
            return Err(StoreError::Constraint("users_score_check".into()));
        }

        table.next_id += 1;
        let id = table.next_id;
        let now = OffsetDateTime::now_utc();
        table.rows.insert(
            id,
            User {
                id,
                email: user.email,
                first_name: user.first_name,
                last_name: user.last_name,
                password_hash: user.password_hash,
                active: user.active,
                score: user.score,
                created_at: now,
                updated_at: now,
                referrer: user.referrer,
                refresh_token_hash: None,
            },
        );
        Ok(id)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.lock().rows.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock().rows.values().find(|u| u.email == email).cloned())
    }

    async fn list_by_score(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.lock().rows.values().cloned().collect();
        // BTreeMap iteration is by id, and the sort is stable: ties stay in id order.
        users.sort_by(|a, b| b.score.cmp(&a.score));
        Ok(users)
    }

    async fn update_profile(&self, id: i64, profile: ProfileUpdate) -> Result<(), StoreError> {
        let mut table = self.lock();
        if !table.rows.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        if table.email_taken(&profile.email, Some(id)) {
            return Err(StoreError::Conflict("users_email_key".into()));
        }
        let row = table.row_mut(id)?;
        row.email = profile.email;
        row.first_name = profile.first_name;
        row.last_name = profile.last_name;
        row.active = profile.active;
        row.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn reset_password(&self, id: i64, password_hash: &str) -> Result<(), StoreError> {
        let mut table = self.lock();
        let row = table.row_mut(id)?;
        row.password_hash = password_hash.to_string();
        row.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn delete_by_id(&self, id: i64) -> Result<(), StoreError> {
        self.lock()
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn add_points(&self, id: i64, delta: i64) -> Result<(), StoreError> {
        let mut table = self.lock();
        let row = table.row_mut(id)?;
        row.score = checked_score(row.score, delta)?;
        row.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn set_refresh_hash(&self, id: i64, hash: &str) -> Result<(), StoreError> {
        let mut table = self.lock();
        table.row_mut(id)?.refresh_token_hash = Some(hash.to_string());
        Ok(())
    }

    async fn redeem_referral(
        &self,
        redeemer_id: i64,
        code: &str,
        owner_bonus: i64,
        redeemer_bonus: i64,
    ) -> Result<u64, StoreError> {
        let mut table = self.lock();
        let owners: Vec<i64> = table
            .rows
            .values()
            .filter(|u| u.referrer.as_deref() == Some(code))
            .map(|u| u.id)
            .collect();
        if owners.is_empty() {
            return Ok(0);
        }

        // Compute every new score before writing any, so a failure leaves no partial credit.
        let redeemer = table.rows.get(&redeemer_id).ok_or(StoreError::NotFound)?;
        let mut updates = Vec::with_capacity(owners.len() + 1);
        let mut redeemer_score = redeemer.score;
        for id in &owners {
            let current = if *id == redeemer_id {
                redeemer_score
            } else {
                table.rows[id].score
            };
            let next = checked_score(current, owner_bonus)?;
            if *id == redeemer_id {
                redeemer_score = next;
            } else {
                updates.push((*id, next));
            }
        }
        updates.push((redeemer_id, checked_score(redeemer_score, redeemer_bonus)?));

        let now = OffsetDateTime::now_utc();
        for (id, score) in updates {
            let row = table.row_mut(id)?;
            row.score = score;
            row.updated_at = now;
        }
        Ok(owners.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str, code: Option<&str>) -> NewUser {
        NewUser {
            email: email.into(),
            first_name: None,
            last_name: None,
            password_hash: "hash".into(),
            active: 1,
            score: 0,
            referrer: code.map(Into::into),
        }
    }

    async fn score(store: &MemoryUserStore, id: i64) -> i64 {
        store.find_by_id(id).await.unwrap().unwrap().score
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids() {
        let store = MemoryUserStore::new();
        let a = store.insert(new_user("a@example.com", None)).await.unwrap();
        let b = store.insert(new_user("b@example.com", None)).await.unwrap();
        assert!(b > a);
        let found = store.find_by_email("b@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, b);
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_email_and_code() {
        let store = MemoryUserStore::new();
        store.insert(new_user("a@example.com", Some("A1"))).await.unwrap();

        let dup_email = store.insert(new_user("a@example.com", None)).await;
        assert!(matches!(dup_email, Err(StoreError::Conflict(_))));

        let dup_code = store.insert(new_user("b@example.com", Some("A1"))).await;
        assert!(matches!(dup_code, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn add_points_rejects_negative_balance() {
        let store = MemoryUserStore::new();
        let id = store.insert(new_user("a@example.com", None)).await.unwrap();
        store.add_points(id, 10).await.unwrap();

        let err = store.add_points(id, -11).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        assert_eq!(score(&store, id).await, 10);
    }

    #[tokio::test]
    async fn redeem_with_missing_redeemer_changes_nothing() {
        let store = MemoryUserStore::new();
        let owner = store.insert(new_user("o@example.com", Some("O1"))).await.unwrap();

        let err = store.redeem_referral(999, "O1", 100, 25).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
        assert_eq!(score(&store, owner).await, 0);
    }

    #[tokio::test]
    async fn owner_redeeming_own_code_gets_both_bonuses() {
        let store = MemoryUserStore::new();
        let owner = store.insert(new_user("o@example.com", Some("O1"))).await.unwrap();

        let owners = store.redeem_referral(owner, "O1", 100, 25).await.unwrap();
        assert_eq!(owners, 1);
        assert_eq!(score(&store, owner).await, 125);
    }

    #[tokio::test]
    async fn profile_update_and_delete() {
        let store = MemoryUserStore::new();
        let a = store.insert(new_user("a@example.com", None)).await.unwrap();
        store.insert(new_user("b@example.com", None)).await.unwrap();

        let taken = ProfileUpdate {
            email: "b@example.com".into(),
            first_name: None,
            last_name: None,
            active: 1,
        };
        assert!(matches!(
            store.update_profile(a, taken).await,
            Err(StoreError::Conflict(_))
        ));

        let fresh = ProfileUpdate {
            email: "ada@example.com".into(),
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            active: 0,
        };
        store.update_profile(a, fresh).await.unwrap();
        let user = store.find_by_id(a).await.unwrap().unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.active, 0);

        store.reset_password(a, "new-hash").await.unwrap();
        assert_eq!(store.find_by_id(a).await.unwrap().unwrap().password_hash, "new-hash");

        store.delete_by_id(a).await.unwrap();
        assert!(store.find_by_id(a).await.unwrap().is_none());
        assert!(matches!(store.delete_by_id(a).await, Err(StoreError::NotFound)));
        assert!(matches!(store.reset_password(a, "x").await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn score_overflow_is_a_constraint_failure() {
        let store = MemoryUserStore::new();
        let a = store.insert(new_user("a@example.com", None)).await.unwrap();
        store.add_points(a, i64::MAX).await.unwrap();
        let err = store.add_points(a, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        assert_eq!(score(&store, a).await, i64::MAX);
    }
}
