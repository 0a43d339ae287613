use std::sync::Arc;

use tracing::debug;

use crate::users::store::{StoreError, UserStore};

/// Additive scoring keyed by user id. Bonus amounts are the caller's policy.
#[derive(Clone)]
pub struct PointsLedger {
    store: Arc<dyn UserStore>,
}

impl PointsLedger {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Applies `score = score + delta` in one store update. An unknown id is
    /// `StoreError::NotFound`; a delta that would go below zero is
    /// `StoreError::Constraint`.
    pub async fn add_points(&self, user_id: i64, delta: i64) -> Result<(), StoreError> {
        self.store.add_points(user_id, delta).await?;
        debug!(user_id, delta, "points added");
        Ok(())
    }
}
