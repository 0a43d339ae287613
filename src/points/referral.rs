use std::sync::Arc;

use tracing::{debug, info};

use crate::users::store::{StoreError, UserStore};

pub const OWNER_BONUS: i64 = 100;
pub const REDEEMER_BONUS: i64 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redemption {
    /// Every owner of the code got `OWNER_BONUS`, the redeemer got `REDEEMER_BONUS`.
    Credited { owners: u64 },
    /// No user holds the code; nothing changed.
    UnknownCode,
}

/// Credits a referral code's owner(s) and the redeemer in one store
/// transaction. Redeeming the same code twice credits twice.
#[derive(Clone)]
pub struct ReferralRedemption {
    store: Arc<dyn UserStore>,
}

impl ReferralRedemption {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    pub async fn redeem(&self, redeemer_id: i64, code: &str) -> Result<Redemption, StoreError> {
        let code = code.trim();
        if code.is_empty() {
            debug!(redeemer_id, "blank referral code");
            return Ok(Redemption::UnknownCode);
        }

        let owners = self
            .store
            .redeem_referral(redeemer_id, code, OWNER_BONUS, REDEEMER_BONUS)
            .await?;

        if owners == 0 {
            debug!(redeemer_id, "referral code matched no user");
            return Ok(Redemption::UnknownCode);
        }
        info!(redeemer_id, owners, "referral redeemed");
        Ok(Redemption::Credited { owners })
    }
}
