mod dto;
pub mod handlers;
pub mod ledger;
pub mod referral;
