use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CompleteTaskRequest {
    pub points: i64,
}

#[derive(Debug, Deserialize)]
pub struct RedeemReferrerRequest {
    pub referrer: String,
}
