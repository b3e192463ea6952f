use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::types::ActivityKind;
use crate::services::progression::{ProgressionState, Redemption};
use crate::services::rewards::{StudentProgression, Wallet};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProgressionResponse {
    pub(crate) student_id: String,
    #[serde(flatten)]
    pub(crate) progression: ProgressionState,
    pub(crate) wallet: Wallet,
}

impl From<StudentProgression> for ProgressionResponse {
    fn from(value: StudentProgression) -> Self {
        Self { student_id: value.student_id, progression: value.progression, wallet: value.wallet }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ActivityRequest {
    pub(crate) kind: ActivityKind,
    #[serde(alias = "sourceId")]
    #[validate(length(min = 1, max = 128, message = "source_id must be 1-128 characters"))]
    pub(crate) source_id: String,
    /// Score, correct answers or game points depending on `kind`.
    #[serde(default)]
    #[validate(range(max = 100000, message = "amount must be at most 100000"))]
    pub(crate) amount: u64,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct RedemptionRequest {
    #[validate(length(min = 1, max = 200, message = "reward must be 1-200 characters"))]
    pub(crate) reward: String,
    #[validate(range(min = 1, message = "cost must be at least 1"))]
    pub(crate) cost: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct RedemptionResponse {
    pub(crate) redemption: Redemption,
    pub(crate) wallet: Wallet,
}
