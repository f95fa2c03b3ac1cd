use crate::capture::CaptureError;
use crate::recall::RecallError;
use crate::rules::RuleError;
use crate::store::StoreError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid privacy rule: {0}")]
    Rule(#[from] RuleError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Capture(#[from] CaptureError),

    #[error("{0}")]
    Recall(#[from] RecallError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
