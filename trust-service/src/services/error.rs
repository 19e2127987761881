use thiserror::Error;
use trust_core::error::AppError;

#[derive(Error, Debug)]
pub enum StepUpError {
    #[error("Ephemeral store unavailable: {0}")]
    StoreUnavailable(anyhow::Error),

    #[error("Ephemeral store timed out")]
    StoreTimeout,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StepUpError> for AppError {
    fn from(err: StepUpError) -> Self {
        match err {
            StepUpError::StoreUnavailable(e) => AppError::ServiceUnavailable(e),
            StepUpError::StoreTimeout => {
                AppError::ServiceUnavailable(anyhow::anyhow!("Ephemeral store timed out"))
            }
            StepUpError::Internal(e) => AppError::InternalError(e),
        }
    }
}
