use squeak_common::{ErrorKind, SqError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LightningError {
    #[error("lightning backend unavailable: {0}")]
    Unavailable(String),
    #[error("invalid payment request: {0}")]
    InvalidPayReq(String),
    #[error("payment failed: {0}")]
    PaymentFailed(String),
    #[error("request timed out")]
    Timeout,
    #[error("subscription stream ended unexpectedly")]
    StreamClosed,
}

impl From<LightningError> for SqError {
    fn from(err: LightningError) -> Self {
        let kind = match err {
            LightningError::Unavailable(_) | LightningError::StreamClosed => {
                ErrorKind::LightningUnavailable
            }
            LightningError::InvalidPayReq(_) => ErrorKind::InvalidItem,
            LightningError::PaymentFailed(_) => ErrorKind::PaymentFailed,
            LightningError::Timeout => ErrorKind::Timeout,
        };
        SqError::new(kind, err.to_string())
    }
}
