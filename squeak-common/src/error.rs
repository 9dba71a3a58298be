//! The error taxonomy shared by every layer of the node.
//!
//! [`ErrorKind`] enumerates the failure modes callers (both internal modules
//! and the admin RPC façade) need to branch on. [`SqError`] pairs a kind with
//! a human-readable, non-sensitive message and is what crosses crate
//! boundaries. [`ErrorResponse`] is the wire form sent back over the admin
//! API, analogous to `common::api::error::ErrorResponse`.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A coarse classification of failure, stable across crate versions so RPC
/// clients can match on it instead of parsing messages.
#[derive(
    Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize, Error,
)]
pub enum ErrorKind {
    #[error("item failed validation")]
    InvalidItem,
    #[error("key does not match the item it claims to decrypt")]
    InvalidKey,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("offer has expired")]
    OfferExpired,
    #[error("no matching offer was found")]
    OfferNotFound,
    #[error("payment failed")]
    PaymentFailed,
    #[error("payment preimage did not hash to the expected payment hash")]
    PreimageMismatch,
    #[error("peer is unreachable")]
    PeerUnreachable,
    #[error("peer violated the wire protocol")]
    PeerProtocolViolation,
    #[error("the Lightning backend is unavailable")]
    LightningUnavailable,
    #[error("local store is in an inconsistent state")]
    StoreIntegrity,
    #[error("operation timed out")]
    Timeout,
    #[error("operation was cancelled")]
    Cancelled,
    #[error("an internal error occurred")]
    Internal,
}

impl ErrorKind {
    /// A short, stable string suitable for the `code` field of an
    /// [`ErrorResponse`].
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidItem => "invalid_item",
            Self::InvalidKey => "invalid_key",
            Self::RateLimited => "rate_limited",
            Self::OfferExpired => "offer_expired",
            Self::OfferNotFound => "offer_not_found",
            Self::PaymentFailed => "payment_failed",
            Self::PreimageMismatch => "preimage_mismatch",
            Self::PeerUnreachable => "peer_unreachable",
            Self::PeerProtocolViolation => "peer_protocol_violation",
            Self::LightningUnavailable => "lightning_unavailable",
            Self::StoreIntegrity => "store_integrity",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }

    /// Whether a client retrying the same request might reasonably succeed.
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::PeerUnreachable
                | Self::LightningUnavailable
                | Self::Timeout
        )
    }
}

/// An error carrying a stable [`ErrorKind`] plus a contextual message. This
/// is the error type every `squeak-*` crate's public `Result`s resolve to at
/// their boundary; internal leaf errors stay `thiserror` enums and get
/// mapped into `SqError` via `From`.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct SqError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SqError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<ErrorKind> for SqError {
    fn from(kind: ErrorKind) -> Self {
        let message = kind.to_string();
        Self { kind, message }
    }
}

/// The wire form of an [`SqError`], returned by the admin RPC façade.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub msg: String,
}

impl From<&SqError> for ErrorResponse {
    fn from(err: &SqError) -> Self {
        Self {
            code: err.kind.code().to_owned(),
            msg: err.message.clone(),
        }
    }
}

impl From<SqError> for ErrorResponse {
    fn from(err: SqError) -> Self {
        Self::from(&err)
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.msg)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_response_carries_stable_code() {
        let err = SqError::new(ErrorKind::RateLimited, "too many offers");
        let resp = ErrorResponse::from(&err);
        assert_eq!(resp.code, "rate_limited");
        assert_eq!(resp.msg, "too many offers");
    }

    #[test]
    fn retriable_kinds_are_marked() {
        assert!(ErrorKind::Timeout.is_retriable());
        assert!(!ErrorKind::InvalidKey.is_retriable());
    }
}
