use squeak_common::{ErrorKind, SqError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("migration failed: {0}")]
    Migration(String),
    #[error("column decode failed: {0}")]
    Decode(String),
    #[error("duplicate row for a uniqueness constraint that should be idempotent")]
    Duplicate,
    #[error("no row found")]
    NotFound,
}

impl StoreError {
    /// Whether this failure is a duplicate-insert that the caller's
    /// operation is idempotent with respect to (spec §7: `StoreIntegrity`
    /// is silently swallowed for e.g. re-saving a received offer or
    /// re-recording a settlement).
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate)
            || matches!(
                self,
                StoreError::Db(diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                ))
            )
    }
}

impl From<StoreError> for SqError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => {
                SqError::new(ErrorKind::OfferNotFound, err.to_string())
            }
            other => SqError::new(ErrorKind::StoreIntegrity, other.to_string()),
        }
    }
}
