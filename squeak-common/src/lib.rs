//! Shared types and utilities used across every `squeak-*` crate: hashes,
//! addresses, amounts, timestamps, the error taxonomy, CLI/config parsing,
//! logging setup, and structured-concurrency helpers.

pub mod addr;
pub mod amount;
pub mod backoff;
pub mod cli;
pub mod config;
pub mod error;
pub mod hash;
pub mod logger;
pub mod shutdown;
pub mod task;
pub mod time;

pub use addr::PeerAddr;
pub use amount::MilliSats;
pub use error::{ErrorKind, ErrorResponse, SqError};
pub use hash::Hash32;
pub use time::Timestamp;
