//! The Lightning backend capability surface (spec §6): decode invoices,
//! issue hold invoices, subscribe to settlements, and pay.

pub mod error;
pub mod gateway;
pub mod lnd;
pub mod stub;
pub mod types;

pub use error::LightningError;
pub use gateway::LightningGateway;
pub use lnd::{LndConfig, LndGateway};
pub use stub::StubGateway;
