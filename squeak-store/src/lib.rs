//! The relational persistence layer: items, profiles, peers, and the
//! offer/payment tables (spec §3, §4.9), backed by sqlite via `diesel`.

pub mod convert;
pub mod domain;
pub mod error;
pub mod rows;
pub mod schema;
pub mod store;

pub use domain::{Peer, Profile, ReceivedOffer, ReceivedPayment, SentOffer, SentPayment};
pub use error::StoreError;
pub use store::Store;
