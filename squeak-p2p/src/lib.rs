//! The peer-to-peer networking layer (spec §4.6-§4.8): wire protocol,
//! framing, per-connection state machine, and the server that keeps a
//! configured peer set connected.

pub mod codec;
pub mod connection;
pub mod manager;
pub mod message;
pub mod ops;
pub mod server;

pub use connection::{PeerConnConfig, PeerHandle, Role};
pub use manager::ConnectionManager;
pub use message::{Message, PROTOCOL_VERSION, MIN_PROTOCOL_VERSION};
pub use ops::{ConfiguredPeer, PeerOps};
pub use server::PeerServer;
