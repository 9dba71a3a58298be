//! Content-object cryptography: the canonical item encoding, author
//! addresses/signatures, and the AES scheme binding a decryption key to an
//! item's ciphertext.
//!
//! This crate implements the `ContentCrypto` contract: validate an item,
//! compute its hash, install/clear/check a decryption key, and author a
//! fresh signed item.

pub mod address;
pub mod aes;
pub mod content;
pub mod item;

pub use address::{Address, KeyPair};
pub use content::{to_btc_network, ContentCrypto};
pub use item::{BlockHeader, ContentItem};
