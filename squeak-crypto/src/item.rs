//! The `ContentItem` wire/storage representation and its canonical encoding.

use secp256k1::{ecdsa::Signature, PublicKey};
use serde::{Deserialize, Serialize};
use squeak_common::{Hash32, Timestamp};

use crate::address::Address;

/// The opaque block header an item binds itself to (spec §3:
/// `block_header`). We don't interpret its contents beyond carrying them
/// and including them in the item hash; `block_height`/`block_time` are kept
/// alongside as the fields the rest of the system actually reasons about.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct BlockHeader(pub Vec<u8>);

impl BlockHeader {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A signed content item ("squeak").
///
/// `hash` is derived, not chosen: it's `SHA256(canonical_bytes())`. Two
/// items with identical signed content always collide on `hash`, which is
/// exactly the "hash is the unique primary key" invariant the store relies
/// on (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentItem {
    pub hash: Hash32,
    pub author_address: Address,
    /// The pubkey `author_address` must hash to; carried alongside the
    /// address the way a P2PKH scriptSig carries both signature and pubkey.
    pub author_pubkey: PublicKey,
    pub signature: Signature,
    pub reply_hash: Hash32,
    pub block_height: i64,
    pub block_time: i64,
    pub block_header: BlockHeader,
    pub ciphertext: Vec<u8>,
    pub decryption_key: Option<[u8; 32]>,
    pub created_at: Timestamp,
    pub liked_at: Option<Timestamp>,
}

/// The zero hash used for top-level items (those with no parent).
pub const ZERO_HASH: Hash32 = Hash32::new([0u8; 32]);

impl ContentItem {
    /// The bytes that are signed and hashed: every field that defines the
    /// item's identity, in a fixed order, excluding `hash` itself (circular),
    /// `decryption_key` (mutable post-creation), and the local-only
    /// `created_at`/`liked_at` timestamps.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            self.author_address.as_str().len() + self.block_header.0.len() + self.ciphertext.len() + 64,
        );
        buf.extend_from_slice(self.author_address.as_str().as_bytes());
        buf.extend_from_slice(self.reply_hash.as_bytes());
        buf.extend_from_slice(&self.block_height.to_le_bytes());
        buf.extend_from_slice(&self.block_time.to_le_bytes());
        buf.extend_from_slice(&self.block_header.0);
        buf.extend_from_slice(&self.ciphertext);
        buf
    }

    pub fn compute_hash(&self) -> Hash32 {
        Hash32::digest(&self.canonical_bytes())
    }
}
