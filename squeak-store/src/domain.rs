//! Domain entities the store persists (spec §3). `ContentItem` itself lives
//! in `squeak-crypto`, since authoring/validating it is a cryptography
//! concern; everything else here is store-native.

use squeak_common::{Hash32, MilliSats, PeerAddr, Timestamp};
use squeak_crypto::Address;

#[derive(Clone, Debug)]
pub struct Profile {
    pub profile_id: i32,
    pub created_at: Timestamp,
    pub name: String,
    /// Present only for a "signing" profile; a contact profile has none.
    pub private_key: Option<[u8; 32]>,
    pub address: Address,
    pub sharing: bool,
    pub following: bool,
    pub image: Option<Vec<u8>>,
}

impl Profile {
    pub fn is_signing(&self) -> bool {
        self.private_key.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct Peer {
    pub peer_id: i32,
    pub created_at: Timestamp,
    pub name: String,
    pub addr: PeerAddr,
    pub uploading: bool,
    pub downloading: bool,
}

/// A seller's commitment to reveal a decryption key upon payment (spec §3).
#[derive(Clone, Debug)]
pub struct SentOffer {
    pub sent_offer_id: i64,
    pub created_at: Timestamp,
    pub item_hash: Hash32,
    pub payment_hash: Hash32,
    pub secret_key: [u8; 32],
    pub nonce: [u8; 32],
    pub price_msat: MilliSats,
    pub payment_request: String,
    pub invoice_timestamp: i64,
    pub invoice_expiry: i64,
    pub client_addr: PeerAddr,
    pub paid: bool,
}

impl SentOffer {
    pub fn is_expired(&self, now_unix: i64, grace_s: i64) -> bool {
        now_unix > self.invoice_timestamp + self.invoice_expiry + grace_s
    }
}

/// A buyer's record of a seller's offer, before payment (spec §3).
#[derive(Clone, Debug)]
pub struct ReceivedOffer {
    pub received_offer_id: i64,
    pub created_at: Timestamp,
    pub item_hash: Hash32,
    pub payment_hash: Hash32,
    pub nonce: [u8; 32],
    /// Opaque elliptic-curve point derived from the payment hash; see
    /// design note in spec §9 (never verified against the preimage here).
    pub payment_point: Vec<u8>,
    pub invoice_timestamp: i64,
    pub invoice_expiry: i64,
    pub price_msat: MilliSats,
    pub payment_request: String,
    pub destination: String,
    pub lightning_addr: PeerAddr,
    pub peer_addr: PeerAddr,
    pub paid: bool,
}

impl ReceivedOffer {
    pub fn is_expired(&self, now_unix: i64, grace_s: i64) -> bool {
        now_unix > self.invoice_timestamp + self.invoice_expiry + grace_s
    }
}

/// A completed (or attempted) buy (spec §3).
#[derive(Clone, Debug)]
pub struct SentPayment {
    pub sent_payment_id: i64,
    pub created_at: Timestamp,
    pub peer_addr: PeerAddr,
    pub item_hash: Hash32,
    pub payment_hash: Hash32,
    pub secret_key: [u8; 32],
    pub price_msat: MilliSats,
    pub node_pubkey: String,
    pub valid: bool,
}

/// A completed sale (spec §3).
#[derive(Clone, Debug)]
pub struct ReceivedPayment {
    pub received_payment_id: i64,
    pub created_at: Timestamp,
    pub item_hash: Hash32,
    pub payment_hash: Hash32,
    pub price_msat: MilliSats,
    pub settle_index: i64,
    pub client_addr: PeerAddr,
}
