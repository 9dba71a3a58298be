//! The peer wire protocol (spec §6): a squeak-protocol-compatible framing
//! carrying `version`/`verack`/`ping`/`pong`/`inv`/`getdata`/`getsqueaks`/
//! `sharesqueaks`/`squeak`/`offer` messages.

use serde::{Deserialize, Serialize};
use squeak_common::Hash32;
use squeak_crypto::ContentItem;
use squeak_engine::offer::WireOffer;

/// The protocol version this build speaks. Carried in `version` so peers can
/// refuse an incompatible counterpart before trusting anything else it
/// sends (open question in spec §9, resolved in `DESIGN.md`: we require
/// `protocol_version >= MIN_PROTOCOL_VERSION` and otherwise treat the
/// handshake symmetrically regardless of which side dialed).
pub const PROTOCOL_VERSION: u32 = 1;
pub const MIN_PROTOCOL_VERSION: u32 = 1;

/// A single `{address, min_block_height, max_block_height}` interest filter
/// (spec §6's `CInterested`), in its wire (string address) form.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CInterested {
    pub address: String,
    pub min_block_height: i64,
    pub max_block_height: i64,
}

/// `getsqueaks`/`sharesqueaks` carry a list of these (spec §6's
/// `CSqueakLocator`).
pub type CSqueakLocator = Vec<CInterested>;

/// An `inv`/`getdata` entry kind (spec §6): `Item` means "I have/want the
/// full item", `KeyNeeded` means "I have the ciphertext, I want the key".
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum InvType {
    Item = 1,
    KeyNeeded = 2,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct InvEntry {
    pub inv_type: InvType,
    pub hash: Hash32,
}

/// The `version` message payload. Minimal by design: spec §9 notes the
/// source leaves handshake versioning rules (min compatible version,
/// feature flags) unspecified, so we carry only what a receiver needs to
/// reject an incompatible peer and know where to dial it back.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VersionPayload {
    pub protocol_version: u32,
    /// The port this node's own peer listener is bound to, so the remote
    /// side can dial us back for a future outbound connection.
    pub listen_port: u16,
    pub user_agent: String,
}

/// A single peer protocol message (spec §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Message {
    Version(VersionPayload),
    Verack,
    Ping { nonce: u64 },
    Pong { nonce: u64 },
    Inv { entries: Vec<InvEntry> },
    GetData { entries: Vec<InvEntry> },
    GetSqueaks { locator: CSqueakLocator },
    ShareSqueaks { locator: CSqueakLocator },
    Squeak { item: ContentItem },
    Offer { item_hash: Hash32, offer: WireOffer },
}

impl Message {
    /// A short tag for logging, avoiding a full `{:?}` dump of e.g. a
    /// `Squeak`'s ciphertext.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Message::Version(_) => "version",
            Message::Verack => "verack",
            Message::Ping { .. } => "ping",
            Message::Pong { .. } => "pong",
            Message::Inv { .. } => "inv",
            Message::GetData { .. } => "getdata",
            Message::GetSqueaks { .. } => "getsqueaks",
            Message::ShareSqueaks { .. } => "sharesqueaks",
            Message::Squeak { .. } => "squeak",
            Message::Offer { .. } => "offer",
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn version_message_round_trips_through_bincode() {
        let msg = Message::Version(VersionPayload {
            protocol_version: PROTOCOL_VERSION,
            listen_port: 8555,
            user_agent: "squeak-node/0.1".to_owned(),
        });
        let bytes = bincode::serialize(&msg).unwrap();
        let decoded: Message = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.kind_name(), "version");
    }

    #[test]
    fn inv_entries_round_trip() {
        let msg = Message::Inv {
            entries: vec![
                InvEntry {
                    inv_type: InvType::Item,
                    hash: Hash32::digest(b"a"),
                },
                InvEntry {
                    inv_type: InvType::KeyNeeded,
                    hash: Hash32::digest(b"b"),
                },
            ],
        };
        let bytes = bincode::serialize(&msg).unwrap();
        let decoded: Message = bincode::deserialize(&bytes).unwrap();
        match decoded {
            Message::Inv { entries } => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].inv_type, InvType::Item);
                assert_eq!(entries[1].inv_type, InvType::KeyNeeded);
            }
            _ => panic!("expected Inv"),
        }
    }
}
