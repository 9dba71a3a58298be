//! The interface a [`crate::connection::PeerConnection`] uses to reach the
//! application layer, without holding an owning reference back through
//! `ConnectionManager`/`PeerServer` (spec §9's cyclic-reference design
//! note): a connection only ever sees `Arc<dyn PeerOps>`.

use async_trait::async_trait;
use squeak_common::{Hash32, PeerAddr, SqError};
use squeak_crypto::ContentItem;
use squeak_engine::{offer::WireOffer, Controller, InvItem, Interest};

/// A peer this node is configured to dial, as read from the store (spec
/// §4.8). Kept as a plain host/port pair here rather than pulling in
/// `squeak_store::Peer` directly, so `squeak-p2p` doesn't need a dependency
/// on the store crate for a detail the engine already owns.
#[derive(Clone, Debug)]
pub struct ConfiguredPeer {
    pub host: String,
    pub port: u16,
}

#[async_trait]
pub trait PeerOps: Send + Sync {
    /// Answer an inbound `getsqueaks`: hashes we store matching the locator.
    async fn resolve_getsqueaks(&self, locator: &[Interest]) -> Result<Vec<Hash32>, SqError>;

    /// Answer an inbound `sharesqueaks`: hashes we store matching the
    /// locator, intersected with our followed-address set.
    async fn resolve_sharesqueaks(&self, locator: &[Interest]) -> Result<Vec<Hash32>, SqError>;

    /// Filter an inbound `inv` down to the subset worth a `getdata` (spec
    /// §4.5 `filter_unknown`).
    async fn filter_unknown(&self, invs: Vec<InvItem>) -> Result<Vec<InvItem>, SqError>;

    async fn get_item(&self, hash: Hash32) -> Result<Option<ContentItem>, SqError>;

    async fn get_buy_offer(
        &self,
        item_hash: Hash32,
        buyer_addr: PeerAddr,
    ) -> Result<WireOffer, SqError>;

    async fn accept_offer(
        &self,
        item_hash: Hash32,
        wire_offer: &WireOffer,
        peer_addr: PeerAddr,
    ) -> Result<i64, SqError>;

    async fn save_item(&self, item: ContentItem, require_key: bool) -> Result<(), SqError>;

    async fn downloading_peers(&self) -> Result<Vec<ConfiguredPeer>, SqError>;
}

#[async_trait]
impl PeerOps for Controller {
    async fn resolve_getsqueaks(&self, locator: &[Interest]) -> Result<Vec<Hash32>, SqError> {
        self.resolve_locator(locator).await
    }

    async fn resolve_sharesqueaks(&self, locator: &[Interest]) -> Result<Vec<Hash32>, SqError> {
        self.resolve_locator_followed(locator).await
    }

    async fn filter_unknown(&self, invs: Vec<InvItem>) -> Result<Vec<InvItem>, SqError> {
        Controller::filter_unknown(self, invs).await
    }

    async fn get_item(&self, hash: Hash32) -> Result<Option<ContentItem>, SqError> {
        Controller::get_item(self, hash).await
    }

    async fn get_buy_offer(
        &self,
        item_hash: Hash32,
        buyer_addr: PeerAddr,
    ) -> Result<WireOffer, SqError> {
        Controller::get_buy_offer(self, item_hash, buyer_addr).await
    }

    async fn accept_offer(
        &self,
        item_hash: Hash32,
        wire_offer: &WireOffer,
        peer_addr: PeerAddr,
    ) -> Result<i64, SqError> {
        Controller::accept_offer(self, item_hash, wire_offer, peer_addr).await
    }

    async fn save_item(&self, item: ContentItem, require_key: bool) -> Result<(), SqError> {
        Controller::save_item(self, item, require_key).await
    }

    async fn downloading_peers(&self) -> Result<Vec<ConfiguredPeer>, SqError> {
        let peers = Controller::downloading_peers(self).await?;
        Ok(peers
            .into_iter()
            .map(|p| ConfiguredPeer {
                host: p.addr.ip.to_string(),
                port: p.addr.port,
            })
            .collect())
    }
}
