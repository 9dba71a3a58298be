//! Seller-side offer generation and buyer-side offer acceptance (spec §4.3).

use std::sync::Arc;

use rand::RngCore;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use squeak_common::{ErrorKind, Hash32, MilliSats, PeerAddr, SqError, Timestamp};
use squeak_crypto::ContentItem;
use squeak_lightning::LightningGateway;
use squeak_store::{ReceivedOffer, SentOffer};

/// The wire form of an offer (spec §3: "Offer (wire-only, not persisted)").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireOffer {
    pub nonce: [u8; 32],
    pub payment_request: String,
    pub host: String,
    pub port: u16,
}

pub struct OfferEngine {
    gateway: Arc<dyn LightningGateway>,
    max_acceptable_price_msat: MilliSats,
}

impl OfferEngine {
    pub fn new(
        gateway: Arc<dyn LightningGateway>,
        max_acceptable_price_msat: MilliSats,
    ) -> Self {
        Self {
            gateway,
            max_acceptable_price_msat,
        }
    }

    /// Seller side: build a fresh `SentOffer` around `item`'s decryption key.
    /// The returned value is not yet persisted — the caller (the
    /// `Controller`) is the one that writes through to the store.
    pub async fn create_sent_offer(
        &self,
        item: &ContentItem,
        client_addr: PeerAddr,
        price_msat: MilliSats,
    ) -> Result<SentOffer, SqError> {
        let secret_key = item.decryption_key.ok_or_else(|| {
            SqError::new(
                ErrorKind::InvalidKey,
                "cannot offer an item with no decryption key installed",
            )
        })?;
        let payment_hash = Hash32::digest(&secret_key);

        let mut nonce = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce);

        let payment_request = self
            .gateway
            .add_hold_invoice(price_msat, payment_hash)
            .await
            .map_err(SqError::from)?;

        let now = Timestamp::now();
        Ok(SentOffer {
            sent_offer_id: 0,
            created_at: now,
            item_hash: item.hash,
            payment_hash,
            secret_key,
            nonce,
            price_msat,
            payment_request,
            invoice_timestamp: now.unix_secs(),
            invoice_expiry: 3600,
            client_addr,
            paid: false,
        })
    }

    /// Wrap a `SentOffer` for transport, advertising where the buyer should
    /// send the Lightning payment.
    pub fn package_offer(
        &self,
        sent_offer: &SentOffer,
        self_ln_host: String,
        self_ln_port: u16,
    ) -> WireOffer {
        WireOffer {
            nonce: sent_offer.nonce,
            payment_request: sent_offer.payment_request.clone(),
            host: self_ln_host,
            port: self_ln_port,
        }
    }

    /// Buyer side: decode a seller's wire `Offer` into a `ReceivedOffer`,
    /// rejecting anything quoting more than `max_acceptable_price_msat`.
    pub async fn unpack_offer(
        &self,
        item_hash: Hash32,
        wire_offer: &WireOffer,
        peer_addr: PeerAddr,
    ) -> Result<ReceivedOffer, SqError> {
        let decoded = self
            .gateway
            .decode_pay_req(&wire_offer.payment_request)
            .await
            .map_err(SqError::from)?;

        if decoded.num_msat.msat() > self.max_acceptable_price_msat.msat() {
            return Err(SqError::new(
                ErrorKind::InvalidItem,
                format!(
                    "offer price {} exceeds max acceptable price {}",
                    decoded.num_msat, self.max_acceptable_price_msat
                ),
            ));
        }

        let payment_point = payment_point_from_hash(decoded.payment_hash);

        let lightning_addr = parse_host_port(&wire_offer.host, wire_offer.port)?;

        Ok(ReceivedOffer {
            received_offer_id: 0,
            created_at: Timestamp::now(),
            item_hash,
            payment_hash: decoded.payment_hash,
            nonce: wire_offer.nonce,
            payment_point,
            invoice_timestamp: decoded.timestamp,
            invoice_expiry: decoded.expiry,
            price_msat: decoded.num_msat,
            payment_request: wire_offer.payment_request.clone(),
            destination: decoded.destination,
            lightning_addr,
            peer_addr,
            paid: false,
        })
    }
}

/// `elliptic_point_from_scalar(payment_hash)` (spec §4.3 step 3): treat the
/// payment hash as a scalar and multiply the secp256k1 generator by it,
/// producing a 33-byte compressed point. Kept opaque per the spec's design
/// note — never verified against anything downstream (open question, §9).
fn payment_point_from_hash(payment_hash: Hash32) -> Vec<u8> {
    let secp = Secp256k1::new();
    match SecretKey::from_slice(payment_hash.as_bytes()) {
        Ok(scalar) => {
            let point = PublicKey::from_secret_key(&secp, &scalar);
            point.serialize().to_vec()
        }
        // A payment hash that doesn't correspond to a valid scalar (out of
        // curve-order range, astronomically unlikely for a SHA-256 output)
        // has no corresponding point; carry the hash bytes through verbatim
        // so the field is still populated and comparable.
        Err(_) => payment_hash.as_bytes().to_vec(),
    }
}

fn parse_host_port(host: &str, port: u16) -> Result<PeerAddr, SqError> {
    format!("{host}:{port}")
        .parse()
        .map_err(|e| SqError::new(ErrorKind::InvalidItem, format!("bad offer address: {e}")))
}

#[cfg(test)]
mod test {
    use bitcoin::Network;
    use squeak_crypto::{ContentCrypto, KeyPair};
    use squeak_lightning::StubGateway;

    use super::*;

    fn sample_item() -> ContentItem {
        let crypto = ContentCrypto::new(Network::Regtest);
        let author = KeyPair::generate(Network::Regtest);
        crypto
            .make_item(
                &author,
                "paid content",
                Hash32::new([0u8; 32]),
                10,
                1_700_000_000,
                squeak_crypto::item::BlockHeader(vec![]),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn create_then_package_then_unpack_round_trips() {
        let gateway = Arc::new(StubGateway::new("02aa"));
        let engine = OfferEngine::new(gateway.clone(), MilliSats::from_sats(1_000));
        let item = sample_item();
        let buyer_addr: PeerAddr = "127.0.0.1:9001".parse().unwrap();

        let sent = engine
            .create_sent_offer(&item, buyer_addr, MilliSats::from_sats(5))
            .await
            .unwrap();
        assert_eq!(Hash32::digest(&sent.secret_key), sent.payment_hash);

        let wire = engine.package_offer(&sent, "127.0.0.1".to_owned(), 9735);
        let received = engine
            .unpack_offer(item.hash, &wire, buyer_addr)
            .await
            .unwrap();
        assert_eq!(received.payment_hash, sent.payment_hash);
        assert_eq!(received.price_msat, MilliSats::from_sats(5));
    }

    #[tokio::test]
    async fn rejects_offer_above_max_acceptable_price() {
        let gateway = Arc::new(StubGateway::new("02aa"));
        let engine = OfferEngine::new(gateway.clone(), MilliSats::from_sats(1));
        let item = sample_item();
        let buyer_addr: PeerAddr = "127.0.0.1:9001".parse().unwrap();

        let sent = engine
            .create_sent_offer(&item, buyer_addr, MilliSats::from_sats(5))
            .await
            .unwrap();
        let wire = engine.package_offer(&sent, "127.0.0.1".to_owned(), 9735);
        let result = engine.unpack_offer(item.hash, &wire, buyer_addr).await;
        assert!(result.is_err());
    }
}
