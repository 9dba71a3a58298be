//! Buyer-side payment and seller-side settlement ingestion (spec §4.4).

use std::sync::Arc;

use futures::StreamExt;
use squeak_common::{backoff, shutdown::ShutdownSignal, Hash32, PeerAddr, SqError, Timestamp};
use squeak_lightning::LightningGateway;
use squeak_store::{ReceivedOffer, ReceivedPayment, SentPayment, Store};
use tracing::{info, warn};

pub struct PaymentEngine {
    gateway: Arc<dyn LightningGateway>,
}

impl PaymentEngine {
    pub fn new(gateway: Arc<dyn LightningGateway>) -> Self {
        Self { gateway }
    }

    /// Buyer path: pay a `ReceivedOffer`'s invoice and check whether the
    /// returned preimage is the key this offer promised. This method does
    /// not touch the store or `ContentCrypto` — callers (the `Controller`)
    /// persist the result and drive the key-install/check_decrypted step.
    pub async fn pay_offer(
        &self,
        received_offer: &ReceivedOffer,
        peer_addr: PeerAddr,
    ) -> Result<SentPayment, SqError> {
        let result = self
            .gateway
            .send_payment_sync(&received_offer.payment_request)
            .await
            .map_err(SqError::from)?;

        let (secret_key, valid) = match result.preimage {
            Some(preimage) => {
                let valid = Hash32::digest(&preimage) == received_offer.payment_hash;
                (preimage, valid)
            }
            None => {
                warn!(
                    error = result.payment_error.as_deref().unwrap_or("unknown"),
                    "payment failed"
                );
                ([0u8; 32], false)
            }
        };

        Ok(SentPayment {
            sent_payment_id: 0,
            created_at: Timestamp::now(),
            peer_addr,
            item_hash: received_offer.item_hash,
            payment_hash: received_offer.payment_hash,
            secret_key,
            price_msat: received_offer.price_msat,
            node_pubkey: received_offer.destination.clone(),
            valid,
        })
    }

    /// Seller path: consume the settlement subscription forever, recording
    /// each settled invoice and marking its `SentOffer` paid. On a stream
    /// error, backs off and re-subscribes from the last persisted index —
    /// this guarantees no missed settlements and, via `payment_hash`
    /// uniqueness, at-most-once insertion on replay.
    pub async fn invoice_settlement_loop(&self, store: &Store, shutdown: ShutdownSignal) {
        loop {
            let from_index = store
                .latest_received_payment_index()
                .await
                .unwrap_or_default()
                .unwrap_or(0);

            let mut stream = match self.gateway.subscribe_invoices(from_index).await {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(%err, "failed to open invoice subscription, retrying");
                    if wait_or_shutdown(&shutdown).await {
                        return;
                    }
                    continue;
                }
            };

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => {
                        info!("invoice settlement loop shutting down");
                        return;
                    }
                    next = stream.next() => {
                        match next {
                            Some(Ok(settled)) => {
                                let matching_offer = store
                                    .get_sent_offer_by_payment_hash(settled.payment_hash)
                                    .await
                                    .ok()
                                    .flatten();
                                let Some(matching_offer) = matching_offer else {
                                    warn!(
                                        payment_hash = %settled.payment_hash,
                                        "settled an invoice with no matching SentOffer, dropping"
                                    );
                                    continue;
                                };

                                let inserted = store
                                    .finalize_received_payment(&ReceivedPayment {
                                        received_payment_id: 0,
                                        created_at: Timestamp::now(),
                                        item_hash: matching_offer.item_hash,
                                        payment_hash: settled.payment_hash,
                                        price_msat: settled.amount_msat,
                                        settle_index: settled.settle_index,
                                        client_addr: matching_offer.client_addr,
                                    })
                                    .await
                                    .unwrap_or(false);
                                if !inserted {
                                    info!(settle_index = settled.settle_index, "settlement already recorded, ignoring replay");
                                }
                            }
                            Some(Err(err)) => {
                                warn!(%err, "invoice subscription stream errored, reconnecting");
                                break;
                            }
                            None => {
                                warn!("invoice subscription stream ended, reconnecting");
                                break;
                            }
                        }
                    }
                }
            }

            if wait_or_shutdown(&shutdown).await {
                return;
            }
        }
    }
}

/// Sleep one backoff interval, returning `true` if shutdown fired first.
async fn wait_or_shutdown(shutdown: &ShutdownSignal) -> bool {
    let delay = backoff::get_backoff_iter().next().expect("infinite iterator");
    tokio::select! {
        biased;
        _ = shutdown.recv() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

#[cfg(test)]
mod test {
    use bitcoin::Network;
    use squeak_common::MilliSats;
    use squeak_lightning::{types::PaymentResult, StubGateway};

    use super::*;

    fn sample_received_offer(payment_hash: Hash32, payment_request: String) -> ReceivedOffer {
        ReceivedOffer {
            received_offer_id: 0,
            created_at: Timestamp::now(),
            item_hash: Hash32::digest(b"item"),
            payment_hash,
            nonce: [0u8; 32],
            payment_point: vec![],
            invoice_timestamp: Timestamp::now().unix_secs(),
            invoice_expiry: 3600,
            price_msat: MilliSats::from_sats(5),
            payment_request,
            destination: "02aa".to_owned(),
            lightning_addr: "127.0.0.1:9735".parse().unwrap(),
            peer_addr: "127.0.0.1:9000".parse().unwrap(),
            paid: false,
        }
    }

    #[tokio::test]
    async fn successful_payment_is_marked_valid() {
        let _ = Network::Regtest;
        let gateway = Arc::new(StubGateway::new("02aa"));
        let key = [7u8; 32];
        let payment_hash = Hash32::digest(&key);
        let pr = gateway
            .add_hold_invoice(MilliSats::from_sats(5), payment_hash)
            .await
            .unwrap();
        gateway.force_next_payment_result(PaymentResult {
            preimage: Some(key),
            payment_error: None,
        });

        let engine = PaymentEngine::new(gateway);
        let offer = sample_received_offer(payment_hash, pr);
        let sent = engine
            .pay_offer(&offer, "127.0.0.1:9000".parse().unwrap())
            .await
            .unwrap();
        assert!(sent.valid);
        assert_eq!(sent.secret_key, key);
    }

    #[tokio::test]
    async fn mismatched_preimage_is_marked_invalid() {
        let gateway = Arc::new(StubGateway::new("02aa"));
        let payment_hash = Hash32::digest(&[7u8; 32]);
        let pr = gateway
            .add_hold_invoice(MilliSats::from_sats(5), payment_hash)
            .await
            .unwrap();
        gateway.force_next_payment_result(PaymentResult {
            preimage: Some([9u8; 32]),
            payment_error: None,
        });

        let engine = PaymentEngine::new(gateway);
        let offer = sample_received_offer(payment_hash, pr);
        let sent = engine
            .pay_offer(&offer, "127.0.0.1:9000".parse().unwrap())
            .await
            .unwrap();
        assert!(!sent.valid);
    }
}
