//! An in-memory fake [`LightningGateway`], for tests and local development
//! without a real LND/CLN backend — the `Stub` provider pattern.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use squeak_common::{Hash32, MilliSats};
use tokio::sync::mpsc;

use crate::{
    error::LightningError,
    gateway::LightningGateway,
    types::{DecodedPayReq, NodeInfo, PaymentResult, SettledInvoice},
};

struct HeldInvoice {
    price_msat: MilliSats,
    payment_hash: Hash32,
    payment_request: String,
    timestamp: i64,
    expiry: i64,
}

struct Inner {
    pubkey: String,
    invoices: HashMap<String, HeldInvoice>,
    next_settle_index: i64,
    settle_tx: Option<mpsc::UnboundedSender<Result<SettledInvoice, LightningError>>>,
    /// If set, `send_payment_sync` returns this instead of looking up a
    /// preimage normally — lets tests force a preimage mismatch or failure.
    forced_payment_result: Option<PaymentResult>,
}

/// A stub Lightning gateway that settles invoices on command via
/// [`StubGateway::settle`], rather than through a real network.
#[derive(Clone)]
pub struct StubGateway {
    inner: Arc<Mutex<Inner>>,
}

impl StubGateway {
    pub fn new(pubkey: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                pubkey: pubkey.into(),
                invoices: HashMap::new(),
                next_settle_index: 1,
                settle_tx: None,
                forced_payment_result: None,
            })),
        }
    }

    /// Mark the invoice with `payment_hash` settled, pushing an event to any
    /// active subscription.
    pub fn settle(&self, payment_hash: Hash32, amount_msat: MilliSats) {
        let mut inner = self.inner.lock().unwrap();
        let settle_index = inner.next_settle_index;
        inner.next_settle_index += 1;
        let event = SettledInvoice {
            payment_hash,
            settle_index,
            amount_msat,
        };
        if let Some(tx) = &inner.settle_tx {
            let _ = tx.send(Ok(event));
        }
    }

    pub fn force_next_payment_result(&self, result: PaymentResult) {
        self.inner.lock().unwrap().forced_payment_result = Some(result);
    }
}

#[async_trait]
impl LightningGateway for StubGateway {
    async fn get_info(&self) -> Result<NodeInfo, LightningError> {
        Ok(NodeInfo {
            pubkey: self.inner.lock().unwrap().pubkey.clone(),
        })
    }

    async fn decode_pay_req(&self, payment_request: &str) -> Result<DecodedPayReq, LightningError> {
        let inner = self.inner.lock().unwrap();
        let invoice = inner.invoices.get(payment_request).ok_or_else(|| {
            LightningError::InvalidPayReq(format!("unknown payment request {payment_request}"))
        })?;
        Ok(DecodedPayReq {
            num_msat: invoice.price_msat,
            payment_hash: invoice.payment_hash,
            destination: inner.pubkey.clone(),
            timestamp: invoice.timestamp,
            expiry: invoice.expiry,
        })
    }

    async fn add_hold_invoice(
        &self,
        price_msat: MilliSats,
        payment_hash: Hash32,
    ) -> Result<String, LightningError> {
        let mut inner = self.inner.lock().unwrap();
        let payment_request = format!("lnstub1{payment_hash}");
        inner.invoices.insert(
            payment_request.clone(),
            HeldInvoice {
                price_msat,
                payment_hash,
                payment_request: payment_request.clone(),
                timestamp: squeak_common::Timestamp::now().unix_secs(),
                expiry: 3600,
            },
        );
        Ok(payment_request)
    }

    async fn subscribe_invoices(
        &self,
        _from_settle_index: i64,
    ) -> Result<BoxStream<'static, Result<SettledInvoice, LightningError>>, LightningError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().unwrap().settle_tx = Some(tx);
        Ok(
            stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed(),
        )
    }

    async fn send_payment_sync(
        &self,
        payment_request: &str,
    ) -> Result<PaymentResult, LightningError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(forced) = inner.forced_payment_result.take() {
            return Ok(forced);
        }
        if !inner.invoices.contains_key(payment_request) {
            return Err(LightningError::InvalidPayReq(format!(
                "unknown payment request {payment_request}"
            )));
        }
        // With no forced result configured, simulate total payment failure
        // (we, a stub, don't know the real preimage); tests that want a
        // successful payment should call `force_next_payment_result`.
        Ok(PaymentResult {
            preimage: None,
            payment_error: Some("stub gateway cannot produce a real preimage".to_owned()),
        })
    }
}
