//! A partial real-backend adapter (spec §1: "the Lightning node itself
//! (only its capability surface is specified)").
//!
//! Decoding a BOLT11 payment request needs no round-trip to a running
//! node — it's pure parsing — so that one method is implemented for real,
//! against `lightning-invoice`. The remaining capabilities (issuing a hold
//! invoice, subscribing to settlements, sending a payment) require a live
//! RPC session with an LND/CLN node, which is out of scope for this crate;
//! they return `LightningError::Unavailable` until a concrete RPC client is
//! wired in. `squeak-node` defaults to [`crate::stub::StubGateway`] for
//! anything beyond decoding until that wiring exists.

use std::str::FromStr;

use async_trait::async_trait;
use futures::stream::BoxStream;
use lightning_invoice::Invoice;
use squeak_common::{Hash32, MilliSats};

use crate::{
    error::LightningError,
    gateway::LightningGateway,
    types::{DecodedPayReq, NodeInfo, PaymentResult, SettledInvoice},
};

/// Connection details for a real LND (or compatible) node's RPC endpoint.
#[derive(Clone, Debug)]
pub struct LndConfig {
    pub host: String,
    pub port: u16,
}

pub struct LndGateway {
    config: LndConfig,
}

impl LndGateway {
    pub fn new(config: LndConfig) -> Self {
        Self { config }
    }

    fn rpc_unavailable(&self, what: &str) -> LightningError {
        LightningError::Unavailable(format!(
            "{what} requires a live RPC session with {}:{}, which is not wired in this build",
            self.config.host, self.config.port
        ))
    }
}

#[async_trait]
impl LightningGateway for LndGateway {
    async fn get_info(&self) -> Result<NodeInfo, LightningError> {
        Err(self.rpc_unavailable("get_info"))
    }

    /// Decode a BOLT11 payment request locally, with no node round-trip.
    async fn decode_pay_req(&self, payment_request: &str) -> Result<DecodedPayReq, LightningError> {
        let invoice = Invoice::from_str(payment_request)
            .map_err(|e| LightningError::InvalidPayReq(e.to_string()))?;

        let num_msat = invoice.amount_milli_satoshis().ok_or_else(|| {
            LightningError::InvalidPayReq("invoice carries no amount".to_owned())
        })?;
        let mut hash_bytes = [0u8; 32];
        hash_bytes.copy_from_slice(invoice.payment_hash().as_ref());
        let payment_hash = Hash32::new(hash_bytes);
        let destination = invoice.recover_payee_pub_key().to_string();
        let timestamp = invoice
            .timestamp()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let expiry = invoice.expiry_time().as_secs() as i64;

        Ok(DecodedPayReq {
            num_msat: MilliSats::from_msat(num_msat),
            payment_hash,
            destination,
            timestamp,
            expiry,
        })
    }

    async fn add_hold_invoice(
        &self,
        _price_msat: MilliSats,
        _payment_hash: Hash32,
    ) -> Result<String, LightningError> {
        Err(self.rpc_unavailable("add_hold_invoice"))
    }

    async fn subscribe_invoices(
        &self,
        _from_settle_index: i64,
    ) -> Result<BoxStream<'static, Result<SettledInvoice, LightningError>>, LightningError> {
        Err(self.rpc_unavailable("subscribe_invoices"))
    }

    async fn send_payment_sync(
        &self,
        _payment_request: &str,
    ) -> Result<PaymentResult, LightningError> {
        Err(self.rpc_unavailable("send_payment_sync"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn rpc_dependent_methods_report_unavailable() {
        let gw = LndGateway::new(LndConfig {
            host: "127.0.0.1".to_owned(),
            port: 10009,
        });
        assert!(gw.get_info().await.is_err());
        assert!(gw.add_hold_invoice(MilliSats::from_sats(1), Hash32::digest(b"x")).await.is_err());
        assert!(gw.send_payment_sync("lnbc...").await.is_err());
    }

    #[tokio::test]
    async fn decode_pay_req_rejects_malformed_input() {
        let gw = LndGateway::new(LndConfig {
            host: "127.0.0.1".to_owned(),
            port: 10009,
        });
        let result = gw.decode_pay_req("not-an-invoice").await;
        assert!(matches!(result, Err(LightningError::InvalidPayReq(_))));
    }
}
