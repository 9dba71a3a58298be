//! The Lightning node capability surface (spec §6), abstracted behind a
//! trait so `squeak-engine` never speaks to a concrete backend (LND, CLN,
//! ...) directly.

use async_trait::async_trait;
use futures::stream::BoxStream;
use squeak_common::{Hash32, MilliSats};

use crate::{
    error::LightningError,
    types::{DecodedPayReq, NodeInfo, PaymentResult, SettledInvoice},
};

#[async_trait]
pub trait LightningGateway: Send + Sync {
    async fn get_info(&self) -> Result<NodeInfo, LightningError>;

    async fn decode_pay_req(&self, payment_request: &str) -> Result<DecodedPayReq, LightningError>;

    /// Request a hold invoice for `price_msat` whose payment hash is
    /// `payment_hash` (the hash of the item's decryption key). The gateway
    /// does not learn the preimage; it only holds the HTLC until something
    /// external settles it.
    async fn add_hold_invoice(
        &self,
        price_msat: MilliSats,
        payment_hash: Hash32,
    ) -> Result<String, LightningError>;

    /// A stream of settlements, starting from (but not including) the given
    /// `settle_index`. The stream never completes under normal operation;
    /// it yields `Err` on a reconnect-worthy failure, and the caller is
    /// expected to re-subscribe from the last persisted index.
    async fn subscribe_invoices(
        &self,
        from_settle_index: i64,
    ) -> Result<BoxStream<'static, Result<SettledInvoice, LightningError>>, LightningError>;

    async fn send_payment_sync(
        &self,
        payment_request: &str,
    ) -> Result<PaymentResult, LightningError>;
}
