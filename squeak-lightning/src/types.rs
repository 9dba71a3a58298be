//! Value types crossing the [`crate::gateway::LightningGateway`] boundary
//! (spec §6's "Lightning gateway capability surface").

use squeak_common::{Hash32, MilliSats};

#[derive(Clone, Debug)]
pub struct NodeInfo {
    pub pubkey: String,
}

/// The result of decoding a BOLT11 payment request.
#[derive(Clone, Debug)]
pub struct DecodedPayReq {
    pub num_msat: MilliSats,
    pub payment_hash: Hash32,
    pub destination: String,
    /// Unix seconds the invoice was created.
    pub timestamp: i64,
    /// Seconds after `timestamp` the invoice is valid for.
    pub expiry: i64,
}

/// A settled invoice observed on the subscription stream.
#[derive(Clone, Debug)]
pub struct SettledInvoice {
    pub payment_hash: Hash32,
    pub settle_index: i64,
    pub amount_msat: MilliSats,
}

/// The outcome of a synchronous payment attempt.
#[derive(Clone, Debug)]
pub struct PaymentResult {
    /// Present iff the payment succeeded.
    pub preimage: Option<[u8; 32]>,
    pub payment_error: Option<String>,
}
