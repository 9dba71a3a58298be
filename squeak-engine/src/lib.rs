//! The payment-gated content exchange engine: rate limiting, offer
//! generation/acceptance, payment execution/settlement, and the `Controller`
//! orchestrator that ties them to the `Store` (spec §4.2-§4.5).

pub mod controller;
pub mod offer;
pub mod payment;
pub mod rate_limiter;

pub use controller::{Controller, InvItem, InvKind, Interest};
pub use offer::{OfferEngine, WireOffer};
pub use payment::PaymentEngine;
pub use rate_limiter::RateLimiter;
