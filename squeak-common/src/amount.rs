//! A millisatoshi amount newtype. We don't impl `From<u64>` implicitly in
//! arithmetic-heavy contexts so call sites stay explicit about units, the way
//! `common::ln::amount::Amount` does for the Bitcoin-unit family.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An amount denominated in millisatoshis (the native unit of a Lightning
/// invoice / HTLC).
#[derive(
    Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MilliSats(pub u64);

impl MilliSats {
    pub const ZERO: MilliSats = MilliSats(0);

    pub const fn from_msat(msat: u64) -> Self {
        Self(msat)
    }

    pub const fn from_sats(sats: u64) -> Self {
        Self(sats * 1000)
    }

    pub const fn msat(self) -> u64 {
        self.0
    }

    pub const fn sats(self) -> u64 {
        self.0 / 1000
    }
}

impl fmt::Display for MilliSats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} msat", self.0)
    }
}

impl fmt::Debug for MilliSats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MilliSats({})", self.0)
    }
}

impl std::ops::Add for MilliSats {
    type Output = MilliSats;
    fn add(self, rhs: Self) -> Self::Output {
        MilliSats(self.0.saturating_add(rhs.0))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sats_and_msat_conversion() {
        let a = MilliSats::from_sats(5);
        assert_eq!(a.msat(), 5000);
        assert_eq!(a.sats(), 5);
    }

    proptest::proptest! {
        #[test]
        fn json_roundtrip_arbitrary_amount(msat: u64) {
            let a = MilliSats::from_msat(msat);
            let json = serde_json::to_string(&a).unwrap();
            let b: MilliSats = serde_json::from_str(&json).unwrap();
            proptest::prop_assert_eq!(a, b);
        }

        #[test]
        fn add_never_exceeds_u64_max(a: u64, b: u64) {
            let sum = MilliSats::from_msat(a) + MilliSats::from_msat(b);
            proptest::prop_assert_eq!(sum.msat(), a.saturating_add(b));
        }
    }
}
