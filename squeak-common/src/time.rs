//! Timezone-aware timestamps. The [`Store`] persists every timestamp as UTC
//! (§4.9 of the spec); this newtype keeps the rest of the codebase from
//! accidentally reaching for a naive, timezone-less clock.
//!
//! [`Store`]: https://docs.rs/squeak-store

use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A UTC timestamp, serialized as RFC 3339.
#[derive(Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_unix_secs(secs: i64) -> Self {
        Self(
            Utc.timestamp_opt(secs, 0)
                .single()
                .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap()),
        )
    }

    pub fn unix_secs(&self) -> i64 {
        self.0.timestamp()
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Returns `true` if this timestamp is strictly before `now`.
    pub fn is_past(&self) -> bool {
        self.0 < Utc::now()
    }

    pub fn checked_add_secs(&self, secs: i64) -> Option<Self> {
        self.0
            .checked_add_signed(chrono::Duration::seconds(secs))
            .map(Self)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl TryFrom<SystemTime> for Timestamp {
    type Error = anyhow::Error;

    fn try_from(system_time: SystemTime) -> anyhow::Result<Self> {
        let dur = system_time
            .duration_since(UNIX_EPOCH)
            .map_err(|_| anyhow::anyhow!("SystemTime is before the epoch"))?;
        Ok(Self::from_unix_secs(dur.as_secs() as i64))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({self})")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unix_secs_roundtrip() {
        let ts = Timestamp::from_unix_secs(1_700_000_000);
        assert_eq!(ts.unix_secs(), 1_700_000_000);
    }

    #[test]
    fn checked_add_secs_advances_forward() {
        let ts = Timestamp::from_unix_secs(100);
        let later = ts.checked_add_secs(3600).unwrap();
        assert_eq!(later.unix_secs(), 3700);
    }
}
