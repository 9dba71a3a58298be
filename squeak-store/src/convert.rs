//! Small conversions between domain types and the column-level encodings
//! diesel's sqlite backend is happy with (hex strings for fixed-size byte
//! arrays, `NaiveDateTime` for timestamps).

use std::{net::IpAddr, str::FromStr};

use chrono::{DateTime, NaiveDateTime, Utc};
use squeak_common::{Hash32, PeerAddr, Timestamp};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("invalid hex column: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("invalid 32-byte column length: expected 32, got {0}")]
    BadLength(usize),
    #[error("invalid address column: {0}")]
    Addr(String),
}

pub fn timestamp_to_naive(ts: Timestamp) -> NaiveDateTime {
    ts.as_datetime().naive_utc()
}

pub fn naive_to_timestamp(naive: NaiveDateTime) -> Timestamp {
    Timestamp::from(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

pub fn hash_to_hex(hash: Hash32) -> String {
    hash.to_string()
}

pub fn hex_to_hash(s: &str) -> Result<Hash32, ConvertError> {
    Ok(Hash32::from_hex(s)?)
}

pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    hex::encode(bytes)
}

pub fn hex_to_bytes32(s: &str) -> Result<[u8; 32], ConvertError> {
    let decoded = hex::decode(s)?;
    decoded
        .try_into()
        .map_err(|v: Vec<u8>| ConvertError::BadLength(v.len()))
}

pub fn addr_to_host_port(addr: PeerAddr) -> (String, i32) {
    (addr.ip.to_string(), addr.port as i32)
}

pub fn host_port_to_addr(host: &str, port: i32) -> Result<PeerAddr, ConvertError> {
    let ip = IpAddr::from_str(host)
        .map_err(|e| ConvertError::Addr(format!("{host}: {e}")))?;
    Ok(PeerAddr::new(ip, port as u16))
}
