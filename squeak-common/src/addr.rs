//! Peer network addresses.

use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

/// The address of a peer on the network, as exchanged in `version` messages
/// and stored in the peer table.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PeerAddr {
    pub ip: IpAddr,
    pub port: u16,
}

impl PeerAddr {
    pub const fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }
}

impl From<SocketAddr> for PeerAddr {
    fn from(sa: SocketAddr) -> Self {
        Self::new(sa.ip(), sa.port())
    }
}

impl From<PeerAddr> for SocketAddr {
    fn from(pa: PeerAddr) -> Self {
        SocketAddr::new(pa.ip, pa.port)
    }
}

impl FromStr for PeerAddr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sa: SocketAddr = s
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid peer address '{s}': {e}"))?;
        Ok(sa.into())
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", SocketAddr::from(*self))
    }
}

impl fmt::Debug for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerAddr({self})")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_ipv4_socket_addr() {
        let pa: PeerAddr = "127.0.0.1:8555".parse().unwrap();
        assert_eq!(pa.port, 8555);
        assert_eq!(pa.to_string(), "127.0.0.1:8555");
    }

    #[test]
    fn rejects_missing_port() {
        assert!("127.0.0.1".parse::<PeerAddr>().is_err());
    }
}
