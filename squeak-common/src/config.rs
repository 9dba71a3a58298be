//! Node configuration: the environment/config surface enumerated in spec §6,
//! loadable from a TOML file and overridable by CLI flags.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::amount::MilliSats;

/// Which Bitcoin network the node (and its Lightning backend) operates on.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl Default for Network {
    fn default() -> Self {
        Self::Regtest
    }
}

/// Rate-limiter parameters: admit at most `count` items per author within a
/// sliding window of `window_blocks` blocks (§4.2).
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub count: u32,
    pub window_blocks: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            count: 10,
            window_blocks: 10,
        }
    }
}

/// Full node configuration, the union of every option spec §6 names.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Default price for items this node sells when no explicit price is
    /// given at authoring time.
    pub price_msat: MilliSats,
    /// A buyer-side ceiling: offers quoting more than this are rejected
    /// during `unpack_offer` (§4.3).
    pub max_acceptable_price_msat: MilliSats,
    /// How long an expired SentOffer lingers before `delete_expired_sent_offers`
    /// reaps it, in seconds.
    pub sent_offer_retention_s: i64,
    /// How long an item is retained after it becomes eligible for deletion
    /// under the retention policy, in seconds.
    pub squeak_retention_s: i64,
    /// The block-height window width used by `sync_timeline`/`share_items`
    /// when building a `CInterested` locator.
    pub block_interval: u32,

    pub network: Network,

    /// Port the peer listener binds.
    pub peer_port: u16,
    /// Port the admin RPC façade binds.
    pub admin_port: u16,

    /// LND (or compatible) RPC host.
    pub lnd_host: String,
    /// LND (or compatible) RPC port.
    pub lnd_port: u16,
    /// Network the configured Lightning backend itself is running on; kept
    /// distinct from `network` since a node can be misconfigured to point at
    /// a backend on the wrong chain, which we want to detect rather than
    /// silently assume matches.
    pub lnd_network: Network,

    /// This node's externally reachable Lightning host, advertised inside
    /// `Offer` messages so buyers know where to send payment.
    pub external_ln_host: String,
    pub external_ln_port: u16,

    pub rate_limit: RateLimitConfig,

    /// Minimum number of outbound peer connections the server tries to
    /// maintain (§4.8).
    pub min_peers: u32,
    /// Maximum number of peer connections (inbound + outbound) held at once.
    pub max_peers: u32,

    /// Seconds a freshly accepted/dialed connection has to complete the
    /// version/verack handshake before being dropped (§4.6).
    pub handshake_timeout_s: u64,
    /// Seconds a peer has to reply to a `ping` before the connection is
    /// closed (§4.6).
    pub ping_timeout_s: u64,

    /// Capacity of each peer connection's outbound message queue; exceeding
    /// it closes the connection (§4.6 backpressure).
    pub outbound_queue_capacity: usize,

    /// On-disk location of the sqlite database file.
    pub data_dir: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            price_msat: MilliSats::from_sats(1),
            max_acceptable_price_msat: MilliSats::from_sats(1_000),
            sent_offer_retention_s: 3600,
            squeak_retention_s: 30 * 24 * 3600,
            block_interval: 10,
            network: Network::default(),
            peer_port: 8555,
            admin_port: 8994,
            lnd_host: "127.0.0.1".to_owned(),
            lnd_port: 10009,
            lnd_network: Network::default(),
            external_ln_host: "127.0.0.1".to_owned(),
            external_ln_port: 9735,
            rate_limit: RateLimitConfig::default(),
            min_peers: 3,
            max_peers: 12,
            handshake_timeout_s: 10,
            ping_timeout_s: 30,
            outbound_queue_capacity: 256,
            data_dir: PathBuf::from("./squeak-data"),
        }
    }
}

impl NodeConfig {
    /// Parse a config from TOML text, falling back to defaults for any
    /// field the file omits.
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let cfg = toml::from_str(s)?;
        Ok(cfg)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("squeak.sqlite3")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg = NodeConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.peer_port, 8555);
        assert_eq!(cfg.rate_limit.count, 10);
    }

    #[test]
    fn partial_toml_overrides_only_given_fields() {
        let cfg = NodeConfig::from_toml_str("peer_port = 9000\n").unwrap();
        assert_eq!(cfg.peer_port, 9000);
        assert_eq!(cfg.admin_port, 8994);
    }
}
