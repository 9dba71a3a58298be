//! Component wiring and the background task set (spec §5): builds the
//! store, crypto, Lightning gateway, `Controller`, and `PeerServer`, then
//! runs every periodic activity until shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use squeak_common::{config::NodeConfig, shutdown::ShutdownSignal, task::SqTask};
use squeak_crypto::{to_btc_network, ContentCrypto};
use squeak_engine::{Controller, Interest};
use squeak_lightning::StubGateway;
use squeak_p2p::{
    message::{CInterested, Message},
    ConnectionManager, PeerServer,
};
use squeak_store::Store;
use tracing::{info, warn};

/// How often the node rebuilds its `getsqueaks`/`sharesqueaks` locators and
/// broadcasts them to connected peers (spec §4.5 `sync_timeline`/
/// `share_items`).
const SYNC_INTERVAL: Duration = Duration::from_secs(60);
/// How often expired offers are reaped (spec §4.9).
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(300);
/// How often the received-payments self-check runs (a supplemented feature;
/// see `DESIGN.md`).
const PAYMENT_AUDIT_INTERVAL: Duration = Duration::from_secs(300);

pub struct Node {
    pub config: NodeConfig,
    pub controller: Arc<Controller>,
    pub manager: ConnectionManager,
    pub peer_server: Arc<PeerServer>,
    pub shutdown: ShutdownSignal,
}

impl Node {
    pub async fn init(config: NodeConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("failed to create data dir {}", config.data_dir.display()))?;

        let db_path = config.db_path();
        let store = {
            let config = config.clone();
            tokio::task::spawn_blocking(move || Store::connect(&config.db_path().to_string_lossy()))
                .await
                .context("store init task panicked")?
                .with_context(|| format!("failed to open store at {}", db_path.display()))?
        };

        let crypto = ContentCrypto::new(to_btc_network(config.network));

        // No real LND/CLN client is wired here: `squeak-lightning` only
        // specifies the gateway capability surface (spec §6), and a wire
        // integration with a concrete Lightning implementation is explicitly
        // out of scope. `StubGateway` lets the rest of the node (offers,
        // payments, settlement ingestion) run end to end in development.
        warn!(
            host = %config.lnd_host,
            port = config.lnd_port,
            "no Lightning backend integration is wired; using the in-memory stub gateway"
        );
        let gateway = Arc::new(StubGateway::new("squeak-node-dev"));

        let controller = Arc::new(Controller::new(store, crypto, gateway, config.clone()));
        let manager = ConnectionManager::new();
        let peer_server = Arc::new(PeerServer::new(&config, controller.clone(), manager.clone()));

        Ok(Self {
            config,
            controller,
            manager,
            peer_server,
            shutdown: ShutdownSignal::new(),
        })
    }

    /// Spawn every background activity and block until `shutdown` fires
    /// (via ctrl-c or an external caller), then drain them all.
    pub async fn run(self) -> anyhow::Result<()> {
        let mut tasks = Vec::with_capacity(5);

        tasks.push(SqTask::spawn("peer-server", {
            let peer_server = self.peer_server.clone();
            let shutdown = self.shutdown.clone();
            async move { peer_server.run(shutdown).await }
        }));

        tasks.push(SqTask::spawn("invoice-settlement", {
            let controller = self.controller.clone();
            let shutdown = self.shutdown.clone();
            async move {
                controller
                    .payment_engine()
                    .invoice_settlement_loop(controller.store(), shutdown)
                    .await;
            }
        }));

        tasks.push(SqTask::spawn("housekeeping", {
            let controller = self.controller.clone();
            let shutdown = self.shutdown.clone();
            async move { housekeeping_loop(controller, shutdown).await }
        }));

        tasks.push(SqTask::spawn("payment-audit", {
            let controller = self.controller.clone();
            let shutdown = self.shutdown.clone();
            async move { payment_audit_loop(controller, shutdown).await }
        }));

        tasks.push(SqTask::spawn("sync-broadcast", {
            let controller = self.controller.clone();
            let manager = self.manager.clone();
            let shutdown = self.shutdown.clone();
            async move { sync_broadcast_loop(controller, manager, shutdown).await }
        }));

        wait_for_shutdown_signal(&self.shutdown).await;
        info!("shutdown requested, draining background tasks");
        squeak_common::task::join_all(tasks).await;
        Ok(())
    }
}

/// Resolves once either `shutdown` fires (e.g. triggered by the admin
/// façade) or the process receives ctrl-c, whichever comes first.
async fn wait_for_shutdown_signal(shutdown: &ShutdownSignal) {
    tokio::select! {
        biased;
        _ = shutdown.recv() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                warn!(%err, "failed to listen for ctrl-c, shutting down anyway");
            }
            shutdown.send();
        }
    }
}

async fn housekeeping_loop(controller: Arc<Controller>, shutdown: ShutdownSignal) {
    let mut tick = tokio::time::interval(HOUSEKEEPING_INTERVAL);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => return,
            _ = tick.tick() => {
                if let Err(err) = controller.expire_offers().await {
                    warn!(%err, "failed to expire offers");
                }
            }
        }
    }
}

async fn payment_audit_loop(controller: Arc<Controller>, shutdown: ShutdownSignal) {
    let mut tick = tokio::time::interval(PAYMENT_AUDIT_INTERVAL);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => return,
            _ = tick.tick() => {
                match controller.verify_received_payments_consistency().await {
                    Ok(true) => {}
                    Ok(false) => warn!("received-payments consistency check failed, see above"),
                    Err(err) => warn!(%err, "received-payments consistency check errored"),
                }
            }
        }
    }
}

/// Rebuild this node's `getsqueaks`/`sharesqueaks` locators and broadcast
/// them to every connected peer, so the network converges on followed
/// content without anyone having to poll (spec §4.5).
async fn sync_broadcast_loop(
    controller: Arc<Controller>,
    manager: ConnectionManager,
    shutdown: ShutdownSignal,
) {
    let mut tick = tokio::time::interval(SYNC_INTERVAL);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => return,
            _ = tick.tick() => {
                match controller.sync_timeline_locator().await {
                    Ok(locator) if !locator.is_empty() => {
                        manager.broadcast(Message::GetSqueaks { locator: to_wire_locator(&locator) });
                    }
                    Ok(_) => {}
                    Err(err) => warn!(%err, "failed to build sync_timeline locator"),
                }
                match controller.share_items_locator().await {
                    Ok(locator) if !locator.is_empty() => {
                        manager.broadcast(Message::ShareSqueaks { locator: to_wire_locator(&locator) });
                    }
                    Ok(_) => {}
                    Err(err) => warn!(%err, "failed to build share_items locator"),
                }
            }
        }
    }
}

fn to_wire_locator(interests: &[Interest]) -> Vec<CInterested> {
    interests
        .iter()
        .map(|i| CInterested {
            address: i.address.as_str().to_owned(),
            min_block_height: i.min_block_height,
            max_block_height: i.max_block_height,
        })
        .collect()
}
