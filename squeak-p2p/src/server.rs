//! The peer server (spec §4.8): accepts inbound connections, dials
//! configured peers with backoff, and keeps the connection count within
//! `[min_peers, max_peers]`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use squeak_common::{
    backoff, config::NodeConfig, shutdown::ShutdownSignal, task::SqTask, ErrorKind, PeerAddr,
    SqError,
};
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tracing::{info, warn};

use crate::{
    connection::{self, PeerConnConfig, Role},
    manager::ConnectionManager,
    ops::PeerOps,
};

/// How often the peer-maintenance loop checks whether more outbound
/// connections are needed.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(15);

pub struct PeerServer {
    ops: Arc<dyn PeerOps>,
    conn_config: Arc<PeerConnConfig>,
    manager: ConnectionManager,
    min_peers: u32,
    max_peers: u32,
    listen_addr: SocketAddr,
}

impl PeerServer {
    pub fn new(config: &NodeConfig, ops: Arc<dyn PeerOps>, manager: ConnectionManager) -> Self {
        let conn_config = Arc::new(PeerConnConfig {
            handshake_timeout: Duration::from_secs(config.handshake_timeout_s),
            ping_timeout: Duration::from_secs(config.ping_timeout_s),
            outbound_queue_capacity: config.outbound_queue_capacity,
            listen_port: config.peer_port,
            user_agent: format!("squeak-node/{}", env!("CARGO_PKG_VERSION")),
        });
        Self {
            ops,
            conn_config,
            manager,
            min_peers: config.min_peers,
            max_peers: config.max_peers,
            listen_addr: SocketAddr::new([0, 0, 0, 0].into(), config.peer_port),
        }
    }

    pub fn manager(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Run the listener and the outbound maintenance loop until `shutdown`
    /// fires. Spawned as one top-level [`SqTask`] by the binary.
    pub async fn run(self: Arc<Self>, shutdown: ShutdownSignal) {
        let listener = match TcpListener::bind(self.listen_addr).await {
            Ok(l) => l,
            Err(err) => {
                warn!(%err, addr = %self.listen_addr, "failed to bind peer listener");
                return;
            }
        };
        info!(addr = %self.listen_addr, "peer listener bound");

        let accept_loop = {
            let this = self.clone();
            let shutdown = shutdown.clone();
            SqTask::spawn("peer-accept-loop", async move {
                this.accept_loop(listener, shutdown).await;
            })
        };
        let maintenance_loop = {
            let this = self.clone();
            let shutdown = shutdown.clone();
            SqTask::spawn("peer-maintenance-loop", async move {
                this.maintenance_loop(shutdown).await;
            })
        };

        accept_loop.join().await;
        maintenance_loop.join().await;
        self.manager.close_all();
    }

    async fn accept_loop(&self, listener: TcpListener, shutdown: ShutdownSignal) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("peer accept loop shutting down");
                    return;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((socket, remote)) => self.accept_one(socket, remote.into(), shutdown.clone()).await,
                        Err(err) => warn!(%err, "failed to accept inbound connection"),
                    }
                }
            }
        }
    }

    async fn accept_one(&self, socket: TcpStream, addr: PeerAddr, shutdown: ShutdownSignal) {
        if self.manager.len() as u32 >= self.max_peers {
            info!(peer = %addr, "rejecting inbound connection, at max_peers");
            return;
        }
        if self.manager.contains(&addr) {
            return;
        }
        self.spawn_connection(socket, addr, Role::Inbound, shutdown).await;
    }

    async fn spawn_connection(
        &self,
        socket: TcpStream,
        addr: PeerAddr,
        role: Role,
        shutdown: ShutdownSignal,
    ) {
        let result = connection::spawn(
            socket,
            addr,
            role,
            self.ops.clone(),
            self.conn_config.clone(),
            self.manager.clone(),
            shutdown,
        )
        .await;
        match result {
            Ok(handle) => self.manager.insert(handle),
            Err(err) => warn!(peer = %addr, %err, "handshake failed"),
        }
    }

    /// `dial(host, port)` (spec §4.8): resolve `host`, skip if this node is
    /// already connected to the resolved address, and spawn an outbound
    /// `PeerConnection`. Standalone so both the maintenance loop's peer
    /// top-up and the admin façade's "connect this newly added peer now"
    /// path go through the same dedupe-and-spawn logic.
    pub async fn dial(&self, host: &str, port: u16, shutdown: ShutdownSignal) -> Result<(), SqError> {
        let mut resolved = lookup_host((host, port)).await.map_err(|e| {
            SqError::new(
                ErrorKind::PeerUnreachable,
                format!("failed to resolve {host}:{port}: {e}"),
            )
        })?;
        let socket_addr = resolved.next().ok_or_else(|| {
            SqError::new(
                ErrorKind::PeerUnreachable,
                format!("{host}:{port} resolved to no addresses"),
            )
        })?;
        let addr = PeerAddr::from(socket_addr);

        if self.manager.contains(&addr) {
            return Ok(());
        }

        let socket = TcpStream::connect(socket_addr).await.map_err(|e| {
            SqError::new(ErrorKind::PeerUnreachable, format!("dial to {addr} failed: {e}"))
        })?;
        self.spawn_connection(socket, addr, Role::Outbound, shutdown).await;
        Ok(())
    }

    /// Keep at least `min_peers` outbound connections open, dialing the
    /// node's configured downloading peers (spec §4.8) with exponential
    /// backoff on failure.
    async fn maintenance_loop(&self, shutdown: ShutdownSignal) {
        let mut tick = tokio::time::interval(MAINTENANCE_INTERVAL);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("peer maintenance loop shutting down");
                    return;
                }
                _ = tick.tick() => {
                    self.top_up_outbound(&shutdown).await;
                }
            }
        }
    }

    async fn top_up_outbound(&self, shutdown: &ShutdownSignal) {
        let current = self.manager.len() as u32;
        if current >= self.min_peers {
            return;
        }

        let candidates = match self.ops.downloading_peers().await {
            Ok(peers) => peers,
            Err(err) => {
                warn!(%err, "failed to load configured peers");
                return;
            }
        };

        let mut backoffs = backoff::get_backoff_iter();
        for candidate in candidates {
            if self.manager.len() as u32 >= self.min_peers {
                break;
            }
            if let Err(err) = self.dial(&candidate.host, candidate.port, shutdown.clone()).await {
                warn!(host = %candidate.host, port = candidate.port, %err, "outbound dial failed");
                let delay = backoffs.next().expect("infinite iterator");
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
