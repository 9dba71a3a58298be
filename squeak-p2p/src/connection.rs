//! Per-peer session state machine (spec §4.6): `HANDSHAKING -> ESTABLISHED
//! -> CLOSING -> CLOSED`, with one reader and one writer activity per
//! connection (spec §5) communicating with the rest of the node only
//! through a bounded outbound queue and the [`PeerOps`] interface.

use std::{sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use squeak_common::{
    shutdown::ShutdownSignal, task::SqTask, ErrorKind, Hash32, PeerAddr, SqError,
};
use squeak_crypto::Address;
use squeak_engine::{offer::WireOffer, InvItem, InvKind, Interest};
use tokio::{net::TcpStream, sync::mpsc, time};
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument, warn};

use crate::{
    codec::MessageCodec,
    manager::ConnectionManager,
    message::{CInterested, CSqueakLocator, InvEntry, InvType, Message, VersionPayload},
    ops::PeerOps,
    PROTOCOL_VERSION,
};

/// Which side initiated the TCP connection. Only used for logging: the
/// handshake itself is symmetric (spec §9 open question, resolved in
/// `DESIGN.md`).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Role {
    Inbound,
    Outbound,
}

#[derive(Clone, Debug)]
pub struct PeerConnConfig {
    pub handshake_timeout: Duration,
    pub ping_timeout: Duration,
    pub outbound_queue_capacity: usize,
    /// This node's own peer-listener port, advertised in `version` so a
    /// peer can dial us back.
    pub listen_port: u16,
    pub user_agent: String,
}

/// A lightweight, cloneable handle to a running connection, held by
/// [`ConnectionManager`]. Sending never blocks: the outbound queue is
/// bounded, and a full queue closes the connection rather than stalling the
/// caller (spec §4.6 backpressure).
#[derive(Clone)]
pub struct PeerHandle {
    addr: PeerAddr,
    outbound_tx: mpsc::Sender<Message>,
    close_signal: ShutdownSignal,
}

impl PeerHandle {
    pub fn addr(&self) -> PeerAddr {
        self.addr
    }

    /// Enqueue `msg` for delivery. Returns `false` (and closes the
    /// connection) if the outbound queue is full.
    pub fn send(&self, msg: Message) -> bool {
        match self.outbound_tx.try_send(msg) {
            Ok(()) => true,
            Err(_) => {
                warn!(peer = %self.addr, "outbound queue full, closing slow peer");
                self.close_signal.send();
                false
            }
        }
    }

    pub fn close(&self) {
        self.close_signal.send();
    }

    pub fn is_closed(&self) -> bool {
        self.close_signal.is_shutdown()
    }

    #[cfg(test)]
    pub(crate) fn for_test(addr: PeerAddr, outbound_tx: mpsc::Sender<Message>) -> Self {
        Self {
            addr,
            outbound_tx,
            close_signal: ShutdownSignal::new(),
        }
    }
}

/// Spawn the reader and writer activities for an already-accepted/dialed
/// socket, running the handshake inline before splitting into the two
/// long-running halves. Returns the handle the caller should register with
/// [`ConnectionManager`].
#[instrument(skip(socket, ops, config, manager, shutdown), fields(peer = %addr))]
pub async fn spawn(
    socket: TcpStream,
    addr: PeerAddr,
    role: Role,
    ops: Arc<dyn PeerOps>,
    config: Arc<PeerConnConfig>,
    manager: ConnectionManager,
    shutdown: ShutdownSignal,
) -> Result<PeerHandle, SqError> {
    let mut framed = Framed::new(socket, MessageCodec::new());

    time::timeout(config.handshake_timeout, do_handshake(&mut framed, &config))
        .await
        .map_err(|_| SqError::new(ErrorKind::Timeout, "handshake timed out"))??;

    info!(?role, "peer handshake complete, connection established");

    let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_queue_capacity);
    let close_signal = ShutdownSignal::new();
    let handle = PeerHandle {
        addr,
        outbound_tx: outbound_tx.clone(),
        close_signal: close_signal.clone(),
    };

    let (sink, stream) = framed.split();

    let reader = SqTask::spawn_with_span(
        "peer-reader",
        tracing::Span::current(),
        reader_loop(
            stream,
            addr,
            ops,
            outbound_tx,
            config.clone(),
            close_signal.clone(),
            shutdown.clone(),
        ),
    );
    let writer = SqTask::spawn_with_span(
        "peer-writer",
        tracing::Span::current(),
        writer_loop(sink, outbound_rx, close_signal.clone(), shutdown.clone()),
    );

    tokio::spawn(supervise(addr, manager, reader, writer, close_signal));

    Ok(handle)
}

/// Wait for both activities to finish, then deregister the peer. This is
/// what actually drives `ESTABLISHED -> CLOSING -> CLOSED` to completion
/// from the `ConnectionManager`'s point of view.
async fn supervise(
    addr: PeerAddr,
    manager: ConnectionManager,
    reader: SqTask<()>,
    writer: SqTask<()>,
    close_signal: ShutdownSignal,
) {
    close_signal.recv().await;
    reader.join().await;
    writer.join().await;
    manager.remove(addr);
    info!(peer = %addr, "peer connection closed");
}

type FramedStream = futures::stream::SplitStream<Framed<TcpStream, MessageCodec>>;
type FramedSink = futures::stream::SplitSink<Framed<TcpStream, MessageCodec>, Message>;

/// Exchange `version`/`verack` (spec §4.6): both sides send their own
/// `version` immediately, validate the peer's, then exchange `verack`.
/// Symmetric regardless of which side dialed — see the `Role` doc comment.
async fn do_handshake(
    framed: &mut Framed<TcpStream, MessageCodec>,
    config: &PeerConnConfig,
) -> Result<(), SqError> {
    let our_version = Message::Version(VersionPayload {
        protocol_version: PROTOCOL_VERSION,
        listen_port: config.listen_port,
        user_agent: config.user_agent.clone(),
    });
    framed
        .send(our_version)
        .await
        .map_err(|e| SqError::new(ErrorKind::PeerUnreachable, e.to_string()))?;

    let peer_version = recv_expected(framed).await?;
    match peer_version {
        Message::Version(v) if v.protocol_version >= crate::MIN_PROTOCOL_VERSION => {}
        Message::Version(v) => {
            return Err(SqError::new(
                ErrorKind::PeerProtocolViolation,
                format!("incompatible protocol version {}", v.protocol_version),
            ));
        }
        other => {
            return Err(SqError::new(
                ErrorKind::PeerProtocolViolation,
                format!("expected version, got {}", other.kind_name()),
            ));
        }
    }

    framed
        .send(Message::Verack)
        .await
        .map_err(|e| SqError::new(ErrorKind::PeerUnreachable, e.to_string()))?;

    match recv_expected(framed).await? {
        Message::Verack => Ok(()),
        other => Err(SqError::new(
            ErrorKind::PeerProtocolViolation,
            format!("expected verack, got {}", other.kind_name()),
        )),
    }
}

async fn recv_expected(framed: &mut Framed<TcpStream, MessageCodec>) -> Result<Message, SqError> {
    framed
        .next()
        .await
        .ok_or_else(|| SqError::new(ErrorKind::PeerUnreachable, "connection closed during handshake"))?
        .map_err(|e| SqError::new(ErrorKind::PeerProtocolViolation, e.to_string()))
}

/// The reader activity: decode inbound frames, dispatch application
/// messages, and drive the ping/pong liveness check.
async fn reader_loop(
    mut stream: FramedStream,
    peer_addr: PeerAddr,
    ops: Arc<dyn PeerOps>,
    outbound_tx: mpsc::Sender<Message>,
    config: Arc<PeerConnConfig>,
    close_signal: ShutdownSignal,
    shutdown: ShutdownSignal,
) {
    let mut ping_interval = time::interval(config.ping_timeout);
    ping_interval.tick().await; // first tick fires immediately; consume it
    let mut pending_ping: Option<u64> = None;
    let mut ping_deadline = time::Instant::now() + config.ping_timeout;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                debug!("reader: global shutdown");
                break;
            }
            _ = close_signal.recv() => {
                debug!("reader: connection closing");
                break;
            }
            _ = time::sleep_until(ping_deadline), if pending_ping.is_some() => {
                warn!(peer = %peer_addr, "ping timeout, closing connection");
                close_signal.send();
                break;
            }
            _ = ping_interval.tick(), if pending_ping.is_none() => {
                let nonce = rand::random();
                pending_ping = Some(nonce);
                ping_deadline = time::Instant::now() + config.ping_timeout;
                if !outbound_tx.send(Message::Ping { nonce }).await.is_ok() {
                    break;
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(msg)) => {
                        if let Message::Pong { nonce } = &msg {
                            if pending_ping == Some(*nonce) {
                                pending_ping = None;
                            }
                        }
                        if let Err(err) = dispatch(msg, peer_addr, ops.as_ref(), &outbound_tx).await {
                            warn!(peer = %peer_addr, %err, "peer protocol violation, closing");
                            close_signal.send();
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        warn!(peer = %peer_addr, %err, "frame decode error, closing");
                        close_signal.send();
                        break;
                    }
                    None => {
                        debug!(peer = %peer_addr, "peer closed connection");
                        close_signal.send();
                        break;
                    }
                }
            }
        }
    }
}

/// The writer activity: drain the outbound queue onto the socket.
async fn writer_loop(
    mut sink: FramedSink,
    mut outbound_rx: mpsc::Receiver<Message>,
    close_signal: ShutdownSignal,
    shutdown: ShutdownSignal,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            _ = close_signal.recv() => break,
            msg = outbound_rx.recv() => {
                match msg {
                    Some(m) => {
                        if sink.send(m).await.is_err() {
                            close_signal.send();
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
    let _ = sink.close().await;
}

/// Handle a single `ESTABLISHED`-state message (spec §4.6). Application
/// errors (bad item, rate limit, ...) are logged and swallowed — only a
/// genuine protocol violation is returned, which closes the connection
/// (spec §7).
async fn dispatch(
    msg: Message,
    peer_addr: PeerAddr,
    ops: &dyn PeerOps,
    outbound_tx: &mpsc::Sender<Message>,
) -> Result<(), SqError> {
    match msg {
        Message::Version(_) | Message::Verack => Err(SqError::new(
            ErrorKind::PeerProtocolViolation,
            "handshake message received after ESTABLISHED",
        )),
        Message::Ping { nonce } => {
            let _ = outbound_tx.send(Message::Pong { nonce }).await;
            Ok(())
        }
        Message::Pong { .. } => Ok(()),
        Message::GetSqueaks { locator } => {
            let interests = to_interests(&locator)?;
            match ops.resolve_getsqueaks(&interests).await {
                Ok(hashes) => {
                    let _ = outbound_tx.send(inv_of(hashes)).await;
                }
                Err(err) => warn!(peer = %peer_addr, %err, "getsqueaks lookup failed"),
            }
            Ok(())
        }
        Message::ShareSqueaks { locator } => {
            let interests = to_interests(&locator)?;
            match ops.resolve_sharesqueaks(&interests).await {
                Ok(hashes) => {
                    let _ = outbound_tx.send(inv_of(hashes)).await;
                }
                Err(err) => warn!(peer = %peer_addr, %err, "sharesqueaks lookup failed"),
            }
            Ok(())
        }
        Message::Inv { entries } => {
            let invs = entries.into_iter().map(entry_to_inv_item).collect();
            match ops.filter_unknown(invs).await {
                Ok(wanted) if !wanted.is_empty() => {
                    let entries = wanted.into_iter().map(inv_item_to_entry).collect();
                    let _ = outbound_tx.send(Message::GetData { entries }).await;
                }
                Ok(_) => {}
                Err(err) => warn!(peer = %peer_addr, %err, "filter_unknown failed"),
            }
            Ok(())
        }
        Message::GetData { entries } => {
            for entry in entries {
                if let Err(err) = handle_getdata_entry(entry, peer_addr, ops, outbound_tx).await {
                    warn!(peer = %peer_addr, %err, "getdata entry failed");
                }
            }
            Ok(())
        }
        Message::Squeak { item } => {
            if let Err(err) = ops.save_item(item, false).await {
                debug!(peer = %peer_addr, %err, "rejected squeak from peer");
            }
            Ok(())
        }
        Message::Offer { item_hash, offer } => {
            if let Err(err) = ops.accept_offer(item_hash, &offer, peer_addr).await {
                warn!(peer = %peer_addr, %err, "failed to record offer from peer");
            }
            Ok(())
        }
    }
}

/// A `getdata` entry for `Item` means "send me the full record"; for
/// `KeyNeeded` it means "I already have the ciphertext, send only the key"
/// — resolved (spec §9 open question) as: the key is never handed over for
/// free, so we reply with a fresh buy [`WireOffer`] instead, preserving the
/// payment-as-capability invariant.
async fn handle_getdata_entry(
    entry: InvEntry,
    peer_addr: PeerAddr,
    ops: &dyn PeerOps,
    outbound_tx: &mpsc::Sender<Message>,
) -> Result<(), SqError> {
    match entry.inv_type {
        InvType::Item => {
            if let Some(mut item) = ops.get_item(entry.hash).await? {
                item.decryption_key = None;
                let _ = outbound_tx.send(Message::Squeak { item }).await;
            }
            Ok(())
        }
        InvType::KeyNeeded => {
            let offer = ops.get_buy_offer(entry.hash, peer_addr).await?;
            let _ = outbound_tx
                .send(Message::Offer {
                    item_hash: entry.hash,
                    offer,
                })
                .await;
            Ok(())
        }
    }
}

fn inv_of(hashes: Vec<Hash32>) -> Message {
    Message::Inv {
        entries: hashes
            .into_iter()
            .map(|hash| InvEntry {
                inv_type: InvType::Item,
                hash,
            })
            .collect(),
    }
}

fn entry_to_inv_item(entry: InvEntry) -> InvItem {
    InvItem {
        kind: match entry.inv_type {
            InvType::Item => InvKind::Item,
            InvType::KeyNeeded => InvKind::KeyNeeded,
        },
        hash: entry.hash,
    }
}

fn inv_item_to_entry(inv: InvItem) -> InvEntry {
    InvEntry {
        inv_type: match inv.kind {
            InvKind::Item => InvType::Item,
            InvKind::KeyNeeded => InvType::KeyNeeded,
        },
        hash: inv.hash,
    }
}

fn to_interests(locator: &CSqueakLocator) -> Result<Vec<Interest>, SqError> {
    locator
        .iter()
        .map(|c: &CInterested| {
            Ok(Interest {
                address: c
                    .address
                    .parse::<Address>()
                    .map_err(|e| SqError::new(ErrorKind::PeerProtocolViolation, e.to_string()))?,
                min_block_height: c.min_block_height,
                max_block_height: c.max_block_height,
            })
        })
        .collect()
}

#[cfg(test)]
mod test {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use bitcoin::Network as BtcNetwork;
    use squeak_common::{Hash32, MilliSats};
    use squeak_crypto::{ContentCrypto, ContentItem, KeyPair};
    use squeak_engine::offer::OfferEngine;
    use squeak_lightning::StubGateway;
    use tokio::{net::TcpListener, sync::oneshot};

    use super::*;

    #[test]
    fn inv_conversion_round_trips() {
        let item = InvItem {
            kind: InvKind::KeyNeeded,
            hash: Hash32::digest(b"x"),
        };
        let entry = inv_item_to_entry(item);
        assert_eq!(entry.inv_type, InvType::KeyNeeded);
        let back = entry_to_inv_item(entry);
        assert_eq!(back.kind, InvKind::KeyNeeded);
    }

    #[test]
    fn locator_conversion_rejects_bad_address() {
        let locator = vec![CInterested {
            address: "not-an-address".to_owned(),
            min_block_height: 0,
            max_block_height: 10,
        }];
        assert!(to_interests(&locator).is_err());
    }

    fn test_config() -> Arc<PeerConnConfig> {
        Arc::new(PeerConnConfig {
            handshake_timeout: Duration::from_secs(2),
            ping_timeout: Duration::from_secs(60),
            outbound_queue_capacity: 8,
            listen_port: 0,
            user_agent: "squeak-test/0".to_owned(),
        })
    }

    /// A fixed, key-bearing item the seller side in
    /// [`handshake_then_getdata_key_needed_returns_offer`] advertises.
    fn sample_item() -> ContentItem {
        let crypto = ContentCrypto::new(BtcNetwork::Regtest);
        let author = KeyPair::generate(BtcNetwork::Regtest);
        crypto
            .make_item(
                &author,
                "paid content",
                Hash32::new([0u8; 32]),
                10,
                1_700_000_000,
                squeak_crypto::item::BlockHeader(vec![]),
            )
            .unwrap()
    }

    /// Seller-side [`PeerOps`]: answers `get_buy_offer` for one fixed item
    /// via a real [`OfferEngine`] over a [`StubGateway`]; every other
    /// operation is unreachable from this test's message flow.
    struct SellerOps {
        item: ContentItem,
        offer_engine: OfferEngine,
    }

    #[async_trait]
    impl PeerOps for SellerOps {
        async fn resolve_getsqueaks(&self, _locator: &[Interest]) -> Result<Vec<Hash32>, SqError> {
            Ok(vec![])
        }
        async fn resolve_sharesqueaks(&self, _locator: &[Interest]) -> Result<Vec<Hash32>, SqError> {
            Ok(vec![])
        }
        async fn filter_unknown(&self, _invs: Vec<InvItem>) -> Result<Vec<InvItem>, SqError> {
            Ok(vec![])
        }
        async fn get_item(&self, hash: Hash32) -> Result<Option<ContentItem>, SqError> {
            Ok((hash == self.item.hash).then(|| self.item.clone()))
        }
        async fn get_buy_offer(
            &self,
            _item_hash: Hash32,
            buyer_addr: PeerAddr,
        ) -> Result<WireOffer, SqError> {
            let sent = self
                .offer_engine
                .create_sent_offer(&self.item, buyer_addr, MilliSats::from_sats(10))
                .await?;
            Ok(self.offer_engine.package_offer(&sent, "127.0.0.1".to_owned(), 9735))
        }
        async fn accept_offer(
            &self,
            _item_hash: Hash32,
            _wire_offer: &WireOffer,
            _peer_addr: PeerAddr,
        ) -> Result<i64, SqError> {
            unreachable!("seller never receives an Offer in this test")
        }
        async fn save_item(&self, _item: ContentItem, _require_key: bool) -> Result<(), SqError> {
            Ok(())
        }
        async fn downloading_peers(&self) -> Result<Vec<crate::ops::ConfiguredPeer>, SqError> {
            Ok(vec![])
        }
    }

    /// Buyer-side [`PeerOps`]: forwards whatever `Offer` it receives onto a
    /// oneshot channel the test awaits on; every other operation is
    /// unreachable from this test's message flow.
    struct BuyerOps {
        received: StdMutex<Option<oneshot::Sender<WireOffer>>>,
    }

    #[async_trait]
    impl PeerOps for BuyerOps {
        async fn resolve_getsqueaks(&self, _locator: &[Interest]) -> Result<Vec<Hash32>, SqError> {
            Ok(vec![])
        }
        async fn resolve_sharesqueaks(&self, _locator: &[Interest]) -> Result<Vec<Hash32>, SqError> {
            Ok(vec![])
        }
        async fn filter_unknown(&self, _invs: Vec<InvItem>) -> Result<Vec<InvItem>, SqError> {
            Ok(vec![])
        }
        async fn get_item(&self, _hash: Hash32) -> Result<Option<ContentItem>, SqError> {
            Ok(None)
        }
        async fn get_buy_offer(
            &self,
            _item_hash: Hash32,
            _buyer_addr: PeerAddr,
        ) -> Result<WireOffer, SqError> {
            unreachable!("buyer never answers a getdata in this test")
        }
        async fn accept_offer(
            &self,
            _item_hash: Hash32,
            wire_offer: &WireOffer,
            _peer_addr: PeerAddr,
        ) -> Result<i64, SqError> {
            if let Some(tx) = self.received.lock().unwrap().take() {
                let _ = tx.send(wire_offer.clone());
            }
            Ok(1)
        }
        async fn save_item(&self, _item: ContentItem, _require_key: bool) -> Result<(), SqError> {
            Ok(())
        }
        async fn downloading_peers(&self) -> Result<Vec<crate::ops::ConfiguredPeer>, SqError> {
            Ok(vec![])
        }
    }

    /// End-to-end over a real TCP loopback socket: handshake to
    /// `ESTABLISHED`, then a `getdata{KeyNeeded}` from the buyer gets the
    /// seller to mint a fresh buy offer via a real `OfferEngine` and send it
    /// back as `Offer` — the wire-level shape of spec §8's "happy-path
    /// purchase" scenario, up to the point payment would be made.
    #[tokio::test]
    async fn handshake_then_getdata_key_needed_returns_offer() {
        let item = sample_item();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let listen_addr = listener.local_addr().unwrap();

        let gateway = Arc::new(StubGateway::new("02seller"));
        let seller_ops: Arc<dyn PeerOps> = Arc::new(SellerOps {
            item: item.clone(),
            offer_engine: OfferEngine::new(gateway, MilliSats::from_sats(1_000)),
        });
        let (offer_tx, offer_rx) = oneshot::channel();
        let buyer_ops: Arc<dyn PeerOps> = Arc::new(BuyerOps {
            received: StdMutex::new(Some(offer_tx)),
        });

        let seller_manager = ConnectionManager::new();
        let buyer_manager = ConnectionManager::new();
        let seller_shutdown = ShutdownSignal::new();
        let buyer_shutdown = ShutdownSignal::new();
        let config = test_config();

        let accept_task = tokio::spawn({
            let config = config.clone();
            let seller_manager = seller_manager.clone();
            let seller_shutdown = seller_shutdown.clone();
            async move {
                let (socket, addr) = listener.accept().await.unwrap();
                spawn(
                    socket,
                    addr.into(),
                    Role::Inbound,
                    seller_ops,
                    config,
                    seller_manager,
                    seller_shutdown,
                )
                .await
                .unwrap()
            }
        });

        let buyer_socket = tokio::net::TcpStream::connect(listen_addr).await.unwrap();
        let buyer_handle = spawn(
            buyer_socket,
            listen_addr.into(),
            Role::Outbound,
            buyer_ops,
            config,
            buyer_manager,
            buyer_shutdown,
        )
        .await
        .unwrap();
        let _seller_handle = accept_task.await.unwrap();

        assert!(buyer_handle.send(Message::GetData {
            entries: vec![InvEntry {
                inv_type: InvType::KeyNeeded,
                hash: item.hash,
            }],
        }));

        let wire_offer = time::timeout(Duration::from_secs(5), offer_rx)
            .await
            .expect("offer should arrive before the timeout")
            .expect("offer channel should not be dropped");

        assert_eq!(wire_offer.port, 9735);
        assert!(!wire_offer.payment_request.is_empty());
    }

    /// [`PeerOps`] for the ping-timeout test: the silent peer never sends an
    /// application message, so none of these should ever be called.
    struct NoopOps;

    #[async_trait]
    impl PeerOps for NoopOps {
        async fn resolve_getsqueaks(&self, _locator: &[Interest]) -> Result<Vec<Hash32>, SqError> {
            unreachable!()
        }
        async fn resolve_sharesqueaks(&self, _locator: &[Interest]) -> Result<Vec<Hash32>, SqError> {
            unreachable!()
        }
        async fn filter_unknown(&self, _invs: Vec<InvItem>) -> Result<Vec<InvItem>, SqError> {
            unreachable!()
        }
        async fn get_item(&self, _hash: Hash32) -> Result<Option<ContentItem>, SqError> {
            unreachable!()
        }
        async fn get_buy_offer(
            &self,
            _item_hash: Hash32,
            _buyer_addr: PeerAddr,
        ) -> Result<WireOffer, SqError> {
            unreachable!()
        }
        async fn accept_offer(
            &self,
            _item_hash: Hash32,
            _wire_offer: &WireOffer,
            _peer_addr: PeerAddr,
        ) -> Result<i64, SqError> {
            unreachable!()
        }
        async fn save_item(&self, _item: ContentItem, _require_key: bool) -> Result<(), SqError> {
            unreachable!()
        }
        async fn downloading_peers(&self) -> Result<Vec<crate::ops::ConfiguredPeer>, SqError> {
            unreachable!()
        }
    }

    /// A peer that completes the handshake and then goes silent never gets a
    /// `pong` back, so the reader's liveness check (spec §4.6) must close the
    /// connection on its own rather than hang forever. Uses paused virtual
    /// time, the same pattern as `node/src/inactivity_timer.rs`'s tests: real
    /// loopback I/O alongside a timer the runtime auto-advances once every
    /// task is idle on it.
    #[tokio::test(start_paused = true)]
    async fn ping_timeout_closes_silent_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let listen_addr = listener.local_addr().unwrap();

        let seller_ops: Arc<dyn PeerOps> = Arc::new(NoopOps);
        let seller_manager = ConnectionManager::new();
        let seller_shutdown = ShutdownSignal::new();
        let config = Arc::new(PeerConnConfig {
            handshake_timeout: Duration::from_secs(2),
            ping_timeout: Duration::from_secs(1),
            outbound_queue_capacity: 8,
            listen_port: 0,
            user_agent: "squeak-test/0".to_owned(),
        });

        let accept_task = tokio::spawn({
            let config = config.clone();
            let seller_manager = seller_manager.clone();
            let seller_shutdown = seller_shutdown.clone();
            async move {
                let (socket, addr) = listener.accept().await.unwrap();
                spawn(
                    socket,
                    addr.into(),
                    Role::Inbound,
                    seller_ops,
                    config,
                    seller_manager,
                    seller_shutdown,
                )
                .await
                .unwrap()
            }
        });

        // A bare framed socket standing in for a peer that never answers a
        // `ping`: it completes the handshake, then goes quiet. Held for the
        // whole test so the seller's socket stays open instead of seeing EOF.
        let buyer_socket = tokio::net::TcpStream::connect(listen_addr).await.unwrap();
        let mut buyer_framed = Framed::new(buyer_socket, MessageCodec::new());
        buyer_framed
            .send(Message::Version(VersionPayload {
                protocol_version: PROTOCOL_VERSION,
                listen_port: 0,
                user_agent: "silent-peer/0".to_owned(),
            }))
            .await
            .unwrap();
        match buyer_framed.next().await.unwrap().unwrap() {
            Message::Version(_) => {}
            other => panic!("expected version, got {}", other.kind_name()),
        }
        buyer_framed.send(Message::Verack).await.unwrap();
        match buyer_framed.next().await.unwrap().unwrap() {
            Message::Verack => {}
            other => panic!("expected verack, got {}", other.kind_name()),
        }

        let seller_handle = accept_task.await.unwrap();
        seller_manager.insert(seller_handle.clone());

        // The seller pings once per `ping_timeout` and waits another
        // `ping_timeout` for a `pong` that never comes.
        time::sleep(config.ping_timeout * 3).await;

        assert!(seller_handle.is_closed());
        assert!(!seller_manager.contains(&seller_handle.addr()));
    }
}
