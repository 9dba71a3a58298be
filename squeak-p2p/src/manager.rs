//! A registry of live peer connections, keyed by address (spec §4.8).
//!
//! `ConnectionManager` is the one thing every [`crate::connection`] task and
//! the [`crate::server::PeerServer`] share; it never sees application state
//! directly, only [`PeerHandle`]s, so a stuck or hostile peer can only ever
//! poison its own entry (spec's "broadcast isolation" property: a failure
//! broadcasting to one peer must not affect delivery to any other).

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use squeak_common::PeerAddr;
use tracing::debug;

use crate::{connection::PeerHandle, message::Message};

#[derive(Clone, Default)]
pub struct ConnectionManager {
    inner: Arc<Mutex<HashMap<PeerAddr, PeerHandle>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: PeerHandle) {
        let mut guard = self.inner.lock().expect("connection map poisoned");
        guard.insert(handle.addr(), handle);
    }

    pub fn remove(&self, addr: PeerAddr) {
        let mut guard = self.inner.lock().expect("connection map poisoned");
        guard.remove(&addr);
    }

    pub fn contains(&self, addr: &PeerAddr) -> bool {
        let guard = self.inner.lock().expect("connection map poisoned");
        guard.contains_key(addr)
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.lock().expect("connection map poisoned");
        guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn addrs(&self) -> Vec<PeerAddr> {
        let guard = self.inner.lock().expect("connection map poisoned");
        guard.keys().copied().collect()
    }

    /// Broadcast `msg` to every connected peer. Takes a point-in-time
    /// snapshot of the handles before sending, so a peer that disconnects
    /// mid-broadcast (removing itself from the map on its own task) can
    /// neither be skipped unfairly nor deadlock the broadcaster, and a
    /// `try_send` failure against one handle cannot affect delivery to any
    /// other: each handle's queue is independent.
    pub fn broadcast(&self, msg: Message) {
        let handles: Vec<PeerHandle> = {
            let guard = self.inner.lock().expect("connection map poisoned");
            guard.values().cloned().collect()
        };
        for handle in handles {
            if !handle.send(msg.clone()) {
                debug!(peer = %handle.addr(), "broadcast skipped, peer queue full");
            }
        }
    }

    pub fn close_all(&self) {
        let handles: Vec<PeerHandle> = {
            let guard = self.inner.lock().expect("connection map poisoned");
            guard.values().cloned().collect()
        };
        for handle in handles {
            handle.close();
        }
    }
}

#[cfg(test)]
mod test {
    use std::net::{IpAddr, Ipv4Addr};

    use tokio::sync::mpsc;

    use super::*;

    fn addr(port: u16) -> PeerAddr {
        PeerAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    fn fake_handle(port: u16) -> (PeerHandle, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(4);
        let handle = PeerHandle::for_test(addr(port), tx);
        (handle, rx)
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connected_peer() {
        let manager = ConnectionManager::new();
        let (h1, mut r1) = fake_handle(1);
        let (h2, mut r2) = fake_handle(2);
        manager.insert(h1);
        manager.insert(h2);

        manager.broadcast(Message::Verack);

        assert!(matches!(r1.recv().await, Some(Message::Verack)));
        assert!(matches!(r2.recv().await, Some(Message::Verack)));
    }

    #[test]
    fn remove_drops_the_entry() {
        let manager = ConnectionManager::new();
        let (h1, _r1) = fake_handle(1);
        let a = h1.addr();
        manager.insert(h1);
        assert_eq!(manager.len(), 1);
        manager.remove(a);
        assert!(manager.is_empty());
    }

    /// Testable property (spec §8): a peer whose outbound queue is full must
    /// not stop the broadcast from reaching any other peer, and closing the
    /// slow peer must not propagate as an error to the broadcaster.
    #[tokio::test]
    async fn full_peer_queue_does_not_block_or_abort_broadcast_to_others() {
        let manager = ConnectionManager::new();
        let (slow, _slow_rx) = fake_handle(1); // receiver never drained, so sends saturate the queue
        let (h2, mut r2) = fake_handle(2);
        let (h3, mut r3) = fake_handle(3);
        manager.insert(slow.clone());
        manager.insert(h2);
        manager.insert(h3);

        // Fill the slow peer's queue directly (capacity 4), then overflow it
        // once more, without involving the other two peers at all.
        for _ in 0..5 {
            slow.send(Message::Ping { nonce: 0 });
        }
        assert!(slow.is_closed(), "slow peer should self-close once its queue overflows");

        manager.broadcast(Message::Verack);

        assert!(r2.recv().await.is_some());
        assert!(r3.recv().await.is_some());
        // Real deregistration happens from the connection's supervise task,
        // not from `broadcast` itself; here there's none running, so the map
        // still holds all three entries even though `slow` is closed.
        assert_eq!(manager.len(), 3);
    }
}
