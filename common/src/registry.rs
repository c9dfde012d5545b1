use std::{collections::HashMap, net::SocketAddr, sync::Mutex};

use crossbeam_channel::Sender;
use uuid::Uuid;

/// Identity of a live connection.
pub type ConnectionId = Uuid;

/// Direction a connection was established in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

struct PeerHandle {
    outbound:  Sender<Vec<u8>>,
    remote:    SocketAddr,
    direction: Direction,
}

/// Thread-safe set of live connections.
///
/// A connection appears here exactly while it is open: the accept loop and
/// the dial routine insert after a successful handshake, and each
/// connection's thread removes itself on teardown. Dropping an entry
/// disconnects that connection's outbound queue, which shuts the connection
/// down — so membership doubles as the lifecycle state.
pub struct ConnectionRegistry {
    peers: Mutex<HashMap<ConnectionId, PeerHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
        }
    }

    /// Register an open connection's outbound queue.
    pub fn insert(
        &self,
        id: ConnectionId,
        remote: SocketAddr,
        direction: Direction,
        outbound: Sender<Vec<u8>>,
    ) {
        let mut peers = self.peers.lock().unwrap();
        peers.insert(
            id,
            PeerHandle {
                outbound,
                remote,
                direction,
            },
        );
    }

    /// Drop a connection; idempotent.
    pub fn remove(&self, id: &ConnectionId) -> bool {
        let removed = self.peers.lock().unwrap().remove(id).is_some();
        if removed {
            tracing::debug!(%id, "connection removed from registry");
        }
        removed
    }

    /// Queue `payload` for delivery to every open connection.
    ///
    /// Failures are isolated: a peer whose connection thread has already
    /// gone away is logged and dropped without affecting delivery to the
    /// remaining peers. Returns the number of peers the payload was queued
    /// for.
    pub fn broadcast(&self, payload: &[u8]) -> usize {
        let mut peers = self.peers.lock().unwrap();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, peer) in peers.iter() {
            match peer.outbound.send(payload.to_vec()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::warn!(%id, remote = %peer.remote, "send failed, dropping connection");
                    dead.push(*id);
                }
            }
        }
        for id in dead {
            peers.remove(&id);
        }

        delivered
    }

    /// Look up an existing outbound connection to `remote`.
    pub fn find_outbound(&self, remote: SocketAddr) -> Option<ConnectionId> {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .find(|(_, peer)| peer.direction == Direction::Outbound && peer.remote == remote)
            .map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crossbeam_channel::unbounded;

    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn broadcast_reaches_every_open_connection_once() {
        let registry = ConnectionRegistry::new();
        let mut receivers = Vec::new();
        for port in 0..4 {
            let (tx, rx) = unbounded();
            registry.insert(Uuid::new_v4(), addr(9000 + port), Direction::Inbound, tx);
            receivers.push(rx);
        }

        assert_eq!(registry.broadcast(b"payload"), 4);
        for rx in &receivers {
            assert_eq!(rx.try_recv().unwrap(), b"payload".to_vec());
            assert!(rx.try_recv().is_err(), "delivered more than once");
        }
    }

    #[test]
    fn dead_peer_does_not_block_the_rest() {
        let registry = ConnectionRegistry::new();

        let (live_tx, live_rx) = unbounded();
        registry.insert(Uuid::new_v4(), addr(9100), Direction::Inbound, live_tx);

        let (dead_tx, dead_rx) = unbounded::<Vec<u8>>();
        drop(dead_rx); // connection thread already gone
        registry.insert(Uuid::new_v4(), addr(9101), Direction::Inbound, dead_tx);

        assert_eq!(registry.broadcast(b"x"), 1);
        assert_eq!(live_rx.try_recv().unwrap(), b"x".to_vec());
        // the dead entry was removed, not left dangling
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_is_idempotent_and_atomic_with_broadcast() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, rx) = unbounded();
        let id = Uuid::new_v4();
        registry.insert(id, addr(9200), Direction::Outbound, tx);

        let remover = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.remove(&id))
        };
        for _ in 0..100 {
            registry.broadcast(b"tick");
        }
        remover.join().unwrap();

        assert!(!registry.remove(&id), "second remove must be a no-op");
        assert_eq!(registry.len(), 0);
        // everything delivered before removal is intact, nothing after
        drop(rx);
    }

    #[test]
    fn find_outbound_ignores_inbound_connections() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = unbounded();
        registry.insert(Uuid::new_v4(), addr(9300), Direction::Inbound, tx);
        assert_eq!(registry.find_outbound(addr(9300)), None);

        let (tx, _rx2) = unbounded();
        let id = Uuid::new_v4();
        registry.insert(id, addr(9301), Direction::Outbound, tx);
        assert_eq!(registry.find_outbound(addr(9301)), Some(id));
    }
}
