use std::{
    collections::HashMap,
    io,
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use logpipe_common::protocol::{read_message, write_message, ControlMessage};

/// Bound on how long a connecting node may take to announce itself.
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

type SubscriberMap = Arc<Mutex<HashMap<String, TcpStream>>>;

/// Loopback listener the supervisor pushes typed commands through.
///
/// Client-role nodes connect, send [`ControlMessage::Subscribe`], and keep
/// the connection open; the supervisor writes commands to subscribers.
/// Delivery is fire-and-forget: a dead subscriber is dropped on the first
/// failed write and is expected to re-subscribe once its process is back.
/// The nodes' own self-heal check covers anything lost in between.
pub struct ControlPlane {
    subscribers: SubscriberMap,
    local_addr:  SocketAddr,
}

impl ControlPlane {
    /// Bind `addr` and serve subscriptions on a background thread.
    pub fn bind(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "control plane listening");

        let subscribers: SubscriberMap = Arc::new(Mutex::new(HashMap::new()));
        let accept_subscribers = Arc::clone(&subscribers);
        thread::Builder::new()
            .name("control-accept".to_string())
            .spawn(move || accept_loop(listener, accept_subscribers))?;

        Ok(Self {
            subscribers,
            local_addr,
        })
    }

    /// Address actually bound (an OS-assigned port when configured `:0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Send `Reconnect` to every subscribed node; returns how many writes
    /// went through. Failed writes drop the subscriber.
    pub fn broadcast_reconnect(&self) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap();

        let mut reached = 0;
        let mut dead = Vec::new();
        for (node, sock) in subscribers.iter_mut() {
            match write_message(sock, &ControlMessage::Reconnect) {
                Ok(()) => {
                    tracing::info!(node = %node, "reconnect signal delivered");
                    reached += 1;
                }
                Err(e) => {
                    tracing::warn!(node = %node, error = %e, "subscriber unreachable, dropping");
                    dead.push(node.clone());
                }
            }
        }
        for node in dead {
            subscribers.remove(&node);
        }

        reached
    }
}

fn accept_loop(listener: TcpListener, subscribers: SubscriberMap) {
    loop {
        match listener.accept() {
            Ok((sock, remote)) => {
                let subscribers = Arc::clone(&subscribers);
                let spawned = thread::Builder::new()
                    .name("control-subscribe".to_string())
                    .spawn(move || handle_subscription(sock, remote, subscribers));
                if let Err(e) = spawned {
                    tracing::error!(error = %e, "failed to spawn subscription thread");
                }
            }
            Err(e) => tracing::error!(error = %e, "control plane accept failed"),
        }
    }
}

fn handle_subscription(mut sock: TcpStream, remote: SocketAddr, subscribers: SubscriberMap) {
    if sock.set_read_timeout(Some(SUBSCRIBE_TIMEOUT)).is_err() {
        return;
    }
    match read_message(&mut sock) {
        Ok(Some(ControlMessage::Subscribe { node })) => {
            if write_message(&mut sock, &ControlMessage::Subscribed).is_err() {
                return;
            }
            tracing::info!(node = %node, %remote, "control subscriber registered");
            // a restarted node replaces its stale entry
            subscribers.lock().unwrap().insert(node, sock);
        }
        Ok(other) => {
            tracing::warn!(%remote, ?other, "expected a subscription, dropping connection")
        }
        Err(e) => tracing::debug!(%remote, error = %e, "subscription read failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_register_and_receive_reconnect() {
        let control = ControlPlane::bind("127.0.0.1:0").unwrap();
        let addr = control.local_addr();

        let mut sock = TcpStream::connect(addr).unwrap();
        write_message(
            &mut sock,
            &ControlMessage::Subscribe {
                node: "log-process".to_string(),
            },
        )
        .unwrap();
        sock.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        assert_eq!(
            read_message(&mut sock).unwrap(),
            Some(ControlMessage::Subscribed)
        );

        // registration lands on the accept thread shortly after the ack
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while control.subscriber_count() == 0 {
            assert!(std::time::Instant::now() < deadline, "subscription not registered");
            thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(control.broadcast_reconnect(), 1);
        assert_eq!(
            read_message(&mut sock).unwrap(),
            Some(ControlMessage::Reconnect)
        );
    }

    #[test]
    fn non_subscription_first_message_is_dropped() {
        let control = ControlPlane::bind("127.0.0.1:0").unwrap();

        let mut sock = TcpStream::connect(control.local_addr()).unwrap();
        write_message(&mut sock, &ControlMessage::Reconnect).unwrap();

        // never registered, so a broadcast reaches nobody
        thread::sleep(Duration::from_millis(200));
        assert_eq!(control.subscriber_count(), 0);
        assert_eq!(control.broadcast_reconnect(), 0);
    }
}
