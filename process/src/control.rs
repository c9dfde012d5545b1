//! Supervisor control link.
//!
//! The client-role node keeps one loopback connection to the supervisor's
//! control plane and reacts to typed commands pushed over it.

use std::{net::TcpStream, thread, time::Duration};

use logpipe_common::protocol::{read_message, write_message, ControlMessage};

const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Maintain a subscription to the supervisor control plane.
///
/// Connects, announces this node, then blocks reading commands; every
/// `Reconnect` invokes `on_reconnect`. Any failure tears the link down and
/// a fresh connection is attempted after a short delay, so a restarting
/// supervisor is rejoined automatically. Never returns.
pub fn run_control_link(control_addr: &str, node: &str, on_reconnect: impl Fn()) -> ! {
    loop {
        let mut sock = match TcpStream::connect(control_addr) {
            Ok(sock) => sock,
            Err(e) => {
                tracing::debug!(addr = control_addr, error = %e, "control plane unreachable");
                thread::sleep(RETRY_DELAY);
                continue;
            }
        };

        let subscribe = ControlMessage::Subscribe {
            node: node.to_string(),
        };
        if let Err(e) = write_message(&mut sock, &subscribe) {
            tracing::warn!(error = %e, "failed to subscribe to control plane");
            thread::sleep(RETRY_DELAY);
            continue;
        }
        match read_message(&mut sock) {
            Ok(Some(ControlMessage::Subscribed)) => {
                tracing::info!(node, "subscribed to supervisor control plane");
            }
            Ok(other) => {
                tracing::warn!(?other, "unexpected subscription reply");
                thread::sleep(RETRY_DELAY);
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "control subscription failed");
                thread::sleep(RETRY_DELAY);
                continue;
            }
        }

        loop {
            match read_message(&mut sock) {
                Ok(Some(ControlMessage::Reconnect)) => {
                    tracing::info!("reconnect requested by supervisor");
                    on_reconnect();
                }
                Ok(Some(other)) => tracing::warn!(?other, "unexpected control command"),
                Ok(None) => {
                    tracing::info!("control plane closed the link");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "control link error");
                    break;
                }
            }
        }
        thread::sleep(RETRY_DELAY);
    }
}
