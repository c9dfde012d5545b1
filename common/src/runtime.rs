use std::{
    net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    sync::Arc,
    thread,
    time::Duration,
};

use crossbeam_channel::{unbounded, Receiver, TryRecvError};
use rustls::{ClientConfig, ServerConfig};
use uuid::Uuid;

use crate::{
    config::CertPaths,
    error::ChannelError,
    handler::MessageHandler,
    registry::{ConnectionId, ConnectionRegistry, Direction},
    stream::{FramePoll, SecureStream},
    tls,
};

/// A long-lived node endpoint.
///
/// The runtime accepts inbound encrypted connections on a background accept
/// loop, dials remote peers with bounded retry, and fans payloads out to
/// every open connection. Role behavior is injected through
/// [`MessageHandler`]; the runtime itself never inspects payloads.
///
/// Cloning is cheap and yields a handle to the same node.
#[derive(Clone)]
pub struct NodeRuntime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    name:          String,
    registry:      ConnectionRegistry,
    server_config: Arc<ServerConfig>,
    client_config: Arc<ClientConfig>,
    handler:       Arc<dyn MessageHandler>,
    io_poll:       Duration,
}

impl NodeRuntime {
    /// Build a runtime from the node's certificate material.
    ///
    /// Both channel configurations are constructed up front, so unreadable
    /// or malformed credentials fail here and nowhere later.
    pub fn new(
        name: &str,
        certs: &CertPaths,
        handler: Arc<dyn MessageHandler>,
        io_poll: Duration,
    ) -> Result<Self, ChannelError> {
        Ok(Self {
            inner: Arc::new(RuntimeInner {
                name: name.to_string(),
                registry: ConnectionRegistry::new(),
                server_config: tls::server_config(certs)?,
                client_config: tls::client_config(certs)?,
                handler,
                io_poll,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    /// Bind `bind_addr` and serve inbound connections for the life of the
    /// process.
    ///
    /// The accept loop runs on a background thread; the bound address is
    /// returned (an OS-assigned port when `bind_addr` ends in `:0`). Each
    /// accepted socket is handed to its own thread for the TLS handshake:
    /// on success the connection joins the registry and its receive loop
    /// starts, on failure the socket is dropped and the event logged, never
    /// raised.
    pub fn listen(&self, bind_addr: &str) -> Result<SocketAddr, ChannelError> {
        let listener = TcpListener::bind(bind_addr)?;
        let local = listener.local_addr()?;
        tracing::info!(node = %self.inner.name, addr = %local, "listening for peers");

        let runtime = self.clone();
        thread::Builder::new()
            .name(format!("{}-accept", self.inner.name))
            .spawn(move || runtime.accept_loop(listener))?;

        Ok(local)
    }

    fn accept_loop(self, listener: TcpListener) {
        loop {
            match listener.accept() {
                Ok((sock, remote)) => {
                    let runtime = self.clone();
                    let spawned = thread::Builder::new()
                        .name(format!("{}-handshake", self.inner.name))
                        .spawn(move || {
                            let config = Arc::clone(&runtime.inner.server_config);
                            match SecureStream::accept(sock, config) {
                                Ok(stream) => {
                                    if let Err(e) =
                                        runtime.spawn_connection(stream, remote, Direction::Inbound)
                                    {
                                        tracing::error!(node = %runtime.inner.name, %remote, error = %e,
                                            "failed to start connection");
                                    }
                                }
                                Err(e) => tracing::warn!(node = %runtime.inner.name, %remote, error = %e,
                                    "inbound handshake failed"),
                            }
                        });
                    if let Err(e) = spawned {
                        tracing::error!(node = %self.inner.name, error = %e, "failed to spawn handshake thread");
                    }
                }
                Err(e) => tracing::error!(node = %self.inner.name, error = %e, "accept failed"),
            }
        }
    }

    /// Establish an outbound secure connection to `remote`.
    ///
    /// Dialing a peer this node already holds an open outbound channel to
    /// is a no-op returning the existing connection id, so a redundant
    /// reconnect trigger cannot stack extra channels. Otherwise up to
    /// `max_attempts` connect-and-handshake attempts are made with a fixed
    /// `retry_delay` between them; exhaustion yields
    /// [`ChannelError::ConnectFailed`].
    pub fn dial(
        &self,
        remote: &str,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Result<ConnectionId, ChannelError> {
        let addr = remote
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ChannelError::ConnectFailed {
                remote:   remote.to_string(),
                attempts: 0,
            })?;

        if let Some(existing) = self.inner.registry.find_outbound(addr) {
            tracing::debug!(node = %self.inner.name, %remote, "already connected, reusing channel");
            return Ok(existing);
        }

        let host = remote.rsplit_once(':').map(|(h, _)| h).unwrap_or(remote);
        for attempt in 1..=max_attempts {
            match self.try_dial(addr, host) {
                Ok(id) => {
                    tracing::info!(node = %self.inner.name, %remote, attempt, "securely connected");
                    return Ok(id);
                }
                Err(e) => {
                    tracing::warn!(node = %self.inner.name, %remote, attempt, error = %e,
                        "dial attempt failed");
                    if attempt < max_attempts {
                        thread::sleep(retry_delay);
                    }
                }
            }
        }

        Err(ChannelError::ConnectFailed {
            remote:   remote.to_string(),
            attempts: max_attempts,
        })
    }

    fn try_dial(&self, addr: SocketAddr, host: &str) -> Result<ConnectionId, ChannelError> {
        let sock = TcpStream::connect(addr)?;
        let stream = SecureStream::connect(sock, Arc::clone(&self.inner.client_config), host)?;
        self.spawn_connection(stream, addr, Direction::Outbound)
    }

    /// Broadcast `payload` to every open connection; failures on individual
    /// peers are isolated. Returns the number of peers reached.
    pub fn broadcast(&self, payload: &[u8]) -> usize {
        self.inner.registry.broadcast(payload)
    }

    /// Register an authenticated stream and start its receive loop.
    fn spawn_connection(
        &self,
        mut stream: SecureStream,
        remote: SocketAddr,
        direction: Direction,
    ) -> Result<ConnectionId, ChannelError> {
        stream.set_poll_interval(self.inner.io_poll)?;

        let id = Uuid::new_v4();
        let (outbound_tx, outbound_rx) = unbounded();
        self.inner.registry.insert(id, remote, direction, outbound_tx);

        let runtime = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("conn-{id}"))
            .spawn(move || runtime.connection_loop(id, stream, outbound_rx, remote));
        if let Err(e) = spawned {
            self.inner.registry.remove(&id);
            return Err(e.into());
        }

        tracing::debug!(node = %self.inner.name, %id, %remote, ?direction, "secure connection established");
        Ok(id)
    }

    /// Per-connection loop: the sole owner of its stream.
    ///
    /// Queued outbound frames are drained first so broadcast delivery is
    /// never starved by a quiet peer; each inbound frame is handed to the
    /// handler, whose response (if any) goes back on the same connection.
    /// On stream end, queue disconnect, or any I/O error the connection
    /// removes itself from the registry and releases its resources.
    fn connection_loop(
        self,
        id: ConnectionId,
        mut stream: SecureStream,
        outbound: Receiver<Vec<u8>>,
        remote: SocketAddr,
    ) {
        loop {
            loop {
                match outbound.try_recv() {
                    Ok(payload) => {
                        if let Err(e) = stream.send_frame(&payload) {
                            tracing::warn!(%id, %remote, error = %e, "send failed, closing connection");
                            return self.teardown(id, stream);
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        tracing::debug!(%id, %remote, "dropped from registry, closing");
                        return self.teardown(id, stream);
                    }
                }
            }

            match stream.poll_frame() {
                Ok(FramePoll::Frame(payload)) => {
                    if let Some(response) = self.inner.handler.on_message(&payload) {
                        if let Err(e) = stream.send_frame(&response) {
                            tracing::warn!(%id, %remote, error = %e, "response write failed, closing connection");
                            return self.teardown(id, stream);
                        }
                    }
                }
                Ok(FramePoll::Pending) => {}
                Ok(FramePoll::Closed) => {
                    tracing::info!(%id, %remote, "peer closed connection");
                    return self.teardown(id, stream);
                }
                Err(e) => {
                    tracing::warn!(%id, %remote, error = %e, "connection error");
                    return self.teardown(id, stream);
                }
            }
        }
    }

    fn teardown(&self, id: ConnectionId, mut stream: SecureStream) {
        self.inner.registry.remove(&id);
        stream.close();
    }
}
