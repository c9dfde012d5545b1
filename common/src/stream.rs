use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    sync::Arc,
    time::Duration,
};

use rustls::{
    pki_types::ServerName, ClientConfig, ClientConnection, Connection, ServerConfig,
    ServerConnection,
};

use crate::{
    error::ChannelError,
    frame::{FrameBuffer, MAX_FRAME_LEN},
};

/// Bound on a TLS handshake before the attempt is abandoned.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one bounded receive poll.
#[derive(Debug)]
pub enum FramePoll {
    /// A complete frame arrived.
    Frame(Vec<u8>),
    /// No complete frame within the poll interval.
    Pending,
    /// The peer ended the stream cleanly.
    Closed,
}

/// Synchronous TLS wrapper around a TCP stream carrying length-prefixed
/// frames.
///
/// Reads are bounded by the poll interval so a single thread can serve both
/// directions of its connection; inbound bytes are reassembled through a
/// [`FrameBuffer`], so fragmented delivery and several messages per read
/// both decode correctly.
pub struct SecureStream {
    sock:   TcpStream,
    tls:    Connection,
    frames: FrameBuffer,
}

impl SecureStream {
    /// Accept-side construction: run the server handshake to completion,
    /// verifying the peer certificate against the trust anchor.
    pub fn accept(sock: TcpStream, config: Arc<ServerConfig>) -> Result<Self, ChannelError> {
        let conn =
            ServerConnection::new(config).map_err(|e| ChannelError::Handshake(e.to_string()))?;
        Self::handshake(sock, Connection::Server(conn))
    }

    /// Dial-side construction: run the client handshake to completion,
    /// presenting this node's certificate chain.
    pub fn connect(
        sock: TcpStream,
        config: Arc<ClientConfig>,
        host: &str,
    ) -> Result<Self, ChannelError> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| ChannelError::Handshake(format!("invalid peer name {host}: {e}")))?;
        let conn = ClientConnection::new(config, server_name)
            .map_err(|e| ChannelError::Handshake(e.to_string()))?;
        Self::handshake(sock, Connection::Client(conn))
    }

    fn handshake(sock: TcpStream, tls: Connection) -> Result<Self, ChannelError> {
        sock.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
        let mut stream = Self {
            sock,
            tls,
            frames: FrameBuffer::new(),
        };
        stream.complete_handshake()?;
        Ok(stream)
    }

    /// Drive the TLS handshake until both sides are authenticated.
    fn complete_handshake(&mut self) -> Result<(), ChannelError> {
        while self.tls.is_handshaking() {
            if self.tls.wants_write() {
                self.tls
                    .write_tls(&mut self.sock)
                    .map_err(|e| ChannelError::Handshake(e.to_string()))?;
            }
            if self.tls.is_handshaking() && self.tls.wants_read() {
                match self.tls.read_tls(&mut self.sock) {
                    Ok(0) => {
                        return Err(ChannelError::Handshake(
                            "peer closed during handshake".to_string(),
                        ))
                    }
                    Ok(_) => {}
                    Err(e) => return Err(ChannelError::Handshake(e.to_string())),
                }
                self.tls
                    .process_new_packets()
                    .map_err(|e| ChannelError::Handshake(e.to_string()))?;
            }
        }

        // Flush the final handshake flight before application data.
        while self.tls.wants_write() {
            self.tls
                .write_tls(&mut self.sock)
                .map_err(|e| ChannelError::Handshake(e.to_string()))?;
        }
        Ok(())
    }

    /// Bound subsequent [`poll_frame`](Self::poll_frame) reads.
    pub fn set_poll_interval(&mut self, interval: Duration) -> io::Result<()> {
        self.sock.set_read_timeout(Some(interval))
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.sock.peer_addr()
    }

    /// Send one framed payload over the secure channel.
    pub fn send_frame(&mut self, payload: &[u8]) -> Result<(), ChannelError> {
        if payload.len() > MAX_FRAME_LEN {
            return Err(ChannelError::OversizedFrame {
                len: payload.len(),
                max: MAX_FRAME_LEN,
            });
        }

        let len = (payload.len() as u32).to_le_bytes();
        self.tls.writer().write_all(&len)?;
        self.tls.writer().write_all(payload)?;
        self.flush_tls()
    }

    /// Poll for the next inbound frame, waiting at most the configured poll
    /// interval for transport data.
    pub fn poll_frame(&mut self) -> Result<FramePoll, ChannelError> {
        self.drain_plaintext()?;
        if let Some(frame) = self.frames.next_frame()? {
            return Ok(FramePoll::Frame(frame));
        }

        match self.tls.read_tls(&mut self.sock) {
            Ok(0) => Ok(FramePoll::Closed),
            Ok(_) => {
                let state = self.tls.process_new_packets()?;
                self.drain_plaintext()?;
                if let Some(frame) = self.frames.next_frame()? {
                    Ok(FramePoll::Frame(frame))
                } else if state.peer_has_closed() {
                    Ok(FramePoll::Closed)
                } else {
                    Ok(FramePoll::Pending)
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(FramePoll::Pending)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Move decrypted plaintext into the frame buffer.
    fn drain_plaintext(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.tls.reader().read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.frames.extend(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn flush_tls(&mut self) -> Result<(), ChannelError> {
        self.tls.writer().flush()?;
        while self.tls.wants_write() {
            self.tls.write_tls(&mut self.sock)?;
        }
        self.sock.flush()?;
        Ok(())
    }

    /// Best-effort close_notify so the peer observes a clean shutdown.
    pub fn close(&mut self) {
        self.tls.send_close_notify();
        let _ = self.flush_tls();
        let _ = self.sock.shutdown(Shutdown::Both);
    }
}
