use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors produced by the secure channel layer.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Certificate material could not be read or parsed. Fatal at startup;
    /// never retried.
    #[error("credential error in {path:?}: {reason}")]
    Credential { path: PathBuf, reason: String },

    /// TLS negotiation with a peer failed. The offending connection attempt
    /// is dropped and logged; other connections are unaffected.
    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    /// Every dial attempt against a remote endpoint was exhausted.
    #[error("connect to {remote} failed after {attempts} attempts")]
    ConnectFailed { remote: String, attempts: u32 },

    /// Read or write failure on an established connection. Tears down only
    /// the affected connection.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// TLS protocol error on an established connection.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// A frame header announced a body beyond the frame size limit.
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    OversizedFrame { len: usize, max: usize },
}

impl ChannelError {
    /// Shorthand for credential failures tied to a file path.
    pub fn credential(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Credential {
            path:   path.into(),
            reason: reason.to_string(),
        }
    }
}
