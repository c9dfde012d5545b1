//! Secure Pipeline Common Library
//!
//! This crate provides the machinery shared by every logpipe node and by the
//! supervisor:
//!
//! - TLS channel configuration with mutual certificate authentication
//! - Length-prefixed message framing over encrypted TCP streams
//! - A thread-safe connection registry with broadcast fan-out
//! - The node runtime (accept loop, bounded-retry dialing, receive loops)
//! - Control-plane protocol definitions used for reconnect coordination
//! - Configuration structures and the channel error taxonomy
//!
//! # Features
//!
//! - **Mutual TLS**: every connection presents and verifies certificates
//!   against a shared trust anchor before application data flows
//! - **Fan-out isolation**: a failing peer never blocks delivery to the rest
//! - **Pluggable roles**: node behavior is injected through [`MessageHandler`]

/// Configuration structures and environment overrides
pub mod config;

/// Channel error taxonomy
pub mod error;

/// Length-prefixed framing and incremental frame reassembly
pub mod frame;

/// Role-specific message handling capability
pub mod handler;

/// Control-plane protocol definitions
pub mod protocol;

/// Thread-safe registry of live connections
pub mod registry;

/// Node runtime: listen, dial, broadcast
pub mod runtime;

/// Synchronous TLS stream wrapper for framed payloads
pub mod stream;

/// Server- and client-role TLS configuration factory
pub mod tls;

// Re-export commonly used types for convenience
pub use config::{CertPaths, NodeRole, PipelineConfig};
pub use error::ChannelError;
pub use handler::MessageHandler;
pub use protocol::ControlMessage;
pub use registry::{ConnectionId, ConnectionRegistry, Direction};
pub use runtime::NodeRuntime;
pub use stream::{FramePoll, SecureStream};
