//! Pipeline supervisor.
//!
//! Owns a table of managed node processes, starts them in dependency order
//! (server-role nodes before client-role nodes), detects crashes on a
//! polling monitor loop, restarts within a configurable budget, and pushes
//! typed `Reconnect` commands to client-role nodes over a loopback control
//! plane whenever their server peer comes back.

/// Control plane the client-role nodes subscribe to
pub mod control;

/// Monitor loop and supervision state machine
pub mod monitor;

/// Managed process table entries
pub mod process;

pub use control::ControlPlane;
pub use monitor::{Supervisor, SupervisorConfig, SupervisorHandle};
pub use process::{ManagedProcess, ProcessSpec, ProcessState, SupervisorError};
