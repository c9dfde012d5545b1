use std::{
    io,
    process::{Child, Command, ExitStatus, Stdio},
};

use logpipe_common::NodeRole;
use thiserror::Error;

/// Errors produced by the supervision layer.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A managed process could not be launched (e.g. the executable is
    /// missing). Fatal configuration error, never retried silently.
    #[error("failed to launch {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The control plane listener could not be bound.
    #[error("control plane error: {0}")]
    Control(#[source] io::Error),

    /// The monitor thread could not be spawned.
    #[error("monitor thread spawn failed: {0}")]
    Monitor(#[source] io::Error),
}

/// Launch description for one managed node process.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    /// Name the process is managed (and subscribed) under
    pub name:    String,
    /// Executable plus arguments
    pub command: Vec<String>,
    /// Startup-ordering and reconnect role
    pub role:    NodeRole,
}

/// Observed lifecycle of a managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running,
    Crashed,
    /// Terminal: explicit shutdown or an exhausted restart budget.
    Stopped,
}

/// One supervised node process and its lifecycle bookkeeping.
pub struct ManagedProcess {
    spec:     ProcessSpec,
    child:    Option<Child>,
    state:    ProcessState,
    restarts: u32,
}

impl ManagedProcess {
    pub fn new(spec: ProcessSpec) -> Self {
        Self {
            spec,
            child: None,
            state: ProcessState::NotStarted,
            restarts: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn role(&self) -> NodeRole {
        self.spec.role
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(|child| child.id())
    }

    /// Launch the process and mark it Running.
    pub fn spawn(&mut self) -> Result<u32, SupervisorError> {
        let (program, args) =
            self.spec
                .command
                .split_first()
                .ok_or_else(|| SupervisorError::Spawn {
                    name:   self.spec.name.clone(),
                    source: io::Error::new(io::ErrorKind::InvalidInput, "empty launch command"),
                })?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                name: self.spec.name.clone(),
                source,
            })?;

        let pid = child.id();
        tracing::info!(name = %self.spec.name, pid, "started node process");
        self.child = Some(child);
        self.state = ProcessState::Running;
        Ok(pid)
    }

    /// Non-blocking exit check; collects the status when the child has
    /// terminated.
    pub fn poll_exited(&mut self) -> Option<ExitStatus> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(exited) => exited,
            Err(e) => {
                tracing::error!(name = %self.spec.name, error = %e, "failed to poll process");
                None
            }
        }
    }

    pub fn mark_crashed(&mut self) {
        self.state = ProcessState::Crashed;
    }

    pub fn mark_stopped(&mut self) {
        self.state = ProcessState::Stopped;
    }

    pub fn note_restart(&mut self) {
        self.restarts += 1;
    }

    /// Clear the handle of a child whose exit has already been observed.
    pub fn reap(&mut self) {
        if matches!(self.state, ProcessState::Crashed | ProcessState::Stopped)
            && self.child.take().is_some()
        {
            tracing::debug!(name = %self.spec.name, "cleaned up terminated process handle");
        }
    }

    /// Terminate the process and wait for it to exit: SIGTERM first on
    /// Unix, hard kill elsewhere or when the signal cannot be sent.
    pub fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            let pid = child.id();

            #[cfg(unix)]
            {
                use nix::{
                    sys::signal::{kill, Signal},
                    unistd::Pid,
                };
                if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    tracing::warn!(name = %self.spec.name, pid, error = %e, "SIGTERM failed, killing");
                    let _ = child.kill();
                }
            }
            #[cfg(not(unix))]
            {
                let _ = child.kill();
            }

            match child.wait() {
                Ok(status) => {
                    tracing::info!(name = %self.spec.name, pid, %status, "process terminated")
                }
                Err(e) => tracing::warn!(name = %self.spec.name, pid, error = %e, "wait failed"),
            }
        }
        self.state = ProcessState::Stopped;
    }
}
