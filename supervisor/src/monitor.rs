use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use logpipe_common::{NodeRole, PipelineConfig};

use crate::{
    control::ControlPlane,
    process::{ManagedProcess, ProcessSpec, ProcessState, SupervisorError},
};

/// Tunables for the supervision loop.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Control plane bind address
    pub control_addr: String,
    /// Interval between monitor passes
    pub monitor_poll: Duration,
    /// Head start given to server-role nodes (at startup and before
    /// reconnect signals)
    pub settle:       Duration,
    /// Restart budget per process; `None` restarts forever
    pub max_restarts: Option<u32>,
}

impl SupervisorConfig {
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            control_addr: config.control_addr.clone(),
            monitor_poll: config.monitor_poll,
            settle:       config.settle,
            max_restarts: config.max_restarts,
        }
    }
}

type ProcessTable = Arc<Mutex<Vec<ManagedProcess>>>;

/// Supervises the node processes: dependency-ordered startup, crash
/// detection, restart within the configured budget, and reconnect
/// coordination over the control plane.
///
/// The process table has exactly one writer at a time: [`start`] runs
/// before the monitor thread exists, then [`spawn_monitor`] hands the table
/// to that thread for the rest of the run.
///
/// [`start`]: Supervisor::start
/// [`spawn_monitor`]: Supervisor::spawn_monitor
pub struct Supervisor {
    table:   ProcessTable,
    control: ControlPlane,
    config:  SupervisorConfig,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
}

impl Supervisor {
    /// Bind the control plane and build the process table. Nothing is
    /// launched yet.
    pub fn new(
        config: SupervisorConfig,
        specs: Vec<ProcessSpec>,
    ) -> Result<Self, SupervisorError> {
        let control = ControlPlane::bind(&config.control_addr).map_err(SupervisorError::Control)?;
        let (stop_tx, stop_rx) = unbounded();
        let table = specs.into_iter().map(ManagedProcess::new).collect();

        Ok(Self {
            table: Arc::new(Mutex::new(table)),
            control,
            config,
            stop_tx,
            stop_rx,
        })
    }

    /// Address the control plane actually bound.
    pub fn control_addr(&self) -> SocketAddr {
        self.control.local_addr()
    }

    /// Sender that stops the monitor loop; hand a clone to a signal
    /// handler.
    pub fn stop_sender(&self) -> Sender<()> {
        self.stop_tx.clone()
    }

    /// Launch every managed process: server-role nodes first, then after
    /// the settle interval the client-role nodes (they dial on startup and
    /// need a listening peer). A launch failure is surfaced immediately.
    pub fn start(&mut self) -> Result<(), SupervisorError> {
        {
            let mut table = self.table.lock().unwrap();
            for process in table.iter_mut().filter(|p| p.role() == NodeRole::Server) {
                process.spawn()?;
            }
        }

        tracing::debug!("waiting for server nodes to start");
        thread::sleep(self.config.settle);

        let mut table = self.table.lock().unwrap();
        for process in table.iter_mut().filter(|p| p.role() == NodeRole::Client) {
            process.spawn()?;
        }
        Ok(())
    }

    /// Hand the table to the monitor thread and return a handle for
    /// observation and shutdown. Call after [`start`](Self::start).
    pub fn spawn_monitor(self) -> Result<SupervisorHandle, SupervisorError> {
        let table = Arc::clone(&self.table);
        let stop_tx = self.stop_tx.clone();

        let thread = thread::Builder::new()
            .name("supervisor-monitor".to_string())
            .spawn(move || self.monitor_loop())
            .map_err(SupervisorError::Monitor)?;

        Ok(SupervisorHandle {
            table,
            stop_tx,
            thread: Some(thread),
        })
    }

    fn monitor_loop(mut self) {
        tracing::info!(poll = ?self.config.monitor_poll, "monitor loop running");
        loop {
            match self.stop_rx.recv_timeout(self.config.monitor_poll) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => self.monitor_pass(),
            }
        }
        self.shutdown_all();
    }

    /// One supervision pass over the table.
    fn monitor_pass(&mut self) {
        let mut server_restarted = false;
        {
            let mut table = self.table.lock().unwrap();
            for process in table.iter_mut() {
                if process.state() != ProcessState::Running {
                    continue;
                }
                let Some(status) = process.poll_exited() else {
                    continue;
                };

                tracing::error!(name = %process.name(), %status, "node process is down, restarting");
                process.mark_crashed();

                if let Some(max) = self.config.max_restarts {
                    if process.restarts() >= max {
                        tracing::error!(name = %process.name(), restarts = process.restarts(),
                            "restart budget exhausted, leaving process down");
                        process.mark_stopped();
                        continue;
                    }
                }

                match process.spawn() {
                    Ok(pid) => {
                        process.note_restart();
                        tracing::info!(name = %process.name(), pid, restarts = process.restarts(),
                            "node process restarted");
                        if process.role() == NodeRole::Server {
                            server_restarted = true;
                        }
                    }
                    Err(e) => {
                        // a vanished executable is configuration, not a crash
                        tracing::error!(name = %process.name(), error = %e,
                            "relaunch failed, leaving process down");
                        process.mark_stopped();
                    }
                }
            }

            for process in table.iter_mut() {
                process.reap();
            }
        }

        if server_restarted {
            // the old server's connections died with it; give the fresh
            // instance its head start, then tell every client to re-dial
            thread::sleep(self.config.settle);
            let notified = self.control.broadcast_reconnect();
            tracing::info!(notified, "reconnect signal sent to client nodes");
        }
    }

    fn shutdown_all(&mut self) {
        tracing::info!("stopping all managed processes");
        let mut table = self.table.lock().unwrap();
        for process in table.iter_mut() {
            process.terminate();
        }
    }
}

/// Observation and shutdown handle for a running supervisor.
pub struct SupervisorHandle {
    table:   ProcessTable,
    stop_tx: Sender<()>,
    thread:  Option<JoinHandle<()>>,
}

impl SupervisorHandle {
    pub fn pid_of(&self, name: &str) -> Option<u32> {
        self.with_process(name, |p| p.pid()).flatten()
    }

    pub fn state_of(&self, name: &str) -> Option<ProcessState> {
        self.with_process(name, |p| p.state())
    }

    pub fn restarts_of(&self, name: &str) -> Option<u32> {
        self.with_process(name, |p| p.restarts())
    }

    fn with_process<T>(&self, name: &str, f: impl FnOnce(&ManagedProcess) -> T) -> Option<T> {
        self.table
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.name() == name)
            .map(f)
    }

    /// Stop monitoring, terminate every managed process, and wait for the
    /// monitor thread to finish.
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    /// Block until the monitor loop exits (e.g. via a stop sender handed to
    /// a signal handler).
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
