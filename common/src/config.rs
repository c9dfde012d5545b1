use std::{env, path::PathBuf, time::Duration};

const CERTS_DIR_ENV: &str = "LOGPIPE_CERTS_DIR";
const DEFAULT_CERTS_DIR: &str = "certs";

fn certs_dir() -> PathBuf {
    let dir = env::var(CERTS_DIR_ENV).unwrap_or(DEFAULT_CERTS_DIR.to_string());
    PathBuf::from(dir)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_path(key: &str, default: &str) -> PathBuf {
    PathBuf::from(env_string(key, default))
}

fn env_millis(key: &str, default_ms: u64) -> Duration {
    let ms = env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_command(key: &str, default: &str) -> Vec<String> {
    env_string(key, default)
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

/// Whether a node accepts inbound connections (authoritative endpoint) or
/// initiates outbound ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Server,
    Client,
}

/// Certificate, private key, and trust anchor locations for a node.
///
/// The deployment uses one shared authority: every node presents the same
/// certificate identity and trusts the same root.
#[derive(Debug, Clone)]
pub struct CertPaths {
    /// Path to the node certificate file
    pub cert_path: PathBuf,
    /// Path to the node private key file
    pub key_path:  PathBuf,
    /// Path to the certificate authority file
    pub ca_path:   PathBuf,
}

impl CertPaths {
    /// Creates CertPaths with default certificate locations under the base
    /// certs directory (`LOGPIPE_CERTS_DIR`, default `certs`).
    pub fn new() -> Self {
        let base = certs_dir();
        Self {
            cert_path: base.join("node.pem"),
            key_path:  base.join("node.key.pem"),
            ca_path:   base.join("root-ca.pem"),
        }
    }
}

impl Default for CertPaths {
    fn default() -> Self {
        Self::new()
    }
}

/// Every address, path, and interval the pipeline runs on.
///
/// All fields carry compiled defaults and a `LOGPIPE_*` environment
/// override; intervals are given in milliseconds.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Listen address of the log ingestion node (server role)
    pub ingest_addr:  String,
    /// Listen address of the log processing node (client role)
    pub process_addr: String,
    /// Loopback address of the supervisor control plane
    pub control_addr: String,

    /// Log file tailed by the ingestion node
    pub log_file: PathBuf,
    /// SQLite database written by the processing node
    pub db_path:  PathBuf,

    /// Poll interval for new log lines
    pub tail_poll:        Duration,
    /// Poll interval of the supervisor monitor loop
    pub monitor_poll:     Duration,
    /// Settle interval between starting server-role and client-role nodes
    pub settle:           Duration,
    /// Fixed delay between outbound dial attempts (no backoff growth)
    pub dial_retry_delay: Duration,
    /// Number of dial attempts before giving up
    pub dial_attempts:    u32,
    /// Bounded-read interval of each connection's receive loop
    pub io_poll:          Duration,
    /// Interval of the client node's reconnect self-check
    pub self_heal:        Duration,
    /// Restart budget per managed process; `None` restarts forever
    pub max_restarts:     Option<u32>,

    /// Launch command for the ingestion node process
    pub ingest_command:  Vec<String>,
    /// Launch command for the processing node process
    pub process_command: Vec<String>,
}

impl PipelineConfig {
    /// Builds the configuration from the environment, falling back to the
    /// compiled defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            ingest_addr:  env_string("LOGPIPE_INGEST_ADDR", "127.0.0.1:10001"),
            process_addr: env_string("LOGPIPE_PROCESS_ADDR", "127.0.0.1:10002"),
            control_addr: env_string("LOGPIPE_CONTROL_ADDR", "127.0.0.1:10005"),

            log_file: env_path("LOGPIPE_LOG_FILE", "logs/app.log"),
            db_path:  env_path("LOGPIPE_DB_PATH", "logs.db"),

            tail_poll:        env_millis("LOGPIPE_TAIL_POLL_MS", 1_000),
            monitor_poll:     env_millis("LOGPIPE_MONITOR_POLL_MS", 1_000),
            settle:           env_millis("LOGPIPE_SETTLE_MS", 1_000),
            dial_retry_delay: env_millis("LOGPIPE_DIAL_RETRY_MS", 10_000),
            dial_attempts:    env_u32("LOGPIPE_DIAL_ATTEMPTS", 10),
            io_poll:          env_millis("LOGPIPE_IO_POLL_MS", 100),
            self_heal:        env_millis("LOGPIPE_SELF_HEAL_MS", 5_000),
            max_restarts:     env::var("LOGPIPE_MAX_RESTARTS")
                .ok()
                .and_then(|v| v.parse().ok()),

            ingest_command:  env_command("LOGPIPE_INGEST_CMD", "logpipe-ingest"),
            process_command: env_command("LOGPIPE_PROCESS_CMD", "logpipe-process"),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
