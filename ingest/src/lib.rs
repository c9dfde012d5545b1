//! Log ingestion node.
//!
//! The server-role end of the pipeline: tails a log file for new lines,
//! wraps each line as a timestamped JSON record, and broadcasts it to every
//! connected peer through the shared node runtime. Inbound traffic on this
//! node consists of peer acknowledgements.

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use chrono::Utc;
use logpipe_common::{MessageHandler, NodeRuntime};
use serde::{Deserialize, Serialize};

/// Payload produced for every ingested log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// ISO-8601 ingestion time
    pub timestamp: String,
    /// The raw log line
    pub message: String,
}

impl LogRecord {
    pub fn now(message: String) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            message,
        }
    }
}

/// Incremental reader over a growing log file.
///
/// Each poll picks up only the bytes appended since the previous one. A
/// missing file is not an error (the producer may not have started yet);
/// a file that shrank is treated as rotated and read from the start.
pub struct LogTailer {
    path:     PathBuf,
    position: u64,
}

impl LogTailer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path:     path.into(),
            position: 0,
        }
    }

    /// Non-empty lines appended since the previous poll.
    pub fn poll(&mut self) -> io::Result<Vec<String>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let len = file.metadata()?.len();
        if len < self.position {
            tracing::info!(path = ?self.path, "log file shrank, reading from the start");
            self.position = 0;
        }

        file.seek(SeekFrom::Start(self.position))?;
        let mut appended = String::new();
        file.read_to_string(&mut appended)?;
        self.position += appended.len() as u64;

        Ok(appended
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }
}

/// Inbound payloads on the ingestion node are peer acknowledgements.
pub struct IngestionHandler;

impl MessageHandler for IngestionHandler {
    fn on_message(&self, payload: &[u8]) -> Option<Vec<u8>> {
        let ack = String::from_utf8_lossy(payload);
        if ack.starts_with("error") {
            tracing::warn!(%ack, "peer rejected a record");
        } else {
            tracing::debug!(%ack, "record acknowledged");
        }
        None
    }
}

/// Tail `log_file` forever, broadcasting each new line through `runtime`.
pub fn run_tailer(runtime: &NodeRuntime, log_file: &Path, poll: Duration) -> ! {
    let mut tailer = LogTailer::new(log_file);
    loop {
        match tailer.poll() {
            Ok(lines) => {
                for line in lines {
                    match serde_json::to_vec(&LogRecord::now(line)) {
                        Ok(payload) => {
                            let peers = runtime.broadcast(&payload);
                            tracing::debug!(peers, "record broadcast");
                        }
                        Err(e) => tracing::error!(error = %e, "failed to encode record"),
                    }
                }
            }
            Err(e) => tracing::warn!(path = ?log_file, error = %e, "error reading log file"),
        }
        thread::sleep(poll);
    }
}
