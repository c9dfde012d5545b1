//! Log processing node.
//!
//! The client-role end of the pipeline: dials the ingestion node, decodes
//! each broadcast record, stores it in the SQLite sink, and acknowledges
//! every payload on the connection it arrived on. The topology is kept
//! alive two ways: the supervisor pushes `Reconnect` over the control link
//! after restarting the server peer, and a periodic self-check re-dials
//! whenever the outbound channel is gone regardless of signals.

use std::sync::Arc;

use logpipe_common::MessageHandler;
use serde::Deserialize;

/// Supervisor control link
pub mod control;

/// SQLite record sink
pub mod store;

pub use store::LogStore;

/// Acknowledgement returned for a stored record.
pub const ACK_STORED: &str = "log stored";
/// Response for a payload that is not valid record JSON.
pub const ERR_MALFORMED: &str = "error: invalid log payload";
/// Response when the store rejects a record.
pub const ERR_STORAGE: &str = "error: storage failure";

/// The slice of the wire payload this node cares about.
#[derive(Debug, Deserialize)]
struct LogRecord {
    timestamp: String,
    message:   String,
}

/// Decodes each payload as a log record and stores it.
///
/// A malformed payload is answered with an error response on the same
/// connection; the connection itself stays open.
pub struct ProcessingHandler {
    store: Arc<LogStore>,
}

impl ProcessingHandler {
    pub fn new(store: Arc<LogStore>) -> Self {
        Self { store }
    }
}

impl MessageHandler for ProcessingHandler {
    fn on_message(&self, payload: &[u8]) -> Option<Vec<u8>> {
        let record: LogRecord = match serde_json::from_slice(payload) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "invalid log payload");
                return Some(ERR_MALFORMED.as_bytes().to_vec());
            }
        };

        match self.store.insert(&record.timestamp, &record.message) {
            Ok(()) => {
                tracing::debug!(message = %record.message, "log stored");
                Some(ACK_STORED.as_bytes().to_vec())
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to store record");
                Some(ERR_STORAGE.as_bytes().to_vec())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(dir: &std::path::Path) -> (ProcessingHandler, Arc<LogStore>) {
        let store = Arc::new(LogStore::open(&dir.join("logs.db")).unwrap());
        (ProcessingHandler::new(Arc::clone(&store)), store)
    }

    #[test]
    fn valid_record_is_stored_and_acknowledged() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, store) = handler(dir.path());

        let response = handler.on_message(br#"{"timestamp":"T","message":"hello"}"#);
        assert_eq!(response.as_deref(), Some(ACK_STORED.as_bytes()));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn malformed_payload_gets_the_error_response() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, store) = handler(dir.path());

        let response = handler.on_message(b"not-json");
        assert_eq!(response.as_deref(), Some(ERR_MALFORMED.as_bytes()));
        assert_eq!(store.count().unwrap(), 0);

        // the handler still accepts the next valid record
        let response = handler.on_message(br#"{"timestamp":"T","message":"after"}"#);
        assert_eq!(response.as_deref(), Some(ACK_STORED.as_bytes()));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn ack_and_error_responses_are_distinguishable() {
        assert_ne!(ACK_STORED, ERR_MALFORMED);
        assert_ne!(ACK_STORED, ERR_STORAGE);
        assert!(!ACK_STORED.starts_with("error"));
        assert!(ERR_MALFORMED.starts_with("error"));
    }
}
