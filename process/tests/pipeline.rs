//! End-to-end pipeline scenario over mutual TLS: a processing node listens,
//! a peer dials it and broadcasts records, and acknowledgements come back on
//! the same channel.

use std::{fs, path::Path, sync::Arc, time::Duration};

use crossbeam_channel::{unbounded, Sender};
use logpipe_common::{CertPaths, MessageHandler, NodeRuntime};
use logpipe_process::{LogStore, ProcessingHandler, ACK_STORED, ERR_MALFORMED};
use rcgen::{BasicConstraints, CertificateParams, ExtendedKeyUsagePurpose, IsCa, KeyPair};

const IO_POLL: Duration = Duration::from_millis(50);
const RECV_DEADLINE: Duration = Duration::from_secs(5);

fn write_test_certs(dir: &Path) -> CertPaths {
    let ca_key = KeyPair::generate().unwrap();
    let mut ca_params = CertificateParams::new(Vec::new()).unwrap();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();

    let node_key = KeyPair::generate().unwrap();
    let mut node_params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
    node_params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];
    let node_cert = node_params.signed_by(&node_key, &ca_cert, &ca_key).unwrap();

    let paths = CertPaths {
        cert_path: dir.join("node.pem"),
        key_path:  dir.join("node.key.pem"),
        ca_path:   dir.join("root-ca.pem"),
    };
    fs::write(&paths.cert_path, node_cert.pem()).unwrap();
    fs::write(&paths.key_path, node_key.serialize_pem()).unwrap();
    fs::write(&paths.ca_path, ca_cert.pem()).unwrap();
    paths
}

/// Collects the acknowledgements a real ingestion node would just log.
struct AckCapture {
    tx: Sender<Vec<u8>>,
}

impl MessageHandler for AckCapture {
    fn on_message(&self, payload: &[u8]) -> Option<Vec<u8>> {
        let _ = self.tx.send(payload.to_vec());
        None
    }
}

#[test]
fn records_flow_end_to_end_and_malformed_input_is_survivable() {
    let dir = tempfile::tempdir().unwrap();
    let certs = write_test_certs(dir.path());

    let store = Arc::new(LogStore::open(&dir.path().join("logs.db")).unwrap());
    let sink = NodeRuntime::new(
        "log-process",
        &certs,
        Arc::new(ProcessingHandler::new(Arc::clone(&store))),
        IO_POLL,
    )
    .unwrap();
    let addr = sink.listen("127.0.0.1:0").unwrap();

    let (tx, acks) = unbounded();
    let source = NodeRuntime::new("log-ingest", &certs, Arc::new(AckCapture { tx }), IO_POLL).unwrap();
    source
        .dial(&addr.to_string(), 5, Duration::from_millis(100))
        .unwrap();

    // a valid record is stored and acknowledged
    assert_eq!(source.broadcast(br#"{"timestamp":"T","message":"hello"}"#), 1);
    assert_eq!(acks.recv_timeout(RECV_DEADLINE).unwrap(), ACK_STORED.as_bytes());
    assert_eq!(store.count().unwrap(), 1);

    // malformed input draws the error response but keeps the channel open
    source.broadcast(b"not-json");
    assert_eq!(
        acks.recv_timeout(RECV_DEADLINE).unwrap(),
        ERR_MALFORMED.as_bytes()
    );
    assert_eq!(store.count().unwrap(), 1);

    // the same connection still carries the next valid record
    source.broadcast(br#"{"timestamp":"T2","message":"world"}"#);
    assert_eq!(acks.recv_timeout(RECV_DEADLINE).unwrap(), ACK_STORED.as_bytes());
    assert_eq!(store.count().unwrap(), 2);
}

#[test]
fn a_burst_of_records_arrives_in_order_per_connection() {
    let dir = tempfile::tempdir().unwrap();
    let certs = write_test_certs(dir.path());

    let store = Arc::new(LogStore::open(&dir.path().join("logs.db")).unwrap());
    let sink = NodeRuntime::new(
        "log-process",
        &certs,
        Arc::new(ProcessingHandler::new(Arc::clone(&store))),
        IO_POLL,
    )
    .unwrap();
    let addr = sink.listen("127.0.0.1:0").unwrap();

    let (tx, acks) = unbounded();
    let source = NodeRuntime::new("log-ingest", &certs, Arc::new(AckCapture { tx }), IO_POLL).unwrap();
    source
        .dial(&addr.to_string(), 5, Duration::from_millis(100))
        .unwrap();

    for i in 0..20 {
        let payload = format!(r#"{{"timestamp":"T","message":"line {i}"}}"#);
        source.broadcast(payload.as_bytes());
    }
    for _ in 0..20 {
        assert_eq!(acks.recv_timeout(RECV_DEADLINE).unwrap(), ACK_STORED.as_bytes());
    }
    assert_eq!(store.count().unwrap(), 20);
}
