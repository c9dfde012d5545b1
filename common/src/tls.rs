use std::{fs, io::BufReader, path::Path, sync::Arc};

use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    client::verify_server_cert_signed_by_trust_anchor,
    crypto::WebPkiSupportedAlgorithms,
    pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime},
    server::{ParsedCertificate, WebPkiClientVerifier},
    ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme,
};
use rustls_pemfile::{certs, private_key};

use crate::{config::CertPaths, error::ChannelError};

/// Builds the server-role TLS configuration: the node presents its
/// certificate chain and requires every peer to present a certificate
/// verified against the trust anchor.
pub fn server_config(paths: &CertPaths) -> Result<Arc<ServerConfig>, ChannelError> {
    // Install default crypto provider for rustls if not already installed
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cert_chain = load_certs(&paths.cert_path)?;
    let key = load_key(&paths.key_path)?;
    let roots = load_trust_anchor(&paths.ca_path)?;

    let client_verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| ChannelError::credential(&paths.ca_path, e))?;

    let config = ServerConfig::builder()
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(cert_chain, key)?;

    Ok(Arc::new(config))
}

/// Builds the client-role TLS configuration: the node presents its own
/// certificate chain and verifies the server chain against the trust anchor.
///
/// Hostname verification is disabled: the deployment uses a single shared
/// authority rather than per-host certificates, so only the chain is
/// checked. Swap [`TrustAnchorVerifier`] for the default webpki verifier to
/// harden this when certificates become host-specific.
pub fn client_config(paths: &CertPaths) -> Result<Arc<ClientConfig>, ChannelError> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cert_chain = load_certs(&paths.cert_path)?;
    let key = load_key(&paths.key_path)?;
    let roots = load_trust_anchor(&paths.ca_path)?;

    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(TrustAnchorVerifier::new(roots)))
        .with_client_auth_cert(cert_chain, key)?;

    Ok(Arc::new(config))
}

fn read_pem(path: &Path) -> Result<Vec<u8>, ChannelError> {
    fs::read(path).map_err(|e| ChannelError::credential(path, e))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ChannelError> {
    let pem = read_pem(path)?;
    let parsed = certs(&mut BufReader::new(&*pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ChannelError::credential(path, e))?;

    if parsed.is_empty() {
        return Err(ChannelError::credential(path, "no certificates found"));
    }
    Ok(parsed)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ChannelError> {
    let pem = read_pem(path)?;
    private_key(&mut BufReader::new(&*pem))
        .map_err(|e| ChannelError::credential(path, e))?
        .ok_or_else(|| ChannelError::credential(path, "no private key found"))
}

fn load_trust_anchor(path: &Path) -> Result<RootCertStore, ChannelError> {
    let mut roots = RootCertStore::empty();
    roots.add_parsable_certificates(load_certs(path)?);

    if roots.is_empty() {
        return Err(ChannelError::credential(path, "no valid CA certificates"));
    }
    Ok(roots)
}

/// Verifies the server certificate chain against the configured trust
/// anchor without checking the hostname.
#[derive(Debug)]
struct TrustAnchorVerifier {
    roots:      RootCertStore,
    algorithms: WebPkiSupportedAlgorithms,
}

impl TrustAnchorVerifier {
    fn new(roots: RootCertStore) -> Self {
        Self {
            roots,
            algorithms: rustls::crypto::aws_lc_rs::default_provider().signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for TrustAnchorVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let cert = ParsedCertificate::try_from(end_entity)?;
        verify_server_cert_signed_by_trust_anchor(
            &cert,
            &self.roots,
            intermediates,
            now,
            self.algorithms.all,
        )?;
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
