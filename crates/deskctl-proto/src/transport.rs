// Transport configuration and TLS bring-up for device sessions.
//
// The device speaks the instrumentation protocol over a plain TLS socket on
// a fixed port. Test rigs almost never carry a trusted certificate, so the
// default mode accepts anything; the other modes stay available for labs
// that do provision certificates.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::Error;

/// Well-known instrumentation port exposed by the devices.
pub const DEFAULT_PORT: u16 = 65532;

/// TLS verification mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// Verify against the bundled webpki root store.
    System,
    /// Verify against a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate. Default: devices ship self-signed certs.
    #[default]
    DangerAcceptInvalid,
}

/// Shared transport configuration for building device connectors.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Upper bound on a single TCP connect + TLS handshake attempt.
    pub handshake_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::DangerAcceptInvalid,
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

impl TransportConfig {
    /// Build a rustls `ClientConfig` from this config.
    pub fn build_tls_config(&self) -> Result<ClientConfig, Error> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Tls(format!("unsupported protocol versions: {e}")))?;

        let config = match &self.tls {
            TlsMode::System => {
                let mut roots = RootCertStore::empty();
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                builder.with_root_certificates(roots).with_no_client_auth()
            }
            TlsMode::CustomCa(path) => {
                let pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let mut roots = RootCertStore::empty();
                for cert in CertificateDer::pem_slice_iter(&pem) {
                    let cert = cert.map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                    roots
                        .add(cert)
                        .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                }
                builder.with_root_certificates(roots).with_no_client_auth()
            }
            TlsMode::DangerAcceptInvalid => builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider }))
                .with_no_client_auth(),
        };

        Ok(config)
    }
}

// ── Stream abstraction ───────────────────────────────────────────────

/// Any full-duplex byte stream a session can run over.
pub trait DeviceStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> DeviceStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn DeviceStream>;

/// Opens one transport connection to a device.
///
/// The session calls [`connect`](Self::connect) repeatedly until it succeeds
/// or the bring-up deadline passes. Tests substitute in-memory streams.
pub trait Connector: Send + Sync {
    fn connect(&self) -> BoxFuture<'_, Result<BoxedStream, Error>>;

    /// Human-readable peer description for logs (`10.0.0.5:65532`).
    fn peer(&self) -> String;
}

/// Production connector: TCP + TLS to `address:port`.
pub struct TlsConnector {
    address: String,
    port: u16,
    handshake_timeout: Duration,
    tls: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    pub fn new(address: &str, port: u16, transport: &TransportConfig) -> Result<Self, Error> {
        let config = transport.build_tls_config()?;
        Ok(Self {
            address: address.to_owned(),
            port,
            handshake_timeout: transport.handshake_timeout,
            tls: tokio_rustls::TlsConnector::from(Arc::new(config)),
        })
    }

    async fn handshake(&self) -> Result<BoxedStream, Error> {
        let server_name = ServerName::try_from(self.address.clone())
            .map_err(|e| Error::InvalidAddress(format!("{}: {e}", self.address)))?;

        let tcp = TcpStream::connect((self.address.as_str(), self.port))
            .await
            .map_err(|e| Error::Connect {
                address: self.peer(),
                reason: e.to_string(),
            })?;
        tcp.set_nodelay(true)?;

        let stream = self
            .tls
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::Tls(e.to_string()))?;

        debug!(peer = %self.peer(), "TLS session established");
        Ok(Box::new(stream))
    }
}

impl Connector for TlsConnector {
    fn connect(&self) -> BoxFuture<'_, Result<BoxedStream, Error>> {
        Box::pin(async move {
            let timeout_ms = u64::try_from(self.handshake_timeout.as_millis()).unwrap_or(u64::MAX);
            tokio::time::timeout(self.handshake_timeout, self.handshake())
                .await
                .map_err(|_| Error::Timeout { timeout_ms })?
        })
    }

    fn peer(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

// ── Certificate verifier ─────────────────────────────────────────────

/// Accepts every server certificate but still checks handshake signatures,
/// so the session is encrypted even though the peer is not authenticated.
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_transport_accepts_self_signed() {
        let config = TransportConfig::default();
        assert_eq!(config.tls, TlsMode::DangerAcceptInvalid);
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
    }

    #[test]
    fn builds_tls_config_for_every_mode() {
        let insecure = TransportConfig::default();
        assert!(insecure.build_tls_config().is_ok());

        let system = TransportConfig {
            tls: TlsMode::System,
            ..TransportConfig::default()
        };
        assert!(system.build_tls_config().is_ok());
    }

    #[test]
    fn missing_custom_ca_is_a_tls_error() {
        let config = TransportConfig {
            tls: TlsMode::CustomCa(PathBuf::from("/nonexistent/ca.pem")),
            ..TransportConfig::default()
        };
        assert!(matches!(config.build_tls_config(), Err(Error::Tls(_))));
    }

    #[test]
    fn connector_reports_peer() {
        let connector = TlsConnector::new("10.0.0.5", DEFAULT_PORT, &TransportConfig::default())
            .expect("connector builds");
        assert_eq!(connector.peer(), "10.0.0.5:65532");
    }
}
