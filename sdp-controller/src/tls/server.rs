//! TLS server configuration for mTLS.
//!
//! Uses rustls 0.23+ with modern builder patterns.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use x509_parser::prelude::*;

use super::pem::{load_certs, load_private_key};
use crate::config::TlsPaths;

/// TLS server configuration wrapper.
pub struct TlsServerConfig {
    pub config: Arc<ServerConfig>,
}

impl TlsServerConfig {
    /// Get the underlying rustls ServerConfig.
    pub fn into_rustls_config(self) -> Arc<ServerConfig> {
        self.config
    }

    /// Load the server chain, server key and CA bundle from PEM files.
    pub fn from_paths(paths: &TlsPaths) -> Result<Self, TlsConfigError> {
        let chain = load_certs(&paths.server_cert)?;
        let key = load_private_key(&paths.server_key)?;
        let ca_certs = load_certs(&paths.ca_cert)?;

        Self::new_mtls(chain, key, ca_certs)
    }

    /// Create mTLS server config (requires valid client certificates).
    ///
    /// Every member must present a certificate that chains to one of
    /// `ca_certs`. A handshake without a client certificate fails.
    ///
    /// # Arguments
    /// * `server_chain` - Server certificate followed by any intermediates
    /// * `server_key` - Server's private key
    /// * `ca_certs` - Trust anchors for member certificates
    pub fn new_mtls(
        server_chain: Vec<CertificateDer<'static>>,
        server_key: PrivateKeyDer<'static>,
        ca_certs: Vec<CertificateDer<'static>>,
    ) -> Result<Self, TlsConfigError> {
        // Skip expired or not-yet-valid anchors
        let mut root_store = RootCertStore::empty();
        let mut skipped_count = 0;
        for cert in ca_certs {
            match verify_certificate_validity(&cert) {
                Ok(()) => {
                    root_store
                        .add(cert)
                        .map_err(|e| TlsConfigError::InvalidCert(e.to_string()))?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping invalid CA certificate");
                    skipped_count += 1;
                }
            }
        }
        if skipped_count > 0 {
            tracing::info!(
                skipped = skipped_count,
                valid = root_store.len(),
                "Certificate validity check completed"
            );
        }

        if root_store.is_empty() {
            return Err(TlsConfigError::NoTrustAnchors);
        }

        let client_verifier = WebPkiClientVerifier::builder(Arc::new(root_store))
            .build()
            .map_err(|e| TlsConfigError::Verifier(e.to_string()))?;

        let config = ServerConfig::builder()
            .with_client_cert_verifier(client_verifier)
            .with_single_cert(server_chain, server_key)
            .map_err(|e| TlsConfigError::Config(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
        })
    }
}

/// Verify certificate validity period.
///
/// Returns Ok(()) if the certificate is currently valid (not expired and not future-dated).
fn verify_certificate_validity(cert_der: &[u8]) -> Result<(), TlsConfigError> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| TlsConfigError::InvalidCert(format!("failed to parse certificate: {}", e)))?;

    let validity = cert.validity();
    let now = SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|_| TlsConfigError::InvalidCert("system time error".to_string()))?
        .as_secs() as i64;

    let not_before = validity.not_before.timestamp();
    let not_after = validity.not_after.timestamp();

    if now < not_before {
        return Err(TlsConfigError::CertNotYetValid {
            not_before: not_before as u64,
            now: now as u64,
        });
    }

    if now > not_after {
        return Err(TlsConfigError::CertExpired {
            not_after: not_after as u64,
            now: now as u64,
        });
    }

    Ok(())
}

/// Errors that can occur during TLS configuration.
#[derive(Debug, thiserror::Error)]
pub enum TlsConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no private key in {0}")]
    MissingKey(PathBuf),
    #[error("invalid certificate: {0}")]
    InvalidCert(String),
    #[error("no valid CA certificate to verify members against")]
    NoTrustAnchors,
    #[error("failed to build verifier: {0}")]
    Verifier(String),
    #[error("failed to build config: {0}")]
    Config(String),
    #[error("certificate not yet valid (not_before: {not_before}, now: {now})")]
    CertNotYetValid { not_before: u64, now: u64 },
    #[error("certificate expired (not_after: {not_after}, now: {now})")]
    CertExpired { not_after: u64, now: u64 },
}
