//! PEM file loading.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use super::TlsConfigError;

/// Read every certificate in a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsConfigError> {
    let file = File::open(path).map_err(|e| TlsConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

    if certs.is_empty() {
        return Err(TlsConfigError::InvalidCert(format!(
            "no certificates in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Read the first private key (PKCS#8, PKCS#1 or SEC1) in a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsConfigError> {
    let file = File::open(path).map_err(|e| TlsConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| TlsConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?
        .ok_or_else(|| TlsConfigError::MissingKey(path.to_path_buf()))
}
