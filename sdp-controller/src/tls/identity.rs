//! Member identity from the verified peer certificate.

use rustls::pki_types::CertificateDer;
use x509_parser::prelude::*;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("peer presented no certificate")]
    NoCertificate,
    #[error("failed to parse peer certificate: {0}")]
    Parse(String),
    #[error("peer certificate subject has no common name")]
    NoCommonName,
}

/// The first subject common name of the leaf certificate.
///
/// `certs` is the chain rustls verified, leaf first.
pub fn peer_common_name(certs: &[CertificateDer<'_>]) -> Result<String, IdentityError> {
    let leaf = certs.first().ok_or(IdentityError::NoCertificate)?;
    let (_, cert) =
        X509Certificate::from_der(leaf).map_err(|e| IdentityError::Parse(e.to_string()))?;

    let name = cert
        .subject()
        .iter_common_name()
        .next()
        .ok_or(IdentityError::NoCommonName)?
        .as_str()
        .map_err(|e| IdentityError::Parse(e.to_string()))?;

    if name.is_empty() {
        return Err(IdentityError::NoCommonName);
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

    fn cert_with_subject(common_name: Option<&str>) -> CertificateDer<'static> {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::new()).unwrap();
        params.distinguished_name = DistinguishedName::new();
        params
            .distinguished_name
            .push(DnType::OrganizationName, "sdp");
        if let Some(cn) = common_name {
            params.distinguished_name.push(DnType::CommonName, cn);
        }
        params.self_signed(&key).unwrap().der().clone()
    }

    #[test]
    fn test_common_name_is_identity() {
        let cert = cert_with_subject(Some("gateway-7"));
        assert_eq!(peer_common_name(&[cert]).unwrap(), "gateway-7");
    }

    #[test]
    fn test_no_certificate() {
        assert!(matches!(
            peer_common_name(&[]),
            Err(IdentityError::NoCertificate)
        ));
    }

    #[test]
    fn test_subject_without_common_name() {
        let cert = cert_with_subject(None);
        assert!(matches!(
            peer_common_name(&[cert]),
            Err(IdentityError::NoCommonName)
        ));
    }

    #[test]
    fn test_garbage_certificate() {
        let cert = CertificateDer::from(vec![0x30, 0x03, 0x01, 0x01, 0xff]);
        assert!(matches!(
            peer_common_name(&[cert]),
            Err(IdentityError::Parse(_))
        ));
    }
}
