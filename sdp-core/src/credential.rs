//! Symmetric key material handed to members.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::member::credential_expiry;

/// A fresh encryption + HMAC key pair, base64 encoded.
///
/// Serialized as the `data` of a `credential_update` message.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub encryption_key: String,
    pub hmac_key: String,
}

impl Credentials {
    pub fn new(encryption_key: impl Into<String>, hmac_key: impl Into<String>) -> Self {
        Self {
            encryption_key: encryption_key.into(),
            hmac_key: hmac_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("encryption_key_len", &self.encryption_key.len())
            .field("hmac_key_len", &self.hmac_key.len())
            .finish()
    }
}

/// Credentials sent to a member but not yet acknowledged or stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRotation {
    pub credentials: Credentials,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CredentialRotation {
    /// Stamp freshly generated credentials with their issue and expiry times.
    pub fn new(credentials: Credentials, now: DateTime<Utc>, days_to_expiration: u32) -> Self {
        Self {
            credentials,
            updated_at: now,
            expires_at: credential_expiry(now, days_to_expiration),
        }
    }
}
