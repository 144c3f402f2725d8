//! Credential generation.
//!
//! The session engine only depends on [`CredentialGenerator`]; the
//! generator instance is created once at startup and shared by every
//! connection task.

use std::ops::RangeInclusive;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sdp_core::{Credentials, MemberRecord};
use zeroize::Zeroize;

use crate::config::{check_range, ConfigError};

/// Accepted encryption key lengths, in bytes.
pub const ENCRYPTION_KEY_LEN: RangeInclusive<usize> = 4..=32;
/// Accepted HMAC key lengths, in bytes.
pub const HMAC_KEY_LEN: RangeInclusive<usize> = 4..=128;

/// Credential generation failed.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("random source failed: {0}")]
    Random(#[from] rand::Error),
    #[error("credential generation failed: {0}")]
    Failed(String),
}

/// Produces fresh key pairs for members.
#[async_trait]
pub trait CredentialGenerator: Send + Sync {
    async fn generate(&self, member: &MemberRecord) -> Result<Credentials, GeneratorError>;
}

/// Generates random keys from the operating system's CSPRNG.
#[derive(Debug, Clone)]
pub struct RandomCredentialMaker {
    encryption_key_len: usize,
    hmac_key_len: usize,
}

impl RandomCredentialMaker {
    pub fn new(encryption_key_len: usize, hmac_key_len: usize) -> Result<Self, ConfigError> {
        check_len("encryption_key_len", encryption_key_len, ENCRYPTION_KEY_LEN)?;
        check_len("hmac_key_len", hmac_key_len, HMAC_KEY_LEN)?;

        Ok(Self {
            encryption_key_len,
            hmac_key_len,
        })
    }
}

pub(crate) fn check_len(
    name: &'static str,
    value: usize,
    range: RangeInclusive<usize>,
) -> Result<(), ConfigError> {
    check_range(
        name,
        value as u64,
        *range.start() as u64..=*range.end() as u64,
    )
}

fn random_base64(len: usize) -> Result<String, GeneratorError> {
    let mut bytes = vec![0u8; len];
    OsRng.try_fill_bytes(&mut bytes)?;
    let encoded = STANDARD.encode(&bytes);
    bytes.zeroize();
    Ok(encoded)
}

#[async_trait]
impl CredentialGenerator for RandomCredentialMaker {
    async fn generate(&self, member: &MemberRecord) -> Result<Credentials, GeneratorError> {
        tracing::debug!(sdp_id = %member.id, "Generating credentials");

        Ok(Credentials::new(
            random_base64(self.encryption_key_len)?,
            random_base64(self.hmac_key_len)?,
        ))
    }
}
