//! Controller configuration.
//!
//! Every option can be given on the command line or through an `SDP_*`
//! environment variable (a `.env` file is loaded first).

use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::credentials::{check_len, ENCRYPTION_KEY_LEN, HMAC_KEY_LEN};
use crate::session::SessionPolicy;

/// Configuration errors detected before the controller starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value} for {name}: range is {min} to {max}")]
    OutOfRange {
        name: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

/// Check that `value` lies in `range`.
pub(crate) fn check_range(
    name: &'static str,
    value: u64,
    range: RangeInclusive<u64>,
) -> Result<(), ConfigError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

/// Paths to the PEM files the TLS listener is built from.
#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub server_cert: PathBuf,
    pub server_key: PathBuf,
    pub ca_cert: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ControllerConfig {
    /// Address to accept member connections on
    #[arg(long, env = "SDP_LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// Server certificate chain (PEM)
    #[arg(long, env = "SDP_SERVER_CERT", value_name = "PATH")]
    pub server_cert: Option<PathBuf>,

    /// Server private key (PEM, unencrypted)
    #[arg(long, env = "SDP_SERVER_KEY", value_name = "PATH")]
    pub server_key: Option<PathBuf>,

    /// CA bundle that member certificates must chain to (PEM)
    #[arg(long, env = "SDP_CA_CERT", value_name = "PATH")]
    pub ca_cert: Option<PathBuf>,

    /// SQLite database holding the member directory
    #[arg(long, env = "SDP_DATABASE", value_name = "PATH", default_value = "sdp-controller.db")]
    pub database: PathBuf,

    /// Maximum concurrent member connections
    #[arg(long, env = "SDP_MAX_CONNECTIONS", default_value_t = 100)]
    pub max_connections: u32,

    /// Maximum pooled database connections
    #[arg(long, env = "SDP_DB_POOL_SIZE", default_value_t = 5)]
    pub db_pool_size: u32,

    /// Unacknowledged deliveries allowed before a member is disconnected
    #[arg(long, env = "SDP_MAX_DATA_TRANSMIT_TRIES", default_value_t = 3)]
    pub max_data_transmit_tries: u32,

    /// Credential generation failures allowed per connection
    #[arg(long, env = "SDP_MAX_CREDENTIAL_MAKER_TRIES", default_value_t = 3)]
    pub max_credential_maker_tries: u32,

    /// Malformed messages allowed before a member is disconnected
    #[arg(long, env = "SDP_MAX_BAD_MESSAGES", default_value_t = 3)]
    pub max_bad_messages: u32,

    /// Days until newly issued credentials are due for rotation
    #[arg(long, env = "SDP_DAYS_TO_EXPIRATION", default_value_t = 7)]
    pub days_to_expiration: u32,

    /// Seconds of inbound silence before a connection is dropped (0 disables)
    #[arg(long, env = "SDP_SOCKET_TIMEOUT", value_name = "SECS", default_value_t = 0)]
    pub socket_timeout: u64,

    /// Keep clients connected after their credentials are rotated
    #[arg(long, env = "SDP_KEEP_CLIENTS_CONNECTED")]
    pub keep_clients_connected: bool,

    /// Extra keep_alive copies to send per request (load testing only)
    #[arg(long, env = "SDP_TEST_MANY_MESSAGES", default_value_t = 0, hide = true)]
    pub test_many_messages: u32,

    /// Verbose logging, including raw message payloads
    #[arg(long, env = "SDP_DEBUG")]
    pub debug: bool,

    /// Length of generated encryption keys in bytes
    #[arg(long, env = "SDP_ENCRYPTION_KEY_LEN", default_value_t = 32)]
    pub encryption_key_len: usize,

    /// Length of generated HMAC keys in bytes
    #[arg(long, env = "SDP_HMAC_KEY_LEN", default_value_t = 128)]
    pub hmac_key_len: usize,
}

impl ControllerConfig {
    /// Check every numeric setting before anything is started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_len("encryption_key_len", self.encryption_key_len, ENCRYPTION_KEY_LEN)?;
        check_len("hmac_key_len", self.hmac_key_len, HMAC_KEY_LEN)?;
        check_range("max_connections", self.max_connections.into(), 1..=u32::MAX.into())?;
        check_range("db_pool_size", self.db_pool_size.into(), 1..=u32::MAX.into())?;
        check_range(
            "max_data_transmit_tries",
            self.max_data_transmit_tries.into(),
            1..=u32::MAX.into(),
        )?;
        check_range("max_bad_messages", self.max_bad_messages.into(), 1..=u32::MAX.into())?;
        check_range(
            "days_to_expiration",
            self.days_to_expiration.into(),
            1..=3650,
        )?;
        Ok(())
    }

    /// TLS file locations, all of which `serve` requires.
    pub fn tls_paths(&self) -> Result<TlsPaths, ConfigError> {
        Ok(TlsPaths {
            server_cert: self.server_cert.clone().ok_or(ConfigError::Missing("server_cert"))?,
            server_key: self.server_key.clone().ok_or(ConfigError::Missing("server_key"))?,
            ca_cert: self.ca_cert.clone().ok_or(ConfigError::Missing("ca_cert"))?,
        })
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.socket_timeout > 0).then(|| Duration::from_secs(self.socket_timeout))
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            max_data_transmit_tries: self.max_data_transmit_tries,
            max_credential_maker_tries: self.max_credential_maker_tries,
            max_bad_messages: self.max_bad_messages,
            days_to_expiration: self.days_to_expiration,
            keep_clients_connected: self.keep_clients_connected,
            test_many_messages: self.test_many_messages,
        }
    }
}
