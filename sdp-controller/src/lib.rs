//! SDP controller service.
//!
//! Accepts mutually authenticated TLS connections from clients and
//! gateways, issues and rotates their credentials, and distributes access
//! policy to gateways. The domain types live in `sdp-core`; this crate adds
//! the listener, the session engine and the SQLite member directory.

pub mod config;
pub mod connection;
pub mod credentials;
pub mod db;
pub mod directory;
pub mod framing;
pub mod notify;
pub mod server;
pub mod session;
pub mod tls;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigError, ControllerConfig};
pub use credentials::{CredentialGenerator, RandomCredentialMaker};
pub use db::SqlDirectory;
pub use directory::{DirectoryError, MemberDirectory};
pub use notify::{GatewayNotifier, NoopNotifier};
pub use server::Controller;
pub use session::{SessionContext, SessionPolicy};
