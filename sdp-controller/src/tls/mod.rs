//! TLS configuration for the controller.
//!
//! Members must present a certificate issued by the configured CA; the
//! subject common name of that certificate is the member's id.

mod identity;
mod pem;
mod server;

pub use identity::{peer_common_name, IdentityError};
pub use pem::{load_certs, load_private_key};
pub use server::{TlsConfigError, TlsServerConfig};
