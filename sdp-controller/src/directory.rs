//! Member directory interface.
//!
//! The directory is the only persistent state the controller touches. It is
//! shared by every connection task, so implementations must be safe for
//! concurrent use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sdp_core::{AccessRow, Credentials, MemberRecord};

/// Errors returned by a [`MemberDirectory`].
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("member not found")]
    NotFound,
    #[error("query matched {0} members")]
    MultipleMatch(usize),
    #[error("database unreachable: {0}")]
    Unavailable(#[source] sqlx::Error),
    #[error("database error: {0}")]
    Query(#[source] sqlx::Error),
    #[error("invalid directory row: {0}")]
    Decode(String),
}

impl DirectoryError {
    /// Whether the directory could not be reached at all, as opposed to a
    /// query that reached it and failed.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DirectoryError::Unavailable(_))
    }
}

impl From<sqlx::Error> for DirectoryError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DirectoryError::Unavailable(e)
            }
            other => DirectoryError::Query(other),
        }
    }
}

/// Persistent store of members and their access policy.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// Find the single member whose id equals `id`.
    ///
    /// Returns [`DirectoryError::NotFound`] for zero rows and
    /// [`DirectoryError::MultipleMatch`] for more than one.
    async fn lookup_by_id(&self, id: &str) -> Result<MemberRecord, DirectoryError>;

    /// Overwrite a member's credentials and rotation timestamps.
    async fn update_credentials(
        &self,
        id: &str,
        credentials: &Credentials,
        updated_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DirectoryError>;

    /// All (member, port) pairs reachable through the gateway `gateway_id`,
    /// ordered by member id.
    async fn access_rows(&self, gateway_id: &str) -> Result<Vec<AccessRow>, DirectoryError>;
}
