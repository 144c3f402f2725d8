//! In-memory collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sdp_core::{AccessRow, Credentials, MemberRecord, MemberType};

use crate::credentials::{CredentialGenerator, GeneratorError};
use crate::directory::{DirectoryError, MemberDirectory};
use crate::notify::{GatewayNotifier, NotifyError, RotationOutcome};

#[derive(Clone, Copy)]
pub(crate) enum Failure {
    Unavailable,
    Query,
}

impl Failure {
    pub(crate) fn error(self) -> DirectoryError {
        match self {
            Failure::Unavailable => DirectoryError::Unavailable(sqlx::Error::PoolTimedOut),
            Failure::Query => DirectoryError::Query(sqlx::Error::RowNotFound),
        }
    }
}

pub(crate) type StoredUpdate = (String, Credentials, DateTime<Utc>, DateTime<Utc>);

#[derive(Default)]
pub(crate) struct FakeDirectory {
    pub(crate) members: Vec<MemberRecord>,
    pub(crate) rows: Vec<AccessRow>,
    pub(crate) lookup_failure: Option<Failure>,
    pub(crate) lookup_delay: Option<Duration>,
    pub(crate) access_failure: Option<Failure>,
    pub(crate) update_failure: Option<Failure>,
    pub(crate) updates: Mutex<Vec<StoredUpdate>>,
}

impl FakeDirectory {
    pub(crate) fn with_members(members: Vec<MemberRecord>) -> Self {
        Self {
            members,
            ..Default::default()
        }
    }

    pub(crate) fn updates(&self) -> Vec<StoredUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl MemberDirectory for FakeDirectory {
    async fn lookup_by_id(&self, id: &str) -> Result<MemberRecord, DirectoryError> {
        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = self.lookup_failure {
            return Err(failure.error());
        }
        let matches: Vec<_> = self.members.iter().filter(|m| m.id == id).collect();
        match matches.as_slice() {
            [] => Err(DirectoryError::NotFound),
            [member] => Ok((*member).clone()),
            many => Err(DirectoryError::MultipleMatch(many.len())),
        }
    }

    async fn update_credentials(
        &self,
        id: &str,
        credentials: &Credentials,
        updated_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DirectoryError> {
        if let Some(failure) = self.update_failure {
            return Err(failure.error());
        }
        self.updates.lock().unwrap().push((
            id.to_string(),
            credentials.clone(),
            updated_at,
            expires_at,
        ));
        Ok(())
    }

    async fn access_rows(&self, _gateway_id: &str) -> Result<Vec<AccessRow>, DirectoryError> {
        match self.access_failure {
            Some(failure) => Err(failure.error()),
            None => Ok(self.rows.clone()),
        }
    }
}

/// Generator that plays back scripted failures, then succeeds.
#[derive(Default)]
pub(crate) struct FakeGenerator {
    pub(crate) failures: Mutex<VecDeque<()>>,
    pub(crate) calls: AtomicUsize,
}

impl FakeGenerator {
    pub(crate) fn failing(times: usize) -> Self {
        Self {
            failures: Mutex::new(std::iter::repeat(()).take(times).collect()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CredentialGenerator for FakeGenerator {
    async fn generate(&self, member: &MemberRecord) -> Result<Credentials, GeneratorError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failures.lock().unwrap().pop_front().is_some() {
            return Err(GeneratorError::Failed("scripted failure".to_string()));
        }
        Ok(Credentials::new(
            format!("{}-enc-{}", member.id, n),
            format!("{}-hmac-{}", member.id, n),
        ))
    }
}

#[derive(Default)]
pub(crate) struct FakeNotifier {
    pub(crate) calls: AtomicUsize,
}

#[async_trait]
impl GatewayNotifier for FakeNotifier {
    async fn notify(&self, _member_id: &str, _outcome: &RotationOutcome) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) fn member(id: &str, member_type: MemberType, due: Option<DateTime<Utc>>) -> MemberRecord {
    MemberRecord {
        id: id.to_string(),
        member_type,
        encryption_key: due.map(|_| "b2xk".to_string()),
        hmac_key: due.map(|_| "b2xkaG1hYw==".to_string()),
        last_cred_update: due.map(|d| d - chrono::Duration::days(7)),
        cred_update_due: due,
    }
}

pub(crate) fn current(id: &str, member_type: MemberType) -> MemberRecord {
    member(id, member_type, Some(Utc::now() + chrono::Duration::days(3)))
}

pub(crate) fn expired(id: &str, member_type: MemberType) -> MemberRecord {
    member(id, member_type, Some(Utc::now() - chrono::Duration::days(1)))
}
