//! Gateway notification after a client's credentials change.
//!
//! Gateways learn about client key changes through their next access
//! refresh. A notifier can push the change sooner.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// What was rotated, handed to the notifier once the directory has it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationOutcome {
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
#[error("gateway notification failed: {0}")]
pub struct NotifyError(pub String);

/// Tells gateways that a client's credentials were rotated.
#[async_trait]
pub trait GatewayNotifier: Send + Sync {
    async fn notify(&self, member_id: &str, outcome: &RotationOutcome) -> Result<(), NotifyError>;
}

/// Notifier that does nothing; gateways pick changes up on refresh.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl GatewayNotifier for NoopNotifier {
    async fn notify(&self, member_id: &str, outcome: &RotationOutcome) -> Result<(), NotifyError> {
        tracing::debug!(
            sdp_id = %member_id,
            expires_at = %outcome.expires_at,
            "Gateway push notification not configured"
        );
        Ok(())
    }
}
