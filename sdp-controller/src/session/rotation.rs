//! Credential rotation sub-flow.
//!
//! New keys are sent first and stored only once the member acknowledges
//! them, so the directory never holds keys the member has not received.

use std::sync::Arc;

use chrono::Utc;
use sdp_core::{CredentialRotation, Outbound};
use tokio::io::AsyncWrite;

use super::{CloseReason, Flow, Session, SessionError, SessionState};
use crate::notify::RotationOutcome;

pub(crate) const GENERATOR_FAILED: &str = "Could not generate new credentials";

impl<W> Session<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Generate and send fresh credentials.
    pub(super) async fn rotate(&mut self) -> Result<Flow, SessionError> {
        let policy = self.ctx.policy;

        if self.counters.transmit_attempts >= policy.max_data_transmit_tries {
            tracing::warn!(
                sdp_id = %self.identity,
                attempts = self.counters.transmit_attempts,
                "Credentials sent repeatedly without acknowledgement"
            );
            return Ok(Flow::Close(CloseReason::TransmitRetriesExhausted));
        }

        let generator = Arc::clone(&self.ctx.generator);
        let result = generator.generate(self.bound_member()?).await;

        match result {
            Err(e) => {
                self.counters.generator_attempts += 1;
                let attempt = self.counters.generator_attempts;

                if attempt > policy.max_credential_maker_tries {
                    tracing::error!(
                        sdp_id = %self.identity,
                        attempt,
                        error = %e,
                        "Credential generation keeps failing"
                    );
                    return Ok(Flow::Close(CloseReason::GeneratorRetriesExhausted));
                }

                tracing::warn!(sdp_id = %self.identity, attempt, error = %e, "Credential generation failed");
                self.send(&Outbound::CredentialUpdateError(GENERATOR_FAILED.to_string()))
                    .await?;
                Ok(Flow::Continue)
            }
            Ok(credentials) => {
                self.counters.generator_attempts = 0;

                let rotation =
                    CredentialRotation::new(credentials, Utc::now(), policy.days_to_expiration);
                let msg = Outbound::CredentialUpdate(rotation.credentials.clone());
                self.pending = Some(rotation);
                self.counters.transmit_attempts += 1;

                tracing::info!(
                    sdp_id = %self.identity,
                    attempt = self.counters.transmit_attempts,
                    "Sending new credentials"
                );
                self.send(&msg).await?;
                Ok(Flow::Continue)
            }
        }
    }

    /// Store the acknowledged credentials.
    ///
    /// A failed write is logged and not retried; the session carries on as
    /// if the keys had been stored.
    pub(super) async fn acknowledge_rotation(&mut self) -> Result<Flow, SessionError> {
        self.counters.reset();
        self.state = SessionState::Ready;

        let Some(rotation) = self.pending.take() else {
            tracing::warn!(sdp_id = %self.identity, "Credential update ack with nothing pending");
            return Ok(Flow::Continue);
        };

        let member = self.member.as_mut().ok_or(SessionError::Unbound)?;

        let stored = self
            .ctx
            .directory
            .update_credentials(
                &member.id,
                &rotation.credentials,
                rotation.updated_at,
                rotation.expires_at,
            )
            .await;

        if let Err(e) = stored {
            tracing::error!(sdp_id = %member.id, error = %e, "Failed to store acknowledged credentials");
            return Ok(Flow::Continue);
        }

        member.encryption_key = Some(rotation.credentials.encryption_key.clone());
        member.hmac_key = Some(rotation.credentials.hmac_key.clone());
        member.last_cred_update = Some(rotation.updated_at);
        member.cred_update_due = Some(rotation.expires_at);

        tracing::info!(
            sdp_id = %member.id,
            expires_at = %rotation.expires_at,
            "Credentials rotated"
        );

        if !member.is_client() {
            return Ok(Flow::Continue);
        }

        let outcome = RotationOutcome {
            updated_at: rotation.updated_at,
            expires_at: rotation.expires_at,
        };
        if let Err(e) = self.ctx.notifier.notify(&member.id, &outcome).await {
            tracing::warn!(sdp_id = %member.id, error = %e, "Gateway notification failed");
        }

        if self.ctx.policy.keep_clients_connected {
            Ok(Flow::Continue)
        } else {
            Ok(Flow::Close(CloseReason::ClientRotationComplete))
        }
    }
}
