//! Access refresh sub-flow.

use sdp_core::{aggregate, Outbound};
use tokio::io::AsyncWrite;

use super::{CloseReason, Flow, Session, SessionError, SessionState};

pub(crate) const DIRECTORY_UNREACHABLE: &str = "Database unreachable. Try again soon.";
pub(crate) const DIRECTORY_QUERY_FAILED: &str = "Database error. Try again soon.";

impl<W> Session<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Send the member every access entry reachable through it.
    ///
    /// A directory failure is reported without consuming an attempt; the
    /// member is expected to ask again.
    pub(super) async fn refresh_access(&mut self) -> Result<Flow, SessionError> {
        if self.counters.transmit_attempts >= self.ctx.policy.max_data_transmit_tries {
            tracing::warn!(
                sdp_id = %self.identity,
                attempts = self.counters.transmit_attempts,
                "Access list sent repeatedly without acknowledgement"
            );
            return Ok(Flow::Close(CloseReason::TransmitRetriesExhausted));
        }

        let member_id = self.bound_member()?.id.clone();

        match self.ctx.directory.access_rows(&member_id).await {
            Err(e) => {
                tracing::warn!(sdp_id = %member_id, error = %e, "Access query failed");
                let cause = if e.is_unavailable() {
                    DIRECTORY_UNREACHABLE
                } else {
                    DIRECTORY_QUERY_FAILED
                };
                self.state = SessionState::Ready;
                self.send(&Outbound::AccessRefreshError(cause.to_string()))
                    .await?;
                Ok(Flow::Continue)
            }
            Ok(rows) => {
                let entries = aggregate(&rows);
                self.counters.transmit_attempts += 1;

                tracing::info!(
                    sdp_id = %member_id,
                    rows = rows.len(),
                    entries = entries.len(),
                    attempt = self.counters.transmit_attempts,
                    "Sending access refresh"
                );
                self.send(&Outbound::AccessRefresh(entries)).await?;
                Ok(Flow::Continue)
            }
        }
    }
}
