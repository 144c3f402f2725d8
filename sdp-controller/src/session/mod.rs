//! Per-connection session state machine.
//!
//! A [`Session`] owns the write half of one authenticated connection. The
//! connection driver feeds it inbound frames one at a time and tears the
//! connection down when a handler returns [`Flow::Close`].
//!
//! ```text
//! LookupPending -> Ready -> {CredPending | RefreshPending} -> Ready -> ... -> Closed
//! ```

mod refresh;
mod rotation;


use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::SinkExt;
use sdp_core::{CredentialRotation, Inbound, InboundAction, MemberRecord, Outbound};
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;

use crate::credentials::CredentialGenerator;
use crate::directory::{DirectoryError, MemberDirectory};
use crate::framing::FrameCodec;
use crate::notify::GatewayNotifier;

/// Retry bounds and behaviour switches applied to every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub max_data_transmit_tries: u32,
    pub max_credential_maker_tries: u32,
    pub max_bad_messages: u32,
    pub days_to_expiration: u32,
    pub keep_clients_connected: bool,
    /// Extra `keep_alive` copies sent per request, for load testing.
    pub test_many_messages: u32,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_data_transmit_tries: 3,
            max_credential_maker_tries: 3,
            max_bad_messages: 3,
            days_to_expiration: 7,
            keep_clients_connected: false,
            test_many_messages: 0,
        }
    }
}

/// Shared collaborators handed to every connection task.
#[derive(Clone)]
pub struct SessionContext {
    pub directory: Arc<dyn MemberDirectory>,
    pub generator: Arc<dyn CredentialGenerator>,
    pub notifier: Arc<dyn GatewayNotifier>,
    pub policy: SessionPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake done, directory lookup not yet answered.
    LookupPending,
    Ready,
    /// Credentials sent or offered, waiting for an ack or a retry.
    CredPending,
    /// Access list sent, waiting for an ack.
    RefreshPending,
    Closed,
}

/// Per-session retry counters, reset together when a sub-flow completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub transmit_attempts: u32,
    pub generator_attempts: u32,
    pub bad_messages: u32,
}

impl Counters {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    UnknownMember,
    DirectoryFault,
    TransmitRetriesExhausted,
    GeneratorRetriesExhausted,
    TooManyBadMessages,
    ClientRotationComplete,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::UnknownMember => "unknown member",
            CloseReason::DirectoryFault => "directory fault",
            CloseReason::TransmitRetriesExhausted => "transmit retries exhausted",
            CloseReason::GeneratorRetriesExhausted => "credential generator retries exhausted",
            CloseReason::TooManyBadMessages => "too many bad messages",
            CloseReason::ClientRotationComplete => "client credential rotation complete",
        };
        f.write_str(s)
    }
}

/// What the connection driver should do after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close(CloseReason),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("connection write failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("no member bound to session")]
    Unbound,
}

/// One member's conversation with the controller.
pub struct Session<W> {
    identity: String,
    ctx: SessionContext,
    writer: FramedWrite<W, FrameCodec>,
    state: SessionState,
    member: Option<MemberRecord>,
    pending: Option<CredentialRotation>,
    counters: Counters,
}

impl<W> Session<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Create a session for the peer whose certificate named `identity`.
    pub fn new(ctx: SessionContext, identity: impl Into<String>, writer: W) -> Self {
        Self {
            identity: identity.into(),
            ctx,
            writer: FramedWrite::new(writer, FrameCodec::new()),
            state: SessionState::LookupPending,
            member: None,
            pending: None,
            counters: Counters::default(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn member(&self) -> Option<&MemberRecord> {
        self.member.as_ref()
    }

    pub fn pending_rotation(&self) -> Option<&CredentialRotation> {
        self.pending.as_ref()
    }

    /// Look the peer up in the directory and bind the session to it.
    ///
    /// Runs exactly once, before any inbound frame is interpreted.
    pub async fn bind(&mut self) -> Result<Flow, SessionError> {
        let flow = match self.ctx.directory.lookup_by_id(&self.identity).await {
            Ok(member) => {
                let due = member.credentials_due(chrono::Utc::now());
                tracing::info!(
                    sdp_id = %member.id,
                    member_type = %member.member_type,
                    credentials_due = due,
                    "Member bound to session"
                );
                self.member = Some(member);

                if due {
                    self.state = SessionState::CredPending;
                    self.rotate().await?
                } else {
                    self.state = SessionState::Ready;
                    self.send(&Outbound::CredentialsGood).await?;
                    Flow::Continue
                }
            }
            Err(DirectoryError::NotFound) => {
                tracing::warn!(sdp_id = %self.identity, "Unknown member presented a valid certificate");
                self.send(&Outbound::UnknownSdpId).await?;
                Flow::Close(CloseReason::UnknownMember)
            }
            Err(e) => {
                tracing::error!(sdp_id = %self.identity, error = %e, "Member lookup failed");
                self.send(&Outbound::DatabaseError).await?;
                Flow::Close(CloseReason::DirectoryFault)
            }
        };

        Ok(self.settle(flow))
    }

    /// Process one inbound frame.
    ///
    /// Frames that arrive before the session is bound are dropped.
    pub async fn handle_frame(&mut self, frame: &[u8]) -> Result<Flow, SessionError> {
        if self.member.is_none() {
            tracing::debug!(sdp_id = %self.identity, "Dropping message received before lookup");
            return Ok(Flow::Continue);
        }

        tracing::debug!(
            sdp_id = %self.identity,
            payload = %String::from_utf8_lossy(frame),
            "Message received"
        );

        let flow = match Inbound::decode(frame) {
            Ok(msg) => self.dispatch(msg.action, frame).await?,
            Err(e) => {
                tracing::warn!(sdp_id = %self.identity, error = %e, "Undecodable message");
                self.bad_message(frame).await?
            }
        };

        Ok(self.settle(flow))
    }

    async fn dispatch(&mut self, action: InboundAction, frame: &[u8]) -> Result<Flow, SessionError> {
        use InboundAction::*;
        use SessionState::*;

        match (action, self.state) {
            (KeepAlive, _) => self.keep_alive().await,
            (AccessUpdateRequest, _) => {
                tracing::debug!(sdp_id = %self.identity, "Access update request ignored");
                Ok(Flow::Continue)
            }
            (CredentialUpdateRequest, Ready | CredPending) => {
                self.state = CredPending;
                self.rotate().await
            }
            (CredentialUpdateAck, Ready | CredPending) => self.acknowledge_rotation().await,
            (AccessRefreshRequest, Ready | RefreshPending) => {
                self.state = RefreshPending;
                self.refresh_access().await
            }
            (AccessAck, Ready | RefreshPending) => {
                tracing::debug!(sdp_id = %self.identity, "Access refresh acknowledged");
                self.counters.reset();
                self.state = Ready;
                Ok(Flow::Continue)
            }
            (action, state) => {
                tracing::warn!(
                    sdp_id = %self.identity,
                    action = action.as_str(),
                    state = ?state,
                    "Message does not belong to the pending exchange"
                );
                self.bad_message(frame).await
            }
        }
    }

    async fn keep_alive(&mut self) -> Result<Flow, SessionError> {
        for _ in 0..self.ctx.policy.test_many_messages {
            self.send(&Outbound::KeepAlive).await?;
        }
        self.send(&Outbound::KeepAlive).await?;
        Ok(Flow::Continue)
    }

    async fn bad_message(&mut self, frame: &[u8]) -> Result<Flow, SessionError> {
        self.counters.bad_messages += 1;
        let count = self.counters.bad_messages;

        if count >= self.ctx.policy.max_bad_messages {
            tracing::warn!(sdp_id = %self.identity, count, "Bad message limit reached");
            return Ok(Flow::Close(CloseReason::TooManyBadMessages));
        }

        let echo = String::from_utf8_lossy(frame).into_owned();
        self.send(&Outbound::BadMessage(echo)).await?;
        Ok(Flow::Continue)
    }

    /// Encode and write one message.
    pub(crate) async fn send(&mut self, msg: &Outbound) -> Result<(), SessionError> {
        let payload = msg.encode()?;
        tracing::debug!(sdp_id = %self.identity, action = msg.action(), "Sending message");
        self.writer.send(Bytes::from(payload)).await?;
        Ok(())
    }

    /// Flush pending output and shut the write side down.
    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        self.state = SessionState::Closed;
        self.writer.close().await?;
        Ok(())
    }

    fn settle(&mut self, flow: Flow) -> Flow {
        if let Flow::Close(reason) = flow {
            tracing::info!(sdp_id = %self.identity, %reason, "Closing session");
            self.state = SessionState::Closed;
            self.pending = None;
        }
        flow
    }

    fn bound_member(&self) -> Result<&MemberRecord, SessionError> {
        self.member.as_ref().ok_or(SessionError::Unbound)
    }
}
