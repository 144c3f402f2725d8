//! Drives one authenticated connection.
//!
//! Inbound frames are handed to the [`Session`] strictly one at a time.
//! While the initial directory lookup runs, frames are still read so the
//! peer cannot fill the socket, but they are discarded.

use std::io;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::FramedRead;

use crate::framing::FrameCodec;
use crate::session::{CloseReason, Flow, Session, SessionContext, SessionError};

/// How a connection ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    Closed(CloseReason),
    PeerClosed,
    IdleTimeout,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("connection read failed: {0}")]
    Read(#[from] io::Error),
}

/// Run a session over `stream` until either side ends it.
///
/// `idle_timeout` bounds the time between inbound frames once the session
/// is bound. Expiry closes the connection without a message.
pub async fn run_connection<S>(
    ctx: SessionContext,
    identity: String,
    stream: S,
    idle_timeout: Option<Duration>,
) -> Result<Ending, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut frames = FramedRead::new(read_half, FrameCodec::new());
    let mut session = Session::new(ctx, identity, write_half);

    let result = drive(&mut session, &mut frames, idle_timeout).await;

    if let Err(e) = session.shutdown().await {
        tracing::debug!(sdp_id = %session.identity(), error = %e, "Shutdown after session end failed");
    }

    match &result {
        Ok(Ending::IdleTimeout) => {
            tracing::info!(sdp_id = %session.identity(), "Connection idle timeout")
        }
        Ok(Ending::PeerClosed) => {
            tracing::info!(sdp_id = %session.identity(), "Connection closed by peer")
        }
        Ok(Ending::Closed(_)) => {}
        Err(e) => tracing::warn!(sdp_id = %session.identity(), error = %e, "Connection failed"),
    }

    result
}

async fn drive<W, R>(
    session: &mut Session<W>,
    frames: &mut FramedRead<R, FrameCodec>,
    idle_timeout: Option<Duration>,
) -> Result<Ending, ConnectionError>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncRead + Unpin,
{
    let flow = {
        let bind = session.bind();
        tokio::pin!(bind);

        loop {
            tokio::select! {
                flow = &mut bind => break flow?,
                frame = frames.next() => match frame {
                    Some(Ok(_)) => tracing::debug!("Discarding message received during lookup"),
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(Ending::PeerClosed),
                },
            }
        }
    };

    if let Flow::Close(reason) = flow {
        return Ok(Ending::Closed(reason));
    }

    loop {
        let next = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, frames.next()).await {
                Ok(next) => next,
                Err(_) => return Ok(Ending::IdleTimeout),
            },
            None => frames.next().await,
        };

        let frame = match next {
            Some(frame) => frame?,
            None => return Ok(Ending::PeerClosed),
        };

        if let Flow::Close(reason) = session.handle_frame(&frame).await? {
            return Ok(Ending::Closed(reason));
        }
    }
}
