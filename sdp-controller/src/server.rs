//! Accept loop for member connections.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rustls::ServerConfig;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_rustls::TlsAcceptor;
use tracing::Instrument;

use crate::connection::run_connection;
use crate::session::SessionContext;
use crate::tls::{peer_common_name, IdentityError};

/// Time allowed for the TLS handshake after a TCP connection is accepted.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// A bound controller listener.
pub struct Controller {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    ctx: SessionContext,
    connections: Arc<Semaphore>,
    idle_timeout: Option<Duration>,
}

impl Controller {
    pub async fn bind(
        addr: SocketAddr,
        tls: Arc<ServerConfig>,
        ctx: SessionContext,
        max_connections: usize,
        idle_timeout: Option<Duration>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(tls),
            ctx,
            connections: Arc::new(Semaphore::new(max_connections)),
            idle_timeout,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Sessions already running are not waited for.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        tracing::info!(
            addr = ?self.listener.local_addr().ok(),
            max_connections = self.connections.available_permits(),
            "Controller listening"
        );

        loop {
            let (tcp, peer) = tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, no longer accepting connections");
                    return;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                },
            };

            let permit = match Arc::clone(&self.connections).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::warn!(%peer, "Connection limit reached, dropping connection");
                    continue;
                }
            };

            let acceptor = self.acceptor.clone();
            let ctx = self.ctx.clone();
            let idle_timeout = self.idle_timeout;
            let span = tracing::info_span!("connection", %peer);

            tokio::spawn(
                async move {
                    let _permit = permit;
                    serve_connection(acceptor, ctx, tcp, idle_timeout).await;
                }
                .instrument(span),
            );
        }
    }
}

async fn serve_connection(
    acceptor: TlsAcceptor,
    ctx: SessionContext,
    tcp: TcpStream,
    idle_timeout: Option<Duration>,
) {
    let stream = match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(tcp)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "TLS handshake failed");
            return;
        }
        Err(_) => {
            tracing::warn!("TLS handshake timed out");
            return;
        }
    };

    let identity = {
        let (_, conn) = stream.get_ref();
        conn.peer_certificates()
            .ok_or(IdentityError::NoCertificate)
            .and_then(peer_common_name)
    };

    let identity = match identity {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(error = %e, "Rejecting connection without a usable identity");
            return;
        }
    };

    tracing::info!(sdp_id = %identity, "Member connected");

    // Outcomes are logged by the connection driver.
    let _ = run_connection(ctx, identity, stream, idle_timeout).await;
}
