use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ConfigModel;
use crate::core::codec::FrameCodec;
use crate::core::frame::Frame;
use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::handshake::server_send_config;
use crate::protocol::identity::{ClientIdentity, ServerIdentity};
use crate::protocol::message::{Message, Packet};
use crate::service::registry::SessionHandle;
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::with_timeout_or;

/// Lifecycle of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Accepted, CONFIG frame not yet written
    Connecting,
    /// CONFIG frame written, no packet yet
    ConfigSent,
    /// At least one packet received
    Streaming,
    /// Connection released
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "CONNECTING",
            SessionState::ConfigSent => "CONFIG_SENT",
            SessionState::Streaming => "STREAMING",
            SessionState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// What every session on a server shares.
#[derive(Clone)]
pub struct SessionContext {
    pub config: Arc<ConfigModel>,
    pub dispatcher: Dispatcher,
    pub server: ServerIdentity,
}

/// Server side of one client connection.
///
/// Owns the socket outright. Frames are read and dispatched strictly one at
/// a time: the next read starts only after the previous packet's delivery
/// has returned, which is what keeps per-client ordering.
pub struct ClientSession {
    identity: ClientIdentity,
    framed: Framed<TcpStream, FrameCodec>,
    ctx: SessionContext,
    state: watch::Sender<SessionState>,
    close: CancellationToken,
    connected_at: Instant,
}

impl ClientSession {
    pub fn new(stream: TcpStream, identity: ClientIdentity, ctx: SessionContext) -> Self {
        let codec = FrameCodec::new(ctx.config.server.max_frame_size);
        let (state, _) = watch::channel(SessionState::Connecting);

        Self {
            identity,
            framed: Framed::new(stream, codec),
            ctx,
            state,
            close: CancellationToken::new(),
            connected_at: Instant::now(),
        }
    }

    pub fn identity(&self) -> ClientIdentity {
        self.identity
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Handle for the registry: observes state and can request a close.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(
            self.identity,
            self.state.subscribe(),
            self.close.clone(),
            self.connected_at,
        )
    }

    /// Run the session to completion.
    ///
    /// Returns `Ok(())` when the server asked the session to close, and the
    /// closing error otherwise: [`ProtocolError::ConnectionClosed`] when the
    /// client hung up, [`ProtocolError::ConnectionTimeout`] when the idle
    /// window elapsed, or the transport/framing failure that ended it. The
    /// state is [`SessionState::Closed`] on return either way.
    #[instrument(skip(self), fields(client = %self.identity))]
    pub async fn run(mut self) -> Result<()> {
        let result = self.drive().await;
        self.transition(SessionState::Closed);
        result
    }

    async fn drive(&mut self) -> Result<()> {
        let idle = self.ctx.config.server.idle_timeout;
        server_send_config(&mut self.framed, &self.ctx.config, idle)
            .await
            .map_err(|e| ProtocolError::TransportError(format!("config send failed: {e}")))?;
        global_metrics().config_sent();
        self.transition(SessionState::ConfigSent);

        while let Some(frame) = self.next_frame().await? {
            let outcome = match Message::from_frame(&frame) {
                Ok(Message::Packet(fields)) => {
                    if self.state() == SessionState::ConfigSent {
                        self.transition(SessionState::Streaming);
                    }
                    self.ctx
                        .dispatcher
                        .deliver(self.ctx.server, self.identity, Packet::new(fields))
                        .await
                }
                Ok(Message::Config(_)) => Err(ProtocolError::UnexpectedMessage),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {}
                Err(e) if e.is_fatal_to_session() => return Err(e),
                // logged and counted by the dispatcher
                Err(ProtocolError::HandlerError(_)) => {}
                Err(e) => {
                    global_metrics().malformed_frame();
                    warn!(client = %self.identity, kind = ?frame.kind, error = %e, "Skipping frame");
                }
            }
        }

        info!(client = %self.identity, "Session closed by server");
        Ok(())
    }

    /// Next frame, or `None` once a close has been requested.
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        let idle = self.ctx.config.server.idle_timeout;
        let framed = &mut self.framed;
        let close = &self.close;

        tokio::select! {
            biased;
            _ = close.cancelled() => Ok(None),
            read = with_timeout_or(
                async { framed.next().await.transpose() },
                idle,
                ProtocolError::ConnectionTimeout,
            ) => match read? {
                None => Err(ProtocolError::ConnectionClosed),
                Some(frame) => {
                    global_metrics().frame_received(frame.payload.len() as u64);
                    Ok(Some(frame))
                }
            }
        }
    }

    fn transition(&self, next: SessionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(client = %self.identity, from = %prev, to = %next, "Session state changed");
        }
    }
}
