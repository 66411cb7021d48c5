use std::io;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ConfigModel;
use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::{Dispatcher, PacketHandler};
use crate::protocol::identity::{ClientIdentity, ServerIdentity};
use crate::service::registry::SessionRegistry;
use crate::service::session::{ClientSession, SessionContext};
use crate::utils::metrics::global_metrics;

#[cfg(unix)]
const EMFILE: i32 = 24;
#[cfg(unix)]
const ENFILE: i32 = 23;
#[cfg(unix)]
const ENOMEM: i32 = 12;
#[cfg(target_os = "linux")]
const ENOBUFS: i32 = 105;
#[cfg(all(unix, not(target_os = "linux")))]
const ENOBUFS: i32 = 55;

/// Out-of-resource codes returned by `accept`.
#[cfg(unix)]
const RESOURCE_EXHAUSTION: &[i32] = &[EMFILE, ENFILE, ENOMEM, ENOBUFS];
// WSAEMFILE, WSAENOBUFS, ERROR_NOT_ENOUGH_MEMORY
#[cfg(windows)]
const RESOURCE_EXHAUSTION: &[i32] = &[10024, 10055, 8];
#[cfg(not(any(unix, windows)))]
const RESOURCE_EXHAUSTION: &[i32] = &[];

/// Accepts client connections and runs one session task per connection.
pub struct Listener {
    listener: TcpListener,
    identity: ServerIdentity,
    ctx: SessionContext,
    registry: SessionRegistry,
}

impl Listener {
    /// Bind to the configured `interface:port`.
    ///
    /// Port 0 picks a free port; [`Listener::local_addr`] reports it.
    #[instrument(skip_all, fields(interface = %config.server.interface, port = config.server.port))]
    pub async fn bind(config: Arc<ConfigModel>, dispatcher: Dispatcher) -> Result<Self> {
        let addr = config.server.bind_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ProtocolError::BindError {
                addr: addr.to_string(),
                source,
            })?;
        let identity = ServerIdentity::new(listener.local_addr()?);
        info!(address = %identity, "Listening");

        Ok(Self {
            listener,
            identity,
            ctx: SessionContext {
                config,
                dispatcher,
                server: identity,
            },
            registry: SessionRegistry::new(),
        })
    }

    /// The bound address, which is also the server identity given to the handler.
    pub fn local_addr(&self) -> ServerIdentity {
        self.identity
    }

    /// A handle onto the live session set.
    pub fn registry(&self) -> SessionRegistry {
        self.registry.clone()
    }

    /// Accept connections until `shutdown` fires or its senders are dropped.
    ///
    /// On shutdown every session is asked to close and the call waits for
    /// their tasks to finish, then for the dispatcher to go idle. A session
    /// is only interrupted between frames, so a delivery already in progress
    /// completes first. Passing the configured shutdown timeout only logs a
    /// warning.
    #[instrument(skip_all, fields(server = %self.identity))]
    pub async fn serve(self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        let Listener {
            listener,
            identity,
            ctx,
            registry,
        } = self;
        let mut tasks = JoinSet::new();

        let outcome = loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutting down server. Waiting for sessions to close...");
                    break Ok(());
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "Session task panicked");
                        }
                    }
                }

                accept_result = listener.accept() => match accept_result {
                    Ok((stream, addr)) => {
                        let client = ClientIdentity::new(addr);
                        spawn_session(&mut tasks, &registry, &ctx, stream, client).await;
                    }
                    Err(e) if is_resource_exhaustion(&e) => {
                        error!(error = %e, "Out of resources accepting connections");
                        break Err(ProtocolError::TransportError(format!("accept failed: {e}")));
                    }
                    Err(e) => {
                        warn!(error = %e, "Error accepting connection");
                    }
                },
            }
        };

        drop(listener);
        registry.close_all().await;

        // Sessions only stop between frames, so whatever is still running
        // here is mid-delivery. Aborting would lose that packet.
        let limit = ctx.config.server.shutdown_timeout;
        let drained = tokio::time::timeout(limit, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                timeout_ms = limit.as_millis() as u64,
                "Shutdown timeout reached, still waiting for in-flight deliveries"
            );
            while tasks.join_next().await.is_some() {}
        }
        ctx.dispatcher.quiesce().await;
        info!("All sessions closed");

        global_metrics().log_metrics();
        info!(server = %identity, "Server stopped");
        outcome
    }
}

async fn spawn_session(
    tasks: &mut JoinSet<()>,
    registry: &SessionRegistry,
    ctx: &SessionContext,
    stream: TcpStream,
    client: ClientIdentity,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(client = %client, error = %e, "Could not disable Nagle");
    }

    let session = ClientSession::new(stream, client, ctx.clone());
    if !registry.add(session.handle()).await {
        warn!(client = %client, "Rejecting connection with duplicate identity");
        return;
    }
    global_metrics().session_opened();
    info!(client = %client, "New connection established");

    let registry = registry.clone();
    tasks.spawn(async move {
        let result = session.run().await;
        registry.remove(&client).await;
        global_metrics().session_closed();

        match result {
            Ok(()) => debug!(client = %client, "Session finished"),
            Err(ProtocolError::ConnectionClosed) => {
                info!(client = %client, "Client disconnected");
            }
            Err(ProtocolError::ConnectionTimeout) => {
                global_metrics().idle_timeout();
                info!(client = %client, "Session idle, closed");
            }
            Err(e) => {
                global_metrics().transport_error();
                warn!(client = %client, error = %e, "Session ended with error");
            }
        }
    });
}

fn is_resource_exhaustion(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::OutOfMemory {
        return true;
    }
    matches!(e.raw_os_error(), Some(code) if RESOURCE_EXHAUSTION.contains(&code))
}

/// Bind and serve until Ctrl-C.
#[instrument(skip_all)]
pub async fn start_server<H: PacketHandler>(config: Arc<ConfigModel>, handler: H) -> Result<()> {
    let listener = Listener::bind(config, Dispatcher::new(handler)).await?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    listener.serve(shutdown_rx).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_resource_exhaustion_is_fatal() {
        assert!(is_resource_exhaustion(&io::Error::from_raw_os_error(EMFILE)));
        assert!(is_resource_exhaustion(&io::Error::from_raw_os_error(ENFILE)));
        assert!(is_resource_exhaustion(&io::Error::from(io::ErrorKind::OutOfMemory)));
    }

    #[cfg(windows)]
    #[test]
    fn test_winsock_exhaustion_is_fatal() {
        assert!(is_resource_exhaustion(&io::Error::from_raw_os_error(10024)));
        assert!(is_resource_exhaustion(&io::Error::from_raw_os_error(10055)));
    }

    #[test]
    fn test_reset_is_transient() {
        assert!(!is_resource_exhaustion(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(!is_resource_exhaustion(&io::Error::from(io::ErrorKind::ConnectionAborted)));
        assert!(!is_resource_exhaustion(&io::Error::from(io::ErrorKind::Interrupted)));
    }
}
