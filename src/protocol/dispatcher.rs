use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{ProtocolError, Result};
use crate::protocol::identity::{ClientIdentity, ServerIdentity};
use crate::protocol::message::Packet;
use crate::utils::metrics::{global_metrics, Timer};

/// Receives every packet the server accepts.
///
/// Calls never overlap: the dispatcher runs one at a time, in arrival order
/// per session. The return value only decides whether the packet counts as
/// delivered or dropped.
pub trait PacketHandler: Send + Sync + 'static {
    fn handle(&self, server: &ServerIdentity, client: &ClientIdentity, packet: &Packet) -> Result<()>;
}

impl<F> PacketHandler for F
where
    F: Fn(&ServerIdentity, &ClientIdentity, &Packet) -> Result<()> + Send + Sync + 'static,
{
    fn handle(&self, server: &ServerIdentity, client: &ClientIdentity, packet: &Packet) -> Result<()> {
        self(server, client, packet)
    }
}

/// Single, sequential path from every session to the packet handler.
///
/// The gate is a fair mutex held for the whole handler call, so a slow
/// handler throttles every session. There is no queue or worker
/// pool behind it. Handler calls run on the blocking pool so they never stall
/// the runtime's I/O threads.
#[derive(Clone)]
pub struct Dispatcher {
    handler: Arc<dyn PacketHandler>,
    gate: Arc<Mutex<()>>,
    handler_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new<H: PacketHandler>(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            gate: Arc::new(Mutex::new(())),
            handler_timeout: None,
        }
    }

    /// Build from a closure, letting its argument types be inferred.
    pub fn from_fn<F>(handler: F) -> Self
    where
        F: Fn(&ServerIdentity, &ClientIdentity, &Packet) -> Result<()> + Send + Sync + 'static,
    {
        Self::new(handler)
    }

    /// Stop waiting for a handler call after `timeout`.
    ///
    /// The packet is then reported as dropped, but the gate stays closed until
    /// the call really returns, so invocations still never overlap.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    /// Hand one packet to the handler.
    ///
    /// Errors, panics and timeouts in the handler come back as
    /// [`ProtocolError::HandlerError`] after being logged; the packet is lost
    /// but the caller can carry on.
    pub async fn deliver(
        &self,
        server: ServerIdentity,
        client: ClientIdentity,
        packet: Packet,
    ) -> Result<()> {
        let guard = self.gate.clone().lock_owned().await;
        let handler = self.handler.clone();

        let call = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let _timer = Timer::start("packet_handler");
            handler.handle(&server, &client, &packet)
        });

        let outcome = match self.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(joined) => joined,
                Err(_) => {
                    return Err(self.dropped(
                        &client,
                        format!("handler did not return within {}ms", limit.as_millis()),
                    ))
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(Ok(())) => {
                global_metrics().packet_delivered();
                debug!(client = %client, "Packet delivered");
                Ok(())
            }
            Ok(Err(e)) => Err(self.dropped(&client, e.to_string())),
            Err(join) if join.is_panic() => Err(self.dropped(&client, "handler panicked".into())),
            Err(join) => Err(self.dropped(&client, join.to_string())),
        }
    }

    /// Wait until no handler call is running.
    ///
    /// A call abandoned by the handler timeout still holds the gate, so this
    /// also covers handlers that outlived their `deliver`.
    pub async fn quiesce(&self) {
        let _idle = self.gate.lock().await;
    }

    fn dropped(&self, client: &ClientIdentity, reason: String) -> ProtocolError {
        global_metrics().packet_dropped();
        warn!(client = %client, reason = %reason, "Handler failed, packet dropped");
        ProtocolError::HandlerError(reason)
    }
}
