use futures::{SinkExt, StreamExt};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument, warn};

use crate::config::{ConfigModel, DecoderConfig, DEFAULT_PORT};
use crate::core::codec::FrameCodec;
use crate::error::{ProtocolError, Result};
use crate::protocol::handshake::client_await_config;
use crate::protocol::message::{Fields, Message};
use crate::service::decoder::{DecoderLauncher, RecordStream};
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::{with_timeout_error, RECONNECT_DELAY};

/// Normalize `HOST[:PORT]` into a connectable `host:port`.
///
/// A bare IPv6 address gets brackets and the default port.
pub fn parse_server_address(input: &str) -> Result<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ProtocolError::ConfigError("server address cannot be empty".into()));
    }

    if let Some(rest) = input.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(|| {
            ProtocolError::ConfigError(format!("unterminated IPv6 address: '{input}'"))
        })?;
        return match tail.strip_prefix(':') {
            Some(port) => Ok(format!("[{host}]:{}", parse_port(port, input)?)),
            None if tail.is_empty() => Ok(format!("[{host}]:{DEFAULT_PORT}")),
            None => Err(ProtocolError::ConfigError(format!(
                "invalid server address: '{input}'"
            ))),
        };
    }

    match input.matches(':').count() {
        0 => Ok(format!("{input}:{DEFAULT_PORT}")),
        1 => {
            let (host, port) = input.split_once(':').unwrap_or((input, ""));
            if host.is_empty() {
                return Err(ProtocolError::ConfigError(format!(
                    "missing host in server address: '{input}'"
                )));
            }
            Ok(format!("{host}:{}", parse_port(port, input)?))
        }
        _ => Ok(format!("[{input}]:{DEFAULT_PORT}")),
    }
}

fn parse_port(port: &str, input: &str) -> Result<u16> {
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(ProtocolError::ConfigError(format!(
            "invalid port in server address: '{input}'"
        ))),
    }
}

/// Why a connected stretch ended.
enum PumpEnd {
    /// The server closed or broke the connection; the decoder keeps running
    ServerClosed(ProtocolError),
    /// The decoder's output ended or failed
    DecoderExited(Option<ProtocolError>),
}

/// Client node: fetches configuration, runs the decoder and forwards its
/// records to the server, reconnecting for as long as it runs.
pub struct Client<L> {
    server: String,
    launcher: L,
    reconnect_delay: Duration,
    connect_timeout: Duration,
}

impl<L: DecoderLauncher> Client<L> {
    /// Create a client for `HOST[:PORT]`.
    pub fn new(server: &str, launcher: L) -> Result<Self> {
        Ok(Self {
            server: parse_server_address(server)?,
            launcher,
            reconnect_delay: RECONNECT_DELAY,
            connect_timeout: RECONNECT_DELAY,
        })
    }

    /// Override the backoff between failed attempts and the connect deadline.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self.connect_timeout = delay;
        self
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Connect once and return the server's configuration.
    #[instrument(skip(self), fields(server = %self.server))]
    pub async fn fetch_config(&self) -> Result<ConfigModel> {
        let (_, config) = self.connect().await?;
        Ok(config)
    }

    /// Run until a fatal error.
    ///
    /// Connection failures and server-side closes are retried forever. The
    /// decoder survives reconnects and is only relaunched when the server's
    /// decoder configuration changes or the process exits. Failing to launch
    /// the decoder is fatal.
    #[instrument(skip(self), fields(server = %self.server))]
    pub async fn run(&self) -> Result<()> {
        let mut decoder: Option<(DecoderConfig, RecordStream)> = None;
        let mut pending: Option<Fields> = None;
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            let (mut framed, config) = match self.connect().await {
                Ok(connected) => connected,
                Err(e) => {
                    global_metrics().reconnect();
                    warn!(attempt, error = %e, "Server not reachable");
                    tokio::time::sleep(self.reconnect_delay).await;
                    continue;
                }
            };
            info!(attempt, "Connected, configuration received");
            attempt = 0;
            let connected_at = Instant::now();

            let stale = match &decoder {
                Some((running, _)) => running != &config.decoder,
                None => true,
            };
            if stale {
                if decoder.take().is_some() {
                    info!("Decoder configuration changed, restarting decoder");
                }
                let records = self.launcher.launch(&config.decoder)?;
                decoder = Some((config.decoder, records));
            }

            let Some((_, records)) = decoder.as_mut() else {
                continue;
            };

            let backoff = match pump(&mut framed, records, &mut pending).await {
                PumpEnd::ServerClosed(reason) => {
                    info!(reason = %reason, "Server connection ended, reconnecting");
                    connected_at.elapsed() < self.reconnect_delay
                }
                PumpEnd::DecoderExited(reason) => {
                    match reason {
                        Some(e) => warn!(error = %e, "Decoder failed"),
                        None => warn!("Decoder exited"),
                    }
                    decoder = None;
                    true
                }
            };

            global_metrics().reconnect();
            if backoff {
                tokio::time::sleep(self.reconnect_delay).await;
            }
        }
    }

    async fn connect(&self) -> Result<(Framed<TcpStream, FrameCodec>, ConfigModel)> {
        let stream = with_timeout_error(
            async { Ok(TcpStream::connect(&self.server).await?) },
            self.connect_timeout,
        )
        .await?;
        stream.set_nodelay(true)?;

        let mut framed = Framed::new(stream, FrameCodec::default());
        let config = client_await_config(&mut framed, self.connect_timeout).await?;
        Ok((framed, config))
    }
}

/// Forward records until either side gives out.
///
/// While idle the read half is watched too, so a server-side close is
/// noticed without waiting for the next record. A record whose send failed
/// is left in `pending` for the next connection.
async fn pump(
    framed: &mut Framed<TcpStream, FrameCodec>,
    records: &mut RecordStream,
    pending: &mut Option<Fields>,
) -> PumpEnd {
    loop {
        let fields = match pending.take() {
            Some(fields) => fields,
            None => loop {
                tokio::select! {
                    record = records.next() => match record {
                        Some(Ok(fields)) => break fields,
                        Some(Err(e)) => return PumpEnd::DecoderExited(Some(e)),
                        None => return PumpEnd::DecoderExited(None),
                    },
                    inbound = framed.next() => match inbound {
                        None => return PumpEnd::ServerClosed(ProtocolError::ConnectionClosed),
                        Some(Err(e)) => return PumpEnd::ServerClosed(e),
                        Some(Ok(frame)) => {
                            debug!(kind = ?frame.kind, "Ignoring frame from server");
                        }
                    },
                }
            },
        };

        let message = Message::Packet(fields);
        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping record that could not be encoded");
                continue;
            }
        };

        if let Err(e) = framed.send(frame).await {
            if let Message::Packet(fields) = message {
                *pending = Some(fields);
            }
            return PumpEnd::ServerClosed(e);
        }
        debug!("Record forwarded");
    }
}
