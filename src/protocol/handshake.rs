//! Connection handshake: the server's CONFIG frame.
//!
//! The handshake is one frame long. Right after accepting, the server writes
//! the current [`ConfigModel`]; the client waits for it before starting its
//! decoder. There is no negotiation and no reply. Each connection gets its
//! own copy of the configuration, so a client that reconnects always runs
//! with whatever the server was started with.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, instrument};

use crate::config::ConfigModel;
use crate::core::codec::FrameCodec;
use crate::error::{ProtocolError, Result};
use crate::protocol::message::Message;
use crate::utils::timeout::with_timeout_error;

/// Write the CONFIG frame, bounded by `deadline`.
#[instrument(skip(framed, config), level = "debug")]
pub async fn server_send_config<T>(
    framed: &mut Framed<T, FrameCodec>,
    config: &ConfigModel,
    deadline: Duration,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let frame = Message::Config(config.clone()).to_frame()?;
    let len = frame.payload.len();

    with_timeout_error(framed.send(frame), deadline).await?;

    debug!(bytes = len, "Config sent");
    Ok(())
}

/// Wait up to `deadline` for the server's CONFIG frame.
///
/// Anything other than a CONFIG frame first is a protocol violation.
#[instrument(skip(framed), level = "debug")]
pub async fn client_await_config<T>(
    framed: &mut Framed<T, FrameCodec>,
    deadline: Duration,
) -> Result<ConfigModel>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let frame = with_timeout_error(
        async {
            framed
                .next()
                .await
                .ok_or(ProtocolError::ConnectionClosed)?
        },
        deadline,
    )
    .await?;

    match Message::from_frame(&frame)? {
        Message::Config(config) => {
            debug!(profiles = config.decoder.profiles.len(), "Config received");
            Ok(config)
        }
        Message::Packet(_) => Err(ProtocolError::UnexpectedMessage),
    }
}
