//! Protocol timing constants and async timeout helpers.
//!
//! The server's idle window and the client's reconnect backoff are the same
//! constant so both ends agree on how long a silent connection is tolerated.

use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Maximum silence tolerated on a session before it is force-closed.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Delay between failed client connection attempts.
pub const RECONNECT_DELAY: Duration = IDLE_TIMEOUT;

/// How long shutdown waits on sessions before warning that deliveries are still running.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `fut`, mapping an elapsed deadline to [`ProtocolError::Timeout`].
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

/// Run `fut`, mapping an elapsed deadline to `on_timeout`.
pub async fn with_timeout_or<F, T>(fut: F, duration: Duration, on_timeout: ProtocolError) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout),
    }
}
