//! # Error Types
//!
//! Error handling for the aggregation protocol.
//!
//! This module defines every error variant that can occur while loading
//! configuration, framing data on the wire, running sessions, and dispatching
//! packets to the handler.
//!
//! ## Error Categories
//! - **Startup Errors**: `ConfigError`, `BindError` (process-fatal)
//! - **Transport Errors**: socket failures, closed streams, idle timeouts (fatal to one session)
//! - **Frame Errors**: `FrameTooLarge` is fatal to the session, `FrameMalformed` is skippable
//!   when the frame boundary is intact
//! - **Handler Errors**: the packet handler failed; the packet is dropped
//! - **Decoder Errors**: the client-side decoder process could not run
//!
//! Errors local to one session never propagate to other sessions or to the listener.
//!
//! ## Example Usage
//! ```rust
//! use rtl433_net::error::{ProtocolError, Result};
//! use tracing::error;
//!
//! fn check_port(port: u16) -> Result<u16> {
//!     if port == 0 {
//!         return Err(ProtocolError::ConfigError("port must be non-zero".into()));
//!     }
//!     Ok(port)
//! }
//!
//! if let Err(e) = check_port(0) {
//!     error!(error = %e, "Invalid configuration");
//! }
//! ```

use std::io;
use thiserror::Error;

// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to bind {addr}: {source}")]
    BindError {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Malformed frame: {0}")]
    FrameMalformed(String),

    #[error("Unexpected message type")]
    UnexpectedMessage,

    #[error("Handler error: {0}")]
    HandlerError(String),

    #[error("Connection timed out (no activity)")]
    ConnectionTimeout,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Decoder error: {0}")]
    DecoderError(String),
}

impl ProtocolError {
    /// Whether this error ends the session that produced it.
    ///
    /// Malformed payloads, unexpected message kinds and handler failures are
    /// confined to a single frame; everything else tears the session down.
    pub fn is_fatal_to_session(&self) -> bool {
        !matches!(
            self,
            ProtocolError::FrameMalformed(_)
                | ProtocolError::Serialization(_)
                | ProtocolError::UnexpectedMessage
                | ProtocolError::HandlerError(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_fatality() {
        assert!(ProtocolError::ConnectionClosed.is_fatal_to_session());
        assert!(ProtocolError::ConnectionTimeout.is_fatal_to_session());
        assert!(ProtocolError::FrameTooLarge { size: 10, max: 5 }.is_fatal_to_session());
        assert!(!ProtocolError::FrameMalformed("bad json".into()).is_fatal_to_session());
        assert!(!ProtocolError::HandlerError("boom".into()).is_fatal_to_session());
        assert!(!ProtocolError::UnexpectedMessage.is_fatal_to_session());
    }

    #[test]
    fn test_display_includes_sizes() {
        let e = ProtocolError::FrameTooLarge {
            size: 2_000_000,
            max: 1_048_576,
        };
        assert_eq!(e.to_string(), "Frame too large: 2000000 bytes (max 1048576)");
    }
}
