//! # Core Protocol Components
//!
//! Low-level frame handling and the codec that carries frames over TCP.
//!
//! ## Components
//! - **Frame**: Length-prefixed unit tagged with its kind
//! - **Codec**: Tokio codec for framing over byte streams
//!
//! ## Wire Format
//! ```text
//! [Length(4, big-endian)] [Kind(1)] [Payload(Length)]
//! ```
//!
//! ## Security
//! - Declared lengths are checked against the configured maximum before any allocation
//! - Unknown kinds are surfaced to the caller rather than failing the stream

pub mod codec;
pub mod frame;
