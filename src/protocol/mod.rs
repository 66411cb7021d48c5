//! # Protocol Layer
//!
//! Message types carried in frames, the per-connection handshake, and the
//! dispatcher that feeds accepted packets to the handler.
//!
//! ## Components
//! - **Message**: CONFIG and PACKET payloads and their JSON encoding
//! - **Identity**: Client and server identities passed to the handler
//! - **Handshake**: The server's CONFIG frame and the client's wait for it
//! - **Dispatcher**: Sequential, failure-isolated handler invocation

pub mod dispatcher;
pub mod handshake;
pub mod identity;
pub mod message;
