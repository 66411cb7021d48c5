//! # Services
//!
//! The two roles a node can play.
//!
//! ## Components
//! - **Session**: Server side of one client connection
//! - **Registry**: Shared map of live sessions keyed by client address
//! - **Decoder**: Launching rtl_433 and turning its output into records
//! - **Client**: Fetches configuration, runs the decoder, forwards records

pub mod client;
pub mod decoder;
pub mod registry;
pub mod session;
