//! # rtl433-net
//!
//! Aggregates decoded radio packets from a fleet of rtl_433 receiver nodes
//! into one sequential processing point.
//!
//! A server hands every connecting client the same configuration, then
//! feeds each packet those clients forward to a single handler, one call at
//! a time. Clients run rtl_433 with the configuration they were given and
//! reconnect (re-fetching configuration) whenever the connection drops.
//!
//! ## Layout
//! - [`core`]: length-prefixed frames and their tokio codec
//! - [`protocol`]: messages, handshake, identities, dispatcher
//! - [`service`]: server sessions, session registry, client role, decoder process
//! - [`transport`]: the TCP listener
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging and metrics
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use rtl433_net::{start_server, ClientIdentity, ConfigModel, Packet, ServerIdentity};
//!
//! # async fn run() -> rtl433_net::Result<()> {
//! let config = Arc::new(ConfigModel::load("rtl433net.toml")?);
//! let handler = |_server: &ServerIdentity,
//!                client: &ClientIdentity,
//!                packet: &Packet|
//!  -> rtl433_net::Result<()> {
//!     println!("{client}: {:?}", packet.get("model"));
//!     Ok(())
//! };
//! start_server(config, handler).await
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::{ConfigFile, ConfigModel, DecoderConfig, LoggingConfig, ServerConfig};
pub use error::{ProtocolError, Result};
pub use protocol::dispatcher::{Dispatcher, PacketHandler};
pub use protocol::identity::{ClientIdentity, ServerIdentity};
pub use protocol::message::{Fields, Message, Packet};
pub use service::client::Client;
pub use service::decoder::{DecoderLauncher, Rtl433Launcher};
pub use service::registry::{SessionHandle, SessionInfo, SessionRegistry};
pub use service::session::SessionState;
pub use transport::listener::{start_server, Listener};
