//! # Utility Modules
//!
//! Supporting utilities for logging, metrics, and timing.
//!
//! ## Components
//! - **Logging**: Structured logging setup on top of `tracing-subscriber`
//! - **Metrics**: Thread-safe observability counters
//! - **Timeout**: Shared protocol timing constants and async timeout wrappers

pub mod logging;
pub mod metrics;
pub mod timeout;
