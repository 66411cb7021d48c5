//! # Transport Layer
//!
//! TCP listener that accepts client connections and owns their sessions.

pub mod listener;
