//! Observability and Metrics
//!
//! Counters for sessions, frames and packet delivery on the server, plus
//! reconnect attempts on the client.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Global metrics collector for protocol operations
#[derive(Debug)]
pub struct Metrics {
    /// Total sessions accepted
    pub sessions_total: AtomicU64,
    /// Currently open sessions
    pub sessions_active: AtomicU64,
    /// CONFIG frames written to clients
    pub configs_sent: AtomicU64,
    /// Frames read from clients
    pub frames_received: AtomicU64,
    /// Bytes of frame payload read from clients
    pub bytes_received: AtomicU64,
    /// Packets the handler accepted
    pub packets_delivered: AtomicU64,
    /// Packets dropped because the handler failed
    pub packets_dropped: AtomicU64,
    /// Frames skipped because their payload could not be decoded
    pub malformed_frames: AtomicU64,
    /// Sessions closed by the idle window
    pub idle_timeouts: AtomicU64,
    /// Sessions closed by a transport error
    pub transport_errors: AtomicU64,
    /// Client reconnect attempts
    pub reconnects: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            sessions_total: AtomicU64::new(0),
            sessions_active: AtomicU64::new(0),
            configs_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            packets_delivered: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
            malformed_frames: AtomicU64::new(0),
            idle_timeouts: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a new session
    pub fn session_opened(&self) {
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session closed
    pub fn session_closed(&self) {
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a CONFIG frame written
    pub fn config_sent(&self) {
        self.configs_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame read off the wire
    pub fn frame_received(&self, byte_count: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a packet handed to the handler successfully
    pub fn packet_delivered(&self) {
        self.packets_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a packet lost to a handler failure
    pub fn packet_dropped(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a skipped frame
    pub fn malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an idle-window close
    pub fn idle_timeout(&self) {
        self.idle_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a transport failure
    pub fn transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a client reconnect attempt
    pub fn reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_total: self.sessions_total.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            configs_sent: self.configs_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_delivered: self.packets_delivered.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            idle_timeouts: self.idle_timeouts.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            sessions_total = snapshot.sessions_total,
            sessions_active = snapshot.sessions_active,
            configs_sent = snapshot.configs_sent,
            frames_received = snapshot.frames_received,
            bytes_received = snapshot.bytes_received,
            packets_delivered = snapshot.packets_delivered,
            packets_dropped = snapshot.packets_dropped,
            malformed_frames = snapshot.malformed_frames,
            idle_timeouts = snapshot.idle_timeouts,
            transport_errors = snapshot.transport_errors,
            reconnects = snapshot.reconnects,
            uptime_seconds = snapshot.uptime_seconds,
            "Protocol metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub sessions_total: u64,
    pub sessions_active: u64,
    pub configs_sent: u64,
    pub frames_received: u64,
    pub bytes_received: u64,
    pub packets_delivered: u64,
    pub packets_dropped: u64,
    pub malformed_frames: u64,
    pub idle_timeouts: u64,
    pub transport_errors: u64,
    pub reconnects: u64,
    pub uptime_seconds: u64,
}

/// Global metrics instance (lazy static for simplicity)
static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
