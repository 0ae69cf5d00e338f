//! Client instrumentation.
//!
//! Uses the `metrics` facade; nothing is recorded unless the application
//! installs a recorder (the CLI installs the Prometheus exporter).

use metrics::{counter, gauge};
use tracing::debug;

/// Metric names.
pub mod names {
    pub const CONNECT_ATTEMPTS_TOTAL: &str = "socialwire_connect_attempts_total";
    pub const CONNECTIONS_TOTAL: &str = "socialwire_connections_total";
    pub const CONNECTED: &str = "socialwire_connected";
    pub const FRAMES_TOTAL: &str = "socialwire_frames_total";
    pub const FRAME_BYTES: &str = "socialwire_frame_bytes_total";
    pub const DECODE_ERRORS_TOTAL: &str = "socialwire_decode_errors_total";
    pub const ORPHAN_REPLIES_TOTAL: &str = "socialwire_orphan_replies_total";
    pub const SERVER_ERRORS_TOTAL: &str = "socialwire_server_errors_total";
    pub const UNKNOWN_EVENTS_TOTAL: &str = "socialwire_unknown_events_total";
    pub const CALLS_REJECTED_TOTAL: &str = "socialwire_calls_rejected_total";
    pub const QUEUE_DEPTH: &str = "socialwire_queue_depth";
    pub const PENDING_CALLS: &str = "socialwire_pending_calls";
}

/// Describe every client metric to the installed recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(names::CONNECT_ATTEMPTS_TOTAL, "Connection attempts, failed ones included");
    metrics::describe_counter!(names::CONNECTIONS_TOTAL, "Connections successfully opened");
    metrics::describe_gauge!(names::CONNECTED, "1 while the event socket is open");
    metrics::describe_counter!(names::FRAMES_TOTAL, "Frames sent and received");
    metrics::describe_counter!(names::FRAME_BYTES, "Bytes of frames sent and received");
    metrics::describe_counter!(names::DECODE_ERRORS_TOTAL, "Inbound frames that failed to decode");
    metrics::describe_counter!(names::ORPHAN_REPLIES_TOTAL, "Replies matching no pending call");
    metrics::describe_counter!(names::SERVER_ERRORS_TOTAL, "Protocol errors reported by the server");
    metrics::describe_counter!(names::UNKNOWN_EVENTS_TOTAL, "Events with an unknown tag");
    metrics::describe_counter!(names::CALLS_REJECTED_TOTAL, "Calls completed without a reply");
    metrics::describe_gauge!(names::QUEUE_DEPTH, "Sends waiting for a connection");
    metrics::describe_gauge!(names::PENDING_CALLS, "Calls waiting for a reply");

    debug!("Client metrics described");
}

pub fn record_connect_attempt() {
    counter!(names::CONNECT_ATTEMPTS_TOTAL).increment(1);
}

pub fn record_frame(bytes: usize, direction: &'static str) {
    counter!(names::FRAMES_TOTAL, "direction" => direction).increment(1);
    counter!(names::FRAME_BYTES, "direction" => direction).increment(bytes as u64);
}

pub fn record_decode_error() {
    counter!(names::DECODE_ERRORS_TOTAL).increment(1);
}

pub fn record_orphan_reply() {
    counter!(names::ORPHAN_REPLIES_TOTAL).increment(1);
}

pub fn record_server_error() {
    counter!(names::SERVER_ERRORS_TOTAL).increment(1);
}

pub fn record_unknown_event() {
    counter!(names::UNKNOWN_EVENTS_TOTAL).increment(1);
}

/// Record calls completed without a reply, labelled by reason.
pub fn record_calls_rejected(reason: &'static str, count: usize) {
    if count > 0 {
        counter!(names::CALLS_REJECTED_TOTAL, "reason" => reason).increment(count as u64);
    }
}

pub fn set_queue_depth(depth: usize) {
    gauge!(names::QUEUE_DEPTH).set(depth as f64);
}

pub fn set_pending_calls(count: usize) {
    gauge!(names::PENDING_CALLS).set(count as f64);
}

/// Marks the socket as open for as long as it lives.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        counter!(names::CONNECTIONS_TOTAL).increment(1);
        gauge!(names::CONNECTED).set(1.0);
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::CONNECTED).set(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder() {
        // No recorder is installed; every call must be a no-op.
        describe_metrics();
        record_frame(42, "inbound");
        record_calls_rejected("timeout", 0);
        let _guard = ConnectionMetricsGuard::new();
    }
}
