//! Observability infrastructure for the application bridge
//!
//! Provides:
//! - Prometheus metrics (bus traffic, pending requests, reply latency, translation errors)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Histogram buckets for reply latency (in seconds)
const REPLY_LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<BridgeMetricsInner> = OnceLock::new();

struct BridgeMetricsInner {
    messages_sent: IntCounterVec,
    messages_received: IntCounterVec,
    pending_requests: IntGauge,
    reply_latency_seconds: Histogram,
    remote_errors: IntCounterVec,
    reply_timeouts: IntCounterVec,
    reconnects: IntCounter,
    connection_state: IntGauge,
    dropped_messages: IntCounterVec,
    translation_errors: IntCounterVec,
}

impl BridgeMetricsInner {
    fn new() -> Self {
        Self {
            messages_sent: register_int_counter_vec!(
                "app_bridge_messages_sent_total",
                "Envelopes sent to the bus",
                &["topic"]
            )
            .expect("Failed to register messages_sent"),

            messages_received: register_int_counter_vec!(
                "app_bridge_messages_received_total",
                "Envelopes received from the bus",
                &["topic"]
            )
            .expect("Failed to register messages_received"),

            pending_requests: register_int_gauge!(
                "app_bridge_pending_requests",
                "Correlated requests waiting for a reply"
            )
            .expect("Failed to register pending_requests"),

            reply_latency_seconds: register_histogram!(
                "app_bridge_reply_latency_seconds",
                "Time between a correlated send and its reply",
                REPLY_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register reply_latency_seconds"),

            remote_errors: register_int_counter_vec!(
                "app_bridge_remote_errors_total",
                "Replies carrying an error status",
                &["topic"]
            )
            .expect("Failed to register remote_errors"),

            reply_timeouts: register_int_counter_vec!(
                "app_bridge_reply_timeouts_total",
                "Best-effort requests resolved with their fallback",
                &["topic"]
            )
            .expect("Failed to register reply_timeouts"),

            reconnects: register_int_counter!(
                "app_bridge_reconnects_total",
                "Bus connections lost and re-established"
            )
            .expect("Failed to register reconnects"),

            connection_state: register_int_gauge!(
                "app_bridge_connection_state",
                "Bus connection state (0 disabled, 1 disconnected, 2 connecting, 3 open)"
            )
            .expect("Failed to register connection_state"),

            dropped_messages: register_int_counter_vec!(
                "app_bridge_dropped_messages_total",
                "Inbound envelopes matching no handler and no pending request",
                &["reason"]
            )
            .expect("Failed to register dropped_messages"),

            translation_errors: register_int_counter_vec!(
                "app_bridge_translation_errors_total",
                "Application documents that failed to translate",
                &["kind"]
            )
            .expect("Failed to register translation_errors"),
        }
    }
}

/// Bridge metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct BridgeMetrics {
    _private: (),
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(BridgeMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &BridgeMetricsInner {
        GLOBAL_METRICS.get_or_init(BridgeMetricsInner::new)
    }

    pub fn inc_sent(&self, topic: &str) {
        self.inner().messages_sent.with_label_values(&[topic]).inc();
    }

    pub fn inc_received(&self, topic: &str) {
        self.inner().messages_received.with_label_values(&[topic]).inc();
    }

    pub fn set_pending_requests(&self, count: usize) {
        self.inner().pending_requests.set(count as i64);
    }

    pub fn observe_reply_latency(&self, duration_secs: f64) {
        self.inner().reply_latency_seconds.observe(duration_secs);
    }

    pub fn inc_remote_errors(&self, topic: &str) {
        self.inner().remote_errors.with_label_values(&[topic]).inc();
    }

    pub fn inc_reply_timeouts(&self, topic: &str) {
        self.inner().reply_timeouts.with_label_values(&[topic]).inc();
    }

    pub fn inc_reconnects(&self) {
        self.inner().reconnects.inc();
    }

    pub fn set_connection_state(&self, code: i64) {
        self.inner().connection_state.set(code);
    }

    pub fn inc_dropped(&self, reason: &str) {
        self.inner().dropped_messages.with_label_values(&[reason]).inc();
    }

    pub fn inc_translation_errors(&self, kind: &str) {
        self.inner().translation_errors.with_label_values(&[kind]).inc();
    }
}

/// Structured logger for bridge events
///
/// Every record carries an `event` field so log pipelines can filter on it.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Log bridge startup
    pub fn log_startup(&self, version: &str, endpoint: &str) {
        info!(
            event = "bridge_started",
            instance = %self.instance,
            bridge_version = %version,
            endpoint = %endpoint,
            "Application bridge started"
        );
    }

    pub fn log_messaging_disabled(&self) {
        warn!(
            event = "bus_disabled",
            instance = %self.instance,
            "No bus endpoint configured, asynchronous messaging is disabled"
        );
    }

    pub fn log_bus_connected(&self, endpoint: &str, subscriptions: usize) {
        info!(
            event = "bus_connected",
            instance = %self.instance,
            endpoint = %endpoint,
            subscriptions = subscriptions,
            "Connected to message bus"
        );
    }

    pub fn log_bus_disconnected(&self, endpoint: &str, reason: &str, pending_requests: usize) {
        warn!(
            event = "bus_disconnected",
            instance = %self.instance,
            endpoint = %endpoint,
            reason = %reason,
            pending_requests = pending_requests,
            "Lost connection to message bus, reconnecting"
        );
    }

    pub fn log_reply_timeout(&self, topic: &str, correlation_id: Uuid, timeout: Duration) {
        warn!(
            event = "reply_timeout",
            instance = %self.instance,
            topic = %topic,
            correlation_id = %correlation_id,
            timeout_ms = timeout.as_millis() as u64,
            "No reply in time, resolving with fallback"
        );
    }

    pub fn log_message_dropped(&self, topic: &str, correlation_id: Option<&str>, reason: &str) {
        info!(
            event = "message_dropped",
            instance = %self.instance,
            topic = %topic,
            correlation_id = ?correlation_id,
            reason = %reason,
            "Dropped inbound message"
        );
    }

    /// Log bridge shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "bridge_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Application bridge shutting down"
        );
    }
}
