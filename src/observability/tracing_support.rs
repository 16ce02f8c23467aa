//! Tracing integration for structured logging and spans.

use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{Level, Span, span};

const SEGMENT_SPANS: u8 = 0b001;
const PORT_SPANS: u8 = 0b010;
const PAYLOAD_EVENTS: u8 = 0b100;

/// Active toggles, packed so the hot path is a single relaxed load.
static ACTIVE: AtomicU8 = AtomicU8::new(SEGMENT_SPANS | PORT_SPANS);

/// Configuration for tracing behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Whether to create spans for segment create/open.
    pub segment_spans: bool,
    /// Whether to create spans for port operations.
    pub port_spans: bool,
    /// Whether to emit an event per transferred payload.
    pub payload_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            segment_spans: true,
            port_spans: true,
            payload_events: false, // One event per message is noisy
        }
    }
}

impl TracingConfig {
    /// Everything enabled.
    pub fn all() -> Self {
        Self {
            segment_spans: true,
            port_spans: true,
            payload_events: true,
        }
    }

    /// Port spans only.
    pub fn minimal() -> Self {
        Self {
            segment_spans: false,
            port_spans: true,
            payload_events: false,
        }
    }

    /// Disable all spans and payload events.
    pub fn none() -> Self {
        Self {
            segment_spans: false,
            port_spans: false,
            payload_events: false,
        }
    }

    fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.segment_spans {
            bits |= SEGMENT_SPANS;
        }
        if self.port_spans {
            bits |= PORT_SPANS;
        }
        if self.payload_events {
            bits |= PAYLOAD_EVENTS;
        }
        bits
    }

    fn from_bits(bits: u8) -> Self {
        Self {
            segment_spans: bits & SEGMENT_SPANS != 0,
            port_spans: bits & PORT_SPANS != 0,
            payload_events: bits & PAYLOAD_EVENTS != 0,
        }
    }
}

/// Install a process-wide tracing configuration.
pub fn set_tracing_config(config: &TracingConfig) {
    ACTIVE.store(config.bits(), Ordering::Relaxed);
}

/// The process-wide tracing configuration currently in effect.
pub fn tracing_config() -> TracingConfig {
    TracingConfig::from_bits(ACTIVE.load(Ordering::Relaxed))
}

#[inline]
fn enabled(flag: u8) -> bool {
    ACTIVE.load(Ordering::Relaxed) & flag != 0
}

/// Create a span for a segment operation.
///
/// # Example
///
/// ```rust,ignore
/// use shmport::observability::span_segment;
///
/// let _guard = span_segment("create", "seg1").entered();
/// // shm_open + mmap here...
/// ```
#[inline]
pub fn span_segment(op: &'static str, name: &str) -> Span {
    if !enabled(SEGMENT_SPANS) {
        return Span::none();
    }
    span!(Level::DEBUG, "segment", op = op, name = %name)
}

/// Create a span for a port operation.
#[inline]
pub fn span_port(op: &'static str, name: &str, role: &'static str) -> Span {
    if !enabled(PORT_SPANS) {
        return Span::none();
    }
    span!(Level::DEBUG, "port", op = op, name = %name, role = role)
}

/// Log a payload crossing a segment or port.
#[inline]
pub fn trace_payload(what: &'static str, name: &str, size: usize) {
    if enabled(PAYLOAD_EVENTS) {
        tracing::trace!(name = %name, size = size, "{what}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_config_default() {
        let config = TracingConfig::default();
        assert!(config.segment_spans);
        assert!(config.port_spans);
        assert!(!config.payload_events);
    }

    #[test]
    fn test_tracing_config_presets() {
        let all = TracingConfig::all();
        assert!(all.segment_spans && all.port_spans && all.payload_events);

        let minimal = TracingConfig::minimal();
        assert!(!minimal.segment_spans);
        assert!(minimal.port_spans);

        let none = TracingConfig::none();
        assert!(!none.segment_spans && !none.port_spans && !none.payload_events);
    }

    #[test]
    fn test_bits_round_trip() {
        for config in [
            TracingConfig::all(),
            TracingConfig::minimal(),
            TracingConfig::none(),
            TracingConfig::default(),
        ] {
            assert_eq!(TracingConfig::from_bits(config.bits()), config);
        }
    }

    #[test]
    fn test_set_tracing_config() {
        set_tracing_config(&TracingConfig::all());
        assert_eq!(tracing_config(), TracingConfig::all());
        assert!(enabled(PAYLOAD_EVENTS));

        set_tracing_config(&TracingConfig::default());
        assert_eq!(tracing_config(), TracingConfig::default());
    }

    #[test]
    fn test_span_creation() {
        // These should not panic, with or without a subscriber
        let _span = span_segment("create", "seg1");
        let _span = span_port("send", "svc.port", "sender");
        trace_payload("segment write", "seg1", 5);
    }
}
