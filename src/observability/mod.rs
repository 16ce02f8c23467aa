//! Tracing instrumentation for segments and ports.
//!
//! shmport emits spans for:
//! - Segment create/open
//! - Port initialize/send/receive
//!
//! and events for payload sizes (`TRACE`), stale-resource reclaim (`WARN`)
//! and best-effort releases that failed in `Drop` (`WARN`). No subscriber is
//! installed by the library.
//!
//! ## Example
//!
//! ```rust,ignore
//! use shmport::observability::{TracingConfig, set_tracing_config};
//!
//! // Only port spans, no per-payload events
//! set_tracing_config(&TracingConfig::minimal());
//! ```

mod tracing_support;

pub use tracing_support::{
    TracingConfig, set_tracing_config, span_port, span_segment, trace_payload, tracing_config,
};
