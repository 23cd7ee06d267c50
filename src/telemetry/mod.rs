//! Telemetry: structured logging, spans, metrics and host log forwarding.

mod host_sink;
mod logging;
pub mod metrics;
mod spans;

pub use host_sink::{HostLogLayer, LogSink};
pub use logging::{init_logging, init_logging_with_sink, LogConfig, LogError, LogFormat};
pub use spans::{ServiceSpan, SpanExt};
