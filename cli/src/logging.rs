//! Initializes the process-wide `tracing` subscriber: `RUST_LOG`-driven
//! env filter, plain-text output via [`crate::log_format::TextWithSpanIds`]
//! so log lines carry `trace_id`/`span_id` when inside a span.

use tracing_subscriber::EnvFilter;

use crate::log_format::TextWithSpanIds;

pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(TextWithSpanIds::new())
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| e.into())
}
