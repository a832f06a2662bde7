//! Usage telemetry and log setup for Flint.
//!
//! Events are appended to an in-process [`TelemetrySink`] as they happen and
//! uploaded in periodic batches by a [`TelemetryUploader`]. A failed upload
//! discards the batch; telemetry never retries and never blocks a reply.

pub mod logging;
pub mod model;
pub mod sink;
pub mod upload;

pub use logging::init_tracing;
pub use model::TelemetryEvent;
pub use sink::TelemetrySink;
pub use upload::{FlushOutcome, HttpTelemetryUploader, TelemetryUploader, flush};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("collector rejected batch with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
