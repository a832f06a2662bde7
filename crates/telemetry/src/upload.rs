//! Periodic batch upload of accumulated events.

use std::time::Duration;

use async_trait::async_trait;

use crate::TelemetryError;
use crate::model::TelemetryEvent;
use crate::sink::TelemetrySink;

/// Delivers one batch of events to a collector.
#[async_trait]
pub trait TelemetryUploader: Send + Sync {
    async fn upload(&self, batch: &[TelemetryEvent]) -> Result<(), TelemetryError>;
}

/// Posts batches as a JSON array to a collector URL.
pub struct HttpTelemetryUploader {
    url: String,
    client: reqwest::Client,
}

impl HttpTelemetryUploader {
    pub fn new(url: impl Into<String>) -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TelemetryUploader for HttpTelemetryUploader {
    async fn upload(&self, batch: &[TelemetryEvent]) -> Result<(), TelemetryError> {
        let response = self.client.post(&self.url).json(batch).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelemetryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// What one flush did with the pending batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending.
    Empty,
    /// The batch of this many events was accepted.
    Uploaded(usize),
    /// The upload failed and this many events were dropped.
    Failed(usize),
}

/// Drain `sink` and upload the batch.
///
/// The batch leaves the sink before the upload starts, so events are
/// discarded whether or not the collector accepts them. Events appended
/// during the upload wait for the next flush.
pub async fn flush(sink: &TelemetrySink, uploader: &dyn TelemetryUploader) -> FlushOutcome {
    let batch = sink.drain();
    if batch.is_empty() {
        tracing::debug!("No telemetry to upload");
        return FlushOutcome::Empty;
    }

    match uploader.upload(&batch).await {
        Ok(()) => {
            tracing::info!(events = batch.len(), "Uploaded telemetry");
            FlushOutcome::Uploaded(batch.len())
        }
        Err(e) => {
            tracing::warn!(events = batch.len(), error = %e, "Telemetry upload failed, dropping batch");
            FlushOutcome::Failed(batch.len())
        }
    }
}
