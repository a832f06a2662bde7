//! Background maintenance loops.
//!
//! Two periodic jobs run beside the conversational path: the full session
//! reset and the telemetry upload. Each runs on its own task and stops when
//! the shutdown channel flips to `true` or its sender is dropped.

use std::sync::Arc;
use std::time::Duration;

use flint_config::AppConfig;
use flint_telemetry::{FlushOutcome, TelemetrySink, TelemetryUploader, flush};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::session::SessionStore;

/// Rebuild every session from storage once per `period`.
///
/// The first reset happens one full period after spawning.
pub fn spawn_session_reset(
    sessions: Arc<SessionStore>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = sessions.reset().await {
                        warn!(error = %e, "Session reset failed, keeping current sessions");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Session reset loop stopped");
                        break;
                    }
                }
            }
        }
    })
}

/// Upload accumulated telemetry once per `period`.
///
/// A final flush runs on shutdown so events recorded since the last tick
/// are not lost.
pub fn spawn_telemetry_flush(
    sink: Arc<TelemetrySink>,
    uploader: Arc<dyn TelemetryUploader>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    flush(&sink, uploader.as_ref()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        if let FlushOutcome::Failed(n) = flush(&sink, uploader.as_ref()).await {
                            warn!(events = n, "Final telemetry flush failed");
                        }
                        debug!("Telemetry flush loop stopped");
                        break;
                    }
                }
            }
        }
    })
}

/// Handles of the running maintenance loops.
pub struct Maintenance {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Maintenance {
    /// Start the loops enabled by `config`. The telemetry loop runs only
    /// when telemetry is enabled and an uploader is supplied.
    pub fn start(
        config: &AppConfig,
        sessions: Arc<SessionStore>,
        telemetry: Option<(Arc<TelemetrySink>, Arc<dyn TelemetryUploader>)>,
    ) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let mut tasks = vec![spawn_session_reset(
            sessions,
            config.sessions.reset_interval(),
            rx.clone(),
        )];
        if let Some((sink, uploader)) = telemetry.filter(|_| config.telemetry.enabled) {
            tasks.push(spawn_telemetry_flush(
                sink,
                uploader,
                config.telemetry.upload_interval(),
                rx,
            ));
        }
        Self { shutdown, tasks }
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signal every loop to stop and wait for them to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Maintenance task ended abnormally");
            }
        }
    }
}
