//! In-process accumulator for telemetry events.

use std::sync::Mutex;

use crate::model::TelemetryEvent;

/// Collects events between uploads.
///
/// Appending never fails and never blocks on I/O. [`drain`](Self::drain)
/// hands the whole batch to the caller and leaves the sink empty.
#[derive(Debug, Default)]
pub struct TelemetrySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl TelemetrySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, event: TelemetryEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }

    /// Take every accumulated event, oldest first.
    pub fn drain(&self) -> Vec<TelemetryEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_empties_in_order() {
        let sink = TelemetrySink::new();
        sink.append(TelemetryEvent::new("api", "first", "u", "whatsapp"));
        sink.append(TelemetryEvent::new("api", "second", "u", "whatsapp"));
        assert_eq!(sink.len(), 2);

        let batch = sink.drain();
        assert_eq!(batch[0].api, "first");
        assert_eq!(batch[1].api, "second");
        assert!(sink.is_empty());
        assert!(sink.drain().is_empty());
    }
}
