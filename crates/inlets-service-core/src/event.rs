use std::sync::Mutex;

/// Severity of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Info,
    Warning,
    Error,
}

/// One-way sink for service lifecycle events.
///
/// Implementations must not block for long: the control loop records through
/// this on its only thread of execution.
pub trait EventSink: Send + Sync {
    fn record(&self, level: EventLevel, message: &str);

    fn info(&self, message: &str) {
        self.record(EventLevel::Info, message);
    }

    fn warning(&self, message: &str) {
        self.record(EventLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.record(EventLevel::Error, message);
    }
}

/// Forwards events to `tracing` under the `service_event` target.
#[derive(Debug, Clone, Default)]
pub struct TracingEventSink {
    service: String,
}

impl TracingEventSink {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

impl EventSink for TracingEventSink {
    fn record(&self, level: EventLevel, message: &str) {
        match level {
            EventLevel::Info => {
                tracing::info!(target: "service_event", service = %self.service, "{message}")
            }
            EventLevel::Warning => {
                tracing::warn!(target: "service_event", service = %self.service, "{message}")
            }
            EventLevel::Error => {
                tracing::error!(target: "service_event", service = %self.service, "{message}")
            }
        }
    }
}

/// Keeps every event in memory so tests can assert on what was recorded.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    records: Mutex<Vec<(EventLevel, String)>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(EventLevel, String)> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn messages_at(&self, level: EventLevel) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message)
            .collect()
    }
}

impl EventSink for MemoryEventSink {
    fn record(&self, level: EventLevel, message: &str) {
        if let Ok(mut records) = self.records.lock() {
            records.push((level, message.to_string()));
        }
    }
}
