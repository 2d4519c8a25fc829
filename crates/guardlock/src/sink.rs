//! Destinations for [`DiagnosticEvent`]s.
//!
//! A sink is injected into each [`ContextGuard`](crate::ContextGuard). Sinks
//! must not call back into the lock they are reporting on; the guard also
//! suppresses diagnostics raised from inside a sink.

use guardlock_types::DiagnosticEvent;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, event: &DiagnosticEvent);
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for Arc<S> {
    fn emit(&self, event: &DiagnosticEvent) {
        (**self).emit(event)
    }
}

pub const DIAGNOSTIC_TARGET: &str = "guardlock::diagnostic";

/// Logs one `error` line with the event's fields, then the stack dump, both on
/// the `guardlock::diagnostic` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, event: &DiagnosticEvent) {
        tracing::error!(
            target: DIAGNOSTIC_TARGET,
            timestamp = event.timestamp,
            operation_name = %event.operation_name,
            defining_file = %event.defining_file,
            defining_line = event.defining_line,
            caller_name = event.caller_name.as_deref().unwrap_or("<unknown>"),
            caller_file = %event.caller_file,
            caller_line = event.caller_line,
            resource = event.resource.as_deref(),
            thread = event.thread_name.as_deref(),
            product = event.product.as_deref(),
            report_email = event.report_email.as_deref(),
            "{} called from forbidden context by {}",
            event.operation_name,
            event.caller_site(),
        );
        if let Some(stack) = &event.stack {
            tracing::error!(target: DIAGNOSTIC_TARGET, "stack at forbidden-context call:\n{stack}");
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<DiagnosticEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn take(&self) -> Vec<DiagnosticEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, event: &DiagnosticEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Writes each event as one JSON object per line.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> DiagnosticSink for JsonLinesSink<W> {
    fn emit(&self, event: &DiagnosticEvent) {
        let line = match facet_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(target: DIAGNOSTIC_TARGET, %e, "failed to encode diagnostic event");
                return;
            }
        };
        let mut writer = self.writer.lock();
        if let Err(e) = writeln!(writer, "{line}").and_then(|()| writer.flush()) {
            tracing::warn!(target: DIAGNOSTIC_TARGET, %e, "failed to write diagnostic event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str) -> DiagnosticEvent {
        DiagnosticEvent {
            timestamp: 1,
            operation_name: name.to_owned(),
            defining_file: "src/ops.rs".to_owned(),
            defining_line: 3,
            caller_name: None,
            caller_file: "src/main.rs".to_owned(),
            caller_line: 9,
            resource: None,
            thread_name: None,
            product: None,
            report_email: None,
            stack: Some("   0: main\n".to_owned()),
        }
    }

    #[test]
    fn recording_sink_shares_storage_between_clones() {
        let sink = RecordingSink::new();
        let handle = sink.clone();
        sink.emit(&event("acquire"));
        assert_eq!(handle.len(), 1);
        assert_eq!(handle.take()[0].operation_name, "acquire");
        assert!(sink.is_empty());
    }

    #[test]
    fn json_lines_sink_writes_one_line_per_event() {
        let sink = JsonLinesSink::new(Vec::<u8>::new());
        sink.emit(&event("acquire"));
        sink.emit(&event("release"));
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"operation_name\":\"acquire\""));
        assert!(lines[1].contains("\"operation_name\":\"release\""));
        let decoded: DiagnosticEvent = facet_json::from_str(lines[1]).unwrap();
        assert_eq!(decoded, event("release"));
    }
}
