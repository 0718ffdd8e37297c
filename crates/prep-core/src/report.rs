//! Diagnostic reporting seam between the engine and its host.
//!
//! The engine never prints. Everything the `info` and `warn` directives
//! produce, plus engine warnings (dangling continuations, redefinitions),
//! is handed to a [`ReportSink`]. Hosts pick the sink: the default
//! [`TracingSink`] forwards to `tracing` events, [`MemorySink`] collects
//! entries for inspection.

use std::sync::{Arc, Mutex};

use crate::error::Origin;

/// Severity of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational; produced by the `info` directive.
    Info,
    /// Non-fatal problem; produced by the `warn` directive and by engine
    /// warnings.
    Warning,
}

/// A single collected report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Severity of the message.
    pub severity: Severity,
    /// Source position, when one is known.
    pub origin: Option<Origin>,
    /// The message text.
    pub message: String,
}

/// Receiver for engine diagnostics.
///
/// Implementations take `&self`; a sink is shared between the host and the
/// running expansion via `Arc`.
pub trait ReportSink: Send + Sync {
    /// Deliver one report.
    fn report(&self, severity: Severity, origin: Option<&Origin>, message: &str);
}

/// Forwards reports to `tracing` events.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn report(&self, severity: Severity, origin: Option<&Origin>, message: &str) {
        match (severity, origin) {
            (Severity::Info, Some(o)) => {
                tracing::info!(file = %o.file, line = o.line, "{message}");
            }
            (Severity::Info, None) => tracing::info!("{message}"),
            (Severity::Warning, Some(o)) => {
                tracing::warn!(file = %o.file, line = o.line, "{message}");
            }
            (Severity::Warning, None) => tracing::warn!("{message}"),
        }
    }
}

/// Collects reports in memory.
///
/// Share one via `Arc` with the preprocessor and drain it afterwards:
///
/// ```
/// use std::sync::Arc;
/// use prep_core::{MemorySink, ReportSink, Severity};
///
/// let sink = Arc::new(MemorySink::default());
/// sink.report(Severity::Warning, None, "something");
/// assert_eq!(sink.drain().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Report>>,
}

impl MemorySink {
    /// Take all collected reports, leaving the sink empty.
    #[must_use]
    pub fn drain(&self) -> Vec<Report> {
        std::mem::take(&mut *self.entries.lock().expect("sink poisoned"))
    }

    /// Number of collected reports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("sink poisoned").len()
    }

    /// Whether no reports have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReportSink for MemorySink {
    fn report(&self, severity: Severity, origin: Option<&Origin>, message: &str) {
        self.entries.lock().expect("sink poisoned").push(Report {
            severity,
            origin: origin.cloned(),
            message: message.to_owned(),
        });
    }
}

/// The default sink used when the host does not supply one.
#[must_use]
pub fn default_sink() -> Arc<dyn ReportSink> {
    Arc::new(TracingSink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_collects() {
        let sink = MemorySink::default();
        sink.report(Severity::Info, None, "hello");
        sink.report(
            Severity::Warning,
            Some(&Origin::new("f.txt", 2)),
            "careful",
        );

        let entries = sink.drain();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].severity, Severity::Info);
        assert_eq!(entries[0].message, "hello");
        assert_eq!(entries[1].origin, Some(Origin::new("f.txt", 2)));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        let sink = TracingSink;
        sink.report(Severity::Info, None, "info");
        sink.report(Severity::Warning, Some(&Origin::new("f", 1)), "warn");
    }
}
