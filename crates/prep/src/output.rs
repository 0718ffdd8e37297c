//! Colored terminal output utilities.

use console::{Style, Term};
use prep_core::{Origin, ReportSink, Severity};

/// Terminal output formatter. Doubles as the engine's report sink, so
/// `info`/`warn` directives land on stderr with the CLI's styling.
pub(crate) struct Output {
    term: Term,
    yellow: Style,
    red: Style,
    verbose: bool,
}

impl Output {
    /// Create a new output formatter. `verbose` gates info messages.
    #[must_use]
    pub(crate) fn new(verbose: bool) -> Self {
        Self {
            term: Term::stderr(),
            yellow: Style::new().yellow(),
            red: Style::new().red(),
            verbose,
        }
    }

    /// Print an info message. Suppressed unless verbose.
    pub(crate) fn info(&self, msg: &str) {
        if self.verbose {
            let _ = self.term.write_line(msg);
        }
    }

    /// Print a warning message (yellow).
    pub(crate) fn warning(&self, msg: &str) {
        let _ = self.term.write_line(&self.yellow.apply_to(msg).to_string());
    }

    /// Print an error message (red).
    pub(crate) fn error(&self, msg: &str) {
        let _ = self.term.write_line(&self.red.apply_to(msg).to_string());
    }
}

impl ReportSink for Output {
    fn report(&self, severity: Severity, origin: Option<&Origin>, message: &str) {
        let location = origin.map(|o| format!("{o}: ")).unwrap_or_default();
        match severity {
            Severity::Info => self.info(&format!("{location}{message}")),
            Severity::Warning => self.warning(&format!("{location}warning: {message}")),
        }
    }
}
