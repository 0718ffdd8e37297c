//! Engine error types.

use std::fmt;
use std::sync::Arc;

/// Source position carried by every run-time error.
///
/// `file` is the logical name the source was registered or resolved under,
/// `line` the 1-indexed number of the first physical line of the logical
/// line the error was raised for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    /// Logical file name.
    pub file: Arc<str>,
    /// 1-indexed line number.
    pub line: u32,
}

impl Origin {
    /// Create an origin from a file name and line number.
    #[must_use]
    pub fn new(file: impl Into<Arc<str>>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Preprocessor error.
///
/// Configuration-time errors (`FileNotFound`, `DuplicateRegistration`,
/// `RegistryLocked`, `UnknownDirective` at registration) have no source
/// position; everything raised while assembling or expanding carries an
/// [`Origin`].
#[derive(Debug, thiserror::Error)]
pub enum PrepError {
    /// A file could not be located by the registry.
    #[error("file not found: {name}")]
    FileNotFound {
        /// The name or path as it appeared in the lookup.
        name: String,
    },

    /// A file or directive name was registered twice without override
    /// enabled.
    #[error("already registered: {name}")]
    DuplicateRegistration {
        /// The offending name.
        name: String,
    },

    /// Directive registration was attempted after expansion began.
    #[error("directive registry is locked once expansion has begun")]
    RegistryLocked,

    /// A directive descriptor is inconsistent, or a transition/close names
    /// a family with no registered opener.
    #[error("unknown directive: {tag}")]
    UnknownDirective {
        /// The offending tag.
        tag: String,
    },

    /// A transition, close, or child directive does not match the open block.
    #[error("{origin}: `{tag}` does not match the open block")]
    BlockMismatch {
        /// Where the directive appeared.
        origin: Origin,
        /// The offending tag.
        tag: String,
    },

    /// End of input was reached with a block still open.
    #[error("{origin}: `{tag}` block is never closed")]
    UnterminatedBlock {
        /// Where the unclosed block was opened.
        origin: Origin,
        /// The opening tag.
        tag: String,
    },

    /// An identifier was used where a value is required but is not defined.
    #[error("{origin}: `{name}` is not defined")]
    UndefinedIdentifier {
        /// Where the identifier was used.
        origin: Origin,
        /// The undefined name.
        name: String,
    },

    /// Substitution or identifier resolution did not settle within the
    /// configured depth.
    #[error("{origin}: substitution did not settle after {limit} rounds")]
    SubstitutionLoop {
        /// Where substitution was running.
        origin: Origin,
        /// The configured depth limit.
        limit: usize,
    },

    /// An expression could not be parsed.
    #[error("{origin}: {message}")]
    ExpressionSyntax {
        /// Where the expression appeared.
        origin: Origin,
        /// Parser diagnostic.
        message: String,
    },

    /// An expression evaluated to an operand of the wrong type.
    #[error("{origin}: {message}")]
    TypeMismatch {
        /// Where the expression appeared.
        origin: Origin,
        /// Evaluator diagnostic.
        message: String,
    },

    /// Raised by the `error` directive; aborts expansion.
    #[error("{origin}: {message}")]
    User {
        /// Where the directive appeared.
        origin: Origin,
        /// The (substituted) directive message.
        message: String,
    },

    /// An underlying source failed to read.
    #[error("{origin}: {source}")]
    Io {
        /// The include site or root that triggered the read.
        origin: Origin,
        /// The propagated I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl PrepError {
    /// The source position the error was raised for, if it has one.
    #[must_use]
    pub fn origin(&self) -> Option<&Origin> {
        match self {
            Self::BlockMismatch { origin, .. }
            | Self::UnterminatedBlock { origin, .. }
            | Self::UndefinedIdentifier { origin, .. }
            | Self::SubstitutionLoop { origin, .. }
            | Self::ExpressionSyntax { origin, .. }
            | Self::TypeMismatch { origin, .. }
            | Self::User { origin, .. }
            | Self::Io { origin, .. } => Some(origin),
            Self::FileNotFound { .. }
            | Self::DuplicateRegistration { .. }
            | Self::RegistryLocked
            | Self::UnknownDirective { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_display() {
        let origin = Origin::new("main.txt", 12);
        assert_eq!(origin.to_string(), "main.txt:12");
    }

    #[test]
    fn test_error_display_carries_origin() {
        let err = PrepError::UndefinedIdentifier {
            origin: Origin::new("a.txt", 3),
            name: "WIDTH".to_owned(),
        };
        assert_eq!(err.to_string(), "a.txt:3: `WIDTH` is not defined");
    }

    #[test]
    fn test_origin_accessor() {
        let err = PrepError::RegistryLocked;
        assert!(err.origin().is_none());

        let err = PrepError::User {
            origin: Origin::new("a.txt", 1),
            message: "boom".to_owned(),
        };
        assert_eq!(err.origin().map(|o| o.line), Some(1));
    }
}
