//! Block-oriented streaming text preprocessor.
//!
//! Given a root file, a registry of further files, and a set of directive
//! handlers, the engine produces a lazy stream of output lines in which
//! conditional blocks are resolved, loops are unrolled, includes and
//! imports are inlined, defined constants are substituted, and trailing
//! backslashes join physical lines.
//!
//! # Architecture
//!
//! Input flows through a fixed pipeline:
//!
//! ```text
//! File → LineReader → Recognizer → BlockAssembler → Block tree
//!                                                       ↓
//!                                    Expansion(ContextArena) → output lines
//! ```
//!
//! The [`BlockAssembler`] fully builds each source file's tree before the
//! [`Expansion`] walks it; the walk itself is lazy, driven one yielded
//! line at a time, in exactly the order an eager expansion would produce.
//!
//! Directives are extensible: structural behavior is data on a
//! [`DirectiveSpec`] and single-line semantics live behind the
//! [`SingleDirective`] trait.
//!
//! # Example
//!
//! ```
//! use prep_core::{Preprocessor, PreprocessorConfig};
//!
//! let mut pp = Preprocessor::new(PreprocessorConfig::default());
//! pp.files_mut()
//!     .register_memory("main", "#define GREETING hello\n$(GREETING) world\n")
//!     .unwrap();
//!
//! let output = pp.expand("main").unwrap().collect_string().unwrap();
//! assert_eq!(output, "hello world\n");
//! ```

mod block;
mod context;
mod directive;
mod error;
mod eval;
mod expand;
mod reader;
mod recognizer;
mod registry;
mod subst;

pub mod report;

pub use block::{Block, BlockAssembler, Branch, TextLine};
pub use context::{Binding, ContextArena, ContextId};
pub use directive::{
    BlockForm, BlockRole, BranchKind, DirectiveEffect, DirectiveRegistry, DirectiveSpec,
    SingleDirective,
};
pub use error::{Origin, PrepError};
pub use eval::{Evaluator, Value};
pub use expand::{DirectiveScope, Expansion, Preprocessor, PreprocessorConfig};
pub use reader::{LineReader, LogicalLine};
pub use recognizer::{Recognized, Recognizer};
pub use registry::{FileId, FileRegistry, FileSource};
pub use report::{MemorySink, Report, ReportSink, Severity, TracingSink};
pub use subst::Substituter;
