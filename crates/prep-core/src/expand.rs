//! The streaming expander.
//!
//! [`Preprocessor`] holds everything configured ahead of a run: the file
//! and directive registries, seed defines, and the report sink. A call to
//! [`Preprocessor::expand`] locks the directive registry, builds the root
//! file's block tree, and returns an [`Expansion`]: a lazy iterator of
//! output lines driven by an explicit frame stack, so nested includes and
//! loops never recurse across a yield.
//!
//! Output ordering is exactly what an eager expansion would produce; the
//! laziness is purely incremental.

use std::rc::Rc;
use std::sync::Arc;

use crate::block::{Block, BlockAssembler, TextLine};
use crate::context::{Binding, ContextArena, ContextId};
use crate::directive::{BranchKind, DirectiveEffect, DirectiveRegistry, is_identifier};
use crate::error::{Origin, PrepError};
use crate::eval::{Evaluator, Value};
use crate::reader::LineReader;
use crate::recognizer::Recognizer;
use crate::registry::FileRegistry;
use crate::report::{ReportSink, Severity, default_sink};
use crate::subst::Substituter;

/// Engine configuration fixed at construction.
#[derive(Debug, Clone)]
pub struct PreprocessorConfig {
    /// Directive prefix character.
    pub prefix: char,
    /// Cap on substitution rounds and identifier resolution depth.
    pub max_substitution_depth: usize,
    /// Cap on nested include/import expansion.
    pub max_include_depth: usize,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PreprocessorConfig {
    /// Configuration with the default prefix (`#`) and limits.
    #[must_use]
    pub fn new() -> Self {
        Self {
            prefix: '#',
            max_substitution_depth: 32,
            max_include_depth: 10,
        }
    }

    /// Set the directive prefix character.
    #[must_use]
    pub fn with_prefix(mut self, prefix: char) -> Self {
        self.prefix = prefix;
        self
    }

    /// Set the substitution depth cap.
    #[must_use]
    pub fn with_max_substitution_depth(mut self, depth: usize) -> Self {
        self.max_substitution_depth = depth;
        self
    }

    /// Set the include nesting cap.
    #[must_use]
    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }
}

/// A configured preprocessor.
pub struct Preprocessor {
    pub(crate) config: PreprocessorConfig,
    pub(crate) files: FileRegistry,
    pub(crate) directives: DirectiveRegistry,
    pub(crate) sink: Arc<dyn ReportSink>,
    seeds: Vec<(String, Option<String>)>,
}

impl Preprocessor {
    /// Create a preprocessor with the built-in directive set.
    #[must_use]
    pub fn new(config: PreprocessorConfig) -> Self {
        Self {
            config,
            files: FileRegistry::new(),
            directives: DirectiveRegistry::with_builtins(),
            sink: default_sink(),
            seeds: Vec::new(),
        }
    }

    /// Replace the report sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The file registry.
    #[must_use]
    pub fn files(&self) -> &FileRegistry {
        &self.files
    }

    /// The file registry, mutable.
    pub fn files_mut(&mut self) -> &mut FileRegistry {
        &mut self.files
    }

    /// The directive registry.
    #[must_use]
    pub fn directives(&self) -> &DirectiveRegistry {
        &self.directives
    }

    /// The directive registry, mutable. Registration fails once a run has
    /// started.
    pub fn directives_mut(&mut self) -> &mut DirectiveRegistry {
        &mut self.directives
    }

    /// Append a search root for include resolution.
    pub fn add_search_root(&mut self, dir: impl Into<std::path::PathBuf>) {
        self.files.add_search_root(dir);
    }

    /// Seed a define into the root context of every run; `None` defines
    /// the name with no value.
    pub fn define(&mut self, name: impl Into<String>, value: Option<&str>) {
        self.seeds.push((name.into(), value.map(str::to_owned)));
    }

    /// Begin expanding `root`. Locks the directive registry, resets the
    /// import flags, and builds the root file's block tree.
    pub fn expand(&mut self, root: &str) -> Result<Expansion<'_>, PrepError> {
        self.directives.lock();
        self.files.reset_imports();

        let mut scopes = ContextArena::new();
        let ctx = scopes.root();
        for (name, value) in &self.seeds {
            let binding = value
                .as_ref()
                .map_or(Binding::Empty, |v| Binding::Text(v.clone()));
            scopes.define(ctx, name, binding);
        }

        // The root file has no including file; its relative lookups fall
        // back to the working directory.
        let id = self.files.resolve(root, Some(std::path::Path::new(".")))?;
        let name = Arc::clone(self.files.name(id));
        let contents = self.files.read(id).map_err(|source| PrepError::Io {
            origin: Origin {
                file: Arc::clone(&name),
                line: 0,
            },
            source,
        })?;
        let tree = parse_source(&name, &contents, self.config.prefix, &self.directives, &self.sink)?;
        let children = match tree {
            Block::Root { children } => children,
            _ => unreachable!("parse_source returns a root"),
        };

        Ok(Expansion {
            pre: self,
            scopes,
            stack: vec![Frame::Seq {
                children: Rc::new(children),
                next: 0,
                ctx,
                exit: SeqExit::None,
                depth: 0,
            }],
            done: false,
        })
    }
}

/// Run a source file through reader → recognizer → assembler.
fn parse_source(
    file: &Arc<str>,
    contents: &str,
    prefix: char,
    directives: &DirectiveRegistry,
    sink: &Arc<dyn ReportSink>,
) -> Result<Block, PrepError> {
    let mut reader = LineReader::new(Arc::clone(file), contents, prefix);
    let recognizer = Recognizer::new(directives, prefix);
    let mut assembler = BlockAssembler::new(directives);

    while let Some(line) = reader.next() {
        for item in recognizer.recognize(&line) {
            assembler.feed(item, &line.origin)?;
        }
    }
    if let Some(origin) = reader.dangling_continuation() {
        sink.report(
            Severity::Warning,
            Some(origin),
            "trailing backslash at end of input",
        );
    }
    assembler.finish()
}

/// Facade handed to [`SingleDirective`](crate::SingleDirective) handlers,
/// exposing the running expansion's defines, files, and sink.
pub struct DirectiveScope<'e> {
    scopes: &'e mut ContextArena,
    files: &'e mut FileRegistry,
    directives: &'e DirectiveRegistry,
    sink: &'e Arc<dyn ReportSink>,
    config: &'e PreprocessorConfig,
    ctx: ContextId,
    origin: Origin,
    include_depth: usize,
}

impl DirectiveScope<'_> {
    /// Where the directive call appeared.
    #[must_use]
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Bind a define in the innermost context. Warns through the sink
    /// when the name was already visible.
    pub fn define(&mut self, name: &str, value: Option<&str>) {
        let binding = value.map_or(Binding::Empty, |v| Binding::Text(v.to_owned()));
        if self.scopes.define(self.ctx, name, binding) {
            self.sink.report(
                Severity::Warning,
                Some(&self.origin),
                &format!("`{name}` redefined"),
            );
        }
    }

    /// Remove the visible binding of a name.
    pub fn undef(&mut self, name: &str) {
        self.scopes.undef(self.ctx, name);
    }

    /// Definedness test against the active context.
    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.scopes.is_defined(self.ctx, name)
    }

    /// Apply constant substitution to text, e.g. a log message.
    pub fn substitute(&self, text: &str) -> Result<String, PrepError> {
        Substituter::new(self.scopes, self.ctx, self.config.max_substitution_depth)
            .line(text, &self.origin)
    }

    /// Report an informational message.
    pub fn info(&self, message: &str) {
        self.sink.report(Severity::Info, Some(&self.origin), message);
    }

    /// Report a warning.
    pub fn warn(&self, message: &str) {
        self.sink
            .report(Severity::Warning, Some(&self.origin), message);
    }

    /// An [`PrepError::ExpressionSyntax`] at the directive's origin, for
    /// malformed arguments.
    #[must_use]
    pub fn syntax_error(&self, message: impl Into<String>) -> PrepError {
        PrepError::ExpressionSyntax {
            origin: self.origin.clone(),
            message: message.into(),
        }
    }

    /// Resolve a path and parse it for in-place expansion. With `once`
    /// set, a file already imported this run yields nothing.
    pub fn splice(&mut self, path: &str, once: bool) -> Result<DirectiveEffect, PrepError> {
        if self.include_depth >= self.config.max_include_depth {
            self.sink.report(
                Severity::Warning,
                Some(&self.origin),
                &format!(
                    "maximum include depth ({}) exceeded; skipping `{path}`",
                    self.config.max_include_depth
                ),
            );
            return Ok(DirectiveEffect::None);
        }

        let origin_dir = self.files.origin_dir_of(&self.origin.file);
        let id = self.files.resolve(path, origin_dir.as_deref())?;
        if once {
            if self.files.was_imported(id) {
                return Ok(DirectiveEffect::None);
            }
            self.files.mark_imported(id);
        }

        let name = Arc::clone(self.files.name(id));
        let contents = self.files.read(id).map_err(|source| PrepError::Io {
            origin: self.origin.clone(),
            source,
        })?;
        let tree = parse_source(&name, &contents, self.config.prefix, self.directives, self.sink)?;
        Ok(DirectiveEffect::Splice(tree))
    }
}

enum SeqExit {
    /// Plain sequence (root, include splice).
    None,
    /// Selected conditional branch: merge defines into the parent.
    Join { parent: ContextId },
    /// Loop iteration: the fork is discarded.
    Discard,
}

enum Frame {
    Seq {
        children: Rc<Vec<Block>>,
        next: usize,
        ctx: ContextId,
        exit: SeqExit,
        depth: usize,
    },
    Text {
        lines: Vec<TextLine>,
        next: usize,
        ctx: ContextId,
    },
    /// Verbatim lines produced by a directive handler.
    Emit {
        lines: Vec<String>,
        next: usize,
    },
    Loop {
        vars: Vec<String>,
        values: std::vec::IntoIter<Value>,
        body: Rc<Vec<Block>>,
        parent: ContextId,
        depth: usize,
        origin: Origin,
    },
}

enum Action {
    Pop,
    PopSeq,
    Text(TextLine, ContextId),
    Emit(String),
    Node(Block, ContextId, usize),
    Iterate {
        vars: Vec<String>,
        value: Value,
        body: Rc<Vec<Block>>,
        parent: ContextId,
        depth: usize,
        origin: Origin,
    },
}

/// A running expansion: a lazy iterator of output lines.
///
/// The iterator fuses after yielding an error. Dropping it releases all
/// nested state.
pub struct Expansion<'p> {
    pre: &'p mut Preprocessor,
    scopes: ContextArena,
    stack: Vec<Frame>,
    done: bool,
}

impl std::fmt::Debug for Expansion<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Expansion")
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl Expansion<'_> {
    /// Drain the expansion into one string, one `\n` per output line.
    pub fn collect_string(self) -> Result<String, PrepError> {
        let mut out = String::new();
        for line in self {
            out.push_str(&line?);
            out.push('\n');
        }
        Ok(out)
    }

    fn advance(&mut self) -> Result<Option<String>, PrepError> {
        loop {
            let action = match self.stack.last_mut() {
                None => return Ok(None),
                Some(Frame::Text { lines, next, ctx }) => {
                    if *next >= lines.len() {
                        Action::Pop
                    } else {
                        let line = lines[*next].clone();
                        *next += 1;
                        Action::Text(line, *ctx)
                    }
                }
                Some(Frame::Emit { lines, next }) => {
                    if *next >= lines.len() {
                        Action::Pop
                    } else {
                        let line = lines[*next].clone();
                        *next += 1;
                        Action::Emit(line)
                    }
                }
                Some(Frame::Seq {
                    children,
                    next,
                    ctx,
                    depth,
                    ..
                }) => {
                    if *next >= children.len() {
                        Action::PopSeq
                    } else {
                        let node = children[*next].clone();
                        *next += 1;
                        Action::Node(node, *ctx, *depth)
                    }
                }
                Some(Frame::Loop {
                    vars,
                    values,
                    body,
                    parent,
                    depth,
                    origin,
                }) => match values.next() {
                    None => Action::Pop,
                    Some(value) => Action::Iterate {
                        vars: vars.clone(),
                        value,
                        body: Rc::clone(body),
                        parent: *parent,
                        depth: *depth,
                        origin: origin.clone(),
                    },
                },
            };

            match action {
                Action::Pop => {
                    self.stack.pop();
                }
                Action::PopSeq => {
                    if let Some(Frame::Seq { ctx, exit, .. }) = self.stack.pop() {
                        if let SeqExit::Join { parent } = exit {
                            self.scopes.join(ctx, parent);
                        }
                    }
                }
                Action::Text(line, ctx) => {
                    if !self.scopes.enabled(ctx) {
                        continue;
                    }
                    let out = Substituter::new(
                        &self.scopes,
                        ctx,
                        self.pre.config.max_substitution_depth,
                    )
                    .line(&line.text, &line.origin)?;
                    return Ok(Some(out));
                }
                Action::Emit(line) => return Ok(Some(line)),
                Action::Node(node, ctx, depth) => self.enter(node, ctx, depth)?,
                Action::Iterate {
                    vars,
                    value,
                    body,
                    parent,
                    depth,
                    origin,
                } => {
                    let child = self.scopes.fork(parent, true);
                    bind_loop_vars(&mut self.scopes, child, &vars, value, &origin)?;
                    self.stack.push(Frame::Seq {
                        children: body,
                        next: 0,
                        ctx: child,
                        exit: SeqExit::Discard,
                        depth,
                    });
                }
            }
        }
    }

    fn enter(&mut self, node: Block, ctx: ContextId, depth: usize) -> Result<(), PrepError> {
        match node {
            Block::Text { lines } => {
                self.stack.push(Frame::Text {
                    lines,
                    next: 0,
                    ctx,
                });
            }
            Block::Root { children } => {
                self.stack.push(Frame::Seq {
                    children: Rc::new(children),
                    next: 0,
                    ctx,
                    exit: SeqExit::None,
                    depth,
                });
            }
            Block::Single { tag, arg, origin } => {
                if !self.scopes.enabled(ctx) {
                    return Ok(());
                }
                self.run_single(&tag, &arg, origin, ctx, depth)?;
            }
            Block::Conditional { branches } => {
                let limit = self.pre.config.max_substitution_depth;
                let mut selected = None;
                for branch in branches {
                    let taken = match branch.kind {
                        BranchKind::If | BranchKind::Elif => {
                            Evaluator::new(&self.scopes, ctx, limit)
                                .eval_text(&branch.arg, &branch.origin)?
                                .truthy()
                        }
                        BranchKind::Ifdef | BranchKind::Ifndef => {
                            let name = branch.arg.trim();
                            if !is_identifier(name) {
                                return Err(PrepError::ExpressionSyntax {
                                    origin: branch.origin.clone(),
                                    message: "definedness test expects an identifier"
                                        .to_owned(),
                                });
                            }
                            let defined = self.scopes.is_defined(ctx, name);
                            (branch.kind == BranchKind::Ifdef) == defined
                        }
                        BranchKind::Else => true,
                    };
                    if taken {
                        selected = Some(branch.children);
                        break;
                    }
                }
                if let Some(children) = selected {
                    let child = self.scopes.fork(ctx, true);
                    self.stack.push(Frame::Seq {
                        children: Rc::new(children),
                        next: 0,
                        ctx: child,
                        exit: SeqExit::Join { parent: ctx },
                        depth,
                    });
                }
            }
            Block::Loop {
                header,
                children,
                origin,
            } => {
                let (vars, expr) = parse_loop_header(&header, &origin)?;
                let limit = self.pre.config.max_substitution_depth;
                let value = Evaluator::new(&self.scopes, ctx, limit).eval_text(&expr, &origin)?;
                let Value::List(values) = value else {
                    return Err(PrepError::TypeMismatch {
                        origin,
                        message: format!("loop needs an iterable, got {}", value.type_name()),
                    });
                };
                self.stack.push(Frame::Loop {
                    vars,
                    values: values.into_iter(),
                    body: Rc::new(children),
                    parent: ctx,
                    depth,
                    origin,
                });
            }
        }
        Ok(())
    }

    fn run_single(
        &mut self,
        tag: &str,
        arg: &str,
        origin: Origin,
        ctx: ContextId,
        depth: usize,
    ) -> Result<(), PrepError> {
        let pre = &mut *self.pre;
        let handler = pre
            .directives
            .lookup(tag)
            .and_then(crate::directive::DirectiveSpec::handler)
            .ok_or_else(|| PrepError::UnknownDirective {
                tag: tag.to_owned(),
            })?;

        let mut scope = DirectiveScope {
            scopes: &mut self.scopes,
            files: &mut pre.files,
            directives: &pre.directives,
            sink: &pre.sink,
            config: &pre.config,
            ctx,
            origin,
            include_depth: depth,
        };

        match handler.expand(arg, &mut scope)? {
            DirectiveEffect::None => {}
            DirectiveEffect::Lines(lines) => {
                self.stack.push(Frame::Emit { lines, next: 0 });
            }
            DirectiveEffect::Splice(tree) => {
                let children = match tree {
                    Block::Root { children } => children,
                    other => vec![other],
                };
                self.stack.push(Frame::Seq {
                    children: Rc::new(children),
                    next: 0,
                    ctx,
                    exit: SeqExit::None,
                    depth: depth + 1,
                });
            }
        }
        Ok(())
    }
}

impl Iterator for Expansion<'_> {
    type Item = Result<String, PrepError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(line)) => Some(Ok(line)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

fn bind_loop_vars(
    scopes: &mut ContextArena,
    ctx: ContextId,
    vars: &[String],
    value: Value,
    origin: &Origin,
) -> Result<(), PrepError> {
    if vars.len() == 1 {
        scopes.define(ctx, &vars[0], Binding::Scalar(value));
        return Ok(());
    }

    let Value::List(items) = value else {
        return Err(PrepError::TypeMismatch {
            origin: origin.clone(),
            message: format!(
                "cannot unpack {} into {} loop variables",
                value.type_name(),
                vars.len()
            ),
        });
    };
    if items.len() != vars.len() {
        return Err(PrepError::TypeMismatch {
            origin: origin.clone(),
            message: format!(
                "cannot unpack {} values into {} loop variables",
                items.len(),
                vars.len()
            ),
        });
    }
    for (var, item) in vars.iter().zip(items) {
        scopes.define(ctx, var, Binding::Scalar(item));
    }
    Ok(())
}

/// Parse a `VARS in EXPR:` loop header into variable names and the
/// expression text. The trailing colon is part of the grammar.
fn parse_loop_header(header: &str, origin: &Origin) -> Result<(Vec<String>, String), PrepError> {
    let syntax = |message: &str| PrepError::ExpressionSyntax {
        origin: origin.clone(),
        message: message.to_owned(),
    };

    let Some(body) = header.trim_end().strip_suffix(':') else {
        return Err(syntax("loop header must end with `:`"));
    };

    let mut rest = body.trim_start();
    let mut vars = Vec::new();
    loop {
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        let name = &rest[..end];
        if !is_identifier(name) {
            return Err(syntax("expected a loop variable name"));
        }
        vars.push(name.to_owned());
        rest = rest[end..].trim_start();
        if let Some(after_comma) = rest.strip_prefix(',') {
            rest = after_comma.trim_start();
        } else {
            break;
        }
    }

    let Some(after_in) = rest.strip_prefix("in") else {
        return Err(syntax("expected `in` after the loop variables"));
    };
    if after_in
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(syntax("expected `in` after the loop variables"));
    }

    let expr = after_in.trim();
    if expr.is_empty() {
        return Err(syntax("loop header is missing its expression"));
    }
    Ok((vars, expr.to_owned()))
}
