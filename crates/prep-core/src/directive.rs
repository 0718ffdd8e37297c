//! Directive descriptors, the directive registry, and the built-in set.
//!
//! Block-structural behavior (what opens, transitions, closes) is plain
//! data on the descriptor so the assembler never needs dynamic dispatch;
//! only single directives carry a boxed [`SingleDirective`] handler, the
//! extension seam hosts implement to add their own directives.

use std::collections::HashMap;

use crate::block::Block;
use crate::error::PrepError;
use crate::expand::DirectiveScope;

/// Flavor of a conditional branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    /// `if EXPR`
    If,
    /// `elif EXPR`
    Elif,
    /// `else`
    Else,
    /// `ifdef NAME`
    Ifdef,
    /// `ifndef NAME`
    Ifndef,
}

/// What kind of block an opening directive starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockForm {
    /// A branching block; the opener contributes the first branch.
    Conditional(BranchKind),
    /// A replayed block (`for ... :` / `endfor`).
    Loop,
}

/// Structural role a directive plays during block assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockRole {
    /// Complete in a single line.
    Single,
    /// Opens a block of the given family.
    Open {
        /// Family shared by the block's transitions and closer.
        family: String,
        /// The block form the opener starts.
        form: BlockForm,
    },
    /// Starts a new branch in the open block of the same family.
    Transition {
        /// Family of the block being transitioned.
        family: String,
        /// Branch flavor the transition contributes.
        kind: BranchKind,
    },
    /// Closes the open block of the same family.
    Close {
        /// Family of the block being closed.
        family: String,
    },
    /// Single-line directive only valid directly inside an open block of
    /// the given family.
    Child {
        /// Required enclosing family.
        family: String,
    },
}

/// What a single directive asks the expander to do after its side
/// effects have been applied.
pub enum DirectiveEffect {
    /// Nothing further.
    None,
    /// Emit the given lines verbatim, bypassing substitution.
    Lines(Vec<String>),
    /// Expand a spliced source tree under the current context.
    Splice(Block),
}

/// Handler for a directive that is complete in a single line.
///
/// Implement this to extend the directive set:
///
/// ```
/// use prep_core::{DirectiveEffect, DirectiveScope, PrepError, SingleDirective};
///
/// struct ShoutDirective;
///
/// impl SingleDirective for ShoutDirective {
///     fn tag(&self) -> &str { "shout" }
///
///     fn expand(
///         &self,
///         arg: &str,
///         scope: &mut DirectiveScope<'_>,
///     ) -> Result<DirectiveEffect, PrepError> {
///         let text = scope.substitute(arg)?;
///         Ok(DirectiveEffect::Lines(vec![text.to_uppercase()]))
///     }
/// }
/// ```
pub trait SingleDirective: Send + Sync {
    /// Tag the directive is invoked by, without the prefix character.
    fn tag(&self) -> &str;

    /// Expand one call. `scope` exposes the defines, file registry, and
    /// report sink of the running expansion.
    fn expand(
        &self,
        arg: &str,
        scope: &mut DirectiveScope<'_>,
    ) -> Result<DirectiveEffect, PrepError>;
}

/// A registered directive: tag, structural role, floating flag, handler.
pub struct DirectiveSpec {
    tag: String,
    role: BlockRole,
    floating: bool,
    handler: Option<Box<dyn SingleDirective>>,
}

impl DirectiveSpec {
    /// Descriptor for a single directive with the given handler. The tag
    /// is taken from the handler.
    #[must_use]
    pub fn single(handler: impl SingleDirective + 'static) -> Self {
        Self {
            tag: handler.tag().to_owned(),
            role: BlockRole::Single,
            floating: false,
            handler: Some(Box::new(handler)),
        }
    }

    /// Descriptor for a block opener.
    #[must_use]
    pub fn open(tag: impl Into<String>, family: impl Into<String>, form: BlockForm) -> Self {
        Self {
            tag: tag.into(),
            role: BlockRole::Open {
                family: family.into(),
                form,
            },
            floating: false,
            handler: None,
        }
    }

    /// Descriptor for a branch transition.
    #[must_use]
    pub fn transition(
        tag: impl Into<String>,
        family: impl Into<String>,
        kind: BranchKind,
    ) -> Self {
        Self {
            tag: tag.into(),
            role: BlockRole::Transition {
                family: family.into(),
                kind,
            },
            floating: false,
            handler: None,
        }
    }

    /// Descriptor for a block closer.
    #[must_use]
    pub fn close(tag: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            role: BlockRole::Close {
                family: family.into(),
            },
            floating: false,
            handler: None,
        }
    }

    /// Descriptor for a child directive of the given family.
    #[must_use]
    pub fn child(family: impl Into<String>, handler: impl SingleDirective + 'static) -> Self {
        Self {
            tag: handler.tag().to_owned(),
            role: BlockRole::Child {
                family: family.into(),
            },
            floating: false,
            handler: Some(Box::new(handler)),
        }
    }

    /// Enable floating recognition for this directive.
    #[must_use]
    pub fn floating(mut self) -> Self {
        self.floating = true;
        self
    }

    /// The directive's tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The directive's structural role.
    #[must_use]
    pub fn role(&self) -> &BlockRole {
        &self.role
    }

    /// Whether the directive may appear floating inside a content line.
    #[must_use]
    pub fn is_floating(&self) -> bool {
        self.floating
    }

    pub(crate) fn handler(&self) -> Option<&dyn SingleDirective> {
        self.handler.as_deref()
    }
}

/// Registry of directive descriptors.
///
/// Locked by the first expansion run; late registration fails with
/// [`PrepError::RegistryLocked`].
pub struct DirectiveRegistry {
    specs: HashMap<String, DirectiveSpec>,
    locked: bool,
}

impl DirectiveRegistry {
    /// Registry with no directives at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            specs: HashMap::new(),
            locked: false,
        }
    }

    /// Registry pre-populated with the built-in directive set.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for spec in builtin_specs() {
            registry
                .register(spec)
                .expect("built-in directives are consistent");
        }
        registry
    }

    /// Register a descriptor.
    pub fn register(&mut self, spec: DirectiveSpec) -> Result<(), PrepError> {
        if self.locked {
            return Err(PrepError::RegistryLocked);
        }
        if self.specs.contains_key(spec.tag()) {
            return Err(PrepError::DuplicateRegistration {
                name: spec.tag().to_owned(),
            });
        }
        self.validate(&spec)?;
        self.specs.insert(spec.tag().to_owned(), spec);
        Ok(())
    }

    fn validate(&self, spec: &DirectiveSpec) -> Result<(), PrepError> {
        let misuse = || PrepError::UnknownDirective {
            tag: spec.tag().to_owned(),
        };

        if spec.is_floating()
            && !matches!(spec.role(), BlockRole::Single | BlockRole::Child { .. })
        {
            return Err(misuse());
        }

        // Transitions and closes must name a family that already has an
        // opener, so a mismatch surfaces at registration, not mid-file.
        if let BlockRole::Transition { family, .. }
        | BlockRole::Close { family }
        | BlockRole::Child { family } = spec.role()
        {
            let has_opener = self.specs.values().any(
                |s| matches!(s.role(), BlockRole::Open { family: f, .. } if f == family),
            );
            if !has_opener {
                return Err(misuse());
            }
        }
        Ok(())
    }

    /// Look up a descriptor by tag.
    #[must_use]
    pub fn lookup(&self, tag: &str) -> Option<&DirectiveSpec> {
        self.specs.get(tag)
    }

    /// Whether registration has been locked by a running expansion.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub(crate) fn lock(&mut self) {
        self.locked = true;
    }
}

impl Default for DirectiveRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn builtin_specs() -> Vec<DirectiveSpec> {
    vec![
        DirectiveSpec::single(DefineDirective),
        DirectiveSpec::single(UndefDirective),
        DirectiveSpec::single(IncludeDirective),
        DirectiveSpec::single(ImportDirective),
        DirectiveSpec::single(InfoDirective),
        DirectiveSpec::single(WarnDirective),
        DirectiveSpec::single(ErrorDirective),
        DirectiveSpec::open("if", "if", BlockForm::Conditional(BranchKind::If)),
        DirectiveSpec::open("ifdef", "if", BlockForm::Conditional(BranchKind::Ifdef)),
        DirectiveSpec::open("ifndef", "if", BlockForm::Conditional(BranchKind::Ifndef)),
        DirectiveSpec::transition("elif", "if", BranchKind::Elif),
        DirectiveSpec::transition("else", "if", BranchKind::Else),
        DirectiveSpec::close("endif", "if"),
        DirectiveSpec::open("for", "for", BlockForm::Loop),
        DirectiveSpec::close("endfor", "for"),
    ]
}

/// Whether a string is a valid define/loop-variable identifier.
#[must_use]
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split a `NAME [VALUE]` argument into the identifier and the optional
/// remainder.
fn split_name_arg(arg: &str) -> Option<(&str, Option<&str>)> {
    let arg = arg.trim();
    let name_end = arg
        .find(|c: char| c.is_whitespace())
        .unwrap_or(arg.len());
    let (name, rest) = arg.split_at(name_end);
    if !is_identifier(name) {
        return None;
    }
    let rest = rest.trim();
    Some((name, (!rest.is_empty()).then_some(rest)))
}

/// Strip optional surrounding quotes from an include/import path.
fn path_arg(arg: &str) -> Option<&str> {
    let arg = arg.trim();
    let path = if let Some(inner) = arg.strip_prefix('"') {
        inner.strip_suffix('"')?
    } else {
        arg
    };
    (!path.is_empty()).then_some(path)
}

struct DefineDirective;

impl SingleDirective for DefineDirective {
    fn tag(&self) -> &str {
        "define"
    }

    fn expand(
        &self,
        arg: &str,
        scope: &mut DirectiveScope<'_>,
    ) -> Result<DirectiveEffect, PrepError> {
        let Some((name, value)) = split_name_arg(arg) else {
            return Err(scope.syntax_error("`define` expects an identifier"));
        };
        scope.define(name, value);
        Ok(DirectiveEffect::None)
    }
}

struct UndefDirective;

impl SingleDirective for UndefDirective {
    fn tag(&self) -> &str {
        "undef"
    }

    fn expand(
        &self,
        arg: &str,
        scope: &mut DirectiveScope<'_>,
    ) -> Result<DirectiveEffect, PrepError> {
        let Some((name, None)) = split_name_arg(arg) else {
            return Err(scope.syntax_error("`undef` expects a single identifier"));
        };
        scope.undef(name);
        Ok(DirectiveEffect::None)
    }
}

struct IncludeDirective;

impl SingleDirective for IncludeDirective {
    fn tag(&self) -> &str {
        "include"
    }

    fn expand(
        &self,
        arg: &str,
        scope: &mut DirectiveScope<'_>,
    ) -> Result<DirectiveEffect, PrepError> {
        let Some(path) = path_arg(arg) else {
            return Err(scope.syntax_error("`include` expects a quoted path"));
        };
        scope.splice(path, false)
    }
}

struct ImportDirective;

impl SingleDirective for ImportDirective {
    fn tag(&self) -> &str {
        "import"
    }

    fn expand(
        &self,
        arg: &str,
        scope: &mut DirectiveScope<'_>,
    ) -> Result<DirectiveEffect, PrepError> {
        let Some(path) = path_arg(arg) else {
            return Err(scope.syntax_error("`import` expects a quoted path"));
        };
        scope.splice(path, true)
    }
}

struct InfoDirective;

impl SingleDirective for InfoDirective {
    fn tag(&self) -> &str {
        "info"
    }

    fn expand(
        &self,
        arg: &str,
        scope: &mut DirectiveScope<'_>,
    ) -> Result<DirectiveEffect, PrepError> {
        let message = scope.substitute(arg)?;
        scope.info(&message);
        Ok(DirectiveEffect::None)
    }
}

struct WarnDirective;

impl SingleDirective for WarnDirective {
    fn tag(&self) -> &str {
        "warn"
    }

    fn expand(
        &self,
        arg: &str,
        scope: &mut DirectiveScope<'_>,
    ) -> Result<DirectiveEffect, PrepError> {
        let message = scope.substitute(arg)?;
        scope.warn(&message);
        Ok(DirectiveEffect::None)
    }
}

struct ErrorDirective;

impl SingleDirective for ErrorDirective {
    fn tag(&self) -> &str {
        "error"
    }

    fn expand(
        &self,
        arg: &str,
        scope: &mut DirectiveScope<'_>,
    ) -> Result<DirectiveEffect, PrepError> {
        let message = scope.substitute(arg)?;
        Err(PrepError::User {
            origin: scope.origin().clone(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = DirectiveRegistry::with_builtins();
        for tag in [
            "define", "undef", "if", "ifdef", "ifndef", "elif", "else", "endif", "for",
            "endfor", "include", "import", "info", "warn", "error",
        ] {
            assert!(registry.lookup(tag).is_some(), "missing builtin `{tag}`");
        }
        assert!(registry.lookup("pragma").is_none());
    }

    #[test]
    fn test_family_links() {
        let registry = DirectiveRegistry::with_builtins();
        let elif = registry.lookup("elif").unwrap();
        assert_eq!(
            elif.role(),
            &BlockRole::Transition {
                family: "if".to_owned(),
                kind: BranchKind::Elif
            }
        );
        let endfor = registry.lookup("endfor").unwrap();
        assert_eq!(
            endfor.role(),
            &BlockRole::Close {
                family: "for".to_owned()
            }
        );
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = DirectiveRegistry::with_builtins();
        let err = registry
            .register(DirectiveSpec::single(DefineDirective))
            .unwrap_err();
        assert!(matches!(err, PrepError::DuplicateRegistration { .. }));
    }

    #[test]
    fn test_locked_registry_rejects() {
        let mut registry = DirectiveRegistry::with_builtins();
        registry.lock();
        let err = registry
            .register(DirectiveSpec::single(InfoDirective))
            .unwrap_err();
        assert!(matches!(err, PrepError::RegistryLocked));
    }

    #[test]
    fn test_close_without_opener_rejected() {
        let mut registry = DirectiveRegistry::empty();
        let err = registry
            .register(DirectiveSpec::close("endwhile", "while"))
            .unwrap_err();
        assert!(matches!(err, PrepError::UnknownDirective { tag } if tag == "endwhile"));
    }

    #[test]
    fn test_floating_block_role_rejected() {
        let mut registry = DirectiveRegistry::empty();
        let err = registry
            .register(
                DirectiveSpec::open("while", "while", BlockForm::Loop).floating(),
            )
            .unwrap_err();
        assert!(matches!(err, PrepError::UnknownDirective { .. }));
    }

    #[test]
    fn test_split_name_arg() {
        assert_eq!(split_name_arg("NAME"), Some(("NAME", None)));
        assert_eq!(split_name_arg("NAME  1 + 2"), Some(("NAME", Some("1 + 2"))));
        assert_eq!(split_name_arg("_x9 y"), Some(("_x9", Some("y"))));
        assert_eq!(split_name_arg("9bad"), None);
        assert_eq!(split_name_arg(""), None);
    }

    #[test]
    fn test_path_arg() {
        assert_eq!(path_arg(r#""lib/common.txt""#), Some("lib/common.txt"));
        assert_eq!(path_arg("bare.txt"), Some("bare.txt"));
        assert_eq!(path_arg(r#""unclosed"#), None);
        assert_eq!(path_arg(""), None);
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("FLAG"));
        assert!(is_identifier("_private"));
        assert!(is_identifier("x1"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }
}
