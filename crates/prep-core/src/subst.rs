//! Constant substitution on output lines.
//!
//! Two forms. Explicit `$(NAME)` resolves through the expression
//! evaluator, so a define holding `(A + B)` comes out computed. Implicit
//! substitution replaces bare identifier words with the binding's text,
//! iterated to a fixed point under the configured cap. String literals
//! are only protected inside expressions; output text is substituted
//! as-is.

use crate::context::{Binding, ContextArena, ContextId};
use crate::error::{Origin, PrepError};
use crate::eval::Evaluator;

/// Applies substitution for one context.
pub struct Substituter<'a> {
    scopes: &'a ContextArena,
    ctx: ContextId,
    limit: usize,
}

impl<'a> Substituter<'a> {
    /// Create a substituter for the given context and depth limit.
    #[must_use]
    pub fn new(scopes: &'a ContextArena, ctx: ContextId, limit: usize) -> Self {
        Self { scopes, ctx, limit }
    }

    /// Substitute one output line: explicit `$(NAME)` forms first, then
    /// implicit bare-word substitution to a fixed point.
    pub fn line(&self, text: &str, origin: &Origin) -> Result<String, PrepError> {
        let explicit = self.explicit(text, origin)?;
        self.implicit_fixed_point(&explicit, origin)
    }

    fn explicit(&self, text: &str, origin: &Origin) -> Result<String, PrepError> {
        let evaluator = Evaluator::new(self.scopes, self.ctx, self.limit);
        let mut result = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("$(") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];

            match after.find(')') {
                Some(end) if crate::directive::is_identifier(after[..end].trim()) => {
                    let name = after[..end].trim();
                    let value = evaluator.resolve_ident(name, origin)?;
                    result.push_str(&value.to_string());
                    rest = &after[end + 1..];
                }
                _ => {
                    // Not an identifier reference; keep the `$(` verbatim.
                    result.push_str("$(");
                    rest = after;
                }
            }
        }

        result.push_str(rest);
        Ok(result)
    }

    fn implicit_fixed_point(&self, text: &str, origin: &Origin) -> Result<String, PrepError> {
        let mut current = text.to_owned();
        for _ in 0..self.limit {
            let (next, changed) = self.implicit_once(&current);
            if !changed {
                return Ok(next);
            }
            current = next;
        }
        Err(PrepError::SubstitutionLoop {
            origin: origin.clone(),
            limit: self.limit,
        })
    }

    fn implicit_once(&self, text: &str) -> (String, bool) {
        let mut result = String::with_capacity(text.len());
        let mut changed = false;
        let bytes = text.as_bytes();
        let mut pos = 0;

        while pos < bytes.len() {
            let c = bytes[pos] as char;
            if c.is_ascii_alphabetic() || c == '_' {
                let start = pos;
                while pos < bytes.len()
                    && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                let word = &text[start..pos];
                match self.scopes.lookup(self.ctx, word) {
                    Some(Binding::Text(value)) => {
                        result.push_str(value);
                        changed = changed || value != word;
                    }
                    Some(Binding::Scalar(value)) => {
                        let rendered = value.to_string();
                        changed = changed || rendered != word;
                        result.push_str(&rendered);
                    }
                    Some(Binding::Empty) => {
                        changed = true;
                    }
                    None => result.push_str(word),
                }
            } else {
                // Copy the whole character, not just its first byte.
                let ch = text[pos..].chars().next().unwrap_or('\0');
                result.push(ch);
                pos += ch.len_utf8();
            }
        }

        (result, changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Value;

    fn origin() -> Origin {
        Origin::new("test", 1)
    }

    fn arena_with(defs: &[(&str, Binding)]) -> (ContextArena, ContextId) {
        let mut arena = ContextArena::new();
        let root = arena.root();
        for (name, binding) in defs {
            arena.define(root, name, binding.clone());
        }
        (arena, root)
    }

    fn subst(defs: &[(&str, Binding)], text: &str) -> Result<String, PrepError> {
        let (arena, root) = arena_with(defs);
        Substituter::new(&arena, root, 32).line(text, &origin())
    }

    #[test]
    fn test_explicit_evaluates() {
        let out = subst(
            &[
                ("A", Binding::Text("1".to_owned())),
                ("B", Binding::Text("2".to_owned())),
                ("S", Binding::Text("(A + B)".to_owned())),
            ],
            "v=$(S)",
        )
        .unwrap();
        assert_eq!(out, "v=3");
    }

    #[test]
    fn test_explicit_text_fallback() {
        let out = subst(
            &[("GREETING", Binding::Text("hello world".to_owned()))],
            "say: $(GREETING)",
        )
        .unwrap();
        assert_eq!(out, "say: hello world");
    }

    #[test]
    fn test_explicit_undefined_fails() {
        let err = subst(&[], "$(MISSING)").unwrap_err();
        assert!(matches!(err, PrepError::UndefinedIdentifier { name, .. } if name == "MISSING"));
    }

    #[test]
    fn test_explicit_non_identifier_kept() {
        let out = subst(&[], "cost is $(1+2) dollars").unwrap();
        assert_eq!(out, "cost is $(1+2) dollars");
    }

    #[test]
    fn test_unclosed_explicit_kept() {
        let out = subst(&[], "dangling $(oops").unwrap();
        assert_eq!(out, "dangling $(oops");
    }

    #[test]
    fn test_implicit_replaces_bare_words() {
        let out = subst(&[("X", Binding::Text("3".to_owned()))], "X marks X").unwrap();
        assert_eq!(out, "3 marks 3");
    }

    #[test]
    fn test_implicit_is_textual() {
        let out = subst(
            &[
                ("A", Binding::Text("1".to_owned())),
                ("B", Binding::Text("2".to_owned())),
                ("S", Binding::Text("(A + B)".to_owned())),
            ],
            "v=S",
        )
        .unwrap();
        assert_eq!(out, "v=(1 + 2)");
    }

    #[test]
    fn test_implicit_respects_word_boundaries() {
        let out = subst(&[("X", Binding::Text("3".to_owned()))], "XY Xs preX X").unwrap();
        assert_eq!(out, "XY Xs preX 3");
    }

    #[test]
    fn test_implicit_scalar_and_empty() {
        let out = subst(
            &[
                ("n", Binding::Scalar(Value::Int(7))),
                ("FLAG", Binding::Empty),
            ],
            "n=[n] flag=[FLAG]",
        )
        .unwrap();
        assert_eq!(out, "7=[7] flag=[]");
    }

    #[test]
    fn test_substitution_idempotent_when_settled() {
        let defs = [("X", Binding::Text("3".to_owned()))];
        let once = subst(&defs, "value X").unwrap();
        let twice = subst(&defs, &once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_self_reference_settles() {
        // A define expanding to itself is already at the fixed point.
        let out = subst(&[("A", Binding::Text("A".to_owned()))], "A").unwrap();
        assert_eq!(out, "A");
    }

    #[test]
    fn test_mutual_recursion_detected() {
        let err = subst(
            &[
                ("A", Binding::Text("B".to_owned())),
                ("B", Binding::Text("A".to_owned())),
            ],
            "A",
        )
        .unwrap_err();
        assert!(matches!(err, PrepError::SubstitutionLoop { .. }));
    }

    #[test]
    fn test_no_defines_leaves_line_alone() {
        let out = subst(&[], "plain text, nothing to do").unwrap();
        assert_eq!(out, "plain text, nothing to do");
    }
}
