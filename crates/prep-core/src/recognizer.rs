//! Two-phase directive recognition.
//!
//! Phase one: a line whose first non-blank character is the prefix and
//! whose following word is a registered tag becomes an anchored directive
//! call; any other line is content. Phase two: content lines are scanned
//! for floating occurrences of the prefix, but only tags whose descriptor
//! opted into floating recognition match. An anchored line never
//! additionally floats.

use crate::directive::DirectiveRegistry;
use crate::reader::LogicalLine;

/// Classification of one logical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognized {
    /// Plain content, passed through (after substitution).
    Content(String),
    /// A directive occupying the whole line.
    Anchored {
        /// The directive tag.
        tag: String,
        /// Remainder of the line, trimmed.
        arg: String,
    },
    /// A directive embedded in a content line.
    Floating {
        /// The directive tag.
        tag: String,
        /// The directive's argument text.
        arg: String,
        /// Content preceding the directive (since the previous fragment).
        before: String,
        /// Content following the directive; empty unless this is the last
        /// fragment on the line.
        after: String,
    },
}

/// Classifies logical lines against a directive registry.
pub struct Recognizer<'r> {
    directives: &'r DirectiveRegistry,
    prefix: char,
}

impl<'r> Recognizer<'r> {
    /// Create a recognizer for the given registry and prefix character.
    #[must_use]
    pub fn new(directives: &'r DirectiveRegistry, prefix: char) -> Self {
        Self { directives, prefix }
    }

    /// Classify one logical line into recognized items.
    ///
    /// Most lines produce exactly one item; a line with several floating
    /// directives produces one fragment per occurrence.
    #[must_use]
    pub fn recognize(&self, line: &LogicalLine) -> Vec<Recognized> {
        if line.anchored {
            let trimmed = line.text.trim_start();
            let rest = &trimmed[self.prefix.len_utf8()..];
            let tag_end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            let tag = &rest[..tag_end];

            if !tag.is_empty() && self.directives.lookup(tag).is_some() {
                return vec![Recognized::Anchored {
                    tag: tag.to_owned(),
                    arg: rest[tag_end..].trim().to_owned(),
                }];
            }
            // Unknown tag after the prefix: plain content, kept verbatim
            // so non-directive `#` lines survive.
        }

        self.recognize_floating(&line.text)
    }

    fn recognize_floating(&self, text: &str) -> Vec<Recognized> {
        let mut items = Vec::new();
        let mut before_start = 0;
        let mut pos = 0;

        while let Some(offset) = text[pos..].find(self.prefix) {
            let at = pos + offset;
            let after_prefix = &text[at + self.prefix.len_utf8()..];
            let tag_end = after_prefix
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after_prefix.len());
            let tag = &after_prefix[..tag_end];

            let floating = !tag.is_empty()
                && self
                    .directives
                    .lookup(tag)
                    .is_some_and(crate::directive::DirectiveSpec::is_floating);
            if !floating {
                pos = at + self.prefix.len_utf8();
                continue;
            }

            let arg_text = &after_prefix[tag_end..];
            let (arg, consumed) = floating_arg(arg_text);

            items.push(Recognized::Floating {
                tag: tag.to_owned(),
                arg,
                before: text[before_start..at].to_owned(),
                after: String::new(),
            });

            pos = at + self.prefix.len_utf8() + tag_end + consumed;
            before_start = pos;
        }

        if items.is_empty() {
            return vec![Recognized::Content(text.to_owned())];
        }

        let tail = &text[before_start..];
        if let Some(Recognized::Floating { after, .. }) = items.last_mut() {
            tail.clone_into(after);
        }
        items
    }
}

/// Extract a floating directive's argument.
///
/// A parenthesized group directly after the tag delimits the argument and
/// lets trailing content follow; without one the argument runs to the end
/// of the line. Returns the argument and the bytes consumed.
fn floating_arg(s: &str) -> (String, usize) {
    if !s.starts_with('(') {
        return (s.trim().to_owned(), s.len());
    }

    // Balanced scan, same shape as bracket parsing elsewhere.
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return (s[1..i].to_owned(), i + 1);
                }
            }
            _ => {}
        }
    }

    // Unbalanced group: treat the rest of the line as the argument.
    (s.trim().to_owned(), s.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::{DirectiveEffect, DirectiveSpec, SingleDirective};
    use crate::error::PrepError;
    use crate::expand::DirectiveScope;
    use crate::reader::LineReader;

    struct StubDirective(&'static str);

    impl SingleDirective for StubDirective {
        fn tag(&self) -> &str {
            self.0
        }

        fn expand(
            &self,
            _arg: &str,
            _scope: &mut DirectiveScope<'_>,
        ) -> Result<DirectiveEffect, PrepError> {
            Ok(DirectiveEffect::None)
        }
    }

    fn registry_with_floating() -> DirectiveRegistry {
        let mut registry = DirectiveRegistry::with_builtins();
        registry
            .register(DirectiveSpec::single(StubDirective("mark")).floating())
            .unwrap();
        registry
    }

    fn line(text: &str) -> LogicalLine {
        LineReader::new("test.txt", text, '#')
            .next()
            .expect("one line")
    }

    fn recognize(registry: &DirectiveRegistry, text: &str) -> Vec<Recognized> {
        Recognizer::new(registry, '#').recognize(&line(text))
    }

    #[test]
    fn test_anchored_directive() {
        let registry = DirectiveRegistry::with_builtins();
        let items = recognize(&registry, "#define X 1");
        assert_eq!(items, vec![Recognized::Anchored {
            tag: "define".to_owned(),
            arg: "X 1".to_owned(),
        }]);
    }

    #[test]
    fn test_anchored_with_leading_whitespace() {
        let registry = DirectiveRegistry::with_builtins();
        let items = recognize(&registry, "   #endif");
        assert_eq!(items, vec![Recognized::Anchored {
            tag: "endif".to_owned(),
            arg: String::new(),
        }]);
    }

    #[test]
    fn test_unknown_tag_is_content() {
        let registry = DirectiveRegistry::with_builtins();
        let items = recognize(&registry, "#pragma once");
        assert_eq!(
            items,
            vec![Recognized::Content("#pragma once".to_owned())]
        );
    }

    #[test]
    fn test_plain_content() {
        let registry = DirectiveRegistry::with_builtins();
        let items = recognize(&registry, "int x = 3; // #comment-ish");
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Recognized::Content(_)));
    }

    #[test]
    fn test_floating_directive_splits_line() {
        let registry = registry_with_floating();
        let items = recognize(&registry, "left #mark(A) right");
        assert_eq!(items, vec![Recognized::Floating {
            tag: "mark".to_owned(),
            arg: "A".to_owned(),
            before: "left ".to_owned(),
            after: " right".to_owned(),
        }]);
    }

    #[test]
    fn test_floating_without_parens_takes_rest() {
        let registry = registry_with_floating();
        let items = recognize(&registry, "left #mark rest of line");
        assert_eq!(items, vec![Recognized::Floating {
            tag: "mark".to_owned(),
            arg: "rest of line".to_owned(),
            before: "left ".to_owned(),
            after: String::new(),
        }]);
    }

    #[test]
    fn test_multiple_floating_fragments() {
        let registry = registry_with_floating();
        let items = recognize(&registry, "a #mark(1) b #mark(2) c");
        assert_eq!(items, vec![
            Recognized::Floating {
                tag: "mark".to_owned(),
                arg: "1".to_owned(),
                before: "a ".to_owned(),
                after: String::new(),
            },
            Recognized::Floating {
                tag: "mark".to_owned(),
                arg: "2".to_owned(),
                before: " b ".to_owned(),
                after: " c".to_owned(),
            },
        ]);
    }

    #[test]
    fn test_non_floating_tag_stays_content() {
        // `define` is registered but not floating-enabled.
        let registry = DirectiveRegistry::with_builtins();
        let items = recognize(&registry, "text #define X text");
        assert_eq!(
            items,
            vec![Recognized::Content("text #define X text".to_owned())]
        );
    }

    #[test]
    fn test_anchor_wins_over_floating() {
        let registry = registry_with_floating();
        // Anchorable as `define`; the floating `#mark` must not run.
        let items = recognize(&registry, "#define X #mark(1)");
        assert_eq!(items, vec![Recognized::Anchored {
            tag: "define".to_owned(),
            arg: "X #mark(1)".to_owned(),
        }]);
    }

    #[test]
    fn test_anchored_unknown_still_floats() {
        let registry = registry_with_floating();
        let items = recognize(&registry, "#pragma #mark(1)");
        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], Recognized::Floating { before, .. } if before == "#pragma "));
    }

    #[test]
    fn test_nested_parens_in_floating_arg() {
        let registry = registry_with_floating();
        let items = recognize(&registry, "x #mark((a + b) * 2) y");
        assert!(
            matches!(&items[0], Recognized::Floating { arg, .. } if arg == "(a + b) * 2")
        );
    }
}
