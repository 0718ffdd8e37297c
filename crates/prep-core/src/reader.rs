//! Logical line reading.
//!
//! Joins physical lines whose final character is a backslash into one
//! logical line and records where each logical line started. A backslash
//! dangling at end of input is not an error; the caller is expected to
//! warn and the backslash stays in the text.

use std::sync::Arc;

use crate::error::Origin;

/// One logical (continuation-joined) input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// Joined text, without line terminators.
    pub text: String,
    /// File and number of the first physical line.
    pub origin: Origin,
    /// Whether the line starts (after leading whitespace) with the
    /// directive prefix character.
    pub anchored: bool,
}

/// Lazily yields [`LogicalLine`]s from a source string.
pub struct LineReader<'s> {
    file: Arc<str>,
    prefix: char,
    lines: std::str::Lines<'s>,
    next_line: u32,
    dangling: Option<Origin>,
}

impl<'s> LineReader<'s> {
    /// Create a reader over `contents`, labelled with the logical file
    /// name `file`. `prefix` is the directive prefix character used for
    /// the anchoring hint.
    #[must_use]
    pub fn new(file: impl Into<Arc<str>>, contents: &'s str, prefix: char) -> Self {
        Self {
            file: file.into(),
            prefix,
            lines: contents.lines(),
            next_line: 1,
            dangling: None,
        }
    }

    /// Where a backslash was left dangling at end of input, if anywhere.
    /// Only meaningful once the reader is exhausted.
    #[must_use]
    pub fn dangling_continuation(&self) -> Option<&Origin> {
        self.dangling.as_ref()
    }

    fn take_line(&mut self) -> Option<(&'s str, u32)> {
        let raw = self.lines.next()?;
        let number = self.next_line;
        self.next_line += 1;
        // `str::lines` strips `\n` but leaves the `\r` of CRLF endings.
        Some((raw.strip_suffix('\r').unwrap_or(raw), number))
    }
}

impl Iterator for LineReader<'_> {
    type Item = LogicalLine;

    fn next(&mut self) -> Option<LogicalLine> {
        let (first, start) = self.take_line()?;
        let mut text = first.to_owned();
        let mut last_physical = start;

        while text.ends_with('\\') {
            match self.take_line() {
                Some((continuation, number)) => {
                    text.pop();
                    text.push_str(continuation);
                    last_physical = number;
                }
                None => {
                    // Dangling continuation at end of input: keep the
                    // backslash, remember where it was.
                    self.dangling = Some(Origin {
                        file: Arc::clone(&self.file),
                        line: last_physical,
                    });
                    break;
                }
            }
        }

        let anchored = text.trim_start().starts_with(self.prefix);
        Some(LogicalLine {
            text,
            origin: Origin {
                file: Arc::clone(&self.file),
                line: start,
            },
            anchored,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(contents: &str) -> Vec<LogicalLine> {
        LineReader::new("test.txt", contents, '#').collect()
    }

    #[test]
    fn test_plain_lines() {
        let lines = read_all("one\ntwo\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "one");
        assert_eq!(lines[0].origin.line, 1);
        assert_eq!(lines[1].text, "two");
        assert_eq!(lines[1].origin.line, 2);
    }

    #[test]
    fn test_continuation_joins() {
        let lines = read_all("line one \\\nline two\nnext\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "line one line two");
        assert_eq!(lines[0].origin.line, 1);
        assert_eq!(lines[1].text, "next");
        assert_eq!(lines[1].origin.line, 3);
    }

    #[test]
    fn test_continuation_chains() {
        let lines = read_all("a\\\nb\\\nc\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "abc");
    }

    #[test]
    fn test_backslash_then_whitespace_is_not_continuation() {
        let lines = read_all("kept \\ \nnext\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "kept \\ ");
    }

    #[test]
    fn test_dangling_backslash_preserved() {
        let mut reader = LineReader::new("test.txt", "ends here\\", '#');
        let lines: Vec<_> = reader.by_ref().collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "ends here\\");

        let dangling = reader.dangling_continuation().unwrap();
        assert_eq!(dangling.line, 1);
    }

    #[test]
    fn test_dangling_reports_last_physical_line() {
        let mut reader = LineReader::new("test.txt", "a\\\nb\\", '#');
        let lines: Vec<_> = reader.by_ref().collect();
        assert_eq!(lines[0].text, "ab\\");
        assert_eq!(reader.dangling_continuation().unwrap().line, 2);
    }

    #[test]
    fn test_anchoring_hint() {
        let lines = read_all("#define X\n  #if X\nplain\ntext # not anchored\n");
        assert!(lines[0].anchored);
        assert!(lines[1].anchored);
        assert!(!lines[2].anchored);
        assert!(!lines[3].anchored);
    }

    #[test]
    fn test_crlf_endings() {
        let lines = read_all("one\r\ntwo\\\r\nthree\r\n");
        assert_eq!(lines[0].text, "one");
        assert_eq!(lines[1].text, "twothree");
    }

    #[test]
    fn test_custom_prefix() {
        let lines: Vec<_> = LineReader::new("t", "%define X\n#not\n", '%').collect();
        assert!(lines[0].anchored);
        assert!(!lines[1].anchored);
    }
}
