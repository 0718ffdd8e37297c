//! Expression tokenizer.

use crate::error::{Origin, PrepError};

/// A lexical token with its starting column (0-indexed into the
/// expression text, for diagnostics).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub col: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Str(String),
    Ident(String),
    True,
    False,
    And,
    Or,
    Not,
    In,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl Token {
    /// Human-readable token description for error messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Int(n) => format!("`{n}`"),
            Self::Str(_) => "string literal".to_owned(),
            Self::Ident(name) => format!("`{name}`"),
            Self::True => "`true`".to_owned(),
            Self::False => "`false`".to_owned(),
            Self::And => "`and`".to_owned(),
            Self::Or => "`or`".to_owned(),
            Self::Not => "`not`".to_owned(),
            Self::In => "`in`".to_owned(),
            Self::Plus => "`+`".to_owned(),
            Self::Minus => "`-`".to_owned(),
            Self::Star => "`*`".to_owned(),
            Self::Slash => "`/`".to_owned(),
            Self::Percent => "`%`".to_owned(),
            Self::EqEq => "`==`".to_owned(),
            Self::NotEq => "`!=`".to_owned(),
            Self::Lt => "`<`".to_owned(),
            Self::LtEq => "`<=`".to_owned(),
            Self::Gt => "`>`".to_owned(),
            Self::GtEq => "`>=`".to_owned(),
            Self::LParen => "`(`".to_owned(),
            Self::RParen => "`)`".to_owned(),
            Self::LBracket => "`[`".to_owned(),
            Self::RBracket => "`]`".to_owned(),
            Self::Comma => "`,`".to_owned(),
        }
    }
}

fn syntax(origin: &Origin, message: impl Into<String>) -> PrepError {
    PrepError::ExpressionSyntax {
        origin: origin.clone(),
        message: message.into(),
    }
}

/// Tokenize an expression.
pub(crate) fn tokenize(src: &str, origin: &Origin) -> Result<Vec<Spanned>, PrepError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        let c = src[pos..].chars().next().unwrap_or('\0');

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        if !c.is_ascii() {
            return Err(syntax(
                origin,
                format!("unexpected character `{c}` in expression"),
            ));
        }

        let token = if c.is_ascii_digit() {
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            let digits = &src[start..pos];
            let n = digits
                .parse::<i64>()
                .map_err(|_| syntax(origin, format!("integer literal `{digits}` out of range")))?;
            Token::Int(n)
        } else if c.is_ascii_alphabetic() || c == '_' {
            while pos < bytes.len()
                && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
            {
                pos += 1;
            }
            match &src[start..pos] {
                "true" => Token::True,
                "false" => Token::False,
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "in" => Token::In,
                word => Token::Ident(word.to_owned()),
            }
        } else if c == '"' || c == '\'' {
            pos += 1;
            let mut text = String::new();
            loop {
                match bytes.get(pos).copied().map(char::from) {
                    None => return Err(syntax(origin, "unterminated string literal")),
                    Some(q) if q == c => {
                        pos += 1;
                        break;
                    }
                    Some('\\') => {
                        // Backslash escapes the next character verbatim.
                        pos += 1;
                        match src[pos..].chars().next() {
                            None => return Err(syntax(origin, "unterminated string literal")),
                            Some(escaped) => {
                                text.push(match escaped {
                                    'n' => '\n',
                                    't' => '\t',
                                    other => other,
                                });
                                pos += escaped.len_utf8();
                            }
                        }
                    }
                    Some(_) => {
                        // Keep multi-byte characters intact.
                        let rest = &src[pos..];
                        let ch = rest.chars().next().unwrap_or('\0');
                        text.push(ch);
                        pos += ch.len_utf8();
                    }
                }
            }
            Token::Str(text)
        } else {
            pos += 1;
            match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '%' => Token::Percent,
                '(' => Token::LParen,
                ')' => Token::RParen,
                '[' => Token::LBracket,
                ']' => Token::RBracket,
                ',' => Token::Comma,
                '=' if bytes.get(pos) == Some(&b'=') => {
                    pos += 1;
                    Token::EqEq
                }
                '!' if bytes.get(pos) == Some(&b'=') => {
                    pos += 1;
                    Token::NotEq
                }
                '<' if bytes.get(pos) == Some(&b'=') => {
                    pos += 1;
                    Token::LtEq
                }
                '<' => Token::Lt,
                '>' if bytes.get(pos) == Some(&b'=') => {
                    pos += 1;
                    Token::GtEq
                }
                '>' => Token::Gt,
                other => {
                    return Err(syntax(
                        origin,
                        format!("unexpected character `{other}` in expression"),
                    ));
                }
            }
        };

        tokens.push(Spanned { token, col: start });
    }

    Ok(tokens)
}
