//! Expression evaluation.
//!
//! A closed mini-language (integers, strings, booleans, lists,
//! identifiers, arithmetic, comparisons, `and`/`or`/`not`, `in`,
//! `range(...)`, `defined(...)`) evaluated against a context. There is
//! deliberately no host-language escape hatch.
//!
//! Identifiers resolve lazily: the binding's text is parsed and evaluated
//! at the point of use, in the context active there. Resolution depth is
//! capped so mutually-recursive defines surface as
//! [`PrepError::SubstitutionLoop`] instead of hanging.

mod lexer;
mod parser;
mod value;

pub use value::Value;

pub(crate) use parser::{BinaryOp, Expr, UnaryOp, parse};

use crate::context::{Binding, ContextArena, ContextId};
use crate::error::{Origin, PrepError};

/// Evaluates expressions against one context.
pub struct Evaluator<'a> {
    scopes: &'a ContextArena,
    ctx: ContextId,
    limit: usize,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator for the given context with the given identifier
    /// resolution depth limit.
    #[must_use]
    pub fn new(scopes: &'a ContextArena, ctx: ContextId, limit: usize) -> Self {
        Self { scopes, ctx, limit }
    }

    /// Parse and evaluate an expression source string.
    pub fn eval_text(&self, src: &str, origin: &Origin) -> Result<Value, PrepError> {
        let expr = parse(src, origin)?;
        self.eval(&expr, origin, 0)
    }

    /// Resolve an identifier to a value.
    ///
    /// Text bindings are parsed as expressions; text that does not parse
    /// stands as a string value, so plain text defines remain usable.
    pub fn resolve_ident(&self, name: &str, origin: &Origin) -> Result<Value, PrepError> {
        self.resolve(name, origin, 0)
    }

    fn resolve(&self, name: &str, origin: &Origin, depth: usize) -> Result<Value, PrepError> {
        if depth >= self.limit {
            return Err(PrepError::SubstitutionLoop {
                origin: origin.clone(),
                limit: self.limit,
            });
        }
        match self.scopes.lookup(self.ctx, name) {
            None => Err(PrepError::UndefinedIdentifier {
                origin: origin.clone(),
                name: name.to_owned(),
            }),
            Some(Binding::Empty) => Ok(Value::Str(String::new())),
            Some(Binding::Scalar(value)) => Ok(value.clone()),
            Some(Binding::Text(text)) => match parse(text, origin) {
                Err(_) => Ok(Value::Str(text.clone())),
                // A bare word stands for itself unless it is defined, so
                // symbolic text defines (`define MODE fast`) stay usable.
                Ok(Expr::Ident(inner)) => {
                    if self.scopes.is_defined(self.ctx, &inner) {
                        self.resolve(&inner, origin, depth + 1)
                    } else {
                        Ok(Value::Str(text.clone()))
                    }
                }
                Ok(expr) => self.eval(&expr, origin, depth + 1),
            },
        }
    }

    fn eval(&self, expr: &Expr, origin: &Origin, depth: usize) -> Result<Value, PrepError> {
        if depth >= self.limit {
            return Err(PrepError::SubstitutionLoop {
                origin: origin.clone(),
                limit: self.limit,
            });
        }
        match expr {
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Ident(name) => self.resolve(name, origin, depth),
            Expr::Defined(name) => Ok(Value::Bool(self.scopes.is_defined(self.ctx, name))),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, origin, depth)?);
                }
                Ok(Value::List(values))
            }
            Expr::Range(args) => self.eval_range(args, origin, depth),
            Expr::Unary { op, expr } => {
                let value = self.eval(expr, origin, depth)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
                    UnaryOp::Neg => match value {
                        Value::Int(n) => Ok(Value::Int(-n)),
                        other => Err(self.type_mismatch(
                            origin,
                            format!("cannot negate {}", other.type_name()),
                        )),
                    },
                }
            }
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, origin, depth),
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        origin: &Origin,
        depth: usize,
    ) -> Result<Value, PrepError> {
        // `and`/`or` short-circuit on truthiness.
        if op == BinaryOp::And {
            let left = self.eval(lhs, origin, depth)?;
            if !left.truthy() {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(self.eval(rhs, origin, depth)?.truthy()));
        }
        if op == BinaryOp::Or {
            let left = self.eval(lhs, origin, depth)?;
            if left.truthy() {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(self.eval(rhs, origin, depth)?.truthy()));
        }

        let left = self.eval(lhs, origin, depth)?;
        let right = self.eval(rhs, origin, depth)?;

        match op {
            BinaryOp::Add => match (left, right) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
                (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
                (a, b) => Err(self.type_mismatch(
                    origin,
                    format!("cannot add {} and {}", a.type_name(), b.type_name()),
                )),
            },
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                let (Value::Int(a), Value::Int(b)) = (&left, &right) else {
                    return Err(self.type_mismatch(
                        origin,
                        format!(
                            "arithmetic needs integers, got {} and {}",
                            left.type_name(),
                            right.type_name()
                        ),
                    ));
                };
                let (a, b) = (*a, *b);
                match op {
                    BinaryOp::Sub => Ok(Value::Int(a - b)),
                    BinaryOp::Mul => Ok(Value::Int(a * b)),
                    BinaryOp::Div => {
                        if b == 0 {
                            Err(self.type_mismatch(origin, "division by zero"))
                        } else {
                            Ok(Value::Int(a / b))
                        }
                    }
                    BinaryOp::Rem => {
                        if b == 0 {
                            Err(self.type_mismatch(origin, "modulo by zero"))
                        } else {
                            Ok(Value::Int(a % b))
                        }
                    }
                    _ => unreachable!("arithmetic op"),
                }
            }
            BinaryOp::Eq => Ok(Value::Bool(left == right)),
            BinaryOp::Ne => Ok(Value::Bool(left != right)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = match (&left, &right) {
                    (Value::Int(a), Value::Int(b)) => a.cmp(b),
                    (Value::Str(a), Value::Str(b)) => a.cmp(b),
                    (a, b) => {
                        return Err(self.type_mismatch(
                            origin,
                            format!(
                                "cannot order {} and {}",
                                a.type_name(),
                                b.type_name()
                            ),
                        ));
                    }
                };
                let result = match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    BinaryOp::Ge => ordering.is_ge(),
                    _ => unreachable!("ordering op"),
                };
                Ok(Value::Bool(result))
            }
            BinaryOp::In => match (&left, &right) {
                (needle, Value::List(items)) => Ok(Value::Bool(items.contains(needle))),
                (Value::Str(needle), Value::Str(haystack)) => {
                    Ok(Value::Bool(haystack.contains(needle.as_str())))
                }
                (a, b) => Err(self.type_mismatch(
                    origin,
                    format!(
                        "`in` needs a list or string on the right, got {} in {}",
                        a.type_name(),
                        b.type_name()
                    ),
                )),
            },
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }

    fn eval_range(
        &self,
        args: &[Expr],
        origin: &Origin,
        depth: usize,
    ) -> Result<Value, PrepError> {
        let mut ints = Vec::with_capacity(args.len());
        for arg in args {
            match self.eval(arg, origin, depth)? {
                Value::Int(n) => ints.push(n),
                other => {
                    return Err(self.type_mismatch(
                        origin,
                        format!("`range` needs integers, got {}", other.type_name()),
                    ));
                }
            }
        }
        let (start, stop, step) = match ints.as_slice() {
            [stop] => (0, *stop, 1),
            [start, stop] => (*start, *stop, 1),
            [start, stop, step] => (*start, *stop, *step),
            _ => unreachable!("arity checked by the parser"),
        };
        if step == 0 {
            return Err(self.type_mismatch(origin, "`range` step must not be zero"));
        }

        let mut items = Vec::new();
        let mut current = start;
        while (step > 0 && current < stop) || (step < 0 && current > stop) {
            items.push(Value::Int(current));
            current += step;
        }
        Ok(Value::List(items))
    }

    fn type_mismatch(&self, origin: &Origin, message: impl Into<String>) -> PrepError {
        PrepError::TypeMismatch {
            origin: origin.clone(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Origin {
        Origin::new("test", 1)
    }

    fn eval_with(arena: &ContextArena, ctx: ContextId, src: &str) -> Result<Value, PrepError> {
        Evaluator::new(arena, ctx, 32).eval_text(src, &origin())
    }

    fn eval(src: &str) -> Result<Value, PrepError> {
        let mut arena = ContextArena::new();
        let root = arena.root();
        eval_with(&arena, root, src)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::Int(7));
        assert_eq!(eval("(1 + 2) * 3").unwrap(), Value::Int(9));
        assert_eq!(eval("7 / 2").unwrap(), Value::Int(3));
        assert_eq!(eval("7 % 2").unwrap(), Value::Int(1));
        assert_eq!(eval("-4 + 1").unwrap(), Value::Int(-3));
    }

    #[test]
    fn test_division_by_zero() {
        let err = eval("1 / 0").unwrap_err();
        assert!(matches!(err, PrepError::TypeMismatch { .. }));
        let err = eval("1 % 0").unwrap_err();
        assert!(matches!(err, PrepError::TypeMismatch { .. }));
    }

    #[test]
    fn test_string_concat_and_compare() {
        assert_eq!(
            eval(r#""foo" + "bar""#).unwrap(),
            Value::Str("foobar".to_owned())
        );
        assert_eq!(eval(r#""abc" < "abd""#).unwrap(), Value::Bool(true));
        assert_eq!(eval(r#""a" == "a""#).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_logic_short_circuit() {
        // The right side would fail on resolution; `and` must not reach it.
        assert_eq!(eval("false and MISSING").unwrap(), Value::Bool(false));
        assert_eq!(eval("true or MISSING").unwrap(), Value::Bool(true));
        assert_eq!(eval("not 0").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_equality_across_types_is_false() {
        assert_eq!(eval(r#"1 == "1""#).unwrap(), Value::Bool(false));
        assert_eq!(eval(r#"1 != "1""#).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_ordering_across_types_fails() {
        let err = eval(r#"1 < "2""#).unwrap_err();
        assert!(matches!(err, PrepError::TypeMismatch { .. }));
    }

    #[test]
    fn test_range() {
        assert_eq!(
            eval("range(3)").unwrap(),
            Value::List(vec![Value::Int(0), Value::Int(1), Value::Int(2)])
        );
        assert_eq!(
            eval("range(2, 5)").unwrap(),
            Value::List(vec![Value::Int(2), Value::Int(3), Value::Int(4)])
        );
        assert_eq!(
            eval("range(5, 0, -2)").unwrap(),
            Value::List(vec![Value::Int(5), Value::Int(3), Value::Int(1)])
        );
        assert_eq!(eval("range(0)").unwrap(), Value::List(Vec::new()));
        assert!(eval("range(1, 2, 0)").is_err());
    }

    #[test]
    fn test_membership() {
        assert_eq!(eval("2 in [1, 2, 3]").unwrap(), Value::Bool(true));
        assert_eq!(eval("5 in [1, 2, 3]").unwrap(), Value::Bool(false));
        assert_eq!(eval(r#""el" in "hello""#).unwrap(), Value::Bool(true));
        assert!(eval("1 in 2").is_err());
    }

    #[test]
    fn test_identifier_resolution() {
        let mut arena = ContextArena::new();
        let root = arena.root();
        arena.define(root, "A", Binding::Text("1".to_owned()));
        arena.define(root, "B", Binding::Text("A + 1".to_owned()));

        assert_eq!(eval_with(&arena, root, "B * 2").unwrap(), Value::Int(4));
    }

    #[test]
    fn test_text_binding_that_is_not_an_expression() {
        let mut arena = ContextArena::new();
        let root = arena.root();
        arena.define(root, "NAME", Binding::Text("hello world".to_owned()));

        assert_eq!(
            eval_with(&arena, root, "NAME").unwrap(),
            Value::Str("hello world".to_owned())
        );
    }

    #[test]
    fn test_bare_word_binding_is_its_own_text() {
        let mut arena = ContextArena::new();
        let root = arena.root();
        arena.define(root, "MODE", Binding::Text("fast".to_owned()));

        assert_eq!(
            eval_with(&arena, root, r#"MODE == "fast""#).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_bare_word_binding_chains_through_defines() {
        let mut arena = ContextArena::new();
        let root = arena.root();
        arena.define(root, "ALIAS", Binding::Text("REAL".to_owned()));
        arena.define(root, "REAL", Binding::Text("42".to_owned()));

        assert_eq!(eval_with(&arena, root, "ALIAS").unwrap(), Value::Int(42));
    }

    #[test]
    fn test_undefined_identifier() {
        let err = eval("MISSING + 1").unwrap_err();
        assert!(matches!(err, PrepError::UndefinedIdentifier { .. }));
    }

    #[test]
    fn test_defined_guard() {
        let mut arena = ContextArena::new();
        let root = arena.root();
        arena.define(root, "FLAG", Binding::Empty);

        assert_eq!(
            eval_with(&arena, root, "defined(FLAG)").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval_with(&arena, root, "defined(OTHER)").unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            eval_with(&arena, root, "defined(OTHER) and OTHER > 2").unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_substitution_loop_detected() {
        let mut arena = ContextArena::new();
        let root = arena.root();
        arena.define(root, "A", Binding::Text("B".to_owned()));
        arena.define(root, "B", Binding::Text("A".to_owned()));

        let err = eval_with(&arena, root, "A").unwrap_err();
        assert!(matches!(err, PrepError::SubstitutionLoop { .. }));
    }

    #[test]
    fn test_empty_binding_is_empty_string() {
        let mut arena = ContextArena::new();
        let root = arena.root();
        arena.define(root, "FLAG", Binding::Empty);

        assert_eq!(
            eval_with(&arena, root, "FLAG").unwrap(),
            Value::Str(String::new())
        );
    }

    #[test]
    fn test_scalar_binding() {
        let mut arena = ContextArena::new();
        let root = arena.root();
        arena.define(root, "x", Binding::Scalar(Value::Int(4)));

        assert_eq!(eval_with(&arena, root, "x * x").unwrap(), Value::Int(16));
    }
}
