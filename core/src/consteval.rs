//! Compile-time constant folding, run during type checking whenever a
//! `CONSTANT` declaration (or an enum member, valued as its ordinal) is
//! processed. Shares its arithmetic with [crate::numeric] and
//! [crate::value] so a constant and the same expression computed at run
//! time can never disagree.

use crate::ast::{BinOp, Expr, UnOp};
use crate::date::Date;
use crate::error::{PrResult, PrescribeError};
use crate::numeric;
use crate::util::Spanned;
use crate::value::Value;
use std::collections::HashMap;

/// Constants and enum members bound so far, in declaration order. The
/// evaluator only ever reads from this — it never observes mutable
/// program state, per `spec.md` §4.3.
#[derive(Default)]
pub struct ConstEnv {
    bindings: HashMap<String, Value>,
}

impl ConstEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

pub fn eval_const(expr: &Spanned<Expr>, env: &ConstEnv) -> PrResult<Value> {
    let line = expr.span.start_line;
    match &expr.value {
        Expr::IntLit(n) => Ok(Value::Integer(*n)),
        Expr::RealLit(x) => Ok(Value::Real(*x)),
        Expr::BoolLit(b) => Ok(Value::Boolean(*b)),
        Expr::CharLit(c) => Ok(Value::Char(*c)),
        Expr::StrLit(s) => Ok(Value::String(s.clone())),
        Expr::DateLit(s) => Ok(Value::Date(Date::parse(line, s)?)),
        Expr::Null => Ok(Value::Pointer(None)),
        Expr::Name(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| PrescribeError::name(line, format!("`{}` is not a known constant", name))),
        Expr::Unary { op, operand } => eval_unary(line, *op, eval_const(operand, env)?),
        Expr::Binary { op, lhs, rhs } => {
            eval_binary(line, *op, eval_const(lhs, env)?, eval_const(rhs, env)?)
        }
        _ => Err(PrescribeError::syntax(
            line,
            "expression is not a valid compile-time constant",
        )),
    }
}

fn eval_unary(line: usize, op: UnOp, v: Value) -> PrResult<Value> {
    match (op, v) {
        (UnOp::Plus, Value::Integer(n)) => Ok(Value::Integer(n)),
        (UnOp::Plus, Value::Real(x)) => Ok(Value::Real(x)),
        (UnOp::Neg, Value::Integer(n)) => Ok(Value::Integer(numeric::neg_i32(line, n)?)),
        (UnOp::Neg, Value::Real(x)) => Ok(Value::Real(numeric::neg_real(line, x)?)),
        (UnOp::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
        (op, v) => Err(PrescribeError::type_error(
            line,
            format!("operator {:?} is not defined for a {}", op, v.type_name()),
        )),
    }
}

fn eval_binary(line: usize, op: BinOp, l: Value, r: Value) -> PrResult<Value> {
    use Value::*;
    match (op, l, r) {
        (BinOp::Add, Integer(a), Integer(b)) => Ok(Integer(numeric::add_i32(line, a, b)?)),
        (BinOp::Add, Real(a), Real(b)) => Ok(Real(numeric::add_real(line, a, b)?)),
        (BinOp::Sub, Integer(a), Integer(b)) => Ok(Integer(numeric::sub_i32(line, a, b)?)),
        (BinOp::Sub, Real(a), Real(b)) => Ok(Real(numeric::sub_real(line, a, b)?)),
        (BinOp::Mul, Integer(a), Integer(b)) => Ok(Integer(numeric::mul_i32(line, a, b)?)),
        (BinOp::Mul, Real(a), Real(b)) => Ok(Real(numeric::mul_real(line, a, b)?)),
        (BinOp::Div, Integer(a), Integer(b)) => {
            Ok(Real(numeric::div_real(line, a as f64, b as f64)?))
        }
        (BinOp::Div, Real(a), Real(b)) => Ok(Real(numeric::div_real(line, a, b)?)),
        (BinOp::IDiv, Integer(a), Integer(b)) => Ok(Integer(numeric::euclid_div_mod(line, a, b)?.0)),
        (BinOp::Mod, Integer(a), Integer(b)) => Ok(Integer(numeric::euclid_div_mod(line, a, b)?.1)),
        (BinOp::Concat, a, b) => Ok(String(format!("{}{}", scalar_text(&a), scalar_text(&b)))),
        (BinOp::And, Boolean(a), Boolean(b)) => Ok(Boolean(a && b)),
        (BinOp::Or, Boolean(a), Boolean(b)) => Ok(Boolean(a || b)),
        (BinOp::Eq, a, b) => Ok(Boolean(a == b)),
        (BinOp::Ne, a, b) => Ok(Boolean(a != b)),
        (BinOp::Lt, a, b) => compare(line, a, b, |o| o == std::cmp::Ordering::Less),
        (BinOp::Le, a, b) => compare(line, a, b, |o| o != std::cmp::Ordering::Greater),
        (BinOp::Gt, a, b) => compare(line, a, b, |o| o == std::cmp::Ordering::Greater),
        (BinOp::Ge, a, b) => compare(line, a, b, |o| o != std::cmp::Ordering::Less),
        (op, a, b) => Err(PrescribeError::type_error(
            line,
            format!("operator {:?} is not defined for {} and {}", op, a.type_name(), b.type_name()),
        )),
    }
}

fn scalar_text(v: &Value) -> String {
    v.to_output_string().unwrap_or_default()
}

fn compare(
    line: usize,
    a: Value,
    b: Value,
    pred: impl Fn(std::cmp::Ordering) -> bool,
) -> PrResult<Value> {
    use Value::*;
    let ord = match (&a, &b) {
        (Integer(x), Integer(y)) => x.cmp(y),
        (Real(x), Real(y)) => x
            .partial_cmp(y)
            .ok_or_else(|| PrescribeError::runtime(line, "cannot compare NaN"))?,
        (Char(x), Char(y)) => x.cmp(y),
        (String(x), String(y)) => x.cmp(y),
        (Date(x), Date(y)) => x.cmp(y),
        _ => {
            return Err(PrescribeError::type_error(
                line,
                format!("{} and {} are not ordered", a.type_name(), b.type_name()),
            ))
        }
    };
    Ok(Boolean(pred(ord)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Span;

    fn sp(e: Expr) -> Spanned<Expr> {
        Spanned::new(e, Span::at_line(1))
    }

    #[test]
    fn test_literal_folds() {
        let env = ConstEnv::new();
        assert_eq!(eval_const(&sp(Expr::IntLit(42)), &env).unwrap(), Value::Integer(42));
    }

    #[test]
    fn test_name_resolves_to_bound_constant() {
        let mut env = ConstEnv::new();
        env.define("Pi", Value::Real(3.14));
        assert_eq!(eval_const(&sp(Expr::Name("Pi".into())), &env).unwrap(), Value::Real(3.14));
    }

    #[test]
    fn test_undefined_name_is_name_error() {
        let env = ConstEnv::new();
        let err = eval_const(&sp(Expr::Name("Nope".into())), &env).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::NameError);
    }

    #[test]
    fn test_arithmetic_folding() {
        let env = ConstEnv::new();
        let expr = sp(Expr::Binary {
            op: BinOp::Add,
            lhs: Box::new(sp(Expr::IntLit(2))),
            rhs: Box::new(sp(Expr::IntLit(3))),
        });
        assert_eq!(eval_const(&expr, &env).unwrap(), Value::Integer(5));
    }

    #[test]
    fn test_overflow_is_range_error() {
        let env = ConstEnv::new();
        let expr = sp(Expr::Binary {
            op: BinOp::Add,
            lhs: Box::new(sp(Expr::IntLit(i32::MAX))),
            rhs: Box::new(sp(Expr::IntLit(1))),
        });
        let err = eval_const(&expr, &env).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::RangeError);
    }

    #[test]
    fn test_non_constant_expression_rejected() {
        let env = ConstEnv::new();
        let expr = sp(Expr::Call {
            callee: Box::new(sp(Expr::Name("F".into()))),
            args: vec![],
        });
        assert!(eval_const(&expr, &env).is_err());
    }
}
