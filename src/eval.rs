//! Closed-namespace arithmetic evaluation.
//!
//! An expression goes through [`lexer::split_into_tokens`], then [`parser::construct_ast`],
//! and the resulting tree is walked here. The only names that can be resolved are the
//! members of [`AllowedSymbols`] plus plain numeric variables. There is no fallback to any
//! wider interpreter: whatever the grammar cannot express is a parse error.

use crate::error::EvalError;
use crate::lexer;
use crate::parser::{self, BinaryOp, Expr, UnaryOp};
use crate::symbols::{self, AllowedSymbols, MAX_SAFE_NUMBER, Symbol};
use std::collections::BTreeMap;

/// Default cap on expression length, in characters.
pub const DEFAULT_MAX_EXPRESSION_LEN: usize = 1000;

/// User-assigned numeric values, e.g. after `x = 3`.
pub type Variables = BTreeMap<String, f64>;

/// Evaluates arithmetic expressions against a fixed symbol set.
///
/// Example
/// ```
/// use kidshell::eval::Evaluator;
/// let evaluator = Evaluator::default();
/// assert_eq!(evaluator.evaluate("2 + 2"), Ok(4.0));
/// assert_eq!(evaluator.evaluate("sqrt(16)"), Ok(4.0));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    symbols: &'static AllowedSymbols,
    max_len: usize,
}

impl Evaluator {
    pub fn new(symbols: &'static AllowedSymbols, max_len: usize) -> Self {
        Self { symbols, max_len }
    }

    /// Standard symbol set with a custom length bound.
    pub fn with_max_len(max_len: usize) -> Self {
        Self::new(AllowedSymbols::standard(), max_len)
    }

    /// Evaluate an expression that may only use the allowed symbols.
    pub fn evaluate(&self, expr: &str) -> Result<f64, EvalError> {
        self.evaluate_with(expr, &Variables::new())
    }

    /// Evaluate an expression that may also read the given variables.
    pub fn evaluate_with(&self, expr: &str, vars: &Variables) -> Result<f64, EvalError> {
        if expr.trim().is_empty() {
            return Err(EvalError::Empty);
        }
        let len = expr.chars().count();
        if len > self.max_len {
            return Err(EvalError::TooLong);
        }

        let tokens = lexer::split_into_tokens(expr)?;
        let ast = parser::construct_ast(tokens, len)?;
        self.eval_node(&ast, vars)
    }

    /// Whether `name` belongs to the closed symbol set.
    pub fn is_reserved(&self, name: &str) -> bool {
        self.symbols.contains(name)
    }

    pub fn symbols(&self) -> &'static AllowedSymbols {
        self.symbols
    }

    fn eval_node(&self, node: &Expr, vars: &Variables) -> Result<f64, EvalError> {
        let value = match node {
            Expr::Number(n) => *n,
            Expr::Name { name, pos } => match self.symbols.lookup(name) {
                Some(Symbol::Constant(c)) => c,
                // a function name without a call
                Some(Symbol::Function(_)) => return Err(EvalError::SyntaxError(*pos)),
                None => *vars
                    .get(name)
                    .ok_or_else(|| EvalError::UnknownSymbol(name.clone()))?,
            },
            Expr::Unary { op, operand } => {
                let v = self.eval_node(operand, vars)?;
                match op {
                    UnaryOp::Plus => v,
                    UnaryOp::Neg => -v,
                }
            }
            Expr::Chain { first, rest } => {
                let mut acc = self.eval_node(first, vars)?;
                for (op, operand) in rest {
                    let r = self.eval_node(operand, vars)?;
                    acc = check_bounds(apply_binary(*op, acc, r)?)?;
                }
                acc
            }
            Expr::Power { base, exponent } => {
                let b = self.eval_node(base, vars)?;
                let e = self.eval_node(exponent, vars)?;
                symbols::power(b, e)?
            }
            Expr::Call { name, args, pos } => match self.symbols.lookup(name) {
                Some(Symbol::Function(builtin)) => {
                    let arity = builtin.arity();
                    if !arity.accepts(args.len()) {
                        return Err(EvalError::WrongArity {
                            name: name.clone(),
                            expected: arity.to_string(),
                            found: args.len(),
                        });
                    }
                    let values = args
                        .iter()
                        .map(|arg| self.eval_node(arg, vars))
                        .collect::<Result<Vec<f64>, EvalError>>()?;
                    builtin.apply(&values)?
                }
                Some(Symbol::Constant(_)) => return Err(EvalError::SyntaxError(*pos)),
                None if vars.contains_key(name) => return Err(EvalError::SyntaxError(*pos)),
                None => return Err(EvalError::UnknownSymbol(name.clone())),
            },
        };
        check_bounds(value)
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::with_max_len(DEFAULT_MAX_EXPRESSION_LEN)
    }
}

fn apply_binary(op: BinaryOp, l: f64, r: f64) -> Result<f64, EvalError> {
    match op {
        BinaryOp::Add => Ok(l + r),
        BinaryOp::Sub => Ok(l - r),
        BinaryOp::Mul => Ok(l * r),
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if r == 0.0 => {
            Err(EvalError::DivisionByZero)
        }
        BinaryOp::Div => Ok(l / r),
        BinaryOp::FloorDiv => Ok((l / r).floor()),
        BinaryOp::Mod => {
            // sign follows the divisor: -7 % 3 == 2
            let m = l % r;
            if m != 0.0 && (m < 0.0) != (r < 0.0) {
                Ok(m + r)
            } else {
                Ok(m)
            }
        }
    }
}

fn check_bounds(value: f64) -> Result<f64, EvalError> {
    if !value.is_finite() || value.abs() > MAX_SAFE_NUMBER {
        return Err(EvalError::Overflow);
    }
    Ok(value)
}
