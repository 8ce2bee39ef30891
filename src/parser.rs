use crate::error::EvalError;
use crate::lexer::{Spanned, Token};

/// Nesting limit for brackets, calls, prefix signs and powers. Operator chains are flat,
/// so this bounds the tree depth no matter what the input looks like.
pub const MAX_DEPTH: usize = 64;

/// AST node for an arithmetic expression.
///
/// The set of node kinds is closed: there is no way to express attribute access,
/// indexing, assignment or statements.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// A bare name used as a value (constant or variable).
    Name { name: String, pos: usize },
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// `first op operand op operand ...` at one precedence level, folded left to right.
    ///
    /// Kept flat so `1+1+1+...` costs no stack depth however long it gets.
    Chain {
        first: Box<Expr>,
        rest: Vec<(BinaryOp, Expr)>,
    },
    /// `base ** exponent`; right-associative, so nesting goes through the depth limit.
    Power { base: Box<Expr>, exponent: Box<Expr> },
    /// `name(args...)`; only builtin functions can be called.
    Call {
        name: String,
        args: Vec<Expr>,
        pos: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

struct AstBuilder {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    /// Position reported when the input ends too early.
    end: usize,
}

impl AstBuilder {
    fn from(tokens: Vec<Spanned>, end: usize) -> Self {
        AstBuilder {
            tokens,
            pos: 0,
            depth: 0,
            end,
        }
    }

    fn build_ast(mut self) -> Result<Expr, EvalError> {
        let ast = self.parse_expr()?;

        // Ensure we consumed all tokens
        if let Some(extra) = self.tokens.get(self.pos) {
            return Err(EvalError::SyntaxError(extra.pos));
        }

        Ok(ast)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn consume(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), EvalError> {
        match self.consume() {
            Some(spanned) if spanned.token == expected => Ok(()),
            Some(spanned) => Err(EvalError::SyntaxError(spanned.pos)),
            None => Err(EvalError::SyntaxError(self.end)),
        }
    }

    fn enter(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EvalError::TooDeep);
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Parse an expression: term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<Expr, EvalError> {
        self.enter()?;
        let first = self.parse_term()?;
        let mut rest = Vec::new();

        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(BinaryOp::Add),
            Some(Token::Minus) => Some(BinaryOp::Sub),
            _ => None,
        } {
            self.consume();
            rest.push((op, self.parse_term()?));
        }

        self.leave();
        Ok(chain(first, rest))
    }

    /// Parse a term: unary (('*' | '/' | '//' | '%') unary)*
    fn parse_term(&mut self) -> Result<Expr, EvalError> {
        let first = self.parse_unary()?;
        let mut rest = Vec::new();

        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(BinaryOp::Mul),
            Some(Token::Slash) => Some(BinaryOp::Div),
            Some(Token::DoubleSlash) => Some(BinaryOp::FloorDiv),
            Some(Token::Percent) => Some(BinaryOp::Mod),
            _ => None,
        } {
            self.consume();
            rest.push((op, self.parse_unary()?));
        }

        Ok(chain(first, rest))
    }

    /// Parse a unary: ('+' | '-') unary | power
    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        let op = match self.peek() {
            Some(Token::Plus) => UnaryOp::Plus,
            Some(Token::Minus) => UnaryOp::Neg,
            _ => return self.parse_power(),
        };
        self.consume();
        self.enter()?;
        let operand = self.parse_unary()?;
        self.leave();
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// Parse a power: primary ('**' unary)?
    ///
    /// The exponent is parsed as a unary, which makes `**` right-associative and lets
    /// `2 ** -1` work while `-2 ** 2` stays `-(2 ** 2)`.
    fn parse_power(&mut self) -> Result<Expr, EvalError> {
        let base = self.parse_primary()?;
        if let Some(Token::Power) = self.peek() {
            self.consume();
            self.enter()?;
            let exponent = self.parse_unary()?;
            self.leave();
            return Ok(Expr::Power {
                base: Box::new(base),
                exponent: Box::new(exponent),
            });
        }
        Ok(base)
    }

    /// Parse a primary: number | name | name '(' args ')' | '(' expr ')'
    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        match self.consume() {
            Some(Spanned {
                token: Token::Number(n),
                ..
            }) => Ok(Expr::Number(n)),
            Some(Spanned {
                token: Token::Ident(name),
                pos,
            }) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let args = self.parse_args()?;
                    Ok(Expr::Call { name, args, pos })
                } else {
                    Ok(Expr::Name { name, pos })
                }
            }
            Some(Spanned {
                token: Token::LParen,
                ..
            }) => {
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(spanned) => Err(EvalError::SyntaxError(spanned.pos)),
            None => Err(EvalError::SyntaxError(self.end)),
        }
    }

    /// Parse call arguments after the opening parenthesis: (expr (',' expr)*)? ')'
    fn parse_args(&mut self) -> Result<Vec<Expr>, EvalError> {
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            self.consume();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            match self.consume() {
                Some(Spanned {
                    token: Token::Comma,
                    ..
                }) => continue,
                Some(Spanned {
                    token: Token::RParen,
                    ..
                }) => return Ok(args),
                Some(spanned) => return Err(EvalError::SyntaxError(spanned.pos)),
                None => return Err(EvalError::SyntaxError(self.end)),
            }
        }
    }
}

fn chain(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    if rest.is_empty() {
        first
    } else {
        Expr::Chain {
            first: Box::new(first),
            rest,
        }
    }
}

/// Builds the AST for an already tokenized expression.
///
/// `end` is the character length of the source, used as the error position when the
/// expression stops in the middle (`2 +`).
pub fn construct_ast(tokens: Vec<Spanned>, end: usize) -> Result<Expr, EvalError> {
    let builder = AstBuilder::from(tokens, end);
    builder.build_ast()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::split_into_tokens;

    fn parse(s: &str) -> Result<Expr, EvalError> {
        construct_ast(split_into_tokens(s)?, s.chars().count())
    }

    fn num(n: f64) -> Box<Expr> {
        Box::new(Expr::Number(n))
    }

    #[test]
    fn test_precedence() {
        let ast = parse("2 + 3 * 4").unwrap();
        assert_eq!(
            ast,
            Expr::Chain {
                first: num(2.0),
                rest: vec![(
                    BinaryOp::Add,
                    Expr::Chain {
                        first: num(3.0),
                        rest: vec![(BinaryOp::Mul, Expr::Number(4.0))],
                    }
                )],
            }
        );
    }

    #[test]
    fn test_operator_chains_are_flat() {
        let ast = parse("8-4-2").unwrap();
        assert_eq!(
            ast,
            Expr::Chain {
                first: num(8.0),
                rest: vec![(BinaryOp::Sub, Expr::Number(4.0)), (BinaryOp::Sub, Expr::Number(2.0))],
            }
        );

        let long = format!("{}1", "1*".repeat(2000));
        let Ok(Expr::Chain { rest, .. }) = parse(&long) else {
            panic!("Expected Chain node");
        };
        assert_eq!(rest.len(), 2000);
    }

    #[test]
    fn test_power_is_right_associative_and_binds_tighter_than_neg() {
        let ast = parse("-2**3**2").unwrap();
        let Expr::Unary { op, operand } = ast else {
            panic!("Expected Unary node");
        };
        assert_eq!(op, UnaryOp::Neg);
        let Expr::Power { exponent, .. } = *operand else {
            panic!("Expected Power node");
        };
        assert!(matches!(*exponent, Expr::Power { .. }));
    }

    #[test]
    fn test_call_with_args() {
        let ast = parse("max(1, 2, 3)").unwrap();
        if let Expr::Call { name, args, pos } = ast {
            assert_eq!(name, "max");
            assert_eq!(args.len(), 3);
            assert_eq!(pos, 0);
        } else {
            panic!("Expected Call node");
        }
        assert!(matches!(parse("f()"), Ok(Expr::Call { ref args, .. }) if args.is_empty()));
    }

    #[test]
    fn test_syntax_error_positions() {
        assert_eq!(parse("2 +"), Err(EvalError::SyntaxError(3)));
        assert_eq!(parse("(1 + 2"), Err(EvalError::SyntaxError(6)));
        assert_eq!(parse("1 2"), Err(EvalError::SyntaxError(2)));
        assert_eq!(parse("* 2"), Err(EvalError::SyntaxError(0)));
        assert_eq!(parse("max(1,)"), Err(EvalError::SyntaxError(6)));
        assert_eq!(parse("max(1 2)"), Err(EvalError::SyntaxError(6)));
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert_eq!(parse(&deep), Err(EvalError::TooDeep));

        let signs = format!("{}1", "-".repeat(MAX_DEPTH + 1));
        assert_eq!(parse(&signs), Err(EvalError::TooDeep));

        let powers = format!("{}2", "2**".repeat(MAX_DEPTH + 1));
        assert_eq!(parse(&powers), Err(EvalError::TooDeep));

        let ok = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(parse(&ok), Ok(Expr::Number(1.0)));
    }
}
