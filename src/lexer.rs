//! A module implementing lexical analysis (tokenization) for arithmetic expressions.
//!
//! The lexer only knows numbers, identifiers, the arithmetic operators, parentheses and
//! commas. Every other character is rejected on the spot with its position, so things like
//! attribute access (`a.b`), subscripts (`a[0]`), strings or statements never get past here.

use crate::error::EvalError;

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A numeric literal such as `42`, `3.5`, `.5` or `6.02e23`.
    Number(f64),
    /// A name: constant, function or variable. ASCII letters, digits and `_` only.
    Ident(String),
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `//` (floor division)
    DoubleSlash,
    /// `%`
    Percent,
    /// `**` or `^`
    Power,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `,`
    Comma,
}

/// A token together with the 0-based character position it started at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingInteger,
    ReadingFraction,
    ReadingExponent,
    ReadingIdent,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    buffer: String,
    token_start: usize,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            buffer: String::new(),
            token_start: 0,
        }
    }

    /// Runs the state machine over the whole input.
    ///
    /// Characters that end a number or an identifier are fed back into the start state,
    /// so `2*pi` and `2 * pi` produce the same tokens.
    fn make_tokens(&mut self) -> Result<Vec<Spanned>, EvalError> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start => self.handle_start(ch, &mut out)?,
                LexingState::ReadingInteger => self.handle_integer(ch, &mut out)?,
                LexingState::ReadingFraction => self.handle_fraction(ch, &mut out)?,
                LexingState::ReadingExponent => self.handle_exponent(ch, &mut out)?,
                LexingState::ReadingIdent => self.handle_ident(ch, &mut out)?,
            }
        }

        self.finalize_current_token(&mut out)?;
        Ok(out)
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_n(&self, n: usize) -> Option<char> {
        self.input.get(self.pos + n).copied()
    }

    /// Position of the character most recently returned by `read_char`.
    fn current_pos(&self) -> usize {
        self.pos.saturating_sub(1)
    }

    fn push(&self, token: Token, pos: usize, out: &mut Vec<Spanned>) {
        out.push(Spanned { token, pos });
    }

    fn handle_start(&mut self, ch: char, out: &mut Vec<Spanned>) -> Result<(), EvalError> {
        let pos = self.current_pos();
        match ch {
            ' ' | '\t' => {}
            '+' => self.push(Token::Plus, pos, out),
            '-' => self.push(Token::Minus, pos, out),
            '%' => self.push(Token::Percent, pos, out),
            '^' => self.push(Token::Power, pos, out),
            '(' => self.push(Token::LParen, pos, out),
            ')' => self.push(Token::RParen, pos, out),
            ',' => self.push(Token::Comma, pos, out),
            '*' => {
                if self.peek_char() == Some('*') {
                    self.read_char();
                    self.push(Token::Power, pos, out);
                } else {
                    self.push(Token::Star, pos, out);
                }
            }
            '/' => {
                if self.peek_char() == Some('/') {
                    self.read_char();
                    self.push(Token::DoubleSlash, pos, out);
                } else {
                    self.push(Token::Slash, pos, out);
                }
            }
            '.' => {
                // Only a leading-dot number like `.5`; anything else is attribute access.
                if self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                    self.begin(pos, ch, LexingState::ReadingFraction);
                } else {
                    return Err(EvalError::SyntaxError(pos));
                }
            }
            c if c.is_ascii_digit() => self.begin(pos, c, LexingState::ReadingInteger),
            c if c.is_ascii_alphabetic() || c == '_' => {
                self.begin(pos, c, LexingState::ReadingIdent)
            }
            _ => return Err(EvalError::SyntaxError(pos)),
        }
        Ok(())
    }

    fn begin(&mut self, pos: usize, ch: char, state: LexingState) {
        self.token_start = pos;
        self.buffer.push(ch);
        self.state = state;
    }

    fn handle_integer(&mut self, ch: char, out: &mut Vec<Spanned>) -> Result<(), EvalError> {
        match ch {
            c if c.is_ascii_digit() => self.buffer.push(c),
            '.' => {
                self.buffer.push('.');
                self.state = LexingState::ReadingFraction;
            }
            'e' | 'E' if self.exponent_follows() => self.start_exponent(ch),
            c => {
                self.finalize_current_token(out)?;
                self.handle_start(c, out)?;
            }
        }
        Ok(())
    }

    fn handle_fraction(&mut self, ch: char, out: &mut Vec<Spanned>) -> Result<(), EvalError> {
        match ch {
            c if c.is_ascii_digit() => self.buffer.push(c),
            // `1.2.3` or `1..2`
            '.' => return Err(EvalError::SyntaxError(self.current_pos())),
            'e' | 'E' if self.exponent_follows() => self.start_exponent(ch),
            c => {
                self.finalize_current_token(out)?;
                self.handle_start(c, out)?;
            }
        }
        Ok(())
    }

    fn handle_exponent(&mut self, ch: char, out: &mut Vec<Spanned>) -> Result<(), EvalError> {
        match ch {
            c if c.is_ascii_digit() => self.buffer.push(c),
            '.' => return Err(EvalError::SyntaxError(self.current_pos())),
            c => {
                self.finalize_current_token(out)?;
                self.handle_start(c, out)?;
            }
        }
        Ok(())
    }

    fn handle_ident(&mut self, ch: char, out: &mut Vec<Spanned>) -> Result<(), EvalError> {
        match ch {
            c if c.is_ascii_alphanumeric() || c == '_' => self.buffer.push(c),
            c => {
                self.finalize_current_token(out)?;
                self.handle_start(c, out)?;
            }
        }
        Ok(())
    }

    /// An `e` inside a number only starts an exponent when digits follow (`2e3`, `2e-3`);
    /// otherwise `2e` is the number 2 followed by the name `e`.
    fn exponent_follows(&self) -> bool {
        match self.peek_char() {
            Some(c) if c.is_ascii_digit() => true,
            Some('+') | Some('-') => self.peek_n(1).is_some_and(|c| c.is_ascii_digit()),
            _ => false,
        }
    }

    fn start_exponent(&mut self, ch: char) {
        self.buffer.push(ch);
        if let Some(sign @ ('+' | '-')) = self.peek_char() {
            self.read_char();
            self.buffer.push(sign);
        }
        self.state = LexingState::ReadingExponent;
    }

    /// Turns the buffered characters into a number or identifier token.
    fn finalize_current_token(&mut self, out: &mut Vec<Spanned>) -> Result<(), EvalError> {
        if self.buffer.is_empty() {
            self.state = LexingState::Start;
            return Ok(());
        }
        let text = std::mem::take(&mut self.buffer);
        let token = match self.state {
            LexingState::ReadingIdent => Token::Ident(text),
            _ => {
                let value: f64 = text
                    .parse()
                    .map_err(|_| EvalError::SyntaxError(self.token_start))?;
                Token::Number(value)
            }
        };
        self.push(token, self.token_start, out);
        self.state = LexingState::Start;
        Ok(())
    }
}

/// The main entry point function to perform lexical analysis.
///
/// # Returns
/// A vector of positioned tokens on success, or `EvalError::SyntaxError` with the position
/// of the first character the expression grammar does not allow.
pub fn split_into_tokens(line: &str) -> Result<Vec<Spanned>, EvalError> {
    let mut lexer = LexingFSM::new(line);
    lexer.make_tokens()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(s: &str) -> Vec<Token> {
        split_into_tokens(s)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_simple_sum() {
        assert_eq!(
            tokens("2 + 2"),
            vec![Token::Number(2.0), Token::Plus, Token::Number(2.0)]
        );
    }

    #[test]
    fn test_operators_without_spaces() {
        assert_eq!(
            tokens("2**3//4%5^6"),
            vec![
                Token::Number(2.0),
                Token::Power,
                Token::Number(3.0),
                Token::DoubleSlash,
                Token::Number(4.0),
                Token::Percent,
                Token::Number(5.0),
                Token::Power,
                Token::Number(6.0),
            ]
        );
    }

    #[test]
    fn test_call_tokens() {
        assert_eq!(
            tokens("sqrt(16)"),
            vec![
                Token::Ident("sqrt".to_string()),
                Token::LParen,
                Token::Number(16.0),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(tokens("3.25"), vec![Token::Number(3.25)]);
        assert_eq!(tokens(".5"), vec![Token::Number(0.5)]);
        assert_eq!(tokens("6e2"), vec![Token::Number(600.0)]);
        assert_eq!(tokens("5E-1"), vec![Token::Number(0.5)]);
    }

    #[test]
    fn test_e_after_number_is_a_name_without_digits() {
        assert_eq!(
            tokens("2e"),
            vec![Token::Number(2.0), Token::Ident("e".to_string())]
        );
        assert_eq!(
            tokens("2e+x"),
            vec![
                Token::Number(2.0),
                Token::Ident("e".to_string()),
                Token::Plus,
                Token::Ident("x".to_string()),
            ]
        );
    }

    #[test]
    fn test_positions() {
        let spanned = split_into_tokens("1 +  abc").unwrap();
        let positions: Vec<usize> = spanned.iter().map(|s| s.pos).collect();
        assert_eq!(positions, vec![0, 2, 5]);
    }

    #[test]
    fn test_rejects_attribute_access() {
        assert_eq!(split_into_tokens("a.b"), Err(EvalError::SyntaxError(1)));
        assert_eq!(split_into_tokens("1.2.3"), Err(EvalError::SyntaxError(3)));
    }

    #[test]
    fn test_rejects_characters_outside_grammar() {
        for (input, pos) in [
            ("x[0]", 1),
            ("'a'", 0),
            ("a; b", 1),
            ("x = 1", 2),
            ("{}", 0),
            ("a\\b", 1),
            ("2 × 3", 2),
        ] {
            assert_eq!(
                split_into_tokens(input),
                Err(EvalError::SyntaxError(pos)),
                "input {:?}",
                input
            );
        }
    }
}
