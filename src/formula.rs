//! Arithmetic evaluation for `{= ...}` formulas.
//!
//! Bound field names inside the expression are first replaced by their
//! numeric value, then the result is evaluated by a small recursive-descent
//! parser over a closed grammar:
//!
//! ```text
//! expr    := term (("+" | "-") term)*
//! term    := unary (("*" | "/") unary)*
//! unary   := ("+" | "-") unary | primary
//! primary := NUMBER | "(" expr ")"
//! ```
//!
//! Nothing outside that grammar is accepted: an identifier left after
//! substitution, or any other character, is an error.

use std::fmt;

use thiserror::Error;

use crate::markup::is_word_char;
use crate::models::ValueBindings;

const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("empty expression")]
    Empty,
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("malformed number '{0}'")]
    InvalidNumber(String),
    #[error("unexpected {0}")]
    UnexpectedToken(Token),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected {0} after complete expression")]
    TrailingInput(Token),
    #[error("expression nested too deeply")]
    TooDeep,
    #[error("result is not a finite number")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(value) => write!(f, "number {}", format_number(*value)),
            Token::Plus => f.write_str("'+'"),
            Token::Minus => f.write_str("'-'"),
            Token::Star => f.write_str("'*'"),
            Token::Slash => f.write_str("'/'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
        }
    }
}

/// Evaluates `expression` with the bound values substituted in.
pub fn evaluate(expression: &str, values: &ValueBindings) -> Result<f64, FormulaError> {
    let substituted = substitute_values(expression, values);
    evaluate_arithmetic(&substituted)
}

/// Replaces every identifier equal to a bound name by that value's numeric
/// reading. Identifiers are maximal runs of word characters, so `qty` never
/// rewrites part of `qty2`.
pub fn substitute_values(expression: &str, values: &ValueBindings) -> String {
    let mut output = String::with_capacity(expression.len());
    let mut rest = expression;
    while let Some(start) = rest.find(is_word_char) {
        output.push_str(&rest[..start]);
        let word = &rest[start..];
        let len = word.find(|ch: char| !is_word_char(ch)).unwrap_or(word.len());
        let ident = &word[..len];
        match values.get(ident) {
            Some(value) => output.push_str(&format_number(value.as_number())),
            None => output.push_str(ident),
        }
        rest = &word[len..];
    }
    output.push_str(rest);
    output
}

/// Evaluates an expression made only of numbers, `+ - * /` and parentheses.
pub fn evaluate_arithmetic(input: &str) -> Result<f64, FormulaError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(FormulaError::Empty);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.parse_expr(0)?;
    if let Some(token) = parser.peek() {
        return Err(FormulaError::TrailingInput(token));
    }
    if !value.is_finite() {
        return Err(FormulaError::NonFinite);
    }
    Ok(value)
}

/// Shortest decimal text that reads back as `value`; never uses exponent
/// notation, and negative zero prints as `0`.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    value.to_string()
}

fn tokenize(input: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        let token = match ch {
            c if c.is_whitespace() => continue,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::LParen,
            ')' => Token::RParen,
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = offset + c.len_utf8();
                while let Some((next, _)) = chars.next_if(|(_, c)| c.is_ascii_digit() || *c == '.')
                {
                    end = next + 1;
                }
                let literal = &input[offset..end];
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| FormulaError::InvalidNumber(literal.to_string()))?;
                Token::Number(value)
            }
            c => return Err(FormulaError::UnexpectedChar { ch: c, offset }),
        };
        tokens.push(token);
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    fn parse_expr(&mut self, depth: usize) -> Result<f64, FormulaError> {
        if depth > MAX_DEPTH {
            return Err(FormulaError::TooDeep);
        }
        let mut value = self.parse_term(depth)?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.parse_term(depth)?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.parse_term(depth)?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn parse_term(&mut self, depth: usize) -> Result<f64, FormulaError> {
        let mut value = self.parse_unary(depth)?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value *= self.parse_unary(depth)?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    value /= self.parse_unary(depth)?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn parse_unary(&mut self, depth: usize) -> Result<f64, FormulaError> {
        if depth > MAX_DEPTH {
            return Err(FormulaError::TooDeep);
        }
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.parse_unary(depth + 1)?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.parse_unary(depth + 1)
            }
            _ => self.parse_primary(depth),
        }
    }

    fn parse_primary(&mut self, depth: usize) -> Result<f64, FormulaError> {
        match self.next() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::LParen) => {
                let value = self.parse_expr(depth + 1)?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    Some(token) => Err(FormulaError::UnexpectedToken(token)),
                    None => Err(FormulaError::UnexpectedEnd),
                }
            }
            Some(token) => Err(FormulaError::UnexpectedToken(token)),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;

    fn bindings(pairs: &[(&str, FieldValue)]) -> ValueBindings {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(evaluate_arithmetic("1 + 2 * 3"), Ok(7.0));
        assert_eq!(evaluate_arithmetic("(1 + 2) * 3"), Ok(9.0));
        assert_eq!(evaluate_arithmetic("10 - 4 - 3"), Ok(3.0));
        assert_eq!(evaluate_arithmetic("24 / 4 / 3"), Ok(2.0));
        assert_eq!(evaluate_arithmetic("2 * -3"), Ok(-6.0));
        assert_eq!(evaluate_arithmetic("2 - -3"), Ok(5.0));
        assert_eq!(evaluate_arithmetic("-(1.5 + .5)"), Ok(-2.0));
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert_eq!(evaluate_arithmetic(""), Err(FormulaError::Empty));
        assert_eq!(evaluate_arithmetic("   "), Err(FormulaError::Empty));
        assert_eq!(evaluate_arithmetic("2 +"), Err(FormulaError::UnexpectedEnd));
        assert_eq!(evaluate_arithmetic("(1 + 2"), Err(FormulaError::UnexpectedEnd));
        assert_eq!(
            evaluate_arithmetic("1 2"),
            Err(FormulaError::TrailingInput(Token::Number(2.0)))
        );
        assert_eq!(
            evaluate_arithmetic("* 2"),
            Err(FormulaError::UnexpectedToken(Token::Star))
        );
        assert_eq!(
            evaluate_arithmetic("1.2.3"),
            Err(FormulaError::InvalidNumber("1.2.3".to_string()))
        );
        assert_eq!(
            evaluate_arithmetic("2 ^ 3"),
            Err(FormulaError::UnexpectedChar { ch: '^', offset: 2 })
        );
    }

    #[test]
    fn rejects_anything_but_arithmetic() {
        assert!(matches!(
            evaluate_arithmetic("alert(1)"),
            Err(FormulaError::UnexpectedChar { ch: 'a', .. })
        ));
        assert!(evaluate_arithmetic("1; 2").is_err());
        assert!(evaluate_arithmetic("\"1\" + 1").is_err());
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(evaluate_arithmetic("1 / 0"), Err(FormulaError::NonFinite));
        assert_eq!(evaluate_arithmetic("0 / 0"), Err(FormulaError::NonFinite));
    }

    #[test]
    fn deep_nesting_is_bounded() {
        let deep = format!("{}1{}", "(".repeat(MAX_DEPTH + 10), ")".repeat(MAX_DEPTH + 10));
        assert_eq!(evaluate_arithmetic(&deep), Err(FormulaError::TooDeep));
        let signs = format!("{}1", "-".repeat(MAX_DEPTH + 10));
        assert_eq!(evaluate_arithmetic(&signs), Err(FormulaError::TooDeep));
        let shallow = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(evaluate_arithmetic(&shallow), Ok(1.0));
    }

    #[test]
    fn substitutes_whole_identifiers_only() {
        let values = bindings(&[("qty", "3".into()), ("qty2", "10".into())]);
        assert_eq!(substitute_values("qty * qty2", &values), "3 * 10");
        assert_eq!(substitute_values("qty_total + 1", &values), "qty_total + 1");
    }

    #[test]
    fn evaluates_with_bindings() {
        let values = bindings(&[
            ("a", "2".into()),
            ("b", "x".into()),
            ("gift", true.into()),
            ("neg", "-4".into()),
        ]);
        assert_eq!(evaluate("a + b", &values), Ok(2.0));
        assert_eq!(evaluate("a * gift + 1", &values), Ok(3.0));
        assert_eq!(evaluate("a - neg", &values), Ok(6.0));
        assert_eq!(
            evaluate("a + missing", &values),
            Err(FormulaError::UnexpectedChar { ch: 'm', offset: 4 })
        );
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(-12.75), "-12.75");
    }
}
