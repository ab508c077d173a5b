//! Step condition evaluation
//!
//! Conditions are a closed boolean grammar: literals, parameter names,
//! `==`/`!=`, `and`/`or`/`not` (or `&&`/`||`/`!`) and parentheses. The
//! expression is substituted first and then parsed by hand; nothing is ever
//! handed to an interpreter. [`evaluate`] maps every error to `false`, so a
//! step whose condition cannot be resolved is skipped.

use serde_yaml::Value;

use crate::workflow::template::{substitute, value_to_string};
use crate::workflow::types::Params;

/// Errors raised while parsing or evaluating a condition
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("empty expression")]
    Empty,
}

/// Evaluate `expression` against `params`, treating any error as `false`
pub fn evaluate(expression: &str, params: &Params) -> bool {
    match try_evaluate(expression, params) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(expression, error = %e, "condition could not be evaluated");
            false
        }
    }
}

/// Evaluate `expression` against `params`, reporting why it could not be resolved
pub fn try_evaluate(expression: &str, params: &Params) -> Result<bool, ConditionError> {
    let substituted = substitute(expression, params);
    let tokens = tokenize(&substituted)?;
    if tokens.is_empty() {
        return Err(ConditionError::Empty);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(ConditionError::UnexpectedToken(token.to_string()));
    }

    expr.eval(params)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Eq,
    Ne,
    And,
    Or,
    Not,
    Bool(bool),
    Int(i64),
    Str(String),
    Ident(String),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Eq => write!(f, "=="),
            Token::Ne => write!(f, "!="),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Not => write!(f, "not"),
            Token::Bool(b) => write!(f, "{}", b),
            Token::Int(i) => write!(f, "{}", i),
            Token::Str(s) => write!(f, "'{}'", s),
            Token::Ident(s) => write!(f, "{}", s),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':')
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConditionError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '=' | '!' | '&' | '|' => {
                chars.next();
                let next = chars.peek().copied();
                let token = match (c, next) {
                    ('=', Some('=')) => Token::Eq,
                    ('!', Some('=')) => Token::Ne,
                    ('&', Some('&')) => Token::And,
                    ('|', Some('|')) => Token::Or,
                    ('!', _) => {
                        tokens.push(Token::Not);
                        continue;
                    }
                    _ => return Err(ConditionError::UnexpectedChar(c)),
                };
                chars.next();
                tokens.push(token);
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some(ch) => literal.push(ch),
                        None => return Err(ConditionError::UnterminatedString),
                    }
                }
                tokens.push(Token::Str(literal));
            }
            c if is_word_char(c) => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if !is_word_char(ch) {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                tokens.push(word_token(word));
            }
            other => return Err(ConditionError::UnexpectedChar(other)),
        }
    }

    Ok(tokens)
}

fn word_token(word: String) -> Token {
    match word.as_str() {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "true" | "True" => Token::Bool(true),
        "false" | "False" => Token::Bool(false),
        _ => match word.parse::<i64>() {
            Ok(i) => Token::Int(i),
            Err(_) => Token::Ident(word),
        },
    }
}

/// Runtime value of an operand
#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Scalar {
    fn from_yaml(value: &Value) -> Self {
        match value {
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => Scalar::Str(n.to_string()),
            },
            Value::String(s) => Scalar::Str(s.clone()),
            other => Scalar::Str(value_to_string(other)),
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Scalar::Bool(b) => *b,
            Scalar::Int(i) => *i != 0,
            Scalar::Str(s) => {
                let s = s.trim();
                if s.eq_ignore_ascii_case("true") {
                    true
                } else if s.eq_ignore_ascii_case("false") {
                    false
                } else {
                    !(s.is_empty() || s == "0")
                }
            }
        }
    }

    /// Text used when comparing values of different kinds
    fn normalized(&self) -> String {
        match self {
            Scalar::Bool(b) => b.to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Str(s) if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") => {
                s.to_ascii_lowercase()
            }
            Scalar::Str(s) => s.clone(),
        }
    }

    fn loosely_equals(&self, other: &Scalar) -> bool {
        match (self, other) {
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::Int(a), Scalar::Int(b)) => a == b,
            (Scalar::Str(a), Scalar::Str(b)) => a == b,
            (a, b) => a.normalized() == b.normalized(),
        }
    }
}

#[derive(Debug)]
enum Operand {
    Literal(Scalar),
    Ident(String),
    Group(Box<Expr>),
}

#[derive(Debug)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare { left: Operand, right: Operand, negate: bool },
    Single(Operand),
}

impl Expr {
    fn eval(&self, params: &Params) -> Result<bool, ConditionError> {
        match self {
            Expr::Or(a, b) => Ok(a.eval(params)? || b.eval(params)?),
            Expr::And(a, b) => Ok(a.eval(params)? && b.eval(params)?),
            Expr::Not(inner) => Ok(!inner.eval(params)?),
            Expr::Compare { left, right, negate } => {
                let equal = left
                    .compared_value(params)?
                    .loosely_equals(&right.compared_value(params)?);
                Ok(equal != *negate)
            }
            Expr::Single(operand) => operand.truth_value(params),
        }
    }
}

impl Operand {
    /// Value used on either side of `==`/`!=`; unknown names compare as text
    fn compared_value(&self, params: &Params) -> Result<Scalar, ConditionError> {
        match self {
            Operand::Literal(s) => Ok(s.clone()),
            Operand::Ident(name) => Ok(params
                .get(name)
                .map(Scalar::from_yaml)
                .unwrap_or_else(|| Scalar::Str(name.clone()))),
            Operand::Group(expr) => expr.eval(params).map(Scalar::Bool),
        }
    }

    /// Value used as a bare predicate; unknown names are an error
    fn truth_value(&self, params: &Params) -> Result<bool, ConditionError> {
        match self {
            Operand::Literal(s) => Ok(s.truthy()),
            Operand::Ident(name) => params
                .get(name)
                .map(|v| Scalar::from_yaml(v).truthy())
                .ok_or_else(|| ConditionError::UnknownIdentifier(name.clone())),
            Operand::Group(expr) => expr.eval(params),
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ConditionError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, ConditionError> {
        let left = self.parse_operand()?;
        let negate = match self.peek() {
            Some(Token::Eq) => false,
            Some(Token::Ne) => true,
            _ => return Ok(Expr::Single(left)),
        };
        self.pos += 1;
        let right = self.parse_operand()?;
        Ok(Expr::Compare { left, right, negate })
    }

    fn parse_operand(&mut self) -> Result<Operand, ConditionError> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(Operand::Group(Box::new(inner))),
                    Some(token) => Err(ConditionError::UnexpectedToken(token.to_string())),
                    None => Err(ConditionError::UnexpectedEnd),
                }
            }
            Some(Token::Bool(b)) => Ok(Operand::Literal(Scalar::Bool(b))),
            Some(Token::Int(i)) => Ok(Operand::Literal(Scalar::Int(i))),
            Some(Token::Str(s)) => Ok(Operand::Literal(Scalar::Str(s))),
            Some(Token::Ident(name)) => Ok(Operand::Ident(name)),
            Some(token) => Err(ConditionError::UnexpectedToken(token.to_string())),
            None => Err(ConditionError::UnexpectedEnd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, Value)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_literals() {
        let p = Params::new();
        assert!(evaluate("true", &p));
        assert!(evaluate("True", &p));
        assert!(!evaluate("false", &p));
        assert!(evaluate("1", &p));
        assert!(!evaluate("0", &p));
        assert!(evaluate("'text'", &p));
        assert!(!evaluate("''", &p));
    }

    #[test]
    fn test_boolean_params() {
        let p = params(&[
            ("enabled", Value::Bool(true)),
            ("cli_flag", Value::from("false")),
            ("name", Value::from("api")),
        ]);
        assert!(evaluate("enabled", &p));
        assert!(!evaluate("cli_flag", &p));
        assert!(evaluate("name", &p));
        assert!(evaluate("{{ enabled }}", &p));
        assert!(!evaluate("{{ cli_flag }}", &p));
    }

    #[test]
    fn test_equality() {
        let p = params(&[
            ("env", Value::from("prod")),
            ("count", Value::from(3)),
            ("flag", Value::from("true")),
        ]);
        assert!(evaluate("env == 'prod'", &p));
        assert!(evaluate("{{ env }} == prod", &p));
        assert!(evaluate("env != 'dev'", &p));
        assert!(evaluate("count == 3", &p));
        assert!(evaluate("count == '3'", &p));
        assert!(evaluate("flag == true", &p));
        assert!(!evaluate("{{ env }} == staging", &p));
    }

    #[test]
    fn test_logical_operators() {
        let p = params(&[("a", Value::Bool(true)), ("b", Value::Bool(false))]);
        assert!(evaluate("a and not b", &p));
        assert!(evaluate("a && !b", &p));
        assert!(evaluate("b or a", &p));
        assert!(evaluate("b || a", &p));
        assert!(!evaluate("a and b", &p));
        assert!(evaluate("not (a and b)", &p));
        assert!(evaluate("(a == true) == true", &p));
    }

    #[test]
    fn test_short_circuit_skips_unknown_names() {
        let p = params(&[("a", Value::Bool(false))]);
        assert_eq!(try_evaluate("a and missing", &p), Ok(false));
        assert!(try_evaluate("missing", &p).is_err());
    }

    #[test]
    fn test_errors_evaluate_to_false() {
        let p = Params::new();
        for expr in [
            "",
            "unknown_param",
            "{{ unresolved }}",
            "1 +",
            "a = b",
            "(true",
            "true false",
            "'open",
            "== true",
            "__import__('os')",
        ] {
            assert!(!evaluate(expr, &p), "{expr:?} should be false");
        }
    }

    #[test]
    fn test_error_kinds() {
        let p = Params::new();
        assert_eq!(try_evaluate("", &p), Err(ConditionError::Empty));
        assert_eq!(
            try_evaluate("x", &p),
            Err(ConditionError::UnknownIdentifier("x".to_string()))
        );
        assert_eq!(try_evaluate("1 < 2", &p), Err(ConditionError::UnexpectedChar('<')));
        assert_eq!(try_evaluate("'a", &p), Err(ConditionError::UnterminatedString));
        assert_eq!(try_evaluate("(true", &p), Err(ConditionError::UnexpectedEnd));
    }
}
