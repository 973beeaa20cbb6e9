//! Safe arithmetic expression parser for computed variables (§4.2.1),
//! replacing string-substitute-then-eval with a real recursive-descent
//! parser over `+ - * / ( )` and dotted field access.

use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub enum ExprError {
    UnexpectedChar(char),
    UnexpectedEnd,
    UnexpectedToken(String),
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprError::UnexpectedChar(c) => write!(f, "unexpected character '{c}'"),
            ExprError::UnexpectedEnd => write!(f, "unexpected end of expression"),
            ExprError::UnexpectedToken(t) => write!(f, "unexpected token '{t}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Decimal),
    Ident(String),
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = Decimal::from_str(&text)
                    .map_err(|_| ExprError::UnexpectedToken(text.clone()))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(ExprError::UnexpectedChar(other)),
        }
    }
    Ok(tokens)
}

/// Parsed expression AST. `Field` distinguishes bare identifiers from
/// `name.line` dotted access so the evaluator can resolve multi-line
/// indicator output.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(Decimal),
    Field(String, Option<String>),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
}

pub trait Resolver {
    fn resolve(&self, name: &str, line: Option<&str>) -> Option<Decimal>;
}

impl Expr {
    pub fn parse(input: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(ExprError::UnexpectedToken(format!("{:?}", parser.tokens[parser.pos])));
        }
        Ok(expr)
    }

    /// Division by zero and unresolved fields both yield `None`, which
    /// propagates as the condition evaluator's null-operand rule (§4.2.1).
    pub fn eval(&self, ctx: &dyn Resolver) -> Option<Decimal> {
        match self {
            Expr::Number(d) => Some(*d),
            Expr::Field(name, line) => ctx.resolve(name, line.as_deref()),
            Expr::Neg(inner) => inner.eval(ctx).map(|v| -v),
            Expr::Add(l, r) => Some(l.eval(ctx)? + r.eval(ctx)?),
            Expr::Sub(l, r) => Some(l.eval(ctx)? - r.eval(ctx)?),
            Expr::Mul(l, r) => Some(l.eval(ctx)? * r.eval(ctx)?),
            Expr::Div(l, r) => {
                let rhs = r.eval(ctx)?;
                if rhs == Decimal::ZERO {
                    None
                } else {
                    Some(l.eval(ctx)? / rhs)
                }
            }
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
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.advance();
                    let right = self.parse_term()?;
                    left = Expr::Add(Box::new(left), Box::new(right));
                }
                Some(Token::Minus) => {
                    self.advance();
                    let right = self.parse_term()?;
                    left = Expr::Sub(Box::new(left), Box::new(right));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.advance();
                    let right = self.parse_unary()?;
                    left = Expr::Mul(Box::new(left), Box::new(right));
                }
                Some(Token::Slash) => {
                    self.advance();
                    let right = self.parse_unary()?;
                    left = Expr::Div(Box::new(left), Box::new(right));
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if let Some(Token::Minus) = self.peek() {
            self.advance();
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr, ExprError> {
        match self.advance() {
            Some(Token::Number(d)) => Ok(Expr::Number(d)),
            Some(Token::Ident(name)) => {
                if let Some(Token::Dot) = self.peek() {
                    self.advance();
                    match self.advance() {
                        Some(Token::Ident(line)) => Ok(Expr::Field(name, Some(line))),
                        Some(other) => Err(ExprError::UnexpectedToken(format!("{other:?}"))),
                        None => Err(ExprError::UnexpectedEnd),
                    }
                } else {
                    Ok(Expr::Field(name, None))
                }
            }
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(ExprError::UnexpectedToken(format!("{other:?}"))),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(other) => Err(ExprError::UnexpectedToken(format!("{other:?}"))),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    struct MapResolver(HashMap<String, Decimal>);

    impl Resolver for MapResolver {
        fn resolve(&self, name: &str, line: Option<&str>) -> Option<Decimal> {
            let key = match line {
                Some(l) => format!("{name}.{l}"),
                None => name.to_string(),
            };
            self.0.get(&key).copied()
        }
    }

    #[test]
    fn test_precedence() {
        let expr = Expr::parse("2 + 3 * 4").unwrap();
        let ctx = MapResolver(HashMap::new());
        assert_eq!(expr.eval(&ctx), Some(dec!(14)));
    }

    #[test]
    fn test_parens_override_precedence() {
        let expr = Expr::parse("(2 + 3) * 4").unwrap();
        let ctx = MapResolver(HashMap::new());
        assert_eq!(expr.eval(&ctx), Some(dec!(20)));
    }

    #[test]
    fn test_unary_minus() {
        let expr = Expr::parse("-5 + 3").unwrap();
        let ctx = MapResolver(HashMap::new());
        assert_eq!(expr.eval(&ctx), Some(dec!(-2)));
    }

    #[test]
    fn test_dotted_field_access() {
        let mut map = HashMap::new();
        map.insert("macd.signal".to_string(), dec!(1.5));
        let ctx = MapResolver(map);
        let expr = Expr::parse("macd.signal * 2").unwrap();
        assert_eq!(expr.eval(&ctx), Some(dec!(3.0)));
    }

    #[test]
    fn test_division_by_zero_is_none() {
        let expr = Expr::parse("1 / 0").unwrap();
        let ctx = MapResolver(HashMap::new());
        assert_eq!(expr.eval(&ctx), None);
    }

    #[test]
    fn test_unresolved_field_is_none() {
        let expr = Expr::parse("missing + 1").unwrap();
        let ctx = MapResolver(HashMap::new());
        assert_eq!(expr.eval(&ctx), None);
    }

    #[test]
    fn test_invalid_character_rejected() {
        assert!(Expr::parse("1 $ 2").is_err());
    }
}
