//! Boolean condition expressions for norms and conditional events.
//!
//! The language is deliberately closed: literals, dotted variable paths,
//! comparison operators, `!`, `&&`, `||` and parentheses. There are no
//! function calls, assignments or arithmetic, so a condition can never do
//! more than read the variables it is handed.
//!
//! ```text
//! or      := and ("||" and)*
//! and     := unary ("&&" unary)*
//! unary   := "!" unary | cmp
//! cmp     := term (("==" | "!=" | "<" | "<=" | ">" | ">=") term)?
//! term    := number | string | true | false | null | path | "(" or ")"
//! ```

use crate::value::{lookup_path, Value, Variables};
use crate::ExpressionError;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(f64),
    Op(&'static str),
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
}

/// A parsed condition, ready to be evaluated any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let body = unwrap_placeholder(source);
        let tokens = tokenize(body)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if let Some(tok) = parser.peek() {
            return Err(ExpressionError::UnexpectedToken(format!("{:?}", tok)));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn evaluate(&self, vars: &Variables) -> Result<bool, ExpressionError> {
        self.evaluate_scoped(&[vars])
    }

    /// Evaluate with several variable scopes; the first scope holding a
    /// name wins.
    pub fn evaluate_scoped(&self, scopes: &[&Variables]) -> Result<bool, ExpressionError> {
        eval(&self.expr, scopes).map(|v| v.is_truthy())
    }
}

/// Parse and evaluate in one go.
pub fn evaluate(source: &str, vars: &Variables) -> Result<bool, ExpressionError> {
    Condition::parse(source)?.evaluate(vars)
}

fn unwrap_placeholder(source: &str) -> &str {
    let trimmed = source.trim();
    trimmed
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or(trimmed)
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.peek().copied() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch == '\'' || ch == '"' {
            let quote = ch;
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                if c == quote {
                    closed = true;
                    break;
                }
                if c == '\\' {
                    match chars.next() {
                        Some(escaped) => value.push(escaped),
                        None => return Err(ExpressionError::UnterminatedString),
                    }
                    continue;
                }
                value.push(c);
            }
            if !closed {
                return Err(ExpressionError::UnterminatedString);
            }
            tokens.push(Token::Str(value));
            continue;
        }

        if ch.is_ascii_digit() || ch == '-' {
            let mut raw = String::new();
            raw.push(ch);
            chars.next();
            while let Some(c) = chars.peek().copied() {
                if c.is_ascii_digit() || c == '.' {
                    raw.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            let n = raw
                .parse::<f64>()
                .map_err(|_| ExpressionError::InvalidNumber(raw.clone()))?;
            tokens.push(Token::Number(n));
            continue;
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            let mut value = String::new();
            while let Some(c) = chars.peek().copied() {
                if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                    value.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(value));
            continue;
        }

        chars.next();
        let next = chars.peek().copied();
        let op = match (ch, next) {
            ('(', _) => {
                tokens.push(Token::LParen);
                continue;
            }
            (')', _) => {
                tokens.push(Token::RParen);
                continue;
            }
            ('=', Some('=')) => "==",
            ('!', Some('=')) => "!=",
            ('<', Some('=')) => "<=",
            ('>', Some('=')) => ">=",
            ('&', Some('&')) => "&&",
            ('|', Some('|')) => "||",
            ('<', _) => "<",
            ('>', _) => ">",
            ('!', _) => "!",
            (other, _) => return Err(ExpressionError::UnexpectedChar(other)),
        };
        if op.len() == 2 {
            chars.next();
        }
        tokens.push(Token::Op(op));
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.eat_op("||") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;
        while self.eat_op("&&") {
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat_op("!") {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.parse_term()?;
        let op = match self.peek() {
            Some(Token::Op("==")) => CmpOp::Eq,
            Some(Token::Op("!=")) => CmpOp::Ne,
            Some(Token::Op("<")) => CmpOp::Lt,
            Some(Token::Op("<=")) => CmpOp::Le,
            Some(Token::Op(">")) => CmpOp::Gt,
            Some(Token::Op(">=")) => CmpOp::Ge,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.parse_term()?;
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn parse_term(&mut self) -> Result<Expr, ExpressionError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(Value::Number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" => Expr::Literal(Value::Null),
                _ => Expr::Var(name),
            }),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(ExpressionError::UnexpectedToken(format!("{:?}", other))),
                    None => Err(ExpressionError::UnexpectedEof),
                }
            }
            Some(other) => Err(ExpressionError::UnexpectedToken(format!("{:?}", other))),
            None => Err(ExpressionError::UnexpectedEof),
        }
    }
}

fn eval(expr: &Expr, scopes: &[&Variables]) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Var(path) => Ok(scopes
            .iter()
            .find_map(|vars| lookup_path(vars, path))
            .cloned()
            .unwrap_or(Value::Null)),
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, scopes)?.is_truthy())),
        Expr::And(l, r) => {
            if !eval(l, scopes)?.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval(r, scopes)?.is_truthy()))
        }
        Expr::Or(l, r) => {
            if eval(l, scopes)?.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval(r, scopes)?.is_truthy()))
        }
        Expr::Compare(op, l, r) => {
            let left = eval(l, scopes)?;
            let right = eval(r, scopes)?;
            compare(*op, &left, &right).map(Value::Bool)
        }
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, ExpressionError> {
    match op {
        CmpOp::Eq => return Ok(left == right),
        CmpOp::Ne => return Ok(left != right),
        _ => {}
    }
    // An unset variable never satisfies an ordering comparison.
    if left.is_null() || right.is_null() {
        return Ok(false);
    }
    let ordering = left
        .compare(right)
        .ok_or_else(|| ExpressionError::Incomparable {
            left: left.type_name().to_string(),
            right: right.type_name().to_string(),
        })?;
    Ok(match op {
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Ge => ordering != Ordering::Less,
        CmpOp::Eq | CmpOp::Ne => unreachable!(),
    })
}
