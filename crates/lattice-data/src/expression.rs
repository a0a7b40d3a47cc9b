//! Combination expressions over named data
//!
//! A small closed arithmetic grammar used to build new data from existing
//! configurations or correlators, e.g. `"({a} + {b}) / 2"` or
//! `"log({c} / roll({c}, -1))"`.
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := ('+' | '-') unary | power
//! power   := primary (('^' | '**') unary)?
//! primary := number | '{' name '}' | 't' | 'T' | 'C'
//!          | function '(' expr (',' expr)* ')' | '(' expr ')'
//! ```
//!
//! `t` is the row of variable indices `0..T`, `T` the variable count and `C`
//! the sample (or replica) count. Functions: the element-wise functions of
//! [`UnaryOp`], `flip(x)` and `roll(x, n)`.
//!
//! Expressions are limited to [`MAX_TOKENS`] tokens and [`MAX_NESTING`]
//! levels of nested signs, parentheses, calls and exponents.

use crate::transforms::{flip, roll, Axis};
use lattice_core::ops::{broadcast_binary, unary};
use lattice_core::{BinaryOp, Error, Result, UnaryOp};
use nalgebra::DMatrix;
use std::collections::{BTreeSet, HashMap};

/// Longest accepted expression, in tokens
pub const MAX_TOKENS: usize = 1024;

/// Deepest accepted nesting of signs, parentheses, calls and exponents
pub const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Reference(String),
    Ident(String),
    Op(BinaryOp),
    LParen,
    RParen,
    Comma,
}

fn tokenize(source: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| format!("malformed number '{text}'"))?;
                tokens.push(Token::Number(value));
            }
            '{' => {
                let start = i + 1;
                let end = chars[start..]
                    .iter()
                    .position(|&ch| ch == '}')
                    .map(|p| start + p)
                    .ok_or_else(|| format!("unterminated reference at position {i}"))?;
                let name: String = chars[start..end].iter().collect();
                if name.is_empty() {
                    return Err(format!("empty reference at position {i}"));
                }
                tokens.push(Token::Reference(name));
                i = end + 1;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Op(BinaryOp::Pow));
                i += 2;
            }
            '+' | '-' | '*' | '/' | '%' | '^' => {
                let op = match c {
                    '+' => BinaryOp::Add,
                    '-' => BinaryOp::Sub,
                    '*' => BinaryOp::Mul,
                    '/' => BinaryOp::Div,
                    '%' => BinaryOp::Rem,
                    _ => BinaryOp::Pow,
                };
                tokens.push(Token::Op(op));
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
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            other => return Err(format!("unexpected character '{other}' at position {i}")),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Reference(String),
    Index,
    Variables,
    Samples,
    Unary(UnaryOp, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Flip(Box<Node>),
    Roll(Box<Node>, Box<Node>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

type ParseResult = std::result::Result<Node, String>;

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> std::result::Result<(), String> {
        match self.next() {
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(format!("expected {expected:?}, found {t:?}")),
            None => Err(format!("expected {expected:?}, found end of expression")),
        }
    }

    fn expr(&mut self) -> ParseResult {
        let mut lhs = self.term()?;
        while let Some(Token::Op(op @ (BinaryOp::Add | BinaryOp::Sub))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> ParseResult {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op @ (BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem))) =
            self.peek().cloned()
        {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> ParseResult {
        if self.depth >= MAX_NESTING {
            return Err(format!("nesting deeper than {MAX_NESTING} levels"));
        }
        self.depth += 1;
        let node = self.signed();
        self.depth -= 1;
        node
    }

    fn signed(&mut self) -> ParseResult {
        match self.peek() {
            Some(Token::Op(BinaryOp::Sub)) => {
                self.pos += 1;
                Ok(Node::Unary(UnaryOp::Neg, Box::new(self.unary()?)))
            }
            Some(Token::Op(BinaryOp::Add)) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> ParseResult {
        let base = self.primary()?;
        if let Some(Token::Op(BinaryOp::Pow)) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Node::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn arguments(&mut self) -> std::result::Result<Vec<Node>, String> {
        self.expect(Token::LParen)?;
        let mut args = vec![self.expr()?];
        while let Some(Token::Comma) = self.peek() {
            self.pos += 1;
            args.push(self.expr()?);
        }
        self.expect(Token::RParen)?;
        Ok(args)
    }

    fn call(&mut self, name: &str) -> ParseResult {
        let mut args = self.arguments()?;
        let arity = |n: usize| -> std::result::Result<(), String> {
            if args.len() == n {
                Ok(())
            } else {
                Err(format!("function '{name}' takes {n} argument(s), got {}", args.len()))
            }
        };
        match name {
            "flip" => {
                arity(1)?;
                Ok(Node::Flip(Box::new(args.remove(0))))
            }
            "roll" => {
                arity(2)?;
                let shift = args.remove(1);
                Ok(Node::Roll(Box::new(args.remove(0)), Box::new(shift)))
            }
            _ => match UnaryOp::from_name(name) {
                Some(op) => {
                    arity(1)?;
                    Ok(Node::Unary(op, Box::new(args.remove(0))))
                }
                None => Err(format!("unknown function '{name}'")),
            },
        }
    }

    fn primary(&mut self) -> ParseResult {
        match self.next() {
            Some(Token::Number(v)) => Ok(Node::Number(v)),
            Some(Token::Reference(name)) => Ok(Node::Reference(name)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    return self.call(&name);
                }
                match name.as_str() {
                    "t" => Ok(Node::Index),
                    "T" => Ok(Node::Variables),
                    "C" => Ok(Node::Samples),
                    other => Err(format!("unknown identifier '{other}'")),
                }
            }
            Some(t) => Err(format!("unexpected token {t:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

fn collect_references<'a>(node: &'a Node, out: &mut BTreeSet<&'a str>) {
    match node {
        Node::Reference(name) => {
            out.insert(name.as_str());
        }
        Node::Unary(_, inner) | Node::Flip(inner) => collect_references(inner, out),
        Node::Binary(_, lhs, rhs) | Node::Roll(lhs, rhs) => {
            collect_references(lhs, out);
            collect_references(rhs, out);
        }
        Node::Number(_) | Node::Index | Node::Variables | Node::Samples => {}
    }
}

/// Values bound to the names and autofills of an expression
#[derive(Debug, Clone)]
pub struct Bindings<'a> {
    values: HashMap<&'a str, &'a DMatrix<f64>>,
    variables: usize,
    samples: usize,
}

impl<'a> Bindings<'a> {
    /// Autofills for `variables` columns (`T`, `t`) and `samples` rows (`C`)
    pub fn new(variables: usize, samples: usize) -> Self {
        Self {
            values: HashMap::new(),
            variables,
            samples,
        }
    }

    pub fn bind(mut self, name: &'a str, value: &'a DMatrix<f64>) -> Self {
        self.values.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &'a str, value: &'a DMatrix<f64>) {
        self.values.insert(name, value);
    }
}

/// A parsed combination expression
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    /// Parse `source`; syntax errors name the expression
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source).map_err(|reason| Error::expression(source, reason))?;
        if tokens.len() > MAX_TOKENS {
            return Err(Error::expression(
                source,
                format!("{} tokens, at most {MAX_TOKENS} are accepted", tokens.len()),
            ));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let root = parser.expr().map_err(|reason| Error::expression(source, reason))?;
        if let Some(extra) = parser.peek() {
            return Err(Error::expression(
                source,
                format!("unexpected trailing token {extra:?}"),
            ));
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names referenced as `{name}`, sorted and deduplicated
    pub fn references(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        collect_references(&self.root, &mut out);
        out
    }

    /// Evaluate against `bindings`
    pub fn evaluate(&self, bindings: &Bindings<'_>) -> Result<DMatrix<f64>> {
        self.eval(&self.root, bindings)
            .map_err(|err| match err {
                Error::InvalidCombinationExpression { .. } => err,
                other => Error::expression(&self.source, other.to_string()),
            })
    }

    fn eval(&self, node: &Node, bindings: &Bindings<'_>) -> Result<DMatrix<f64>> {
        match node {
            Node::Number(v) => Ok(DMatrix::from_element(1, 1, *v)),
            Node::Reference(name) => bindings
                .values
                .get(name.as_str())
                .map(|m| (*m).clone())
                .ok_or_else(|| Error::expression(&self.source, format!("unknown reference '{{{name}}}'"))),
            Node::Index => Ok(DMatrix::from_fn(1, bindings.variables, |_, c| c as f64)),
            Node::Variables => Ok(DMatrix::from_element(1, 1, bindings.variables as f64)),
            Node::Samples => Ok(DMatrix::from_element(1, 1, bindings.samples as f64)),
            Node::Unary(op, inner) => Ok(unary(*op, &self.eval(inner, bindings)?)),
            Node::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, bindings)?;
                let rhs = self.eval(rhs, bindings)?;
                broadcast_binary(*op, &lhs, &rhs)
            }
            Node::Flip(inner) => Ok(flip(&self.eval(inner, bindings)?)),
            Node::Roll(inner, shift) => {
                let data = self.eval(inner, bindings)?;
                let shift = self.eval(shift, bindings)?;
                if shift.shape() != (1, 1) || shift[(0, 0)].fract() != 0.0 {
                    return Err(Error::expression(
                        &self.source,
                        "roll shift must be a single integer",
                    ));
                }
                Ok(roll(&data, shift[(0, 0)] as i64, Axis::Timeslices))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn a() -> DMatrix<f64> {
        DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 4.0, 2.0, 4.0, 8.0])
    }

    #[test]
    fn precedence_and_power() {
        let data = a();
        let bindings = Bindings::new(3, 2).bind("a", &data);
        let out = Expression::parse("-{a} ** 2 + 2 * {a} / 4")
            .unwrap()
            .evaluate(&bindings)
            .unwrap();
        assert_relative_eq!(out[(0, 2)], -16.0 + 2.0);
        assert_relative_eq!(out[(1, 0)], -4.0 + 1.0);
    }

    #[test]
    fn autofills_and_functions() {
        let data = a();
        let bindings = Bindings::new(3, 2).bind("a", &data);
        let out = Expression::parse("log({a} / roll({a}, -1)) + t * 0 + C - T")
            .unwrap()
            .evaluate(&bindings)
            .unwrap();
        assert_relative_eq!(out[(0, 0)], (0.5f64).ln() - 1.0);
        assert_relative_eq!(out[(1, 2)], (8.0f64 / 2.0).ln() - 1.0);

        let flipped = Expression::parse("flip({a})").unwrap().evaluate(&bindings).unwrap();
        assert_relative_eq!(flipped[(0, 0)], 4.0);
    }

    #[test]
    fn references_are_collected() {
        let expr = Expression::parse("({x} + {y}) / {x} - 1.5e-1").unwrap();
        assert_eq!(expr.references().into_iter().collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let nested = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
        assert!(matches!(
            Expression::parse(&nested),
            Err(Error::InvalidCombinationExpression { .. })
        ));

        let signs = format!("{}1", "-".repeat(MAX_NESTING + 1));
        let err = Expression::parse(&signs).unwrap_err();
        assert!(err.to_string().contains("nesting"));

        let chain = vec!["1"; MAX_TOKENS].join(" + ");
        let err = Expression::parse(&chain).unwrap_err();
        assert!(err.to_string().contains("tokens"));

        let shallow = format!("{}{{a}}{}", "(".repeat(20), ")".repeat(20));
        let data = a();
        let bindings = Bindings::new(3, 2).bind("a", &data);
        assert_eq!(Expression::parse(&shallow).unwrap().evaluate(&bindings).unwrap(), data);
    }

    #[test]
    fn errors_name_the_expression() {
        for bad in ["{a} +", "foo({a})", "{a} $ 2", "q + 1", "roll({a})", "({a}"] {
            let err = Expression::parse(bad).unwrap_err();
            match err {
                Error::InvalidCombinationExpression { expression, .. } => assert_eq!(expression, bad),
                other => panic!("unexpected error for {bad}: {other}"),
            }
        }

        let data = a();
        let wrong = DMatrix::zeros(2, 2);
        let bindings = Bindings::new(3, 2).bind("a", &data).bind("b", &wrong);
        let err = Expression::parse("{a} + {b}").unwrap().evaluate(&bindings).unwrap_err();
        assert!(matches!(err, Error::InvalidCombinationExpression { .. }));
        let err = Expression::parse("{z}").unwrap().evaluate(&bindings).unwrap_err();
        assert!(err.to_string().contains("{z}"));
    }
}
