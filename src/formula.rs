//! Formula
//!
//! An explicit, enumerated model specification: an optional response name, an
//! intercept flag and a list of [`Term`]s, each a product of [`Factor`]s.
//! Formulas can be built programmatically or parsed from the familiar string
//! syntax:
//!
//! ```text
//! y ~ x1 + x2 + x1:x2      main effects and an interaction
//! x1 * x2                  same as x1 + x2 + x1:x2
//! x + I(x^2) - 1           a power term, no intercept
//! (a + b):c                a:c + b:c
//! ```
use crate::data::Table;
use crate::errors::{CausalError, FormulaError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single factor of a term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Factor {
    /// A table column used as-is.
    Column(String),
    /// A table column raised to a positive integer power, `I(x^k)`.
    Power(String, u32),
}

impl Factor {
    /// The column this factor reads.
    pub fn column(&self) -> &str {
        match self {
            Factor::Column(name) | Factor::Power(name, _) => name,
        }
    }

    fn evaluate(&self, table: &Table) -> Result<Vec<f64>, CausalError> {
        let values = table.column(self.column())?;
        Ok(match self {
            Factor::Column(_) => values.to_vec(),
            Factor::Power(_, k) => match i32::try_from(*k) {
                Ok(e) => values.iter().map(|v| v.powi(e)).collect(),
                Err(_) => values.iter().map(|v| v.powf(f64::from(*k))).collect(),
            },
        })
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Factor::Column(name) => write!(f, "{}", name),
            Factor::Power(name, k) => write!(f, "I({}^{})", name, k),
        }
    }
}

/// A product of factors. A single factor is a main effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Term {
    factors: Vec<Factor>,
}

impl Term {
    /// Main effect of a column.
    pub fn main(name: &str) -> Self {
        Term {
            factors: vec![Factor::Column(name.to_string())],
        }
    }

    /// Interaction (elementwise product) of several columns.
    pub fn interaction<S: AsRef<str>>(names: &[S]) -> Self {
        let mut term = Term { factors: Vec::new() };
        for n in names {
            term.push_factor(Factor::Column(n.as_ref().to_string()));
        }
        term
    }

    /// `I(name^k)`.
    pub fn power(name: &str, k: u32) -> Self {
        Term {
            factors: vec![Factor::Power(name.to_string(), k)],
        }
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    fn push_factor(&mut self, factor: Factor) {
        if !self.factors.contains(&factor) {
            self.factors.push(factor);
        }
    }

    fn product(&self, other: &Term) -> Term {
        let mut term = self.clone();
        for f in &other.factors {
            term.push_factor(f.clone());
        }
        term
    }

    fn key(&self) -> Vec<String> {
        let mut k: Vec<String> = self.factors.iter().map(|f| f.to_string()).collect();
        k.sort();
        k
    }

    /// Elementwise product of the factor columns.
    pub fn evaluate(&self, table: &Table) -> Result<Vec<f64>, CausalError> {
        let mut out = vec![1.0; table.n_rows()];
        for factor in &self.factors {
            for (o, v) in out.iter_mut().zip(factor.evaluate(table)?) {
                *o *= v;
            }
        }
        Ok(out)
    }
}

/// `a:b` and `b:a` are the same term.
impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names: Vec<String> = self.factors.iter().map(|f| f.to_string()).collect();
        write!(f, "{}", names.join(":"))
    }
}

/// A model specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    response: Option<String>,
    intercept: bool,
    terms: Vec<Term>,
}

impl Default for Formula {
    fn default() -> Self {
        Self::new()
    }
}

impl Formula {
    /// Intercept only.
    pub fn new() -> Self {
        Formula {
            response: None,
            intercept: true,
            terms: Vec::new(),
        }
    }

    /// Main effects for each covariate, with intercept.
    pub fn from_covariates<S: AsRef<str>>(names: &[S]) -> Self {
        let mut formula = Formula::new();
        for n in names {
            formula.add_term(Term::main(n.as_ref()));
        }
        formula
    }

    pub fn with_response(mut self, name: &str) -> Self {
        self.response = Some(name.to_string());
        self
    }

    /// The same right-hand side with no response.
    pub fn without_response(mut self) -> Self {
        self.response = None;
        self
    }

    pub fn main(mut self, name: &str) -> Self {
        self.add_term(Term::main(name));
        self
    }

    pub fn interaction<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.add_term(Term::interaction(names));
        self
    }

    pub fn power(mut self, name: &str, k: u32) -> Self {
        self.add_term(Term::power(name, k));
        self
    }

    pub fn without_intercept(mut self) -> Self {
        self.intercept = false;
        self
    }

    /// Add a term unless an equal one is already present.
    pub fn add_term(&mut self, term: Term) {
        if !self.terms.contains(&term) {
            self.terms.push(term);
        }
    }

    pub fn remove_term(&mut self, term: &Term) {
        self.terms.retain(|t| t != term);
    }

    pub fn response(&self) -> Option<&str> {
        self.response.as_deref()
    }

    pub fn intercept(&self) -> bool {
        self.intercept
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Number of design columns, intercept excluded.
    pub fn n_columns(&self) -> usize {
        self.terms.len()
    }

    pub fn term_names(&self) -> Vec<String> {
        self.terms.iter().map(|t| t.to_string()).collect()
    }

    /// Build the column-major design matrix (no intercept column).
    pub fn design(&self, table: &Table) -> Result<Vec<f64>, CausalError> {
        let mut data = Vec::with_capacity(table.n_rows() * self.terms.len());
        for term in &self.terms {
            data.extend(term.evaluate(table)?);
        }
        Ok(data)
    }

    /// Parse a formula string, see the module documentation for the syntax.
    pub fn parse(formula: &str) -> Result<Self, FormulaError> {
        if formula.matches('~').count() > 1 {
            return Err(FormulaError::MultipleResponses(formula.to_string()));
        }
        let (response, rhs_offset) = match formula.find('~') {
            Some(pos) => {
                let lhs = formula[..pos].trim();
                if lhs.is_empty() {
                    (None, pos + 1)
                } else if is_identifier(lhs) {
                    (Some(lhs.to_string()), pos + 1)
                } else {
                    return Err(FormulaError::UnexpectedToken {
                        formula: formula.to_string(),
                        token: lhs.to_string(),
                        offset: 0,
                    });
                }
            }
            None => (None, 0),
        };

        let tokens = tokenize(formula, rhs_offset)?;
        if tokens.is_empty() {
            return Err(FormulaError::Empty(formula.to_string()));
        }
        let mut parser = Parser {
            formula,
            tokens,
            pos: 0,
        };
        let mut parsed = parser.expression()?;
        if let Some(tok) = parser.peek() {
            return Err(parser.unexpected(tok));
        }
        parsed.response = response;
        Ok(parsed)
    }
}

impl FromStr for Formula {
    type Err = FormulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Formula::parse(s)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(r) = &self.response {
            write!(f, "{} ~ ", r)?;
        }
        let mut parts: Vec<String> = Vec::new();
        if self.intercept {
            parts.push("1".to_string());
        }
        parts.extend(self.term_names());
        if !self.intercept {
            parts.push("-1".to_string());
        }
        write!(f, "{}", parts.join(" + ").replace("+ -1", "- 1"))
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Plus,
    Minus,
    Colon,
    Star,
    Caret,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Ident(s) | Token::Number(s) => write!(f, "{}", s),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Colon => write!(f, ":"),
            Token::Star => write!(f, "*"),
            Token::Caret => write!(f, "^"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

fn tokenize(formula: &str, start: usize) -> Result<Vec<(Token, usize)>, FormulaError> {
    let bytes = formula.as_bytes();
    let mut tokens = Vec::new();
    let mut i = start;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\n' => {
                i += 1;
            }
            '+' => {
                tokens.push((Token::Plus, i));
                i += 1;
            }
            '-' => {
                tokens.push((Token::Minus, i));
                i += 1;
            }
            ':' => {
                tokens.push((Token::Colon, i));
                i += 1;
            }
            '^' => {
                tokens.push((Token::Caret, i));
                i += 1;
            }
            '*' => {
                if bytes.get(i + 1) == Some(&b'*') {
                    tokens.push((Token::Caret, i));
                    i += 2;
                } else {
                    tokens.push((Token::Star, i));
                    i += 1;
                }
            }
            '(' => {
                tokens.push((Token::LParen, i));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, i));
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let begin = i;
                while i < bytes.len() && ((bytes[i] as char).is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                tokens.push((Token::Number(formula[begin..i].to_string()), begin));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let begin = i;
                while i < bytes.len() && {
                    let ch = bytes[i] as char;
                    ch.is_ascii_alphanumeric() || ch == '_' || ch == '.'
                } {
                    i += 1;
                }
                tokens.push((Token::Ident(formula[begin..i].to_string()), begin));
            }
            _ => {
                let ch_len = formula[i..].chars().next().map_or(1, |ch| ch.len_utf8());
                return Err(FormulaError::UnexpectedToken {
                    formula: formula.to_string(),
                    token: formula[i..i + ch_len].to_string(),
                    offset: i,
                });
            }
        }
    }
    Ok(tokens)
}

/// What a term position of the grammar evaluates to.
enum Parsed {
    Intercept(bool),
    Terms(Vec<Term>),
}

struct Parser<'a> {
    formula: &'a str,
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<(Token, usize)> {
        self.tokens.get(self.pos).cloned()
    }

    fn bump(&mut self) -> Result<(Token, usize), FormulaError> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| FormulaError::UnexpectedEnd(self.formula.to_string()))?;
        self.pos += 1;
        Ok(tok)
    }

    fn unexpected(&self, (token, offset): (Token, usize)) -> FormulaError {
        FormulaError::UnexpectedToken {
            formula: self.formula.to_string(),
            token: token.to_string(),
            offset,
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), FormulaError> {
        let tok = self.bump()?;
        if tok.0 == expected {
            Ok(())
        } else {
            Err(self.unexpected(tok))
        }
    }

    /// `['-'] term (('+' | '-') term)*` at the top level.
    fn expression(&mut self) -> Result<Formula, FormulaError> {
        let mut formula = Formula::new();
        let mut subtract = false;
        if let Some((Token::Minus, _)) = self.peek() {
            subtract = true;
            self.pos += 1;
        }
        loop {
            match (self.product()?, subtract) {
                (Parsed::Intercept(on), false) => formula.intercept = on,
                (Parsed::Intercept(on), true) => formula.intercept = !on,
                (Parsed::Terms(terms), false) => terms.into_iter().for_each(|t| formula.add_term(t)),
                (Parsed::Terms(terms), true) => terms.iter().for_each(|t| formula.remove_term(t)),
            }
            match self.peek() {
                Some((Token::Plus, _)) => subtract = false,
                Some((Token::Minus, _)) => subtract = true,
                _ => break,
            }
            self.pos += 1;
        }
        Ok(formula)
    }

    /// `group ((':' | '*') group)*`
    fn product(&mut self) -> Result<Parsed, FormulaError> {
        let start = self.peek();
        let first = self.group()?;
        let mut acc = match first {
            Parsed::Intercept(_) => {
                if let Some((Token::Colon | Token::Star, _)) = self.peek() {
                    return Err(self.unexpected(start.unwrap_or((Token::Number(String::new()), 0))));
                }
                return Ok(first);
            }
            Parsed::Terms(terms) => terms,
        };
        loop {
            let op = match self.peek() {
                Some((Token::Colon, _)) => Token::Colon,
                Some((Token::Star, _)) => Token::Star,
                _ => break,
            };
            self.pos += 1;
            let rhs_start = self.peek();
            let rhs = match self.group()? {
                Parsed::Terms(terms) => terms,
                Parsed::Intercept(_) => {
                    return Err(self.unexpected(rhs_start.unwrap_or((Token::Number(String::new()), 0))));
                }
            };
            let mut crossed = Vec::new();
            for a in &acc {
                for b in &rhs {
                    crossed.push(a.product(b));
                }
            }
            acc = match op {
                Token::Star => {
                    let mut all = acc;
                    all.extend(rhs);
                    all.extend(crossed);
                    all
                }
                _ => crossed,
            };
        }
        let mut deduped: Vec<Term> = Vec::with_capacity(acc.len());
        for t in acc {
            if !deduped.contains(&t) {
                deduped.push(t);
            }
        }
        Ok(Parsed::Terms(deduped))
    }

    /// `name | I(name ^ k) | '(' sum ')' | 0 | 1`
    fn group(&mut self) -> Result<Parsed, FormulaError> {
        let tok = self.bump()?;
        match tok {
            (Token::Number(ref n), _) if n == "1" => Ok(Parsed::Intercept(true)),
            (Token::Number(ref n), _) if n == "0" => Ok(Parsed::Intercept(false)),
            (Token::Ident(name), offset) => {
                if let Some((Token::LParen, _)) = self.peek() {
                    if name != "I" {
                        return Err(FormulaError::UnknownFunction { name, offset });
                    }
                    self.pos += 1;
                    let column = match self.bump()? {
                        (Token::Ident(c), _) => c,
                        other => return Err(self.unexpected(other)),
                    };
                    self.expect(Token::Caret)?;
                    let power = match self.bump()? {
                        (Token::Number(p), off) => p
                            .parse::<u32>()
                            .ok()
                            .filter(|&k| k > 0 && i32::try_from(k).is_ok())
                            .ok_or(FormulaError::InvalidPower { power: p, offset: off })?,
                        other => return Err(self.unexpected(other)),
                    };
                    self.expect(Token::RParen)?;
                    let term = if power == 1 {
                        Term::main(&column)
                    } else {
                        Term::power(&column, power)
                    };
                    Ok(Parsed::Terms(vec![term]))
                } else {
                    Ok(Parsed::Terms(vec![Term::main(&name)]))
                }
            }
            (Token::LParen, _) => {
                let mut terms: Vec<Term> = Vec::new();
                loop {
                    let start = self.peek();
                    match self.product()? {
                        Parsed::Terms(ts) => {
                            for t in ts {
                                if !terms.contains(&t) {
                                    terms.push(t);
                                }
                            }
                        }
                        Parsed::Intercept(_) => {
                            return Err(self.unexpected(start.unwrap_or((Token::Number(String::new()), 0))));
                        }
                    }
                    match self.bump()? {
                        (Token::Plus, _) => continue,
                        (Token::RParen, _) => break,
                        other => return Err(self.unexpected(other)),
                    }
                }
                Ok(Parsed::Terms(terms))
            }
            other => Err(self.unexpected(other)),
        }
    }
}
