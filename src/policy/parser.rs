//! Recursive-descent parser producing a [`PolicyExpr`] tree
//!
//! ```text
//! Policy         := Combinator
//! Combinator     := "AND" "(" Term ("," Term)* ")"
//!                 | "OR"  "(" Term ("," Term)* ")"
//!                 | "OutOf" "(" Int "," Term ("," Term)* ")"
//! Term           := Combinator | QuotedIdentity
//! QuotedIdentity := "'" OrgId "." Role "'"
//! ```

use super::lexer::{tokenize, Token, TokenKind};
use super::{Principal, PolicyExpr, Role};
use crate::error::PolicyParseError;

const COMBINATORS: [&str; 3] = ["AND", "OR", "OutOf"];
const TERM: [&str; 4] = ["quoted identity", "AND", "OR", "OutOf"];

/// Parse a policy expression into its syntax tree.
pub fn parse(input: &str) -> Result<PolicyExpr, PolicyParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        cursor: 0,
        end: input.len(),
    };

    let expr = parser.combinator()?;
    if let Some(extra) = parser.peek() {
        return Err(PolicyParseError::new(
            extra.position,
            Some(extra.text()),
            vec!["end of policy"],
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    /// Reported position for end-of-input errors
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn error_at(&self, token: Option<&Token>, expected: &[&'static str]) -> PolicyParseError {
        match token {
            Some(token) => PolicyParseError::new(token.position, Some(token.text()), expected.to_vec()),
            None => PolicyParseError::new(self.end, None, expected.to_vec()),
        }
    }

    fn expect(&mut self, kind: TokenKind, label: &'static str) -> Result<(), PolicyParseError> {
        if self.peek().map(|t| &t.kind) == Some(&kind) {
            self.cursor += 1;
            Ok(())
        } else {
            Err(self.error_at(self.peek(), &[label]))
        }
    }

    fn combinator(&mut self) -> Result<PolicyExpr, PolicyParseError> {
        let keyword = match self.peek() {
            Some(Token {
                kind: TokenKind::Word(word),
                ..
            }) if COMBINATORS.contains(&word.as_str()) => word.clone(),
            other => return Err(self.error_at(other, &COMBINATORS)),
        };
        self.next();
        self.expect(TokenKind::LParen, "(")?;

        let threshold = if keyword == "OutOf" {
            let threshold = self.threshold()?;
            self.expect(TokenKind::Comma, ",")?;
            Some(threshold)
        } else {
            None
        };

        let mut terms = vec![self.term()?];
        loop {
            match self.peek().map(|t| t.kind.clone()) {
                Some(TokenKind::Comma) => {
                    self.next();
                    terms.push(self.term()?);
                }
                Some(TokenKind::RParen) => {
                    self.next();
                    break;
                }
                _ => return Err(self.error_at(self.peek(), &[",", ")"])),
            }
        }

        Ok(match threshold {
            Some(n) => PolicyExpr::OutOf(n, terms),
            None if keyword == "AND" => PolicyExpr::And(terms),
            None => PolicyExpr::Or(terms),
        })
    }

    fn threshold(&mut self) -> Result<u32, PolicyParseError> {
        let digits = match self.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::Int(digits)) => digits,
            _ => return Err(self.error_at(self.peek(), &["integer"])),
        };
        // The wire field is an int32
        match digits.parse::<i32>() {
            Ok(n) => {
                self.next();
                Ok(n as u32)
            }
            Err(_) => Err(self.error_at(self.peek(), &["integer"])),
        }
    }

    fn term(&mut self) -> Result<PolicyExpr, PolicyParseError> {
        match self.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::Quoted(inner)) => {
                let position = self.peek().map_or(self.end, |t| t.position);
                self.next();
                parse_identity(&inner, position).map(PolicyExpr::Identity)
            }
            Some(TokenKind::Word(word)) if COMBINATORS.contains(&word.as_str()) => {
                self.combinator()
            }
            _ => Err(self.error_at(self.peek(), &TERM)),
        }
    }
}

/// Split `Org1MSP.member` at the last dot into organization and role.
fn parse_identity(inner: &str, position: usize) -> Result<Principal, PolicyParseError> {
    let invalid = |expected: Vec<&'static str>| {
        PolicyParseError::new(position, Some(format!("'{}'", inner)), expected)
    };

    let (org, role) = inner
        .rsplit_once('.')
        .ok_or_else(|| invalid(vec!["'<mspid>.<role>'"]))?;
    if org.is_empty() {
        return Err(invalid(vec!["'<mspid>.<role>'"]));
    }
    let role = Role::from_keyword(role).ok_or_else(|| invalid(Role::KEYWORDS.to_vec()))?;

    Ok(Principal {
        msp_id: org.to_string(),
        role,
    })
}
