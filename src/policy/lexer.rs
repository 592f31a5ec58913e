//! Tokenizer for endorsement policy expressions

use crate::error::PolicyParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    /// Bare word: a combinator keyword or a stray identifier
    Word(String),
    /// Unsigned decimal literal
    Int(String),
    /// Contents of a single-quoted identity, quotes stripped
    Quoted(String),
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character
    pub position: usize,
}

impl Token {
    /// Source text of the token, used in error reports.
    pub fn text(&self) -> String {
        match &self.kind {
            TokenKind::Word(word) => word.clone(),
            TokenKind::Int(digits) => digits.clone(),
            TokenKind::Quoted(inner) => format!("'{}'", inner),
            TokenKind::LParen => "(".to_string(),
            TokenKind::RParen => ")".to_string(),
            TokenKind::Comma => ",".to_string(),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, PolicyParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let kind = match c {
            '(' => {
                chars.next();
                TokenKind::LParen
            }
            ')' => {
                chars.next();
                TokenKind::RParen
            }
            ',' => {
                chars.next();
                TokenKind::Comma
            }
            '\'' => {
                chars.next();
                let start = position + 1;
                let mut end = None;
                for (idx, ch) in chars.by_ref() {
                    if ch == '\'' {
                        end = Some(idx);
                        break;
                    }
                }
                match end {
                    Some(end) => TokenKind::Quoted(input[start..end].to_string()),
                    None => {
                        return Err(PolicyParseError::new(
                            position,
                            Some(input[position..].to_string()),
                            vec!["closing quote"],
                        ))
                    }
                }
            }
            c if is_word_char(c) => {
                let mut end = input.len();
                while let Some(&(idx, ch)) = chars.peek() {
                    if !is_word_char(ch) {
                        end = idx;
                        break;
                    }
                    chars.next();
                }
                let word = &input[position..end];
                if word.bytes().all(|b| b.is_ascii_digit()) {
                    TokenKind::Int(word.to_string())
                } else {
                    TokenKind::Word(word.to_string())
                }
            }
            other => {
                return Err(PolicyParseError::new(
                    position,
                    Some(other.to_string()),
                    Vec::new(),
                ))
            }
        };

        tokens.push(Token { kind, position });
    }

    Ok(tokens)
}
