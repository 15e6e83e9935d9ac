//! Hand-written, indentation-sensitive lexer for Dana source (spec section 6.1).
//!
//! Dana blocks are delimited by indent/dedent rather than braces, which a
//! single-file PEG grammar does not express cleanly. Indentation tracking
//! lives here so the parser never has to look at raw whitespace.

mod token;

pub use token::{Position, Token, TokenKind};

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use once_cell::sync::Lazy;
use std::collections::HashMap;

static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    use TokenKind::*;
    HashMap::from([
        ("if", If),
        ("elif", Elif),
        ("else", Else),
        ("while", While),
        ("for", For),
        ("in", In),
        ("not", Not),
        ("and", And),
        ("or", Or),
        ("def", Def),
        ("struct", Struct),
        ("resource", Resource),
        ("return", Return),
        ("import", Import),
        ("as", As),
        ("with", With),
        ("try", Try),
        ("except", Except),
        ("finally", Finally),
        ("lambda", Lambda),
        ("pass", Pass),
        ("break", Break),
        ("continue", Continue),
        ("true", True),
        ("false", False),
        ("null", Null),
    ])
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub position: Position,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.position)
    }
}

impl std::error::Error for LexError {}

pub type LexResult<T> = Result<T, LexError>;

/// Tracks nested indentation widths so `Indent`/`Dedent` tokens can be
/// synthesized the way Python's tokenizer does.
struct IndentStack {
    levels: Vec<usize>,
}

impl IndentStack {
    fn new() -> Self {
        Self { levels: vec![0] }
    }
}

pub struct Lexer<'a> {
    iterator: Peekable<Chars<'a>>,
    line: usize,
    col: usize,
    tokens: Vec<Token>,
    indents: IndentStack,
    /// Bracket nesting depth; inside brackets, newlines don't start a new
    /// logical line (same rule Python applies), so indentation is ignored.
    bracket_depth: usize,
    at_line_start: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            iterator: input.chars().peekable(),
            line: 1,
            col: 1,
            tokens: Vec::new(),
            indents: IndentStack::new(),
            bracket_depth: 0,
            at_line_start: true,
        }
    }

    fn pos(&self) -> Position {
        Position::new(self.line, self.col)
    }

    fn peek(&mut self) -> Option<char> {
        self.iterator.peek().copied()
    }

    fn peek2(&mut self) -> Option<char> {
        let mut clone = self.iterator.clone();
        clone.next();
        clone.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.iterator.next();
        if let Some(c) = c {
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
        c
    }

    fn push(&mut self, kind: TokenKind, position: Position) {
        self.tokens.push(Token::new(kind, position));
    }

    pub fn lex(mut self) -> LexResult<Vec<Token>> {
        loop {
            if self.at_line_start && self.bracket_depth == 0 {
                if !self.handle_indentation()? {
                    break; // EOF consumed inside indentation handling
                }
            }

            self.skip_intraline_whitespace_and_comments();

            let Some(c) = self.peek() else {
                self.finish_line_and_eof();
                break;
            };

            if c == '\n' {
                self.advance();
                if self.bracket_depth == 0 {
                    self.push(TokenKind::Newline, self.pos());
                    self.at_line_start = true;
                }
                continue;
            }

            match c {
                'a'..='z' | 'A'..='Z' | '_' => self.lex_ident()?,
                '0'..='9' => self.lex_number()?,
                '"' | '\'' => self.lex_string(c)?,
                _ => self.lex_operator()?,
            }
        }

        self.tokens.push(Token::new(TokenKind::Eof, self.pos()));
        Ok(self.tokens)
    }

    /// Consumes leading whitespace on a fresh logical line and emits the
    /// `Indent`/`Dedent` tokens implied by the change in width. Returns
    /// `false` if the line was blank/comment-only through EOF.
    fn handle_indentation(&mut self) -> LexResult<bool> {
        let mut width = 0usize;
        loop {
            match self.peek() {
                Some(' ') => {
                    width += 1;
                    self.advance();
                }
                Some('\t') => {
                    width += 8;
                    self.advance();
                }
                _ => break,
            }
        }

        match self.peek() {
            None => return Ok(false),
            Some('\n') | Some('#') => {
                // blank or comment-only line: doesn't affect indentation
                return Ok(true);
            }
            _ => {}
        }

        let position = self.pos();
        let current = *self.indents.levels.last().unwrap();
        if width > current {
            self.indents.levels.push(width);
            self.push(TokenKind::Indent, position);
        } else {
            while width < *self.indents.levels.last().unwrap() {
                self.indents.levels.pop();
                self.push(TokenKind::Dedent, position);
            }
            if width != *self.indents.levels.last().unwrap() {
                return Err(LexError {
                    message: "inconsistent indentation".to_string(),
                    position,
                });
            }
        }

        self.at_line_start = false;
        Ok(true)
    }

    fn finish_line_and_eof(&mut self) {
        let position = self.pos();
        while self.indents.levels.len() > 1 {
            self.indents.levels.pop();
            self.push(TokenKind::Dedent, position);
        }
    }

    fn skip_intraline_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.advance();
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_ident(&mut self) -> LexResult<()> {
        let position = self.pos();
        let mut buf = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                buf.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let kind = KEYWORDS
            .get(buf.as_str())
            .cloned()
            .unwrap_or(TokenKind::Ident(buf));
        self.push(kind, position);
        Ok(())
    }

    fn lex_number(&mut self) -> LexResult<()> {
        let position = self.pos();
        let mut buf = String::new();
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                buf.push(c);
                self.advance();
            } else if c == '.' && !is_float && matches!(self.peek2(), Some(d) if d.is_ascii_digit())
            {
                is_float = true;
                buf.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if is_float {
            let value: f64 = buf.parse().map_err(|_| LexError {
                message: format!("invalid float literal '{buf}'"),
                position,
            })?;
            self.push(TokenKind::Float(value), position);
        } else {
            let value: i64 = buf.parse().map_err(|_| LexError {
                message: format!("invalid integer literal '{buf}'"),
                position,
            })?;
            self.push(TokenKind::Int(value), position);
        }
        Ok(())
    }

    fn lex_string(&mut self, quote: char) -> LexResult<()> {
        let position = self.pos();
        self.advance(); // opening quote
        let mut buf = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(LexError {
                        message: "unterminated string literal".to_string(),
                        position,
                    })
                }
                Some(c) if c == quote => break,
                Some('\\') => {
                    let escaped = self.advance().ok_or_else(|| LexError {
                        message: "unterminated escape sequence".to_string(),
                        position,
                    })?;
                    buf.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '"' => '"',
                        '\'' => '\'',
                        '\\' => '\\',
                        '0' => '\0',
                        other => other,
                    });
                }
                Some(c) => buf.push(c),
            }
        }
        self.push(TokenKind::Str(buf), position);
        Ok(())
    }

    fn lex_operator(&mut self) -> LexResult<()> {
        let position = self.pos();
        let c = self.advance().unwrap();
        let kind = match c {
            '(' => {
                self.bracket_depth += 1;
                TokenKind::LParen
            }
            ')' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                TokenKind::RParen
            }
            '[' => {
                self.bracket_depth += 1;
                TokenKind::LBracket
            }
            ']' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                TokenKind::RBracket
            }
            '{' => {
                self.bracket_depth += 1;
                TokenKind::LBrace
            }
            '}' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                TokenKind::RBrace
            }
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '%' => TokenKind::Percent,
            '|' => TokenKind::Pipe,
            '+' => self.maybe_eq('=', TokenKind::PlusEq, TokenKind::Plus),
            '-' => {
                if self.peek() == Some('>') {
                    self.advance();
                    TokenKind::Arrow
                } else {
                    self.maybe_eq('=', TokenKind::MinusEq, TokenKind::Minus)
                }
            }
            '*' => {
                if self.peek() == Some('*') {
                    self.advance();
                    TokenKind::StarStar
                } else {
                    self.maybe_eq('=', TokenKind::StarEq, TokenKind::Star)
                }
            }
            '/' => self.maybe_eq('=', TokenKind::SlashEq, TokenKind::Slash),
            '=' => self.maybe_eq('=', TokenKind::EqEq, TokenKind::Eq),
            '!' => {
                if self.peek() == Some('=') {
                    self.advance();
                    TokenKind::NotEq
                } else {
                    return Err(LexError {
                        message: "unexpected '!'".to_string(),
                        position,
                    });
                }
            }
            '<' => self.maybe_eq('=', TokenKind::LtEq, TokenKind::Lt),
            '>' => self.maybe_eq('=', TokenKind::GtEq, TokenKind::Gt),
            other => {
                return Err(LexError {
                    message: format!("unexpected character '{other}'"),
                    position,
                })
            }
        };
        self.push(kind, position);
        Ok(())
    }

    fn maybe_eq(&mut self, next: char, then: TokenKind, otherwise: TokenKind) -> TokenKind {
        if self.peek() == Some(next) {
            self.advance();
            then
        } else {
            otherwise
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .lex()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_assignment() {
        assert_eq!(
            kinds("x = 10\n"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Eq,
                TokenKind::Int(10),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_scoped_name() {
        assert_eq!(
            kinds("public:y"),
            vec![
                TokenKind::Ident("public".into()),
                TokenKind::Colon,
                TokenKind::Ident("y".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_indent_and_dedent() {
        let toks = kinds("if x:\n    y = 1\nz = 2\n");
        assert!(toks.contains(&TokenKind::Indent));
        assert!(toks.contains(&TokenKind::Dedent));
    }

    #[test]
    fn lexes_not_in_as_two_tokens() {
        assert_eq!(
            kinds("a not in b"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Not,
                TokenKind::In,
                TokenKind::Ident("b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_string_escapes() {
        assert_eq!(
            kinds(r#""a\nb""#),
            vec![TokenKind::Str("a\nb".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn brackets_suppress_newlines() {
        let toks = kinds("x = [1,\n2]\n");
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Eq,
                TokenKind::LBracket,
                TokenKind::Int(1),
                TokenKind::Comma,
                TokenKind::Int(2),
                TokenKind::RBracket,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }
}
