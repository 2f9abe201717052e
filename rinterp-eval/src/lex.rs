//! A small Rust lexer, precise enough to find delimiters and item
//! boundaries in REPL input.
//!
//! Whitespace and comments are dropped. String, raw string, byte and char
//! literals each become one token, so delimiters inside them never count.
//! Lifetimes and labels (`'a`, `'outer`) are told apart from char literals.

use logos::{FilterResult, Lexer, Logos};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident,
    Lifetime,
    Literal,
    Punct(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte range in the source.
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn is_punct(self, c: char) -> bool {
        self.kind == TokenKind::Punct(c)
    }

    pub fn text(self, src: &str) -> &str {
        &src[self.start..self.end]
    }
}

#[derive(Debug, Default)]
pub(crate) struct Lexed {
    pub tokens: Vec<Token>,
    /// A string literal or block comment runs off the end of the input.
    pub unterminated: bool,
}

impl Lexed {
    /// Opening `( [ {` minus closing `) ] }`.
    pub fn open_delimiters(&self) -> i32 {
        self.tokens.iter().fold(0, |depth, tok| match tok.kind {
            TokenKind::Punct('(' | '[' | '{') => depth + 1,
            TokenKind::Punct(')' | ']' | '}') => depth - 1,
            _ => depth,
        })
    }
}

pub(crate) fn tokenize(src: &str) -> Lexed {
    let mut out = Lexed::default();
    for (raw, span) in Raw::lexer(src).spanned() {
        let kind = match raw {
            Ok(Raw::Ident) => TokenKind::Ident,
            Ok(Raw::Lifetime) => TokenKind::Lifetime,
            Ok(Raw::Str | Raw::RawStr | Raw::Char | Raw::Number) => TokenKind::Literal,
            Ok(Raw::Punct) | Err(LexError::Unexpected) => {
                let Some(c) = src[span.start..].chars().next() else {
                    continue;
                };
                TokenKind::Punct(c)
            }
            Ok(Raw::LineComment | Raw::BlockComment) => continue,
            Err(LexError::Unterminated) => {
                out.unterminated = true;
                continue;
            }
        };
        out.tokens.push(Token {
            kind,
            start: span.start,
            end: span.end,
        });
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum LexError {
    /// A lone `'` or anything else no rule matches.
    #[default]
    Unexpected,
    Unterminated,
}

fn line_comment(_lex: &mut Lexer<'_, Raw>) -> logos::Skip {
    logos::Skip
}

/// Block comments nest.
fn block_comment(lex: &mut Lexer<'_, Raw>) -> FilterResult<(), LexError> {
    let bytes = lex.remainder().as_bytes();
    let mut depth: u32 = 1;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i..].starts_with(b"/*") {
            depth += 1;
            i += 2;
        } else if bytes[i..].starts_with(b"*/") {
            depth -= 1;
            if depth == 0 {
                lex.bump(i + 2);
                return FilterResult::Skip;
            }
            i += 2;
        } else {
            i += 1;
        }
    }
    lex.bump(bytes.len());
    FilterResult::Error(LexError::Unterminated)
}

/// Rest of a `"..."` literal after its opening quote.
fn quoted(lex: &mut Lexer<'_, Raw>) -> Result<(), LexError> {
    let bytes = lex.remainder().as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => {
                lex.bump(i + 1);
                return Ok(());
            }
            _ => i += 1,
        }
    }
    lex.bump(bytes.len());
    Err(LexError::Unterminated)
}

/// Rest of an `r#"..."#` literal; the closing quote needs as many `#` as
/// the opening one.
fn raw_string(lex: &mut Lexer<'_, Raw>) -> Result<(), LexError> {
    let hashes = lex.slice().bytes().filter(|&b| b == b'#').count();
    let closing = format!("\"{}", "#".repeat(hashes));
    if let Some(at) = lex.remainder().find(&closing) {
        lex.bump(at + closing.len());
        Ok(())
    } else {
        let rest = lex.remainder().len();
        lex.bump(rest);
        Err(LexError::Unterminated)
    }
}

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(error = LexError)]
#[logos(skip r"\s+")]
enum Raw {
    #[regex(r"//[^\n]*", line_comment, allow_greedy = true)]
    LineComment,
    #[token("/*", block_comment)]
    BlockComment,
    #[regex(r#"[bc]?""#, quoted)]
    Str,
    #[regex(r#"[bc]?r#*""#, raw_string)]
    RawStr,
    #[regex(r"b?'([^'\\\n]|\\[^\n]|\\u\{[0-9a-fA-F_]*\})'")]
    Char,
    #[regex(r"'[\p{L}_][\p{L}\p{N}_]*")]
    Lifetime,
    #[regex(r"[0-9][0-9a-zA-Z_]*(\.[0-9][0-9a-zA-Z_]*)?")]
    Number,
    #[regex(r"[\p{L}_][\p{L}\p{N}_]*")]
    Ident,
    /// One character of punctuation.
    #[regex(r#"[^\s\p{L}\p{N}_'"]"#)]
    Punct,
}
