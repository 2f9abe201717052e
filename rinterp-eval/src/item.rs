//! Opening up declarations so later generations can reach them.
//!
//! A later generation sees only what an earlier unit exports, so every
//! top-level item in a declaration gets `pub` unless it already names a
//! visibility. Outer attributes and doc comments stay in front of the
//! inserted `pub`. Fields of structs and members of inherent `impl` blocks
//! are opened up the same way, and `macro_rules!` definitions get
//! `#[macro_export]`. Trait impls and macro invocations are left as
//! written.

use crate::lex::{self, Token, TokenKind};

const PUB: &str = "pub ";
const MACRO_EXPORT: &str = "#[macro_export]\n";

/// `raw_input` with each top-level item exported.
///
/// Input with no tokens at all (blank, or only comments) still gets the
/// `pub` prefix, which no compiler accepts as an item.
pub(crate) fn export_items(raw_input: &str) -> String {
    let tokens = lex::tokenize(raw_input).tokens;
    if tokens.is_empty() {
        return format!("{PUB}{raw_input}");
    }

    let mut scan = Scan {
        src: raw_input,
        tokens: &tokens,
        inserts: Vec::new(),
    };
    let mut i = 0;
    while i < tokens.len() {
        i = scan.item(i);
    }

    let mut inserts = scan.inserts;
    inserts.sort_by_key(|&(at, _)| at);
    let mut out = String::with_capacity(raw_input.len() + inserts.len() * PUB.len());
    let mut copied = 0;
    for (at, text) in inserts {
        out.push_str(&raw_input[copied..at]);
        out.push_str(text);
        copied = at;
    }
    out.push_str(&raw_input[copied..]);
    out
}

struct Scan<'a> {
    src: &'a str,
    tokens: &'a [Token],
    /// Byte offset and text to insert there.
    inserts: Vec<(usize, &'static str)>,
}

impl<'a> Scan<'a> {
    fn ident(&self, i: usize) -> Option<&'a str> {
        let src = self.src;
        self.tokens
            .get(i)
            .filter(|t| t.kind == TokenKind::Ident)
            .map(|t| t.text(src))
    }

    fn punct(&self, i: usize, c: char) -> bool {
        self.tokens.get(i).is_some_and(|t| t.is_punct(c))
    }

    /// A `>` that is the second half of `->`.
    fn arrow(&self, i: usize) -> bool {
        i > 0 && self.punct(i - 1, '-') && self.tokens[i - 1].end == self.tokens[i].start
    }

    fn insert_before(&mut self, i: usize, text: &'static str) {
        self.inserts.push((self.tokens[i].start, text));
    }

    /// Index of the delimiter closing the one at `open`.
    fn matching(&self, open: usize) -> Option<usize> {
        let mut depth = 0;
        for (k, tok) in self.tokens.iter().enumerate().skip(open) {
            match tok.kind {
                TokenKind::Punct('(' | '[' | '{') => depth += 1,
                TokenKind::Punct(')' | ']' | '}') => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(k);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn skip_attributes(&self, mut i: usize) -> usize {
        while self.punct(i, '#') {
            let open = if self.punct(i + 1, '[') {
                i + 1
            } else if self.punct(i + 1, '!') && self.punct(i + 2, '[') {
                i + 2
            } else {
                break;
            };
            match self.matching(open) {
                Some(close) => i = close + 1,
                None => return self.tokens.len(),
            }
        }
        i
    }

    /// Export the item starting at `i`; returns the index past its end.
    fn item(&mut self, i: usize) -> usize {
        if self.punct(i, ';') {
            return i + 1;
        }
        let i = self.skip_attributes(i);
        if i >= self.tokens.len() {
            return i;
        }
        match self.ident(i) {
            Some("pub") => {}
            Some("impl") => self.open_impl(i),
            Some("unsafe") if self.ident(i + 1) == Some("impl") => self.open_impl(i + 1),
            Some("macro_rules") if self.punct(i + 1, '!') => self.insert_before(i, MACRO_EXPORT),
            Some(_) if self.punct(i + 1, '!') => {}
            Some(keyword) => {
                self.insert_before(i, PUB);
                if keyword == "struct" || keyword == "union" {
                    self.open_struct(i);
                }
            }
            None => self.insert_before(i, PUB),
        }
        self.item_end(i)
    }

    /// Past a `;` or a closing brace at depth zero. A brace followed by
    /// something other than the start of another item (`.method()`, `+ 1`)
    /// is part of an expression and does not end the item.
    fn item_end(&self, mut i: usize) -> usize {
        let len = self.tokens.len();
        while let Some(tok) = self.tokens.get(i) {
            match tok.kind {
                TokenKind::Punct(';') => return i + 1,
                TokenKind::Punct('(' | '[') => i = self.matching(i).unwrap_or(len),
                TokenKind::Punct('{') => {
                    let end = self.matching(i).map_or(len, |close| close + 1);
                    if self.punct(end, ';') {
                        return end + 1;
                    }
                    let next_item = self
                        .tokens
                        .get(end)
                        .map_or(true, |t| t.kind == TokenKind::Ident || t.is_punct('#'));
                    if next_item {
                        return end;
                    }
                    i = end;
                    continue;
                }
                _ => {}
            }
            i += 1;
        }
        i
    }

    fn skip_generics(&self, mut i: usize) -> usize {
        let mut angle = 0;
        while let Some(tok) = self.tokens.get(i) {
            match tok.kind {
                TokenKind::Punct('<') => angle += 1,
                TokenKind::Punct('>') if !self.arrow(i) => {
                    angle -= 1;
                    if angle == 0 {
                        return i + 1;
                    }
                }
                TokenKind::Punct('(' | '[' | '{') => match self.matching(i) {
                    Some(close) => i = close,
                    None => return self.tokens.len(),
                },
                _ => {}
            }
            i += 1;
        }
        i
    }

    /// `keyword` is the index of `struct` or `union`.
    fn open_struct(&mut self, keyword: usize) {
        let mut i = keyword + 2;
        if self.punct(i, '<') {
            i = self.skip_generics(i);
        }
        if !self.punct(i, '(') {
            // Brace body, possibly after a `where` clause.
            loop {
                let Some(tok) = self.tokens.get(i) else { return };
                match tok.kind {
                    TokenKind::Punct('{') => break,
                    TokenKind::Punct(';') => return,
                    TokenKind::Punct('(' | '[') => match self.matching(i) {
                        Some(close) => i = close,
                        None => return,
                    },
                    _ => {}
                }
                i += 1;
            }
        }
        if let Some(close) = self.matching(i) {
            self.open_fields(i, close);
        }
    }

    fn open_fields(&mut self, open: usize, close: usize) {
        let mut i = open + 1;
        while i < close {
            i = self.skip_attributes(i);
            if i >= close {
                break;
            }
            if self.ident(i) != Some("pub") {
                self.insert_before(i, PUB);
            }
            i = self.next_field(i, close);
        }
    }

    /// Index past the `,` that ends the field starting at `i`.
    fn next_field(&self, mut i: usize, close: usize) -> usize {
        let mut angle = 0;
        while i < close {
            match self.tokens[i].kind {
                TokenKind::Punct('(' | '[' | '{') => match self.matching(i) {
                    Some(end) => i = end,
                    None => return close,
                },
                TokenKind::Punct('<') => angle += 1,
                TokenKind::Punct('>') if !self.arrow(i) => angle -= 1,
                TokenKind::Punct(',') if angle <= 0 => return i + 1,
                _ => {}
            }
            i += 1;
        }
        close
    }

    /// `keyword` is the index of `impl`. Only inherent impls are opened up:
    /// members of a trait impl take the trait's visibility.
    fn open_impl(&mut self, keyword: usize) {
        let mut i = keyword + 1;
        loop {
            let Some(tok) = self.tokens.get(i) else { return };
            match tok.kind {
                TokenKind::Punct('{') => break,
                TokenKind::Punct(';') => return,
                TokenKind::Punct('(' | '[') => match self.matching(i) {
                    Some(close) => i = close,
                    None => return,
                },
                // `for<'a>` is a higher-ranked bound, not a trait impl.
                TokenKind::Ident if tok.text(self.src) == "for" && !self.punct(i + 1, '<') => {
                    return;
                }
                _ => {}
            }
            i += 1;
        }
        let Some(close) = self.matching(i) else { return };

        let mut member = i + 1;
        while member < close {
            member = self.skip_attributes(member);
            if member >= close {
                break;
            }
            if matches!(
                self.ident(member),
                Some("fn" | "const" | "type" | "unsafe" | "async" | "extern")
            ) {
                self.insert_before(member, PUB);
            }
            member = self.member_end(member, close);
        }
    }

    fn member_end(&self, mut i: usize, close: usize) -> usize {
        while i < close {
            match self.tokens[i].kind {
                TokenKind::Punct(';') => return i + 1,
                TokenKind::Punct('{') => {
                    let end = self.matching(i).map_or(close, |c| c + 1);
                    return if self.punct(end, ';') { end + 1 } else { end };
                }
                TokenKind::Punct('(' | '[') => i = self.matching(i).unwrap_or(close),
                _ => {}
            }
            i += 1;
        }
        close
    }
}
