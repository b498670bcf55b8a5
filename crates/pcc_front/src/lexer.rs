//! Minimal single-file tokenizer collaborator.
//!
//! `spec.md` names the tokenizer's responsibility ("streams tokens with
//! category + sub-type") but leaves it, the file-inclusion driver, and the
//! listing/error-file setup out of the core's scope. This is a concrete but
//! deliberately small realization: one in-memory source buffer, no `{$I
//! file}` inclusion. It exists so the core can be driven and tested; the
//! interesting engineering in this crate is in [`crate::codegen`] and
//! [`crate::symtab`], not here.

use pcc_base::{Interner, Span};

use crate::token::{ReservedWord, Token, TokenKind};

#[derive(Clone)]
pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.pos += 1;
                }
                Some(b'{') => {
                    while self.peek().is_some() && self.peek() != Some(b'}') {
                        self.pos += 1;
                    }
                    if self.peek() == Some(b'}') {
                        self.pos += 1;
                    }
                }
                Some(b'(') if self.peek_at(1) == Some(b'*') => {
                    self.pos += 2;
                    while self.pos < self.bytes.len()
                        && !(self.peek() == Some(b'*') && self.peek_at(1) == Some(b')'))
                    {
                        self.pos += 1;
                    }
                    self.pos = (self.pos + 2).min(self.bytes.len());
                }
                _ => break,
            }
        }
    }

    /// Returns the next token, interning identifiers/strings via `interner`.
    ///
    /// # Errors
    ///
    /// Returns a lexical error message for unterminated strings and
    /// malformed numbers (`spec.md` §7's Lexical taxonomy).
    pub fn next_token(&mut self, interner: &mut Interner) -> Result<Token, (String, Span)> {
        self.skip_trivia();
        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok(Token::new(TokenKind::Eof, Span::new(start, start)));
        };

        if c.is_ascii_alphabetic() || c == b'_' {
            return Ok(self.lex_identifier(interner, start));
        }
        if c.is_ascii_digit() {
            return self.lex_number(start);
        }
        if c == b'\'' {
            return self.lex_string(interner, start);
        }

        self.pos += 1;
        let two = self.peek();
        let kind = match (c, two) {
            (b':', Some(b'=')) => {
                self.pos += 1;
                TokenKind::Assign
            }
            (b'<', Some(b'=')) => {
                self.pos += 1;
                TokenKind::Le
            }
            (b'>', Some(b'=')) => {
                self.pos += 1;
                TokenKind::Ge
            }
            (b'<', Some(b'>')) => {
                self.pos += 1;
                TokenKind::Ne
            }
            (b'.', Some(b'.')) => {
                self.pos += 1;
                TokenKind::DotDot
            }
            (b':', _) => TokenKind::Colon,
            (b'<', _) => TokenKind::Lt,
            (b'>', _) => TokenKind::Gt,
            (b'.', _) => TokenKind::Dot,
            (b'+', _) => TokenKind::Plus,
            (b'-', _) => TokenKind::Minus,
            (b'*', _) => TokenKind::Star,
            (b'/', _) => TokenKind::Slash,
            (b'=', _) => TokenKind::Eq,
            (b'(', _) => TokenKind::LParen,
            (b')', _) => TokenKind::RParen,
            (b'[', _) => TokenKind::LBracket,
            (b']', _) => TokenKind::RBracket,
            (b',', _) => TokenKind::Comma,
            (b';', _) => TokenKind::Semicolon,
            (b'^', _) => TokenKind::Caret,
            (b'@', _) => TokenKind::At,
            _ => {
                return Err((
                    format!("illegal character '{}'", c as char),
                    Span::new(start, self.pos),
                ))
            }
        };
        Ok(Token::new(kind, Span::new(start, self.pos)))
    }

    fn lex_identifier(&mut self, interner: &mut Interner, start: usize) -> Token {
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.source[start..self.pos];
        let lower = text.to_ascii_lowercase();
        let kind = match ReservedWord::lookup(&lower) {
            Some(rw) => TokenKind::Reserved(rw),
            None => TokenKind::Identifier(interner.intern(&lower)),
        };
        Token::new(kind, Span::new(start, self.pos))
    }

    fn lex_number(&mut self, start: usize) -> Result<Token, (String, Span)> {
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        let mut is_real = false;
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            is_real = true;
            self.pos += 1;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            is_real = true;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text = &self.source[start..self.pos];
        if is_real {
            let value: f64 = text
                .parse()
                .map_err(|_| (format!("malformed real literal '{text}'"), Span::new(start, self.pos)))?;
            Ok(Token::new(TokenKind::RealLit(value), Span::new(start, self.pos)))
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| (format!("malformed integer literal '{text}'"), Span::new(start, self.pos)))?;
            Ok(Token::new(TokenKind::IntegerLit(value), Span::new(start, self.pos)))
        }
    }

    fn lex_string(&mut self, interner: &mut Interner, start: usize) -> Result<Token, (String, Span)> {
        self.pos += 1; // opening quote
        let mut text = String::new();
        loop {
            match self.advance() {
                Some(b'\'') => {
                    if self.peek() == Some(b'\'') {
                        self.pos += 1;
                        text.push('\'');
                    } else {
                        break;
                    }
                }
                Some(c) => text.push(c as char),
                None => {
                    return Err((
                        "unterminated string literal".to_string(),
                        Span::new(start, self.pos),
                    ))
                }
            }
        }
        // A single-character literal in backtick-free Pascal source is the
        // quoted form too; the caller (Expression::factor) decides whether a
        // 1-byte StringLit should be treated as a Char constant by context.
        if text.len() == 1 {
            let sym = interner.intern(&text);
            return Ok(Token::new(TokenKind::StringLit(sym), Span::new(start, self.pos)));
        }
        let sym = interner.intern(&text);
        Ok(Token::new(TokenKind::StringLit(sym), Span::new(start, self.pos)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(src: &str) -> Vec<TokenKind> {
        let mut interner = Interner::new();
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token(&mut interner).unwrap();
            let done = matches!(tok.kind, TokenKind::Eof);
            out.push(tok.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn tokenizes_assignment() {
        let toks = lex_all("x := 3 + 4");
        assert!(matches!(toks[0], TokenKind::Identifier(_)));
        assert_eq!(toks[1], TokenKind::Assign);
        assert_eq!(toks[2], TokenKind::IntegerLit(3));
        assert_eq!(toks[3], TokenKind::Plus);
        assert_eq!(toks[4], TokenKind::IntegerLit(4));
    }

    #[test]
    fn recognizes_two_char_operators() {
        let toks = lex_all("<= >= <> ..");
        assert_eq!(toks, vec![TokenKind::Le, TokenKind::Ge, TokenKind::Ne, TokenKind::DotDot, TokenKind::Eof]);
    }

    #[test]
    fn reserved_words_are_case_insensitive() {
        let toks = lex_all("BEGIN begin BeGiN");
        for t in &toks[..3] {
            assert_eq!(*t, TokenKind::Reserved(ReservedWord::Begin));
        }
    }

    #[test]
    fn real_literal_with_exponent() {
        let toks = lex_all("1.5e10");
        assert_eq!(toks[0], TokenKind::RealLit(1.5e10));
    }

    #[test]
    fn string_literal_with_doubled_quote() {
        let mut interner = Interner::new();
        let mut lexer = Lexer::new("'it''s'");
        let tok = lexer.next_token(&mut interner).unwrap();
        match tok.kind {
            TokenKind::StringLit(sym) => assert_eq!(interner.resolve(sym), "it's"),
            other => panic!("expected string literal, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let mut interner = Interner::new();
        let mut lexer = Lexer::new("'abc");
        assert!(lexer.next_token(&mut interner).is_err());
    }
}
