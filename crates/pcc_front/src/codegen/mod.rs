//! Single-pass recursive-descent compiler: parses and emits in the same
//! walk, with no persistent AST (`spec.md` §1: "a single-pass compiler").
//!
//! [`Context`] is the shared state every sub-walker (`expr`, `stmt`,
//! `initializer`, `stdlib`) borrows: the token cursor, the symbol table, the
//! interner, the emitter, and the diagnostic bag. Keeping it in one struct
//! instead of threading five parameters through every function mirrors the
//! teacher's own `CodegenContext` shape.

pub mod expr;
pub mod initializer;
pub mod stdlib;
pub mod stmt;

use pcc_base::{Interner, Span};

use crate::analysis::ExprType;
use crate::diagnostic::{Diagnostic, DiagnosticBag};
use crate::emitter::{Emitter, LabelId};
use crate::lexer::Lexer;
use crate::objectsink::ObjectSink;
use crate::symtab::{StandardEnv, SymTab, SymbolId, TableBase};
use crate::token::{Token, TokenKind};

pub struct Context<'src, 'sink, S: ObjectSink> {
    lexer: Lexer<'src>,
    current: Token,
    pub interner: Interner,
    pub symtab: SymTab,
    pub emitter: Emitter<'sink, S>,
    pub diagnostics: DiagnosticBag,
    pub env: StandardEnv,
    /// Static nesting level of the code currently being generated.
    pub level: u16,
    /// Running data-stack high-water offset at the current level, used to
    /// allocate locals and scratch slots (`spec.md` §3.3).
    pub next_offset: i32,
}

impl<'src, 'sink, S: ObjectSink> Context<'src, 'sink, S> {
    pub fn new(source: &'src str, sink: &'sink mut S) -> Self {
        let mut interner = Interner::new();
        let mut symtab = SymTab::new();
        let env = crate::symtab::prime_standard_environment(&mut symtab, &mut interner);
        let mut lexer = Lexer::new(source);
        let current = lexer
            .next_token(&mut interner)
            .unwrap_or_else(|(msg, span)| {
                // the very first token failing to lex is reported once the
                // bag exists; stash an Eof so parsing can still proceed.
                log::error!("{msg} at {span:?}");
                Token::new(TokenKind::Eof, span)
            });
        Context {
            lexer,
            current,
            interner,
            symtab,
            emitter: Emitter::new(sink),
            diagnostics: DiagnosticBag::new(),
            env,
            level: 0,
            next_offset: 0,
        }
    }

    pub fn peek(&self) -> &TokenKind {
        &self.current.kind
    }

    pub fn span(&self) -> Span {
        self.current.span
    }

    pub fn advance(&mut self) -> Token {
        let next = self.lexer.next_token(&mut self.interner).unwrap_or_else(|(msg, span)| {
            let tok = Token::new(TokenKind::Eof, span);
            self.diagnostics.push(Diagnostic::lexical(msg, span));
            tok
        });
        std::mem::replace(&mut self.current, next)
    }

    /// Consumes the current token if it matches `kind`, else records a
    /// syntax diagnostic and leaves the cursor where it is (so later
    /// `expect` calls can still find whatever recovery point comes next).
    pub fn expect(&mut self, kind: TokenKind, what: &str) -> Token {
        if self.current.kind == kind {
            self.advance()
        } else {
            let span = self.span();
            self.diagnostics
                .push(Diagnostic::syntax(format!("expected {what}, found {:?}", self.current.kind), span));
            self.current.clone()
        }
    }

    pub fn at(&self, kind: &TokenKind) -> bool {
        &self.current.kind == kind
    }

    /// Looks one token past the current one without consuming it. Used to
    /// disambiguate a subrange type denoter's lower bound (an identifier
    /// naming a constant, immediately followed by `..`) from a named type
    /// reference, both of which start with a bare identifier.
    pub fn peek_second(&mut self) -> TokenKind {
        let mut lookahead = self.lexer.clone();
        lookahead.next_token(&mut self.interner).map(|t| t.kind).unwrap_or(TokenKind::Eof)
    }

    pub fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(&kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn new_label(&mut self) -> LabelId {
        self.emitter.new_label()
    }

    pub fn table_base(&self) -> TableBase {
        self.symtab.table_base()
    }

    pub fn find_symbol(&self, name: pcc_base::Symbol, base: TableBase) -> Option<SymbolId> {
        self.symtab.find_symbol(name, base)
    }

    pub fn error_type(&mut self, message: impl Into<String>, span: Span) -> ExprType {
        self.diagnostics.push(Diagnostic::type_error(message, span));
        ExprType::error()
    }
}
