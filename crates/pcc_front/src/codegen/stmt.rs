//! Statement compiler (`spec.md` §4.4): assignment, `IF`, `CASE`,
//! `WHILE`/`REPEAT`/`FOR`, `WITH`, `GOTO`, and compound statements.
//!
//! Every construct that can merge two control-flow paths (`IF`/`THEN`/
//! `ELSE`, the end of a loop body looping back to its test) calls
//! [`crate::emitter::Emitter::invalidate_level`] before falling through to
//! shared code, so a later variable reference re-derives its level instead
//! of trusting a cache that might be stale on one of the merged paths
//! (`spec.md` §9's LSP-cache design note).

use crate::analysis::{ExprBase, ExprType};
use crate::emitter::JumpKind;
use crate::objectsink::ObjectSink;
use crate::symtab::{SymbolId, SymbolKind};
use crate::token::{ReservedWord, TokenKind};

use super::Context;

impl<'src, 'sink, S: ObjectSink> Context<'src, 'sink, S> {
    /// `statement -> assignment | if | case | while | repeat | for | with
    /// | goto | compound | proc_call | label ':' statement | <empty>`
    pub fn parse_statement(&mut self) {
        if let TokenKind::IntegerLit(n) = self.peek() {
            let n = *n;
            let span = self.span();
            self.advance();
            self.expect(TokenKind::Colon, "':' after statement label");
            if let Some(id) = self.find_label(n) {
                self.symtab.define_label(id);
                self.emitter.emit_label(self.label_id_for(id));
                // `spec.md` §4.4.6: "Because GOTO may enter from anywhere,
                // the LSP is invalidated at every label definition" — a
                // `GOTO` reaching this point from some other statement's
                // control-flow state can't be trusted to agree with
                // whatever LSP was cached just before this label.
                self.emitter.invalidate_level();
            } else {
                self.diagnostics
                    .push(crate::diagnostic::Diagnostic::scope("label not declared in this block", span));
            }
        }
        // Every statement brackets its own emission in a push/pop of the
        // string stack (`spec.md` §3.5, §8 invariant #4): regardless of
        // which branch a control-flow construct takes at runtime, both the
        // push and the pop sit on every path since neither is inside a
        // conditional jump target of its own.
        self.emitter.emit_simple(crate::emitter::SimpleOp::Pushs);
        match self.peek().clone() {
            TokenKind::Reserved(ReservedWord::Begin) => self.parse_compound(),
            TokenKind::Reserved(ReservedWord::If) => self.parse_if(),
            TokenKind::Reserved(ReservedWord::Case) => self.parse_case(),
            TokenKind::Reserved(ReservedWord::While) => self.parse_while(),
            TokenKind::Reserved(ReservedWord::Repeat) => self.parse_repeat(),
            TokenKind::Reserved(ReservedWord::For) => self.parse_for(),
            TokenKind::Reserved(ReservedWord::With) => self.parse_with(),
            TokenKind::Reserved(ReservedWord::Goto) => self.parse_goto(),
            TokenKind::Identifier(name) => self.parse_assignment_or_call(name),
            _ => {}
        }
        self.emitter.emit_simple(crate::emitter::SimpleOp::Pops);
    }

    fn parse_compound(&mut self) {
        self.expect(TokenKind::Reserved(ReservedWord::Begin), "'begin'");
        self.parse_statement();
        while self.eat(TokenKind::Semicolon) {
            self.parse_statement();
        }
        self.expect(TokenKind::Reserved(ReservedWord::End), "'end'");
    }

    fn parse_if(&mut self) {
        self.advance();
        let cond = self.parse_expression();
        if cond.base != ExprBase::Boolean && !cond.is_error() {
            self.diagnostics
                .push(crate::diagnostic::Diagnostic::type_error("IF condition must be boolean", self.span()));
        }
        self.expect(TokenKind::Reserved(ReservedWord::Then), "'then'");
        let else_label = self.new_label();
        self.emitter.emit_jump(JumpKind::Jequz, else_label);
        self.parse_statement();
        if self.eat(TokenKind::Reserved(ReservedWord::Else)) {
            let end_label = self.new_label();
            self.emitter.emit_jump(JumpKind::Jmp, end_label);
            self.emitter.invalidate_level();
            self.emitter.emit_label(else_label);
            self.parse_statement();
            self.emitter.invalidate_level();
            self.emitter.emit_label(end_label);
        } else {
            self.emitter.invalidate_level();
            self.emitter.emit_label(else_label);
        }
    }

    fn parse_case(&mut self) {
        self.advance();
        let selector = self.parse_expression();
        if !selector.is_ordinal() && !selector.is_error() {
            self.diagnostics
                .push(crate::diagnostic::Diagnostic::type_error("CASE selector must be ordinal", self.span()));
        }
        self.expect(TokenKind::Reserved(ReservedWord::Of), "'of'");
        let end_label = self.new_label();
        // `spec.md` §4.4.3 / §8: within one arm's constant list, every
        // constant but the last uses JEQUZ (selector-minus-constant == 0)
        // to jump straight into the body; only the last constant uses
        // JNEQZ to fall through to the *next arm's* test instead of
        // entering the body. `pending_skip` is that last-constant's escape
        // label, placed at the top of the following iteration (or just
        // before `end_label` if this was the final arm).
        let mut pending_skip: Option<crate::emitter::LabelId> = None;
        loop {
            if matches!(self.peek(), TokenKind::Reserved(ReservedWord::End)) {
                break;
            }
            if let Some(skip) = pending_skip.take() {
                self.emitter.invalidate_level();
                self.emitter.emit_label(skip);
            }
            // Non-standard `ELSE` clause (`spec.md` §4.4.3): catches the
            // default when no prior arm's constants matched the selector —
            // exactly the point `pending_skip`'s label was just placed at.
            if self.eat(TokenKind::Reserved(ReservedWord::Else)) {
                self.parse_statement();
                while self.eat(TokenKind::Semicolon) {
                    if matches!(self.peek(), TokenKind::Reserved(ReservedWord::End)) {
                        break;
                    }
                    self.parse_statement();
                }
                break;
            }
            let arm_label = self.new_label();
            loop {
                // Duplicate the selector *before* the constant is parsed
                // and pushed, so `SUB` computes `selector - constant` while
                // leaving the original selector underneath for the next
                // comparison (`spec.md` §4.4.3: "duplicate the value, push
                // each constant").
                self.emitter.emit_simple(crate::emitter::SimpleOp::Dup);
                let _case_const = self.parse_expression();
                self.emitter.emit_simple(crate::emitter::SimpleOp::Sub);
                if self.at(&TokenKind::Comma) {
                    self.emitter.emit_jump(JumpKind::Jequz, arm_label);
                    self.advance();
                } else {
                    let skip_label = self.new_label();
                    self.emitter.emit_jump(JumpKind::Jneqz, skip_label);
                    pending_skip = Some(skip_label);
                    break;
                }
            }
            self.expect(TokenKind::Colon, "':'");
            self.emitter.invalidate_level();
            self.emitter.emit_label(arm_label);
            self.parse_statement();
            self.emitter.emit_jump(JumpKind::Jmp, end_label);
            if !self.eat(TokenKind::Semicolon) {
                break;
            }
        }
        if let Some(skip) = pending_skip {
            self.emitter.invalidate_level();
            self.emitter.emit_label(skip);
        }
        self.expect(TokenKind::Reserved(ReservedWord::End), "'end'");
        self.emitter.invalidate_level();
        self.emitter.emit_label(end_label);
        // `spec.md` §4.4.3: "At end-case, pop the duplicated selector with
        // `INDS -sizeof(int)`" — the selector is still sitting on the data
        // stack regardless of which arm (or the `ELSE` default) ran.
        self.emitter.emit_data_op(crate::emitter::DataOp::Inds, -4);
    }

    fn parse_while(&mut self) {
        self.advance();
        let test_label = self.new_label();
        self.emitter.invalidate_level();
        self.emitter.emit_label(test_label);
        let cond = self.parse_expression();
        if cond.base != ExprBase::Boolean && !cond.is_error() {
            self.diagnostics
                .push(crate::diagnostic::Diagnostic::type_error("WHILE condition must be boolean", self.span()));
        }
        let end_label = self.new_label();
        self.emitter.emit_jump(JumpKind::Jequz, end_label);
        self.expect(TokenKind::Reserved(ReservedWord::Do), "'do'");
        self.parse_statement();
        self.emitter.emit_jump(JumpKind::Jmp, test_label);
        self.emitter.invalidate_level();
        self.emitter.emit_label(end_label);
    }

    fn parse_repeat(&mut self) {
        self.advance();
        let top_label = self.new_label();
        self.emitter.invalidate_level();
        self.emitter.emit_label(top_label);
        self.parse_statement();
        while self.eat(TokenKind::Semicolon) {
            self.parse_statement();
        }
        self.expect(TokenKind::Reserved(ReservedWord::Until), "'until'");
        let cond = self.parse_expression();
        if cond.base != ExprBase::Boolean && !cond.is_error() {
            self.diagnostics
                .push(crate::diagnostic::Diagnostic::type_error("UNTIL condition must be boolean", self.span()));
        }
        self.emitter.emit_jump(JumpKind::Jequz, top_label);
        self.emitter.invalidate_level();
    }

    fn parse_for(&mut self) {
        self.advance();
        let TokenKind::Identifier(name) = self.peek().clone() else {
            self.diagnostics
                .push(crate::diagnostic::Diagnostic::syntax("expected loop variable", self.span()));
            return;
        };
        let span = self.span();
        self.advance();
        let Some(var_id) = self.find_symbol(name, SymbolId(0)) else {
            self.diagnostics.push(crate::diagnostic::Diagnostic::scope("undeclared identifier", span));
            return;
        };
        let (var, decl_level) = match self.symtab.entry(var_id).kind.clone() {
            SymbolKind::Variable(v) => (v, self.symtab.entry(var_id).level),
            _ => {
                self.diagnostics
                    .push(crate::diagnostic::Diagnostic::type_error("FOR variable must be a simple variable", span));
                return;
            }
        };
        self.expect(TokenKind::Assign, "':='");
        let _start = self.parse_expression();
        self.emitter
            .emit_stack_ref(crate::emitter::RefOp::Store, self.level, &var, decl_level);
        let downto = if self.eat(TokenKind::Reserved(ReservedWord::To)) {
            false
        } else {
            self.expect(TokenKind::Reserved(ReservedWord::Downto), "'to' or 'downto'");
            true
        };
        // The bound is evaluated once and stays on the data stack for the
        // whole loop (`spec.md` §4.4.4 / §8 scenario 6): every test
        // duplicates it rather than re-evaluating the bound expression,
        // and the duplicate is dropped by a trailing `INDS` once the loop
        // exits, on every path (boundary behavior: a zero-iteration loop
        // still drops the bound).
        let _bound = self.parse_expression();

        let test_label = self.new_label();
        self.emitter.invalidate_level();
        self.emitter.emit_label(test_label);
        self.emitter.emit_simple(crate::emitter::SimpleOp::Dup);
        self.emitter
            .emit_stack_ref(crate::emitter::RefOp::Load, self.level, &var, decl_level);
        let end_label = self.new_label();
        let cmp = if downto { JumpKind::Jlt } else { JumpKind::Jgt };
        self.emitter.emit_jump(cmp, end_label);

        self.expect(TokenKind::Reserved(ReservedWord::Do), "'do'");
        self.parse_statement();

        self.emitter
            .emit_stack_ref(crate::emitter::RefOp::Load, self.level, &var, decl_level);
        if downto {
            self.emitter.emit_simple(crate::emitter::SimpleOp::Dec);
        } else {
            self.emitter.emit_simple(crate::emitter::SimpleOp::Inc);
        }
        self.emitter
            .emit_stack_ref(crate::emitter::RefOp::Store, self.level, &var, decl_level);
        self.emitter.emit_jump(JumpKind::Jmp, test_label);
        self.emitter.invalidate_level();
        self.emitter.emit_label(end_label);
        self.emitter.emit_data_op(crate::emitter::DataOp::Inds, -4);
    }

    /// `spec.md` §4.4 WITH: opens an explicit scope whose fields become
    /// directly visible, rather than mutating a hidden base-pointer
    /// register the rest of codegen would need to know about
    /// (`spec.md` §9, "WITH context as an explicit scope frame").
    fn parse_with(&mut self) {
        self.advance();
        let base = self.table_base();
        loop {
            let TokenKind::Identifier(name) = self.peek().clone() else {
                break;
            };
            let span = self.span();
            self.advance();
            let Some(record_id) = self.find_symbol(name, SymbolId(0)) else {
                self.diagnostics.push(crate::diagnostic::Diagnostic::scope("undeclared identifier", span));
                break;
            };
            let decl_level = self.symtab.entry(record_id).level;
            let var = match self.symtab.entry(record_id).kind.clone() {
                SymbolKind::Variable(v) => v,
                _ => {
                    self.diagnostics
                        .push(crate::diagnostic::Diagnostic::type_error("WITH requires a record variable", span));
                    break;
                }
            };
            // `WITH recordVar DO` (plain record), `WITH varParmRecord DO`
            // (`spec.md` §4.4.5's second bullet) and `WITH ptrRecord^ DO`
            // (its third bullet) all resolve to a record type, but differ
            // in whether the base is already a runtime address: a `VAR`
            // parameter's own slot holds a hidden pointer, and an explicit
            // `^` after a pointer-typed base loads the pointer's own value
            // — both need every field access to recompute `pointer +
            // field.offset` at runtime, so their aliases carry
            // `var_param = true` with the field's offset folded into
            // `base_field_offset` rather than `offset` (see
            // `codegen/expr.rs::start_access_chain`). A plain record's
            // fields fold their offset into `offset` at compile time, with
            // `base_field_offset` left at zero.
            let (record_type, indirect, base_offset, base_extra) = if self.eat(TokenKind::Caret) {
                if var.flags.var_param {
                    self.diagnostics.push(crate::diagnostic::Diagnostic::type_error(
                        "WITH over a pointer field reached through a VAR parameter or an enclosing WITH is not supported",
                        span,
                    ));
                    break;
                }
                let pointee = match &self.symtab.entry(var.type_sym).kind {
                    SymbolKind::Type(crate::symtab::TypeInfo {
                        tag: crate::symtab::PrimType::Pointer,
                        base_type: Some(pointee),
                        ..
                    }) => *pointee,
                    _ => {
                        self.diagnostics
                            .push(crate::diagnostic::Diagnostic::type_error("'^' applied to a non-pointer", span));
                        break;
                    }
                };
                // `ptrRecord^`: `var`'s own slot holds the pointer's value
                // directly (no pre-existing indirection to chain onto).
                (pointee, true, var.offset, 0)
            } else if var.flags.var_param {
                // A bare `VAR`-parameter record, or a nested `WITH` over a
                // field that was itself aliased indirectly by an enclosing
                // `WITH` (`spec.md` §4.4.5's fourth bullet): `var.offset`
                // still names the original pointer's slot, and
                // `var.base_field_offset` carries whatever offset that
                // enclosing alias had already folded in, which must chain
                // onto each new field's own offset rather than being
                // discarded.
                (var.type_sym, true, var.offset, var.base_field_offset)
            } else {
                (var.type_sym, false, var.offset, 0)
            };
            let fields_head = match &self.symtab.entry(record_type).kind {
                SymbolKind::Type(crate::symtab::TypeInfo {
                    tag: crate::symtab::PrimType::Record,
                    base_type,
                    ..
                }) => *base_type,
                _ => {
                    self.diagnostics
                        .push(crate::diagnostic::Diagnostic::type_error("WITH requires a record variable", span));
                    break;
                }
            };
            let mut cursor = fields_head;
            while let Some(field_id) = cursor {
                let (field_name, field_offset, field_size, field_type, next) = {
                    let entry = self.symtab.entry(field_id);
                    match &entry.kind {
                        SymbolKind::Field(f) => (entry.name, f.offset, f.size, f.field_type, f.next),
                        _ => break,
                    }
                };
                let alias = crate::symtab::VariableInfo {
                    flags: crate::symtab::VarFlags {
                        external: false,
                        var_param: indirect,
                    },
                    offset: if indirect { base_offset } else { base_offset + field_offset as i32 },
                    size: field_size,
                    type_sym: field_type,
                    sink_symbol: None,
                    base_field_offset: if indirect { base_extra + field_offset as i32 } else { 0 },
                };
                let _ = self.symtab.add_variable(field_name, decl_level, alias);
                cursor = next;
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Reserved(ReservedWord::Do), "'do'");
        self.parse_statement();
        self.symtab.close_scope(base);
    }

    fn parse_goto(&mut self) {
        self.advance();
        let TokenKind::IntegerLit(n) = self.peek().clone() else {
            self.diagnostics
                .push(crate::diagnostic::Diagnostic::syntax("expected label number after GOTO", self.span()));
            return;
        };
        self.advance();
        if let Some(id) = self.find_label(n) {
            self.emitter.emit_jump(JumpKind::Jmp, self.label_id_for(id));
            self.emitter.invalidate_level();
        } else {
            self.diagnostics
                .push(crate::diagnostic::Diagnostic::scope("GOTO targets an undeclared label", self.span()));
        }
    }

    fn parse_assignment_or_call(&mut self, name: pcc_base::Symbol) {
        let span = self.span();
        let text = self.interner.resolve(name).to_string();
        if let Some(routine) = super::stdlib::StdRoutine::lookup(&text) {
            self.advance();
            let _ = self.compile_std_call(routine);
            return;
        }
        self.advance();
        let Some(id) = self.find_symbol(name, SymbolId(0)) else {
            self.diagnostics.push(crate::diagnostic::Diagnostic::scope("undeclared identifier", span));
            return;
        };
        let kind = self.symtab.entry(id).kind.clone();
        match kind {
            SymbolKind::Variable(var) => {
                let decl_level = self.symtab.entry(id).level;
                let ty0 = ExprType::of_declared(&self.symtab, var.type_sym);
                let (path, lhs_ty) = self.start_access_chain(&var, decl_level, ty0);
                let (path, lhs_ty) = self.walk_access_chain(path, lhs_ty);
                self.expect(TokenKind::Assign, "':='");
                // `spec.md` §4.4.1: a `String`-typed target is never a
                // plain memory store — the destination address is
                // materialized first, then the source's string-kind
                // category picks the right library copy routine.
                if lhs_ty.base == ExprBase::String {
                    self.emit_path_address(path);
                    let rhs = self.parse_expression();
                    if !rhs.is_error() && !rhs.matches(ExprType::new(ExprBase::AnyString)) {
                        self.diagnostics
                            .push(crate::diagnostic::Diagnostic::type_error("assignment type mismatch", span));
                    }
                    self.emit_string_assign_call(rhs);
                    return;
                }
                let rhs = self.parse_expression();
                if rhs.needs_int_to_real_promotion(lhs_ty) {
                    self.emitter.emit_fp(crate::emitter::FpOp::Float, true, false);
                } else if !rhs.is_error() && !lhs_ty.is_error() && lhs_ty.base != rhs.base && !rhs.matches(lhs_ty) {
                    self.diagnostics
                        .push(crate::diagnostic::Diagnostic::type_error("assignment type mismatch", span));
                }
                self.emit_terminal_store(path, &lhs_ty);
            }
            SymbolKind::Procedure(proc) => {
                self.parse_call_arguments();
                self.emitter.emit_proc_call(&proc, self.level);
            }
            _ => {
                self.diagnostics
                    .push(crate::diagnostic::Diagnostic::type_error("identifier is not assignable or callable", span));
            }
        }
    }

    fn parse_call_arguments(&mut self) {
        if self.eat(TokenKind::LParen) {
            if !self.at(&TokenKind::RParen) {
                loop {
                    let _ = self.parse_expression();
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen, "')'");
        }
    }

    fn find_label(&self, number: i64) -> Option<SymbolId> {
        for idx in (0..self.symtab.len()).rev() {
            let id = SymbolId(idx as u32);
            if let SymbolKind::Label { number: n, .. } = &self.symtab.entry(id).kind {
                if *n == number {
                    return Some(id);
                }
            }
        }
        None
    }

    /// Labels reuse the emitter's `LabelId` space 1:1 with their declaration
    /// order; this maps a symbol table entry back to the `LabelId` it was
    /// assigned when declared (`spec.md` §4.4: one object-code label per
    /// declared Pascal label).
    fn label_id_for(&self, id: SymbolId) -> crate::emitter::LabelId {
        crate::emitter::LabelId(id.0)
    }
}
