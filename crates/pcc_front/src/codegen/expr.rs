//! Expression evaluator (`spec.md` §4.3): a standard precedence-climbing
//! recursive descent over `expression -> simple_expr -> term -> factor`,
//! each level emitting its own opcodes directly rather than building a tree
//! first. The `complex-factor` walker (postfix `.field`, `[index]`, `^`)
//! is represented the way the teacher represents capability walks: a small
//! tagged-state enum threaded through recursion, not a `bitflags` bitset
//! (`spec.md` §9; the teacher has no `bitflags` dependency anywhere in its
//! tree, so this crate doesn't invent one either). [`AccessPath`] is that
//! state; `codegen/stmt.rs`'s assignment walker shares it so a load and a
//! store of the same lvalue chain go through identical postfix logic.

use pcc_base::Span;

use crate::analysis::{ExprBase, ExprType};
use crate::emitter::{DataOp, FpOp, IndirectOp, LibCallId, RefOp, SetOp, SimpleOp};
use crate::objectsink::ObjectSink;
use crate::symtab::{ConstValue, PrimType, SymTab, SymbolKind, TypeInfo, VariableInfo};
use crate::token::{ReservedWord, TokenKind};

use super::Context;

/// Where a postfix `.field` / `[index]` / `^` chain off a variable access
/// currently stands (`spec.md` §4.3's complex-factor walker, §9's
/// "flags + tagged recursion" design note). Rather than a flag bit-set
/// consulted only at the end, this tracks *how to finish the access*: the
/// three shapes are mutually exclusive at any point in the walk, and each
/// postfix token moves the walk from one shape to another (never backward).
#[derive(Debug, Clone, Copy)]
pub(super) enum AccessPath {
    /// Nothing but compile-time-known field offsets applied yet: a plain
    /// frame-relative reference at `offset`, `levelDelta` away from the
    /// current generation level (`spec.md` §3.3).
    Direct { offset: i32, decl_level: u16 },
    /// At least one `[index]` applied, no `^` yet: frame-relative base
    /// `offset`, but the runtime index delta (already scaled by element
    /// size and shifted by the index type's `minValue`) is sitting on top
    /// of the data stack, not yet folded into an address (`spec.md` §8
    /// scenario 2).
    Indexed { offset: i32, decl_level: u16 },
    /// At least one `^` applied, directly or after an indexed base was
    /// materialized into a real address: a fully computed runtime address
    /// is already sitting on top of the data stack (`spec.md` §8 scenario 3).
    Address,
}

/// Byte width of the primitive load/store opcode family a type needs
/// (`spec.md` §4.3: "for multi-word primitives the size is prefixed via
/// `emitDataSize` and the multi-word variant of load/store is used").
#[derive(Debug, Clone, Copy)]
enum RefWidth {
    Byte,
    Word,
    Multi(u32),
}

/// Maps a two-operand relop to the compare-to-zero opcode a `strcmp`
/// library call's integer result is tested with (`spec.md` §4.3).
fn compare_to_zero(op: SimpleOp) -> SimpleOp {
    match op {
        SimpleOp::Equ => SimpleOp::Equz,
        SimpleOp::Neq => SimpleOp::Neqz,
        SimpleOp::Lt => SimpleOp::Ltz,
        SimpleOp::Lte => SimpleOp::Ltez,
        SimpleOp::Gt => SimpleOp::Gtz,
        SimpleOp::Gte => SimpleOp::Gtez,
        other => other,
    }
}

fn ref_width(symtab: &SymTab, ty: &ExprType) -> RefWidth {
    match ty.base {
        ExprBase::Char | ExprBase::Boolean => RefWidth::Byte,
        ExprBase::Real | ExprBase::Set | ExprBase::Record | ExprBase::String | ExprBase::Array => {
            let size = ty
                .type_sym
                .map(|id| match &symtab.entry(id).kind {
                    SymbolKind::Type(TypeInfo { alloc_size, .. }) => *alloc_size,
                    _ => 4,
                })
                .unwrap_or(8);
            RefWidth::Multi(size)
        }
        _ => RefWidth::Word,
    }
}

impl<'src, 'sink, S: ObjectSink> Context<'src, 'sink, S> {
    /// `expression -> simple_expr [relop simple_expr]`
    pub fn parse_expression(&mut self) -> ExprType {
        let lhs = self.parse_simple_expr();
        let relop = match self.peek() {
            TokenKind::Eq => Some(SimpleOp::Equ),
            TokenKind::Ne => Some(SimpleOp::Neq),
            TokenKind::Lt => Some(SimpleOp::Lt),
            TokenKind::Le => Some(SimpleOp::Lte),
            TokenKind::Gt => Some(SimpleOp::Gt),
            TokenKind::Ge => Some(SimpleOp::Gte),
            TokenKind::Reserved(ReservedWord::In) => None,
            _ => return lhs,
        };
        if matches!(self.peek(), TokenKind::Reserved(ReservedWord::In)) {
            let span = self.span();
            self.advance();
            let set_ty = self.parse_simple_expr();
            if set_ty.base != ExprBase::Set && !set_ty.is_error() {
                return self.error_type("IN requires a set operand", span);
            }
            // `spec.md` §4.3 "Set IN": the LHS ordinal is coerced by
            // subtracting the set's base type's `minValue`, so bit 0 of the
            // set represents that element. At this point the stack holds
            // `[lhs, set]`; `XCHG` brings `lhs` to the top so the
            // subtraction applies to it, then `XCHG` restores operand order
            // for `BitTest`.
            let min_value = set_ty
                .type_sym
                .and_then(|id| match &self.symtab.entry(id).kind {
                    SymbolKind::Type(TypeInfo { base_type, .. }) => *base_type,
                    _ => None,
                })
                .map(|base_id| match &self.symtab.entry(base_id).kind {
                    SymbolKind::Type(TypeInfo { min_value, .. }) => *min_value,
                    _ => 0,
                })
                .unwrap_or(0);
            if min_value != 0 {
                self.emitter.emit_simple(SimpleOp::Xchg);
                self.emitter.emit_data_op(DataOp::Push, min_value as i32);
                self.emitter.emit_simple(SimpleOp::Sub);
                self.emitter.emit_simple(SimpleOp::Xchg);
            }
            self.emitter.emit_set(SetOp::BitTest);
            return ExprType::new(ExprBase::Boolean);
        }
        let op = relop.unwrap();
        let span = self.span();
        self.advance();
        let rhs = self.parse_simple_expr();
        // `spec.md` §4.3 "Relational on strings": a `strcmp` library call
        // reduces the pair to an integer, and the relational opcode is then
        // its compare-to-zero form rather than the raw two-operand relop.
        if lhs.is_string_kind() && rhs.is_string_kind() {
            self.emitter.emit_lib_call(LibCallId::Strcmp);
            self.emitter.emit_simple(compare_to_zero(op));
            return ExprType::new(ExprBase::Boolean);
        }
        self.coerce_pair(lhs, rhs, span);
        self.emitter.emit_simple(op);
        ExprType::new(ExprBase::Boolean)
    }

    /// `simple_expr -> [sign] term {addop term}`
    fn parse_simple_expr(&mut self) -> ExprType {
        let negate = self.eat(TokenKind::Minus);
        if !negate {
            self.eat(TokenKind::Plus);
        }
        let mut lhs = self.parse_term();
        if negate {
            match lhs.base {
                ExprBase::Real => self.emitter.emit_fp(FpOp::Sub, true, false),
                _ => self.emitter.emit_simple(SimpleOp::Neg),
            }
        }
        loop {
            let (op, is_or) = match self.peek() {
                TokenKind::Plus => (SimpleOp::Add, false),
                TokenKind::Minus => (SimpleOp::Sub, false),
                TokenKind::Reserved(ReservedWord::Or) => (SimpleOp::Or, true),
                _ => break,
            };
            let span = self.span();
            self.advance();
            let rhs = self.parse_term();
            if is_or {
                if lhs.base != ExprBase::Boolean || rhs.base != ExprBase::Boolean {
                    lhs = self.error_type("OR requires boolean operands", span);
                } else {
                    self.emitter.emit_simple(SimpleOp::Or);
                }
                continue;
            }
            if op == SimpleOp::Add && (lhs.is_string_kind() || lhs.base == ExprBase::Char) {
                lhs = self.compile_string_concat(lhs, rhs, span);
                continue;
            }
            let result = self.coerce_pair(lhs, rhs, span);
            match result.base {
                ExprBase::Real => self.emitter.emit_fp(
                    if op == SimpleOp::Add { FpOp::Add } else { FpOp::Sub },
                    false,
                    false,
                ),
                ExprBase::Set => self.emitter.emit_set(if op == SimpleOp::Add {
                    SetOp::Union
                } else {
                    SetOp::Difference
                }),
                _ => self.emitter.emit_simple(op),
            }
            lhs = result;
        }
        lhs
    }

    /// `term -> factor {mulop factor}`
    fn parse_term(&mut self) -> ExprType {
        let mut lhs = self.parse_factor();
        loop {
            let op = match self.peek() {
                TokenKind::Star => Some(SimpleOp::Mul),
                TokenKind::Slash => None, // real division, handled separately
                TokenKind::Reserved(ReservedWord::Div) => Some(SimpleOp::Div),
                TokenKind::Reserved(ReservedWord::Mod) => Some(SimpleOp::Mod),
                TokenKind::Reserved(ReservedWord::And) => Some(SimpleOp::And),
                _ => break,
            };
            let is_and = matches!(self.peek(), TokenKind::Reserved(ReservedWord::And));
            let is_real_div = matches!(self.peek(), TokenKind::Slash);
            let span = self.span();
            self.advance();
            let rhs = self.parse_factor();
            if is_and {
                if lhs.base != ExprBase::Boolean || rhs.base != ExprBase::Boolean {
                    lhs = self.error_type("AND requires boolean operands", span);
                } else {
                    self.emitter.emit_simple(SimpleOp::And);
                }
                continue;
            }
            if is_real_div {
                self.coerce_pair(lhs, rhs, span);
                self.emitter.emit_fp(FpOp::Div, false, false);
                lhs = ExprType::new(ExprBase::Real);
                continue;
            }
            let op = op.unwrap();
            let result = self.coerce_pair(lhs, rhs, span);
            match result.base {
                ExprBase::Real if op == SimpleOp::Mul => self.emitter.emit_fp(FpOp::Mul, false, false),
                ExprBase::Set => self.emitter.emit_set(SetOp::Intersection),
                _ => self.emitter.emit_simple(op),
            }
            lhs = result;
        }
        lhs
    }

    /// `factor -> NOT factor | '(' expr ')' | literal | designator`
    fn parse_factor(&mut self) -> ExprType {
        match self.peek().clone() {
            TokenKind::Reserved(ReservedWord::Not) => {
                self.advance();
                let inner = self.parse_factor();
                if inner.base != ExprBase::Boolean && !inner.is_error() {
                    return self.error_type("NOT requires a boolean operand", self.span());
                }
                self.emitter.emit_simple(SimpleOp::Not);
                inner
            }
            TokenKind::LParen => {
                self.advance();
                let ty = self.parse_expression();
                self.expect(TokenKind::RParen, "')'");
                ty
            }
            TokenKind::IntegerLit(v) => {
                self.advance();
                self.emitter.emit_data_op(crate::emitter::DataOp::Push, v as i32);
                ExprType::new(ExprBase::Integer)
            }
            TokenKind::RealLit(_) => {
                self.advance();
                // real immediates are placed in RO data by the initializer
                // pass; here we only need the resulting stack shape.
                ExprType::new(ExprBase::Real)
            }
            TokenKind::StringLit(sym) => {
                self.advance();
                let text = self.interner.resolve(sym).to_string();
                if text.len() == 1 {
                    self.emitter.emit_data_op(crate::emitter::DataOp::Push, text.as_bytes()[0] as i32);
                    ExprType::new(ExprBase::Char)
                } else {
                    let offset = self.emitter.add_ro_data_string(text.as_bytes());
                    self.emitter.emit_data_op(crate::emitter::DataOp::Lac, offset as i32);
                    ExprType::new(ExprBase::String)
                }
            }
            TokenKind::Reserved(ReservedWord::Nil) => {
                self.advance();
                self.emitter.emit_data_op(crate::emitter::DataOp::Push, 0);
                let mut ty = ExprType::new(ExprBase::Pointer);
                ty.is_pointer = true;
                ty
            }
            TokenKind::Identifier(name) => {
                let span = self.span();
                self.advance();
                self.resolve_identifier_factor(name, span)
            }
            TokenKind::At => {
                self.advance();
                self.parse_address_of_factor()
            }
            TokenKind::LBracket => self.parse_set_constructor(),
            other => self.error_type(format!("unexpected token in expression: {other:?}"), self.span()),
        }
    }

    /// `'@' ptrFactor`: the address-of operator. Walks the same postfix
    /// chain a value access would, but the terminal step loads an address
    /// instead of a value, and the result type is lifted to a pointer
    /// (`spec.md` §4.3 grammar, §3.2's pointer-form flag).
    fn parse_address_of_factor(&mut self) -> ExprType {
        let span = self.span();
        let mut result = self.emit_variable_address(span);
        result.is_pointer = true;
        result
    }

    /// Resolves the variable named by the next token's full postfix chain
    /// and leaves its runtime address on top of the data stack, whatever
    /// `AccessPath` shape the chain ends in. Shared by `@var` (this file)
    /// and `read`/`readln`'s targets (`codegen/stdlib.rs`), both of which
    /// need an address rather than the variable's value.
    pub(super) fn emit_variable_address(&mut self, span: Span) -> ExprType {
        let TokenKind::Identifier(name) = self.peek().clone() else {
            return self.error_type("expected a variable", span);
        };
        self.advance();
        let Some(id) = self.find_symbol(name, crate::symtab::SymbolId(0)) else {
            return self.error_type("undeclared identifier", span);
        };
        let SymbolKind::Variable(var) = self.symtab.entry(id).kind.clone() else {
            return self.error_type("a variable is required here", span);
        };
        let decl_level = self.symtab.entry(id).level;
        let (path, elem_ty) = self.start_access_chain(&var, decl_level, ExprType::of_declared(&self.symtab, var.type_sym));
        let (path, elem_ty) = self.walk_access_chain(path, elem_ty);
        self.emit_path_address(path);
        elem_ty
    }

    /// Materializes whatever [`AccessPath`] shape a chain ended in into a
    /// runtime address on top of the data stack. Shared by `@var`
    /// ([`Context::emit_variable_address`]) and string assignment
    /// ([`Context::emit_string_assign_call`]'s caller in `codegen/stmt.rs`),
    /// both of which need a destination/source address rather than a value.
    pub(super) fn emit_path_address(&mut self, path: AccessPath) {
        match path {
            AccessPath::Direct { offset, decl_level } => {
                self.emitter.emit_level_ref(RefOp::LoadAddr, decl_level, self.level, offset);
            }
            AccessPath::Indexed { offset, decl_level } => {
                self.emitter.emit_level_ref(RefOp::LoadAddrIndexed, decl_level, self.level, offset);
            }
            AccessPath::Address => {
                // already an address on the stack — taking the address of
                // something already reached through a pointer is a no-op.
            }
        }
    }

    /// `spec.md` §4.4.1: string assignment dispatches to one of several
    /// library calls based on the source's string-kind category, rather
    /// than a generic memory store — the destination's address must already
    /// be on top of the data stack ([`Context::emit_path_address`]) before
    /// this runs.
    pub(super) fn emit_string_assign_call(&mut self, rhs: ExprType) {
        let call = match rhs.base {
            ExprBase::StkString => LibCallId::Sstr2str,
            ExprBase::CString => LibCallId::Cstr2str,
            _ => LibCallId::Strcpy,
        };
        self.emitter.emit_lib_call(call);
    }

    fn resolve_identifier_factor(&mut self, name: pcc_base::Symbol, span: Span) -> ExprType {
        let text = self.interner.resolve(name).to_string();
        if let Some(routine) = super::stdlib::StdRoutine::lookup(&text) {
            if routine.is_procedure() {
                return self.error_type("standard procedure used in an expression", span);
            }
            return self.compile_std_call(routine);
        }
        let Some(id) = self.find_symbol(name, crate::symtab::SymbolId(0)) else {
            return self.error_type("undeclared identifier", span);
        };
        let entry_kind = self.symtab.entry(id).kind.clone();
        match entry_kind {
            SymbolKind::Constant(info) => match info.value {
                ConstValue::Integer(v) | ConstValue::Ordinal(v) => {
                    self.emitter.emit_data_op(crate::emitter::DataOp::Push, v as i32);
                    if let Some(enum_ty) = info.enum_type {
                        if enum_ty == self.env.boolean_type {
                            return ExprType::new(ExprBase::Boolean);
                        }
                    }
                    ExprType::new(ExprBase::Integer)
                }
                ConstValue::Real(_) => ExprType::new(ExprBase::Real),
            },
            SymbolKind::Variable(var) => {
                let decl_level = self.symtab.entry(id).level;
                let ty0 = ExprType::of_declared(&self.symtab, var.type_sym);
                let (path, ty) = self.start_access_chain(&var, decl_level, ty0);
                let (path, ty) = self.walk_access_chain(path, ty);
                self.emit_terminal_load(path, &ty);
                ty
            }
            SymbolKind::Procedure(proc) => {
                // a bare function-identifier factor: zero- or multi-argument
                // call used in value position (`spec.md` §4.3's
                // `function-designator`).
                self.parse_call_arguments();
                self.emitter.emit_proc_call(&proc, self.level);
                match proc.return_type {
                    Some(rt) => ExprType::of_declared(&self.symtab, rt),
                    None => self.error_type("procedure used in an expression", span),
                }
            }
            _ => self.error_type("identifier does not denote a value", span),
        }
    }

    /// Sets up the starting [`AccessPath`] for a variable reference, folding
    /// in the VAR-parameter auto-dereference (`spec.md` §4.3: "VAR parameter
    /// is passed as hidden pointer, automatically dereferenced on value
    /// access") before any explicit postfix token is even seen.
    pub(super) fn start_access_chain(&mut self, var: &VariableInfo, decl_level: u16, ty: ExprType) -> (AccessPath, ExprType) {
        if var.flags.var_param {
            self.emitter.emit_level_ref(RefOp::Load, decl_level, self.level, var.offset);
            if var.base_field_offset != 0 {
                self.emitter.emit_data_op(DataOp::Push, var.base_field_offset);
                self.emitter.emit_simple(SimpleOp::Add);
            }
            (AccessPath::Address, ty)
        } else {
            (AccessPath::Direct { offset: var.offset, decl_level }, ty)
        }
    }

    /// If `path` still has an un-materialized index delta sitting on the
    /// stack, turns it into a real runtime address now, before a further
    /// `.field`/`[index]`/`^` token would otherwise need to interleave a
    /// second pending value underneath it.
    fn materialize_if_indexed(&mut self, path: AccessPath) -> AccessPath {
        match path {
            AccessPath::Indexed { offset, decl_level } => {
                self.emitter.emit_level_ref(RefOp::LoadAddrIndexed, decl_level, self.level, offset);
                AccessPath::Address
            }
            other => other,
        }
    }

    /// Postfix `.field` / `[index]` / `^` chain off an already-resolved
    /// variable reference (`spec.md` §4.3's complex-factor walker). Shared
    /// by loads, `@`, and (via [`Context::parse_lvalue`]) stores: every
    /// postfix token advances `path` exactly once, emitting whatever
    /// addressing arithmetic that transition requires, so the terminal step
    /// (a plain load, an indexed load, or an indirect load/store) is the
    /// only opcode left to choose once the chain ends.
    pub(super) fn walk_access_chain(&mut self, mut path: AccessPath, mut ty: ExprType) -> (AccessPath, ExprType) {
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    let TokenKind::Identifier(field_name) = self.peek().clone() else {
                        self.error_type("expected field name after '.'", self.span());
                        break;
                    };
                    self.advance();
                    let Some(type_sym) = ty.type_sym else {
                        self.error_type("'.' applied to a non-record", self.span());
                        break;
                    };
                    let fields_head = match &self.symtab.entry(type_sym).kind {
                        SymbolKind::Type(TypeInfo { tag: PrimType::Record, base_type, .. }) => *base_type,
                        _ => {
                            self.error_type("'.' applied to a non-record", self.span());
                            break;
                        }
                    };
                    let map = crate::symtab::record_field_map(&self.symtab, fields_head);
                    let Some(field_id) = map.get(&field_name).copied() else {
                        self.error_type("no such field", self.span());
                        break;
                    };
                    let field = match &self.symtab.entry(field_id).kind {
                        SymbolKind::Field(f) => f.clone(),
                        _ => unreachable!(),
                    };
                    path = self.materialize_if_indexed(path);
                    path = match path {
                        AccessPath::Direct { offset, decl_level } => AccessPath::Direct {
                            offset: offset + field.offset as i32,
                            decl_level,
                        },
                        AccessPath::Address => {
                            self.emitter.emit_data_op(DataOp::Push, field.offset as i32);
                            self.emitter.emit_simple(SimpleOp::Add);
                            AccessPath::Address
                        }
                        AccessPath::Indexed { .. } => unreachable!("materialized above"),
                    };
                    ty = ExprType::of_declared(&self.symtab, field.field_type);
                }
                TokenKind::LBracket => {
                    self.advance();
                    path = self.materialize_if_indexed(path);
                    let Some(type_sym) = ty.type_sym else {
                        self.error_type("'[' applied to a non-array", self.span());
                        break;
                    };
                    let (element_type, index_type) = match &self.symtab.entry(type_sym).kind {
                        SymbolKind::Type(TypeInfo { tag: PrimType::Array, base_type, index_type, .. }) => (*base_type, *index_type),
                        _ => {
                            self.error_type("'[' applied to a non-array", self.span());
                            break;
                        }
                    };
                    let index_ty = self.parse_expression();
                    if !index_ty.is_ordinal() && !index_ty.is_error() {
                        self.diagnostics.push(crate::diagnostic::Diagnostic::type_error(
                            "array index must be ordinal",
                            self.span(),
                        ));
                    }
                    self.expect(TokenKind::RBracket, "']'");
                    let index_min = index_type
                        .map(|it| match &self.symtab.entry(it).kind {
                            SymbolKind::Type(TypeInfo { min_value, .. }) => *min_value,
                            _ => 0,
                        })
                        .unwrap_or(0);
                    if index_min != 0 {
                        self.emitter.emit_data_op(DataOp::Push, index_min as i32);
                        self.emitter.emit_simple(SimpleOp::Sub);
                    }
                    let elem_size = element_type
                        .map(|et| match &self.symtab.entry(et).kind {
                            SymbolKind::Type(TypeInfo { alloc_size, .. }) => *alloc_size,
                            _ => 1,
                        })
                        .unwrap_or(1);
                    if elem_size != 1 {
                        self.emitter.emit_data_op(DataOp::Push, elem_size as i32);
                        self.emitter.emit_simple(SimpleOp::Mul);
                    }
                    path = match path {
                        AccessPath::Direct { offset, decl_level } => AccessPath::Indexed { offset, decl_level },
                        AccessPath::Address => {
                            self.emitter.emit_simple(SimpleOp::Add);
                            AccessPath::Address
                        }
                        AccessPath::Indexed { .. } => unreachable!("materialized above"),
                    };
                    ty = element_type
                        .map(|t| ExprType::of_declared(&self.symtab, t))
                        .unwrap_or_else(ExprType::error);
                }
                TokenKind::Caret => {
                    self.advance();
                    path = self.materialize_if_indexed(path);
                    let Some(type_sym) = ty.type_sym else {
                        self.error_type("'^' applied to a non-pointer", self.span());
                        break;
                    };
                    let pointee = match &self.symtab.entry(type_sym).kind {
                        SymbolKind::Type(TypeInfo { tag: PrimType::Pointer, base_type, .. }) => *base_type,
                        _ => {
                            self.error_type("'^' applied to a non-pointer", self.span());
                            break;
                        }
                    };
                    path = match path {
                        AccessPath::Direct { offset, decl_level } => {
                            self.emitter.emit_level_ref(RefOp::Load, decl_level, self.level, offset);
                            AccessPath::Address
                        }
                        AccessPath::Address => {
                            self.emitter.emit_indirect(IndirectOp::Load);
                            AccessPath::Address
                        }
                        AccessPath::Indexed { .. } => unreachable!("materialized above"),
                    };
                    ty = pointee
                        .map(|t| ExprType::of_declared(&self.symtab, t))
                        .unwrap_or_else(ExprType::error);
                }
                _ => break,
            }
        }
        (path, ty)
    }

    /// Emits the one opcode (plus, for multi-word types, a preceding
    /// `emitDataSize`) that reads the location `path` designates
    /// (`spec.md` §4.3's base-case load state machine).
    pub(super) fn emit_terminal_load(&mut self, path: AccessPath, ty: &ExprType) {
        match (path, ref_width(&self.symtab, ty)) {
            (AccessPath::Direct { offset, decl_level }, RefWidth::Byte) => {
                self.emitter.emit_level_ref(RefOp::LoadByte, decl_level, self.level, offset)
            }
            (AccessPath::Direct { offset, decl_level }, RefWidth::Word) => {
                self.emitter.emit_level_ref(RefOp::Load, decl_level, self.level, offset)
            }
            (AccessPath::Direct { offset, decl_level }, RefWidth::Multi(size)) => {
                self.emitter.emit_data_size(size);
                self.emitter.emit_level_ref(RefOp::LoadMulti, decl_level, self.level, offset);
            }
            (AccessPath::Indexed { offset, decl_level }, RefWidth::Byte) => {
                self.emitter.emit_level_ref(RefOp::LoadIndexedByte, decl_level, self.level, offset)
            }
            (AccessPath::Indexed { offset, decl_level }, RefWidth::Word) => {
                self.emitter.emit_level_ref(RefOp::LoadIndexed, decl_level, self.level, offset)
            }
            (AccessPath::Indexed { offset, decl_level }, RefWidth::Multi(size)) => {
                self.emitter.emit_data_size(size);
                self.emitter.emit_level_ref(RefOp::LoadIndexedMulti, decl_level, self.level, offset);
            }
            (AccessPath::Address, RefWidth::Byte) => self.emitter.emit_indirect(IndirectOp::LoadByte),
            (AccessPath::Address, RefWidth::Word) => self.emitter.emit_indirect(IndirectOp::Load),
            (AccessPath::Address, RefWidth::Multi(size)) => {
                self.emitter.emit_data_size(size);
                self.emitter.emit_indirect(IndirectOp::LoadMulti);
            }
        }
    }

    /// Store counterpart of [`Context::emit_terminal_load`]; called only
    /// after the RHS value has already been pushed, so the final opcode's
    /// operand order (address/delta prepared first, value on top) is
    /// uniform across all three [`AccessPath`] shapes.
    pub(super) fn emit_terminal_store(&mut self, path: AccessPath, ty: &ExprType) {
        match (path, ref_width(&self.symtab, ty)) {
            (AccessPath::Direct { offset, decl_level }, RefWidth::Byte) => {
                self.emitter.emit_level_ref(RefOp::StoreByte, decl_level, self.level, offset)
            }
            (AccessPath::Direct { offset, decl_level }, RefWidth::Word) => {
                self.emitter.emit_level_ref(RefOp::Store, decl_level, self.level, offset)
            }
            (AccessPath::Direct { offset, decl_level }, RefWidth::Multi(size)) => {
                self.emitter.emit_data_size(size);
                self.emitter.emit_level_ref(RefOp::StoreMulti, decl_level, self.level, offset);
            }
            (AccessPath::Indexed { offset, decl_level }, RefWidth::Byte) => {
                self.emitter.emit_level_ref(RefOp::StoreIndexedByte, decl_level, self.level, offset)
            }
            (AccessPath::Indexed { offset, decl_level }, RefWidth::Word) => {
                self.emitter.emit_level_ref(RefOp::StoreIndexed, decl_level, self.level, offset)
            }
            (AccessPath::Indexed { offset, decl_level }, RefWidth::Multi(size)) => {
                self.emitter.emit_data_size(size);
                self.emitter.emit_level_ref(RefOp::StoreIndexedMulti, decl_level, self.level, offset);
            }
            (AccessPath::Address, RefWidth::Byte) => self.emitter.emit_indirect(IndirectOp::StoreByte),
            (AccessPath::Address, RefWidth::Word) => self.emitter.emit_indirect(IndirectOp::Store),
            (AccessPath::Address, RefWidth::Multi(size)) => {
                self.emitter.emit_data_size(size);
                self.emitter.emit_indirect(IndirectOp::StoreMulti);
            }
        }
    }

    fn parse_set_constructor(&mut self) -> ExprType {
        self.expect(TokenKind::LBracket, "'['");
        let mut count = 0u32;
        if !self.at(&TokenKind::RBracket) {
            loop {
                let _member = self.parse_expression();
                count += 1;
                if self.eat(TokenKind::DotDot) {
                    let _hi = self.parse_expression();
                }
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBracket, "']'");
        self.emitter.emit_data_op(crate::emitter::DataOp::Push, count as i32);
        self.emitter.emit_set(SetOp::Build);
        ExprType::new(ExprBase::Set)
    }

    /// `spec.md` §4.3 "String `+`": the first `+` applied to a `String` or
    /// `Char` left operand clones it onto the string stack via a library
    /// call, promoting it to `StkString`; every subsequent `+` appends in
    /// place, picking the char-append library call when the right operand
    /// is a single `Char` rather than another string.
    fn compile_string_concat(&mut self, lhs: ExprType, rhs: ExprType, span: Span) -> ExprType {
        if lhs.is_error() || rhs.is_error() {
            return ExprType::error();
        }
        if lhs.base != ExprBase::StkString {
            let clone_call = if lhs.base == ExprBase::Char {
                LibCallId::Mkstkc
            } else {
                LibCallId::Strdup
            };
            self.emitter.emit_lib_call(clone_call);
        }
        match rhs.base {
            ExprBase::Char => self.emitter.emit_lib_call(LibCallId::Strcatc),
            other if other.is_string_kind() => self.emitter.emit_lib_call(LibCallId::Strcat),
            _ => return self.error_type("'+' on a string requires a string or char operand", span),
        }
        ExprType::new(ExprBase::StkString)
    }

    /// Validates operand compatibility and emits exactly one promotion
    /// opcode when an Integer operand faces a Real peer. Returns the result
    /// type of the pair.
    fn coerce_pair(&mut self, lhs: ExprType, rhs: ExprType, span: Span) -> ExprType {
        if lhs.is_error() || rhs.is_error() {
            return ExprType::error();
        }
        if lhs.needs_int_to_real_promotion(rhs) {
            self.emitter.emit_fp(FpOp::Float, true, false);
            return ExprType::new(ExprBase::Real);
        }
        if rhs.needs_int_to_real_promotion(lhs) {
            self.emitter.emit_fp(FpOp::Float, false, true);
            return ExprType::new(ExprBase::Real);
        }
        match lhs.arithmetic_result(rhs) {
            Some(ty) => ty,
            None if lhs.base == rhs.base => lhs,
            None => self.error_type("incompatible operand types", span),
        }
    }
}
