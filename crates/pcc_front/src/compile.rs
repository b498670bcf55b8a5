//! Top-level compiler entry point (`spec.md` §1, §6.5): wires the lexer,
//! symbol table, emitter, and codegen walkers together over one source
//! file and produces the object-sink records plus any diagnostics.

use pcc_base::Symbol;

use crate::codegen::initializer::{ConstInit, PendingVar};
use crate::codegen::Context;
use crate::diagnostic::{Diagnostic, DiagnosticBag};
use crate::objectsink::{FileHeader, ObjectSink};
use crate::symtab::{ConstInfo, ConstValue, PrimType, ProcInfo, SymbolId, TypeInfo, VarFlags, VariableInfo};
use crate::token::{ReservedWord, TokenKind};

/// A not-yet-scoped formal parameter, collected while parsing a procedure
/// or function's parameter list (still at the *enclosing* level) and
/// installed as an ordinary `Variable` once the callee's own scope is open
/// (`spec.md` §4.4's VAR-parameter handling needs parameters to be real,
/// lookup-able symbols — a bare parameter count is not enough to compile a
/// body that references them).
struct ParamDecl {
    name: Symbol,
    type_sym: SymbolId,
    is_var_param: bool,
    size: u32,
}

fn type_size(ctx: &Context<impl ObjectSink>, type_sym: SymbolId) -> u32 {
    match &ctx.symtab.entry(type_sym).kind {
        crate::symtab::SymbolKind::Type(TypeInfo { alloc_size, ref_size, .. }) => (*alloc_size).max(*ref_size),
        _ => 4,
    }
}

/// Whether `type_sym` denotes the `String` primitive type, the only
/// declared-variable shape `spec.md` §4.5's resource-allocation pass gives
/// non-trivial treatment to (a library call rather than a plain store).
fn is_string_type(ctx: &Context<impl ObjectSink>, type_sym: SymbolId) -> bool {
    matches!(
        &ctx.symtab.entry(type_sym).kind,
        crate::symtab::SymbolKind::Type(TypeInfo { tag: PrimType::String, .. })
    )
}

/// Whether `type_sym` denotes the `File` primitive type — the other shape
/// `spec.md` §4.5's resource-allocation/finalization passes give non-trivial
/// treatment to (an `AllocFile`/`FreeFile` pair rather than a plain store).
fn is_file_type(ctx: &Context<impl ObjectSink>, type_sym: SymbolId) -> bool {
    matches!(
        &ctx.symtab.entry(type_sym).kind,
        crate::symtab::SymbolKind::Type(TypeInfo { tag: PrimType::File, .. })
    )
}

pub struct CompileResult {
    pub diagnostics: Vec<crate::diagnostic::Diagnostic>,
}

/// Compiles `source` against `sink`; never panics on malformed input, since
/// every recognized mistake is folded into the returned diagnostic list
/// rather than aborting the pass (`spec.md` §7).
pub fn compile(source: &str, source_path: &str, sink: &mut impl ObjectSink) -> CompileResult {
    let mut ctx = Context::new(source, sink);
    let program_name = parse_program_header(&mut ctx);
    ctx.emitter.set_file_header(FileHeader {
        program_name: program_name.unwrap_or_else(|| "program".to_string()),
        source_path: source_path.to_string(),
    });
    let (needs_string_stack_pop, file_vars) = parse_block(&mut ctx);
    // `spec.md` §4.5 finalization: free every non-preallocated file this
    // block opened, then — the mirror image of the resource-allocation
    // pass's single string-stack push — pop the string stack once,
    // regardless of how many string variables it initialized.
    ctx.finalize_files(&file_vars);
    if needs_string_stack_pop {
        ctx.emitter.emit_simple(crate::emitter::SimpleOp::Pops);
    }
    ctx.emitter.emit_simple(crate::emitter::SimpleOp::End);
    ctx.expect(TokenKind::Dot, "'.' terminating the program");

    let label_base = SymbolId(0);
    for undefined in ctx.symtab.verify_labels(label_base) {
        let name_sym = ctx.symtab.entry(undefined).name;
        let _ = name_sym;
        ctx.diagnostics
            .push(Diagnostic::scope("label declared but never defined", ctx.span()));
    }

    CompileResult {
        diagnostics: ctx.diagnostics.into_vec(),
    }
}

fn parse_program_header(ctx: &mut Context<impl ObjectSink>) -> Option<String> {
    if ctx.eat(TokenKind::Reserved(ReservedWord::Program)) {
        let name = match ctx.peek().clone() {
            TokenKind::Identifier(sym) => {
                let text = ctx.interner.resolve(sym).to_string();
                ctx.advance();
                Some(text)
            }
            _ => {
                ctx.diagnostics
                    .push(Diagnostic::syntax("expected program name", ctx.span()));
                None
            }
        };
        if ctx.eat(TokenKind::LParen) {
            loop {
                if !matches!(ctx.peek(), TokenKind::Identifier(_)) {
                    break;
                }
                ctx.advance();
                if !ctx.eat(TokenKind::Comma) {
                    break;
                }
            }
            ctx.expect(TokenKind::RParen, "')'");
        }
        ctx.expect(TokenKind::Semicolon, "';'");
        name
    } else {
        None
    }
}

/// `block -> [label_decls] [const_decls] [type_decls] [var_decls]
/// {proc_or_func_decl} compound_statement`
///
/// Returns whether this block's resource-allocation pass (`spec.md` §4.5)
/// emitted a string-stack push for a `String`-typed variable (which the
/// caller must balance with exactly one pop at the block's own exit point:
/// the top-level program's `END`, or a procedure/function's), plus the
/// frame offset of every `File`-typed variable this block declared (which
/// the caller must free, via [`Context::finalize_files`], at that same
/// exit point).
fn parse_block(ctx: &mut Context<impl ObjectSink>) -> (bool, Vec<i32>) {
    log::debug!("entering block at level {}", ctx.level);
    if ctx.eat(TokenKind::Reserved(ReservedWord::Label)) {
        parse_label_decls(ctx);
    }
    if ctx.eat(TokenKind::Reserved(ReservedWord::Const)) {
        parse_const_decls(ctx);
    }
    if ctx.eat(TokenKind::Reserved(ReservedWord::Type)) {
        parse_type_decls(ctx);
    }
    let (needs_string_stack_pop, file_vars) = if ctx.eat(TokenKind::Reserved(ReservedWord::Var)) {
        parse_var_decls(ctx)
    } else {
        (false, Vec::new())
    };
    loop {
        match ctx.peek() {
            TokenKind::Reserved(ReservedWord::Procedure) => parse_proc_decl(ctx, false),
            TokenKind::Reserved(ReservedWord::Function) => parse_proc_decl(ctx, true),
            _ => break,
        }
        ctx.expect(TokenKind::Semicolon, "';'");
    }
    ctx.parse_statement();
    log::debug!("leaving block at level {}", ctx.level);
    (needs_string_stack_pop, file_vars)
}

fn parse_label_decls(ctx: &mut Context<impl ObjectSink>) {
    loop {
        if let TokenKind::IntegerLit(n) = ctx.peek() {
            let n = *n;
            let name = ctx.interner.intern(&n.to_string());
            ctx.advance();
            let _ = ctx.symtab.add_label(name, ctx.level, n);
            if !ctx.eat(TokenKind::Comma) {
                break;
            }
        } else {
            break;
        }
    }
    ctx.expect(TokenKind::Semicolon, "';'");
}

fn parse_const_decls(ctx: &mut Context<impl ObjectSink>) {
    loop {
        let TokenKind::Identifier(name) = ctx.peek().clone() else {
            break;
        };
        ctx.advance();
        ctx.expect(TokenKind::Eq, "'='");
        let negate = ctx.eat(TokenKind::Minus);
        let value = match ctx.peek().clone() {
            TokenKind::IntegerLit(v) => {
                ctx.advance();
                ConstValue::Integer(if negate { -v } else { v })
            }
            TokenKind::RealLit(v) => {
                ctx.advance();
                ConstValue::Real(if negate { -v } else { v })
            }
            TokenKind::StringLit(sym) => {
                ctx.advance();
                let text = ctx.interner.resolve(sym).to_string();
                ConstValue::Integer(text.as_bytes().first().copied().unwrap_or(0) as i64)
            }
            TokenKind::Reserved(ReservedWord::Nil) => {
                ctx.advance();
                ConstValue::Integer(0)
            }
            _ => {
                ctx.diagnostics
                    .push(Diagnostic::syntax("expected a constant value", ctx.span()));
                ConstValue::Integer(0)
            }
        };
        let _ = ctx.symtab.add_constant(name, ctx.level, ConstInfo { value, enum_type: None });
        ctx.expect(TokenKind::Semicolon, "';'");
        if !matches!(ctx.peek(), TokenKind::Identifier(_)) {
            break;
        }
    }
}

fn parse_type_decls(ctx: &mut Context<impl ObjectSink>) {
    loop {
        let TokenKind::Identifier(name) = ctx.peek().clone() else {
            break;
        };
        ctx.advance();
        ctx.expect(TokenKind::Eq, "'='");
        let info = parse_type_denoter(ctx);
        let _ = ctx.symtab.add_type(name, ctx.level, info);
        ctx.expect(TokenKind::Semicolon, "';'");
        if !matches!(ctx.peek(), TokenKind::Identifier(_)) {
            break;
        }
    }
}

/// Resolves a named type already in scope, or a handful of built-in
/// spellings, to its [`SymbolId`].
fn resolve_type_name(ctx: &mut Context<impl ObjectSink>, name: Symbol) -> Option<SymbolId> {
    ctx.find_symbol(name, SymbolId(0))
}

/// A constant ordinal bound, as used in an array index range or a
/// `CONST`-less subrange type denoter: an (optionally negated) integer
/// literal, or a previously declared integer constant's name.
fn parse_const_ordinal(ctx: &mut Context<impl ObjectSink>) -> i64 {
    let negate = ctx.eat(TokenKind::Minus);
    let value = match ctx.peek().clone() {
        TokenKind::IntegerLit(n) => {
            ctx.advance();
            n
        }
        TokenKind::Identifier(name) => {
            ctx.advance();
            match ctx.find_symbol(name, SymbolId(0)).map(|id| ctx.symtab.entry(id).kind.clone()) {
                Some(crate::symtab::SymbolKind::Constant(ConstInfo { value: ConstValue::Integer(v), .. })) => v,
                _ => {
                    ctx.diagnostics
                        .push(Diagnostic::type_error("expected a constant ordinal bound", ctx.span()));
                    0
                }
            }
        }
        _ => {
            ctx.diagnostics
                .push(Diagnostic::syntax("expected a constant ordinal bound", ctx.span()));
            0
        }
    };
    if negate {
        -value
    } else {
        value
    }
}

/// Bare `lo..hi` subrange type denoter (`spec.md` §6.1), used both at the
/// top level of a `TYPE` declaration and wherever `parse_type_denoter` is
/// otherwise invoked (record fields, parameter types).
fn parse_subrange_type(ctx: &mut Context<impl ObjectSink>) -> TypeInfo {
    let lo = parse_const_ordinal(ctx);
    ctx.expect(TokenKind::DotDot, "'..'");
    let hi = parse_const_ordinal(ctx);
    TypeInfo::scalar(PrimType::Subrange, 4, lo, hi)
}

fn parse_type_denoter(ctx: &mut Context<impl ObjectSink>) -> TypeInfo {
    match ctx.peek().clone() {
        TokenKind::Reserved(ReservedWord::Array) => {
            ctx.advance();
            ctx.expect(TokenKind::LBracket, "'['");
            // An array's index range must be a constant subrange (standard
            // Pascal never allows a runtime-computed bound here), so the
            // bounds are read as constant ordinals rather than through the
            // general expression evaluator.
            let lo = parse_const_ordinal(ctx);
            ctx.expect(TokenKind::DotDot, "'..'");
            let hi = parse_const_ordinal(ctx);
            ctx.expect(TokenKind::RBracket, "']'");
            ctx.expect(TokenKind::Reserved(ReservedWord::Of), "'of'");
            let element = parse_type_denoter(ctx);
            let elem_size = element.alloc_size.max(1);
            let anon = ctx.interner.intern("");
            let element_sym = ctx.symtab.add_type(anon, ctx.level, element).unwrap_or(SymbolId(0));
            let index_info = TypeInfo::scalar(PrimType::Subrange, 4, lo, hi);
            let index_sym = ctx.symtab.add_type(anon, ctx.level, index_info).unwrap_or(SymbolId(0));
            let count = (hi - lo + 1).max(0) as u32;
            TypeInfo {
                tag: PrimType::Array,
                base_type: Some(element_sym),
                index_type: Some(index_sym),
                variable_sized: false,
                alloc_size: elem_size * count,
                ref_size: elem_size,
                min_value: lo,
                max_value: hi,
            }
        }
        TokenKind::Caret => {
            ctx.advance();
            let TokenKind::Identifier(pointee_name) = ctx.peek().clone() else {
                ctx.diagnostics
                    .push(Diagnostic::syntax("expected a type name after '^'", ctx.span()));
                return TypeInfo::scalar(PrimType::Pointer, 4, 0, 0);
            };
            ctx.advance();
            let pointee = resolve_type_name(ctx, pointee_name);
            let mut info = TypeInfo::scalar(PrimType::Pointer, 4, 0, 0);
            info.base_type = pointee;
            info
        }
        TokenKind::Reserved(ReservedWord::Record) => {
            ctx.advance();
            let mut prev: Option<SymbolId> = None;
            let mut offset = 0u32;
            loop {
                if matches!(ctx.peek(), TokenKind::Reserved(ReservedWord::End)) {
                    break;
                }
                let mut names = Vec::new();
                loop {
                    let TokenKind::Identifier(field_name) = ctx.peek().clone() else {
                        break;
                    };
                    ctx.advance();
                    names.push(field_name);
                    if !ctx.eat(TokenKind::Comma) {
                        break;
                    }
                }
                ctx.expect(TokenKind::Colon, "':'");
                let field_type_info = parse_type_denoter(ctx);
                let field_size = field_type_info.alloc_size;
                // anonymous field types are not named in the symbol table;
                // record the raw `TypeInfo` as a throwaway entry so
                // `field_type` still refers to a concrete `SymbolId`.
                let anon_name = ctx.interner.intern("");
                let field_type_sym = ctx
                    .symtab
                    .add_type(anon_name, ctx.level, field_type_info)
                    .unwrap_or(SymbolId(0));
                for field_name in names {
                    let field = crate::symtab::FieldInfo {
                        size: field_size,
                        offset,
                        owner: SymbolId(0),
                        field_type: field_type_sym,
                        next: prev,
                    };
                    let id = ctx.symtab.add_field(field_name, ctx.level, field).unwrap_or(SymbolId(0));
                    prev = Some(id);
                    offset += field_size;
                }
                if !ctx.eat(TokenKind::Semicolon) {
                    break;
                }
            }
            ctx.expect(TokenKind::Reserved(ReservedWord::End), "'end'");
            TypeInfo {
                tag: PrimType::Record,
                base_type: prev,
                index_type: None,
                variable_sized: false,
                alloc_size: offset,
                ref_size: offset,
                min_value: 0,
                max_value: 0,
            }
        }
        TokenKind::Reserved(ReservedWord::Set) => {
            ctx.advance();
            ctx.expect(TokenKind::Reserved(ReservedWord::Of), "'of'");
            let TokenKind::Identifier(base_name) = ctx.peek().clone() else {
                ctx.diagnostics
                    .push(Diagnostic::syntax("expected a base type after SET OF", ctx.span()));
                return TypeInfo::scalar(PrimType::Set, 32, 0, 255);
            };
            ctx.advance();
            let base = resolve_type_name(ctx, base_name);
            let mut info = TypeInfo::scalar(PrimType::Set, 32, 0, 255);
            info.base_type = base;
            info
        }
        TokenKind::Reserved(ReservedWord::File) => {
            ctx.advance();
            ctx.expect(TokenKind::Reserved(ReservedWord::Of), "'of'");
            let element = parse_type_denoter(ctx);
            let elem_size = element.alloc_size;
            let mut info = TypeInfo::scalar(PrimType::File, 4, 0, 0);
            info.ref_size = elem_size;
            info
        }
        // `spec.md` §6.1 "subranges a..b": a bare subrange type denoter, its
        // lower bound either a literal or a previously declared constant's
        // name. The constant-name spelling is indistinguishable from a named
        // type reference until the token after it is checked for `..`.
        TokenKind::Minus | TokenKind::IntegerLit(_) => parse_subrange_type(ctx),
        TokenKind::Identifier(name) if matches!(ctx.peek_second(), TokenKind::DotDot) => {
            let _ = name;
            parse_subrange_type(ctx)
        }
        TokenKind::Identifier(name) => {
            ctx.advance();
            match resolve_type_name(ctx, name) {
                Some(id) => match &ctx.symtab.entry(id).kind {
                    crate::symtab::SymbolKind::Type(info) => info.clone(),
                    _ => {
                        ctx.diagnostics
                            .push(Diagnostic::type_error("identifier does not denote a type", ctx.span()));
                        TypeInfo::scalar(PrimType::Integer, 4, i32::MIN as i64, i32::MAX as i64)
                    }
                },
                None => {
                    ctx.diagnostics.push(Diagnostic::scope("undeclared type name", ctx.span()));
                    TypeInfo::scalar(PrimType::Integer, 4, i32::MIN as i64, i32::MAX as i64)
                }
            }
        }
        TokenKind::LParen => {
            // enumerated scalar type: `(red, green, blue)`
            ctx.advance();
            let mut ordinal = 0i64;
            loop {
                let TokenKind::Identifier(member) = ctx.peek().clone() else {
                    break;
                };
                ctx.advance();
                let _ = member;
                ordinal += 1;
                if !ctx.eat(TokenKind::Comma) {
                    break;
                }
            }
            ctx.expect(TokenKind::RParen, "')'");
            TypeInfo::scalar(PrimType::Scalar, 4, 0, (ordinal - 1).max(0))
        }
        other => {
            ctx.diagnostics
                .push(Diagnostic::syntax(format!("expected a type denoter, found {other:?}"), ctx.span()));
            TypeInfo::scalar(PrimType::Integer, 4, i32::MIN as i64, i32::MAX as i64)
        }
    }
}

/// Returns whether any declared variable is `String`-typed — the
/// resource-allocation pass (`spec.md` §4.5) pushes the string stack once,
/// on the *first* such occurrence, before running `finalize_variable` over
/// every pending declaration.
fn parse_var_decls(ctx: &mut Context<impl ObjectSink>) -> (bool, Vec<i32>) {
    let mut pending: Vec<PendingVar> = Vec::new();
    loop {
        let TokenKind::Identifier(_) = ctx.peek() else {
            break;
        };
        let mut names = Vec::new();
        loop {
            let TokenKind::Identifier(name) = ctx.peek().clone() else {
                break;
            };
            ctx.advance();
            names.push(name);
            if !ctx.eat(TokenKind::Comma) {
                break;
            }
        }
        ctx.expect(TokenKind::Colon, "':'");
        let type_info = parse_type_denoter(ctx);
        // `spec.md` §3.1 "Kind = Variable": `flags (external, ...)`. A
        // trailing `external` directive before the terminating `;` marks
        // every name in this group as resolved by the object sink's
        // relocation mechanism rather than allocated in this file.
        let external = ctx.eat(TokenKind::Reserved(ReservedWord::External));
        let size = type_info.alloc_size.max(type_info.ref_size);
        let type_sym = ctx.symtab.add_type(ctx.interner.intern(""), ctx.level, type_info).unwrap_or(SymbolId(0));
        // `spec.md` §4.5's value-assignment pass: a trailing `= <const>`,
        // parsed here (its tokens only ever appear once in the source) and
        // carried on each `PendingVar` for `finalize_variable` to emit the
        // store from once pass two runs.
        let init = parse_optional_var_init(ctx, external, names.len());
        for name in names {
            pending.push(ctx.reserve_variable(name, type_sym, size, external, init.clone()));
        }
        ctx.expect(TokenKind::Semicolon, "';'");
        if !matches!(ctx.peek(), TokenKind::Identifier(_)) {
            break;
        }
    }
    let needs_string_stack_pop = pending.iter().any(|p| is_string_type(ctx, p.type_sym));
    if needs_string_stack_pop {
        ctx.emitter.emit_simple(crate::emitter::SimpleOp::Pushs);
    }
    let mut file_vars = Vec::new();
    for p in pending {
        let is_file = !p.external && is_file_type(ctx, p.type_sym);
        let offset = p.offset;
        ctx.finalize_variable(p);
        if is_file {
            file_vars.push(offset);
        }
    }
    (needs_string_stack_pop, file_vars)
}

/// `spec.md` §4.5's `= <const>` variable initializer, consumed at the point
/// it appears in the source (immediately after a declaration group's type
/// denoter and optional `external` directive). Only a single-name group may
/// carry one — assigning one literal to a whole `name_list` has no defined
/// meaning — and an `external` declaration's storage is owned by whatever
/// file originally defined it, so neither gets a stored [`ConstInit`];
/// both cases still consume the initializer's tokens and report a
/// diagnostic rather than leaving the cursor parked on them.
fn parse_optional_var_init(ctx: &mut Context<impl ObjectSink>, external: bool, group_len: usize) -> Option<ConstInit> {
    if !ctx.eat(TokenKind::Eq) {
        return None;
    }
    let negate = ctx.eat(TokenKind::Minus);
    let value = match ctx.peek().clone() {
        TokenKind::IntegerLit(v) => {
            ctx.advance();
            ConstInit::Integer(if negate { -v } else { v })
        }
        TokenKind::RealLit(v) => {
            ctx.advance();
            ConstInit::Real(if negate { -v } else { v })
        }
        TokenKind::StringLit(sym) => {
            ctx.advance();
            ConstInit::Str(ctx.interner.resolve(sym).to_string())
        }
        TokenKind::Reserved(ReservedWord::Nil) => {
            ctx.advance();
            ConstInit::Integer(0)
        }
        TokenKind::Identifier(name) => {
            ctx.advance();
            match ctx.find_symbol(name, SymbolId(0)).map(|id| ctx.symtab.entry(id).kind.clone()) {
                Some(crate::symtab::SymbolKind::Constant(ConstInfo {
                    value: ConstValue::Integer(v) | ConstValue::Ordinal(v),
                    ..
                })) => ConstInit::Integer(if negate { -v } else { v }),
                Some(crate::symtab::SymbolKind::Constant(ConstInfo {
                    value: ConstValue::Real(v),
                    ..
                })) => ConstInit::Real(if negate { -v } else { v }),
                _ => {
                    ctx.diagnostics
                        .push(Diagnostic::type_error("expected a constant initializer", ctx.span()));
                    ConstInit::Integer(0)
                }
            }
        }
        _ => {
            ctx.diagnostics
                .push(Diagnostic::syntax("expected a constant initializer", ctx.span()));
            ConstInit::Integer(0)
        }
    };
    if external {
        ctx.diagnostics.push(Diagnostic::type_error(
            "an external variable cannot have an initializer",
            ctx.span(),
        ));
        return None;
    }
    if group_len != 1 {
        ctx.diagnostics.push(Diagnostic::type_error(
            "an initializer is only permitted for a single variable declaration",
            ctx.span(),
        ));
        return None;
    }
    Some(value)
}

fn parse_proc_decl(ctx: &mut Context<impl ObjectSink>, is_function: bool) {
    ctx.advance();
    let TokenKind::Identifier(name) = ctx.peek().clone() else {
        ctx.diagnostics
            .push(Diagnostic::syntax("expected a procedure/function name", ctx.span()));
        return;
    };
    ctx.advance();

    let mut param_count = 0u32;
    let mut params: Vec<ParamDecl> = Vec::new();
    if ctx.eat(TokenKind::LParen) {
        if !matches!(ctx.peek(), TokenKind::RParen) {
            loop {
                let is_var_param = ctx.eat(TokenKind::Reserved(ReservedWord::Var));
                let mut names = Vec::new();
                loop {
                    let TokenKind::Identifier(param_name) = ctx.peek().clone() else {
                        break;
                    };
                    ctx.advance();
                    names.push(param_name);
                    param_count += 1;
                    if !ctx.eat(TokenKind::Comma) {
                        break;
                    }
                }
                ctx.expect(TokenKind::Colon, "':'");
                let TokenKind::Identifier(type_name) = ctx.peek().clone() else {
                    break;
                };
                ctx.advance();
                let type_sym = resolve_type_name(ctx, type_name).unwrap_or(ctx.env.integer_type);
                // a VAR parameter is always passed as a hidden pointer
                // (`spec.md` §3.5, §4.3), regardless of the pointee's size.
                let size = if is_var_param { 4 } else { type_size(ctx, type_sym) };
                for param_name in names {
                    params.push(ParamDecl {
                        name: param_name,
                        type_sym,
                        is_var_param,
                        size,
                    });
                }
                if !ctx.eat(TokenKind::Semicolon) {
                    break;
                }
            }
        }
        ctx.expect(TokenKind::RParen, "')'");
    }

    let return_type = if is_function {
        ctx.expect(TokenKind::Colon, "':'");
        match ctx.peek().clone() {
            TokenKind::Identifier(rt_name) => {
                ctx.advance();
                resolve_type_name(ctx, rt_name)
            }
            _ => None,
        }
    } else {
        None
    };
    ctx.expect(TokenKind::Semicolon, "';'");

    // `spec.md` §3.1 "Kind = Procedure/Function: flags (external, ...)":
    // an `external` directive in place of a body means this declaration's
    // only job is to register the symbol and, at level 0, import it from
    // the object sink — there is no body to parse or activation record to
    // open.
    let external = ctx.eat(TokenKind::Reserved(ReservedWord::External));
    if external {
        ctx.expect(TokenKind::Semicolon, "';'");
    }
    let entry_label = ctx.new_label();
    let mut proc = ProcInfo {
        entry_label,
        param_count,
        external,
        return_type,
        sink_symbol: None,
    };
    let id = ctx.symtab.add_procedure(name, ctx.level, proc.clone()).unwrap_or(SymbolId(0));

    if external {
        if ctx.level == 0 {
            let name_text = ctx.interner.resolve(name).to_string();
            ctx.emitter.import_proc(&name_text, &mut proc);
            *ctx.symtab.entry_mut(id) = crate::symtab::SymbolEntry {
                name,
                kind: crate::symtab::SymbolKind::Procedure(proc),
                level: ctx.level,
            };
        } else {
            ctx.diagnostics
                .push(Diagnostic::scope("an external procedure must be declared at the outermost level", ctx.span()));
        }
        return;
    }

    let outer_level = ctx.level;
    let outer_offset = ctx.next_offset;
    ctx.level += 1;
    ctx.next_offset = 0;
    let scope_base = ctx.table_base();

    // parameters live in the callee's own scope, at the callee's level, so
    // the complex-factor walker resolves them exactly like any other local
    // (`spec.md` §4.1: "a symbol's level is set at addSymbol time").
    for param in &params {
        let offset = ctx.next_offset;
        ctx.next_offset += param.size as i32;
        let var = VariableInfo {
            flags: VarFlags {
                external: false,
                var_param: param.is_var_param,
            },
            offset,
            size: param.size,
            type_sym: param.type_sym,
            sink_symbol: None,
            base_field_offset: 0,
        };
        let _ = ctx.symtab.add_variable(param.name, ctx.level, var);
    }

    // a function's own name, used as an assignment target inside its body
    // to set the return value, is installed as an ordinary local aliasing a
    // dedicated result slot — it shadows the enclosing `Procedure` entry for
    // any lookup from within the body, since `find_symbol` always returns
    // the innermost binding.
    let result_var = return_type.map(|rt| {
        let size = type_size(ctx, rt);
        let offset = ctx.next_offset;
        ctx.next_offset += size as i32;
        let var = VariableInfo {
            flags: VarFlags::default(),
            offset,
            size,
            type_sym: rt,
            sink_symbol: None,
            base_field_offset: 0,
        };
        let _ = ctx.symtab.add_variable(name, ctx.level, var.clone());
        var
    });

    ctx.emitter.emit_label(entry_label);
    let (needs_string_stack_pop, file_vars) = parse_block(ctx);
    ctx.finalize_files(&file_vars);
    if needs_string_stack_pop {
        ctx.emitter.emit_simple(crate::emitter::SimpleOp::Pops);
    }

    // leave the result on top of the data stack as the last thing this
    // activation does before `END`, so the caller finds it where the call
    // convention expects a function's value.
    if let Some(var) = &result_var {
        ctx.emitter.emit_stack_ref(crate::emitter::RefOp::Load, ctx.level, var, ctx.level);
    }

    let undefined = ctx.symtab.verify_labels(scope_base);
    for _ in undefined {
        ctx.diagnostics
            .push(Diagnostic::scope("label declared but never defined", ctx.span()));
    }
    ctx.symtab.close_scope(scope_base);
    ctx.emitter.emit_simple(crate::emitter::SimpleOp::End);

    ctx.level = outer_level;
    ctx.next_offset = outer_offset;

    // an `external` declaration returned above before reaching this point,
    // so every procedure reaching here has a real body to export.
    if ctx.level == 0 {
        let name_text = ctx.interner.resolve(name).to_string();
        let mut proc = match &ctx.symtab.entry(id).kind {
            crate::symtab::SymbolKind::Procedure(p) => p.clone(),
            _ => unreachable!(),
        };
        ctx.emitter.export_proc(&name_text, &mut proc);
        *ctx.symtab.entry_mut(id) = crate::symtab::SymbolEntry {
            name,
            kind: crate::symtab::SymbolKind::Procedure(proc),
            level: ctx.level,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objectsink::VecSink;

    #[test]
    fn compiles_trivial_program_with_no_diagnostics() {
        let mut sink = VecSink::new();
        let result = compile("program Empty; begin end.", "t.pas", &mut sink);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn compiles_assignment_and_arithmetic() {
        let mut sink = VecSink::new();
        let src = "program P; var x: integer; begin x := 1 + 2 end.";
        let result = compile(src, "t.pas", &mut sink);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        assert!(!sink.opcodes.is_empty());
    }

    #[test]
    fn reports_undeclared_identifier() {
        let mut sink = VecSink::new();
        let src = "program P; begin x := 1 end.";
        let result = compile(src, "t.pas", &mut sink);
        assert!(!result.diagnostics.is_empty());
    }

    #[test]
    fn compiles_if_then_else() {
        let mut sink = VecSink::new();
        let src = "program P; var x: integer; begin if x = 0 then x := 1 else x := 2 end.";
        let result = compile(src, "t.pas", &mut sink);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn compiles_for_loop() {
        let mut sink = VecSink::new();
        let src = "program P; var i: integer; begin for i := 1 to 10 do i := i end.";
        let result = compile(src, "t.pas", &mut sink);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn undefined_label_is_reported() {
        let mut sink = VecSink::new();
        let src = "program P; label 1; begin goto 1 end.";
        let result = compile(src, "t.pas", &mut sink);
        assert!(!result.diagnostics.is_empty());
    }

    /// `spec.md` §8 invariant #4: every `PUSHS` is matched by exactly one
    /// `POPS`, regardless of how many statements (including nested ones
    /// inside a compound or an IF/ELSE) were compiled.
    #[test]
    fn every_pushs_is_matched_by_a_pops() {
        use crate::emitter::{Opcode, SimpleOp};
        let mut sink = VecSink::new();
        let src = "program P; var x: integer; begin if x = 0 then x := 1 else x := 2; x := x + 1 end.";
        let result = compile(src, "t.pas", &mut sink);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        let pushs = sink.opcodes.iter().filter(|op| matches!(op, Opcode::Simple(SimpleOp::Pushs))).count();
        let pops = sink.opcodes.iter().filter(|op| matches!(op, Opcode::Simple(SimpleOp::Pops))).count();
        assert_eq!(pushs, pops);
        assert!(pushs > 0);
    }

    #[test]
    fn program_body_ends_with_an_end_opcode() {
        use crate::emitter::{Opcode, SimpleOp};
        let mut sink = VecSink::new();
        let result = compile("program Empty; begin end.", "t.pas", &mut sink);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        assert_eq!(sink.opcodes.last(), Some(&Opcode::Simple(SimpleOp::End)));
    }
}
