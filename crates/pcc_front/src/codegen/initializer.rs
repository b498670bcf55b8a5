//! Two-pass variable initializer (`spec.md` §4.5).
//!
//! Global and local variables with static initial values are handled in two
//! separate sweeps over a block's declaration list: pass one reserves data
//! space and records each variable's `(offset, size)` without emitting any
//! code (so a forward reference to a not-yet-sized record works), and pass
//! two, run only after every type in the block is fully sized, emits the
//! actual store sequence. Folding both into one sweep would require a
//! variable's own type to already be complete at the point its initializer
//! is compiled, which record and array declarations don't guarantee.

use crate::emitter::{DataOp, FpOp, IndirectOp, IoOp, LibCallId, RefOp};
use crate::objectsink::ObjectSink;
use crate::symtab::{PrimType, SymbolId, SymbolKind, TypeInfo, VarFlags, VariableInfo};

use super::Context;

/// A compile-time-constant `= <value>` initializer, parsed once (during
/// pass one, at the point its tokens appear in the source) and carried on
/// the [`PendingVar`] it belongs to so pass two can emit the right store
/// shape once every type in the block has its final `alloc_size`
/// (`spec.md` §4.5 item 2).
#[derive(Debug, Clone)]
pub enum ConstInit {
    Integer(i64),
    Real(f64),
    Str(String),
}

/// One pending declaration collected during pass one.
pub struct PendingVar {
    pub name: pcc_base::Symbol,
    pub type_sym: SymbolId,
    pub size: u32,
    pub offset: i32,
    pub external: bool,
    pub init: Option<ConstInit>,
}

impl<'src, 'sink, S: ObjectSink> Context<'src, 'sink, S> {
    /// Pass one: reserves `size` bytes at the current level and adds the
    /// symbol-table entry, without emitting any initialization code yet.
    pub fn reserve_variable(
        &mut self,
        name: pcc_base::Symbol,
        type_sym: SymbolId,
        size: u32,
        external: bool,
        init: Option<ConstInit>,
    ) -> PendingVar {
        let offset = self.next_offset;
        self.next_offset += size as i32;
        PendingVar {
            name,
            type_sym,
            size,
            offset,
            external,
            init,
        }
    }

    pub(super) fn type_tag(&self, type_sym: SymbolId) -> PrimType {
        match &self.symtab.entry(type_sym).kind {
            SymbolKind::Type(TypeInfo { tag, .. }) => *tag,
            _ => PrimType::Integer,
        }
    }

    /// `spec.md` §4.5 finalization, file half: "for each non-preallocated
    /// file, free it" — the mirror of the `AllocFile` call
    /// [`Context::finalize_variable`] emits for each `File`-typed
    /// declaration in this same block.
    pub fn finalize_files(&mut self, file_offsets: &[i32]) {
        for &offset in file_offsets {
            self.emitter.emit_level_ref(RefOp::Load, self.level, self.level, offset);
            self.emitter.emit_io(IoOp::FreeFile);
        }
    }

    /// Pass two: installs the symbol table entry for a reserved variable
    /// and, if the declaration carries a `= <const>` initializer, emits the
    /// store. Must run after every type in the enclosing block has its
    /// final `alloc_size` (records/arrays may still be growing during pass
    /// one).
    pub fn finalize_variable(&mut self, pending: PendingVar) -> SymbolId {
        let mut var = VariableInfo {
            flags: VarFlags {
                external: pending.external,
                var_param: false,
            },
            offset: pending.offset,
            size: pending.size,
            type_sym: pending.type_sym,
            sink_symbol: None,
            base_field_offset: 0,
        };

        let id = self
            .symtab
            .add_variable(pending.name, self.level, var.clone())
            .unwrap_or_else(|_| {
                self.diagnostics
                    .push(crate::diagnostic::Diagnostic::overflow("symbol table overflow", self.span()));
                SymbolId(0)
            });

        if self.level == 0 {
            let name_text = self.interner.resolve(pending.name).to_string();
            if pending.external {
                self.emitter.import_stack_symbol(&name_text, &mut var);
            } else {
                self.emitter.export_stack_symbol(&name_text, &mut var);
            }
            *self.symtab.entry_mut(id) = crate::symtab::SymbolEntry {
                name: pending.name,
                kind: crate::symtab::SymbolKind::Variable(var),
                level: self.level,
            };
        }

        // `spec.md` §4.5 resource-allocation pass: a `String` variable is
        // handed its storage via a string-init library call (the caller
        // already pushed the block's single `Pushs` bracket); a `File`
        // variable either gets a runtime-allocated slot stored into it.
        // Neither applies to an `external` declaration, whose storage is
        // owned by whatever file/string-init code already ran wherever it
        // was originally defined.
        if !pending.external {
            match self.type_tag(pending.type_sym) {
                PrimType::String => {
                    self.emitter.emit_level_ref(RefOp::LoadAddr, self.level, self.level, pending.offset);
                    self.emitter.emit_lib_call(LibCallId::Strinit);
                }
                PrimType::File => {
                    self.emitter.emit_io(IoOp::AllocFile);
                    self.emitter.emit_level_ref(RefOp::Store, self.level, self.level, pending.offset);
                }
                _ => {}
            }
        }

        // `spec.md` §4.5 value-assignment pass: "for declarations with
        // initial values, push the literal and store into the variable
        // slot". `pending.init` was already parsed in pass one, at the
        // point its tokens appeared in the source (`parse_var_decls`); all
        // that's left here is to pick the right push/store shape now that
        // `pending.type_sym`'s `alloc_size` is final.
        if let Some(init) = pending.init {
            self.emit_const_init_store(pending.offset, pending.type_sym, init);
        }

        id
    }

    /// Dispatches a declaration's constant initializer by the variable's
    /// declared type (`spec.md` §4.5 item 2): an ordinal destination gets a
    /// single push + store (byte-width for `Char`/`Boolean`), `Real` gets a
    /// multi-word push — the literal's bit pattern is placed in RO-data and
    /// indirect-loaded back, the same materialize-then-copy shape RO-data
    /// strings already use — and `String` is copied in through the same
    /// library-call dispatch a string-literal assignment statement uses
    /// (`spec.md` §4.4.1).
    fn emit_const_init_store(&mut self, offset: i32, type_sym: SymbolId, init: ConstInit) {
        let level = self.level;
        match (self.type_tag(type_sym), init) {
            (PrimType::String, ConstInit::Str(text)) => {
                self.emitter.emit_level_ref(RefOp::LoadAddr, level, level, offset);
                let ro_offset = self.emitter.add_ro_data_string(text.as_bytes());
                self.emitter.emit_data_op(DataOp::Lac, ro_offset as i32);
                self.emitter.emit_lib_call(LibCallId::Strcpy);
            }
            (PrimType::Real, ConstInit::Real(v)) => {
                let bytes = v.to_le_bytes();
                let ro_offset = self.emitter.add_ro_data_string(&bytes);
                self.emitter.emit_data_op(DataOp::Lac, ro_offset as i32);
                self.emitter.emit_data_size(bytes.len() as u32);
                self.emitter.emit_indirect(IndirectOp::LoadMulti);
                self.emitter.emit_data_size(bytes.len() as u32);
                self.emitter.emit_level_ref(RefOp::StoreMulti, level, level, offset);
            }
            (PrimType::Real, ConstInit::Integer(v)) => {
                // An integer literal initializing a `Real` variable is
                // promoted the same way a mixed-type operator's integer
                // operand is (`spec.md` §4.3's auto-coercion).
                self.emitter.emit_data_op(DataOp::Push, v as i32);
                self.emitter.emit_fp(FpOp::Float, true, false);
                self.emitter.emit_data_size(8);
                self.emitter.emit_level_ref(RefOp::StoreMulti, level, level, offset);
            }
            (PrimType::Char, ConstInit::Integer(v)) => {
                self.emitter.emit_data_op(DataOp::Push, v as i32);
                self.emitter.emit_level_ref(RefOp::StoreByte, level, level, offset);
            }
            (PrimType::Char, ConstInit::Str(text)) => {
                let v = text.as_bytes().first().copied().unwrap_or(0) as i32;
                self.emitter.emit_data_op(DataOp::Push, v);
                self.emitter.emit_level_ref(RefOp::StoreByte, level, level, offset);
            }
            (PrimType::Boolean, ConstInit::Integer(v)) => {
                self.emitter.emit_data_op(DataOp::Push, v as i32);
                self.emitter.emit_level_ref(RefOp::StoreByte, level, level, offset);
            }
            (PrimType::Set, _) => {
                // No set-literal grammar reaches a variable initializer
                // (the `[...]` set constructor is only parsed as part of an
                // ordinary expression, not the constant-literal subset
                // `parse_var_decls`'s initializer parses); flagged rather
                // than silently emitting a wrong store.
                self.diagnostics.push(crate::diagnostic::Diagnostic::type_error(
                    "set-valued variable initializers are not supported",
                    self.span(),
                ));
            }
            (PrimType::Integer | PrimType::Word | PrimType::Scalar | PrimType::Subrange | PrimType::Pointer, ConstInit::Integer(v)) => {
                self.emitter.emit_data_op(DataOp::Push, v as i32);
                self.emitter.emit_level_ref(RefOp::Store, level, level, offset);
            }
            (tag, _) => {
                self.diagnostics.push(crate::diagnostic::Diagnostic::type_error(
                    format!("initializer does not match variable type ({tag:?})"),
                    self.span(),
                ));
            }
        }
    }
}
