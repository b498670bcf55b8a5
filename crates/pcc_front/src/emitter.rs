//! Opcode emission and the level-stack-pointer cache (`spec.md` §4.2, §3.3).
//!
//! The [`Emitter`] is the only module that knows how to turn a validated
//! operation into a record for the [`crate::objectsink::ObjectSink`]
//! collaborator. It owns two pieces of state that callers must never
//! duplicate: the running label counter, and `current_stack_level`, the
//! cached belief about what the machine's LSP register currently holds.
//! Everything else is a pure "accept already-validated operands, emit a
//! record" entry point.

use crate::objectsink::{DebugInfo, FileHeader, ObjectSink, RelocKind, SinkSymbolFlags, SinkSymbolKind, SymbolEntry as SinkSymbolEntry};
use crate::symtab::{ProcInfo, VariableInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Not,
    And,
    Or,
    Sll,
    Sra,
    Srl,
    Abs,
    Inc,
    Dec,
    Dup,
    Xchg,
    Equ,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Equz,
    Neqz,
    Ltz,
    Ltez,
    Gtz,
    Gtez,
    End,
    /// Opens a lexically-scoped region of the string stack. Every statement
    /// brackets its own execution in a `Pushs`/`Pops` pair (`spec.md` §3.5,
    /// §8 invariant #4) so transient `StkString` temporaries it produces are
    /// released as control leaves it, regardless of which path was taken.
    Pushs,
    Pops,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOp {
    /// Push a 32-bit immediate.
    Push,
    /// Adjust the data stack by a signed immediate (grows the stack for
    /// negative-sized scratch regions like the FOR-bound and CASE-selector
    /// duplicates; `spec.md` §8 invariant #5).
    Inds,
    /// Load address of RO-data at an immediate offset.
    Lac,
}

/// General-form stack-reference opcode family (`spec.md` §4.2's LD/LDX/LDB/
/// LDXB/LDM/LDXM/LA/LAX/ST/STX/STB/STXB/STM/STXM table). The emitter decides
/// short-vs-general encoding; this enum names the *operation*, independent
/// of that encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefOp {
    Load,
    LoadIndexed,
    LoadByte,
    LoadIndexedByte,
    LoadMulti,
    LoadIndexedMulti,
    LoadAddr,
    LoadAddrIndexed,
    Store,
    StoreIndexed,
    StoreByte,
    StoreIndexedByte,
    StoreMulti,
    StoreIndexedMulti,
}

/// Whether a [`RefOp`] was emitted in the level-0 short form or the
/// general, level-parameterized form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefForm {
    /// Level 0: the short-form opcode, no level field needed.
    Short,
    /// Non-zero `levelDelta = currentLevel - declLevel`.
    General(u16),
}

/// `^`-dereference / indirect load-store through an address already on the
/// stack. These have no level (the address is already static-link-relative
/// resolved) so there is no short/general distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndirectOp {
    Load,
    LoadByte,
    LoadMulti,
    Store,
    StoreByte,
    StoreMulti,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    AllocFile,
    FreeFile,
    Eof,
    Eoln,
    Reset,
    Rewrite,
    Get,
    Put,
    Read,
    Write,
    Readln,
    Writeln,
    Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpOp {
    Abs,
    Sqr,
    Round,
    Trunc,
    /// Explicit integer-to-real cast, used only if the `arg1`/`arg2` bit
    /// encoding (see below) is not chosen for a given binary op — `spec.md`
    /// §9 requires picking exactly one encoding and not mixing them per op.
    Float,
    Sqrt,
    Sin,
    Cos,
    Arctan,
    Ln,
    Exp,
    /// Binary +,-,*,/ etc. over reals; `arg1`/`arg2` mark which operand
    /// still needs the emitted-once integer→real coercion.
    Add,
    Sub,
    Mul,
    Div,
    Equ,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Build,
    Union,
    Intersection,
    Difference,
    Equ,
    Neq,
    /// Membership test for `IN`, after the LHS has been shifted by the
    /// set's `minValue` (`spec.md` §4.3).
    BitTest,
}

/// Closed catalogue of run-time library dispatch numbers (`spec.md` §6.4).
/// The emitter treats these as opaque integers; only the run-time
/// implements them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibCallId {
    Halt,
    Getenv,
    Strcpy,
    Strcpyx,
    Sstrcpy,
    Sstrcpyx,
    Sstr2str,
    Str2sstr,
    Sstr2strx,
    Str2sstrx,
    Cstr2str,
    Cstr2sstr,
    Cstr2strx,
    Cstr2sstrx,
    Bstr2str,
    Str2bstr,
    Str2bstrx,
    Val,
    Strinit,
    Sstrinit,
    Strtmp,
    Strdup,
    Sstrdup,
    Mkstkc,
    Strcat,
    Sstrcat,
    Strcatsstr,
    Sstrcatstr,
    Strcatc,
    Sstrcatc,
    Strcmp,
    Sstrcmp,
    Sstrcmpstr,
    Strcmpsstr,
    Mkstk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    Jmp,
    Jequz,
    Jneqz,
    Jlt,
    Jgt,
    Jle,
    Jge,
}

/// Every record kind the emitter can hand to an [`ObjectSink`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Opcode {
    Simple(SimpleOp),
    Data(DataOp, i32),
    DataSize(u32),
    Ref { form: RefForm, op: RefOp, offset: i32 },
    Indirect(IndirectOp),
    Io(IoOp),
    Fp { op: FpOp, arg1_is_int: bool, arg2_is_int: bool },
    Set(SetOp),
    LibCall(LibCallId),
    ProcCall { level: u16, target: LabelId },
    Label(LabelId),
    Jump { kind: JumpKind, target: LabelId },
}

/// Accepts opcode-emitting entry points over an [`ObjectSink`], tracking the
/// LSP cache and the label/debug-relocation bookkeeping that spans
/// statements (`spec.md` §3.3, §4.2).
pub struct Emitter<'s, S: ObjectSink> {
    sink: &'s mut S,
    next_label: u32,
    /// `None` means invalid: the next variable access must re-derive its
    /// level rather than trust a cached LSP.
    current_stack_level: Option<u16>,
    level_changes: u32,
}

impl<'s, S: ObjectSink> Emitter<'s, S> {
    pub fn new(sink: &'s mut S) -> Self {
        Emitter {
            sink,
            next_label: 0,
            current_stack_level: Some(0),
            level_changes: 0,
        }
    }

    pub fn new_label(&mut self) -> LabelId {
        let id = LabelId(self.next_label);
        self.next_label += 1;
        id
    }

    pub fn get_level(&self) -> Option<u16> {
        self.current_stack_level
    }

    pub fn set_level(&mut self, level: u16) {
        self.current_stack_level = Some(level);
    }

    /// A control-flow merge whose incoming paths may disagree on the LSP
    /// must call this; the next stack reference then re-derives its level
    /// instead of trusting a stale cache.
    pub fn invalidate_level(&mut self) {
        if self.current_stack_level.is_some() {
            self.level_changes += 1;
            log::trace!("LSP cache invalidated ({} invalidations so far)", self.level_changes);
        }
        self.current_stack_level = None;
    }

    pub fn n_stack_level_changes(&self) -> u32 {
        self.level_changes
    }

    pub fn emit_simple(&mut self, op: SimpleOp) {
        self.sink.emit_opcode(Opcode::Simple(op));
    }

    pub fn emit_data_op(&mut self, op: DataOp, imm: i32) {
        self.sink.emit_opcode(Opcode::Data(op, imm));
    }

    pub fn emit_data_size(&mut self, bytes: u32) {
        self.sink.emit_opcode(Opcode::DataSize(bytes));
    }

    pub fn emit_fp(&mut self, op: FpOp, arg1_is_int: bool, arg2_is_int: bool) {
        self.sink.emit_opcode(Opcode::Fp { op, arg1_is_int, arg2_is_int });
    }

    pub fn emit_set(&mut self, op: SetOp) {
        self.sink.emit_opcode(Opcode::Set(op));
    }

    pub fn emit_io(&mut self, op: IoOp) {
        self.sink.emit_opcode(Opcode::Io(op));
    }

    pub fn emit_lib_call(&mut self, id: LibCallId) {
        self.sink.emit_opcode(Opcode::LibCall(id));
    }

    pub fn emit_indirect(&mut self, op: IndirectOp) {
        self.sink.emit_opcode(Opcode::Indirect(op));
    }

    pub fn emit_line_number(&mut self, file: u32, line: u32) {
        self.sink.add_line_number(file, line);
    }

    pub fn emit_label(&mut self, label: LabelId) {
        self.sink.emit_opcode(Opcode::Label(label));
    }

    pub fn emit_jump(&mut self, kind: JumpKind, target: LabelId) {
        self.sink.emit_opcode(Opcode::Jump { kind, target });
    }

    /// `emitLevelRef`: at `decl_level` 0 (a true global), substitutes the
    /// short-form opcode regardless of how deep `current_level` is; a
    /// `decl_level - current_level` delta of 0 for a *non-global* symbol
    /// (a local referenced from within its own declaring procedure, the
    /// single most common access) is a different addressing mode and must
    /// not be confused with the global short form (`spec.md` §4.2, §8
    /// invariant #6).
    pub fn emit_level_ref(&mut self, op: RefOp, decl_level: u16, current_level: u16, offset: i32) {
        let form = if decl_level == 0 {
            RefForm::Short
        } else {
            RefForm::General(current_level - decl_level)
        };
        self.sink.emit_opcode(Opcode::Ref { form, op, offset });
    }

    /// `emitStackRef`: resolves a variable access relative to the emitter's
    /// current generation level. Level-0 externals get exactly one
    /// relocation record against their assigned object-sink symbol index
    /// (`spec.md` §8 invariant #7).
    pub fn emit_stack_ref(&mut self, op: RefOp, current_level: u16, var: &VariableInfo, decl_level: u16) {
        self.emit_level_ref(op, decl_level, current_level, var.offset);
        if decl_level == 0 && var.flags.external {
            let sym = var
                .sink_symbol
                .expect("an external variable must have been imported before being referenced");
            self.sink.add_relocation(RelocKind::DataLoadStore, sym, var.offset);
        }
    }

    /// `emitProcCall`: external procedures get exactly one relocation
    /// record against their assigned object-sink symbol index, the call-site
    /// mirror of [`Emitter::emit_stack_ref`]'s handling of external
    /// variables.
    pub fn emit_proc_call(&mut self, proc: &ProcInfo, proc_level: u16) {
        self.sink.emit_opcode(Opcode::ProcCall {
            level: proc_level + 1,
            target: proc.entry_label,
        });
        if proc.external {
            let sym = proc
                .sink_symbol
                .expect("an external procedure must have been imported before being called");
            self.sink.add_relocation(RelocKind::ProcCall, sym, 0);
        }
    }

    pub fn emit_debug_info(&mut self, proc: &ProcInfo, return_size: u32, param_sizes: Vec<u32>) {
        self.sink.add_debug_info(DebugInfo {
            label: proc.entry_label,
            return_size,
            param_sizes,
        });
    }

    pub fn set_file_header(&mut self, header: FileHeader) {
        self.sink.set_file_header(header);
    }

    pub fn add_ro_data_string(&mut self, bytes: &[u8]) -> u32 {
        self.sink.add_ro_data_string(bytes)
    }

    /// At level 0 only: publishes `var` as a DEFINED data symbol.
    pub fn export_stack_symbol(&mut self, name: &str, var: &mut VariableInfo) {
        let idx = self.sink.add_symbol(SinkSymbolEntry {
            kind: SinkSymbolKind::Data,
            flags: SinkSymbolFlags::None,
            name: name.to_string(),
            value: var.offset,
            size: var.size,
        });
        var.sink_symbol = Some(idx);
    }

    /// At level 0 only: publishes `var` as an UNDEFINED data symbol and
    /// records the assigned index for later relocation fixups.
    pub fn import_stack_symbol(&mut self, name: &str, var: &mut VariableInfo) {
        let idx = self.sink.add_symbol(SinkSymbolEntry {
            kind: SinkSymbolKind::Data,
            flags: SinkSymbolFlags::Undefined,
            name: name.to_string(),
            value: 0,
            size: var.size,
        });
        var.sink_symbol = Some(idx);
    }

    pub fn export_proc(&mut self, name: &str, proc: &mut ProcInfo) {
        let idx = self.sink.add_symbol(SinkSymbolEntry {
            kind: if proc.return_type.is_some() { SinkSymbolKind::Func } else { SinkSymbolKind::Proc },
            flags: SinkSymbolFlags::None,
            name: name.to_string(),
            value: proc.entry_label.0 as i32,
            size: 0,
        });
        proc.sink_symbol = Some(idx);
    }

    pub fn import_proc(&mut self, name: &str, proc: &mut ProcInfo) {
        let idx = self.sink.add_symbol(SinkSymbolEntry {
            kind: if proc.return_type.is_some() { SinkSymbolKind::Func } else { SinkSymbolKind::Proc },
            flags: SinkSymbolFlags::Undefined,
            name: name.to_string(),
            value: 0,
            size: 0,
        });
        proc.sink_symbol = Some(idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objectsink::VecSink;
    use crate::symtab::VarFlags;

    #[test]
    fn level_zero_reference_uses_short_form() {
        let mut sink = VecSink::new();
        let mut emitter = Emitter::new(&mut sink);
        emitter.emit_level_ref(RefOp::Load, 0, 0, 8);
        assert_eq!(
            sink.opcodes[0],
            Opcode::Ref {
                form: RefForm::Short,
                op: RefOp::Load,
                offset: 8
            }
        );
    }

    #[test]
    fn nonzero_level_reference_uses_general_form() {
        let mut sink = VecSink::new();
        let mut emitter = Emitter::new(&mut sink);
        emitter.emit_level_ref(RefOp::Load, 1, 3, 8);
        assert_eq!(
            sink.opcodes[0],
            Opcode::Ref {
                form: RefForm::General(2),
                op: RefOp::Load,
                offset: 8
            }
        );
    }

    /// A local referenced from within its own declaring procedure has a
    /// zero `levelDelta`, but since its `decl_level` is not 0 it must still
    /// get the `General` form, not be confused with a true global
    /// (`spec.md` §8 invariant #6).
    #[test]
    fn zero_delta_nonglobal_reference_still_uses_general_form() {
        let mut sink = VecSink::new();
        let mut emitter = Emitter::new(&mut sink);
        emitter.emit_level_ref(RefOp::Load, 1, 1, 8);
        assert_eq!(
            sink.opcodes[0],
            Opcode::Ref {
                form: RefForm::General(0),
                op: RefOp::Load,
                offset: 8
            }
        );
    }

    #[test]
    fn external_level_zero_variable_emits_exactly_one_relocation() {
        let mut sink = VecSink::new();
        let mut emitter = Emitter::new(&mut sink);
        let mut var = VariableInfo {
            flags: VarFlags { external: true, var_param: false },
            offset: 0,
            size: 4,
            type_sym: crate::symtab::SymbolId(0),
            sink_symbol: None,
            base_field_offset: 0,
        };
        emitter.import_stack_symbol("x", &mut var);
        emitter.emit_stack_ref(RefOp::Load, 0, &var, 0);
        assert_eq!(sink.relocations.len(), 1);
        assert_eq!(sink.relocations[0].1, var.sink_symbol.unwrap());
    }

    #[test]
    fn invalidate_level_clears_cache_and_counts_once() {
        let mut sink = VecSink::new();
        let mut emitter = Emitter::new(&mut sink);
        assert_eq!(emitter.get_level(), Some(0));
        emitter.invalidate_level();
        assert_eq!(emitter.get_level(), None);
        assert_eq!(emitter.n_stack_level_changes(), 1);
        emitter.invalidate_level();
        // already invalid: calling again must not lose the "was valid" edge,
        // but also must not double count a no-op invalidate.
        assert_eq!(emitter.n_stack_level_changes(), 1);
    }
}
