//! Named-scope symbol table (`spec.md` §3.1, §4.1).
//!
//! Every identifier the front end resolves — types, constants, string
//! constants, labels, variables, procedures/functions, record fields, and
//! files — is one [`SymbolEntry`] in a single append-only table. Scoping is
//! achieved purely through append order and a saved cursor (`table_base`):
//! `find_symbol` walks from the newest entry back to a caller-supplied
//! floor, so the innermost binding for a name is always found first, and a
//! closed-out procedure body's locals simply stop being in the searched
//! range once the block's scope closes.
//!
//! Cross-references between entries (a record field's owning record, a
//! variable's declared type, a subrange's base type, an array's index type)
//! are [`SymbolId`] indices rather than pointers, so the whole table is a
//! single `Vec` with stable, `Copy` references — the same "pointer-graph →
//! arena + indices" translation `spec.md` §9 calls for.

use std::collections::HashMap;

use pcc_base::{Interner, Symbol};

use crate::emitter::LabelId;

/// Index into [`SymTab`]'s entry arena. `Copy` so walkers can snapshot a
/// symbol's id cheaply while recursing without holding a borrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

/// A saved table length, used to open/close a lexical scope.
pub type TableBase = SymbolId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimType {
    Integer,
    Word,
    Char,
    Boolean,
    Real,
    Scalar,
    Set,
    String,
    File,
    Record,
    Array,
    Pointer,
    Subrange,
}

/// `Kind = Type` payload.
///
/// `base_type` plays the role of `spec.md`'s `refType`/parent-type
/// back-reference, whose meaning depends on `tag`: the pointee for
/// `Pointer`, the element type for `Array`, the ordinal base for
/// `Subrange`/`Set`. Collapsing the two documented fields into one avoids
/// carrying an always-empty field on every tag that doesn't need it; see
/// `DESIGN.md`.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub tag: PrimType,
    pub base_type: Option<SymbolId>,
    /// Array index type only.
    pub index_type: Option<SymbolId>,
    pub variable_sized: bool,
    pub alloc_size: u32,
    pub ref_size: u32,
    pub min_value: i64,
    pub max_value: i64,
}

impl TypeInfo {
    pub fn scalar(tag: PrimType, size: u32, min_value: i64, max_value: i64) -> Self {
        TypeInfo {
            tag,
            base_type: None,
            index_type: None,
            variable_sized: false,
            alloc_size: size,
            ref_size: size,
            min_value,
            max_value,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ConstValue {
    Integer(i64),
    Real(f64),
    /// Scalar/enum ordinal value; `enum_type` on [`ConstInfo`] names the enum.
    Ordinal(i64),
}

#[derive(Debug, Clone)]
pub struct ConstInfo {
    pub value: ConstValue,
    pub enum_type: Option<SymbolId>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VarFlags {
    pub external: bool,
    pub var_param: bool,
}

#[derive(Debug, Clone)]
pub struct VariableInfo {
    pub flags: VarFlags,
    pub offset: i32,
    pub size: u32,
    pub type_sym: SymbolId,
    /// Object-sink symbol index, assigned when the variable is external
    /// (imported) or exported at level 0.
    pub sink_symbol: Option<u32>,
    /// Extra compile-time-constant delta added at runtime after a
    /// `var_param` pointer is loaded, before it is treated as a base
    /// address (`spec.md` §4.4.5: a `WITH` base reached through a `VAR`
    /// parameter or an explicit `^` aliases each field this way, since the
    /// field's own offset within the record can't be folded into the
    /// pointer's own stack slot at compile time). Zero for every ordinary
    /// `VAR` parameter, where the callee dereferences the hidden pointer
    /// with nothing added.
    pub base_field_offset: i32,
}

#[derive(Debug, Clone)]
pub struct ProcInfo {
    pub entry_label: LabelId,
    pub param_count: u32,
    pub external: bool,
    /// `Some` for a function, naming its return type; `None` for a procedure.
    pub return_type: Option<SymbolId>,
    pub sink_symbol: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub size: u32,
    pub offset: u32,
    pub owner: SymbolId,
    pub field_type: SymbolId,
    pub next: Option<SymbolId>,
}

#[derive(Debug, Clone, Copy)]
pub struct FileInfo {
    pub slot: u32,
}

#[derive(Debug, Clone)]
pub enum SymbolKind {
    Type(TypeInfo),
    Constant(ConstInfo),
    StringConst { ro_offset: u32, byte_size: u32 },
    Label { number: i64, undefined: bool },
    Variable(VariableInfo),
    Procedure(ProcInfo),
    Field(FieldInfo),
    File(FileInfo),
}

#[derive(Debug, Clone)]
pub struct SymbolEntry {
    pub name: Symbol,
    pub kind: SymbolKind,
    pub level: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymTabError {
    /// "symbol-table full" — Overflow taxonomy in `spec.md` §7.
    TableFull,
}

impl std::fmt::Display for SymTabError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymTabError::TableFull => write!(f, "symbol table overflow"),
        }
    }
}
impl std::error::Error for SymTabError {}

/// Hard ceiling mirroring the original fixed-size table; chosen generously
/// since the arena here is a `Vec`, not a fixed array, but the overflow
/// diagnostic (`spec.md` §7, Overflow taxonomy) must still exist.
const MAX_SYMBOLS: usize = 1 << 20;

pub struct SymTab {
    entries: Vec<SymbolEntry>,
    /// Entries truncated out of `entries` at scope close, retained only for
    /// debug dumps (`spec.md` §4.1: "kept for debug dumps").
    debug_history: Vec<SymbolEntry>,
}

impl SymTab {
    pub fn new() -> Self {
        SymTab {
            entries: Vec::new(),
            debug_history: Vec::new(),
        }
    }

    /// `spec.md` §4.1 `findReserved`: delegates to the tokenizer's
    /// case-insensitive reserved-word table.
    pub fn find_reserved(lower_name: &str) -> Option<crate::token::ReservedWord> {
        crate::token::ReservedWord::lookup(lower_name)
    }

    /// Current table length, saved by the caller before opening a new scope
    /// and passed back in to [`SymTab::close_scope`] / [`SymTab::find_symbol`].
    pub fn table_base(&self) -> TableBase {
        SymbolId(self.entries.len() as u32)
    }

    fn get(&self, id: SymbolId) -> &SymbolEntry {
        &self.entries[id.0 as usize]
    }

    pub fn entry(&self, id: SymbolId) -> &SymbolEntry {
        self.get(id)
    }

    pub fn entry_mut(&mut self, id: SymbolId) -> &mut SymbolEntry {
        &mut self.entries[id.0 as usize]
    }

    /// `spec.md` §4.1 `findSymbol`: searches from the newest entry back to
    /// `table_base`, returning the innermost binding. Identifier names are
    /// interned in lower-cased form by the tokenizer, so this comparison is
    /// already case-insensitive.
    pub fn find_symbol(&self, name: Symbol, table_base: TableBase) -> Option<SymbolId> {
        let floor = table_base.0 as usize;
        for idx in (floor..self.entries.len()).rev() {
            if self.entries[idx].name == name {
                return Some(SymbolId(idx as u32));
            }
        }
        None
    }

    fn push(&mut self, name: Symbol, kind: SymbolKind, level: u16) -> Result<SymbolId, SymTabError> {
        if self.entries.len() >= MAX_SYMBOLS {
            return Err(SymTabError::TableFull);
        }
        let id = SymbolId(self.entries.len() as u32);
        self.entries.push(SymbolEntry { name, kind, level });
        Ok(id)
    }

    pub fn add_type(&mut self, name: Symbol, level: u16, info: TypeInfo) -> Result<SymbolId, SymTabError> {
        self.push(name, SymbolKind::Type(info), level)
    }

    pub fn add_constant(&mut self, name: Symbol, level: u16, info: ConstInfo) -> Result<SymbolId, SymTabError> {
        self.push(name, SymbolKind::Constant(info), level)
    }

    pub fn add_string_const(
        &mut self,
        name: Symbol,
        level: u16,
        ro_offset: u32,
        byte_size: u32,
    ) -> Result<SymbolId, SymTabError> {
        self.push(name, SymbolKind::StringConst { ro_offset, byte_size }, level)
    }

    pub fn add_label(&mut self, name: Symbol, level: u16, number: i64) -> Result<SymbolId, SymTabError> {
        self.push(
            name,
            SymbolKind::Label {
                number,
                undefined: true,
            },
            level,
        )
    }

    pub fn add_variable(&mut self, name: Symbol, level: u16, info: VariableInfo) -> Result<SymbolId, SymTabError> {
        self.push(name, SymbolKind::Variable(info), level)
    }

    pub fn add_procedure(&mut self, name: Symbol, level: u16, info: ProcInfo) -> Result<SymbolId, SymTabError> {
        self.push(name, SymbolKind::Procedure(info), level)
    }

    pub fn add_field(&mut self, name: Symbol, level: u16, info: FieldInfo) -> Result<SymbolId, SymTabError> {
        self.push(name, SymbolKind::Field(info), level)
    }

    pub fn add_file(&mut self, name: Symbol, level: u16, info: FileInfo) -> Result<SymbolId, SymTabError> {
        self.push(name, SymbolKind::File(info), level)
    }

    /// Marks the label at `id` as defined (the matching `n:` label statement
    /// has been emitted).
    pub fn define_label(&mut self, id: SymbolId) {
        if let SymbolKind::Label { undefined, number, .. } = &mut self.entry_mut(id).kind {
            *undefined = false;
            log::debug!("label {} resolved", number);
        }
    }

    /// `spec.md` §4.1 `verifyLabels`: after a procedure body closes, every
    /// label added at or above `base` that is still `undefined` is a "label
    /// declared but not defined" error. Must run before [`SymTab::close_scope`]
    /// truncates the entries being checked.
    pub fn verify_labels(&self, base: TableBase) -> Vec<SymbolId> {
        let floor = base.0 as usize;
        (floor..self.entries.len())
            .filter_map(|idx| match &self.entries[idx].kind {
                SymbolKind::Label { undefined: true, .. } => Some(SymbolId(idx as u32)),
                _ => None,
            })
            .collect()
    }

    /// Restores the table to `base`, archiving the truncated entries into
    /// `debug_history` rather than discarding them.
    pub fn close_scope(&mut self, base: TableBase) {
        let floor = base.0 as usize;
        if floor >= self.entries.len() {
            return;
        }
        self.debug_history.extend(self.entries.drain(floor..));
    }

    /// All entries ever added, live or archived, oldest first — for debug
    /// dumps only (`spec.md` §4.1).
    pub fn debug_dump(&self) -> impl Iterator<Item = &SymbolEntry> {
        self.debug_history.iter().chain(self.entries.iter())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SymTab {
    fn default() -> Self {
        Self::new()
    }
}

/// Well-known level-0 symbol ids, filled in by [`prime_standard_environment`].
#[derive(Debug, Clone, Copy)]
pub struct StandardEnv {
    pub integer_type: SymbolId,
    pub boolean_type: SymbolId,
    pub real_type: SymbolId,
    pub char_type: SymbolId,
    pub text_type: SymbolId,
    pub string_type: SymbolId,
    pub true_const: SymbolId,
    pub false_const: SymbolId,
    pub maxint_const: SymbolId,
    pub nil_const: SymbolId,
    pub input_file: SymbolId,
    pub output_file: SymbolId,
}

pub const MAXINT: i64 = i32::MAX as i64;

/// `spec.md` §4.1 "Primed contents on startup": standard constants, types,
/// and predefined files, interned and installed at level 0.
pub fn prime_standard_environment(symtab: &mut SymTab, interner: &mut Interner) -> StandardEnv {
    let integer_name = interner.intern("integer");
    let boolean_name = interner.intern("boolean");
    let real_name = interner.intern("real");
    let char_name = interner.intern("char");
    let text_name = interner.intern("text");
    let string_name = interner.intern("string");

    let integer_type = symtab
        .add_type(integer_name, 0, TypeInfo::scalar(PrimType::Integer, 4, i32::MIN as i64, MAXINT))
        .expect("priming the standard environment cannot overflow the table");
    let boolean_type = symtab
        .add_type(boolean_name, 0, TypeInfo::scalar(PrimType::Boolean, 1, 0, 1))
        .unwrap();
    let real_type = symtab
        .add_type(real_name, 0, TypeInfo::scalar(PrimType::Real, 8, 0, 0))
        .unwrap();
    let char_type = symtab
        .add_type(char_name, 0, TypeInfo::scalar(PrimType::Char, 1, 0, 255))
        .unwrap();
    let mut text_info = TypeInfo::scalar(PrimType::File, 4, 0, 0);
    text_info.base_type = Some(char_type);
    let text_type = symtab.add_type(text_name, 0, text_info).unwrap();
    let mut string_info = TypeInfo::scalar(PrimType::String, 256, 0, 255);
    string_info.variable_sized = true;
    let string_type = symtab.add_type(string_name, 0, string_info).unwrap();

    let true_const = symtab
        .add_constant(
            interner.intern("true"),
            0,
            ConstInfo {
                value: ConstValue::Ordinal(-1),
                enum_type: Some(boolean_type),
            },
        )
        .unwrap();
    let false_const = symtab
        .add_constant(
            interner.intern("false"),
            0,
            ConstInfo {
                value: ConstValue::Ordinal(0),
                enum_type: Some(boolean_type),
            },
        )
        .unwrap();
    let maxint_const = symtab
        .add_constant(
            interner.intern("maxint"),
            0,
            ConstInfo {
                value: ConstValue::Integer(MAXINT),
                enum_type: None,
            },
        )
        .unwrap();
    let nil_const = symtab
        .add_constant(
            interner.intern("nil"),
            0,
            ConstInfo {
                value: ConstValue::Integer(0),
                enum_type: None,
            },
        )
        .unwrap();

    let input_file = symtab
        .add_file(interner.intern("input"), 0, FileInfo { slot: 0 })
        .unwrap();
    let output_file = symtab
        .add_file(interner.intern("output"), 0, FileInfo { slot: 1 })
        .unwrap();

    StandardEnv {
        integer_type,
        boolean_type,
        real_type,
        char_type,
        text_type,
        string_type,
        true_const,
        false_const,
        maxint_const,
        nil_const,
        input_file,
        output_file,
    }
}

/// Flattened field-offset map for a record type, built once per record
/// declaration; used to keep `.field` lookups O(1) during the complex-factor
/// walk instead of re-walking the `next` link chain every time.
pub fn record_field_map(symtab: &SymTab, record_fields_head: Option<SymbolId>) -> HashMap<Symbol, SymbolId> {
    let mut map = HashMap::new();
    let mut cursor = record_fields_head;
    while let Some(id) = cursor {
        let entry = symtab.entry(id);
        map.insert(entry.name, id);
        cursor = match &entry.kind {
            SymbolKind::Field(f) => f.next,
            _ => None,
        };
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_symbol_returns_innermost_binding() {
        let mut interner = Interner::new();
        let mut symtab = SymTab::new();
        let x = interner.intern("x");
        let outer = symtab
            .add_variable(
                x,
                0,
                VariableInfo {
                    flags: VarFlags::default(),
                    offset: 0,
                    size: 4,
                    type_sym: SymbolId(0),
                    sink_symbol: None,
                    base_field_offset: 0,
                },
            )
            .unwrap();
        let base = symtab.table_base();
        let inner = symtab
            .add_variable(
                x,
                1,
                VariableInfo {
                    flags: VarFlags::default(),
                    offset: 4,
                    size: 4,
                    type_sym: SymbolId(0),
                    sink_symbol: None,
                    base_field_offset: 0,
                },
            )
            .unwrap();
        assert_eq!(symtab.find_symbol(x, SymbolId(0)), Some(inner));
        symtab.close_scope(base);
        assert_eq!(symtab.find_symbol(x, SymbolId(0)), Some(outer));
    }

    #[test]
    fn lookup_at_level_never_sees_a_deeper_declaration() {
        // invariant #2: every returned binding's level <= the level it was searched from.
        let mut interner = Interner::new();
        let mut symtab = SymTab::new();
        let y = interner.intern("y");
        assert_eq!(symtab.find_symbol(y, SymbolId(0)), None);
        let id = symtab
            .add_variable(
                y,
                2,
                VariableInfo {
                    flags: VarFlags::default(),
                    offset: 0,
                    size: 4,
                    type_sym: SymbolId(0),
                    sink_symbol: None,
                    base_field_offset: 0,
                },
            )
            .unwrap();
        assert_eq!(symtab.entry(id).level, 2);
    }

    #[test]
    fn verify_labels_flags_undefined_labels() {
        let mut interner = Interner::new();
        let mut symtab = SymTab::new();
        let base = symtab.table_base();
        let lbl1 = interner.intern("1");
        let lbl2 = interner.intern("2");
        let l1 = symtab.add_label(lbl1, 1, 1).unwrap();
        let _l2 = symtab.add_label(lbl2, 1, 2).unwrap();
        symtab.define_label(l1);
        let undefined = symtab.verify_labels(base);
        assert_eq!(undefined.len(), 1);
    }

    #[test]
    fn close_scope_archives_entries_for_debug_dump() {
        let mut interner = Interner::new();
        let mut symtab = SymTab::new();
        let name = interner.intern("tmp");
        let base = symtab.table_base();
        symtab
            .add_variable(
                name,
                1,
                VariableInfo {
                    flags: VarFlags::default(),
                    offset: 0,
                    size: 4,
                    type_sym: SymbolId(0),
                    sink_symbol: None,
                    base_field_offset: 0,
                },
            )
            .unwrap();
        symtab.close_scope(base);
        assert_eq!(symtab.find_symbol(name, SymbolId(0)), None);
        assert_eq!(symtab.debug_dump().count(), 1);
    }

    #[test]
    fn prime_standard_environment_installs_true_false_maxint() {
        let mut interner = Interner::new();
        let mut symtab = SymTab::new();
        let env = prime_standard_environment(&mut symtab, &mut interner);
        match symtab.entry(env.true_const).kind {
            SymbolKind::Constant(ConstInfo {
                value: ConstValue::Ordinal(-1),
                ..
            }) => {}
            _ => panic!("TRUE should be ordinal -1"),
        }
        match symtab.entry(env.maxint_const).kind {
            SymbolKind::Constant(ConstInfo {
                value: ConstValue::Integer(v),
                ..
            }) => assert_eq!(v, MAXINT),
            _ => panic!("MAXINT should be an integer constant"),
        }
    }
}
