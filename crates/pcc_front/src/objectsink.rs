//! Object-sink collaborator contract (`spec.md` §2, §6.2).
//!
//! The front end never writes bytes to an output file directly; it hands
//! opcode, relocation, symbol, debug-info, and RO-data records to whatever
//! implements [`ObjectSink`]. That keeps the emitter ignorant of the actual
//! object format, and lets tests use the in-memory [`VecSink`] instead of a
//! real linker-compatible writer.

use crate::emitter::Opcode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkSymbolKind {
    Data,
    Proc,
    Func,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkSymbolFlags {
    None,
    Undefined,
}

#[derive(Debug, Clone)]
pub struct SymbolEntry {
    pub kind: SinkSymbolKind,
    pub flags: SinkSymbolFlags,
    pub name: String,
    pub value: i32,
    pub size: u32,
}

/// What a relocation patches (`spec.md` §6.2: "a relocation record ties a
/// reference back to an imported symbol").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocKind {
    DataLoadStore,
    ProcCall,
}

#[derive(Debug, Clone)]
pub struct DebugInfo {
    pub label: crate::emitter::LabelId,
    pub return_size: u32,
    pub param_sizes: Vec<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct FileHeader {
    pub program_name: String,
    pub source_path: String,
}

/// The collaborator the [`crate::emitter::Emitter`] feeds every output
/// record to.
pub trait ObjectSink {
    fn emit_opcode(&mut self, op: Opcode);
    fn add_relocation(&mut self, kind: RelocKind, symbol: u32, addend: i32);
    /// Returns the assigned symbol index.
    fn add_symbol(&mut self, entry: SymbolEntry) -> u32;
    fn add_debug_info(&mut self, info: DebugInfo);
    fn add_line_number(&mut self, file: u32, line: u32);
    /// Returns the byte offset the string was placed at.
    fn add_ro_data_string(&mut self, bytes: &[u8]) -> u32;
    fn set_file_header(&mut self, header: FileHeader);
}

/// In-memory sink used by tests and by the CLI's `--emit=text` debug mode.
#[derive(Debug, Default)]
pub struct VecSink {
    pub opcodes: Vec<Opcode>,
    pub relocations: Vec<(RelocKind, u32, i32)>,
    pub symbols: Vec<SymbolEntry>,
    pub debug_info: Vec<DebugInfo>,
    pub line_numbers: Vec<(u32, u32)>,
    pub ro_data: Vec<u8>,
    pub header: FileHeader,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectSink for VecSink {
    fn emit_opcode(&mut self, op: Opcode) {
        self.opcodes.push(op);
    }

    fn add_relocation(&mut self, kind: RelocKind, symbol: u32, addend: i32) {
        self.relocations.push((kind, symbol, addend));
    }

    fn add_symbol(&mut self, entry: SymbolEntry) -> u32 {
        let idx = self.symbols.len() as u32;
        self.symbols.push(entry);
        idx
    }

    fn add_debug_info(&mut self, info: DebugInfo) {
        self.debug_info.push(info);
    }

    fn add_line_number(&mut self, file: u32, line: u32) {
        self.line_numbers.push((file, line));
    }

    fn add_ro_data_string(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.ro_data.len() as u32;
        self.ro_data.extend_from_slice(bytes);
        offset
    }

    fn set_file_header(&mut self, header: FileHeader) {
        self.header = header;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_symbol_returns_sequential_indices() {
        let mut sink = VecSink::new();
        let a = sink.add_symbol(SymbolEntry {
            kind: SinkSymbolKind::Data,
            flags: SinkSymbolFlags::None,
            name: "a".into(),
            value: 0,
            size: 4,
        });
        let b = sink.add_symbol(SymbolEntry {
            kind: SinkSymbolKind::Proc,
            flags: SinkSymbolFlags::Undefined,
            name: "b".into(),
            value: 0,
            size: 0,
        });
        assert_eq!(a, 0);
        assert_eq!(b, 1);
    }

    #[test]
    fn add_ro_data_string_returns_appended_offset() {
        let mut sink = VecSink::new();
        let first = sink.add_ro_data_string(b"hello");
        let second = sink.add_ro_data_string(b"world");
        assert_eq!(first, 0);
        assert_eq!(second, 5);
    }
}
