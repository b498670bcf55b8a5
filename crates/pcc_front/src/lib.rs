//! Pascal front end: tokenizer collaborator, symbol table, expression-type
//! lattice, single-pass statement/expression codegen, and the P-Code
//! emitter and object-sink contract.

pub mod analysis;
pub mod codegen;
pub mod compile;
pub mod diagnostic;
pub mod emitter;
pub mod lexer;
pub mod objectsink;
pub mod symtab;
pub mod token;

pub use compile::{compile, CompileResult};
pub use diagnostic::{Diagnostic, DiagnosticBag, DiagnosticKind};
pub use objectsink::{ObjectSink, VecSink};
