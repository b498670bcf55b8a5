//! # pcc-base
//!
//! Pure structural atoms shared by the Pascal-to-P-Code compiler crates.
//!
//! - [`Arena`] — bump allocation for stable references (RO-data blobs, scratch buffers).
//! - [`Interner`]/[`Symbol`] — string interning for O(1) identifier equality.
//! - [`Span`] — source location tracking.
//! - [`SpannedError`]/[`Result`] — errors with source positions.
//!
//! This crate has no knowledge of Pascal syntax or semantics. It provides
//! only generic, reusable infrastructure the front end builds upon.

pub mod arena;
pub mod intern;
pub mod span;
pub mod error;

pub use arena::Arena;
pub use intern::{Interner, Symbol, SymbolEq};
pub use span::Span;
pub use error::{SpannedError, Result};
