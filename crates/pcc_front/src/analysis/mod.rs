//! Static-semantics helpers shared by the expression and statement compilers.

pub mod types;

pub use types::{ExprBase, ExprType};
