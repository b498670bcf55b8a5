//! Expression-type lattice (`spec.md` §3.2, §4.3).
//!
//! Every expression the codegen walks carries an [`ExprType`] rather than a
//! bare [`crate::symtab::SymbolId`], because two wildcard categories —
//! `AnyOrdinal` and `AnyString` — never correspond to a single declared
//! type: `AnyOrdinal` matches any of Integer/Char/Boolean/Scalar/Subrange
//! when checking a standard-procedure argument, and `AnyString` matches
//! both packed-array-of-char and the `string` type when checking a
//! write-parameter. This mirrors the teacher's `LogosType` numeric-promotion
//! lattice (copy/numeric/promotion flags carried alongside the concrete
//! type) rather than re-deriving the same checks ad hoc at every call site.

use crate::symtab::{PrimType, SymTab, SymbolId, SymbolKind, TypeInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprBase {
    Integer,
    Real,
    Boolean,
    Char,
    /// A string residing in a named variable's own storage (`spec.md`
    /// §3.2). Must be cloned onto the string stack (becoming [`ExprBase::StkString`])
    /// before it can be the target of `+` concatenation.
    String,
    /// A transient string living on the string stack, produced by a prior
    /// clone or concatenation (`spec.md` §3.2, §4.3 "String `+`"). The only
    /// kind `+`-append may write into directly.
    StkString,
    /// A string returned by a run-time library call (e.g. `GETENV`),
    /// distinct from both because it is neither a named variable's storage
    /// nor a string-stack transient the compiler itself pushed.
    CString,
    Set,
    Pointer,
    Record,
    Array,
    File,
    /// Matches Integer, Char, Boolean, or any user scalar/subrange.
    AnyOrdinal,
    /// Matches `String`/`StkString`/`CString` or a packed array of char.
    AnyString,
    /// Propagated once a prior error already diagnosed this subexpression,
    /// so later checks don't cascade a second diagnostic for the same
    /// mistake (`spec.md` §7: "one diagnostic per mistake").
    Error,
}

impl ExprBase {
    fn from_prim(tag: PrimType) -> ExprBase {
        match tag {
            PrimType::Integer | PrimType::Word => ExprBase::Integer,
            PrimType::Real => ExprBase::Real,
            PrimType::Boolean => ExprBase::Boolean,
            PrimType::Char => ExprBase::Char,
            PrimType::String => ExprBase::String,
            PrimType::Set => ExprBase::Set,
            PrimType::Pointer => ExprBase::Pointer,
            PrimType::Record => ExprBase::Record,
            PrimType::Array => ExprBase::Array,
            PrimType::File => ExprBase::File,
            PrimType::Scalar | PrimType::Subrange => ExprBase::AnyOrdinal,
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, ExprBase::Integer | ExprBase::Real)
    }

    fn is_ordinal(self) -> bool {
        matches!(self, ExprBase::Integer | ExprBase::Char | ExprBase::Boolean | ExprBase::AnyOrdinal)
    }

    /// Any of the three string-kind variants (`spec.md` §3.2's tri-state:
    /// named-storage / string-stack-transient / library-returned).
    pub fn is_string_kind(self) -> bool {
        matches!(self, ExprBase::String | ExprBase::StkString | ExprBase::CString)
    }

    /// True when `self` (the formal parameter's declared shape) accepts an
    /// actual argument classified as `other`.
    fn accepts(self, other: ExprBase) -> bool {
        if self == other || self == ExprBase::Error || other == ExprBase::Error {
            return true;
        }
        match self {
            ExprBase::AnyOrdinal => other.is_ordinal(),
            ExprBase::AnyString => other.is_string_kind() || other == ExprBase::Array,
            _ => false,
        }
    }
}

/// A fully resolved expression type: the wildcard-aware [`ExprBase`]
/// category plus, when the expression denotes a concrete declared type, the
/// [`SymbolId`] of that declaration (needed for record-field lookups, array
/// element sizes, and set base ranges — information `ExprBase` alone can't
/// carry).
#[derive(Debug, Clone, Copy)]
pub struct ExprType {
    pub base: ExprBase,
    pub type_sym: Option<SymbolId>,
    /// Set once a `^`-dereference or `@`-address-of lifts the expression to
    /// a pointer value, independent of the pointed-to `base`
    /// (`spec.md` §9: "pointer-lifting as an explicit flag, not a distinct
    /// type tag, so the rest of the lattice doesn't need a Pointer-of-X per
    /// X").
    pub is_pointer: bool,
}

impl ExprType {
    pub fn new(base: ExprBase) -> Self {
        ExprType {
            base,
            type_sym: None,
            is_pointer: false,
        }
    }

    pub fn error() -> Self {
        ExprType::new(ExprBase::Error)
    }

    pub fn of_declared(symtab: &SymTab, type_sym: SymbolId) -> Self {
        match &symtab.entry(type_sym).kind {
            SymbolKind::Type(TypeInfo { tag, .. }) => ExprType {
                base: ExprBase::from_prim(*tag),
                type_sym: Some(type_sym),
                is_pointer: false,
            },
            _ => ExprType::error(),
        }
    }

    pub fn is_error(self) -> bool {
        self.base == ExprBase::Error
    }

    pub fn is_numeric(self) -> bool {
        self.base.is_numeric()
    }

    pub fn is_ordinal(self) -> bool {
        self.base.is_ordinal()
    }

    pub fn is_string_kind(self) -> bool {
        self.base.is_string_kind()
    }

    /// Whether an actual of type `self` may be passed where `formal` is
    /// expected, per the wildcard rules above.
    pub fn matches(self, formal: ExprType) -> bool {
        formal.base.accepts(self.base)
    }

    /// `spec.md` §4.3's single-pass coercion decision: an Integer operand
    /// against a Real peer promotes the Integer in place, emitting exactly
    /// one `FLOAT`-style conversion opcode at the point of use rather than
    /// rewriting the already-emitted operand (`spec.md` §9, "single-pass
    /// coercion decisions must be made locally, since there is no AST to
    /// revisit").
    pub fn needs_int_to_real_promotion(self, peer: ExprType) -> bool {
        self.base == ExprBase::Integer && peer.base == ExprBase::Real
    }

    /// The result type of a binary arithmetic operator over `self` and
    /// `rhs`, after promotion. `None` means the combination is not a valid
    /// arithmetic pair.
    pub fn arithmetic_result(self, rhs: ExprType) -> Option<ExprType> {
        if self.is_error() || rhs.is_error() {
            return Some(ExprType::error());
        }
        match (self.base, rhs.base) {
            (ExprBase::Integer, ExprBase::Integer) => Some(ExprType::new(ExprBase::Integer)),
            (ExprBase::Real, ExprBase::Real)
            | (ExprBase::Integer, ExprBase::Real)
            | (ExprBase::Real, ExprBase::Integer) => Some(ExprType::new(ExprBase::Real)),
            (ExprBase::Set, ExprBase::Set) => Some(ExprType::new(ExprBase::Set)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_ordinal_accepts_integer_char_and_boolean() {
        let formal = ExprType::new(ExprBase::AnyOrdinal);
        assert!(ExprType::new(ExprBase::Integer).matches(formal));
        assert!(ExprType::new(ExprBase::Char).matches(formal));
        assert!(ExprType::new(ExprBase::Boolean).matches(formal));
        assert!(!ExprType::new(ExprBase::Real).matches(formal));
    }

    #[test]
    fn any_string_accepts_string_and_char_array() {
        let formal = ExprType::new(ExprBase::AnyString);
        assert!(ExprType::new(ExprBase::String).matches(formal));
        assert!(ExprType::new(ExprBase::Array).matches(formal));
        assert!(!ExprType::new(ExprBase::Integer).matches(formal));
    }

    #[test]
    fn integer_and_real_arithmetic_promotes_to_real() {
        let int_ty = ExprType::new(ExprBase::Integer);
        let real_ty = ExprType::new(ExprBase::Real);
        assert!(int_ty.needs_int_to_real_promotion(real_ty));
        assert_eq!(int_ty.arithmetic_result(real_ty).unwrap().base, ExprBase::Real);
    }

    #[test]
    fn error_type_is_infectious_but_never_double_reported() {
        let err = ExprType::error();
        let int_ty = ExprType::new(ExprBase::Integer);
        assert!(err.arithmetic_result(int_ty).unwrap().is_error());
        assert!(int_ty.matches(err));
        assert!(err.matches(int_ty));
    }
}
