//! Standard procedures and functions (`spec.md` §4.6): `write`/`writeln`,
//! `read`/`readln`, `new`/`dispose`, and the math/ordinal intrinsics
//! (`abs`, `sqr`, `round`, `trunc`, `ord`, `chr`, `succ`, `pred`, `odd`).
//!
//! These are recognized by name at the call site rather than being
//! pre-declared `Procedure`/`Function` symbol-table entries, since their
//! argument count and type vary per call (`writeln` takes any number of
//! `AnyOrdinal`/`AnyString`/real arguments) in a way the fixed-arity
//! `ProcInfo` shape can't express.

use crate::analysis::{ExprBase, ExprType};
use crate::emitter::{FpOp, IoOp, LibCallId, SimpleOp};
use crate::objectsink::ObjectSink;
use crate::symtab::SymbolKind;
use crate::token::TokenKind;

use super::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdRoutine {
    Write,
    Writeln,
    Read,
    Readln,
    New,
    Dispose,
    Abs,
    Sqr,
    Round,
    Trunc,
    Ord,
    Chr,
    Succ,
    Pred,
    Odd,
    Eof,
    Eoln,
    Sqrt,
    Sin,
    Cos,
    Arctan,
    Ln,
    Exp,
    Getenv,
    Halt,
    Val,
    Pack,
    Unpack,
    Get,
    Put,
    Reset,
    Rewrite,
    Page,
}

impl StdRoutine {
    pub fn lookup(lower: &str) -> Option<StdRoutine> {
        use StdRoutine::*;
        Some(match lower {
            "write" => Write,
            "writeln" => Writeln,
            "read" => Read,
            "readln" => Readln,
            "new" => New,
            "dispose" => Dispose,
            "abs" => Abs,
            "sqr" => Sqr,
            "round" => Round,
            "trunc" => Trunc,
            "ord" => Ord,
            "chr" => Chr,
            "succ" => Succ,
            "pred" => Pred,
            "odd" => Odd,
            "eof" => Eof,
            "eoln" => Eoln,
            "sqrt" => Sqrt,
            "sin" => Sin,
            "cos" => Cos,
            "arctan" => Arctan,
            "ln" => Ln,
            "exp" => Exp,
            "getenv" => Getenv,
            "halt" => Halt,
            "val" => Val,
            "pack" => Pack,
            "unpack" => Unpack,
            "get" => Get,
            "put" => Put,
            "reset" => Reset,
            "rewrite" => Rewrite,
            "page" => Page,
            _ => return None,
        })
    }

    /// True for the routines that are statements (procedures), never legal
    /// in expression position — `codegen/expr.rs::resolve_identifier_factor`
    /// uses this to reject e.g. `x := halt` before emission rather than
    /// emitting a nonsensical opcode sequence.
    pub fn is_procedure(self) -> bool {
        use StdRoutine::*;
        matches!(
            self,
            Write | Writeln | Read | Readln | New | Dispose | Halt | Pack | Unpack | Get | Put | Reset | Rewrite | Page
        )
    }
}

impl<'src, 'sink, S: ObjectSink> Context<'src, 'sink, S> {
    /// Compiles a call to a recognized standard routine; the identifier
    /// token has already been consumed by the caller.
    pub fn compile_std_call(&mut self, routine: StdRoutine) -> ExprType {
        match routine {
            StdRoutine::Write | StdRoutine::Writeln => {
                self.compile_write(routine == StdRoutine::Writeln);
                ExprType::new(ExprBase::Boolean) // statement-context call; value unused
            }
            StdRoutine::Read | StdRoutine::Readln => {
                self.compile_read(routine == StdRoutine::Readln);
                ExprType::new(ExprBase::Boolean)
            }
            StdRoutine::New => {
                self.expect(TokenKind::LParen, "'('");
                let _ptr = self.parse_expression();
                self.expect(TokenKind::RParen, "')'");
                self.emitter.emit_lib_call(LibCallId::Mkstk);
                ExprType::new(ExprBase::Boolean)
            }
            StdRoutine::Dispose => {
                self.expect(TokenKind::LParen, "'('");
                let _ptr = self.parse_expression();
                self.expect(TokenKind::RParen, "')'");
                ExprType::new(ExprBase::Boolean)
            }
            StdRoutine::Abs => self.compile_unary_math(|ctx, ty| {
                if ty.base == ExprBase::Real {
                    ctx.emitter.emit_fp(FpOp::Abs, false, false);
                } else {
                    ctx.emitter.emit_simple(SimpleOp::Abs);
                }
                ty
            }),
            StdRoutine::Sqr => self.compile_unary_math(|ctx, ty| {
                if ty.base == ExprBase::Real {
                    ctx.emitter.emit_fp(FpOp::Sqr, false, false);
                } else {
                    ctx.emitter.emit_simple(SimpleOp::Dup);
                    ctx.emitter.emit_simple(SimpleOp::Mul);
                }
                ty
            }),
            StdRoutine::Round => self.compile_unary_math(|ctx, _ty| {
                ctx.emitter.emit_fp(FpOp::Round, false, false);
                ExprType::new(ExprBase::Integer)
            }),
            StdRoutine::Trunc => self.compile_unary_math(|ctx, _ty| {
                ctx.emitter.emit_fp(FpOp::Trunc, false, false);
                ExprType::new(ExprBase::Integer)
            }),
            StdRoutine::Ord => self.compile_unary_math(|_ctx, _ty| ExprType::new(ExprBase::Integer)),
            StdRoutine::Chr => self.compile_unary_math(|_ctx, _ty| ExprType::new(ExprBase::Char)),
            StdRoutine::Succ => self.compile_unary_math(|ctx, ty| {
                ctx.emitter.emit_simple(SimpleOp::Inc);
                ty
            }),
            StdRoutine::Pred => self.compile_unary_math(|ctx, ty| {
                ctx.emitter.emit_simple(SimpleOp::Dec);
                ty
            }),
            StdRoutine::Odd => self.compile_unary_math(|ctx, _ty| {
                ctx.emitter.emit_data_op(crate::emitter::DataOp::Push, 1);
                ctx.emitter.emit_simple(SimpleOp::And);
                ExprType::new(ExprBase::Boolean)
            }),
            StdRoutine::Eof => {
                self.compile_optional_file_arg();
                self.emitter.emit_io(IoOp::Eof);
                ExprType::new(ExprBase::Boolean)
            }
            StdRoutine::Eoln => {
                self.compile_optional_file_arg();
                self.emitter.emit_io(IoOp::Eoln);
                ExprType::new(ExprBase::Boolean)
            }
            // `spec.md` §4.6: "demand Integer or Real; for Integer also set
            // arg1 coercion bit" — every transcendental takes the same
            // shape, differing only in which `FpOp` it selects.
            StdRoutine::Sqrt => self.compile_transcendental(FpOp::Sqrt),
            StdRoutine::Sin => self.compile_transcendental(FpOp::Sin),
            StdRoutine::Cos => self.compile_transcendental(FpOp::Cos),
            StdRoutine::Arctan => self.compile_transcendental(FpOp::Arctan),
            StdRoutine::Ln => self.compile_transcendental(FpOp::Ln),
            StdRoutine::Exp => self.compile_transcendental(FpOp::Exp),
            StdRoutine::Getenv => {
                self.expect(TokenKind::LParen, "'('");
                let arg = self.parse_expression();
                self.expect(TokenKind::RParen, "')'");
                if !arg.is_string_kind() && !arg.is_error() {
                    self.diagnostics
                        .push(crate::diagnostic::Diagnostic::type_error("GETENV requires a string argument", self.span()));
                }
                self.emitter.emit_lib_call(LibCallId::Getenv);
                ExprType::new(ExprBase::CString)
            }
            StdRoutine::Halt => {
                if self.eat(TokenKind::LParen) {
                    let _code = self.parse_expression();
                    self.expect(TokenKind::RParen, "')'");
                } else {
                    self.emitter.emit_data_op(crate::emitter::DataOp::Push, 0);
                }
                self.emitter.emit_lib_call(LibCallId::Halt);
                ExprType::new(ExprBase::Boolean)
            }
            StdRoutine::Val => {
                // `VAL(str, result, errorCode)`: the string is read by
                // value, `result` and `errorCode` are store targets, so
                // they're resolved to addresses the same way `READ`'s
                // arguments are (`compile_read`).
                self.expect(TokenKind::LParen, "'('");
                let _str_arg = self.parse_expression();
                self.expect(TokenKind::Comma, "','");
                let span = self.span();
                let _result_ty = self.emit_variable_address(span);
                if self.eat(TokenKind::Comma) {
                    let span = self.span();
                    let _code_ty = self.emit_variable_address(span);
                }
                self.expect(TokenKind::RParen, "')'");
                self.emitter.emit_lib_call(LibCallId::Val);
                ExprType::new(ExprBase::Boolean)
            }
            // `PACK`/`UNPACK` have no run-time dispatch number in `spec.md`
            // §6.4's closed catalogue and no opcode-level algorithm in §4.6
            // (listed by name only, "not detailed here"); parsing their
            // argument list is the full contract this crate can ground in
            // the spec without inventing a wire format for them (`DESIGN.md`).
            StdRoutine::Pack | StdRoutine::Unpack => {
                self.expect(TokenKind::LParen, "'('");
                let _a = self.parse_expression();
                self.expect(TokenKind::Comma, "','");
                let _i = self.parse_expression();
                self.expect(TokenKind::Comma, "','");
                let _z = self.parse_expression();
                self.expect(TokenKind::RParen, "')'");
                ExprType::new(ExprBase::Boolean)
            }
            StdRoutine::Get => {
                self.compile_file_arg(IoOp::Get);
                ExprType::new(ExprBase::Boolean)
            }
            StdRoutine::Put => {
                self.compile_file_arg(IoOp::Put);
                ExprType::new(ExprBase::Boolean)
            }
            StdRoutine::Reset => {
                self.compile_file_arg(IoOp::Reset);
                ExprType::new(ExprBase::Boolean)
            }
            StdRoutine::Rewrite => {
                self.compile_file_arg(IoOp::Rewrite);
                ExprType::new(ExprBase::Boolean)
            }
            StdRoutine::Page => {
                self.compile_optional_file_arg();
                self.emitter.emit_io(IoOp::Page);
                ExprType::new(ExprBase::Boolean)
            }
        }
    }

    fn compile_transcendental(&mut self, op: FpOp) -> ExprType {
        self.compile_unary_math(move |ctx, ty| {
            let arg_is_int = ty.base == ExprBase::Integer;
            ctx.emitter.emit_fp(op, arg_is_int, false);
            ExprType::new(ExprBase::Real)
        })
    }

    /// `GET`/`PUT`/`RESET`/`REWRITE` all take a single required file
    /// variable argument (unlike `EOF`/`EOLN`/`PAGE`, whose file argument is
    /// optional and defaults to `INPUT`/`OUTPUT`).
    fn compile_file_arg(&mut self, op: IoOp) {
        self.expect(TokenKind::LParen, "'('");
        let span = self.span();
        let ty = self.parse_file_designator();
        if ty.base != ExprBase::File && !ty.is_error() {
            self.diagnostics
                .push(crate::diagnostic::Diagnostic::type_error("expected a file variable", span));
        }
        self.expect(TokenKind::RParen, "')'");
        self.emitter.emit_io(op);
    }

    /// Resolves a bare file-variable designator (no postfix chain: `File`
    /// values are never indexed or dereferenced on their own) to its
    /// `ExprType`, consuming the identifier token.
    fn parse_file_designator(&mut self) -> ExprType {
        let span = self.span();
        let TokenKind::Identifier(name) = self.peek().clone() else {
            return self.error_type("expected a file variable", span);
        };
        self.advance();
        let Some(id) = self.find_symbol(name, crate::symtab::SymbolId(0)) else {
            return self.error_type("undeclared identifier", span);
        };
        match &self.symtab.entry(id).kind {
            SymbolKind::File(_) => ExprType::new(ExprBase::File),
            SymbolKind::Variable(v) if self.is_file_type(v.type_sym) => ExprType::new(ExprBase::File),
            _ => self.error_type("expected a file variable", span),
        }
    }

    fn is_file_type(&self, type_sym: crate::symtab::SymbolId) -> bool {
        matches!(
            &self.symtab.entry(type_sym).kind,
            SymbolKind::Type(crate::symtab::TypeInfo { tag: crate::symtab::PrimType::File, .. })
        )
    }

    fn compile_unary_math(&mut self, emit: impl FnOnce(&mut Self, ExprType) -> ExprType) -> ExprType {
        self.expect(TokenKind::LParen, "'('");
        let ty = self.parse_expression();
        self.expect(TokenKind::RParen, "')'");
        emit(self, ty)
    }

    fn compile_optional_file_arg(&mut self) {
        if self.eat(TokenKind::LParen) {
            let _ = self.parse_expression();
            self.expect(TokenKind::RParen, "')'");
        }
    }

    fn compile_write(&mut self, newline: bool) {
        if self.eat(TokenKind::LParen) {
            loop {
                let _ty = self.parse_expression();
                self.emitter.emit_io(IoOp::Write);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "')'");
        }
        if newline {
            self.emitter.emit_io(IoOp::Writeln);
        }
    }

    fn compile_read(&mut self, newline: bool) {
        if self.eat(TokenKind::LParen) {
            loop {
                // each argument is an lvalue `read` fills in, not a value to
                // load, so this takes the target's address rather than
                // going through `parse_expression`.
                let span = self.span();
                let ty = self.emit_variable_address(span);
                let _ = ty;
                self.emitter.emit_io(IoOp::Read);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "')'");
        }
        if newline {
            self.emitter.emit_io(IoOp::Readln);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_recognizes_standard_names_case_sensitively_lowered() {
        assert_eq!(StdRoutine::lookup("writeln"), Some(StdRoutine::Writeln));
        assert_eq!(StdRoutine::lookup("abs"), Some(StdRoutine::Abs));
        assert_eq!(StdRoutine::lookup("notaproc"), None);
    }

    #[test]
    fn lookup_recognizes_transcendentals_and_file_procedures() {
        assert_eq!(StdRoutine::lookup("sqrt"), Some(StdRoutine::Sqrt));
        assert_eq!(StdRoutine::lookup("arctan"), Some(StdRoutine::Arctan));
        assert_eq!(StdRoutine::lookup("getenv"), Some(StdRoutine::Getenv));
        assert_eq!(StdRoutine::lookup("reset"), Some(StdRoutine::Reset));
        assert_eq!(StdRoutine::lookup("val"), Some(StdRoutine::Val));
    }

    #[test]
    fn procedures_are_rejected_in_expression_position() {
        assert!(StdRoutine::Halt.is_procedure());
        assert!(StdRoutine::Reset.is_procedure());
        assert!(!StdRoutine::Sqrt.is_procedure());
        assert!(!StdRoutine::Getenv.is_procedure());
    }
}
