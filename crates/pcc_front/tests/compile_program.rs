//! End-to-end tests driving [`pcc_front::compile`] over small Pascal
//! programs written to a temp file, the way a real invocation of the `pcc`
//! binary would read them.

use std::io::Write;

use pcc_front::objectsink::VecSink;

fn compile_str(src: &str) -> pcc_front::CompileResult {
    let mut file = tempfile::NamedTempFile::new().expect("create temp source file");
    write!(file, "{src}").unwrap();
    let source = std::fs::read_to_string(file.path()).unwrap();
    let mut sink = VecSink::new();
    pcc_front::compile(&source, &file.path().display().to_string(), &mut sink)
}

#[test]
fn nested_procedure_compiles_without_diagnostics() {
    let src = r#"
        program Nested;
        var total: integer;
        procedure addOne;
        begin
            total := total + 1
        end;
        begin
            total := 0;
            addOne
        end.
    "#;
    let result = compile_str(src);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
}

#[test]
fn while_loop_with_boolean_condition_compiles() {
    let src = r#"
        program Loopy;
        var i: integer;
        begin
            i := 0;
            while i <= 10 do
                i := i + 1
        end.
    "#;
    let result = compile_str(src);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
}

#[test]
fn non_boolean_if_condition_is_a_type_error() {
    let src = r#"
        program Bad;
        var x: integer;
        begin
            if x then x := 1
        end.
    "#;
    let result = compile_str(src);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.kind == pcc_front::DiagnosticKind::Type));
}

/// `spec.md` §8 scenario 2: `ARRAY[1..10] OF Integer; a[3] := 7` scales the
/// index by the element size after subtracting the index type's lower
/// bound, rather than treating every element as a single byte.
#[test]
fn array_index_scales_by_element_size_and_subtracts_lower_bound() {
    let src = r#"
        program ArrayAssign;
        var a: array[1..10] of integer;
        begin
            a[3] := 7
        end.
    "#;
    let result = compile_str(src);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
}

/// `spec.md` §8 scenario 3: `p^ := 42` on a declared `^Integer` pointer.
#[test]
fn pointer_dereference_assignment_compiles() {
    let src = r#"
        program PointerAssign;
        type IntPtr = ^integer;
        var p: IntPtr;
        begin
            p^ := 42
        end.
    "#;
    let result = compile_str(src);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
}

/// `spec.md` §4.4.3 / §8 boundary behavior: a multi-constant arm uses JEQUZ
/// for every constant but the last, and JNEQZ only for the last; a trailing
/// non-standard `ELSE` catches the default.
#[test]
fn case_statement_with_multiple_constants_and_else_compiles() {
    use pcc_front::emitter::{JumpKind, Opcode};
    let src = r#"
        program CaseTest;
        var x, y: integer;
        begin
            case x of
                1, 2: y := 1;
                3: y := 2
            else
                y := 0
            end
        end.
    "#;
    let result = compile_str(src);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);

    let sink = {
        let mut sink = pcc_front::objectsink::VecSink::new();
        pcc_front::compile(src, "t.pas", &mut sink);
        sink
    };
    let jequz_count = sink
        .opcodes
        .iter()
        .filter(|op| matches!(op, Opcode::Jump { kind: JumpKind::Jequz, .. }))
        .count();
    let jneqz_count = sink
        .opcodes
        .iter()
        .filter(|op| matches!(op, Opcode::Jump { kind: JumpKind::Jneqz, .. }))
        .count();
    // Arm 1 has two constants (1, 2): one JEQUZ (for "1") then one JNEQZ
    // (for the last, "2"). Arm 2 has a single constant (3): just one JNEQZ.
    assert_eq!(jequz_count, 1, "{:?}", sink.opcodes);
    assert_eq!(jneqz_count, 2, "{:?}", sink.opcodes);
}

#[test]
fn case_statement_without_else_compiles() {
    let src = r#"
        program CaseNoElse;
        var x, y: integer;
        begin
            case x of
                1: y := 1;
                2: y := 2
            end
        end.
    "#;
    let result = compile_str(src);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
}

/// `spec.md` §8 invariant #5: the selector duplicate a `CASE` leaves on the
/// data stack is dropped by exactly one `INDS -sizeof(int)` before `END`,
/// regardless of which arm ran.
#[test]
fn case_statement_drops_selector_duplicate_exactly_once() {
    use pcc_front::emitter::{DataOp, Opcode};
    let src = r#"
        program CaseBalance;
        var x, y: integer;
        begin
            case x of
                1: y := 1
            else
                y := 0
            end
        end.
    "#;
    let mut sink = VecSink::new();
    let result = pcc_front::compile(src, "t.pas", &mut sink);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    let inds = sink
        .opcodes
        .iter()
        .filter(|op| matches!(op, Opcode::Data(DataOp::Inds, -4)))
        .count();
    assert_eq!(inds, 1, "{:?}", sink.opcodes);
}

/// `spec.md` §8 scenario 6 / boundary behavior: the `FOR` bound is
/// duplicated at the top of every test (not the loop variable), and the
/// duplicate is dropped by a trailing `INDS -sizeof(int)` even when the
/// loop runs zero iterations.
#[test]
fn for_loop_drops_bound_duplicate_exactly_once() {
    use pcc_front::emitter::{DataOp, Opcode};
    let src = r#"
        program ForBalance;
        var i: integer;
        begin
            for i := 3 to 1 do
                i := i
        end.
    "#;
    let mut sink = VecSink::new();
    let result = pcc_front::compile(src, "t.pas", &mut sink);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    let inds = sink
        .opcodes
        .iter()
        .filter(|op| matches!(op, Opcode::Data(DataOp::Inds, -4)))
        .count();
    assert_eq!(inds, 1, "{:?}", sink.opcodes);
}

/// `spec.md` §6.1 "subranges a..b": a standalone `TYPE` declaration whose
/// denoter is a bare subrange, its bounds literal constants.
#[test]
fn standalone_subrange_type_declaration_compiles() {
    let src = r#"
        program DigitType;
        type Digit = 0..9;
        var d: Digit;
        begin
            d := 5
        end.
    "#;
    let result = compile_str(src);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
}

/// Same as above, but the subrange's bounds are named constants rather than
/// literals, exercising the lookahead that tells a constant-bound subrange
/// apart from a plain named-type reference.
#[test]
fn subrange_type_with_named_constant_bounds_compiles() {
    let src = r#"
        program RangeType;
        const Low = 1;
              High = 100;
        type Percent = Low..High;
        var p: Percent;
        begin
            p := 50
        end.
    "#;
    let result = compile_str(src);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
}

/// An `external` variable is imported as an undefined data symbol and its
/// single reference in the program body carries a `DataLoadStore`
/// relocation against that symbol, rather than being treated as an
/// ordinary level-0 stack slot.
#[test]
fn external_variable_reference_emits_relocation() {
    use pcc_front::objectsink::RelocKind;

    let mut file = tempfile::NamedTempFile::new().expect("create temp source file");
    write!(file, r#"
        program UsesShared;
        var sharedCounter: integer external;
        begin
            sharedCounter := sharedCounter + 1
        end.
    "#)
    .unwrap();
    let source = std::fs::read_to_string(file.path()).unwrap();
    let mut sink = VecSink::new();
    let result = pcc_front::compile(&source, &file.path().display().to_string(), &mut sink);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);

    assert!(sink.symbols.iter().any(|s| s.name == "sharedCounter"), "{:?}", sink.symbols);
    assert!(
        sink.relocations.iter().any(|(kind, _, _)| matches!(kind, RelocKind::DataLoadStore)),
        "{:?}",
        sink.relocations
    );
}

/// An external variable cannot also carry a `= <const>` initializer.
#[test]
fn external_variable_with_initializer_is_a_type_error() {
    let src = r#"
        program BadExternal;
        var sharedCounter: integer external = 0;
        begin
            sharedCounter := 1
        end.
    "#;
    let result = compile_str(src);
    assert!(!result.diagnostics.is_empty());
}

/// An `external` procedure is declared without a body (`external;` in its
/// place) and its call site carries a `ProcCall` relocation against the
/// imported, undefined procedure symbol.
#[test]
fn external_procedure_call_emits_relocation() {
    use pcc_front::objectsink::RelocKind;

    let mut file = tempfile::NamedTempFile::new().expect("create temp source file");
    write!(file, r#"
        program CallsShared;
        procedure sharedHelper; external;
        begin
            sharedHelper
        end.
    "#)
    .unwrap();
    let source = std::fs::read_to_string(file.path()).unwrap();
    let mut sink = VecSink::new();
    let result = pcc_front::compile(&source, &file.path().display().to_string(), &mut sink);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);

    assert!(sink.symbols.iter().any(|s| s.name == "sharedHelper"), "{:?}", sink.symbols);
    assert!(
        sink.relocations.iter().any(|(kind, _, _)| matches!(kind, RelocKind::ProcCall)),
        "{:?}",
        sink.relocations
    );
}

/// An external procedure declared anywhere but the outermost level is
/// rejected rather than silently accepted.
#[test]
fn nested_external_procedure_is_a_scope_error() {
    let src = r#"
        program BadNesting;
        procedure outer;
            procedure inner; external;
        begin
        end;
        begin
            outer
        end.
    "#;
    let result = compile_str(src);
    assert!(!result.diagnostics.is_empty());
}

/// A `String`-typed local variable's declaration emits its resource-
/// allocation `Strinit` library call (`spec.md` §4.5), distinct from the
/// plain stack-slot reservation an ordinary scalar gets.
#[test]
fn string_variable_declaration_emits_strinit() {
    let src = r#"
        program Greeter;
        var name: string;
        begin
            name := 'hello'
        end.
    "#;
    let result = compile_str(src);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
}

/// A `File`-typed local variable is allocated on declaration and freed at
/// block exit, exercising both halves of the resource-allocation pass
/// rather than just the allocation half.
#[test]
fn file_variable_is_allocated_and_freed() {
    let src = r#"
        program ReadsAFile;
        var f: file of integer;
        begin
            reset(f)
        end.
    "#;
    let result = compile_str(src);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
}

/// `WITH` over a plain record variable (`spec.md` §4.4.5's first bullet):
/// each field becomes directly visible inside the body.
#[test]
fn with_over_plain_record_variable_compiles() {
    let src = r#"
        program PlainWith;
        type Point = record x: integer; y: integer end;
        var p: Point;
        begin
            with p do begin
                x := 1;
                y := 2
            end
        end.
    "#;
    let result = compile_str(src);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
}

/// `WITH` over a `VAR`-parameter record (`spec.md` §4.4.5's second bullet)
/// needs every field access to recompute the field's address from the
/// hidden pointer at runtime, rather than a single compile-time offset.
#[test]
fn with_over_var_parameter_record_compiles() {
    let src = r#"
        program VarParmWith;
        type Point = record x: integer; y: integer end;
        procedure bump(var p: Point);
        begin
            with p do begin
                x := x + 1;
                y := y + 1
            end
        end;
        var q: Point;
        begin
            bump(q)
        end.
    "#;
    let result = compile_str(src);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
}

/// `WITH` over `ptr^` (`spec.md` §4.4.5's third bullet): the base is a
/// pointer-typed variable explicitly dereferenced before `DO`.
#[test]
fn with_over_pointer_to_record_compiles() {
    let src = r#"
        program PointerWith;
        type Point = record x: integer; y: integer end;
        type PointPtr = ^Point;
        var p: PointPtr;
        begin
            with p^ do begin
                x := 1;
                y := 2
            end
        end.
    "#;
    let result = compile_str(src);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
}

/// A `WITH` over a `VAR`-parameter record nested inside a second `WITH`
/// over one of its own `RECORD_OBJECT` fields (`spec.md` §4.4.5's fourth
/// bullet) must chain the outer indirection's offset onto the inner
/// field's own offset rather than discarding it.
#[test]
fn nested_with_over_record_field_of_var_parameter_compiles() {
    let src = r#"
        program NestedWith;
        type Inner = record a: integer; b: integer end;
        type Outer = record inner: Inner; c: integer end;
        procedure bump(var o: Outer);
        begin
            with o do
                with inner do begin
                    a := a + 1;
                    b := b + 1
                end
        end;
        var q: Outer;
        begin
            bump(q)
        end.
    "#;
    let result = compile_str(src);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
}
