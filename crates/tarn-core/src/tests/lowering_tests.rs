use pretty_assertions::assert_eq;

use super::{compile, compile_error, run_main};
use crate::{CompileError, RuntimeValue, Type};

#[test]
fn test_integer_arithmetic() {
    assert_eq!(
        run_main("fun main(): Int { 2 + 3 * 4 }"),
        RuntimeValue::I32(14)
    );
    assert_eq!(
        run_main("fun main(): Int { (0 - 7) / 2 }"),
        RuntimeValue::I32(-3)
    );
    assert_eq!(
        run_main("fun main(): Int { (0 - 7) % 3 }"),
        RuntimeValue::I32(-1)
    );
}

#[test]
fn test_literal_suffixes_pick_the_wide_types() {
    assert_eq!(
        run_main("fun main(): Long { 1 + 2L }"),
        RuntimeValue::I64(3)
    );
    assert_eq!(
        run_main("fun main(): ULong { 3UL + 4U }"),
        RuntimeValue::I64(7)
    );
    assert_eq!(
        run_main("fun main(): Long { 9223372036854775807L }"),
        RuntimeValue::I64(i64::MAX)
    );
}

#[test]
fn test_unsigned_wins_a_width_tie() {
    // -8 reinterpreted as UInt, then an unsigned divide.
    assert_eq!(
        run_main("fun main(): UInt { (0 - 8) / 2U }"),
        RuntimeValue::I32(2147483644)
    );
}

#[test]
fn test_mixed_signedness_bindings_unify_unsigned() {
    assert_eq!(
        run_main("fun main(): UInt { val a: Int = 3\n val b: UInt = 4U\n a + b }"),
        RuntimeValue::I32(7)
    );
}

#[test]
fn test_widening_uses_the_target_signedness() {
    assert_eq!(
        run_main("fun main(): Long { (0 - 1) + 1L }"),
        RuntimeValue::I64(0)
    );
    assert_eq!(
        run_main("fun main(): ULong { 4294967295U + 0UL }"),
        RuntimeValue::I64(4294967295)
    );
}

#[test]
fn test_reals_dominate_integers() {
    assert_eq!(
        run_main("fun main(): Double { 1 / 2 + 0.5 }"),
        RuntimeValue::F64(0.5)
    );
    assert_eq!(
        run_main("fun main(): Double { 1.0 / 2 }"),
        RuntimeValue::F64(0.5)
    );
}

#[test]
fn test_float_remainder_truncates_toward_zero() {
    assert_eq!(
        run_main("fun main(): Double { 7.5 % 2.0 }"),
        RuntimeValue::F64(1.5)
    );
    assert_eq!(
        run_main("fun main(): Double { (0.0 - 7.5) % 2.0 }"),
        RuntimeValue::F64(-1.5)
    );
}

#[test]
fn test_shifts_follow_signedness() {
    assert_eq!(run_main("fun main(): Int { 1 << 5 }"), RuntimeValue::I32(32));
    assert_eq!(
        run_main("fun main(): Int { (0 - 16) >> 2 }"),
        RuntimeValue::I32(-4)
    );
    assert_eq!(
        run_main("fun main(): UInt { 2147483648U >> 31 }"),
        RuntimeValue::I32(1)
    );
}

#[test]
fn test_bitwise_operators() {
    assert_eq!(
        run_main("fun main(): Int { (12 & 10) | (1 ^ 3) }"),
        RuntimeValue::I32(10)
    );
    assert_eq!(run_main("fun main(): Int { ~0 }"), RuntimeValue::I32(-1));
}

#[test]
fn test_boolean_operators() {
    assert_eq!(
        run_main("fun main(): Boolean { true && false || true }"),
        RuntimeValue::I8(1)
    );
    assert_eq!(
        run_main("fun main(): Boolean { !false }"),
        RuntimeValue::I8(1)
    );
}

#[test]
fn test_logical_operators_evaluate_both_sides() {
    // No short circuit: the right operand's side effect always happens.
    let source = r#"
fun main(): Int {
    var hits = 0
    val gate = false && {
        hits += 1
        true
    }
    hits
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(1));
}

#[test]
fn test_logical_operators_reject_integers() {
    let err = compile_error("fun main(): Int { 1 && 2 }");
    assert!(matches!(
        err,
        CompileError::UnsupportedOperand { op: "&&", .. }
    ));
}

#[test]
fn test_boolean_and_number_do_not_mix() {
    let err = compile_error("fun main(): Int { true + 1 }");
    let CompileError::TypeMismatch { expected, found } = err else {
        panic!("expected a type mismatch, got {err:?}");
    };
    assert_eq!(expected, Type::Bool);
    assert_eq!(found, Type::INT);
}

#[test]
fn test_comparisons_yield_boolean() {
    assert_eq!(
        run_main("fun main(): Boolean { 3 < 4 }"),
        RuntimeValue::I8(1)
    );
    assert_eq!(
        run_main("fun main(): Boolean { 4 <= 3 }"),
        RuntimeValue::I8(0)
    );
    assert_eq!(
        run_main("fun main(): Boolean { false < true }"),
        RuntimeValue::I8(1)
    );
}

#[test]
fn test_unsigned_comparison_predicate() {
    // -1 reinterpreted as UInt is the largest value, not the smallest.
    assert_eq!(
        run_main("fun main(): Boolean { 0 - 1 < 1U }"),
        RuntimeValue::I8(0)
    );
}

#[test]
fn test_float_comparisons_are_ordered() {
    let nan_eq = r#"
fun main(): Boolean {
    val nan = 0.0 / 0.0
    nan == nan
}
"#;
    assert_eq!(run_main(nan_eq), RuntimeValue::I8(0));
    // Ordered not-equal is also false against NaN.
    let nan_ne = r#"
fun main(): Boolean {
    val nan = 0.0 / 0.0
    nan != nan
}
"#;
    assert_eq!(run_main(nan_ne), RuntimeValue::I8(0));
}

#[test]
fn test_explicit_casts() {
    assert_eq!(
        run_main("fun main(): Byte { 300 as Byte }"),
        RuntimeValue::I8(44)
    );
    assert_eq!(run_main("fun main(): Int { 3.9 as Int }"), RuntimeValue::I32(3));
    assert_eq!(
        run_main("fun main(): Double { 7 as Double }"),
        RuntimeValue::F64(7.0)
    );
    assert_eq!(
        run_main("fun main(): Float { 1.5 as Float }"),
        RuntimeValue::F32(1.5)
    );
    assert_eq!(
        run_main("fun main(): Int { 'A' as Int }"),
        RuntimeValue::I32(65)
    );
}

#[test]
fn test_int_double_round_trip_at_the_boundary() {
    // f64 has 52 mantissa bits, so Int max survives the trip exactly.
    assert_eq!(
        run_main("fun main(): Double { 2147483647 as Double }"),
        RuntimeValue::F64(2147483647.0)
    );
    assert_eq!(
        run_main("fun main(): Int { (2147483647 as Double) as Int }"),
        RuntimeValue::I32(i32::MAX)
    );
}

#[test]
fn test_implicit_narrowing_is_illegal() {
    let err = compile_error("fun main(): Byte { val x: Byte = 300\n x }");
    let CompileError::IllegalCast { from, to } = err else {
        panic!("expected an illegal cast, got {err:?}");
    };
    assert_eq!(from, Type::INT);
    assert_eq!(to, Type::BYTE);

    let err = compile_error("fun main(): Float { val x: Float = 1.5\n x }");
    let CompileError::IllegalCast { from, to } = err else {
        panic!("expected an illegal cast, got {err:?}");
    };
    assert_eq!(from, Type::DOUBLE);
    assert_eq!(to, Type::FLOAT);
}

#[test]
fn test_boolean_casts_are_illegal() {
    assert!(matches!(
        compile_error("fun main(): Int { true as Int }"),
        CompileError::IllegalCast { .. }
    ));
    assert!(matches!(
        compile_error("fun main(): Boolean { 1 as Boolean }"),
        CompileError::IllegalCast { .. }
    ));
}

#[test]
fn test_val_bindings_are_const() {
    let err = compile_error("fun main(): Int { val x = 1\n x = 2\n x }");
    assert!(matches!(err, CompileError::AssignToConst(Type::Int(_))));
}

#[test]
fn test_parameters_are_const() {
    let err = compile_error("fun id(x: Int): Int { x = 4\n x }");
    assert!(matches!(err, CompileError::AssignToConst(_)));
}

#[test]
fn test_assignment_needs_a_place() {
    let err = compile_error("fun main(): Int { 1 = 2\n 0 }");
    assert!(matches!(
        err,
        CompileError::InvalidAssignmentTarget(Type::Int(_))
    ));
}

#[test]
fn test_assignment_chains_right_associatively() {
    let source = r#"
fun main(): Int {
    var a = 1
    var b = 2
    a = b = 7
    a + b
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(14));
}

#[test]
fn test_compound_assignment_operates_in_place() {
    let source = r#"
fun main(): Int {
    var x = 10
    x -= 3
    x *= 2
    x
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(14));
}

#[test]
fn test_compound_assignment_yields_the_place() {
    let source = r#"
fun main(): Int {
    var x = 5
    (x += 1) + x
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(12));
}

#[test]
fn test_compound_widening_is_a_mismatch() {
    let err = compile_error("fun main(): Int { var x = 1\n x += 2L\n x }");
    let CompileError::TypeMismatch { expected, found } = err else {
        panic!("expected a type mismatch, got {err:?}");
    };
    assert_eq!(expected, Type::INT);
    assert_eq!(found, Type::LONG);
}

#[test]
fn test_scopes_shadow_and_restore() {
    let source = r#"
fun main(): Int {
    val x = 1
    val inner = {
        val x = 2
        x * 10
    }
    inner + x
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(21));
}

#[test]
fn test_struct_literal_and_member_reads() {
    let source = r#"
struct Point { x: Int, y: Int }

fun main(): Int {
    val p = Point { x: 3, y: 4 }
    p.x * 10 + p.y
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(34));
}

#[test]
fn test_struct_field_assignment() {
    let source = r#"
struct Point { x: Int, y: Int }

fun main(): Int {
    var p = Point { x: 1, y: 2 }
    p.x = 10
    p.x + p.y
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(12));
}

#[test]
fn test_struct_literal_last_duplicate_wins() {
    let source = r#"
struct Point { x: Int, y: Int }

fun main(): Int {
    val p = Point { x: 1, x: 2, y: 3 }
    p.x * 10 + p.y
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(23));
}

#[test]
fn test_val_struct_members_are_const() {
    let source = r#"
struct Point { x: Int, y: Int }

fun main(): Int {
    val p = Point { x: 1, y: 2 }
    p.x = 10
    0
}
"#;
    assert!(matches!(
        compile_error(source),
        CompileError::AssignToConst(_)
    ));
}

#[test]
fn test_missing_field_is_rejected() {
    let source = "struct Point { x: Int, y: Int }\nfun main(): Int { Point { x: 1 }.x }";
    let err = compile_error(source);
    let CompileError::MissingField { name, field } = err else {
        panic!("expected a missing field, got {err:?}");
    };
    assert_eq!(name, "Point");
    assert_eq!(field, "y");
}

#[test]
fn test_unknown_member_is_rejected() {
    let source = r#"
struct Point { x: Int, y: Int }

fun main(): Int {
    val p = Point { x: 1, y: 2 }
    p.z
}
"#;
    let err = compile_error(source);
    let CompileError::UnknownMember { name, .. } = err else {
        panic!("expected an unknown member, got {err:?}");
    };
    assert_eq!(name, "z");
}

#[test]
fn test_member_access_needs_a_struct_base() {
    let err = compile_error("fun main(): Int { 5.x }");
    let CompileError::UnknownMember { base, name } = err else {
        panic!("expected an unknown member, got {err:?}");
    };
    assert_eq!(base, Type::INT);
    assert_eq!(name, "x");
}

#[test]
fn test_member_needs_an_identifier() {
    let source = r#"
struct Point { x: Int, y: Int }

fun main(): Int {
    val p = Point { x: 1, y: 2 }
    p.5
}
"#;
    assert!(matches!(
        compile_error(source),
        CompileError::ExpectedMemberName
    ));
}

#[test]
fn test_rvalue_members_are_readable_but_not_assignable() {
    let read = "struct Point { x: Int, y: Int }\nfun main(): Int { Point { x: 1, y: 2 }.x }";
    assert_eq!(run_main(read), RuntimeValue::I32(1));

    let write =
        "struct Point { x: Int, y: Int }\nfun main(): Int { Point { x: 1, y: 2 }.x = 5\n 0 }";
    assert!(matches!(
        compile_error(write),
        CompileError::InvalidAssignmentTarget(Type::Reference { .. })
    ));
}

#[test]
fn test_nested_struct_members() {
    let source = r#"
struct Inner { v: Int }
struct Outer { inner: Inner, tag: Int }

fun main(): Int {
    val o = Outer { inner: Inner { v: 42 }, tag: 7 }
    o.inner.v
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(42));
}

#[test]
fn test_struct_assignment_copies_the_value() {
    let source = r#"
struct Point { x: Int, y: Int }

fun main(): Int {
    var a = Point { x: 1, y: 2 }
    val b = Point { x: 10, y: 20 }
    a = b
    a.x + a.y
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(30));
}

#[test]
fn test_var_without_initializer_is_zeroed() {
    assert_eq!(
        run_main("fun main(): Int { var x: Int\n x }"),
        RuntimeValue::I32(0)
    );
    let zeroed_struct = r#"
struct Point { x: Int, y: Int }

fun main(): Int {
    var p: Point
    p.x + p.y
}
"#;
    assert_eq!(run_main(zeroed_struct), RuntimeValue::I32(0));
}

#[test]
fn test_pointers_round_trip() {
    let source = r#"
fun main(): Int {
    var x = 41
    val p = &x
    *p = 42
    x
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(42));
}

#[test]
fn test_pointer_to_val_has_const_pointee() {
    let source = r#"
fun main(): Int {
    val x = 41
    val p = &x
    *p = 42
    0
}
"#;
    assert!(matches!(
        compile_error(source),
        CompileError::AssignToConst(_)
    ));
}

#[test]
fn test_address_of_needs_a_place() {
    let err = compile_error("fun main(): Int { val p = &3\n 0 }");
    assert!(matches!(
        err,
        CompileError::UnsupportedOperand { op: "&", .. }
    ));
}

#[test]
fn test_dereference_needs_a_pointer() {
    let err = compile_error("fun main(): Int { *1 }");
    assert!(matches!(
        err,
        CompileError::UnsupportedOperand { op: "*", .. }
    ));
}

#[test]
fn test_member_access_through_a_pointer() {
    let source = r#"
struct Point { x: Int, y: Int }

fun main(): Int {
    var p = Point { x: 1, y: 2 }
    val ptr = &p
    ptr.y = 20
    p.y
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(20));
}

#[test]
fn test_pointer_member_respects_pointee_constness() {
    let source = r#"
struct Point { x: Int, y: Int }

fun main(): Int {
    val p = Point { x: 1, y: 2 }
    val ptr = &p
    ptr.y = 20
    0
}
"#;
    assert!(matches!(
        compile_error(source),
        CompileError::AssignToConst(_)
    ));
}

#[test]
fn test_pre_increment_updates_and_yields_the_place() {
    let source = r#"
fun main(): Int {
    var x = 5
    val y = ++x
    y * 10 + x
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(66));
}

#[test]
fn test_pre_increment_needs_an_integer_place() {
    assert!(matches!(
        compile_error("fun main(): Int { ++1 }"),
        CompileError::InvalidAssignmentTarget(_)
    ));
    let err = compile_error("fun main(): Int { var b = true\n ++b\n 0 }");
    assert!(matches!(
        err,
        CompileError::UnsupportedOperand {
            op: "++",
            ty: Type::Bool
        }
    ));
}

#[test]
fn test_function_calls_compose() {
    let source = r#"
fun add(a: Int, b: Int): Int {
    a + b
}

fun main(): Int {
    add(add(1, 2), 4)
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(7));
}

#[test]
fn test_forward_references_resolve() {
    let source = r#"
fun main(): Int {
    double(21)
}

fun double(x: Int): Int {
    x * 2
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(42));
}

#[test]
fn test_call_arguments_cast_implicitly() {
    let source = r#"
fun widen(x: Long): Long {
    x
}

fun main(): Long {
    widen(7)
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I64(7));
}

#[test]
fn test_arity_mismatch() {
    let err = compile_error("fun id(x: Int): Int { x }\nfun main(): Int { id(1, 2) }");
    let CompileError::ArityMismatch {
        name,
        expected,
        found,
    } = err
    else {
        panic!("expected an arity mismatch, got {err:?}");
    };
    assert_eq!(name, "id");
    assert_eq!(expected, 1);
    assert_eq!(found, 2);
}

#[test]
fn test_unknown_names_are_typed_errors() {
    assert!(matches!(
        compile_error("fun main(): Int { missing() }"),
        CompileError::UnknownFunction(name) if name == "missing"
    ));
    assert!(matches!(
        compile_error("fun main(): Int { y }"),
        CompileError::UnresolvedSymbol(name) if name == "y"
    ));
    assert!(matches!(
        compile_error("fun main(): Int { val x: Junk = 1\n 0 }"),
        CompileError::UnknownType(name) if name == "Junk"
    ));
}

#[test]
fn test_reference_parameters_alias_the_argument() {
    let source = r#"
fun bump(r: &Int) {
    r += 1
}

fun main(): Int {
    var x = 41
    bump(x)
    x
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(42));
}

#[test]
fn test_reference_parameter_constness_must_match() {
    let ok = r#"
fun peek(r: &const Int): Int {
    r
}

fun main(): Int {
    val x = 7
    peek(x)
}
"#;
    assert_eq!(run_main(ok), RuntimeValue::I32(7));

    // No implicit constness adjustment: a non-const place does not satisfy
    // a const reference parameter.
    let mismatch = r#"
fun peek(r: &const Int): Int {
    r
}

fun main(): Int {
    var x = 7
    peek(x)
}
"#;
    let err = compile_error(mismatch);
    let CompileError::IllegalCast { from, to } = err else {
        panic!("expected an illegal cast, got {err:?}");
    };
    assert_eq!(from, Type::INT.reference(false).unwrap());
    assert_eq!(to, Type::INT.reference(true).unwrap());
}

#[test]
fn test_reference_to_struct_parameter() {
    let source = r#"
struct Point { x: Int, y: Int }

fun flip(p: &Point) {
    val t = p.x
    p.x = p.y
    p.y = t
}

fun main(): Int {
    var pt = Point { x: 3, y: 9 }
    flip(pt)
    pt.x * 10 + pt.y
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(93));
}

#[test]
fn test_reference_return_is_assignable() {
    let source = r#"
fun pick(a: &Int, b: &Int, takeFirst: Boolean): &Int {
    if (takeFirst) {
        return a
    } else {
        return b
    }
}

fun main(): Int {
    var x = 1
    var y = 2
    pick(x, y, true) += 10
    x * 10 + y
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(112));
}

#[test]
fn test_struct_parameters_and_returns_are_rejected() {
    let by_value = "struct Point { x: Int, y: Int }\nfun f(p: Point): Int { 0 }";
    let err = compile_error(by_value);
    let CompileError::InvalidSignature { func, ty } = err else {
        panic!("expected an invalid signature, got {err:?}");
    };
    assert_eq!(func, "f");
    assert!(matches!(ty, Type::Struct(_)));

    let returned = "struct Point { x: Int, y: Int }\nfun g(): Point { g() }";
    assert!(matches!(
        compile_error(returned),
        CompileError::InvalidSignature { .. }
    ));
}

#[test]
fn test_sizeof() {
    assert_eq!(
        run_main("fun main(): ULong { sizeof(Int) }"),
        RuntimeValue::I64(4)
    );
    assert_eq!(
        run_main("fun main(): ULong { sizeof(Double) }"),
        RuntimeValue::I64(8)
    );
    let padded = r#"
struct Mixed { flag: Boolean, value: Double }

fun main(): ULong {
    sizeof(Mixed)
}
"#;
    assert_eq!(run_main(padded), RuntimeValue::I64(16));
}

#[test]
fn test_sizeof_rejects_sizeless_types() {
    assert!(matches!(
        compile_error("fun main(): ULong { sizeof(Unit) }"),
        CompileError::UnsizedType(Type::Unit)
    ));
}

#[test]
fn test_char_literals_promote_like_short_integers() {
    assert_eq!(run_main("fun main(): Char { 'A' }"), RuntimeValue::I16(65));
    assert_eq!(
        run_main("fun main(): Int { 'A' + 1 }"),
        RuntimeValue::I32(66)
    );
}

#[test]
fn test_compiled_module_exposes_signatures() {
    let compiled = compile("fun add(a: Int, b: Int): Int { a + b }\nfun main() { }")
        .expect("source should compile");
    let signature = compiled.signature("add").expect("add should be declared");
    assert_eq!(signature.params, vec![Type::INT, Type::INT]);
    assert_eq!(signature.return_type, Type::INT);
    assert_eq!(
        compiled.signature("main").map(|s| s.return_type.clone()),
        Some(Type::Unit)
    );
    assert!(compiled.signature("absent").is_none());
}

#[test]
fn test_display_ir_lists_every_function() {
    let compiled =
        compile("fun one(): Int { 1 }\nfun main(): Int { one() }").expect("source should compile");
    let functions: Vec<_> = compiled.display_ir().collect();
    assert_eq!(functions.len(), 2);
    assert_eq!(functions[0].0, "one");
    assert_eq!(functions[1].0, "main");
    assert!(functions.iter().all(|(_, text)| text.contains("block0")));
}
