use pretty_assertions::assert_eq;

use super::{engine, run_main};
use crate::{CompileError, RuntimeValue, Type};

#[test]
fn test_run_main_requires_a_main_function() {
    let jit = engine("fun f(): Int { 1 }");
    let err = jit.run_main().unwrap_err();
    assert!(matches!(err, CompileError::UnknownFunction(name) if name == "main"));
}

#[test]
fn test_find_function_rejects_unknown_names() {
    let jit = engine("fun main() { }");
    let err = jit.find_function("nope").unwrap_err();
    assert!(matches!(err, CompileError::UnknownFunction(name) if name == "nope"));
}

#[test]
fn test_arity_is_checked_at_the_boundary() {
    let jit = engine("fun inc(x: Int): Int { x + 1 }\nfun zero(): Int { 0 }");

    let inc = jit.find_function("inc").unwrap();
    let err = jit.run(&inc).unwrap_err();
    let CompileError::ArityMismatch {
        name,
        expected,
        found,
    } = err
    else {
        panic!("expected an arity mismatch, got {err:?}");
    };
    assert_eq!(name, "inc");
    assert_eq!(expected, 1);
    assert_eq!(found, 0);

    let zero = jit.find_function("zero").unwrap();
    assert!(matches!(
        jit.run_with(&zero, RuntimeValue::I32(1)).unwrap_err(),
        CompileError::ArityMismatch {
            expected: 0,
            found: 1,
            ..
        }
    ));
}

#[test]
fn test_argument_representation_must_match() {
    let jit = engine("fun inc(x: Int): Int { x + 1 }");
    let inc = jit.find_function("inc").unwrap();
    let err = jit.run_with(&inc, RuntimeValue::I64(7)).unwrap_err();
    let CompileError::TypeMismatch { expected, found } = err else {
        panic!("expected a type mismatch, got {err:?}");
    };
    assert_eq!(expected, Type::INT);
    assert_eq!(found, Type::LONG);
}

#[test]
fn test_every_scalar_width_round_trips() {
    let source = r#"
fun byteId(x: Byte): Byte { x }
fun shortId(x: Short): Short { x }
fun longId(x: Long): Long { x }
fun floatId(x: Float): Float { x }
fun doubleId(x: Double): Double { x }
"#;
    let jit = engine(source);

    let f = jit.find_function("byteId").unwrap();
    assert_eq!(jit.run_with(&f, RuntimeValue::I8(-5)).unwrap(), RuntimeValue::I8(-5));

    let f = jit.find_function("shortId").unwrap();
    assert_eq!(
        jit.run_with(&f, RuntimeValue::I16(300)).unwrap(),
        RuntimeValue::I16(300)
    );

    let f = jit.find_function("longId").unwrap();
    assert_eq!(
        jit.run_with(&f, RuntimeValue::I64(1 << 40)).unwrap(),
        RuntimeValue::I64(1 << 40)
    );

    let f = jit.find_function("floatId").unwrap();
    assert_eq!(
        jit.run_with(&f, RuntimeValue::F32(1.5)).unwrap(),
        RuntimeValue::F32(1.5)
    );

    let f = jit.find_function("doubleId").unwrap();
    assert_eq!(
        jit.run_with(&f, RuntimeValue::F64(2.25)).unwrap(),
        RuntimeValue::F64(2.25)
    );
}

#[test]
fn test_unit_functions_return_unit() {
    let jit = engine("fun noop() { }");
    let noop = jit.find_function("noop").unwrap();
    assert_eq!(jit.run(&noop).unwrap(), RuntimeValue::Unit);
}

#[test]
fn test_reference_parameters_cannot_cross_the_boundary() {
    let jit = engine("fun bump(r: &Int) { r += 1 }");
    let bump = jit.find_function("bump").unwrap();
    let err = jit.run_with(&bump, RuntimeValue::I32(1)).unwrap_err();
    assert!(matches!(
        err,
        CompileError::UnsupportedArgument(Type::Reference { .. })
    ));
}

#[test]
fn test_compiled_function_metadata() {
    let jit = engine("fun square(x: Int): Int { x * x }");
    let square = jit.find_function("square").unwrap();
    assert_eq!(square.name(), "square");
    assert_eq!(square.signature().params, vec![Type::INT]);
    assert_eq!(square.signature().return_type, Type::INT);
    assert_eq!(
        jit.run_with(&square, RuntimeValue::I32(12)).unwrap(),
        RuntimeValue::I32(144)
    );
}

#[test]
fn test_functions_can_be_called_repeatedly() {
    let jit = engine("fun square(x: Int): Int { x * x }");
    let square = jit.find_function("square").unwrap();
    assert_eq!(
        jit.run_with(&square, RuntimeValue::I32(3)).unwrap(),
        RuntimeValue::I32(9)
    );
    assert_eq!(
        jit.run_with(&square, RuntimeValue::I32(4)).unwrap(),
        RuntimeValue::I32(16)
    );
}

#[test]
fn test_display_respects_the_language_type() {
    assert_eq!(
        run_main("fun main(): Boolean { true }").display_as(&Type::Bool),
        "true"
    );
    assert_eq!(
        run_main("fun main(): Char { 'A' }").display_as(&Type::CHAR),
        "A"
    );
    // Unsigned values come back in a signed carrier and are reinterpreted
    // for display.
    let wrapped = run_main("fun main(): UInt { 0 - 1 }");
    assert_eq!(wrapped, RuntimeValue::I32(-1));
    assert_eq!(wrapped.display_as(&Type::UINT), "4294967295");

    assert_eq!(RuntimeValue::Unit.display_as(&Type::Unit), "()");
    assert_eq!(RuntimeValue::F64(0.5).to_string(), "0.5");
}

#[test]
fn test_canonical_types_name_the_carrier() {
    assert_eq!(RuntimeValue::I8(0).canonical_type(), Type::BYTE);
    assert_eq!(RuntimeValue::F32(0.0).canonical_type(), Type::FLOAT);
    assert_eq!(RuntimeValue::Unit.canonical_type(), Type::Unit);
}

#[test]
fn test_dispose_releases_the_code() {
    let jit = engine("fun main(): Int { 7 }");
    assert_eq!(jit.run_main().unwrap(), RuntimeValue::I32(7));
    jit.dispose();

    // Dropping without an explicit dispose takes the same path.
    let _ = engine("fun main(): Int { 8 }");
}
