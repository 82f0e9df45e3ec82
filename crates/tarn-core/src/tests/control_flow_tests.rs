use pretty_assertions::assert_eq;

use super::{compile_error, run_main};
use crate::{CompileError, RuntimeValue, Type};

#[test]
fn test_if_else_selects_a_branch() {
    assert_eq!(
        run_main("fun main(): Int { if (true) { 1 } else { 2 } }"),
        RuntimeValue::I32(1)
    );
    assert_eq!(
        run_main("fun main(): Int { if (false) { 1 } else { 2 } }"),
        RuntimeValue::I32(2)
    );
}

#[test]
fn test_if_branches_must_agree_exactly() {
    assert_eq!(
        run_main("fun main(): Double { if (false) 1.0 else 2.5 }"),
        RuntimeValue::F64(2.5)
    );

    // Branches of different types do not unify; the conditional has no
    // value, so it cannot initialize a binding.
    let untyped = "fun main(): Int { val x = if (true) 1 else 2.0\n 0 }";
    assert!(matches!(
        compile_error(untyped),
        CompileError::UnstorableType(Type::Nothing)
    ));

    let annotated = "fun main(): Int { val x: Int = if (true) 1 else 2.0\n 0 }";
    let err = compile_error(annotated);
    let CompileError::IllegalCast { from, to } = err else {
        panic!("expected an illegal cast, got {err:?}");
    };
    assert_eq!(from, Type::Nothing);
    assert_eq!(to, Type::INT);
}

#[test]
fn test_if_without_else_skips_the_body() {
    // An else-less conditional evaluates its condition and falls through;
    // the body never runs.
    let source = r#"
fun main(): Int {
    var x = 1
    if (true) {
        x = 99
    }
    x
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(1));

    let with_return = r#"
fun main(): Int {
    if (true) {
        return 9
    }
    5
}
"#;
    assert_eq!(run_main(with_return), RuntimeValue::I32(5));
}

#[test]
fn test_conditions_must_be_boolean() {
    let err = compile_error("fun main(): Int { if (1) 2 else 3 }");
    let CompileError::TypeMismatch { expected, found } = err else {
        panic!("expected a type mismatch, got {err:?}");
    };
    assert_eq!(expected, Type::Bool);
    assert_eq!(found, Type::INT);

    assert!(matches!(
        compile_error("fun main(): Int { while (1) { }\n 0 }"),
        CompileError::TypeMismatch { .. }
    ));
}

#[test]
fn test_while_accumulates() {
    let source = r#"
fun main(): Int {
    var i = 0
    var sum = 0
    while (i < 4) {
        i += 1
        sum += i
    }
    sum
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(10));
}

#[test]
fn test_do_while_runs_at_least_once() {
    let source = r#"
fun main(): Int {
    var x = 0
    do {
        x += 1
    } while (false)
    x
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(1));
}

#[test]
fn test_nested_conditionals_classify() {
    let source = r#"
fun classify(n: Int): Int {
    if (n < 0) {
        0 - 1
    } else {
        if (n == 0) {
            0
        } else {
            1
        }
    }
}

fun main(): Int {
    classify(0 - 5) * 100 + classify(0) * 10 + classify(3)
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(-99));
}

#[test]
fn test_loop_with_branching_body() {
    let source = r#"
fun collatz(start: Int): Int {
    var n = start
    var steps = 0
    while (n != 1) {
        if (n % 2 == 0) {
            n = n / 2
        } else {
            n = 3 * n + 1
        }
        steps += 1
    }
    steps
}

fun main(): Int {
    collatz(27)
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(111));
}

#[test]
fn test_recursion() {
    let source = r#"
fun fib(n: Int): Int {
    if (n < 2) {
        n
    } else {
        fib(n - 1) + fib(n - 2)
    }
}

fun main(): Int {
    fib(10)
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(55));
}

#[test]
fn test_early_return_skips_the_rest() {
    assert_eq!(
        run_main("fun main(): Int { return 5\n 9 }"),
        RuntimeValue::I32(5)
    );
}

#[test]
fn test_return_in_both_branches() {
    let source = r#"
fun abs(n: Int): Int {
    if (n < 0) {
        return 0 - n
    } else {
        return n
    }
}

fun main(): Int {
    abs(0 - 14)
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(14));
}

#[test]
fn test_unit_return_forms() {
    let source = r#"
fun noop() {
    return
}

fun main(): Int {
    noop()
    3
}
"#;
    assert_eq!(run_main(source), RuntimeValue::I32(3));

    let err = compile_error("fun bad() { return 5 }");
    let CompileError::IllegalCast { from, to } = err else {
        panic!("expected an illegal cast, got {err:?}");
    };
    assert_eq!(from, Type::INT);
    assert_eq!(to, Type::Unit);
}
