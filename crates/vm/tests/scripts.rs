//! End-to-end scenarios exercising the compiler and VM together.

use ember_vm::{InterpretResult, Vm};

fn run(source: &str) -> InterpretResult {
    Vm::new().interpret(source)
}

#[test]
fn arithmetic_precedence() {
    assert_eq!(run("print 1 + 2 * 3;"), InterpretResult::Ok);
}

#[test]
fn string_concatenation() {
    assert_eq!(run("print \"foo\" + \"bar\";"), InterpretResult::Ok);
}

#[test]
fn reading_a_local_in_its_own_shadowing_initializer_is_a_compile_error() {
    assert_eq!(
        run("var a = 10; { var a = a + 1; print a; } print a;"),
        InterpretResult::CompileError
    );
}

#[test]
fn string_equality_is_identity_based_via_interning() {
    assert_eq!(run("print \"a\" == \"a\";"), InterpretResult::Ok);
}

#[test]
fn global_reassignment() {
    assert_eq!(run("var x = 1; x = x + 41; print x;"), InterpretResult::Ok);
}

#[test]
fn negating_a_bool_is_a_runtime_error() {
    assert_eq!(run("print -true;"), InterpretResult::RuntimeError);
}

#[test]
fn block_scoped_locals_do_not_leak_into_globals() {
    assert_eq!(run("{ var a = 1; } print a;"), InterpretResult::RuntimeError);
}

#[test]
fn var_a_equals_a_in_a_fresh_block_is_a_compile_error() {
    assert_eq!(run("{ var a = a; }"), InterpretResult::CompileError);
}

#[test]
fn redeclaring_a_local_in_the_same_scope_is_a_compile_error() {
    assert_eq!(run("{ var a; var a; }"), InterpretResult::CompileError);
}

#[test]
fn two_hundred_fifty_seven_constants_is_a_compile_error() {
    let mut source = String::new();
    for i in 0..257 {
        source.push_str(&format!("print {i};\n"));
    }
    assert_eq!(run(&source), InterpretResult::CompileError);
}

#[test]
fn two_hundred_fifty_seven_locals_is_a_compile_error() {
    let mut source = String::from("{\n");
    for i in 0..257 {
        source.push_str(&format!("var v{i} = {i};\n"));
    }
    source.push_str("}\n");
    assert_eq!(run(&source), InterpretResult::CompileError);
}
