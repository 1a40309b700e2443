//! Compiler limit enforcement.

use swive_runtime::Vm;
use swivec::interpret;

#[test]
fn deeply_nested_expressions_hit_the_recursion_cap() {
    // 300 stacked unary minuses exceed the 256-deep lowering limit
    let mut source = String::from("print(");
    source.push_str(&"-".repeat(300));
    source.push_str("1)");
    let mut vm = Vm::default();
    let err = interpret(&mut vm, &source).unwrap_err();
    assert!(err.to_string().contains("maximum recursion depth"));
}

#[test]
fn moderately_nested_expressions_are_accepted() {
    let mut source = String::from("print(");
    source.push_str(&"-".repeat(200));
    source.push_str("1)");
    let mut vm = Vm::default();
    vm.capture_output();
    interpret(&mut vm, &source).unwrap();
    assert_eq!(vm.take_output(), vec!["1"]);
}

#[test]
fn redeclaring_a_local_in_the_same_scope_is_rejected() {
    let source = r#"
        func f() {
            let x = 1
            let x = 2
        }
    "#;
    let mut vm = Vm::default();
    let err = interpret(&mut vm, source).unwrap_err();
    assert!(err.to_string().contains("already declared"));
}

#[test]
fn shadowing_in_a_nested_scope_is_allowed() {
    let source = r#"
        func f() -> Int {
            let x = 1
            {
                let x = 2
                print(x)
            }
            return x
        }
        print(f())
    "#;
    let mut vm = Vm::default();
    vm.capture_output();
    interpret(&mut vm, source).unwrap();
    assert_eq!(vm.take_output(), vec!["2", "1"]);
}

#[test]
fn self_referencing_initializer_is_rejected() {
    let source = r#"
        func f() {
            let x = x + 1
        }
    "#;
    let mut vm = Vm::default();
    let err = interpret(&mut vm, source).unwrap_err();
    assert!(err.to_string().contains("own initializer"));
}

#[test]
fn break_and_continue_outside_loops_are_rejected() {
    let mut vm = Vm::default();
    let err = interpret(&mut vm, "break").unwrap_err();
    assert!(err.to_string().contains("'break' outside"));

    let mut vm = Vm::default();
    let err = interpret(&mut vm, "continue").unwrap_err();
    assert!(err.to_string().contains("'continue' outside"));
}

#[test]
fn return_at_top_level_is_rejected() {
    let mut vm = Vm::default();
    let err = interpret(&mut vm, "return 1").unwrap_err();
    assert!(err.to_string().contains("'return' outside"));
}

#[test]
fn deep_runtime_recursion_overflows_cleanly() {
    let source = r#"
        func down(n: Int) -> Int {
            return down(n + 1)
        }
        print(down(0))
    "#;
    let mut vm = Vm::default();
    vm.capture_output();
    let err = interpret(&mut vm, source).unwrap_err();
    assert!(err.to_string().contains("stack overflow"));
}
