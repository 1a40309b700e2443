//! Closures and upvalue capture.

use swive_runtime::Vm;
use swivec::interpret;

fn run_lines(source: &str) -> Vec<String> {
    let mut vm = Vm::default();
    vm.capture_output();
    interpret(&mut vm, source).unwrap();
    vm.take_output()
}

#[test]
fn closure_literal_with_typed_parameters() {
    let source = r#"
        var add = { (a: Int, b: Int) -> Int in
            return a + b
        }
        print(add(3, 5))
    "#;
    assert_eq!(run_lines(source), vec!["8"]);
}

#[test]
fn closure_with_no_parameters() {
    let source = r#"
        var greet = { print("Hello!") }
        greet()
    "#;
    assert_eq!(run_lines(source), vec!["Hello!"]);
}

#[test]
fn closure_captures_a_counter() {
    let source = r#"
        func make() -> () -> Int {
            var c = 0
            return {
                c = c + 1
                return c
            }
        }
        let f = make()
        print(f())
        print(f())
        print(f())
    "#;
    assert_eq!(run_lines(source), vec!["1", "2", "3"]);
}

#[test]
fn separate_closures_capture_separate_cells() {
    let source = r#"
        func make() -> () -> Int {
            var c = 0
            return {
                c = c + 1
                return c
            }
        }
        let f = make()
        let g = make()
        print(f())
        print(f())
        print(g())
    "#;
    assert_eq!(run_lines(source), vec!["1", "2", "1"]);
}

#[test]
fn sibling_closures_share_one_upvalue() {
    let source = r#"
        func pair() -> [Int] {
            var shared = 0
            let inc = { shared = shared + 10 }
            let read = { return shared }
            inc()
            inc()
            return [read()]
        }
        print(pair())
    "#;
    assert_eq!(run_lines(source), vec!["[20]"]);
}

#[test]
fn upvalue_reads_value_at_close_time_after_return() {
    let source = r#"
        func capture() -> () -> Int {
            var x = 1
            x = 99
            return { return x }
        }
        print(capture()())
    "#;
    assert_eq!(run_lines(source), vec!["99"]);
}

#[test]
fn closures_capture_through_nested_functions() {
    let source = r#"
        func outer() -> () -> Int {
            var base = 5
            func middle() -> () -> Int {
                return {
                    return base + 1
                }
            }
            return middle()
        }
        print(outer()())
    "#;
    assert_eq!(run_lines(source), vec!["6"]);
}

#[test]
fn closure_as_argument() {
    let source = r#"
        func apply(f: (Int) -> Int, to value: Int) -> Int {
            return f(value)
        }
        print(apply({ (n: Int) -> Int in return n * n }, to: 9))
    "#;
    assert_eq!(run_lines(source), vec!["81"]);
}

#[test]
fn block_scoped_capture_closes_on_scope_exit() {
    let source = r#"
        var saved = { return 0 }
        {
            var captured = 41
            saved = { return captured + 1 }
        }
        print(saved())
    "#;
    assert_eq!(run_lines(source), vec!["42"]);
}
