//! End-to-end execution: arithmetic, control flow, optionals.

use swive_runtime::{Value, Vm};
use swivec::interpret;

fn run_lines(source: &str) -> Vec<String> {
    let mut vm = Vm::default();
    vm.capture_output();
    interpret(&mut vm, source).unwrap();
    vm.take_output()
}

fn run_result(source: &str) -> Value {
    let mut vm = Vm::default();
    vm.capture_output();
    interpret(&mut vm, source).unwrap()
}

fn run_error(source: &str) -> String {
    let mut vm = Vm::default();
    vm.capture_output();
    match interpret(&mut vm, source) {
        Ok(v) => panic!("expected an error, got {v:?}"),
        Err(e) => e.to_string(),
    }
}

#[test]
fn arithmetic_precedence() {
    assert_eq!(run_lines("print(1 + 2 * 3)"), vec!["7"]);
}

#[test]
fn mixed_numeric_arithmetic() {
    assert_eq!(run_lines("print(7 / 2)"), vec!["3"]);
    assert_eq!(run_lines("print(7.0 / 2)"), vec!["3.500000"]);
    assert_eq!(run_lines("print(10 % 3)"), vec!["1"]);
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let err = run_error("print(1 / 0)");
    assert!(err.contains("division by zero"));
}

#[test]
fn string_concatenation_and_comparison() {
    assert_eq!(
        run_lines(r#"print("Hello, " + "world")"#),
        vec!["Hello, world"]
    );
    assert_eq!(run_lines(r#"print("abc" < "abd")"#), vec!["true"]);
    assert_eq!(run_lines(r#"print("a" == "a")"#), vec!["true"]);
}

#[test]
fn string_interpolation() {
    assert_eq!(
        run_lines(r#"let x = 6 * 7
print("answer = \(x)!")"#),
        vec!["answer = 42!"]
    );
}

#[test]
fn globals_and_locals() {
    let source = r#"
        var total = 0
        {
            let inner = 5
            total = total + inner
        }
        print(total)
    "#;
    assert_eq!(run_lines(source), vec!["5"]);
}

#[test]
fn if_else_branches() {
    let source = r#"
        let x = 3
        if x > 2 {
            print("big")
        } else {
            print("small")
        }
    "#;
    assert_eq!(run_lines(source), vec!["big"]);
}

#[test]
fn while_loop_with_break_and_continue() {
    let source = r#"
        var i = 0
        var sum = 0
        while true {
            i = i + 1
            if i > 10 {
                break
            }
            if i % 2 == 0 {
                continue
            }
            sum = sum + i
        }
        print(sum)
    "#;
    // 1 + 3 + 5 + 7 + 9
    assert_eq!(run_lines(source), vec!["25"]);
}

#[test]
fn repeat_while_runs_at_least_once() {
    let source = r#"
        var n = 0
        repeat {
            n = n + 1
        } while false
        print(n)
    "#;
    assert_eq!(run_lines(source), vec!["1"]);
}

#[test]
fn for_in_over_exclusive_and_inclusive_ranges() {
    assert_eq!(
        run_lines("for i in 0..3 { print(i) }"),
        vec!["0", "1", "2"]
    );
    assert_eq!(
        run_lines("for i in 1...3 { print(i) }"),
        vec!["1", "2", "3"]
    );
}

#[test]
fn for_in_over_list_iterates_in_order() {
    let source = r#"
        let xs = [10, 20, 30]
        for x in xs {
            print(x)
        }
    "#;
    assert_eq!(run_lines(source), vec!["10", "20", "30"]);
}

#[test]
fn for_in_over_string_iterates_characters() {
    assert_eq!(
        run_lines(r#"for c in "abc" { print(c) }"#),
        vec!["a", "b", "c"]
    );
}

#[test]
fn nested_loops_with_break() {
    let source = r#"
        var hits = 0
        for i in 0..3 {
            for j in 0..3 {
                if j > i {
                    break
                }
                hits = hits + 1
            }
        }
        print(hits)
    "#;
    assert_eq!(run_lines(source), vec!["6"]);
}

#[test]
fn functions_return_values() {
    let source = r#"
        func add(a: Int, b: Int) -> Int {
            return a + b
        }
        print(add(3, 4))
    "#;
    assert_eq!(run_lines(source), vec!["7"]);
}

#[test]
fn recursion() {
    let source = r#"
        func fib(n: Int) -> Int {
            if n < 2 {
                return n
            }
            return fib(n - 1) + fib(n - 2)
        }
        print(fib(10))
    "#;
    assert_eq!(run_lines(source), vec!["55"]);
}

#[test]
fn default_parameter_values() {
    let source = r#"
        func greet(name: String, punctuation: String = "!") -> String {
            return name + punctuation
        }
        print(greet("hi"))
        print(greet("hi", "?"))
    "#;
    assert_eq!(run_lines(source), vec!["hi!", "hi?"]);
}

#[test]
fn named_arguments_reorder() {
    let source = r#"
        func span(from start: Int, to end: Int) -> Int {
            return end - start
        }
        print(span(to: 10, from: 3))
    "#;
    assert_eq!(run_lines(source), vec!["7"]);
}

#[test]
fn missing_argument_is_an_error() {
    let err = run_error(
        r#"
        func f(a: Int, b: Int) -> Int { return a + b }
        f(1)
    "#,
    );
    assert!(err.contains("missing argument 'b'"));
}

#[test]
fn optionals_nil_coalescing() {
    let source = r#"
        var maybe: Int? = nil
        print(maybe ?? 9)
        maybe = 4
        print(maybe ?? 9)
    "#;
    assert_eq!(run_lines(source), vec!["9", "4"]);
}

#[test]
fn force_unwrap_of_nil_fails() {
    let err = run_error("var v: Int? = nil\nprint(v!)");
    assert!(err.contains("unwrapping an Optional"));
}

#[test]
fn if_let_binds_only_on_non_nil() {
    let source = r#"
        var v: Int? = 3
        if let x = v {
            print(x)
        } else {
            print("none")
        }
        v = nil
        if let x = v {
            print(x)
        } else {
            print("none")
        }
    "#;
    assert_eq!(run_lines(source), vec!["3", "none"]);
}

#[test]
fn guard_let_exits_on_nil() {
    let source = r#"
        func orZero(v: Int?) -> Int {
            guard let x = v else {
                return 0
            }
            return x + 1
        }
        print(orZero(5))
        print(orZero(nil))
    "#;
    assert_eq!(run_lines(source), vec!["6", "0"]);
}

#[test]
fn guard_let_requires_exiting_else() {
    let mut vm = Vm::default();
    let err = interpret(
        &mut vm,
        "func f(v: Int?) { guard let x = v else { print(1) } print(x) }",
    )
    .unwrap_err();
    assert!(err.to_string().contains("guard let"));
}

#[test]
fn optional_chaining_short_circuits() {
    let source = r#"
        class Box { var n: Int = 7 }
        var b: Box? = Box()
        print(b?.n ?? -1)
        b = nil
        print(b?.n ?? -1)
    "#;
    assert_eq!(run_lines(source), vec!["7", "-1"]);
}

#[test]
fn ternary_expression() {
    assert_eq!(run_lines("print(2 > 1 ? \"yes\" : \"no\")"), vec!["yes"]);
}

#[test]
fn arrays_and_subscripts() {
    let source = r#"
        var xs = [1, 2, 3]
        xs.append(4)
        xs[0] = 10
        print(xs[0])
        print(xs.count)
        print(xs.contains(3))
    "#;
    assert_eq!(run_lines(source), vec!["10", "4", "true"]);
}

#[test]
fn dictionaries() {
    let source = r#"
        var ages = ["ada": 36, "alan": 41]
        ages["grace"] = 45
        print(ages["ada"] ?? 0)
        print(ages["missing"] ?? -1)
        print(ages.count)
    "#;
    assert_eq!(run_lines(source), vec!["36", "-1", "3"]);
}

#[test]
fn string_builtins() {
    let source = r#"
        let s = "Hello"
        print(s.count)
        print(s.uppercased())
        print(s.hasPrefix("He"))
        print(s.contains("ell"))
    "#;
    assert_eq!(run_lines(source), vec!["5", "HELLO", "true", "true"]);
}

#[test]
fn tuples_positional_and_labeled() {
    let source = r#"
        let p = (x: 3, y: 4)
        print(p.x)
        print(p.1)
        let (a, b) = p
        print(a + b)
    "#;
    assert_eq!(run_lines(source), vec!["3", "4", "7"]);
}

#[test]
fn throw_terminates_with_rendered_value() {
    let err = run_error(r#"throw "kaboom""#);
    assert!(err.contains("kaboom"));
}

#[test]
fn conversions() {
    let source = r#"
        print(String(42) + "!")
        print(Int("17") ?? 0)
        print(Int("nope") ?? -1)
    "#;
    assert_eq!(run_lines(source), vec!["42!", "17", "-1"]);
}

#[test]
fn program_result_is_stack_top() {
    assert_eq!(run_result("func main() -> Int { return 41 + 1 }"), Value::Int(42));
}

#[test]
fn static_main_entry_point_runs() {
    let source = r#"
        class App {
            static func main() {
                print("started")
            }
        }
    "#;
    assert_eq!(run_lines(source), vec!["started"]);
}
