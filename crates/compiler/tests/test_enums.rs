//! Enums: cases, raw values, associated values, switch dispatch.

use swive_runtime::Vm;
use swivec::interpret;

fn run_lines(source: &str) -> Vec<String> {
    let mut vm = Vm::default();
    vm.capture_output();
    interpret(&mut vm, source).unwrap();
    vm.take_output()
}

#[test]
fn simple_cases_print_qualified_names() {
    let source = r#"
        enum Direction { case north case south }
        var d = Direction.north
        print(d)
    "#;
    assert_eq!(run_lines(source), vec!["Direction.north"]);
}

#[test]
fn cases_compare_by_identity_and_name() {
    let source = r#"
        enum Status { case pending case active }
        var a = Status.active
        print(a == Status.active)
        print(a == Status.pending)
    "#;
    assert_eq!(run_lines(source), vec!["true", "false"]);
}

#[test]
fn raw_values_are_readable() {
    let source = r#"
        enum Priority {
            case low = 1
            case medium = 2
            case high = 3
        }
        print(Priority.high.rawValue)
        print(Priority.low.caseName)
    "#;
    assert_eq!(run_lines(source), vec!["3", "low"]);
}

#[test]
fn switch_selects_matching_case() {
    let source = r#"
        enum Status { case pending case active case done }
        var s = Status.active
        switch s {
        case Status.pending:
            print("pending")
        case Status.active:
            print("active")
        case Status.done:
            print("done")
        }
    "#;
    assert_eq!(run_lines(source), vec!["active"]);
}

#[test]
fn switch_falls_to_default() {
    let source = r#"
        enum Color { case red case green case blue }
        var c = Color.blue
        switch c {
        case Color.red:
            print("red")
        default:
            print("other")
        }
    "#;
    assert_eq!(run_lines(source), vec!["other"]);
}

#[test]
fn switch_over_integers_compares_by_equality() {
    let source = r#"
        let n = 2
        switch n {
        case 1:
            print("one")
        case 2:
            print("two")
        default:
            print("many")
        }
    "#;
    assert_eq!(run_lines(source), vec!["two"]);
}

#[test]
fn associated_values_bind_in_switch() {
    let source = r#"
        enum Response {
            case success(message: String)
            case failure(code: Int)
        }
        var r = Response.success(message: "OK")
        switch r {
        case Response.success(let msg):
            print("Success: " + msg)
        case Response.failure(let code):
            print("Error: " + String(code))
        }
        r = Response.failure(code: 404)
        switch r {
        case .success(let msg):
            print(msg)
        case .failure(let code):
            print(code)
        }
    "#;
    assert_eq!(run_lines(source), vec!["Success: OK", "404"]);
}

#[test]
fn associated_values_read_by_label_and_index() {
    let source = r#"
        enum Shape {
            case point(x: Int, y: Int)
        }
        var p = Shape.point(x: 3, y: 4)
        print(p.x + p.y)
        print(p.associated)
    "#;
    assert_eq!(run_lines(source), vec!["7", "[3, 4]"]);
}

#[test]
fn enum_methods_dispatch_on_cases() {
    let source = r#"
        enum Light {
            case red
            case green
            func go() -> Bool {
                return self == Light.green
            }
        }
        print(Light.green.go())
        print(Light.red.go())
    "#;
    assert_eq!(run_lines(source), vec!["true", "false"]);
}

#[test]
fn enum_computed_property() {
    let source = r#"
        enum Coin {
            case heads
            case tails
            var flipped: Coin {
                if self == Coin.heads {
                    return Coin.tails
                }
                return Coin.heads
            }
        }
        print(Coin.heads.flipped)
    "#;
    assert_eq!(run_lines(source), vec!["Coin.tails"]);
}
