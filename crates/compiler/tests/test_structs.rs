//! Structs: value semantics, memberwise construction, mutating methods.

use swive_runtime::Vm;
use swivec::interpret;

fn run_lines(source: &str) -> Vec<String> {
    let mut vm = Vm::default();
    vm.capture_output();
    interpret(&mut vm, source).unwrap();
    vm.take_output()
}

fn run_error(source: &str) -> String {
    let mut vm = Vm::default();
    vm.capture_output();
    interpret(&mut vm, source).unwrap_err().to_string()
}

#[test]
fn assignment_copies_the_instance() {
    let source = r#"
        struct P { var x: Int var y: Int }
        var p = P(1, 2)
        var q = p
        q.x = 9
        print(p.x)
        print(q.x)
    "#;
    assert_eq!(run_lines(source), vec!["1", "9"]);
}

#[test]
fn memberwise_initializer_accepts_labels() {
    let source = r#"
        struct Size { var w: Int var h: Int }
        let s = Size(w: 3, h: 4)
        print(s.w * s.h)
    "#;
    assert_eq!(run_lines(source), vec!["12"]);
}

#[test]
fn explicit_initializer_overrides_memberwise() {
    let source = r#"
        struct Grid {
            var cells: Int = 0
            init(side: Int) {
                self.cells = side * side
            }
        }
        print(Grid(4).cells)
    "#;
    assert_eq!(run_lines(source), vec!["16"]);
}

#[test]
fn nested_struct_instances_copy_deeply() {
    let source = r#"
        struct Inner { var v: Int }
        struct Outer { var inner: Inner }
        var a = Outer(Inner(1))
        var b = a
        b.inner.v = 99
        print(a.inner.v)
        print(b.inner.v)
    "#;
    assert_eq!(run_lines(source), vec!["1", "99"]);
}

#[test]
fn argument_passing_copies_struct_values() {
    let source = r#"
        struct P { var x: Int }
        func stomp(p: P) {
            p.x = 0
        }
        var p = P(5)
        stomp(p)
        print(p.x)
    "#;
    assert_eq!(run_lines(source), vec!["5"]);
}

#[test]
fn mutating_method_updates_the_receiver() {
    let source = r#"
        struct Counter {
            var count: Int = 0
            mutating func bump() {
                count = count + 1
            }
        }
        var c = Counter()
        c.bump()
        c.bump()
        print(c.count)
    "#;
    assert_eq!(run_lines(source), vec!["2"]);
}

#[test]
fn non_mutating_method_cannot_write_properties() {
    let err = run_error(
        r#"
        struct Frozen {
            var n: Int = 0
            func thaw() {
                n = 1
            }
        }
    "#,
    );
    assert!(err.contains("non-mutating"));
}

#[test]
fn copies_do_not_share_mutations_from_mutating_methods() {
    let source = r#"
        struct Counter {
            var count: Int = 0
            mutating func bump() {
                count = count + 1
            }
        }
        var a = Counter()
        a.bump()
        var b = a
        b.bump()
        print(a.count)
        print(b.count)
    "#;
    assert_eq!(run_lines(source), vec!["1", "2"]);
}

#[test]
fn struct_computed_property() {
    let source = r#"
        struct Rect {
            var w: Int
            var h: Int
            var area: Int { return self.w * self.h }
        }
        print(Rect(6, 7).area)
    "#;
    assert_eq!(run_lines(source), vec!["42"]);
}

#[test]
fn struct_static_method() {
    let source = r#"
        struct Origin {
            var x: Int = 0
            static func label() -> String { return "origin" }
        }
        print(Origin.label())
    "#;
    assert_eq!(run_lines(source), vec!["origin"]);
}

#[test]
fn wrong_memberwise_arity_is_an_error() {
    let err = run_error(
        r#"
        struct P { var x: Int var y: Int }
        P(1)
    "#,
    );
    assert!(err.contains("memberwise initializer"));
}
