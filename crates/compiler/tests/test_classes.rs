//! Classes: construction, inheritance, observers, lazy properties,
//! reference counting and deinit.

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
fn class_with_initializer_and_method() {
    let source = r#"
        class Counter {
            var value: Int = 0
            init(value: Int) {
                self.value = value
            }
            func bump() {
                self.value = self.value + 1
            }
        }
        var c = Counter(3)
        c.bump()
        c.bump()
        print(c.value)
    "#;
    assert_eq!(run_lines(source), vec!["5"]);
}

#[test]
fn default_construction_without_initializer() {
    let source = r#"
        class Point { var x: Int = 1 var y: Int = 2 }
        var p = Point()
        print(p.x + p.y)
    "#;
    assert_eq!(run_lines(source), vec!["3"]);
}

#[test]
fn implicit_self_property_access_in_methods() {
    let source = r#"
        class Tally {
            var total: Int = 0
            func add(n: Int) {
                total = total + n
            }
        }
        var t = Tally()
        t.add(4)
        t.add(5)
        print(t.total)
    "#;
    assert_eq!(run_lines(source), vec!["9"]);
}

#[test]
fn instances_are_reference_types() {
    let source = r#"
        class Box { var n: Int = 0 }
        var a = Box()
        var b = a
        b.n = 42
        print(a.n)
    "#;
    assert_eq!(run_lines(source), vec!["42"]);
}

#[test]
fn single_inheritance_and_override() {
    let source = r#"
        class Animal {
            func speak() { print("...") }
            func kind() -> String { return "animal" }
        }
        class Dog: Animal {
            override func speak() { print("woof") }
        }
        var d = Dog()
        d.speak()
        print(d.kind())
    "#;
    assert_eq!(run_lines(source), vec!["woof", "animal"]);
}

#[test]
fn super_dispatches_to_the_parent_method() {
    let source = r#"
        class Animal {
            func speak() { print("...") }
        }
        class Dog: Animal {
            override func speak() {
                super.speak()
                print("woof")
            }
        }
        Dog().speak()
    "#;
    assert_eq!(run_lines(source), vec!["...", "woof"]);
}

#[test]
fn static_methods_and_properties() {
    let source = r#"
        class MathKit {
            static var turns: Int = 0
            static func double(n: Int) -> Int {
                return n * 2
            }
        }
        print(MathKit.double(21))
        MathKit.turns = 3
        print(MathKit.turns)
    "#;
    assert_eq!(run_lines(source), vec!["42", "3"]);
}

#[test]
fn will_set_and_did_set_fire_in_order() {
    let source = r#"
        class Thermostat {
            var degrees: Int = 10 {
                willSet {
                    print("will")
                    print(newValue)
                }
                didSet {
                    print("did")
                    print(oldValue)
                }
            }
        }
        var t = Thermostat()
        t.degrees = 20
        print(t.degrees)
    "#;
    assert_eq!(run_lines(source), vec!["will", "20", "did", "10", "20"]);
}

#[test]
fn observer_can_reenter_with_another_set() {
    let source = r#"
        class Log { var entries: Int = 0 }
        var log = Log()
        class Meter {
            var level: Int = 0 {
                didSet {
                    log.entries = log.entries + 1
                }
            }
        }
        var m = Meter()
        m.level = 1
        m.level = 2
        print(log.entries)
    "#;
    assert_eq!(run_lines(source), vec!["2"]);
}

#[test]
fn computed_property_getter_and_setter() {
    let source = r#"
        class Circle {
            var radius: Int = 0
            var diameter: Int {
                get { return self.radius * 2 }
                set { self.radius = newValue / 2 }
            }
        }
        var c = Circle()
        c.radius = 5
        print(c.diameter)
        c.diameter = 20
        print(c.radius)
    "#;
    assert_eq!(run_lines(source), vec!["10", "10"]);
}

#[test]
fn getter_only_computed_property_rejects_assignment() {
    let err = run_error(
        r#"
        class Rect {
            var w: Int = 3
            var area: Int { return self.w * self.w }
        }
        var r = Rect()
        r.area = 10
    "#,
    );
    assert!(err.contains("read-only"));
}

#[test]
fn lazy_property_initializes_once_on_first_read() {
    let source = r#"
        class Dataset {
            lazy var expensive: Int = self.compute()
            func compute() -> Int {
                print("computing")
                return 42
            }
        }
        var d = Dataset()
        print("before")
        print(d.expensive)
        print(d.expensive)
    "#;
    assert_eq!(
        run_lines(source),
        vec!["before", "computing", "42", "42"]
    );
}

#[test]
fn let_property_rejects_reassignment_outside_init() {
    let err = run_error(
        r#"
        class Tag {
            let name: String = "fixed"
        }
        var t = Tag()
        t.name = "other"
    "#,
    );
    assert!(err.contains("let"));
}

#[test]
fn weak_reference_nils_on_deallocation() {
    let source = r#"
        class C { var n: Int = 0 }
        var a: C? = C()
        weak var w: C? = a
        a = nil
        print(w == nil)
    "#;
    assert_eq!(run_lines(source), vec!["true"]);
}

#[test]
fn weak_reference_reads_target_while_alive() {
    let source = r#"
        class C { var n: Int = 7 }
        var a: C? = C()
        weak var w: C? = a
        print(w == nil)
        print(w?.n ?? -1)
    "#;
    assert_eq!(run_lines(source), vec!["false", "7"]);
}

#[test]
fn deinit_runs_exactly_once() {
    let source = r#"
        class R {
            deinit { print("bye") }
        }
        var r: R? = R()
        r = nil
        print("after")
    "#;
    assert_eq!(run_lines(source), vec!["bye", "after"]);
}

#[test]
fn deinit_runs_for_inherited_classes() {
    let source = r#"
        class Base {
            deinit { print("base gone") }
        }
        class Derived: Base {}
        var d: Derived? = Derived()
        d = nil
        print("done")
    "#;
    assert_eq!(run_lines(source), vec!["base gone", "done"]);
}

#[test]
fn reassignment_releases_the_previous_instance() {
    let source = r#"
        class Slot {
            var tag: Int = 0
            init(tag: Int) { self.tag = tag }
            deinit { print(self.tag) }
        }
        var s: Slot? = Slot(1)
        s = Slot(2)
        print("swapped")
    "#;
    assert_eq!(run_lines(source), vec!["1", "swapped"]);
}

#[test]
fn operator_overload_plus_method() {
    let source = r#"
        class Vec {
            var x: Int = 0
            init(x: Int) { self.x = x }
            func plus(other: Vec) -> Vec {
                return Vec(self.x + other.x)
            }
        }
        let v = Vec(2) + Vec(3)
        print(v.x)
    "#;
    assert_eq!(run_lines(source), vec!["5"]);
}

#[test]
fn class_statistics_track_allocations() {
    let mut vm = Vm::default();
    vm.capture_output();
    interpret(
        &mut vm,
        r#"
        class Node { var n: Int = 0 }
        var a: Node? = Node()
        a = nil
    "#,
    )
    .unwrap();
    let stats = vm.stats();
    assert!(stats.total_allocated > 0);
    assert!(stats.release_count > 0);
    assert!(stats.peak_objects >= 1);
}
