//! Protocols, extensions, generic specialization, imports.

use swive_runtime::Vm;
use swivec::{compile_source_with_resolver, interpret};

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
fn protocol_conformance_is_checked_at_definition() {
    let source = r#"
        protocol Greeter {
            func greet()
        }
        class English: Greeter {
            func greet() { print("hello") }
        }
        English().greet()
    "#;
    assert_eq!(run_lines(source), vec!["hello"]);
}

#[test]
fn missing_protocol_method_fails() {
    let err = run_error(
        r#"
        protocol Greeter {
            func greet()
        }
        class Silent: Greeter {}
    "#,
    );
    assert!(err.contains("does not conform"));
    assert!(err.contains("greet"));
}

#[test]
fn protocol_property_requirements_accept_stored_and_computed() {
    let source = r#"
        protocol Named {
            var name: String { get }
        }
        struct City: Named {
            var name: String
        }
        print(City("Pavia").name)
    "#;
    assert_eq!(run_lines(source), vec!["Pavia"]);
}

#[test]
fn extension_adds_methods_to_an_existing_type() {
    let source = r#"
        struct Point {
            var x: Int
            var y: Int
        }
        extension Point {
            func manhattan() -> Int {
                return self.x + self.y
            }
        }
        print(Point(3, 4).manhattan())
    "#;
    assert_eq!(run_lines(source), vec!["7"]);
}

#[test]
fn extension_adds_computed_properties_and_mutating_methods() {
    let source = r#"
        struct Counter { var n: Int = 0 }
        extension Counter {
            var doubled: Int { return self.n * 2 }
            mutating func bump() {
                self.n = self.n + 1
            }
        }
        var c = Counter()
        c.bump()
        c.bump()
        print(c.doubled)
    "#;
    assert_eq!(run_lines(source), vec!["4"]);
}

#[test]
fn extension_on_classes() {
    let source = r#"
        class Greeter {}
        extension Greeter {
            func hello() { print("hi from extension") }
        }
        Greeter().hello()
    "#;
    assert_eq!(run_lines(source), vec!["hi from extension"]);
}

#[test]
fn generic_struct_specializes_per_argument() {
    let source = r#"
        struct Box<T> {
            var value: T? = nil
            init(v: T) {
                self.value = v
            }
        }
        let a = Box<Int>(42)
        let b = Box<String>("hi")
        print(a.value!)
        print(b.value!)
    "#;
    assert_eq!(run_lines(source), vec!["42", "hi"]);
}

#[test]
fn generic_function_specializes() {
    let source = r#"
        func identity<T>(x: T) -> T {
            return x
        }
        print(identity<Int>(7))
        print(identity<String>("seven"))
    "#;
    assert_eq!(run_lines(source), vec!["7", "seven"]);
}

#[test]
fn specialization_reuses_one_definition_per_combination() {
    let source = r#"
        struct Box<T> {
            var value: T? = nil
            init(v: T) { self.value = v }
        }
        let a = Box<Int>(1)
        let b = Box<Int>(2)
        print((a.value ?? 0) + (b.value ?? 0))
    "#;
    assert_eq!(run_lines(source), vec!["3"]);
}

#[test]
fn generic_type_parameter_constructor_substitutes() {
    let source = r#"
        func parse<T>(text: String) -> T? {
            return T(text)
        }
        print(parse<Int>(text: "21") ?? -1)
    "#;
    assert_eq!(run_lines(source), vec!["21"]);
}

#[test]
fn imports_compile_into_the_same_globals() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("math.ss"),
        "func square(x: Int) -> Int { return x * x }\nlet tau = 6.28318\n",
    )
    .unwrap();

    let source = "import math\nprint(square(6))";
    let assembly = compile_source_with_resolver(
        source,
        Box::new(swivec::ProjectResolver::new(vec![dir.path().to_path_buf()])),
    )
    .unwrap();

    let mut vm = Vm::default();
    vm.capture_output();
    vm.execute(assembly).unwrap();
    assert_eq!(vm.take_output(), vec!["36"]);
}

#[test]
fn importing_the_same_module_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("m.ss"), "print(\"loaded\")\nlet one = 1\n").unwrap();

    let source = "import m\nimport m\nprint(one)";
    let assembly = compile_source_with_resolver(
        source,
        Box::new(swivec::ProjectResolver::new(vec![dir.path().to_path_buf()])),
    )
    .unwrap();

    let mut vm = Vm::default();
    vm.capture_output();
    vm.execute(assembly).unwrap();
    // the module's top-level statements run exactly once
    assert_eq!(vm.take_output(), vec!["loaded", "1"]);
}

#[test]
fn circular_imports_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.ss"), "import b\nlet x = 1\n").unwrap();
    std::fs::write(dir.path().join("b.ss"), "import a\nlet y = 2\n").unwrap();

    let err = compile_source_with_resolver(
        "import a",
        Box::new(swivec::ProjectResolver::new(vec![dir.path().to_path_buf()])),
    )
    .unwrap_err();
    assert!(err.to_string().contains("circular import of 'a'"));
}

#[test]
fn missing_module_reports_import_roots() {
    let dir = tempfile::tempdir().unwrap();
    let err = compile_source_with_resolver(
        "import ghost",
        Box::new(swivec::ProjectResolver::new(vec![dir.path().to_path_buf()])),
    )
    .unwrap_err();
    assert!(err.to_string().contains("module not found in ImportRoots"));
}

#[test]
fn import_without_resolver_is_a_compile_error() {
    let err = run_error("import math");
    assert!(err.to_string().contains("no module resolver"));
}
