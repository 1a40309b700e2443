//! Compiled assemblies survive the serialize/deserialize round trip and
//! execute identically from the restored form, including through the
//! project build path.

use swive_core::chunk::Assembly;
use swive_runtime::Vm;
use swivec::{compile_project, compile_source};

const PROGRAM: &str = r#"
func fib(n: Int) -> Int {
    if n < 2 {
        return n
    }
    return fib(n - 1) + fib(n - 2)
}

class Greeter {
    var name: String = "world"
    func greet() -> String {
        return "Hello, " + self.name
    }
}

enum Flag {
    case on
    case off
}

print(fib(10))
print(Greeter().greet())
print(Flag.on)
"#;

const EXPECTED: &[&str] = &["55", "Hello, world", "Flag.on"];

#[test]
fn restored_assembly_runs_identically() {
    let assembly = compile_source(PROGRAM).unwrap();

    let mut vm = Vm::default();
    vm.capture_output();
    vm.execute(assembly.clone()).unwrap();
    assert_eq!(vm.take_output(), EXPECTED);

    let mut bytes = Vec::new();
    assembly.serialize(&mut bytes).unwrap();
    let restored = Assembly::deserialize(&bytes).unwrap();

    let mut vm = Vm::default();
    vm.capture_output();
    vm.execute(restored).unwrap();
    assert_eq!(vm.take_output(), EXPECTED);
}

#[test]
fn second_serialize_is_byte_identical() {
    let assembly = compile_source(PROGRAM).unwrap();
    let mut first = Vec::new();
    assembly.serialize(&mut first).unwrap();
    let restored = Assembly::deserialize(&first).unwrap();
    let mut second = Vec::new();
    restored.serialize(&mut second).unwrap();
    assert_eq!(first, second);
}

#[test]
fn manifest_and_metadata_tables_are_populated() {
    let assembly = compile_source(PROGRAM).unwrap();
    assert_eq!(assembly.manifest.name, "Main");
    // Greeter, Flag and the entry record
    assert!(!assembly.type_definitions.is_empty());
    assert!(!assembly.method_definitions.is_empty());
    assert!(!assembly.method_bodies.is_empty());
    let greeter = assembly
        .type_definitions
        .iter()
        .find(|t| assembly.strings[t.name as usize] == "Greeter")
        .expect("Greeter type definition");
    assert_eq!(greeter.method_list.count, 1);
    assert_eq!(greeter.field_list.count, 1);
}

#[test]
fn shared_method_bodies_deduplicate() {
    let source = r#"
        class A { func ping() -> Int { return 1 } }
        print(A().ping())
    "#;
    let assembly = compile_source(source).unwrap();
    // entry body + one method body
    assert_eq!(assembly.method_bodies.len(), 2);
}

#[test]
fn project_build_runs_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("Scripts")).unwrap();
    std::fs::write(
        dir.path().join("Scripts/main.ss"),
        "import util\nprint(double(21))",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("Scripts/util.ss"),
        "func double(x: Int) -> Int { return x * 2 }",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("App.ssproject"),
        "<Project><Entry>Scripts/main.ss</Entry><ImportRoots><Root>Scripts</Root></ImportRoots></Project>",
    )
    .unwrap();

    let (project, assembly) = compile_project(&dir.path().join("App.ssproject")).unwrap();
    assert_eq!(project.name(), "App");

    // write, restore, run: the full build/run pipeline
    let mut bytes = Vec::new();
    assembly.serialize(&mut bytes).unwrap();
    let out = dir.path().join("App.ssasm");
    std::fs::write(&out, &bytes).unwrap();

    let restored = Assembly::deserialize(&std::fs::read(&out).unwrap()).unwrap();
    let mut vm = Vm::default();
    vm.capture_output();
    vm.execute(restored).unwrap();
    assert_eq!(vm.take_output(), vec!["42"]);
}
