//! Opcode-level VM tests over hand-assembled chunks.
//!
//! These exercise the dispatch loop directly, without the compiler, so
//! stack effects and error paths are pinned down at the instruction level.

use swive_core::chunk::{Assembly, FunctionProto, ParamDefault};
use swive_core::opcode::Opcode;
use swive_core::value::Value;
use swive_runtime::{RuntimeError, Vm};
use std::rc::Rc;

fn run(asm: Assembly) -> Result<Value, RuntimeError> {
    let mut vm = Vm::default();
    vm.capture_output();
    vm.execute(asm)
}

fn run_lines(asm: Assembly) -> Vec<String> {
    let mut vm = Vm::default();
    vm.capture_output();
    vm.execute(asm).unwrap();
    vm.take_output()
}

fn emit_constant(asm: &mut Assembly, value: Value) {
    let idx = asm.add_constant(value) as u16;
    asm.write_op(Opcode::Constant, 1);
    asm.write_short(idx, 1);
}

#[test]
fn arithmetic_respects_precedence_encoding() {
    // 1 + 2 * 3 compiled as 1, 2, 3, MUL, ADD
    let mut asm = Assembly::new();
    emit_constant(&mut asm, Value::Int(1));
    emit_constant(&mut asm, Value::Int(2));
    emit_constant(&mut asm, Value::Int(3));
    asm.write_op(Opcode::Multiply, 1);
    asm.write_op(Opcode::Add, 1);
    asm.write_op(Opcode::Halt, 1);
    assert_eq!(run(asm).unwrap(), Value::Int(7));
}

#[test]
fn mixed_arithmetic_promotes_to_float() {
    let mut asm = Assembly::new();
    emit_constant(&mut asm, Value::Int(1));
    emit_constant(&mut asm, Value::Float(0.5));
    asm.write_op(Opcode::Add, 1);
    asm.write_op(Opcode::Halt, 1);
    assert_eq!(run(asm).unwrap(), Value::Float(1.5));
}

#[test]
fn integer_division_by_zero_errors() {
    let mut asm = Assembly::new();
    emit_constant(&mut asm, Value::Int(1));
    emit_constant(&mut asm, Value::Int(0));
    asm.write_op(Opcode::Divide, 3);
    asm.write_op(Opcode::Halt, 3);
    let err = run(asm).unwrap_err();
    assert!(err.message.contains("division by zero"));
    assert_eq!(err.line, 3);
}

#[test]
fn string_add_concatenates() {
    let mut asm = Assembly::new();
    let hello = asm.add_string("Hello, ") as u16;
    let world = asm.add_string("world") as u16;
    asm.write_op(Opcode::String, 1);
    asm.write_short(hello, 1);
    asm.write_op(Opcode::String, 1);
    asm.write_short(world, 1);
    asm.write_op(Opcode::Add, 1);
    asm.write_op(Opcode::Print, 1);
    asm.write_op(Opcode::Halt, 1);
    assert_eq!(run_lines(asm), vec!["Hello, world"]);
}

#[test]
fn each_opcode_has_its_declared_stack_effect() {
    // net effects: CONSTANT +1, NIL +1, ADD -1, POP -1, TRUE +1, NOT 0
    let mut asm = Assembly::new();
    emit_constant(&mut asm, Value::Int(1));
    emit_constant(&mut asm, Value::Int(2));
    asm.write_op(Opcode::Add, 1);
    asm.write_op(Opcode::Pop, 1);
    asm.write_op(Opcode::True, 1);
    asm.write_op(Opcode::Not, 1);
    asm.write_op(Opcode::Halt, 1);
    let mut vm = Vm::default();
    let result = vm.execute(asm).unwrap();
    // one value (the negated bool) remains
    assert_eq!(vm.stack_size(), 1);
    assert_eq!(result, Value::Bool(false));
}

#[test]
fn jump_if_false_leaves_condition_for_explicit_pop() {
    // FALSE, JUMP_IF_FALSE over a PRINT, POP, HALT
    let mut asm = Assembly::new();
    asm.write_op(Opcode::False, 1);
    let jump = asm.emit_jump(Opcode::JumpIfFalse, 1);
    asm.write_op(Opcode::Pop, 1);
    emit_constant(&mut asm, Value::Int(99));
    asm.write_op(Opcode::Print, 1);
    asm.patch_jump(jump).unwrap();
    asm.write_op(Opcode::Pop, 1);
    asm.write_op(Opcode::Halt, 1);
    let mut vm = Vm::default();
    vm.capture_output();
    vm.execute(asm).unwrap();
    assert!(vm.take_output().is_empty());
    assert_eq!(vm.stack_size(), 0);
}

#[test]
fn jump_if_nil_pops_on_nil_and_keeps_value_otherwise() {
    // nil ?? 5 lowered the way the compiler does it
    let mut asm = Assembly::new();
    asm.write_op(Opcode::Nil, 1);
    let else_jump = asm.emit_jump(Opcode::JumpIfNil, 1);
    let end_jump = asm.emit_jump(Opcode::Jump, 1);
    asm.patch_jump(else_jump).unwrap();
    emit_constant(&mut asm, Value::Int(5));
    asm.patch_jump(end_jump).unwrap();
    asm.write_op(Opcode::Halt, 1);
    assert_eq!(run(asm).unwrap(), Value::Int(5));

    let mut asm = Assembly::new();
    emit_constant(&mut asm, Value::Int(3));
    let else_jump = asm.emit_jump(Opcode::JumpIfNil, 1);
    let end_jump = asm.emit_jump(Opcode::Jump, 1);
    asm.patch_jump(else_jump).unwrap();
    emit_constant(&mut asm, Value::Int(5));
    asm.patch_jump(end_jump).unwrap();
    asm.write_op(Opcode::Halt, 1);
    assert_eq!(run(asm).unwrap(), Value::Int(3));
}

#[test]
fn unwrap_of_nil_is_a_runtime_error() {
    let mut asm = Assembly::new();
    asm.write_op(Opcode::Nil, 1);
    asm.write_op(Opcode::Unwrap, 1);
    asm.write_op(Opcode::Halt, 1);
    let err = run(asm).unwrap_err();
    assert!(err.message.contains("unwrapping an Optional"));
}

#[test]
fn nil_coalesce_opcode_prefers_non_nil() {
    let mut asm = Assembly::new();
    emit_constant(&mut asm, Value::Int(1));
    emit_constant(&mut asm, Value::Int(2));
    asm.write_op(Opcode::NilCoalesce, 1);
    asm.write_op(Opcode::Halt, 1);
    assert_eq!(run(asm).unwrap(), Value::Int(1));

    let mut asm = Assembly::new();
    asm.write_op(Opcode::Nil, 1);
    emit_constant(&mut asm, Value::Int(2));
    asm.write_op(Opcode::NilCoalesce, 1);
    asm.write_op(Opcode::Halt, 1);
    assert_eq!(run(asm).unwrap(), Value::Int(2));
}

#[test]
fn define_and_get_global_round_trip() {
    let mut asm = Assembly::new();
    let name = asm.add_string("answer") as u16;
    emit_constant(&mut asm, Value::Int(42));
    asm.write_op(Opcode::DefineGlobal, 1);
    asm.write_short(name, 1);
    asm.write_op(Opcode::GetGlobal, 2);
    asm.write_short(name, 2);
    asm.write_op(Opcode::Halt, 2);
    assert_eq!(run(asm).unwrap(), Value::Int(42));
}

#[test]
fn undefined_global_read_errors() {
    let mut asm = Assembly::new();
    let name = asm.add_string("missing") as u16;
    asm.write_op(Opcode::GetGlobal, 1);
    asm.write_short(name, 1);
    asm.write_op(Opcode::Halt, 1);
    let err = run(asm).unwrap_err();
    assert!(err.message.contains("undefined variable 'missing'"));
}

#[test]
fn weak_global_reads_nil_after_release() {
    // g = "obj"; w = weak g; g = nil; w reads nil
    let mut asm = Assembly::new();
    let g = asm.add_string("g") as u16;
    let w = asm.add_string("w") as u16;
    let text = asm.add_string("obj") as u16;

    asm.write_op(Opcode::String, 1);
    asm.write_short(text, 1);
    asm.write_op(Opcode::DefineGlobal, 1);
    asm.write_short(g, 1);

    asm.write_op(Opcode::GetGlobal, 2);
    asm.write_short(g, 2);
    asm.write_op(Opcode::MakeWeak, 2);
    asm.write_op(Opcode::DefineGlobal, 2);
    asm.write_short(w, 2);

    asm.write_op(Opcode::Nil, 3);
    asm.write_op(Opcode::SetGlobal, 3);
    asm.write_short(g, 3);
    asm.write_op(Opcode::Pop, 3);

    asm.write_op(Opcode::GetGlobal, 4);
    asm.write_short(w, 4);
    asm.write_op(Opcode::Nil, 4);
    asm.write_op(Opcode::Equal, 4);
    asm.write_op(Opcode::Halt, 4);

    assert_eq!(run(asm).unwrap(), Value::Bool(true));
}

#[test]
fn call_fills_trailing_defaults_and_rejects_missing() {
    // func f(a, b = 10) { return a + b }; f(1) == 11
    let mut body = Assembly::new();
    body.write_op(Opcode::GetLocal, 1);
    body.write_short(0, 1);
    body.write_op(Opcode::GetLocal, 1);
    body.write_short(1, 1);
    body.write_op(Opcode::Add, 1);
    body.write_op(Opcode::Return, 1);

    let mut asm = Assembly::new();
    let f_idx = asm.add_function(FunctionProto {
        name: "f".to_string(),
        params: vec!["a".to_string(), "b".to_string()],
        param_labels: vec!["a".to_string(), "b".to_string()],
        param_defaults: vec![ParamDefault::none(), ParamDefault::scalar(Value::Int(10))],
        chunk: Some(Rc::new(body)),
        upvalues: vec![],
        is_initializer: false,
        is_override: false,
    }) as u16;

    asm.write_op(Opcode::Function, 1);
    asm.write_short(f_idx, 1);
    emit_constant(&mut asm, Value::Int(1));
    asm.write_op(Opcode::Call, 1);
    asm.write_short(1, 1);
    asm.write_op(Opcode::Halt, 1);
    assert_eq!(run(asm).unwrap(), Value::Int(11));
}

#[test]
fn call_with_no_arguments_reports_missing_parameter() {
    let mut body = Assembly::new();
    body.write_op(Opcode::Nil, 1);
    body.write_op(Opcode::Return, 1);

    let mut asm = Assembly::new();
    let f_idx = asm.add_function(FunctionProto {
        name: "f".to_string(),
        params: vec!["a".to_string()],
        param_labels: vec!["a".to_string()],
        param_defaults: vec![ParamDefault::none()],
        chunk: Some(Rc::new(body)),
        upvalues: vec![],
        is_initializer: false,
        is_override: false,
    }) as u16;

    asm.write_op(Opcode::Function, 1);
    asm.write_short(f_idx, 1);
    asm.write_op(Opcode::Call, 1);
    asm.write_short(0, 1);
    asm.write_op(Opcode::Halt, 1);
    let err = run(asm).unwrap_err();
    assert!(err.message.contains("missing argument 'a'"));
}

#[test]
fn frame_return_restores_stack_below_callee() {
    // callee leaves locals behind; return must truncate them and replace
    // the callee slot with the result
    let mut body = Assembly::new();
    {
        let idx = body.add_constant(Value::Int(5)) as u16;
        body.write_op(Opcode::Constant, 1);
        body.write_short(idx, 1);
    }
    {
        let idx = body.add_constant(Value::Int(7)) as u16;
        body.write_op(Opcode::Constant, 1);
        body.write_short(idx, 1);
    }
    body.write_op(Opcode::Return, 1);

    let mut asm = Assembly::new();
    let f_idx = asm.add_function(FunctionProto {
        name: "f".to_string(),
        chunk: Some(Rc::new(body)),
        ..Default::default()
    }) as u16;
    asm.write_op(Opcode::Function, 1);
    asm.write_short(f_idx, 1);
    asm.write_op(Opcode::Call, 1);
    asm.write_short(0, 1);
    asm.write_op(Opcode::Halt, 1);

    let mut vm = Vm::default();
    let result = vm.execute(asm).unwrap();
    assert_eq!(result, Value::Int(7));
    assert_eq!(vm.stack_size(), 1);
}

#[test]
fn ranges_answer_bounds_and_count() {
    let mut asm = Assembly::new();
    let count = asm.add_string("count") as u16;
    emit_constant(&mut asm, Value::Int(1));
    emit_constant(&mut asm, Value::Int(5));
    asm.write_op(Opcode::RangeInclusive, 1);
    asm.write_op(Opcode::GetProperty, 1);
    asm.write_short(count, 1);
    asm.write_op(Opcode::Halt, 1);
    assert_eq!(run(asm).unwrap(), Value::Int(5));
}

#[test]
fn array_and_subscript_read() {
    let mut asm = Assembly::new();
    emit_constant(&mut asm, Value::Int(10));
    emit_constant(&mut asm, Value::Int(20));
    asm.write_op(Opcode::Array, 1);
    asm.write_short(2, 1);
    emit_constant(&mut asm, Value::Int(1));
    asm.write_op(Opcode::GetSubscript, 1);
    asm.write_op(Opcode::Halt, 1);
    assert_eq!(run(asm).unwrap(), Value::Int(20));
}

#[test]
fn subscript_out_of_range_errors() {
    let mut asm = Assembly::new();
    emit_constant(&mut asm, Value::Int(10));
    asm.write_op(Opcode::Array, 1);
    asm.write_short(1, 1);
    emit_constant(&mut asm, Value::Int(3));
    asm.write_op(Opcode::GetSubscript, 1);
    asm.write_op(Opcode::Halt, 1);
    let err = run(asm).unwrap_err();
    assert!(err.message.contains("out of range"));
}

#[test]
fn throw_terminates_with_rendered_value() {
    let mut asm = Assembly::new();
    let text = asm.add_string("boom") as u16;
    asm.write_op(Opcode::String, 1);
    asm.write_short(text, 1);
    asm.write_op(Opcode::Throw, 1);
    asm.write_op(Opcode::Halt, 1);
    let err = run(asm).unwrap_err();
    assert!(err.message.contains("boom"));
}

#[test]
fn unknown_opcode_aborts() {
    let mut asm = Assembly::new();
    asm.write(0xEE, 1);
    let err = run(asm).unwrap_err();
    assert!(err.message.contains("unknown opcode"));
}
