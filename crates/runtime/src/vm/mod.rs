//! The stack-based virtual machine.
//!
//! Execution state is a growable value stack, a call-frame stack, the
//! current chunk and instruction pointer, the open-upvalue list, and the
//! globals map. Dispatch goes through a 256-entry function-pointer table
//! indexed by the opcode byte; unknown opcodes abort the run.
//!
//! The deferred-release queue is drained between top-level instruction
//! steps only, never inside nested observer or deinit frames, so handlers
//! always observe coherent object state.

mod builtins;
mod calls;
mod ops;
mod props;

use crate::error::RuntimeError;
use crate::heap::Heap;
use crate::object::{ObjBody, ObjKind, UpvalueState};
use crate::stats::MemoryStats;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::OnceLock;
use swive_core::chunk::Assembly;
use swive_core::opcode::Opcode;
use swive_core::value::{ObjId, RefKind, Value};

/// Hard cap on call-frame nesting.
pub const MAX_FRAMES: usize = 1024;

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub initial_stack_size: usize,
    pub max_stack_size: usize,
    /// RC operations between forced cleanup ticks.
    pub deferred_cleanup_threshold: u32,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            initial_stack_size: 256,
            max_stack_size: 65_536,
            deferred_cleanup_threshold: 100,
        }
    }
}

/// One activation record.
///
/// Arguments and locals occupy `[stack_base, stack_base + locals)`; return
/// restores the stack to `stack_base - 1`, dropping the callee slot.
#[derive(Debug, Clone)]
pub struct CallFrame {
    pub stack_base: usize,
    pub return_ip: usize,
    pub caller_chunk: Rc<Assembly>,
    pub function_name: String,
    pub closure: Option<ObjId>,
    pub is_initializer: bool,
    pub is_mutating: bool,
    /// Stack slot of the receiver for mutating struct methods.
    pub receiver_index: usize,
}

/// Per-instruction control outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Halt,
    Return,
}

pub(crate) type Handler = fn(&mut Vm) -> Result<Flow, RuntimeError>;

pub struct Vm {
    config: VmConfig,
    pub heap: Heap,
    pub(crate) deferred: Vec<ObjId>,

    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<CallFrame>,
    pub(crate) chunk: Rc<Assembly>,
    pub(crate) ip: usize,
    /// Open upvalues ordered by decreasing addressed stack slot.
    pub(crate) open_upvalues: Vec<ObjId>,
    pub(crate) globals: HashMap<String, Value>,

    pub(crate) rc_ops: u32,
    pub(crate) is_collecting: bool,

    /// When set, `print` collects lines instead of writing to stdout.
    captured_output: Option<Vec<String>>,
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new(VmConfig::default())
    }
}

impl Vm {
    pub fn new(config: VmConfig) -> Vm {
        let mut vm = Vm {
            stack: Vec::with_capacity(config.initial_stack_size),
            config,
            heap: Heap::new(),
            deferred: Vec::new(),
            frames: Vec::new(),
            chunk: Rc::new(Assembly::new()),
            ip: 0,
            open_upvalues: Vec::new(),
            globals: HashMap::new(),
            rc_ops: 0,
            is_collecting: false,
            captured_output: None,
        };
        builtins::install_builtin_globals(&mut vm);
        vm
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn stats(&self) -> &MemoryStats {
        &self.heap.stats
    }

    /// Routes `print` output into a buffer readable via [`Vm::take_output`].
    pub fn capture_output(&mut self) {
        self.captured_output = Some(Vec::new());
    }

    pub fn take_output(&mut self) -> Vec<String> {
        match self.captured_output.take() {
            Some(lines) => {
                self.captured_output = Some(Vec::new());
                lines
            }
            None => Vec::new(),
        }
    }

    pub(crate) fn print_line(&mut self, line: String) {
        match &mut self.captured_output {
            Some(buffer) => buffer.push(line),
            None => println!("{line}"),
        }
    }

    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).copied()
    }

    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    /// Runs an assembly to `HALT`; the result is the stack top, or nil when
    /// the stack drained empty.
    pub fn execute(&mut self, assembly: Assembly) -> Result<Value, RuntimeError> {
        self.chunk = Rc::new(assembly);
        self.ip = 0;
        let result = self.run_loop(None);
        self.run_cleanup();
        if result.is_err() {
            // a runtime error unwinds the frame stack before returning
            self.frames.clear();
            self.stack.clear();
            self.open_upvalues.clear();
        }
        result
    }

    /// The dispatch loop. With `stop_at: None` this is the outermost run:
    /// it executes until `HALT` and drains the deferred-release queue
    /// between instruction steps. With `Some(floor)` it is a nested run
    /// (observers, computed accessors, deinit) that ends as soon as a
    /// `RETURN` brings the frame stack back down to `floor`; no draining
    /// happens inside a single opcode's expansion.
    pub(crate) fn run_loop(&mut self, stop_at: Option<usize>) -> Result<Value, RuntimeError> {
        loop {
            let byte = self.read_byte()?;
            let handler = handler_table()[byte as usize];
            let flow = handler(self)?;
            match flow {
                Flow::Continue => {}
                Flow::Halt => {
                    return Ok(self.stack.last().copied().unwrap_or(Value::Null));
                }
                Flow::Return => {
                    if let Some(floor) = stop_at {
                        if self.frames.len() <= floor {
                            return Ok(self.stack.last().copied().unwrap_or(Value::Null));
                        }
                    }
                }
            }
            if stop_at.is_none() {
                self.collect_if_needed();
            }
        }
    }

    // ---- instruction stream ----

    pub(crate) fn read_byte(&mut self) -> Result<u8, RuntimeError> {
        let byte = self
            .chunk
            .bytecode()
            .get(self.ip)
            .copied()
            .ok_or_else(|| self.runtime_error("instruction pointer ran off the chunk"))?;
        self.ip += 1;
        Ok(byte)
    }

    pub(crate) fn read_short(&mut self) -> Result<u16, RuntimeError> {
        let high = self.read_byte()? as u16;
        let low = self.read_byte()? as u16;
        Ok((high << 8) | low)
    }

    pub(crate) fn read_constant(&mut self) -> Result<Value, RuntimeError> {
        let idx = self.read_short()? as usize;
        self.chunk
            .constant_pool()
            .get(idx)
            .copied()
            .ok_or_else(|| self.runtime_error(format!("constant index {idx} out of range")))
    }

    pub(crate) fn read_string(&mut self) -> Result<String, RuntimeError> {
        let idx = self.read_short()? as usize;
        self.chunk
            .strings
            .get(idx)
            .cloned()
            .ok_or_else(|| self.runtime_error(format!("string index {idx} out of range")))
    }

    pub(crate) fn current_line(&self) -> u32 {
        self.chunk
            .line_info()
            .get(self.ip.saturating_sub(1))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn runtime_error(&self, message: impl Into<String>) -> RuntimeError {
        RuntimeError::new(message, self.current_line())
    }

    // ---- value stack ----

    pub(crate) fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.config.max_stack_size {
            return Err(self.runtime_error("stack overflow"));
        }
        self.stack.push(value);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack
            .pop()
            .ok_or_else(|| self.runtime_error("stack underflow"))
    }

    pub(crate) fn peek(&self, distance: usize) -> Result<Value, RuntimeError> {
        let len = self.stack.len();
        if distance >= len {
            return Err(self.runtime_error("stack underflow"));
        }
        Ok(self.stack[len - 1 - distance])
    }

    pub(crate) fn current_stack_base(&self) -> usize {
        self.frames.last().map(|f| f.stack_base).unwrap_or(0)
    }

    // ---- weak reference reads ----

    /// Reads through a value cell, observing weak/unowned death: a weak
    /// reference to a dead object reads as nil; an unowned one is an error.
    pub(crate) fn deref_read(&self, value: Value) -> Result<Value, RuntimeError> {
        if let Value::Obj(r) = value {
            match r.kind {
                RefKind::Strong => {}
                RefKind::Weak => {
                    if self.heap.is_dead(r.id) {
                        return Ok(Value::Null);
                    }
                }
                RefKind::Unowned => {
                    if self.heap.is_dead(r.id) {
                        return Err(self.runtime_error(
                            "attempted to read unowned reference after target deallocation",
                        ));
                    }
                }
            }
        }
        Ok(value)
    }

    // ---- semantics shared across handlers ----

    pub(crate) fn is_truthy(&self, value: &Value) -> bool {
        match value {
            Value::Null | Value::Undefined => false,
            Value::Bool(b) => *b,
            _ => true,
        }
    }

    /// Value equality: structural for scalars (floats by scale-relative
    /// epsilon, int/float by promotion), string objects by content, enum
    /// cases by enum identity and case name, other objects by identity.
    pub(crate) fn values_equal(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Obj(x), Value::Obj(y)) => {
                if x.id == y.id {
                    return true;
                }
                match (self.heap.body(x.id), self.heap.body(y.id)) {
                    (Some(ObjBody::Str(s1)), Some(ObjBody::Str(s2))) => s1 == s2,
                    (Some(ObjBody::EnumCase(c1)), Some(ObjBody::EnumCase(c2))) => {
                        c1.enum_type == c2.enum_type && c1.case_name == c2.case_name
                    }
                    _ => false,
                }
            }
            _ => swive_core::value::scalar_equals(a, b),
        }
    }

    pub(crate) fn allocate_string(&mut self, s: String) -> Value {
        Value::object(self.heap.allocate(ObjBody::Str(s)))
    }

    pub(crate) fn string_content(&self, value: &Value) -> Option<String> {
        if let Value::Obj(r) = value {
            if let Some(ObjBody::Str(s)) = self.heap.body(r.id) {
                return Some(s.clone());
            }
        }
        None
    }

    pub(crate) fn obj_kind(&self, value: &Value) -> Option<ObjKind> {
        value.as_obj().map(|r| self.heap.kind(r.id))
    }

    // ---- display ----

    pub fn display_value(&self, value: &Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Undefined => "undefined".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format!("{f:.6}"),
            Value::Obj(r) => self.display_object(r.id),
        }
    }

    fn display_element(&self, value: &Value) -> String {
        // string elements render quoted inside containers
        if self.obj_kind(value) == Some(ObjKind::String) {
            format!("\"{}\"", self.display_value(value))
        } else {
            self.display_value(value)
        }
    }

    fn display_object(&self, id: ObjId) -> String {
        let Some(body) = self.heap.body(id) else {
            return "null".to_string();
        };
        match body {
            ObjBody::Str(s) => s.clone(),
            ObjBody::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| self.display_element(v)).collect();
                format!("[{}]", parts.join(", "))
            }
            ObjBody::Map(entries) => {
                let mut keys: Vec<&String> = entries.keys().collect();
                keys.sort();
                let parts: Vec<String> = keys
                    .iter()
                    .map(|k| format!("\"{}\": {}", k, self.display_element(&entries[*k])))
                    .collect();
                format!("[{}]", parts.join(", "))
            }
            ObjBody::Function(f) => {
                if f.name.is_empty() {
                    "<func>".to_string()
                } else {
                    format!("<func {}>", f.name)
                }
            }
            ObjBody::Closure(c) => self.display_object(c.function),
            ObjBody::Upvalue(_) => "<upvalue>".to_string(),
            ObjBody::Class(c) => format!("<class {}>", c.name),
            ObjBody::Instance(i) => {
                let name = match self.heap.body(i.class) {
                    Some(ObjBody::Class(c)) => c.name.clone(),
                    _ => "instance".to_string(),
                };
                format!("<{name} instance>")
            }
            ObjBody::Struct(s) => format!("<struct {}>", s.name),
            ObjBody::StructInstance(i) => {
                let name = match self.heap.body(i.struct_type) {
                    Some(ObjBody::Struct(s)) => s.name.clone(),
                    _ => "struct".to_string(),
                };
                format!("<{name} instance>")
            }
            ObjBody::Enum(e) => format!("<enum {}>", e.name),
            ObjBody::EnumCase(c) => {
                let mut text = match self.heap.body(c.enum_type) {
                    Some(ObjBody::Enum(e)) => format!("{}.{}", e.name, c.case_name),
                    _ => c.case_name.clone(),
                };
                if !c.associated.is_empty() {
                    let parts: Vec<String> =
                        c.associated.iter().map(|v| self.display_value(v)).collect();
                    text.push('(');
                    text.push_str(&parts.join(", "));
                    text.push(')');
                }
                text
            }
            ObjBody::Protocol(p) => format!("<protocol {}>", p.name),
            ObjBody::BoundMethod(_) => "<bound method>".to_string(),
            ObjBody::BuiltinMethod(b) => format!("<builtin method '{}'>", b.name),
            ObjBody::Tuple(t) => {
                let parts: Vec<String> = t
                    .elements
                    .iter()
                    .zip(&t.labels)
                    .map(|(v, l)| match l {
                        Some(label) => format!("{label}: {}", self.display_value(v)),
                        None => self.display_value(v),
                    })
                    .collect();
                format!("({})", parts.join(", "))
            }
            ObjBody::Range(r) => {
                if r.inclusive {
                    format!("{}...{}", r.start, r.end)
                } else {
                    format!("{}..{}", r.start, r.end)
                }
            }
        }
    }

    // ---- upvalue lifetime ----

    pub(crate) fn upvalue_slot(&self, id: ObjId) -> Option<usize> {
        match self.heap.body(id) {
            Some(ObjBody::Upvalue(UpvalueState::Open(slot))) => Some(*slot),
            _ => None,
        }
    }

    /// Captures the local at `slot`, reusing an existing open upvalue. The
    /// open list stays sorted by decreasing stack slot.
    pub(crate) fn capture_upvalue(&mut self, slot: usize) -> ObjId {
        let mut insert_at = self.open_upvalues.len();
        for (i, &uv) in self.open_upvalues.iter().enumerate() {
            match self.upvalue_slot(uv) {
                Some(existing) if existing == slot => return uv,
                Some(existing) if existing < slot => {
                    insert_at = i;
                    break;
                }
                _ => {}
            }
        }
        let id = self.heap.allocate(ObjBody::Upvalue(UpvalueState::Open(slot)));
        self.open_upvalues.insert(insert_at, id);
        id
    }

    /// Closes all open upvalues addressing slots at or above `boundary`:
    /// the slot's value moves into the upvalue's own cell.
    pub(crate) fn close_upvalues(&mut self, boundary: usize) {
        while let Some(&uv) = self.open_upvalues.first() {
            let Some(slot) = self.upvalue_slot(uv) else {
                self.open_upvalues.remove(0);
                continue;
            };
            if slot < boundary {
                break;
            }
            let value = self.stack[slot];
            if let Some(body) = self.heap.body_mut(uv) {
                *body = ObjBody::Upvalue(UpvalueState::Closed(value));
            }
            self.open_upvalues.remove(0);
        }
    }

    // ---- simple handlers ----

    pub(crate) fn op_constant(&mut self) -> Result<Flow, RuntimeError> {
        let value = self.read_constant()?;
        self.push(value)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_string(&mut self) -> Result<Flow, RuntimeError> {
        let text = self.read_string()?;
        let value = self.allocate_string(text);
        self.push(value)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_nil(&mut self) -> Result<Flow, RuntimeError> {
        self.push(Value::Null)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_true(&mut self) -> Result<Flow, RuntimeError> {
        self.push(Value::Bool(true))?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_false(&mut self) -> Result<Flow, RuntimeError> {
        self.push(Value::Bool(false))?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_pop(&mut self) -> Result<Flow, RuntimeError> {
        self.pop()?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_print(&mut self) -> Result<Flow, RuntimeError> {
        let value = self.pop()?;
        let value = self.deref_read(value)?;
        let line = self.display_value(&value);
        self.print_line(line);
        Ok(Flow::Continue)
    }

    pub(crate) fn op_read_line(&mut self) -> Result<Flow, RuntimeError> {
        let mut line = String::new();
        std::io::stdin()
            .read_line(&mut line)
            .map_err(|e| self.runtime_error(format!("readLine failed: {e}")))?;
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        let value = self.allocate_string(line);
        self.push(value)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_throw(&mut self) -> Result<Flow, RuntimeError> {
        let value = self.pop()?;
        let rendered = self.display_value(&value);
        Err(self.runtime_error(format!("uncaught error: {rendered}")))
    }

    pub(crate) fn op_halt(&mut self) -> Result<Flow, RuntimeError> {
        Ok(Flow::Halt)
    }

    pub(crate) fn op_make_weak(&mut self) -> Result<Flow, RuntimeError> {
        let value = self.pop()?;
        let value = match value {
            Value::Obj(r) => Value::object_with(r.id, RefKind::Weak),
            other => other,
        };
        self.push(value)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_make_unowned(&mut self) -> Result<Flow, RuntimeError> {
        let value = self.pop()?;
        let value = match value {
            Value::Obj(r) => Value::object_with(r.id, RefKind::Unowned),
            other => other,
        };
        self.push(value)?;
        Ok(Flow::Continue)
    }

    // ---- globals ----

    pub(crate) fn op_define_global(&mut self) -> Result<Flow, RuntimeError> {
        let name = self.read_string()?;
        let value = self.pop()?;
        let old = self.globals.get(&name).copied().unwrap_or(Value::Null);
        self.publish(old, value);
        self.globals.insert(name, value);
        Ok(Flow::Continue)
    }

    pub(crate) fn op_get_global(&mut self) -> Result<Flow, RuntimeError> {
        let name = self.read_string()?;
        let Some(stored) = self.globals.get(&name).copied() else {
            return Err(self.runtime_error(format!("undefined variable '{name}'")));
        };
        let value = self.deref_read(stored)?;
        if value.is_null() && stored.is_object() {
            // auto-nil: normalize the durable cell once death is observed
            self.globals.insert(name, Value::Null);
        }
        self.push(value)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_set_global(&mut self) -> Result<Flow, RuntimeError> {
        let name = self.read_string()?;
        if !self.globals.contains_key(&name) {
            return Err(self.runtime_error(format!("undefined variable '{name}'")));
        }
        let value = self.peek(0)?;
        let old = self.globals.get(&name).copied().unwrap_or(Value::Null);
        self.publish(old, value);
        self.globals.insert(name, value);
        Ok(Flow::Continue)
    }

    // ---- locals ----

    pub(crate) fn op_get_local(&mut self) -> Result<Flow, RuntimeError> {
        let slot = self.read_short()? as usize;
        let idx = self.current_stack_base() + slot;
        if idx >= self.stack.len() {
            return Err(self.runtime_error("local slot out of range"));
        }
        let stored = self.stack[idx];
        let value = self.deref_read(stored)?;
        if value.is_null() && stored.is_object() {
            self.stack[idx] = Value::Null;
        }
        self.push(value)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_set_local(&mut self) -> Result<Flow, RuntimeError> {
        let slot = self.read_short()? as usize;
        let idx = self.current_stack_base() + slot;
        if idx >= self.stack.len() {
            return Err(self.runtime_error("local slot out of range"));
        }
        self.stack[idx] = self.peek(0)?;
        Ok(Flow::Continue)
    }

    // ---- upvalue access ----

    fn frame_upvalue(&self, index: usize) -> Result<ObjId, RuntimeError> {
        let closure = self
            .frames
            .last()
            .and_then(|f| f.closure)
            .ok_or_else(|| self.runtime_error("upvalue access outside a closure"))?;
        match self.heap.body(closure) {
            Some(ObjBody::Closure(c)) => c
                .upvalues
                .get(index)
                .copied()
                .ok_or_else(|| self.runtime_error("upvalue index out of range")),
            _ => Err(self.runtime_error("frame closure is not a closure object")),
        }
    }

    pub(crate) fn op_get_upvalue(&mut self) -> Result<Flow, RuntimeError> {
        let index = self.read_short()? as usize;
        let uv = self.frame_upvalue(index)?;
        let stored = match self.heap.body(uv) {
            Some(ObjBody::Upvalue(UpvalueState::Open(slot))) => self.stack[*slot],
            Some(ObjBody::Upvalue(UpvalueState::Closed(value))) => *value,
            _ => return Err(self.runtime_error("corrupt upvalue")),
        };
        let value = self.deref_read(stored)?;
        self.push(value)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_set_upvalue(&mut self) -> Result<Flow, RuntimeError> {
        let index = self.read_short()? as usize;
        let uv = self.frame_upvalue(index)?;
        let value = self.peek(0)?;
        let open_slot = match self.heap.body(uv) {
            Some(ObjBody::Upvalue(UpvalueState::Open(slot))) => Some(*slot),
            Some(ObjBody::Upvalue(UpvalueState::Closed(_))) => None,
            _ => return Err(self.runtime_error("corrupt upvalue")),
        };
        match open_slot {
            Some(slot) => self.stack[slot] = value,
            None => {
                if let Some(body) = self.heap.body_mut(uv) {
                    *body = ObjBody::Upvalue(UpvalueState::Closed(value));
                }
            }
        }
        Ok(Flow::Continue)
    }

    pub(crate) fn op_close_upvalue(&mut self) -> Result<Flow, RuntimeError> {
        if self.stack.is_empty() {
            return Err(self.runtime_error("stack underflow"));
        }
        self.close_upvalues(self.stack.len() - 1);
        self.pop()?;
        Ok(Flow::Continue)
    }
}

fn op_unknown(vm: &mut Vm) -> Result<Flow, RuntimeError> {
    Err(vm.runtime_error("unknown opcode"))
}

static HANDLERS: OnceLock<[Handler; 256]> = OnceLock::new();

/// The dispatch table, built once at first use.
pub(crate) fn handler_table() -> &'static [Handler; 256] {
    HANDLERS.get_or_init(|| {
        let mut table: [Handler; 256] = [op_unknown; 256];
        let mut set = |op: Opcode, handler: Handler| {
            table[u8::from(op) as usize] = handler;
        };

        set(Opcode::Constant, Vm::op_constant);
        set(Opcode::String, Vm::op_string);
        set(Opcode::Nil, Vm::op_nil);
        set(Opcode::True, Vm::op_true);
        set(Opcode::False, Vm::op_false);
        set(Opcode::Pop, Vm::op_pop);

        set(Opcode::Add, Vm::op_add);
        set(Opcode::Subtract, Vm::op_subtract);
        set(Opcode::Multiply, Vm::op_multiply);
        set(Opcode::Divide, Vm::op_divide);
        set(Opcode::Modulo, Vm::op_modulo);
        set(Opcode::Negate, Vm::op_negate);
        set(Opcode::BitwiseNot, Vm::op_bitwise_not);

        set(Opcode::Equal, Vm::op_equal);
        set(Opcode::NotEqual, Vm::op_not_equal);
        set(Opcode::Less, Vm::op_less);
        set(Opcode::Greater, Vm::op_greater);
        set(Opcode::LessEqual, Vm::op_less_equal);
        set(Opcode::GreaterEqual, Vm::op_greater_equal);

        set(Opcode::Not, Vm::op_not);
        set(Opcode::And, Vm::op_and);
        set(Opcode::Or, Vm::op_or);

        set(Opcode::GetGlobal, Vm::op_get_global);
        set(Opcode::SetGlobal, Vm::op_set_global);
        set(Opcode::DefineGlobal, Vm::op_define_global);
        set(Opcode::GetLocal, Vm::op_get_local);
        set(Opcode::SetLocal, Vm::op_set_local);
        set(Opcode::GetUpvalue, Vm::op_get_upvalue);
        set(Opcode::SetUpvalue, Vm::op_set_upvalue);
        set(Opcode::CloseUpvalue, Vm::op_close_upvalue);

        set(Opcode::Jump, Vm::op_jump);
        set(Opcode::JumpIfFalse, Vm::op_jump_if_false);
        set(Opcode::JumpIfNil, Vm::op_jump_if_nil);
        set(Opcode::Loop, Vm::op_loop);

        set(Opcode::Function, Vm::op_function);
        set(Opcode::Closure, Vm::op_closure);
        set(Opcode::Call, Vm::op_call);
        set(Opcode::CallNamed, Vm::op_call_named);
        set(Opcode::Return, Vm::op_return);

        set(Opcode::Class, Vm::op_class);
        set(Opcode::Struct, Vm::op_struct);
        set(Opcode::Enum, Vm::op_enum);
        set(Opcode::Protocol, Vm::op_protocol);
        set(Opcode::Method, Vm::op_method);
        set(Opcode::StaticMethod, Vm::op_static_method);
        set(Opcode::StructMethod, Vm::op_struct_method);
        set(Opcode::DefineProperty, Vm::op_define_property);
        set(Opcode::ComputedProperty, Vm::op_computed_property);
        set(Opcode::Inherit, Vm::op_inherit);
        set(Opcode::Super, Vm::op_super);
        set(Opcode::EnumCase, Vm::op_enum_case);
        set(Opcode::MatchEnumCase, Vm::op_match_enum_case);
        set(Opcode::GetAssociated, Vm::op_get_associated);

        set(Opcode::GetProperty, Vm::op_get_property);
        set(Opcode::SetProperty, Vm::op_set_property);
        set(Opcode::OptionalChain, Vm::op_optional_chain);

        set(Opcode::Array, Vm::op_array);
        set(Opcode::Dict, Vm::op_dict);
        set(Opcode::Tuple, Vm::op_tuple);
        set(Opcode::GetSubscript, Vm::op_get_subscript);
        set(Opcode::SetSubscript, Vm::op_set_subscript);

        set(Opcode::RangeInclusive, Vm::op_range_inclusive);
        set(Opcode::RangeExclusive, Vm::op_range_exclusive);

        set(Opcode::Unwrap, Vm::op_unwrap);
        set(Opcode::NilCoalesce, Vm::op_nil_coalesce);

        set(Opcode::CopyValue, Vm::op_copy_value);
        set(Opcode::MakeWeak, Vm::op_make_weak);
        set(Opcode::MakeUnowned, Vm::op_make_unowned);

        set(Opcode::Throw, Vm::op_throw);
        set(Opcode::Print, Vm::op_print);
        set(Opcode::ReadLine, Vm::op_read_line);
        set(Opcode::Halt, Vm::op_halt);

        table
    })
}
