//! Call convention and closure instantiation.
//!
//! Method prototypes carry `self` as parameter 0. For a bound-method call
//! the receiver is spliced into the stack window just above the callee
//! slot, so a frame's `stack_base` always points at parameter 0 and return
//! uniformly truncates to `stack_base - 1` before writing the result over
//! the callee.

use super::{CallFrame, Flow, MAX_FRAMES, Vm};
use crate::error::RuntimeError;
use crate::object::{
    ClosureObj, EnumCaseObj, FunctionObj, InstanceObj, ObjBody, ObjKind, StructInstanceObj,
};
use std::rc::Rc;
use swive_core::chunk::{Assembly, NO_LABEL};
use swive_core::value::{ObjId, Value};

impl Vm {
    pub(crate) fn op_function(&mut self) -> Result<Flow, RuntimeError> {
        let idx = self.read_short()? as usize;
        let proto = self
            .chunk
            .functions
            .get(idx)
            .cloned()
            .ok_or_else(|| self.runtime_error(format!("function index {idx} out of range")))?;
        let id = self.heap.allocate(ObjBody::Function(FunctionObj {
            name: proto.name,
            params: proto.params,
            param_labels: proto.param_labels,
            param_defaults: proto.param_defaults,
            chunk: proto.chunk,
            upvalues: proto.upvalues,
            is_initializer: proto.is_initializer,
            is_override: proto.is_override,
        }));
        self.push(Value::object(id))?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_closure(&mut self) -> Result<Flow, RuntimeError> {
        let idx = self.read_short()? as usize;
        let proto = self
            .chunk
            .functions
            .get(idx)
            .cloned()
            .ok_or_else(|| self.runtime_error(format!("function index {idx} out of range")))?;
        let upvalue_count = proto.upvalues.len();
        let function = self.heap.allocate(ObjBody::Function(FunctionObj {
            name: proto.name,
            params: proto.params,
            param_labels: proto.param_labels,
            param_defaults: proto.param_defaults,
            chunk: proto.chunk,
            upvalues: proto.upvalues,
            is_initializer: proto.is_initializer,
            is_override: proto.is_override,
        }));

        let base = self.current_stack_base();
        let mut upvalues = Vec::with_capacity(upvalue_count);
        for _ in 0..upvalue_count {
            let is_local = self.read_byte()? != 0;
            let index = self.read_byte()? as usize;
            if is_local {
                upvalues.push(self.capture_upvalue(base + index));
            } else {
                let closure = self
                    .frames
                    .last()
                    .and_then(|f| f.closure)
                    .ok_or_else(|| self.runtime_error("no enclosing closure for upvalue"))?;
                let forwarded = match self.heap.body(closure) {
                    Some(ObjBody::Closure(c)) => c.upvalues.get(index).copied(),
                    _ => None,
                };
                upvalues.push(
                    forwarded
                        .ok_or_else(|| self.runtime_error("enclosing upvalue index out of range"))?,
                );
            }
        }

        let id = self.heap.allocate(ObjBody::Closure(ClosureObj { function, upvalues }));
        self.push(Value::object(id))?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_call(&mut self) -> Result<Flow, RuntimeError> {
        let arg_count = self.read_short()?;
        self.call_value(arg_count as usize, None)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_call_named(&mut self) -> Result<Flow, RuntimeError> {
        let arg_count = self.read_short()? as usize;
        let mut labels: Vec<Option<String>> = vec![None; arg_count];
        for _ in 0..arg_count {
            let arg_index = self.read_short()? as usize;
            let label_idx = self.read_short()?;
            if label_idx != NO_LABEL {
                let label = self
                    .chunk
                    .strings
                    .get(label_idx as usize)
                    .cloned()
                    .ok_or_else(|| self.runtime_error("argument label index out of range"))?;
                if arg_index >= arg_count {
                    return Err(self.runtime_error("argument index out of range"));
                }
                labels[arg_index] = Some(label);
            }
        }
        self.call_value(arg_count, Some(labels))?;
        Ok(Flow::Continue)
    }

    /// Dispatches a call to whatever sits below the arguments. Returns
    /// true when a frame was pushed (the body runs in the main loop) and
    /// false when the call completed inline (builtins, plain construction).
    pub(crate) fn call_value(
        &mut self,
        arg_count: usize,
        labels: Option<Vec<Option<String>>>,
    ) -> Result<bool, RuntimeError> {
        if self.stack.len() < arg_count + 1 {
            return Err(self.runtime_error("stack underflow"));
        }
        let callee_index = self.stack.len() - arg_count - 1;
        let callee = self.stack[callee_index];
        let Some(r) = callee.as_obj() else {
            return Err(self.runtime_error(format!(
                "value of type {} is not callable",
                callee.type_name()
            )));
        };

        match self.heap.kind(r.id) {
            ObjKind::Function | ObjKind::Closure => {
                self.call_callable(callee_index, arg_count, labels, r.id, false, false)
            }
            ObjKind::BoundMethod => {
                let (receiver, method, is_mutating) = match self.heap.body(r.id) {
                    Some(ObjBody::BoundMethod(bm)) => (bm.receiver, bm.method, bm.is_mutating),
                    _ => return Err(self.runtime_error("corrupt bound method")),
                };
                let Some(method_ref) = method.as_obj() else {
                    return Err(self.runtime_error("bound method has no callable body"));
                };
                self.stack.insert(callee_index + 1, Value::object(receiver));
                self.call_callable(
                    callee_index,
                    arg_count + 1,
                    labels,
                    method_ref.id,
                    true,
                    is_mutating,
                )
            }
            ObjKind::Class => self.construct_class(callee_index, arg_count, labels, r.id),
            ObjKind::Struct => self.construct_struct(callee_index, arg_count, labels, r.id),
            ObjKind::EnumCase => self.construct_enum_case(callee_index, arg_count, r.id),
            ObjKind::BuiltinMethod => {
                let bm = match self.heap.body(r.id) {
                    Some(ObjBody::BuiltinMethod(bm)) => bm.clone(),
                    _ => return Err(self.runtime_error("corrupt builtin method")),
                };
                let args: Vec<Value> = self.stack[callee_index + 1..].to_vec();
                let result = self.dispatch_builtin_call(&bm, &args)?;
                self.stack.truncate(callee_index);
                self.push(result)?;
                Ok(false)
            }
            other => Err(self.runtime_error(format!(
                "{} object is not callable",
                crate::object::kind_name(other)
            ))),
        }
    }

    /// Common tail for function, closure, method and initializer calls:
    /// reorder named arguments, fill positional defaults, push the frame.
    fn call_callable(
        &mut self,
        callee_index: usize,
        arg_count: usize,
        labels: Option<Vec<Option<String>>>,
        callable: ObjId,
        has_receiver: bool,
        is_mutating: bool,
    ) -> Result<bool, RuntimeError> {
        let (function_id, closure) = match self.heap.kind(callable) {
            ObjKind::Closure => {
                let function = match self.heap.body(callable) {
                    Some(ObjBody::Closure(c)) => c.function,
                    _ => return Err(self.runtime_error("corrupt closure")),
                };
                (function, Some(callable))
            }
            ObjKind::Function => (callable, None),
            _ => return Err(self.runtime_error("callee must be a function or closure")),
        };

        let func = match self.heap.body(function_id) {
            Some(ObjBody::Function(f)) => f.clone(),
            _ => return Err(self.runtime_error("corrupt function object")),
        };
        let Some(chunk) = func.chunk.clone() else {
            return Err(self.runtime_error(format!("function '{}' has no body", func.name)));
        };

        let params_total = func.params.len();
        let mut args_total = arg_count;

        if let Some(labels) = labels {
            self.reorder_named_args(callee_index, has_receiver, &func, &labels)?;
            args_total = params_total;
        } else if args_total < params_total {
            // fill trailing positional defaults
            for i in args_total..params_total {
                let default = func.param_defaults.get(i).cloned().unwrap_or_default();
                if !default.has_default {
                    return Err(self.runtime_error(format!(
                        "missing argument '{}' in call to '{}'",
                        func.params[i], func.name
                    )));
                }
                let value = match &default.symbol {
                    Some(text) => self.allocate_string(text.clone()),
                    None => default.value,
                };
                self.push(value)?;
                args_total += 1;
            }
        }

        if args_total > params_total {
            return Err(self.runtime_error(format!(
                "too many arguments in call to '{}': expected {}, got {}",
                func.name,
                params_total.saturating_sub(has_receiver as usize),
                args_total - has_receiver as usize
            )));
        }

        self.push_frame(
            callee_index,
            chunk,
            func.name,
            closure,
            func.is_initializer,
            is_mutating,
        )
    }

    fn push_frame(
        &mut self,
        callee_index: usize,
        chunk: Rc<Assembly>,
        name: String,
        closure: Option<ObjId>,
        is_initializer: bool,
        is_mutating: bool,
    ) -> Result<bool, RuntimeError> {
        if self.frames.len() >= MAX_FRAMES {
            return Err(self.runtime_error("stack overflow"));
        }
        let frame = CallFrame {
            stack_base: callee_index + 1,
            return_ip: self.ip,
            caller_chunk: Rc::clone(&self.chunk),
            function_name: name,
            closure,
            is_initializer,
            is_mutating,
            receiver_index: callee_index + 1,
        };
        self.chunk = chunk;
        self.ip = 0;
        self.frames.push(frame);
        Ok(true)
    }

    /// Rewrites the argument window into positional order. Labeled
    /// arguments must follow all positional ones; unassigned parameters
    /// take their defaults immediately, so gaps in the middle are legal.
    fn reorder_named_args(
        &mut self,
        callee_index: usize,
        has_receiver: bool,
        func: &FunctionObj,
        labels: &[Option<String>],
    ) -> Result<(), RuntimeError> {
        let first_param = has_receiver as usize;
        let window_start = callee_index + 1 + first_param;
        let old_args: Vec<Value> = self.stack[window_start..].to_vec();
        let slot_count = func.params.len() - first_param;
        let mut slots: Vec<Option<Value>> = vec![None; slot_count];

        let mut saw_label = false;
        let mut next_positional = 0usize;
        for (j, label) in labels.iter().enumerate() {
            let value = old_args[j];
            match label {
                None => {
                    if saw_label {
                        return Err(
                            self.runtime_error("positional argument after named argument")
                        );
                    }
                    if next_positional >= slot_count {
                        return Err(self.runtime_error(format!(
                            "too many arguments in call to '{}'",
                            func.name
                        )));
                    }
                    slots[next_positional] = Some(value);
                    next_positional += 1;
                }
                Some(name) => {
                    saw_label = true;
                    let param = (first_param..func.params.len())
                        .find(|&p| func.param_labels.get(p).map(String::as_str) == Some(name.as_str()))
                        .ok_or_else(|| {
                            self.runtime_error(format!(
                                "no parameter named '{name}' in call to '{}'",
                                func.name
                            ))
                        })?;
                    let slot = param - first_param;
                    if slots[slot].is_some() {
                        return Err(self.runtime_error(format!(
                            "duplicate argument for parameter '{name}'"
                        )));
                    }
                    slots[slot] = Some(value);
                }
            }
        }

        let mut resolved = Vec::with_capacity(slot_count);
        for (i, slot) in slots.into_iter().enumerate() {
            let param = first_param + i;
            match slot {
                Some(v) => resolved.push(v),
                None => {
                    let default = func.param_defaults.get(param).cloned().unwrap_or_default();
                    if !default.has_default {
                        return Err(self.runtime_error(format!(
                            "missing argument '{}' in call to '{}'",
                            func.params[param], func.name
                        )));
                    }
                    let value = match &default.symbol {
                        Some(text) => self.allocate_string(text.clone()),
                        None => default.value,
                    };
                    resolved.push(value);
                }
            }
        }

        self.stack.truncate(window_start);
        for v in resolved {
            self.push(v)?;
        }
        Ok(())
    }

    // ---- type construction ----

    fn construct_class(
        &mut self,
        callee_index: usize,
        arg_count: usize,
        labels: Option<Vec<Option<String>>>,
        class_id: ObjId,
    ) -> Result<bool, RuntimeError> {
        let fields = self.initial_fields(class_id)?;
        let instance = self.heap.allocate(ObjBody::Instance(InstanceObj {
            class: class_id,
            fields,
        }));

        if let Some(init) = self.find_method_on_class(class_id, "init") {
            let Some(init_ref) = init.as_obj() else {
                return Err(self.runtime_error("corrupt initializer"));
            };
            self.stack.insert(callee_index + 1, Value::object(instance));
            return self.call_callable(
                callee_index,
                arg_count + 1,
                labels,
                init_ref.id,
                true,
                false,
            );
        }

        if arg_count > 0 {
            let name = self.type_name_of(class_id);
            return Err(self.runtime_error(format!(
                "type '{name}' has no initializer taking {arg_count} argument(s)"
            )));
        }
        self.stack.truncate(callee_index);
        self.push(Value::object(instance))?;
        Ok(false)
    }

    fn construct_struct(
        &mut self,
        callee_index: usize,
        arg_count: usize,
        labels: Option<Vec<Option<String>>>,
        struct_id: ObjId,
    ) -> Result<bool, RuntimeError> {
        let fields = self.initial_struct_fields(struct_id)?;
        let instance = self.heap.allocate(ObjBody::StructInstance(StructInstanceObj {
            struct_type: struct_id,
            fields,
        }));

        let init = match self.heap.body(struct_id) {
            Some(ObjBody::Struct(st)) => st.methods.get("init").copied(),
            _ => None,
        };
        if let Some(init) = init {
            let Some(init_ref) = init.as_obj() else {
                return Err(self.runtime_error("corrupt initializer"));
            };
            self.stack.insert(callee_index + 1, Value::object(instance));
            return self.call_callable(
                callee_index,
                arg_count + 1,
                labels,
                init_ref.id,
                true,
                false,
            );
        }

        // memberwise initialization in property declaration order
        if arg_count > 0 {
            let property_names: Vec<String> = match self.heap.body(struct_id) {
                Some(ObjBody::Struct(st)) => {
                    st.properties.iter().map(|p| p.name.clone()).collect()
                }
                _ => Vec::new(),
            };
            if arg_count != property_names.len() {
                let name = self.type_name_of(struct_id);
                return Err(self.runtime_error(format!(
                    "memberwise initializer for '{name}' expects {} argument(s), got {arg_count}",
                    property_names.len()
                )));
            }
            let args: Vec<Value> = self.stack[callee_index + 1..].to_vec();
            for (i, value) in args.iter().enumerate() {
                // labeled memberwise arguments must match the property name
                if let Some(Some(label)) = labels.as_ref().map(|l| &l[i]) {
                    if *label != property_names[i] {
                        return Err(self.runtime_error(format!(
                            "memberwise initializer expects label '{}', got '{label}'",
                            property_names[i]
                        )));
                    }
                }
                let old = match self.heap.body(instance) {
                    Some(ObjBody::StructInstance(inst)) => inst
                        .fields
                        .get(&property_names[i])
                        .copied()
                        .unwrap_or(Value::Null),
                    _ => Value::Null,
                };
                self.publish(old, *value);
                if let Some(ObjBody::StructInstance(inst)) = self.heap.body_mut(instance) {
                    inst.fields.insert(property_names[i].clone(), *value);
                }
            }
        }

        self.stack.truncate(callee_index);
        self.push(Value::object(instance))?;
        Ok(false)
    }

    /// Calling a registered case template builds a fresh case carrying the
    /// arguments as associated values.
    fn construct_enum_case(
        &mut self,
        callee_index: usize,
        arg_count: usize,
        template_id: ObjId,
    ) -> Result<bool, RuntimeError> {
        let template = match self.heap.body(template_id) {
            Some(ObjBody::EnumCase(c)) => c.clone(),
            _ => return Err(self.runtime_error("corrupt enum case")),
        };
        let args: Vec<Value> = self.stack[callee_index + 1..].to_vec();
        if args.len() != template.labels.len() {
            return Err(self.runtime_error(format!(
                "enum case '{}' expects {} associated value(s), got {}",
                template.case_name,
                template.labels.len(),
                args.len()
            )));
        }
        let id = self.heap.allocate(ObjBody::EnumCase(EnumCaseObj {
            enum_type: template.enum_type,
            case_name: template.case_name,
            raw_value: template.raw_value,
            associated: args.clone(),
            labels: template.labels,
        }));
        for v in &args {
            self.publish(Value::Null, *v);
        }
        self.stack.truncate(callee_index);
        self.push(Value::object(id))?;
        Ok(false)
    }

    fn initial_fields(
        &mut self,
        class_id: ObjId,
    ) -> Result<std::collections::HashMap<String, Value>, RuntimeError> {
        // base-first so derived declarations override inherited defaults
        let mut chain = self.class_chain(class_id);
        chain.reverse();
        let mut fields = std::collections::HashMap::new();
        for id in chain {
            let props: Vec<(String, Value, bool)> = match self.heap.body(id) {
                Some(ObjBody::Class(c)) => c
                    .properties
                    .iter()
                    .map(|p| (p.name.clone(), p.default_value, p.is_lazy))
                    .collect(),
                _ => Vec::new(),
            };
            for (name, default, is_lazy) in props {
                let value = if is_lazy {
                    Value::Undefined
                } else {
                    let v = self.instantiate_default(default);
                    self.publish(Value::Null, v);
                    v
                };
                fields.insert(name, value);
            }
        }
        Ok(fields)
    }

    fn initial_struct_fields(
        &mut self,
        struct_id: ObjId,
    ) -> Result<std::collections::HashMap<String, Value>, RuntimeError> {
        let props: Vec<(String, Value, bool)> = match self.heap.body(struct_id) {
            Some(ObjBody::Struct(st)) => st
                .properties
                .iter()
                .map(|p| (p.name.clone(), p.default_value, p.is_lazy))
                .collect(),
            _ => Vec::new(),
        };
        let mut fields = std::collections::HashMap::new();
        for (name, default, is_lazy) in props {
            let value = if is_lazy {
                Value::Undefined
            } else {
                let v = self.instantiate_default(default);
                self.publish(Value::Null, v);
                v
            };
            fields.insert(name, value);
        }
        Ok(fields)
    }

    pub(crate) fn type_name_of(&self, id: ObjId) -> String {
        match self.heap.body(id) {
            Some(ObjBody::Class(c)) => c.name.clone(),
            Some(ObjBody::Struct(s)) => s.name.clone(),
            Some(ObjBody::Enum(e)) => e.name.clone(),
            Some(ObjBody::Protocol(p)) => p.name.clone(),
            _ => "<anonymous>".to_string(),
        }
    }

    // ---- return ----

    pub(crate) fn op_return(&mut self) -> Result<Flow, RuntimeError> {
        let Some(frame) = self.frames.pop() else {
            return Err(self.runtime_error("return outside of a function"));
        };
        let mut result = self.pop()?;
        if frame.is_initializer {
            // initializers return the receiver regardless of the body
            result = self.stack[frame.stack_base];
        }
        self.close_upvalues(frame.stack_base);
        self.stack.truncate(frame.stack_base - 1);
        self.push(result)?;
        self.chunk = frame.caller_chunk;
        self.ip = frame.return_ip;
        Ok(Flow::Return)
    }

    // ---- synchronous nested calls (observers, deinit, computed) ----

    /// Calls a function value with already-materialized arguments and runs
    /// it to completion inside the current instruction's expansion.
    pub(crate) fn call_function_sync(
        &mut self,
        callee: Value,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let floor = self.frames.len();
        self.push(callee)?;
        for a in args {
            self.push(*a)?;
        }
        let pushed = self.call_value(args.len(), None)?;
        if pushed {
            self.run_loop(Some(floor))?;
        }
        self.pop()
    }

    /// Calls a method value with an explicit receiver: `(self, args...)`.
    pub(crate) fn call_method_sync(
        &mut self,
        method: Value,
        receiver: Value,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let floor = self.frames.len();
        self.push(method)?;
        self.push(receiver)?;
        for a in args {
            self.push(*a)?;
        }
        let callee_index = self.stack.len() - args.len() - 2;
        let Some(r) = method.as_obj() else {
            return Err(self.runtime_error("method value is not callable"));
        };
        let pushed = self.call_callable(callee_index, args.len() + 1, None, r.id, true, false)?;
        if pushed {
            self.run_loop(Some(floor))?;
        }
        self.pop()
    }
}
