//! Arithmetic, comparison, control transfer, collections and optionals.

use super::{Flow, Vm};
use crate::error::RuntimeError;
use crate::object::{ObjBody, ObjKind, RangeObj, TupleObj};
use std::collections::HashMap;
use swive_core::chunk::NO_LABEL;
use swive_core::value::{RefKind, Value};

impl Vm {
    // ---- arithmetic ----

    pub(crate) fn op_add(&mut self) -> Result<Flow, RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;

        // string concatenation, stringifying the other operand
        let a_is_str = self.obj_kind(&a) == Some(ObjKind::String);
        let b_is_str = self.obj_kind(&b) == Some(ObjKind::String);
        if a_is_str || b_is_str {
            let text = format!("{}{}", self.display_value(&a), self.display_value(&b));
            let value = self.allocate_string(text);
            self.push(value)?;
            return Ok(Flow::Continue);
        }

        // user-defined `plus` on class instances
        if self.obj_kind(&a) == Some(ObjKind::Instance) {
            if let Some(result) = self.try_operator_overload(&a, &b, "plus")? {
                self.push(result)?;
                return Ok(Flow::Continue);
            }
        }

        let value = self.numeric_binary(a, b, "+", |x, y| x.checked_add(y), |x, y| x + y)?;
        self.push(value)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_subtract(&mut self) -> Result<Flow, RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let value = self.numeric_binary(a, b, "-", |x, y| x.checked_sub(y), |x, y| x - y)?;
        self.push(value)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_multiply(&mut self) -> Result<Flow, RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let value = self.numeric_binary(a, b, "*", |x, y| x.checked_mul(y), |x, y| x * y)?;
        self.push(value)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_divide(&mut self) -> Result<Flow, RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        if let (Value::Int(_), Value::Int(0)) = (&a, &b) {
            return Err(self.runtime_error("division by zero"));
        }
        let value = self.numeric_binary(a, b, "/", |x, y| x.checked_div(y), |x, y| x / y)?;
        self.push(value)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_modulo(&mut self) -> Result<Flow, RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        if let (Value::Int(_), Value::Int(0)) = (&a, &b) {
            return Err(self.runtime_error("division by zero"));
        }
        let value = self.numeric_binary(a, b, "%", |x, y| x.checked_rem(y), |x, y| x % y)?;
        self.push(value)?;
        Ok(Flow::Continue)
    }

    fn numeric_binary(
        &mut self,
        a: Value,
        b: Value,
        op: &str,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<Value, RuntimeError> {
        match (a, b) {
            (Value::Int(x), Value::Int(y)) => int_op(x, y)
                .map(Value::Int)
                .ok_or_else(|| self.runtime_error(format!("integer overflow in '{op}'"))),
            _ => {
                let (Some(x), Some(y)) = (a.as_float(), b.as_float()) else {
                    return Err(self.runtime_error(format!(
                        "operands of '{op}' must be numbers, got {} and {}",
                        a.type_name(),
                        b.type_name()
                    )));
                };
                Ok(Value::Float(float_op(x, y)))
            }
        }
    }

    fn try_operator_overload(
        &mut self,
        left: &Value,
        right: &Value,
        name: &str,
    ) -> Result<Option<Value>, RuntimeError> {
        let Some(r) = left.as_obj() else {
            return Ok(None);
        };
        let class = match self.heap.body(r.id) {
            Some(ObjBody::Instance(inst)) => inst.class,
            _ => return Ok(None),
        };
        let Some(method) = self.find_method_on_class(class, name) else {
            return Ok(None);
        };
        let result = self.call_method_sync(method, *left, &[*right])?;
        Ok(Some(result))
    }

    pub(crate) fn op_negate(&mut self) -> Result<Flow, RuntimeError> {
        let v = self.pop()?;
        let value = match v {
            Value::Int(i) => Value::Int(-i),
            Value::Float(f) => Value::Float(-f),
            other => {
                return Err(self.runtime_error(format!(
                    "operand of unary '-' must be a number, got {}",
                    other.type_name()
                )));
            }
        };
        self.push(value)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_bitwise_not(&mut self) -> Result<Flow, RuntimeError> {
        let v = self.pop()?;
        let Value::Int(i) = v else {
            return Err(self.runtime_error(format!(
                "operand of '~' must be an integer, got {}",
                v.type_name()
            )));
        };
        self.push(Value::Int(!i))?;
        Ok(Flow::Continue)
    }

    // ---- comparison ----

    pub(crate) fn op_equal(&mut self) -> Result<Flow, RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let a = self.deref_read(a)?;
        let b = self.deref_read(b)?;
        let eq = self.values_equal(&a, &b);
        self.push(Value::Bool(eq))?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_not_equal(&mut self) -> Result<Flow, RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let a = self.deref_read(a)?;
        let b = self.deref_read(b)?;
        let eq = self.values_equal(&a, &b);
        self.push(Value::Bool(!eq))?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_less(&mut self) -> Result<Flow, RuntimeError> {
        self.ordered_compare(|o| o == std::cmp::Ordering::Less)
    }

    pub(crate) fn op_greater(&mut self) -> Result<Flow, RuntimeError> {
        self.ordered_compare(|o| o == std::cmp::Ordering::Greater)
    }

    pub(crate) fn op_less_equal(&mut self) -> Result<Flow, RuntimeError> {
        self.ordered_compare(|o| o != std::cmp::Ordering::Greater)
    }

    pub(crate) fn op_greater_equal(&mut self) -> Result<Flow, RuntimeError> {
        self.ordered_compare(|o| o != std::cmp::Ordering::Less)
    }

    /// Ordered comparison: numbers compare by promotion, strings compare
    /// lexicographically; anything else is an error.
    fn ordered_compare(
        &mut self,
        accept: fn(std::cmp::Ordering) -> bool,
    ) -> Result<Flow, RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;

        let ordering = if a.is_number() && b.is_number() {
            let (x, y) = (a.as_float().unwrap_or(0.0), b.as_float().unwrap_or(0.0));
            x.partial_cmp(&y)
                .ok_or_else(|| self.runtime_error("comparison with NaN is undefined"))?
        } else if let (Some(s1), Some(s2)) = (self.string_content(&a), self.string_content(&b)) {
            s1.cmp(&s2)
        } else {
            return Err(self.runtime_error(format!(
                "cannot order values of type {} and {}",
                a.type_name(),
                b.type_name()
            )));
        };

        self.push(Value::Bool(accept(ordering)))?;
        Ok(Flow::Continue)
    }

    // ---- logic ----

    pub(crate) fn op_not(&mut self) -> Result<Flow, RuntimeError> {
        let v = self.pop()?;
        let truthy = self.is_truthy(&v);
        self.push(Value::Bool(!truthy))?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_and(&mut self) -> Result<Flow, RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = self.is_truthy(&a) && self.is_truthy(&b);
        self.push(Value::Bool(result))?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_or(&mut self) -> Result<Flow, RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = self.is_truthy(&a) || self.is_truthy(&b);
        self.push(Value::Bool(result))?;
        Ok(Flow::Continue)
    }

    // ---- control transfer ----

    pub(crate) fn op_jump(&mut self) -> Result<Flow, RuntimeError> {
        let offset = self.read_short()? as usize;
        self.ip += offset;
        Ok(Flow::Continue)
    }

    /// Peeks the condition; the compiler pops it explicitly on both paths.
    pub(crate) fn op_jump_if_false(&mut self) -> Result<Flow, RuntimeError> {
        let offset = self.read_short()? as usize;
        let condition = self.peek(0)?;
        if !self.is_truthy(&condition) {
            self.ip += offset;
        }
        Ok(Flow::Continue)
    }

    /// Pops and jumps when the top is nil; keeps the value and falls
    /// through otherwise; `if let` binds the kept value as its local.
    pub(crate) fn op_jump_if_nil(&mut self) -> Result<Flow, RuntimeError> {
        let offset = self.read_short()? as usize;
        let top = self.peek(0)?;
        let top = self.deref_read(top)?;
        if top.is_null() {
            self.pop()?;
            self.ip += offset;
        }
        Ok(Flow::Continue)
    }

    pub(crate) fn op_loop(&mut self) -> Result<Flow, RuntimeError> {
        let offset = self.read_short()? as usize;
        self.ip -= offset;
        Ok(Flow::Continue)
    }

    // ---- collections ----

    pub(crate) fn op_array(&mut self) -> Result<Flow, RuntimeError> {
        let count = self.read_short()? as usize;
        if self.stack.len() < count {
            return Err(self.runtime_error("stack underflow"));
        }
        let elements: Vec<Value> = self.stack.split_off(self.stack.len() - count);
        let id = self.heap.allocate(ObjBody::List(elements.clone()));
        for v in &elements {
            self.publish(Value::Null, *v);
        }
        self.push(Value::object(id))?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_dict(&mut self) -> Result<Flow, RuntimeError> {
        let count = self.read_short()? as usize;
        if self.stack.len() < count * 2 {
            return Err(self.runtime_error("stack underflow"));
        }
        let flat: Vec<Value> = self.stack.split_off(self.stack.len() - count * 2);
        let mut entries: HashMap<String, Value> = HashMap::new();
        for pair in flat.chunks(2) {
            let Some(key) = self.string_content(&pair[0]) else {
                return Err(self.runtime_error("dictionary keys must be strings"));
            };
            let value = pair[1];
            let old = entries.insert(key, value).unwrap_or(Value::Null);
            self.publish(old, value);
        }
        let id = self.heap.allocate(ObjBody::Map(entries));
        self.push(Value::object(id))?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_tuple(&mut self) -> Result<Flow, RuntimeError> {
        let count = self.read_short()? as usize;
        let mut labels = Vec::with_capacity(count);
        for _ in 0..count {
            let idx = self.read_short()?;
            if idx == NO_LABEL {
                labels.push(None);
            } else {
                let label = self
                    .chunk
                    .strings
                    .get(idx as usize)
                    .cloned()
                    .ok_or_else(|| self.runtime_error("tuple label index out of range"))?;
                labels.push(Some(label));
            }
        }
        if self.stack.len() < count {
            return Err(self.runtime_error("stack underflow"));
        }
        let elements: Vec<Value> = self.stack.split_off(self.stack.len() - count);
        let id = self.heap.allocate(ObjBody::Tuple(TupleObj {
            elements: elements.clone(),
            labels,
        }));
        for v in &elements {
            self.publish(Value::Null, *v);
        }
        self.push(Value::object(id))?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_get_subscript(&mut self) -> Result<Flow, RuntimeError> {
        let index = self.pop()?;
        let target = self.pop()?;
        let target = self.deref_read(target)?;
        let Some(r) = target.as_obj() else {
            return Err(self.runtime_error(format!(
                "value of type {} is not subscriptable",
                target.type_name()
            )));
        };

        // string subscripts allocate, so that case resolves first
        if self.heap.kind(r.id) == ObjKind::String {
            let chars: Vec<char> = match self.heap.body(r.id) {
                Some(ObjBody::Str(s)) => s.chars().collect(),
                _ => Vec::new(),
            };
            let i = self.subscript_index(&index, chars.len())?;
            let ch = chars[i].to_string();
            let value = self.allocate_string(ch);
            self.push(value)?;
            return Ok(Flow::Continue);
        }

        let result = match self.heap.body(r.id) {
            Some(ObjBody::List(items)) => {
                let i = self.subscript_index(&index, items.len())?;
                items[i]
            }
            Some(ObjBody::Map(entries)) => {
                let Some(key) = self.string_content(&index) else {
                    return Err(self.runtime_error("dictionary keys must be strings"));
                };
                entries.get(&key).copied().unwrap_or(Value::Null)
            }
            Some(ObjBody::Tuple(tuple)) => {
                let Some(i) = index.as_int() else {
                    return Err(self.runtime_error("tuple index must be an integer"));
                };
                tuple
                    .get_by_index(i as usize)
                    .ok_or_else(|| self.runtime_error("tuple index out of range"))?
            }
            Some(ObjBody::Range(range)) => {
                let Some(i) = index.as_int() else {
                    return Err(self.runtime_error("range index must be an integer"));
                };
                if i < 0 || i >= range.count() {
                    return Err(self.runtime_error("range index out of range"));
                }
                Value::Int(range.start + i)
            }
            _ => {
                return Err(self.runtime_error(format!(
                    "value of type {} is not subscriptable",
                    target.type_name()
                )));
            }
        };
        self.push(result)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_set_subscript(&mut self) -> Result<Flow, RuntimeError> {
        let value = self.pop()?;
        let index = self.pop()?;
        let target = self.pop()?;
        let target = self.deref_read(target)?;
        let Some(r) = target.as_obj() else {
            return Err(self.runtime_error(format!(
                "value of type {} is not subscriptable",
                target.type_name()
            )));
        };

        match self.heap.kind(r.id) {
            ObjKind::List => {
                let len = match self.heap.body(r.id) {
                    Some(ObjBody::List(items)) => items.len(),
                    _ => 0,
                };
                let i = self.subscript_index(&index, len)?;
                let old = match self.heap.body(r.id) {
                    Some(ObjBody::List(items)) => items[i],
                    _ => Value::Null,
                };
                self.publish(old, value);
                if let Some(ObjBody::List(items)) = self.heap.body_mut(r.id) {
                    items[i] = value;
                }
            }
            ObjKind::Map => {
                let Some(key) = self.string_content(&index) else {
                    return Err(self.runtime_error("dictionary keys must be strings"));
                };
                let old = match self.heap.body(r.id) {
                    Some(ObjBody::Map(entries)) => {
                        entries.get(&key).copied().unwrap_or(Value::Null)
                    }
                    _ => Value::Null,
                };
                self.publish(old, value);
                if let Some(ObjBody::Map(entries)) = self.heap.body_mut(r.id) {
                    entries.insert(key, value);
                }
                self.heap.recharge(r.id);
            }
            other => {
                return Err(self.runtime_error(format!(
                    "cannot assign through subscript on {}",
                    crate::object::kind_name(other)
                )));
            }
        }
        self.push(value)?;
        Ok(Flow::Continue)
    }

    fn subscript_index(&self, index: &Value, len: usize) -> Result<usize, RuntimeError> {
        let Some(i) = index.as_int() else {
            return Err(self.runtime_error("index must be an integer"));
        };
        if i < 0 || i as usize >= len {
            return Err(self.runtime_error(format!("index {i} out of range (count {len})")));
        }
        Ok(i as usize)
    }

    // ---- ranges ----

    pub(crate) fn op_range_inclusive(&mut self) -> Result<Flow, RuntimeError> {
        self.build_range(true)
    }

    pub(crate) fn op_range_exclusive(&mut self) -> Result<Flow, RuntimeError> {
        self.build_range(false)
    }

    fn build_range(&mut self, inclusive: bool) -> Result<Flow, RuntimeError> {
        let end = self.pop()?;
        let start = self.pop()?;
        let (Some(start), Some(end)) = (start.as_int(), end.as_int()) else {
            return Err(self.runtime_error("range bounds must be integers"));
        };
        let id = self.heap.allocate(ObjBody::Range(RangeObj {
            start,
            end,
            inclusive,
        }));
        self.push(Value::object(id))?;
        Ok(Flow::Continue)
    }

    // ---- optionals ----

    pub(crate) fn op_unwrap(&mut self) -> Result<Flow, RuntimeError> {
        let v = self.pop()?;
        let v = self.deref_read(v)?;
        if v.is_null() {
            return Err(
                self.runtime_error("unexpectedly found nil while unwrapping an Optional value")
            );
        }
        self.push(v)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_nil_coalesce(&mut self) -> Result<Flow, RuntimeError> {
        let fallback = self.pop()?;
        let v = self.pop()?;
        let v = self.deref_read(v)?;
        self.push(if v.is_null() { fallback } else { v })?;
        Ok(Flow::Continue)
    }

    // ---- struct value semantics ----

    pub(crate) fn op_copy_value(&mut self) -> Result<Flow, RuntimeError> {
        let v = self.pop()?;
        let copied = match v {
            Value::Obj(r)
                if r.kind == RefKind::Strong
                    && self.heap.kind(r.id) == ObjKind::StructInstance =>
            {
                Value::object(self.deep_copy_struct(r.id))
            }
            other => other,
        };
        self.push(copied)?;
        Ok(Flow::Continue)
    }
}
