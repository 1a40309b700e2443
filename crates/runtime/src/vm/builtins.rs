//! Built-in members on lists, strings, maps, ranges and tuples, plus the
//! seeded conversion globals (`String`, `Int`, `Float`).
//!
//! Value-like members answer directly; callable members produce a
//! builtin-method object that the call path dispatches by name.

use super::Vm;
use crate::error::RuntimeError;
use crate::object::{BuiltinMethodObj, ObjBody, ObjKind};
use swive_core::value::{ObjId, Value};

/// Names callable on a list value.
const LIST_METHODS: &[&str] = &["append", "removeLast", "contains"];
/// Names callable on a string value.
const STRING_METHODS: &[&str] = &[
    "uppercased",
    "lowercased",
    "hasPrefix",
    "hasSuffix",
    "contains",
];
/// Names callable on a range value.
const RANGE_METHODS: &[&str] = &["contains"];

pub(crate) fn install_builtin_globals(vm: &mut Vm) {
    for name in ["String", "Int", "Float"] {
        let id = vm.heap.allocate(ObjBody::BuiltinMethod(BuiltinMethodObj {
            target: None,
            name: name.to_string(),
        }));
        let value = Value::object(id);
        vm.publish(Value::Null, value);
        vm.globals.insert(name.to_string(), value);
    }
}

impl Vm {
    /// Member access on built-in object kinds.
    pub(crate) fn builtin_member(
        &mut self,
        receiver: Value,
        id: ObjId,
        name: &str,
    ) -> Result<Value, RuntimeError> {
        let _ = receiver;
        match self.heap.kind(id) {
            ObjKind::List => {
                let items = match self.heap.body(id) {
                    Some(ObjBody::List(items)) => items.clone(),
                    _ => Vec::new(),
                };
                match name {
                    "count" => Ok(Value::Int(items.len() as i64)),
                    "isEmpty" => Ok(Value::Bool(items.is_empty())),
                    "first" => Ok(items.first().copied().unwrap_or(Value::Null)),
                    "last" => Ok(items.last().copied().unwrap_or(Value::Null)),
                    _ if LIST_METHODS.contains(&name) => Ok(self.builtin_method(id, name)),
                    _ => Err(self.runtime_error(format!("list has no member '{name}'"))),
                }
            }
            ObjKind::String => {
                let text = match self.heap.body(id) {
                    Some(ObjBody::Str(s)) => s.clone(),
                    _ => String::new(),
                };
                match name {
                    "count" => Ok(Value::Int(text.chars().count() as i64)),
                    "isEmpty" => Ok(Value::Bool(text.is_empty())),
                    _ if STRING_METHODS.contains(&name) => Ok(self.builtin_method(id, name)),
                    _ => Err(self.runtime_error(format!("string has no member '{name}'"))),
                }
            }
            ObjKind::Map => {
                let entries = match self.heap.body(id) {
                    Some(ObjBody::Map(entries)) => entries.clone(),
                    _ => Default::default(),
                };
                match name {
                    "count" => Ok(Value::Int(entries.len() as i64)),
                    "isEmpty" => Ok(Value::Bool(entries.is_empty())),
                    "keys" => {
                        let mut keys: Vec<String> = entries.keys().cloned().collect();
                        keys.sort();
                        let values: Vec<Value> =
                            keys.into_iter().map(|k| self.allocate_string(k)).collect();
                        let list = self.heap.allocate(ObjBody::List(values.clone()));
                        for v in &values {
                            self.publish(Value::Null, *v);
                        }
                        Ok(Value::object(list))
                    }
                    "values" => {
                        let mut keys: Vec<String> = entries.keys().cloned().collect();
                        keys.sort();
                        let values: Vec<Value> = keys.iter().map(|k| entries[k]).collect();
                        let list = self.heap.allocate(ObjBody::List(values.clone()));
                        for v in &values {
                            self.publish(Value::Null, *v);
                        }
                        Ok(Value::object(list))
                    }
                    _ => Err(self.runtime_error(format!("dictionary has no member '{name}'"))),
                }
            }
            ObjKind::Range => {
                let range = match self.heap.body(id) {
                    Some(ObjBody::Range(r)) => *r,
                    _ => return Err(self.runtime_error("corrupt range")),
                };
                match name {
                    "lowerBound" => Ok(Value::Int(range.start)),
                    "upperBound" => Ok(Value::Int(range.end)),
                    "count" => Ok(Value::Int(range.count())),
                    "isEmpty" => Ok(Value::Bool(range.count() == 0)),
                    _ if RANGE_METHODS.contains(&name) => Ok(self.builtin_method(id, name)),
                    _ => Err(self.runtime_error(format!("range has no member '{name}'"))),
                }
            }
            ObjKind::Tuple => {
                let tuple = match self.heap.body(id) {
                    Some(ObjBody::Tuple(t)) => t.clone(),
                    _ => return Err(self.runtime_error("corrupt tuple")),
                };
                if let Ok(index) = name.parse::<usize>() {
                    return tuple
                        .get_by_index(index)
                        .ok_or_else(|| self.runtime_error("tuple index out of range"));
                }
                tuple
                    .get_by_label(name)
                    .ok_or_else(|| self.runtime_error(format!("tuple has no element '{name}'")))
            }
            other => Err(self.runtime_error(format!(
                "{} object has no member '{name}'",
                crate::object::kind_name(other)
            ))),
        }
    }

    fn builtin_method(&mut self, target: ObjId, name: &str) -> Value {
        let id = self.heap.allocate(ObjBody::BuiltinMethod(BuiltinMethodObj {
            target: Some(target),
            name: name.to_string(),
        }));
        Value::object(id)
    }

    pub(crate) fn dispatch_builtin_call(
        &mut self,
        builtin: &BuiltinMethodObj,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let Some(target) = builtin.target else {
            return self.conversion_call(&builtin.name, args);
        };

        match (self.heap.kind(target), builtin.name.as_str()) {
            (ObjKind::List, "append") => {
                let [value] = args else {
                    return Err(self.runtime_error("append expects one argument"));
                };
                self.publish(Value::Null, *value);
                if let Some(ObjBody::List(items)) = self.heap.body_mut(target) {
                    items.push(*value);
                }
                self.heap.recharge(target);
                Ok(Value::Null)
            }
            (ObjKind::List, "removeLast") => {
                if !args.is_empty() {
                    return Err(self.runtime_error("removeLast expects no arguments"));
                }
                let removed = match self.heap.body_mut(target) {
                    Some(ObjBody::List(items)) => items.pop(),
                    _ => None,
                };
                // ownership transfers to the caller's stack
                removed.ok_or_else(|| self.runtime_error("removeLast on an empty list"))
            }
            (ObjKind::List, "contains") => {
                let [value] = args else {
                    return Err(self.runtime_error("contains expects one argument"));
                };
                let items = match self.heap.body(target) {
                    Some(ObjBody::List(items)) => items.clone(),
                    _ => Vec::new(),
                };
                let found = items.iter().any(|v| self.values_equal(v, value));
                Ok(Value::Bool(found))
            }
            (ObjKind::String, method) => {
                let text = match self.heap.body(target) {
                    Some(ObjBody::Str(s)) => s.clone(),
                    _ => String::new(),
                };
                match method {
                    "uppercased" => Ok(self.allocate_string(text.to_uppercase())),
                    "lowercased" => Ok(self.allocate_string(text.to_lowercase())),
                    "hasPrefix" | "hasSuffix" | "contains" => {
                        let [arg] = args else {
                            return Err(self
                                .runtime_error(format!("{method} expects one argument")));
                        };
                        let Some(needle) = self.string_content(arg) else {
                            return Err(
                                self.runtime_error(format!("{method} expects a string argument"))
                            );
                        };
                        let result = match method {
                            "hasPrefix" => text.starts_with(&needle),
                            "hasSuffix" => text.ends_with(&needle),
                            _ => text.contains(&needle),
                        };
                        Ok(Value::Bool(result))
                    }
                    _ => Err(self.runtime_error(format!("string has no method '{method}'"))),
                }
            }
            (ObjKind::Range, "contains") => {
                let [value] = args else {
                    return Err(self.runtime_error("contains expects one argument"));
                };
                let Some(i) = value.as_int() else {
                    return Err(self.runtime_error("range contains expects an integer"));
                };
                let range = match self.heap.body(target) {
                    Some(ObjBody::Range(r)) => *r,
                    _ => return Err(self.runtime_error("corrupt range")),
                };
                Ok(Value::Bool(range.contains(i)))
            }
            (kind, method) => Err(self.runtime_error(format!(
                "{} object has no method '{method}'",
                crate::object::kind_name(kind)
            ))),
        }
    }

    /// `String(x)`, `Int(x)`, `Float(x)`. Failed parses answer nil so
    /// callers can chain `?? fallback`.
    fn conversion_call(&mut self, name: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        let [arg] = args else {
            return Err(self.runtime_error(format!("{name} expects one argument")));
        };
        let arg = self.deref_read(*arg)?;
        match name {
            "String" => {
                let text = self.display_value(&arg);
                Ok(self.allocate_string(text))
            }
            "Int" => match arg {
                Value::Int(i) => Ok(Value::Int(i)),
                Value::Float(f) => Ok(Value::Int(f as i64)),
                Value::Bool(b) => Ok(Value::Int(b as i64)),
                _ => match self.string_content(&arg) {
                    Some(text) => Ok(text
                        .trim()
                        .parse::<i64>()
                        .map(Value::Int)
                        .unwrap_or(Value::Null)),
                    None => Ok(Value::Null),
                },
            },
            "Float" => match arg {
                Value::Int(i) => Ok(Value::Float(i as f64)),
                Value::Float(f) => Ok(Value::Float(f)),
                _ => match self.string_content(&arg) {
                    Some(text) => Ok(text
                        .trim()
                        .parse::<f64>()
                        .map(Value::Float)
                        .unwrap_or(Value::Null)),
                    None => Ok(Value::Null),
                },
            },
            other => Err(self.runtime_error(format!("unknown builtin '{other}'"))),
        }
    }
}
