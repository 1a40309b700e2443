//! Property access and type construction.
//!
//! Setting a stored property runs willSet and didSet observers through
//! nested frames before the instruction completes; computed properties
//! dispatch uniformly through their stored getter/setter functions.

use super::{Flow, Vm};
use crate::error::RuntimeError;
use crate::object::{
    ClassObj, ComputedProperty, EnumCaseObj, EnumTypeObj, ObjBody, ObjKind, PropertyInfo,
    ProtocolObj, StructTypeObj,
};
use swive_core::chunk::property_bits;
use swive_core::value::{ObjId, Value};

impl Vm {
    // ---- lookup helpers ----

    /// The class and its superclasses, derived first.
    pub(crate) fn class_chain(&self, start: ObjId) -> Vec<ObjId> {
        let mut chain = Vec::new();
        let mut current = Some(start);
        while let Some(id) = current {
            chain.push(id);
            current = match self.heap.body(id) {
                Some(ObjBody::Class(c)) => c.superclass,
                _ => None,
            };
        }
        chain
    }

    pub(crate) fn find_method_on_class(&self, class: ObjId, name: &str) -> Option<Value> {
        for id in self.class_chain(class) {
            if let Some(ObjBody::Class(c)) = self.heap.body(id) {
                if let Some(m) = c.methods.get(name) {
                    return Some(*m);
                }
            }
        }
        None
    }

    fn find_property_on_class(&self, class: ObjId, name: &str) -> Option<PropertyInfo> {
        for id in self.class_chain(class) {
            if let Some(ObjBody::Class(c)) = self.heap.body(id) {
                if let Some(p) = c.properties.iter().find(|p| p.name == name) {
                    return Some(p.clone());
                }
            }
        }
        None
    }

    fn find_computed_on_class(&self, class: ObjId, name: &str) -> Option<ComputedProperty> {
        for id in self.class_chain(class) {
            if let Some(ObjBody::Class(c)) = self.heap.body(id) {
                if let Some(p) = c.computed_properties.iter().find(|p| p.name == name) {
                    return Some(p.clone());
                }
            }
        }
        None
    }

    // ---- property get ----

    pub(crate) fn op_get_property(&mut self) -> Result<Flow, RuntimeError> {
        let name = self.read_string()?;
        let receiver = self.pop()?;
        let receiver = self.deref_read(receiver)?;
        let value = self.get_property_value(receiver, &name)?;
        self.push(value)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_optional_chain(&mut self) -> Result<Flow, RuntimeError> {
        let name = self.read_string()?;
        let receiver = self.pop()?;
        let receiver = self.deref_read(receiver)?;
        if receiver.is_null() {
            self.push(Value::Null)?;
            return Ok(Flow::Continue);
        }
        let value = self.get_property_value(receiver, &name)?;
        self.push(value)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn get_property_value(
        &mut self,
        receiver: Value,
        name: &str,
    ) -> Result<Value, RuntimeError> {
        if receiver.is_null() {
            return Err(self.runtime_error(format!("property '{name}' access on nil")));
        }
        let Some(r) = receiver.as_obj() else {
            return Err(self.runtime_error(format!(
                "value of type {} has no property '{name}'",
                receiver.type_name()
            )));
        };

        match self.heap.kind(r.id) {
            ObjKind::Instance => self.instance_property(receiver, r.id, name),
            ObjKind::StructInstance => self.struct_instance_property(receiver, r.id, name),
            ObjKind::EnumCase => self.enum_case_property(receiver, r.id, name),
            ObjKind::Class => {
                let found = match self.heap.body(r.id) {
                    Some(ObjBody::Class(c)) => c
                        .static_methods
                        .get(name)
                        .or_else(|| c.static_properties.get(name))
                        .copied(),
                    _ => None,
                };
                found.ok_or_else(|| {
                    let ty = self.type_name_of(r.id);
                    self.runtime_error(format!("type '{ty}' has no static member '{name}'"))
                })
            }
            ObjKind::Struct => {
                let found = match self.heap.body(r.id) {
                    Some(ObjBody::Struct(s)) => s
                        .static_methods
                        .get(name)
                        .or_else(|| s.static_properties.get(name))
                        .copied(),
                    _ => None,
                };
                found.ok_or_else(|| {
                    let ty = self.type_name_of(r.id);
                    self.runtime_error(format!("type '{ty}' has no static member '{name}'"))
                })
            }
            ObjKind::Enum => {
                let found = match self.heap.body(r.id) {
                    Some(ObjBody::Enum(e)) => e.cases.get(name).copied(),
                    _ => None,
                };
                found.ok_or_else(|| {
                    let ty = self.type_name_of(r.id);
                    self.runtime_error(format!("enum '{ty}' has no case '{name}'"))
                })
            }
            ObjKind::Map => {
                let value = match self.heap.body(r.id) {
                    Some(ObjBody::Map(entries)) => entries.get(name).copied(),
                    _ => None,
                };
                match value {
                    Some(v) => Ok(v),
                    // maps answer nil for missing keys, plus builtins
                    None => self.builtin_member(receiver, r.id, name),
                }
            }
            ObjKind::List | ObjKind::String | ObjKind::Range | ObjKind::Tuple => {
                self.builtin_member(receiver, r.id, name)
            }
            other => Err(self.runtime_error(format!(
                "{} object has no property '{name}'",
                crate::object::kind_name(other)
            ))),
        }
    }

    fn instance_property(
        &mut self,
        receiver: Value,
        id: ObjId,
        name: &str,
    ) -> Result<Value, RuntimeError> {
        let class = match self.heap.body(id) {
            Some(ObjBody::Instance(inst)) => inst.class,
            _ => return Err(self.runtime_error("corrupt instance")),
        };

        let field = match self.heap.body(id) {
            Some(ObjBody::Instance(inst)) => inst.fields.get(name).copied(),
            _ => None,
        };
        if let Some(stored) = field {
            // lazy slot: run the initializer once and cache the result
            if matches!(stored, Value::Undefined) {
                if let Some(prop) = self.find_property_on_class(class, name) {
                    if prop.is_lazy {
                        let value = self.call_method_sync(prop.lazy_initializer, receiver, &[])?;
                        self.publish(Value::Null, value);
                        if let Some(ObjBody::Instance(inst)) = self.heap.body_mut(id) {
                            inst.fields.insert(name.to_string(), value);
                        }
                        return Ok(value);
                    }
                }
            }
            let value = self.deref_read(stored)?;
            if value.is_null() && stored.is_object() {
                if let Some(ObjBody::Instance(inst)) = self.heap.body_mut(id) {
                    inst.fields.insert(name.to_string(), Value::Null);
                }
            }
            return Ok(value);
        }

        if let Some(method) = self.find_method_on_class(class, name) {
            return Ok(self.bind_method(id, method, false));
        }
        if let Some(computed) = self.find_computed_on_class(class, name) {
            return self.call_method_sync(computed.getter, receiver, &[]);
        }
        let ty = self.type_name_of(class);
        Err(self.runtime_error(format!("undefined property '{name}' on '{ty}'")))
    }

    fn struct_instance_property(
        &mut self,
        receiver: Value,
        id: ObjId,
        name: &str,
    ) -> Result<Value, RuntimeError> {
        let struct_type = match self.heap.body(id) {
            Some(ObjBody::StructInstance(inst)) => inst.struct_type,
            _ => return Err(self.runtime_error("corrupt struct instance")),
        };

        let field = match self.heap.body(id) {
            Some(ObjBody::StructInstance(inst)) => inst.fields.get(name).copied(),
            _ => None,
        };
        if let Some(stored) = field {
            if matches!(stored, Value::Undefined) {
                let lazy = match self.heap.body(struct_type) {
                    Some(ObjBody::Struct(st)) => st
                        .properties
                        .iter()
                        .find(|p| p.name == name && p.is_lazy)
                        .map(|p| p.lazy_initializer),
                    _ => None,
                };
                if let Some(initializer) = lazy {
                    let value = self.call_method_sync(initializer, receiver, &[])?;
                    self.publish(Value::Null, value);
                    if let Some(ObjBody::StructInstance(inst)) = self.heap.body_mut(id) {
                        inst.fields.insert(name.to_string(), value);
                    }
                    return Ok(value);
                }
            }
            let value = self.deref_read(stored)?;
            return Ok(value);
        }

        let (method, mutating, computed) = match self.heap.body(struct_type) {
            Some(ObjBody::Struct(st)) => (
                st.methods.get(name).copied(),
                st.mutating_methods.contains(name),
                st.computed_properties
                    .iter()
                    .find(|p| p.name == name)
                    .cloned(),
            ),
            _ => (None, false, None),
        };
        if let Some(method) = method {
            return Ok(self.bind_method(id, method, mutating));
        }
        if let Some(computed) = computed {
            return self.call_method_sync(computed.getter, receiver, &[]);
        }
        let ty = self.type_name_of(struct_type);
        Err(self.runtime_error(format!("undefined property '{name}' on '{ty}'")))
    }

    fn enum_case_property(
        &mut self,
        receiver: Value,
        id: ObjId,
        name: &str,
    ) -> Result<Value, RuntimeError> {
        let case = match self.heap.body(id) {
            Some(ObjBody::EnumCase(c)) => c.clone(),
            _ => return Err(self.runtime_error("corrupt enum case")),
        };
        match name {
            "rawValue" => return Ok(case.raw_value),
            "caseName" => {
                let value = self.allocate_string(case.case_name);
                return Ok(value);
            }
            "associated" => {
                let list = self.heap.allocate(ObjBody::List(case.associated.clone()));
                for v in &case.associated {
                    self.publish(Value::Null, *v);
                }
                return Ok(Value::object(list));
            }
            _ => {}
        }

        // associated value by label
        if let Some(i) = case
            .labels
            .iter()
            .position(|l| l.as_deref() == Some(name))
        {
            if let Some(v) = case.associated.get(i) {
                return Ok(*v);
            }
        }

        let (method, computed) = match self.heap.body(case.enum_type) {
            Some(ObjBody::Enum(e)) => (
                e.methods.get(name).copied(),
                e.computed_properties
                    .iter()
                    .find(|p| p.name == name)
                    .cloned(),
            ),
            _ => (None, None),
        };
        if let Some(method) = method {
            return Ok(self.bind_method(id, method, false));
        }
        if let Some(computed) = computed {
            return self.call_method_sync(computed.getter, receiver, &[]);
        }
        let ty = self.type_name_of(case.enum_type);
        Err(self.runtime_error(format!("undefined member '{name}' on '{ty}'")))
    }

    /// Receiver and method stay borrowed while the binding lives on the
    /// stack; ownership begins if it is published to a durable slot.
    pub(crate) fn bind_method(&mut self, receiver: ObjId, method: Value, is_mutating: bool) -> Value {
        let id = self
            .heap
            .allocate(ObjBody::BoundMethod(crate::object::BoundMethodObj {
                receiver,
                method,
                is_mutating,
            }));
        Value::object(id)
    }

    // ---- property set ----

    pub(crate) fn op_set_property(&mut self) -> Result<Flow, RuntimeError> {
        let name = self.read_string()?;
        let value = self.pop()?;
        let receiver = self.pop()?;
        let receiver = self.deref_read(receiver)?;
        self.set_property_value(receiver, &name, value)?;
        self.push(value)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn set_property_value(
        &mut self,
        receiver: Value,
        name: &str,
        value: Value,
    ) -> Result<(), RuntimeError> {
        if receiver.is_null() {
            return Err(self.runtime_error(format!("property '{name}' assignment on nil")));
        }
        let Some(r) = receiver.as_obj() else {
            return Err(self.runtime_error(format!(
                "value of type {} has no property '{name}'",
                receiver.type_name()
            )));
        };

        match self.heap.kind(r.id) {
            ObjKind::Instance => {
                let class = match self.heap.body(r.id) {
                    Some(ObjBody::Instance(inst)) => inst.class,
                    _ => return Err(self.runtime_error("corrupt instance")),
                };
                if let Some(computed) = self.find_computed_on_class(class, name) {
                    if computed.setter.is_null() {
                        return Err(self.runtime_error(format!(
                            "cannot assign to read-only property '{name}'"
                        )));
                    }
                    self.call_method_sync(computed.setter, receiver, &[value])?;
                    return Ok(());
                }
                let prop = self.find_property_on_class(class, name);
                self.store_field(receiver, r.id, name, value, prop)
            }
            ObjKind::StructInstance => {
                let struct_type = match self.heap.body(r.id) {
                    Some(ObjBody::StructInstance(inst)) => inst.struct_type,
                    _ => return Err(self.runtime_error("corrupt struct instance")),
                };
                let (computed, prop) = match self.heap.body(struct_type) {
                    Some(ObjBody::Struct(st)) => (
                        st.computed_properties
                            .iter()
                            .find(|p| p.name == name)
                            .cloned(),
                        st.properties.iter().find(|p| p.name == name).cloned(),
                    ),
                    _ => (None, None),
                };
                if let Some(computed) = computed {
                    if computed.setter.is_null() {
                        return Err(self.runtime_error(format!(
                            "cannot assign to read-only property '{name}'"
                        )));
                    }
                    self.call_method_sync(computed.setter, receiver, &[value])?;
                    return Ok(());
                }
                self.store_field(receiver, r.id, name, value, prop)
            }
            ObjKind::Map => {
                let old = match self.heap.body(r.id) {
                    Some(ObjBody::Map(entries)) => {
                        entries.get(name).copied().unwrap_or(Value::Null)
                    }
                    _ => Value::Null,
                };
                self.publish(old, value);
                if let Some(ObjBody::Map(entries)) = self.heap.body_mut(r.id) {
                    entries.insert(name.to_string(), value);
                }
                self.heap.recharge(r.id);
                Ok(())
            }
            ObjKind::Class => {
                let old = match self.heap.body(r.id) {
                    Some(ObjBody::Class(c)) => {
                        c.static_properties.get(name).copied().unwrap_or(Value::Null)
                    }
                    _ => Value::Null,
                };
                self.publish(old, value);
                if let Some(ObjBody::Class(c)) = self.heap.body_mut(r.id) {
                    c.static_properties.insert(name.to_string(), value);
                }
                Ok(())
            }
            ObjKind::Struct => {
                let old = match self.heap.body(r.id) {
                    Some(ObjBody::Struct(s)) => {
                        s.static_properties.get(name).copied().unwrap_or(Value::Null)
                    }
                    _ => Value::Null,
                };
                self.publish(old, value);
                if let Some(ObjBody::Struct(s)) = self.heap.body_mut(r.id) {
                    s.static_properties.insert(name.to_string(), value);
                }
                Ok(())
            }
            other => Err(self.runtime_error(format!(
                "cannot assign property '{name}' on {}",
                crate::object::kind_name(other)
            ))),
        }
    }

    /// Stored-property write with let enforcement and observer re-entry:
    /// willSet(self, newValue), store, didSet(self, oldValue).
    fn store_field(
        &mut self,
        receiver: Value,
        id: ObjId,
        name: &str,
        value: Value,
        prop: Option<PropertyInfo>,
    ) -> Result<(), RuntimeError> {
        let in_initializer = self.frames.last().map(|f| f.is_initializer).unwrap_or(false);
        if let Some(p) = &prop {
            if p.is_let && !in_initializer {
                return Err(
                    self.runtime_error(format!("cannot assign to 'let' property '{name}'"))
                );
            }
            if !p.will_set.is_null() {
                self.call_method_sync(p.will_set, receiver, &[value])?;
            }
        }

        let old = match self.heap.body(id) {
            Some(ObjBody::Instance(inst)) => inst.fields.get(name).copied(),
            Some(ObjBody::StructInstance(inst)) => inst.fields.get(name).copied(),
            _ => None,
        }
        .unwrap_or(Value::Null);

        // lazy sentinel must not leak into the release path
        let old_for_rc = if matches!(old, Value::Undefined) {
            Value::Null
        } else {
            old
        };
        self.publish(old_for_rc, value);
        match self.heap.body_mut(id) {
            Some(ObjBody::Instance(inst)) => {
                inst.fields.insert(name.to_string(), value);
            }
            Some(ObjBody::StructInstance(inst)) => {
                inst.fields.insert(name.to_string(), value);
            }
            _ => {}
        }
        self.heap.recharge(id);

        if let Some(p) = &prop {
            if !p.did_set.is_null() {
                let old_arg = if matches!(old, Value::Undefined) {
                    Value::Null
                } else {
                    old
                };
                self.call_method_sync(p.did_set, receiver, &[old_arg])?;
            }
        }
        Ok(())
    }

    // ---- super dispatch ----

    pub(crate) fn op_super(&mut self) -> Result<Flow, RuntimeError> {
        let name = self.read_string()?;
        let receiver = self.pop()?;
        let Some(r) = receiver.as_obj() else {
            return Err(self.runtime_error("'super' outside of a method"));
        };
        let class = match self.heap.body(r.id) {
            Some(ObjBody::Instance(inst)) => inst.class,
            _ => return Err(self.runtime_error("'super' receiver is not a class instance")),
        };
        let superclass = match self.heap.body(class) {
            Some(ObjBody::Class(c)) => c.superclass,
            _ => None,
        };
        let Some(superclass) = superclass else {
            let ty = self.type_name_of(class);
            return Err(self.runtime_error(format!("class '{ty}' has no superclass")));
        };
        let Some(method) = self.find_method_on_class(superclass, &name) else {
            return Err(self.runtime_error(format!("undefined superclass method '{name}'")));
        };
        let bound = self.bind_method(r.id, method, false);
        self.push(bound)?;
        Ok(Flow::Continue)
    }

    // ---- type construction opcodes ----

    pub(crate) fn op_class(&mut self) -> Result<Flow, RuntimeError> {
        let name = self.read_string()?;
        let id = self.heap.allocate(ObjBody::Class(ClassObj {
            name,
            ..Default::default()
        }));
        self.push(Value::object(id))?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_struct(&mut self) -> Result<Flow, RuntimeError> {
        let name = self.read_string()?;
        let id = self.heap.allocate(ObjBody::Struct(StructTypeObj {
            name,
            ..Default::default()
        }));
        self.push(Value::object(id))?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_enum(&mut self) -> Result<Flow, RuntimeError> {
        let name = self.read_string()?;
        let id = self.heap.allocate(ObjBody::Enum(EnumTypeObj {
            name,
            ..Default::default()
        }));
        self.push(Value::object(id))?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_protocol(&mut self) -> Result<Flow, RuntimeError> {
        let idx = self.read_short()? as usize;
        let def = self
            .chunk
            .protocols
            .get(idx)
            .cloned()
            .ok_or_else(|| self.runtime_error(format!("protocol index {idx} out of range")))?;
        let id = self.heap.allocate(ObjBody::Protocol(ProtocolObj {
            name: def.name,
            method_requirements: def
                .method_requirements
                .iter()
                .map(|m| m.name.clone())
                .collect(),
            property_requirements: def
                .property_requirements
                .iter()
                .map(|p| p.name.clone())
                .collect(),
        }));
        self.push(Value::object(id))?;
        Ok(Flow::Continue)
    }

    fn attach_method(
        &mut self,
        name: String,
        method: Value,
        is_static: bool,
        is_mutating: bool,
    ) -> Result<(), RuntimeError> {
        let type_value = self.peek(0)?;
        let Some(r) = type_value.as_obj() else {
            return Err(self.runtime_error("method attached to a non-type value"));
        };
        self.publish(Value::Null, method);
        match self.heap.body_mut(r.id) {
            Some(ObjBody::Class(c)) => {
                if is_static {
                    c.static_methods.insert(name, method);
                } else {
                    c.methods.insert(name, method);
                }
            }
            Some(ObjBody::Struct(s)) => {
                if is_static {
                    s.static_methods.insert(name, method);
                } else {
                    if is_mutating {
                        s.mutating_methods.insert(name.clone());
                    }
                    s.methods.insert(name, method);
                }
            }
            Some(ObjBody::Enum(e)) => {
                e.methods.insert(name, method);
            }
            _ => return Err(self.runtime_error("method attached to a non-type value")),
        }
        self.heap.recharge(r.id);
        Ok(())
    }

    pub(crate) fn op_method(&mut self) -> Result<Flow, RuntimeError> {
        let name = self.read_string()?;
        let method = self.pop()?;
        self.attach_method(name, method, false, false)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_static_method(&mut self) -> Result<Flow, RuntimeError> {
        let name = self.read_string()?;
        let method = self.pop()?;
        self.attach_method(name, method, true, false)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_struct_method(&mut self) -> Result<Flow, RuntimeError> {
        let name = self.read_string()?;
        let is_mutating = self.read_byte()? != 0;
        let method = self.pop()?;
        self.attach_method(name, method, false, is_mutating)?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_define_property(&mut self) -> Result<Flow, RuntimeError> {
        let name = self.read_string()?;
        let flags = self.read_byte()?;

        let did_set = if flags & property_bits::DID_SET != 0 {
            self.pop()?
        } else {
            Value::Null
        };
        let will_set = if flags & property_bits::WILL_SET != 0 {
            self.pop()?
        } else {
            Value::Null
        };
        let default = self.pop()?;

        let type_value = self.peek(0)?;
        let Some(r) = type_value.as_obj() else {
            return Err(self.runtime_error("property defined on a non-type value"));
        };

        let is_lazy = flags & property_bits::LAZY != 0;
        if flags & property_bits::STATIC != 0 {
            self.publish(Value::Null, default);
            match self.heap.body_mut(r.id) {
                Some(ObjBody::Class(c)) => {
                    c.static_properties.insert(name, default);
                }
                Some(ObjBody::Struct(s)) => {
                    s.static_properties.insert(name, default);
                }
                _ => return Err(self.runtime_error("property defined on a non-type value")),
            }
            return Ok(Flow::Continue);
        }

        let info = PropertyInfo {
            name: name.clone(),
            default_value: if is_lazy { Value::Null } else { default },
            is_let: flags & property_bits::LET != 0,
            is_lazy,
            lazy_initializer: if is_lazy { default } else { Value::Null },
            will_set,
            did_set,
        };
        for v in [info.default_value, info.lazy_initializer, will_set, did_set] {
            self.publish(Value::Null, v);
        }

        match self.heap.body_mut(r.id) {
            Some(ObjBody::Class(c)) => {
                if let Some(existing) = c.properties.iter_mut().find(|p| p.name == name) {
                    *existing = info;
                } else {
                    c.properties.push(info);
                }
            }
            Some(ObjBody::Struct(s)) => {
                if let Some(existing) = s.properties.iter_mut().find(|p| p.name == name) {
                    *existing = info;
                } else {
                    s.properties.push(info);
                }
            }
            _ => return Err(self.runtime_error("property defined on a non-type value")),
        }
        self.heap.recharge(r.id);
        Ok(Flow::Continue)
    }

    pub(crate) fn op_computed_property(&mut self) -> Result<Flow, RuntimeError> {
        let name = self.read_string()?;
        let has_setter = self.read_byte()? != 0;
        let setter = if has_setter { self.pop()? } else { Value::Null };
        let getter = self.pop()?;
        let type_value = self.peek(0)?;
        let Some(r) = type_value.as_obj() else {
            return Err(self.runtime_error("computed property defined on a non-type value"));
        };
        self.publish(Value::Null, getter);
        self.publish(Value::Null, setter);
        let computed = ComputedProperty { name, getter, setter };
        match self.heap.body_mut(r.id) {
            Some(ObjBody::Class(c)) => c.computed_properties.push(computed),
            Some(ObjBody::Struct(s)) => s.computed_properties.push(computed),
            Some(ObjBody::Enum(e)) => e.computed_properties.push(computed),
            _ => return Err(self.runtime_error("computed property defined on a non-type value")),
        }
        Ok(Flow::Continue)
    }

    /// `INHERIT` installs a superclass, or checks protocol conformance
    /// when the pushed value is a protocol.
    pub(crate) fn op_inherit(&mut self) -> Result<Flow, RuntimeError> {
        let parent = self.pop()?;
        let child = self.peek(0)?;
        let Some(parent_ref) = parent.as_obj() else {
            return Err(self.runtime_error("superclass must be a class or protocol"));
        };
        let Some(child_ref) = child.as_obj() else {
            return Err(self.runtime_error("inherit applied to a non-type value"));
        };

        match self.heap.kind(parent_ref.id) {
            ObjKind::Class => {
                if self.heap.kind(child_ref.id) != ObjKind::Class {
                    return Err(self.runtime_error("only classes can inherit from a class"));
                }
                self.retain(parent_ref.id);
                if let Some(ObjBody::Class(c)) = self.heap.body_mut(child_ref.id) {
                    c.superclass = Some(parent_ref.id);
                }
                Ok(Flow::Continue)
            }
            ObjKind::Protocol => self.check_conformance(child_ref.id, parent_ref.id),
            _ => Err(self.runtime_error("superclass must be a class or protocol")),
        }
    }

    fn check_conformance(
        &mut self,
        type_id: ObjId,
        protocol_id: ObjId,
    ) -> Result<Flow, RuntimeError> {
        let protocol = match self.heap.body(protocol_id) {
            Some(ObjBody::Protocol(p)) => p.clone(),
            _ => return Err(self.runtime_error("corrupt protocol")),
        };

        let (has_method, has_property): (Box<dyn Fn(&str) -> bool>, Box<dyn Fn(&str) -> bool>) =
            match self.heap.body(type_id) {
                Some(ObjBody::Class(c)) => {
                    let methods: std::collections::HashSet<String> =
                        c.methods.keys().cloned().collect();
                    let computed: std::collections::HashSet<String> = c
                        .computed_properties
                        .iter()
                        .map(|p| p.name.clone())
                        .collect();
                    let props: std::collections::HashSet<String> =
                        c.properties.iter().map(|p| p.name.clone()).collect();
                    (
                        Box::new(move |n: &str| methods.contains(n)),
                        Box::new(move |n: &str| props.contains(n) || computed.contains(n)),
                    )
                }
                Some(ObjBody::Struct(s)) => {
                    let methods: std::collections::HashSet<String> =
                        s.methods.keys().cloned().collect();
                    let computed: std::collections::HashSet<String> = s
                        .computed_properties
                        .iter()
                        .map(|p| p.name.clone())
                        .collect();
                    let props: std::collections::HashSet<String> =
                        s.properties.iter().map(|p| p.name.clone()).collect();
                    (
                        Box::new(move |n: &str| methods.contains(n)),
                        Box::new(move |n: &str| props.contains(n) || computed.contains(n)),
                    )
                }
                _ => return Err(self.runtime_error("inherit applied to a non-type value")),
            };

        for required in &protocol.method_requirements {
            if !has_method(required) {
                let ty = self.type_name_of(type_id);
                return Err(self.runtime_error(format!(
                    "type '{ty}' does not conform to protocol '{}' (missing method '{required}')",
                    protocol.name
                )));
            }
        }
        for required in &protocol.property_requirements {
            if !has_property(required) {
                let ty = self.type_name_of(type_id);
                return Err(self.runtime_error(format!(
                    "type '{ty}' does not conform to protocol '{}' (missing property '{required}')",
                    protocol.name
                )));
            }
        }
        Ok(Flow::Continue)
    }

    // ---- enum opcodes ----

    pub(crate) fn op_enum_case(&mut self) -> Result<Flow, RuntimeError> {
        let name = self.read_string()?;
        let assoc_count = self.read_byte()? as usize;
        let mut labels = Vec::with_capacity(assoc_count);
        for _ in 0..assoc_count {
            let idx = self.read_short()?;
            if idx == swive_core::chunk::NO_LABEL {
                labels.push(None);
            } else {
                let label = self
                    .chunk
                    .strings
                    .get(idx as usize)
                    .cloned()
                    .ok_or_else(|| self.runtime_error("label index out of range"))?;
                labels.push(Some(label));
            }
        }

        let raw_value = self.pop()?;
        let enum_value = self.peek(0)?;
        let Some(enum_ref) = enum_value.as_obj() else {
            return Err(self.runtime_error("enum case defined outside an enum"));
        };

        let case = self.heap.allocate(ObjBody::EnumCase(EnumCaseObj {
            enum_type: enum_ref.id,
            case_name: name.clone(),
            raw_value,
            associated: Vec::new(),
            labels,
        }));
        let case_value = Value::object(case);
        self.publish(Value::Null, raw_value);
        self.publish(Value::Null, case_value);
        if let Some(ObjBody::Enum(e)) = self.heap.body_mut(enum_ref.id) {
            e.cases.insert(name.clone(), case_value);
            e.case_order.push(name);
        }
        self.heap.recharge(enum_ref.id);
        Ok(Flow::Continue)
    }

    pub(crate) fn op_match_enum_case(&mut self) -> Result<Flow, RuntimeError> {
        let name = self.read_string()?;
        let value = self.pop()?;
        let matches = match value.as_obj() {
            Some(r) => match self.heap.body(r.id) {
                Some(ObjBody::EnumCase(c)) => c.case_name == name,
                _ => false,
            },
            None => false,
        };
        self.push(Value::Bool(matches))?;
        Ok(Flow::Continue)
    }

    pub(crate) fn op_get_associated(&mut self) -> Result<Flow, RuntimeError> {
        let index = self.read_short()? as usize;
        let value = self.pop()?;
        let Some(r) = value.as_obj() else {
            return Err(self.runtime_error("associated value read on a non-enum value"));
        };
        let result = match self.heap.body(r.id) {
            Some(ObjBody::EnumCase(c)) => c.associated.get(index).copied(),
            _ => None,
        };
        let result = result.ok_or_else(|| {
            self.runtime_error(format!("associated value index {index} out of range"))
        })?;
        self.push(result)?;
        Ok(Flow::Continue)
    }
}
