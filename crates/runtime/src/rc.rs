//! The reference-counting engine.
//!
//! Four primitives drive retention: `retain` (which adopts the creator
//! reference on first call), `release` (which marks death and defers the
//! actual teardown), and the weak pair. Deallocation happens only in
//! [`Vm::process_deferred_releases`], drained at safe points chosen by the
//! run loop; `release` itself never deletes its argument.

use crate::object::{ObjBody, ObjKind, kind_name};
use crate::vm::Vm;
use swive_core::value::{ObjId, RefKind, Value};
use tracing::trace;

impl Vm {
    pub(crate) fn record_rc_operation(&mut self) {
        self.rc_ops = self.rc_ops.wrapping_add(1);
    }

    /// Takes a strong reference. The first retain after allocation adopts
    /// the creator reference: the flag clears and the count stays put, so
    /// creating a value and moving it into a slot does not double-retain.
    pub fn retain(&mut self, id: ObjId) {
        self.heap.stats.retain_count += 1;
        self.record_rc_operation();
        let header = self.heap.header_mut(id);
        if header.has_creator_ref {
            header.has_creator_ref = false;
            trace!(id = id.0, count = header.strong, "retain (adopt)");
            return;
        }
        header.strong += 1;
        trace!(id = id.0, count = header.strong, "retain");
    }

    /// Adopt without retaining: clears the creator flag if still set.
    pub fn adopt(&mut self, id: ObjId) {
        let header = self.heap.header_mut(id);
        if header.has_creator_ref {
            header.has_creator_ref = false;
            trace!(id = id.0, count = header.strong, "adopt");
        }
    }

    /// Drops a strong reference. On reaching zero the object is marked
    /// dead (weak readers observe nil from this point on) and queued for
    /// deferred teardown. A negative count is an internal bug and aborts.
    pub fn release(&mut self, id: ObjId) {
        self.heap.stats.release_count += 1;
        self.record_rc_operation();
        let header = self.heap.header_mut(id);
        header.strong -= 1;
        let count = header.strong;
        trace!(id = id.0, count, "release");
        if count == 0 {
            header.is_dead = true;
            self.deferred.push(id);
        } else if count < 0 {
            panic!(
                "object {} [{}] has negative refcount {}",
                id.0,
                kind_name(self.heap.kind(id)),
                count
            );
        }
    }

    pub fn weak_retain(&mut self, id: ObjId) {
        self.record_rc_operation();
        let header = self.heap.header_mut(id);
        header.weak += 1;
        trace!(id = id.0, weak = header.weak, "weak_retain");
    }

    pub fn weak_release(&mut self, id: ObjId) {
        self.record_rc_operation();
        let header = self.heap.header_mut(id);
        header.weak -= 1;
        let weak = header.weak;
        trace!(id = id.0, weak, "weak_release");
        if weak < 0 {
            panic!(
                "object {} [{}] has negative weak refcount {}",
                id.0,
                kind_name(self.heap.kind(id)),
                weak
            );
        }
        self.heap.maybe_recycle(id);
    }

    /// Publishes `new` into a durable slot that previously held `old`:
    /// the incoming reference is retained (or weak-retained) before the
    /// outgoing one is released, so self-assignment is safe.
    pub(crate) fn publish(&mut self, old: Value, new: Value) {
        if let Value::Obj(r) = new {
            match r.kind {
                RefKind::Strong => {
                    self.retain(r.id);
                    self.retain_binding_children(r.id);
                }
                RefKind::Weak => self.weak_retain(r.id),
                RefKind::Unowned => {}
            }
        }
        if let Value::Obj(r) = old {
            match r.kind {
                RefKind::Strong => self.release(r.id),
                RefKind::Weak => self.weak_release(r.id),
                RefKind::Unowned => {}
            }
        }
    }

    /// Method-binding pairs take ownership of their receiver only once
    /// they reach a durable slot; transient bindings on the value stack
    /// never hold their receiver alive, keeping destruction deterministic.
    /// The teardown walk releases these same references.
    fn retain_binding_children(&mut self, id: ObjId) {
        let children: Vec<ObjId> = match self.heap.body(id) {
            Some(ObjBody::BoundMethod(bm)) => {
                let mut out = vec![bm.receiver];
                if let Value::Obj(m) = bm.method {
                    out.push(m.id);
                }
                out
            }
            Some(ObjBody::BuiltinMethod(bm)) => bm.target.into_iter().collect(),
            _ => return,
        };
        for child in children {
            self.retain(child);
        }
    }

    /// Drains the deferred queue when the run loop reaches a safe point.
    pub(crate) fn collect_if_needed(&mut self) {
        if self.is_collecting || self.deferred.is_empty() {
            return;
        }
        self.process_deferred_releases();
        self.rc_ops = 0;
    }

    /// Final cleanup tick at the end of a run.
    pub fn run_cleanup(&mut self) {
        while !self.deferred.is_empty() && !self.is_collecting {
            self.process_deferred_releases();
        }
    }

    /// Tears down every object whose count reached zero. The queue is
    /// swapped out first so releases performed during teardown land on a
    /// fresh list; a deleted set guards against a child release circling
    /// back into an object already being torn down.
    pub(crate) fn process_deferred_releases(&mut self) {
        if self.deferred.is_empty() {
            return;
        }
        self.is_collecting = true;
        let to_process = std::mem::take(&mut self.deferred);
        trace!(count = to_process.len(), "processing deferred releases");

        let mut deleted: std::collections::HashSet<ObjId> = std::collections::HashSet::new();

        for id in to_process {
            if deleted.contains(&id) {
                continue;
            }
            if self.heap.body(id).is_none() {
                continue;
            }

            // deinit runs before children are released; its errors are
            // swallowed so cleanup always completes
            if self.heap.kind(id) == ObjKind::Instance {
                if let Some(deinit) = self.find_deinit(id) {
                    let receiver = Value::object(id);
                    let _ = self.call_function_sync(deinit, &[receiver]);
                }
            }

            deleted.insert(id);
            self.release_children(id, &mut deleted);
            self.heap.free_body(id);
        }

        self.is_collecting = false;
    }

    fn find_deinit(&self, instance: ObjId) -> Option<Value> {
        let class = match self.heap.body(instance) {
            Some(ObjBody::Instance(inst)) => inst.class,
            _ => return None,
        };
        self.find_method_on_class(class, "deinit")
    }

    /// Releases the strong containment children of `id`: list elements,
    /// map values, class methods and property defaults, instance and
    /// struct-instance fields, bound-method receiver and method, and
    /// builtin-method targets. Members already in `deleted` are skipped.
    fn release_children(
        &mut self,
        id: ObjId,
        deleted: &mut std::collections::HashSet<ObjId>,
    ) {
        let mut children: Vec<ObjId> = Vec::new();
        let mut note = |value: &Value, children: &mut Vec<ObjId>| {
            if let Value::Obj(r) = value {
                if r.kind == RefKind::Strong {
                    children.push(r.id);
                }
            }
        };

        match self.heap.body(id) {
            Some(ObjBody::List(items)) => {
                for v in items {
                    note(v, &mut children);
                }
            }
            Some(ObjBody::Map(entries)) => {
                for v in entries.values() {
                    note(v, &mut children);
                }
            }
            Some(ObjBody::Class(class)) => {
                for v in class.methods.values() {
                    note(v, &mut children);
                }
                for p in &class.properties {
                    note(&p.default_value, &mut children);
                }
            }
            Some(ObjBody::Instance(inst)) => {
                for v in inst.fields.values() {
                    note(v, &mut children);
                }
            }
            Some(ObjBody::StructInstance(inst)) => {
                for v in inst.fields.values() {
                    note(v, &mut children);
                }
            }
            Some(ObjBody::BoundMethod(bm)) => {
                children.push(bm.receiver);
                note(&bm.method, &mut children);
            }
            Some(ObjBody::BuiltinMethod(bm)) => {
                if let Some(target) = bm.target {
                    children.push(target);
                }
            }
            _ => {}
        }

        for child in children {
            if deleted.contains(&child) {
                continue;
            }
            if self.heap.body(child).is_some() && !self.heap.is_dead(child) {
                self.release(child);
            }
        }
    }

    // ---- struct value semantics ----

    /// Deep copy for value semantics: nested struct instances are copied
    /// recursively, other object fields are retained by reference.
    pub(crate) fn deep_copy_struct(&mut self, id: ObjId) -> ObjId {
        let (struct_type, fields) = match self.heap.body(id) {
            Some(ObjBody::StructInstance(inst)) => (inst.struct_type, inst.fields.clone()),
            _ => return id,
        };

        let mut copied = std::collections::HashMap::new();
        for (name, value) in fields {
            let new_value = match value {
                Value::Obj(r)
                    if r.kind == RefKind::Strong
                        && self.heap.kind(r.id) == ObjKind::StructInstance =>
                {
                    Value::object(self.deep_copy_struct(r.id))
                }
                other => other,
            };
            copied.insert(name, new_value);
        }

        let copy = self.heap.allocate(ObjBody::StructInstance(
            crate::object::StructInstanceObj {
                struct_type,
                fields: copied.clone(),
            },
        ));
        for value in copied.values() {
            self.publish(Value::Null, *value);
        }
        copy
    }

    /// Per-instance copy of a stored-property default: struct instances
    /// copy deeply, containers clone shallowly, everything else is shared.
    pub(crate) fn instantiate_default(&mut self, default: Value) -> Value {
        match default {
            Value::Obj(r) if r.kind == RefKind::Strong => match self.heap.kind(r.id) {
                ObjKind::StructInstance => Value::object(self.deep_copy_struct(r.id)),
                ObjKind::List => {
                    let items = match self.heap.body(r.id) {
                        Some(ObjBody::List(items)) => items.clone(),
                        _ => Vec::new(),
                    };
                    let copy = self.heap.allocate(ObjBody::List(items.clone()));
                    for v in &items {
                        self.publish(Value::Null, *v);
                    }
                    Value::object(copy)
                }
                ObjKind::Map => {
                    let entries = match self.heap.body(r.id) {
                        Some(ObjBody::Map(entries)) => entries.clone(),
                        _ => Default::default(),
                    };
                    let copy = self.heap.allocate(ObjBody::Map(entries.clone()));
                    for v in entries.values() {
                        self.publish(Value::Null, *v);
                    }
                    Value::object(copy)
                }
                _ => default,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::VmConfig;

    fn vm_with_string(text: &str) -> (Vm, ObjId) {
        let mut vm = Vm::new(VmConfig::default());
        let id = vm.heap.allocate(ObjBody::Str(text.to_string()));
        (vm, id)
    }

    #[test]
    fn first_retain_adopts_creator_ref() {
        let (mut vm, id) = vm_with_string("x");
        assert!(vm.heap.header(id).has_creator_ref);
        assert_eq!(vm.heap.header(id).strong, 1);
        vm.retain(id);
        assert!(!vm.heap.header(id).has_creator_ref);
        assert_eq!(vm.heap.header(id).strong, 1);
        vm.retain(id);
        assert_eq!(vm.heap.header(id).strong, 2);
    }

    #[test]
    fn retain_release_leaves_counts_unchanged() {
        let (mut vm, id) = vm_with_string("x");
        vm.retain(id); // adopt
        let strong = vm.heap.header(id).strong;
        let weak = vm.heap.header(id).weak;
        vm.retain(id);
        vm.release(id);
        assert_eq!(vm.heap.header(id).strong, strong);
        assert_eq!(vm.heap.header(id).weak, weak);
        assert!(!vm.heap.is_dead(id));
    }

    #[test]
    fn release_to_zero_marks_dead_and_defers() {
        let (mut vm, id) = vm_with_string("x");
        vm.retain(id); // adopt
        vm.release(id);
        assert!(vm.heap.is_dead(id));
        // release never deletes synchronously
        assert!(vm.heap.body(id).is_some());
        assert_eq!(vm.deferred, vec![id]);
        vm.process_deferred_releases();
        assert!(vm.heap.body(id).is_none());
    }

    #[test]
    fn weak_read_after_death_yields_nil() {
        let (mut vm, id) = vm_with_string("x");
        vm.retain(id);
        let weak_value = Value::object_with(id, RefKind::Weak);
        vm.publish(Value::Null, weak_value);
        assert_eq!(vm.heap.header(id).weak, 1);
        vm.release(id);
        assert_eq!(vm.deref_read(weak_value).unwrap(), Value::Null);
        // the drain must not disturb the weak observation
        vm.process_deferred_releases();
        assert_eq!(vm.deref_read(weak_value).unwrap(), Value::Null);
    }

    #[test]
    fn weak_release_balances_registration() {
        let (mut vm, id) = vm_with_string("x");
        vm.retain(id);
        let weak_value = Value::object_with(id, RefKind::Weak);
        vm.publish(Value::Null, weak_value);
        vm.publish(weak_value, Value::Null);
        assert_eq!(vm.heap.header(id).weak, 0);
    }

    #[test]
    fn list_children_are_released_on_teardown() {
        let mut vm = Vm::new(VmConfig::default());
        let child = vm.heap.allocate(ObjBody::Str("child".to_string()));
        let list = vm.heap.allocate(ObjBody::List(vec![Value::object(child)]));
        vm.publish(Value::Null, Value::object(child)); // list owns child
        vm.retain(list); // adopt into a slot
        vm.release(list);
        vm.process_deferred_releases();
        assert!(vm.heap.body(list).is_none());
        assert!(vm.heap.is_dead(child));
        vm.run_cleanup();
        assert!(vm.heap.body(child).is_none());
    }

    #[test]
    fn published_binding_owns_its_receiver() {
        let mut vm = Vm::new(VmConfig::default());
        let class = vm.heap.allocate(ObjBody::Class(Default::default()));
        let inst = vm.heap.allocate(ObjBody::Instance(crate::object::InstanceObj {
            class,
            fields: Default::default(),
        }));
        let bound = vm
            .heap
            .allocate(ObjBody::BoundMethod(crate::object::BoundMethodObj {
                receiver: inst,
                method: Value::Null,
                is_mutating: false,
            }));
        // storing the binding in a durable slot takes the receiver
        vm.publish(Value::Null, Value::object(bound));
        assert!(!vm.heap.header(inst).has_creator_ref);
        // dropping the slot releases the binding, and its teardown drops
        // the receiver in turn
        vm.publish(Value::object(bound), Value::Null);
        vm.run_cleanup();
        assert!(vm.heap.body(bound).is_none());
        assert!(vm.heap.body(inst).is_none());
    }

    #[test]
    fn child_release_circling_back_does_not_double_free() {
        let mut vm = Vm::new(VmConfig::default());
        let class = vm.heap.allocate(ObjBody::Class(Default::default()));
        let inst = vm.heap.allocate(ObjBody::Instance(crate::object::InstanceObj {
            class,
            fields: Default::default(),
        }));
        let bound = vm
            .heap
            .allocate(ObjBody::BoundMethod(crate::object::BoundMethodObj {
                receiver: inst,
                method: Value::Null,
                is_mutating: false,
            }));
        // hand-built cycle: the field references the binding without a
        // matching retain, so the teardown walk circles back into it
        if let Some(ObjBody::Instance(body)) = vm.heap.body_mut(inst) {
            body.fields.insert("m".to_string(), Value::object(bound));
        }
        vm.retain(bound); // adopt into a slot
        vm.release(bound);
        vm.run_cleanup();
        // both torn down exactly once, guarded by the deleted set
        assert!(vm.heap.body(bound).is_none());
        assert!(vm.heap.body(inst).is_none());
    }

    #[test]
    fn deep_copy_distinguishes_nested_struct_instances() {
        let mut vm = Vm::new(VmConfig::default());
        let ty = vm.heap.allocate(ObjBody::Struct(Default::default()));
        let inner = vm
            .heap
            .allocate(ObjBody::StructInstance(crate::object::StructInstanceObj {
                struct_type: ty,
                fields: [("v".to_string(), Value::Int(1))].into_iter().collect(),
            }));
        let outer = vm
            .heap
            .allocate(ObjBody::StructInstance(crate::object::StructInstanceObj {
                struct_type: ty,
                fields: [("inner".to_string(), Value::object(inner))]
                    .into_iter()
                    .collect(),
            }));
        let copy = vm.deep_copy_struct(outer);
        assert_ne!(copy, outer);
        let copied_inner = match vm.heap.body(copy) {
            Some(ObjBody::StructInstance(inst)) => inst.fields["inner"],
            _ => panic!("expected struct instance"),
        };
        let copied_inner = copied_inner.as_obj().unwrap().id;
        assert_ne!(copied_inner, inner);
        match vm.heap.body(copied_inner) {
            Some(ObjBody::StructInstance(inst)) => {
                assert_eq!(inst.fields["v"], Value::Int(1));
            }
            _ => panic!("expected nested struct instance"),
        }
    }
}
