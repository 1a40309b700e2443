//! Heap object variants.
//!
//! Every heap object is a header (reference-count state, see `heap`) plus
//! one of these bodies. Bodies hold plain `Value` cells for their children;
//! ownership bookkeeping lives entirely in the RC engine.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use swive_core::chunk::{Assembly, ParamDefault, UpvalueDesc};
use swive_core::value::{ObjId, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjKind {
    String,
    List,
    Map,
    Function,
    Closure,
    Upvalue,
    Class,
    Instance,
    Struct,
    StructInstance,
    Enum,
    EnumCase,
    Protocol,
    BoundMethod,
    BuiltinMethod,
    Tuple,
    Range,
}

pub fn kind_name(kind: ObjKind) -> &'static str {
    match kind {
        ObjKind::String => "String",
        ObjKind::List => "List",
        ObjKind::Map => "Map",
        ObjKind::Function => "Function",
        ObjKind::Closure => "Closure",
        ObjKind::Upvalue => "Upvalue",
        ObjKind::Class => "Class",
        ObjKind::Instance => "Instance",
        ObjKind::Struct => "Struct",
        ObjKind::StructInstance => "StructInstance",
        ObjKind::Enum => "Enum",
        ObjKind::EnumCase => "EnumCase",
        ObjKind::Protocol => "Protocol",
        ObjKind::BoundMethod => "BoundMethod",
        ObjKind::BuiltinMethod => "BuiltinMethod",
        ObjKind::Tuple => "Tuple",
        ObjKind::Range => "Range",
    }
}

/// Stored-property descriptor on a class or struct type.
#[derive(Debug, Clone)]
pub struct PropertyInfo {
    pub name: String,
    pub default_value: Value,
    pub is_let: bool,
    pub is_lazy: bool,
    /// One-parameter function `(self)`, Null unless `is_lazy`.
    pub lazy_initializer: Value,
    /// Function `(self, newValue)` or Null.
    pub will_set: Value,
    /// Function `(self, oldValue)` or Null.
    pub did_set: Value,
}

#[derive(Debug, Clone)]
pub struct ComputedProperty {
    pub name: String,
    /// Function `(self)`.
    pub getter: Value,
    /// Function `(self, newValue)` or Null for read-only.
    pub setter: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ClassObj {
    pub name: String,
    pub methods: HashMap<String, Value>,
    pub static_methods: HashMap<String, Value>,
    pub static_properties: HashMap<String, Value>,
    pub properties: Vec<PropertyInfo>,
    pub computed_properties: Vec<ComputedProperty>,
    pub superclass: Option<ObjId>,
}

#[derive(Debug, Clone, Default)]
pub struct StructTypeObj {
    pub name: String,
    pub methods: HashMap<String, Value>,
    pub static_methods: HashMap<String, Value>,
    pub static_properties: HashMap<String, Value>,
    pub properties: Vec<PropertyInfo>,
    pub computed_properties: Vec<ComputedProperty>,
    pub mutating_methods: HashSet<String>,
}

#[derive(Debug, Clone)]
pub struct InstanceObj {
    pub class: ObjId,
    pub fields: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct StructInstanceObj {
    pub struct_type: ObjId,
    pub fields: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct EnumTypeObj {
    pub name: String,
    pub methods: HashMap<String, Value>,
    /// Case name to the registered template case object.
    pub cases: HashMap<String, Value>,
    pub case_order: Vec<String>,
    pub computed_properties: Vec<ComputedProperty>,
}

#[derive(Debug, Clone)]
pub struct EnumCaseObj {
    pub enum_type: ObjId,
    pub case_name: String,
    pub raw_value: Value,
    pub associated: Vec<Value>,
    pub labels: Vec<Option<String>>,
}

#[derive(Debug, Clone)]
pub struct ProtocolObj {
    pub name: String,
    pub method_requirements: Vec<String>,
    pub property_requirements: Vec<String>,
}

/// Runtime function: a materialized prototype.
#[derive(Debug, Clone)]
pub struct FunctionObj {
    pub name: String,
    pub params: Vec<String>,
    pub param_labels: Vec<String>,
    pub param_defaults: Vec<ParamDefault>,
    pub chunk: Option<Rc<Assembly>>,
    pub upvalues: Vec<UpvalueDesc>,
    pub is_initializer: bool,
    pub is_override: bool,
}

#[derive(Debug, Clone)]
pub struct ClosureObj {
    pub function: ObjId,
    pub upvalues: Vec<ObjId>,
}

/// An upvalue either addresses a live stack slot or owns its closed cell.
#[derive(Debug, Clone)]
pub enum UpvalueState {
    Open(usize),
    Closed(Value),
}

#[derive(Debug, Clone)]
pub struct BoundMethodObj {
    pub receiver: ObjId,
    pub method: Value,
    pub is_mutating: bool,
}

/// Receiver plus a method name dispatched natively by the VM.
#[derive(Debug, Clone)]
pub struct BuiltinMethodObj {
    pub target: Option<ObjId>,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct TupleObj {
    pub elements: Vec<Value>,
    pub labels: Vec<Option<String>>,
}

impl TupleObj {
    pub fn get_by_index(&self, index: usize) -> Option<Value> {
        self.elements.get(index).copied()
    }

    pub fn get_by_label(&self, label: &str) -> Option<Value> {
        self.labels
            .iter()
            .position(|l| l.as_deref() == Some(label))
            .and_then(|i| self.elements.get(i).copied())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RangeObj {
    pub start: i64,
    pub end: i64,
    pub inclusive: bool,
}

impl RangeObj {
    pub fn count(&self) -> i64 {
        let upper = if self.inclusive { self.end + 1 } else { self.end };
        (upper - self.start).max(0)
    }

    pub fn contains(&self, v: i64) -> bool {
        if self.inclusive {
            v >= self.start && v <= self.end
        } else {
            v >= self.start && v < self.end
        }
    }
}

#[derive(Debug, Clone)]
pub enum ObjBody {
    Str(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    Function(FunctionObj),
    Closure(ClosureObj),
    Upvalue(UpvalueState),
    Class(ClassObj),
    Instance(InstanceObj),
    Struct(StructTypeObj),
    StructInstance(StructInstanceObj),
    Enum(EnumTypeObj),
    EnumCase(EnumCaseObj),
    Protocol(ProtocolObj),
    BoundMethod(BoundMethodObj),
    BuiltinMethod(BuiltinMethodObj),
    Tuple(TupleObj),
    Range(RangeObj),
}

impl ObjBody {
    pub fn kind(&self) -> ObjKind {
        match self {
            ObjBody::Str(_) => ObjKind::String,
            ObjBody::List(_) => ObjKind::List,
            ObjBody::Map(_) => ObjKind::Map,
            ObjBody::Function(_) => ObjKind::Function,
            ObjBody::Closure(_) => ObjKind::Closure,
            ObjBody::Upvalue(_) => ObjKind::Upvalue,
            ObjBody::Class(_) => ObjKind::Class,
            ObjBody::Instance(_) => ObjKind::Instance,
            ObjBody::Struct(_) => ObjKind::Struct,
            ObjBody::StructInstance(_) => ObjKind::StructInstance,
            ObjBody::Enum(_) => ObjKind::Enum,
            ObjBody::EnumCase(_) => ObjKind::EnumCase,
            ObjBody::Protocol(_) => ObjKind::Protocol,
            ObjBody::BoundMethod(_) => ObjKind::BoundMethod,
            ObjBody::BuiltinMethod(_) => ObjKind::BuiltinMethod,
            ObjBody::Tuple(_) => ObjKind::Tuple,
            ObjBody::Range(_) => ObjKind::Range,
        }
    }

    /// Approximate retained size, charged to the VM's statistics.
    pub fn memory_size(&self) -> usize {
        const VALUE: usize = std::mem::size_of::<Value>();
        let base = std::mem::size_of::<ObjBody>();
        base + match self {
            ObjBody::Str(s) => s.capacity(),
            ObjBody::List(items) => items.capacity() * VALUE,
            ObjBody::Map(entries) => entries
                .iter()
                .map(|(k, _)| k.capacity() + VALUE)
                .sum::<usize>(),
            ObjBody::Function(f) => {
                f.name.capacity()
                    + f.params.iter().map(|p| p.capacity()).sum::<usize>()
                    + f.param_labels.iter().map(|l| l.capacity()).sum::<usize>()
                    + f.param_defaults.capacity() * std::mem::size_of::<ParamDefault>()
            }
            ObjBody::Closure(c) => c.upvalues.capacity() * std::mem::size_of::<ObjId>(),
            ObjBody::Upvalue(_) => 0,
            ObjBody::Class(c) => {
                c.name.capacity()
                    + c.methods.iter().map(|(k, _)| k.capacity() + VALUE).sum::<usize>()
                    + c.static_methods.iter().map(|(k, _)| k.capacity() + VALUE).sum::<usize>()
                    + c.static_properties.iter().map(|(k, _)| k.capacity() + VALUE).sum::<usize>()
                    + c.properties.iter().map(|p| p.name.capacity() + VALUE).sum::<usize>()
                    + c.computed_properties.iter().map(|p| p.name.capacity() + 2 * VALUE).sum::<usize>()
            }
            ObjBody::Struct(s) => {
                s.name.capacity()
                    + s.methods.iter().map(|(k, _)| k.capacity() + VALUE).sum::<usize>()
                    + s.static_methods.iter().map(|(k, _)| k.capacity() + VALUE).sum::<usize>()
                    + s.static_properties.iter().map(|(k, _)| k.capacity() + VALUE).sum::<usize>()
                    + s.properties.iter().map(|p| p.name.capacity() + VALUE).sum::<usize>()
                    + s.computed_properties.iter().map(|p| p.name.capacity() + 2 * VALUE).sum::<usize>()
            }
            ObjBody::Instance(i) => i
                .fields
                .iter()
                .map(|(k, _)| k.capacity() + VALUE)
                .sum::<usize>(),
            ObjBody::StructInstance(i) => i
                .fields
                .iter()
                .map(|(k, _)| k.capacity() + VALUE)
                .sum::<usize>(),
            ObjBody::Enum(e) => {
                e.name.capacity()
                    + e.methods.iter().map(|(k, _)| k.capacity() + VALUE).sum::<usize>()
                    + e.cases.iter().map(|(k, _)| k.capacity() + VALUE).sum::<usize>()
            }
            ObjBody::EnumCase(c) => {
                c.case_name.capacity()
                    + c.associated.capacity() * VALUE
                    + c.labels
                        .iter()
                        .map(|l| l.as_ref().map(|s| s.capacity()).unwrap_or(0))
                        .sum::<usize>()
            }
            ObjBody::Protocol(p) => {
                p.name.capacity()
                    + p.method_requirements.iter().map(|m| m.capacity()).sum::<usize>()
                    + p.property_requirements.iter().map(|m| m.capacity()).sum::<usize>()
            }
            ObjBody::BoundMethod(_) => 0,
            ObjBody::BuiltinMethod(b) => b.name.capacity(),
            ObjBody::Tuple(t) => {
                t.elements.capacity() * VALUE
                    + t.labels
                        .iter()
                        .map(|l| l.as_ref().map(|s| s.capacity()).unwrap_or(0))
                        .sum::<usize>()
            }
            ObjBody::Range(_) => 0,
        }
    }
}
