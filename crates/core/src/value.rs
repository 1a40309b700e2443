//! Tagged value cell shared by the compiler's constant pool and the VM.
//!
//! A `Value` is a 16-byte cell: a discriminant, a reference-discipline tag
//! (meaningful only for object payloads) and an 8-byte payload. Scalars are
//! stored inline; objects are handles into the VM's object table.

use std::fmt;

/// Reference discipline attached to an object-typed value.
///
/// `Strong` participates in reference counting, `Weak` observes death and
/// reads as nil afterwards, `Unowned` neither counts nor auto-nils.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RefKind {
    #[default]
    Strong = 0,
    Weak = 1,
    Unowned = 2,
}

impl RefKind {
    pub fn from_byte(b: u8) -> Option<RefKind> {
        match b {
            0 => Some(RefKind::Strong),
            1 => Some(RefKind::Weak),
            2 => Some(RefKind::Unowned),
            _ => None,
        }
    }
}

/// Handle to a heap object: an index into the VM's all-objects table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjId(pub u32);

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Object payload together with its reference discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjRef {
    pub id: ObjId,
    pub kind: RefKind,
}

/// The universal value cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Null,
    Undefined,
    Bool(bool),
    Int(i64),
    Float(f64),
    Obj(ObjRef),
}

// The cell must stay pointer-pair sized; the VM stack is a flat Vec of these.
const _: () = assert!(std::mem::size_of::<Value>() == 16);

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    /// Strong reference to a heap object.
    pub fn object(id: ObjId) -> Value {
        Value::Obj(ObjRef {
            id,
            kind: RefKind::Strong,
        })
    }

    pub fn object_with(id: ObjId, kind: RefKind) -> Value {
        Value::Obj(ObjRef { id, kind })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Obj(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric read with int-to-float promotion.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_obj(&self) -> Option<ObjRef> {
        match self {
            Value::Obj(r) => Some(*r),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Undefined => "undefined",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Obj(_) => "object",
        }
    }
}

/// Scale-relative float comparison.
///
/// Not transitive; callers must not rely on chained equalities.
pub fn nearly_equal(a: f64, b: f64) -> bool {
    let diff = (a - b).abs();
    let scale = 1.0f64.max(a.abs()).max(b.abs());
    diff <= f64::EPSILON * scale
}

/// Scalar-only structural equality, used by the constant pool and as the
/// scalar half of the VM's value equality. Object handles compare by id.
pub fn scalar_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Undefined, Value::Undefined) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => nearly_equal(*x, *y),
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => {
            nearly_equal(*x as f64, *y)
        }
        (Value::Obj(x), Value::Obj(y)) => x.id == y.id,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_is_sixteen_bytes() {
        assert_eq!(std::mem::size_of::<Value>(), 16);
    }

    #[test]
    fn int_float_cross_equality_promotes() {
        assert!(scalar_equals(&Value::Int(3), &Value::Float(3.0)));
        assert!(!scalar_equals(&Value::Int(3), &Value::Float(3.5)));
    }

    #[test]
    fn float_equality_is_scale_relative() {
        let big = 1.0e15;
        assert!(nearly_equal(big, big + 0.0001));
        assert!(!nearly_equal(1.0, 1.0001));
    }

    #[test]
    fn as_float_promotes_ints() {
        assert_eq!(Value::Int(7).as_float(), Some(7.0));
        assert_eq!(Value::Bool(true).as_float(), None);
    }
}
