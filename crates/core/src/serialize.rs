//! Versioned binary format for assemblies.
//!
//! Layout: `magic 'SSAS' (LE u32) | verMajor u16 | verMinor u16 | body`.
//! Container scalars are little-endian; strings are u32-length-prefixed
//! UTF-8; vectors are u32-count-prefixed. Bytecode immediates inside the
//! code vector keep their big-endian encoding untouched.
//!
//! Nested function prototypes serialize their chunks recursively, so one
//! stream restores the whole compilation unit.

use crate::chunk::{
    Assembly, DefRange, FieldDef, FunctionProto, Manifest, MethodBody, MethodDef, ParamDefault,
    PropertyDef, ProtocolDef, ProtocolMethodReq, ProtocolPropertyReq, TypeDef, UpvalueDesc,
};
use crate::error::AssemblyError;
use crate::value::{RefKind, Value};
use std::rc::Rc;

pub const MAGIC: u32 = 0x5341_5353; // "SSAS" little-endian
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 2;

const TAG_NULL: u8 = 0;
const TAG_UNDEFINED: u8 = 1;
const TAG_BOOL: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_FLOAT: u8 = 4;

// ---- writer helpers ----

fn put_u8(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_i64(out: &mut Vec<u8>, v: i64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_f64(out: &mut Vec<u8>, v: f64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

fn put_bool(out: &mut Vec<u8>, b: bool) {
    put_u8(out, if b { 1 } else { 0 });
}

fn put_value(out: &mut Vec<u8>, v: &Value) -> Result<(), AssemblyError> {
    match v {
        Value::Null => {
            put_u8(out, TAG_NULL);
            put_u8(out, RefKind::Strong as u8);
        }
        Value::Undefined => {
            put_u8(out, TAG_UNDEFINED);
            put_u8(out, RefKind::Strong as u8);
        }
        Value::Bool(b) => {
            put_u8(out, TAG_BOOL);
            put_u8(out, RefKind::Strong as u8);
            put_bool(out, *b);
        }
        Value::Int(i) => {
            put_u8(out, TAG_INT);
            put_u8(out, RefKind::Strong as u8);
            put_i64(out, *i);
        }
        Value::Float(f) => {
            put_u8(out, TAG_FLOAT);
            put_u8(out, RefKind::Strong as u8);
            put_f64(out, *f);
        }
        // Object handles are runtime addresses.
        Value::Obj(_) => return Err(AssemblyError::ObjectConstant),
    }
    Ok(())
}

// ---- reader ----

/// Cursor over a byte slice with typed reads, after the record readers in
/// llvm-bitcode's `read.rs`.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Reader<'a> {
        Reader { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], AssemblyError> {
        if self.pos + n > self.bytes.len() {
            return Err(AssemblyError::Truncated);
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, AssemblyError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, AssemblyError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, AssemblyError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i64(&mut self) -> Result<i64, AssemblyError> {
        let b = self.take(8)?;
        Ok(i64::from_le_bytes(b.try_into().unwrap()))
    }

    fn f64(&mut self) -> Result<f64, AssemblyError> {
        let b = self.take(8)?;
        Ok(f64::from_le_bytes(b.try_into().unwrap()))
    }

    fn boolean(&mut self) -> Result<bool, AssemblyError> {
        Ok(self.u8()? != 0)
    }

    fn string(&mut self) -> Result<String, AssemblyError> {
        let n = self.u32()? as usize;
        let bytes = self.take(n)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| AssemblyError::InvalidUtf8)
    }

    fn value(&mut self) -> Result<Value, AssemblyError> {
        let tag = self.u8()?;
        let ref_byte = self.u8()?;
        RefKind::from_byte(ref_byte).ok_or(AssemblyError::InvalidTag(ref_byte))?;
        match tag {
            TAG_NULL => Ok(Value::Null),
            TAG_UNDEFINED => Ok(Value::Undefined),
            TAG_BOOL => Ok(Value::Bool(self.boolean()?)),
            TAG_INT => Ok(Value::Int(self.i64()?)),
            TAG_FLOAT => Ok(Value::Float(self.f64()?)),
            other => Err(AssemblyError::InvalidTag(other)),
        }
    }
}

// ---- body writers ----

fn put_proto(out: &mut Vec<u8>, proto: &FunctionProto) -> Result<(), AssemblyError> {
    put_str(out, &proto.name);

    put_u32(out, proto.params.len() as u32);
    for p in &proto.params {
        put_str(out, p);
    }

    put_u32(out, proto.param_labels.len() as u32);
    for l in &proto.param_labels {
        put_str(out, l);
    }

    put_u32(out, proto.param_defaults.len() as u32);
    for d in &proto.param_defaults {
        put_bool(out, d.has_default);
        if d.has_default {
            put_value(out, &d.value)?;
            put_bool(out, d.symbol.is_some());
            if let Some(sym) = &d.symbol {
                put_str(out, sym);
            }
        }
    }

    put_u32(out, proto.upvalues.len() as u32);
    for u in &proto.upvalues {
        put_u16(out, u.index);
        put_bool(out, u.is_local);
    }

    put_bool(out, proto.is_initializer);
    put_bool(out, proto.is_override);

    put_bool(out, proto.chunk.is_some());
    if let Some(chunk) = &proto.chunk {
        write_assembly(out, chunk)?;
    }
    Ok(())
}

fn put_protocol(out: &mut Vec<u8>, proto: &ProtocolDef) {
    put_str(out, &proto.name);

    put_u32(out, proto.method_requirements.len() as u32);
    for m in &proto.method_requirements {
        put_str(out, &m.name);
        put_u32(out, m.param_names.len() as u32);
        for p in &m.param_names {
            put_str(out, p);
        }
        put_bool(out, m.is_mutating);
    }

    put_u32(out, proto.property_requirements.len() as u32);
    for p in &proto.property_requirements {
        put_str(out, &p.name);
        put_bool(out, p.has_getter);
        put_bool(out, p.has_setter);
    }

    put_u32(out, proto.inherited_protocols.len() as u32);
    for i in &proto.inherited_protocols {
        put_str(out, i);
    }
}

fn write_assembly(out: &mut Vec<u8>, asm: &Assembly) -> Result<(), AssemblyError> {
    put_u32(out, MAGIC);
    put_u16(out, VERSION_MAJOR);
    put_u16(out, VERSION_MINOR);

    put_u32(out, asm.code.len() as u32);
    out.extend_from_slice(&asm.code);

    put_u32(out, asm.lines.len() as u32);
    for line in &asm.lines {
        put_u32(out, *line);
    }

    put_u32(out, asm.constants.len() as u32);
    for v in &asm.constants {
        put_value(out, v)?;
    }

    put_u32(out, asm.strings.len() as u32);
    for s in &asm.strings {
        put_str(out, s);
    }

    put_u32(out, asm.functions.len() as u32);
    for fun in &asm.functions {
        put_proto(out, fun)?;
    }

    put_u32(out, asm.protocols.len() as u32);
    for p in &asm.protocols {
        put_protocol(out, p);
    }

    // Version (1, >=1) trailer: manifest, definition tables, global pool,
    // signature blob, method bodies.
    put_str(out, &asm.manifest.name);
    put_u16(out, asm.manifest.version_major);
    put_u16(out, asm.manifest.version_minor);

    put_u32(out, asm.type_definitions.len() as u32);
    for t in &asm.type_definitions {
        put_u32(out, t.name);
        put_u32(out, t.namespace_name);
        put_u32(out, t.flags);
        put_u32(out, t.base_type);
        put_u32(out, t.method_list.start);
        put_u32(out, t.method_list.count);
        put_u32(out, t.field_list.start);
        put_u32(out, t.field_list.count);
        put_u32(out, t.property_list.start);
        put_u32(out, t.property_list.count);
        put_u32(out, t.interfaces.len() as u32);
        for i in &t.interfaces {
            put_u32(out, *i);
        }
    }

    put_u32(out, asm.method_definitions.len() as u32);
    for m in &asm.method_definitions {
        put_u32(out, m.name);
        put_u32(out, m.flags);
        put_u32(out, m.signature);
        put_u32(out, m.body_ptr);
    }

    put_u32(out, asm.field_definitions.len() as u32);
    for f in &asm.field_definitions {
        put_u32(out, f.name);
        put_u32(out, f.flags);
        put_u32(out, f.type_name);
    }

    put_u32(out, asm.property_definitions.len() as u32);
    for p in &asm.property_definitions {
        put_u32(out, p.name);
        put_u32(out, p.flags);
        put_u32(out, p.type_name);
        put_u32(out, p.getter);
        put_u32(out, p.setter);
    }

    put_u32(out, asm.global_constant_pool.len() as u32);
    for v in &asm.global_constant_pool {
        put_value(out, v)?;
    }

    put_u32(out, asm.signature_blob.len() as u32);
    out.extend_from_slice(&asm.signature_blob);

    put_u32(out, asm.method_bodies.len() as u32);
    for b in &asm.method_bodies {
        put_u32(out, b.bytecode.len() as u32);
        out.extend_from_slice(&b.bytecode);
        put_u32(out, b.line_info.len() as u32);
        for line in &b.line_info {
            put_u32(out, *line);
        }
        put_u32(out, b.max_stack_depth);
    }

    Ok(())
}

// ---- body readers ----

fn read_proto(r: &mut Reader<'_>) -> Result<FunctionProto, AssemblyError> {
    let name = r.string()?;

    let n = r.u32()? as usize;
    let mut params = Vec::with_capacity(n);
    for _ in 0..n {
        params.push(r.string()?);
    }

    let n = r.u32()? as usize;
    let mut param_labels = Vec::with_capacity(n);
    for _ in 0..n {
        param_labels.push(r.string()?);
    }

    let n = r.u32()? as usize;
    let mut param_defaults = Vec::with_capacity(n);
    for _ in 0..n {
        let has_default = r.boolean()?;
        if has_default {
            let value = r.value()?;
            let symbol = if r.boolean()? { Some(r.string()?) } else { None };
            param_defaults.push(ParamDefault {
                has_default,
                value,
                symbol,
            });
        } else {
            param_defaults.push(ParamDefault::none());
        }
    }

    let n = r.u32()? as usize;
    let mut upvalues = Vec::with_capacity(n);
    for _ in 0..n {
        let index = r.u16()?;
        let is_local = r.boolean()?;
        upvalues.push(UpvalueDesc { index, is_local });
    }

    let is_initializer = r.boolean()?;
    let is_override = r.boolean()?;

    let chunk = if r.boolean()? {
        Some(Rc::new(read_assembly(r)?))
    } else {
        None
    };

    Ok(FunctionProto {
        name,
        params,
        param_labels,
        param_defaults,
        chunk,
        upvalues,
        is_initializer,
        is_override,
    })
}

fn read_protocol(r: &mut Reader<'_>) -> Result<ProtocolDef, AssemblyError> {
    let name = r.string()?;

    let n = r.u32()? as usize;
    let mut method_requirements = Vec::with_capacity(n);
    for _ in 0..n {
        let name = r.string()?;
        let pn = r.u32()? as usize;
        let mut param_names = Vec::with_capacity(pn);
        for _ in 0..pn {
            param_names.push(r.string()?);
        }
        let is_mutating = r.boolean()?;
        method_requirements.push(ProtocolMethodReq {
            name,
            param_names,
            is_mutating,
        });
    }

    let n = r.u32()? as usize;
    let mut property_requirements = Vec::with_capacity(n);
    for _ in 0..n {
        let name = r.string()?;
        let has_getter = r.boolean()?;
        let has_setter = r.boolean()?;
        property_requirements.push(ProtocolPropertyReq {
            name,
            has_getter,
            has_setter,
        });
    }

    let n = r.u32()? as usize;
    let mut inherited_protocols = Vec::with_capacity(n);
    for _ in 0..n {
        inherited_protocols.push(r.string()?);
    }

    Ok(ProtocolDef {
        name,
        method_requirements,
        property_requirements,
        inherited_protocols,
    })
}

fn read_assembly(r: &mut Reader<'_>) -> Result<Assembly, AssemblyError> {
    let magic = r.u32()?;
    if magic != MAGIC {
        return Err(AssemblyError::BadMagic(magic));
    }
    let major = r.u16()?;
    if major != VERSION_MAJOR {
        return Err(AssemblyError::VersionMismatch {
            found: major,
            expected: VERSION_MAJOR,
        });
    }
    let minor = r.u16()?;
    if minor > VERSION_MINOR {
        return Err(AssemblyError::UnsupportedMinor {
            found: minor,
            supported: VERSION_MINOR,
        });
    }

    let mut asm = Assembly::new();

    let n = r.u32()? as usize;
    asm.code = r.take(n)?.to_vec();

    let n = r.u32()? as usize;
    asm.lines = Vec::with_capacity(n);
    for _ in 0..n {
        asm.lines.push(r.u32()?);
    }

    let n = r.u32()? as usize;
    asm.constants = Vec::with_capacity(n);
    for _ in 0..n {
        asm.constants.push(r.value()?);
    }

    let n = r.u32()? as usize;
    asm.strings = Vec::with_capacity(n);
    for _ in 0..n {
        asm.strings.push(r.string()?);
    }

    let n = r.u32()? as usize;
    asm.functions = Vec::with_capacity(n);
    for _ in 0..n {
        asm.functions.push(read_proto(r)?);
    }

    let n = r.u32()? as usize;
    asm.protocols = Vec::with_capacity(n);
    for _ in 0..n {
        asm.protocols.push(read_protocol(r)?);
    }

    if minor >= 1 {
        asm.manifest = Manifest {
            name: r.string()?,
            version_major: r.u16()?,
            version_minor: r.u16()?,
        };

        let n = r.u32()? as usize;
        asm.type_definitions = Vec::with_capacity(n);
        for _ in 0..n {
            let name = r.u32()?;
            let namespace_name = r.u32()?;
            let flags = r.u32()?;
            let base_type = r.u32()?;
            let method_list = DefRange {
                start: r.u32()?,
                count: r.u32()?,
            };
            let field_list = DefRange {
                start: r.u32()?,
                count: r.u32()?,
            };
            let property_list = DefRange {
                start: r.u32()?,
                count: r.u32()?,
            };
            let ifc = r.u32()? as usize;
            let mut interfaces = Vec::with_capacity(ifc);
            for _ in 0..ifc {
                interfaces.push(r.u32()?);
            }
            asm.type_definitions.push(TypeDef {
                name,
                namespace_name,
                flags,
                base_type,
                method_list,
                field_list,
                property_list,
                interfaces,
            });
        }

        let n = r.u32()? as usize;
        asm.method_definitions = Vec::with_capacity(n);
        for _ in 0..n {
            asm.method_definitions.push(MethodDef {
                name: r.u32()?,
                flags: r.u32()?,
                signature: r.u32()?,
                body_ptr: r.u32()?,
            });
        }

        let n = r.u32()? as usize;
        asm.field_definitions = Vec::with_capacity(n);
        for _ in 0..n {
            asm.field_definitions.push(FieldDef {
                name: r.u32()?,
                flags: r.u32()?,
                type_name: r.u32()?,
            });
        }

        let n = r.u32()? as usize;
        asm.property_definitions = Vec::with_capacity(n);
        for _ in 0..n {
            asm.property_definitions.push(PropertyDef {
                name: r.u32()?,
                flags: r.u32()?,
                type_name: r.u32()?,
                getter: r.u32()?,
                setter: r.u32()?,
            });
        }

        let n = r.u32()? as usize;
        asm.global_constant_pool = Vec::with_capacity(n);
        for _ in 0..n {
            asm.global_constant_pool.push(r.value()?);
        }

        let n = r.u32()? as usize;
        asm.signature_blob = r.take(n)?.to_vec();

        let n = r.u32()? as usize;
        asm.method_bodies = Vec::with_capacity(n);
        for _ in 0..n {
            let bn = r.u32()? as usize;
            let bytecode = r.take(bn)?.to_vec();
            let ln = r.u32()? as usize;
            let mut line_info = Vec::with_capacity(ln);
            for _ in 0..ln {
                line_info.push(r.u32()?);
            }
            let max_stack_depth = r.u32()?;
            asm.method_bodies.push(MethodBody {
                bytecode,
                line_info,
                max_stack_depth,
            });
        }
    }

    Ok(asm)
}

impl Assembly {
    /// Encodes the assembly into `out`. Object-typed constants are an error.
    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<(), AssemblyError> {
        write_assembly(out, self)
    }

    /// Restores an assembly, validating magic and version.
    pub fn deserialize(bytes: &[u8]) -> Result<Assembly, AssemblyError> {
        let mut reader = Reader::new(bytes);
        read_assembly(&mut reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;

    fn sample_assembly() -> Assembly {
        let mut asm = Assembly::new();
        asm.write_op(Opcode::Constant, 1);
        asm.write_short(0, 1);
        asm.write_op(Opcode::Print, 1);
        asm.write_op(Opcode::Halt, 2);
        asm.add_constant(Value::Int(42));
        asm.add_constant(Value::Float(2.5));
        asm.add_constant(Value::Bool(true));
        asm.add_string("greet");

        let mut body = Assembly::new();
        body.write_op(Opcode::Nil, 3);
        body.write_op(Opcode::Return, 3);
        asm.add_function(FunctionProto {
            name: "greet".to_string(),
            params: vec!["who".to_string()],
            param_labels: vec!["for".to_string()],
            param_defaults: vec![ParamDefault::symbolic("world".to_string())],
            chunk: Some(Rc::new(body)),
            upvalues: vec![UpvalueDesc {
                index: 1,
                is_local: true,
            }],
            is_initializer: false,
            is_override: false,
        });
        asm.add_protocol(ProtocolDef {
            name: "Greeter".to_string(),
            method_requirements: vec![ProtocolMethodReq {
                name: "greet".to_string(),
                param_names: vec!["who".to_string()],
                is_mutating: false,
            }],
            property_requirements: vec![ProtocolPropertyReq {
                name: "name".to_string(),
                has_getter: true,
                has_setter: false,
            }],
            inherited_protocols: vec![],
        });
        asm.manifest.name = "Sample".to_string();
        asm.expand_to_assembly();
        asm
    }

    #[test]
    fn round_trip_restores_structure() {
        let asm = sample_assembly();
        let mut bytes = Vec::new();
        asm.serialize(&mut bytes).unwrap();
        let restored = Assembly::deserialize(&bytes).unwrap();
        assert_eq!(restored, asm);
    }

    #[test]
    fn second_serialize_is_byte_identical() {
        let asm = sample_assembly();
        let mut first = Vec::new();
        asm.serialize(&mut first).unwrap();
        let restored = Assembly::deserialize(&first).unwrap();
        let mut second = Vec::new();
        restored.serialize(&mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = Vec::new();
        sample_assembly().serialize(&mut bytes).unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            Assembly::deserialize(&bytes),
            Err(AssemblyError::BadMagic(_))
        ));
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let mut bytes = Vec::new();
        sample_assembly().serialize(&mut bytes).unwrap();
        bytes.truncate(bytes.len() / 2);
        assert!(matches!(
            Assembly::deserialize(&bytes),
            Err(AssemblyError::Truncated)
        ));
    }

    #[test]
    fn newer_minor_version_is_refused() {
        let mut bytes = Vec::new();
        sample_assembly().serialize(&mut bytes).unwrap();
        // minor version lives at offset 6
        bytes[6] = (VERSION_MINOR + 1) as u8;
        bytes[7] = 0;
        assert!(matches!(
            Assembly::deserialize(&bytes),
            Err(AssemblyError::UnsupportedMinor { .. })
        ));
    }

    #[test]
    fn object_constant_fails_serialization() {
        use crate::value::ObjId;
        let mut asm = Assembly::new();
        asm.add_constant(Value::object(ObjId(3)));
        let mut bytes = Vec::new();
        assert_eq!(
            asm.serialize(&mut bytes),
            Err(AssemblyError::ObjectConstant)
        );
    }
}
