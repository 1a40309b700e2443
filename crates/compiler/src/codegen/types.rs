//! Type declaration lowering: classes, structs, enums, protocols and
//! extensions.
//!
//! A type builds at runtime: the shell opcode pushes an empty type object,
//! members attach to it one by one, inheritance and conformance apply
//! last, and `DEFINE_GLOBAL` publishes the finished type.

use super::error::CompileError;
use super::{Compiler, MethodEnv, RecordedField, RecordedMethod, RecordedType};
use crate::ast::{
    ClassDecl, DeclRef, EnumDecl, ExtensionDecl, FuncDecl, ProtocolDecl, Stmt, StructDecl, VarDecl,
};
use std::collections::HashSet;
use swive_core::chunk::{
    FieldFlags, MethodFlags, NO_LABEL, ProtocolDef, ProtocolMethodReq, ProtocolPropertyReq,
    TypeFlags, property_bits,
};
use swive_core::opcode::Opcode;

impl Compiler {
    fn method_env_for(
        &self,
        properties: &[VarDecl],
        methods: &[FuncDecl],
        has_superclass: bool,
        in_struct: bool,
    ) -> MethodEnv {
        let mut type_properties: HashSet<String> =
            properties.iter().map(|p| p.name.clone()).collect();
        // computed properties resolve through the same implicit-self path
        for p in properties {
            if p.accessors.is_some() {
                type_properties.insert(p.name.clone());
            }
        }
        let type_methods: HashSet<String> = methods
            .iter()
            .filter(|m| !m.is_static)
            .map(|m| m.name.clone())
            .collect();
        let weak_properties: HashSet<String> = properties
            .iter()
            .filter(|p| p.discipline == DeclRef::Weak)
            .map(|p| p.name.clone())
            .collect();
        MethodEnv {
            implicit_self: true,
            type_properties,
            type_methods,
            weak_properties,
            has_superclass,
            in_struct,
            is_mutating: false,
        }
    }

    fn param_signature(params: &[crate::ast::ParamDecl]) -> String {
        params
            .iter()
            .map(|p| {
                p.ty.as_ref()
                    .map(|t| t.mangled())
                    .unwrap_or_else(|| "_".to_string())
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Compiles one method body, emits its value plus the attach opcode,
    /// and records the body for the metadata tables.
    #[allow(clippy::too_many_arguments)]
    fn emit_method(
        &mut self,
        type_name: &str,
        method: &FuncDecl,
        env: MethodEnv,
        attach: Opcode,
        mutating_byte: Option<bool>,
        is_initializer: bool,
        recorded: &mut RecordedType,
    ) -> Result<(), CompileError> {
        let explicit_self = !method.is_static;
        let (idx, upvalues) = self.compile_function_body(
            &method.name,
            explicit_self,
            &[],
            &method.params,
            &method.body,
            env,
            is_initializer,
            method.is_override,
            method.line,
        )?;
        self.emit_function_value(idx, &upvalues, method.line)?;

        let name_idx = self.identifier_constant(&method.name, method.line)?;
        self.emit_op(attach, method.line);
        self.emit_short(name_idx, method.line);
        if let Some(mutating) = mutating_byte {
            self.emit_byte(mutating as u8, method.line);
        }

        let chunk = self.ctx_ref().chunk.functions[idx as usize]
            .chunk
            .clone()
            .ok_or_else(|| CompileError::new("method body has no chunk", method.line))?;
        let body = self.record_method_body(
            type_name,
            &method.name,
            method.is_static,
            &Self::param_signature(&method.params),
            &chunk,
        );
        let mut flags = MethodFlags::empty();
        if method.is_static {
            flags |= MethodFlags::STATIC;
        }
        if method.is_override {
            flags |= MethodFlags::OVERRIDE;
        }
        if method.is_mutating {
            flags |= MethodFlags::MUTATING;
        }
        recorded.methods.push(RecordedMethod {
            name: method.name.clone(),
            flags: flags.bits(),
            body,
        });
        Ok(())
    }

    /// Emits the value stack and `DEFINE_PROPERTY`/`COMPUTED_PROPERTY`
    /// opcodes for one property declaration.
    fn emit_property(
        &mut self,
        prop: &VarDecl,
        env: &MethodEnv,
        recorded: &mut RecordedType,
    ) -> Result<(), CompileError> {
        let line = prop.line;

        if let Some(accessors) = &prop.accessors {
            let (getter_idx, getter_ups) = self.compile_function_body(
                &prop.name,
                true,
                &[],
                &[],
                &accessors.getter,
                env.clone(),
                false,
                false,
                line,
            )?;
            self.emit_function_value(getter_idx, &getter_ups, line)?;
            let has_setter = accessors.setter.is_some();
            if let Some(setter) = &accessors.setter {
                let (setter_idx, setter_ups) = self.compile_function_body(
                    &prop.name,
                    true,
                    &["newValue"],
                    &[],
                    setter,
                    env.clone(),
                    false,
                    false,
                    line,
                )?;
                self.emit_function_value(setter_idx, &setter_ups, line)?;
            }
            let name_idx = self.identifier_constant(&prop.name, line)?;
            self.emit_op(Opcode::ComputedProperty, line);
            self.emit_short(name_idx, line);
            self.emit_byte(has_setter as u8, line);
            recorded.computed.push(prop.name.clone());
            return Ok(());
        }

        let mut flags = 0u8;
        if prop.is_let {
            flags |= property_bits::LET;
        }
        if prop.is_static {
            flags |= property_bits::STATIC;
        }

        if prop.is_lazy {
            flags |= property_bits::LAZY;
            let Some(initializer) = &prop.initializer else {
                return Err(CompileError::new(
                    format!("lazy property '{}' requires an initializer", prop.name),
                    line,
                ));
            };
            // the initializer defers into a `(self)` thunk, run on first read
            let body = vec![Stmt::Return {
                value: Some(initializer.clone()),
                line,
            }];
            let (idx, ups) = self.compile_function_body(
                &prop.name,
                true,
                &[],
                &[],
                &body,
                env.clone(),
                false,
                false,
                line,
            )?;
            self.emit_function_value(idx, &ups, line)?;
        } else {
            match &prop.initializer {
                Some(initializer) => self.compile_expr(initializer)?,
                None => self.emit_op(Opcode::Nil, line),
            }
        }

        if let Some(observers) = &prop.observers {
            if let Some(will_set) = &observers.will_set {
                flags |= property_bits::WILL_SET;
                let (idx, ups) = self.compile_function_body(
                    &prop.name,
                    true,
                    &["newValue"],
                    &[],
                    will_set,
                    env.clone(),
                    false,
                    false,
                    line,
                )?;
                self.emit_function_value(idx, &ups, line)?;
            }
            if let Some(did_set) = &observers.did_set {
                flags |= property_bits::DID_SET;
                let (idx, ups) = self.compile_function_body(
                    &prop.name,
                    true,
                    &["oldValue"],
                    &[],
                    did_set,
                    env.clone(),
                    false,
                    false,
                    line,
                )?;
                self.emit_function_value(idx, &ups, line)?;
            }
        }

        let name_idx = self.identifier_constant(&prop.name, line)?;
        self.emit_op(Opcode::DefineProperty, line);
        self.emit_short(name_idx, line);
        self.emit_byte(flags, line);

        let mut field_flags = FieldFlags::PUBLIC;
        if !prop.is_let {
            field_flags |= FieldFlags::MUTABLE;
        }
        if prop.is_static {
            field_flags |= FieldFlags::STATIC;
        }
        recorded.fields.push(RecordedField {
            name: prop.name.clone(),
            flags: field_flags.bits(),
            type_name: prop
                .ty
                .as_ref()
                .map(|t| t.mangled())
                .unwrap_or_else(|| "Any".to_string()),
        });
        Ok(())
    }

    pub(crate) fn compile_class_decl(&mut self, decl: &ClassDecl) -> Result<(), CompileError> {
        if !decl.generic_params.is_empty() {
            return Err(CompileError::new(
                "generic classes are not supported; use a generic struct",
                decl.line,
            ));
        }
        let line = decl.line;
        let name_idx = self.identifier_constant(&decl.name, line)?;
        self.emit_op(Opcode::Class, line);
        self.emit_short(name_idx, line);

        let has_superclass = decl
            .supertypes
            .iter()
            .any(|s| !self.protocol_names.contains(s));
        let env = self.method_env_for(&decl.properties, &decl.methods, has_superclass, false);

        let base = decl
            .supertypes
            .iter()
            .find(|s| !self.protocol_names.contains(*s))
            .cloned();
        let mut recorded = RecordedType {
            name: decl.name.clone(),
            flags: (TypeFlags::PUBLIC | TypeFlags::CLASS).bits(),
            base,
            methods: Vec::new(),
            fields: Vec::new(),
            computed: Vec::new(),
        };

        for prop in &decl.properties {
            self.emit_property(prop, &env, &mut recorded)?;
        }

        for method in &decl.methods {
            if method.is_static && method.name == "main" && method.params.is_empty() {
                self.record_entry_static_main(&decl.name);
            }
            let attach = if method.is_static {
                Opcode::StaticMethod
            } else {
                Opcode::Method
            };
            let method_env = if method.is_static {
                MethodEnv::default()
            } else {
                env.clone()
            };
            self.emit_method(
                &decl.name,
                method,
                method_env,
                attach,
                None,
                false,
                &mut recorded,
            )?;
        }

        for initializer in &decl.initializers {
            self.emit_method(
                &decl.name,
                initializer,
                env.clone(),
                Opcode::Method,
                None,
                true,
                &mut recorded,
            )?;
        }

        if let Some(deinitializer) = &decl.deinitializer {
            self.emit_method(
                &decl.name,
                deinitializer,
                env.clone(),
                Opcode::Method,
                None,
                false,
                &mut recorded,
            )?;
        }

        // superclass and protocol conformance attach after the members so
        // conformance checking can see them
        for supertype in &decl.supertypes {
            let super_idx = self.identifier_constant(supertype, line)?;
            self.emit_op(Opcode::GetGlobal, line);
            self.emit_short(super_idx, line);
            self.emit_op(Opcode::Inherit, line);
        }

        self.emit_op(Opcode::DefineGlobal, line);
        self.emit_short(name_idx, line);
        self.recorded_types.push(recorded);
        Ok(())
    }

    pub(crate) fn compile_struct_decl(&mut self, decl: &StructDecl) -> Result<(), CompileError> {
        if !decl.generic_params.is_empty() {
            self.generic_structs.insert(decl.name.clone(), decl.clone());
            return Ok(());
        }
        let line = decl.line;
        let name_idx = self.identifier_constant(&decl.name, line)?;
        self.emit_op(Opcode::Struct, line);
        self.emit_short(name_idx, line);

        let env = self.method_env_for(&decl.properties, &decl.methods, false, true);
        let mut recorded = RecordedType {
            name: decl.name.clone(),
            flags: (TypeFlags::PUBLIC | TypeFlags::STRUCT).bits(),
            base: None,
            methods: Vec::new(),
            fields: Vec::new(),
            computed: Vec::new(),
        };

        for prop in &decl.properties {
            self.emit_property(prop, &env, &mut recorded)?;
        }

        for method in &decl.methods {
            if method.is_static && method.name == "main" && method.params.is_empty() {
                self.record_entry_static_main(&decl.name);
            }
            if method.is_static {
                self.emit_method(
                    &decl.name,
                    method,
                    MethodEnv::default(),
                    Opcode::StaticMethod,
                    None,
                    false,
                    &mut recorded,
                )?;
            } else {
                let mut method_env = env.clone();
                method_env.is_mutating = method.is_mutating;
                self.emit_method(
                    &decl.name,
                    method,
                    method_env,
                    Opcode::StructMethod,
                    Some(method.is_mutating),
                    false,
                    &mut recorded,
                )?;
            }
        }

        for initializer in &decl.initializers {
            let mut init_env = env.clone();
            init_env.is_mutating = true;
            self.emit_method(
                &decl.name,
                initializer,
                init_env,
                Opcode::Method,
                None,
                true,
                &mut recorded,
            )?;
        }

        for conformance in &decl.conformances {
            let super_idx = self.identifier_constant(conformance, line)?;
            self.emit_op(Opcode::GetGlobal, line);
            self.emit_short(super_idx, line);
            self.emit_op(Opcode::Inherit, line);
        }

        self.emit_op(Opcode::DefineGlobal, line);
        self.emit_short(name_idx, line);
        self.recorded_types.push(recorded);
        Ok(())
    }

    pub(crate) fn compile_enum_decl(&mut self, decl: &EnumDecl) -> Result<(), CompileError> {
        let line = decl.line;
        let name_idx = self.identifier_constant(&decl.name, line)?;
        self.emit_op(Opcode::Enum, line);
        self.emit_short(name_idx, line);

        let mut recorded = RecordedType {
            name: decl.name.clone(),
            flags: (TypeFlags::PUBLIC | TypeFlags::ENUM).bits(),
            base: None,
            methods: Vec::new(),
            fields: Vec::new(),
            computed: Vec::new(),
        };

        for case in &decl.cases {
            if case.associated.len() > u8::MAX as usize {
                return Err(CompileError::new(
                    "too many associated values on enum case",
                    case.line,
                ));
            }
            match &case.raw_value {
                Some(raw) => self.compile_expr(raw)?,
                None => self.emit_op(Opcode::Nil, case.line),
            }
            let case_idx = self.identifier_constant(&case.name, case.line)?;
            let label_indexes: Vec<u16> = case
                .associated
                .iter()
                .map(|(label, _)| match label {
                    Some(label) => self.identifier_constant(label, case.line),
                    None => Ok(NO_LABEL),
                })
                .collect::<Result<_, _>>()?;
            self.emit_op(Opcode::EnumCase, case.line);
            self.emit_short(case_idx, case.line);
            self.emit_byte(case.associated.len() as u8, case.line);
            for idx in label_indexes {
                self.emit_short(idx, case.line);
            }
        }

        // methods and computed properties dispatch on case values
        let mut env = self.method_env_for(&decl.properties, &decl.methods, false, false);
        for builtin in ["rawValue", "caseName", "associated"] {
            env.type_properties.insert(builtin.to_string());
        }

        for method in &decl.methods {
            self.emit_method(
                &decl.name,
                method,
                env.clone(),
                Opcode::Method,
                None,
                false,
                &mut recorded,
            )?;
        }

        for prop in &decl.properties {
            if prop.accessors.is_none() {
                return Err(CompileError::new(
                    "enums may not contain stored properties",
                    prop.line,
                ));
            }
            self.emit_property(prop, &env, &mut recorded)?;
        }

        self.emit_op(Opcode::DefineGlobal, line);
        self.emit_short(name_idx, line);
        self.recorded_types.push(recorded);
        Ok(())
    }

    pub(crate) fn compile_protocol_decl(
        &mut self,
        decl: &ProtocolDecl,
    ) -> Result<(), CompileError> {
        let line = decl.line;
        let def = ProtocolDef {
            name: decl.name.clone(),
            method_requirements: decl
                .methods
                .iter()
                .map(|m| ProtocolMethodReq {
                    name: m.name.clone(),
                    param_names: m.param_names.clone(),
                    is_mutating: m.is_mutating,
                })
                .collect(),
            property_requirements: decl
                .properties
                .iter()
                .map(|p| ProtocolPropertyReq {
                    name: p.name.clone(),
                    has_getter: p.has_getter,
                    has_setter: p.has_setter,
                })
                .collect(),
            inherited_protocols: decl.inherited.clone(),
        };
        let idx = self.ctx().chunk.add_protocol(def);
        let idx = self.check_u16(idx, "too many protocols", line)?;
        self.emit_op(Opcode::Protocol, line);
        self.emit_short(idx, line);

        let name_idx = self.identifier_constant(&decl.name, line)?;
        self.emit_op(Opcode::DefineGlobal, line);
        self.emit_short(name_idx, line);
        self.protocol_names.insert(decl.name.clone());

        self.recorded_types.push(RecordedType {
            name: decl.name.clone(),
            flags: (TypeFlags::PUBLIC | TypeFlags::INTERFACE).bits(),
            base: None,
            methods: Vec::new(),
            fields: Vec::new(),
            computed: Vec::new(),
        });
        Ok(())
    }

    /// Extension members lower as if declared inside the original type:
    /// the type object is fetched, members attach, and the stack is
    /// restored.
    pub(crate) fn compile_extension_decl(
        &mut self,
        decl: &ExtensionDecl,
    ) -> Result<(), CompileError> {
        let line = decl.line;
        let type_idx = self.identifier_constant(&decl.type_name, line)?;
        self.emit_op(Opcode::GetGlobal, line);
        self.emit_short(type_idx, line);

        let env = self.method_env_for(&decl.properties, &decl.methods, false, false);
        let mut recorded = RecordedType {
            name: decl.type_name.clone(),
            flags: TypeFlags::PUBLIC.bits(),
            base: None,
            methods: Vec::new(),
            fields: Vec::new(),
            computed: Vec::new(),
        };

        for prop in &decl.properties {
            if prop.accessors.is_none() {
                return Err(CompileError::new(
                    "extensions may not contain stored properties",
                    prop.line,
                ));
            }
            self.emit_property(prop, &env, &mut recorded)?;
        }

        for method in &decl.methods {
            if method.is_static {
                self.emit_method(
                    &decl.type_name,
                    method,
                    MethodEnv::default(),
                    Opcode::StaticMethod,
                    None,
                    false,
                    &mut recorded,
                )?;
            } else if method.is_mutating {
                let mut method_env = env.clone();
                method_env.in_struct = true;
                method_env.is_mutating = true;
                self.emit_method(
                    &decl.type_name,
                    method,
                    method_env,
                    Opcode::StructMethod,
                    Some(true),
                    false,
                    &mut recorded,
                )?;
            } else {
                self.emit_method(
                    &decl.type_name,
                    method,
                    env.clone(),
                    Opcode::Method,
                    None,
                    false,
                    &mut recorded,
                )?;
            }
        }

        self.emit_op(Opcode::Pop, line);
        self.recorded_types.push(recorded);
        Ok(())
    }
}
