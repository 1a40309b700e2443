//! Single-pass lowering from the syntax tree to bytecode.
//!
//! The compiler keeps a stack of function contexts: each carries the chunk
//! under construction, its locals and upvalues, the loop-context stack for
//! break/continue, and the flags governing implicit `self` access inside
//! type bodies. Nested functions compile in a fresh context whose
//! enclosing contexts remain on the stack, so upvalue resolution can walk
//! outward.

pub mod error;
mod exprs;
mod specialization;
mod stmts;
mod types;

use crate::ast::{DeclRef, FuncDecl, ParamDecl, Stmt, StructDecl};
use crate::resolver::ModuleResolver;
use error::CompileError;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use swive_core::chunk::{Assembly, FunctionProto, MethodBody, ParamDefault, UpvalueDesc};
use swive_core::opcode::Opcode;
use swive_core::value::Value;

pub(crate) const MAX_RECURSION_DEPTH: u32 = 256;
pub(crate) const MAX_LOCALS: usize = 65_535;
pub(crate) const MAX_UPVALUES: usize = 256;

#[derive(Debug, Clone)]
pub(crate) struct Local {
    pub name: String,
    /// Lexical depth; -1 until fully initialized, so an initializer cannot
    /// read the variable it is defining.
    pub depth: i32,
    pub is_captured: bool,
    pub discipline: DeclRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UpvalueEntry {
    pub index: u16,
    pub is_local: bool,
}

#[derive(Debug, Default)]
pub(crate) struct LoopCtx {
    pub break_jumps: Vec<usize>,
    pub continue_jumps: Vec<usize>,
    pub loop_start: usize,
    pub scope_depth: i32,
}

/// Flags describing the type body a method is being compiled inside.
#[derive(Debug, Clone, Default)]
pub(crate) struct MethodEnv {
    pub implicit_self: bool,
    pub type_properties: HashSet<String>,
    pub type_methods: HashSet<String>,
    pub weak_properties: HashSet<String>,
    pub has_superclass: bool,
    pub in_struct: bool,
    pub is_mutating: bool,
}

#[derive(Debug, Default)]
pub(crate) struct FunctionCtx {
    pub chunk: Assembly,
    pub locals: Vec<Local>,
    pub upvalues: Vec<UpvalueEntry>,
    pub scope_depth: i32,
    pub loop_stack: Vec<LoopCtx>,
    pub env: MethodEnv,
}

impl FunctionCtx {
    fn script() -> FunctionCtx {
        FunctionCtx::default()
    }

    fn function(env: MethodEnv) -> FunctionCtx {
        FunctionCtx {
            scope_depth: 1,
            env,
            ..Default::default()
        }
    }
}

/// How a name resolves at the current point of compilation.
pub(crate) enum VarTarget {
    Local { slot: u16, discipline: DeclRef },
    Upvalue { index: u16 },
    SelfProperty,
    SelfMethod,
    Global { discipline: DeclRef },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) enum EntryMain {
    #[default]
    None,
    GlobalFunc,
    StaticMethod(String),
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedMethod {
    pub name: String,
    pub flags: u32,
    pub body: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedField {
    pub name: String,
    pub flags: u32,
    pub type_name: String,
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedType {
    pub name: String,
    pub flags: u32,
    pub base: Option<String>,
    pub methods: Vec<RecordedMethod>,
    pub fields: Vec<RecordedField>,
    pub computed: Vec<String>,
}

pub struct Compiler {
    pub(crate) ctxs: Vec<FunctionCtx>,
    pub(crate) recursion_depth: u32,

    resolver: Option<Box<dyn ModuleResolver>>,
    pub(crate) imported_modules: HashSet<String>,
    pub(crate) compiling_modules: HashSet<String>,
    pub(crate) protocol_names: HashSet<String>,
    pub(crate) global_disciplines: HashMap<String, DeclRef>,

    // generic specialization
    pub(crate) generic_structs: HashMap<String, StructDecl>,
    pub(crate) generic_funcs: HashMap<String, FuncDecl>,
    pub(crate) specialized: HashSet<String>,
    pub(crate) pending_specializations: Vec<Stmt>,

    // method-body deduplication
    pub(crate) method_body_lookup: HashMap<String, u32>,
    pub(crate) recorded_bodies: Vec<MethodBody>,
    pub(crate) recorded_types: Vec<RecordedType>,

    pub(crate) entry_main: EntryMain,
    pub(crate) hidden_counter: u32,
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}

impl Compiler {
    pub fn new() -> Compiler {
        Compiler {
            ctxs: Vec::new(),
            recursion_depth: 0,
            resolver: None,
            imported_modules: HashSet::new(),
            compiling_modules: HashSet::new(),
            protocol_names: HashSet::new(),
            global_disciplines: HashMap::new(),
            generic_structs: HashMap::new(),
            generic_funcs: HashMap::new(),
            specialized: HashSet::new(),
            pending_specializations: Vec::new(),
            method_body_lookup: HashMap::new(),
            recorded_bodies: Vec::new(),
            recorded_types: Vec::new(),
            entry_main: EntryMain::None,
            hidden_counter: 0,
        }
    }

    pub fn set_module_resolver(&mut self, resolver: Box<dyn ModuleResolver>) {
        self.resolver = Some(resolver);
    }

    /// Lowers a whole program into one assembly. Imports compile into the
    /// same global symbol space; generic templates specialize on demand;
    /// the entry point (if any) is called just before `HALT`.
    pub fn compile(&mut self, program: &[Stmt]) -> Result<Assembly, CompileError> {
        self.ctxs.push(FunctionCtx::script());

        self.collect_generic_templates(program);
        self.collect_generic_usages_program(program)?;
        self.compile_pending_specializations()?;

        for stmt in program {
            // imports may have registered templates this statement uses;
            // their specializations must be defined before it executes
            self.collect_usages_stmt(stmt)?;
            self.compile_pending_specializations()?;
            self.compile_stmt(stmt)?;
            self.compile_pending_specializations()?;
        }

        let last_line = program.last().map(|s| s.line()).unwrap_or(0);
        self.emit_entry_call(last_line)?;
        self.emit_op(Opcode::Halt, last_line);

        let ctx = self
            .ctxs
            .pop()
            .expect("compiler context stack underflow");
        let mut asm = ctx.chunk;
        asm.expand_to_assembly();
        self.populate_metadata_tables(&mut asm);
        Ok(asm)
    }

    // ---- context plumbing ----

    pub(crate) fn ctx(&mut self) -> &mut FunctionCtx {
        self.ctxs.last_mut().expect("no active function context")
    }

    pub(crate) fn ctx_ref(&self) -> &FunctionCtx {
        self.ctxs.last().expect("no active function context")
    }

    pub(crate) fn at_global_scope(&self) -> bool {
        self.ctxs.len() == 1 && self.ctx_ref().scope_depth == 0
    }

    pub(crate) fn enter_recursion(&mut self, line: u32) -> Result<(), CompileError> {
        self.recursion_depth += 1;
        if self.recursion_depth > MAX_RECURSION_DEPTH {
            self.recursion_depth -= 1;
            return Err(CompileError::new("maximum recursion depth exceeded", line));
        }
        Ok(())
    }

    pub(crate) fn leave_recursion(&mut self) {
        self.recursion_depth = self.recursion_depth.saturating_sub(1);
    }

    // ---- emission helpers ----

    pub(crate) fn emit_op(&mut self, op: Opcode, line: u32) {
        self.ctx().chunk.write_op(op, line);
    }

    pub(crate) fn emit_byte(&mut self, byte: u8, line: u32) {
        self.ctx().chunk.write(byte, line);
    }

    pub(crate) fn emit_short(&mut self, value: u16, line: u32) {
        self.ctx().chunk.write_short(value, line);
    }

    pub(crate) fn emit_constant(&mut self, value: Value, line: u32) -> Result<(), CompileError> {
        let idx = self.ctx().chunk.add_constant(value);
        let idx = self.check_u16(idx, "too many constants", line)?;
        self.emit_op(Opcode::Constant, line);
        self.emit_short(idx, line);
        Ok(())
    }

    pub(crate) fn emit_string(&mut self, text: &str, line: u32) -> Result<(), CompileError> {
        let idx = self.identifier_constant(text, line)?;
        self.emit_op(Opcode::String, line);
        self.emit_short(idx, line);
        Ok(())
    }

    /// Interns `name` in the current chunk's string table.
    pub(crate) fn identifier_constant(
        &mut self,
        name: &str,
        line: u32,
    ) -> Result<u16, CompileError> {
        let idx = self.ctx().chunk.add_string(name);
        self.check_u16(idx, "too many identifiers", line)
    }

    pub(crate) fn check_u16(
        &self,
        value: usize,
        what: &str,
        line: u32,
    ) -> Result<u16, CompileError> {
        u16::try_from(value).map_err(|_| CompileError::new(what, line))
    }

    pub(crate) fn emit_jump(&mut self, op: Opcode, line: u32) -> usize {
        self.ctx().chunk.emit_jump(op, line)
    }

    pub(crate) fn patch_jump(&mut self, offset: usize, line: u32) -> Result<(), CompileError> {
        self.ctx()
            .chunk
            .patch_jump(offset)
            .map_err(|e| CompileError::new(e.to_string(), line))
    }

    pub(crate) fn emit_loop(&mut self, loop_start: usize, line: u32) -> Result<(), CompileError> {
        self.ctx()
            .chunk
            .emit_loop(loop_start, line)
            .map_err(|e| CompileError::new(e.to_string(), line))
    }

    pub(crate) fn code_len(&self) -> usize {
        self.ctx_ref().chunk.code.len()
    }

    pub(crate) fn hidden_name(&mut self, base: &str) -> String {
        self.hidden_counter += 1;
        format!("${base}{}", self.hidden_counter)
    }

    // ---- scopes and locals ----

    pub(crate) fn begin_scope(&mut self) {
        self.ctx().scope_depth += 1;
    }

    pub(crate) fn end_scope(&mut self, line: u32) {
        self.ctx().scope_depth -= 1;
        loop {
            let Some(local) = self.ctx_ref().locals.last() else {
                break;
            };
            if local.depth <= self.ctx_ref().scope_depth {
                break;
            }
            let captured = local.is_captured;
            self.emit_op(
                if captured {
                    Opcode::CloseUpvalue
                } else {
                    Opcode::Pop
                },
                line,
            );
            self.ctx().locals.pop();
        }
    }

    pub(crate) fn declare_local(
        &mut self,
        name: &str,
        discipline: DeclRef,
        line: u32,
    ) -> Result<(), CompileError> {
        if self.ctx_ref().locals.len() >= MAX_LOCALS {
            return Err(CompileError::new(
                format!("too many local variables in function (max {MAX_LOCALS})"),
                line,
            ));
        }
        let depth = self.ctx_ref().scope_depth;
        for local in self.ctx_ref().locals.iter().rev() {
            if local.depth != -1 && local.depth < depth {
                break;
            }
            if local.name == name {
                return Err(CompileError::new(
                    format!("variable '{name}' already declared in this scope"),
                    line,
                ));
            }
        }
        self.ctx().locals.push(Local {
            name: name.to_string(),
            depth: -1,
            is_captured: false,
            discipline,
        });
        Ok(())
    }

    pub(crate) fn mark_initialized(&mut self) {
        let depth = self.ctx_ref().scope_depth;
        if let Some(local) = self.ctx().locals.last_mut() {
            local.depth = depth;
        }
    }

    fn resolve_local_in(
        &self,
        ctx_index: usize,
        name: &str,
        line: u32,
    ) -> Result<Option<u16>, CompileError> {
        let ctx = &self.ctxs[ctx_index];
        for (i, local) in ctx.locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth == -1 {
                    return Err(CompileError::new(
                        format!("cannot read local variable '{name}' in its own initializer"),
                        line,
                    ));
                }
                let slot = u16::try_from(i)
                    .map_err(|_| CompileError::new("too many local variables", line))?;
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    fn add_upvalue(
        &mut self,
        ctx_index: usize,
        index: u16,
        is_local: bool,
        line: u32,
    ) -> Result<u16, CompileError> {
        let entry = UpvalueEntry { index, is_local };
        let ctx = &mut self.ctxs[ctx_index];
        if let Some(existing) = ctx.upvalues.iter().position(|u| *u == entry) {
            return Ok(existing as u16);
        }
        if ctx.upvalues.len() >= MAX_UPVALUES {
            return Err(CompileError::new(
                format!("too many captured variables in closure (max {MAX_UPVALUES})"),
                line,
            ));
        }
        ctx.upvalues.push(entry);
        Ok((ctx.upvalues.len() - 1) as u16)
    }

    /// Resolves `name` as a capture for context `ctx_index`: first as a
    /// local of the enclosing function (marking it captured), then
    /// recursively as an upvalue of the enclosing function itself.
    fn resolve_upvalue(
        &mut self,
        ctx_index: usize,
        name: &str,
        line: u32,
    ) -> Result<Option<u16>, CompileError> {
        if ctx_index == 0 {
            return Ok(None);
        }
        let parent = ctx_index - 1;
        if let Some(local_idx) = self.resolve_local_in(parent, name, line)? {
            self.ctxs[parent].locals[local_idx as usize].is_captured = true;
            let up = self.add_upvalue(ctx_index, local_idx, true, line)?;
            return Ok(Some(up));
        }
        if let Some(forwarded) = self.resolve_upvalue(parent, name, line)? {
            let up = self.add_upvalue(ctx_index, forwarded, false, line)?;
            return Ok(Some(up));
        }
        Ok(None)
    }

    /// Classifies a name: local, upvalue, implicit-self member, or global.
    pub(crate) fn classify_variable(
        &mut self,
        name: &str,
        line: u32,
    ) -> Result<VarTarget, CompileError> {
        let top = self.ctxs.len() - 1;
        if let Some(slot) = self.resolve_local_in(top, name, line)? {
            let discipline = self.ctxs[top].locals[slot as usize].discipline;
            return Ok(VarTarget::Local { slot, discipline });
        }
        if let Some(index) = self.resolve_upvalue(top, name, line)? {
            return Ok(VarTarget::Upvalue { index });
        }
        let env = &self.ctx_ref().env;
        if env.implicit_self {
            if env.type_properties.contains(name) {
                return Ok(VarTarget::SelfProperty);
            }
            if env.type_methods.contains(name) {
                return Ok(VarTarget::SelfMethod);
            }
        }
        let discipline = self
            .global_disciplines
            .get(name)
            .copied()
            .unwrap_or(DeclRef::Strong);
        Ok(VarTarget::Global { discipline })
    }

    pub(crate) fn emit_load_self(&mut self, line: u32) -> Result<(), CompileError> {
        match self.classify_variable("self", line)? {
            VarTarget::Local { slot, .. } => {
                self.emit_op(Opcode::GetLocal, line);
                self.emit_short(slot, line);
                Ok(())
            }
            VarTarget::Upvalue { index } => {
                self.emit_op(Opcode::GetUpvalue, line);
                self.emit_short(index, line);
                Ok(())
            }
            _ => Err(CompileError::new("'self' used outside of a method", line)),
        }
    }

    pub(crate) fn emit_variable_get(&mut self, name: &str, line: u32) -> Result<(), CompileError> {
        match self.classify_variable(name, line)? {
            VarTarget::Local { slot, .. } => {
                self.emit_op(Opcode::GetLocal, line);
                self.emit_short(slot, line);
            }
            VarTarget::Upvalue { index } => {
                self.emit_op(Opcode::GetUpvalue, line);
                self.emit_short(index, line);
            }
            VarTarget::SelfProperty | VarTarget::SelfMethod => {
                self.emit_load_self(line)?;
                let idx = self.identifier_constant(name, line)?;
                self.emit_op(Opcode::GetProperty, line);
                self.emit_short(idx, line);
            }
            VarTarget::Global { .. } => {
                let idx = self.identifier_constant(name, line)?;
                self.emit_op(Opcode::GetGlobal, line);
                self.emit_short(idx, line);
            }
        }
        Ok(())
    }

    pub(crate) fn emit_discipline(&mut self, discipline: DeclRef, line: u32) {
        match discipline {
            DeclRef::Strong => {}
            DeclRef::Weak => self.emit_op(Opcode::MakeWeak, line),
            DeclRef::Unowned => self.emit_op(Opcode::MakeUnowned, line),
        }
    }

    // ---- function compilation ----

    /// Compiles a function body in a fresh context and registers the
    /// prototype on the enclosing chunk. `explicit_self` prepends the
    /// implicit receiver parameter; `extra_params` carry observer
    /// parameters like `newValue`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn compile_function_body(
        &mut self,
        name: &str,
        explicit_self: bool,
        extra_params: &[&str],
        params: &[ParamDecl],
        body: &[Stmt],
        env: MethodEnv,
        is_initializer: bool,
        is_override: bool,
        line: u32,
    ) -> Result<(u16, Vec<UpvalueEntry>), CompileError> {
        self.ctxs.push(FunctionCtx::function(env));

        let result = (|| -> Result<(), CompileError> {
            if explicit_self {
                self.declare_local("self", DeclRef::Strong, line)?;
                self.mark_initialized();
            }
            for extra in extra_params {
                self.declare_local(extra, DeclRef::Strong, line)?;
                self.mark_initialized();
            }
            for param in params {
                self.declare_local(&param.name, DeclRef::Strong, line)?;
                self.mark_initialized();
            }
            for stmt in body {
                self.compile_stmt(stmt)?;
            }
            self.emit_op(Opcode::Nil, line);
            self.emit_op(Opcode::Return, line);
            Ok(())
        })();

        let ctx = self
            .ctxs
            .pop()
            .expect("compiler context stack underflow");
        result?;

        let mut proto_params = Vec::new();
        let mut proto_labels = Vec::new();
        let mut proto_defaults = Vec::new();
        if explicit_self {
            proto_params.push("self".to_string());
            proto_labels.push(String::new());
            proto_defaults.push(ParamDefault::none());
        }
        for extra in extra_params {
            proto_params.push(extra.to_string());
            proto_labels.push(String::new());
            proto_defaults.push(ParamDefault::none());
        }
        for param in params {
            proto_params.push(param.name.clone());
            // absent label defaults to the parameter name; `_` is positional
            proto_labels.push(match &param.label {
                Some(label) => label.clone(),
                None => param.name.clone(),
            });
            proto_defaults.push(self.build_param_default(param, line)?);
        }

        let upvalues = ctx.upvalues.clone();
        let proto = FunctionProto {
            name: name.to_string(),
            params: proto_params,
            param_labels: proto_labels,
            param_defaults: proto_defaults,
            chunk: Some(Rc::new(ctx.chunk)),
            upvalues: upvalues
                .iter()
                .map(|u| UpvalueDesc {
                    index: u.index,
                    is_local: u.is_local,
                })
                .collect(),
            is_initializer,
            is_override,
        };

        let idx = self.ctx().chunk.add_function(proto);
        let idx = self.check_u16(idx, "too many functions in chunk", line)?;
        Ok((idx, upvalues))
    }

    /// Default values serialize into the prototype: scalars directly,
    /// string literals as symbolic text.
    fn build_param_default(
        &self,
        param: &ParamDecl,
        line: u32,
    ) -> Result<ParamDefault, CompileError> {
        use crate::ast::{Expr, LiteralValue};
        let Some(default) = &param.default else {
            return Ok(ParamDefault::none());
        };
        match default {
            Expr::Literal { value, .. } => Ok(match value {
                LiteralValue::Int(i) => ParamDefault::scalar(Value::Int(*i)),
                LiteralValue::Float(f) => ParamDefault::scalar(Value::Float(*f)),
                LiteralValue::Bool(b) => ParamDefault::scalar(Value::Bool(*b)),
                LiteralValue::Nil => ParamDefault::scalar(Value::Null),
                LiteralValue::Str(s) => ParamDefault::symbolic(s.clone()),
            }),
            Expr::Unary {
                op: crate::ast::UnaryOp::Neg,
                operand,
                ..
            } => match operand.as_ref() {
                Expr::Literal {
                    value: LiteralValue::Int(i),
                    ..
                } => Ok(ParamDefault::scalar(Value::Int(-i))),
                Expr::Literal {
                    value: LiteralValue::Float(f),
                    ..
                } => Ok(ParamDefault::scalar(Value::Float(-f))),
                _ => Err(CompileError::new(
                    format!("default value for '{}' must be a literal", param.name),
                    line,
                )),
            },
            _ => Err(CompileError::new(
                format!("default value for '{}' must be a literal", param.name),
                line,
            )),
        }
    }

    /// Emits `OP_FUNCTION` for capture-free bodies, `OP_CLOSURE` plus the
    /// `(is_local, slot)` descriptor pairs otherwise.
    pub(crate) fn emit_function_value(
        &mut self,
        idx: u16,
        upvalues: &[UpvalueEntry],
        line: u32,
    ) -> Result<(), CompileError> {
        if upvalues.is_empty() {
            self.emit_op(Opcode::Function, line);
            self.emit_short(idx, line);
            return Ok(());
        }
        self.emit_op(Opcode::Closure, line);
        self.emit_short(idx, line);
        for upvalue in upvalues {
            if upvalue.index > u8::MAX as u16 {
                return Err(CompileError::new(
                    "captured variable slot exceeds closure encoding range",
                    line,
                ));
            }
            self.emit_byte(upvalue.is_local as u8, line);
            self.emit_byte(upvalue.index as u8, line);
        }
        Ok(())
    }

    // ---- entry point ----

    pub(crate) fn record_entry_global_main(&mut self) {
        if self.entry_main == EntryMain::None {
            self.entry_main = EntryMain::GlobalFunc;
        }
    }

    pub(crate) fn record_entry_static_main(&mut self, type_name: &str) {
        if self.entry_main == EntryMain::None {
            self.entry_main = EntryMain::StaticMethod(type_name.to_string());
        }
    }

    fn emit_entry_call(&mut self, line: u32) -> Result<(), CompileError> {
        match self.entry_main.clone() {
            EntryMain::None => Ok(()),
            EntryMain::GlobalFunc => {
                let idx = self.identifier_constant("main", line)?;
                self.emit_op(Opcode::GetGlobal, line);
                self.emit_short(idx, line);
                self.emit_op(Opcode::Call, line);
                self.emit_short(0, line);
                Ok(())
            }
            EntryMain::StaticMethod(type_name) => {
                let type_idx = self.identifier_constant(&type_name, line)?;
                self.emit_op(Opcode::GetGlobal, line);
                self.emit_short(type_idx, line);
                let main_idx = self.identifier_constant("main", line)?;
                self.emit_op(Opcode::GetProperty, line);
                self.emit_short(main_idx, line);
                self.emit_op(Opcode::Call, line);
                self.emit_short(0, line);
                Ok(())
            }
        }
    }

    // ---- method-body records and metadata tables ----

    /// Identical `(type, method, static, parameter types)` signatures share
    /// one body record.
    pub(crate) fn record_method_body(
        &mut self,
        type_name: &str,
        method_name: &str,
        is_static: bool,
        param_sig: &str,
        chunk: &Assembly,
    ) -> u32 {
        let key = format!("{type_name}.{method_name}|{}|{param_sig}", is_static as u8);
        if let Some(existing) = self.method_body_lookup.get(&key) {
            return *existing;
        }
        let idx = self.recorded_bodies.len() as u32;
        self.recorded_bodies.push(MethodBody {
            bytecode: chunk.code.clone(),
            line_info: chunk.lines.clone(),
            max_stack_depth: 0,
        });
        self.method_body_lookup.insert(key, idx);
        idx
    }

    /// Fills the assembly's definition tables from the recorded types.
    /// Body pointers are offset by one: slot 0 is the primary method body
    /// published by `expand_to_assembly`.
    fn populate_metadata_tables(&mut self, asm: &mut Assembly) {
        use swive_core::chunk::{DefRange, FieldDef, MethodDef, PropertyDef, TypeDef};

        let recorded = std::mem::take(&mut self.recorded_types);
        let type_index_by_name: HashMap<String, u32> = recorded
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i as u32))
            .collect();

        for ty in &recorded {
            let name = asm.add_string(&ty.name) as u32;
            let method_start = asm.method_definitions.len() as u32;
            for m in &ty.methods {
                let m_name = asm.add_string(&m.name) as u32;
                asm.method_definitions.push(MethodDef {
                    name: m_name,
                    flags: m.flags,
                    signature: 0,
                    body_ptr: m.body + 1,
                });
            }
            let field_start = asm.field_definitions.len() as u32;
            for f in &ty.fields {
                let f_name = asm.add_string(&f.name) as u32;
                let f_type = asm.add_string(&f.type_name) as u32;
                asm.field_definitions.push(FieldDef {
                    name: f_name,
                    flags: f.flags,
                    type_name: f_type,
                });
            }
            let property_start = asm.property_definitions.len() as u32;
            for p in &ty.computed {
                let p_name = asm.add_string(p) as u32;
                asm.property_definitions.push(PropertyDef {
                    name: p_name,
                    flags: 0,
                    type_name: 0,
                    getter: 0,
                    setter: 0,
                });
            }
            let base_type = ty
                .base
                .as_ref()
                .and_then(|b| type_index_by_name.get(b))
                .map(|i| i + 1)
                .unwrap_or(0);
            asm.type_definitions.push(TypeDef {
                name,
                namespace_name: 0,
                flags: ty.flags,
                base_type,
                method_list: DefRange {
                    start: method_start,
                    count: ty.methods.len() as u32,
                },
                field_list: DefRange {
                    start: field_start,
                    count: ty.fields.len() as u32,
                },
                property_list: DefRange {
                    start: property_start,
                    count: ty.computed.len() as u32,
                },
                interfaces: Vec::new(),
            });
        }

        asm.method_bodies
            .extend(std::mem::take(&mut self.recorded_bodies));
    }
}
