//! Generic specialization.
//!
//! Templated struct and function declarations are recorded on first sight
//! and never emitted directly. A use that supplies concrete type
//! arguments synthesizes a concretely named clone (`Box<Int>` becomes
//! `Box_Int`) with the type parameters substituted, queued for lowering
//! at the next top-level safe point. Each argument combination is emitted
//! once.

use super::error::CompileError;
use super::Compiler;
use crate::ast::{
    Accessors, CasePattern, Expr, FuncDecl, InterpolatedPart, Observers, Stmt, StructDecl,
    TypeAnnotation, VarDecl,
};
use std::collections::HashMap;
use tracing::debug;

type TypeMap = HashMap<String, TypeAnnotation>;

pub(crate) fn mangle_generic_name(base: &str, args: &[TypeAnnotation]) -> String {
    let mut out = base.to_string();
    for arg in args {
        out.push('_');
        out.push_str(&arg.mangled());
    }
    out
}

impl Compiler {
    /// Registers templated declarations so later uses can specialize them.
    pub(crate) fn collect_generic_templates(&mut self, program: &[Stmt]) {
        for stmt in program {
            match stmt {
                Stmt::StructDecl(decl) if !decl.generic_params.is_empty() => {
                    self.generic_structs.insert(decl.name.clone(), decl.clone());
                }
                Stmt::FuncDecl(decl) if !decl.generic_params.is_empty() => {
                    self.generic_funcs.insert(decl.name.clone(), decl.clone());
                }
                _ => {}
            }
        }
    }

    /// Pre-pass over the whole program: queue every specialization it
    /// mentions, so top-level uses find their definitions already emitted.
    pub(crate) fn collect_generic_usages_program(
        &mut self,
        program: &[Stmt],
    ) -> Result<(), CompileError> {
        for stmt in program {
            self.collect_usages_stmt(stmt)?;
        }
        Ok(())
    }

    pub(crate) fn compile_pending_specializations(&mut self) -> Result<(), CompileError> {
        while let Some(stmt) = self.pending_specializations.pop() {
            self.compile_stmt(&stmt)?;
        }
        Ok(())
    }

    /// Queues the struct specialization named by an annotation like
    /// `Box<Int>`; annotations over non-template names pass through.
    pub(crate) fn ensure_struct_specialized(
        &mut self,
        ty: &TypeAnnotation,
        line: u32,
    ) -> Result<(), CompileError> {
        let Some(template) = self.generic_structs.get(&ty.name).cloned() else {
            return Ok(());
        };
        if template.generic_params.len() != ty.type_args.len() {
            return Err(CompileError::new(
                format!(
                    "wrong number of type arguments for '{}': expected {}, got {}",
                    ty.name,
                    template.generic_params.len(),
                    ty.type_args.len()
                ),
                line,
            ));
        }
        let mangled = mangle_generic_name(&ty.name, &ty.type_args);
        if !self.specialized.insert(mangled.clone()) {
            return Ok(());
        }
        debug!(template = %ty.name, specialized = %mangled, "queueing struct specialization");
        let specialized = specialize_struct(&template, &ty.type_args, &mangled);
        self.pending_specializations.push(Stmt::StructDecl(specialized));
        Ok(())
    }

    /// Resolves `name<Args>` at a use site and returns the mangled name to
    /// reference.
    pub(crate) fn ensure_identifier_specialized(
        &mut self,
        name: &str,
        type_args: &[TypeAnnotation],
        line: u32,
    ) -> Result<String, CompileError> {
        if self.generic_structs.contains_key(name) {
            let annotation = TypeAnnotation {
                name: name.to_string(),
                type_args: type_args.to_vec(),
                is_optional: false,
            };
            self.ensure_struct_specialized(&annotation, line)?;
            return Ok(mangle_generic_name(name, type_args));
        }

        let Some(template) = self.generic_funcs.get(name).cloned() else {
            return Err(CompileError::new(
                format!("'{name}' is not a generic type or function"),
                line,
            ));
        };
        if template.generic_params.len() != type_args.len() {
            return Err(CompileError::new(
                format!(
                    "wrong number of type arguments for '{name}': expected {}, got {}",
                    template.generic_params.len(),
                    type_args.len()
                ),
                line,
            ));
        }
        let mangled = mangle_generic_name(name, type_args);
        if self.specialized.insert(mangled.clone()) {
            debug!(template = name, specialized = %mangled, "queueing function specialization");
            let specialized = specialize_func(&template, type_args, &mangled);
            self.pending_specializations.push(Stmt::FuncDecl(specialized));
        }
        Ok(mangled)
    }

    // ---- usage collection ----

    pub(super) fn collect_usages_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::VarDecl(decl) => self.collect_usages_var(decl),
            Stmt::TupleDestructuring { initializer, .. } => self.collect_usages_expr(initializer),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                self.collect_usages_expr(condition)?;
                self.collect_usages_stmt(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.collect_usages_stmt(else_branch)?;
                }
                Ok(())
            }
            Stmt::IfLet {
                value,
                then_branch,
                else_branch,
                ..
            } => {
                self.collect_usages_expr(value)?;
                self.collect_usages_stmt(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.collect_usages_stmt(else_branch)?;
                }
                Ok(())
            }
            Stmt::GuardLet {
                value, else_branch, ..
            } => {
                self.collect_usages_expr(value)?;
                self.collect_usages_stmt(else_branch)
            }
            Stmt::While {
                condition, body, ..
            } => {
                self.collect_usages_expr(condition)?;
                self.collect_usages_stmt(body)
            }
            Stmt::RepeatWhile {
                body, condition, ..
            } => {
                self.collect_usages_stmt(body)?;
                self.collect_usages_expr(condition)
            }
            Stmt::ForIn {
                iterable, body, ..
            } => {
                self.collect_usages_expr(iterable)?;
                self.collect_usages_stmt(body)
            }
            Stmt::Switch {
                subject,
                cases,
                default,
                ..
            } => {
                self.collect_usages_expr(subject)?;
                for case in cases {
                    if let CasePattern::Expr(expr) = &case.pattern {
                        self.collect_usages_expr(expr)?;
                    }
                    for stmt in &case.body {
                        self.collect_usages_stmt(stmt)?;
                    }
                }
                if let Some(default) = default {
                    for stmt in default {
                        self.collect_usages_stmt(stmt)?;
                    }
                }
                Ok(())
            }
            Stmt::Return { value, .. } => match value {
                Some(value) => self.collect_usages_expr(value),
                None => Ok(()),
            },
            Stmt::Throw { value, .. } | Stmt::Print { value, .. } => {
                self.collect_usages_expr(value)
            }
            Stmt::Block { statements, .. } => {
                for stmt in statements {
                    self.collect_usages_stmt(stmt)?;
                }
                Ok(())
            }
            Stmt::FuncDecl(decl) => {
                if !decl.generic_params.is_empty() {
                    return Ok(());
                }
                for stmt in &decl.body {
                    self.collect_usages_stmt(stmt)?;
                }
                Ok(())
            }
            Stmt::ClassDecl(decl) => {
                for prop in &decl.properties {
                    self.collect_usages_var(prop)?;
                }
                for method in decl
                    .methods
                    .iter()
                    .chain(&decl.initializers)
                    .chain(decl.deinitializer.as_ref())
                {
                    for stmt in &method.body {
                        self.collect_usages_stmt(stmt)?;
                    }
                }
                Ok(())
            }
            Stmt::StructDecl(decl) => {
                if !decl.generic_params.is_empty() {
                    return Ok(());
                }
                for prop in &decl.properties {
                    self.collect_usages_var(prop)?;
                }
                for method in decl.methods.iter().chain(&decl.initializers) {
                    for stmt in &method.body {
                        self.collect_usages_stmt(stmt)?;
                    }
                }
                Ok(())
            }
            Stmt::EnumDecl(decl) => {
                for method in &decl.methods {
                    for stmt in &method.body {
                        self.collect_usages_stmt(stmt)?;
                    }
                }
                Ok(())
            }
            Stmt::ExtensionDecl(decl) => {
                for method in &decl.methods {
                    for stmt in &method.body {
                        self.collect_usages_stmt(stmt)?;
                    }
                }
                Ok(())
            }
            Stmt::Expression { expr, .. } => self.collect_usages_expr(expr),
            Stmt::ProtocolDecl(_) | Stmt::Import { .. } | Stmt::Break { .. }
            | Stmt::Continue { .. } => Ok(()),
        }
    }

    fn collect_usages_var(&mut self, decl: &VarDecl) -> Result<(), CompileError> {
        if let Some(ty) = &decl.ty {
            if !ty.type_args.is_empty() {
                self.ensure_struct_specialized(ty, decl.line)?;
            }
        }
        if let Some(initializer) = &decl.initializer {
            self.collect_usages_expr(initializer)?;
        }
        Ok(())
    }

    fn collect_usages_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Identifier {
                name,
                type_args,
                line,
            } => {
                // templates registered later (imports) specialize at their
                // use site instead
                if !type_args.is_empty()
                    && (self.generic_structs.contains_key(name)
                        || self.generic_funcs.contains_key(name))
                {
                    self.ensure_identifier_specialized(name, type_args, *line)?;
                }
                Ok(())
            }
            Expr::Unary { operand, .. } | Expr::ForceUnwrap { operand, .. } => {
                self.collect_usages_expr(operand)
            }
            Expr::Binary { left, right, .. } => {
                self.collect_usages_expr(left)?;
                self.collect_usages_expr(right)
            }
            Expr::Assign { target, value, .. } => {
                self.collect_usages_expr(target)?;
                self.collect_usages_expr(value)
            }
            Expr::Ternary {
                condition,
                then_value,
                else_value,
                ..
            } => {
                self.collect_usages_expr(condition)?;
                self.collect_usages_expr(then_value)?;
                self.collect_usages_expr(else_value)
            }
            Expr::NilCoalesce { value, fallback, .. } => {
                self.collect_usages_expr(value)?;
                self.collect_usages_expr(fallback)
            }
            Expr::OptionalChain { object, .. } | Expr::Member { object, .. } => {
                self.collect_usages_expr(object)
            }
            Expr::Call { callee, args, .. } => {
                self.collect_usages_expr(callee)?;
                for arg in args {
                    self.collect_usages_expr(&arg.value)?;
                }
                Ok(())
            }
            Expr::Range { start, end, .. } => {
                self.collect_usages_expr(start)?;
                self.collect_usages_expr(end)
            }
            Expr::ArrayLiteral { elements, .. } => {
                for element in elements {
                    self.collect_usages_expr(element)?;
                }
                Ok(())
            }
            Expr::DictLiteral { entries, .. } => {
                for (key, value) in entries {
                    self.collect_usages_expr(key)?;
                    self.collect_usages_expr(value)?;
                }
                Ok(())
            }
            Expr::TupleLiteral { elements, .. } => {
                for (_, value) in elements {
                    self.collect_usages_expr(value)?;
                }
                Ok(())
            }
            Expr::Subscript { object, index, .. } => {
                self.collect_usages_expr(object)?;
                self.collect_usages_expr(index)
            }
            Expr::Interpolated { parts, .. } => {
                for part in parts {
                    if let InterpolatedPart::Expr(expr) = part {
                        self.collect_usages_expr(expr)?;
                    }
                }
                Ok(())
            }
            Expr::Closure { body, .. } => {
                for stmt in body {
                    self.collect_usages_stmt(stmt)?;
                }
                Ok(())
            }
            Expr::Literal { .. } | Expr::SelfExpr { .. } | Expr::Super { .. } => Ok(()),
        }
    }
}

// ---- template cloning and substitution ----

fn build_type_map(params: &[String], args: &[TypeAnnotation]) -> TypeMap {
    params
        .iter()
        .cloned()
        .zip(args.iter().cloned())
        .collect()
}

fn specialize_struct(
    template: &StructDecl,
    args: &[TypeAnnotation],
    mangled: &str,
) -> StructDecl {
    let map = build_type_map(&template.generic_params, args);
    let mut decl = template.clone();
    decl.name = mangled.to_string();
    decl.generic_params.clear();
    for prop in &mut decl.properties {
        subst_var(prop, &map);
    }
    for method in &mut decl.methods {
        subst_func(method, &map);
    }
    for initializer in &mut decl.initializers {
        subst_func(initializer, &map);
    }
    decl
}

fn specialize_func(template: &FuncDecl, args: &[TypeAnnotation], mangled: &str) -> FuncDecl {
    let map = build_type_map(&template.generic_params, args);
    let mut decl = template.clone();
    decl.name = mangled.to_string();
    decl.generic_params.clear();
    subst_func(&mut decl, &map);
    decl
}

fn subst_func(decl: &mut FuncDecl, map: &TypeMap) {
    for param in &mut decl.params {
        if let Some(ty) = &mut param.ty {
            subst_type(ty, map);
        }
        if let Some(default) = &mut param.default {
            subst_expr(default, map);
        }
    }
    if let Some(ret) = &mut decl.return_type {
        subst_type(ret, map);
    }
    for stmt in &mut decl.body {
        subst_stmt(stmt, map);
    }
}

fn subst_var(decl: &mut VarDecl, map: &TypeMap) {
    if let Some(ty) = &mut decl.ty {
        subst_type(ty, map);
    }
    if let Some(initializer) = &mut decl.initializer {
        subst_expr(initializer, map);
    }
    if let Some(Observers { will_set, did_set }) = &mut decl.observers {
        for body in [will_set, did_set].into_iter().flatten() {
            for stmt in body {
                subst_stmt(stmt, map);
            }
        }
    }
    if let Some(Accessors { getter, setter }) = &mut decl.accessors {
        for stmt in getter {
            subst_stmt(stmt, map);
        }
        if let Some(setter) = setter {
            for stmt in setter {
                subst_stmt(stmt, map);
            }
        }
    }
}

fn subst_type(ty: &mut TypeAnnotation, map: &TypeMap) {
    if ty.type_args.is_empty() {
        if let Some(replacement) = map.get(&ty.name) {
            let keep_optional = ty.is_optional || replacement.is_optional;
            *ty = replacement.clone();
            ty.is_optional = keep_optional;
            return;
        }
    }
    for arg in &mut ty.type_args {
        subst_type(arg, map);
    }
}

fn subst_stmt(stmt: &mut Stmt, map: &TypeMap) {
    match stmt {
        Stmt::VarDecl(decl) => subst_var(decl, map),
        Stmt::TupleDestructuring { initializer, .. } => subst_expr(initializer, map),
        Stmt::If {
            condition,
            then_branch,
            else_branch,
            ..
        } => {
            subst_expr(condition, map);
            subst_stmt(then_branch, map);
            if let Some(else_branch) = else_branch {
                subst_stmt(else_branch, map);
            }
        }
        Stmt::IfLet {
            value,
            then_branch,
            else_branch,
            ..
        } => {
            subst_expr(value, map);
            subst_stmt(then_branch, map);
            if let Some(else_branch) = else_branch {
                subst_stmt(else_branch, map);
            }
        }
        Stmt::GuardLet {
            value, else_branch, ..
        } => {
            subst_expr(value, map);
            subst_stmt(else_branch, map);
        }
        Stmt::While {
            condition, body, ..
        } => {
            subst_expr(condition, map);
            subst_stmt(body, map);
        }
        Stmt::RepeatWhile {
            body, condition, ..
        } => {
            subst_stmt(body, map);
            subst_expr(condition, map);
        }
        Stmt::ForIn {
            iterable, body, ..
        } => {
            subst_expr(iterable, map);
            subst_stmt(body, map);
        }
        Stmt::Switch {
            subject,
            cases,
            default,
            ..
        } => {
            subst_expr(subject, map);
            for case in cases {
                if let CasePattern::Expr(expr) = &mut case.pattern {
                    subst_expr(expr, map);
                }
                for stmt in &mut case.body {
                    subst_stmt(stmt, map);
                }
            }
            if let Some(default) = default {
                for stmt in default {
                    subst_stmt(stmt, map);
                }
            }
        }
        Stmt::Return { value, .. } => {
            if let Some(value) = value {
                subst_expr(value, map);
            }
        }
        Stmt::Throw { value, .. } | Stmt::Print { value, .. } => subst_expr(value, map),
        Stmt::Block { statements, .. } => {
            for stmt in statements {
                subst_stmt(stmt, map);
            }
        }
        Stmt::FuncDecl(decl) => subst_func(decl, map),
        Stmt::Expression { expr, .. } => subst_expr(expr, map),
        Stmt::ClassDecl(_)
        | Stmt::StructDecl(_)
        | Stmt::EnumDecl(_)
        | Stmt::ProtocolDecl(_)
        | Stmt::ExtensionDecl(_)
        | Stmt::Import { .. }
        | Stmt::Break { .. }
        | Stmt::Continue { .. } => {}
    }
}

fn subst_expr(expr: &mut Expr, map: &TypeMap) {
    match expr {
        Expr::Identifier {
            name, type_args, ..
        } => {
            for arg in type_args.iter_mut() {
                subst_type(arg, map);
            }
            if type_args.is_empty() {
                if let Some(replacement) = map.get(name) {
                    *name = replacement.mangled();
                }
            }
        }
        Expr::Unary { operand, .. } | Expr::ForceUnwrap { operand, .. } => {
            subst_expr(operand, map)
        }
        Expr::Binary { left, right, .. } => {
            subst_expr(left, map);
            subst_expr(right, map);
        }
        Expr::Assign { target, value, .. } => {
            subst_expr(target, map);
            subst_expr(value, map);
        }
        Expr::Ternary {
            condition,
            then_value,
            else_value,
            ..
        } => {
            subst_expr(condition, map);
            subst_expr(then_value, map);
            subst_expr(else_value, map);
        }
        Expr::NilCoalesce { value, fallback, .. } => {
            subst_expr(value, map);
            subst_expr(fallback, map);
        }
        Expr::OptionalChain { object, .. } | Expr::Member { object, .. } => {
            subst_expr(object, map)
        }
        Expr::Call { callee, args, .. } => {
            subst_expr(callee, map);
            for arg in args {
                subst_expr(&mut arg.value, map);
            }
        }
        Expr::Range { start, end, .. } => {
            subst_expr(start, map);
            subst_expr(end, map);
        }
        Expr::ArrayLiteral { elements, .. } => {
            for element in elements {
                subst_expr(element, map);
            }
        }
        Expr::DictLiteral { entries, .. } => {
            for (key, value) in entries {
                subst_expr(key, map);
                subst_expr(value, map);
            }
        }
        Expr::TupleLiteral { elements, .. } => {
            for (_, value) in elements {
                subst_expr(value, map);
            }
        }
        Expr::Subscript { object, index, .. } => {
            subst_expr(object, map);
            subst_expr(index, map);
        }
        Expr::Interpolated { parts, .. } => {
            for part in parts {
                if let InterpolatedPart::Expr(expr) = part {
                    subst_expr(expr, map);
                }
            }
        }
        Expr::Closure { params, body, .. } => {
            for param in params.iter_mut() {
                if let Some(ty) = &mut param.ty {
                    subst_type(ty, map);
                }
            }
            for stmt in body {
                subst_stmt(stmt, map);
            }
        }
        Expr::Literal { .. } | Expr::SelfExpr { .. } | Expr::Super { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangling_combines_base_and_argument_names() {
        let args = vec![TypeAnnotation::plain("Int")];
        assert_eq!(mangle_generic_name("Box", &args), "Box_Int");
        let nested = vec![TypeAnnotation {
            name: "Box".to_string(),
            type_args: vec![TypeAnnotation::plain("Int")],
            is_optional: false,
        }];
        assert_eq!(mangle_generic_name("Pair", &nested), "Pair_Box_Int");
    }

    #[test]
    fn substitution_rewrites_types_and_constructor_calls() {
        let map: TypeMap = [("T".to_string(), TypeAnnotation::plain("Int"))]
            .into_iter()
            .collect();
        let mut ty = TypeAnnotation::plain("T");
        subst_type(&mut ty, &map);
        assert_eq!(ty.name, "Int");

        let mut expr = Expr::Call {
            callee: Box::new(Expr::Identifier {
                name: "T".to_string(),
                type_args: vec![],
                line: 1,
            }),
            args: vec![],
            line: 1,
        };
        subst_expr(&mut expr, &map);
        let Expr::Call { callee, .. } = &expr else {
            panic!("expected call");
        };
        let Expr::Identifier { name, .. } = &**callee else {
            panic!("expected identifier");
        };
        assert_eq!(name, "Int");
    }
}
