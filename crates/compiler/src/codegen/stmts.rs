//! Statement lowering.

use super::error::{CompileError, ParseError};
use super::{Compiler, LoopCtx, MethodEnv};
use crate::ast::{CasePattern, DeclRef, Expr, Stmt, VarDecl};
use crate::parser::Parser;
use swive_core::opcode::Opcode;
use tracing::debug;

impl Compiler {
    pub(crate) fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        self.enter_recursion(stmt.line())?;
        let result = self.compile_stmt_inner(stmt);
        self.leave_recursion();
        result
    }

    fn compile_stmt_inner(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::VarDecl(decl) => self.compile_var_decl(decl),
            Stmt::TupleDestructuring {
                names,
                initializer,
                line,
            } => self.compile_tuple_destructuring(names, initializer, *line),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                line,
            } => self.compile_if(condition, then_branch, else_branch.as_deref(), *line),
            Stmt::IfLet {
                name,
                value,
                then_branch,
                else_branch,
                line,
            } => self.compile_if_let(name, value, then_branch, else_branch.as_deref(), *line),
            Stmt::GuardLet {
                name,
                value,
                else_branch,
                line,
            } => self.compile_guard_let(name, value, else_branch, *line),
            Stmt::While {
                condition,
                body,
                line,
            } => self.compile_while(condition, body, *line),
            Stmt::RepeatWhile {
                body,
                condition,
                line,
            } => self.compile_repeat_while(body, condition, *line),
            Stmt::ForIn {
                variable,
                iterable,
                body,
                line,
            } => self.compile_for_in(variable, iterable, body, *line),
            Stmt::Switch {
                subject,
                cases,
                default,
                line,
            } => self.compile_switch(subject, cases, default.as_deref(), *line),
            Stmt::Break { line } => self.compile_break(*line),
            Stmt::Continue { line } => self.compile_continue(*line),
            Stmt::Return { value, line } => self.compile_return(value.as_ref(), *line),
            Stmt::Throw { value, line } => {
                self.compile_expr(value)?;
                self.emit_op(Opcode::Throw, *line);
                Ok(())
            }
            Stmt::Print { value, line } => {
                self.compile_expr(value)?;
                self.emit_op(Opcode::Print, *line);
                Ok(())
            }
            Stmt::Block { statements, line } => {
                self.begin_scope();
                for statement in statements {
                    self.compile_stmt(statement)?;
                }
                self.end_scope(*line);
                Ok(())
            }
            Stmt::FuncDecl(decl) => self.compile_func_decl(decl),
            Stmt::ClassDecl(decl) => self.compile_class_decl(decl),
            Stmt::StructDecl(decl) => self.compile_struct_decl(decl),
            Stmt::EnumDecl(decl) => self.compile_enum_decl(decl),
            Stmt::ProtocolDecl(decl) => self.compile_protocol_decl(decl),
            Stmt::ExtensionDecl(decl) => self.compile_extension_decl(decl),
            Stmt::Import { module, line } => self.compile_import(module, *line),
            Stmt::Expression { expr, line } => {
                self.compile_expr(expr)?;
                self.emit_op(Opcode::Pop, *line);
                Ok(())
            }
        }
    }

    // ---- declarations ----

    fn compile_var_decl(&mut self, decl: &VarDecl) -> Result<(), CompileError> {
        if decl.observers.is_some() || decl.accessors.is_some() {
            return Err(CompileError::new(
                "property observers and accessors are only allowed inside type bodies",
                decl.line,
            ));
        }

        // an annotation like `Box<Int>` forces the struct specialization
        if let Some(ty) = &decl.ty {
            if !ty.type_args.is_empty() {
                self.ensure_struct_specialized(ty, decl.line)?;
            }
        }

        let at_global = self.at_global_scope();
        if !at_global {
            self.declare_local(&decl.name, decl.discipline, decl.line)?;
        }

        match &decl.initializer {
            Some(init) => {
                self.compile_expr(init)?;
                if init.is_aliasing_read() {
                    self.emit_op(Opcode::CopyValue, decl.line);
                }
            }
            None => self.emit_op(Opcode::Nil, decl.line),
        }
        self.emit_discipline(decl.discipline, decl.line);

        if at_global {
            self.global_disciplines
                .insert(decl.name.clone(), decl.discipline);
            let idx = self.identifier_constant(&decl.name, decl.line)?;
            self.emit_op(Opcode::DefineGlobal, decl.line);
            self.emit_short(idx, decl.line);
        } else {
            self.mark_initialized();
        }
        Ok(())
    }

    fn compile_tuple_destructuring(
        &mut self,
        names: &[String],
        initializer: &Expr,
        line: u32,
    ) -> Result<(), CompileError> {
        if self.at_global_scope() {
            let hidden = self.hidden_name("tuple");
            self.compile_expr(initializer)?;
            let hidden_idx = self.identifier_constant(&hidden, line)?;
            self.emit_op(Opcode::DefineGlobal, line);
            self.emit_short(hidden_idx, line);
            for (i, name) in names.iter().enumerate() {
                self.emit_op(Opcode::GetGlobal, line);
                self.emit_short(hidden_idx, line);
                let member = self.identifier_constant(&i.to_string(), line)?;
                self.emit_op(Opcode::GetProperty, line);
                self.emit_short(member, line);
                let idx = self.identifier_constant(name, line)?;
                self.emit_op(Opcode::DefineGlobal, line);
                self.emit_short(idx, line);
            }
            return Ok(());
        }

        let hidden = self.hidden_name("tuple");
        self.declare_local(&hidden, DeclRef::Strong, line)?;
        self.compile_expr(initializer)?;
        self.mark_initialized();
        for (i, name) in names.iter().enumerate() {
            self.declare_local(name, DeclRef::Strong, line)?;
            self.emit_variable_get(&hidden, line)?;
            let member = self.identifier_constant(&i.to_string(), line)?;
            self.emit_op(Opcode::GetProperty, line);
            self.emit_short(member, line);
            self.mark_initialized();
        }
        Ok(())
    }

    fn compile_func_decl(&mut self, decl: &crate::ast::FuncDecl) -> Result<(), CompileError> {
        if !decl.generic_params.is_empty() {
            // templates compile only when specialized
            self.generic_funcs.insert(decl.name.clone(), decl.clone());
            return Ok(());
        }

        let at_global = self.at_global_scope();
        if at_global && decl.name == "main" && decl.params.is_empty() {
            self.record_entry_global_main();
        }

        if !at_global {
            self.declare_local(&decl.name, DeclRef::Strong, decl.line)?;
            self.mark_initialized();
        }

        let (idx, upvalues) = self.compile_function_body(
            &decl.name,
            false,
            &[],
            &decl.params,
            &decl.body,
            MethodEnv::default(),
            false,
            decl.is_override,
            decl.line,
        )?;
        self.emit_function_value(idx, &upvalues, decl.line)?;

        if at_global {
            let name_idx = self.identifier_constant(&decl.name, decl.line)?;
            self.emit_op(Opcode::DefineGlobal, decl.line);
            self.emit_short(name_idx, decl.line);
        }
        Ok(())
    }

    // ---- control flow ----

    fn compile_if(
        &mut self,
        condition: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
        line: u32,
    ) -> Result<(), CompileError> {
        self.compile_expr(condition)?;
        let else_jump = self.emit_jump(Opcode::JumpIfFalse, line);
        self.emit_op(Opcode::Pop, line);
        self.compile_stmt(then_branch)?;
        let end_jump = self.emit_jump(Opcode::Jump, line);
        self.patch_jump(else_jump, line)?;
        self.emit_op(Opcode::Pop, line);
        if let Some(else_branch) = else_branch {
            self.compile_stmt(else_branch)?;
        }
        self.patch_jump(end_jump, line)?;
        Ok(())
    }

    fn compile_if_let(
        &mut self,
        name: &str,
        value: &Expr,
        then_branch: &Stmt,
        else_branch: Option<&Stmt>,
        line: u32,
    ) -> Result<(), CompileError> {
        self.compile_expr(value)?;
        let else_jump = self.emit_jump(Opcode::JumpIfNil, line);

        // the non-nil value stays on the stack and becomes the binding
        self.begin_scope();
        self.declare_local(name, DeclRef::Strong, line)?;
        self.mark_initialized();
        self.compile_stmt(then_branch)?;
        self.end_scope(line);

        let end_jump = self.emit_jump(Opcode::Jump, line);
        self.patch_jump(else_jump, line)?;
        // the nil was already popped by JUMP_IF_NIL
        if let Some(else_branch) = else_branch {
            self.compile_stmt(else_branch)?;
        }
        self.patch_jump(end_jump, line)?;
        Ok(())
    }

    fn compile_guard_let(
        &mut self,
        name: &str,
        value: &Expr,
        else_branch: &Stmt,
        line: u32,
    ) -> Result<(), CompileError> {
        if !Self::is_exiting_stmt(else_branch) {
            return Err(CompileError::new(
                "guard let requires the else branch to exit (return or throw)",
                line,
            ));
        }

        self.compile_expr(value)?;
        let else_jump = self.emit_jump(Opcode::JumpIfNil, line);

        let locals_before = self.ctx_ref().locals.len();
        if self.at_global_scope() {
            let idx = self.identifier_constant(name, line)?;
            self.emit_op(Opcode::DefineGlobal, line);
            self.emit_short(idx, line);
        } else {
            self.declare_local(name, DeclRef::Strong, line)?;
            self.mark_initialized();
        }

        let end_jump = self.emit_jump(Opcode::Jump, line);
        self.patch_jump(else_jump, line)?;

        // the binding does not exist on the failing path
        let saved = self.ctx_ref().locals.clone();
        self.ctx().locals.truncate(locals_before);
        self.compile_stmt(else_branch)?;
        self.ctx().locals = saved;

        self.patch_jump(end_jump, line)?;
        Ok(())
    }

    pub(crate) fn is_exiting_stmt(stmt: &Stmt) -> bool {
        match stmt {
            Stmt::Return { .. } | Stmt::Throw { .. } => true,
            Stmt::Block { statements, .. } => statements
                .last()
                .map(Self::is_exiting_stmt)
                .unwrap_or(false),
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => match else_branch {
                Some(else_branch) => {
                    Self::is_exiting_stmt(then_branch) && Self::is_exiting_stmt(else_branch)
                }
                None => false,
            },
            _ => false,
        }
    }

    fn push_loop(&mut self) {
        let loop_start = self.code_len();
        let scope_depth = self.ctx_ref().scope_depth;
        self.ctx().loop_stack.push(LoopCtx {
            break_jumps: Vec::new(),
            continue_jumps: Vec::new(),
            loop_start,
            scope_depth,
        });
    }

    fn pop_loop(&mut self, line: u32) -> Result<(), CompileError> {
        let breaks = match self.ctx().loop_stack.pop() {
            Some(ctx) => ctx.break_jumps,
            None => Vec::new(),
        };
        for jump in breaks {
            self.patch_jump(jump, line)?;
        }
        Ok(())
    }

    fn patch_continues(&mut self, line: u32) -> Result<(), CompileError> {
        let continues = match self.ctx().loop_stack.last_mut() {
            Some(ctx) => std::mem::take(&mut ctx.continue_jumps),
            None => Vec::new(),
        };
        for jump in continues {
            self.patch_jump(jump, line)?;
        }
        Ok(())
    }

    fn compile_while(
        &mut self,
        condition: &Expr,
        body: &Stmt,
        line: u32,
    ) -> Result<(), CompileError> {
        self.push_loop();
        let loop_start = self.code_len();
        if let Some(ctx) = self.ctx().loop_stack.last_mut() {
            ctx.loop_start = loop_start;
        }

        self.compile_expr(condition)?;
        let exit_jump = self.emit_jump(Opcode::JumpIfFalse, line);
        self.emit_op(Opcode::Pop, line);

        self.compile_stmt(body)?;
        self.patch_continues(line)?;
        self.emit_loop(loop_start, line)?;

        self.patch_jump(exit_jump, line)?;
        self.emit_op(Opcode::Pop, line);
        self.pop_loop(line)?;
        Ok(())
    }

    fn compile_repeat_while(
        &mut self,
        body: &Stmt,
        condition: &Expr,
        line: u32,
    ) -> Result<(), CompileError> {
        self.push_loop();
        let loop_start = self.code_len();
        if let Some(ctx) = self.ctx().loop_stack.last_mut() {
            ctx.loop_start = loop_start;
        }

        self.compile_stmt(body)?;
        self.patch_continues(line)?;
        self.compile_expr(condition)?;
        let exit_jump = self.emit_jump(Opcode::JumpIfFalse, line);
        self.emit_op(Opcode::Pop, line);
        self.emit_loop(loop_start, line)?;

        self.patch_jump(exit_jump, line)?;
        self.emit_op(Opcode::Pop, line);
        self.pop_loop(line)?;
        Ok(())
    }

    fn compile_for_in(
        &mut self,
        variable: &str,
        iterable: &Expr,
        body: &Stmt,
        line: u32,
    ) -> Result<(), CompileError> {
        if let Expr::Range {
            start,
            end,
            inclusive,
            ..
        } = iterable
        {
            return self.compile_for_in_range(variable, start, end, *inclusive, body, line);
        }
        self.compile_for_in_indexed(variable, iterable, body, line)
    }

    /// `for i in a..b` lowers to a counter loop over the bound locals.
    fn compile_for_in_range(
        &mut self,
        variable: &str,
        start: &Expr,
        end: &Expr,
        inclusive: bool,
        body: &Stmt,
        line: u32,
    ) -> Result<(), CompileError> {
        self.begin_scope();

        self.declare_local(variable, DeclRef::Strong, line)?;
        self.compile_expr(start)?;
        self.mark_initialized();

        let end_name = self.hidden_name("end");
        self.declare_local(&end_name, DeclRef::Strong, line)?;
        self.compile_expr(end)?;
        self.mark_initialized();

        self.push_loop();
        let loop_start = self.code_len();
        if let Some(ctx) = self.ctx().loop_stack.last_mut() {
            ctx.loop_start = loop_start;
        }

        self.emit_variable_get(variable, line)?;
        self.emit_variable_get(&end_name, line)?;
        self.emit_op(
            if inclusive {
                Opcode::LessEqual
            } else {
                Opcode::Less
            },
            line,
        );
        let exit_jump = self.emit_jump(Opcode::JumpIfFalse, line);
        self.emit_op(Opcode::Pop, line);

        self.compile_stmt(body)?;
        self.patch_continues(line)?;
        self.emit_increment(variable, line)?;
        self.emit_loop(loop_start, line)?;

        self.patch_jump(exit_jump, line)?;
        self.emit_op(Opcode::Pop, line);
        self.pop_loop(line)?;
        self.end_scope(line);
        Ok(())
    }

    /// Any other iterable loops by index through `count` and subscript, so
    /// lists, strings and range values all iterate.
    fn compile_for_in_indexed(
        &mut self,
        variable: &str,
        iterable: &Expr,
        body: &Stmt,
        line: u32,
    ) -> Result<(), CompileError> {
        self.begin_scope();

        let seq_name = self.hidden_name("seq");
        self.declare_local(&seq_name, DeclRef::Strong, line)?;
        self.compile_expr(iterable)?;
        self.mark_initialized();

        let idx_name = self.hidden_name("idx");
        self.declare_local(&idx_name, DeclRef::Strong, line)?;
        self.emit_constant(swive_core::Value::Int(0), line)?;
        self.mark_initialized();

        self.push_loop();
        let loop_start = self.code_len();
        if let Some(ctx) = self.ctx().loop_stack.last_mut() {
            ctx.loop_start = loop_start;
        }

        self.emit_variable_get(&idx_name, line)?;
        self.emit_variable_get(&seq_name, line)?;
        let count_idx = self.identifier_constant("count", line)?;
        self.emit_op(Opcode::GetProperty, line);
        self.emit_short(count_idx, line);
        self.emit_op(Opcode::Less, line);
        let exit_jump = self.emit_jump(Opcode::JumpIfFalse, line);
        self.emit_op(Opcode::Pop, line);

        self.begin_scope();
        self.declare_local(variable, DeclRef::Strong, line)?;
        self.emit_variable_get(&seq_name, line)?;
        self.emit_variable_get(&idx_name, line)?;
        self.emit_op(Opcode::GetSubscript, line);
        self.mark_initialized();
        self.compile_stmt(body)?;
        self.end_scope(line);

        self.patch_continues(line)?;
        self.emit_increment(&idx_name, line)?;
        self.emit_loop(loop_start, line)?;

        self.patch_jump(exit_jump, line)?;
        self.emit_op(Opcode::Pop, line);
        self.pop_loop(line)?;
        self.end_scope(line);
        Ok(())
    }

    fn emit_increment(&mut self, variable: &str, line: u32) -> Result<(), CompileError> {
        self.emit_variable_get(variable, line)?;
        self.emit_constant(swive_core::Value::Int(1), line)?;
        self.emit_op(Opcode::Add, line);
        self.emit_variable_set_resolved(variable, line)?;
        self.emit_op(Opcode::Pop, line);
        Ok(())
    }

    fn compile_break(&mut self, line: u32) -> Result<(), CompileError> {
        let Some(target_depth) = self.ctx_ref().loop_stack.last().map(|l| l.scope_depth) else {
            return Err(CompileError::new("'break' outside of a loop", line));
        };
        self.emit_loop_exit_pops(target_depth, line);
        let jump = self.emit_jump(Opcode::Jump, line);
        if let Some(ctx) = self.ctx().loop_stack.last_mut() {
            ctx.break_jumps.push(jump);
        }
        Ok(())
    }

    fn compile_continue(&mut self, line: u32) -> Result<(), CompileError> {
        let Some(target_depth) = self.ctx_ref().loop_stack.last().map(|l| l.scope_depth) else {
            return Err(CompileError::new("'continue' outside of a loop", line));
        };
        self.emit_loop_exit_pops(target_depth, line);
        let jump = self.emit_jump(Opcode::Jump, line);
        if let Some(ctx) = self.ctx().loop_stack.last_mut() {
            ctx.continue_jumps.push(jump);
        }
        Ok(())
    }

    /// Pops (or closes) every local declared since the loop started,
    /// without removing them from the compile-time scope.
    fn emit_loop_exit_pops(&mut self, target_depth: i32, line: u32) {
        let pops: Vec<bool> = self
            .ctx_ref()
            .locals
            .iter()
            .rev()
            .take_while(|local| local.depth > target_depth)
            .map(|local| local.is_captured)
            .collect();
        for captured in pops {
            self.emit_op(
                if captured {
                    Opcode::CloseUpvalue
                } else {
                    Opcode::Pop
                },
                line,
            );
        }
    }

    fn compile_return(&mut self, value: Option<&Expr>, line: u32) -> Result<(), CompileError> {
        if self.ctxs.len() == 1 {
            return Err(CompileError::new("'return' outside of a function", line));
        }
        match value {
            Some(value) => self.compile_expr(value)?,
            None => self.emit_op(Opcode::Nil, line),
        }
        self.emit_op(Opcode::Return, line);
        Ok(())
    }

    fn compile_switch(
        &mut self,
        subject: &Expr,
        cases: &[crate::ast::SwitchCase],
        default: Option<&[Stmt]>,
        line: u32,
    ) -> Result<(), CompileError> {
        self.begin_scope();

        let subject_name = self.hidden_name("switch");
        self.declare_local(&subject_name, DeclRef::Strong, line)?;
        self.compile_expr(subject)?;
        self.mark_initialized();

        let mut end_jumps = Vec::new();
        for case in cases {
            let case_line = case.line;
            match &case.pattern {
                CasePattern::EnumCase {
                    case_name, bindings, ..
                } => {
                    self.emit_variable_get(&subject_name, case_line)?;
                    let name_idx = self.identifier_constant(case_name, case_line)?;
                    self.emit_op(Opcode::MatchEnumCase, case_line);
                    self.emit_short(name_idx, case_line);
                    let next_jump = self.emit_jump(Opcode::JumpIfFalse, case_line);
                    self.emit_op(Opcode::Pop, case_line);

                    self.begin_scope();
                    for (i, binding) in bindings.iter().enumerate() {
                        self.declare_local(binding, DeclRef::Strong, case_line)?;
                        self.emit_variable_get(&subject_name, case_line)?;
                        self.emit_op(Opcode::GetAssociated, case_line);
                        let idx = self.check_u16(i, "too many bindings", case_line)?;
                        self.emit_short(idx, case_line);
                        self.mark_initialized();
                    }
                    for stmt in &case.body {
                        self.compile_stmt(stmt)?;
                    }
                    self.end_scope(case_line);

                    end_jumps.push(self.emit_jump(Opcode::Jump, case_line));
                    self.patch_jump(next_jump, case_line)?;
                    self.emit_op(Opcode::Pop, case_line);
                }
                CasePattern::Expr(pattern) => {
                    self.emit_variable_get(&subject_name, case_line)?;
                    self.compile_expr(pattern)?;
                    self.emit_op(Opcode::Equal, case_line);
                    let next_jump = self.emit_jump(Opcode::JumpIfFalse, case_line);
                    self.emit_op(Opcode::Pop, case_line);

                    self.begin_scope();
                    for stmt in &case.body {
                        self.compile_stmt(stmt)?;
                    }
                    self.end_scope(case_line);

                    end_jumps.push(self.emit_jump(Opcode::Jump, case_line));
                    self.patch_jump(next_jump, case_line)?;
                    self.emit_op(Opcode::Pop, case_line);
                }
            }
        }

        if let Some(default) = default {
            self.begin_scope();
            for stmt in default {
                self.compile_stmt(stmt)?;
            }
            self.end_scope(line);
        }

        for jump in end_jumps {
            self.patch_jump(jump, line)?;
        }
        self.end_scope(line);
        Ok(())
    }

    // ---- imports ----

    /// Imported modules compile inline into the same assembly, guarded for
    /// idempotence and cycle detection.
    fn compile_import(&mut self, module: &str, line: u32) -> Result<(), CompileError> {
        if self.imported_modules.contains(module) {
            return Ok(());
        }
        if self.compiling_modules.contains(module) {
            return Err(CompileError::new(
                format!("circular import of '{module}'"),
                line,
            ));
        }

        let Some(resolver) = self.resolver.as_mut() else {
            return Err(CompileError::new(
                format!("no module resolver configured for import '{module}'"),
                line,
            ));
        };
        let (path, source) = resolver
            .resolve_and_load(module)
            .map_err(|e| CompileError::new(e, line))?;
        debug!(module, path = %path.display(), "resolved import");

        let program = Parser::from_source(&source)
            .and_then(|mut p| p.parse())
            .map_err(|e: ParseError| {
                CompileError::new(format!("in module '{module}': {e}"), line)
            })?;

        self.compiling_modules.insert(module.to_string());
        self.collect_generic_templates(&program);
        let result = (|| -> Result<(), CompileError> {
            for stmt in &program {
                self.compile_stmt(stmt)?;
            }
            Ok(())
        })();
        self.compiling_modules.remove(module);
        result?;

        self.imported_modules.insert(module.to_string());
        Ok(())
    }
}
