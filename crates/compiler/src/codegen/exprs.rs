//! Expression lowering.

use super::error::CompileError;
use super::{Compiler, VarTarget};
use crate::ast::{
    AssignOp, BinaryOp, CallArg, Expr, InterpolatedPart, LiteralValue, ParamDecl, Stmt, UnaryOp,
};
use swive_core::chunk::NO_LABEL;
use swive_core::opcode::Opcode;
use swive_core::value::Value;

impl Compiler {
    pub(crate) fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        self.enter_recursion(expr.line())?;
        let result = self.compile_expr_inner(expr);
        self.leave_recursion();
        result
    }

    fn compile_expr_inner(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Literal { value, line } => self.compile_literal(value, *line),
            Expr::Interpolated { parts, line } => self.compile_interpolated(parts, *line),
            Expr::Identifier {
                name,
                type_args,
                line,
            } => {
                if !type_args.is_empty() {
                    let mangled = self.ensure_identifier_specialized(name, type_args, *line)?;
                    let idx = self.identifier_constant(&mangled, *line)?;
                    self.emit_op(Opcode::GetGlobal, *line);
                    self.emit_short(idx, *line);
                    return Ok(());
                }
                self.emit_variable_get(name, *line)
            }
            Expr::SelfExpr { line } => self.emit_load_self(*line),
            Expr::Unary { op, operand, line } => {
                self.compile_expr(operand)?;
                self.emit_op(
                    match op {
                        UnaryOp::Neg => Opcode::Negate,
                        UnaryOp::Not => Opcode::Not,
                        UnaryOp::BitNot => Opcode::BitwiseNot,
                    },
                    *line,
                );
                Ok(())
            }
            Expr::Binary {
                op,
                left,
                right,
                line,
            } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit_op(
                    match op {
                        BinaryOp::Add => Opcode::Add,
                        BinaryOp::Sub => Opcode::Subtract,
                        BinaryOp::Mul => Opcode::Multiply,
                        BinaryOp::Div => Opcode::Divide,
                        BinaryOp::Mod => Opcode::Modulo,
                        BinaryOp::Eq => Opcode::Equal,
                        BinaryOp::Ne => Opcode::NotEqual,
                        BinaryOp::Lt => Opcode::Less,
                        BinaryOp::Gt => Opcode::Greater,
                        BinaryOp::Le => Opcode::LessEqual,
                        BinaryOp::Ge => Opcode::GreaterEqual,
                        BinaryOp::And => Opcode::And,
                        BinaryOp::Or => Opcode::Or,
                    },
                    *line,
                );
                Ok(())
            }
            Expr::Assign {
                target,
                op,
                value,
                line,
            } => self.compile_assign(target, *op, value, *line),
            Expr::Ternary {
                condition,
                then_value,
                else_value,
                line,
            } => {
                self.compile_expr(condition)?;
                let else_jump = self.emit_jump(Opcode::JumpIfFalse, *line);
                self.emit_op(Opcode::Pop, *line);
                self.compile_expr(then_value)?;
                let end_jump = self.emit_jump(Opcode::Jump, *line);
                self.patch_jump(else_jump, *line)?;
                self.emit_op(Opcode::Pop, *line);
                self.compile_expr(else_value)?;
                self.patch_jump(end_jump, *line)?;
                Ok(())
            }
            Expr::ForceUnwrap { operand, line } => {
                self.compile_expr(operand)?;
                self.emit_op(Opcode::Unwrap, *line);
                Ok(())
            }
            Expr::NilCoalesce {
                value,
                fallback,
                line,
            } => {
                // left, JUMP_IF_NIL to fallback, jump over it otherwise
                self.compile_expr(value)?;
                let nil_jump = self.emit_jump(Opcode::JumpIfNil, *line);
                let end_jump = self.emit_jump(Opcode::Jump, *line);
                self.patch_jump(nil_jump, *line)?;
                self.compile_expr(fallback)?;
                self.patch_jump(end_jump, *line)?;
                Ok(())
            }
            Expr::OptionalChain {
                object,
                member,
                line,
            } => {
                self.compile_expr(object)?;
                let idx = self.identifier_constant(member, *line)?;
                self.emit_op(Opcode::OptionalChain, *line);
                self.emit_short(idx, *line);
                Ok(())
            }
            Expr::Member {
                object,
                member,
                line,
            } => {
                self.compile_expr(object)?;
                let idx = self.identifier_constant(member, *line)?;
                self.emit_op(Opcode::GetProperty, *line);
                self.emit_short(idx, *line);
                Ok(())
            }
            Expr::Super { member, line } => {
                self.emit_load_self(*line)?;
                let idx = self.identifier_constant(member, *line)?;
                self.emit_op(Opcode::Super, *line);
                self.emit_short(idx, *line);
                Ok(())
            }
            Expr::Call { callee, args, line } => self.compile_call(callee, args, *line),
            Expr::Range {
                start,
                end,
                inclusive,
                line,
            } => {
                self.compile_expr(start)?;
                self.compile_expr(end)?;
                self.emit_op(
                    if *inclusive {
                        Opcode::RangeInclusive
                    } else {
                        Opcode::RangeExclusive
                    },
                    *line,
                );
                Ok(())
            }
            Expr::ArrayLiteral { elements, line } => {
                for element in elements {
                    self.compile_expr(element)?;
                }
                let count = self.check_u16(elements.len(), "too many array elements", *line)?;
                self.emit_op(Opcode::Array, *line);
                self.emit_short(count, *line);
                Ok(())
            }
            Expr::DictLiteral { entries, line } => {
                for (key, value) in entries {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                let count = self.check_u16(entries.len(), "too many dictionary entries", *line)?;
                self.emit_op(Opcode::Dict, *line);
                self.emit_short(count, *line);
                Ok(())
            }
            Expr::TupleLiteral { elements, line } => {
                for (_, value) in elements {
                    self.compile_expr(value)?;
                }
                let count = self.check_u16(elements.len(), "too many tuple elements", *line)?;
                // label table follows the count, one u16 per element
                let mut label_indexes = Vec::with_capacity(elements.len());
                for (label, _) in elements {
                    match label {
                        Some(label) => {
                            label_indexes.push(self.identifier_constant(label, *line)?);
                        }
                        None => label_indexes.push(NO_LABEL),
                    }
                }
                self.emit_op(Opcode::Tuple, *line);
                self.emit_short(count, *line);
                for idx in label_indexes {
                    self.emit_short(idx, *line);
                }
                Ok(())
            }
            Expr::Subscript {
                object,
                index,
                line,
            } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                self.emit_op(Opcode::GetSubscript, *line);
                Ok(())
            }
            Expr::Closure { params, body, line } => self.compile_closure(params, body, *line),
        }
    }

    fn compile_literal(&mut self, value: &LiteralValue, line: u32) -> Result<(), CompileError> {
        match value {
            LiteralValue::Nil => {
                self.emit_op(Opcode::Nil, line);
                Ok(())
            }
            LiteralValue::Bool(true) => {
                self.emit_op(Opcode::True, line);
                Ok(())
            }
            LiteralValue::Bool(false) => {
                self.emit_op(Opcode::False, line);
                Ok(())
            }
            LiteralValue::Int(i) => self.emit_constant(Value::Int(*i), line),
            LiteralValue::Float(f) => self.emit_constant(Value::Float(*f), line),
            LiteralValue::Str(s) => {
                let s = s.clone();
                self.emit_string(&s, line)
            }
        }
    }

    /// Interpolation folds into string concatenation; the leading string
    /// part guarantees `ADD` concatenates.
    fn compile_interpolated(
        &mut self,
        parts: &[InterpolatedPart],
        line: u32,
    ) -> Result<(), CompileError> {
        let mut first = true;
        for part in parts {
            match part {
                InterpolatedPart::Text(text) => {
                    let text = text.clone();
                    self.emit_string(&text, line)?;
                }
                InterpolatedPart::Expr(expr) => {
                    if first {
                        self.emit_string("", line)?;
                        self.compile_expr(expr)?;
                        self.emit_op(Opcode::Add, line);
                        first = false;
                        continue;
                    }
                    self.compile_expr(expr)?;
                }
            }
            if !first {
                self.emit_op(Opcode::Add, line);
            }
            first = false;
        }
        if parts.is_empty() {
            self.emit_string("", line)?;
        }
        Ok(())
    }

    // ---- assignment ----

    fn compile_assign(
        &mut self,
        target: &Expr,
        op: AssignOp,
        value: &Expr,
        line: u32,
    ) -> Result<(), CompileError> {
        match target {
            Expr::Identifier { name, .. } => self.compile_assign_identifier(name, op, value, line),
            Expr::Member { object, member, .. } => {
                if matches!(object.as_ref(), Expr::SelfExpr { .. }) {
                    self.check_struct_mutation(member, line)?;
                }
                self.compile_expr(object)?;
                if op != AssignOp::Set {
                    self.compile_expr(object)?;
                    let idx = self.identifier_constant(member, line)?;
                    self.emit_op(Opcode::GetProperty, line);
                    self.emit_short(idx, line);
                    self.compile_expr(value)?;
                    self.emit_compound_op(op, line);
                } else {
                    self.compile_expr(value)?;
                    if value.is_aliasing_read() {
                        self.emit_op(Opcode::CopyValue, line);
                    }
                }
                self.emit_member_discipline(object, member, line);
                let idx = self.identifier_constant(member, line)?;
                self.emit_op(Opcode::SetProperty, line);
                self.emit_short(idx, line);
                Ok(())
            }
            Expr::Subscript { object, index, .. } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                if op != AssignOp::Set {
                    self.compile_expr(object)?;
                    self.compile_expr(index)?;
                    self.emit_op(Opcode::GetSubscript, line);
                    self.compile_expr(value)?;
                    self.emit_compound_op(op, line);
                } else {
                    self.compile_expr(value)?;
                    if value.is_aliasing_read() {
                        self.emit_op(Opcode::CopyValue, line);
                    }
                }
                self.emit_op(Opcode::SetSubscript, line);
                Ok(())
            }
            Expr::SelfExpr { .. } => Err(CompileError::new("cannot assign to 'self'", line)),
            _ => Err(CompileError::new("invalid assignment target", line)),
        }
    }

    fn compile_assign_identifier(
        &mut self,
        name: &str,
        op: AssignOp,
        value: &Expr,
        line: u32,
    ) -> Result<(), CompileError> {
        match self.classify_variable(name, line)? {
            VarTarget::SelfProperty | VarTarget::SelfMethod => {
                self.check_struct_mutation(name, line)?;
                // receiver must sit below the value for SET_PROPERTY
                self.emit_load_self(line)?;
                if op != AssignOp::Set {
                    self.emit_load_self(line)?;
                    let idx = self.identifier_constant(name, line)?;
                    self.emit_op(Opcode::GetProperty, line);
                    self.emit_short(idx, line);
                    self.compile_expr(value)?;
                    self.emit_compound_op(op, line);
                } else {
                    self.compile_expr(value)?;
                    if value.is_aliasing_read() {
                        self.emit_op(Opcode::CopyValue, line);
                    }
                }
                if self.ctx_ref().env.weak_properties.contains(name) {
                    self.emit_op(Opcode::MakeWeak, line);
                }
                let idx = self.identifier_constant(name, line)?;
                self.emit_op(Opcode::SetProperty, line);
                self.emit_short(idx, line);
                Ok(())
            }
            target => {
                if op != AssignOp::Set {
                    self.emit_variable_get(name, line)?;
                    self.compile_expr(value)?;
                    self.emit_compound_op(op, line);
                } else {
                    self.compile_expr(value)?;
                    if value.is_aliasing_read() {
                        self.emit_op(Opcode::CopyValue, line);
                    }
                }
                let discipline = match &target {
                    VarTarget::Local { discipline, .. } => *discipline,
                    VarTarget::Global { discipline } => *discipline,
                    _ => crate::ast::DeclRef::Strong,
                };
                self.emit_discipline(discipline, line);
                self.emit_variable_set_target(target, name, line)
            }
        }
    }

    /// Writes through `self` inside a struct method require `mutating`.
    fn check_struct_mutation(&mut self, name: &str, line: u32) -> Result<(), CompileError> {
        let env = &self.ctx_ref().env;
        if env.in_struct && !env.is_mutating && env.type_properties.contains(name) {
            return Err(CompileError::new(
                format!("cannot assign to property '{name}' in a non-mutating struct method"),
                line,
            ));
        }
        Ok(())
    }

    fn emit_compound_op(&mut self, op: AssignOp, line: u32) {
        self.emit_op(
            match op {
                AssignOp::Add => Opcode::Add,
                AssignOp::Sub => Opcode::Subtract,
                AssignOp::Mul => Opcode::Multiply,
                AssignOp::Div => Opcode::Divide,
                AssignOp::Set => return,
            },
            line,
        );
    }

    /// `self.<weak property> = x` retags before the store.
    fn emit_member_discipline(&mut self, object: &Expr, member: &str, line: u32) {
        if matches!(object, Expr::SelfExpr { .. })
            && self.ctx_ref().env.weak_properties.contains(member)
        {
            self.emit_op(Opcode::MakeWeak, line);
        }
    }

    /// Stores the stack top into an already-classified target.
    fn emit_variable_set_target(
        &mut self,
        target: VarTarget,
        name: &str,
        line: u32,
    ) -> Result<(), CompileError> {
        match target {
            VarTarget::Local { slot, .. } => {
                self.emit_op(Opcode::SetLocal, line);
                self.emit_short(slot, line);
                Ok(())
            }
            VarTarget::Upvalue { index } => {
                self.emit_op(Opcode::SetUpvalue, line);
                self.emit_short(index, line);
                Ok(())
            }
            VarTarget::Global { .. } => {
                let idx = self.identifier_constant(name, line)?;
                self.emit_op(Opcode::SetGlobal, line);
                self.emit_short(idx, line);
                Ok(())
            }
            VarTarget::SelfProperty | VarTarget::SelfMethod => Err(CompileError::new(
                "internal error: self property store must emit its receiver first",
                line,
            )),
        }
    }

    /// Store path for compiler-generated variables (loop counters).
    pub(crate) fn emit_variable_set_resolved(
        &mut self,
        name: &str,
        line: u32,
    ) -> Result<(), CompileError> {
        let target = self.classify_variable(name, line)?;
        self.emit_variable_set_target(target, name, line)
    }

    // ---- calls ----

    fn compile_call(
        &mut self,
        callee: &Expr,
        args: &[CallArg],
        line: u32,
    ) -> Result<(), CompileError> {
        // readLine() is an instruction, not a runtime call
        if let Expr::Identifier {
            name, type_args, ..
        } = callee
        {
            if name == "readLine" && args.is_empty() && type_args.is_empty() {
                self.emit_op(Opcode::ReadLine, line);
                return Ok(());
            }
        }

        self.compile_expr(callee)?;

        let mut saw_label = false;
        for arg in args {
            match &arg.label {
                Some(_) => saw_label = true,
                None if saw_label => {
                    return Err(CompileError::new(
                        "positional argument after named argument",
                        line,
                    ));
                }
                None => {}
            }
            self.compile_expr(&arg.value)?;
            if arg.value.is_aliasing_read() {
                self.emit_op(Opcode::CopyValue, line);
            }
        }

        let count = self.check_u16(args.len(), "too many arguments in function call", line)?;
        if saw_label {
            let mut pairs = Vec::with_capacity(args.len());
            for (i, arg) in args.iter().enumerate() {
                let label_idx = match &arg.label {
                    Some(label) => self.identifier_constant(label, line)?,
                    None => NO_LABEL,
                };
                pairs.push((i as u16, label_idx));
            }
            self.emit_op(Opcode::CallNamed, line);
            self.emit_short(count, line);
            for (arg_idx, label_idx) in pairs {
                self.emit_short(arg_idx, line);
                self.emit_short(label_idx, line);
            }
        } else {
            self.emit_op(Opcode::Call, line);
            self.emit_short(count, line);
        }
        Ok(())
    }

    fn compile_closure(
        &mut self,
        params: &[ParamDecl],
        body: &[Stmt],
        line: u32,
    ) -> Result<(), CompileError> {
        let (idx, upvalues) = self.compile_function_body(
            "",
            false,
            &[],
            params,
            body,
            super::MethodEnv::default(),
            false,
            false,
            line,
        )?;
        self.emit_function_value(idx, &upvalues, line)
    }
}
