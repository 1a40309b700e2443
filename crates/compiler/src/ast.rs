//! Syntax tree for SwiftScript.
//!
//! Nodes are plain enums and structs, `Clone` so generic specialization
//! can duplicate templated declarations before substitution. Every node
//! carries the source line of its introducing token.

/// A type annotation, possibly generic and possibly optional (`Box<Int>?`).
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation {
    pub name: String,
    pub type_args: Vec<TypeAnnotation>,
    pub is_optional: bool,
}

impl TypeAnnotation {
    pub fn plain(name: impl Into<String>) -> TypeAnnotation {
        TypeAnnotation {
            name: name.into(),
            type_args: Vec::new(),
            is_optional: false,
        }
    }

    /// The mangled display form, used for specialization names and method
    /// signatures: `Box<Int>` renders as `Box_Int`.
    pub fn mangled(&self) -> String {
        let mut out = self.name.clone();
        for arg in &self.type_args {
            out.push('_');
            out.push_str(&arg.mangled());
        }
        out
    }
}

/// Reference discipline spelled on a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeclRef {
    #[default]
    Strong,
    Weak,
    Unowned,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    /// External argument label. `None` means "use the parameter name";
    /// `Some("")` is the `_` spelling (positional only).
    pub label: Option<String>,
    pub name: String,
    pub ty: Option<TypeAnnotation>,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Observers {
    pub will_set: Option<Vec<Stmt>>,
    pub did_set: Option<Vec<Stmt>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Accessors {
    pub getter: Vec<Stmt>,
    pub setter: Option<Vec<Stmt>>,
}

/// A `var`/`let` declaration: top-level, local, or a stored/computed
/// property inside a type body.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub is_let: bool,
    pub discipline: DeclRef,
    pub is_lazy: bool,
    pub is_static: bool,
    pub ty: Option<TypeAnnotation>,
    pub initializer: Option<Expr>,
    pub observers: Option<Observers>,
    pub accessors: Option<Accessors>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    pub generic_params: Vec<String>,
    pub params: Vec<ParamDecl>,
    pub return_type: Option<TypeAnnotation>,
    pub body: Vec<Stmt>,
    pub is_static: bool,
    pub is_override: bool,
    pub is_mutating: bool,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub generic_params: Vec<String>,
    /// Superclass and/or protocol conformances, in source order.
    pub supertypes: Vec<String>,
    pub properties: Vec<VarDecl>,
    pub methods: Vec<FuncDecl>,
    pub initializers: Vec<FuncDecl>,
    pub deinitializer: Option<FuncDecl>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: String,
    pub generic_params: Vec<String>,
    pub conformances: Vec<String>,
    pub properties: Vec<VarDecl>,
    pub methods: Vec<FuncDecl>,
    pub initializers: Vec<FuncDecl>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumCaseDecl {
    pub name: String,
    pub raw_value: Option<Expr>,
    /// Associated-value slots: optional label + type.
    pub associated: Vec<(Option<String>, TypeAnnotation)>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: String,
    pub conformances: Vec<String>,
    pub cases: Vec<EnumCaseDecl>,
    pub methods: Vec<FuncDecl>,
    pub properties: Vec<VarDecl>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolMethodReq {
    pub name: String,
    pub param_names: Vec<String>,
    pub is_mutating: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolPropertyReq {
    pub name: String,
    pub has_getter: bool,
    pub has_setter: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolDecl {
    pub name: String,
    pub inherited: Vec<String>,
    pub methods: Vec<ProtocolMethodReq>,
    pub properties: Vec<ProtocolPropertyReq>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionDecl {
    pub type_name: String,
    pub methods: Vec<FuncDecl>,
    pub properties: Vec<VarDecl>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CasePattern {
    /// `.name(let a, let b)` or `Type.name(...)`.
    EnumCase {
        type_name: Option<String>,
        case_name: String,
        bindings: Vec<String>,
    },
    /// A literal or other expression compared for equality.
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub pattern: CasePattern,
    pub body: Vec<Stmt>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    VarDecl(VarDecl),
    TupleDestructuring {
        names: Vec<String>,
        initializer: Expr,
        line: u32,
    },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        line: u32,
    },
    IfLet {
        name: String,
        value: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        line: u32,
    },
    GuardLet {
        name: String,
        value: Expr,
        else_branch: Box<Stmt>,
        line: u32,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
        line: u32,
    },
    RepeatWhile {
        body: Box<Stmt>,
        condition: Expr,
        line: u32,
    },
    ForIn {
        variable: String,
        iterable: Expr,
        body: Box<Stmt>,
        line: u32,
    },
    Switch {
        subject: Expr,
        cases: Vec<SwitchCase>,
        default: Option<Vec<Stmt>>,
        line: u32,
    },
    Break {
        line: u32,
    },
    Continue {
        line: u32,
    },
    Return {
        value: Option<Expr>,
        line: u32,
    },
    Throw {
        value: Expr,
        line: u32,
    },
    Print {
        value: Expr,
        line: u32,
    },
    Block {
        statements: Vec<Stmt>,
        line: u32,
    },
    FuncDecl(FuncDecl),
    ClassDecl(ClassDecl),
    StructDecl(StructDecl),
    EnumDecl(EnumDecl),
    ProtocolDecl(ProtocolDecl),
    ExtensionDecl(ExtensionDecl),
    Import {
        module: String,
        line: u32,
    },
    Expression {
        expr: Expr,
        line: u32,
    },
}

impl Stmt {
    pub fn line(&self) -> u32 {
        match self {
            Stmt::VarDecl(d) => d.line,
            Stmt::TupleDestructuring { line, .. }
            | Stmt::If { line, .. }
            | Stmt::IfLet { line, .. }
            | Stmt::GuardLet { line, .. }
            | Stmt::While { line, .. }
            | Stmt::RepeatWhile { line, .. }
            | Stmt::ForIn { line, .. }
            | Stmt::Switch { line, .. }
            | Stmt::Break { line }
            | Stmt::Continue { line }
            | Stmt::Return { line, .. }
            | Stmt::Throw { line, .. }
            | Stmt::Print { line, .. }
            | Stmt::Block { line, .. }
            | Stmt::Import { line, .. }
            | Stmt::Expression { line, .. } => *line,
            Stmt::FuncDecl(d) => d.line,
            Stmt::ClassDecl(d) => d.line,
            Stmt::StructDecl(d) => d.line,
            Stmt::EnumDecl(d) => d.line,
            Stmt::ProtocolDecl(d) => d.line,
            Stmt::ExtensionDecl(d) => d.line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterpolatedPart {
    Text(String),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallArg {
    pub label: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal {
        value: LiteralValue,
        line: u32,
    },
    Interpolated {
        parts: Vec<InterpolatedPart>,
        line: u32,
    },
    Identifier {
        name: String,
        type_args: Vec<TypeAnnotation>,
        line: u32,
    },
    SelfExpr {
        line: u32,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        line: u32,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        line: u32,
    },
    Assign {
        target: Box<Expr>,
        op: AssignOp,
        value: Box<Expr>,
        line: u32,
    },
    Ternary {
        condition: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
        line: u32,
    },
    ForceUnwrap {
        operand: Box<Expr>,
        line: u32,
    },
    NilCoalesce {
        value: Box<Expr>,
        fallback: Box<Expr>,
        line: u32,
    },
    OptionalChain {
        object: Box<Expr>,
        member: String,
        line: u32,
    },
    Member {
        object: Box<Expr>,
        member: String,
        line: u32,
    },
    Super {
        member: String,
        line: u32,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<CallArg>,
        line: u32,
    },
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        inclusive: bool,
        line: u32,
    },
    ArrayLiteral {
        elements: Vec<Expr>,
        line: u32,
    },
    DictLiteral {
        entries: Vec<(Expr, Expr)>,
        line: u32,
    },
    TupleLiteral {
        elements: Vec<(Option<String>, Expr)>,
        line: u32,
    },
    Subscript {
        object: Box<Expr>,
        index: Box<Expr>,
        line: u32,
    },
    Closure {
        params: Vec<ParamDecl>,
        body: Vec<Stmt>,
        line: u32,
    },
}

impl Expr {
    pub fn line(&self) -> u32 {
        match self {
            Expr::Literal { line, .. }
            | Expr::Interpolated { line, .. }
            | Expr::Identifier { line, .. }
            | Expr::SelfExpr { line }
            | Expr::Unary { line, .. }
            | Expr::Binary { line, .. }
            | Expr::Assign { line, .. }
            | Expr::Ternary { line, .. }
            | Expr::ForceUnwrap { line, .. }
            | Expr::NilCoalesce { line, .. }
            | Expr::OptionalChain { line, .. }
            | Expr::Member { line, .. }
            | Expr::Super { line, .. }
            | Expr::Call { line, .. }
            | Expr::Range { line, .. }
            | Expr::ArrayLiteral { line, .. }
            | Expr::DictLiteral { line, .. }
            | Expr::TupleLiteral { line, .. }
            | Expr::Subscript { line, .. }
            | Expr::Closure { line, .. } => *line,
        }
    }

    /// True for reads whose result may alias another variable; assignments
    /// and argument positions copy these to preserve struct value
    /// semantics.
    pub fn is_aliasing_read(&self) -> bool {
        matches!(
            self,
            Expr::Identifier { .. }
                | Expr::Member { .. }
                | Expr::Subscript { .. }
                | Expr::SelfExpr { .. }
        )
    }
}
