//! Recursive-descent parser.
//!
//! Statements self-delimit; semicolons are accepted and skipped. The
//! expression grammar follows Swift precedence: assignment, ternary,
//! nil-coalescing, logical or/and, equality, comparison, range, additive,
//! multiplicative, unary, postfix, primary.

use crate::ast::*;
use crate::codegen::error::ParseError;
use crate::lexer::{Lexer, StringSegment, Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Parser {
        Parser { tokens, current: 0 }
    }

    pub fn from_source(source: &str) -> Result<Parser, ParseError> {
        let tokens = Lexer::new(source).tokenize_all()?;
        Ok(Parser::new(tokens))
    }

    pub fn parse(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            if self.match_kind(&TokenKind::Semicolon) {
                continue;
            }
            statements.push(self.declaration()?);
        }
        Ok(statements)
    }

    // ---- declarations ----

    fn declaration(&mut self) -> Result<Stmt, ParseError> {
        if self.check(&TokenKind::Import) {
            return self.import_declaration();
        }
        if self.check(&TokenKind::Class) {
            return Ok(Stmt::ClassDecl(self.class_declaration()?));
        }
        if self.check(&TokenKind::Struct) {
            return Ok(Stmt::StructDecl(self.struct_declaration()?));
        }
        if self.check(&TokenKind::Enum) {
            return Ok(Stmt::EnumDecl(self.enum_declaration()?));
        }
        if self.check(&TokenKind::Protocol) {
            return Ok(Stmt::ProtocolDecl(self.protocol_declaration()?));
        }
        if self.check(&TokenKind::Extension) {
            return Ok(Stmt::ExtensionDecl(self.extension_declaration()?));
        }
        if self.check(&TokenKind::Func) {
            return Ok(Stmt::FuncDecl(self.func_declaration(false, false, false)?));
        }
        if self.check(&TokenKind::Let)
            || self.check(&TokenKind::Var)
            || self.check(&TokenKind::Weak)
            || self.check(&TokenKind::Unowned)
            || self.check_ident("lazy")
        {
            return self.var_statement();
        }
        self.statement()
    }

    fn import_declaration(&mut self) -> Result<Stmt, ParseError> {
        let line = self.peek().line;
        self.consume(&TokenKind::Import, "expected 'import'")?;
        let mut module = self.consume_ident("expected module name after 'import'")?;
        while self.match_kind(&TokenKind::Dot) {
            module.push('.');
            module.push_str(&self.consume_ident("expected module path segment after '.'")?);
        }
        Ok(Stmt::Import { module, line })
    }

    /// `let`/`var` at statement level, including `let (a, b) = e`
    /// destructuring and the weak/unowned/lazy modifiers.
    fn var_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.peek().line;

        let mut discipline = DeclRef::Strong;
        if self.match_kind(&TokenKind::Weak) {
            discipline = DeclRef::Weak;
        } else if self.match_kind(&TokenKind::Unowned) {
            discipline = DeclRef::Unowned;
        }

        let is_lazy = self.match_ident("lazy");

        let is_let = if self.match_kind(&TokenKind::Let) {
            true
        } else if self.match_kind(&TokenKind::Var) {
            false
        } else {
            return Err(self.error_here("expected 'let' or 'var'"));
        };

        if self.check(&TokenKind::LParen) {
            if discipline != DeclRef::Strong || is_lazy {
                return Err(self.error_here("tuple destructuring cannot be weak or lazy"));
            }
            return self.tuple_destructuring(line);
        }

        let name = self.consume_ident("expected variable name")?;
        let ty = if self.match_kind(&TokenKind::Colon) {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };
        let initializer = if self.match_kind(&TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };
        self.match_kind(&TokenKind::Semicolon);

        Ok(Stmt::VarDecl(VarDecl {
            name,
            is_let,
            discipline,
            is_lazy,
            is_static: false,
            ty,
            initializer,
            observers: None,
            accessors: None,
            line,
        }))
    }

    fn tuple_destructuring(&mut self, line: u32) -> Result<Stmt, ParseError> {
        self.consume(&TokenKind::LParen, "expected '('")?;
        let mut names = Vec::new();
        loop {
            names.push(self.consume_ident("expected binding name")?);
            if !self.match_kind(&TokenKind::Comma) {
                break;
            }
        }
        self.consume(&TokenKind::RParen, "expected ')' after bindings")?;
        self.consume(&TokenKind::Equal, "expected '=' in tuple destructuring")?;
        let initializer = self.expression()?;
        self.match_kind(&TokenKind::Semicolon);
        Ok(Stmt::TupleDestructuring {
            names,
            initializer,
            line,
        })
    }

    fn func_declaration(
        &mut self,
        is_static: bool,
        is_override: bool,
        is_mutating: bool,
    ) -> Result<FuncDecl, ParseError> {
        let line = self.peek().line;
        self.consume(&TokenKind::Func, "expected 'func'")?;
        let name = self.consume_ident("expected function name")?;
        let generic_params = self.parse_generic_params()?;
        let params = self.parse_param_clause(true)?;
        let return_type = if self.match_kind(&TokenKind::Arrow) {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };
        self.consume(&TokenKind::LBrace, "expected '{' before function body")?;
        let body = self.block_statements()?;
        Ok(FuncDecl {
            name,
            generic_params,
            params,
            return_type,
            body,
            is_static,
            is_override,
            is_mutating,
            line,
        })
    }

    fn parse_generic_params(&mut self) -> Result<Vec<String>, ParseError> {
        let mut params = Vec::new();
        if self.match_kind(&TokenKind::Less) {
            loop {
                params.push(self.consume_ident("expected generic parameter name")?);
                if !self.match_kind(&TokenKind::Comma) {
                    break;
                }
            }
            self.consume(&TokenKind::Greater, "expected '>' after generic parameters")?;
        }
        Ok(params)
    }

    fn parse_param_clause(&mut self, allow_defaults: bool) -> Result<Vec<ParamDecl>, ParseError> {
        self.consume(&TokenKind::LParen, "expected '(' before parameters")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.parse_param(allow_defaults)?);
                if !self.match_kind(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RParen, "expected ')' after parameters")?;
        Ok(params)
    }

    fn parse_param(&mut self, allow_defaults: bool) -> Result<ParamDecl, ParseError> {
        // `_ name`, `label name`, or bare `name`
        let first = self.consume_param_name()?;
        let (label, name) = if let Some(second) = self.try_ident() {
            let label = if first == "_" { String::new() } else { first };
            (Some(label), second)
        } else {
            if first == "_" {
                return Err(self.error_here("expected parameter name after '_'"));
            }
            (None, first)
        };

        let ty = if self.match_kind(&TokenKind::Colon) {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };
        let default = if allow_defaults && self.match_kind(&TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };
        Ok(ParamDecl {
            label,
            name,
            ty,
            default,
        })
    }

    fn consume_param_name(&mut self) -> Result<String, ParseError> {
        if let TokenKind::Ident(name) = &self.peek().kind {
            let name = name.clone();
            self.advance();
            return Ok(name);
        }
        Err(self.error_here("expected parameter name"))
    }

    fn class_declaration(&mut self) -> Result<ClassDecl, ParseError> {
        let line = self.peek().line;
        self.consume(&TokenKind::Class, "expected 'class'")?;
        let name = self.consume_ident("expected class name")?;
        let generic_params = self.parse_generic_params()?;
        let supertypes = self.parse_inheritance_clause()?;
        self.consume(&TokenKind::LBrace, "expected '{' after class header")?;
        let mut members = TypeMembers::default();
        self.parse_type_members(&mut members, true)?;
        self.consume(&TokenKind::RBrace, "expected '}' after class body")?;
        Ok(ClassDecl {
            name,
            generic_params,
            supertypes,
            properties: members.properties,
            methods: members.methods,
            initializers: members.initializers,
            deinitializer: members.deinitializer,
            line,
        })
    }

    fn struct_declaration(&mut self) -> Result<StructDecl, ParseError> {
        let line = self.peek().line;
        self.consume(&TokenKind::Struct, "expected 'struct'")?;
        let name = self.consume_ident("expected struct name")?;
        let generic_params = self.parse_generic_params()?;
        let conformances = self.parse_inheritance_clause()?;
        self.consume(&TokenKind::LBrace, "expected '{' after struct header")?;
        let mut members = TypeMembers::default();
        self.parse_type_members(&mut members, false)?;
        self.consume(&TokenKind::RBrace, "expected '}' after struct body")?;
        Ok(StructDecl {
            name,
            generic_params,
            conformances,
            properties: members.properties,
            methods: members.methods,
            initializers: members.initializers,
            line,
        })
    }

    fn parse_inheritance_clause(&mut self) -> Result<Vec<String>, ParseError> {
        let mut names = Vec::new();
        if self.match_kind(&TokenKind::Colon) {
            loop {
                names.push(self.consume_ident("expected superclass or protocol name")?);
                if !self.match_kind(&TokenKind::Comma) {
                    break;
                }
            }
        }
        Ok(names)
    }

    fn parse_type_members(
        &mut self,
        members: &mut TypeMembers,
        allow_deinit: bool,
    ) -> Result<(), ParseError> {
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            if self.match_kind(&TokenKind::Semicolon) {
                continue;
            }

            let mut is_static = false;
            let mut is_override = false;
            let mut is_mutating = false;
            loop {
                if self.match_kind(&TokenKind::Static) {
                    is_static = true;
                } else if self.match_kind(&TokenKind::Override) {
                    is_override = true;
                } else if self.check_ident("mutating") && self.check_next(&TokenKind::Func) {
                    self.advance();
                    is_mutating = true;
                } else {
                    break;
                }
            }

            if self.check(&TokenKind::Func) {
                members
                    .methods
                    .push(self.func_declaration(is_static, is_override, is_mutating)?);
            } else if self.check(&TokenKind::Init) {
                members.initializers.push(self.init_declaration()?);
            } else if allow_deinit && self.check(&TokenKind::Deinit) {
                members.deinitializer = Some(self.deinit_declaration()?);
            } else if self.check(&TokenKind::Let)
                || self.check(&TokenKind::Var)
                || self.check(&TokenKind::Weak)
                || self.check(&TokenKind::Unowned)
                || self.check_ident("lazy")
            {
                members.properties.push(self.property_declaration(is_static)?);
            } else {
                return Err(self.error_here("expected a member declaration"));
            }
        }
        Ok(())
    }

    fn init_declaration(&mut self) -> Result<FuncDecl, ParseError> {
        let line = self.peek().line;
        self.consume(&TokenKind::Init, "expected 'init'")?;
        let params = self.parse_param_clause(true)?;
        self.consume(&TokenKind::LBrace, "expected '{' before initializer body")?;
        let body = self.block_statements()?;
        Ok(FuncDecl {
            name: "init".to_string(),
            generic_params: Vec::new(),
            params,
            return_type: None,
            body,
            is_static: false,
            is_override: false,
            is_mutating: false,
            line,
        })
    }

    fn deinit_declaration(&mut self) -> Result<FuncDecl, ParseError> {
        let line = self.peek().line;
        self.consume(&TokenKind::Deinit, "expected 'deinit'")?;
        self.consume(&TokenKind::LBrace, "expected '{' before deinit body")?;
        let body = self.block_statements()?;
        Ok(FuncDecl {
            name: "deinit".to_string(),
            generic_params: Vec::new(),
            params: Vec::new(),
            return_type: None,
            body,
            is_static: false,
            is_override: false,
            is_mutating: false,
            line,
        })
    }

    /// A stored or computed property, with optional observers or accessor
    /// block.
    fn property_declaration(&mut self, is_static: bool) -> Result<VarDecl, ParseError> {
        let line = self.peek().line;
        let mut discipline = DeclRef::Strong;
        if self.match_kind(&TokenKind::Weak) {
            discipline = DeclRef::Weak;
        } else if self.match_kind(&TokenKind::Unowned) {
            discipline = DeclRef::Unowned;
        }
        let is_lazy = self.match_ident("lazy");
        let is_let = if self.match_kind(&TokenKind::Let) {
            true
        } else if self.match_kind(&TokenKind::Var) {
            false
        } else {
            return Err(self.error_here("expected 'let' or 'var'"));
        };
        let name = self.consume_ident("expected property name")?;
        let ty = if self.match_kind(&TokenKind::Colon) {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };
        let initializer = if self.match_kind(&TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };

        let mut observers = None;
        let mut accessors = None;
        if self.check(&TokenKind::LBrace) {
            if self.brace_block_is_observer_or_accessor() {
                self.advance(); // '{'
                if self.check_ident("willSet") || self.check_ident("didSet") {
                    observers = Some(self.parse_observers()?);
                } else {
                    accessors = Some(self.parse_accessors()?);
                }
                self.consume(&TokenKind::RBrace, "expected '}' after property block")?;
            } else if initializer.is_none() && !is_lazy {
                // computed property: the block is the getter body
                self.advance();
                let body = self.block_statements()?;
                accessors = Some(Accessors {
                    getter: body,
                    setter: None,
                });
            }
        }

        self.match_kind(&TokenKind::Semicolon);
        Ok(VarDecl {
            name,
            is_let,
            discipline,
            is_lazy,
            is_static,
            ty,
            initializer,
            observers,
            accessors,
            line,
        })
    }

    /// Distinguishes `{ willSet ... }` / `{ get ... }` from a computed
    /// getter body without consuming anything.
    fn brace_block_is_observer_or_accessor(&self) -> bool {
        if let Some(token) = self.tokens.get(self.current + 1) {
            if let TokenKind::Ident(name) = &token.kind {
                return matches!(name.as_str(), "willSet" | "didSet" | "get" | "set");
            }
        }
        false
    }

    fn parse_observers(&mut self) -> Result<Observers, ParseError> {
        let mut will_set = None;
        let mut did_set = None;
        while self.check_ident("willSet") || self.check_ident("didSet") {
            let is_will = self.check_ident("willSet");
            self.advance();
            self.consume(&TokenKind::LBrace, "expected '{' after observer name")?;
            let body = self.block_statements()?;
            if is_will {
                will_set = Some(body);
            } else {
                did_set = Some(body);
            }
        }
        Ok(Observers { will_set, did_set })
    }

    fn parse_accessors(&mut self) -> Result<Accessors, ParseError> {
        let mut getter = None;
        let mut setter = None;
        while self.check_ident("get") || self.check_ident("set") {
            let is_get = self.check_ident("get");
            self.advance();
            self.consume(&TokenKind::LBrace, "expected '{' after accessor name")?;
            let body = self.block_statements()?;
            if is_get {
                getter = Some(body);
            } else {
                setter = Some(body);
            }
        }
        let Some(getter) = getter else {
            return Err(self.error_here("computed property requires a getter"));
        };
        Ok(Accessors { getter, setter })
    }

    fn enum_declaration(&mut self) -> Result<EnumDecl, ParseError> {
        let line = self.peek().line;
        self.consume(&TokenKind::Enum, "expected 'enum'")?;
        let name = self.consume_ident("expected enum name")?;
        let conformances = self.parse_inheritance_clause()?;
        self.consume(&TokenKind::LBrace, "expected '{' after enum header")?;

        let mut cases = Vec::new();
        let mut methods = Vec::new();
        let mut properties = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            if self.match_kind(&TokenKind::Semicolon) {
                continue;
            }
            if self.match_kind(&TokenKind::Case) {
                loop {
                    cases.push(self.enum_case_declaration()?);
                    if !self.match_kind(&TokenKind::Comma) {
                        break;
                    }
                }
            } else if self.check(&TokenKind::Func) {
                methods.push(self.func_declaration(false, false, false)?);
            } else if self.check(&TokenKind::Var) || self.check(&TokenKind::Let) {
                properties.push(self.property_declaration(false)?);
            } else {
                return Err(self.error_here("expected 'case', method, or property in enum body"));
            }
        }
        self.consume(&TokenKind::RBrace, "expected '}' after enum body")?;
        Ok(EnumDecl {
            name,
            conformances,
            cases,
            methods,
            properties,
            line,
        })
    }

    fn enum_case_declaration(&mut self) -> Result<EnumCaseDecl, ParseError> {
        let line = self.peek().line;
        let name = self.consume_ident("expected case name")?;

        let mut raw_value = None;
        let mut associated = Vec::new();
        if self.match_kind(&TokenKind::LParen) {
            if !self.check(&TokenKind::RParen) {
                loop {
                    // `label: Type` or bare `Type`
                    let checkpoint = self.current;
                    let label = if let Some(name) = self.try_ident() {
                        if self.match_kind(&TokenKind::Colon) {
                            Some(name)
                        } else {
                            self.current = checkpoint;
                            None
                        }
                    } else {
                        None
                    };
                    let ty = self.parse_type_annotation()?;
                    associated.push((label, ty));
                    if !self.match_kind(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.consume(&TokenKind::RParen, "expected ')' after associated values")?;
        } else if self.match_kind(&TokenKind::Equal) {
            raw_value = Some(self.expression()?);
        }

        Ok(EnumCaseDecl {
            name,
            raw_value,
            associated,
            line,
        })
    }

    fn protocol_declaration(&mut self) -> Result<ProtocolDecl, ParseError> {
        let line = self.peek().line;
        self.consume(&TokenKind::Protocol, "expected 'protocol'")?;
        let name = self.consume_ident("expected protocol name")?;
        let inherited = self.parse_inheritance_clause()?;
        self.consume(&TokenKind::LBrace, "expected '{' after protocol header")?;

        let mut methods = Vec::new();
        let mut properties = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            if self.match_kind(&TokenKind::Semicolon) {
                continue;
            }
            let is_mutating = if self.check_ident("mutating") && self.check_next(&TokenKind::Func)
            {
                self.advance();
                true
            } else {
                false
            };
            if self.match_kind(&TokenKind::Func) {
                let method_name = self.consume_ident("expected method name")?;
                let params = self.parse_param_clause(false)?;
                if self.match_kind(&TokenKind::Arrow) {
                    self.parse_type_annotation()?;
                }
                methods.push(ProtocolMethodReq {
                    name: method_name,
                    param_names: params.into_iter().map(|p| p.name).collect(),
                    is_mutating,
                });
            } else if self.match_kind(&TokenKind::Var) {
                let prop_name = self.consume_ident("expected property name")?;
                self.consume(&TokenKind::Colon, "expected ':' in property requirement")?;
                self.parse_type_annotation()?;
                self.consume(&TokenKind::LBrace, "expected '{ get }' requirement")?;
                let mut has_getter = false;
                let mut has_setter = false;
                while !self.check(&TokenKind::RBrace) {
                    if self.match_ident("get") {
                        has_getter = true;
                    } else if self.match_ident("set") {
                        has_setter = true;
                    } else {
                        return Err(self.error_here("expected 'get' or 'set'"));
                    }
                }
                self.consume(&TokenKind::RBrace, "expected '}' after requirement")?;
                properties.push(ProtocolPropertyReq {
                    name: prop_name,
                    has_getter,
                    has_setter,
                });
            } else {
                return Err(self.error_here("expected method or property requirement"));
            }
        }
        self.consume(&TokenKind::RBrace, "expected '}' after protocol body")?;
        Ok(ProtocolDecl {
            name,
            inherited,
            methods,
            properties,
            line,
        })
    }

    fn extension_declaration(&mut self) -> Result<ExtensionDecl, ParseError> {
        let line = self.peek().line;
        self.consume(&TokenKind::Extension, "expected 'extension'")?;
        let type_name = self.consume_ident("expected type name after 'extension'")?;
        self.consume(&TokenKind::LBrace, "expected '{' after extension header")?;
        let mut members = TypeMembers::default();
        self.parse_type_members(&mut members, false)?;
        self.consume(&TokenKind::RBrace, "expected '}' after extension body")?;
        if !members.initializers.is_empty() {
            return Err(self.error_here("initializers are not allowed in extensions"));
        }
        Ok(ExtensionDecl {
            type_name,
            methods: members.methods,
            properties: members.properties,
            line,
        })
    }

    // ---- statements ----

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        if self.check(&TokenKind::If) {
            return self.if_statement();
        }
        if self.check(&TokenKind::Guard) {
            return self.guard_statement();
        }
        if self.check(&TokenKind::While) {
            return self.while_statement();
        }
        if self.check(&TokenKind::Repeat) {
            return self.repeat_statement();
        }
        if self.check(&TokenKind::For) {
            return self.for_statement();
        }
        if self.check(&TokenKind::Switch) {
            return self.switch_statement();
        }
        if self.check(&TokenKind::Break) {
            let line = self.advance().line;
            self.match_kind(&TokenKind::Semicolon);
            return Ok(Stmt::Break { line });
        }
        if self.check(&TokenKind::Continue) {
            let line = self.advance().line;
            self.match_kind(&TokenKind::Semicolon);
            return Ok(Stmt::Continue { line });
        }
        if self.check(&TokenKind::Return) {
            return self.return_statement();
        }
        if self.check(&TokenKind::Throw) {
            let line = self.advance().line;
            let value = self.expression()?;
            self.match_kind(&TokenKind::Semicolon);
            return Ok(Stmt::Throw { value, line });
        }
        if self.check(&TokenKind::LBrace) {
            let line = self.advance().line;
            let statements = self.block_statements()?;
            return Ok(Stmt::Block { statements, line });
        }
        if self.check_ident("print") && self.check_next(&TokenKind::LParen) {
            let line = self.advance().line;
            self.consume(&TokenKind::LParen, "expected '(' after 'print'")?;
            let value = self.expression()?;
            self.consume(&TokenKind::RParen, "expected ')' after print argument")?;
            self.match_kind(&TokenKind::Semicolon);
            return Ok(Stmt::Print { value, line });
        }

        let line = self.peek().line;
        let expr = self.expression()?;
        self.match_kind(&TokenKind::Semicolon);
        Ok(Stmt::Expression { expr, line })
    }

    /// Consumes statements up to and including the closing `}`.
    fn block_statements(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            if self.match_kind(&TokenKind::Semicolon) {
                continue;
            }
            statements.push(self.declaration()?);
        }
        self.consume(&TokenKind::RBrace, "expected '}' after block")?;
        Ok(statements)
    }

    fn braced_block(&mut self) -> Result<Stmt, ParseError> {
        let line = self.peek().line;
        self.consume(&TokenKind::LBrace, "expected '{'")?;
        let statements = self.block_statements()?;
        Ok(Stmt::Block { statements, line })
    }

    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.peek().line;
        self.consume(&TokenKind::If, "expected 'if'")?;

        if self.match_kind(&TokenKind::Let) {
            let name = self.consume_ident("expected binding name after 'if let'")?;
            self.consume(&TokenKind::Equal, "expected '=' in 'if let'")?;
            let value = self.expression()?;
            let then_branch = Box::new(self.braced_block()?);
            let else_branch = if self.match_kind(&TokenKind::Else) {
                Some(Box::new(if self.check(&TokenKind::If) {
                    self.if_statement()?
                } else {
                    self.braced_block()?
                }))
            } else {
                None
            };
            return Ok(Stmt::IfLet {
                name,
                value,
                then_branch,
                else_branch,
                line,
            });
        }

        let condition = self.expression()?;
        let then_branch = Box::new(self.braced_block()?);
        let else_branch = if self.match_kind(&TokenKind::Else) {
            Some(Box::new(if self.check(&TokenKind::If) {
                self.if_statement()?
            } else {
                self.braced_block()?
            }))
        } else {
            None
        };
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
            line,
        })
    }

    fn guard_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.peek().line;
        self.consume(&TokenKind::Guard, "expected 'guard'")?;
        self.consume(&TokenKind::Let, "expected 'let' after 'guard'")?;
        let name = self.consume_ident("expected binding name after 'guard let'")?;
        self.consume(&TokenKind::Equal, "expected '=' in 'guard let'")?;
        let value = self.expression()?;
        self.consume(&TokenKind::Else, "expected 'else' after guard condition")?;
        let else_branch = Box::new(self.braced_block()?);
        Ok(Stmt::GuardLet {
            name,
            value,
            else_branch,
            line,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.peek().line;
        self.consume(&TokenKind::While, "expected 'while'")?;
        let condition = self.expression()?;
        let body = Box::new(self.braced_block()?);
        Ok(Stmt::While {
            condition,
            body,
            line,
        })
    }

    fn repeat_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.peek().line;
        self.consume(&TokenKind::Repeat, "expected 'repeat'")?;
        let body = Box::new(self.braced_block()?);
        self.consume(&TokenKind::While, "expected 'while' after repeat body")?;
        let condition = self.expression()?;
        self.match_kind(&TokenKind::Semicolon);
        Ok(Stmt::RepeatWhile {
            body,
            condition,
            line,
        })
    }

    fn for_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.peek().line;
        self.consume(&TokenKind::For, "expected 'for'")?;
        let variable = self.consume_ident("expected loop variable")?;
        self.consume(&TokenKind::In, "expected 'in' after loop variable")?;
        let iterable = self.expression()?;
        let body = Box::new(self.braced_block()?);
        Ok(Stmt::ForIn {
            variable,
            iterable,
            body,
            line,
        })
    }

    fn return_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.advance().line;
        let value = if self.check(&TokenKind::RBrace)
            || self.check(&TokenKind::Semicolon)
            || self.is_at_end()
        {
            None
        } else {
            Some(self.expression()?)
        };
        self.match_kind(&TokenKind::Semicolon);
        Ok(Stmt::Return { value, line })
    }

    fn switch_statement(&mut self) -> Result<Stmt, ParseError> {
        let line = self.peek().line;
        self.consume(&TokenKind::Switch, "expected 'switch'")?;
        let subject = self.expression()?;
        self.consume(&TokenKind::LBrace, "expected '{' after switch subject")?;

        let mut cases = Vec::new();
        let mut default = None;
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            if self.match_kind(&TokenKind::Case) {
                let case_line = self.previous().line;
                let pattern = self.parse_case_pattern()?;
                self.consume(&TokenKind::Colon, "expected ':' after case pattern")?;
                let body = self.case_body()?;
                cases.push(SwitchCase {
                    pattern,
                    body,
                    line: case_line,
                });
            } else if self.match_kind(&TokenKind::Default) {
                self.consume(&TokenKind::Colon, "expected ':' after 'default'")?;
                default = Some(self.case_body()?);
            } else {
                return Err(self.error_here("expected 'case' or 'default' in switch body"));
            }
        }
        self.consume(&TokenKind::RBrace, "expected '}' after switch body")?;
        Ok(Stmt::Switch {
            subject,
            cases,
            default,
            line,
        })
    }

    fn parse_case_pattern(&mut self) -> Result<CasePattern, ParseError> {
        // `.name` or `Type.name`, optionally with `(let a, let b)`
        if self.check(&TokenKind::Dot) {
            self.advance();
            let case_name = self.consume_ident("expected case name after '.'")?;
            let bindings = self.parse_case_bindings()?;
            return Ok(CasePattern::EnumCase {
                type_name: None,
                case_name,
                bindings,
            });
        }
        if matches!(self.peek().kind, TokenKind::Ident(_)) && self.check_next(&TokenKind::Dot) {
            let type_name = self.consume_ident("expected type name")?;
            self.consume(&TokenKind::Dot, "expected '.'")?;
            let case_name = self.consume_ident("expected case name")?;
            let bindings = self.parse_case_bindings()?;
            return Ok(CasePattern::EnumCase {
                type_name: Some(type_name),
                case_name,
                bindings,
            });
        }
        Ok(CasePattern::Expr(self.expression()?))
    }

    fn parse_case_bindings(&mut self) -> Result<Vec<String>, ParseError> {
        let mut bindings = Vec::new();
        if self.match_kind(&TokenKind::LParen) {
            loop {
                self.consume(&TokenKind::Let, "expected 'let' in case binding")?;
                bindings.push(self.consume_ident("expected binding name")?);
                if !self.match_kind(&TokenKind::Comma) {
                    break;
                }
            }
            self.consume(&TokenKind::RParen, "expected ')' after case bindings")?;
        }
        Ok(bindings)
    }

    fn case_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut body = Vec::new();
        while !self.check(&TokenKind::Case)
            && !self.check(&TokenKind::Default)
            && !self.check(&TokenKind::RBrace)
            && !self.is_at_end()
        {
            if self.match_kind(&TokenKind::Semicolon) {
                continue;
            }
            body.push(self.declaration()?);
        }
        Ok(body)
    }

    // ---- expressions ----

    pub fn expression(&mut self) -> Result<Expr, ParseError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let expr = self.ternary()?;

        let op = if self.check(&TokenKind::Equal) {
            Some(AssignOp::Set)
        } else if self.check(&TokenKind::PlusEqual) {
            Some(AssignOp::Add)
        } else if self.check(&TokenKind::MinusEqual) {
            Some(AssignOp::Sub)
        } else if self.check(&TokenKind::StarEqual) {
            Some(AssignOp::Mul)
        } else if self.check(&TokenKind::SlashEqual) {
            Some(AssignOp::Div)
        } else {
            None
        };

        if let Some(op) = op {
            let line = self.advance().line;
            let value = self.assignment()?;
            if !expr.is_aliasing_read() {
                return Err(ParseError {
                    message: "invalid assignment target".to_string(),
                    line,
                    column: 0,
                });
            }
            return Ok(Expr::Assign {
                target: Box::new(expr),
                op,
                value: Box::new(value),
                line,
            });
        }
        Ok(expr)
    }

    fn ternary(&mut self) -> Result<Expr, ParseError> {
        let condition = self.nil_coalesce()?;
        if self.check(&TokenKind::Question) {
            let line = self.advance().line;
            let then_value = self.expression()?;
            self.consume(&TokenKind::Colon, "expected ':' in ternary expression")?;
            let else_value = self.expression()?;
            return Ok(Expr::Ternary {
                condition: Box::new(condition),
                then_value: Box::new(then_value),
                else_value: Box::new(else_value),
                line,
            });
        }
        Ok(condition)
    }

    fn nil_coalesce(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.logic_or()?;
        while self.check(&TokenKind::QuestionQuestion) {
            let line = self.advance().line;
            let fallback = self.logic_or()?;
            expr = Expr::NilCoalesce {
                value: Box::new(expr),
                fallback: Box::new(fallback),
                line,
            };
        }
        Ok(expr)
    }

    fn logic_or(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.logic_and()?;
        while self.check(&TokenKind::OrOr) {
            let line = self.advance().line;
            let right = self.logic_and()?;
            expr = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(expr),
                right: Box::new(right),
                line,
            };
        }
        Ok(expr)
    }

    fn logic_and(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.equality()?;
        while self.check(&TokenKind::AndAnd) {
            let line = self.advance().line;
            let right = self.equality()?;
            expr = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(expr),
                right: Box::new(right),
                line,
            };
        }
        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.comparison()?;
        loop {
            let op = if self.check(&TokenKind::EqualEqual) {
                BinaryOp::Eq
            } else if self.check(&TokenKind::NotEqual) {
                BinaryOp::Ne
            } else {
                break;
            };
            let line = self.advance().line;
            let right = self.comparison()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
                line,
            };
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.range()?;
        loop {
            let op = if self.check(&TokenKind::Less) {
                BinaryOp::Lt
            } else if self.check(&TokenKind::Greater) {
                BinaryOp::Gt
            } else if self.check(&TokenKind::LessEqual) {
                BinaryOp::Le
            } else if self.check(&TokenKind::GreaterEqual) {
                BinaryOp::Ge
            } else {
                break;
            };
            let line = self.advance().line;
            let right = self.range()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
                line,
            };
        }
        Ok(expr)
    }

    fn range(&mut self) -> Result<Expr, ParseError> {
        let start = self.addition()?;
        let inclusive = if self.check(&TokenKind::DotDot) {
            false
        } else if self.check(&TokenKind::DotDotDot) {
            true
        } else {
            return Ok(start);
        };
        let line = self.advance().line;
        let end = self.addition()?;
        Ok(Expr::Range {
            start: Box::new(start),
            end: Box::new(end),
            inclusive,
            line,
        })
    }

    fn addition(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.multiplication()?;
        loop {
            let op = if self.check(&TokenKind::Plus) {
                BinaryOp::Add
            } else if self.check(&TokenKind::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let line = self.advance().line;
            let right = self.multiplication()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
                line,
            };
        }
        Ok(expr)
    }

    fn multiplication(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.unary()?;
        loop {
            let op = if self.check(&TokenKind::Star) {
                BinaryOp::Mul
            } else if self.check(&TokenKind::Slash) {
                BinaryOp::Div
            } else if self.check(&TokenKind::Percent) {
                BinaryOp::Mod
            } else {
                break;
            };
            let line = self.advance().line;
            let right = self.unary()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
                line,
            };
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = if self.check(&TokenKind::Minus) {
            Some(UnaryOp::Neg)
        } else if self.check(&TokenKind::Bang) {
            Some(UnaryOp::Not)
        } else if self.check(&TokenKind::Tilde) {
            Some(UnaryOp::BitNot)
        } else {
            None
        };
        if let Some(op) = op {
            let line = self.advance().line;
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
                line,
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.check(&TokenKind::LParen) {
                let line = self.advance().line;
                let args = self.parse_call_args()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    line,
                };
            } else if self.check(&TokenKind::Dot) {
                let line = self.advance().line;
                let member = self.consume_member_name()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    member,
                    line,
                };
            } else if self.check(&TokenKind::QuestionDot) {
                let line = self.advance().line;
                let member = self.consume_member_name()?;
                expr = Expr::OptionalChain {
                    object: Box::new(expr),
                    member,
                    line,
                };
            } else if self.check(&TokenKind::Bang) {
                let line = self.advance().line;
                expr = Expr::ForceUnwrap {
                    operand: Box::new(expr),
                    line,
                };
            } else if self.check(&TokenKind::LBracket) {
                let line = self.advance().line;
                let index = self.expression()?;
                self.consume(&TokenKind::RBracket, "expected ']' after subscript index")?;
                expr = Expr::Subscript {
                    object: Box::new(expr),
                    index: Box::new(index),
                    line,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn consume_member_name(&mut self) -> Result<String, ParseError> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            // tuple element access: `.0`, `.1`
            TokenKind::Int(index) => {
                let name = index.to_string();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here("expected member name after '.'")),
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<CallArg>, ParseError> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                // `label: value`
                let checkpoint = self.current;
                let label = if let Some(name) = self.try_ident() {
                    if self.match_kind(&TokenKind::Colon) {
                        Some(name)
                    } else {
                        self.current = checkpoint;
                        None
                    }
                } else {
                    None
                };
                let value = self.expression()?;
                args.push(CallArg { label, value });
                if !self.match_kind(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RParen, "expected ')' after arguments")?;
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let line = self.peek().line;

        if self.match_kind(&TokenKind::Nil) {
            return Ok(Expr::Literal {
                value: LiteralValue::Nil,
                line,
            });
        }
        if self.match_kind(&TokenKind::True) {
            return Ok(Expr::Literal {
                value: LiteralValue::Bool(true),
                line,
            });
        }
        if self.match_kind(&TokenKind::False) {
            return Ok(Expr::Literal {
                value: LiteralValue::Bool(false),
                line,
            });
        }
        if let TokenKind::Int(value) = &self.peek().kind {
            let value = *value;
            self.advance();
            return Ok(Expr::Literal {
                value: LiteralValue::Int(value),
                line,
            });
        }
        if let TokenKind::Float(value) = &self.peek().kind {
            let value = *value;
            self.advance();
            return Ok(Expr::Literal {
                value: LiteralValue::Float(value),
                line,
            });
        }
        if matches!(self.peek().kind, TokenKind::Str(_)) {
            return self.string_literal(line);
        }
        if self.match_kind(&TokenKind::SelfKw) {
            return Ok(Expr::SelfExpr { line });
        }
        if self.match_kind(&TokenKind::Super) {
            self.consume(&TokenKind::Dot, "expected '.' after 'super'")?;
            let member = self.consume_member_name()?;
            return Ok(Expr::Super { member, line });
        }
        if matches!(self.peek().kind, TokenKind::Ident(_)) {
            let name = self.consume_ident("expected identifier")?;
            let type_args = self.try_parse_generic_call_args()?;
            return Ok(Expr::Identifier {
                name,
                type_args,
                line,
            });
        }
        if self.check(&TokenKind::LParen) {
            return self.paren_or_tuple(line);
        }
        if self.check(&TokenKind::LBracket) {
            return self.array_or_dict_literal(line);
        }
        if self.check(&TokenKind::LBrace) {
            return self.closure_literal(line);
        }

        Err(self.error_here("expected an expression"))
    }

    fn string_literal(&mut self, line: u32) -> Result<Expr, ParseError> {
        let TokenKind::Str(segments) = self.advance().kind.clone() else {
            return Err(self.error_here("expected a string literal"));
        };

        let plain = segments.len() == 1
            && matches!(segments.first(), Some(StringSegment::Text(_)));
        if plain {
            let StringSegment::Text(text) = segments.into_iter().next().unwrap() else {
                unreachable!()
            };
            return Ok(Expr::Literal {
                value: LiteralValue::Str(text),
                line,
            });
        }

        let mut parts = Vec::new();
        for segment in segments {
            match segment {
                StringSegment::Text(text) => parts.push(InterpolatedPart::Text(text)),
                StringSegment::Expr(raw) => {
                    let mut sub = Parser::from_source(&raw)?;
                    let expr = sub.expression()?;
                    if !sub.is_at_end() {
                        return Err(ParseError {
                            message: "unexpected tokens in interpolation".to_string(),
                            line,
                            column: 0,
                        });
                    }
                    parts.push(InterpolatedPart::Expr(Box::new(expr)));
                }
            }
        }
        Ok(Expr::Interpolated { parts, line })
    }

    /// `(expr)` grouping, `(a, b)` tuple, `(x: 1, y: 2)` labeled tuple.
    fn paren_or_tuple(&mut self, line: u32) -> Result<Expr, ParseError> {
        self.consume(&TokenKind::LParen, "expected '('")?;
        let mut elements: Vec<(Option<String>, Expr)> = Vec::new();
        if self.check(&TokenKind::RParen) {
            return Err(self.error_here("expected an expression inside '()'"));
        }
        loop {
            let checkpoint = self.current;
            let label = if let Some(name) = self.try_ident() {
                if self.match_kind(&TokenKind::Colon) {
                    Some(name)
                } else {
                    self.current = checkpoint;
                    None
                }
            } else {
                None
            };
            let value = self.expression()?;
            elements.push((label, value));
            if !self.match_kind(&TokenKind::Comma) {
                break;
            }
        }
        self.consume(&TokenKind::RParen, "expected ')'")?;

        if elements.len() == 1 && elements[0].0.is_none() {
            return Ok(elements.into_iter().next().unwrap().1);
        }
        Ok(Expr::TupleLiteral { elements, line })
    }

    fn array_or_dict_literal(&mut self, line: u32) -> Result<Expr, ParseError> {
        self.consume(&TokenKind::LBracket, "expected '['")?;
        if self.match_kind(&TokenKind::RBracket) {
            return Ok(Expr::ArrayLiteral {
                elements: Vec::new(),
                line,
            });
        }
        // `[:]` is the empty dictionary
        if self.match_kind(&TokenKind::Colon) {
            self.consume(&TokenKind::RBracket, "expected ']' after ':'")?;
            return Ok(Expr::DictLiteral {
                entries: Vec::new(),
                line,
            });
        }

        let first = self.expression()?;
        if self.match_kind(&TokenKind::Colon) {
            let mut entries = Vec::new();
            let value = self.expression()?;
            entries.push((first, value));
            while self.match_kind(&TokenKind::Comma) {
                let key = self.expression()?;
                self.consume(&TokenKind::Colon, "expected ':' in dictionary literal")?;
                let value = self.expression()?;
                entries.push((key, value));
            }
            self.consume(&TokenKind::RBracket, "expected ']' after dictionary literal")?;
            return Ok(Expr::DictLiteral { entries, line });
        }

        let mut elements = vec![first];
        while self.match_kind(&TokenKind::Comma) {
            elements.push(self.expression()?);
        }
        self.consume(&TokenKind::RBracket, "expected ']' after array literal")?;
        Ok(Expr::ArrayLiteral { elements, line })
    }

    /// `{ (a: Int) -> Int in ... }`, `{ a, b in ... }`, or `{ ... }`.
    fn closure_literal(&mut self, line: u32) -> Result<Expr, ParseError> {
        self.consume(&TokenKind::LBrace, "expected '{'")?;

        let mut params = Vec::new();
        let checkpoint = self.current;
        let mut have_params = false;

        if self.check(&TokenKind::LParen) {
            if let Ok(parsed) = self.parse_param_clause(false) {
                if self.match_kind(&TokenKind::Arrow) {
                    if self.parse_type_annotation().is_err() {
                        self.current = checkpoint;
                    } else if self.match_kind(&TokenKind::In) {
                        params = parsed;
                        have_params = true;
                    } else {
                        self.current = checkpoint;
                    }
                } else if self.match_kind(&TokenKind::In) {
                    params = parsed;
                    have_params = true;
                } else {
                    self.current = checkpoint;
                }
            } else {
                self.current = checkpoint;
            }
        } else if matches!(self.peek().kind, TokenKind::Ident(_)) {
            // bare parameter list: `a, b in`
            let mut names = Vec::new();
            let mut ok = true;
            loop {
                match self.try_ident() {
                    Some(name) => names.push(name),
                    None => {
                        ok = false;
                        break;
                    }
                }
                if !self.match_kind(&TokenKind::Comma) {
                    break;
                }
            }
            if ok && self.match_kind(&TokenKind::In) {
                params = names
                    .into_iter()
                    .map(|name| ParamDecl {
                        label: Some(String::new()),
                        name,
                        ty: None,
                        default: None,
                    })
                    .collect();
                have_params = true;
            } else {
                self.current = checkpoint;
            }
        }

        if !have_params {
            self.current = checkpoint;
        }

        let body = self.block_statements()?;
        Ok(Expr::Closure { params, body, line })
    }

    /// Lookahead for `name<Type, ...>(` generic calls; rolls back when the
    /// angle bracket turns out to be a comparison.
    fn try_parse_generic_call_args(&mut self) -> Result<Vec<TypeAnnotation>, ParseError> {
        if !self.check(&TokenKind::Less) {
            return Ok(Vec::new());
        }
        let checkpoint = self.current;
        self.advance();
        let mut args = Vec::new();
        loop {
            match self.parse_type_annotation() {
                Ok(ty) => args.push(ty),
                Err(_) => {
                    self.current = checkpoint;
                    return Ok(Vec::new());
                }
            }
            if !self.match_kind(&TokenKind::Comma) {
                break;
            }
        }
        if self.match_kind(&TokenKind::Greater) && self.check(&TokenKind::LParen) {
            return Ok(args);
        }
        self.current = checkpoint;
        Ok(Vec::new())
    }

    // ---- type annotations ----

    pub fn parse_type_annotation(&mut self) -> Result<TypeAnnotation, ParseError> {
        let mut ty = self.parse_base_type()?;
        if self.match_kind(&TokenKind::Question) {
            ty.is_optional = true;
        }
        Ok(ty)
    }

    fn parse_base_type(&mut self) -> Result<TypeAnnotation, ParseError> {
        // `[Int]` array / `[String: Int]` dictionary sugar
        if self.match_kind(&TokenKind::LBracket) {
            let first = self.parse_type_annotation()?;
            if self.match_kind(&TokenKind::Colon) {
                let value = self.parse_type_annotation()?;
                self.consume(&TokenKind::RBracket, "expected ']' in dictionary type")?;
                return Ok(TypeAnnotation {
                    name: "Dictionary".to_string(),
                    type_args: vec![first, value],
                    is_optional: false,
                });
            }
            self.consume(&TokenKind::RBracket, "expected ']' in array type")?;
            return Ok(TypeAnnotation {
                name: "Array".to_string(),
                type_args: vec![first],
                is_optional: false,
            });
        }

        // `() -> T`, `(A, B) -> T` function types; bare `(A, B)` tuples
        if self.match_kind(&TokenKind::LParen) {
            let mut parts = Vec::new();
            if !self.check(&TokenKind::RParen) {
                loop {
                    parts.push(self.parse_type_annotation()?);
                    if !self.match_kind(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.consume(&TokenKind::RParen, "expected ')' in type")?;
            if self.match_kind(&TokenKind::Arrow) {
                let ret = self.parse_type_annotation()?;
                parts.push(ret);
                return Ok(TypeAnnotation {
                    name: "Function".to_string(),
                    type_args: parts,
                    is_optional: false,
                });
            }
            return Ok(TypeAnnotation {
                name: "Tuple".to_string(),
                type_args: parts,
                is_optional: false,
            });
        }

        let name = self.consume_ident("expected a type name")?;
        let mut type_args = Vec::new();
        if self.match_kind(&TokenKind::Less) {
            loop {
                type_args.push(self.parse_type_annotation()?);
                if !self.match_kind(&TokenKind::Comma) {
                    break;
                }
            }
            self.consume(&TokenKind::Greater, "expected '>' after type arguments")?;
        }

        let mut ty = TypeAnnotation {
            name,
            type_args,
            is_optional: false,
        };
        // trailing `-> T` turns a bare type into a function type
        if self.check(&TokenKind::Arrow) {
            self.advance();
            let ret = self.parse_type_annotation()?;
            ty = TypeAnnotation {
                name: "Function".to_string(),
                type_args: vec![ty, ret],
                is_optional: false,
            };
        }
        Ok(ty)
    }

    // ---- token utilities ----

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn check_next(&self, kind: &TokenKind) -> bool {
        self.tokens
            .get(self.current + 1)
            .is_some_and(|t| &t.kind == kind)
    }

    fn check_ident(&self, name: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(n) if n == name)
    }

    fn match_ident(&mut self, name: &str) -> bool {
        if self.check_ident(name) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn match_kind(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: &TokenKind, message: &str) -> Result<&Token, ParseError> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        Err(self.error_here(message))
    }

    fn consume_ident(&mut self, message: &str) -> Result<String, ParseError> {
        if let TokenKind::Ident(name) = &self.peek().kind {
            let name = name.clone();
            self.advance();
            return Ok(name);
        }
        Err(self.error_here(message))
    }

    fn try_ident(&mut self) -> Option<String> {
        if let TokenKind::Ident(name) = &self.peek().kind {
            let name = name.clone();
            self.advance();
            return Some(name);
        }
        None
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let token = self.peek();
        ParseError {
            message: message.into(),
            line: token.line,
            column: token.column,
        }
    }
}

#[derive(Default)]
struct TypeMembers {
    properties: Vec<VarDecl>,
    methods: Vec<FuncDecl>,
    initializers: Vec<FuncDecl>,
    deinitializer: Option<FuncDecl>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Vec<Stmt> {
        Parser::from_source(source).unwrap().parse().unwrap()
    }

    fn parse_err(source: &str) -> ParseError {
        match Parser::from_source(source) {
            Ok(mut p) => p.parse().unwrap_err(),
            Err(e) => e,
        }
    }

    #[test]
    fn parses_var_declaration_with_type() {
        let stmts = parse("var x: Int = 1");
        let Stmt::VarDecl(decl) = &stmts[0] else {
            panic!("expected var decl");
        };
        assert_eq!(decl.name, "x");
        assert!(!decl.is_let);
        assert_eq!(decl.ty.as_ref().unwrap().name, "Int");
    }

    #[test]
    fn parses_weak_and_optional_annotation() {
        let stmts = parse("weak var w: C? = a");
        let Stmt::VarDecl(decl) = &stmts[0] else {
            panic!("expected var decl");
        };
        assert_eq!(decl.discipline, DeclRef::Weak);
        assert!(decl.ty.as_ref().unwrap().is_optional);
    }

    #[test]
    fn parses_operator_precedence() {
        let stmts = parse("let v = 1 + 2 * 3");
        let Stmt::VarDecl(decl) = &stmts[0] else {
            panic!("expected var decl");
        };
        let Some(Expr::Binary { op: BinaryOp::Add, right, .. }) = &decl.initializer else {
            panic!("expected + at the top");
        };
        assert!(matches!(**right, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn parses_function_with_labels_and_defaults() {
        let stmts = parse("func greet(to name: String, times: Int = 1) -> Int { return times }");
        let Stmt::FuncDecl(decl) = &stmts[0] else {
            panic!("expected func decl");
        };
        assert_eq!(decl.params[0].label.as_deref(), Some("to"));
        assert_eq!(decl.params[0].name, "name");
        assert!(decl.params[1].label.is_none());
        assert!(decl.params[1].default.is_some());
    }

    #[test]
    fn parses_if_let_and_guard_let() {
        let stmts = parse("if let x = maybe { print(x) } else { print(0) }");
        assert!(matches!(stmts[0], Stmt::IfLet { .. }));

        let stmts = parse("func f(v: Int?) { guard let x = v else { return } print(x) }");
        let Stmt::FuncDecl(decl) = &stmts[0] else {
            panic!("expected func decl");
        };
        assert!(matches!(decl.body[0], Stmt::GuardLet { .. }));
    }

    #[test]
    fn parses_class_with_members() {
        let stmts = parse(
            r#"
            class Counter {
                var value: Int = 0 {
                    willSet { print(newValue) }
                    didSet { print(oldValue) }
                }
                let name: String = "c"
                init(value: Int) { self.value = value }
                func bump() { self.value = self.value + 1 }
                static func zero() -> Int { return 0 }
                deinit { print("bye") }
            }
            "#,
        );
        let Stmt::ClassDecl(decl) = &stmts[0] else {
            panic!("expected class decl");
        };
        assert_eq!(decl.properties.len(), 2);
        assert!(decl.properties[0].observers.is_some());
        assert_eq!(decl.initializers.len(), 1);
        assert_eq!(decl.methods.len(), 2);
        assert!(decl.methods[1].is_static);
        assert!(decl.deinitializer.is_some());
    }

    #[test]
    fn parses_computed_property_forms() {
        let stmts = parse(
            r#"
            struct Rect {
                var w: Int = 0
                var h: Int = 0
                var area: Int { return self.w * self.h }
                var half: Int {
                    get { return self.w / 2 }
                    set { self.w = newValue * 2 }
                }
            }
            "#,
        );
        let Stmt::StructDecl(decl) = &stmts[0] else {
            panic!("expected struct decl");
        };
        let area = &decl.properties[2];
        assert!(area.accessors.is_some());
        assert!(area.accessors.as_ref().unwrap().setter.is_none());
        let half = &decl.properties[3];
        assert!(half.accessors.as_ref().unwrap().setter.is_some());
    }

    #[test]
    fn parses_enum_with_raw_and_associated_values() {
        let stmts = parse(
            r#"
            enum Response {
                case success(message: String)
                case failure(code: Int)
                case unknown
            }
            "#,
        );
        let Stmt::EnumDecl(decl) = &stmts[0] else {
            panic!("expected enum decl");
        };
        assert_eq!(decl.cases.len(), 3);
        assert_eq!(decl.cases[0].associated[0].0.as_deref(), Some("message"));

        let stmts = parse("enum Priority { case low = 1 case high = 3 }");
        let Stmt::EnumDecl(decl) = &stmts[0] else {
            panic!("expected enum decl");
        };
        assert!(decl.cases[0].raw_value.is_some());
    }

    #[test]
    fn parses_switch_with_enum_patterns() {
        let stmts = parse(
            r#"
            switch result {
            case Response.success(let msg):
                print(msg)
            case .failure(let code):
                print(code)
            default:
                print("other")
            }
            "#,
        );
        let Stmt::Switch { cases, default, .. } = &stmts[0] else {
            panic!("expected switch");
        };
        assert_eq!(cases.len(), 2);
        assert!(default.is_some());
        let CasePattern::EnumCase {
            type_name,
            case_name,
            bindings,
        } = &cases[0].pattern
        else {
            panic!("expected enum pattern");
        };
        assert_eq!(type_name.as_deref(), Some("Response"));
        assert_eq!(case_name, "success");
        assert_eq!(bindings, &["msg".to_string()]);
    }

    #[test]
    fn parses_closure_literals() {
        let stmts = parse("var add = { (a: Int, b: Int) -> Int in return a + b }");
        let Stmt::VarDecl(decl) = &stmts[0] else {
            panic!("expected var decl");
        };
        let Some(Expr::Closure { params, .. }) = &decl.initializer else {
            panic!("expected closure");
        };
        assert_eq!(params.len(), 2);

        // no parameters: the brace body is plain statements
        let stmts = parse("var f = { return 1 }");
        let Stmt::VarDecl(decl) = &stmts[0] else {
            panic!("expected var decl");
        };
        let Some(Expr::Closure { params, body, .. }) = &decl.initializer else {
            panic!("expected closure");
        };
        assert!(params.is_empty());
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn parses_interpolated_strings() {
        let stmts = parse(r#"print("x = \(x + 1)")"#);
        let Stmt::Print { value, .. } = &stmts[0] else {
            panic!("expected print");
        };
        let Expr::Interpolated { parts, .. } = value else {
            panic!("expected interpolation");
        };
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn parses_ranges_and_for_in() {
        let stmts = parse("for i in 0..10 { print(i) }");
        let Stmt::ForIn { iterable, .. } = &stmts[0] else {
            panic!("expected for-in");
        };
        assert!(matches!(
            iterable,
            Expr::Range {
                inclusive: false,
                ..
            }
        ));
    }

    #[test]
    fn parses_generic_declarations_and_calls() {
        let stmts = parse("struct Box<T> { var value: T }");
        let Stmt::StructDecl(decl) = &stmts[0] else {
            panic!("expected struct");
        };
        assert_eq!(decl.generic_params, vec!["T".to_string()]);

        let stmts = parse("let b = Box<Int>(5)");
        let Stmt::VarDecl(decl) = &stmts[0] else {
            panic!("expected var decl");
        };
        let Some(Expr::Call { callee, .. }) = &decl.initializer else {
            panic!("expected call");
        };
        let Expr::Identifier { type_args, .. } = &**callee else {
            panic!("expected identifier callee");
        };
        assert_eq!(type_args.len(), 1);
        assert_eq!(type_args[0].name, "Int");

        // a < b comparison must not be mistaken for type arguments
        let stmts = parse("let c = a < b");
        let Stmt::VarDecl(decl) = &stmts[0] else {
            panic!("expected var decl");
        };
        assert!(matches!(
            decl.initializer,
            Some(Expr::Binary {
                op: BinaryOp::Lt,
                ..
            })
        ));
    }

    #[test]
    fn parses_tuples_and_member_access() {
        let stmts = parse("let p = (x: 1, y: 2)\nprint(p.x)\nprint(p.0)");
        assert!(matches!(&stmts[0], Stmt::VarDecl(d)
            if matches!(d.initializer, Some(Expr::TupleLiteral { .. }))));
        let Stmt::Print { value, .. } = &stmts[2] else {
            panic!("expected print");
        };
        let Expr::Member { member, .. } = value else {
            panic!("expected member access");
        };
        assert_eq!(member, "0");
    }

    #[test]
    fn parses_tuple_destructuring() {
        let stmts = parse("let (a, b) = pair");
        assert!(matches!(&stmts[0], Stmt::TupleDestructuring { names, .. }
            if names == &["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn parse_error_carries_position() {
        let err = parse_err("var = 3");
        assert_eq!(err.line, 1);
        assert!(err.message.contains("expected variable name"));
    }

    #[test]
    fn rejects_invalid_assignment_target() {
        let err = parse_err("1 + 2 = 3");
        assert!(err.message.contains("invalid assignment target"));
    }
}
