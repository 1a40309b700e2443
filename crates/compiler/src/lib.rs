//! SwiftScript compiler library.
//!
//! Source text flows lexer → parser → single-pass lowering into a
//! [`swive_core::Assembly`], which the `swive-runtime` VM executes or the
//! CLI serializes to an `.ssasm` artifact:
//!
//! - `lexer` / `parser` / `ast`: the front end
//! - `codegen`: scope resolution, upvalue capture, type lowering, generic
//!   specialization, entry-point binding
//! - `resolver`: import resolution against project roots
//! - `project`: `.ssproject` manifests
//! - `runner`: compile/execute one-shots for embedding and tests

pub mod ast;
pub mod codegen;
pub mod lexer;
pub mod parser;
pub mod project;
pub mod resolver;
pub mod runner;

pub use codegen::Compiler;
pub use codegen::error::{CompileError, ParseError};
pub use lexer::Lexer;
pub use parser::Parser;
pub use project::Project;
pub use resolver::{ModuleResolver, ProjectResolver};
pub use runner::{
    BuildError, SwiveError, compile_project, compile_source, compile_source_with_resolver,
    interpret,
};
