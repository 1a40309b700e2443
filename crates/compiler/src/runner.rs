//! One-shot compile and execute helpers.

use crate::codegen::Compiler;
use crate::codegen::error::{CompileError, ParseError};
use crate::parser::Parser;
use crate::project::Project;
use crate::resolver::{ModuleResolver, ProjectResolver};
use std::fmt;
use std::path::Path;
use swive_core::chunk::Assembly;
use swive_core::error::AssemblyError;
use swive_runtime::{RuntimeError, Value, Vm};

/// Anything that can fail between source text and a finished assembly.
#[derive(Debug)]
pub enum BuildError {
    Parse(ParseError),
    Compile(CompileError),
    Assembly(AssemblyError),
    Project(String),
    Io(String),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Parse(e) => write!(f, "parse error: {e}"),
            BuildError::Compile(e) => write!(f, "compile error: {e}"),
            BuildError::Assembly(e) => write!(f, "assembly error: {e}"),
            BuildError::Project(e) => write!(f, "project error: {e}"),
            BuildError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for BuildError {}

impl From<ParseError> for BuildError {
    fn from(e: ParseError) -> BuildError {
        BuildError::Parse(e)
    }
}

impl From<CompileError> for BuildError {
    fn from(e: CompileError) -> BuildError {
        BuildError::Compile(e)
    }
}

impl From<AssemblyError> for BuildError {
    fn from(e: AssemblyError) -> BuildError {
        BuildError::Assembly(e)
    }
}

/// A build or runtime failure, for callers driving both phases.
#[derive(Debug)]
pub enum SwiveError {
    Build(BuildError),
    Runtime(RuntimeError),
}

impl fmt::Display for SwiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwiveError::Build(e) => write!(f, "{e}"),
            SwiveError::Runtime(e) => write!(f, "runtime error: {e}"),
        }
    }
}

impl std::error::Error for SwiveError {}

impl From<BuildError> for SwiveError {
    fn from(e: BuildError) -> SwiveError {
        SwiveError::Build(e)
    }
}

impl From<RuntimeError> for SwiveError {
    fn from(e: RuntimeError) -> SwiveError {
        SwiveError::Runtime(e)
    }
}

/// Compiles a source buffer without module resolution.
pub fn compile_source(source: &str) -> Result<Assembly, BuildError> {
    let program = Parser::from_source(source)?.parse()?;
    let mut compiler = Compiler::new();
    Ok(compiler.compile(&program)?)
}

/// Compiles a source buffer with a resolver for its imports.
pub fn compile_source_with_resolver(
    source: &str,
    resolver: Box<dyn ModuleResolver>,
) -> Result<Assembly, BuildError> {
    let program = Parser::from_source(source)?.parse()?;
    let mut compiler = Compiler::new();
    compiler.set_module_resolver(resolver);
    Ok(compiler.compile(&program)?)
}

/// Loads a project file, reads its entry source and compiles it against
/// the project's import roots.
pub fn compile_project(path: &Path) -> Result<(Project, Assembly), BuildError> {
    let project = Project::load(path).map_err(BuildError::Project)?;
    let source = std::fs::read_to_string(&project.entry_file).map_err(|e| {
        BuildError::Io(format!(
            "cannot open entry {}: {e}",
            project.entry_file.display()
        ))
    })?;
    let resolver = ProjectResolver::new(project.import_roots.clone());
    let assembly = compile_source_with_resolver(&source, Box::new(resolver))?;
    Ok((project, assembly))
}

/// Compiles and executes source text in one step.
pub fn interpret(vm: &mut Vm, source: &str) -> Result<Value, SwiveError> {
    let assembly = compile_source(source)?;
    Ok(vm.execute(assembly)?)
}
