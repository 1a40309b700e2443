//! SwiftScript unified CLI
//!
//! `build` compiles a project to an `.ssasm` assembly, `run` executes a
//! compiled assembly, `exec` chains the two. Exit codes: 0 on success,
//! 1 on build failure, 2 on runtime failure.

use clap::{Parser as ClapParser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use swive_core::chunk::Assembly;
use swive_runtime::{Vm, VmConfig};

#[derive(ClapParser)]
#[command(name = "swive")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "SwiftScript unified CLI - build and run .ssproject programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "PascalCase")]
enum BuildConfig {
    Debug,
    Release,
}

impl BuildConfig {
    fn dir_name(self) -> &'static str {
        match self {
            BuildConfig::Debug => "Debug",
            BuildConfig::Release => "Release",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a project to an .ssasm assembly
    Build {
        /// Input .ssproject file
        project: PathBuf,

        /// Build configuration
        #[arg(short, long, value_enum, default_value_t = BuildConfig::Debug)]
        config: BuildConfig,

        /// Output file path (defaults to bin/<config>/<name>.ssasm)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Execute a compiled .ssasm assembly
    Run {
        /// Input .ssasm file
        assembly: PathBuf,

        /// Print VM statistics after execution
        #[arg(long)]
        stats: bool,
    },

    /// Compile and run in one step
    Exec {
        /// Input .ssproject file
        project: PathBuf,

        /// Build configuration
        #[arg(short, long, value_enum, default_value_t = BuildConfig::Debug)]
        config: BuildConfig,

        /// Print VM statistics after execution
        #[arg(long)]
        stats: bool,
    },

    /// Show version information
    Version,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Build {
            project,
            config,
            output,
        } => run_build(&project, config, output),
        Commands::Run { assembly, stats } => run_assembly(&assembly, stats),
        Commands::Exec {
            project,
            config,
            stats,
        } => {
            let output = match run_build_to(&project, config, None) {
                Ok(path) => path,
                Err(code) => process::exit(code),
            };
            run_assembly(&output, stats)
        }
        Commands::Version => {
            println!("swive version {}", env!("CARGO_PKG_VERSION"));
            println!("SwiftScript unified CLI");
            0
        }
    };
    process::exit(code);
}

fn run_build(project: &Path, config: BuildConfig, output: Option<PathBuf>) -> i32 {
    match run_build_to(project, config, output) {
        Ok(_) => 0,
        Err(code) => code,
    }
}

/// Builds the project and returns the output path for chaining into `run`.
fn run_build_to(
    project_path: &Path,
    config: BuildConfig,
    output: Option<PathBuf>,
) -> Result<PathBuf, i32> {
    let (project, assembly) = match swivec::compile_project(project_path) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error: {e}");
            return Err(1);
        }
    };

    let output = output.unwrap_or_else(|| {
        project
            .project_dir
            .join("bin")
            .join(config.dir_name())
            .join(format!("{}.ssasm", project.name()))
    });
    if let Some(parent) = output.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Error: cannot create {}: {e}", parent.display());
            return Err(1);
        }
    }

    let mut bytes = Vec::new();
    if let Err(e) = assembly.serialize(&mut bytes) {
        eprintln!("Serialization error: {e}");
        return Err(1);
    }
    if let Err(e) = fs::write(&output, &bytes) {
        eprintln!("Error: cannot write {}: {e}", output.display());
        return Err(1);
    }

    println!(
        "Build ({}) complete: {}",
        config.dir_name(),
        output.display()
    );
    Ok(output)
}

fn run_assembly(path: &Path, stats: bool) -> i32 {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error: cannot open {}: {e}", path.display());
            return 2;
        }
    };
    let assembly = match Assembly::deserialize(&bytes) {
        Ok(assembly) => assembly,
        Err(e) => {
            eprintln!("Error: {e}");
            return 2;
        }
    };

    let mut vm = Vm::new(VmConfig::default());
    match vm.execute(assembly) {
        Ok(result) => {
            println!("Result: {}", vm.display_value(&result));
            if stats {
                println!("{}", vm.stats());
            }
            0
        }
        Err(e) => {
            eprintln!("Runtime error: {e}");
            2
        }
    }
}
