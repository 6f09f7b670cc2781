//! Tern middle-end CLI

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tern_ast::{LoadError, Program};
use tern_error::{CompileError, Diagnostic, DiagnosticRenderer, ErrorCode};
use tern_ir::{lower, LowerOptions, Module};
use tracing::{debug, Level};

/// Exit status for a failed compilation
const EXIT_COMPILE: i32 = 1;
/// Exit status for input that could not be read or decoded
const EXIT_INPUT: i32 = 2;

#[derive(Parser)]
#[command(name = "tern")]
#[command(version = "0.1.0")]
#[command(about = "Tern IR builder and liveness analysis", long_about = None)]
struct Cli {
    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lowers a resolved program and prints its IR
    Ir {
        /// Resolved AST (JSON)
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Function the program starts at
        #[arg(long, default_value = "main")]
        entry: String,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Lowers a resolved program and prints liveness of each function
    Liveness {
        /// Resolved AST (JSON)
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Function the program starts at
        #[arg(long, default_value = "main")]
        entry: String,

        /// Only this IR function (e.g. `main`, `Point.move`)
        #[arg(long, value_name = "NAME")]
        function: Option<String>,
    },

    /// Validates a resolved program without lowering it
    Check {
        /// Resolved AST (JSON)
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Ir {
            input,
            entry,
            output,
        } => {
            let module = build(&input, entry);
            let text = module.to_string();
            match output {
                Some(path) => {
                    if let Err(e) = fs::write(&path, text) {
                        eprintln!("Error writing {}: {}", path.display(), e);
                        process::exit(EXIT_INPUT);
                    }
                    println!("IR written to: {}", path.display());
                }
                None => print!("{}", text),
            }
        }

        Commands::Liveness {
            input,
            entry,
            function,
        } => {
            let module = build(&input, entry);
            let name = input.display().to_string();
            let mut shown = 0;

            for func in &module.functions {
                if function.as_deref().is_some_and(|f| f != func.name) {
                    continue;
                }
                match tern_liveness::analyze_function(func) {
                    Ok((_, liveness)) => {
                        println!("@{}:", func.name);
                        print!("{}", liveness);
                        println!();
                        shown += 1;
                    }
                    Err(e) => fail(&name, &e),
                }
            }

            if let (Some(f), 0) = (function, shown) {
                eprintln!("Function `{}` is not in the lowered module", f);
                process::exit(EXIT_COMPILE);
            }
        }

        Commands::Check { input } => {
            println!("Checking: {}\n", input.display());
            let program = load(&input);
            validate(&input, &program);
            println!("No errors found!");
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Loads, validates and lowers `input`, exiting on any failure
fn build(input: &Path, entry: String) -> Module {
    let program = load(input);
    validate(input, &program);

    match lower(&program, &LowerOptions { entry }) {
        Ok(module) => {
            debug!(
                functions = module.functions.len(),
                globals = module.globals.len(),
                "lowered {}",
                input.display()
            );
            module
        }
        Err(e) => fail(&input.display().to_string(), &e),
    }
}

fn load(input: &Path) -> Program {
    match Program::load(input) {
        Ok(program) => program,
        Err(e) => {
            let code = match &e {
                LoadError::Io { .. } => ErrorCode::UNREADABLE_INPUT,
                LoadError::Json(_) => ErrorCode::MALFORMED_INPUT,
            };
            let name = input.display().to_string();
            let diag = Diagnostic::error(e.to_string()).with_code(code);
            eprintln!("{}", DiagnosticRenderer::new(&name).render(&diag));
            process::exit(EXIT_INPUT);
        }
    }
}

fn validate(input: &Path, program: &Program) {
    let diagnostics = tern_semantic::check(program);
    if diagnostics.is_empty() {
        return;
    }

    let name = input.display().to_string();
    let renderer = DiagnosticRenderer::new(&name);
    eprintln!("{}", diagnostics.render(&renderer));
    if diagnostics.has_errors() {
        process::exit(EXIT_COMPILE);
    }
}

fn fail(name: &str, error: &CompileError) -> ! {
    eprintln!("{}", DiagnosticRenderer::new(name).render(&error.to_diagnostic()));
    process::exit(EXIT_COMPILE);
}
