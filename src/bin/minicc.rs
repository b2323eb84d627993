//! `minicc` -- the MiniC compiler driver.
//!
//! Takes a MiniC source file and emits ARM32 assembly (or, for
//! debugging, the linear IR's textual form). Run with `--help` for
//! usage.

use clap::Parser;
use minic::back::{assign_frames, emit_asm, print_ir, select_module};
use minic::front::{lower, parse};
use std::io::Write as _;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(version, about = "Compile MiniC to ARM32 assembly", long_about = None)]
struct Args {
    /// The MiniC source file.
    file: String,

    /// Emit assembly text (the default output).
    #[arg(short = 'S', default_value_t = true)]
    assembly: bool,

    /// Target the ARM32 back end. The only back end this compiler has,
    /// but kept explicit per the external interface contract.
    #[arg(short = 'A', default_value_t = true)]
    arm32: bool,

    /// Print the linear IR's textual form instead of assembly.
    #[arg(short = 'i', long = "emit-ir", conflicts_with = "assembly")]
    emit_ir: bool,

    /// Write output to this path instead of stdout.
    #[arg(short = 'o', long)]
    output: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if !args.arm32 {
        eprintln!("error: minicc only implements the ARM32 back end");
        return ExitCode::FAILURE;
    }

    let source = match std::fs::read_to_string(&args.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: could not read '{}': {e}", args.file);
            return ExitCode::FAILURE;
        }
    };

    let ast = match parse(&source) {
        Ok(ast) => ast,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (mut module, diags) = lower(&ast);
    for w in &diags.warnings {
        eprintln!("warning: {w}");
    }
    for e in &diags.errors {
        eprintln!("error: {e}");
    }
    if diags.has_errors() {
        return ExitCode::FAILURE;
    }

    let output = if args.emit_ir {
        print_ir(&module)
    } else {
        assign_frames(&mut module);
        let functions = select_module(&module);
        emit_asm(&module, &functions)
    };

    match args.output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, output) {
                eprintln!("error: could not write '{path}': {e}");
                return ExitCode::FAILURE;
            }
        }
        None => {
            let _ = std::io::stdout().write_all(output.as_bytes());
        }
    }

    ExitCode::SUCCESS
}
