//! CLI driver: loads a program in either surface grammar, runs it with the
//! selected execution strategy, and prints the result.
//!
//! run with `--help` for more info.

use clap::{Parser, ValueEnum};

use tinyjit::{compile_program, parse_flat, parse_program, Program, VirtualMachine};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the source file
    file: String,
    /// the surface grammar the source file is written in
    #[arg(value_enum, short, long, default_value_t = Grammar::Func)]
    grammar: Grammar,
    /// how to run the parsed program
    #[arg(value_enum, short, long, default_value_t = Strategy::Auto)]
    strategy: Strategy,
    /// print each VM instruction as it executes (VM runs only)
    #[arg(short, long, default_value_t = false)]
    trace: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Grammar {
    /// one `Main` function, no headers, no braces
    Flat,
    /// `returnType name(params) { ... }` blocks
    Func,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Strategy {
    /// always interpret
    Vm,
    /// always try native codegen; fail loudly if it declines
    Jit,
    /// try native codegen, fall back to the VM if it declines
    Auto,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let program = match args.grammar {
        Grammar::Flat => parse_flat(&args.file),
        Grammar::Func => parse_program(&args.file),
    };

    let program = match program {
        Ok(p) => p,
        Err(e) => {
            eprintln!("parse error: {e}");
            std::process::exit(1);
        }
    };

    let result = match args.strategy {
        Strategy::Vm => run_vm(&program, args.trace),
        Strategy::Jit => run_jit_only(&program),
        Strategy::Auto => run_auto(&program, args.trace),
    };

    match result {
        Ok(value) => println!("{value}"),
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(1);
        }
    }
}

fn run_vm(program: &Program, trace: bool) -> Result<i64, String> {
    VirtualMachine::new()
        .with_trace(trace)
        .execute_program(program)
        .map_err(|e| format!("VM error: {e}"))
}

fn run_jit_only(program: &Program) -> Result<i64, String> {
    match compile_program(program) {
        Ok(Some(compiled)) => Ok(compiled.invoke()),
        Ok(None) => Err("jit declined to compile this program; rerun with --strategy vm or auto".to_string()),
        Err(e) => Err(format!("program error: {e}")),
    }
}

fn run_auto(program: &Program, trace: bool) -> Result<i64, String> {
    match compile_program(program) {
        Ok(Some(compiled)) => Ok(compiled.invoke()),
        Ok(None) => {
            log::debug!("jit declined, falling back to the VM");
            run_vm(program, trace)
        }
        Err(e) => Err(format!("program error: {e}")),
    }
}
