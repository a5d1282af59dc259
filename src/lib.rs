//! A small just-in-time engine for a stack-based arithmetic instruction
//! set. A caller provides either a flat instruction list or a multi-function
//! program; this crate parses, validates, and then either interprets it on
//! a stack virtual machine ([`vm`]) or emits native machine code for the
//! host CPU and executes it as an ordinary call ([`codegen`]).
//!
//! No optimization passes, register allocation, control flow, floating
//! point, or garbage collection. The instruction stream is trusted input;
//! this crate detects structural errors but is not a security boundary
//! against malicious bytecode.

pub mod codegen;
pub mod error;
pub mod ir;
pub mod memory;
pub mod parse;
pub mod vm;

pub use codegen::{compile_instructions, compile_program, CompiledFunction, JitEngine};
pub use ir::{Function, Instruction, Program, ReturnType};
pub use parse::{parse_flat, parse_program};
pub use vm::VirtualMachine;
