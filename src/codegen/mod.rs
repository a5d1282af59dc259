//! Native code generation (C5): the architecture-dispatching front door that
//! turns a function body into an installed, callable [`CompiledFunction`].
//!
//! Grounded on the `CodegenBackend` trait from the `rizqme-raya` engine's
//! `jit/backend/traits.rs`, narrowed down to this spec's single-leaf-function
//! contract: the emitted entry point is always nullary (§4.6/§4.7's
//! "the emitted function takes no arguments"), so `LoadArg` has nothing to
//! read from and is reported the same way `Call` is — a declined
//! instruction, not a crash. The artifact-absent-vs-hard-error split in
//! [`compile_instructions`] is this spec's own addition (§4.8/§7): anything
//! that is a property of the *host* (allocator failure, an unsupported
//! opcode) degrades to `Ok(None)` so callers can fall back to the VM, while
//! anything that is a property of the *program* (no `Main`, a null program)
//! is a real `Err`.

use crate::error::{CodegenError, MemoryError, ProgramError};
use crate::ir::{Function, Instruction, Program};
use crate::memory::{allocate_writable, commit_executable, ExecutablePage};

pub mod aarch64;
pub mod x86_64;

/// Implemented once per target architecture. Each backend emits a complete,
/// self-contained nullary leaf function body (no prologue/epilogue
/// assumptions shared across backends — x86-64 needs none, AArch64 needs a
/// frame-pointer pair).
pub trait CodegenBackend {
    /// Emit machine code implementing `body` as a nullary, single-return
    /// leaf function. Returns the raw bytes to install, or an error
    /// identifying the unsupported construct.
    fn emit(&self, body: &[Instruction]) -> Result<Vec<u8>, CodegenError>;
}

/// Picks the backend for the host's architecture, or `None` on an
/// architecture this spec does not target (the VM is always available as a
/// fallback there).
fn backend_for_host() -> Option<Box<dyn CodegenBackend>> {
    match std::env::consts::ARCH {
        "x86_64" => Some(Box::new(x86_64::X86_64Backend)),
        "aarch64" => Some(Box::new(aarch64::Aarch64Backend)),
        _ => None,
    }
}

/// An installed native function, callable as an ordinary Rust function
/// pointer for as long as this value lives.
pub struct CompiledFunction {
    page: ExecutablePage,
}

impl CompiledFunction {
    /// Call the compiled function. Takes no arguments and returns one
    /// 64-bit value, matching the architectural calling convention every
    /// backend emits to (§4.6/§4.7).
    pub fn invoke(&self) -> i64 {
        unsafe {
            let entry = self.page.as_entry_point();
            entry()
        }
    }
}

/// Drives a single function body through a backend and the page allocator.
///
/// Returns `Ok(None)` (never a hard error) when the host's backend can't
/// emit this body or the allocator can't install it — those are the
/// "fall back to the VM" conditions. Returns `Err` only for a malformed
/// request (the caller handed in something that isn't a real function).
pub fn compile_instructions(body: &[Instruction]) -> Result<Option<CompiledFunction>, ProgramError> {
    let Some(backend) = backend_for_host() else {
        log::debug!("no codegen backend for architecture {}", std::env::consts::ARCH);
        return Ok(None);
    };

    let code = match backend.emit(body) {
        Ok(code) => code,
        Err(e) => {
            log::debug!("codegen declined: {e}");
            return Ok(None);
        }
    };

    match install(&code) {
        Ok(page) => Ok(Some(CompiledFunction { page })),
        Err(e) => {
            log::warn!("native installation failed, falling back to VM: {e}");
            Ok(None)
        }
    }
}

/// Compile `program`'s `Main` function. `Main` must exist (a hard error if
/// not); everything else about whether native code comes out follows
/// [`compile_instructions`]'s rules.
pub fn compile_program(program: &Program) -> Result<Option<CompiledFunction>, ProgramError> {
    let main: &Function = program.require_main()?;
    compile_instructions(&main.body)
}

fn install(code: &[u8]) -> Result<ExecutablePage, MemoryError> {
    let mut page = allocate_writable(code.len().max(1))?;
    page.write(code);
    commit_executable(page)
}

/// A handle onto the base codegen, matching the external interface's
/// method-style naming (`jit.compile_instructions`/`jit.compile_program`).
/// Stateless; exists only so callers have something to hold and pass
/// around rather than bare functions.
#[derive(Debug, Default, Clone, Copy)]
pub struct JitEngine;

impl JitEngine {
    pub fn new() -> Self {
        JitEngine
    }

    pub fn compile_instructions(&self, body: &[Instruction]) -> Result<Option<CompiledFunction>, ProgramError> {
        compile_instructions(body)
    }

    pub fn compile_program(&self, program: &Program) -> Result<Option<CompiledFunction>, ProgramError> {
        compile_program(program)
    }
}
