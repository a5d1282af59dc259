//! x86-64 (System V) backend: one nullary leaf function per compiled body.
//!
//! The VM stack is a dedicated 512-byte region carved out of the machine
//! stack on entry (`sub rsp, 512`), indexed by `rbx`, which is callee-saved
//! and so is pushed and restored around the body. `LoadArg` has no frame to
//! read from under this calling convention — the emitted function takes no
//! arguments at all (§4.6) — so it is declined the same way `Call` is,
//! rather than emitting code that reads garbage.
//!
//! Instruction encodings are written by hand in the small-assembler style of
//! the `myuon-moca` JIT's `jit/compiler_x86_64.rs` example (`mov_rr`,
//! `mov_ri64`, `add_ri32`, push/pop byte sequences and friends), adapted to
//! this instruction set rather than copied.

use crate::codegen::CodegenBackend;
use crate::error::CodegenError;
use crate::ir::Instruction;

const VM_STACK_BYTES: i32 = 512;

pub struct X86_64Backend;

/// rbx is set to the base of the reserved 512-byte region (`mov rbx, rsp`
/// right after `sub rsp, 512`), so `[rbx + 8*depth]` is the next free slot,
/// growing upward through the reservation.
struct Emitter {
    code: Vec<u8>,
    depth: i32,
}

impl Emitter {
    fn new() -> Self {
        Emitter { code: Vec::new(), depth: 0 }
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    /// `push rbx` ; `sub rsp, VM_STACK_BYTES` ; `mov rbx, rsp`.
    fn prologue(&mut self) {
        self.push_bytes(&[0x53]); // push rbx
        self.push_bytes(&[0x48, 0x81, 0xEC]); // sub rsp, imm32
        self.push_bytes(&VM_STACK_BYTES.to_le_bytes());
        self.push_bytes(&[0x48, 0x89, 0xE3]); // mov rbx, rsp
    }

    /// `mov rax, [rbx+top]` ; `add rsp, VM_STACK_BYTES` ; `pop rbx` ; `ret`.
    fn epilogue(&mut self) {
        if self.depth > 0 {
            self.mov_rax_from_vm_top();
        } else {
            self.push_bytes(&[0x48, 0x31, 0xC0]); // xor rax, rax
        }
        self.push_bytes(&[0x48, 0x81, 0xC4]); // add rsp, imm32
        self.push_bytes(&VM_STACK_BYTES.to_le_bytes());
        self.push_bytes(&[0x5B]); // pop rbx
        self.push_bytes(&[0xC3]); // ret
    }

    fn vm_push_rax(&mut self) {
        let disp = self.depth * 8;
        self.push_bytes(&[0x48, 0x89, 0x83]); // mov [rbx+disp32], rax
        self.push_bytes(&disp.to_le_bytes());
        self.depth += 1;
    }

    fn vm_pop_to(&mut self, reg_mov_opcode: &[u8]) {
        self.depth -= 1;
        let disp = self.depth * 8;
        self.push_bytes(reg_mov_opcode);
        self.push_bytes(&disp.to_le_bytes());
    }

    fn vm_pop_rax(&mut self) {
        self.vm_pop_to(&[0x48, 0x8B, 0x83]); // mov rax, [rbx+disp32]
    }

    fn vm_pop_rcx(&mut self) {
        self.vm_pop_to(&[0x48, 0x8B, 0x8B]); // mov rcx, [rbx+disp32]
    }

    fn mov_rax_from_vm_top(&mut self) {
        let disp = (self.depth - 1) * 8;
        self.push_bytes(&[0x48, 0x8B, 0x83]); // mov rax, [rbx+disp32]
        self.push_bytes(&disp.to_le_bytes());
    }

    /// `movabs rax, imm64` then push.
    fn load_imm(&mut self, value: i64) {
        self.push_bytes(&[0x48, 0xB8]); // movabs rax, imm64
        self.push_bytes(&value.to_le_bytes());
        self.vm_push_rax();
    }

    /// pop b into rcx, pop a into rax, rax = op(rax, rcx), push rax.
    fn binary(&mut self, op: BinOp) {
        self.vm_pop_rcx();
        self.vm_pop_rax();
        match op {
            BinOp::Add => self.push_bytes(&[0x48, 0x01, 0xC8]), // add rax, rcx
            BinOp::Sub => self.push_bytes(&[0x48, 0x29, 0xC8]), // sub rax, rcx
            BinOp::Mul => self.push_bytes(&[0x48, 0x0F, 0xAF, 0xC1]), // imul rax, rcx
            BinOp::Div => {
                self.push_bytes(&[0x48, 0x99]); // cqo (sign-extend rax into rdx:rax)
                self.push_bytes(&[0x48, 0xF7, 0xF9]); // idiv rcx
            }
        }
        self.vm_push_rax();
    }
}

enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl CodegenBackend for X86_64Backend {
    fn emit(&self, body: &[Instruction]) -> Result<Vec<u8>, CodegenError> {
        let mut e = Emitter::new();
        e.prologue();

        for instr in body {
            match instr {
                Instruction::LoadImm(v) => e.load_imm(*v),
                Instruction::LoadArg(i) => {
                    return Err(CodegenError::UnsupportedInstruction(format!("LoadArg({i})")));
                }
                Instruction::Add => e.binary(BinOp::Add),
                Instruction::Sub => e.binary(BinOp::Sub),
                Instruction::Mul => e.binary(BinOp::Mul),
                Instruction::Div => e.binary(BinOp::Div),
                Instruction::Print => {
                    // No host call surface inside the generated leaf
                    // function (§4.6); native `Print` is a stack-preserving
                    // no-op.
                }
                Instruction::Return => break,
                Instruction::Call(name) => {
                    return Err(CodegenError::UnsupportedInstruction(format!("Call({name:?})")));
                }
            }
        }

        e.epilogue();
        Ok(e.code)
    }
}
