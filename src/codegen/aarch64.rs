//! AArch64 backend: a frame-pointer-pair nullary leaf function per compiled
//! body. Unlike x86-64 there is no usable red zone, so the VM's scratch
//! stack is a genuine `sub sp, sp, #VM_STACK_BYTES` allocation, framed by the
//! standard `stp x29, x30, [sp, #-16]!` / `ldp ... ret` pair. Immediates are
//! materialized with `movz`/`movn`/`movk` rather than a PC-relative literal
//! pool, since this backend never emits more than one function and a
//! literal pool would need its own relocation bookkeeping.
//!
//! `LoadArg` is declined the same way `Call` is: the emitted function takes
//! no arguments (§4.6/§4.7), so there is nothing for it to read.
//!
//! Grounded on the AArch64 codegen in the `eddieantonio-brainmuck` example
//! (`crates/core/src/codegen.rs`), which uses the same instruction family
//! (`movz`/`movk`, `str`/`ldr` with scaled immediate offsets, `stp`/`ldp`)
//! for a similarly small leaf-function JIT.

use crate::codegen::CodegenBackend;
use crate::error::CodegenError;
use crate::ir::Instruction;

const VM_STACK_BYTES: u32 = 512;

pub struct Aarch64Backend;

/// x19 holds the VM stack base (callee-saved, preserved across the body).
/// Values round-trip through x9/x10 as scratch accumulators.
struct Emitter {
    code: Vec<u32>,
    depth: u32,
}

impl Emitter {
    fn new() -> Self {
        Emitter { code: Vec::new(), depth: 0 }
    }

    fn push(&mut self, insn: u32) {
        self.code.push(insn);
    }

    fn prologue(&mut self) {
        // stp x29, x30, [sp, #-32]!
        self.push(0xA9BE7BFD);
        // str x19, [sp, #16]
        self.push(0xF9000BF3);
        // mov x29, sp
        self.push(0x910003FD);
        // sub sp, sp, #VM_STACK_BYTES
        self.push(sub_sp_imm(VM_STACK_BYTES));
        // mov x19, sp (VM stack base)
        self.push(0x910003F3);
    }

    fn epilogue(&mut self) {
        if self.depth > 0 {
            self.ldr_x9_from_vm_top();
            // mov x0, x9
            self.push(0xAA0903E0);
        } else {
            // mov x0, xzr
            self.push(0xAA1F03E0);
        }
        // add sp, sp, #VM_STACK_BYTES
        self.push(add_sp_imm(VM_STACK_BYTES));
        // ldr x19, [sp, #16]
        self.push(0xF9400BF3);
        // ldp x29, x30, [sp], #32
        self.push(0xA8C27BFD);
        // ret
        self.push(0xD65F03C0);
    }

    fn vm_push_x9(&mut self) {
        let disp = self.depth * 8;
        self.push(str_x9_x19(disp));
        self.depth += 1;
    }

    fn vm_pop_x9(&mut self) {
        self.depth -= 1;
        let disp = self.depth * 8;
        self.push(ldr_x9_x19(disp));
    }

    fn vm_pop_x10(&mut self) {
        self.depth -= 1;
        let disp = self.depth * 8;
        self.push(ldr_x10_x19(disp));
    }

    fn ldr_x9_from_vm_top(&mut self) {
        let disp = (self.depth - 1) * 8;
        self.push(ldr_x9_x19(disp));
    }

    /// Materialize a 64-bit immediate into x9 with movz/movn + up to three
    /// movk, choosing the movz/movn base on the value's sign.
    fn load_imm(&mut self, value: i64) {
        let bits = value as u64;
        let chunks = [
            (bits & 0xFFFF) as u16,
            ((bits >> 16) & 0xFFFF) as u16,
            ((bits >> 32) & 0xFFFF) as u16,
            ((bits >> 48) & 0xFFFF) as u16,
        ];

        if value < 0 {
            let inverted = !bits;
            let inv_chunks = [
                (inverted & 0xFFFF) as u16,
                ((inverted >> 16) & 0xFFFF) as u16,
                ((inverted >> 32) & 0xFFFF) as u16,
                ((inverted >> 48) & 0xFFFF) as u16,
            ];
            self.push(movn_x9(inv_chunks[0], 0));
            for (shift, &chunk) in chunks.iter().enumerate().skip(1) {
                self.push(movk_x9(chunk, (shift * 16) as u32));
            }
        } else {
            self.push(movz_x9(chunks[0], 0));
            for (shift, &chunk) in chunks.iter().enumerate().skip(1) {
                if chunk != 0 {
                    self.push(movk_x9(chunk, (shift * 16) as u32));
                }
            }
        }

        self.vm_push_x9();
    }

    fn binary(&mut self, op: BinOp) {
        self.vm_pop_x10(); // b
        self.vm_pop_x9(); // a
        match op {
            BinOp::Add => self.push(0x8B0A0129), // add x9, x9, x10
            BinOp::Sub => self.push(0xCB0A0129), // sub x9, x9, x10
            BinOp::Mul => self.push(0x9B0A7D29), // mul x9, x9, x10
            BinOp::Div => self.push(0x9AC90D29), // sdiv x9, x9, x10
        }
        self.vm_push_x9();
    }

    fn into_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.code.len() * 4);
        for insn in self.code {
            out.extend_from_slice(&insn.to_le_bytes());
        }
        out
    }
}

enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

fn movz_x9(imm16: u16, shift: u32) -> u32 {
    0xD2800009 | ((imm16 as u32) << 5) | ((shift / 16) << 21)
}

fn movn_x9(imm16: u16, shift: u32) -> u32 {
    0x92800009 | ((imm16 as u32) << 5) | ((shift / 16) << 21)
}

fn movk_x9(imm16: u16, shift: u32) -> u32 {
    0xF2800009 | ((imm16 as u32) << 5) | ((shift / 16) << 21)
}

/// `str x9, [x19, #disp]` — disp is a multiple of 8, encoded as the scaled
/// 12-bit unsigned immediate form of STR (immediate).
fn str_x9_x19(disp: u32) -> u32 {
    0xF9000269 | ((disp / 8) << 10)
}

fn ldr_x9_x19(disp: u32) -> u32 {
    0xF9400269 | ((disp / 8) << 10)
}

fn ldr_x10_x19(disp: u32) -> u32 {
    0xF940026A | ((disp / 8) << 10)
}

fn sub_sp_imm(imm: u32) -> u32 {
    0xD10003FF | (imm << 10)
}

fn add_sp_imm(imm: u32) -> u32 {
    0x910003FF | (imm << 10)
}

impl CodegenBackend for Aarch64Backend {
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
                    // Same stance as x86-64: no call surface, so a no-op.
                }
                Instruction::Return => break,
                Instruction::Call(name) => {
                    return Err(CodegenError::UnsupportedInstruction(format!("Call({name:?})")));
                }
            }
        }

        e.epilogue();
        Ok(e.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_word_aligned_code() {
        let backend = Aarch64Backend;
        let code = backend.emit(&[Instruction::LoadImm(7), Instruction::Return]).unwrap();
        assert_eq!(code.len() % 4, 0);
        assert!(!code.is_empty());
    }

    #[test]
    fn materializes_negative_immediates() {
        let backend = Aarch64Backend;
        let code = backend.emit(&[Instruction::LoadImm(-1), Instruction::Return]).unwrap();
        assert!(!code.is_empty());
    }

    #[test]
    fn rejects_call() {
        let backend = Aarch64Backend;
        let err = backend.emit(&[Instruction::Call("X".into())]).unwrap_err();
        assert!(matches!(err, CodegenError::UnsupportedInstruction(_)));
    }

    #[test]
    fn rejects_load_arg() {
        let backend = Aarch64Backend;
        let err = backend.emit(&[Instruction::LoadArg(0)]).unwrap_err();
        assert!(matches!(err, CodegenError::UnsupportedInstruction(_)));
    }
}
