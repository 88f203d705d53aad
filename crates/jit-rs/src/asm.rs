//! Instruction constructors.
//!
//! One constructor per supported mnemonic, taking the mnemonic's operand
//! arity and returning an [`Instruction`] wired to its opcode table.
//! Mnemonics with implicit operands (single-operand divide and multiply,
//! the sign-extension pair family) declare those in the opcode table, not
//! here. A few convenience constructors perform literal-width adaptation
//! before dispatch, favoring the shortest encodings.

use alloc::string::String;
use alloc::vec;

use crate::instruction::Instruction;
use crate::opcode;
use crate::operand::{Immediate, Operand, Register, RipRelative, Width};

macro_rules! binary {
    ($(#[$doc:meta])* $name:ident, $mnemonic:literal, $table:path) => {
        $(#[$doc])*
        pub fn $name(dst: impl Into<Operand>, src: impl Into<Operand>) -> Instruction {
            Instruction::new($mnemonic, $table, vec![dst.into(), src.into()])
        }
    };
}

macro_rules! unary {
    ($(#[$doc:meta])* $name:ident, $mnemonic:literal, $table:path) => {
        $(#[$doc])*
        pub fn $name(op: impl Into<Operand>) -> Instruction {
            Instruction::new($mnemonic, $table, vec![op.into()])
        }
    };
}

macro_rules! fixed {
    ($(#[$doc:meta])* $name:ident, $mnemonic:literal) => {
        $(#[$doc])*
        pub fn $name() -> Instruction {
            Instruction::fixed($mnemonic)
        }
    };
}

// ─── Data movement ──────────────────────────────────────────────────

binary!(
    /// `mov dst, src`
    mov, "mov", opcode::MOV
);
binary!(
    /// `movzx dst, src` — move with zero-extension.
    movzx, "movzx", opcode::MOVZX
);
binary!(
    /// `movsx dst, src` — move with sign-extension (MOVSXD for dword sources).
    movsx, "movsx", opcode::MOVSX
);
binary!(
    /// `lea dst, [mem]`
    lea, "lea", opcode::LEA
);

/// `mov dst, imm` with literal-width adaptation: the immediate is narrowed
/// to the destination width, and a 64-bit destination takes the shortest
/// form that preserves the value (sign-extended imm32, a zero-extending
/// 32-bit projection, or the full imm64 only for values ≥ 2³²).
pub fn mov_imm(dst: Register, value: u64) -> Instruction {
    match dst.width {
        Width::Byte => mov(dst, Immediate::imm8(value as u8)),
        Width::Word => mov(dst, Immediate::imm16(value as u16)),
        Width::Double => mov(dst, Immediate::imm32(value as u32)),
        Width::Quad => {
            let signed = value as i64;
            if (i32::MIN as i64..=i32::MAX as i64).contains(&signed) {
                mov(dst, Immediate::new(Width::Double, signed as i128))
            } else if value < (1 << 32) {
                mov(
                    Register {
                        width: Width::Double,
                        ..dst
                    },
                    Immediate::imm32(value as u32),
                )
            } else {
                mov(dst, Immediate::imm64(value))
            }
        }
    }
}

// ─── Arithmetic / logic ─────────────────────────────────────────────

binary!(
    /// `add dst, src`
    add, "add", opcode::ADD
);
binary!(
    /// `sub dst, src`
    sub, "sub", opcode::SUB
);
binary!(
    /// `and dst, src`
    and, "and", opcode::AND
);
binary!(
    /// `or dst, src`
    or, "or", opcode::OR
);
binary!(
    /// `xor dst, src`
    xor, "xor", opcode::XOR
);
binary!(
    /// `cmp dst, src`
    cmp, "cmp", opcode::CMP
);
binary!(
    /// `test dst, src`
    test, "test", opcode::TEST
);
binary!(
    /// `imul dst, src` — two-operand signed multiply.
    imul, "imul", opcode::IMUL
);

/// `cmp dst, imm` with literal-width adaptation: byte destinations compare
/// against an 8-bit immediate, everything else against a 32-bit one.
pub fn cmp_imm(dst: Register, value: u64) -> Instruction {
    if dst.width == Width::Byte {
        cmp(dst, Immediate::imm8(value as u8))
    } else {
        cmp(dst, Immediate::new(Width::Double, value as i64 as i128))
    }
}

unary!(
    /// `not op`
    not, "not", opcode::NOT
);
unary!(
    /// `neg op`
    neg, "neg", opcode::NEG
);
unary!(
    /// `inc op`
    inc, "inc", opcode::INC
);
unary!(
    /// `dec op`
    dec, "dec", opcode::DEC
);
unary!(
    /// `mul op` — unsigned multiply; rDX:rAX ← rAX × op.
    mul, "mul", opcode::MUL
);
unary!(
    /// `imul op` — one-operand signed multiply; rDX:rAX ← rAX × op.
    imul1, "imul", opcode::IMUL
);
unary!(
    /// `div op` — unsigned divide of rDX:rAX (AX for byte width); quotient
    /// in rAX/AL, remainder in rDX/AH.
    div, "div", opcode::DIV
);
unary!(
    /// `idiv op` — signed divide; same implicit operands as `div`.
    idiv, "idiv", opcode::IDIV
);

binary!(
    /// `shl dst, count` — count is an imm8 or CL.
    shl, "shl", opcode::SHL
);
binary!(
    /// `shr dst, count` — logical right shift.
    shr, "shr", opcode::SHR
);
binary!(
    /// `sar dst, count` — arithmetic right shift.
    sar, "sar", opcode::SAR
);

// ─── Stack ──────────────────────────────────────────────────────────

unary!(
    /// `push op`
    push, "push", opcode::PUSH
);
unary!(
    /// `pop op`
    pop, "pop", opcode::POP
);

// ─── Control flow ───────────────────────────────────────────────────

/// A code-label operand for call/jump targets.
pub fn label(name: impl Into<String>) -> Operand {
    Operand::Label(name.into())
}

unary!(
    /// `call target` — a label (rel32, patched via relocation) or r/m64.
    call, "call", opcode::CALL
);
unary!(
    /// `jmp target`
    jmp, "jmp", opcode::JMP
);

macro_rules! jcc {
    ($(#[$doc:meta])* $name:ident, $mnemonic:literal, $table:path) => {
        $(#[$doc])*
        pub fn $name(target: impl Into<String>) -> Instruction {
            Instruction::new($mnemonic, $table, vec![Operand::Label(target.into())])
        }
    };
}

jcc!(
    /// `je target`
    je, "je", opcode::JE
);
jcc!(
    /// `jne target`
    jne, "jne", opcode::JNE
);
jcc!(
    /// `jb target` — unsigned below.
    jb, "jb", opcode::JB
);
jcc!(
    /// `jbe target`
    jbe, "jbe", opcode::JBE
);
jcc!(
    /// `ja target` — unsigned above.
    ja, "ja", opcode::JA
);
jcc!(
    /// `jae target`
    jae, "jae", opcode::JAE
);
jcc!(
    /// `jl target` — signed less.
    jl, "jl", opcode::JL
);
jcc!(
    /// `jle target`
    jle, "jle", opcode::JLE
);
jcc!(
    /// `jg target` — signed greater.
    jg, "jg", opcode::JG
);
jcc!(
    /// `jge target`
    jge, "jge", opcode::JGE
);

unary!(
    /// `sete op8`
    sete, "sete", opcode::SETE
);
unary!(
    /// `setne op8`
    setne, "setne", opcode::SETNE
);
unary!(
    /// `setb op8`
    setb, "setb", opcode::SETB
);
unary!(
    /// `setbe op8`
    setbe, "setbe", opcode::SETBE
);
unary!(
    /// `seta op8`
    seta, "seta", opcode::SETA
);
unary!(
    /// `setae op8`
    setae, "setae", opcode::SETAE
);
unary!(
    /// `setl op8`
    setl, "setl", opcode::SETL
);
unary!(
    /// `setle op8`
    setle, "setle", opcode::SETLE
);
unary!(
    /// `setg op8`
    setg, "setg", opcode::SETG
);
unary!(
    /// `setge op8`
    setge, "setge", opcode::SETGE
);

// ─── Sign-extension pairs and other fixed forms ─────────────────────

fixed!(
    /// `cbw` — AX ← sign-extend(AL).
    cbw, "cbw"
);
fixed!(
    /// `cwd` — DX:AX ← sign-extend(AX).
    cwd, "cwd"
);
fixed!(
    /// `cdq` — EDX:EAX ← sign-extend(EAX).
    cdq, "cdq"
);
fixed!(
    /// `cqo` — RDX:RAX ← sign-extend(RAX).
    cqo, "cqo"
);
fixed!(
    /// `ret`
    ret, "ret"
);
fixed!(
    /// `nop`
    nop, "nop"
);
fixed!(
    /// `leave`
    leave, "leave"
);
fixed!(
    /// `pushfq`
    pushfq, "pushfq"
);
fixed!(
    /// `syscall`
    syscall, "syscall"
);

// ─── SSE2 scalar double ─────────────────────────────────────────────

binary!(
    /// `movsd dst, src` — scalar-double move (xmm ↔ xmm/m64).
    movsd, "movsd", opcode::MOVSD
);
binary!(
    /// `movq dst, src` — quadword move between xmm and r/m64.
    movq, "movq", opcode::MOVQ
);
binary!(
    /// `addsd dst, src`
    addsd, "addsd", opcode::ADDSD
);
binary!(
    /// `subsd dst, src`
    subsd, "subsd", opcode::SUBSD
);
binary!(
    /// `mulsd dst, src`
    mulsd, "mulsd", opcode::MULSD
);
binary!(
    /// `divsd dst, src`
    divsd, "divsd", opcode::DIVSD
);
binary!(
    /// `ucomisd a, b` — scalar-double compare, sets EFLAGS.
    ucomisd, "ucomisd", opcode::UCOMISD
);
binary!(
    /// `xorps dst, src` — xmm zeroing idiom.
    xorps, "xorps", opcode::XORPS
);
binary!(
    /// `cvtsi2sd xmm, r/m` — signed integer to scalar double.
    cvtsi2sd, "cvtsi2sd", opcode::CVTSI2SD
);
binary!(
    /// `cvttsd2si reg, xmm/m64` — scalar double to signed integer, truncating.
    cvttsd2si, "cvttsd2si", opcode::CVTTSD2SI
);

/// `movsd xmm, [rip + label]` — load a data-section scalar double.
pub fn movsd_load(dst: Register, data_label: impl Into<String>) -> Instruction {
    movsd(dst, RipRelative::new(Width::Quad, data_label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::{AL, R8, RAX, RBX};
    use alloc::string::ToString;

    #[test]
    fn mov_imm_picks_shortest_quad_form() {
        // Sign-extendable: C7 /0 id.
        let bytes = mov_imm(RAX, 5).encode().unwrap().bytes.to_vec();
        assert_eq!(bytes, [0x48, 0xC7, 0xC0, 0x05, 0x00, 0x00, 0x00]);

        // Fits unsigned 32: zero-extending 32-bit projection.
        let bytes = mov_imm(RAX, 0x9000_0000).encode().unwrap().bytes.to_vec();
        assert_eq!(bytes, [0xB8, 0x00, 0x00, 0x00, 0x90]);

        // Needs the full movabs.
        let bytes = mov_imm(RAX, 0x1_0000_0000).encode().unwrap().bytes.to_vec();
        assert_eq!(
            bytes,
            [0x48, 0xB8, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn mov_imm_narrows_to_byte_destination() {
        let instr = mov_imm(R8.with_width(Width::Byte).unwrap(), 5);
        assert_eq!(instr.encode().unwrap().bytes.to_vec(), [0x41, 0xB0, 0x05]);
    }

    #[test]
    fn cmp_imm_adapts_to_byte_register() {
        assert_eq!(cmp_imm(AL, 7).to_string(), "cmp al, 0x7");
        assert_eq!(cmp_imm(RBX, 7).to_string(), "cmp rbx, 0x7");
    }

    #[test]
    fn implicit_operand_forms_take_one_argument() {
        assert_eq!(
            idiv(crate::operand::RCX).encode().unwrap().bytes.to_vec(),
            [0x48, 0xF7, 0xF9]
        );
        assert_eq!(cqo().encode().unwrap().bytes.to_vec(), [0x48, 0x99]);
    }
}
