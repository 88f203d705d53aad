//! Byte-exact x86-64 encoder conformance tests.
//!
//! Every expected byte sequence was checked against a reference assembler;
//! the cross-validation suite additionally decodes the output with iced-x86.

use jit_rs::asm;
use jit_rs::operand::{
    Immediate, MemoryAddress, Register, Width, AL, AX, CL, DX, EAX, ECX, EDX, R12, R15, R8, R9,
    RAX, RBP, RBX, RCX, RDX, RSI, RSP, XMM0, XMM1, XMM2,
};
use jit_rs::Instruction;

fn encode(instr: Instruction) -> Vec<u8> {
    instr
        .encode()
        .unwrap_or_else(|e| panic!("encoding failed for `{}`: {}", instr, e))
        .bytes
        .to_vec()
}

// ─── Zero-operand forms ───────────────────────────────────────────────

#[test]
fn fixed_encodings() {
    assert_eq!(encode(asm::nop()), [0x90]);
    assert_eq!(encode(asm::ret()), [0xC3]);
    assert_eq!(encode(asm::syscall()), [0x0F, 0x05]);
    assert_eq!(encode(asm::leave()), [0xC9]);
    assert_eq!(encode(asm::pushfq()), [0x9C]);
}

#[test]
fn sign_extension_pairs() {
    assert_eq!(encode(asm::cbw()), [0x66, 0x98]);
    assert_eq!(encode(asm::cwd()), [0x66, 0x99]);
    assert_eq!(encode(asm::cdq()), [0x99]);
    assert_eq!(encode(asm::cqo()), [0x48, 0x99]);
}

// ─── MOV ──────────────────────────────────────────────────────────────

#[test]
fn mov_reg_reg() {
    assert_eq!(encode(asm::mov(RAX, RBX)), [0x48, 0x89, 0xD8]);
    assert_eq!(encode(asm::mov(R9, R8)), [0x4D, 0x89, 0xC1]);
    assert_eq!(encode(asm::mov(EAX, EDX)), [0x89, 0xD0]);
    assert_eq!(encode(asm::mov(AX, DX)), [0x66, 0x89, 0xD0]);
    assert_eq!(encode(asm::mov(AL, CL)), [0x88, 0xC8]);
}

#[test]
fn mov_imm_byte_to_r8_uses_opcode_plus_reg() {
    // MOV 5 -> r8b: REX.B + B0+rb + ib.
    let r8b = Register::gp(8, Width::Byte);
    assert_eq!(encode(asm::mov_imm(r8b, 5)), [0x41, 0xB0, 0x05]);
}

#[test]
fn mov_imm_dword() {
    assert_eq!(encode(asm::mov_imm(EAX, 42)), [0xB8, 0x2A, 0x00, 0x00, 0x00]);
}

#[test]
fn mov_imm_qword_forms() {
    // Sign-extendable imm32 prefers C7 /0.
    assert_eq!(
        encode(asm::mov_imm(R15, 42)),
        [0x49, 0xC7, 0xC7, 0x2A, 0x00, 0x00, 0x00]
    );
    // Full 64-bit value takes the movabs form.
    assert_eq!(
        encode(asm::mov_imm(RAX, 0x1234_5678_9ABC_DEF0)),
        [0x48, 0xB8, 0xF0, 0xDE, 0xBC, 0x9A, 0x78, 0x56, 0x34, 0x12]
    );
}

#[test]
fn mov_memory_forms() {
    assert_eq!(
        encode(asm::mov(RAX, MemoryAddress::base(Width::Quad, RBX))),
        [0x48, 0x8B, 0x03]
    );
    assert_eq!(
        encode(asm::mov(RAX, MemoryAddress::base_disp(Width::Quad, RBX, 16))),
        [0x48, 0x8B, 0x43, 0x10]
    );
    assert_eq!(
        encode(asm::mov(RAX, MemoryAddress::base_disp(Width::Quad, RBX, 0x1000))),
        [0x48, 0x8B, 0x83, 0x00, 0x10, 0x00, 0x00]
    );
    assert_eq!(
        encode(asm::mov(MemoryAddress::base(Width::Quad, RBX), RAX)),
        [0x48, 0x89, 0x03]
    );
}

#[test]
fn mov_rbp_r13_bases_force_displacement() {
    // mod=00 with base code 5 means RIP-relative, so RBP/R13 carry disp8 0.
    assert_eq!(
        encode(asm::mov(RAX, MemoryAddress::base(Width::Quad, RBP))),
        [0x48, 0x8B, 0x45, 0x00]
    );
    let r13 = Register::gp(13, Width::Quad);
    assert_eq!(
        encode(asm::mov(RAX, MemoryAddress::base(Width::Quad, r13))),
        [0x49, 0x8B, 0x45, 0x00]
    );
}

#[test]
fn mov_rsp_base_needs_sib() {
    assert_eq!(
        encode(asm::mov(MemoryAddress::base_disp(Width::Quad, RSP, 8), RAX)),
        [0x48, 0x89, 0x44, 0x24, 0x08]
    );
    assert_eq!(
        encode(asm::mov(RAX, MemoryAddress::base(Width::Quad, R12))),
        [0x49, 0x8B, 0x04, 0x24]
    );
}

#[test]
fn mov_scaled_index() {
    assert_eq!(
        encode(asm::mov(
            EAX,
            MemoryAddress::base_index(Width::Double, RBX, RSI, 4, 8)
        )),
        [0x8B, 0x44, 0xB3, 0x08]
    );
}

#[test]
fn mov_absolute_address() {
    assert_eq!(
        encode(asm::mov(RAX, MemoryAddress::absolute(Width::Quad, 0x100))),
        [0x48, 0x8B, 0x04, 0x25, 0x00, 0x01, 0x00, 0x00]
    );
}

#[test]
fn mov_byte_store() {
    assert_eq!(
        encode(asm::mov(MemoryAddress::base(Width::Byte, RBX), AL)),
        [0x88, 0x03]
    );
    // SIL requires a bare REX prefix.
    let sil = Register::gp(6, Width::Byte);
    assert_eq!(encode(asm::mov(sil, AL)), [0x40, 0x88, 0xC6]);
}

// ─── ALU family ───────────────────────────────────────────────────────

#[test]
fn add_reg_reg() {
    // ADD rbx into rax.
    assert_eq!(encode(asm::add(RAX, RBX)), [0x48, 0x01, 0xD8]);
}

#[test]
fn xor_zeroing_idiom() {
    assert_eq!(encode(asm::xor(EDX, EDX)), [0x31, 0xD2]);
    assert_eq!(encode(asm::xor(RAX, RAX)), [0x48, 0x31, 0xC0]);
}

#[test]
fn alu_immediate_forms() {
    // imm8 sign-extended form wins for small values.
    assert_eq!(encode(asm::add(RAX, Immediate::imm32(16))), [0x48, 0x83, 0xC0, 0x10]);
    // Accumulator id form for larger ones.
    assert_eq!(
        encode(asm::add(RAX, Immediate::imm32(256))),
        [0x48, 0x05, 0x00, 0x01, 0x00, 0x00]
    );
    // Non-accumulator register takes the 81 /digit form.
    assert_eq!(
        encode(asm::add(ECX, Immediate::imm32(256))),
        [0x81, 0xC1, 0x00, 0x01, 0x00, 0x00]
    );
    assert_eq!(encode(asm::sub(RSP, Immediate::imm32(32))), [0x48, 0x83, 0xEC, 0x20]);
    // Word accumulator with a 16-bit immediate.
    assert_eq!(
        encode(asm::add(AX, Immediate::imm16(0x1234))),
        [0x66, 0x05, 0x34, 0x12]
    );
}

#[test]
fn alu_memory_destination() {
    assert_eq!(
        encode(asm::add(MemoryAddress::base(Width::Double, RBX), EAX)),
        [0x01, 0x03]
    );
}

#[test]
fn cmp_forms() {
    assert_eq!(encode(asm::cmp(RAX, RBX)), [0x48, 0x39, 0xD8]);
    assert_eq!(encode(asm::cmp_imm(RAX, 0)), [0x48, 0x83, 0xF8, 0x00]);
    assert_eq!(encode(asm::cmp_imm(AL, 7)), [0x3C, 0x07]);
}

#[test]
fn test_neg_not() {
    assert_eq!(encode(asm::test(RAX, RAX)), [0x48, 0x85, 0xC0]);
    assert_eq!(encode(asm::neg(RAX)), [0x48, 0xF7, 0xD8]);
    assert_eq!(encode(asm::not(EAX)), [0xF7, 0xD0]);
}

#[test]
fn inc_dec() {
    assert_eq!(encode(asm::inc(EAX)), [0xFF, 0xC0]);
    assert_eq!(encode(asm::dec(RDX)), [0x48, 0xFF, 0xCA]);
}

// ─── Multiply and divide ──────────────────────────────────────────────

#[test]
fn imul_two_operand() {
    assert_eq!(encode(asm::imul(RAX, RBX)), [0x48, 0x0F, 0xAF, 0xC3]);
}

#[test]
fn widening_multiply_and_divide() {
    assert_eq!(encode(asm::mul(RBX)), [0x48, 0xF7, 0xE3]);
    assert_eq!(encode(asm::imul1(RBX)), [0x48, 0xF7, 0xEB]);
    assert_eq!(encode(asm::div(ECX)), [0xF7, 0xF1]);
    assert_eq!(encode(asm::div(CL)), [0xF6, 0xF1]);
    assert_eq!(encode(asm::idiv(RCX)), [0x48, 0xF7, 0xF9]);
}

// ─── Shifts ───────────────────────────────────────────────────────────

#[test]
fn shift_forms() {
    assert_eq!(encode(asm::shl(RAX, CL)), [0x48, 0xD3, 0xE0]);
    assert_eq!(encode(asm::shr(EAX, Immediate::imm8(4))), [0xC1, 0xE8, 0x04]);
    assert_eq!(encode(asm::sar(RAX, Immediate::imm8(63))), [0x48, 0xC1, 0xF8, 0x3F]);
    assert_eq!(encode(asm::shr(AX, Immediate::imm8(8))), [0x66, 0xC1, 0xE8, 0x08]);
}

// ─── Stack ────────────────────────────────────────────────────────────

#[test]
fn push_pop() {
    assert_eq!(encode(asm::push(RBX)), [0x53]);
    assert_eq!(encode(asm::push(R12)), [0x41, 0x54]);
    assert_eq!(encode(asm::pop(RBX)), [0x5B]);
    assert_eq!(encode(asm::pop(R12)), [0x41, 0x5C]);
    assert_eq!(encode(asm::push(Immediate::imm32(8))), [0x6A, 0x08]);
    assert_eq!(
        encode(asm::push(Immediate::imm32(0x1000))),
        [0x68, 0x00, 0x10, 0x00, 0x00]
    );
}

// ─── Widening moves and LEA ───────────────────────────────────────────

#[test]
fn movzx_movsx() {
    assert_eq!(encode(asm::movzx(EAX, CL)), [0x0F, 0xB6, 0xC1]);
    assert_eq!(encode(asm::movzx(AX, AL)), [0x66, 0x0F, 0xB6, 0xC0]);
    assert_eq!(
        encode(asm::movzx(RAX, Register::gp(1, Width::Byte))),
        [0x48, 0x0F, 0xB6, 0xC1]
    );
    assert_eq!(encode(asm::movsx(EAX, AL)), [0x0F, 0xBE, 0xC0]);
    // Dword source goes through MOVSXD.
    assert_eq!(encode(asm::movsx(RAX, EAX)), [0x48, 0x63, 0xC0]);
}

#[test]
fn lea_scaled() {
    assert_eq!(
        encode(asm::lea(RAX, MemoryAddress::base_index(Width::Quad, RBX, RSI, 4, 8))),
        [0x48, 0x8D, 0x44, 0xB3, 0x08]
    );
}

// ─── Conditional materialization ──────────────────────────────────────

#[test]
fn setcc_forms() {
    assert_eq!(encode(asm::sete(AL)), [0x0F, 0x94, 0xC0]);
    assert_eq!(encode(asm::setl(AL)), [0x0F, 0x9C, 0xC0]);
    // SIL needs a bare REX.
    assert_eq!(
        encode(asm::setg(Register::gp(6, Width::Byte))),
        [0x40, 0x0F, 0x9F, 0xC6]
    );
}

// ─── Control flow ─────────────────────────────────────────────────────

#[test]
fn call_and_jump_register_forms() {
    assert_eq!(encode(asm::call(RAX)), [0xFF, 0xD0]);
    assert_eq!(encode(asm::call(R12)), [0x41, 0xFF, 0xD4]);
    assert_eq!(encode(asm::jmp(RAX)), [0xFF, 0xE0]);
}

#[test]
fn label_targets_emit_placeholder_and_relocation() {
    let encoded = asm::call(asm::label("callee")).encode().unwrap();
    assert_eq!(&*encoded.bytes, &[0xE8, 0x00, 0x00, 0x00, 0x00]);
    assert_eq!(encoded.relocation.unwrap().offset, 1);

    let encoded = asm::je("target").encode().unwrap();
    assert_eq!(&*encoded.bytes, &[0x0F, 0x84, 0x00, 0x00, 0x00, 0x00]);
    assert_eq!(encoded.relocation.unwrap().offset, 2);

    let encoded = asm::jmp(asm::label("target")).encode().unwrap();
    assert_eq!(&*encoded.bytes, &[0xE9, 0x00, 0x00, 0x00, 0x00]);
}

// ─── SSE2 scalar double ───────────────────────────────────────────────

#[test]
fn scalar_double_arithmetic() {
    assert_eq!(encode(asm::addsd(XMM1, XMM2)), [0xF2, 0x0F, 0x58, 0xCA]);
    assert_eq!(encode(asm::subsd(XMM0, XMM1)), [0xF2, 0x0F, 0x5C, 0xC1]);
    assert_eq!(encode(asm::mulsd(XMM0, XMM1)), [0xF2, 0x0F, 0x59, 0xC1]);
    assert_eq!(encode(asm::divsd(XMM0, XMM1)), [0xF2, 0x0F, 0x5E, 0xC1]);
    assert_eq!(encode(asm::ucomisd(XMM0, XMM1)), [0x66, 0x0F, 0x2E, 0xC1]);
    assert_eq!(encode(asm::xorps(XMM2, XMM2)), [0x0F, 0x57, 0xD2]);
}

#[test]
fn scalar_double_extended_registers() {
    assert_eq!(
        encode(asm::addsd(Register::xmm(9), Register::xmm(10))),
        [0xF2, 0x45, 0x0F, 0x58, 0xCA]
    );
}

#[test]
fn movsd_load_store() {
    assert_eq!(
        encode(asm::movsd(XMM0, MemoryAddress::base(Width::Quad, RAX))),
        [0xF2, 0x0F, 0x10, 0x00]
    );
    assert_eq!(
        encode(asm::movsd(MemoryAddress::base(Width::Quad, RAX), XMM0)),
        [0xF2, 0x0F, 0x11, 0x00]
    );
}

#[test]
fn movq_between_xmm_and_gp() {
    assert_eq!(encode(asm::movq(XMM0, RAX)), [0x66, 0x48, 0x0F, 0x6E, 0xC0]);
    assert_eq!(encode(asm::movq(RAX, XMM0)), [0x66, 0x48, 0x0F, 0x7E, 0xC0]);
}

#[test]
fn int_float_conversions() {
    assert_eq!(encode(asm::cvtsi2sd(XMM0, RAX)), [0xF2, 0x48, 0x0F, 0x2A, 0xC0]);
    assert_eq!(encode(asm::cvtsi2sd(XMM0, EAX)), [0xF2, 0x0F, 0x2A, 0xC0]);
    assert_eq!(encode(asm::cvttsd2si(RAX, XMM0)), [0xF2, 0x48, 0x0F, 0x2C, 0xC0]);
    assert_eq!(encode(asm::cvttsd2si(EAX, XMM0)), [0xF2, 0x0F, 0x2C, 0xC0]);
}
