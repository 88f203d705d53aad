//! Opcode tables: ordered encoding candidates per mnemonic.
//!
//! Each mnemonic maps to a list of [`Opcode`] candidates. A candidate
//! declares the operand shape it accepts and the recipe to encode it: prefix
//! bytes, opcode bytes, REX.W policy, ModR/M layout, and the immediate rule
//! implied by its pattern. The list order is the priority order used by the
//! matcher — shorter encodings (imm8 sign-extended forms, opcode+register
//! forms, accumulator forms) are declared before the longer general forms,
//! and the first accepting candidate wins.
//!
//! Zero-operand instructions bypass the candidate machinery entirely and
//! live in a fixed-encoding table, sorted by mnemonic for binary search.

use crate::operand::{Operand, RegClass, Width};

/// Operand-shape pattern for one operand position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pat {
    /// GP register of the given width, encoded in the ModR/M reg field.
    Reg(Width),
    /// GP register, memory, or RIP-relative of the given width, encoded in
    /// the ModR/M r/m field (plus SIB/displacement as needed).
    Rm(Width),
    /// The accumulator projection (AL/AX/EAX/RAX) at the given width.
    /// Implicit — not encoded in any field.
    Acc(Width),
    /// A fixed GP register (index, width), e.g. CL in shift-by-register
    /// forms. Implicit — not encoded.
    Fixed(u8, Width),
    /// GP register encoded in the low 3 bits of the last opcode byte.
    PlusReg(Width),
    /// Immediate encoded at exactly this width.
    Imm(Width),
    /// Immediate encoded at this width and sign-extended to the operand
    /// width by the CPU. Accepts any immediate whose value fits the signed
    /// range of the encoded width.
    ImmSx(Width),
    /// XMM register, encoded in the ModR/M reg field.
    Xmm,
    /// XMM register or qword memory/RIP-relative, in the ModR/M r/m field.
    XmmRm,
    /// Memory or RIP-relative operand of any width (address operand, e.g.
    /// for LEA), in the ModR/M r/m field.
    Mem,
    /// A label encoded as a rel32 displacement (call/jump targets).
    Rel32,
}

impl Pat {
    fn accepts(self, op: &Operand) -> bool {
        match self {
            Pat::Reg(w) => {
                matches!(op, Operand::Register(r) if r.class == RegClass::General && r.width == w)
            }
            Pat::Rm(w) => match op {
                Operand::Register(r) => r.class == RegClass::General && r.width == w,
                Operand::Memory(mem) => mem.width == w,
                Operand::RipRelative(rip) => rip.width == w,
                _ => false,
            },
            Pat::Acc(w) => {
                matches!(op, Operand::Register(r)
                    if r.class == RegClass::General && r.index == 0 && r.width == w)
            }
            Pat::Fixed(index, w) => {
                matches!(op, Operand::Register(r)
                    if r.class == RegClass::General && r.index == index && r.width == w)
            }
            Pat::PlusReg(w) => {
                matches!(op, Operand::Register(r) if r.class == RegClass::General && r.width == w)
            }
            Pat::Imm(w) => matches!(op, Operand::Immediate(imm) if imm.width == w),
            Pat::ImmSx(w) => {
                matches!(op, Operand::Immediate(imm) if imm.fits_signed(w))
            }
            Pat::Xmm => matches!(op, Operand::Register(r) if r.class == RegClass::Float),
            Pat::XmmRm => match op {
                Operand::Register(r) => r.class == RegClass::Float,
                Operand::Memory(mem) => mem.width == Width::Quad,
                Operand::RipRelative(rip) => rip.width == Width::Quad,
                _ => false,
            },
            Pat::Mem => matches!(op, Operand::Memory(_) | Operand::RipRelative(_)),
            Pat::Rel32 => matches!(op, Operand::Label(_)),
        }
    }
}

/// ModR/M layout of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModRmKind {
    /// No ModR/M byte.
    None,
    /// The reg field comes from the candidate's `Reg`/`Xmm` operand.
    Reg,
    /// The reg field is a fixed opcode extension digit (/0../7).
    Digit(u8),
}

/// One encoding candidate for a mnemonic.
#[derive(Debug, Clone, Copy)]
pub struct Opcode {
    /// Accepted operand shape, one pattern per operand position.
    pub pattern: &'static [Pat],
    /// Mandatory prefix bytes (0x66 operand-size override or an SSE
    /// mandatory prefix 0xF2/0xF3/0x66), emitted before REX.
    pub prefixes: &'static [u8],
    /// Opcode bytes (1–3).
    pub opcode: &'static [u8],
    /// Whether REX.W is forced for this candidate.
    pub rex_w: bool,
    /// ModR/M layout.
    pub modrm: ModRmKind,
}

impl Opcode {
    /// Structural acceptance: arity and per-position pattern match.
    pub fn accepts(&self, ops: &[Operand]) -> bool {
        self.pattern.len() == ops.len()
            && self.pattern.iter().zip(ops).all(|(pat, op)| pat.accepts(op))
    }
}

// ─── Table construction macros ──────────────────────────────────────

macro_rules! opc {
    ($pattern:expr, $prefixes:expr, $opcode:expr, $rex_w:expr, $modrm:expr) => {
        Opcode {
            pattern: $pattern,
            prefixes: $prefixes,
            opcode: $opcode,
            rex_w: $rex_w,
            modrm: $modrm,
        }
    };
}

/// The classic ALU family (ADD/OR/AND/SUB/XOR/CMP) shares one table shape:
/// `base` is the r/m8,r8 opcode and `digit` selects the group-1 immediate
/// forms (0x80/0x81/0x83 /digit).
macro_rules! alu_table {
    ($digit:expr, $base:expr) => {
        &[
            // imm8 sign-extended forms first (shortest for small immediates)
            opc!(&[Pat::Rm(Width::Word), Pat::ImmSx(Width::Byte)], &[0x66], &[0x83], false, ModRmKind::Digit($digit)),
            opc!(&[Pat::Rm(Width::Double), Pat::ImmSx(Width::Byte)], &[], &[0x83], false, ModRmKind::Digit($digit)),
            opc!(&[Pat::Rm(Width::Quad), Pat::ImmSx(Width::Byte)], &[], &[0x83], true, ModRmKind::Digit($digit)),
            // accumulator short forms
            opc!(&[Pat::Acc(Width::Byte), Pat::Imm(Width::Byte)], &[], &[$base | 0x04], false, ModRmKind::None),
            opc!(&[Pat::Acc(Width::Word), Pat::Imm(Width::Word)], &[0x66], &[$base | 0x05], false, ModRmKind::None),
            opc!(&[Pat::Acc(Width::Double), Pat::Imm(Width::Double)], &[], &[$base | 0x05], false, ModRmKind::None),
            opc!(&[Pat::Acc(Width::Quad), Pat::ImmSx(Width::Double)], &[], &[$base | 0x05], true, ModRmKind::None),
            // general immediate forms
            opc!(&[Pat::Rm(Width::Byte), Pat::Imm(Width::Byte)], &[], &[0x80], false, ModRmKind::Digit($digit)),
            opc!(&[Pat::Rm(Width::Word), Pat::Imm(Width::Word)], &[0x66], &[0x81], false, ModRmKind::Digit($digit)),
            opc!(&[Pat::Rm(Width::Double), Pat::Imm(Width::Double)], &[], &[0x81], false, ModRmKind::Digit($digit)),
            opc!(&[Pat::Rm(Width::Quad), Pat::ImmSx(Width::Double)], &[], &[0x81], true, ModRmKind::Digit($digit)),
            // r/m, reg (MR) — preferred over RM for reg,reg tuples
            opc!(&[Pat::Rm(Width::Byte), Pat::Reg(Width::Byte)], &[], &[$base], false, ModRmKind::Reg),
            opc!(&[Pat::Rm(Width::Word), Pat::Reg(Width::Word)], &[0x66], &[$base | 0x01], false, ModRmKind::Reg),
            opc!(&[Pat::Rm(Width::Double), Pat::Reg(Width::Double)], &[], &[$base | 0x01], false, ModRmKind::Reg),
            opc!(&[Pat::Rm(Width::Quad), Pat::Reg(Width::Quad)], &[], &[$base | 0x01], true, ModRmKind::Reg),
            // reg, r/m (RM) — memory sources
            opc!(&[Pat::Reg(Width::Byte), Pat::Rm(Width::Byte)], &[], &[$base | 0x02], false, ModRmKind::Reg),
            opc!(&[Pat::Reg(Width::Word), Pat::Rm(Width::Word)], &[0x66], &[$base | 0x03], false, ModRmKind::Reg),
            opc!(&[Pat::Reg(Width::Double), Pat::Rm(Width::Double)], &[], &[$base | 0x03], false, ModRmKind::Reg),
            opc!(&[Pat::Reg(Width::Quad), Pat::Rm(Width::Quad)], &[], &[$base | 0x03], true, ModRmKind::Reg),
        ]
    };
}

/// Group-3/group-5 style unary forms: F6/F7 (or FE/FF) /digit over all widths.
macro_rules! unary_table {
    ($digit:expr, $op8:expr, $op:expr) => {
        &[
            opc!(&[Pat::Rm(Width::Byte)], &[], &[$op8], false, ModRmKind::Digit($digit)),
            opc!(&[Pat::Rm(Width::Word)], &[0x66], &[$op], false, ModRmKind::Digit($digit)),
            opc!(&[Pat::Rm(Width::Double)], &[], &[$op], false, ModRmKind::Digit($digit)),
            opc!(&[Pat::Rm(Width::Quad)], &[], &[$op], true, ModRmKind::Digit($digit)),
        ]
    };
}

/// Group-2 shifts/rotates: by CL (D2/D3 /digit) and by imm8 (C0/C1 /digit).
macro_rules! shift_table {
    ($digit:expr) => {
        &[
            opc!(&[Pat::Rm(Width::Byte), Pat::Fixed(1, Width::Byte)], &[], &[0xD2], false, ModRmKind::Digit($digit)),
            opc!(&[Pat::Rm(Width::Word), Pat::Fixed(1, Width::Byte)], &[0x66], &[0xD3], false, ModRmKind::Digit($digit)),
            opc!(&[Pat::Rm(Width::Double), Pat::Fixed(1, Width::Byte)], &[], &[0xD3], false, ModRmKind::Digit($digit)),
            opc!(&[Pat::Rm(Width::Quad), Pat::Fixed(1, Width::Byte)], &[], &[0xD3], true, ModRmKind::Digit($digit)),
            opc!(&[Pat::Rm(Width::Byte), Pat::Imm(Width::Byte)], &[], &[0xC0], false, ModRmKind::Digit($digit)),
            opc!(&[Pat::Rm(Width::Word), Pat::Imm(Width::Byte)], &[0x66], &[0xC1], false, ModRmKind::Digit($digit)),
            opc!(&[Pat::Rm(Width::Double), Pat::Imm(Width::Byte)], &[], &[0xC1], false, ModRmKind::Digit($digit)),
            opc!(&[Pat::Rm(Width::Quad), Pat::Imm(Width::Byte)], &[], &[0xC1], true, ModRmKind::Digit($digit)),
        ]
    };
}

/// SSE scalar-double xmm, xmm/m64 form with a mandatory prefix.
macro_rules! sse_table {
    ($prefix:expr, $($op:expr),+) => {
        &[opc!(&[Pat::Xmm, Pat::XmmRm], &[$prefix], &[$($op),+], false, ModRmKind::Reg)]
    };
}

// ─── Arithmetic / logic ─────────────────────────────────────────────

/// ADD candidates.
pub static ADD: &[Opcode] = alu_table!(0, 0x00);
/// OR candidates.
pub static OR: &[Opcode] = alu_table!(1, 0x08);
/// AND candidates.
pub static AND: &[Opcode] = alu_table!(4, 0x20);
/// SUB candidates.
pub static SUB: &[Opcode] = alu_table!(5, 0x28);
/// XOR candidates.
pub static XOR: &[Opcode] = alu_table!(6, 0x30);
/// CMP candidates.
pub static CMP: &[Opcode] = alu_table!(7, 0x38);

/// NOT candidates.
pub static NOT: &[Opcode] = unary_table!(2, 0xF6, 0xF7);
/// NEG candidates.
pub static NEG: &[Opcode] = unary_table!(3, 0xF6, 0xF7);
/// MUL (unsigned, rDX:rAX ← rAX × r/m) candidates.
pub static MUL: &[Opcode] = unary_table!(4, 0xF6, 0xF7);
/// DIV (unsigned, rAX ← quotient, rDX ← remainder) candidates.
pub static DIV: &[Opcode] = unary_table!(6, 0xF6, 0xF7);
/// IDIV (signed divide) candidates.
pub static IDIV: &[Opcode] = unary_table!(7, 0xF6, 0xF7);

/// INC candidates.
pub static INC: &[Opcode] = unary_table!(0, 0xFE, 0xFF);
/// DEC candidates.
pub static DEC: &[Opcode] = unary_table!(1, 0xFE, 0xFF);

/// IMUL candidates: two-operand reg ← reg × r/m first, then the one-operand
/// widening form (rDX:rAX ← rAX × r/m).
pub static IMUL: &[Opcode] = &[
    opc!(&[Pat::Reg(Width::Word), Pat::Rm(Width::Word)], &[0x66], &[0x0F, 0xAF], false, ModRmKind::Reg),
    opc!(&[Pat::Reg(Width::Double), Pat::Rm(Width::Double)], &[], &[0x0F, 0xAF], false, ModRmKind::Reg),
    opc!(&[Pat::Reg(Width::Quad), Pat::Rm(Width::Quad)], &[], &[0x0F, 0xAF], true, ModRmKind::Reg),
    opc!(&[Pat::Rm(Width::Byte)], &[], &[0xF6], false, ModRmKind::Digit(5)),
    opc!(&[Pat::Rm(Width::Word)], &[0x66], &[0xF7], false, ModRmKind::Digit(5)),
    opc!(&[Pat::Rm(Width::Double)], &[], &[0xF7], false, ModRmKind::Digit(5)),
    opc!(&[Pat::Rm(Width::Quad)], &[], &[0xF7], true, ModRmKind::Digit(5)),
];

/// SHL candidates.
pub static SHL: &[Opcode] = shift_table!(4);
/// SHR (logical right) candidates.
pub static SHR: &[Opcode] = shift_table!(5);
/// SAR (arithmetic right) candidates.
pub static SAR: &[Opcode] = shift_table!(7);

/// TEST candidates.
pub static TEST: &[Opcode] = &[
    opc!(&[Pat::Acc(Width::Byte), Pat::Imm(Width::Byte)], &[], &[0xA8], false, ModRmKind::None),
    opc!(&[Pat::Acc(Width::Double), Pat::Imm(Width::Double)], &[], &[0xA9], false, ModRmKind::None),
    opc!(&[Pat::Acc(Width::Quad), Pat::ImmSx(Width::Double)], &[], &[0xA9], true, ModRmKind::None),
    opc!(&[Pat::Rm(Width::Byte), Pat::Reg(Width::Byte)], &[], &[0x84], false, ModRmKind::Reg),
    opc!(&[Pat::Rm(Width::Word), Pat::Reg(Width::Word)], &[0x66], &[0x85], false, ModRmKind::Reg),
    opc!(&[Pat::Rm(Width::Double), Pat::Reg(Width::Double)], &[], &[0x85], false, ModRmKind::Reg),
    opc!(&[Pat::Rm(Width::Quad), Pat::Reg(Width::Quad)], &[], &[0x85], true, ModRmKind::Reg),
    opc!(&[Pat::Rm(Width::Byte), Pat::Imm(Width::Byte)], &[], &[0xF6], false, ModRmKind::Digit(0)),
    opc!(&[Pat::Rm(Width::Double), Pat::Imm(Width::Double)], &[], &[0xF7], false, ModRmKind::Digit(0)),
    opc!(&[Pat::Rm(Width::Quad), Pat::ImmSx(Width::Double)], &[], &[0xF7], true, ModRmKind::Digit(0)),
];

// ─── Data movement ──────────────────────────────────────────────────

/// MOV candidates. Opcode+register immediate forms and the imm32
/// sign-extended qword form come before the general C6/C7 forms.
pub static MOV: &[Opcode] = &[
    opc!(&[Pat::PlusReg(Width::Byte), Pat::Imm(Width::Byte)], &[], &[0xB0], false, ModRmKind::None),
    opc!(&[Pat::PlusReg(Width::Word), Pat::Imm(Width::Word)], &[0x66], &[0xB8], false, ModRmKind::None),
    opc!(&[Pat::PlusReg(Width::Double), Pat::Imm(Width::Double)], &[], &[0xB8], false, ModRmKind::None),
    opc!(&[Pat::Rm(Width::Quad), Pat::ImmSx(Width::Double)], &[], &[0xC7], true, ModRmKind::Digit(0)),
    opc!(&[Pat::PlusReg(Width::Quad), Pat::Imm(Width::Quad)], &[], &[0xB8], true, ModRmKind::None),
    opc!(&[Pat::Rm(Width::Byte), Pat::Imm(Width::Byte)], &[], &[0xC6], false, ModRmKind::Digit(0)),
    opc!(&[Pat::Rm(Width::Word), Pat::Imm(Width::Word)], &[0x66], &[0xC7], false, ModRmKind::Digit(0)),
    opc!(&[Pat::Rm(Width::Double), Pat::Imm(Width::Double)], &[], &[0xC7], false, ModRmKind::Digit(0)),
    opc!(&[Pat::Rm(Width::Byte), Pat::Reg(Width::Byte)], &[], &[0x88], false, ModRmKind::Reg),
    opc!(&[Pat::Rm(Width::Word), Pat::Reg(Width::Word)], &[0x66], &[0x89], false, ModRmKind::Reg),
    opc!(&[Pat::Rm(Width::Double), Pat::Reg(Width::Double)], &[], &[0x89], false, ModRmKind::Reg),
    opc!(&[Pat::Rm(Width::Quad), Pat::Reg(Width::Quad)], &[], &[0x89], true, ModRmKind::Reg),
    opc!(&[Pat::Reg(Width::Byte), Pat::Rm(Width::Byte)], &[], &[0x8A], false, ModRmKind::Reg),
    opc!(&[Pat::Reg(Width::Word), Pat::Rm(Width::Word)], &[0x66], &[0x8B], false, ModRmKind::Reg),
    opc!(&[Pat::Reg(Width::Double), Pat::Rm(Width::Double)], &[], &[0x8B], false, ModRmKind::Reg),
    opc!(&[Pat::Reg(Width::Quad), Pat::Rm(Width::Quad)], &[], &[0x8B], true, ModRmKind::Reg),
];

/// MOVZX candidates (zero-extend).
pub static MOVZX: &[Opcode] = &[
    opc!(&[Pat::Reg(Width::Word), Pat::Rm(Width::Byte)], &[0x66], &[0x0F, 0xB6], false, ModRmKind::Reg),
    opc!(&[Pat::Reg(Width::Double), Pat::Rm(Width::Byte)], &[], &[0x0F, 0xB6], false, ModRmKind::Reg),
    opc!(&[Pat::Reg(Width::Quad), Pat::Rm(Width::Byte)], &[], &[0x0F, 0xB6], true, ModRmKind::Reg),
    opc!(&[Pat::Reg(Width::Double), Pat::Rm(Width::Word)], &[], &[0x0F, 0xB7], false, ModRmKind::Reg),
    opc!(&[Pat::Reg(Width::Quad), Pat::Rm(Width::Word)], &[], &[0x0F, 0xB7], true, ModRmKind::Reg),
];

/// MOVSX candidates (sign-extend), including MOVSXD for dword sources.
pub static MOVSX: &[Opcode] = &[
    opc!(&[Pat::Reg(Width::Word), Pat::Rm(Width::Byte)], &[0x66], &[0x0F, 0xBE], false, ModRmKind::Reg),
    opc!(&[Pat::Reg(Width::Double), Pat::Rm(Width::Byte)], &[], &[0x0F, 0xBE], false, ModRmKind::Reg),
    opc!(&[Pat::Reg(Width::Quad), Pat::Rm(Width::Byte)], &[], &[0x0F, 0xBE], true, ModRmKind::Reg),
    opc!(&[Pat::Reg(Width::Double), Pat::Rm(Width::Word)], &[], &[0x0F, 0xBF], false, ModRmKind::Reg),
    opc!(&[Pat::Reg(Width::Quad), Pat::Rm(Width::Word)], &[], &[0x0F, 0xBF], true, ModRmKind::Reg),
    opc!(&[Pat::Reg(Width::Quad), Pat::Rm(Width::Double)], &[], &[0x63], true, ModRmKind::Reg),
];

/// LEA candidates.
pub static LEA: &[Opcode] = &[
    opc!(&[Pat::Reg(Width::Double), Pat::Mem], &[], &[0x8D], false, ModRmKind::Reg),
    opc!(&[Pat::Reg(Width::Quad), Pat::Mem], &[], &[0x8D], true, ModRmKind::Reg),
];

/// PUSH candidates. 64-bit operand size is the default; no REX.W.
pub static PUSH: &[Opcode] = &[
    opc!(&[Pat::PlusReg(Width::Quad)], &[], &[0x50], false, ModRmKind::None),
    opc!(&[Pat::ImmSx(Width::Byte)], &[], &[0x6A], false, ModRmKind::None),
    opc!(&[Pat::ImmSx(Width::Double)], &[], &[0x68], false, ModRmKind::None),
    opc!(&[Pat::Rm(Width::Quad)], &[], &[0xFF], false, ModRmKind::Digit(6)),
];

/// POP candidates.
pub static POP: &[Opcode] = &[
    opc!(&[Pat::PlusReg(Width::Quad)], &[], &[0x58], false, ModRmKind::None),
    opc!(&[Pat::Rm(Width::Quad)], &[], &[0x8F], false, ModRmKind::Digit(0)),
];

// ─── Control flow ───────────────────────────────────────────────────

/// JMP candidates.
pub static JMP: &[Opcode] = &[
    opc!(&[Pat::Rel32], &[], &[0xE9], false, ModRmKind::None),
    opc!(&[Pat::Rm(Width::Quad)], &[], &[0xFF], false, ModRmKind::Digit(4)),
];

/// CALL candidates.
pub static CALL: &[Opcode] = &[
    opc!(&[Pat::Rel32], &[], &[0xE8], false, ModRmKind::None),
    opc!(&[Pat::Rm(Width::Quad)], &[], &[0xFF], false, ModRmKind::Digit(2)),
];

macro_rules! jcc_table {
    ($cc:expr) => {
        &[opc!(&[Pat::Rel32], &[], &[0x0F, 0x80 + $cc], false, ModRmKind::None)]
    };
}

macro_rules! setcc_table {
    ($cc:expr) => {
        &[opc!(&[Pat::Rm(Width::Byte)], &[], &[0x0F, 0x90 + $cc], false, ModRmKind::Digit(0))]
    };
}

/// JE / JZ.
pub static JE: &[Opcode] = jcc_table!(0x4);
/// JNE / JNZ.
pub static JNE: &[Opcode] = jcc_table!(0x5);
/// JB (unsigned <).
pub static JB: &[Opcode] = jcc_table!(0x2);
/// JBE (unsigned <=).
pub static JBE: &[Opcode] = jcc_table!(0x6);
/// JA (unsigned >).
pub static JA: &[Opcode] = jcc_table!(0x7);
/// JAE (unsigned >=).
pub static JAE: &[Opcode] = jcc_table!(0x3);
/// JL (signed <).
pub static JL: &[Opcode] = jcc_table!(0xC);
/// JLE (signed <=).
pub static JLE: &[Opcode] = jcc_table!(0xE);
/// JG (signed >).
pub static JG: &[Opcode] = jcc_table!(0xF);
/// JGE (signed >=).
pub static JGE: &[Opcode] = jcc_table!(0xD);

/// SETE.
pub static SETE: &[Opcode] = setcc_table!(0x4);
/// SETNE.
pub static SETNE: &[Opcode] = setcc_table!(0x5);
/// SETB (unsigned <).
pub static SETB: &[Opcode] = setcc_table!(0x2);
/// SETBE (unsigned <=).
pub static SETBE: &[Opcode] = setcc_table!(0x6);
/// SETA (unsigned >).
pub static SETA: &[Opcode] = setcc_table!(0x7);
/// SETAE (unsigned >=).
pub static SETAE: &[Opcode] = setcc_table!(0x3);
/// SETL (signed <).
pub static SETL: &[Opcode] = setcc_table!(0xC);
/// SETLE (signed <=).
pub static SETLE: &[Opcode] = setcc_table!(0xE);
/// SETG (signed >).
pub static SETG: &[Opcode] = setcc_table!(0xF);
/// SETGE (signed >=).
pub static SETGE: &[Opcode] = setcc_table!(0xD);

// ─── SSE2 scalar double ─────────────────────────────────────────────

/// MOVSD candidates: load form (0F 10) before store form (0F 11).
pub static MOVSD: &[Opcode] = &[
    opc!(&[Pat::Xmm, Pat::XmmRm], &[0xF2], &[0x0F, 0x10], false, ModRmKind::Reg),
    opc!(&[Pat::XmmRm, Pat::Xmm], &[0xF2], &[0x0F, 0x11], false, ModRmKind::Reg),
];

/// MOVQ candidates: xmm ← r/m64 (0F 6E) and r/m64 ← xmm (0F 7E).
pub static MOVQ: &[Opcode] = &[
    opc!(&[Pat::Xmm, Pat::Rm(Width::Quad)], &[0x66], &[0x0F, 0x6E], true, ModRmKind::Reg),
    opc!(&[Pat::Rm(Width::Quad), Pat::Xmm], &[0x66], &[0x0F, 0x7E], true, ModRmKind::Reg),
];

/// ADDSD candidates.
pub static ADDSD: &[Opcode] = sse_table!(0xF2, 0x0F, 0x58);
/// SUBSD candidates.
pub static SUBSD: &[Opcode] = sse_table!(0xF2, 0x0F, 0x5C);
/// MULSD candidates.
pub static MULSD: &[Opcode] = sse_table!(0xF2, 0x0F, 0x59);
/// DIVSD candidates.
pub static DIVSD: &[Opcode] = sse_table!(0xF2, 0x0F, 0x5E);
/// UCOMISD candidates.
pub static UCOMISD: &[Opcode] = sse_table!(0x66, 0x0F, 0x2E);
/// XORPS candidates (xmm zeroing idiom).
pub static XORPS: &[Opcode] =
    &[opc!(&[Pat::Xmm, Pat::XmmRm], &[], &[0x0F, 0x57], false, ModRmKind::Reg)];

/// CVTSI2SD candidates (signed integer → scalar double).
pub static CVTSI2SD: &[Opcode] = &[
    opc!(&[Pat::Xmm, Pat::Rm(Width::Double)], &[0xF2], &[0x0F, 0x2A], false, ModRmKind::Reg),
    opc!(&[Pat::Xmm, Pat::Rm(Width::Quad)], &[0xF2], &[0x0F, 0x2A], true, ModRmKind::Reg),
];

/// CVTTSD2SI candidates (scalar double → signed integer, truncating).
pub static CVTTSD2SI: &[Opcode] = &[
    opc!(&[Pat::Reg(Width::Double), Pat::XmmRm], &[0xF2], &[0x0F, 0x2C], false, ModRmKind::Reg),
    opc!(&[Pat::Reg(Width::Quad), Pat::XmmRm], &[0xF2], &[0x0F, 0x2C], true, ModRmKind::Reg),
];

// ─── Implicit register metadata ─────────────────────────────────────

/// Implicit GP registers read or written by instructions whose operand
/// list does not name them. The lowering consults this one table when
/// steering the allocator and deciding what to preserve, instead of
/// replicating the knowledge per emitter.
#[derive(Debug, Clone, Copy)]
pub struct ImplicitRegs {
    /// GP indices read (the rDX:rAX dividend pair, CL shift counts).
    pub reads: &'static [u8],
    /// GP indices written (quotient/remainder, widened products,
    /// sign-extension results).
    pub writes: &'static [u8],
}

/// Implicit register set for a mnemonic. Mnemonics without implicit
/// operands report empty sets.
pub fn implicit_gp_regs(mnemonic: &str) -> ImplicitRegs {
    match mnemonic {
        // rDX:rAX dividend; quotient in rAX, remainder in rDX (AH for the
        // byte forms, which share index 0).
        "div" | "idiv" => ImplicitRegs {
            reads: &[0, 2],
            writes: &[0, 2],
        },
        // Widening multiplies: rDX:rAX ← rAX × r/m.
        "mul" => ImplicitRegs {
            reads: &[0],
            writes: &[0, 2],
        },
        "cbw" => ImplicitRegs {
            reads: &[0],
            writes: &[0],
        },
        "cwd" | "cdq" | "cqo" => ImplicitRegs {
            reads: &[0],
            writes: &[0, 2],
        },
        // Shift counts live in CL.
        "shl" | "shr" | "sar" => ImplicitRegs {
            reads: &[1],
            writes: &[],
        },
        _ => ImplicitRegs {
            reads: &[],
            writes: &[],
        },
    }
}

// ─── Fixed-encoding (zero-operand) instructions ─────────────────────

/// Fixed-encoding table, sorted by mnemonic for binary search.
pub static FIXED: &[(&str, &[u8])] = &[
    ("cbw", &[0x66, 0x98]),
    ("cdq", &[0x99]),
    ("cdqe", &[0x48, 0x98]),
    ("cqo", &[0x48, 0x99]),
    ("cwd", &[0x66, 0x99]),
    ("leave", &[0xC9]),
    ("nop", &[0x90]),
    ("pushfq", &[0x9C]),
    ("ret", &[0xC3]),
    ("syscall", &[0x0F, 0x05]),
];

/// Look up a fixed-encoding instruction by mnemonic.
pub fn lookup_fixed(mnemonic: &str) -> Option<&'static [u8]> {
    FIXED
        .binary_search_by_key(&mnemonic, |&(m, _)| m)
        .ok()
        .map(|idx| FIXED[idx].1)
}
