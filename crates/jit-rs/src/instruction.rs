//! Instruction objects and the machine-code encoder.
//!
//! An [`Instruction`] is a mnemonic plus a resolved operand tuple. At encode
//! time it scans its opcode table in declared order, caches the first
//! accepting candidate, and assembles bytes in the fixed x86-64 order:
//! mandatory prefixes, REX, opcode, ModR/M, SIB, displacement, immediate.

use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::Cell;
use core::fmt;

use crate::error::JitError;
use crate::opcode::{self, ModRmKind, Opcode, Pat};
use crate::operand::{Immediate, MemoryAddress, Operand, Width};

/// Fixed-capacity buffer for one instruction's bytes.
///
/// x86-64 instructions are at most 15 bytes; 16 keeps the arithmetic round.
#[derive(Clone, Copy)]
pub struct InstrBytes {
    data: [u8; 16],
    len: u8,
}

impl InstrBytes {
    /// An empty buffer.
    pub const fn new() -> Self {
        Self {
            data: [0; 16],
            len: 0,
        }
    }

    /// Append a single byte.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is already full.
    #[inline]
    pub fn push(&mut self, byte: u8) {
        assert!(
            (self.len as usize) < 16,
            "InstrBytes overflow: cannot push beyond 16 bytes"
        );
        self.data[self.len as usize] = byte;
        self.len += 1;
    }

    /// Append a slice of bytes.
    ///
    /// # Panics
    ///
    /// Panics if appending would exceed the capacity.
    #[inline]
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        let start = self.len as usize;
        let end = start + bytes.len();
        assert!(end <= 16, "InstrBytes overflow: {} bytes", end);
        self.data[start..end].copy_from_slice(bytes);
        self.len = end as u8;
    }

    /// Number of bytes in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Convert to a heap-allocated `Vec<u8>`.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_ref().to_vec()
    }
}

impl Default for InstrBytes {
    fn default() -> Self {
        Self::new()
    }
}

impl core::ops::Deref for InstrBytes {
    type Target = [u8];
    #[inline]
    fn deref(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

impl AsRef<[u8]> for InstrBytes {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl fmt::Debug for InstrBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl PartialEq for InstrBytes {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl Eq for InstrBytes {}

impl PartialEq<[u8]> for InstrBytes {
    fn eq(&self, other: &[u8]) -> bool {
        **self == *other
    }
}

impl<const N: usize> PartialEq<[u8; N]> for InstrBytes {
    fn eq(&self, other: &[u8; N]) -> bool {
        **self == other[..]
    }
}

// ─── Relocations ────────────────────────────────────────────────────

/// How the host patches a label address into the emitted bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocKind {
    /// RIP-relative: a signed 32-bit displacement written at `offset`,
    /// relative to the end of the instruction.
    Relative,
    /// Absolute: the label's address written as 8 little-endian bytes.
    Absolute,
}

/// A relocation record for a label reference.
#[derive(Debug, Clone)]
pub struct Relocation {
    /// Byte offset of the patch field, within the instruction at encode
    /// time and within the code buffer after serialization.
    pub offset: usize,
    /// Size of the patch field in bytes.
    pub size: u8,
    /// The referenced label. `Rc<str>` so propagation into the serialized
    /// image is a refcount bump, not a heap copy.
    pub label: Rc<str>,
    /// Patch style.
    pub kind: RelocKind,
    /// Constant addend applied to the label address.
    pub addend: i64,
    /// Instruction bytes that follow the patch field (a trailing immediate).
    /// RIP is the address after the *entire* instruction, so the patcher
    /// computes `rip = field_addr + size + trailing_bytes`.
    pub trailing_bytes: u8,
}

/// Result of encoding a single instruction.
#[derive(Debug, Clone)]
pub struct EncodedInstr {
    /// The machine-code bytes.
    pub bytes: InstrBytes,
    /// Label reference to patch, if the instruction has one.
    pub relocation: Option<Relocation>,
}

// ─── Byte-level helpers ─────────────────────────────────────────────

/// Build a REX prefix byte.
#[inline]
fn rex(w: bool, r: bool, x: bool, b: bool) -> u8 {
    let mut val: u8 = 0x40;
    if w {
        val |= 0x08;
    }
    if r {
        val |= 0x04;
    }
    if x {
        val |= 0x02;
    }
    if b {
        val |= 0x01;
    }
    val
}

/// Build a ModR/M byte.
#[inline]
fn modrm(mod_: u8, reg: u8, rm: u8) -> u8 {
    (mod_ << 6) | ((reg & 7) << 3) | (rm & 7)
}

/// Build a SIB byte.
#[inline]
fn sib(scale: u8, index: u8, base: u8) -> u8 {
    let ss = match scale {
        1 => 0,
        2 => 1,
        4 => 2,
        8 => 3,
        _ => 0,
    };
    (ss << 6) | ((index & 7) << 3) | (base & 7)
}

/// Emit ModR/M + SIB + displacement for a memory operand.
fn emit_mem_modrm(buf: &mut InstrBytes, reg_field: u8, mem: &MemoryAddress) {
    match (mem.base, mem.index) {
        // Absolute address: [disp32] needs a SIB in 64-bit mode.
        (None, None) => {
            buf.push(modrm(0b00, reg_field, 0b100));
            buf.push(sib(1, 0b100, 0b101));
            buf.extend_from_slice(&mem.disp.to_le_bytes());
        }
        // Index only: mod=00 with SIB base=101 means "no base, disp32".
        (None, Some(idx)) => {
            buf.push(modrm(0b00, reg_field, 0b100));
            buf.push(sib(mem.scale, idx.base_code(), 0b101));
            buf.extend_from_slice(&mem.disp.to_le_bytes());
        }
        (Some(base), index) => {
            let need_sib = index.is_some() || base.base_code() == 4 || mem.scale != 1;
            // mod=00 with base code 5 would mean RIP/disp32, so RBP/R13
            // always carry at least a disp8.
            let (mod_bits, disp_size) = if mem.disp == 0 && base.base_code() != 5 {
                (0b00, 0)
            } else if (-128..=127).contains(&mem.disp) {
                (0b01, 1)
            } else {
                (0b10, 4)
            };

            if need_sib {
                let idx_code = index.map_or(0b100, |r| r.base_code());
                buf.push(modrm(mod_bits, reg_field, 0b100));
                buf.push(sib(mem.scale, idx_code, base.base_code()));
            } else {
                buf.push(modrm(mod_bits, reg_field, base.base_code()));
            }

            match disp_size {
                1 => buf.push(mem.disp as i8 as u8),
                4 => buf.extend_from_slice(&mem.disp.to_le_bytes()),
                _ => {}
            }
        }
    }
}

// ─── Instruction ────────────────────────────────────────────────────

/// A symbolic instruction: mnemonic plus resolved operand tuple.
///
/// Immutable after construction. The opcode-table candidate is resolved
/// lazily and cached on first match.
#[derive(Debug, Clone)]
pub struct Instruction {
    mnemonic: &'static str,
    operands: Vec<Operand>,
    table: &'static [Opcode],
    matched: Cell<Option<usize>>,
}

impl Instruction {
    /// An instruction over the given opcode table.
    pub fn new(mnemonic: &'static str, table: &'static [Opcode], operands: Vec<Operand>) -> Self {
        Self {
            mnemonic,
            operands,
            table,
            matched: Cell::new(None),
        }
    }

    /// A zero-operand instruction resolved through the fixed-encoding table.
    pub fn fixed(mnemonic: &'static str) -> Self {
        Self::new(mnemonic, &[], Vec::new())
    }

    /// The instruction mnemonic.
    pub fn mnemonic(&self) -> &'static str {
        self.mnemonic
    }

    /// The operand tuple.
    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    fn render_operands(&self) -> String {
        let mut out = String::new();
        for (i, op) in self.operands.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&format!("{}", op));
        }
        out
    }

    /// Resolve (and cache) the first accepting candidate.
    fn matched_candidate(&self) -> Result<&'static Opcode, JitError> {
        if let Some(i) = self.matched.get() {
            return Ok(&self.table[i]);
        }
        for (i, candidate) in self.table.iter().enumerate() {
            if candidate.accepts(&self.operands) {
                self.matched.set(Some(i));
                return Ok(&self.table[i]);
            }
        }
        Err(JitError::NoMatchingOpcode {
            mnemonic: self.mnemonic.into(),
            operands: self.render_operands(),
        })
    }

    fn validate_memory(&self, mem: &MemoryAddress) -> Result<(), JitError> {
        if !matches!(mem.scale, 1 | 2 | 4 | 8) {
            return Err(JitError::InvalidMemoryOperand {
                mnemonic: self.mnemonic.into(),
                detail: format!("scale {} not in {{1, 2, 4, 8}}", mem.scale),
            });
        }
        if let Some(idx) = mem.index {
            if idx.index == 4 {
                return Err(JitError::InvalidMemoryOperand {
                    mnemonic: self.mnemonic.into(),
                    detail: "rsp cannot be an index register".into(),
                });
            }
        }
        for reg in [mem.base, mem.index].into_iter().flatten() {
            if reg.width != Width::Quad || reg.is_float() {
                return Err(JitError::InvalidMemoryOperand {
                    mnemonic: self.mnemonic.into(),
                    detail: format!("address register '{}' is not a 64-bit GP register", reg),
                });
            }
        }
        Ok(())
    }

    /// Encode this instruction to bytes.
    pub fn encode(&self) -> Result<EncodedInstr, JitError> {
        let mut buf = InstrBytes::new();

        // Zero-operand instructions: fixed-encoding table.
        if self.table.is_empty() {
            match opcode::lookup_fixed(self.mnemonic) {
                Some(bytes) if self.operands.is_empty() => {
                    buf.extend_from_slice(bytes);
                    return Ok(EncodedInstr {
                        bytes: buf,
                        relocation: None,
                    });
                }
                _ => {
                    return Err(JitError::NoMatchingOpcode {
                        mnemonic: self.mnemonic.into(),
                        operands: self.render_operands(),
                    })
                }
            }
        }

        let candidate = self.matched_candidate()?;
        let mut relocation: Option<Relocation> = None;

        // Classify operands into encoding roles.
        let mut reg_op: Option<&Operand> = None;
        let mut rm_op: Option<&Operand> = None;
        let mut plus_reg: Option<crate::operand::Register> = None;
        let mut imm: Option<(Immediate, Width)> = None;
        let mut rel_label: Option<&str> = None;

        for (pat, op) in candidate.pattern.iter().zip(self.operands.iter()) {
            match pat {
                Pat::Reg(_) | Pat::Xmm => reg_op = Some(op),
                Pat::Rm(_) | Pat::XmmRm | Pat::Mem => rm_op = Some(op),
                Pat::PlusReg(_) => plus_reg = op.as_register(),
                Pat::Imm(w) | Pat::ImmSx(w) => {
                    if let Operand::Immediate(i) = op {
                        imm = Some((*i, *w));
                    }
                }
                Pat::Acc(_) | Pat::Fixed(..) => {}
                Pat::Rel32 => {
                    if let Operand::Label(name) = op {
                        rel_label = Some(name.as_str());
                    }
                }
            }
        }

        if let Some(Operand::Memory(mem)) = rm_op {
            self.validate_memory(mem)?;
        }

        // Mandatory prefixes (0x66 / 0xF2 / 0xF3) before REX.
        buf.extend_from_slice(candidate.prefixes);

        // REX.
        let w = candidate.rex_w;
        let r = reg_op
            .and_then(|op| op.as_register())
            .is_some_and(|reg| reg.is_extended());
        let (x, b_rm) = match rm_op {
            Some(Operand::Register(reg)) => (false, reg.is_extended()),
            Some(Operand::Memory(mem)) => (
                mem.index.is_some_and(|i| i.is_extended()),
                mem.base.is_some_and(|bb| bb.is_extended()),
            ),
            _ => (false, false),
        };
        let b = b_rm || plus_reg.is_some_and(|reg| reg.is_extended());
        let byte_rex = self.operands.iter().any(|op| {
            matches!(op, Operand::Register(reg) if reg.requires_rex_for_byte())
        });
        if w || r || x || b || byte_rex {
            buf.push(rex(w, r, x, b));
        }

        // Opcode bytes; opcode+register forms fold the register into the
        // low 3 bits of the last byte.
        match plus_reg {
            Some(reg) => {
                let (last, rest) = match candidate.opcode.split_last() {
                    Some(pair) => pair,
                    None => (&0u8, &[][..]),
                };
                buf.extend_from_slice(rest);
                buf.push(last + reg.base_code());
            }
            None => buf.extend_from_slice(candidate.opcode),
        }

        // ModR/M, SIB, displacement.
        if !matches!(candidate.modrm, ModRmKind::None) {
            let reg_field = match candidate.modrm {
                ModRmKind::Digit(d) => d,
                _ => reg_op
                    .and_then(|op| op.as_register())
                    .map_or(0, |reg| reg.base_code()),
            };
            match rm_op {
                Some(Operand::Register(reg)) => {
                    buf.push(modrm(0b11, reg_field, reg.base_code()));
                }
                Some(Operand::Memory(mem)) => emit_mem_modrm(&mut buf, reg_field, mem),
                Some(Operand::RipRelative(rip)) => {
                    buf.push(modrm(0b00, reg_field, 0b101));
                    relocation = Some(Relocation {
                        offset: buf.len(),
                        size: 4,
                        label: Rc::from(&*rip.label),
                        kind: RelocKind::Relative,
                        addend: rip.addend,
                        trailing_bytes: 0,
                    });
                    buf.extend_from_slice(&[0, 0, 0, 0]);
                }
                _ => {}
            }
        }

        // Immediate.
        if let Some((value, enc_width)) = imm {
            if !value.fits(enc_width) {
                return Err(JitError::EncodingOverflow {
                    mnemonic: self.mnemonic.into(),
                    value: value.value,
                    width: enc_width,
                });
            }
            let bytes = value.value.to_le_bytes();
            buf.extend_from_slice(&bytes[..enc_width.bytes() as usize]);
        }

        // rel32 label placeholder.
        if let Some(label) = rel_label {
            relocation = Some(Relocation {
                offset: buf.len(),
                size: 4,
                label: Rc::from(label),
                kind: RelocKind::Relative,
                addend: 0,
                trailing_bytes: 0,
            });
            buf.extend_from_slice(&[0, 0, 0, 0]);
        }

        // A trailing immediate shifts the RIP the patcher must use.
        if let Some(reloc) = &mut relocation {
            reloc.trailing_bytes = (buf.len() - (reloc.offset + reloc.size as usize)) as u8;
        }

        Ok(EncodedInstr {
            bytes: buf,
            relocation,
        })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic)?;
        for (i, op) in self.operands.iter().enumerate() {
            if i == 0 {
                write!(f, " {}", op)?;
            } else {
                write!(f, ", {}", op)?;
            }
        }
        Ok(())
    }
}
