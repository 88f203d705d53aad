//! Compiler driver: SSA flattening, lowering, and byte serialization.
//!
//! The [`Compiler`] builder owns the IR context for one compilation. Each
//! `lower` call flattens an expression, emits its rewrites and root into the
//! instruction sink, and `finish` serializes the sink to bytes, resolving
//! RIP-relative data references against the configured base addresses. The
//! host places both regions, re-patching via the relocation records if it
//! moves them.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use log::debug;

use crate::asm;
use crate::context::IrContext;
use crate::error::JitError;
use crate::instruction::{Instruction, RelocKind};
use crate::ir::{Expr, SsaNames};
use crate::operand::{Operand, RegClass, Register, Width};

/// A relocation in the serialized image.
///
/// `resolved` records whether `finish` already patched the site against the
/// data section; unresolved records (external call targets) are left zeroed
/// for the host.
#[derive(Debug, Clone)]
pub struct AppliedRelocation {
    /// Byte offset of the patch field within the code buffer.
    pub offset: usize,
    /// Size of the patch field in bytes.
    pub size: u8,
    /// The referenced label.
    pub label: String,
    /// Patch style.
    pub kind: RelocKind,
    /// Constant addend applied to the label address.
    pub addend: i64,
    /// Bytes between the patch field and the end of the instruction.
    pub trailing_bytes: u8,
    /// Whether the site was patched during serialization.
    pub resolved: bool,
}

/// Output of a compilation: position-dependent code, the data section, the
/// label map, and relocation records.
#[derive(Debug, Clone)]
pub struct CompiledImage {
    code: Vec<u8>,
    data: Vec<u8>,
    code_base: u64,
    data_base: u64,
    labels: BTreeMap<String, u64>,
    relocations: Vec<AppliedRelocation>,
}

impl CompiledImage {
    /// The compiled machine code.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Consume the image, returning the code bytes.
    pub fn into_code(self) -> Vec<u8> {
        self.code
    }

    /// The data section bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Base address the code was encoded for.
    pub fn code_base(&self) -> u64 {
        self.code_base
    }

    /// Base address the data section was encoded for.
    pub fn data_base(&self) -> u64 {
        self.data_base
    }

    /// Label → absolute address map (data-section labels).
    pub fn labels(&self) -> &BTreeMap<String, u64> {
        &self.labels
    }

    /// Absolute address of a label, if defined.
    pub fn label_address(&self, name: &str) -> Option<u64> {
        self.labels.get(name).copied()
    }

    /// All relocation sites, resolved and unresolved.
    pub fn relocations(&self) -> &[AppliedRelocation] {
        &self.relocations
    }
}

/// Builder-style compiler for one compilation unit.
#[derive(Debug, Default)]
pub struct Compiler {
    ctx: IrContext,
    names: SsaNames,
    code_base: u64,
    data_base: Option<u64>,
}

impl Compiler {
    /// A fresh compiler: empty context, bases at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the address the code region will be placed at.
    pub fn code_base(&mut self, addr: u64) -> &mut Self {
        self.code_base = addr;
        self
    }

    /// Set the address the data region will be placed at. Defaults to the
    /// 8-byte-aligned end of the code region.
    pub fn data_base(&mut self, addr: u64) -> &mut Self {
        self.data_base = Some(addr);
        self
    }

    /// Allow SSA temporaries to spill to `[rbp - N]` frame slots when the
    /// register file runs dry.
    pub fn enable_spill(&mut self) -> &mut Self {
        self.ctx.set_spill_enabled(true);
        self
    }

    /// Pre-bind a variable to an ABI-imposed register home.
    pub fn bind(&mut self, name: &str, reg: Register) -> &mut Self {
        self.ctx.bind(name, Operand::Register(reg));
        self
    }

    /// Direct access to the IR context.
    pub fn context(&mut self) -> &mut IrContext {
        &mut self.ctx
    }

    /// Append a raw instruction to the sink.
    pub fn emit(&mut self, instr: Instruction) -> &mut Self {
        self.ctx.emit(instr);
        self
    }

    /// Flatten `expr`, lower its rewrites and root, and leave the result in
    /// `target`. SSA temporaries are released when the expression is done.
    pub fn lower(
        &mut self,
        expr: &Expr,
        target: impl Into<Operand>,
    ) -> Result<&mut Self, JitError> {
        let target = target.into();
        let mark = self.ctx.sink_len();
        let (rewrites, root) = expr.ssa_transform(&mut self.names);

        // With spilling on, temporaries move to frame slots before the
        // register file is completely dry: emitters lowering into a memory
        // home still need scratch registers of their own.
        const SPILL_HEADROOM: u32 = 2;

        let mut temporaries = Vec::with_capacity(rewrites.len());
        for rewrite in &rewrites {
            let ty = rewrite.expr.result_type();
            let class = ty.reg_class();
            let prefer_spill = class == RegClass::General
                && self.ctx.spill_enabled()
                && self.ctx.gp_free_count() <= SPILL_HEADROOM;
            let home = if prefer_spill {
                Operand::Memory(self.ctx.spill_slot(ty.width())?)
            } else {
                match self.ctx.reserve(class, ty.width()) {
                    Ok(reg) => Operand::Register(reg),
                    Err(JitError::AllocationExhausted { .. }) if self.ctx.spill_enabled() => {
                        Operand::Memory(self.ctx.spill_slot(ty.width())?)
                    }
                    Err(err) => return Err(err),
                }
            };
            rewrite.expr.encode(&mut self.ctx, &home)?;
            self.ctx.bind(rewrite.var.clone(), home);
            temporaries.push(rewrite.var.clone());
        }
        root.encode(&mut self.ctx, &target)?;

        for name in temporaries {
            if let Some(Operand::Register(reg)) = self.ctx.unbind(&name) {
                self.ctx.release(reg);
            }
        }
        debug!(
            "lowered {} into {} ({} instructions)",
            expr,
            target,
            self.ctx.sink_len() - mark
        );
        Ok(self)
    }

    /// Serialize the instruction sink: encode in emission order, lay out the
    /// data section, resolve data-label references, and collect relocations.
    pub fn finish(mut self) -> Result<CompiledImage, JitError> {
        let instructions = self.ctx.take_sink();
        let mut code = Vec::new();
        let mut pending = Vec::new();
        for instr in &instructions {
            let encoded = instr.encode()?;
            if let Some(mut reloc) = encoded.relocation {
                reloc.offset += code.len();
                pending.push(reloc);
            }
            code.extend_from_slice(&encoded.bytes);
        }

        let code_base = self.code_base;
        let data_base = self
            .data_base
            .unwrap_or_else(|| code_base + ((code.len() as u64 + 7) & !7));

        let mut labels = BTreeMap::new();
        for (name, offset) in self.ctx.data().labels() {
            labels.insert(name.clone(), data_base + *offset as u64);
        }

        let mut relocations = Vec::with_capacity(pending.len());
        for reloc in pending {
            let resolved = match labels.get(&*reloc.label) {
                Some(&addr) => {
                    let target = addr as i64 + reloc.addend;
                    match reloc.kind {
                        RelocKind::Relative => {
                            let rip = code_base as i64
                                + reloc.offset as i64
                                + i64::from(reloc.size)
                                + i64::from(reloc.trailing_bytes);
                            let disp = target - rip;
                            if i32::try_from(disp).is_err() {
                                return Err(JitError::EncodingOverflow {
                                    mnemonic: reloc.label.to_string(),
                                    value: disp as i128,
                                    width: Width::Double,
                                });
                            }
                            code[reloc.offset..reloc.offset + 4]
                                .copy_from_slice(&(disp as i32).to_le_bytes());
                        }
                        RelocKind::Absolute => {
                            code[reloc.offset..reloc.offset + 8]
                                .copy_from_slice(&(target as u64).to_le_bytes());
                        }
                    }
                    true
                }
                None => false,
            };
            relocations.push(AppliedRelocation {
                offset: reloc.offset,
                size: reloc.size,
                label: reloc.label.to_string(),
                kind: reloc.kind,
                addend: reloc.addend,
                trailing_bytes: reloc.trailing_bytes,
                resolved,
            });
        }

        debug!(
            "serialized {} instructions into {} code bytes, {} data bytes",
            instructions.len(),
            code.len(),
            self.ctx.data().len()
        );

        Ok(CompiledImage {
            code,
            data: self.ctx.data().bytes().to_vec(),
            code_base,
            data_base,
            labels,
            relocations,
        })
    }
}

/// One-shot compile: lower `expr` into the ABI return register (rAX, or
/// XMM0 for floats), append `ret`, and serialize.
pub fn compile(expr: &Expr) -> Result<CompiledImage, JitError> {
    let mut compiler = Compiler::new();
    let ty = expr.result_type();
    let target = if ty.is_float() {
        compiler.context().mark_occupied(RegClass::Float, 0);
        Register::xmm(0)
    } else {
        compiler.context().mark_occupied(RegClass::General, 0);
        Register::gp(0, ty.width())
    };
    compiler.lower(expr, target)?;
    compiler.emit(asm::ret());
    compiler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrType;
    use alloc::boxed::Box;

    fn add_u32(a: Expr, b: Expr) -> Expr {
        Expr::Add(Box::new(a), Box::new(b))
    }

    #[test]
    fn compile_literal_sum() {
        let expr = add_u32(Expr::int(IrType::U32, 2), Expr::int(IrType::U32, 3));
        let image = compile(&expr).unwrap();
        // mov eax, 2; add eax, 3; ret
        assert_eq!(
            image.code(),
            [0xB8, 0x02, 0x00, 0x00, 0x00, 0x83, 0xC0, 0x03, 0xC3]
        );
        assert!(image.data().is_empty());
        assert!(image.relocations().is_empty());
    }

    #[test]
    fn compile_float_resolves_rip_relative() {
        let expr = Expr::Float(1.5);
        let image = compile(&expr).unwrap();
        // movsd xmm0, [rip+disp32]; ret — the disp points at the interned
        // constant in the data region placed right after the code.
        assert_eq!(image.code().len(), 9);
        assert_eq!(&image.code()[..4], &[0xF2, 0x0F, 0x10, 0x05]);
        assert_eq!(image.code()[8], 0xC3);
        assert_eq!(image.data(), 1.5f64.to_le_bytes());

        let reloc = &image.relocations()[0];
        assert!(reloc.resolved);
        assert_eq!(reloc.offset, 4);

        // disp = data_base - (code_base + end of the movsd instruction)
        let disp = i32::from_le_bytes(image.code()[4..8].try_into().unwrap());
        let rip = image.code_base() as i64 + 8;
        assert_eq!(
            image.data_base() as i64,
            rip + i64::from(disp)
        );
        assert_eq!(image.label_address("__f64_0"), Some(image.data_base()));
    }

    #[test]
    fn external_call_relocation_stays_unresolved() {
        let expr = Expr::Call {
            function: "extern_fn".into(),
            args: alloc::vec![],
            ty: IrType::U64,
        };
        let image = compile(&expr).unwrap();
        let reloc = &image.relocations()[0];
        assert!(!reloc.resolved);
        assert_eq!(reloc.label, "extern_fn");
        assert_eq!(reloc.kind, RelocKind::Relative);
    }

    #[test]
    fn lower_with_prebound_variables() {
        let mut compiler = Compiler::new();
        compiler.bind("a", crate::operand::EDI);
        compiler.bind("b", crate::operand::ESI);
        compiler.context().mark_occupied(RegClass::General, 0);
        let expr = add_u32(
            Expr::var("a", IrType::U32),
            Expr::var("b", IrType::U32),
        );
        compiler.lower(&expr, crate::operand::EAX).unwrap();
        compiler.emit(asm::ret());
        let image = compiler.finish().unwrap();
        // mov eax, edi; add eax, esi; ret
        assert_eq!(image.code(), [0x89, 0xF8, 0x01, 0xF0, 0xC3]);
    }

    #[test]
    fn ssa_temporaries_are_released_after_lowering() {
        let mut compiler = Compiler::new();
        compiler.context().mark_occupied(RegClass::General, 0);
        let expr = Expr::Mul(
            Box::new(add_u32(
                Expr::int(IrType::U32, 1),
                Expr::int(IrType::U32, 2),
            )),
            Box::new(add_u32(
                Expr::int(IrType::U32, 3),
                Expr::int(IrType::U32, 4),
            )),
        );
        compiler.lower(&expr, crate::operand::EAX).unwrap();
        // Only the target's register remains occupied.
        assert_eq!(compiler.context().gp_in_use(), 1);
    }

    #[test]
    fn temporaries_spill_under_register_pressure() {
        let mut compiler = Compiler::new();
        compiler.enable_spill();
        // Leave only r8 and r9 free besides the occupied target.
        for idx in [0u8, 1, 2, 3, 6, 7, 10, 11, 12, 13, 14, 15] {
            compiler.context().mark_occupied(RegClass::General, idx);
        }
        let expr = Expr::Mul(
            Box::new(add_u32(
                Expr::int(IrType::U32, 1),
                Expr::int(IrType::U32, 2),
            )),
            Box::new(Expr::int(IrType::U32, 3)),
        );
        compiler.lower(&expr, crate::operand::EAX).unwrap();
        assert_eq!(compiler.context().frame_size(), 8);
    }

    #[test]
    fn exhaustion_without_spill_is_an_error() {
        let mut compiler = Compiler::new();
        for idx in [0u8, 1, 2, 3, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15] {
            compiler.context().mark_occupied(RegClass::General, idx);
        }
        // The SSA temporary for the inner sum has nowhere to live.
        let expr = Expr::Mul(
            Box::new(add_u32(
                Expr::int(IrType::U32, 1),
                Expr::int(IrType::U32, 2),
            )),
            Box::new(Expr::int(IrType::U32, 3)),
        );
        let err = compiler.lower(&expr, crate::operand::EAX).unwrap_err();
        assert!(matches!(err, JitError::AllocationExhausted { .. }));
    }
}
