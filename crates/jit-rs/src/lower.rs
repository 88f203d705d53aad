//! Expression lowering: per-node `encode` turning IR trees into
//! instruction sequences.
//!
//! Contract for every node: on success, executing the returned sequence
//! leaves the node's value, in its declared result type and width, in
//! `target`. The callee never frees `target`, releases every scratch it
//! reserved before returning, and the returned sequence equals exactly what
//! the call appended to the context's instruction sink.

use alloc::format;
use alloc::vec::Vec;
use log::trace;

use crate::asm;
use crate::context::IrContext;
use crate::error::JitError;
use crate::instruction::Instruction;
use crate::ir::{CmpOp, Expr, IrType};
use crate::opcode;
use crate::operand::{
    Immediate, MemoryAddress, Operand, RegClass, Register, RipRelative, Width, AL, AX, RAX, RCX,
    RDX, RSP, XMM0,
};

/// System V AMD64 integer argument registers: RDI, RSI, RDX, RCX, R8, R9.
const ARG_REGS: [u8; 6] = [7, 6, 2, 1, 8, 9];

/// Caller-saved GP registers under System V.
const CALLER_SAVED: [u8; 9] = [0, 1, 2, 6, 7, 8, 9, 10, 11];

impl Expr {
    /// Lower this expression; executing the returned instructions leaves the
    /// result in `target`.
    pub fn encode(
        &self,
        ctx: &mut IrContext,
        target: &Operand,
    ) -> Result<Vec<Instruction>, JitError> {
        let mark = ctx.sink_len();
        self.encode_inner(ctx, target)?;
        Ok(ctx.sink_since(mark))
    }

    fn encode_inner(&self, ctx: &mut IrContext, target: &Operand) -> Result<(), JitError> {
        trace!("lower {} -> {}", self, target);
        match self {
            Expr::Int { value, .. } => emit_int_literal(ctx, *value, target, self),
            Expr::Bool(v) => emit_int_literal(ctx, i64::from(*v), target, self),
            Expr::Float(v) => emit_float_literal(ctx, *v, target, self),
            Expr::Var { name, ty } => {
                let src = ctx.operand_of(name)?;
                if src == *target {
                    return Ok(());
                }
                emit_move(ctx, &src, target, ty.is_float())
            }

            Expr::Add(a, b) => self.encode_binary(ctx, target, a, b, BinKind::Add),
            Expr::Sub(a, b) => self.encode_binary(ctx, target, a, b, BinKind::Sub),
            Expr::And(a, b) => self.encode_binary(ctx, target, a, b, BinKind::And),
            Expr::Or(a, b) => self.encode_binary(ctx, target, a, b, BinKind::Or),
            Expr::Xor(a, b) => self.encode_binary(ctx, target, a, b, BinKind::Xor),
            Expr::Mul(a, b) => self.encode_mul(ctx, target, a, b),
            Expr::Div(a, b) => self.encode_division(ctx, target, a, b, false),
            Expr::Mod(a, b) => self.encode_division(ctx, target, a, b, true),
            Expr::Shl(a, b) => self.encode_shift(ctx, target, a, b, true),
            Expr::Shr(a, b) => self.encode_shift(ctx, target, a, b, false),
            Expr::Not(a) => self.encode_not(ctx, target, a),
            Expr::Cmp(op, a, b) => self.encode_compare(ctx, target, *op, a, b),
            Expr::Cast { ty, expr } => self.encode_cast(ctx, target, *ty, expr),
            Expr::Index { base, index, elem } => {
                self.encode_index(ctx, target, base, index, *elem)
            }
            Expr::Field { base, offset, ty } => {
                self.encode_field(ctx, target, base, *offset, *ty)
            }
            Expr::Call { function, args, ty } => {
                self.encode_call(ctx, target, function, args, *ty)
            }
        }
    }

    fn check_operand_types(&self, a: &Expr, b: &Expr) -> Result<IrType, JitError> {
        let ta = a.result_type();
        let tb = b.result_type();
        if ta != tb {
            return Err(JitError::TypeMismatch {
                operation: self.operation_name().into(),
                detail: format!("{} vs {}", ta, tb),
            });
        }
        Ok(ta)
    }

    // ── Simple binary operators ─────────────────────────────────────

    fn encode_binary(
        &self,
        ctx: &mut IrContext,
        target: &Operand,
        a: &Expr,
        b: &Expr,
        kind: BinKind,
    ) -> Result<(), JitError> {
        let ty = self.check_operand_types(a, b)?;
        if ty.is_float() {
            let float_op = match kind {
                BinKind::Add => FloatOp::Add,
                BinKind::Sub => FloatOp::Sub,
                _ => {
                    return Err(JitError::TypeMismatch {
                        operation: self.operation_name().into(),
                        detail: format!("bitwise operation on {}", ty),
                    })
                }
            };
            return encode_float_binary(ctx, target, a, b, float_op);
        }

        let w = ty.width();
        let (dst, owned) = gp_destination(ctx, target, w)?;
        a.encode_inner(ctx, &Operand::Register(dst))?;
        let (rhs, rhs_scratch) = int_rhs_operand(ctx, b, w)?;
        ctx.emit(match kind {
            BinKind::Add => asm::add(dst, rhs),
            BinKind::Sub => asm::sub(dst, rhs),
            BinKind::And => asm::and(dst, rhs),
            BinKind::Or => asm::or(dst, rhs),
            BinKind::Xor => asm::xor(dst, rhs),
        });
        if let Some(s) = rhs_scratch {
            ctx.release(s);
        }
        flush_gp_destination(ctx, target, dst, owned)
    }

    fn encode_mul(
        &self,
        ctx: &mut IrContext,
        target: &Operand,
        a: &Expr,
        b: &Expr,
    ) -> Result<(), JitError> {
        let ty = self.check_operand_types(a, b)?;
        if ty.is_float() {
            return encode_float_binary(ctx, target, a, b, FloatOp::Mul);
        }

        let w = ty.width();
        if w == Width::Byte {
            // Two-operand IMUL has no byte form. The low byte of a product
            // depends only on the low bytes of the factors, so compute at
            // word width and keep the byte projection.
            let (dst, owned) = gp_destination(ctx, target, Width::Byte)?;
            a.encode_inner(ctx, &Operand::Register(dst))?;
            let scratch = ctx.reserve(RegClass::General, Width::Byte)?;
            b.encode_inner(ctx, &Operand::Register(scratch))?;
            ctx.emit(asm::imul(widen(dst, Width::Word), widen(scratch, Width::Word)));
            ctx.release(scratch);
            return flush_gp_destination(ctx, target, dst, owned);
        }

        let (dst, owned) = gp_destination(ctx, target, w)?;
        a.encode_inner(ctx, &Operand::Register(dst))?;
        // IMUL r, r/m has no immediate form in this table; literals go
        // through a scratch.
        let (rhs, rhs_scratch) = match b {
            Expr::Var { name, .. } => (ctx.operand_of(name)?, None),
            _ => {
                let s = ctx.reserve(RegClass::General, w)?;
                b.encode_inner(ctx, &Operand::Register(s))?;
                (Operand::Register(s), Some(s))
            }
        };
        ctx.emit(asm::imul(dst, rhs));
        if let Some(s) = rhs_scratch {
            ctx.release(s);
        }
        flush_gp_destination(ctx, target, dst, owned)
    }

    // ── Shifts ──────────────────────────────────────────────────────

    fn encode_shift(
        &self,
        ctx: &mut IrContext,
        target: &Operand,
        a: &Expr,
        b: &Expr,
        left: bool,
    ) -> Result<(), JitError> {
        let ty = a.result_type();
        if !ty.is_integer() || !b.result_type().is_integer() {
            return Err(JitError::TypeMismatch {
                operation: self.operation_name().into(),
                detail: format!("shift on {}", ty),
            });
        }
        let w = ty.width();
        let signed = ty.is_signed();

        // Literal counts avoid the CL dance entirely.
        if let Expr::Int { value, .. } = b {
            let (dst, owned) = gp_destination(ctx, target, w)?;
            a.encode_inner(ctx, &Operand::Register(dst))?;
            ctx.emit(shift_instr(left, signed, dst, Immediate::imm8(*value as u8)));
            return flush_gp_destination(ctx, target, dst, owned);
        }

        // Variable count: the count must end up in CL, an implicit operand.
        let cl_live = ctx.is_occupied(RegClass::General, 1);
        let snap = ctx.snapshot();
        for &idx in opcode::implicit_gp_regs("shl").reads {
            ctx.exclude(idx);
        }

        // A destination in RCX would collide with the count; detour through
        // a scratch in that case.
        let use_scratch = !matches!(target, Operand::Register(r)
            if r.class == RegClass::General && r.index != 1 && !r.is_float());
        let (dst, owned) = if use_scratch {
            (ctx.reserve(RegClass::General, w)?, true)
        } else {
            match target.as_register() {
                Some(r) => (widen(r, w), false),
                None => (ctx.reserve(RegClass::General, w)?, true),
            }
        };
        a.encode_inner(ctx, &Operand::Register(dst))?;

        let mut rcx_home = None;
        if cl_live {
            let home = ctx.reserve(RegClass::General, Width::Quad)?;
            ctx.emit(asm::mov(home, RCX));
            ctx.rebind_gp(1, home);
            rcx_home = Some(home);
        }
        let count_ty = b.result_type();
        b.encode_inner(
            ctx,
            &Operand::Register(Register::gp(1, count_ty.width())),
        )?;
        ctx.emit(shift_instr(left, signed, dst, Register::gp(1, Width::Byte)));
        if let Some(home) = rcx_home {
            ctx.emit(asm::mov(RCX, home));
        }
        if owned {
            emit_move(ctx, &Operand::Register(dst), target, false)?;
        }
        ctx.restore(snap);
        Ok(())
    }

    // ── Division and remainder ──────────────────────────────────────

    /// Integer divide per the rAX/rDX discipline: preserve rDX first (so the
    /// rAX scratch allocation honors the exclusion), evaluate the dividend
    /// into the rAX projection, set up the high half, divide, move the
    /// result, then restore rAX before rDX.
    fn encode_division(
        &self,
        ctx: &mut IrContext,
        target: &Operand,
        a: &Expr,
        b: &Expr,
        want_remainder: bool,
    ) -> Result<(), JitError> {
        let ty = self.check_operand_types(a, b)?;
        if ty.is_float() {
            if want_remainder {
                return Err(JitError::UnsupportedOperandShape {
                    operation: "%".into(),
                    detail: "remainder of f64 operands".into(),
                });
            }
            return encode_float_binary(ctx, target, a, b, FloatOp::Div);
        }

        let w = ty.width();
        let byte_wide = w == Width::Byte;
        let rax_live = ctx.is_occupied(RegClass::General, 0);
        let rdx_live = ctx.is_occupied(RegClass::General, 2);
        let target_is_rax = target.is_gp_index(0);
        let target_is_rdx = target.is_gp_index(2);

        // For byte-wide division the high half is AH, not rDX; rDX is
        // neither clobbered nor preserved.
        let preserve_rdx = !byte_wide && rdx_live && !target_is_rdx;
        let preserve_rax = rax_live && !target_is_rax;

        let snap = ctx.snapshot();
        // Keep sub-expression scratches away from the divide's implicit
        // destinations. For byte-wide divides the rDX exclusion is vacuous
        // (the high half is AH) but harmless.
        let implicit = opcode::implicit_gp_regs(if ty.is_signed() { "idiv" } else { "div" });
        for &idx in implicit.writes {
            ctx.exclude(idx);
        }

        let mut rdx_home = None;
        if preserve_rdx {
            let home = ctx.reserve(RegClass::General, Width::Quad)?;
            ctx.emit(asm::mov(home, RDX));
            ctx.rebind_gp(2, home);
            rdx_home = Some(home);
        }
        let mut rax_home = None;
        if preserve_rax {
            let home = ctx.reserve(RegClass::General, Width::Quad)?;
            ctx.emit(asm::mov(home, RAX));
            ctx.rebind_gp(0, home);
            rax_home = Some(home);
        }

        // A divisor variable still homed in rAX (possible when the target
        // is rAX itself, so nothing was preserved) must be copied out
        // before the dividend lands there.
        let mut early_divisor = None;
        if let Expr::Var { name, .. } = b {
            let home = ctx.operand_of(name)?;
            if home.is_gp_index(0) && rax_home.is_none() {
                let s = ctx.reserve(RegClass::General, w)?;
                if let Some(reg) = home.as_register() {
                    ctx.emit(asm::mov(s, widen(reg, w)));
                }
                early_divisor = Some(Operand::Register(s));
            }
        }

        let rax_proj = Register::gp(0, w);
        a.encode_inner(ctx, &Operand::Register(rax_proj))?;

        let divisor = match early_divisor {
            Some(op) => op,
            None => match b {
                Expr::Var { name, .. } => ctx.operand_of(name)?,
                _ => {
                    let s = ctx.reserve(RegClass::General, w)?;
                    b.encode_inner(ctx, &Operand::Register(s))?;
                    Operand::Register(s)
                }
            },
        };

        // High half: sign-extend pair by width, or zero it. AH cannot be
        // named in a REX-clean operand model, so the unsigned byte path
        // zero-extends AL into AX instead of xoring AH.
        if ty.is_signed() {
            ctx.emit(match w {
                Width::Byte => asm::cbw(),
                Width::Word => asm::cwd(),
                Width::Double => asm::cdq(),
                Width::Quad => asm::cqo(),
            });
        } else if byte_wide {
            ctx.emit(asm::movzx(AX, AL));
        } else {
            let rdx_proj = Register::gp(2, w);
            ctx.emit(asm::xor(rdx_proj, rdx_proj));
        }

        if ty.is_signed() {
            ctx.emit(asm::idiv(divisor));
        } else {
            ctx.emit(asm::div(divisor));
        }

        if want_remainder {
            if byte_wide {
                // Remainder is in AH: shift it down and read AL.
                ctx.emit(asm::shr(AX, Immediate::imm8(8)));
                if !target_is_rax {
                    emit_move(ctx, &Operand::Register(AL), target, false)?;
                }
            } else {
                let rdx_proj = Register::gp(2, w);
                if !target_is_rdx {
                    emit_move(ctx, &Operand::Register(rdx_proj), target, false)?;
                }
            }
        } else if !target_is_rax {
            emit_move(ctx, &Operand::Register(rax_proj), target, false)?;
        }

        // Restore rAX, then rDX.
        if let Some(home) = rax_home {
            ctx.emit(asm::mov(RAX, home));
        }
        if let Some(home) = rdx_home {
            ctx.emit(asm::mov(RDX, home));
        }

        ctx.restore(snap);
        Ok(())
    }

    // ── Logical / bitwise NOT ───────────────────────────────────────

    fn encode_not(
        &self,
        ctx: &mut IrContext,
        target: &Operand,
        a: &Expr,
    ) -> Result<(), JitError> {
        let ty = a.result_type();
        if ty.is_float() {
            return Err(JitError::TypeMismatch {
                operation: "!".into(),
                detail: "bitwise not of f64".into(),
            });
        }
        let (dst, owned) = gp_destination(ctx, target, ty.width())?;
        a.encode_inner(ctx, &Operand::Register(dst))?;
        if ty == IrType::Bool {
            ctx.emit(asm::xor(dst, Immediate::imm8(1)));
        } else {
            ctx.emit(asm::not(dst));
        }
        flush_gp_destination(ctx, target, dst, owned)
    }

    // ── Comparison ──────────────────────────────────────────────────

    fn encode_compare(
        &self,
        ctx: &mut IrContext,
        target: &Operand,
        op: CmpOp,
        a: &Expr,
        b: &Expr,
    ) -> Result<(), JitError> {
        let ty = self.check_operand_types(a, b)?;

        if ty.is_float() {
            // UCOMISD sets CF/ZF like an unsigned compare; the below/above
            // condition family reads those.
            let lhs = ctx.reserve(RegClass::Float, Width::Quad)?;
            a.encode_inner(ctx, &Operand::Register(lhs))?;
            let (rhs, rhs_scratch) = float_rhs_operand(ctx, b)?;
            ctx.emit(asm::ucomisd(lhs, rhs));
            ctx.release(lhs);
            if let Some(s) = rhs_scratch {
                ctx.release(s);
            }
            return materialize_flags(ctx, target, op, false);
        }

        let w = ty.width();
        let lhs = ctx.reserve(RegClass::General, w)?;
        a.encode_inner(ctx, &Operand::Register(lhs))?;
        let (rhs, rhs_scratch) = int_rhs_operand(ctx, b, w)?;
        ctx.emit(asm::cmp(lhs, rhs));
        ctx.release(lhs);
        if let Some(s) = rhs_scratch {
            ctx.release(s);
        }
        materialize_flags(ctx, target, op, ty.is_signed())
    }

    // ── Casts ───────────────────────────────────────────────────────

    fn encode_cast(
        &self,
        ctx: &mut IrContext,
        target: &Operand,
        to: IrType,
        expr: &Expr,
    ) -> Result<(), JitError> {
        let from = expr.result_type();
        if from == to {
            return expr.encode_inner(ctx, target);
        }

        match (from.is_float(), to.is_float()) {
            // int → f64
            (false, true) => {
                let s = ctx.reserve(RegClass::General, Width::Quad)?;
                expr.encode_inner(ctx, &Operand::Register(widen(s, from.width())))?;
                let cvt_src = widen_for_convert(ctx, s, from);
                match target {
                    Operand::Register(reg) if reg.is_float() => {
                        ctx.emit(asm::cvtsi2sd(*reg, cvt_src));
                    }
                    Operand::Memory(_) => {
                        let x = ctx.reserve(RegClass::Float, Width::Quad)?;
                        ctx.emit(asm::cvtsi2sd(x, cvt_src));
                        emit_move(ctx, &Operand::Register(x), target, true)?;
                        ctx.release(x);
                    }
                    _ => {
                        ctx.release(s);
                        return unsupported_target(self, target);
                    }
                }
                ctx.release(s);
                Ok(())
            }
            // f64 → int (truncating)
            (true, false) => {
                let (src, src_scratch) = float_rhs_operand(ctx, expr)?;
                let cvt_w = if to.width() == Width::Quad {
                    Width::Quad
                } else {
                    Width::Double
                };
                let (dst, owned) = gp_destination(ctx, target, to.width())?;
                ctx.emit(asm::cvttsd2si(widen(dst, cvt_w), src));
                if let Some(s) = src_scratch {
                    ctx.release(s);
                }
                flush_gp_destination(ctx, target, dst, owned)
            }
            // int → int
            (false, false) => {
                if to == IrType::Bool {
                    // bool(x) is x != 0, not a truncation.
                    let s = ctx.reserve(RegClass::General, from.width())?;
                    expr.encode_inner(ctx, &Operand::Register(s))?;
                    ctx.emit(asm::cmp_imm(s, 0));
                    ctx.release(s);
                    return materialize_flags(ctx, target, CmpOp::Ne, false);
                }

                let from_w = from.width();
                let to_w = to.width();
                if to_w <= from_w {
                    // Narrowing (or width-equal reinterpretation) keeps the
                    // low bits: evaluate into the destination's wider
                    // projection and read the narrow one.
                    let (dst, owned) = gp_destination(ctx, target, to_w)?;
                    expr.encode_inner(ctx, &Operand::Register(widen(dst, from_w)))?;
                    return flush_gp_destination(ctx, target, dst, owned);
                }

                // Widening: zero- or sign-extend per the source type.
                let s = ctx.reserve(RegClass::General, from_w)?;
                expr.encode_inner(ctx, &Operand::Register(s))?;
                let (dst, owned) = gp_destination(ctx, target, to_w)?;
                emit_extend(ctx, widen(dst, to_w), s, from);
                ctx.release(s);
                flush_gp_destination(ctx, target, dst, owned)
            }
            (true, true) => expr.encode_inner(ctx, target),
        }
    }

    // ── Memory loads ────────────────────────────────────────────────

    fn encode_index(
        &self,
        ctx: &mut IrContext,
        target: &Operand,
        base: &Expr,
        index: &Expr,
        elem: IrType,
    ) -> Result<(), JitError> {
        let base_ty = base.result_type();
        if !base_ty.is_integer() || base_ty.width() != Width::Quad {
            return Err(JitError::TypeMismatch {
                operation: "index".into(),
                detail: format!("base address has type {}", base_ty),
            });
        }
        let w = elem.width();
        let (base_reg, base_scratch) = address_in_register(ctx, base)?;

        let (mem, idx_scratch) = match index {
            Expr::Int { value, .. } => (
                MemoryAddress::base_disp(w, base_reg, (*value as i32) * i32::from(w.bytes())),
                None,
            ),
            _ => {
                let ity = index.result_type();
                if !ity.is_integer() {
                    return Err(JitError::TypeMismatch {
                        operation: "index".into(),
                        detail: format!("index has type {}", ity),
                    });
                }
                let s = ctx.reserve(RegClass::General, Width::Quad)?;
                index.encode_inner(ctx, &Operand::Register(widen(s, ity.width())))?;
                if ity.width() != Width::Quad {
                    emit_extend(ctx, s, widen(s, ity.width()), ity);
                }
                (
                    MemoryAddress::base_index(w, base_reg, s, w.bytes(), 0),
                    Some(s),
                )
            }
        };

        load_from_memory(ctx, target, mem, elem)?;
        if let Some(s) = idx_scratch {
            ctx.release(s);
        }
        if let Some(s) = base_scratch {
            ctx.release(s);
        }
        Ok(())
    }

    fn encode_field(
        &self,
        ctx: &mut IrContext,
        target: &Operand,
        base: &Expr,
        offset: i32,
        ty: IrType,
    ) -> Result<(), JitError> {
        let base_ty = base.result_type();
        if !base_ty.is_integer() || base_ty.width() != Width::Quad {
            return Err(JitError::TypeMismatch {
                operation: "field".into(),
                detail: format!("base address has type {}", base_ty),
            });
        }
        let (base_reg, base_scratch) = address_in_register(ctx, base)?;
        let mem = MemoryAddress::base_disp(ty.width(), base_reg, offset);
        load_from_memory(ctx, target, mem, ty)?;
        if let Some(s) = base_scratch {
            ctx.release(s);
        }
        Ok(())
    }

    // ── Calls ───────────────────────────────────────────────────────

    /// System V call: arguments are evaluated into scratches (with the ABI
    /// registers excluded so sub-expressions cannot squat on them), live
    /// caller-saved registers are saved around the call, arguments move to
    /// their ABI homes, and the result moves from rAX/XMM0 to the target.
    fn encode_call(
        &self,
        ctx: &mut IrContext,
        target: &Operand,
        function: &str,
        args: &[Expr],
        ty: IrType,
    ) -> Result<(), JitError> {
        let snap = ctx.snapshot();
        for idx in ARG_REGS {
            ctx.exclude(idx);
        }

        enum ArgHome {
            Gp(u8),
            Xmm(u8),
        }

        let mut staged: Vec<(Register, ArgHome)> = Vec::new();
        let mut n_int = 0usize;
        let mut n_float = 0usize;
        for arg in args {
            let aty = arg.result_type();
            if aty.is_float() {
                if n_float >= 8 {
                    return Err(JitError::UnsupportedOperandShape {
                        operation: "call".into(),
                        detail: "more than 8 float arguments".into(),
                    });
                }
                let s = ctx.reserve(RegClass::Float, Width::Quad)?;
                arg.encode_inner(ctx, &Operand::Register(s))?;
                staged.push((s, ArgHome::Xmm(n_float as u8)));
                n_float += 1;
            } else {
                if n_int >= ARG_REGS.len() {
                    return Err(JitError::UnsupportedOperandShape {
                        operation: "call".into(),
                        detail: "more than 6 integer arguments".into(),
                    });
                }
                let s = ctx.reserve(RegClass::General, aty.width())?;
                arg.encode_inner(ctx, &Operand::Register(s))?;
                staged.push((s, ArgHome::Gp(ARG_REGS[n_int])));
                n_int += 1;
            }
        }

        // Save live caller-saved registers, skipping argument scratches and
        // the target's own register.
        let target_reg = target.as_register();
        let is_staged = |idx: u8, float: bool| {
            staged.iter().any(|(s, _)| {
                s.index == idx && (s.class == RegClass::Float) == float
            })
        };
        let mut saved_gp = Vec::new();
        for idx in CALLER_SAVED {
            let skip = matches!(target_reg, Some(r) if r.class == RegClass::General && r.index == idx);
            if ctx.is_occupied(RegClass::General, idx) && !skip && !is_staged(idx, false) {
                ctx.emit(asm::push(Register::gp(idx, Width::Quad)));
                saved_gp.push(idx);
            }
        }
        let mut saved_xmm = Vec::new();
        for idx in 0..16u8 {
            let skip = matches!(target_reg, Some(r) if r.class == RegClass::Float && r.index == idx);
            if ctx.is_occupied(RegClass::Float, idx) && !skip && !is_staged(idx, true) {
                ctx.emit(asm::sub(RSP, Immediate::imm8(8)));
                ctx.emit(asm::movsd(
                    MemoryAddress::base(Width::Quad, RSP),
                    Register::xmm(idx),
                ));
                saved_xmm.push(idx);
            }
        }

        // Move staged arguments into their ABI homes.
        for (scratch, home) in &staged {
            match home {
                ArgHome::Gp(idx) => {
                    if scratch.index != *idx {
                        ctx.emit(asm::mov(Register::gp(*idx, scratch.width), *scratch));
                    }
                }
                ArgHome::Xmm(idx) => {
                    if scratch.index != *idx {
                        ctx.emit(asm::movsd(Register::xmm(*idx), *scratch));
                    }
                }
            }
        }

        ctx.emit(asm::call(asm::label(function)));

        // Result out of its ABI home.
        if ty.is_float() {
            if !matches!(target, Operand::Register(r) if r.is_float() && r.index == 0) {
                emit_move(ctx, &Operand::Register(XMM0), target, true)?;
            }
        } else if !target.is_gp_index(0) {
            emit_move(
                ctx,
                &Operand::Register(Register::gp(0, ty.width())),
                target,
                false,
            )?;
        }

        // Restore in reverse order.
        for idx in saved_xmm.iter().rev() {
            ctx.emit(asm::movsd(
                Register::xmm(*idx),
                MemoryAddress::base(Width::Quad, RSP),
            ));
            ctx.emit(asm::add(RSP, Immediate::imm8(8)));
        }
        for idx in saved_gp.iter().rev() {
            ctx.emit(asm::pop(Register::gp(*idx, Width::Quad)));
        }

        ctx.restore(snap);
        Ok(())
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum BinKind {
    Add,
    Sub,
    And,
    Or,
    Xor,
}

#[derive(Clone, Copy)]
enum FloatOp {
    Add,
    Sub,
    Mul,
    Div,
}

fn shift_instr(
    left: bool,
    signed: bool,
    dst: Register,
    count: impl Into<Operand>,
) -> Instruction {
    if left {
        asm::shl(dst, count)
    } else if signed {
        asm::sar(dst, count)
    } else {
        asm::shr(dst, count)
    }
}

/// Project a GP register to another width (same underlying register).
fn widen(reg: Register, width: Width) -> Register {
    Register { width, ..reg }
}

/// Pick the destination register for an integer-valued node: the target
/// itself when it is a GP register, otherwise a scratch that is flushed to
/// the target afterwards.
fn gp_destination(
    ctx: &mut IrContext,
    target: &Operand,
    width: Width,
) -> Result<(Register, bool), JitError> {
    match target {
        Operand::Register(r) if !r.is_float() => Ok((widen(*r, width), false)),
        _ => Ok((ctx.reserve(RegClass::General, width)?, true)),
    }
}

fn flush_gp_destination(
    ctx: &mut IrContext,
    target: &Operand,
    dst: Register,
    owned: bool,
) -> Result<(), JitError> {
    if owned {
        emit_move(ctx, &Operand::Register(dst), target, false)?;
        ctx.release(dst);
    }
    Ok(())
}

fn unsupported_target(node: &Expr, target: &Operand) -> Result<(), JitError> {
    Err(JitError::UnsupportedOperandShape {
        operation: node.operation_name().into(),
        detail: format!("target operand {}", target),
    })
}

/// Move between operands of one value class. Memory-to-memory moves detour
/// through a scratch register.
fn emit_move(
    ctx: &mut IrContext,
    src: &Operand,
    dst: &Operand,
    float: bool,
) -> Result<(), JitError> {
    if src == dst {
        return Ok(());
    }
    if float {
        let src_is_mem = matches!(src, Operand::Memory(_) | Operand::RipRelative(_));
        let dst_is_mem = matches!(dst, Operand::Memory(_) | Operand::RipRelative(_));
        if src_is_mem && dst_is_mem {
            let s = ctx.reserve(RegClass::Float, Width::Quad)?;
            ctx.emit(asm::movsd(s, src.clone()));
            ctx.emit(asm::movsd(dst.clone(), Operand::Register(s)));
            ctx.release(s);
        } else {
            ctx.emit(asm::movsd(dst.clone(), src.clone()));
        }
        return Ok(());
    }

    // Integer moves: align the source register width to the destination's
    // when both sides name registers of the same index family.
    let src = match (src, dst.width()) {
        (Operand::Register(r), Some(w)) if !r.is_float() && r.width != w => {
            Operand::Register(widen(*r, w))
        }
        _ => src.clone(),
    };
    let src_is_mem = matches!(src, Operand::Memory(_) | Operand::RipRelative(_));
    let dst_is_mem = matches!(dst, Operand::Memory(_) | Operand::RipRelative(_));
    if src_is_mem && dst_is_mem {
        let w = dst.width().unwrap_or(Width::Quad);
        let s = ctx.reserve(RegClass::General, w)?;
        ctx.emit(asm::mov(s, src));
        ctx.emit(asm::mov(dst.clone(), Operand::Register(s)));
        ctx.release(s);
    } else {
        ctx.emit(asm::mov(dst.clone(), src));
    }
    Ok(())
}

fn emit_int_literal(
    ctx: &mut IrContext,
    value: i64,
    target: &Operand,
    node: &Expr,
) -> Result<(), JitError> {
    match target {
        Operand::Register(reg) if !reg.is_float() => {
            ctx.emit(asm::mov_imm(*reg, value as u64));
            Ok(())
        }
        Operand::Memory(mem) => {
            match mem.width {
                Width::Byte => ctx.emit(asm::mov(*mem, Immediate::imm8(value as u8))),
                Width::Word => ctx.emit(asm::mov(*mem, Immediate::imm16(value as u16))),
                Width::Double => ctx.emit(asm::mov(*mem, Immediate::imm32(value as u32))),
                Width::Quad => {
                    if (i32::MIN as i64..=i32::MAX as i64).contains(&value) {
                        ctx.emit(asm::mov(*mem, Immediate::new(Width::Double, value as i128)));
                    } else {
                        let s = ctx.reserve(RegClass::General, Width::Quad)?;
                        ctx.emit(asm::mov_imm(s, value as u64));
                        ctx.emit(asm::mov(*mem, s));
                        ctx.release(s);
                    }
                }
            }
            Ok(())
        }
        _ => unsupported_target(node, target),
    }
}

fn emit_float_literal(
    ctx: &mut IrContext,
    value: f64,
    target: &Operand,
    node: &Expr,
) -> Result<(), JitError> {
    let label = ctx.data_mut().intern_f64(value);
    match target {
        Operand::Register(reg) if reg.is_float() => {
            ctx.emit(asm::movsd_load(*reg, label));
            Ok(())
        }
        Operand::Memory(mem) if mem.width == Width::Quad => {
            let s = ctx.reserve(RegClass::Float, Width::Quad)?;
            ctx.emit(asm::movsd_load(s, label));
            ctx.emit(asm::movsd(*mem, s));
            ctx.release(s);
            Ok(())
        }
        _ => unsupported_target(node, target),
    }
}

/// Right-hand operand for an integer ALU instruction: a width-adapted
/// immediate for literals, the variable's home operand, or a scratch.
fn int_rhs_operand(
    ctx: &mut IrContext,
    expr: &Expr,
    w: Width,
) -> Result<(Operand, Option<Register>), JitError> {
    match expr {
        Expr::Int { value, .. } => {
            let v = *value;
            let imm = match w {
                Width::Byte => Some(Immediate::imm8(v as u8)),
                Width::Word => Some(Immediate::imm16(v as u16)),
                Width::Double => Some(Immediate::imm32(v as u32)),
                Width::Quad => {
                    if (i32::MIN as i64..=i32::MAX as i64).contains(&v) {
                        Some(Immediate::new(Width::Double, v as i128))
                    } else {
                        None
                    }
                }
            };
            match imm {
                Some(imm) => Ok((Operand::Immediate(imm), None)),
                None => {
                    let s = ctx.reserve(RegClass::General, Width::Quad)?;
                    ctx.emit(asm::mov_imm(s, v as u64));
                    Ok((Operand::Register(s), Some(s)))
                }
            }
        }
        Expr::Bool(v) => Ok((Operand::Immediate(Immediate::imm8(u8::from(*v))), None)),
        Expr::Var { name, .. } => Ok((ctx.operand_of(name)?, None)),
        _ => {
            let s = ctx.reserve(RegClass::General, w)?;
            expr.encode_inner(ctx, &Operand::Register(s))?;
            Ok((Operand::Register(s), Some(s)))
        }
    }
}

/// Right-hand operand for an SSE instruction: a variable's home, a
/// RIP-relative literal-pool reference, or a scratch xmm.
fn float_rhs_operand(
    ctx: &mut IrContext,
    expr: &Expr,
) -> Result<(Operand, Option<Register>), JitError> {
    match expr {
        Expr::Float(v) => {
            let label = ctx.data_mut().intern_f64(*v);
            Ok((
                Operand::RipRelative(RipRelative::new(Width::Quad, label)),
                None,
            ))
        }
        Expr::Var { name, .. } => Ok((ctx.operand_of(name)?, None)),
        _ => {
            let s = ctx.reserve(RegClass::Float, Width::Quad)?;
            expr.encode_inner(ctx, &Operand::Register(s))?;
            Ok((Operand::Register(s), Some(s)))
        }
    }
}

fn encode_float_binary(
    ctx: &mut IrContext,
    target: &Operand,
    a: &Expr,
    b: &Expr,
    op: FloatOp,
) -> Result<(), JitError> {
    let (dst, owned) = match target {
        Operand::Register(r) if r.is_float() => (*r, false),
        _ => (ctx.reserve(RegClass::Float, Width::Quad)?, true),
    };
    a.encode_inner(ctx, &Operand::Register(dst))?;
    let (rhs, rhs_scratch) = float_rhs_operand(ctx, b)?;
    ctx.emit(match op {
        FloatOp::Add => asm::addsd(dst, rhs),
        FloatOp::Sub => asm::subsd(dst, rhs),
        FloatOp::Mul => asm::mulsd(dst, rhs),
        FloatOp::Div => asm::divsd(dst, rhs),
    });
    if let Some(s) = rhs_scratch {
        ctx.release(s);
    }
    if owned {
        emit_move(ctx, &Operand::Register(dst), target, true)?;
        ctx.release(dst);
    }
    Ok(())
}

/// SETcc into the target's byte projection, zero-extending when the target
/// register is wider than a byte.
fn materialize_flags(
    ctx: &mut IrContext,
    target: &Operand,
    op: CmpOp,
    signed: bool,
) -> Result<(), JitError> {
    let setcc: fn(Operand) -> Instruction = match (op, signed) {
        (CmpOp::Eq, _) => |o| asm::sete(o),
        (CmpOp::Ne, _) => |o| asm::setne(o),
        (CmpOp::Lt, true) => |o| asm::setl(o),
        (CmpOp::Le, true) => |o| asm::setle(o),
        (CmpOp::Gt, true) => |o| asm::setg(o),
        (CmpOp::Ge, true) => |o| asm::setge(o),
        (CmpOp::Lt, false) => |o| asm::setb(o),
        (CmpOp::Le, false) => |o| asm::setbe(o),
        (CmpOp::Gt, false) => |o| asm::seta(o),
        (CmpOp::Ge, false) => |o| asm::setae(o),
    };
    match target {
        Operand::Register(r) if !r.is_float() => {
            let byte = widen(*r, Width::Byte);
            ctx.emit(setcc(Operand::Register(byte)));
            if r.width > Width::Byte {
                ctx.emit(asm::movzx(*r, byte));
            }
            Ok(())
        }
        Operand::Memory(mem) => {
            let byte_mem = MemoryAddress {
                width: Width::Byte,
                ..*mem
            };
            ctx.emit(setcc(Operand::Memory(byte_mem)));
            Ok(())
        }
        _ => Err(JitError::UnsupportedOperandShape {
            operation: "cmp".into(),
            detail: format!("target operand {}", target),
        }),
    }
}

/// Zero- or sign-extend `src` into `dst` per the source type.
fn emit_extend(ctx: &mut IrContext, dst: Register, src: Register, from: IrType) {
    debug_assert!(dst.width > src.width);
    if from.is_signed() {
        ctx.emit(asm::movsx(dst, src));
    } else if src.width == Width::Double {
        // A 32-bit register write zero-extends; a plain dword mov does it.
        ctx.emit(asm::mov(widen(dst, Width::Double), widen(src, Width::Double)));
    } else {
        ctx.emit(asm::movzx(dst, src));
    }
}

/// The widest-useful convert source for CVTSI2SD: 64-bit sources convert as
/// qwords, 32-bit unsigned zero-extends to a qword first (already implied
/// by a dword write), everything narrower widens to a dword.
fn widen_for_convert(ctx: &mut IrContext, s: Register, from: IrType) -> Operand {
    match from {
        IrType::U64 | IrType::I64 => Operand::Register(widen(s, Width::Quad)),
        IrType::U32 => Operand::Register(widen(s, Width::Quad)),
        IrType::I32 => Operand::Register(widen(s, Width::Double)),
        _ => {
            emit_extend(ctx, widen(s, Width::Double), widen(s, from.width()), from);
            Operand::Register(widen(s, Width::Double))
        }
    }
}

/// An address expression in a 64-bit GP register: a register-homed variable
/// is used in place, anything else evaluates into a scratch.
fn address_in_register(
    ctx: &mut IrContext,
    base: &Expr,
) -> Result<(Register, Option<Register>), JitError> {
    if let Expr::Var { name, .. } = base {
        if let Operand::Register(reg) = ctx.operand_of(name)? {
            return Ok((widen(reg, Width::Quad), None));
        }
    }
    let s = ctx.reserve(RegClass::General, Width::Quad)?;
    base.encode_inner(ctx, &Operand::Register(s))?;
    Ok((s, Some(s)))
}

/// Load a typed value out of memory into the target.
fn load_from_memory(
    ctx: &mut IrContext,
    target: &Operand,
    mem: MemoryAddress,
    ty: IrType,
) -> Result<(), JitError> {
    if ty.is_float() {
        match target {
            Operand::Register(r) if r.is_float() => {
                ctx.emit(asm::movsd(*r, mem));
                Ok(())
            }
            _ => emit_move(ctx, &Operand::Memory(mem), target, true),
        }
    } else {
        match target {
            Operand::Register(r) if !r.is_float() => {
                ctx.emit(asm::mov(widen(*r, ty.width()), mem));
                Ok(())
            }
            _ => emit_move(ctx, &Operand::Memory(mem), target, false),
        }
    }
}
