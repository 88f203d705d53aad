//! # jit-rs — Pure Rust x86-64 Expression JIT
//!
//! `jit-rs` translates a small strongly-typed expression IR into executable
//! x86-64 machine code bytes, entirely in safe Rust: no LLVM, no system
//! assembler, no C dependencies. The host process maps the returned buffers
//! executable and calls the entry point.
//!
//! ## Quick Start
//!
//! ```rust
//! use jit_rs::{compile, Expr, IrType};
//!
//! // (2 + 3) as a u32, returned in eax.
//! let expr = Expr::Add(
//!     Box::new(Expr::int(IrType::U32, 2)),
//!     Box::new(Expr::int(IrType::U32, 3)),
//! );
//! let image = compile(&expr).unwrap();
//! assert_eq!(image.code(), [0xB8, 0x02, 0x00, 0x00, 0x00, 0x83, 0xC0, 0x03, 0xC3]);
//! ```
//!
//! ## Pipeline
//!
//! - **SSA flattening** rewrites expression trees so every binary node's
//!   operands are literals or variables.
//! - **Lowering** turns each node into instructions against a shared
//!   [`IrContext`] (register occupancy bitsets, variable map, instruction
//!   sink, data section), with the full rAX/rDX preservation discipline for
//!   implicit-destination instructions like divide.
//! - **Encoding** resolves each instruction against its per-mnemonic opcode
//!   table (first accepting candidate wins; short forms are declared first)
//!   and emits prefix/REX/opcode/ModR/M/SIB/displacement/immediate bytes,
//!   bit-exact with a reference assembler.
//!
//! ## Features
//!
//! - **`no_std` + `alloc`** — embeddable; only the `std` feature gates the
//!   `std::error::Error` impl.
//! - **`serde`** — optional serialization for the operand and IR models.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
// ── Lint policy ──────────────────────────────────────────────────────
// An encoder performs many deliberate narrowing casts between integer
// widths and uses dense hex literals without separators (0xFFD0, 0x0F).
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_lossless,
    clippy::cast_possible_wrap,
    clippy::unreadable_literal,
    clippy::match_same_arms,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::return_self_not_must_use
)]

extern crate alloc;

/// Instruction constructors, one per mnemonic.
pub mod asm;
/// Compiler driver and serialized image.
pub mod compiler;
/// The IR context: allocator, variable map, sink, data section.
pub mod context;
/// Error types.
pub mod error;
/// Instruction objects, the opcode matcher, and the byte encoder.
pub mod instruction;
/// The typed expression IR and SSA flattening.
pub mod ir;
/// Per-mnemonic opcode tables.
pub mod opcode;
/// Operand model: widths, registers, immediates, memory references.
pub mod operand;

mod lower;

// Re-exports
pub use compiler::{compile, AppliedRelocation, CompiledImage, Compiler};
pub use context::{ContextSnapshot, DataSection, IrContext, RegSet};
pub use error::JitError;
pub use instruction::{EncodedInstr, InstrBytes, Instruction, RelocKind, Relocation};
pub use ir::{CmpOp, Expr, IrType, Rewrite, SsaNames};
pub use operand::{
    Immediate, MemoryAddress, Operand, RegClass, Register, RipRelative, Width,
};
