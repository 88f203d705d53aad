//! Error types for lowering and encoding.

use alloc::string::String;
use core::fmt;

use crate::operand::{RegClass, Width};

/// Compilation error.
///
/// There is no source text in this pipeline, so instead of spans every
/// variant carries the offending mnemonic, operand rendering, or variable
/// name. All errors are fatal to the current compilation; nothing is
/// retried internally.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JitError {
    /// A register projection was requested at a width the register's class
    /// does not support (e.g. a float register at byte width).
    OperandWidthMismatch {
        /// Rendering of the register that was being projected.
        register: String,
        /// The requested width.
        width: Width,
    },

    /// No candidate in the mnemonic's opcode table accepts the operand tuple.
    NoMatchingOpcode {
        /// The instruction mnemonic.
        mnemonic: String,
        /// Rendering of the operand tuple.
        operands: String,
    },

    /// An immediate or displacement does not fit the width declared by the
    /// selected opcode candidate.
    EncodingOverflow {
        /// The instruction mnemonic.
        mnemonic: String,
        /// The value that overflowed.
        value: i128,
        /// The declared encoding width.
        width: Width,
    },

    /// Illegal base/index/scale combination in a memory operand.
    InvalidMemoryOperand {
        /// The instruction mnemonic.
        mnemonic: String,
        /// Description of the illegal combination.
        detail: String,
    },

    /// Operand or result types are incompatible for the requested IR operation.
    TypeMismatch {
        /// The IR operation being lowered (e.g. `"/"`).
        operation: String,
        /// Description of the mismatch.
        detail: String,
    },

    /// The node cannot be lowered for this operand combination on x86-64.
    UnsupportedOperandShape {
        /// The IR operation being lowered.
        operation: String,
        /// Description of the unsupported shape.
        detail: String,
    },

    /// No free register of the required class, and spilling to the stack is
    /// disabled.
    AllocationExhausted {
        /// The register class that ran dry.
        class: RegClass,
    },

    /// An emitter referenced a variable not present in the variable map.
    UndefinedVariable {
        /// The variable name.
        name: String,
    },
}

impl fmt::Display for JitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JitError::OperandWidthMismatch { register, width } => {
                write!(f, "register '{}' has no {} form", register, width)
            }
            JitError::NoMatchingOpcode { mnemonic, operands } => {
                write!(f, "no opcode candidate for '{} {}'", mnemonic, operands)
            }
            JitError::EncodingOverflow {
                mnemonic,
                value,
                width,
            } => {
                write!(
                    f,
                    "'{}': value {} does not fit in a {} field",
                    mnemonic, value, width
                )
            }
            JitError::InvalidMemoryOperand { mnemonic, detail } => {
                write!(f, "'{}': invalid memory operand: {}", mnemonic, detail)
            }
            JitError::TypeMismatch { operation, detail } => {
                write!(f, "type mismatch in '{}' operation: {}", operation, detail)
            }
            JitError::UnsupportedOperandShape { operation, detail } => {
                write!(f, "cannot lower '{}' operation: {}", operation, detail)
            }
            JitError::AllocationExhausted { class } => {
                write!(f, "out of {} registers (spilling disabled)", class)
            }
            JitError::UndefinedVariable { name } => {
                write!(f, "undefined variable '{}'", name)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for JitError {}
