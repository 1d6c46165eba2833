//! JVM class-file parsing.
//!
//! This module provides just enough of the class-file format (JVMS chapter 4)
//! to locate call instructions inside method bodies and to patch their
//! constant-pool operands without disturbing anything else in the unit.
//!
//! # Design Principles
//!
//! 1. **Lossless**: the parsed model records byte offsets into the original
//!    buffer instead of copying structures, so a rewrite is a splice plus
//!    in-place operand patches.
//! 2. **Strict**: every structure is bounds-checked; any inconsistency is an
//!    error. A unit that cannot be parsed is never handed back unrewritten.
//! 3. **Narrow**: only the `Code` attribute and the annotation attributes are
//!    interpreted. Everything else is skipped by length.

pub mod bytecode;
pub mod class;
pub mod constant_pool;
pub mod member;
pub mod reader;

pub use bytecode::{Instruction, InstructionWalker};
pub use class::ClassFile;
pub use constant_pool::{Constant, ConstantPool, MemberRef};
pub use member::{CodeSpan, MethodInfo};
pub use reader::ByteReader;

use thiserror::Error;

/// Class-file magic number.
pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// Largest constant-pool count representable in the `u2` count field.
pub const MAX_CONSTANT_POOL_COUNT: usize = u16::MAX as usize;

/// Nesting limit for annotation element values.
pub const MAX_ANNOTATION_DEPTH: usize = 32;

/// Error type for class-file parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassFileError {
    /// Input ended before a structure was complete.
    #[error("truncated {context}: need {needed} bytes at offset {offset:#x}, have {available}")]
    Truncated {
        context: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },
    /// Magic number is not `0xCAFEBABE`.
    #[error("invalid class-file magic: {0:#010x}")]
    InvalidMagic(u32),
    /// Constant pool entry carries an unknown tag.
    #[error("unknown constant-pool tag {tag} at index {index}")]
    UnknownConstantTag { index: u16, tag: u8 },
    /// Reference to a constant-pool slot that does not exist.
    #[error("constant-pool index {0} out of range")]
    ConstantIndexOutOfRange(u16),
    /// Reference to a constant of the wrong kind.
    #[error("constant-pool index {index}: expected {expected}")]
    UnexpectedConstant { index: u16, expected: &'static str },
    /// Method body contains an opcode not defined by the JVM.
    #[error("unknown opcode {opcode:#04x} at bytecode offset {pc}")]
    UnknownOpcode { pc: usize, opcode: u8 },
    /// `tableswitch` with `low > high`, or a negative `lookupswitch` pair count.
    #[error("malformed switch at bytecode offset {pc}")]
    MalformedSwitch { pc: usize },
    /// `Code` attribute length disagrees with its contents.
    #[error("code attribute length {declared} does not match parsed length {parsed}")]
    CodeLengthMismatch { declared: usize, parsed: usize },
    /// Annotation element value with an unknown tag, or nesting deeper than
    /// [`MAX_ANNOTATION_DEPTH`].
    #[error("malformed annotation at attribute offset {offset}")]
    MalformedAnnotation { offset: usize },
    /// Bytes remain after the last class attribute.
    #[error("{0} trailing bytes after class attributes")]
    TrailingBytes(usize),
    /// Appending constants would exceed the `u2` pool count.
    #[error("constant pool overflow: {needed} slots exceed the {MAX_CONSTANT_POOL_COUNT} limit")]
    ConstantPoolOverflow { needed: usize },
}

/// Result type for class-file operations.
pub type ClassFileResult<T> = Result<T, ClassFileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes() {
        assert_eq!(CLASS_MAGIC.to_be_bytes(), [0xCA, 0xFE, 0xBA, 0xBE]);
    }

    #[test]
    fn error_display() {
        let err = ClassFileError::InvalidMagic(0xDEAD_BEEF);
        assert_eq!(format!("{err}"), "invalid class-file magic: 0xdeadbeef");

        let err = ClassFileError::UnknownOpcode { pc: 7, opcode: 0xcb };
        assert_eq!(format!("{err}"), "unknown opcode 0xcb at bytecode offset 7");
    }
}
