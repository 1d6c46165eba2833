//! Instruction boundaries inside a `Code` attribute.
//!
//! The walker decodes instruction lengths only. It never interprets operands
//! beyond what is needed to find the next opcode, which is enough to tell an
//! `invokestatic` apart from operand bytes that happen to equal `0xb8`.

use super::reader::ByteReader;
use super::{ClassFileError, ClassFileResult};

/// Opcodes the walker or the rewriter care about by name.
pub mod opcode {
    pub const IINC: u8 = 0x84;
    pub const TABLESWITCH: u8 = 0xaa;
    pub const LOOKUPSWITCH: u8 = 0xab;
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    pub const INVOKESPECIAL: u8 = 0xb7;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const INVOKEINTERFACE: u8 = 0xb9;
    pub const WIDE: u8 = 0xc4;
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Offset of the opcode from the start of the code array.
    pub pc: usize,
    pub opcode: u8,
    /// Total length including the opcode byte.
    pub len: usize,
}

impl Instruction {
    /// Big-endian `u2` operand following the opcode (constant-pool index for
    /// the `invoke*` family).
    #[must_use]
    pub fn operand_u16(&self, code: &[u8]) -> Option<u16> {
        let hi = *code.get(self.pc + 1)?;
        let lo = *code.get(self.pc + 2)?;
        Some(u16::from_be_bytes([hi, lo]))
    }
}

/// Iterator over the instructions of a code array. Stops after the first
/// error.
#[derive(Debug, Clone)]
pub struct InstructionWalker<'a> {
    code: &'a [u8],
    pc: usize,
    failed: bool,
}

impl<'a> InstructionWalker<'a> {
    #[must_use]
    pub fn new(code: &'a [u8]) -> Self {
        Self {
            code,
            pc: 0,
            failed: false,
        }
    }
}

impl Iterator for InstructionWalker<'_> {
    type Item = ClassFileResult<Instruction>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pc >= self.code.len() {
            return None;
        }
        let pc = self.pc;
        match instruction_length(self.code, pc) {
            Ok(len) => {
                self.pc += len;
                Some(Ok(Instruction {
                    pc,
                    opcode: self.code[pc],
                    len,
                }))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Length of the instruction starting at `pc`, bounds-checked against `code`.
pub fn instruction_length(code: &[u8], pc: usize) -> ClassFileResult<usize> {
    let op = code[pc];
    let len = match op {
        opcode::TABLESWITCH => tableswitch_length(code, pc)?,
        opcode::LOOKUPSWITCH => lookupswitch_length(code, pc)?,
        opcode::WIDE => wide_length(code, pc)?,
        _ => fixed_length(op).ok_or(ClassFileError::UnknownOpcode { pc, opcode: op })?,
    };
    let available = code.len() - pc;
    if len > available {
        return Err(ClassFileError::Truncated {
            context: "instruction operands",
            offset: pc,
            needed: len,
            available,
        });
    }
    Ok(len)
}

fn fixed_length(op: u8) -> Option<usize> {
    let len = match op {
        0x00..=0x0f => 1,
        0x10 => 2,
        0x11 => 3,
        0x12 => 2,
        0x13 | 0x14 => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x83 => 1,
        opcode::IINC => 3,
        0x85..=0x98 => 1,
        0x99..=0xa8 => 3,
        0xa9 => 2,
        0xac..=0xb1 => 1,
        0xb2..=0xb8 => 3,
        0xb9 | 0xba => 5,
        0xbb => 3,
        0xbc => 2,
        0xbd => 3,
        0xbe | 0xbf => 1,
        0xc0 | 0xc1 => 3,
        0xc2 | 0xc3 => 1,
        0xc5 => 4,
        0xc6 | 0xc7 => 3,
        0xc8 | 0xc9 => 5,
        _ => return None,
    };
    Some(len)
}

/// Padding after a switch opcode so the operands start on a 4-byte boundary
/// relative to the start of the code array.
fn switch_padding(pc: usize) -> usize {
    (4 - (pc + 1) % 4) % 4
}

fn tableswitch_length(code: &[u8], pc: usize) -> ClassFileResult<usize> {
    let pad = switch_padding(pc);
    let mut r = ByteReader::at(code, pc + 1 + pad);
    let _default = r.i32("tableswitch default")?;
    let low = i64::from(r.i32("tableswitch low")?);
    let high = i64::from(r.i32("tableswitch high")?);
    if low > high {
        return Err(ClassFileError::MalformedSwitch { pc });
    }
    let targets = usize::try_from(high - low + 1).map_err(|_| ClassFileError::MalformedSwitch { pc })?;
    targets
        .checked_mul(4)
        .and_then(|t| t.checked_add(1 + pad + 12))
        .ok_or(ClassFileError::MalformedSwitch { pc })
}

fn lookupswitch_length(code: &[u8], pc: usize) -> ClassFileResult<usize> {
    let pad = switch_padding(pc);
    let mut r = ByteReader::at(code, pc + 1 + pad);
    let _default = r.i32("lookupswitch default")?;
    let npairs = r.i32("lookupswitch npairs")?;
    let pairs = usize::try_from(npairs).map_err(|_| ClassFileError::MalformedSwitch { pc })?;
    pairs
        .checked_mul(8)
        .and_then(|p| p.checked_add(1 + pad + 8))
        .ok_or(ClassFileError::MalformedSwitch { pc })
}

fn wide_length(code: &[u8], pc: usize) -> ClassFileResult<usize> {
    let modified = *code.get(pc + 1).ok_or(ClassFileError::Truncated {
        context: "wide opcode",
        offset: pc,
        needed: 2,
        available: code.len() - pc,
    })?;
    match modified {
        opcode::IINC => Ok(6),
        0x15..=0x19 | 0x36..=0x3a | 0xa9 => Ok(4),
        other => Err(ClassFileError::UnknownOpcode {
            pc: pc + 1,
            opcode: other,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(code: &[u8]) -> Vec<Instruction> {
        InstructionWalker::new(code)
            .collect::<ClassFileResult<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn simple_sequence() {
        // iconst_1; invokestatic #7; return
        let code = [0x04, 0xb8, 0x00, 0x07, 0xb1];
        let insns = walk(&code);
        assert_eq!(insns.len(), 3);
        assert_eq!(insns[1].opcode, opcode::INVOKESTATIC);
        assert_eq!(insns[1].pc, 1);
        assert_eq!(insns[1].operand_u16(&code), Some(7));
        assert_eq!(insns[2].pc, 4);
    }

    #[test]
    fn operand_bytes_are_not_opcodes() {
        // sipush 0xb8b8; return
        let code = [0x11, 0xb8, 0xb8, 0xb1];
        let insns = walk(&code);
        assert_eq!(insns.len(), 2);
        assert!(insns.iter().all(|i| i.opcode != opcode::INVOKESTATIC));
    }

    #[test]
    fn tableswitch_padding_depends_on_pc() {
        // nop; tableswitch (pc=1, pad=2) default, low=0, high=1, 2 targets; return
        let mut code = vec![0x00, opcode::TABLESWITCH, 0, 0];
        code.extend_from_slice(&0_i32.to_be_bytes());
        code.extend_from_slice(&0_i32.to_be_bytes());
        code.extend_from_slice(&1_i32.to_be_bytes());
        code.extend_from_slice(&0_i32.to_be_bytes());
        code.extend_from_slice(&0_i32.to_be_bytes());
        code.push(0xb1);
        let insns = walk(&code);
        assert_eq!(insns.len(), 3);
        assert_eq!(insns[1].len, 1 + 2 + 12 + 8);
        assert_eq!(insns[2].pc, code.len() - 1);
    }

    #[test]
    fn lookupswitch_length() {
        // lookupswitch at pc=0 (pad=3), default, npairs=1, one pair; return
        let mut code = vec![opcode::LOOKUPSWITCH, 0, 0, 0];
        code.extend_from_slice(&0_i32.to_be_bytes());
        code.extend_from_slice(&1_i32.to_be_bytes());
        code.extend_from_slice(&5_i32.to_be_bytes());
        code.extend_from_slice(&0_i32.to_be_bytes());
        code.push(0xb1);
        let insns = walk(&code);
        assert_eq!(insns[0].len, 1 + 3 + 8 + 8);
        assert_eq!(insns[1].opcode, 0xb1);
    }

    #[test]
    fn wide_forms() {
        // wide iinc 1 100; wide iload 300; return
        let code = [0xc4, 0x84, 0x00, 0x01, 0x00, 0x64, 0xc4, 0x15, 0x01, 0x2c, 0xb1];
        let insns = walk(&code);
        assert_eq!(insns.iter().map(|i| i.len).collect::<Vec<_>>(), [6, 4, 1]);
    }

    #[test]
    fn rejects_undefined_opcode() {
        let code = [0x00, 0xcb];
        let err = InstructionWalker::new(&code)
            .collect::<ClassFileResult<Vec<_>>>()
            .unwrap_err();
        assert_eq!(err, ClassFileError::UnknownOpcode { pc: 1, opcode: 0xcb });
    }

    #[test]
    fn rejects_truncated_operand() {
        let code = [0xb8, 0x00];
        let err = InstructionWalker::new(&code)
            .collect::<ClassFileResult<Vec<_>>>()
            .unwrap_err();
        assert!(matches!(err, ClassFileError::Truncated { offset: 0, .. }));
    }

    #[test]
    fn rejects_inverted_tableswitch() {
        let mut code = vec![opcode::TABLESWITCH, 0, 0, 0];
        code.extend_from_slice(&0_i32.to_be_bytes());
        code.extend_from_slice(&5_i32.to_be_bytes());
        code.extend_from_slice(&1_i32.to_be_bytes());
        assert_eq!(
            instruction_length(&code, 0).unwrap_err(),
            ClassFileError::MalformedSwitch { pc: 0 }
        );
    }
}
