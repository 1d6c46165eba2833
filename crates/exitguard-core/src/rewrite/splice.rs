//! Constant-pool growth and operand patching.
//!
//! New entries are appended after the last existing constant, so every
//! existing index stays valid. The only other edits are two-byte operand
//! patches inside code arrays, which keeps instruction lengths, branch
//! offsets and stack-map frames intact.

use std::collections::HashMap;

use crate::classfile::constant_pool::Constant;
use crate::classfile::{
    ClassFile, ClassFileError, ClassFileResult, ConstantPool, MAX_CONSTANT_POOL_COUNT,
};

/// Accumulates constants to append and remembers what it already added.
#[derive(Debug)]
pub(crate) struct PoolAppender<'p, 'a> {
    pool: &'p ConstantPool<'a>,
    next: usize,
    encoded: Vec<u8>,
    utf8: HashMap<Vec<u8>, u16>,
    classes: HashMap<Vec<u8>, u16>,
    redirects: HashMap<Vec<u8>, u16>,
}

impl<'p, 'a> PoolAppender<'p, 'a> {
    pub(crate) fn new(pool: &'p ConstantPool<'a>) -> Self {
        Self {
            pool,
            next: pool.count(),
            encoded: Vec::new(),
            utf8: HashMap::new(),
            classes: HashMap::new(),
            redirects: HashMap::new(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.encoded.is_empty()
    }

    fn push(&mut self, entry: Constant<'_>) -> ClassFileResult<u16> {
        let needed = self.next + entry.slots();
        if needed > MAX_CONSTANT_POOL_COUNT {
            return Err(ClassFileError::ConstantPoolOverflow { needed });
        }
        let index = self.next as u16;
        entry.encode(&mut self.encoded);
        self.next = needed;
        Ok(index)
    }

    fn utf8(&mut self, value: &[u8]) -> ClassFileResult<u16> {
        if let Some(i) = self.pool.find_utf8(value).or_else(|| self.utf8.get(value).copied()) {
            return Ok(i);
        }
        let i = self.push(Constant::Utf8(value))?;
        self.utf8.insert(value.to_vec(), i);
        Ok(i)
    }

    fn class(&mut self, internal_name: &[u8]) -> ClassFileResult<u16> {
        if let Some(i) = self
            .pool
            .find_class(internal_name)
            .or_else(|| self.classes.get(internal_name).copied())
        {
            return Ok(i);
        }
        let name_index = self.utf8(internal_name)?;
        let i = self.push(Constant::Class { name_index })?;
        self.classes.insert(internal_name.to_vec(), i);
        Ok(i)
    }

    /// Index of a `Methodref` to `owner.name` with the given descriptor,
    /// appending it on first use. `descriptor_index` points at an existing
    /// `Utf8` holding the descriptor.
    pub(crate) fn method_ref(
        &mut self,
        owner: &[u8],
        name: &[u8],
        descriptor: &[u8],
        descriptor_index: u16,
    ) -> ClassFileResult<u16> {
        if let Some(i) = self.redirects.get(descriptor) {
            return Ok(*i);
        }
        let class_index = self.class(owner)?;
        let name_index = self.utf8(name)?;
        let name_and_type_index = self.push(Constant::NameAndType {
            name_index,
            descriptor_index,
        })?;
        let i = self.push(Constant::Methodref {
            class_index,
            name_and_type_index,
        })?;
        self.redirects.insert(descriptor.to_vec(), i);
        Ok(i)
    }

    /// Assemble the output: header, new count, original pool, appended
    /// entries, then the rest of the class with operands patched.
    ///
    /// `patches` hold absolute offsets into the original buffer.
    pub(crate) fn splice(self, class: &ClassFile<'_>, patches: &[(usize, u16)]) -> Vec<u8> {
        let data = class.bytes();
        let count_at = ClassFile::constant_pool_count_offset();
        let pool_end = class.constant_pool.end_offset();
        let shift = self.encoded.len();

        let mut out = Vec::with_capacity(data.len() + shift);
        out.extend_from_slice(&data[..count_at]);
        // count <= MAX_CONSTANT_POOL_COUNT is enforced by `push`.
        out.extend_from_slice(&(self.next as u16).to_be_bytes());
        out.extend_from_slice(&data[count_at + 2..pool_end]);
        out.extend_from_slice(&self.encoded);
        out.extend_from_slice(&data[pool_end..]);

        for &(offset, index) in patches {
            let at = offset + shift;
            out[at..at + 2].copy_from_slice(&index.to_be_bytes());
        }
        out
    }
}
