//! Top-level `ClassFile` structure.

use super::constant_pool::ConstantPool;
use super::member::{MethodInfo, parse_attributes, parse_member};
use super::reader::ByteReader;
use super::{CLASS_MAGIC, ClassFileError, ClassFileResult};

/// A parsed class file borrowing from its input buffer.
#[derive(Debug, Clone)]
pub struct ClassFile<'a> {
    data: &'a [u8],
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool<'a>,
    pub access_flags: u16,
    /// Internal name of this class.
    pub this_class: &'a [u8],
    /// `None` only for `java/lang/Object` and module-info.
    pub super_class: Option<&'a [u8]>,
    pub interfaces: Vec<&'a [u8]>,
    pub field_count: usize,
    pub methods: Vec<MethodInfo<'a>>,
    /// Class-level annotation type descriptors.
    pub annotations: Vec<&'a [u8]>,
}

impl<'a> ClassFile<'a> {
    /// Parse and validate a complete class file.
    ///
    /// Every method body is walked instruction by instruction, so a
    /// successful parse guarantees the rewriter can locate call sites.
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found.
    pub fn parse(data: &'a [u8]) -> ClassFileResult<Self> {
        let mut r = ByteReader::new(data);
        let magic = r.u32("magic")?;
        if magic != CLASS_MAGIC {
            return Err(ClassFileError::InvalidMagic(magic));
        }
        let minor_version = r.u16("minor_version")?;
        let major_version = r.u16("major_version")?;
        let constant_pool = ConstantPool::parse(&mut r)?;

        let access_flags = r.u16("access_flags")?;
        let this_class = constant_pool.class_name(r.u16("this_class")?)?;
        let super_index = r.u16("super_class")?;
        let super_class = if super_index == 0 {
            None
        } else {
            Some(constant_pool.class_name(super_index)?)
        };

        let interface_count = r.u16("interfaces_count")?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(constant_pool.class_name(r.u16("interface index")?)?);
        }

        let field_count = r.u16("fields_count")? as usize;
        for _ in 0..field_count {
            parse_member(&mut r, &constant_pool, false)?;
        }

        let method_count = r.u16("methods_count")?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(parse_member(&mut r, &constant_pool, true)?);
        }

        let attrs = parse_attributes(&mut r, &constant_pool, false)?;
        if r.remaining() != 0 {
            return Err(ClassFileError::TrailingBytes(r.remaining()));
        }

        Ok(Self {
            data,
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            field_count,
            methods,
            annotations: attrs.annotations,
        })
    }

    /// The buffer this class was parsed from.
    #[must_use]
    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Absolute offset of the `constant_pool_count` field.
    #[must_use]
    pub const fn constant_pool_count_offset() -> usize {
        8
    }

    /// Look up a method by name and descriptor.
    #[must_use]
    pub fn method(&self, name: &[u8], descriptor: &[u8]) -> Option<&MethodInfo<'a>> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }
}
