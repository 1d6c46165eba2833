//! Constant-pool parsing and lookup.
//!
//! Slot numbering follows the class-file convention: slot 0 is unused and
//! `Long`/`Double` entries occupy two slots, the second of which is
//! [`Constant::Unusable`].

use super::reader::ByteReader;
use super::{ClassFileError, ClassFileResult};

/// Constant-pool tags (JVMS table 4.4-B).
pub mod tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELDREF: u8 = 9;
    pub const METHODREF: u8 = 10;
    pub const INTERFACE_METHODREF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

/// A single constant-pool entry. `Utf8` borrows the raw (modified UTF-8)
/// bytes from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constant<'a> {
    Utf8(&'a [u8]),
    Integer(u32),
    Float(u32),
    Long(u64),
    Double(u64),
    Class {
        name_index: u16,
    },
    String {
        string_index: u16,
    },
    Fieldref {
        class_index: u16,
        name_and_type_index: u16,
    },
    Methodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodref {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    MethodHandle {
        reference_kind: u8,
        reference_index: u16,
    },
    MethodType {
        descriptor_index: u16,
    },
    Dynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
    Module {
        name_index: u16,
    },
    Package {
        name_index: u16,
    },
    /// Slot 0, and the upper slot of a `Long` or `Double`.
    Unusable,
}

impl Constant<'_> {
    /// Number of pool slots this entry occupies.
    #[must_use]
    pub const fn slots(&self) -> usize {
        match self {
            Self::Long(_) | Self::Double(_) => 2,
            _ => 1,
        }
    }

    /// Append the encoded entry to `out`. `Unusable` encodes to nothing.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match *self {
            Self::Fieldref {
                class_index,
                name_and_type_index,
            } => put_pair(out, tag::FIELDREF, class_index, name_and_type_index),
            Self::Methodref {
                class_index,
                name_and_type_index,
            } => put_pair(out, tag::METHODREF, class_index, name_and_type_index),
            Self::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => put_pair(out, tag::INTERFACE_METHODREF, class_index, name_and_type_index),
            Self::NameAndType {
                name_index,
                descriptor_index,
            } => put_pair(out, tag::NAME_AND_TYPE, name_index, descriptor_index),
            Self::Dynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => put_pair(out, tag::DYNAMIC, bootstrap_method_attr_index, name_and_type_index),
            Self::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => put_pair(
                out,
                tag::INVOKE_DYNAMIC,
                bootstrap_method_attr_index,
                name_and_type_index,
            ),
            Self::Utf8(bytes) => {
                out.push(tag::UTF8);
                // Callers never build entries longer than u16::MAX; the parser
                // cannot produce them either.
                out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
                out.extend_from_slice(bytes);
            }
            Self::Integer(v) => {
                out.push(tag::INTEGER);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Self::Float(v) => {
                out.push(tag::FLOAT);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Self::Long(v) => {
                out.push(tag::LONG);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Self::Double(v) => {
                out.push(tag::DOUBLE);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Self::Class { name_index } => {
                out.push(tag::CLASS);
                out.extend_from_slice(&name_index.to_be_bytes());
            }
            Self::String { string_index } => {
                out.push(tag::STRING);
                out.extend_from_slice(&string_index.to_be_bytes());
            }
            Self::MethodHandle {
                reference_kind,
                reference_index,
            } => {
                out.push(tag::METHOD_HANDLE);
                out.push(reference_kind);
                out.extend_from_slice(&reference_index.to_be_bytes());
            }
            Self::MethodType { descriptor_index } => {
                out.push(tag::METHOD_TYPE);
                out.extend_from_slice(&descriptor_index.to_be_bytes());
            }
            Self::Module { name_index } => {
                out.push(tag::MODULE);
                out.extend_from_slice(&name_index.to_be_bytes());
            }
            Self::Package { name_index } => {
                out.push(tag::PACKAGE);
                out.extend_from_slice(&name_index.to_be_bytes());
            }
            Self::Unusable => {}
        }
    }
}

/// A resolved `Methodref` or `InterfaceMethodref`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    /// Internal name of the owning class (`java/lang/System`).
    pub owner: &'a [u8],
    /// Member name.
    pub name: &'a [u8],
    /// Method descriptor (`(I)V`).
    pub descriptor: &'a [u8],
    /// Pool index of the descriptor `Utf8`, reusable by redirect entries.
    pub descriptor_index: u16,
    /// True for `InterfaceMethodref`.
    pub interface: bool,
}

/// Parsed constant pool.
#[derive(Debug, Clone)]
pub struct ConstantPool<'a> {
    entries: Vec<Constant<'a>>,
    end_offset: usize,
}

impl<'a> ConstantPool<'a> {
    /// Parse `constant_pool_count` and the entries that follow.
    ///
    /// # Errors
    ///
    /// Fails on truncation, unknown tags, or cross references that point at
    /// missing or mistyped entries.
    pub fn parse(reader: &mut ByteReader<'a>) -> ClassFileResult<Self> {
        let count = reader.u16("constant_pool_count")? as usize;
        let mut entries = Vec::with_capacity(count.max(1));
        entries.push(Constant::Unusable);

        while entries.len() < count {
            let index = entries.len() as u16;
            let entry = parse_entry(reader, index)?;
            let slots = entry.slots();
            entries.push(entry);
            if slots == 2 {
                entries.push(Constant::Unusable);
            }
        }
        // A trailing Long/Double may not spill past the declared count.
        if entries.len() > count.max(1) {
            return Err(ClassFileError::ConstantIndexOutOfRange(count as u16));
        }

        let pool = Self {
            entries,
            end_offset: reader.position(),
        };
        pool.validate()?;
        Ok(pool)
    }

    /// Value of the `constant_pool_count` field.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Absolute offset of the first byte after the last entry.
    #[must_use]
    pub fn end_offset(&self) -> usize {
        self.end_offset
    }

    /// Iterate over usable entries with their slot index.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant<'a>)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, Constant::Unusable))
            .map(|(i, c)| (i as u16, c))
    }

    /// Look up a slot.
    pub fn get(&self, index: u16) -> ClassFileResult<&Constant<'a>> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => Err(ClassFileError::ConstantIndexOutOfRange(index)),
            Some(c) => Ok(c),
        }
    }

    /// Resolve a `Utf8` slot.
    pub fn utf8(&self, index: u16) -> ClassFileResult<&'a [u8]> {
        match self.get(index)? {
            Constant::Utf8(bytes) => Ok(bytes),
            _ => Err(ClassFileError::UnexpectedConstant {
                index,
                expected: "Utf8",
            }),
        }
    }

    /// Resolve a `Class` slot to its internal name.
    pub fn class_name(&self, index: u16) -> ClassFileResult<&'a [u8]> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => Err(ClassFileError::UnexpectedConstant {
                index,
                expected: "Class",
            }),
        }
    }

    /// Resolve a `Methodref` or `InterfaceMethodref` slot.
    pub fn method_ref(&self, index: u16) -> ClassFileResult<MemberRef<'a>> {
        let (class_index, nat_index, interface) = match self.get(index)? {
            Constant::Methodref {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index, false),
            Constant::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index, true),
            _ => {
                return Err(ClassFileError::UnexpectedConstant {
                    index,
                    expected: "Methodref",
                });
            }
        };
        let (name_index, descriptor_index) = self.name_and_type(nat_index)?;
        Ok(MemberRef {
            owner: self.class_name(class_index)?,
            name: self.utf8(name_index)?,
            descriptor: self.utf8(descriptor_index)?,
            descriptor_index,
            interface,
        })
    }

    fn name_and_type(&self, index: u16) -> ClassFileResult<(u16, u16)> {
        match self.get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((*name_index, *descriptor_index)),
            _ => Err(ClassFileError::UnexpectedConstant {
                index,
                expected: "NameAndType",
            }),
        }
    }

    /// Find an existing `Utf8` entry with exactly these bytes.
    #[must_use]
    pub fn find_utf8(&self, value: &[u8]) -> Option<u16> {
        self.iter().find_map(|(i, c)| match c {
            Constant::Utf8(bytes) if *bytes == value => Some(i),
            _ => None,
        })
    }

    /// Find an existing `Class` entry naming `internal_name`.
    #[must_use]
    pub fn find_class(&self, internal_name: &[u8]) -> Option<u16> {
        self.iter().find_map(|(i, c)| match c {
            Constant::Class { name_index } if self.utf8(*name_index).ok() == Some(internal_name) => {
                Some(i)
            }
            _ => None,
        })
    }

    fn validate(&self) -> ClassFileResult<()> {
        for (index, entry) in self.iter() {
            match *entry {
                Constant::Class { name_index }
                | Constant::Module { name_index }
                | Constant::Package { name_index } => {
                    self.utf8(name_index)?;
                }
                Constant::String { string_index } => {
                    self.utf8(string_index)?;
                }
                Constant::MethodType { descriptor_index } => {
                    self.utf8(descriptor_index)?;
                }
                Constant::NameAndType {
                    name_index,
                    descriptor_index,
                } => {
                    self.utf8(name_index)?;
                    self.utf8(descriptor_index)?;
                }
                Constant::Fieldref {
                    class_index,
                    name_and_type_index,
                }
                | Constant::Methodref {
                    class_index,
                    name_and_type_index,
                }
                | Constant::InterfaceMethodref {
                    class_index,
                    name_and_type_index,
                } => {
                    self.class_name(class_index)?;
                    self.name_and_type(name_and_type_index)?;
                }
                Constant::Dynamic {
                    name_and_type_index,
                    ..
                }
                | Constant::InvokeDynamic {
                    name_and_type_index,
                    ..
                } => {
                    self.name_and_type(name_and_type_index)?;
                }
                Constant::MethodHandle {
                    reference_kind,
                    reference_index,
                } => {
                    if !(1..=9).contains(&reference_kind) {
                        return Err(ClassFileError::UnexpectedConstant {
                            index,
                            expected: "MethodHandle reference kind 1..=9",
                        });
                    }
                    self.get(reference_index)?;
                }
                Constant::Utf8(_)
                | Constant::Integer(_)
                | Constant::Float(_)
                | Constant::Long(_)
                | Constant::Double(_)
                | Constant::Unusable => {}
            }
        }
        Ok(())
    }
}

fn put_pair(out: &mut Vec<u8>, tag: u8, a: u16, b: u16) {
    out.push(tag);
    out.extend_from_slice(&a.to_be_bytes());
    out.extend_from_slice(&b.to_be_bytes());
}

fn parse_entry<'a>(reader: &mut ByteReader<'a>, index: u16) -> ClassFileResult<Constant<'a>> {
    let t = reader.u8("constant tag")?;
    let entry = match t {
        tag::UTF8 => {
            let len = reader.u16("utf8 length")? as usize;
            Constant::Utf8(reader.bytes(len, "utf8 bytes")?)
        }
        tag::INTEGER => Constant::Integer(reader.u32("integer constant")?),
        tag::FLOAT => Constant::Float(reader.u32("float constant")?),
        tag::LONG | tag::DOUBLE => {
            let hi = u64::from(reader.u32("wide constant")?);
            let lo = u64::from(reader.u32("wide constant")?);
            let v = (hi << 32) | lo;
            if t == tag::LONG {
                Constant::Long(v)
            } else {
                Constant::Double(v)
            }
        }
        tag::CLASS => Constant::Class {
            name_index: reader.u16("class name index")?,
        },
        tag::STRING => Constant::String {
            string_index: reader.u16("string index")?,
        },
        tag::FIELDREF | tag::METHODREF | tag::INTERFACE_METHODREF => {
            let class_index = reader.u16("ref class index")?;
            let name_and_type_index = reader.u16("ref name_and_type index")?;
            match t {
                tag::FIELDREF => Constant::Fieldref {
                    class_index,
                    name_and_type_index,
                },
                tag::METHODREF => Constant::Methodref {
                    class_index,
                    name_and_type_index,
                },
                _ => Constant::InterfaceMethodref {
                    class_index,
                    name_and_type_index,
                },
            }
        }
        tag::NAME_AND_TYPE => Constant::NameAndType {
            name_index: reader.u16("name_and_type name index")?,
            descriptor_index: reader.u16("name_and_type descriptor index")?,
        },
        tag::METHOD_HANDLE => Constant::MethodHandle {
            reference_kind: reader.u8("method handle kind")?,
            reference_index: reader.u16("method handle reference")?,
        },
        tag::METHOD_TYPE => Constant::MethodType {
            descriptor_index: reader.u16("method type descriptor")?,
        },
        tag::DYNAMIC | tag::INVOKE_DYNAMIC => {
            let bootstrap_method_attr_index = reader.u16("bootstrap method index")?;
            let name_and_type_index = reader.u16("dynamic name_and_type index")?;
            if t == tag::DYNAMIC {
                Constant::Dynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                }
            } else {
                Constant::InvokeDynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                }
            }
        }
        tag::MODULE => Constant::Module {
            name_index: reader.u16("module name index")?,
        },
        tag::PACKAGE => Constant::Package {
            name_index: reader.u16("package name index")?,
        },
        other => return Err(ClassFileError::UnknownConstantTag { index, tag: other }),
    };
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_pool(entries: &[Constant<'_>]) -> Vec<u8> {
        let slots: usize = entries.iter().map(Constant::slots).sum();
        let mut out = ((slots + 1) as u16).to_be_bytes().to_vec();
        for e in entries {
            e.encode(&mut out);
        }
        out
    }

    #[test]
    fn resolves_method_ref() {
        let bytes = encode_pool(&[
            Constant::Utf8(b"java/lang/System"),
            Constant::Class { name_index: 1 },
            Constant::Utf8(b"exit"),
            Constant::Utf8(b"(I)V"),
            Constant::NameAndType {
                name_index: 3,
                descriptor_index: 4,
            },
            Constant::Methodref {
                class_index: 2,
                name_and_type_index: 5,
            },
        ]);
        let mut reader = ByteReader::new(&bytes);
        let pool = ConstantPool::parse(&mut reader).unwrap();
        assert_eq!(pool.count(), 7);
        assert_eq!(pool.end_offset(), bytes.len());

        let r = pool.method_ref(6).unwrap();
        assert_eq!(r.owner, b"java/lang/System");
        assert_eq!(r.name, b"exit");
        assert_eq!(r.descriptor, b"(I)V");
        assert_eq!(r.descriptor_index, 4);
        assert!(!r.interface);
        assert_eq!(pool.find_class(b"java/lang/System"), Some(2));
        assert_eq!(pool.find_utf8(b"exit"), Some(3));
    }

    #[test]
    fn long_occupies_two_slots() {
        let bytes = encode_pool(&[Constant::Long(42), Constant::Utf8(b"after")]);
        let mut reader = ByteReader::new(&bytes);
        let pool = ConstantPool::parse(&mut reader).unwrap();
        assert_eq!(pool.count(), 4);
        assert_eq!(pool.get(1).unwrap(), &Constant::Long(42));
        assert!(matches!(
            pool.get(2),
            Err(ClassFileError::ConstantIndexOutOfRange(2))
        ));
        assert_eq!(pool.utf8(3).unwrap(), b"after");
    }

    #[test]
    fn rejects_unknown_tag() {
        let bytes = [0x00, 0x02, 0x02, 0x00];
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(
            ConstantPool::parse(&mut reader).unwrap_err(),
            ClassFileError::UnknownConstantTag { index: 1, tag: 2 }
        );
    }

    #[test]
    fn rejects_dangling_class_reference() {
        let bytes = encode_pool(&[Constant::Class { name_index: 9 }]);
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(
            ConstantPool::parse(&mut reader).unwrap_err(),
            ClassFileError::ConstantIndexOutOfRange(9)
        );
    }

    #[test]
    fn rejects_mistyped_reference() {
        let bytes = encode_pool(&[
            Constant::Integer(7),
            Constant::Class { name_index: 1 },
        ]);
        let mut reader = ByteReader::new(&bytes);
        assert_eq!(
            ConstantPool::parse(&mut reader).unwrap_err(),
            ClassFileError::UnexpectedConstant {
                index: 1,
                expected: "Utf8"
            }
        );
    }
}
