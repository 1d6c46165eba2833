//! Fields, methods and their attributes.

use super::bytecode::InstructionWalker;
use super::constant_pool::ConstantPool;
use super::reader::ByteReader;
use super::{ClassFileError, ClassFileResult, MAX_ANNOTATION_DEPTH};

const CODE: &[u8] = b"Code";
const VISIBLE_ANNOTATIONS: &[u8] = b"RuntimeVisibleAnnotations";
const INVISIBLE_ANNOTATIONS: &[u8] = b"RuntimeInvisibleAnnotations";

/// Location of a method's bytecode inside the class-file buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeSpan {
    /// Absolute offset of the first opcode.
    pub offset: usize,
    /// Length of the code array in bytes.
    pub len: usize,
}

impl CodeSpan {
    /// Borrow the code array from the buffer it was parsed from.
    #[must_use]
    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.offset..self.offset + self.len]
    }
}

/// A parsed method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo<'a> {
    pub access_flags: u16,
    pub name: &'a [u8],
    pub descriptor: &'a [u8],
    /// `None` for abstract and native methods.
    pub code: Option<CodeSpan>,
    /// Type descriptors of every runtime visible or invisible annotation.
    pub annotations: Vec<&'a [u8]>,
}

impl MethodInfo<'_> {
    /// Lossy name for diagnostics.
    #[must_use]
    pub fn display_name(&self) -> String {
        String::from_utf8_lossy(self.name).into_owned()
    }

    #[must_use]
    pub fn display_descriptor(&self) -> String {
        String::from_utf8_lossy(self.descriptor).into_owned()
    }
}

/// Attributes interpreted on a class, field, or method.
#[derive(Debug, Default)]
pub(crate) struct Attributes<'a> {
    pub code: Option<CodeSpan>,
    pub annotations: Vec<&'a [u8]>,
}

/// Parse one `field_info` or `method_info`.
pub(crate) fn parse_member<'a>(
    reader: &mut ByteReader<'a>,
    pool: &ConstantPool<'a>,
    is_method: bool,
) -> ClassFileResult<MethodInfo<'a>> {
    let access_flags = reader.u16("member access_flags")?;
    let name = pool.utf8(reader.u16("member name_index")?)?;
    let descriptor = pool.utf8(reader.u16("member descriptor_index")?)?;
    let attrs = parse_attributes(reader, pool, is_method)?;
    Ok(MethodInfo {
        access_flags,
        name,
        descriptor,
        code: attrs.code,
        annotations: attrs.annotations,
    })
}

/// Parse an `attributes_count` table. `Code` is only interpreted when
/// `with_code` is set; otherwise it is skipped like any other attribute.
pub(crate) fn parse_attributes<'a>(
    reader: &mut ByteReader<'a>,
    pool: &ConstantPool<'a>,
    with_code: bool,
) -> ClassFileResult<Attributes<'a>> {
    let count = reader.u16("attributes_count")?;
    let mut attrs = Attributes::default();
    for _ in 0..count {
        let name = pool.utf8(reader.u16("attribute_name_index")?)?;
        let len = reader.u32("attribute_length")? as usize;
        let start = reader.position();
        let body = reader.bytes(len, "attribute body")?;

        if with_code && name == CODE {
            attrs.code = Some(parse_code(body, start)?);
        } else if name == VISIBLE_ANNOTATIONS || name == INVISIBLE_ANNOTATIONS {
            parse_annotations(body, pool, &mut attrs.annotations)?;
        }
    }
    Ok(attrs)
}

fn parse_code(body: &[u8], body_offset: usize) -> ClassFileResult<CodeSpan> {
    let mut r = ByteReader::new(body);
    r.skip(4, "max_stack/max_locals")?;
    let code_len = r.u32("code_length")? as usize;
    let code_offset = r.position();
    let code = r.bytes(code_len, "code")?;
    for insn in InstructionWalker::new(code) {
        insn?;
    }

    let exceptions = r.u16("exception_table_length")? as usize;
    r.skip(exceptions * 8, "exception_table")?;
    let nested = r.u16("code attributes_count")?;
    for _ in 0..nested {
        r.skip(2, "code attribute name")?;
        let len = r.u32("code attribute length")? as usize;
        r.skip(len, "code attribute body")?;
    }
    if r.remaining() != 0 {
        return Err(ClassFileError::CodeLengthMismatch {
            declared: body.len(),
            parsed: r.position(),
        });
    }

    Ok(CodeSpan {
        offset: body_offset + code_offset,
        len: code_len,
    })
}

fn parse_annotations<'a>(
    body: &'a [u8],
    pool: &ConstantPool<'a>,
    out: &mut Vec<&'a [u8]>,
) -> ClassFileResult<()> {
    let mut r = ByteReader::new(body);
    let count = r.u16("num_annotations")?;
    for _ in 0..count {
        out.push(annotation(&mut r, pool, 0)?);
    }
    if r.remaining() != 0 {
        return Err(ClassFileError::MalformedAnnotation {
            offset: r.position(),
        });
    }
    Ok(())
}

/// Parse one annotation and return its type descriptor.
fn annotation<'a>(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool<'a>,
    depth: usize,
) -> ClassFileResult<&'a [u8]> {
    if depth > MAX_ANNOTATION_DEPTH {
        return Err(ClassFileError::MalformedAnnotation {
            offset: r.position(),
        });
    }
    let type_descriptor = pool.utf8(r.u16("annotation type_index")?)?;
    let pairs = r.u16("num_element_value_pairs")?;
    for _ in 0..pairs {
        r.skip(2, "element_name_index")?;
        element_value(r, pool, depth)?;
    }
    Ok(type_descriptor)
}

fn element_value(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool<'_>,
    depth: usize,
) -> ClassFileResult<()> {
    let offset = r.position();
    if depth > MAX_ANNOTATION_DEPTH {
        return Err(ClassFileError::MalformedAnnotation { offset });
    }
    match r.u8("element_value tag")? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => {
            r.skip(2, "element_value index")
        }
        b'e' => r.skip(4, "enum_const_value"),
        b'@' => annotation(r, pool, depth + 1).map(|_| ()),
        b'[' => {
            let n = r.u16("array num_values")?;
            for _ in 0..n {
                element_value(r, pool, depth + 1)?;
            }
            Ok(())
        }
        _ => Err(ClassFileError::MalformedAnnotation { offset }),
    }
}
