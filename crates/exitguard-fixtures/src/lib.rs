//! Class-file fixtures shared by exitguard tests and benchmarks.
//!
//! [`ClassFixture`] assembles small but structurally valid class files
//! without a Java toolchain. The bytecode is never verified or executed, only
//! parsed and rewritten, so method bodies need not balance the operand stack.

use std::collections::HashMap;

pub const SYSTEM: &str = "java/lang/System";
pub const EXIT: &str = "exit";
pub const EXIT_DESCRIPTOR: &str = "(I)V";
pub const MARKER: &str = "Lcom/ginsberg/junit/exit/agent/DoNotRewriteExitCalls;";

const INVOKESTATIC: u8 = 0xb8;
const TABLESWITCH: u8 = 0xaa;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Utf8(String),
    Class(String),
    NameAndType(String, String),
    Methodref(String, String, String),
    Integer(i32),
    Long(i64),
}

/// Deduplicating constant-pool encoder.
#[derive(Debug, Default)]
struct PoolBuilder {
    bytes: Vec<u8>,
    next: u16,
    seen: HashMap<Key, u16>,
}

impl PoolBuilder {
    fn new() -> Self {
        Self {
            next: 1,
            ..Self::default()
        }
    }

    fn intern(&mut self, key: Key, slots: u16, encode: impl FnOnce(&mut Vec<u8>)) -> u16 {
        if let Some(i) = self.seen.get(&key) {
            return *i;
        }
        let index = self.next;
        encode(&mut self.bytes);
        self.next += slots;
        self.seen.insert(key, index);
        index
    }

    fn utf8(&mut self, s: &str) -> u16 {
        self.intern(Key::Utf8(s.to_string()), 1, |out| {
            out.push(1);
            out.extend_from_slice(&(s.len() as u16).to_be_bytes());
            out.extend_from_slice(s.as_bytes());
        })
    }

    fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        self.intern(Key::Class(name.to_string()), 1, |out| {
            out.push(7);
            out.extend_from_slice(&name_index.to_be_bytes());
        })
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let n = self.utf8(name);
        let d = self.utf8(descriptor);
        self.intern(
            Key::NameAndType(name.to_string(), descriptor.to_string()),
            1,
            |out| {
                out.push(12);
                out.extend_from_slice(&n.to_be_bytes());
                out.extend_from_slice(&d.to_be_bytes());
            },
        )
    }

    fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let c = self.class(owner);
        let nat = self.name_and_type(name, descriptor);
        self.intern(
            Key::Methodref(owner.to_string(), name.to_string(), descriptor.to_string()),
            1,
            |out| {
                out.push(10);
                out.extend_from_slice(&c.to_be_bytes());
                out.extend_from_slice(&nat.to_be_bytes());
            },
        )
    }

    fn integer(&mut self, v: i32) -> u16 {
        self.intern(Key::Integer(v), 1, |out| {
            out.push(3);
            out.extend_from_slice(&v.to_be_bytes());
        })
    }

    fn long(&mut self, v: i64) -> u16 {
        self.intern(Key::Long(v), 2, |out| {
            out.push(5);
            out.extend_from_slice(&v.to_be_bytes());
        })
    }
}

#[derive(Debug, Clone)]
enum Op {
    Raw(Vec<u8>),
    PushInt(i32),
    PushLong(i64),
    Invoke {
        opcode: u8,
        owner: String,
        name: String,
        descriptor: String,
    },
    TableSwitch {
        targets: u16,
    },
}

/// Shape of the single `value` element carried by an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nesting {
    /// No elements.
    Empty,
    /// `value = [[...[0]...]]`, this many arrays deep.
    Arrays(usize),
    /// `value = @A(value = @A(...))`, this many annotations deep.
    Annotations(usize),
}

#[derive(Debug, Clone)]
struct AnnotationSpec {
    descriptor: String,
    visible: bool,
    nesting: Nesting,
}

impl AnnotationSpec {
    fn new(descriptor: &str, visible: bool, nesting: Nesting) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            visible,
            nesting,
        }
    }
}

/// A method under construction.
#[derive(Debug, Clone)]
pub struct MethodFixture {
    name: String,
    descriptor: String,
    access: u16,
    ops: Option<Vec<Op>>,
    annotations: Vec<AnnotationSpec>,
}

impl MethodFixture {
    /// A `public static` method with an empty body.
    pub fn new(name: &str, descriptor: &str) -> Self {
        Self {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access: 0x0009,
            ops: Some(Vec::new()),
            annotations: Vec::new(),
        }
    }

    /// A `public abstract` method with no `Code` attribute.
    pub fn abstract_method(name: &str, descriptor: &str) -> Self {
        Self {
            access: 0x0401,
            ops: None,
            ..Self::new(name, descriptor)
        }
    }

    fn op(mut self, op: Op) -> Self {
        if let Some(ops) = self.ops.as_mut() {
            ops.push(op);
        }
        self
    }

    /// Push an int using the shortest encoding (`iconst`, `bipush`,
    /// `sipush`, `ldc`/`ldc_w`).
    #[must_use]
    pub fn push_int(self, v: i32) -> Self {
        self.op(Op::PushInt(v))
    }

    /// `ldc2_w` of a long constant.
    #[must_use]
    pub fn push_long(self, v: i64) -> Self {
        self.op(Op::PushLong(v))
    }

    #[must_use]
    pub fn invoke_static(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.invoke(INVOKESTATIC, owner, name, descriptor)
    }

    /// Any `invoke*` opcode with a `Methodref` operand. `invokeinterface`
    /// is not supported.
    #[must_use]
    pub fn invoke(self, opcode: u8, owner: &str, name: &str, descriptor: &str) -> Self {
        self.op(Op::Invoke {
            opcode,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    /// `System.exit(code)`.
    #[must_use]
    pub fn call_exit(self, code: i32) -> Self {
        self.push_int(code)
            .invoke_static(SYSTEM, EXIT, EXIT_DESCRIPTOR)
    }

    /// A `tableswitch` with `targets` cases, all branching past the switch.
    #[must_use]
    pub fn table_switch(self, targets: u16) -> Self {
        self.op(Op::TableSwitch { targets })
    }

    /// Raw bytecode, copied verbatim.
    #[must_use]
    pub fn raw(self, bytes: &[u8]) -> Self {
        self.op(Op::Raw(bytes.to_vec()))
    }

    #[must_use]
    pub fn returns(self) -> Self {
        self.raw(&[0xb1])
    }

    /// Attach a class-retention (invisible) annotation.
    #[must_use]
    pub fn annotate(mut self, descriptor: &str) -> Self {
        self.annotations
            .push(AnnotationSpec::new(descriptor, false, Nesting::Empty));
        self
    }

    /// Attach a runtime-visible annotation.
    #[must_use]
    pub fn annotate_visible(mut self, descriptor: &str) -> Self {
        self.annotations
            .push(AnnotationSpec::new(descriptor, true, Nesting::Empty));
        self
    }

    /// Attach an invisible annotation whose `value` is an int wrapped in
    /// `levels` arrays.
    #[must_use]
    pub fn annotate_nested_arrays(mut self, descriptor: &str, levels: usize) -> Self {
        self.annotations
            .push(AnnotationSpec::new(descriptor, false, Nesting::Arrays(levels)));
        self
    }

    /// Attach an invisible annotation whose `value` is the same annotation,
    /// repeated `levels` times before ending in an int.
    #[must_use]
    pub fn annotate_nested_annotations(mut self, descriptor: &str, levels: usize) -> Self {
        self.annotations.push(AnnotationSpec::new(
            descriptor,
            false,
            Nesting::Annotations(levels),
        ));
        self
    }

    fn encode(&self, pool: &mut PoolBuilder, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.access.to_be_bytes());
        out.extend_from_slice(&pool.utf8(&self.name).to_be_bytes());
        out.extend_from_slice(&pool.utf8(&self.descriptor).to_be_bytes());

        let mut attrs = Vec::new();
        let mut attr_count = 0u16;
        if let Some(ops) = &self.ops {
            let code = assemble(ops, pool);
            let mut body = Vec::new();
            body.extend_from_slice(&8u16.to_be_bytes());
            body.extend_from_slice(&8u16.to_be_bytes());
            body.extend_from_slice(&(code.len() as u32).to_be_bytes());
            body.extend_from_slice(&code);
            body.extend_from_slice(&0u16.to_be_bytes());
            body.extend_from_slice(&0u16.to_be_bytes());
            put_attribute(pool, &mut attrs, "Code", &body);
            attr_count += 1;
        }
        attr_count += encode_annotations(pool, &mut attrs, &self.annotations);

        out.extend_from_slice(&attr_count.to_be_bytes());
        out.extend_from_slice(&attrs);
    }
}

fn assemble(ops: &[Op], pool: &mut PoolBuilder) -> Vec<u8> {
    let mut code = Vec::new();
    for op in ops {
        match op {
            Op::Raw(bytes) => code.extend_from_slice(bytes),
            Op::PushInt(v) => match *v {
                -1..=5 => code.push((0x03 + v) as u8),
                -128..=127 => code.extend_from_slice(&[0x10, *v as i8 as u8]),
                -32768..=32767 => {
                    code.push(0x11);
                    code.extend_from_slice(&(*v as i16).to_be_bytes());
                }
                _ => {
                    let index = pool.integer(*v);
                    if let Ok(narrow) = u8::try_from(index) {
                        code.extend_from_slice(&[0x12, narrow]);
                    } else {
                        code.push(0x13);
                        code.extend_from_slice(&index.to_be_bytes());
                    }
                }
            },
            Op::PushLong(v) => {
                code.push(0x14);
                code.extend_from_slice(&pool.long(*v).to_be_bytes());
            }
            Op::Invoke {
                opcode,
                owner,
                name,
                descriptor,
            } => {
                code.push(*opcode);
                code.extend_from_slice(&pool.method_ref(owner, name, descriptor).to_be_bytes());
            }
            Op::TableSwitch { targets } => {
                let pc = code.len();
                code.push(TABLESWITCH);
                let pad = (4 - (pc + 1) % 4) % 4;
                code.extend(std::iter::repeat_n(0u8, pad));
                let len = 1 + pad + 12 + 4 * usize::from(*targets);
                let jump = len as i32;
                code.extend_from_slice(&jump.to_be_bytes());
                code.extend_from_slice(&0i32.to_be_bytes());
                code.extend_from_slice(&(i32::from(*targets) - 1).to_be_bytes());
                for _ in 0..*targets {
                    code.extend_from_slice(&jump.to_be_bytes());
                }
            }
        }
    }
    code
}

fn put_attribute(pool: &mut PoolBuilder, out: &mut Vec<u8>, name: &str, body: &[u8]) {
    out.extend_from_slice(&pool.utf8(name).to_be_bytes());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
}

/// Encode annotation attributes; returns how many attributes were written.
fn encode_annotations(
    pool: &mut PoolBuilder,
    out: &mut Vec<u8>,
    annotations: &[AnnotationSpec],
) -> u16 {
    let mut written = 0;
    for (visible, attr) in [
        (true, "RuntimeVisibleAnnotations"),
        (false, "RuntimeInvisibleAnnotations"),
    ] {
        let selected: Vec<&AnnotationSpec> =
            annotations.iter().filter(|a| a.visible == visible).collect();
        if selected.is_empty() {
            continue;
        }
        let mut body = (selected.len() as u16).to_be_bytes().to_vec();
        for a in selected {
            encode_annotation(pool, &mut body, &a.descriptor, a.nesting);
        }
        put_attribute(pool, out, attr, &body);
        written += 1;
    }
    written
}

fn encode_annotation(
    pool: &mut PoolBuilder,
    out: &mut Vec<u8>,
    descriptor: &str,
    nesting: Nesting,
) {
    let type_index = pool.utf8(descriptor);
    out.extend_from_slice(&type_index.to_be_bytes());
    if nesting == Nesting::Empty {
        out.extend_from_slice(&0u16.to_be_bytes());
        return;
    }
    let value = pool.utf8("value");
    let leaf = pool.integer(0);
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&value.to_be_bytes());
    match nesting {
        Nesting::Empty => {}
        Nesting::Arrays(levels) => {
            for _ in 0..levels {
                out.push(b'[');
                out.extend_from_slice(&1u16.to_be_bytes());
            }
        }
        Nesting::Annotations(levels) => {
            for _ in 0..levels {
                out.push(b'@');
                out.extend_from_slice(&type_index.to_be_bytes());
                out.extend_from_slice(&1u16.to_be_bytes());
                out.extend_from_slice(&value.to_be_bytes());
            }
        }
    }
    out.push(b'I');
    out.extend_from_slice(&leaf.to_be_bytes());
}

/// A class under construction.
#[derive(Debug, Clone)]
pub struct ClassFixture {
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    fields: Vec<(String, String)>,
    methods: Vec<MethodFixture>,
    annotations: Vec<AnnotationSpec>,
    leading_longs: Vec<i64>,
}

impl ClassFixture {
    /// A public class extending `java/lang/Object`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            super_name: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            annotations: Vec::new(),
            leading_longs: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_interface(mut self, name: &str) -> Self {
        self.interfaces.push(name.to_string());
        self
    }

    #[must_use]
    pub fn with_field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.push((name.to_string(), descriptor.to_string()));
        self
    }

    #[must_use]
    pub fn with_method(mut self, method: MethodFixture) -> Self {
        self.methods.push(method);
        self
    }

    /// Attach a class-retention annotation to the class.
    #[must_use]
    pub fn annotate(mut self, descriptor: &str) -> Self {
        self.annotations
            .push(AnnotationSpec::new(descriptor, false, Nesting::Empty));
        self
    }

    #[must_use]
    pub fn annotate_visible(mut self, descriptor: &str) -> Self {
        self.annotations
            .push(AnnotationSpec::new(descriptor, true, Nesting::Empty));
        self
    }

    /// Intern a `Long` constant before anything else, so later indices sit
    /// behind a two-slot entry.
    #[must_use]
    pub fn with_leading_long(mut self, v: i64) -> Self {
        self.leading_longs.push(v);
        self
    }

    /// Assemble the class file.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let mut pool = PoolBuilder::new();
        for v in &self.leading_longs {
            pool.long(*v);
        }
        let this = pool.class(&self.name);
        let sup = self.super_name.as_deref().map_or(0, |s| pool.class(s));

        let mut body = Vec::new();
        body.extend_from_slice(&0x0021u16.to_be_bytes());
        body.extend_from_slice(&this.to_be_bytes());
        body.extend_from_slice(&sup.to_be_bytes());
        body.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for i in &self.interfaces {
            body.extend_from_slice(&pool.class(i).to_be_bytes());
        }

        body.extend_from_slice(&(self.fields.len() as u16).to_be_bytes());
        for (name, descriptor) in &self.fields {
            body.extend_from_slice(&0x0002u16.to_be_bytes());
            body.extend_from_slice(&pool.utf8(name).to_be_bytes());
            body.extend_from_slice(&pool.utf8(descriptor).to_be_bytes());
            body.extend_from_slice(&0u16.to_be_bytes());
        }

        body.extend_from_slice(&(self.methods.len() as u16).to_be_bytes());
        for m in &self.methods {
            m.encode(&mut pool, &mut body);
        }

        let mut attrs = Vec::new();
        let count = encode_annotations(&mut pool, &mut attrs, &self.annotations);
        body.extend_from_slice(&count.to_be_bytes());
        body.extend_from_slice(&attrs);

        let mut out = vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34];
        out.extend_from_slice(&pool.next.to_be_bytes());
        out.extend_from_slice(&pool.bytes);
        out.extend_from_slice(&body);
        out
    }
}

/// A class whose `main` calls `System.exit(code)`.
#[must_use]
pub fn exit_caller(name: &str, code: i32) -> Vec<u8> {
    ClassFixture::new(name)
        .with_method(
            MethodFixture::new("main", "([Ljava/lang/String;)V")
                .call_exit(code)
                .returns(),
        )
        .build()
}

/// Find every occurrence of `needle` in `haystack`.
#[must_use]
pub fn find_all(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return Vec::new();
    }
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(|(_, w)| *w == needle)
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_pool_count() {
        let bytes = exit_caller("a/Main", 3);
        assert_eq!(&bytes[..4], &[0xCA, 0xFE, 0xBA, 0xBE]);
        assert!(u16::from_be_bytes([bytes[8], bytes[9]]) > 1);
        assert_eq!(find_all(&bytes, b"java/lang/System").len(), 1);
    }

    #[test]
    fn long_constants_take_two_slots() {
        let mut pool = PoolBuilder::new();
        assert_eq!(pool.long(7), 1);
        assert_eq!(pool.utf8("x"), 3);
        assert_eq!(pool.long(7), 1);
        assert_eq!(pool.next, 4);
    }

    #[test]
    fn push_int_encodings() {
        let mut pool = PoolBuilder::new();
        let code = assemble(
            &[
                Op::PushInt(2),
                Op::PushInt(100),
                Op::PushInt(1234),
                Op::PushInt(100_000),
            ],
            &mut pool,
        );
        assert_eq!(&code[..1], &[0x05]);
        assert_eq!(&code[1..3], &[0x10, 100]);
        assert_eq!(&code[3..6], &[0x11, 0x04, 0xd2]);
        assert_eq!(code[6], 0x12);
    }

    #[test]
    fn table_switch_is_aligned() {
        let mut pool = PoolBuilder::new();
        let code = assemble(&[Op::PushInt(0), Op::TableSwitch { targets: 2 }], &mut pool);
        // iconst_0 at 0, tableswitch at 1, two pad bytes, operands at 4
        assert_eq!(code[1], TABLESWITCH);
        assert_eq!(&code[2..4], &[0, 0]);
        assert_eq!(code.len(), 1 + 1 + 2 + 12 + 8);
    }
}
