//! Typed heap dump records.

use serde::Serialize;

use super::schema::tag;
use crate::error::{HeapError, Result};

/// One decoded field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Uvarint(u64),
    Svarint(i64),
    Bool(bool),
    Bytes(Vec<u8>),
    /// Offsets of pointer slots.
    Pointers(Vec<u64>),
    Array(Vec<u64>),
    Frames(Vec<ProfileFrame>),
}

/// A record as laid out by its schema, before it is given a meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub tag: u64,
    /// Stream offset of the tag byte.
    pub offset: u64,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileFrame {
    pub function: String,
    pub file: String,
    pub line: u64,
}

/// The broad categories the graph builder cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Object,
    StackFrameRoot,
    GlobalRoot,
    FinalizerRoot,
    OsThreadRoot,
    OtherRoot,
    TypeDescriptor,
    Goroutine,
    DumpParams,
    Ignorable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Data,
    Bss,
}

/// A decoded heap dump record. `offset` is where its tag started in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Object {
        offset: u64,
        address: u64,
        contents: Vec<u8>,
        pointers: Vec<u64>,
    },
    OtherRoot {
        offset: u64,
        description: String,
        address: u64,
    },
    Type {
        offset: u64,
        address: u64,
        size: u64,
        name: String,
        indirect: bool,
    },
    Goroutine {
        offset: u64,
        address: u64,
        stack_top: u64,
        id: u64,
        creator_pc: u64,
        status: u64,
        is_system: bool,
        is_background: bool,
        wait_since: u64,
        wait_reason: String,
        context: u64,
        thread: u64,
        top_defer: u64,
        top_panic: u64,
    },
    StackFrame {
        offset: u64,
        stack_pointer: u64,
        depth: u64,
        child_pointer: u64,
        contents: Vec<u8>,
        entry_pc: u64,
        pc: u64,
        continuation_pc: u64,
        name: String,
        pointers: Vec<u64>,
    },
    Params {
        offset: u64,
        big_endian: bool,
        pointer_size: u64,
        heap_start: u64,
        heap_end: u64,
        arch: String,
        experiment: String,
        ncpu: u64,
    },
    Finalizer {
        offset: u64,
        queued: bool,
        object: u64,
        fn_val: u64,
        fn_pc: u64,
        arg_type: u64,
        object_type: u64,
    },
    Itab {
        offset: u64,
        address: u64,
        type_address: u64,
    },
    OsThread {
        offset: u64,
        address: u64,
        go_id: u64,
        os_id: u64,
    },
    MemStats {
        offset: u64,
        stats: Vec<u64>,
        pauses: Vec<u64>,
        num_gc: u64,
    },
    Segment {
        offset: u64,
        kind: SegmentKind,
        address: u64,
        contents: Vec<u8>,
        pointers: Vec<u64>,
    },
    Defer {
        offset: u64,
        address: u64,
        goroutine: u64,
        argp: u64,
        pc: u64,
        fn_val: u64,
        fn_pc: u64,
        link: u64,
    },
    Panic {
        offset: u64,
        address: u64,
        goroutine: u64,
        arg_type: u64,
        arg_data: u64,
        defer: u64,
        link: u64,
    },
    AllocProfile {
        offset: u64,
        id: u64,
        size: u64,
        frames: Vec<ProfileFrame>,
        allocs: u64,
        frees: u64,
    },
    AllocSample {
        offset: u64,
        address: u64,
        profile: u64,
    },
    /// A length-delimited record this reader does not interpret.
    Extension { offset: u64, tag: u64, len: u64 },
}

impl Record {
    pub fn offset(&self) -> u64 {
        match self {
            Record::Object { offset, .. }
            | Record::OtherRoot { offset, .. }
            | Record::Type { offset, .. }
            | Record::Goroutine { offset, .. }
            | Record::StackFrame { offset, .. }
            | Record::Params { offset, .. }
            | Record::Finalizer { offset, .. }
            | Record::Itab { offset, .. }
            | Record::OsThread { offset, .. }
            | Record::MemStats { offset, .. }
            | Record::Segment { offset, .. }
            | Record::Defer { offset, .. }
            | Record::Panic { offset, .. }
            | Record::AllocProfile { offset, .. }
            | Record::AllocSample { offset, .. }
            | Record::Extension { offset, .. } => *offset,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Object { .. } => RecordKind::Object,
            Record::StackFrame { .. } => RecordKind::StackFrameRoot,
            Record::Segment { .. } => RecordKind::GlobalRoot,
            Record::Finalizer { .. } => RecordKind::FinalizerRoot,
            Record::OsThread { .. } => RecordKind::OsThreadRoot,
            Record::OtherRoot { .. } => RecordKind::OtherRoot,
            Record::Type { .. } => RecordKind::TypeDescriptor,
            Record::Goroutine { .. } => RecordKind::Goroutine,
            Record::Params { .. } => RecordKind::DumpParams,
            Record::Itab { .. }
            | Record::MemStats { .. }
            | Record::Defer { .. }
            | Record::Panic { .. }
            | Record::AllocProfile { .. }
            | Record::AllocSample { .. }
            | Record::Extension { .. } => RecordKind::Ignorable,
        }
    }

    /// Short lowercase name used in printed output.
    pub fn name(&self) -> &'static str {
        match self {
            Record::Object { .. } => "object",
            Record::OtherRoot { .. } => "other_root",
            Record::Type { .. } => "type",
            Record::Goroutine { .. } => "goroutine",
            Record::StackFrame { .. } => "stack_frame",
            Record::Params { .. } => "params",
            Record::Finalizer { queued: false, .. } => "finalizer",
            Record::Finalizer { queued: true, .. } => "queued_finalizer",
            Record::Itab { .. } => "itab",
            Record::OsThread { .. } => "os_thread",
            Record::MemStats { .. } => "memstats",
            Record::Segment {
                kind: SegmentKind::Data,
                ..
            } => "data",
            Record::Segment {
                kind: SegmentKind::Bss,
                ..
            } => "bss",
            Record::Defer { .. } => "defer",
            Record::Panic { .. } => "panic",
            Record::AllocProfile { .. } => "alloc_profile",
            Record::AllocSample { .. } => "alloc_sample",
            Record::Extension { .. } => "extension",
        }
    }

    /// Give a schema-decoded record its meaning.
    ///
    /// The decoder guarantees the field count and kinds match the tag's layout,
    /// so a mismatch here is reported as corruption rather than a panic.
    pub fn from_raw(raw: RawRecord) -> Result<Self> {
        let RawRecord {
            tag: record_tag,
            offset,
            fields,
        } = raw;
        let mut f = Fields {
            iter: fields.into_iter(),
            offset,
            tag: record_tag,
        };

        let record = match record_tag {
            tag::OBJECT => Record::Object {
                offset,
                address: f.uvarint()?,
                contents: f.bytes()?,
                pointers: f.pointers()?,
            },
            tag::OTHER_ROOT => Record::OtherRoot {
                offset,
                description: f.string()?,
                address: f.uvarint()?,
            },
            tag::TYPE => Record::Type {
                offset,
                address: f.uvarint()?,
                size: f.uvarint()?,
                name: f.string()?,
                indirect: f.boolean()?,
            },
            tag::GOROUTINE => Record::Goroutine {
                offset,
                address: f.uvarint()?,
                stack_top: f.uvarint()?,
                id: f.uvarint()?,
                creator_pc: f.uvarint()?,
                status: f.uvarint()?,
                is_system: f.boolean()?,
                is_background: f.boolean()?,
                wait_since: f.uvarint()?,
                wait_reason: f.string()?,
                context: f.uvarint()?,
                thread: f.uvarint()?,
                top_defer: f.uvarint()?,
                top_panic: f.uvarint()?,
            },
            tag::STACK_FRAME => Record::StackFrame {
                offset,
                stack_pointer: f.uvarint()?,
                depth: f.uvarint()?,
                child_pointer: f.uvarint()?,
                contents: f.bytes()?,
                entry_pc: f.uvarint()?,
                pc: f.uvarint()?,
                continuation_pc: f.uvarint()?,
                name: f.string()?,
                pointers: f.pointers()?,
            },
            tag::PARAMS => Record::Params {
                offset,
                big_endian: f.boolean()?,
                pointer_size: f.uvarint()?,
                heap_start: f.uvarint()?,
                heap_end: f.uvarint()?,
                arch: f.string()?,
                experiment: f.string()?,
                ncpu: f.uvarint()?,
            },
            tag::FINALIZER | tag::QUEUED_FINALIZER => Record::Finalizer {
                offset,
                queued: record_tag == tag::QUEUED_FINALIZER,
                object: f.uvarint()?,
                fn_val: f.uvarint()?,
                fn_pc: f.uvarint()?,
                arg_type: f.uvarint()?,
                object_type: f.uvarint()?,
            },
            tag::ITAB => Record::Itab {
                offset,
                address: f.uvarint()?,
                type_address: f.uvarint()?,
            },
            tag::OS_THREAD => Record::OsThread {
                offset,
                address: f.uvarint()?,
                go_id: f.uvarint()?,
                os_id: f.uvarint()?,
            },
            tag::MEMSTATS => Record::MemStats {
                offset,
                stats: f.array()?,
                pauses: f.array()?,
                num_gc: f.uvarint()?,
            },
            tag::DATA | tag::BSS => Record::Segment {
                offset,
                kind: if record_tag == tag::DATA {
                    SegmentKind::Data
                } else {
                    SegmentKind::Bss
                },
                address: f.uvarint()?,
                contents: f.bytes()?,
                pointers: f.pointers()?,
            },
            tag::DEFER => Record::Defer {
                offset,
                address: f.uvarint()?,
                goroutine: f.uvarint()?,
                argp: f.uvarint()?,
                pc: f.uvarint()?,
                fn_val: f.uvarint()?,
                fn_pc: f.uvarint()?,
                link: f.uvarint()?,
            },
            tag::PANIC => Record::Panic {
                offset,
                address: f.uvarint()?,
                goroutine: f.uvarint()?,
                arg_type: f.uvarint()?,
                arg_data: f.uvarint()?,
                defer: f.uvarint()?,
                link: f.uvarint()?,
            },
            tag::ALLOC_PROFILE => Record::AllocProfile {
                offset,
                id: f.uvarint()?,
                size: f.uvarint()?,
                frames: f.frames()?,
                allocs: f.uvarint()?,
                frees: f.uvarint()?,
            },
            tag::ALLOC_SAMPLE => Record::AllocSample {
                offset,
                address: f.uvarint()?,
                profile: f.uvarint()?,
            },
            other => {
                return Err(HeapError::malformed(
                    offset,
                    Some(other),
                    "record tag has no typed form",
                ))
            }
        };
        Ok(record)
    }
}

/// Decode names and descriptions, replacing invalid UTF-8.
pub(crate) fn lossy(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Cursor over a raw record's fields that reports layout mismatches with context.
struct Fields {
    iter: std::vec::IntoIter<Field>,
    offset: u64,
    tag: u64,
}

impl Fields {
    fn next(&mut self, expected: &str) -> Result<Field> {
        self.iter.next().ok_or_else(|| {
            HeapError::malformed(self.offset, Some(self.tag), format!("missing {expected} field"))
        })
    }

    fn mismatch(&self, expected: &str, got: &Field) -> HeapError {
        HeapError::malformed(
            self.offset,
            Some(self.tag),
            format!("expected {expected} field, found {got:?}"),
        )
    }

    fn uvarint(&mut self) -> Result<u64> {
        match self.next("uvarint")? {
            Field::Uvarint(v) => Ok(v),
            other => Err(self.mismatch("uvarint", &other)),
        }
    }

    fn boolean(&mut self) -> Result<bool> {
        match self.next("bool")? {
            Field::Bool(v) => Ok(v),
            other => Err(self.mismatch("bool", &other)),
        }
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        match self.next("bytes")? {
            Field::Bytes(v) => Ok(v),
            other => Err(self.mismatch("bytes", &other)),
        }
    }

    fn string(&mut self) -> Result<String> {
        Ok(lossy(self.bytes()?))
    }

    fn pointers(&mut self) -> Result<Vec<u64>> {
        match self.next("field list")? {
            Field::Pointers(v) => Ok(v),
            other => Err(self.mismatch("field list", &other)),
        }
    }

    fn array(&mut self) -> Result<Vec<u64>> {
        match self.next("array")? {
            Field::Array(v) => Ok(v),
            other => Err(self.mismatch("array", &other)),
        }
    }

    fn frames(&mut self) -> Result<Vec<ProfileFrame>> {
        match self.next("frames")? {
            Field::Frames(v) => Ok(v),
            other => Err(self.mismatch("frames", &other)),
        }
    }
}
