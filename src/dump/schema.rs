//! Per-tag field layout of heap dump records.

/// Record tags as written by the Go runtime.
pub mod tag {
    pub const EOF: u64 = 0;
    pub const OBJECT: u64 = 1;
    pub const OTHER_ROOT: u64 = 2;
    pub const TYPE: u64 = 3;
    pub const GOROUTINE: u64 = 4;
    pub const STACK_FRAME: u64 = 5;
    pub const PARAMS: u64 = 6;
    pub const FINALIZER: u64 = 7;
    pub const ITAB: u64 = 8;
    pub const OS_THREAD: u64 = 9;
    pub const MEMSTATS: u64 = 10;
    pub const QUEUED_FINALIZER: u64 = 11;
    pub const DATA: u64 = 12;
    pub const BSS: u64 = 13;
    pub const DEFER: u64 = 14;
    pub const PANIC: u64 = 15;
    pub const ALLOC_PROFILE: u64 = 16;
    pub const ALLOC_SAMPLE: u64 = 17;

    /// Tags at or above this value carry a length prefix and may be skipped.
    pub const FIRST_EXTENSION: u64 = 64;
}

/// Field list terminator.
pub const FIELD_KIND_EOL: u64 = 0;
/// Field list entry that marks a pointer slot.
pub const FIELD_KIND_PTR: u64 = 1;

/// Number of GC pause samples in a memstats record.
pub const MEMSTATS_PAUSES: usize = 256;

/// How one field of a record is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Uvarint,
    /// Zig-zag encoded signed varint.
    Svarint,
    /// A uvarint restricted to 0 or 1.
    Bool,
    /// Length-prefixed byte string.
    Bytes,
    /// `(kind, offset)` pairs terminated by kind 0.
    FieldList,
    /// A fixed number of uvarints.
    UvarintArray(usize),
    /// Count followed by `(function, file, line)` triples.
    ProfileFrames,
}

use FieldKind::*;

const OBJECT: &[FieldKind] = &[Uvarint, Bytes, FieldList];
const OTHER_ROOT: &[FieldKind] = &[Bytes, Uvarint];
const TYPE: &[FieldKind] = &[Uvarint, Uvarint, Bytes, Bool];
const GOROUTINE: &[FieldKind] = &[
    Uvarint, // descriptor address
    Uvarint, // stack top
    Uvarint, // goroutine id
    Uvarint, // creating pc
    Uvarint, // status
    Bool,    // system goroutine
    Bool,    // background goroutine
    Uvarint, // wait since
    Bytes,   // wait reason
    Uvarint, // context pointer
    Uvarint, // M address
    Uvarint, // top defer
    Uvarint, // top panic
];
const STACK_FRAME: &[FieldKind] = &[
    Uvarint, // stack pointer
    Uvarint, // depth
    Uvarint, // child frame stack pointer
    Bytes,   // frame contents
    Uvarint, // entry pc
    Uvarint, // current pc
    Uvarint, // continuation pc
    Bytes,   // function name
    FieldList,
];
const PARAMS: &[FieldKind] = &[Bool, Uvarint, Uvarint, Uvarint, Bytes, Bytes, Uvarint];
const FINALIZER: &[FieldKind] = &[Uvarint, Uvarint, Uvarint, Uvarint, Uvarint];
const ITAB: &[FieldKind] = &[Uvarint, Uvarint];
const OS_THREAD: &[FieldKind] = &[Uvarint, Uvarint, Uvarint];
const MEMSTATS: &[FieldKind] = &[
    UvarintArray(24),
    UvarintArray(MEMSTATS_PAUSES),
    Uvarint, // number of collections
];
const SEGMENT: &[FieldKind] = &[Uvarint, Bytes, FieldList];
const DEFER: &[FieldKind] = &[Uvarint, Uvarint, Uvarint, Uvarint, Uvarint, Uvarint, Uvarint];
const PANIC: &[FieldKind] = &[Uvarint, Uvarint, Uvarint, Uvarint, Uvarint, Uvarint];
const ALLOC_PROFILE: &[FieldKind] = &[Uvarint, Uvarint, ProfileFrames, Uvarint, Uvarint];
const ALLOC_SAMPLE: &[FieldKind] = &[Uvarint, Uvarint];

/// Field layout for `tag`, or `None` when the tag is not part of the format.
pub fn fields_for(tag: u64) -> Option<&'static [FieldKind]> {
    let fields = match tag {
        tag::OBJECT => OBJECT,
        tag::OTHER_ROOT => OTHER_ROOT,
        tag::TYPE => TYPE,
        tag::GOROUTINE => GOROUTINE,
        tag::STACK_FRAME => STACK_FRAME,
        tag::PARAMS => PARAMS,
        tag::FINALIZER | tag::QUEUED_FINALIZER => FINALIZER,
        tag::ITAB => ITAB,
        tag::OS_THREAD => OS_THREAD,
        tag::MEMSTATS => MEMSTATS,
        tag::DATA | tag::BSS => SEGMENT,
        tag::DEFER => DEFER,
        tag::PANIC => PANIC,
        tag::ALLOC_PROFILE => ALLOC_PROFILE,
        tag::ALLOC_SAMPLE => ALLOC_SAMPLE,
        _ => return None,
    };
    Some(fields)
}

pub fn is_extension(tag: u64) -> bool {
    tag >= tag::FIRST_EXTENSION
}
