//! Heap dump test fixtures
//!
//! Builds small, fully valid dumps with the crate's own writer and keeps
//! them in a temporary directory for the lifetime of the fixture.

use std::path::PathBuf;

use heapsift::dump::{encode_records, Record, SegmentKind};
use tempfile::TempDir;

/// Start of the heap used by every fixture.
pub const HEAP_START: u64 = 0xc000000000;

/// `A -> B -> C`, rooted at A by a global.
pub const A: u64 = 0xc000010000;
pub const B: u64 = 0xc000020000;
pub const C: u64 = 0xc000030000;
/// Rooted by a stack slot of goroutine 1.
pub const D: u64 = 0xc000040000;
/// Referenced by nothing and rooted by nothing.
pub const ORPHAN: u64 = 0xc000050000;

/// Address of the data segment holding the global that roots A.
pub const DATA: u64 = 0x5a0000;

/// A heap dump file in a temporary directory
pub struct TestDump {
    _dir: TempDir,
    /// Path to the dump file
    pub path: PathBuf,
}

impl TestDump {
    /// Write `records` (header and EOF added) to a fresh file
    pub fn from_records(records: &[Record]) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("heap.dump");
        let bytes = encode_records(records).expect("Failed to encode dump");
        std::fs::write(&path, bytes).expect("Failed to write dump");
        Self { _dir: dir, path }
    }

    /// The standard fixture, see the constants above
    pub fn chain() -> Self {
        Self::from_records(&chain_records(0))
    }

    /// The standard fixture with every heap address moved by `shift`
    pub fn relocated(shift: u64) -> Self {
        Self::from_records(&chain_records(shift))
    }

    /// A two-object cycle `A <-> B`
    pub fn cycle() -> Self {
        Self::from_records(&[
            params(),
            object(A, &[B], b"cycle-a!"),
            object(B, &[A], b"cycle-b!"),
        ])
    }

    pub fn path_str(&self) -> &str {
        self.path.to_str().expect("temp path is UTF-8")
    }

    /// A sibling path inside the fixture's temporary directory
    pub fn sibling(&self, name: &str) -> PathBuf {
        self._dir.path().join(name)
    }
}

pub fn params() -> Record {
    Record::Params {
        offset: 0,
        big_endian: false,
        pointer_size: 8,
        heap_start: HEAP_START,
        heap_end: HEAP_START + 0x1000000,
        arch: "amd64".into(),
        experiment: String::new(),
        ncpu: 4,
    }
}

/// An object made of one pointer slot per target followed by `tail`.
pub fn object(address: u64, targets: &[u64], tail: &[u8]) -> Record {
    let mut contents: Vec<u8> = targets.iter().flat_map(|t| t.to_le_bytes()).collect();
    contents.extend_from_slice(tail);
    Record::Object {
        offset: 0,
        address,
        contents,
        pointers: (0..targets.len() as u64).map(|i| i * 8).collect(),
    }
}

fn chain_records(shift: u64) -> Vec<Record> {
    let (a, b, c, d, orphan) = (A + shift, B + shift, C + shift, D + shift, ORPHAN + shift);
    vec![
        params(),
        Record::Type {
            offset: 0,
            address: 0x4c0000,
            size: 16,
            name: "main.node".into(),
            indirect: false,
        },
        object(a, &[b], b"node-a.."),
        object(b, &[c], b"node-b.."),
        object(c, &[], b"leaf-obj"),
        object(d, &[], b"on-stack"),
        object(orphan, &[], b"orphaned"),
        Record::Finalizer {
            offset: 0,
            queued: false,
            object: c,
            fn_val: 0,
            fn_pc: 0x401000,
            arg_type: 0x4c0000,
            object_type: 0x4c0000,
        },
        Record::Segment {
            offset: 0,
            kind: SegmentKind::Data,
            address: DATA,
            contents: a.to_le_bytes().to_vec(),
            pointers: vec![0],
        },
        Record::Goroutine {
            offset: 0,
            address: 0xc000001000,
            stack_top: 0xc000100000,
            id: 1,
            creator_pc: 0,
            status: 2,
            is_system: false,
            is_background: false,
            wait_since: 0,
            wait_reason: String::new(),
            context: 0,
            thread: 0,
            top_defer: 0,
            top_panic: 0,
        },
        Record::StackFrame {
            offset: 0,
            stack_pointer: 0xc000100000,
            depth: 0,
            child_pointer: 0,
            contents: d.to_le_bytes().to_vec(),
            entry_pc: 0x401000,
            pc: 0x401020,
            continuation_pc: 0x401020,
            name: "main.main".into(),
            pointers: vec![0],
        },
    ]
}
