use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

/// Snapshot-wide parameters from the dump-parameters record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DumpParams {
    /// Header version, e.g. `go1.7`.
    pub format_version: String,
    pub big_endian: bool,
    pub pointer_size: u64,
    pub heap_start: u64,
    pub heap_end: u64,
    pub arch: String,
    pub experiment: String,
    pub ncpu: u64,
}

impl DumpParams {
    /// Read the pointer stored at `offset` in `bytes`, if the slot fits.
    pub fn read_pointer(&self, bytes: &[u8], offset: u64) -> Option<u64> {
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(self.pointer_size as usize)?;
        let slot = bytes.get(start..end)?;
        let value = match (self.pointer_size, self.big_endian) {
            (8, false) => u64::from_le_bytes(slot.try_into().ok()?),
            (8, true) => u64::from_be_bytes(slot.try_into().ok()?),
            (4, false) => u64::from(u32::from_le_bytes(slot.try_into().ok()?)),
            (4, true) => u64::from(u32::from_be_bytes(slot.try_into().ok()?)),
            _ => return None,
        };
        Some(value)
    }

    pub fn in_heap(&self, address: u64) -> bool {
        (self.heap_start..self.heap_end).contains(&address)
    }
}

/// An outgoing reference from a pointer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Edge {
    /// Offset of the pointer slot within the referencing object.
    pub offset: u64,
    /// Base address of the referenced object, or the raw pointer value when
    /// no known object covers it.
    pub target: u64,
}

/// One live allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapObject {
    pub address: u64,
    /// Type descriptor address, when the dump reveals one.
    pub type_id: Option<u64>,
    /// Offsets of every pointer slot, including nil ones.
    pub pointer_offsets: Vec<u64>,
    /// Non-nil references, in slot order.
    pub edges: Vec<Edge>,
    pub contents: Box<[u8]>,
}

impl HeapObject {
    pub fn size(&self) -> u64 {
        self.contents.len() as u64
    }

    /// Whether `address` falls inside this object.
    pub fn covers(&self, address: u64) -> bool {
        address == self.address || (address > self.address && address - self.address < self.size())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootKind {
    StackFrame,
    Global,
    Finalizer,
    QueuedFinalizer,
    OsThread,
    Other,
}

impl RootKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RootKind::StackFrame => "stack",
            RootKind::Global => "global",
            RootKind::Finalizer => "finalizer",
            RootKind::QueuedFinalizer => "queued finalizer",
            RootKind::OsThread => "os thread",
            RootKind::Other => "other",
        }
    }
}

/// A GC root and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Root {
    pub kind: RootKind,
    /// Base address of the object kept alive (or the raw pointer if unknown).
    pub target: u64,
    /// Human-readable provenance, e.g. `goroutine 7 main.serve+0x18`.
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Goroutine {
    pub address: u64,
    pub id: u64,
    pub stack_top: u64,
    pub status: u64,
    pub wait_reason: String,
    pub is_system: bool,
}

/// A fully built, read-only heap snapshot.
#[derive(Debug)]
pub struct Graph {
    pub(super) params: DumpParams,
    pub(super) objects: BTreeMap<u64, HeapObject>,
    pub(super) roots: Vec<Root>,
    /// target address -> sorted referrer addresses
    pub(super) referrers: HashMap<u64, Vec<u64>>,
    /// target address -> indices into `roots`
    pub(super) rooted: HashMap<u64, Vec<usize>>,
    pub(super) goroutines: Vec<Goroutine>,
    pub(super) type_names: HashMap<u64, String>,
}

impl Graph {
    pub fn params(&self) -> &DumpParams {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects in ascending address order.
    pub fn objects(&self) -> impl Iterator<Item = &HeapObject> {
        self.objects.values()
    }

    /// The object starting exactly at `address`.
    pub fn object(&self, address: u64) -> Option<&HeapObject> {
        self.objects.get(&address)
    }

    /// The object starting at or covering `address`.
    pub fn resolve(&self, address: u64) -> Option<&HeapObject> {
        containing(&self.objects, address).and_then(|base| self.objects.get(&base))
    }

    pub fn roots(&self) -> &[Root] {
        &self.roots
    }

    /// Roots pointing directly at the object based at `address`.
    pub fn roots_of(&self, address: u64) -> impl Iterator<Item = &Root> {
        self.rooted
            .get(&address)
            .into_iter()
            .flatten()
            .map(|&idx| &self.roots[idx])
    }

    pub fn is_rooted(&self, address: u64) -> bool {
        self.rooted.contains_key(&address)
    }

    /// Addresses of objects holding a pointer to `address`, ascending.
    pub fn referrers(&self, address: u64) -> &[u64] {
        self.referrers.get(&address).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn goroutines(&self) -> &[Goroutine] {
        &self.goroutines
    }

    /// Name from the dump's own type records.
    pub fn type_name(&self, type_id: u64) -> Option<&str> {
        self.type_names.get(&type_id).map(String::as_str)
    }

    pub fn edge_count(&self) -> usize {
        self.objects.values().map(|o| o.edges.len()).sum()
    }
}

/// Base address of the object in `objects` covering `address`.
pub(super) fn containing(objects: &BTreeMap<u64, HeapObject>, address: u64) -> Option<u64> {
    let (&base, object) = objects.range(..=address).next_back()?;
    object.covers(address).then_some(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pointer_size: u64, big_endian: bool) -> DumpParams {
        DumpParams {
            format_version: "go1.7".into(),
            big_endian,
            pointer_size,
            heap_start: 0x1000,
            heap_end: 0x2000,
            arch: "test".into(),
            experiment: String::new(),
            ncpu: 1,
        }
    }

    #[test]
    fn reads_pointers_by_width_and_endianness() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(
            params(8, false).read_pointer(&bytes, 0),
            Some(0x0807060504030201)
        );
        assert_eq!(
            params(8, true).read_pointer(&bytes, 0),
            Some(0x0102030405060708)
        );
        assert_eq!(params(4, false).read_pointer(&bytes, 4), Some(0x08070605));
        assert_eq!(params(4, true).read_pointer(&bytes, 0), Some(0x01020304));
        assert_eq!(params(8, false).read_pointer(&bytes, 1), None);
        assert_eq!(params(8, false).read_pointer(&bytes, u64::MAX), None);
    }

    #[test]
    fn covers_interior_addresses() {
        let object = HeapObject {
            address: 0x1000,
            type_id: None,
            pointer_offsets: vec![],
            edges: vec![],
            contents: vec![0u8; 16].into_boxed_slice(),
        };
        assert!(object.covers(0x1000));
        assert!(object.covers(0x100f));
        assert!(!object.covers(0x1010));
        assert!(!object.covers(0xfff));
    }

    #[test]
    fn heap_bounds() {
        let p = params(8, false);
        assert!(p.in_heap(0x1000));
        assert!(!p.in_heap(0x2000));
    }
}
