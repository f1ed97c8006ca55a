use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::graph::{DumpParams, Graph, HeapObject};

/// Structural fingerprint of an object, independent of where it lives.
///
/// SHA-256 over the type id (or a marker when unknown), the size, the sorted
/// pointer slot offsets and the contents with every pointer slot zeroed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signature([u8; 32]);

impl Signature {
    pub fn of(object: &HeapObject, pointer_size: u64) -> Self {
        let mut hasher = Sha256::new();
        match object.type_id {
            Some(type_id) => {
                hasher.update([1u8]);
                hasher.update(type_id.to_le_bytes());
            }
            None => hasher.update([0u8]),
        }
        hasher.update(object.size().to_le_bytes());

        let mut offsets = object.pointer_offsets.clone();
        offsets.sort_unstable();
        offsets.dedup();
        hasher.update((offsets.len() as u64).to_le_bytes());
        for offset in &offsets {
            hasher.update(offset.to_le_bytes());
        }

        let mut masked = object.contents.to_vec();
        let len = masked.len();
        for &offset in &offsets {
            let start = usize::try_from(offset).unwrap_or(len).min(len);
            let end = start.saturating_add(pointer_size as usize).min(len);
            masked[start..end].fill(0);
        }
        hasher.update(&masked);

        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        Self(digest)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|b| write!(f, "{b:02x}"))
    }
}

impl Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Objects of one snapshot that also occur, structurally, in another.
#[derive(Debug, Clone)]
pub struct Intersection<'g> {
    objects: Vec<&'g HeapObject>,
    params: &'g DumpParams,
}

impl<'g> Intersection<'g> {
    /// Matching objects in ascending address order.
    pub fn records(&self) -> &[&'g HeapObject] {
        &self.objects
    }

    /// Parameters of the snapshot the objects belong to.
    pub fn params(&self) -> &'g DumpParams {
        self.params
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Graph {
    pub fn signature(&self, object: &HeapObject) -> Signature {
        Signature::of(object, self.params().pointer_size)
    }

    /// This graph's objects whose signature also occurs in `other`.
    pub fn intersection<'g>(&'g self, other: &Graph) -> Intersection<'g> {
        let theirs: HashSet<Signature> = other.objects().map(|o| other.signature(o)).collect();
        let objects: Vec<_> = self
            .objects()
            .filter(|o| theirs.contains(&self.signature(o)))
            .collect();
        tracing::info!(
            ours = self.len(),
            theirs = other.len(),
            matched = objects.len(),
            "Intersection computed"
        );
        Intersection {
            objects,
            params: self.params(),
        }
    }
}
