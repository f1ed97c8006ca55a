//! Read-only queries over a built [`Graph`].

mod anchors;
mod hexdump;
mod intersect;
mod owners;

pub use anchors::Anchor;
pub use hexdump::write_hexdump;
pub use intersect::{Intersection, Signature};
pub use owners::Owners;

use serde::Serialize;

use crate::error::{HeapError, Result};
use crate::graph::{Graph, HeapObject};

/// One reference: `from` holds a pointer to `to` at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Link {
    pub from: u64,
    pub to: u64,
    pub offset: u64,
}

impl Link {
    /// Link from `from` to `to` using the first slot of `from` that points there.
    fn between(graph: &Graph, from: u64, to: u64) -> Self {
        let offset = graph
            .object(from)
            .and_then(|object| object.edges.iter().find(|edge| edge.target == to))
            .map(|edge| edge.offset)
            .unwrap_or_default();
        Self { from, to, offset }
    }
}

/// The object covering `address`, or `UnknownAddress`.
pub(crate) fn lookup(graph: &Graph, address: u64) -> Result<&HeapObject> {
    graph
        .resolve(address)
        .ok_or(HeapError::UnknownAddress(address))
}
