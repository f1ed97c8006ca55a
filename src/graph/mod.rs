//! The in-memory object graph: objects keyed by address, outgoing edges,
//! a reverse-edge index and the set of GC roots.
//!
//! A [`Graph`] is immutable once built and can be shared across threads.

mod builder;
mod model;

pub use builder::GraphBuilder;
pub use model::{DumpParams, Edge, Goroutine, Graph, HeapObject, Root, RootKind};
