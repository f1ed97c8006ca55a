pub mod config;
pub mod dump;
pub mod error;
pub mod graph;
pub mod query;
pub mod render;
pub mod symbols;
pub mod util;

pub use config::Config;
pub use dump::{Record, RecordKind, RecordReader};
pub use error::{HeapError, Result};
pub use graph::{DumpParams, Graph, GraphBuilder, HeapObject, Root, RootKind};
pub use query::{Anchor, Intersection, Link, Owners, Signature};
pub use render::{write_svg, RenderReport, SvgOptions};
pub use symbols::{NoSymbols, SymbolResolver, SymbolTable};
