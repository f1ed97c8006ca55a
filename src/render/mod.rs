//! Output: the SVG neighbourhood diagram and the human/JSON text reports.

pub mod svg;
pub mod text;

pub use svg::{write_svg, RenderReport, SvgOptions};
pub use text::{
    print_records, write_anchors, write_intersection, write_json, write_owners, IntersectionReport,
};

use crate::graph::{Graph, HeapObject};
use crate::symbols::SymbolResolver;

/// Best available name for an object's type.
///
/// Tries the resolver on the type id, then the dump's own type records, then
/// the resolver on the object address.
pub fn type_label(graph: &Graph, resolver: &dyn SymbolResolver, object: &HeapObject) -> String {
    if let Some(type_id) = object.type_id {
        if let Some(name) = resolver
            .lookup(type_id)
            .or_else(|| graph.type_name(type_id))
        {
            return name.to_string();
        }
    }
    if let Some(name) = resolver.lookup(object.address) {
        return name.to_string();
    }
    match object.type_id {
        Some(type_id) => format!("type {type_id:#x}"),
        None => "object".to_string(),
    }
}

/// `0x1000 (main.T, 24 bytes)` for the object covering `address`, bare hex
/// otherwise. Interior addresses are labelled by their object's base.
pub fn object_label(graph: &Graph, resolver: &dyn SymbolResolver, address: u64) -> String {
    match graph.resolve(address) {
        Some(object) => format!(
            "{:#x} ({}, {} bytes)",
            object.address,
            type_label(graph, resolver, object),
            object.size()
        ),
        None => format!("{address:#x}"),
    }
}
