//! Layered SVG diagram of the objects reachable from one address.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::io::Write;

use serde::Serialize;

use super::type_label;
use crate::error::{HeapError, Result};
use crate::graph::Graph;
use crate::query::lookup;
use crate::symbols::SymbolResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SvgOptions {
    /// Objects drawn before the rest is collapsed into a summary box.
    pub max_nodes: usize,
    pub node_width: u64,
    pub node_height: u64,
    /// Vertical space between ranks.
    pub rank_gap: u64,
    /// Horizontal space between nodes of one rank.
    pub node_gap: u64,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self {
            max_nodes: 200,
            node_width: 180,
            node_height: 48,
            rank_gap: 56,
            node_gap: 24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenderReport {
    pub rendered: usize,
    pub omitted: usize,
}

impl RenderReport {
    pub fn limit_exceeded(&self) -> Option<HeapError> {
        (self.omitted > 0).then_some(HeapError::RenderLimitExceeded {
            rendered: self.rendered,
            omitted: self.omitted,
        })
    }
}

struct Layout {
    /// rank -> addresses, in discovery order
    ranks: Vec<Vec<u64>>,
    omitted: usize,
}

impl Layout {
    /// Breadth-first from `start`, keeping at most `max_nodes` objects.
    fn discover(graph: &Graph, start: u64, max_nodes: usize) -> Self {
        let max_nodes = max_nodes.max(1);
        let mut seen = HashSet::from([start]);
        // (address, rank); rank is None for objects past the cap
        let mut queue = VecDeque::from([(start, Some(0usize))]);
        let mut ranks: Vec<Vec<u64>> = vec![vec![start]];
        let mut kept = 1;
        let mut omitted = 0;

        while let Some((address, rank)) = queue.pop_front() {
            let Some(object) = graph.object(address) else {
                continue;
            };
            for edge in &object.edges {
                if graph.object(edge.target).is_none() || !seen.insert(edge.target) {
                    continue;
                }
                let next = match rank {
                    Some(rank) if kept < max_nodes => {
                        kept += 1;
                        if ranks.len() == rank + 1 {
                            ranks.push(Vec::new());
                        }
                        ranks[rank + 1].push(edge.target);
                        Some(rank + 1)
                    }
                    _ => {
                        omitted += 1;
                        None
                    }
                };
                queue.push_back((edge.target, next));
            }
        }

        Self { ranks, omitted }
    }

    fn rendered(&self) -> usize {
        self.ranks.iter().map(Vec::len).sum()
    }

    /// Number of rows drawn, including the summary row.
    fn rows(&self) -> usize {
        self.ranks.len() + usize::from(self.omitted > 0)
    }

    fn widest(&self) -> usize {
        self.ranks.iter().map(Vec::len).max().unwrap_or(1)
    }
}

struct Geometry {
    options: SvgOptions,
    width: u64,
    height: u64,
}

impl Geometry {
    fn new(options: SvgOptions, layout: &Layout) -> Self {
        let widest = layout.widest() as u64;
        let rows = layout.rows() as u64;
        Self {
            options,
            width: widest * (options.node_width + options.node_gap) + options.node_gap,
            height: rows * (options.node_height + options.rank_gap) + options.rank_gap,
        }
    }

    /// Top-left corner of node `index` of `count` in `rank`.
    fn origin(&self, rank: usize, index: usize, count: usize) -> (u64, u64) {
        let center = self.width * (2 * index as u64 + 1) / (2 * count.max(1) as u64);
        let x = center.saturating_sub(self.options.node_width / 2);
        let y = self.options.rank_gap + rank as u64 * (self.options.node_height + self.options.rank_gap);
        (x, y)
    }
}

/// Render the forward neighbourhood of `address` as SVG into `out`.
///
/// Every object is drawn at most once. Past `options.max_nodes` the
/// remaining objects are counted and shown as a single summary box.
pub fn write_svg<W: Write>(
    graph: &Graph,
    resolver: &dyn SymbolResolver,
    address: u64,
    options: &SvgOptions,
    mut out: W,
) -> Result<RenderReport> {
    let start = lookup(graph, address)?.address;
    let layout = Layout::discover(graph, start, options.max_nodes);
    let geometry = Geometry::new(*options, &layout);

    let mut positions: BTreeMap<u64, (u64, u64)> = BTreeMap::new();
    for (rank, nodes) in layout.ranks.iter().enumerate() {
        for (index, &node) in nodes.iter().enumerate() {
            positions.insert(node, geometry.origin(rank, index, nodes.len()));
        }
    }

    write_header(&mut out, &geometry)?;

    let (w, h) = (options.node_width, options.node_height);
    for nodes in &layout.ranks {
        for &node in nodes {
            let Some(object) = graph.object(node) else {
                continue;
            };
            let Some(&(x, y)) = positions.get(&node) else {
                continue;
            };
            // BTreeMap keeps parallel edges to one target together and ordered.
            let mut targets: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
            for edge in &object.edges {
                if positions.contains_key(&edge.target) {
                    targets.entry(edge.target).or_default().push(edge.offset);
                }
            }
            for (target, offsets) in targets {
                let label = offsets
                    .iter()
                    .map(|offset| format!("+{offset:#x}"))
                    .collect::<Vec<_>>()
                    .join(",");
                let (x1, y1) = (x + w / 2, y + h);
                if target == node {
                    writeln!(
                        out,
                        r#"<path class="edge" d="M {r} {a} C {c} {a}, {c} {b}, {r} {b}" marker-end="url(#arrow)"/>"#,
                        r = x + w,
                        a = y + h / 4,
                        b = y + 3 * h / 4,
                        c = x + w + 28,
                    )?;
                    writeln!(
                        out,
                        r#"<text class="offset" x="{}" y="{}">{}</text>"#,
                        x + w + 30,
                        y + h / 2,
                        xml_escape(&label)
                    )?;
                    continue;
                }
                let Some(&(tx, ty)) = positions.get(&target) else {
                    continue;
                };
                let (x2, y2) = (tx + w / 2, ty);
                writeln!(
                    out,
                    r#"<line class="edge" x1="{x1}" y1="{y1}" x2="{x2}" y2="{y2}" marker-end="url(#arrow)"/>"#
                )?;
                writeln!(
                    out,
                    r#"<text class="offset" x="{}" y="{}">{}</text>"#,
                    (x1 + x2) / 2 + 4,
                    (y1 + y2) / 2,
                    xml_escape(&label)
                )?;
            }
        }
    }

    for nodes in &layout.ranks {
        for &node in nodes {
            let (Some(object), Some(&(x, y))) = (graph.object(node), positions.get(&node)) else {
                continue;
            };
            let class = if node == start {
                "node start"
            } else if graph.is_rooted(node) {
                "node rooted"
            } else {
                "node"
            };
            writeln!(
                out,
                r#"<g class="{class}"><rect x="{x}" y="{y}" width="{w}" height="{h}" rx="4"/>"#
            )?;
            writeln!(
                out,
                r#"<text x="{}" y="{}">{}</text>"#,
                x + w / 2,
                y + h / 2 - 4,
                xml_escape(&type_label(graph, resolver, object))
            )?;
            writeln!(
                out,
                r#"<text x="{}" y="{}">{node:#x} ({} bytes)</text></g>"#,
                x + w / 2,
                y + h / 2 + 12,
                object.size()
            )?;
        }
    }

    if layout.omitted > 0 {
        let (x, y) = geometry.origin(layout.ranks.len(), 0, 1);
        writeln!(
            out,
            r#"<g class="summary"><rect x="{x}" y="{y}" width="{w}" height="{h}" rx="4"/>"#
        )?;
        writeln!(
            out,
            r#"<text x="{}" y="{}">+{} more objects</text></g>"#,
            x + w / 2,
            y + h / 2 + 4,
            layout.omitted
        )?;
    }

    writeln!(out, "</svg>")?;
    out.flush()?;

    let report = RenderReport {
        rendered: layout.rendered(),
        omitted: layout.omitted,
    };
    tracing::debug!(
        rendered = report.rendered,
        omitted = report.omitted,
        ranks = layout.ranks.len(),
        "SVG written"
    );
    Ok(report)
}

fn write_header<W: Write>(out: &mut W, geometry: &Geometry) -> Result<()> {
    let (width, height) = (geometry.width, geometry.height);
    writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}" font-family="monospace" font-size="11">"#
    )?;
    writeln!(
        out,
        r#"<defs><marker id="arrow" viewBox="0 0 10 10" refX="10" refY="5" markerWidth="6" markerHeight="6" orient="auto-start-reverse"><path d="M 0 0 L 10 5 L 0 10 z"/></marker></defs>"#
    )?;
    writeln!(
        out,
        "<style>.node rect{{fill:#f4f4f4;stroke:#555}}.rooted rect{{stroke:#b03030;stroke-width:2}}.start rect{{fill:#ffe9a8;stroke:#555}}.summary rect{{fill:none;stroke:#888;stroke-dasharray:4 3}}.edge{{stroke:#777;fill:none}}.offset{{fill:#777}}text{{text-anchor:middle}}.offset{{text-anchor:start}}</style>"
    )?;
    Ok(())
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::testing::graph;
    use crate::symbols::{NoSymbols, SymbolTable};

    fn render(g: &Graph, address: u64, options: SvgOptions) -> (String, RenderReport) {
        let mut out = Vec::new();
        let report = write_svg(g, &NoSymbols, address, &options, &mut out).unwrap();
        (String::from_utf8(out).unwrap(), report)
    }

    #[test]
    fn cycle_renders_each_object_once() {
        let g = graph(&[(0x1000, &[0x2000]), (0x2000, &[0x1000])], &[]);
        let (svg, report) = render(&g, 0x1000, SvgOptions::default());
        assert_eq!(report, RenderReport { rendered: 2, omitted: 0 });
        assert_eq!(svg.matches("<rect").count(), 2);
        assert_eq!(svg.matches("0x1000 (8 bytes)").count(), 1);
        assert_eq!(svg.matches("0x2000 (8 bytes)").count(), 1);
        assert_eq!(svg.matches("<line").count(), 2);
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(report.limit_exceeded().is_none());
    }

    #[test]
    fn node_cap_collapses_the_rest() {
        let g = graph(
            &[
                (0x1000, &[0x2000, 0x3000, 0x4000, 0x5000]),
                (0x2000, &[]),
                (0x3000, &[]),
                (0x4000, &[]),
                (0x5000, &[]),
            ],
            &[],
        );
        let options = SvgOptions {
            max_nodes: 3,
            ..SvgOptions::default()
        };
        let (svg, report) = render(&g, 0x1000, options);
        assert_eq!(report, RenderReport { rendered: 3, omitted: 2 });
        assert!(svg.contains("+2 more objects"));
        assert!(matches!(
            report.limit_exceeded(),
            Some(HeapError::RenderLimitExceeded { rendered: 3, omitted: 2 })
        ));
    }

    #[test]
    fn objects_behind_the_cap_are_counted() {
        let g = graph(
            &[
                (0x1000, &[0x2000]),
                (0x2000, &[0x3000]),
                (0x3000, &[0x4000]),
                (0x4000, &[0x5000]),
                (0x5000, &[0x3000]),
            ],
            &[],
        );
        let options = SvgOptions {
            max_nodes: 2,
            ..SvgOptions::default()
        };
        let (svg, report) = render(&g, 0x1000, options);
        assert_eq!(report, RenderReport { rendered: 2, omitted: 3 });
        assert!(svg.contains("+3 more objects"));
        assert!(!svg.contains("0x3000 (8 bytes)"));
    }

    #[test]
    fn edges_carry_offsets_and_skip_dangling_targets() {
        let g = graph(&[(0x1000, &[0x2000, 0xdead_0000, 0x2000]), (0x2000, &[])], &[]);
        let (svg, report) = render(&g, 0x1000, SvgOptions::default());
        assert_eq!(report.rendered, 2);
        assert!(svg.contains("+0x0,+0x10"));
        assert_eq!(svg.matches("<line").count(), 1);
    }

    #[test]
    fn self_reference_is_drawn_as_loop() {
        let g = graph(&[(0x1000, &[0x1000])], &[]);
        let (svg, _) = render(&g, 0x1000, SvgOptions::default());
        assert_eq!(svg.matches("<path class=\"edge\"").count(), 1);
    }

    #[test]
    fn labels_are_escaped() {
        let g = graph(&[(0x1000, &[])], &[]);
        let mut symbols = SymbolTable::new();
        symbols.insert(0x1000, "map[string]<chan int>", None);
        let mut out = Vec::new();
        write_svg(&g, &symbols, 0x1000, &SvgOptions::default(), &mut out).unwrap();
        let svg = String::from_utf8(out).unwrap();
        assert!(svg.contains("map[string]&lt;chan int&gt;"));
    }

    #[test]
    fn unknown_address_fails() {
        let g = graph(&[(0x1000, &[])], &[]);
        let mut out = Vec::new();
        let err = write_svg(&g, &NoSymbols, 0x42, &SvgOptions::default(), &mut out).unwrap_err();
        assert!(matches!(err, HeapError::UnknownAddress(0x42)));
        assert!(out.is_empty());
    }

    #[test]
    fn write_failures_surface() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk full"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let g = graph(&[(0x1000, &[])], &[]);
        let err = write_svg(&g, &NoSymbols, 0x1000, &SvgOptions::default(), Broken).unwrap_err();
        assert!(matches!(err, HeapError::Io(_)));
    }
}
