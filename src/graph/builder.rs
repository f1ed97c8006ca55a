use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;

use super::model::{containing, DumpParams, Edge, Goroutine, Graph, HeapObject, Root, RootKind};
use crate::dump::record::SegmentKind;
use crate::dump::schema::tag;
use crate::dump::{Record, RecordReader};
use crate::error::{HeapError, Result};
use crate::symbols::{describe, SymbolResolver};

const PROGRESS_INTERVAL: u64 = 1_000_000;

struct PendingObject {
    record_offset: u64,
    object: HeapObject,
}

struct PendingFrame {
    record_offset: u64,
    stack_pointer: u64,
    depth: u64,
    child_pointer: u64,
    name: String,
    contents: Vec<u8>,
    pointers: Vec<u64>,
}

struct PendingSegment {
    record_offset: u64,
    kind: SegmentKind,
    address: u64,
    contents: Vec<u8>,
    pointers: Vec<u64>,
}

/// Accumulates records and links them into a [`Graph`].
///
/// Records may arrive in any order; nothing is linked until [`finish`].
///
/// [`finish`]: GraphBuilder::finish
pub struct GraphBuilder<'r> {
    resolver: &'r dyn SymbolResolver,
    format_version: String,
    params: Option<DumpParams>,
    objects: BTreeMap<u64, PendingObject>,
    frames: Vec<PendingFrame>,
    segments: Vec<PendingSegment>,
    roots: Vec<Root>,
    goroutines: Vec<Goroutine>,
    object_types: HashMap<u64, u64>,
    type_names: HashMap<u64, String>,
    records: u64,
}

impl<'r> GraphBuilder<'r> {
    pub fn new(resolver: &'r dyn SymbolResolver) -> Self {
        Self {
            resolver,
            format_version: String::new(),
            params: None,
            objects: BTreeMap::new(),
            frames: Vec::new(),
            segments: Vec::new(),
            roots: Vec::new(),
            goroutines: Vec::new(),
            object_types: HashMap::new(),
            type_names: HashMap::new(),
            records: 0,
        }
    }

    pub fn with_format_version(mut self, version: impl Into<String>) -> Self {
        self.format_version = version.into();
        self
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn push(&mut self, record: Record) -> Result<()> {
        self.records += 1;
        match record {
            Record::Object {
                offset,
                address,
                contents,
                pointers,
            } => {
                if self.objects.contains_key(&address) {
                    return Err(HeapError::DuplicateAddress { address });
                }
                self.objects.insert(
                    address,
                    PendingObject {
                        record_offset: offset,
                        object: HeapObject {
                            address,
                            type_id: None,
                            pointer_offsets: pointers,
                            edges: Vec::new(),
                            contents: contents.into_boxed_slice(),
                        },
                    },
                );
            }
            Record::Params {
                offset,
                big_endian,
                pointer_size,
                heap_start,
                heap_end,
                arch,
                experiment,
                ncpu,
            } => {
                if self.params.is_some() {
                    return Err(HeapError::malformed(
                        offset,
                        Some(tag::PARAMS),
                        "duplicate dump parameters record",
                    ));
                }
                if pointer_size != 4 && pointer_size != 8 {
                    return Err(HeapError::malformed(
                        offset,
                        Some(tag::PARAMS),
                        format!("unsupported pointer size {pointer_size}"),
                    ));
                }
                self.params = Some(DumpParams {
                    format_version: self.format_version.clone(),
                    big_endian,
                    pointer_size,
                    heap_start,
                    heap_end,
                    arch,
                    experiment,
                    ncpu,
                });
            }
            Record::StackFrame {
                offset,
                stack_pointer,
                depth,
                child_pointer,
                contents,
                name,
                pointers,
                ..
            } => self.frames.push(PendingFrame {
                record_offset: offset,
                stack_pointer,
                depth,
                child_pointer,
                name,
                contents,
                pointers,
            }),
            Record::Segment {
                offset,
                kind,
                address,
                contents,
                pointers,
            } => self.segments.push(PendingSegment {
                record_offset: offset,
                kind,
                address,
                contents,
                pointers,
            }),
            Record::Finalizer {
                queued,
                object,
                fn_val,
                object_type,
                ..
            } => {
                if object_type != 0 {
                    self.object_types.insert(object, object_type);
                }
                if queued {
                    self.roots.push(Root {
                        kind: RootKind::QueuedFinalizer,
                        target: object,
                        label: format!("queued finalizer {fn_val:#x}"),
                    });
                    self.roots.push(Root {
                        kind: RootKind::QueuedFinalizer,
                        target: fn_val,
                        label: format!("queued finalizer for {object:#x}"),
                    });
                } else {
                    self.roots.push(Root {
                        kind: RootKind::Finalizer,
                        target: fn_val,
                        label: format!("finalizer for {object:#x}"),
                    });
                }
            }
            Record::OsThread {
                address,
                go_id,
                os_id,
                ..
            } => self.roots.push(Root {
                kind: RootKind::OsThread,
                target: address,
                label: format!("os thread {os_id} (m{go_id})"),
            }),
            Record::OtherRoot {
                description,
                address,
                ..
            } => self.roots.push(Root {
                kind: RootKind::Other,
                target: address,
                label: description,
            }),
            Record::Type { address, name, .. } => {
                self.type_names.entry(address).or_insert(name);
            }
            Record::Goroutine {
                address,
                stack_top,
                id,
                status,
                is_system,
                wait_reason,
                ..
            } => self.goroutines.push(Goroutine {
                address,
                id,
                stack_top,
                status,
                wait_reason,
                is_system,
            }),
            other => {
                tracing::trace!(record = other.name(), offset = other.offset(), "Ignoring record");
            }
        }
        if self.records % PROGRESS_INTERVAL == 0 {
            tracing::debug!(
                records = self.records,
                objects = self.objects.len(),
                "Building heap graph"
            );
        }
        Ok(())
    }

    /// Link everything pushed so far into an immutable graph.
    pub fn finish(self) -> Result<Graph> {
        let Self {
            resolver,
            params,
            objects: pending,
            frames,
            segments,
            mut roots,
            goroutines,
            mut object_types,
            type_names,
            ..
        } = self;
        let params = params.ok_or(HeapError::IncompleteSnapshot)?;

        let mut objects = BTreeMap::new();
        let mut slots = Vec::with_capacity(pending.len());
        for (address, PendingObject { record_offset, mut object }) in pending {
            let values = pointer_values(
                &params,
                record_offset,
                tag::OBJECT,
                &object.contents,
                &object.pointer_offsets,
            )?;
            object.type_id = object_types.remove(&address);
            slots.push((address, values));
            objects.insert(address, object);
        }

        // Edges point at object bases; pointers outside every object keep
        // their raw value.
        let mut referrers: HashMap<u64, Vec<u64>> = HashMap::new();
        for (address, values) in slots {
            let edges: Vec<Edge> = values
                .into_iter()
                .map(|(offset, value)| Edge {
                    offset,
                    target: containing(&objects, value).unwrap_or(value),
                })
                .collect();
            for edge in &edges {
                let list = referrers.entry(edge.target).or_default();
                if list.last() != Some(&address) {
                    list.push(address);
                }
            }
            if let Some(object) = objects.get_mut(&address) {
                object.edges = edges;
            }
        }

        let frame_roots = stack_roots(&params, &frames, &goroutines)?;
        roots.extend(frame_roots);
        for segment in &segments {
            roots.extend(segment_roots(&params, resolver, segment)?);
        }

        let mut rooted: HashMap<u64, Vec<usize>> = HashMap::new();
        roots.retain(|root| root.target != 0);
        for (idx, root) in roots.iter_mut().enumerate() {
            root.target = containing(&objects, root.target).unwrap_or(root.target);
            rooted.entry(root.target).or_default().push(idx);
        }

        let graph = Graph {
            params,
            objects,
            roots,
            referrers,
            rooted,
            goroutines,
            type_names,
        };
        tracing::info!(
            objects = graph.len(),
            edges = graph.edge_count(),
            roots = graph.roots().len(),
            goroutines = graph.goroutines().len(),
            "Heap graph built"
        );
        Ok(graph)
    }
}

impl Graph {
    /// Decode every record from `reader` and build the graph.
    pub fn build<R: BufRead>(reader: RecordReader<R>, resolver: &dyn SymbolResolver) -> Result<Self> {
        let mut builder = GraphBuilder::new(resolver).with_format_version(reader.version());
        for record in reader {
            builder.push(record?)?;
        }
        builder.finish()
    }
}

/// Non-nil pointer values read from `contents` at each slot offset.
fn pointer_values(
    params: &DumpParams,
    record_offset: u64,
    record_tag: u64,
    contents: &[u8],
    offsets: &[u64],
) -> Result<Vec<(u64, u64)>> {
    let mut values = Vec::with_capacity(offsets.len());
    for &offset in offsets {
        let value = params.read_pointer(contents, offset).ok_or_else(|| {
            HeapError::malformed(
                record_offset,
                Some(record_tag),
                format!(
                    "pointer slot at {offset:#x} overruns {} bytes of contents",
                    contents.len()
                ),
            )
        })?;
        if value != 0 {
            values.push((offset, value));
        }
    }
    Ok(values)
}

fn stack_roots(
    params: &DumpParams,
    frames: &[PendingFrame],
    goroutines: &[Goroutine],
) -> Result<Vec<Root>> {
    let by_sp: HashMap<u64, &PendingFrame> = frames.iter().map(|f| (f.stack_pointer, f)).collect();
    let by_stack_top: HashMap<u64, u64> = goroutines.iter().map(|g| (g.stack_top, g.id)).collect();

    let mut roots = Vec::new();
    for frame in frames {
        let owner = innermost(frame, &by_sp, frames.len()).and_then(|f| by_stack_top.get(&f.stack_pointer));
        let prefix = match owner {
            Some(id) => format!("goroutine {id} "),
            None => String::new(),
        };
        for (offset, value) in pointer_values(
            params,
            frame.record_offset,
            tag::STACK_FRAME,
            &frame.contents,
            &frame.pointers,
        )? {
            roots.push(Root {
                kind: RootKind::StackFrame,
                target: value,
                label: format!("{prefix}{}", describe(&frame.name, offset)),
            });
        }
    }
    Ok(roots)
}

/// Follow child links down to the depth-0 frame of the same stack.
fn innermost<'f>(
    frame: &'f PendingFrame,
    by_sp: &HashMap<u64, &'f PendingFrame>,
    limit: usize,
) -> Option<&'f PendingFrame> {
    let mut current = frame;
    for _ in 0..=limit {
        if current.depth == 0 {
            return Some(current);
        }
        current = *by_sp.get(&current.child_pointer)?;
    }
    None
}

fn segment_roots(
    params: &DumpParams,
    resolver: &dyn SymbolResolver,
    segment: &PendingSegment,
) -> Result<Vec<Root>> {
    let record_tag = match segment.kind {
        SegmentKind::Data => tag::DATA,
        SegmentKind::Bss => tag::BSS,
    };
    let fallback = match segment.kind {
        SegmentKind::Data => "data",
        SegmentKind::Bss => "bss",
    };
    let values = pointer_values(
        params,
        segment.record_offset,
        record_tag,
        &segment.contents,
        &segment.pointers,
    )?;
    values
        .into_iter()
        .map(|(offset, value)| {
            let slot = segment.address.checked_add(offset).ok_or_else(|| {
                HeapError::malformed(
                    segment.record_offset,
                    Some(record_tag),
                    format!(
                        "pointer slot at {offset:#x} overflows segment address {:#x}",
                        segment.address
                    ),
                )
            })?;
            let label = match resolver.lookup_containing(slot) {
                Some((name, within)) => describe(name, within),
                None => describe(fallback, offset),
            };
            Ok(Root {
                kind: RootKind::Global,
                target: value,
                label,
            })
        })
        .collect()
}
