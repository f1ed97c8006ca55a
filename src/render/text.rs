//! Plain-text and JSON reports.

use std::fmt::Write as _;
use std::io::{self, BufRead, Write};

use serde::Serialize;

use super::{object_label, type_label};
use crate::dump::{Record, RecordReader};
use crate::error::Result;
use crate::graph::{DumpParams, Graph};
use crate::query::{Anchor, Intersection, Owners, Signature};
use crate::symbols::SymbolResolver;

/// Print one line per record, optionally only those containing `find`.
///
/// Once the parameters record has been seen, pointer slots are shown with
/// the values they hold. Returns the number of lines written.
pub fn print_records<R: BufRead, W: Write>(
    reader: RecordReader<R>,
    find: Option<&str>,
    out: &mut W,
) -> Result<u64> {
    let version = reader.version().to_string();
    let mut params: Option<DumpParams> = None;
    let mut printed = 0;
    for record in reader {
        let record = record?;
        if let Record::Params {
            big_endian,
            pointer_size,
            heap_start,
            heap_end,
            arch,
            experiment,
            ncpu,
            ..
        } = &record
        {
            params = Some(DumpParams {
                format_version: version.clone(),
                big_endian: *big_endian,
                pointer_size: *pointer_size,
                heap_start: *heap_start,
                heap_end: *heap_end,
                arch: arch.clone(),
                experiment: experiment.clone(),
                ncpu: *ncpu,
            });
        }
        let line = format_record(&record, params.as_ref());
        if find.is_some_and(|needle| !line.contains(needle)) {
            continue;
        }
        writeln!(out, "{line}")?;
        printed += 1;
    }
    Ok(printed)
}

/// `@offset kind field=value ...`
pub fn format_record(record: &Record, params: Option<&DumpParams>) -> String {
    let mut line = format!("@{} {}", record.offset(), record.name());
    // Formatting into a String cannot fail.
    let _ = write_fields(&mut line, record, params);
    line
}

fn write_fields(line: &mut String, record: &Record, params: Option<&DumpParams>) -> std::fmt::Result {
    match record {
        Record::Object {
            address,
            contents,
            pointers,
            ..
        } => {
            write!(line, " address={address:#x} size={}", contents.len())?;
            write_pointers(line, contents, pointers, params)
        }
        Record::OtherRoot {
            description,
            address,
            ..
        } => write!(line, " description={description:?} address={address:#x}"),
        Record::Type {
            address,
            size,
            name,
            indirect,
            ..
        } => write!(
            line,
            " address={address:#x} size={size} name={name:?} indirect={indirect}"
        ),
        Record::Goroutine {
            address,
            stack_top,
            id,
            status,
            is_system,
            wait_reason,
            thread,
            ..
        } => write!(
            line,
            " address={address:#x} id={id} stack_top={stack_top:#x} status={status} system={is_system} wait_reason={wait_reason:?} thread={thread:#x}"
        ),
        Record::StackFrame {
            stack_pointer,
            depth,
            child_pointer,
            contents,
            pc,
            name,
            pointers,
            ..
        } => {
            write!(
                line,
                " sp={stack_pointer:#x} depth={depth} child={child_pointer:#x} pc={pc:#x} name={name:?} size={}",
                contents.len()
            )?;
            write_pointers(line, contents, pointers, params)
        }
        Record::Params {
            big_endian,
            pointer_size,
            heap_start,
            heap_end,
            arch,
            experiment,
            ncpu,
            ..
        } => write!(
            line,
            " big_endian={big_endian} pointer_size={pointer_size} heap={heap_start:#x}-{heap_end:#x} arch={arch:?} experiment={experiment:?} ncpu={ncpu}"
        ),
        Record::Finalizer {
            object,
            fn_val,
            fn_pc,
            arg_type,
            object_type,
            ..
        } => write!(
            line,
            " object={object:#x} fn={fn_val:#x} fn_pc={fn_pc:#x} arg_type={arg_type:#x} object_type={object_type:#x}"
        ),
        Record::Itab {
            address,
            type_address,
            ..
        } => write!(line, " address={address:#x} type={type_address:#x}"),
        Record::OsThread {
            address,
            go_id,
            os_id,
            ..
        } => write!(line, " address={address:#x} go_id={go_id} os_id={os_id}"),
        Record::MemStats { stats, num_gc, .. } => {
            let stat = |idx: usize| stats.get(idx).copied().unwrap_or_default();
            write!(
                line,
                " alloc={} total_alloc={} sys={} num_gc={num_gc}",
                stat(0),
                stat(1),
                stat(2)
            )
        }
        Record::Segment {
            address,
            contents,
            pointers,
            ..
        } => {
            write!(line, " address={address:#x} size={}", contents.len())?;
            write_pointers(line, contents, pointers, params)
        }
        Record::Defer {
            address,
            goroutine,
            argp,
            pc,
            fn_val,
            link,
            ..
        } => write!(
            line,
            " address={address:#x} goroutine={goroutine:#x} argp={argp:#x} pc={pc:#x} fn={fn_val:#x} link={link:#x}"
        ),
        Record::Panic {
            address,
            goroutine,
            arg_type,
            arg_data,
            defer,
            link,
            ..
        } => write!(
            line,
            " address={address:#x} goroutine={goroutine:#x} arg_type={arg_type:#x} arg_data={arg_data:#x} defer={defer:#x} link={link:#x}"
        ),
        Record::AllocProfile {
            id,
            size,
            frames,
            allocs,
            frees,
            ..
        } => {
            write!(
                line,
                " id={id} size={size} allocs={allocs} frees={frees} frames={}",
                frames.len()
            )?;
            if let Some(top) = frames.first() {
                write!(line, " top={:?} at {}:{}", top.function, top.file, top.line)?;
            }
            Ok(())
        }
        Record::AllocSample {
            address, profile, ..
        } => write!(line, " address={address:#x} profile={profile}"),
        Record::Extension { tag, len, .. } => write!(line, " tag={tag} len={len}"),
    }
}

fn write_pointers(
    line: &mut String,
    contents: &[u8],
    pointers: &[u64],
    params: Option<&DumpParams>,
) -> std::fmt::Result {
    line.push_str(" pointers=[");
    for (idx, &offset) in pointers.iter().enumerate() {
        if idx > 0 {
            line.push_str(", ");
        }
        write!(line, "{offset:#x}")?;
        if let Some(value) = params.and_then(|p| p.read_pointer(contents, offset)) {
            write!(line, "={value:#x}")?;
        }
    }
    line.push(']');
    Ok(())
}

pub fn write_anchors<W: Write>(
    graph: &Graph,
    resolver: &dyn SymbolResolver,
    address: u64,
    anchors: &[Anchor<'_>],
    out: &mut W,
) -> Result<()> {
    let target = object_label(graph, resolver, address);
    if anchors.is_empty() {
        writeln!(out, "{target} is not reachable from any root")?;
        return Ok(());
    }
    let plural = if anchors.len() == 1 { "" } else { "s" };
    writeln!(out, "{target} is kept alive by {} root{plural}:", anchors.len())?;
    for anchor in anchors {
        writeln!(out, "  [{}] {}", anchor.root.kind.as_str(), anchor.root.label)?;
        for link in &anchor.chain {
            writeln!(
                out,
                "    {} +{:#x} -> {:#x}",
                object_label(graph, resolver, link.from),
                link.offset,
                link.to
            )?;
        }
    }
    Ok(())
}

pub fn write_owners<W: Write>(
    graph: &Graph,
    resolver: &dyn SymbolResolver,
    owners: &Owners,
    out: &mut W,
) -> Result<()> {
    let target = object_label(graph, resolver, owners.target);
    if owners.is_empty() {
        writeln!(out, "{target} has no owners")?;
        return Ok(());
    }
    writeln!(out, "owners of {target}:")?;
    for (depth, level) in owners.levels.iter().enumerate() {
        writeln!(out, "level {depth}:")?;
        for link in level {
            writeln!(
                out,
                "  {} +{:#x} -> {:#x}",
                object_label(graph, resolver, link.from),
                link.offset,
                link.to
            )?;
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct IntersectedObject {
    pub address: u64,
    pub size: u64,
    #[serde(rename = "type")]
    pub type_name: String,
    pub signature: Signature,
}

/// Serializable form of an [`Intersection`].
#[derive(Debug, Serialize)]
pub struct IntersectionReport<'g> {
    pub params: &'g DumpParams,
    pub objects: Vec<IntersectedObject>,
}

impl<'g> IntersectionReport<'g> {
    pub fn new(graph: &Graph, resolver: &dyn SymbolResolver, intersection: &Intersection<'g>) -> Self {
        let objects = intersection
            .records()
            .iter()
            .map(|object| IntersectedObject {
                address: object.address,
                size: object.size(),
                type_name: type_label(graph, resolver, object),
                signature: graph.signature(object),
            })
            .collect();
        Self {
            params: intersection.params(),
            objects,
        }
    }
}

pub fn write_intersection<W: Write>(
    graph: &Graph,
    resolver: &dyn SymbolResolver,
    intersection: &Intersection<'_>,
    out: &mut W,
) -> Result<()> {
    let params = intersection.params();
    writeln!(
        out,
        "# {} objects in common ({} {}, {}-bit)",
        intersection.len(),
        params.format_version,
        params.arch,
        params.pointer_size * 8
    )?;
    for object in intersection.records() {
        writeln!(
            out,
            "object address={:#x} size={} type={:?} pointers={}",
            object.address,
            object.size(),
            type_label(graph, resolver, object),
            object.pointer_offsets.len()
        )?;
    }
    Ok(())
}

pub fn write_json<T: Serialize + ?Sized, W: Write>(value: &T, out: &mut W) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).map_err(io::Error::from)?;
    writeln!(out)?;
    Ok(())
}
