//! Encoder for the heap dump format.
//!
//! Produces streams [`RecordReader`](super::RecordReader) accepts. Used to
//! build synthetic snapshots for tests and tooling.

use std::io::{self, Read, Write};

use super::record::{ProfileFrame, Record, SegmentKind};
use super::schema::{tag, FIELD_KIND_EOL, FIELD_KIND_PTR};
use super::varint::write_uvarint;

pub const HEADER: &[u8] = b"go1.7 heap dump\n";

pub struct DumpWriter<W: Write> {
    out: W,
}

impl<W: Write> DumpWriter<W> {
    /// Start a dump, writing the header.
    pub fn new(mut out: W) -> io::Result<Self> {
        out.write_all(HEADER)?;
        Ok(Self { out })
    }

    /// Write the EOF record and hand back the sink.
    pub fn finish(mut self) -> io::Result<W> {
        self.uvarint(tag::EOF)?;
        self.out.flush()?;
        Ok(self.out)
    }

    /// Encode any record. The record's `offset` is ignored.
    pub fn write_record(&mut self, record: &Record) -> io::Result<()> {
        match record {
            Record::Object {
                address,
                contents,
                pointers,
                ..
            } => {
                self.uvarint(tag::OBJECT)?;
                self.uvarint(*address)?;
                self.bytes(contents)?;
                self.field_list(pointers)
            }
            Record::OtherRoot {
                description,
                address,
                ..
            } => {
                self.uvarint(tag::OTHER_ROOT)?;
                self.bytes(description.as_bytes())?;
                self.uvarint(*address)
            }
            Record::Type {
                address,
                size,
                name,
                indirect,
                ..
            } => {
                self.uvarint(tag::TYPE)?;
                self.uvarint(*address)?;
                self.uvarint(*size)?;
                self.bytes(name.as_bytes())?;
                self.boolean(*indirect)
            }
            Record::Goroutine {
                address,
                stack_top,
                id,
                creator_pc,
                status,
                is_system,
                is_background,
                wait_since,
                wait_reason,
                context,
                thread,
                top_defer,
                top_panic,
                ..
            } => {
                self.uvarint(tag::GOROUTINE)?;
                self.uvarints(&[*address, *stack_top, *id, *creator_pc, *status])?;
                self.boolean(*is_system)?;
                self.boolean(*is_background)?;
                self.uvarint(*wait_since)?;
                self.bytes(wait_reason.as_bytes())?;
                self.uvarints(&[*context, *thread, *top_defer, *top_panic])
            }
            Record::StackFrame {
                stack_pointer,
                depth,
                child_pointer,
                contents,
                entry_pc,
                pc,
                continuation_pc,
                name,
                pointers,
                ..
            } => {
                self.uvarint(tag::STACK_FRAME)?;
                self.uvarints(&[*stack_pointer, *depth, *child_pointer])?;
                self.bytes(contents)?;
                self.uvarints(&[*entry_pc, *pc, *continuation_pc])?;
                self.bytes(name.as_bytes())?;
                self.field_list(pointers)
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
            } => {
                self.uvarint(tag::PARAMS)?;
                self.boolean(*big_endian)?;
                self.uvarints(&[*pointer_size, *heap_start, *heap_end])?;
                self.bytes(arch.as_bytes())?;
                self.bytes(experiment.as_bytes())?;
                self.uvarint(*ncpu)
            }
            Record::Finalizer {
                queued,
                object,
                fn_val,
                fn_pc,
                arg_type,
                object_type,
                ..
            } => {
                self.uvarint(if *queued {
                    tag::QUEUED_FINALIZER
                } else {
                    tag::FINALIZER
                })?;
                self.uvarints(&[*object, *fn_val, *fn_pc, *arg_type, *object_type])
            }
            Record::Itab {
                address,
                type_address,
                ..
            } => {
                self.uvarint(tag::ITAB)?;
                self.uvarints(&[*address, *type_address])
            }
            Record::OsThread {
                address,
                go_id,
                os_id,
                ..
            } => {
                self.uvarint(tag::OS_THREAD)?;
                self.uvarints(&[*address, *go_id, *os_id])
            }
            Record::MemStats {
                stats,
                pauses,
                num_gc,
                ..
            } => {
                self.uvarint(tag::MEMSTATS)?;
                self.uvarints(stats)?;
                self.uvarints(pauses)?;
                self.uvarint(*num_gc)
            }
            Record::Segment {
                kind,
                address,
                contents,
                pointers,
                ..
            } => {
                self.uvarint(match kind {
                    SegmentKind::Data => tag::DATA,
                    SegmentKind::Bss => tag::BSS,
                })?;
                self.uvarint(*address)?;
                self.bytes(contents)?;
                self.field_list(pointers)
            }
            Record::Defer {
                address,
                goroutine,
                argp,
                pc,
                fn_val,
                fn_pc,
                link,
                ..
            } => {
                self.uvarint(tag::DEFER)?;
                self.uvarints(&[*address, *goroutine, *argp, *pc, *fn_val, *fn_pc, *link])
            }
            Record::Panic {
                address,
                goroutine,
                arg_type,
                arg_data,
                defer,
                link,
                ..
            } => {
                self.uvarint(tag::PANIC)?;
                self.uvarints(&[*address, *goroutine, *arg_type, *arg_data, *defer, *link])
            }
            Record::AllocProfile {
                id,
                size,
                frames,
                allocs,
                frees,
                ..
            } => {
                self.uvarint(tag::ALLOC_PROFILE)?;
                self.uvarints(&[*id, *size])?;
                self.frames(frames)?;
                self.uvarints(&[*allocs, *frees])
            }
            Record::AllocSample {
                address, profile, ..
            } => {
                self.uvarint(tag::ALLOC_SAMPLE)?;
                self.uvarints(&[*address, *profile])
            }
            Record::Extension { tag, len, .. } => {
                // Only the frame survives decoding; re-emit zeroed payload.
                self.uvarint(*tag)?;
                self.uvarint(*len)?;
                io::copy(&mut io::repeat(0).take(*len), &mut self.out)?;
                Ok(())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn params(
        &mut self,
        big_endian: bool,
        pointer_size: u64,
        heap_start: u64,
        heap_end: u64,
        arch: &str,
        experiment: &str,
        ncpu: u64,
    ) -> io::Result<()> {
        self.write_record(&Record::Params {
            offset: 0,
            big_endian,
            pointer_size,
            heap_start,
            heap_end,
            arch: arch.to_string(),
            experiment: experiment.to_string(),
            ncpu,
        })
    }

    pub fn object(&mut self, address: u64, contents: &[u8], pointers: &[u64]) -> io::Result<()> {
        self.uvarint(tag::OBJECT)?;
        self.uvarint(address)?;
        self.bytes(contents)?;
        self.field_list(pointers)
    }

    pub fn other_root(&mut self, description: &str, address: u64) -> io::Result<()> {
        self.uvarint(tag::OTHER_ROOT)?;
        self.bytes(description.as_bytes())?;
        self.uvarint(address)
    }

    /// A length-delimited record with an arbitrary payload.
    pub fn extension(&mut self, tag: u64, payload: &[u8]) -> io::Result<()> {
        self.uvarint(tag)?;
        self.bytes(payload)
    }

    fn uvarint(&mut self, value: u64) -> io::Result<()> {
        write_uvarint(&mut self.out, value).map(|_| ())
    }

    fn uvarints(&mut self, values: &[u64]) -> io::Result<()> {
        values.iter().try_for_each(|v| self.uvarint(*v))
    }

    fn boolean(&mut self, value: bool) -> io::Result<()> {
        self.uvarint(u64::from(value))
    }

    fn bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.uvarint(bytes.len() as u64)?;
        self.out.write_all(bytes)
    }

    fn field_list(&mut self, pointers: &[u64]) -> io::Result<()> {
        for offset in pointers {
            self.uvarint(FIELD_KIND_PTR)?;
            self.uvarint(*offset)?;
        }
        self.uvarint(FIELD_KIND_EOL)
    }

    fn frames(&mut self, frames: &[ProfileFrame]) -> io::Result<()> {
        self.uvarint(frames.len() as u64)?;
        for frame in frames {
            self.bytes(frame.function.as_bytes())?;
            self.bytes(frame.file.as_bytes())?;
            self.uvarint(frame.line)?;
        }
        Ok(())
    }
}

/// Encode a complete dump from a list of records.
pub fn encode_records(records: &[Record]) -> io::Result<Vec<u8>> {
    let mut writer = DumpWriter::new(Vec::new())?;
    for record in records {
        writer.write_record(record)?;
    }
    writer.finish()
}
