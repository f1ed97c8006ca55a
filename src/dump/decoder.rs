//! Streaming heap dump reader.
//!
//! [`RecordReader`] pulls one record at a time from a buffered stream, so
//! memory use is bounded by the largest single record rather than the dump.

use std::io::{self, BufRead, Read};

use super::record::{lossy, Field, ProfileFrame, RawRecord, Record};
use super::schema::{self, tag, FieldKind, FIELD_KIND_EOL, FIELD_KIND_PTR};
use super::varint::{self, VarintError};
use crate::error::{HeapError, Result};

/// Default cap on a single byte string (object contents, frame contents, names).
pub const DEFAULT_MAX_RECORD_BYTES: u64 = 1 << 30;

const HEADER_SUFFIX: &str = " heap dump\n";
const MAX_HEADER_LEN: u64 = 32;

/// Byte-counting wrapper so every error can name its stream offset.
struct Counting<R> {
    inner: R,
    pos: u64,
}

impl<R: Read> Read for Counting<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: BufRead> BufRead for Counting<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
        self.pos += amt as u64;
    }
}

/// Forward-only iterator over the records of one heap dump.
pub struct RecordReader<R> {
    reader: Counting<R>,
    version: String,
    max_record_bytes: u64,
    records: u64,
    done: bool,
}

impl<R: BufRead> RecordReader<R> {
    /// Validate the stream header and position the reader at the first record.
    pub fn new(reader: R) -> Result<Self> {
        let mut reader = Counting {
            inner: reader,
            pos: 0,
        };
        let version = read_header(&mut reader)?;
        tracing::debug!(version = %version, "Heap dump header accepted");
        Ok(Self {
            reader,
            version,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
            records: 0,
            done: false,
        })
    }

    pub fn with_max_record_bytes(mut self, max: u64) -> Self {
        self.max_record_bytes = max;
        self
    }

    /// Format version from the header, e.g. `go1.7`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Bytes consumed so far, header included.
    pub fn offset(&self) -> u64 {
        self.reader.pos
    }

    /// Records yielded so far.
    pub fn records_read(&self) -> u64 {
        self.records
    }

    fn read_record(&mut self) -> Result<Option<Record>> {
        if self.reader.fill_buf()?.is_empty() {
            tracing::debug!(
                offset = self.reader.pos,
                "Heap dump ended without an EOF record"
            );
            return Ok(None);
        }

        let offset = self.reader.pos;
        let record_tag = self.uvarint(offset, None)?;

        if record_tag == tag::EOF {
            return Ok(None);
        }

        if schema::is_extension(record_tag) {
            let len = self.uvarint(offset, Some(record_tag))?;
            self.skip(len, offset, record_tag)?;
            return Ok(Some(Record::Extension {
                offset,
                tag: record_tag,
                len,
            }));
        }

        let Some(layout) = schema::fields_for(record_tag) else {
            return Err(HeapError::malformed(
                offset,
                Some(record_tag),
                "unrecognized record tag",
            ));
        };

        let mut fields = Vec::with_capacity(layout.len());
        for kind in layout {
            fields.push(self.read_field(*kind, offset, record_tag)?);
        }

        Record::from_raw(RawRecord {
            tag: record_tag,
            offset,
            fields,
        })
        .map(Some)
    }

    /// Decode one field of the given kind.
    pub(crate) fn read_field(&mut self, kind: FieldKind, offset: u64, tag: u64) -> Result<Field> {
        let field = match kind {
            FieldKind::Uvarint => Field::Uvarint(self.uvarint(offset, Some(tag))?),
            FieldKind::Svarint => {
                let raw = self.uvarint(offset, Some(tag))?;
                Field::Svarint(varint::zigzag_decode(raw))
            }
            FieldKind::Bool => match self.uvarint(offset, Some(tag))? {
                0 => Field::Bool(false),
                1 => Field::Bool(true),
                other => {
                    return Err(HeapError::malformed(
                        offset,
                        Some(tag),
                        format!("boolean field holds {other}"),
                    ))
                }
            },
            FieldKind::Bytes => Field::Bytes(self.bytes(offset, tag)?),
            FieldKind::FieldList => {
                let mut pointers = Vec::new();
                loop {
                    let kind = self.uvarint(offset, Some(tag))?;
                    if kind == FIELD_KIND_EOL {
                        break;
                    }
                    let field_offset = self.uvarint(offset, Some(tag))?;
                    // Older dumps also describe interface slots; only plain pointers are edges.
                    if kind == FIELD_KIND_PTR {
                        pointers.push(field_offset);
                    }
                }
                Field::Pointers(pointers)
            }
            FieldKind::UvarintArray(len) => {
                let mut values = Vec::with_capacity(len);
                for _ in 0..len {
                    values.push(self.uvarint(offset, Some(tag))?);
                }
                Field::Array(values)
            }
            FieldKind::ProfileFrames => {
                let count = self.uvarint(offset, Some(tag))?;
                if count > self.max_record_bytes {
                    return Err(HeapError::malformed(
                        offset,
                        Some(tag),
                        format!("profile declares {count} frames"),
                    ));
                }
                let mut frames = Vec::new();
                for _ in 0..count {
                    let function = lossy(self.bytes(offset, tag)?);
                    let file = lossy(self.bytes(offset, tag)?);
                    let line = self.uvarint(offset, Some(tag))?;
                    frames.push(ProfileFrame {
                        function,
                        file,
                        line,
                    });
                }
                Field::Frames(frames)
            }
        };
        Ok(field)
    }

    fn uvarint(&mut self, offset: u64, tag: Option<u64>) -> Result<u64> {
        match varint::read_uvarint(&mut self.reader) {
            Ok((value, _)) => Ok(value),
            Err(VarintError::Truncated) => Err(HeapError::malformed(
                offset,
                tag,
                format!("stream ended inside record at byte {}", self.reader.pos),
            )),
            Err(VarintError::Overflow) => Err(HeapError::malformed(
                offset,
                tag,
                format!("varint overflows 64 bits at byte {}", self.reader.pos),
            )),
            Err(VarintError::Io(e)) => Err(HeapError::Io(e)),
        }
    }

    fn bytes(&mut self, offset: u64, tag: u64) -> Result<Vec<u8>> {
        let len = self.uvarint(offset, Some(tag))?;
        self.check_len(len, offset, tag)?;
        // Grow as data arrives so a corrupt length cannot force a huge allocation.
        let mut buf = Vec::new();
        let read = (&mut self.reader).take(len).read_to_end(&mut buf)?;
        if (read as u64) < len {
            return Err(HeapError::malformed(
                offset,
                Some(tag),
                format!("byte string declares {len} bytes but only {read} remain"),
            ));
        }
        Ok(buf)
    }

    fn skip(&mut self, len: u64, offset: u64, tag: u64) -> Result<()> {
        self.check_len(len, offset, tag)?;
        let skipped = io::copy(&mut (&mut self.reader).take(len), &mut io::sink())?;
        if skipped < len {
            return Err(HeapError::malformed(
                offset,
                Some(tag),
                format!("extension record declares {len} bytes but only {skipped} remain"),
            ));
        }
        Ok(())
    }

    fn check_len(&self, len: u64, offset: u64, tag: u64) -> Result<()> {
        if len > self.max_record_bytes {
            return Err(HeapError::malformed(
                offset,
                Some(tag),
                format!(
                    "length {len} exceeds the {} byte record limit",
                    self.max_record_bytes
                ),
            ));
        }
        Ok(())
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => {
                self.records += 1;
                Some(Ok(record))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn read_header<R: BufRead>(reader: &mut Counting<R>) -> Result<String> {
    let mut line = Vec::new();
    reader.take(MAX_HEADER_LEN).read_until(b'\n', &mut line)?;
    let text = std::str::from_utf8(&line)
        .map_err(|_| HeapError::malformed(0, None, "header is not text"))?;
    match text.strip_suffix(HEADER_SUFFIX) {
        Some(version) if version.starts_with("go") => Ok(version.to_string()),
        _ => Err(HeapError::malformed(
            0,
            None,
            format!("unrecognized header {text:?}"),
        )),
    }
}
