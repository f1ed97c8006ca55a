//! Go heap dump format: varints, record layouts, the streaming reader and
//! the matching writer.

pub mod decoder;
pub mod record;
pub mod schema;
pub mod varint;
pub mod writer;

pub use decoder::{RecordReader, DEFAULT_MAX_RECORD_BYTES};
pub use record::{ProfileFrame, Record, RecordKind, SegmentKind};
pub use writer::{encode_records, DumpWriter};
