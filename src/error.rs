//! Error type shared by the decoder, graph builder, queries and renderers.

use thiserror::Error;

/// Convenience alias used across the library.
pub type Result<T, E = HeapError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum HeapError {
    /// The byte stream is not a well-formed heap dump.
    #[error("Malformed heap dump at byte {offset}{}: {reason}", tag_suffix(.tag))]
    MalformedFormat {
        offset: u64,
        tag: Option<u64>,
        reason: String,
    },
    /// The dump ended without a dump-parameters record.
    #[error("Incomplete heap dump: no dump parameters record")]
    IncompleteSnapshot,
    /// Two object records share an address.
    #[error("Duplicate object address {address:#x}")]
    DuplicateAddress { address: u64 },
    /// A query named an address that no object covers.
    #[error("No object at address {0:#x}")]
    UnknownAddress(u64),
    /// Rendering hit the node cap; the output is complete but summarized.
    #[error("Render limit exceeded: {rendered} objects drawn, {omitted} summarized")]
    RenderLimitExceeded { rendered: usize, omitted: usize },
    /// A symbol or oid file line could not be parsed.
    #[error("Symbol file line {line}: {reason}")]
    SymbolParse { line: usize, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HeapError {
    pub(crate) fn malformed(offset: u64, tag: Option<u64>, reason: impl Into<String>) -> Self {
        HeapError::MalformedFormat {
            offset,
            tag,
            reason: reason.into(),
        }
    }

    /// Whether the error invalidates the whole snapshot (as opposed to one query).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HeapError::MalformedFormat { .. }
                | HeapError::IncompleteSnapshot
                | HeapError::DuplicateAddress { .. }
                | HeapError::Io(_)
        )
    }
}

fn tag_suffix(tag: &Option<u64>) -> String {
    match tag {
        Some(tag) => format!(" (tag {tag})"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_message_includes_offset_and_tag() {
        let err = HeapError::malformed(42, Some(7), "truncated field");
        assert_eq!(
            err.to_string(),
            "Malformed heap dump at byte 42 (tag 7): truncated field"
        );

        let err = HeapError::malformed(0, None, "bad header");
        assert_eq!(err.to_string(), "Malformed heap dump at byte 0: bad header");
    }

    #[test]
    fn addresses_are_hex() {
        assert_eq!(
            HeapError::UnknownAddress(0xc000010000).to_string(),
            "No object at address 0xc000010000"
        );
        assert_eq!(
            HeapError::DuplicateAddress { address: 0x10 }.to_string(),
            "Duplicate object address 0x10"
        );
    }

    #[test]
    fn query_errors_are_not_fatal() {
        assert!(!HeapError::UnknownAddress(1).is_fatal());
        assert!(!HeapError::RenderLimitExceeded {
            rendered: 1,
            omitted: 1
        }
        .is_fatal());
        assert!(HeapError::IncompleteSnapshot.is_fatal());
    }
}
