use std::fmt::{self, Write};

use super::lookup;
use crate::error::Result;
use crate::graph::Graph;

const BYTES_PER_LINE: usize = 16;

impl Graph {
    /// Offset, hex and printable-ASCII lines covering the whole object.
    pub fn hexdump(&self, address: u64) -> Result<String> {
        let object = lookup(self, address)?;
        let mut out = String::with_capacity(object.contents.len() / BYTES_PER_LINE * 80 + 80);
        // Writing into a String cannot fail.
        let _ = write_hexdump(&object.contents, &mut out);
        Ok(out)
    }
}

/// Write `bytes` in `hexdump -C` style, 16 bytes per line.
pub fn write_hexdump<W: Write>(bytes: &[u8], out: &mut W) -> fmt::Result {
    for (line, chunk) in bytes.chunks(BYTES_PER_LINE).enumerate() {
        write!(out, "{:08x} ", line * BYTES_PER_LINE)?;
        for idx in 0..BYTES_PER_LINE {
            if idx % 8 == 0 {
                out.write_char(' ')?;
            }
            match chunk.get(idx) {
                Some(byte) => write!(out, "{byte:02x} ")?,
                None => out.write_str("   ")?,
            }
        }
        out.write_str(" |")?;
        for &byte in chunk {
            let c = if byte.is_ascii_graphic() || byte == b' ' {
                byte as char
            } else {
                '.'
            };
            out.write_char(c)?;
        }
        out.write_str("|\n")?;
    }
    Ok(())
}
