//! Base-128 variable-length integers.
//!
//! Each byte carries seven payload bits, least significant group first; the
//! high bit is set on every byte except the last. Signed values are zig-zag
//! mapped onto the unsigned encoding.

use std::io::{self, Read, Write};

/// Longest encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Why a varint could not be read.
#[derive(Debug)]
pub enum VarintError {
    /// The stream ended before the terminating byte.
    Truncated,
    /// More than [`MAX_VARINT_LEN`] bytes, or bits beyond 64.
    Overflow,
    Io(io::Error),
}

/// Read one unsigned varint, returning the value and the number of bytes consumed.
pub fn read_uvarint<R: Read>(reader: &mut R) -> Result<(u64, usize), VarintError> {
    let mut value: u64 = 0;
    let mut byte = [0u8; 1];
    for i in 0..MAX_VARINT_LEN {
        match reader.read_exact(&mut byte) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(VarintError::Truncated)
            }
            Err(e) => return Err(VarintError::Io(e)),
        }
        let b = byte[0];
        // The tenth byte may only contribute the single remaining bit.
        if i == MAX_VARINT_LEN - 1 && b > 1 {
            return Err(VarintError::Overflow);
        }
        value |= u64::from(b & 0x7f) << (7 * i);
        if b & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(VarintError::Overflow)
}

/// Encode `value` into `buf`, returning the number of bytes used.
pub fn encode_uvarint(mut value: u64, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut i = 0;
    while value >= 0x80 {
        buf[i] = (value as u8) | 0x80;
        value >>= 7;
        i += 1;
    }
    buf[i] = value as u8;
    i + 1
}

pub fn write_uvarint<W: Write>(writer: &mut W, value: u64) -> io::Result<usize> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = encode_uvarint(value, &mut buf);
    writer.write_all(&buf[..len])?;
    Ok(len)
}

pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

pub fn read_svarint<R: Read>(reader: &mut R) -> Result<(i64, usize), VarintError> {
    let (raw, len) = read_uvarint(reader)?;
    Ok((zigzag_decode(raw), len))
}

pub fn write_svarint<W: Write>(writer: &mut W, value: i64) -> io::Result<usize> {
    write_uvarint(writer, zigzag_encode(value))
}
