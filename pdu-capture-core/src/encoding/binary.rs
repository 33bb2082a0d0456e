//! Avro binary primitives.
//!
//! `int` and `long` are zig-zag mapped and written as little-endian base-128
//! varints. `bytes` and `string` are a `long` length followed by the raw
//! bytes. Booleans are a single byte.

/// Map a signed value onto an unsigned one so small magnitudes stay small.
pub fn zigzag(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

pub fn unzigzag(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

pub fn write_long(out: &mut Vec<u8>, n: i64) {
    write_varint(out, zigzag(n));
}

pub fn write_int(out: &mut Vec<u8>, n: i32) {
    write_long(out, i64::from(n));
}

pub fn write_boolean(out: &mut Vec<u8>, b: bool) {
    out.push(u8::from(b));
}

pub fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_long(out, bytes.len() as i64);
    out.extend_from_slice(bytes);
}

/// Read a zig-zag varint `long` from the front of `input`.
///
/// Returns the value and the number of bytes consumed, or `None` when the
/// input ends mid-value or the varint is longer than ten bytes.
pub fn read_long(input: &[u8]) -> Option<(i64, usize)> {
    let mut value: u64 = 0;
    for (i, &byte) in input.iter().enumerate().take(10) {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((unzigzag(value), i + 1));
        }
    }
    None
}

/// Read a length-prefixed byte run from the front of `input`.
pub fn read_bytes(input: &[u8]) -> Option<(&[u8], usize)> {
    let (len, used) = read_long(input)?;
    let len = usize::try_from(len).ok()?;
    let end = used.checked_add(len)?;
    input.get(used..end).map(|bytes| (bytes, end))
}
