//! Record encoding and decoding.
//!
//! A record travels as its field map serialized with postcard. Every
//! [`Value`](gamesync_core::Value) carries its variant tag, so the bytes
//! describe themselves and a receiver can decode them before knowing which
//! record they belong to.

use crate::error::CodecError;
use gamesync_core::{Fields, Record};

/// Deepest nesting of maps and lists accepted from the wire, the record's
/// own field map included.
pub const MAX_NESTING: usize = 128;

/// Encode a field map.
pub fn encode_fields(fields: &Fields) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(fields).map_err(CodecError::Encode)
}

/// Decode a field map; the whole slice must be consumed.
pub fn decode_fields(bytes: &[u8]) -> Result<Fields, CodecError> {
    check_nesting(bytes)?;
    let (fields, rest) =
        postcard::take_from_bytes::<Fields>(bytes).map_err(CodecError::Malformed)?;
    if !rest.is_empty() {
        return Err(CodecError::TrailingBytes(rest.len()));
    }
    Ok(fields)
}

/// Encode a record's public fields. Records that could not be decoded back,
/// such as a state keyed by NaN, are refused.
pub fn encode<R: Record>(record: &R) -> Result<Vec<u8>, CodecError> {
    record.validate()?;
    encode_fields(&record.to_fields())
}

/// Decode bytes into a default-initialized `R` overlaid with the decoded
/// fields.
pub fn decode<R: Record>(bytes: &[u8]) -> Result<R, CodecError> {
    let fields = decode_fields(bytes)?;
    Ok(R::from_fields(fields)?)
}

/// Cursor over postcard bytes that only skips, never allocates.
struct Scan<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Scan<'_> {
    fn varint(&mut self) -> Option<u64> {
        let mut value = 0u64;
        for shift in (0..70).step_by(7) {
            let byte = *self.bytes.get(self.pos)?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f).checked_shl(shift)?;
            if byte & 0x80 == 0 {
                return Some(value);
            }
        }
        None
    }

    fn skip(&mut self, len: u64) -> Option<()> {
        let end = self.pos.checked_add(usize::try_from(len).ok()?)?;
        if end > self.bytes.len() {
            return None;
        }
        self.pos = end;
        Some(())
    }

    fn length_prefixed(&mut self) -> Option<()> {
        let len = self.varint()?;
        self.skip(len)
    }
}

/// Walk the value tree without recursion and refuse it if it nests deeper
/// than [`MAX_NESTING`]. Malformed bytes end the walk quietly; the real
/// decoder reports them.
fn check_nesting(bytes: &[u8]) -> Result<(), CodecError> {
    let mut scan = Scan { bytes, pos: 0 };
    let Some(len) = scan.varint() else {
        return Ok(());
    };
    // (entries left, entries are key/value pairs)
    let mut open = vec![(len, true)];

    while let Some((remaining, is_map)) = open.last_mut() {
        if *remaining == 0 {
            open.pop();
            continue;
        }
        *remaining -= 1;
        if *is_map && scan.length_prefixed().is_none() {
            return Ok(());
        }
        // Variant tags follow the declaration order of `Value`.
        let child = match scan.varint() {
            Some(0) => scan.varint().map(|_| None),
            Some(1) => scan.skip(8).map(|_| None),
            Some(2) => scan.skip(1).map(|_| None),
            Some(3 | 4) => scan.length_prefixed().map(|_| None),
            Some(5) => scan.varint().map(|n| Some((n, false))),
            Some(6) => scan.varint().map(|n| Some((n, true))),
            Some(7) => Some(None),
            _ => None,
        };
        match child {
            None => return Ok(()),
            Some(Some(frame)) => {
                if open.len() >= MAX_NESTING {
                    return Err(CodecError::TooDeep(MAX_NESTING));
                }
                open.push(frame);
            }
            Some(None) => {}
        }
    }
    Ok(())
}
