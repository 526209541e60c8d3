//! Byte layout of the shared region.
//!
//! The region holds one message at a time: UTF-16LE text without a byte-order
//! mark, a wide NUL, then zeros to the end of the region. Writing always
//! zero-fills first so a shorter message never leaves a tail of an older one.

use crate::{BridgeError, Result};

/// Size of the shared region in bytes.
pub const REGION_SIZE: usize = 4096;

/// Length of the wide NUL terminator.
pub const TERMINATOR_LEN: usize = 2;

/// Encode text as UTF-16LE bytes without a byte-order mark.
pub fn encode_utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// Write `text` into `region` as a terminated, zero-padded frame.
///
/// Returns the payload length in bytes, excluding the terminator. When the
/// payload plus terminator does not fit, `region` is left untouched.
pub fn write_frame(region: &mut [u8], text: &str) -> Result<usize> {
    let payload = encode_utf16le(text);
    if payload.len() + TERMINATOR_LEN > region.len() {
        return Err(BridgeError::PayloadTooLarge {
            size: payload.len() + TERMINATOR_LEN,
            capacity: region.len(),
        });
    }

    region.fill(0);
    region[..payload.len()].copy_from_slice(&payload);
    region[payload.len()..payload.len() + TERMINATOR_LEN].fill(0);

    Ok(payload.len())
}

/// Read the text of a frame back out of `region`.
///
/// Stops at the first wide NUL; a region with no terminator is read whole.
pub fn read_frame(region: &[u8]) -> Result<String> {
    let units: Vec<u16> = region
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect();

    String::from_utf16(&units)
        .map_err(|e| BridgeError::decode_failed("region", format!("invalid UTF-16 payload: {e}")))
}
