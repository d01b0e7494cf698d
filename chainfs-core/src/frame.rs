//! Fixed-size record framing. Every record is padded to the same length
//! before encryption, so block sizes leak nothing about payload length.
//!
//! Layout: a big-endian u16 offset to the record start, zero fill, then the
//! record itself. `offset == size - record_len`, total length exactly `size`.

use crate::error::{ChainFsError, Result};

pub fn pad(record: &[u8], size: usize) -> Result<Vec<u8>> {
    if size > u16::MAX as usize {
        return Err(ChainFsError::Format(format!(
            "frame size {size} exceeds the u16 offset field"
        )));
    }
    if size < 2 || record.len() > size - 2 {
        return Err(ChainFsError::Format(format!(
            "record of {} bytes does not fit a {size}-byte frame",
            record.len()
        )));
    }
    let offset = size - record.len();
    let mut out = Vec::with_capacity(size);
    out.extend_from_slice(&(offset as u16).to_be_bytes());
    out.resize(offset, 0);
    out.extend_from_slice(record);
    Ok(out)
}

pub fn unpad(padded: &[u8]) -> Result<&[u8]> {
    if padded.len() < 2 {
        return Err(ChainFsError::Format("frame shorter than its offset field".to_string()));
    }
    let offset = u16::from_be_bytes([padded[0], padded[1]]) as usize;
    if offset < 2 || offset > padded.len() {
        return Err(ChainFsError::Format(format!("corrupt frame offset {offset}")));
    }
    Ok(&padded[offset..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_layout_is_offset_zeros_record() {
        let padded = pad(b"hi", 10).unwrap();
        assert_eq!(padded, [0x00, 0x08, 0, 0, 0, 0, 0, 0, b'h', b'i']);
        assert_eq!(unpad(&padded).unwrap(), b"hi");
    }

    #[test]
    fn round_trips_across_record_lengths() {
        for len in [0usize, 1, 7, 62] {
            let record: Vec<u8> = (0..len as u8).collect();
            let padded = pad(&record, 64).unwrap();
            assert_eq!(padded.len(), 64);
            assert_eq!(unpad(&padded).unwrap(), record);
        }
    }

    #[test]
    fn oversized_record_is_a_caller_error() {
        assert!(pad(&[0u8; 63], 64).is_err());
        assert!(pad(&[0u8; 9], 10).is_err());
        assert!(pad(b"", 1).is_err());
    }

    #[test]
    fn oversized_frame_is_rejected() {
        assert!(pad(b"x", u16::MAX as usize + 1).is_err());
    }

    #[test]
    fn corrupt_offsets_are_rejected() {
        assert!(unpad(&[0x00]).is_err());
        // offset pointing past the end
        assert!(unpad(&[0xff, 0xff, 0, 0]).is_err());
        // offset pointing inside the offset field itself
        assert!(unpad(&[0x00, 0x01, 0, 0]).is_err());
    }
}
