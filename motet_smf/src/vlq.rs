// Variable-length quantities.
//
// Delta-times and meta/sysex lengths are stored big-endian, seven bits per
// byte, with the high bit set on every byte except the last. At most four
// bytes are allowed, which caps values at `VLQ_MAX` (2^28 - 1). Zero is a
// single `0x00` byte.

use crate::error::{MalformedKind, SmfError};

/// Largest value representable in four VLQ bytes.
pub const VLQ_MAX: u32 = 0x0FFF_FFFF;

/// Append the VLQ encoding of `value` to `out`.
///
/// Fails with `DeltaOutOfRange` if `value` exceeds `VLQ_MAX`; nothing is
/// written in that case.
pub fn write_vlq(out: &mut Vec<u8>, value: u64) -> Result<(), SmfError> {
    if value > u64::from(VLQ_MAX) {
        return Err(SmfError::DeltaOutOfRange(value));
    }
    let mut groups = [0u8; 4];
    let mut n = 0;
    let mut v = value;
    loop {
        groups[n] = (v & 0x7F) as u8;
        n += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let cont = if i == 0 { 0 } else { 0x80 };
        out.push(groups[i] | cont);
    }
    Ok(())
}

/// Encode a single value. Convenience wrapper over `write_vlq`.
pub fn encode_vlq(value: u64) -> Result<Vec<u8>, SmfError> {
    let mut out = Vec::with_capacity(4);
    write_vlq(&mut out, value)?;
    Ok(out)
}

/// Read a VLQ starting at `bytes[0]`.
///
/// Returns the value and the number of bytes consumed. An empty buffer or a
/// continuation bit on the final available byte is `Truncated`; a
/// continuation bit on the fourth byte is `VlqTooLong`.
pub fn read_vlq(bytes: &[u8]) -> Result<(u32, usize), MalformedKind> {
    let mut value: u32 = 0;
    for i in 0..4 {
        let Some(&b) = bytes.get(i) else {
            return Err(MalformedKind::Truncated);
        };
        value = (value << 7) | u32::from(b & 0x7F);
        if b & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(MalformedKind::VlqTooLong)
}

/// Number of bytes `value` occupies when encoded. Values above `VLQ_MAX`
/// report four, the caller is expected to have range-checked.
pub fn vlq_len(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_one_byte() {
        assert_eq!(encode_vlq(0).unwrap(), vec![0x00]);
    }

    #[test]
    fn known_vectors() {
        assert_eq!(encode_vlq(127).unwrap(), vec![0x7F]);
        assert_eq!(encode_vlq(128).unwrap(), vec![0x81, 0x00]);
        assert_eq!(encode_vlq(480).unwrap(), vec![0x83, 0x60]);
        assert_eq!(encode_vlq(0x3FFF).unwrap(), vec![0xFF, 0x7F]);
        assert_eq!(encode_vlq(0x4000).unwrap(), vec![0x81, 0x80, 0x00]);
        assert_eq!(
            encode_vlq(u64::from(VLQ_MAX)).unwrap(),
            vec![0xFF, 0xFF, 0xFF, 0x7F]
        );
    }

    #[test]
    fn decode_known_vectors() {
        assert_eq!(read_vlq(&[0x00]), Ok((0, 1)));
        assert_eq!(read_vlq(&[0x81, 0x00, 0x55]), Ok((128, 2)));
        assert_eq!(read_vlq(&[0xFF, 0xFF, 0xFF, 0x7F]), Ok((VLQ_MAX, 4)));
    }

    #[test]
    fn boundary_values_survive() {
        for x in [
            0u32, 1, 0x7F, 0x80, 0x3FFF, 0x4000, 0x1F_FFFF, 0x20_0000, VLQ_MAX,
        ] {
            let bytes = encode_vlq(u64::from(x)).unwrap();
            assert_eq!(bytes.len(), vlq_len(x));
            assert_eq!(read_vlq(&bytes), Ok((x, bytes.len())));
        }
    }

    #[test]
    fn too_large_is_rejected() {
        let mut out = vec![0xAA];
        let err = write_vlq(&mut out, u64::from(VLQ_MAX) + 1).unwrap_err();
        assert!(matches!(err, SmfError::DeltaOutOfRange(0x1000_0000)));
        assert_eq!(out, vec![0xAA]);
    }

    #[test]
    fn truncated_and_overlong() {
        assert_eq!(read_vlq(&[]), Err(MalformedKind::Truncated));
        assert_eq!(read_vlq(&[0x81]), Err(MalformedKind::Truncated));
        assert_eq!(
            read_vlq(&[0x81, 0x81, 0x81, 0x81, 0x00]),
            Err(MalformedKind::VlqTooLong)
        );
    }
}
