//! Per-session checksum stamping and validation.
//!
//! Outbound datagrams get a trailer computed from their bytes and the
//! session's key; inbound ones are verified and the trailer is cut off
//! before the rest of the stack sees them. The algorithm is pluggable
//! through the [`Checksum`] trait so a session without integrity checks
//! ([`NoChecksum`]) and one with them ([`KeyedCrc`]) share every other
//! code path.

/// A keyed integrity check over datagram bytes.
///
/// The trait is object safe; the channel stores it behind a generic but
/// tests and tools can also use `&dyn Checksum`.
pub trait Checksum: Send + Sync + 'static {
    /// Bytes the trailer adds to a stamped datagram.
    ///
    /// Must not exceed [`TRAILER_RESERVE`](crate::TRAILER_RESERVE), or full
    /// datagrams outgrow [`MAX_DATAGRAM_SIZE`](crate::MAX_DATAGRAM_SIZE).
    fn trailer_len(&self) -> usize;

    /// Appends the trailer for `data` under `key`.
    fn stamp(&self, data: &mut Vec<u8>, key: u32);

    /// Checks the trailer at the end of `data`.
    ///
    /// Returns the length of the body (everything before the trailer) when
    /// the trailer matches, `None` otherwise.
    fn verify(&self, data: &[u8], key: u32) -> Option<usize>;
}

// ---------------------------------------------------------------------------
// NoChecksum
// ---------------------------------------------------------------------------

/// Accepts everything and stamps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoChecksum;

impl Checksum for NoChecksum {
    fn trailer_len(&self) -> usize {
        0
    }

    fn stamp(&self, _data: &mut Vec<u8>, _key: u32) {}

    fn verify(&self, data: &[u8], _key: u32) -> Option<usize> {
        Some(data.len())
    }
}

// ---------------------------------------------------------------------------
// KeyedCrc
// ---------------------------------------------------------------------------

/// CRC-32 seeded with the session key, truncated to a 16-bit trailer.
///
/// The key's big-endian bytes are hashed ahead of the data, so the same
/// datagram stamps differently in different sessions.
#[cfg(feature = "crc")]
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyedCrc;

#[cfg(feature = "crc")]
impl KeyedCrc {
    const TRAILER_LEN: usize = 2;

    fn compute(data: &[u8], key: u32) -> u16 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&key.to_be_bytes());
        hasher.update(data);
        (hasher.finalize() & 0xFFFF) as u16
    }
}

#[cfg(feature = "crc")]
impl Checksum for KeyedCrc {
    fn trailer_len(&self) -> usize {
        Self::TRAILER_LEN
    }

    fn stamp(&self, data: &mut Vec<u8>, key: u32) {
        let crc = Self::compute(data, key);
        data.extend_from_slice(&crc.to_be_bytes());
    }

    fn verify(&self, data: &[u8], key: u32) -> Option<usize> {
        let body_len = data.len().checked_sub(Self::TRAILER_LEN)?;
        let (body, trailer) = data.split_at(body_len);
        let expected = Self::compute(body, key);
        (trailer[..] == expected.to_be_bytes()[..]).then_some(body_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_checksum_accepts_anything() {
        let mut data = b"abc".to_vec();
        NoChecksum.stamp(&mut data, 7);
        assert_eq!(data, b"abc");
        assert_eq!(NoChecksum.verify(&data, 99), Some(3));
        assert_eq!(NoChecksum.trailer_len(), 0);
    }

    #[cfg(feature = "crc")]
    #[test]
    fn test_keyed_crc_stamp_then_verify() {
        let mut data = b"zone data".to_vec();
        KeyedCrc.stamp(&mut data, 0xA5A5_0001);
        assert_eq!(data.len(), 9 + 2);
        assert_eq!(KeyedCrc.verify(&data, 0xA5A5_0001), Some(9));
    }

    #[cfg(feature = "crc")]
    #[test]
    fn test_keyed_crc_trailer_fits_reserve() {
        assert!(KeyedCrc.trailer_len() <= crate::TRAILER_RESERVE);
    }

    #[cfg(feature = "crc")]
    #[test]
    fn test_keyed_crc_rejects_wrong_key() {
        let mut data = b"zone data".to_vec();
        KeyedCrc.stamp(&mut data, 1);
        assert_eq!(KeyedCrc.verify(&data, 2), None);
    }

    #[cfg(feature = "crc")]
    #[test]
    fn test_keyed_crc_rejects_corruption() {
        let mut data = b"zone data".to_vec();
        KeyedCrc.stamp(&mut data, 5);
        data[0] ^= 0x01;
        assert_eq!(KeyedCrc.verify(&data, 5), None);
    }

    #[cfg(feature = "crc")]
    #[test]
    fn test_keyed_crc_rejects_short_input() {
        assert_eq!(KeyedCrc.verify(&[0x42], 0), None);
        assert_eq!(KeyedCrc.verify(&[], 0), None);
    }

    #[test]
    fn test_checksum_is_object_safe() {
        let boxed: Box<dyn Checksum> = Box::new(NoChecksum);
        assert_eq!(boxed.verify(b"x", 0), Some(1));
    }
}
