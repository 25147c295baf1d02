//! Big-endian integer codec used by the control-packet framing (spec §6) and
//! by the wire encoding of strike-register tokens inside a handshake ticket
//! (spec §4.7).

use byteorder::{BigEndian, ByteOrder};

/// Write `x` to `dst[0..4]` in big-endian form.
pub fn encode_u32(dst: &mut [u8], x: u32) {
    BigEndian::write_u32(dst, x);
}

/// Read a big-endian `u32` from `src[0..4]`.
pub fn decode_u32(src: &[u8]) -> u32 {
    BigEndian::read_u32(src)
}

/// Write `x` to `dst[0..8]` in big-endian form.
pub fn encode_u64(dst: &mut [u8], x: u64) {
    BigEndian::write_u64(dst, x);
}

/// Read a big-endian `u64` from `src[0..8]`.
pub fn decode_u64(src: &[u8]) -> u64 {
    BigEndian::read_u64(src)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_u32() {
        let mut buf = [0u8; 4];
        encode_u32(&mut buf, 0xdead_beef);
        assert_eq!(buf, [0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(decode_u32(&buf), 0xdead_beef);
    }

    #[test]
    fn round_trips_u64() {
        let mut buf = [0u8; 8];
        encode_u64(&mut buf, 0x0123_4567_89ab_cdef);
        assert_eq!(decode_u64(&buf), 0x0123_4567_89ab_cdef);
    }
}
