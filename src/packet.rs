//! Packet record (spec §4/§6): an addressed byte buffer allocated out of the
//! [`Pool`](crate::pool::Pool), plus the control-packet framing the
//! demultiplexer recognizes before handing a payload to a connection.
//!
//! A data packet's buffer must stay valid until the host's datagram-send
//! callback has had a chance to actually put it on the wire, which may
//! outlive the public call that produced it — see the `lingering` list on
//! the socket engine. A `Packet` therefore owns its pool block directly
//! rather than borrowing from some shorter-lived scratch buffer.

use crate::addr::Address;
use crate::pool::{Block, Pool, POOL_OBJECT_SIZE};

/// Smallest datagram `recv` will look at: a destination cookie, version tag,
/// type byte and sub-cookie (bytes `0..24`). Anything shorter is discarded
/// before any further decoding is attempted.
pub const MIN_PACKET_SIZE: usize = 24;
/// Largest payload a pooled block can carry without the engine needing a
/// multi-slab allocation, chosen to comfortably clear common path MTUs.
pub const MAX_PACKET_SIZE: usize = 1444;

/// Literal version tag occupying `payload[7..14]`, overlapping the trailing
/// bytes of the always-zero control-packet destination cookie by design
/// (spec §6, §9 — wire compatibility is the point, not a bug to fix).
pub const VERSION_TAG: &[u8; 7] = b"twist/0";

/// Control-packet type byte at `payload[15]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlType {
    /// `'h'`: client handshake, or (with a nonzero sub-cookie) a lookup for
    /// an in-progress handshake.
    Handshake,
    /// `'t'`: ticket response.
    Ticket,
}

impl ControlType {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'h' => Some(ControlType::Handshake),
            b't' => Some(ControlType::Ticket),
            _ => None,
        }
    }
}

/// A decoded view over an incoming control packet's fixed header fields.
/// Does not copy the payload; it borrows from whatever buffer `recv` was
/// called with.
#[derive(Debug)]
pub struct ControlHeader {
    pub ty: ControlType,
    pub sub_cookie: u64,
}

/// Parse the control-packet header out of `payload`, which must already be
/// known to address cookie 0 (spec §4.8 step 4). Returns `None` for any
/// malformation: too short, bad version tag, or unrecognized type byte —
/// all silently-discarded conditions per spec §7.
pub fn decode_control_header(payload: &[u8]) -> Option<ControlHeader> {
    if payload.len() < MIN_PACKET_SIZE {
        return None;
    }
    if &payload[7..14] != VERSION_TAG {
        return None;
    }
    let ty = ControlType::from_byte(payload[15])?;
    let sub_cookie = crate::endian::decode_u64(&payload[16..24]);
    Some(ControlHeader { ty, sub_cookie })
}

/// Decode the big-endian destination cookie occupying `payload[0..8]`.
/// Returns `None` if `payload` is too short to contain one.
pub fn decode_destination_cookie(payload: &[u8]) -> Option<u64> {
    if payload.len() < 8 {
        return None;
    }
    Some(crate::endian::decode_u64(&payload[0..8]))
}

/// An addressed, pool-backed packet buffer.
pub struct Packet {
    addr: Address,
    block: Block,
    len: usize,
}

impl Packet {
    /// Allocate a block from `pool` and copy `data` into it. `data` must fit
    /// within a single pool block; the engine never needs to pool a payload
    /// larger than [`MAX_PACKET_SIZE`].
    pub fn new(pool: &mut Pool, addr: Address, data: &[u8]) -> Option<Self> {
        if data.len() > POOL_OBJECT_SIZE {
            return None;
        }
        let mut block = pool.alloc();
        block[..data.len()].copy_from_slice(data);
        Some(Packet {
            addr,
            block,
            len: data.len(),
        })
    }

    pub fn addr(&self) -> &Address {
        &self.addr
    }

    pub fn payload(&self) -> &[u8] {
        &self.block[..self.len]
    }

    /// Return this packet's block to `pool`, consuming the packet.
    pub fn release(self, pool: &mut Pool) {
        pool.free(self.block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(ty: u8, dest: u64, sub: u64) -> Vec<u8> {
        let mut buf = vec![0u8; MIN_PACKET_SIZE];
        crate::endian::encode_u64(&mut buf[0..8], dest);
        buf[7..14].copy_from_slice(VERSION_TAG);
        buf[15] = ty;
        crate::endian::encode_u64(&mut buf[16..24], sub);
        buf
    }

    #[test]
    fn decodes_a_well_formed_handshake_header() {
        let buf = header(b'h', 0, 42);
        let hdr = decode_control_header(&buf).unwrap();
        assert_eq!(hdr.ty, ControlType::Handshake);
        assert_eq!(hdr.sub_cookie, 42);
    }

    #[test]
    fn rejects_short_payloads() {
        let buf = vec![0u8; MIN_PACKET_SIZE - 1];
        assert!(decode_control_header(&buf).is_none());
    }

    #[test]
    fn rejects_a_mismatched_version_tag() {
        let mut buf = header(b't', 0, 1);
        buf[10] = b'X';
        assert!(decode_control_header(&buf).is_none());
    }

    #[test]
    fn rejects_an_unrecognized_type_byte() {
        let buf = header(b'q', 0, 1);
        assert!(decode_control_header(&buf).is_none());
    }

    #[test]
    fn destination_cookie_decodes_independently_of_type() {
        let buf = header(b'h', 0xdead_beef_0000_0001, 0);
        assert_eq!(decode_destination_cookie(&buf), Some(0xdead_beef_0000_0001));
    }

    #[test]
    fn packet_round_trips_through_the_pool() {
        let mut pool = Pool::new();
        let addr = Address::new(b"127.0.0.1:9").unwrap();
        let pkt = Packet::new(&mut pool, addr, b"payload").unwrap();
        assert_eq!(pkt.payload(), b"payload");
        assert_eq!(pkt.addr(), &addr);
        pkt.release(&mut pool);
        assert_eq!(pool.count(), 1);
    }
}
