//! Fixed-capacity envelope around a socket address (spec §3 "Address").
//!
//! The engine never interprets the bytes of an address beyond comparing them
//! and folding them into a handshake ticket's authentication tag; the host's
//! `Environment` is the only party that knows how to turn one into something
//! it can actually send a datagram to. Keeping this as a small fixed-size
//! value (rather than, say, `std::net::SocketAddr`) means the engine stays
//! agnostic to the transport address family, matching the C original's use
//! of a generic `struct sockaddr` envelope.

use crate::error::Error;

/// Maximum number of address bytes that fit in an [`Address`].
pub const MAX_ADDR_LEN: usize = 30;

/// A fixed-capacity, copyable stand-in for a `struct sockaddr`.
#[derive(Clone, Copy)]
pub struct Address {
    len: u8,
    bytes: [u8; MAX_ADDR_LEN],
}

impl Address {
    /// Build an address envelope from a raw byte representation. Fails with
    /// [`Error::Invalid`] if `raw` is longer than [`MAX_ADDR_LEN`].
    pub fn new(raw: &[u8]) -> Result<Self, Error> {
        if raw.len() > MAX_ADDR_LEN {
            return Err(Error::invalid("address longer than MAX_ADDR_LEN"));
        }
        let mut bytes = [0u8; MAX_ADDR_LEN];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Address {
            len: raw.len() as u8,
            bytes,
        })
    }

    /// The address's used byte prefix.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Address {}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Address")
            .field("len", &self.len)
            .field("bytes", &self.as_bytes())
            .finish()
    }
}
