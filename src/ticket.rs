//! Handshake ticket (spec §4.7): binds a strike-register token to a peer
//! address so an unbound responder can stay stateless until the peer proves
//! it can receive traffic at the address it claims to own.
//!
//! Wire layout (64 bytes): a 24-byte IV, 8 bytes of encrypted token, and a
//! 32-byte HMAC-SHA-512 tag (truncated from the full 64-byte digest) binding
//! the whole thing to the peer's address. The IV's first 16 bytes key an
//! HChaCha20 subkey derivation; its last 8 bytes serve as the nonce for a
//! one-block ChaCha20 keystream that encrypts the token in place.

use chacha20::cipher::consts::U10;
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::{hchacha, ChaCha20Legacy, LegacyNonce};
use ring::{digest, hmac};

use crate::addr::Address;
use crate::endian;
use crate::error::Error;
use crate::prng::Prng;
use crate::register::Register;
use crate::Environment;

/// Total size of a ticket on the wire.
pub const TICKET_LEN: usize = 64;

const IV_LEN: usize = 24;
const TOKEN_LEN: usize = 8;
const TAG_LEN: usize = 32;

/// A 32-byte key drawn from the PRNG at socket creation and held for the
/// socket's lifetime; it is never rotated or persisted (spec §4.7).
pub type TicketKey = [u8; 32];

fn token_keystream(ticket_key: &TicketKey, iv: &[u8]) -> [u8; TOKEN_LEN] {
    let key = chacha20::Key::clone_from_slice(ticket_key);
    let hchacha_nonce = chacha20::cipher::generic_array::GenericArray::clone_from_slice(&iv[0..16]);
    let subkey = hchacha::<U10>(&key, &hchacha_nonce);

    let stream_nonce = LegacyNonce::clone_from_slice(&iv[16..24]);
    let mut cipher = ChaCha20Legacy::new(&subkey, &stream_nonce);
    let mut keystream = [0u8; TOKEN_LEN];
    cipher.apply_keystream(&mut keystream);
    keystream
}

fn tag_for(ticket_key: &TicketKey, addr: &Address, head: &[u8]) -> [u8; TAG_LEN] {
    let key = hmac::SigningKey::new(&digest::SHA512, ticket_key);
    let mut buf = Vec::with_capacity(addr.as_bytes().len() + head.len());
    buf.extend_from_slice(addr.as_bytes());
    buf.extend_from_slice(head);
    let signature = hmac::sign(&key, &buf);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&signature.as_ref()[..TAG_LEN]);
    tag
}

/// Mint a fresh ticket binding a newly reserved strike-register token to
/// `addr`. Fails with [`Error::WouldBlock`] if the register is saturated for
/// the current second, or with [`Error::EntropyExhausted`] if the PRNG
/// cannot be refilled.
pub fn mint<E: Environment + ?Sized>(
    env: &mut E,
    prng: &mut Prng,
    reg: &mut Register,
    ticket_key: &TicketKey,
    addr: &Address,
    now_seconds: u32,
) -> Result<[u8; TICKET_LEN], Error> {
    let mut ticket = [0u8; TICKET_LEN];
    prng.read(env, &mut ticket[0..IV_LEN])?;

    let (bucket, index) = reg
        .reserve(now_seconds)
        .ok_or_else(|| Error::would_block("strike register saturated"))?;
    endian::encode_u32(&mut ticket[24..28], bucket);
    endian::encode_u32(&mut ticket[28..32], index);

    let keystream = token_keystream(ticket_key, &ticket[0..IV_LEN]);
    for i in 0..TOKEN_LEN {
        ticket[24 + i] ^= keystream[i];
    }

    let tag = tag_for(ticket_key, addr, &ticket[0..32]);
    ticket[32..64].copy_from_slice(&tag);

    Ok(ticket)
}

/// Verify and redeem a ticket presented by `addr`. Returns `true` exactly
/// once per minted ticket; a bad tag, an address mismatch, an expired
/// token, or a replay all return `false` without distinguishing which.
pub fn verify(
    reg: &mut Register,
    ticket_key: &TicketKey,
    ticket: &[u8; TICKET_LEN],
    addr: &Address,
    now_seconds: u32,
) -> bool {
    let expected = tag_for(ticket_key, addr, &ticket[0..32]);
    if !constant_time_eq::constant_time_eq(&expected, &ticket[32..64]) {
        return false;
    }

    let keystream = token_keystream(ticket_key, &ticket[0..IV_LEN]);
    let mut token = [0u8; TOKEN_LEN];
    for i in 0..TOKEN_LEN {
        token[i] = ticket[24 + i] ^ keystream[i];
    }
    let bucket = endian::decode_u32(&token[0..4]);
    let index = endian::decode_u32(&token[4..8]);

    reg.claim(bucket, index, now_seconds)
}
