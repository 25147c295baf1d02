//! Crate-wide error taxonomy (spec §7, expanded in §10.2).
//!
//! The reference implementation returns one of five raw integer codes
//! (`TWIST_OK`, `TWIST_EINVAL`, `TWIST_ENOMEM`, `TWIST_EENTROPY`,
//! `TWIST_EAGAIN`) from every public entry point. This crate carries the same
//! four-way failure taxonomy (success is `Ok(())`/a return value, not a
//! variant) as a `Fail`-derived enum, the same shape the teacher crate uses
//! for its own `EndpointError`.

use failure::Fail;

/// Everything that can go wrong at a public entry point.
#[derive(Debug, Fail)]
pub enum Error {
    /// Bad argument, a forged or expired handshake ticket, or time regress.
    /// Corresponds to `TWIST_EINVAL`.
    #[fail(display = "invalid input: {}", _0)]
    Invalid(&'static str),

    /// An allocation the engine needed in order to service otherwise-valid
    /// input failed. Corresponds to `TWIST_ENOMEM`.
    #[fail(display = "resource exhausted: {}", _0)]
    NoMemory(&'static str),

    /// The entropy callback returned fewer bytes than requested while the
    /// PRNG was rekeying. Corresponds to `TWIST_EENTROPY`.
    #[fail(display = "entropy source exhausted")]
    EntropyExhausted,

    /// A transient condition the caller may retry later: the strike
    /// register is saturated for the current second, or the socket still
    /// has live connections at `destroy` time. Corresponds to
    /// `TWIST_EAGAIN`.
    #[fail(display = "would block: {}", _0)]
    WouldBlock(&'static str),
}

impl Error {
    pub(crate) fn invalid(reason: &'static str) -> Self {
        Error::Invalid(reason)
    }

    pub(crate) fn no_memory(reason: &'static str) -> Self {
        Error::NoMemory(reason)
    }

    pub(crate) fn would_block(reason: &'static str) -> Self {
        Error::WouldBlock(reason)
    }

    /// The numeric convention from spec §6, for hosts that bridge back to a
    /// C-style `i64` return-code API.
    pub fn code(&self) -> i64 {
        match self {
            Error::Invalid(_) => -1,
            Error::NoMemory(_) => -2,
            Error::EntropyExhausted => -3,
            Error::WouldBlock(_) => -4,
        }
    }
}
