//! A connection-oriented, secure transport protocol running over UDP.
//!
//! The engine is single-threaded and reactive: it never performs I/O or
//! reads system entropy itself. Instead every public entry point is driven
//! by the host through the [`Environment`] trait, which supplies outbound
//! datagram delivery and randomness. This keeps the engine deterministic
//! given a fixed sequence of inputs, which is what makes it testable without
//! a real network or kernel RNG.

#[macro_use]
extern crate slog;

pub mod addr;
pub mod buffer;
pub mod config;
pub mod conn;
pub mod dict;
pub mod endian;
pub mod endpoint;
pub mod error;
pub mod heap;
pub mod packet;
pub mod pool;
pub mod prng;
pub mod register;
pub mod ticket;

pub use config::Config;
pub use conn::{Connection, State};
pub use endpoint::Socket;
pub use error::Error;

/// The host-supplied interface the engine uses for everything it cannot do
/// on its own: sending datagrams and sourcing entropy.
///
/// Implementations back `send_datagram` with a real UDP socket and
/// `read_entropy` with the OS CSPRNG; tests back both with scripted,
/// deterministic data.
pub trait Environment {
    /// Hand a datagram to the host for delivery to `dest`. The engine never
    /// inspects the return value; delivery is fire-and-forget from its point
    /// of view, matching UDP's own semantics.
    fn send_datagram(&mut self, dest: &addr::Address, data: &[u8]);

    /// Fill as much of `dst` as possible with random bytes, returning the
    /// number of bytes actually written. Returning fewer bytes than
    /// requested signals entropy exhaustion to the caller.
    fn read_entropy(&mut self, dst: &mut [u8]) -> usize;
}
