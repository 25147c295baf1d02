//! Keystream PRNG (spec §4.3): a buffered ChaCha20 CSPRNG, periodically
//! rekeyed from the host-supplied entropy callback.
//!
//! Forward security only holds between reseeds; the PRNG is only as good as
//! the entropy callback it's seeded from (spec §4.3, last sentence).

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::{ChaCha20Legacy, LegacyNonce};

use crate::error::Error;
use crate::Environment;

/// Size of the internal keystream buffer.
const BUFFER_SIZE: usize = 1024;

/// How many times the internal buffer may be refilled from one ChaCha20 key
/// before the PRNG asks its environment for fresh entropy.
const RESEED_INTERVAL: u32 = 64;

/// Bytes requested from the entropy callback per reseed: a 32-byte key and
/// an 8-byte nonce, zero-extended to ChaCha20's 12-byte nonce requirement.
const SEED_LEN: usize = 40;

/// A buffered, periodically-rekeyed ChaCha20 keystream generator.
pub struct Prng {
    cipher: Option<ChaCha20Legacy>,
    buf: [u8; BUFFER_SIZE],
    consumed: usize,
    reseed: u32,
}

impl Prng {
    /// Build a PRNG with its buffer marked fully consumed, so the first call
    /// to [`Prng::read`] triggers an initial seed.
    pub fn new() -> Self {
        Prng {
            cipher: None,
            buf: [0u8; BUFFER_SIZE],
            consumed: BUFFER_SIZE,
            reseed: 0,
        }
    }

    /// Fill `dst` with pseudo-random bytes, rekeying from `env` as needed.
    /// Fails with [`Error::EntropyExhausted`] if a required reseed can't get
    /// a full 40-byte seed from the environment.
    pub fn read<E: Environment + ?Sized>(&mut self, env: &mut E, dst: &mut [u8]) -> Result<(), Error> {
        let mut dst = dst;
        while !dst.is_empty() {
            if self.consumed == BUFFER_SIZE {
                if self.reseed == 0 {
                    self.seed(env)?;
                }
                self.buf = [0u8; BUFFER_SIZE];
                self.cipher
                    .as_mut()
                    .expect("seeded above")
                    .apply_keystream(&mut self.buf);
                self.consumed = 0;
                self.reseed -= 1;
            }

            let avail = BUFFER_SIZE - self.consumed;
            let n = avail.min(dst.len());
            dst[..n].copy_from_slice(&self.buf[self.consumed..self.consumed + n]);
            self.consumed += n;
            dst = &mut dst[n..];
        }
        Ok(())
    }

    fn seed<E: Environment + ?Sized>(&mut self, env: &mut E) -> Result<(), Error> {
        let mut seed = [0u8; SEED_LEN];
        let n = env.read_entropy(&mut seed);
        if n != SEED_LEN {
            return Err(Error::EntropyExhausted);
        }

        let key = chacha20::Key::clone_from_slice(&seed[..32]);
        let nonce = LegacyNonce::clone_from_slice(&seed[32..40]);

        self.cipher = Some(ChaCha20Legacy::new(&key, &nonce));
        self.reseed = RESEED_INTERVAL;
        Ok(())
    }
}

impl Default for Prng {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedEnv;

    #[test]
    fn two_prngs_fed_the_same_entropy_produce_identical_streams() {
        let mut env_a = ScriptedEnv::new(vec![vec![7u8; 40], vec![9u8; 40]]);
        let mut env_b = ScriptedEnv::new(vec![vec![7u8; 40], vec![9u8; 40]]);
        let mut a = Prng::new();
        let mut b = Prng::new();

        let mut out_a = [0u8; 4096];
        let mut out_b = [0u8; 4096];
        a.read(&mut env_a, &mut out_a).unwrap();
        b.read(&mut env_b, &mut out_b).unwrap();

        assert_eq!(out_a[..], out_b[..]);
    }

    #[test]
    fn reseeds_after_reseed_interval_refills() {
        let mut env = ScriptedEnv::new(vec![vec![1u8; 40], vec![2u8; 40]]);
        let mut prng = Prng::new();

        // Exactly RESEED_INTERVAL buffers' worth, using up the first seed.
        let mut out = vec![0u8; BUFFER_SIZE * RESEED_INTERVAL as usize];
        prng.read(&mut env, &mut out).unwrap();
        assert_eq!(env.remaining(), 1);

        // One more byte forces a reseed.
        let mut tail = [0u8; 1];
        prng.read(&mut env, &mut tail).unwrap();
        assert_eq!(env.remaining(), 0);
    }

    #[test]
    fn entropy_exhaustion_is_reported() {
        let mut env = ScriptedEnv::new(vec![vec![1u8; 10]]); // too short
        let mut prng = Prng::new();
        let mut out = [0u8; 1];
        assert_matches::assert_matches!(prng.read(&mut env, &mut out), Err(Error::EntropyExhausted));
    }
}
