//! Connection hash (spec §4.4): an open-chained hash map from 64-bit cookie
//! to connection, incrementally rehashed so that a single `find`, `insert`
//! or `remove` never pays for a full-table resize.
//!
//! The reference implementation keeps two flat bucket arrays and a `split`
//! cursor marking how far migration from the old table into the new one has
//! progressed. This crate keeps the same two-table-plus-cursor shape, with
//! each bucket a `Vec` of entries (a safe stand-in for the original's
//! intrusive singly-linked chains, per the arena note in spec §9).
//!
//! Keys are hashed with keyed SipHash-2-4 so that an adversary who can
//! choose connection cookies cannot force worst-case bucket collisions
//! without also knowing the per-process seed.

use std::hash::Hasher;

use siphasher::sip::SipHasher24;

/// Buckets migrated per call to [`Dict::find`].
const MIGRATE_ON_FIND: usize = 1;
/// Buckets migrated per call to [`Dict::insert`] or [`Dict::remove`].
const MIGRATE_ON_WRITE: usize = 4;

fn bucket_of(hash: u64, table_len: usize) -> usize {
    debug_assert!(table_len.is_power_of_two());
    (hash as usize) & (table_len - 1)
}

/// An open-chained hash map from cookie to `V`, incrementally rehashed.
pub struct Dict<V> {
    seed0: u64,
    seed1: u64,
    old: Vec<Vec<(u64, V)>>,
    new: Vec<Vec<(u64, V)>>,
    /// `Some(i)` while a resize is in progress: buckets `0..i` of `old` have
    /// already been migrated into `new`.
    split: Option<usize>,
    count: usize,
    min_size: usize,
    max_size: usize,
}

impl<V> Dict<V> {
    /// Build an empty dict. `seed` keys the SipHash instance used for every
    /// lookup; callers should draw it from the engine's PRNG at socket
    /// creation so that bucket placement cannot be predicted externally.
    pub fn new(seed: [u8; 16], min_size: u32, max_size: u32) -> Self {
        let seed0 = u64::from_le_bytes(seed[0..8].try_into().unwrap());
        let seed1 = u64::from_le_bytes(seed[8..16].try_into().unwrap());
        let min_size = (min_size as usize).next_power_of_two();
        let max_size = (max_size as usize).next_power_of_two();
        Dict {
            seed0,
            seed1,
            old: Vec::new(),
            new: (0..min_size).map(|_| Vec::new()).collect(),
            split: None,
            count: 0,
            min_size,
            max_size,
        }
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn hash(&self, cookie: u64) -> u64 {
        let mut h = SipHasher24::new_with_keys(self.seed0, self.seed1);
        h.write_u64(cookie);
        h.finish()
    }

    /// Migrate up to `n` buckets from the old table into the new one.
    fn migrate(&mut self, n: usize) {
        let split = match self.split {
            Some(s) => s,
            None => return,
        };
        let mut i = split;
        let end = (split + n).min(self.old.len());
        while i < end {
            let entries: Vec<(u64, V)> = self.old[i].drain(..).collect();
            for (cookie, value) in entries {
                let idx = bucket_of(self.hash(cookie), self.new.len());
                self.new[idx].push((cookie, value));
            }
            i += 1;
        }
        if i >= self.old.len() {
            self.old.clear();
            self.split = None;
        } else {
            self.split = Some(i);
        }
    }

    fn start_resize(&mut self, new_size: usize) {
        let new_size = new_size.clamp(self.min_size, self.max_size);
        if new_size == self.new.len() {
            return;
        }
        // A resize already in progress is finished in place first so there
        // is never more than one old table to migrate from.
        self.migrate(self.old.len());
        self.old = std::mem::replace(
            &mut self.new,
            (0..new_size).map(|_| Vec::new()).collect(),
        );
        self.split = Some(0);
    }

    fn maybe_grow(&mut self) {
        if self.split.is_some() {
            return;
        }
        if self.count >= self.new.len() && self.new.len() < self.max_size {
            self.start_resize(self.new.len() * 2);
        }
    }

    fn maybe_shrink(&mut self) {
        if self.split.is_some() {
            return;
        }
        if self.new.len() > self.min_size && self.count * 4 < self.new.len() {
            self.start_resize((self.new.len() / 2).max(self.min_size));
        }
    }

    /// Look up `cookie`, migrating one bucket of any in-progress resize.
    pub fn find(&mut self, cookie: u64) -> Option<&V> {
        self.migrate(MIGRATE_ON_FIND);
        let hash = self.hash(cookie);
        if self.split.is_some() {
            let idx = bucket_of(hash, self.old.len());
            if let Some(entry) = self.old[idx].iter().find(|(c, _)| *c == cookie) {
                return Some(&entry.1);
            }
        }
        let idx = bucket_of(hash, self.new.len());
        self.new[idx].iter().find(|(c, _)| *c == cookie).map(|e| &e.1)
    }

    /// Insert `value` under `cookie`, replacing any prior entry and
    /// returning it. Migrates a bounded number of buckets of any
    /// in-progress resize, then re-checks the growth threshold.
    pub fn insert(&mut self, cookie: u64, value: V) -> Option<V> {
        self.migrate(MIGRATE_ON_WRITE);
        let hash = self.hash(cookie);

        if self.split.is_some() {
            let idx = bucket_of(hash, self.old.len());
            if let Some(pos) = self.old[idx].iter().position(|(c, _)| *c == cookie) {
                let (_, old_value) = self.old[idx].swap_remove(pos);
                let idx = bucket_of(hash, self.new.len());
                self.new[idx].push((cookie, value));
                return Some(old_value);
            }
        }

        let idx = bucket_of(hash, self.new.len());
        if let Some(pos) = self.new[idx].iter().position(|(c, _)| *c == cookie) {
            let (_, old_value) = std::mem::replace(&mut self.new[idx][pos], (cookie, value));
            return Some(old_value);
        }

        self.new[idx].push((cookie, value));
        self.count += 1;
        self.maybe_grow();
        None
    }

    /// Remove and return the value stored under `cookie`, if any. Migrates a
    /// bounded number of buckets of any in-progress resize, then re-checks
    /// the shrink threshold.
    pub fn remove(&mut self, cookie: u64) -> Option<V> {
        self.migrate(MIGRATE_ON_WRITE);
        let hash = self.hash(cookie);

        if self.split.is_some() {
            let idx = bucket_of(hash, self.old.len());
            if let Some(pos) = self.old[idx].iter().position(|(c, _)| *c == cookie) {
                let (_, value) = self.old[idx].swap_remove(pos);
                self.count -= 1;
                self.maybe_shrink();
                return Some(value);
            }
        }

        let idx = bucket_of(hash, self.new.len());
        if let Some(pos) = self.new[idx].iter().position(|(c, _)| *c == cookie) {
            let (_, value) = self.new[idx].swap_remove(pos);
            self.count -= 1;
            self.maybe_shrink();
            return Some(value);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict() -> Dict<u32> {
        Dict::new([0x42; 16], 1 << 6, 1 << 16)
    }

    #[test]
    fn insert_then_find_round_trips() {
        let mut d = dict();
        assert_eq!(d.insert(7, 100), None);
        assert_eq!(d.find(7), Some(&100));
    }

    #[test]
    fn insert_replaces_and_returns_prior_value() {
        let mut d = dict();
        d.insert(1, 10);
        assert_eq!(d.insert(1, 20), Some(10));
        assert_eq!(d.find(1), Some(&20));
    }

    #[test]
    fn remove_returns_value_and_forgets_key() {
        let mut d = dict();
        d.insert(5, 55);
        assert_eq!(d.remove(5), Some(55));
        assert_eq!(d.find(5), None);
        assert_eq!(d.remove(5), None);
    }

    #[test]
    fn grows_and_keeps_every_entry_reachable_through_resize() {
        let mut d = dict();
        for i in 0..2000u64 {
            d.insert(i, i as u32);
        }
        for i in 0..2000u64 {
            assert_eq!(d.find(i), Some(&(i as u32)), "lost key {}", i);
        }
        assert_eq!(d.len(), 2000);
    }

    #[test]
    fn shrinks_back_down_after_bulk_removal() {
        let mut d = dict();
        for i in 0..4000u64 {
            d.insert(i, i as u32);
        }
        let grown_size = d.new.len();
        for i in 0..3900u64 {
            d.remove(i);
        }
        // Drive enough further operations to finish any in-progress
        // migration and trigger the shrink threshold check.
        for i in 3900..4000u64 {
            d.find(i);
        }
        assert!(d.new.len() <= grown_size, "table never shrank");
        for i in 3900..4000u64 {
            assert_eq!(d.find(i), Some(&(i as u32)));
        }
    }

    #[test]
    fn never_shrinks_below_the_configured_minimum() {
        let mut d = Dict::<u32>::new([1; 16], 1 << 6, 1 << 16);
        d.insert(1, 1);
        d.remove(1);
        for i in 0..200u64 {
            d.find(i);
        }
        assert!(d.new.len() >= 1 << 6);
    }

    #[test]
    fn survives_a_thousand_inserts_interleaved_with_finds() {
        use rand::{Rng, SeedableRng};

        let mut d = dict();
        let mut model = std::collections::HashMap::new();
        let mut rng = rand::rngs::StdRng::from_seed([0x42; 32]);

        for i in 0..1000u64 {
            let cookie = rng.gen::<u64>() | 1;
            d.insert(cookie, i as u32);
            model.insert(cookie, i as u32);

            if i % 2 == 0 {
                let probe = if !model.is_empty() && rng.gen::<bool>() {
                    *model.keys().next().unwrap()
                } else {
                    rng.gen::<u64>() | 1
                };
                assert_eq!(d.find(probe), model.get(&probe));
            }
        }

        assert_eq!(d.len(), model.len());
        for (cookie, value) in &model {
            assert_eq!(d.find(*cookie), Some(value));
        }
    }
}
