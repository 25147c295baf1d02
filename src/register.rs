//! Strike register (spec §4.6): O(1) amortized validation that a one-shot
//! handshake ticket is used at most once within its lifetime.
//!
//! A ticket carries a `(second, sequence)` pair minted by [`Register::reserve`]
//! at issue time. [`Register::claim`] is how the peer side redeems it: it
//! checks the pair falls inside the current sliding window of `lifetime`
//! one-second buckets and that its bit hasn't already been claimed, then
//! sets it. Buckets older than `lifetime` seconds are recycled (their bits
//! cleared) as the window slides forward, so memory use stays bounded by
//! `lifetime * bits_per_bucket` regardless of how long the register lives.
//!
//! Each bucket starts with room for [`Config::register_min_bits`] tokens and
//! doubles, up to [`Config::register_max_bits`], the moment it fills within
//! its current second — an amortized resize rather than a per-call one,
//! since it only runs when a bucket's capacity is actually exhausted.

const WORD_BITS: u32 = 64;

fn words_for(bits: u32) -> usize {
    ((bits + WORD_BITS - 1) / WORD_BITS) as usize
}

struct Bucket {
    /// Absolute second this bucket currently represents, or `None` if it has
    /// never been used (equivalent to "empty" without needing a sentinel
    /// second value).
    second: Option<u32>,
    bits: Vec<u64>,
    count: u32,
}

impl Bucket {
    fn empty(capacity_words: usize) -> Self {
        Bucket {
            second: None,
            bits: vec![0; capacity_words],
            count: 0,
        }
    }

    fn reset(&mut self, second: u32) {
        for word in &mut self.bits {
            *word = 0;
        }
        self.second = Some(second);
        self.count = 0;
    }

    fn grow(&mut self, capacity_words: usize) {
        self.bits.resize(capacity_words, 0);
    }

    fn get(&self, seq: u32) -> bool {
        let word = (seq / WORD_BITS) as usize;
        let bit = seq % WORD_BITS;
        (self.bits[word] >> bit) & 1 != 0
    }

    fn set(&mut self, seq: u32) {
        let word = (seq / WORD_BITS) as usize;
        let bit = seq % WORD_BITS;
        self.bits[word] |= 1 << bit;
    }
}

/// A sliding window of per-second replay bitmaps.
pub struct Register {
    lifetime: u32,
    bits_per_bucket: u32,
    max_bits_per_bucket: u32,
    buckets: Vec<Bucket>,
    /// The most recent second the register has observed via `reserve` or
    /// `claim`. Buckets are only recycled lazily, when the window actually
    /// needs to slide past them.
    now: Option<u32>,
}

/// The hard ceiling on a bucket's bit width, matching the reference
/// implementation's overflow guard: a few bits shy of `u32::MAX` so sequence
/// numbers can never wrap.
const HARD_BIT_CAP: u32 = 0xffff_ffff - 31;

impl Register {
    pub fn new(lifetime: u32, min_bits: u32, max_bits: u32) -> Self {
        let bits_per_bucket = min_bits.min(HARD_BIT_CAP);
        let max_bits_per_bucket = max_bits.min(HARD_BIT_CAP);
        let words = words_for(bits_per_bucket);
        let buckets = (0..lifetime).map(|_| Bucket::empty(words)).collect();
        Register {
            lifetime,
            bits_per_bucket,
            max_bits_per_bucket,
            buckets,
            now: None,
        }
    }

    fn bucket_index(&self, second: u32) -> usize {
        (second % self.lifetime) as usize
    }

    /// Advance the window to `second`, recycling any buckets that have
    /// aged out. Time must not go backwards; a regression is reported to
    /// the caller as invalid rather than silently ignored, since it would
    /// otherwise let an expired ticket's bucket be mistaken for a live one.
    fn advance(&mut self, second: u32) -> bool {
        if let Some(now) = self.now {
            if second < now {
                return false;
            }
        }
        self.now = Some(second);
        true
    }

    /// True if `second` is still inside the live window as of the last
    /// observed time.
    fn in_window(&self, second: u32) -> bool {
        match self.now {
            Some(now) => second <= now && now - second < self.lifetime,
            None => false,
        }
    }

    fn bucket_for_second_mut(&mut self, second: u32) -> &mut Bucket {
        let idx = self.bucket_index(second);
        let bucket = &mut self.buckets[idx];
        if bucket.second != Some(second) {
            bucket.reset(second);
        }
        bucket
    }

    /// Mint a fresh `(second, sequence)` pair for a one-shot ticket, growing
    /// the bucket's bit width if it's already full for this second. Returns
    /// `None` if the bucket is saturated even at the maximum bit width
    /// (spec: `EAGAIN`, a transient condition the caller may retry after the
    /// second rolls over).
    ///
    /// This only reserves a sequence number, bounding how many tickets a
    /// single second can mint; it does not mark any bit claimed. A minted
    /// ticket's authenticity is carried by its HMAC tag, not by register
    /// state, so the bit for `(second, seq)` is set only when the ticket is
    /// actually redeemed through [`Register::claim`] — most minted tickets
    /// are never redeemed at all.
    pub fn reserve(&mut self, second: u32) -> Option<(u32, u32)> {
        self.advance(second);
        let bits_per_bucket = self.bits_per_bucket;
        let max_bits_per_bucket = self.max_bits_per_bucket;
        let bucket = self.bucket_for_second_mut(second);

        if bucket.count >= bits_per_bucket {
            if bits_per_bucket >= max_bits_per_bucket {
                return None;
            }
            let new_width = (bits_per_bucket * 2).min(max_bits_per_bucket);
            self.grow_all_buckets(new_width);
            return self.reserve(second);
        }

        let seq = bucket.count;
        bucket.count += 1;
        Some((second, seq))
    }

    fn grow_all_buckets(&mut self, new_width: u32) {
        let words = words_for(new_width);
        for bucket in &mut self.buckets {
            bucket.grow(words);
        }
        self.bits_per_bucket = new_width;
    }

    /// Redeem a `(second, sequence)` pair. Returns `true` exactly once per
    /// pair, while `second` remains inside the live window; a replay, an
    /// out-of-window second, or a time regression all return `false`.
    ///
    /// The ticket's HMAC tag is what proves `(second, seq)` came from this
    /// process, so redemption does not require the claiming register
    /// instance to be the same one that called `reserve` — only that the
    /// bit for this pair hasn't been set yet within the live window.
    pub fn claim(&mut self, second: u32, seq: u32, now: u32) -> bool {
        if !self.advance(now) {
            return false;
        }
        if !self.in_window(second) {
            return false;
        }
        if seq >= self.bits_per_bucket {
            return false;
        }

        let bucket = self.bucket_for_second_mut(second);
        if bucket.get(seq) {
            return false;
        }
        bucket.set(seq);
        true
    }
}
