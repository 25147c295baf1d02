//! Slab buffer (spec §4.2): a FIFO byte queue backed by a chain of
//! pool-provided slabs, with writes appending to the tail and reads
//! consuming from the head.
//!
//! The reference implementation links slabs together with an intrusive
//! `next` pointer stored inside the pool object itself. This crate keeps
//! cursors alongside an owned [`Block`] in a `VecDeque` instead (the arena
//! note in spec §9 applied to a FIFO rather than a hash chain), so there is
//! no unsafe code in this component.

use std::collections::VecDeque;

use crate::error::Error;
use crate::pool::{Block, Pool, POOL_OBJECT_SIZE};

struct Slab {
    block: Block,
    start: usize,
    end: usize,
}

impl Slab {
    fn unused(&self) -> usize {
        POOL_OBJECT_SIZE - self.end
    }
}

/// A growable, FIFO byte buffer built of pool slabs.
pub struct SlabBuffer {
    slabs: VecDeque<Slab>,
    size: usize,
}

impl SlabBuffer {
    /// Build an empty buffer.
    pub fn new() -> Self {
        SlabBuffer {
            slabs: VecDeque::new(),
            size: 0,
        }
    }

    /// Number of bytes currently buffered.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Discard all data, returning every owned slab to `pool`.
    pub fn clear(&mut self, pool: &mut Pool) {
        while let Some(slab) = self.slabs.pop_front() {
            pool.free(slab.block);
        }
        self.size = 0;
    }

    /// Append `buf` to the buffer. Either the whole write commits and
    /// `Ok(buf.len())` is returned, or nothing is appended and
    /// [`Error::NoMemory`] is returned.
    pub fn write(&mut self, pool: &mut Pool, buf: &[u8]) -> Result<usize, Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        let old_len = self.slabs.len();
        let cap = self.slabs.back().map(Slab::unused).unwrap_or(0);
        if cap < buf.len() {
            let needed = buf.len() - cap;
            let slabs_needed = (needed + POOL_OBJECT_SIZE - 1) / POOL_OBJECT_SIZE;
            for _ in 0..slabs_needed {
                let block = pool.alloc();
                self.slabs.push_back(Slab {
                    block,
                    start: 0,
                    end: 0,
                });
            }
        }

        // The existing back slab (if it had room) is where the write
        // starts; otherwise it starts at the first freshly appended slab.
        let mut idx = if cap > 0 { old_len - 1 } else { old_len };
        let mut remaining = buf;

        while !remaining.is_empty() {
            let slab = &mut self.slabs[idx];
            let n = slab.unused().min(remaining.len());
            slab.block[slab.end..slab.end + n].copy_from_slice(&remaining[..n]);
            slab.end += n;
            remaining = &remaining[n..];
            if !remaining.is_empty() {
                idx += 1;
            }
        }

        self.size += buf.len();
        Ok(buf.len())
    }

    /// Copy up to `dst.len()` buffered bytes into `dst`, returning how many
    /// bytes were copied (0 only when the buffer is empty). Emptied head
    /// slabs are returned to `pool`.
    pub fn read(&mut self, pool: &mut Pool, dst: &mut [u8]) -> usize {
        let mut nread = 0;
        while nread < dst.len() && self.size > 0 {
            let slab = match self.slabs.front_mut() {
                Some(s) => s,
                None => break,
            };
            let avail = slab.end - slab.start;
            let n = avail.min(dst.len() - nread);
            dst[nread..nread + n].copy_from_slice(&slab.block[slab.start..slab.start + n]);
            slab.start += n;
            nread += n;
            self.size -= n;

            if slab.start == slab.end {
                let slab = self.slabs.pop_front().unwrap();
                pool.free(slab.block);
            }
        }
        nread
    }
}

impl Default for SlabBuffer {
    fn default() -> Self {
        Self::new()
    }
}
