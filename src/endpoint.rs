//! Socket engine (spec §4.8): the packet demultiplexer and timer driver
//! that owns every per-connection structure and talks to the outside world
//! only through an injected [`Environment`].
//!
//! `Socket::tick` and `Socket::recv` are the two public entries a host
//! drives: `tick` when a previously-returned deadline has passed, `recv`
//! when a datagram arrives. Both return the absolute time of the next
//! scheduled wake-up (`0` meaning none), mirroring the teacher crate's own
//! `poll_transmit`/`handle` split between "drive timers" and "demultiplex a
//! packet" duties.

use slab::Slab;
use slog::Logger;

use crate::addr::Address;
use crate::config::Config;
use crate::conn::{Connection, State};
use crate::dict::Dict;
use crate::error::Error;
use crate::heap::Heap;
use crate::packet::{self, ControlType, Packet};
use crate::pool::Pool;
use crate::prng::Prng;
use crate::register::Register;
use crate::ticket::{self, TicketKey};
use crate::Environment;

fn now_seconds(now: i64) -> u32 {
    (now.max(0) / 1_000_000_000) as u32
}

/// Time (in `now`'s units, nanoseconds) a dialed connection waits for its
/// peer to acknowledge the handshake before the core gives up on it.
const HANDSHAKE_TIMEOUT: i64 = 5_000_000_000;

/// The core engine for one UDP endpoint. Not `Sync`: every public method
/// takes `&mut self`, and the type holds no internal synchronization, so
/// the borrow checker itself enforces the single-threaded, non-reentrant
/// contract spec §5 describes.
pub struct Socket<E: Environment> {
    env: E,
    log: Logger,
    config: Config,
    prng: Prng,
    pool: Pool,
    register: Register,
    hash: Dict<usize>,
    heap: Heap<usize>,
    conns: Slab<Connection>,
    ticket_key: TicketKey,
    /// Packets handed to `env.send_datagram` during the current or most
    /// recent public call; kept alive until the next one starts, since the
    /// callback may only have enqueued them rather than copied them out
    /// (spec §4.8 "send policy").
    lingering: Vec<Packet>,
    last_tick: i64,
    next_tick: i64,
}

impl<E: Environment> Socket<E> {
    /// Build a socket over `env`, initializing every subcomponent in
    /// sequence. Each step after the first draws from the PRNG, which can
    /// fail with [`Error::EntropyExhausted`]; the reference implementation
    /// tears down the partially-built socket by hand on such a failure
    /// (spec §9 "scoped resource acquisition"), which here is simply `?`
    /// combined with ordinary `Drop` — nothing built so far needs any
    /// teardown beyond dropping its owner.
    pub fn create(mut env: E, config: Config, log: Logger) -> Result<Self, Error> {
        let mut prng = Prng::new();
        let pool = Pool::new();
        let register = Register::new(
            config.register_lifetime,
            config.register_min_bits,
            config.register_max_bits,
        );

        let mut dict_seed = [0u8; 16];
        prng.read(&mut env, &mut dict_seed)?;
        let hash = Dict::new(dict_seed, config.dict_min_size, config.dict_max_size);

        let heap = Heap::new(config.heap_min_size, config.heap_max_size);

        let mut ticket_key = [0u8; 32];
        prng.read(&mut env, &mut ticket_key)?;

        debug!(log, "socket created");

        Ok(Socket {
            env,
            log,
            config,
            prng,
            pool,
            register,
            hash,
            heap,
            conns: Slab::new(),
            ticket_key,
            lingering: Vec::new(),
            last_tick: 0,
            next_tick: 0,
        })
    }

    /// Tear down the socket, refusing if any connection is still resident
    /// (spec: `EAGAIN`). On failure the socket is handed back unchanged so
    /// the caller can drop its connections and retry.
    pub fn close(self) -> Result<(), (Self, Error)> {
        if self.conns.is_empty() {
            Ok(())
        } else {
            Err((self, Error::would_block("socket still has live connections")))
        }
    }

    /// The absolute time of the next scheduled wake-up, `0` for none.
    pub fn next_tick(&self) -> i64 {
        self.next_tick
    }

    fn drain_lingering(&mut self) {
        for pkt in self.lingering.drain(..) {
            pkt.release(&mut self.pool);
        }
    }

    fn push_heap(&mut self, key: usize, next_tick: i64, local_cookie: u64) {
        let conns = &mut self.conns;
        self.heap
            .push(next_tick, local_cookie, key, &mut |k, pos| {
                conns[k].heap_index = pos;
            });
    }

    fn pop_heap(&mut self) -> Option<(i64, u64, usize)> {
        let conns = &mut self.conns;
        self.heap.pop(&mut |k, pos| {
            conns[k].heap_index = pos;
        })
    }

    fn fix_heap(&mut self, key: usize, next_tick: i64) {
        let index = self.conns[key].heap_index;
        let conns = &mut self.conns;
        self.heap
            .update_at(index, next_tick, &mut |k, pos| {
                conns[k].heap_index = pos;
            });
    }

    fn remove_heap(&mut self, key: usize) {
        let index = self.conns[key].heap_index;
        let conns = &mut self.conns;
        self.heap.remove_at(index, &mut |k, pos| {
            conns[k].heap_index = pos;
        });
    }

    /// Drive every connection whose deadline is at or before `now`, in
    /// ascending-deadline order. Returns the deadline of whatever is now
    /// soonest, `0` if nothing remains scheduled.
    fn drive_timers(&mut self, now: i64) -> i64 {
        if self.next_tick == 0 || now < self.next_tick {
            return self.next_tick;
        }
        loop {
            let (tick, _, key) = match self.heap.peek() {
                Some(entry) => entry,
                None => break,
            };
            if tick <= 0 || tick > now {
                break;
            }
            self.pop_heap();
            let new_tick = self.conns[key].tick(now);
            self.push_heap(key, new_tick, self.conns[key].local_cookie);
        }
        self.heap.peek().map(|(tick, _, _)| if tick <= 0 { 0 } else { tick }).unwrap_or(0)
    }

    /// Run the tick-drive steps and cull the pool; called at the top of
    /// both public entries (spec §4.8 steps 1-6, shared between `tick` and
    /// `recv`).
    fn pre_entry(&mut self, now: i64) -> Result<(), Error> {
        self.drain_lingering();
        if now < self.last_tick {
            return Err(Error::invalid("time regressed"));
        }
        self.next_tick = self.drive_timers(now);
        self.last_tick = now;
        Ok(())
    }

    /// Drive any timers due at or before `now`. Returns the next scheduled
    /// wake-up, `0` for none.
    pub fn tick(&mut self, now: i64) -> Result<i64, Error> {
        self.pre_entry(now)?;
        self.pool.cull(self.config.pool_keep);
        Ok(self.next_tick)
    }

    /// Demultiplex an incoming datagram. Malformed input, unknown cookies,
    /// and failed tickets are silently discarded (spec §7) rather than
    /// surfaced as an error; only resource exhaustion and time regression
    /// propagate to the caller.
    pub fn recv(&mut self, addr: Address, payload: &[u8], now: i64) -> Result<i64, Error> {
        self.pre_entry(now)?;

        if payload.len() < packet::MIN_PACKET_SIZE {
            trace!(self.log, "dropping undersized datagram"; "len" => payload.len());
        } else if let Some(header) = packet::decode_control_header(payload) {
            // The version tag at bytes 7..14 overlaps the low byte of the
            // destination-cookie field by design, so a control packet is
            // recognized by a valid tag, never by the cookie comparing
            // equal to zero.
            self.handle_control(header, addr, payload, now)?;
        } else if let Some(cookie) = packet::decode_destination_cookie(payload) {
            self.handle_data(cookie, addr, payload, now);
        }

        self.pool.cull(self.config.pool_keep);
        Ok(self.next_tick)
    }

    fn handle_control(
        &mut self,
        header: packet::ControlHeader,
        addr: Address,
        payload: &[u8],
        now: i64,
    ) -> Result<(), Error> {
        match (header.ty, header.sub_cookie) {
            (ControlType::Handshake, 0) => self.handle_client_handshake(addr, payload, now),
            (ControlType::Handshake, sub) | (ControlType::Ticket, sub) => {
                self.handle_keyed_control(sub, addr, payload, now);
                Ok(())
            }
        }
    }

    /// A fresh client handshake (sub-cookie 0): the wire layout past the
    /// 24-byte control header is owned by the (out-of-scope) connection
    /// state machine, except for the 64-byte handshake ticket this core
    /// must itself mint and verify (spec §4.7, §6). Only entropy exhaustion
    /// while minting the accepted connection's cookie propagates; a
    /// malformed handshake or a failed ticket is silently dropped (spec §7).
    fn handle_client_handshake(&mut self, addr: Address, payload: &[u8], now: i64) -> Result<(), Error> {
        if payload.len() < 24 + ticket::TICKET_LEN {
            trace!(self.log, "dropping undersized handshake");
            return Ok(());
        }
        let mut ticket_bytes = [0u8; ticket::TICKET_LEN];
        ticket_bytes.copy_from_slice(&payload[24..24 + ticket::TICKET_LEN]);

        if ticket::verify(&mut self.register, &self.ticket_key, &ticket_bytes, &addr, now_seconds(now)) {
            debug!(self.log, "accepted handshake"; "addr" => ?addr);
            self.accept(addr)?;
        } else {
            debug!(self.log, "rejected handshake");
        }
        Ok(())
    }

    /// A control packet with a nonzero sub-cookie (an in-progress
    /// handshake lookup, or a ticket response) is delivered to its
    /// connection exactly like an ordinary data packet — only the initial,
    /// sub-cookie-0 client handshake gets bespoke handling at the socket
    /// level (spec §4.8 step 4).
    fn handle_keyed_control(&mut self, sub_cookie: u64, addr: Address, payload: &[u8], now: i64) {
        self.deliver(sub_cookie, addr, payload, now);
    }

    fn handle_data(&mut self, cookie: u64, addr: Address, payload: &[u8], now: i64) {
        self.deliver(cookie, addr, payload, now);
    }

    fn deliver(&mut self, cookie: u64, addr: Address, payload: &[u8], now: i64) {
        let key = match self.hash.find(cookie) {
            Some(&k) => k,
            None => {
                trace!(self.log, "dropping packet for unknown cookie"; "cookie" => cookie);
                return;
            }
        };
        let pkt = match Packet::new(&mut self.pool, addr, payload) {
            Some(p) => p,
            None => {
                trace!(self.log, "dropping oversized packet");
                return;
            }
        };
        self.conns[key].recv(&mut self.pool, pkt.payload(), now);
        pkt.release(&mut self.pool);

        let new_tick = self.conns[key].next_tick;
        self.fix_heap(key, new_tick);
        self.next_tick = self.heap.peek().map(|(t, _, _)| if t <= 0 { 0 } else { t }).unwrap_or(0);
    }

    fn next_cookie(&mut self) -> Result<u64, Error> {
        loop {
            let mut bytes = [0u8; 8];
            self.prng.read(&mut self.env, &mut bytes)?;
            let cookie = crate::endian::decode_u64(&bytes);
            if cookie != 0 && self.hash.find(cookie).is_none() {
                return Ok(cookie);
            }
        }
    }

    fn insert_conn(&mut self, conn: Connection, next_tick: i64) -> Result<u64, Error> {
        let local_cookie = conn.local_cookie;
        let key = self.conns.insert(conn);
        self.hash.insert(local_cookie, key);
        self.push_heap(key, next_tick, local_cookie);
        self.next_tick = self.heap.peek().map(|(t, _, _)| if t <= 0 { 0 } else { t }).unwrap_or(0);
        Ok(local_cookie)
    }

    /// Originate a connection attempt to `addr`. Full dial-side handshake
    /// cryptography is out of scope (spec §1); this establishes the core's
    /// own bookkeeping — a unique cookie, hash and heap membership, and a
    /// handshake timeout — which is the part the engine is responsible for.
    pub fn dial(&mut self, addr: Address, now: i64) -> Result<u64, Error> {
        let local_cookie = self.next_cookie()?;
        let conn = Connection::dialed(local_cookie, addr, now, HANDSHAKE_TIMEOUT);
        let next_tick = conn.next_tick;
        self.insert_conn(conn, next_tick)
    }

    /// Accept a connection following a verified incoming handshake.
    /// Entropy exhaustion while minting the new connection's cookie
    /// propagates to the caller (spec §4.8 failure semantics); it is the
    /// one failure mode inside handshake handling that isn't hostile or
    /// stale traffic, so it must not be swallowed like the others.
    fn accept(&mut self, addr: Address) -> Result<u64, Error> {
        let local_cookie = self.next_cookie()?;
        let conn = Connection::accepted(local_cookie, 0, addr);
        self.insert_conn(conn, 0)
    }

    /// Mint a 64-byte handshake ticket for `addr`, for a host that wants to
    /// hand one out ahead of a real client connection attempt.
    pub fn mint_ticket(&mut self, addr: &Address, now: i64) -> Result<[u8; ticket::TICKET_LEN], Error> {
        ticket::mint(
            &mut self.env,
            &mut self.prng,
            &mut self.register,
            &self.ticket_key,
            addr,
            now_seconds(now),
        )
    }

    /// Drop a connection the owner is done with: release its buffers back
    /// to the pool and remove it from both the hash and the heap, keeping
    /// invariant I1 intact.
    pub fn drop_connection(&mut self, local_cookie: u64) {
        if let Some(&key) = self.hash.find(local_cookie) {
            self.remove_heap(key);
            self.hash.remove(local_cookie);
            let mut conn = self.conns.remove(key);
            conn.close(&mut self.pool);
        }
        self.next_tick = self.heap.peek().map(|(t, _, _)| if t <= 0 { 0 } else { t }).unwrap_or(0);
    }

    /// Look up a connection's observable state, if it still exists. Takes
    /// `&mut self` because even a lookup migrates a bounded number of hash
    /// buckets (spec §4.4).
    pub fn state(&mut self, local_cookie: u64) -> Option<State> {
        self.hash
            .find(local_cookie)
            .copied()
            .map(|key| self.conns[key].state)
    }

    pub fn connection_count(&self) -> usize {
        self.conns.len()
    }

    pub fn pool_count(&self) -> usize {
        self.pool.count()
    }
}
