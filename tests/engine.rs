//! Black-box engine scenarios driven purely through the crate's public
//! surface, against a fake `Environment` local to this test binary (the
//! crate's own `ScriptedEnv` is a `#[cfg(test)]` unit-test fixture and not
//! visible from an integration test).

use std::collections::VecDeque;

use twist_proto::{addr::Address, ticket, Config, Environment, Socket, State};

struct FakeEnv {
    entropy: VecDeque<Vec<u8>>,
    sent: Vec<(Address, Vec<u8>)>,
}

impl FakeEnv {
    fn repeating(byte: u8) -> Self {
        FakeEnv { entropy: std::iter::repeat(vec![byte; 64]).take(64).collect(), sent: Vec::new() }
    }
}

impl Environment for FakeEnv {
    fn send_datagram(&mut self, dest: &Address, data: &[u8]) {
        self.sent.push((*dest, data.to_vec()));
    }

    fn read_entropy(&mut self, dst: &mut [u8]) -> usize {
        match self.entropy.pop_front() {
            Some(bytes) => {
                let n = bytes.len().min(dst.len());
                dst[..n].copy_from_slice(&bytes[..n]);
                n
            }
            None => 0,
        }
    }
}

fn logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

fn handshake_payload(ticket_bytes: &[u8; ticket::TICKET_LEN]) -> Vec<u8> {
    let mut payload = vec![0u8; 24 + ticket::TICKET_LEN];
    twist_proto::endian::encode_u64(&mut payload[0..8], 0);
    payload[7..14].copy_from_slice(twist_proto::packet::VERSION_TAG);
    payload[15] = b'h';
    twist_proto::endian::encode_u64(&mut payload[16..24], 0);
    payload[24..24 + ticket::TICKET_LEN].copy_from_slice(ticket_bytes);
    payload
}

/// S1 (engine-level slice): a client that presents a freshly minted ticket
/// over `recv` is accepted into an established connection.
#[test]
fn a_valid_ticket_delivered_over_recv_establishes_a_connection() {
    let env = FakeEnv::repeating(0x01);
    let mut sock = Socket::create(env, Config::default(), logger()).unwrap();
    let addr = Address::new(b"127.0.0.1:9").unwrap();
    let now = 1_000_000_000;

    let ticket_bytes = sock.mint_ticket(&addr, now).unwrap();
    let payload = handshake_payload(&ticket_bytes);

    sock.recv(addr, &payload, now).unwrap();
    assert_eq!(sock.connection_count(), 1);
}

/// A replayed handshake ticket is silently dropped rather than minting a
/// second connection (spec §7: hostile/stale traffic must not surface as an
/// error, and a ticket redeems at most once).
#[test]
fn a_replayed_ticket_does_not_establish_a_second_connection() {
    let env = FakeEnv::repeating(0x02);
    let mut sock = Socket::create(env, Config::default(), logger()).unwrap();
    let addr = Address::new(b"127.0.0.1:9").unwrap();
    let now = 1_000_000_000;

    let ticket_bytes = sock.mint_ticket(&addr, now).unwrap();
    let payload = handshake_payload(&ticket_bytes);

    sock.recv(addr, &payload, now).unwrap();
    sock.recv(addr, &payload, now).unwrap();
    assert_eq!(sock.connection_count(), 1);
}

/// S5-shaped engine scenario: several dialed connections with distinct
/// handshake deadlines fire through `tick` in ascending-deadline order and
/// leave the rest pending.
#[test]
fn dialed_connections_time_out_through_tick_in_deadline_order() {
    let env = FakeEnv::repeating(0x03);
    let mut sock = Socket::create(env, Config::default(), logger()).unwrap();

    let addr = Address::new(b"127.0.0.1:9").unwrap();
    let c1 = sock.dial(addr, 0).unwrap();
    let c2 = sock.dial(addr, 1_000_000_000).unwrap();
    assert_eq!(sock.connection_count(), 2);

    // Both connections share the same fixed handshake timeout, offset by
    // their dial times, so advancing past only the first's deadline should
    // close exactly one of them.
    let next = sock.tick(5_000_000_000).unwrap();
    assert_eq!(sock.state(c1), Some(State::Closed));
    assert_eq!(sock.state(c2), Some(State::HandshakeSent));
    assert_eq!(next, 6_000_000_000);

    let next = sock.tick(6_000_000_000).unwrap();
    assert_eq!(sock.state(c2), Some(State::Closed));
    assert_eq!(next, 0);
}

/// P8: a public entry observing `now` go backwards fails closed and leaves
/// prior state untouched.
#[test]
fn time_regression_is_rejected_and_does_not_mutate_state() {
    let env = FakeEnv::repeating(0x04);
    let mut sock = Socket::create(env, Config::default(), logger()).unwrap();
    let addr = Address::new(b"127.0.0.1:9").unwrap();

    sock.dial(addr, 1_000).unwrap();
    sock.tick(2_000).unwrap();
    let before = sock.connection_count();
    assert!(sock.recv(addr, &[0u8; 64], 500).is_err());
    assert_eq!(sock.connection_count(), before);
}

/// S6: the object pool never grows past the configured watermark across a
/// burst of delivered packets.
#[test]
fn pool_stays_at_the_configured_watermark_across_a_burst_of_recv() {
    let env = FakeEnv::repeating(0x05);
    let config = Config { pool_keep: 4, ..Config::default() };
    let mut sock = Socket::create(env, config, logger()).unwrap();
    let addr = Address::new(b"127.0.0.1:9").unwrap();

    let cookie = sock.dial(addr, 0).unwrap();
    let mut payload = vec![0u8; 64];
    twist_proto::endian::encode_u64(&mut payload[0..8], cookie);

    for i in 0..20 {
        sock.recv(addr, &payload, i).unwrap();
        assert!(sock.pool_count() <= 4, "pool grew past watermark at iteration {}", i);
    }
}

/// `drop_connection` removes the connection from both the hash and the
/// timer heap, so later ticks neither find nor fire it.
#[test]
fn drop_connection_removes_it_from_lookup_and_the_timer_heap() {
    let env = FakeEnv::repeating(0x06);
    let mut sock = Socket::create(env, Config::default(), logger()).unwrap();
    let addr = Address::new(b"127.0.0.1:9").unwrap();

    let cookie = sock.dial(addr, 0).unwrap();
    sock.drop_connection(cookie);
    assert_eq!(sock.connection_count(), 0);
    assert_eq!(sock.state(cookie), None);
    assert_eq!(sock.tick(10_000_000_000).unwrap(), 0);
}
