//! A connection-oriented reliability layer over raw UDP datagrams, built to
//! relay game-network traffic between peers that cannot reach each other
//! directly.
//!
//! ## Design goals
//!
//! * One shared UDP socket on the server side, fanned out to many independent
//!   per-peer connection state machines; a single outbound socket per client.
//! * Two channels multiplexed over each connection:
//!   * *reliable*: in-order, exactly-once delivery through an ARQ engine with
//!     sequence numbers, acknowledgments, retransmission timers, fast resend
//!     and window probing
//!   * *unreliable*: best-effort pass-through, no retry, no reordering
//!     correction
//! * A cookie-based handshake defends against spoofing and replay of stale
//!   sessions: every post-handshake datagram carries the session cookie, and
//!   datagrams that do not belong to the session are dropped. The cookie is
//!   not encryption - payloads travel in the clear.
//! * The whole protocol path is single-threaded and cooperative. The host
//!   drives it at a bounded rate with a two-phase tick: an early phase that
//!   drains all pending inbound datagrams, and a late phase that flushes
//!   outbound data accumulated since. No call in this path ever blocks, and no
//!   internal timer threads exist - behavior is deterministic given a sequence
//!   of ticks and arrival times.
//! * The one exception is the NAT rendezvous coordinator, which blocks on its
//!   own punch socket on its own task and lets two relayed peers discover each
//!   other's public address via one-shot punch tokens.
//! * Unauthenticated traffic must stay cheap: the server keeps no per-identity
//!   state for peers that have not completed the handshake.
//!
//! ## Frame header
//!
//! Every datagram between two endpoints carries a fixed 5-byte header - all
//! numbers in network byte order (BE):
//!
//! ```ascii
//! 0:  channel (u8):
//!       1  reliable
//!       2  unreliable
//! 1:  cookie (u32): the session cookie, 0 until one has been assigned
//! 5:  channel payload
//! ```
//!
//! Anything shorter than the header is malformed and dropped. The reliable
//! payload is a sequence of ARQ segments (see [`reliable`]); the unreliable
//! payload is an opcode byte followed by application data.
//!
//! ## Control messages
//!
//! Reassembled reliable messages start with an opcode byte:
//!
//! * *connect* - handshake. The very first message of a client connection, sent
//!   with cookie 0; the server answers with the same opcode on frames stamped
//!   with its freshly minted cookie.
//! * *ping* - keepalive, sent periodically so an idle link does not trip the
//!   peer's timeout.
//! * *data* - an application payload.
//! * *disconnect* - orderly goodbye.
//!
//! ## NAT rendezvous
//!
//! A punch probe to the coordinator socket is
//! `[has-token: u8 bool][token: varint length + UTF-8]`, answered with the
//! single byte `1` - always, so the answer doubles as a liveness response. The
//! token announcement pushed to a freshly connected peer over the reliable
//! channel is `[token: varint length + UTF-8][port: u16]`.

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod reliable;
pub mod rendezvous;
pub mod server;
pub mod test_util;
pub mod util;


#[cfg(test)]
mod test {
    use tracing::Level;

    #[ctor::ctor]
    fn init_test_logging() {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .try_init()
            .ok();
    }
}
