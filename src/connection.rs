use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

use anyhow::bail;
use bytes::{BufMut, BytesMut};
use rand::RngCore;
use rustc_hash::FxHasher;
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::error::ErrorCode;
use crate::frame::{Channel, FrameHeader, ReliableOpcode, UnreliableOpcode, FRAME_HEADER_LEN};
use crate::reliable::ReliableEngine;

/// Identifies one logical peer session. On the server this is derived from the
/// peer's address/port pair; an address change is a new identity and requires a
/// full reconnect handshake.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub fn from_addr(addr: SocketAddr) -> ConnectionId {
        let mut hasher = FxHasher::default();
        addr.hash(&mut hasher);
        ConnectionId(hasher.finish())
    }
}
impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Role {
    Client,
    Server,
}

/// Lifecycle and data events, drained by the owning endpoint after each tick
/// phase and dispatched synchronously from there.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ConnectionEvent {
    Connected,
    Received(Vec<u8>, Channel),
    Disconnected,
    Error(ErrorCode, String),
}

/// Cookies are minted with rejection sampling - 0 is the designated
/// "unassigned" sentinel and must never be handed out.
pub fn mint_cookie() -> u32 {
    loop {
        let cookie = rand::thread_rng().next_u32();
        if cookie != 0 {
            return cookie;
        }
    }
}

/// Per-peer connection state machine.
///
/// Owns the reliable ARQ engine and the unreliable pass-through path, validates
/// the session cookie on every inbound datagram, and runs the handshake, the
/// keepalive ping and the idle/dead-link supervision. The connection performs
/// no I/O: inbound datagrams are pushed via [`input`](Connection::input), fully
/// framed outbound datagrams and lifecycle events are drained by the owning
/// endpoint.
///
/// Once a connection reaches `Disconnected` it is terminal - reconnecting means
/// creating a new `Connection`; identity and cookie are never reused.
pub struct Connection {
    role: Role,
    state: ConnectionState,
    cookie: u32,
    engine: ReliableEngine,

    timeout: u32,
    ping_interval: u32,
    reliable_limit: usize,
    unreliable_limit: usize,

    last_recv: u32,
    last_ping: u32,

    events: VecDeque<ConnectionEvent>,
    transmits: VecDeque<Vec<u8>>,
}

impl Connection {
    /// Client side: cookie unassigned until the server's handshake answer is
    /// adopted. The initial `Connect` control message is queued right away and
    /// leaves with the first late phase.
    pub fn client(config: &Config) -> Connection {
        let mut connection = Connection::new(config, Role::Client, 0);
        connection.send_control(ReliableOpcode::Connect);
        connection
    }

    /// Server side: a fresh non-zero cookie is minted up front and stamped on
    /// every outbound frame; the peer adopts it from the handshake answer.
    pub fn server(config: &Config) -> Connection {
        Connection::new(config, Role::Server, mint_cookie())
    }

    fn new(config: &Config, role: Role, cookie: u32) -> Connection {
        Connection {
            role,
            state: ConnectionState::Connecting,
            cookie,
            engine: ReliableEngine::new(config),
            timeout: config.timeout.as_millis() as u32,
            ping_interval: config.ping_interval.as_millis() as u32,
            reliable_limit: config.max_payload_size(Channel::Reliable),
            unreliable_limit: config.max_payload_size(Channel::Unreliable),
            last_recv: 0,
            last_ping: 0,
            events: VecDeque::new(),
            transmits: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn cookie(&self) -> u32 {
        self.cookie
    }

    pub fn poll_event(&mut self) -> Option<ConnectionEvent> {
        self.events.pop_front()
    }

    pub fn poll_transmit(&mut self) -> Option<Vec<u8>> {
        self.transmits.pop_front()
    }

    /// Feeds one raw inbound datagram into the connection: strips and validates
    /// the frame header, applies the cookie rules, and routes the payload onto
    /// its channel.
    pub fn input(&mut self, datagram: &[u8], now: u32) {
        if self.state == ConnectionState::Disconnected {
            return;
        }

        let mut buf = datagram;
        let header = match FrameHeader::deser(&mut buf) {
            Ok(header) => header,
            Err(e) => {
                debug!("malformed frame - dropping: {:#}", e);
                return;
            }
        };

        if !self.check_cookie(header.cookie) {
            return;
        }
        self.last_recv = now;

        match header.channel {
            Channel::Reliable => {
                if let Err(e) = self.engine.input(buf, now) {
                    debug!("invalid reliable payload - dropping: {:#}", e);
                }
            }
            Channel::Unreliable => self.input_unreliable(buf),
        }
    }

    /// The cookie rules: adopt on first non-zero sighting, never mutate once
    /// assigned, drop everything that does not match. A carried 0 is only
    /// legitimate while the handshake is still in flight - the peer cannot know
    /// the minted value before the answer arrives.
    fn check_cookie(&mut self, carried: u32) -> bool {
        if carried == self.cookie {
            return true;
        }

        if carried == 0 {
            if self.state == ConnectionState::Connected {
                error!("datagram with cookie 0 after handshake (expected {:08x}) - dropping", self.cookie);
                return false;
            }
            trace!("peer has not adopted cookie {:08x} yet", self.cookie);
            return true;
        }

        if self.cookie == 0 {
            self.cookie = carried;
            debug!("adopted cookie {:08x}", carried);
            return true;
        }

        error!("cookie mismatch: got {:08x}, expected {:08x} - dropping datagram", carried, self.cookie);
        false
    }

    fn input_unreliable(&mut self, payload: &[u8]) {
        let Some((&raw_opcode, rest)) = payload.split_first() else {
            debug!("empty unreliable payload - dropping");
            return;
        };

        match UnreliableOpcode::try_from(raw_opcode) {
            Ok(UnreliableOpcode::Data) => {
                if self.state == ConnectionState::Connected {
                    self.events.push_back(ConnectionEvent::Received(rest.to_vec(), Channel::Unreliable));
                }
                else {
                    debug!("unreliable data before handshake completion - dropping");
                }
            }
            Ok(UnreliableOpcode::Disconnect) => {
                info!("peer disconnected");
                self.teardown();
            }
            Err(_) => debug!("unknown unreliable opcode {} - dropping", raw_opcode),
        }
    }

    /// Early tick phase: delivers reassembled reliable messages and supervises
    /// the link (dead-link, idle timeout, keepalive).
    pub fn early_update(&mut self, now: u32) {
        if self.state == ConnectionState::Disconnected {
            return;
        }

        while let Some(message) = self.engine.receive() {
            self.on_reliable_message(message);
            if self.state == ConnectionState::Disconnected {
                return;
            }
        }

        if self.engine.is_dead() {
            self.fail(ErrorCode::DeadLink, "a reliable segment exhausted its retransmission budget");
            return;
        }
        if now.wrapping_sub(self.last_recv) >= self.timeout {
            self.fail(
                ErrorCode::Timeout,
                &format!("no traffic for {} ms", now.wrapping_sub(self.last_recv)),
            );
            return;
        }

        if now.wrapping_sub(self.last_ping) >= self.ping_interval {
            self.last_ping = now;
            self.send_control(ReliableOpcode::Ping);
        }
    }

    /// Late tick phase: flushes the reliable engine and frames everything it
    /// produced.
    pub fn after_update(&mut self, now: u32) {
        if self.state == ConnectionState::Disconnected {
            return;
        }

        self.engine.update(now);
        while let Some(datagram) = self.engine.poll_transmit() {
            let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + datagram.len());
            FrameHeader { channel: Channel::Reliable, cookie: self.cookie }.ser(&mut buf);
            buf.put_slice(&datagram);
            self.transmits.push_back(buf.to_vec());
        }
    }

    /// Hands an application payload to the selected channel. Fails without any
    /// wire traffic if the payload exceeds the channel's limit or the reliable
    /// send queue is at capacity.
    pub fn send(&mut self, payload: &[u8], channel: Channel) -> anyhow::Result<()> {
        if self.state != ConnectionState::Connected {
            bail!("connection is not established");
        }

        match channel {
            Channel::Reliable => {
                if payload.len() > self.reliable_limit {
                    bail!("payload of {} bytes exceeds the reliable limit of {}", payload.len(), self.reliable_limit);
                }
                let mut message = Vec::with_capacity(1 + payload.len());
                message.push(ReliableOpcode::Data.into());
                message.extend_from_slice(payload);
                self.engine.send(&message)
            }
            Channel::Unreliable => {
                if payload.len() > self.unreliable_limit {
                    bail!("payload of {} bytes exceeds the unreliable limit of {}", payload.len(), self.unreliable_limit);
                }
                self.frame_unreliable(UnreliableOpcode::Data, payload);
                Ok(())
            }
        }
    }

    /// Explicit disconnect: best-effort farewell so the peer learns immediately
    /// instead of waiting for its timeout, then terminal teardown.
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.frame_unreliable(UnreliableOpcode::Disconnect, &[]);
        info!("disconnecting");
        self.teardown();
    }

    /// Tears the connection down with an error report, e.g. on a fatal socket
    /// error detected by the owning endpoint.
    pub fn fail(&mut self, code: ErrorCode, message: &str) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        warn!("connection failed: {:?} - {}", code, message);
        self.events.push_back(ConnectionEvent::Error(code, message.to_owned()));
        self.teardown();
    }

    fn on_reliable_message(&mut self, message: Vec<u8>) {
        let Some((&raw_opcode, payload)) = message.split_first() else {
            debug!("empty reliable message - dropping");
            return;
        };

        match ReliableOpcode::try_from(raw_opcode) {
            Ok(ReliableOpcode::Connect) => self.on_handshake(),
            Ok(ReliableOpcode::Ping) => trace!("keepalive ping"),
            Ok(ReliableOpcode::Data) => {
                if self.state == ConnectionState::Connected {
                    self.events.push_back(ConnectionEvent::Received(payload.to_vec(), Channel::Reliable));
                }
                else {
                    debug!("reliable data before handshake completion - dropping");
                }
            }
            Ok(ReliableOpcode::Disconnect) => {
                info!("peer disconnected");
                self.teardown();
            }
            Err(_) => debug!("unknown reliable opcode {} - dropping", raw_opcode),
        }
    }

    fn on_handshake(&mut self) {
        match self.state {
            ConnectionState::Connecting => {
                if self.role == Role::Server {
                    // the answer travels on frames stamped with the minted cookie
                    self.send_control(ReliableOpcode::Connect);
                }
                self.state = ConnectionState::Connected;
                info!("handshake complete, cookie {:08x}", self.cookie);
                self.events.push_back(ConnectionEvent::Connected);
            }
            ConnectionState::Connected => debug!("duplicate handshake message - ignoring"),
            ConnectionState::Disconnected => {}
        }
    }

    fn send_control(&mut self, opcode: ReliableOpcode) {
        if let Err(e) = self.engine.send(&[opcode.into()]) {
            warn!("failed to queue {:?} control message: {:#}", opcode, e);
        }
    }

    fn frame_unreliable(&mut self, opcode: UnreliableOpcode, payload: &[u8]) {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + 1 + payload.len());
        FrameHeader { channel: Channel::Unreliable, cookie: self.cookie }.ser(&mut buf);
        buf.put_u8(opcode.into());
        buf.put_slice(payload);
        self.transmits.push_back(buf.to_vec());
    }

    /// Terminal: fires the disconnect event exactly once, everything after is a
    /// no-op.
    fn teardown(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.state = ConnectionState::Disconnected;
        self.events.push_back(ConnectionEvent::Disconnected);
    }
}
