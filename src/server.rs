use std::io::ErrorKind;
use std::net::{Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Instant;

use anyhow::bail;
use rustc_hash::{FxHashMap, FxHashSet};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::connection::{Connection, ConnectionEvent, ConnectionId, ConnectionState};
use crate::dispatcher::ServerDispatcher;
use crate::frame::Channel;
use crate::rendezvous::Rendezvous;

struct ServerConnection {
    addr: SocketAddr,
    connection: Connection,
}

/// Server endpoint: one shared inbound socket fanned out to many independent
/// [`Connection`] state machines, keyed by the hash of the sender's
/// address/port pair.
///
/// Unauthenticated peers never leave per-identity state behind: an unknown
/// sender's datagram runs through a throwaway connection within the same early
/// phase, and only a completed cookie handshake admits it into the map. This
/// bounds the cost of a flood of garbage datagrams to one allocation each, with
/// no cross-tick residue.
///
/// Connections that disconnect during a tick are recorded in a pending-removal
/// set and taken out of the map only after the full iteration over all
/// connections - removing them in place would invalidate the iteration.
pub struct Server {
    config: Config,
    dispatcher: Box<dyn ServerDispatcher>,
    socket: Option<UdpSocket>,
    connections: FxHashMap<ConnectionId, ServerConnection>,
    removals: FxHashSet<ConnectionId>,
    rendezvous: Option<Rendezvous>,
    epoch: Instant,
    buffer: Vec<u8>,
}

impl Server {
    pub fn new(config: Config, dispatcher: Box<dyn ServerDispatcher>) -> anyhow::Result<Server> {
        config.validate()?;
        let buffer = vec![0u8; config.mtu];
        Ok(Server {
            config,
            dispatcher,
            socket: None,
            connections: FxHashMap::default(),
            removals: FxHashSet::default(),
            rendezvous: None,
            epoch: Instant::now(),
            buffer,
        })
    }

    fn now(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn max_payload_size(&self, channel: Channel) -> usize {
        self.config.max_payload_size(channel)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Wires a NAT rendezvous coordinator to this server: every newly connected
    /// peer is issued a punch token which is pushed to it over the reliable
    /// channel, and tokens are revoked on disconnect. [`stop`](Server::stop)
    /// shuts the coordinator down along with the main socket.
    pub fn attach_rendezvous(&mut self, rendezvous: Rendezvous) {
        self.rendezvous = Some(rendezvous);
    }

    pub fn learned_endpoint(&self, connection_id: ConnectionId) -> Option<SocketAddr> {
        self.rendezvous.as_ref()?.learned_endpoint(connection_id)
    }

    /// Binds a dual-stack socket on `port`. Falls back to IPv6-only with a
    /// warning where dual-stack is unavailable.
    pub fn start(&mut self, port: u16) -> anyhow::Result<()> {
        if self.socket.is_some() {
            warn!("server is already started");
            bail!("server is already started");
        }

        let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
        if let Err(e) = socket.set_only_v6(false) {
            warn!("dual-stack mode is unavailable, serving IPv6 only: {}", e);
        }
        if let Err(e) = socket.set_send_buffer_size(self.config.send_socket_buffer) {
            warn!("could not apply send buffer size: {}", e);
        }
        if let Err(e) = socket.set_recv_buffer_size(self.config.receive_socket_buffer) {
            warn!("could not apply receive buffer size: {}", e);
        }
        socket.set_nonblocking(true)?;
        socket.bind(&SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)).into())?;

        info!("server listening on port {}", port);
        self.socket = Some(socket.into());
        self.epoch = Instant::now();
        Ok(())
    }

    /// Hands a payload to the selected channel of one connection. An unknown
    /// connection id is a warned no-op; size and backpressure violations fail.
    pub fn send(&mut self, connection_id: ConnectionId, payload: &[u8], channel: Channel) -> anyhow::Result<()> {
        let Some(entry) = self.connections.get_mut(&connection_id) else {
            warn!("send to unknown connection {} - dropping", connection_id);
            return Ok(());
        };
        entry.connection.send(payload, channel)
    }

    /// Disconnects one connection if present, flushing its farewell frame
    /// immediately. The disconnect notification and the removal from the map
    /// follow with the next early phase.
    pub fn disconnect(&mut self, connection_id: ConnectionId) {
        let Some(entry) = self.connections.get_mut(&connection_id) else {
            return;
        };
        entry.connection.disconnect();

        if let Some(socket) = &self.socket {
            while let Some(datagram) = entry.connection.poll_transmit() {
                if let Err(e) = socket.send_to(&datagram, entry.addr) {
                    debug!("farewell to {} failed: {}", connection_id, e);
                }
            }
        }
    }

    /// Closes the socket and abandons all connection state without individual
    /// notifications. Shuts down an attached rendezvous coordinator as well.
    pub fn stop(&mut self) {
        if self.socket.is_none() && self.rendezvous.is_none() {
            return;
        }
        info!("server stopped");
        self.socket = None;
        self.connections.clear();
        self.removals.clear();
        if let Some(rendezvous) = self.rendezvous.take() {
            rendezvous.shutdown();
        }
    }

    /// Early tick phase: drains the socket, demultiplexing each datagram to its
    /// connection (lazily admitting unknown peers that complete a handshake),
    /// then ticks every connection and dispatches its events. Removals recorded
    /// during the tick are applied only after the full iteration.
    pub fn early_update(&mut self) {
        if self.socket.is_none() {
            return;
        }
        let now = self.now();

        loop {
            let Some(socket) = &self.socket else { break };
            match socket.recv_from(&mut self.buffer) {
                Ok((len, from)) => {
                    let connection_id = ConnectionId::from_addr(from);
                    if let Some(entry) = self.connections.get_mut(&connection_id) {
                        entry.connection.input(&self.buffer[..len], now);
                    }
                    else {
                        let datagram = &self.buffer[..len];
                        let mut connection = Connection::server(&self.config);
                        connection.input(datagram, now);
                        connection.early_update(now);

                        let mut admitted = false;
                        while let Some(event) = connection.poll_event() {
                            match event {
                                ConnectionEvent::Connected => {
                                    admitted = true;
                                    info!("connection {} established from {:?}", connection_id, from);
                                    self.dispatcher.on_connected(connection_id);
                                    if let Some(rendezvous) = &self.rendezvous {
                                        let token = rendezvous.issue_token(connection_id);
                                        let announcement = rendezvous.announcement(&token);
                                        if let Err(e) = connection.send(&announcement, Channel::Reliable) {
                                            warn!("failed to queue punch token for {}: {:#}", connection_id, e);
                                        }
                                    }
                                }
                                ConnectionEvent::Received(payload, channel) => {
                                    if admitted {
                                        self.dispatcher.on_received(connection_id, &payload, channel);
                                    }
                                }
                                _ => {}
                            }
                        }

                        if admitted {
                            self.connections.insert(connection_id, ServerConnection { addr: from, connection });
                        }
                        else {
                            debug!("datagram from unknown peer {:?} did not complete a handshake - discarding", from);
                        }
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("server receive failed: {}", e);
                    break;
                }
            }
        }

        for (connection_id, entry) in self.connections.iter_mut() {
            entry.connection.early_update(now);
            while let Some(event) = entry.connection.poll_event() {
                match event {
                    ConnectionEvent::Connected => {
                        debug!("unexpected handshake event for established connection {}", connection_id);
                    }
                    ConnectionEvent::Received(payload, channel) => {
                        self.dispatcher.on_received(*connection_id, &payload, channel);
                    }
                    ConnectionEvent::Disconnected => {
                        info!("connection {} closed", connection_id);
                        self.removals.insert(*connection_id);
                        if let Some(rendezvous) = &self.rendezvous {
                            rendezvous.revoke(*connection_id);
                        }
                        self.dispatcher.on_disconnected(*connection_id);
                    }
                    ConnectionEvent::Error(code, message) => {
                        self.dispatcher.on_error(*connection_id, code, &message);
                    }
                }
            }
        }

        for connection_id in self.removals.drain() {
            self.connections.remove(&connection_id);
        }
    }

    /// Late tick phase: flushes every connection's reliable engine and sends
    /// everything that accumulated since the early phase.
    pub fn after_update(&mut self) {
        let now = self.now();
        let Some(socket) = &self.socket else {
            return;
        };

        for entry in self.connections.values_mut() {
            entry.connection.after_update(now);
            while let Some(datagram) = entry.connection.poll_transmit() {
                match socket.send_to(&datagram, entry.addr) {
                    Ok(_) => {}
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {
                        debug!("socket send buffer is full - dropping datagram");
                    }
                    Err(e) => error!("server send failed: {}", e),
                }
            }
        }
    }
}
