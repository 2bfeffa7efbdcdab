use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Instant;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::connection::{Connection, ConnectionEvent, ConnectionState};
use crate::dispatcher::ClientDispatcher;
use crate::error::ErrorCode;
use crate::frame::Channel;

/// Client endpoint: one outbound UDP socket bound to a single remote peer,
/// owning exactly one [`Connection`].
///
/// The host drives it at a bounded rate with the two-phase tick -
/// [`early_update`](Client::early_update) drains and processes all pending
/// inbound datagrams, [`after_update`](Client::after_update) flushes the
/// reliable engine. Neither phase ever blocks.
pub struct Client {
    config: Config,
    dispatcher: Box<dyn ClientDispatcher>,
    socket: Option<UdpSocket>,
    connection: Option<Connection>,
    epoch: Instant,
    buffer: Vec<u8>,
}

impl Client {
    pub fn new(config: Config, dispatcher: Box<dyn ClientDispatcher>) -> anyhow::Result<Client> {
        config.validate()?;
        let buffer = vec![0u8; config.mtu];
        Ok(Client {
            config,
            dispatcher,
            socket: None,
            connection: None,
            epoch: Instant::now(),
            buffer,
        })
    }

    fn now(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }

    pub fn is_connected(&self) -> bool {
        matches!(&self.connection, Some(c) if c.state() == ConnectionState::Connected)
    }

    pub fn max_payload_size(&self, channel: Channel) -> usize {
        self.config.max_payload_size(channel)
    }

    /// Resolves `address` and opens the connection. A no-op (with a warning) if
    /// a connection attempt is already underway; on resolution failure the
    /// disconnect notification fires and the call fails.
    pub fn connect(&mut self, address: &str, port: u16) -> anyhow::Result<()> {
        if let Some(connection) = &self.connection {
            if connection.state() != ConnectionState::Disconnected {
                warn!("client is already connected");
                return Ok(());
            }
        }

        let remote = match Self::resolve(address, port) {
            Ok(remote) => remote,
            Err(e) => {
                error!("failed to resolve host address {}: {:#}", address, e);
                self.dispatcher.on_error(ErrorCode::Resolution, &format!("failed to resolve {}", address));
                self.dispatcher.on_disconnected();
                return Err(e);
            }
        };

        let socket = self.open_socket(remote)?;
        info!("connecting to {:?}", remote);
        self.socket = Some(socket);
        self.epoch = Instant::now();
        self.connection = Some(Connection::client(&self.config));
        Ok(())
    }

    fn resolve(address: &str, port: u16) -> anyhow::Result<SocketAddr> {
        let mut addrs = (address, port).to_socket_addrs()?;
        addrs.next()
            .ok_or_else(|| anyhow::anyhow!("no address found for {}", address))
    }

    fn open_socket(&self, remote: SocketAddr) -> anyhow::Result<UdpSocket> {
        let socket = Socket::new(Domain::for_address(remote), Type::DGRAM, Some(Protocol::UDP))?;
        if let Err(e) = socket.set_send_buffer_size(self.config.send_socket_buffer) {
            warn!("could not apply send buffer size: {}", e);
        }
        if let Err(e) = socket.set_recv_buffer_size(self.config.receive_socket_buffer) {
            warn!("could not apply receive buffer size: {}", e);
        }
        socket.connect(&remote.into())?;
        socket.set_nonblocking(true)?;
        Ok(socket.into())
    }

    /// Hands a payload to the selected channel. Not connected is a warned
    /// no-op; size and backpressure violations fail.
    pub fn send(&mut self, payload: &[u8], channel: Channel) -> anyhow::Result<()> {
        match &mut self.connection {
            Some(connection) if connection.state() == ConnectionState::Connected => {
                connection.send(payload, channel)
            }
            _ => {
                warn!("client is not connected - dropping send");
                Ok(())
            }
        }
    }

    /// Closes the connection, flushing the farewell frame, and raises the
    /// disconnect notification exactly once.
    pub fn disconnect(&mut self) {
        if let Some(connection) = &mut self.connection {
            connection.disconnect();
        }
        self.flush_transmits();
        self.drain_events();
    }

    /// Early tick phase: non-blocking reads until the socket has no more
    /// pending datagrams, each fed into the connection, followed by the
    /// connection's own early work. A no-op while disconnected.
    pub fn early_update(&mut self) {
        let now = self.now();
        {
            let (Some(socket), Some(connection)) = (&self.socket, &mut self.connection) else {
                return;
            };
            if connection.state() == ConnectionState::Disconnected {
                return;
            }

            loop {
                match socket.recv(&mut self.buffer) {
                    Ok(len) => connection.input(&self.buffer[..len], now),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) => {
                        error!("client receive failed: {}", e);
                        connection.fail(ErrorCode::SocketFatal, &format!("receive failed: {}", e));
                        break;
                    }
                }
            }

            connection.early_update(now);
        }
        self.drain_events();
    }

    /// Late tick phase: flushes the reliable engine and sends everything that
    /// accumulated since the early phase. A no-op while disconnected.
    pub fn after_update(&mut self) {
        let now = self.now();
        let Some(connection) = &mut self.connection else {
            return;
        };
        if connection.state() == ConnectionState::Disconnected {
            return;
        }

        connection.after_update(now);
        self.flush_transmits();
    }

    fn flush_transmits(&mut self) {
        let (Some(socket), Some(connection)) = (&self.socket, &mut self.connection) else {
            return;
        };
        while let Some(datagram) = connection.poll_transmit() {
            match socket.send(&datagram) {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    debug!("socket send buffer is full - dropping datagram");
                }
                Err(e) => error!("client send failed: {}", e),
            }
        }
    }

    fn drain_events(&mut self) {
        let Some(connection) = &mut self.connection else {
            return;
        };
        while let Some(event) = connection.poll_event() {
            match event {
                ConnectionEvent::Connected => self.dispatcher.on_connected(),
                ConnectionEvent::Received(payload, channel) => self.dispatcher.on_received(&payload, channel),
                ConnectionEvent::Disconnected => {
                    self.dispatcher.on_disconnected();
                    self.socket = None;
                }
                ConnectionEvent::Error(code, message) => self.dispatcher.on_error(code, &message),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::test_util::{ClientNotification, RecordingClientDispatcher};

    use super::*;

    #[test]
    fn test_resolution_failure_fires_disconnect_notification() {
        let dispatcher = RecordingClientDispatcher::default();
        let mut client = Client::new(Config::default(), Box::new(dispatcher.clone())).unwrap();

        assert!(client.connect("host.invalid.example", 20974).is_err());
        assert_eq!(dispatcher.count(|n| matches!(n, ClientNotification::Disconnected)), 1);
        assert_eq!(
            dispatcher.count(|n| matches!(n, ClientNotification::Error(ErrorCode::Resolution, _))),
            1
        );
    }

    #[test]
    fn test_send_without_connection_is_a_warned_no_op() {
        // no expectations: any notification would fail the test
        let dispatcher = crate::dispatcher::MockClientDispatcher::new();
        let mut client = Client::new(Config::default(), Box::new(dispatcher)).unwrap();

        assert!(client.send(b"nobody is listening", Channel::Reliable).is_ok());
    }

    #[test]
    fn test_updates_without_connection_are_no_ops() {
        let dispatcher = crate::dispatcher::MockClientDispatcher::new();
        let mut client = Client::new(Config::default(), Box::new(dispatcher)).unwrap();

        client.early_update();
        client.after_update();
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = Config { mtu: 10, ..Config::default() };
        assert!(Client::new(config, Box::new(RecordingClientDispatcher::default())).is_err());
    }
}
