use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use bytes::{BufMut, BytesMut};
use bytes_varint::try_get_fixed::TryGetFixedSupport;
use rustc_hash::FxHashMap;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::connection::ConnectionId;
use crate::util::{put_string, try_get_string};

/// fixed acknowledgment, echoed to every prober as a liveness response
const ACK: [u8; 1] = [1];

#[derive(Default)]
struct TokenTable {
    by_token: FxHashMap<String, ConnectionId>,
    by_connection: FxHashMap<ConnectionId, String>,
}

#[derive(Default)]
struct Shared {
    tokens: Mutex<TokenTable>,
    learned: Mutex<FxHashMap<ConnectionId, SocketAddr>>,
}

/// NAT rendezvous coordinator.
///
/// Listens on its own UDP socket, on its own task - the receive call blocks
/// there, isolated from the main tick thread. A relayed peer that received a
/// punch token over the reliable channel probes this socket from its real
/// public endpoint; the coordinator resolves the token to a connection id,
/// records the probe's source address as that connection's learned endpoint,
/// consumes the token, and echoes a one-byte acknowledgment. The ack is sent
/// even for unrecognized tokens, doubling as a liveness response.
///
/// Per-datagram faults are swallowed; the loop only terminates on
/// [`shutdown`](Rendezvous::shutdown).
pub struct Rendezvous {
    port: u16,
    shared: Arc<Shared>,
    stop: Arc<Notify>,
    task: JoinHandle<()>,
}

impl Rendezvous {
    /// Binds the punch socket and spawns the receive loop. Must be called from
    /// within a tokio runtime; the protocol tick path itself stays
    /// runtime-free.
    pub async fn bind(port: u16) -> anyhow::Result<Rendezvous> {
        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await?;
        let port = socket.local_addr()?.port();
        let shared = Arc::new(Shared::default());
        let stop = Arc::new(Notify::new());
        let task = tokio::spawn(recv_loop(socket, shared.clone(), stop.clone()));

        info!("rendezvous coordinator listening on port {}", port);
        Ok(Rendezvous { port, shared, stop, task })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Mints a fresh opaque token for a newly authenticated connection. At most
    /// one token is live per connection id - an earlier one is superseded, and
    /// a stale learned endpoint from a previous session is cleared.
    pub fn issue_token(&self, connection_id: ConnectionId) -> String {
        let token = Uuid::new_v4().to_string();

        let mut tokens = self.shared.tokens.lock().unwrap();
        if let Some(old) = tokens.by_connection.insert(connection_id, token.clone()) {
            tokens.by_token.remove(&old);
        }
        tokens.by_token.insert(token.clone(), connection_id);
        drop(tokens);

        self.shared.learned.lock().unwrap().remove(&connection_id);
        token
    }

    /// Removes the token and the learned endpoint of a connection on teardown.
    pub fn revoke(&self, connection_id: ConnectionId) {
        let mut tokens = self.shared.tokens.lock().unwrap();
        if let Some(token) = tokens.by_connection.remove(&connection_id) {
            tokens.by_token.remove(&token);
        }
        drop(tokens);

        self.shared.learned.lock().unwrap().remove(&connection_id);
    }

    /// The peer's externally observed address, once its punch probe has
    /// round-tripped.
    pub fn learned_endpoint(&self, connection_id: ConnectionId) -> Option<SocketAddr> {
        self.shared.learned.lock().unwrap().get(&connection_id).copied()
    }

    /// The message pushed to a newly connected peer over the reliable channel:
    /// the token plus the coordinator's listening port.
    pub fn announcement(&self, token: &str) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_string(&mut buf, token);
        buf.put_u16(self.port);
        buf.to_vec()
    }

    /// Signals the receive loop to terminate and closes the punch socket.
    pub fn shutdown(self) {
        self.stop.notify_one();
        self.task.abort();
        info!("rendezvous coordinator shut down");
    }
}

/// Peer-side helper: the probe datagram carrying a received token to the
/// coordinator socket.
pub fn probe(token: &str) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u8(1);
    put_string(&mut buf, token);
    buf.to_vec()
}

/// Peer-side helper: splits a token announcement back into token and
/// coordinator port.
pub fn parse_announcement(buf: &[u8]) -> anyhow::Result<(String, u16)> {
    let mut buf = buf;
    let token = try_get_string(&mut buf)?;
    let port = buf.try_get_u16()?;
    Ok((token, port))
}

async fn recv_loop(socket: UdpSocket, shared: Arc<Shared>, stop: Arc<Notify>) {
    let mut buf = [0u8; 512];
    loop {
        let (len, from) = tokio::select! {
            _ = stop.notified() => return,
            received = socket.recv_from(&mut buf) => match received {
                Ok(x) => x,
                Err(e) => {
                    debug!("rendezvous socket error: {}", e);
                    continue;
                }
            }
        };

        if let Err(e) = handle_probe(&shared, &buf[..len], from) {
            debug!("invalid punch probe from {:?}: {:#}", from, e);
        }
        // unconditional - the ack doubles as a liveness response for the prober
        if let Err(e) = socket.send_to(&ACK, from).await {
            debug!("rendezvous ack to {:?} failed: {}", from, e);
        }
    }
}

fn handle_probe(shared: &Shared, datagram: &[u8], from: SocketAddr) -> anyhow::Result<()> {
    let mut buf = datagram;
    let has_token = buf.try_get_u8()? != 0;
    if !has_token {
        return Ok(());
    }
    let token = try_get_string(&mut buf)?;

    let connection_id = {
        let mut tokens = shared.tokens.lock().unwrap();
        match tokens.by_token.remove(&token) {
            Some(connection_id) => {
                tokens.by_connection.remove(&connection_id);
                connection_id
            }
            None => {
                debug!("punch probe with unknown token from {:?}", from);
                return Ok(());
            }
        }
    };

    shared.learned.lock().unwrap().insert(connection_id, from);
    info!("learned public endpoint {:?} for connection {}", from, connection_id);
    Ok(())
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    async fn probe_and_await_ack(socket: &UdpSocket, port: u16, datagram: &[u8]) {
        socket.send_to(datagram, (Ipv4Addr::LOCALHOST, port)).await.unwrap();
        let mut buf = [0u8; 16];
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
            .await
            .expect("no ack within timeout")
            .unwrap();
        assert_eq!(&buf[..len], &ACK);
    }

    #[tokio::test]
    async fn test_probe_records_learned_endpoint_and_consumes_token() {
        let rendezvous = Rendezvous::bind(0).await.unwrap();
        let connection_id = ConnectionId(7);
        let token = rendezvous.issue_token(connection_id);

        let prober = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        probe_and_await_ack(&prober, rendezvous.port(), &probe(&token)).await;

        assert_eq!(
            rendezvous.learned_endpoint(connection_id),
            Some(prober.local_addr().unwrap())
        );

        // the token was consumed: a duplicate probe is still acknowledged but
        // does not re-record
        let second = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        probe_and_await_ack(&second, rendezvous.port(), &probe(&token)).await;
        assert_eq!(
            rendezvous.learned_endpoint(connection_id),
            Some(prober.local_addr().unwrap())
        );

        rendezvous.shutdown();
    }

    #[tokio::test]
    async fn test_unknown_token_and_malformed_probes_are_acknowledged() {
        let rendezvous = Rendezvous::bind(0).await.unwrap();
        let prober = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();

        probe_and_await_ack(&prober, rendezvous.port(), &probe("no such token")).await;
        probe_and_await_ack(&prober, rendezvous.port(), &[0]).await;
        probe_and_await_ack(&prober, rendezvous.port(), b"\x01\x30").await;

        assert_eq!(rendezvous.learned_endpoint(ConnectionId(7)), None);
        rendezvous.shutdown();
    }

    #[tokio::test]
    async fn test_one_live_token_per_connection() {
        let rendezvous = Rendezvous::bind(0).await.unwrap();
        let connection_id = ConnectionId(3);

        let stale = rendezvous.issue_token(connection_id);
        let fresh = rendezvous.issue_token(connection_id);
        assert_ne!(stale, fresh);

        let prober = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        probe_and_await_ack(&prober, rendezvous.port(), &probe(&stale)).await;
        assert_eq!(rendezvous.learned_endpoint(connection_id), None);

        probe_and_await_ack(&prober, rendezvous.port(), &probe(&fresh)).await;
        assert_eq!(
            rendezvous.learned_endpoint(connection_id),
            Some(prober.local_addr().unwrap())
        );

        rendezvous.shutdown();
    }

    #[tokio::test]
    async fn test_revoke_clears_token_and_learned_endpoint() {
        let rendezvous = Rendezvous::bind(0).await.unwrap();
        let connection_id = ConnectionId(11);
        let token = rendezvous.issue_token(connection_id);

        let prober = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        probe_and_await_ack(&prober, rendezvous.port(), &probe(&token)).await;
        assert!(rendezvous.learned_endpoint(connection_id).is_some());

        rendezvous.revoke(connection_id);
        assert_eq!(rendezvous.learned_endpoint(connection_id), None);

        rendezvous.shutdown();
    }

    #[test]
    fn test_announcement_round_trip() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "the-token");
        buf.put_u16(20974);

        let (token, port) = parse_announcement(buf.as_ref()).unwrap();
        assert_eq!(token, "the-token");
        assert_eq!(port, 20974);
    }

    #[test]
    fn test_probe_wire_format() {
        assert_eq!(probe("ab"), vec![1, 2, b'a', b'b']);
    }
}
