//! Recording dispatcher implementations for tests: every notification is
//! appended to a shared log that the test inspects while the endpoint owns the
//! dispatcher.

use std::sync::{Arc, Mutex};

use crate::connection::ConnectionId;
use crate::dispatcher::{ClientDispatcher, ServerDispatcher};
use crate::error::ErrorCode;
use crate::frame::Channel;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ClientNotification {
    Connected,
    Disconnected,
    Received(Vec<u8>, Channel),
    Error(ErrorCode, String),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ServerNotification {
    Connected(ConnectionId),
    Disconnected(ConnectionId),
    Received(ConnectionId, Vec<u8>, Channel),
    Error(ConnectionId, ErrorCode, String),
}

#[derive(Debug, Clone, Default)]
pub struct RecordingClientDispatcher {
    pub notifications: Arc<Mutex<Vec<ClientNotification>>>,
}
impl RecordingClientDispatcher {
    pub fn snapshot(&self) -> Vec<ClientNotification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&ClientNotification) -> bool) -> usize {
        self.snapshot().iter().filter(|n| predicate(n)).count()
    }
}
impl ClientDispatcher for RecordingClientDispatcher {
    fn on_connected(&mut self) {
        self.notifications.lock().unwrap().push(ClientNotification::Connected);
    }

    fn on_disconnected(&mut self) {
        self.notifications.lock().unwrap().push(ClientNotification::Disconnected);
    }

    fn on_received(&mut self, payload: &[u8], channel: Channel) {
        self.notifications.lock().unwrap().push(ClientNotification::Received(payload.to_vec(), channel));
    }

    fn on_error(&mut self, code: ErrorCode, message: &str) {
        self.notifications.lock().unwrap().push(ClientNotification::Error(code, message.to_owned()));
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingServerDispatcher {
    pub notifications: Arc<Mutex<Vec<ServerNotification>>>,
}
impl RecordingServerDispatcher {
    pub fn snapshot(&self) -> Vec<ServerNotification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&ServerNotification) -> bool) -> usize {
        self.snapshot().iter().filter(|n| predicate(n)).count()
    }

    pub fn connected_ids(&self) -> Vec<ConnectionId> {
        self.snapshot().iter()
            .filter_map(|n| match n {
                ServerNotification::Connected(id) => Some(*id),
                _ => None,
            })
            .collect()
    }
}
impl ServerDispatcher for RecordingServerDispatcher {
    fn on_connected(&mut self, connection_id: ConnectionId) {
        self.notifications.lock().unwrap().push(ServerNotification::Connected(connection_id));
    }

    fn on_disconnected(&mut self, connection_id: ConnectionId) {
        self.notifications.lock().unwrap().push(ServerNotification::Disconnected(connection_id));
    }

    fn on_received(&mut self, connection_id: ConnectionId, payload: &[u8], channel: Channel) {
        self.notifications.lock().unwrap().push(ServerNotification::Received(connection_id, payload.to_vec(), channel));
    }

    fn on_error(&mut self, connection_id: ConnectionId, code: ErrorCode, message: &str) {
        self.notifications.lock().unwrap().push(ServerNotification::Error(connection_id, code, message.to_owned()));
    }
}
