#[cfg(test)] use mockall::automock;

use crate::connection::ConnectionId;
use crate::error::ErrorCode;
use crate::frame::Channel;

/// Notifications a [`Client`](crate::client::Client) raises. All callbacks are
/// invoked synchronously from the tick thread, in tick order - exactly one
/// `on_connected` and at most one `on_disconnected` per connection lifetime.
#[cfg_attr(test, automock)]
pub trait ClientDispatcher {
    fn on_connected(&mut self);
    fn on_disconnected(&mut self);
    fn on_received(&mut self, payload: &[u8], channel: Channel);
    fn on_error(&mut self, code: ErrorCode, message: &str) {
        let _ = (code, message);
    }
}

/// Notifications a [`Server`](crate::server::Server) raises, keyed by the
/// connection the event belongs to. Same dispatch guarantees as
/// [`ClientDispatcher`].
#[cfg_attr(test, automock)]
pub trait ServerDispatcher {
    fn on_connected(&mut self, connection_id: ConnectionId);
    fn on_disconnected(&mut self, connection_id: ConnectionId);
    fn on_received(&mut self, connection_id: ConnectionId, payload: &[u8], channel: Channel);
    fn on_error(&mut self, connection_id: ConnectionId, code: ErrorCode, message: &str) {
        let _ = (connection_id, code, message);
    }
}
