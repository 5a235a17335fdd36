//! Callbacks raised by a connection

use super::Connection;

/// Receives the output and lifecycle events of a [`Connection`]
///
/// All methods take `&self`; implementations that record state use interior
/// mutability. Every callback may call back into the connection, including
/// [`Connection::destroy`].
pub trait ConnectionHandler {
    /// Bytes that must be written to the transport, in order and in full.
    /// The connection does no buffering of its own once it hands bytes here.
    fn on_data(&self, connection: &Connection, data: &[u8]);

    /// Negotiation completed and the connection is usable
    fn on_connected(&self, _connection: &Connection) {}

    /// A protocol violation was detected or the server closed the connection
    /// with an error. The owner should tear down the transport.
    fn on_error(&self, _connection: &Connection, _message: &str) {}

    /// The connection reached the closed state
    fn on_closed(&self, _connection: &Connection) {}

    /// Chooses the heartbeat interval in seconds during tuning. `interval` is
    /// the value agreed from the server's proposal and the configured one.
    fn on_negotiate(&self, _connection: &Connection, interval: u16) -> u16 {
        interval
    }

    /// The server stopped accepting published content
    fn on_blocked(&self, _connection: &Connection, _reason: &str) {}

    /// The server accepts published content again
    fn on_unblocked(&self, _connection: &Connection) {}
}
