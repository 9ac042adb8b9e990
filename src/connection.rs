//! Capability seams between the engine and its collaborators.
//!
//! The engine never opens sockets or reads clocks itself. It is handed a
//! [`ConnectionFactory`] and a [`TimeKeeper`], which makes the whole
//! session logic drivable from tests with in-process fakes. A production
//! transport lives in [`crate::transport`].

use std::sync::Arc;

/// Called by the transport with raw bytes as they arrive from the server.
///
/// May be invoked from any thread; implementations must be cheap and
/// non-blocking (the engine's handler just forwards into its mailbox).
pub type MessageReceivedHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Called by the transport when the server closes the connection.
pub type DisconnectedHandler = Arc<dyn Fn() + Send + Sync>;

/// A bidirectional connection to a chat server.
///
/// The engine wires both handlers before calling [`connect`](Self::connect)
/// and sends complete lines (CRLF included) through
/// [`send`](Self::send).
pub trait Connection: Send {
    /// Install the callback for inbound bytes.
    fn set_message_received(&mut self, handler: MessageReceivedHandler);

    /// Install the callback for the server closing its end.
    fn set_disconnected(&mut self, handler: DisconnectedHandler);

    /// Synchronously establish the connection. Returns `false` on failure.
    fn connect(&mut self) -> bool;

    /// Tear the connection down. Must be safe to call more than once.
    fn disconnect(&mut self);

    /// Queue text for delivery to the server, fire-and-forget.
    fn send(&mut self, text: &str);
}

/// Produces a fresh [`Connection`] for each login attempt.
pub type ConnectionFactory = Box<dyn FnMut() -> Box<dyn Connection> + Send>;

/// Source of monotonic time, in seconds.
///
/// Used only to expire login steps that the server never answered; without
/// one configured, the engine waits indefinitely.
pub trait TimeKeeper: Send + Sync {
    /// The current time in seconds. Only differences are meaningful.
    fn now(&self) -> f64;
}
