//! Trait abstraction of the channels multiplexed over a connection
//!
//! Frame              Connection  Channel
//! ======================================
//! connection.*           H
//! heartbeat              H
//! channel.*              I          H
//! other methods          I          H
//! content header/body    I          H
//! --------------------------------------
//! Key:
//!     H: handled by the endpoint
//!     I: intercepted (the connection examines
//!         the frame, but delegates further
//!         processing to the channel)

use amqp091_types::Frame;

use crate::connection::{Connection, Error};

/// A channel as seen by the [`Connection`] that carries it
///
/// The connection keeps only a weak reference to each registered endpoint;
/// the endpoint's owner decides when it goes away and must unregister it
/// through [`Connection::unregister_channel`], passing the same endpoint.
pub trait ChannelEndpoint {
    /// The channel id assigned by [`Connection::register_channel`]
    fn id(&self) -> u16;

    /// Handles a frame addressed to this channel. Returning an error is a
    /// protocol violation that stops parsing.
    fn on_frame(&self, connection: &Connection, frame: Frame) -> Result<(), Error>;

    /// Starts closing the channel
    fn close(&self);

    /// Detaches the channel from its connection. No further calls may go
    /// through the connection afterwards.
    fn invalidate(&self);

    /// The connection dropped the channel before it was opened, such as when
    /// the server lowered channel-max below the number already registered.
    /// The channel is already unregistered and its queued frames discarded.
    fn reject(&self, connection: &Connection, reason: &str);
}
