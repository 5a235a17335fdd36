//! Implements the AMQP 0-9-1 connection
//!
//! ```text
//! NegotiatingProtocol --start--> NegotiatingTuning --open-ok--> Connected
//!                                                                  |
//!                                   Closed <--close-ok-- Closing <-+ close()
//! ```
//!
//! The peer's `connection.close`, a protocol violation, or
//! [`Connection::transport_closed`] move any state to `Closed`.

use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use amqp091_types::{
    constants::REPLY_SUCCESS,
    frame::{decode, ReceivedFrame},
    method::{Close, ConnectionMethod, Method},
    Frame, FrameBody,
};

use crate::{
    endpoint::ChannelEndpoint,
    login::Login,
    monitor::{Monitor, Watchable},
};

mod builder;
pub use builder::*;

mod error;
pub use error::*;

mod handler;
pub use handler::*;

mod negotiation;
mod outbound;
mod registry;

use self::{
    outbound::{OutBuffer, OutboundQueue},
    registry::ChannelRegistry,
};

/// Default max-frame-size proposed to the server
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 128 * 1024;

/// Reply text of the `connection.close` sent by [`Connection::close`]
pub const CLOSE_REPLY_TEXT: &str = "shutdown";

/// Reason given to channels dropped because the server lowered channel-max
/// below the number of channels opened during negotiation
pub const CHANNEL_MAX_EXCEEDED: &str = "channel-max exceeded";

/// Connection states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Protocol header sent, waiting for `connection.start`
    NegotiatingProtocol,

    /// `connection.start-ok` sent, tuning and opening the virtual host
    NegotiatingTuning,

    /// `connection.open-ok` received
    Connected,

    /// `connection.close` sent, waiting for `connection.close-ok`
    Closing,

    /// No further frames are parsed or sent
    Closed,
}

struct ConnectionInner {
    handler: Rc<dyn ConnectionHandler>,
    options: ConnectionOptions,

    state: Cell<ConnectionState>,
    // close requested locally, possibly deferred until negotiation completes
    closed: Cell<bool>,

    // negotiated
    max_frame_size: Cell<u32>,
    heartbeat: Cell<u16>,

    registry: RefCell<ChannelRegistry>,
    queue: RefCell<OutboundQueue>,
    watchable: Watchable,
}

/// An AMQP 0-9-1 connection
///
/// `Connection` is a cheap handle; clones refer to the same connection.
/// Dropping the last handle destroys the connection, which is the same as
/// calling [`Connection::destroy`].
///
/// # Default configuration
///
/// | Field | Default Value |
/// |-------|---------------|
/// |`login`| `guest` / `guest` |
/// |`virtual_host`| `/` |
/// |`channel_max`| 0 (accept the server's) |
/// |`max_frame_size`| [`DEFAULT_MAX_FRAME_SIZE`] |
/// |`heartbeat`| 0 (accept the server's) |
///
/// No `RefCell` borrow is held while a handler callback runs, so callbacks
/// are free to call any method of the connection.
#[derive(Clone)]
pub struct Connection {
    inner: Rc<ConnectionInner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.inner.state.get())
            .field("closed", &self.inner.closed.get())
            .field("virtual_host", &self.inner.options.virtual_host)
            .field("max_frame_size", &self.inner.max_frame_size.get())
            .field("heartbeat", &self.inner.heartbeat.get())
            .field("registry", &self.inner.registry)
            .field("queue", &self.inner.queue)
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if Rc::strong_count(&self.inner) == 1 {
            self.destroy();
        }
    }
}

/// A non-owning reference to a [`Connection`]
#[derive(Debug, Clone)]
pub struct WeakConnection {
    inner: Weak<ConnectionInner>,
}

impl WeakConnection {
    /// Returns the connection if it still exists and was not destroyed
    pub fn upgrade(&self) -> Option<Connection> {
        let inner = self.inner.upgrade()?;
        match inner.watchable.is_alive() {
            true => Some(Connection { inner }),
            false => None,
        }
    }
}

/* ------------------------------- Public API ------------------------------- */
impl Connection {
    /// Creates a Builder for [`Connection`]
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Creates a connection and starts negotiation by handing the protocol
    /// header to `handler`
    pub fn new(
        handler: Rc<dyn ConnectionHandler>,
        login: Login,
        virtual_host: impl Into<String>,
    ) -> Self {
        Self::builder()
            .login(login)
            .virtual_host(virtual_host)
            .connect(handler)
    }

    pub(crate) fn with_options(
        handler: Rc<dyn ConnectionHandler>,
        options: ConnectionOptions,
    ) -> Self {
        let mut registry = ChannelRegistry::default();
        registry.set_channel_max(options.channel_max);

        let inner = ConnectionInner {
            handler,
            state: Cell::new(ConnectionState::NegotiatingProtocol),
            closed: Cell::new(false),
            max_frame_size: Cell::new(options.max_frame_size),
            heartbeat: Cell::new(options.heartbeat),
            registry: RefCell::new(registry),
            queue: RefCell::new(OutboundQueue::default()),
            watchable: Watchable::new(),
            options,
        };
        let connection = Self {
            inner: Rc::new(inner),
        };

        if let Err(_err) = connection.send(Frame::protocol_header()) {
            #[cfg(feature = "tracing")]
            tracing::error!(err = ?_err, "Failed to send protocol header");
            #[cfg(feature = "log")]
            log::error!("Failed to send protocol header: {:?}", _err);
        }
        connection
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    /// Whether close was requested locally
    pub fn is_closed_requested(&self) -> bool {
        self.inner.closed.get()
    }

    /// Whether the connection was not destroyed yet
    pub fn is_alive(&self) -> bool {
        self.inner.watchable.is_alive()
    }

    /// Creates a monitor that turns invalid once the connection is destroyed
    pub fn monitor(&self) -> Monitor {
        self.inner.watchable.monitor()
    }

    /// Creates a non-owning reference
    pub fn downgrade(&self) -> WeakConnection {
        WeakConnection {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Credentials used during negotiation
    pub fn login(&self) -> &Login {
        &self.inner.options.login
    }

    /// Virtual host opened during negotiation
    pub fn virtual_host(&self) -> &str {
        &self.inner.options.virtual_host
    }

    /// Limit on concurrently registered channels, 0 meaning no limit
    pub fn channel_max(&self) -> u16 {
        self.inner.registry.borrow().channel_max()
    }

    /// Largest frame accepted from the peer, 0 meaning no limit
    pub fn max_frame_size(&self) -> u32 {
        self.inner.max_frame_size.get()
    }

    /// Heartbeat interval in seconds, 0 if heartbeats are disabled
    pub fn heartbeat(&self) -> u16 {
        self.inner.heartbeat.get()
    }

    /// Number of registered channels
    pub fn channels(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    /// Number of frames held back until negotiation completes
    pub fn pending_frames(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Parses received bytes and processes every complete frame in them
    ///
    /// Returns the number of bytes consumed. Bytes of a trailing incomplete
    /// frame are not consumed; the caller must present them again, followed
    /// by newly received bytes, on the next call. Nothing is buffered here.
    ///
    /// A protocol violation stops parsing at the start of the offending frame,
    /// is reported through [`ConnectionHandler::on_error`] and closes the
    /// connection.
    pub fn parse(&self, buffer: &[u8]) -> usize {
        if self.state() == ConnectionState::Closed {
            return 0;
        }

        let monitor = self.monitor();
        let mut processed = 0;

        while processed < buffer.len()
            && monitor.is_valid()
            && self.state() != ConnectionState::Closed
        {
            let max_frame_size = self.inner.max_frame_size.get();
            match decode(&buffer[processed..], max_frame_size) {
                Ok(Some(ReceivedFrame { frame, total_size })) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(channel = frame.channel, size = total_size, "RECV");
                    #[cfg(feature = "log")]
                    log::trace!("RECV channel {} size {}", frame.channel, total_size);

                    if let Err(err) = self.dispatch(frame) {
                        self.report_error(&monitor, err);
                        return processed;
                    }
                    processed += total_size;
                }
                Ok(None) => return processed,
                Err(err) => {
                    self.report_error(&monitor, err.into());
                    return processed;
                }
            }
        }

        processed
    }

    /// Sends a frame
    ///
    /// The frame is handed to [`ConnectionHandler::on_data`] right away if
    /// the connection is established and nothing is queued, or if the frame is
    /// part of negotiation. Otherwise it is queued until negotiation
    /// completes.
    pub fn send(&self, frame: Frame) -> Result<(), SendError> {
        match self.state() {
            ConnectionState::Closing | ConnectionState::Closed => return Err(SendError::Closed),
            _ => {}
        }

        let bytes = OutBuffer::from_frame(&frame)?;
        let direct = (self.state() == ConnectionState::Connected
            && self.inner.queue.borrow().is_empty())
            || frame.is_part_of_handshake();

        match direct {
            true => {
                #[cfg(feature = "tracing")]
                tracing::trace!(channel = frame.channel, size = bytes.len(), "SEND");
                #[cfg(feature = "log")]
                log::trace!("SEND channel {} size {}", frame.channel, bytes.len());

                self.inner.handler.on_data(self, &bytes);
            }
            false => {
                #[cfg(feature = "tracing")]
                tracing::trace!(channel = frame.channel, size = bytes.len(), "QUEUE");
                #[cfg(feature = "log")]
                log::trace!("QUEUE channel {} size {}", frame.channel, bytes.len());

                self.inner.queue.borrow_mut().push(frame.channel, bytes);
            }
        }
        Ok(())
    }

    /// Sends a heartbeat frame. Timing heartbeats is up to the owner.
    pub fn send_heartbeat(&self) -> Result<(), SendError> {
        self.send(Frame::heartbeat())
    }

    /// Closes the connection
    ///
    /// Closes every channel and sends `connection.close`. When called during
    /// negotiation the close is deferred until negotiation completes. The
    /// connection reaches [`ConnectionState::Closed`] once the peer confirms.
    pub fn close(&self) -> Result<(), CloseError> {
        if self.inner.closed.get() || self.state() == ConnectionState::Closed {
            return Err(CloseError::AlreadyClosed);
        }
        self.inner.closed.set(true);

        match self.state() {
            ConnectionState::NegotiatingProtocol | ConnectionState::NegotiatingTuning => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Close deferred until negotiation completes");
                #[cfg(feature = "log")]
                log::debug!("Close deferred until negotiation completes");
            }
            ConnectionState::Connected => {
                self.send_close();
            }
            ConnectionState::Closing | ConnectionState::Closed => {}
        }
        Ok(())
    }

    /// Destroys the connection
    ///
    /// Attempts a close, detaches every registered channel and turns every
    /// [`Monitor`] invalid. Afterwards the connection produces no side
    /// effects. Calling it again has no effect.
    pub fn destroy(&self) {
        if !self.inner.watchable.is_alive() {
            return;
        }

        let _ = self.close();
        self.invalidate_channels();
        self.set_state(ConnectionState::Closed);
        self.inner.watchable.invalidate();
    }

    /// Reports that the transport terminated
    pub fn transport_closed(&self) {
        if self.state() == ConnectionState::Closed {
            return;
        }

        let monitor = self.monitor();
        self.set_closed();
        if monitor.is_valid() {
            self.inner.handler.on_closed(self);
        }
    }

    /// Registers a channel and returns the id assigned to it
    pub fn register_channel(
        &self,
        channel: Weak<dyn ChannelEndpoint>,
    ) -> Result<u16, AllocChannelError> {
        match self.state() {
            ConnectionState::Closing | ConnectionState::Closed => {
                Err(AllocChannelError::IllegalState)
            }
            _ => self.inner.registry.borrow_mut().register(channel),
        }
    }

    /// Unregisters a channel
    ///
    /// Nothing happens unless `channel` is the endpoint registered under its
    /// id, so a stale or foreign endpoint cannot release another channel's
    /// id.
    pub fn unregister_channel(&self, channel: &dyn ChannelEndpoint) {
        self.inner.registry.borrow_mut().release(channel);
    }
}

/* ------------------------------ Private impls ----------------------------- */
impl Connection {
    fn set_state(&self, state: ConnectionState) {
        #[cfg(feature = "tracing")]
        tracing::debug!(from = ?self.inner.state.get(), to = ?state, "Connection state");
        #[cfg(feature = "log")]
        log::debug!("Connection state {:?} -> {:?}", self.inner.state.get(), state);

        self.inner.state.set(state);
    }

    /// Negotiation completed
    pub(crate) fn set_connected(&self) {
        self.set_state(ConnectionState::Connected);

        // a close requested during negotiation is carried out now, its frames
        // go behind whatever is queued
        if self.inner.closed.get() && !self.send_close() {
            return;
        }

        let monitor = self.monitor();
        self.inner.handler.on_connected(self);
        if !monitor.is_valid() {
            return;
        }

        loop {
            let next = self.inner.queue.borrow_mut().pop();
            let Some(bytes) = next else { break };

            self.inner.handler.on_data(self, &bytes);
            if !monitor.is_valid() {
                return;
            }
        }
    }

    /// Returns whether the connection still exists
    fn send_close(&self) -> bool {
        let monitor = self.monitor();

        let channels = self.inner.registry.borrow().snapshot();
        for channel in channels {
            channel.close();
            if !monitor.is_valid() {
                return false;
            }
        }

        let close = Close::new(REPLY_SUCCESS, CLOSE_REPLY_TEXT);
        if let Err(_err) = self.send(Frame::method(0, ConnectionMethod::Close(close))) {
            #[cfg(feature = "tracing")]
            tracing::error!(err = ?_err, "Failed to send close");
            #[cfg(feature = "log")]
            log::error!("Failed to send close: {:?}", _err);
        }
        if !monitor.is_valid() {
            return false;
        }

        self.set_state(ConnectionState::Closing);
        true
    }

    pub(crate) fn set_closed(&self) {
        self.set_state(ConnectionState::Closed);
        self.invalidate_channels();
    }

    fn invalidate_channels(&self) {
        let channels = self.inner.registry.borrow_mut().clear();
        for channel in channels {
            channel.invalidate();
        }
    }

    fn report_error(&self, monitor: &Monitor, err: Error) {
        #[cfg(feature = "tracing")]
        tracing::error!(?err, "Protocol violation");
        #[cfg(feature = "log")]
        log::error!("Protocol violation: {:?}", err);

        if !monitor.is_valid() {
            return;
        }
        self.set_closed();
        self.inner.handler.on_error(self, &err.to_string());
    }

    fn dispatch(&self, frame: Frame) -> Result<(), Error> {
        let Frame { channel, body } = frame;
        match (channel, body) {
            (_, FrameBody::Heartbeat) => {
                #[cfg(feature = "tracing")]
                tracing::trace!("Heartbeat received");
                #[cfg(feature = "log")]
                log::trace!("Heartbeat received");
                Ok(())
            }
            (0, FrameBody::Method(Method::Connection(method))) => {
                self.on_connection_method(method)
            }
            (0, FrameBody::Method(method)) => Err(Error::UnexpectedMethod {
                class_id: method.class_id(),
                method_id: method.method_id(),
                state: self.state(),
            }),
            (0, _) => Err(Error::UnexpectedContent),
            (channel, body) => self.forward_to_channel(Frame::new(channel, body)),
        }
    }

    fn forward_to_channel(&self, frame: Frame) -> Result<(), Error> {
        // after sending close, everything but close and close-ok is discarded
        if self.state() == ConnectionState::Closing {
            #[cfg(feature = "tracing")]
            tracing::trace!(channel = frame.channel, "Discarding frame while closing");
            #[cfg(feature = "log")]
            log::trace!("Discarding frame for channel {} while closing", frame.channel);
            return Ok(());
        }

        let endpoint = self.inner.registry.borrow().get(frame.channel);
        match endpoint {
            Some(endpoint) => endpoint.on_frame(self, frame),
            None => {
                #[cfg(feature = "tracing")]
                tracing::warn!(channel = frame.channel, "Frame for unknown channel");
                #[cfg(feature = "log")]
                log::warn!("Frame for unknown channel {}", frame.channel);
                Ok(())
            }
        }
    }
}
