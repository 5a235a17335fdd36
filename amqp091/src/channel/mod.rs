//! A minimal AMQP 0-9-1 channel
//!
//! The channel takes care of its own `channel.*` handshake and hands every
//! other frame addressed to it to a [`ChannelHandler`].

use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use amqp091_types::{
    constants::{CLASS_CHANNEL, REPLY_SUCCESS},
    method::{ChannelMethod, Close, Method},
    Frame, FrameBody,
};

use crate::{
    connection::{Connection, Error, WeakConnection},
    endpoint::ChannelEndpoint,
};

mod error;
pub use error::*;

/// Channel states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// `channel.open` sent
    Opening,

    /// `channel.open-ok` received
    Open,

    /// `channel.close` sent
    Closing,

    /// Closed or detached from the connection
    Closed,
}

/// Callbacks raised by a [`Channel`]
pub trait ChannelHandler {
    /// The server confirmed the channel
    fn on_ready(&self, _channel: &Channel) {}

    /// The server closed the channel with the given reply text
    fn on_error(&self, _channel: &Channel, _message: &str) {}

    /// The channel reached the closed state
    fn on_closed(&self, _channel: &Channel) {}

    /// A frame that is not part of the channel handshake, such as a
    /// `basic.deliver` method or content
    fn on_frame(&self, _channel: &Channel, _body: FrameBody) {}

    /// The server asked to pause (`false`) or resume (`true`) content. The
    /// `channel.flow-ok` is sent after this returns.
    fn on_flow(&self, _channel: &Channel, _active: bool) {}
}

struct ChannelInner {
    id: Cell<u16>,
    state: Cell<ChannelState>,
    connection: RefCell<Option<WeakConnection>>,
    handler: Rc<dyn ChannelHandler>,
    me: Weak<ChannelInner>,
}

/// A channel multiplexed over a [`Connection`]
///
/// Dropping the last handle closes the channel if it is still open and
/// releases its id.
#[derive(Clone)]
pub struct Channel {
    inner: Rc<ChannelInner>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id.get())
            .field("state", &self.inner.state.get())
            .finish()
    }
}

impl Channel {
    /// Registers a channel on `connection` and sends `channel.open`
    pub fn open(
        connection: &Connection,
        handler: Rc<dyn ChannelHandler>,
    ) -> Result<Self, OpenChannelError> {
        let inner = Rc::new_cyclic(|me| ChannelInner {
            id: Cell::new(0),
            state: Cell::new(ChannelState::Opening),
            connection: RefCell::new(Some(connection.downgrade())),
            handler,
            me: me.clone(),
        });

        let endpoint: Weak<ChannelInner> = Rc::downgrade(&inner);
        let id = match connection.register_channel(endpoint) {
            Ok(id) => id,
            Err(err) => {
                inner.detach();
                return Err(err.into());
            }
        };
        inner.id.set(id);

        #[cfg(feature = "tracing")]
        tracing::debug!(channel = id, "Opening channel");
        #[cfg(feature = "log")]
        log::debug!("Opening channel {}", id);

        if let Err(err) = connection.send(Frame::method(id, ChannelMethod::Open)) {
            inner.release(connection);
            return Err(err.into());
        }

        Ok(Self { inner })
    }

    /// Channel id
    pub fn id(&self) -> u16 {
        self.inner.id.get()
    }

    /// Current state
    pub fn state(&self) -> ChannelState {
        self.inner.state.get()
    }

    /// The connection carrying the channel, unless detached
    pub fn connection(&self) -> Option<Connection> {
        self.inner.connection()
    }

    /// Sends a frame on this channel
    pub fn send(&self, body: FrameBody) -> Result<(), ChannelError> {
        let connection = self.inner.connection().ok_or(ChannelError::Detached)?;
        match self.state() {
            ChannelState::Opening | ChannelState::Open => {
                connection.send(Frame::new(self.id(), body))?;
                Ok(())
            }
            ChannelState::Closing | ChannelState::Closed => Err(ChannelError::NotOpen),
        }
    }

    /// Sends `channel.close`. The channel is closed once the server
    /// confirms. Closing a closing channel has no effect.
    pub fn close(&self) -> Result<(), ChannelError> {
        self.inner.close_channel()
    }
}

impl ChannelInner {
    fn connection(&self) -> Option<Connection> {
        self.connection
            .borrow()
            .as_ref()
            .and_then(WeakConnection::upgrade)
    }

    fn handle(&self) -> Option<Channel> {
        self.me.upgrade().map(|inner| Channel { inner })
    }

    fn close_channel(&self) -> Result<(), ChannelError> {
        match self.state.get() {
            ChannelState::Closing => return Ok(()),
            ChannelState::Closed => return Err(ChannelError::NotOpen),
            ChannelState::Opening | ChannelState::Open => {}
        }
        let connection = self.connection().ok_or(ChannelError::Detached)?;

        self.state.set(ChannelState::Closing);
        let close = Close::new(REPLY_SUCCESS, "");
        connection.send(Frame::method(self.id.get(), ChannelMethod::Close(close)))?;
        Ok(())
    }

    fn detach(&self) {
        self.state.set(ChannelState::Closed);
        self.connection.borrow_mut().take();
    }

    /// Detaches and gives the id back to the connection
    fn release(&self, connection: &Connection) {
        self.detach();
        connection.unregister_channel(self);
    }

    fn violation(&self, description: impl Into<String>) -> Error {
        Error::Channel {
            channel: self.id.get(),
            description: description.into(),
        }
    }

    fn on_channel_method(
        &self,
        channel: &Channel,
        connection: &Connection,
        method: ChannelMethod,
    ) -> Result<(), Error> {
        match (self.state.get(), method) {
            (ChannelState::Opening, ChannelMethod::OpenOk) => {
                self.state.set(ChannelState::Open);
                self.handler.on_ready(channel);
                Ok(())
            }
            (_, ChannelMethod::Close(close)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(channel = self.id.get(), code = close.reply_code, text = %close.reply_text, "RECV channel.close");
                #[cfg(feature = "log")]
                log::debug!(
                    "RECV channel.close on {}: {} {}",
                    self.id.get(),
                    close.reply_code,
                    close.reply_text
                );

                connection.send(Frame::method(self.id.get(), ChannelMethod::CloseOk))?;
                self.release(connection);

                let monitor = connection.monitor();
                self.handler.on_error(channel, &close.reply_text);
                if monitor.is_valid() {
                    self.handler.on_closed(channel);
                }
                Ok(())
            }
            (ChannelState::Closing, ChannelMethod::CloseOk) => {
                self.release(connection);
                self.handler.on_closed(channel);
                Ok(())
            }
            (state, ChannelMethod::Flow { active })
                if matches!(state, ChannelState::Open | ChannelState::Closing) =>
            {
                let monitor = connection.monitor();
                self.handler.on_flow(channel, active);
                if !monitor.is_valid() {
                    return Ok(());
                }
                connection.send(Frame::method(self.id.get(), ChannelMethod::FlowOk { active }))?;
                Ok(())
            }
            (state, method) => Err(self.violation(format!(
                "unexpected method {}.{} in state {:?}",
                CLASS_CHANNEL,
                method.method_id(),
                state
            ))),
        }
    }
}

impl ChannelEndpoint for ChannelInner {
    fn id(&self) -> u16 {
        self.id.get()
    }

    fn on_frame(&self, connection: &Connection, frame: Frame) -> Result<(), Error> {
        let Some(channel) = self.handle() else {
            return Ok(());
        };

        match frame.into_body() {
            FrameBody::Method(Method::Channel(method)) => {
                self.on_channel_method(&channel, connection, method)
            }
            FrameBody::Method(Method::Connection(method)) => Err(self.violation(format!(
                "connection method {} on a channel",
                method.method_id()
            ))),
            body => match self.state.get() {
                ChannelState::Open => {
                    self.handler.on_frame(&channel, body);
                    Ok(())
                }
                // the server may still deliver until it sees channel.close
                ChannelState::Closing => Ok(()),
                ChannelState::Opening | ChannelState::Closed => {
                    Err(self.violation("frame before channel.open-ok"))
                }
            },
        }
    }

    fn close(&self) {
        if let Err(_err) = self.close_channel() {
            #[cfg(feature = "tracing")]
            tracing::debug!(channel = self.id.get(), err = ?_err, "Channel already closed");
            #[cfg(feature = "log")]
            log::debug!("Channel {} already closed: {:?}", self.id.get(), _err);
        }
    }

    fn invalidate(&self) {
        self.detach();
    }

    fn reject(&self, connection: &Connection, reason: &str) {
        self.detach();
        let Some(channel) = self.handle() else {
            return;
        };

        let monitor = connection.monitor();
        self.handler.on_error(&channel, reason);
        if monitor.is_valid() {
            self.handler.on_closed(&channel);
        }
    }
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        let Some(connection) = self.connection() else {
            return;
        };

        if matches!(self.state.get(), ChannelState::Opening | ChannelState::Open) {
            let close = Close::new(REPLY_SUCCESS, "");
            if let Err(_err) =
                connection.send(Frame::method(self.id.get(), ChannelMethod::Close(close)))
            {
                #[cfg(feature = "tracing")]
                tracing::debug!(err = ?_err, "Failed to send channel.close on drop");
                #[cfg(feature = "log")]
                log::debug!("Failed to send channel.close on drop: {:?}", _err);
            }
        }
        connection.unregister_channel(&*self);
    }
}
