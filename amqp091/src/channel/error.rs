//! Channel errors

use crate::connection::{AllocChannelError, SendError};

/// Error returned by [`Channel::send`](super::Channel::send) and
/// [`Channel::close`](super::Channel::close)
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The connection closed or was destroyed
    #[error("Channel is detached from its connection")]
    Detached,

    /// The channel is closing or closed
    #[error("Channel is not open")]
    NotOpen,

    /// The connection refused the frame
    #[error(transparent)]
    Send(#[from] SendError),
}

/// Error returned by [`Channel::open`](super::Channel::open)
#[derive(Debug, thiserror::Error)]
pub enum OpenChannelError {
    /// No channel id could be allocated
    #[error(transparent)]
    Alloc(#[from] AllocChannelError),

    /// `channel.open` could not be sent
    #[error(transparent)]
    Send(#[from] SendError),
}
