//! Implements errors associated with the connection

use super::ConnectionState;

/// Protocol violations detected while processing inbound frames
///
/// These never cross [`Connection::parse`](super::Connection::parse); they are
/// reported through
/// [`ConnectionHandler::on_error`](super::ConnectionHandler::on_error).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The frame could not be decoded
    #[error(transparent)]
    Frame(#[from] amqp091_types::Error),

    /// A method arrived in a state where it is not allowed
    #[error("Unexpected method {class_id}.{method_id} in state {state:?}")]
    UnexpectedMethod {
        /// Class id
        class_id: u16,
        /// Method id
        method_id: u16,
        /// Connection state when the method arrived
        state: ConnectionState,
    },

    /// Content header or body frames are not valid on channel 0
    #[error("Unexpected content frame on channel 0")]
    UnexpectedContent,

    /// The server offered a protocol version other than 0-9
    #[error("Server offered protocol version {major}-{minor}")]
    VersionMismatch {
        /// Major version
        major: u8,
        /// Minor version
        minor: u8,
    },

    /// The server does not offer the mechanism required by the login
    #[error("Server does not support the {0} mechanism")]
    MechanismNotSupported(&'static str),

    /// SASL challenges are not supported
    #[error("SASL challenge is not supported")]
    ChallengeNotSupported,

    /// A channel rejected a frame addressed to it
    #[error("Channel {channel}: {description}")]
    Channel {
        /// Channel id
        channel: u16,
        /// Description of the violation
        description: String,
    },

    /// A negotiation reply could not be sent
    #[error(transparent)]
    Send(#[from] SendError),
}

/// Error returned by [`Connection::send`](super::Connection::send)
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The connection is closing or closed
    #[error("Connection is closing or closed")]
    Closed,

    /// The frame could not be encoded
    #[error(transparent)]
    Encode(#[from] amqp091_types::Error),
}

/// Error returned by [`Connection::close`](super::Connection::close)
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CloseError {
    /// Close was already requested or the connection is closed
    #[error("Connection is already closed")]
    AlreadyClosed,
}

/// Error associated with allocation of new channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocChannelError {
    /// The connection is closing or closed
    #[error("Illegal local state")]
    IllegalState,

    /// Every channel id allowed by the negotiated channel-max is in use
    #[error("Reached connection channel max")]
    ChannelMaxReached,
}

/// Error associated with building a connection from a url
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    /// Error parsing the url
    #[error(transparent)]
    UrlError(#[from] url::ParseError),

    /// Scheme is invalid or not found
    #[error(r#"Invalid scheme. Only "amqp" and "amqps" are supported."#)]
    InvalidScheme,

    /// The virtual host is not valid UTF-8 after percent decoding
    #[error("Invalid virtual host")]
    InvalidVirtualHost,

    /// A query parameter could not be parsed
    #[error("Invalid value {value:?} for query parameter {key:?}")]
    InvalidQuery {
        /// Parameter name
        key: String,
        /// Parameter value
        value: String,
    },
}
