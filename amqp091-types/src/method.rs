//! Method frame payloads
//!
//! Class      Modelled  Handled by
//! ===============================
//! connection    yes    Connection
//! channel       yes    Channel
//! others        no     forwarded as raw arguments
//!
//! A method payload is `[class-id:2][method-id:2][arguments]`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    constants::{CLASS_CHANNEL, CLASS_CONNECTION, REPLY_SUCCESS},
    primitives::{
        get_bit, get_long_str, get_short_str, get_table, get_u16, get_u32, get_u8, put_bit,
        put_long_str, put_short_str, put_table, FieldTable,
    },
    Error,
};

/// Fields of `connection.start`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Start {
    /// Protocol major version offered by the server
    pub version_major: u8,

    /// Protocol minor version offered by the server
    pub version_minor: u8,

    /// Server properties
    pub server_properties: FieldTable,

    /// Space separated list of SASL mechanisms
    pub mechanisms: Bytes,

    /// Space separated list of message locales
    pub locales: Bytes,
}

impl Start {
    /// Returns whether the server offers the named SASL mechanism
    pub fn supports_mechanism(&self, mechanism: &str) -> bool {
        self.mechanisms
            .split(|b| *b == b' ')
            .any(|m| m == mechanism.as_bytes())
    }
}

/// Fields of `connection.start-ok`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOk {
    /// Client properties
    pub client_properties: FieldTable,

    /// Selected SASL mechanism
    pub mechanism: String,

    /// SASL response
    pub response: Bytes,

    /// Selected message locale
    pub locale: String,
}

/// Fields of `connection.tune` and `connection.tune-ok`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tune {
    /// Highest channel number, 0 means no limit
    pub channel_max: u16,

    /// Largest frame size including header and frame end, 0 means no limit
    pub frame_max: u32,

    /// Heartbeat interval in seconds, 0 disables heartbeats
    pub heartbeat: u16,
}

/// Fields of `connection.close` and `channel.close`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Close {
    /// Reply code
    pub reply_code: u16,

    /// Human readable reason
    pub reply_text: String,

    /// Class of the method that caused the close, 0 if none
    pub class_id: u16,

    /// Method that caused the close, 0 if none
    pub method_id: u16,
}

impl Close {
    /// Creates a close without a failing method
    pub fn new(reply_code: u16, reply_text: impl Into<String>) -> Self {
        Self {
            reply_code,
            reply_text: reply_text.into(),
            class_id: 0,
            method_id: 0,
        }
    }

    /// Returns whether the reply code signals a normal shutdown
    pub fn is_success(&self) -> bool {
        self.reply_code == REPLY_SUCCESS
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            reply_code: get_u16(src)?,
            reply_text: get_short_str(src)?,
            class_id: get_u16(src)?,
            method_id: get_u16(src)?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(self.reply_code);
        put_short_str(dst, &self.reply_text)?;
        dst.put_u16(self.class_id);
        dst.put_u16(self.method_id);
        Ok(())
    }
}

impl Tune {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            channel_max: get_u16(src)?,
            frame_max: get_u32(src)?,
            heartbeat: get_u16(src)?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u16(self.channel_max);
        dst.put_u32(self.frame_max);
        dst.put_u16(self.heartbeat);
    }
}

/// Methods of the `connection` class
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionMethod {
    /// `connection.start`
    Start(Start),

    /// `connection.start-ok`
    StartOk(StartOk),

    /// `connection.secure`
    Secure {
        /// SASL challenge
        challenge: Bytes,
    },

    /// `connection.secure-ok`
    SecureOk {
        /// SASL response
        response: Bytes,
    },

    /// `connection.tune`
    Tune(Tune),

    /// `connection.tune-ok`
    TuneOk(Tune),

    /// `connection.open`
    Open {
        /// Virtual host to open
        virtual_host: String,
    },

    /// `connection.open-ok`
    OpenOk,

    /// `connection.close`
    Close(Close),

    /// `connection.close-ok`
    CloseOk,

    /// `connection.blocked`
    Blocked {
        /// Reason given by the server
        reason: String,
    },

    /// `connection.unblocked`
    Unblocked,
}

impl ConnectionMethod {
    /// Method id within the connection class
    pub fn method_id(&self) -> u16 {
        match self {
            Self::Start(_) => 10,
            Self::StartOk(_) => 11,
            Self::Secure { .. } => 20,
            Self::SecureOk { .. } => 21,
            Self::Tune(_) => 30,
            Self::TuneOk(_) => 31,
            Self::Open { .. } => 40,
            Self::OpenOk => 41,
            Self::Close(_) => 50,
            Self::CloseOk => 51,
            Self::Blocked { .. } => 60,
            Self::Unblocked => 61,
        }
    }

    fn decode(method_id: u16, src: &mut Bytes) -> Result<Self, Error> {
        let method = match method_id {
            10 => Self::Start(Start {
                version_major: get_u8(src)?,
                version_minor: get_u8(src)?,
                server_properties: get_table(src)?,
                mechanisms: get_long_str(src)?,
                locales: get_long_str(src)?,
            }),
            11 => Self::StartOk(StartOk {
                client_properties: get_table(src)?,
                mechanism: get_short_str(src)?,
                response: get_long_str(src)?,
                locale: get_short_str(src)?,
            }),
            20 => Self::Secure {
                challenge: get_long_str(src)?,
            },
            21 => Self::SecureOk {
                response: get_long_str(src)?,
            },
            30 => Self::Tune(Tune::decode(src)?),
            31 => Self::TuneOk(Tune::decode(src)?),
            40 => {
                let virtual_host = get_short_str(src)?;
                let _capabilities = get_short_str(src)?;
                let _insist = get_bit(src)?;
                Self::Open { virtual_host }
            }
            41 => {
                let _known_hosts = get_short_str(src)?;
                Self::OpenOk
            }
            50 => Self::Close(Close::decode(src)?),
            51 => Self::CloseOk,
            60 => Self::Blocked {
                reason: get_short_str(src)?,
            },
            61 => Self::Unblocked,
            _ => {
                return Err(Error::UnknownMethod {
                    class_id: CLASS_CONNECTION,
                    method_id,
                })
            }
        };
        Ok(method)
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        match self {
            Self::Start(start) => {
                dst.put_u8(start.version_major);
                dst.put_u8(start.version_minor);
                put_table(dst, &start.server_properties)?;
                put_long_str(dst, &start.mechanisms)?;
                put_long_str(dst, &start.locales)?;
            }
            Self::StartOk(start_ok) => {
                put_table(dst, &start_ok.client_properties)?;
                put_short_str(dst, &start_ok.mechanism)?;
                put_long_str(dst, &start_ok.response)?;
                put_short_str(dst, &start_ok.locale)?;
            }
            Self::Secure { challenge } => put_long_str(dst, challenge)?,
            Self::SecureOk { response } => put_long_str(dst, response)?,
            Self::Tune(tune) | Self::TuneOk(tune) => tune.encode(dst),
            Self::Open { virtual_host } => {
                put_short_str(dst, virtual_host)?;
                put_short_str(dst, "")?;
                put_bit(dst, false);
            }
            Self::OpenOk => put_short_str(dst, "")?,
            Self::Close(close) => close.encode(dst)?,
            Self::CloseOk | Self::Unblocked => {}
            Self::Blocked { reason } => put_short_str(dst, reason)?,
        }
        Ok(())
    }
}

/// Methods of the `channel` class
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMethod {
    /// `channel.open`
    Open,

    /// `channel.open-ok`
    OpenOk,

    /// `channel.flow`
    Flow {
        /// Whether the peer may send content frames
        active: bool,
    },

    /// `channel.flow-ok`
    FlowOk {
        /// Current flow setting
        active: bool,
    },

    /// `channel.close`
    Close(Close),

    /// `channel.close-ok`
    CloseOk,
}

impl ChannelMethod {
    /// Method id within the channel class
    pub fn method_id(&self) -> u16 {
        match self {
            Self::Open => 10,
            Self::OpenOk => 11,
            Self::Flow { .. } => 20,
            Self::FlowOk { .. } => 21,
            Self::Close(_) => 40,
            Self::CloseOk => 41,
        }
    }

    fn decode(method_id: u16, src: &mut Bytes) -> Result<Self, Error> {
        let method = match method_id {
            10 => {
                let _out_of_band = get_short_str(src)?;
                Self::Open
            }
            11 => {
                let _channel_id = get_long_str(src)?;
                Self::OpenOk
            }
            20 => Self::Flow {
                active: get_bit(src)?,
            },
            21 => Self::FlowOk {
                active: get_bit(src)?,
            },
            40 => Self::Close(Close::decode(src)?),
            41 => Self::CloseOk,
            _ => {
                return Err(Error::UnknownMethod {
                    class_id: CLASS_CHANNEL,
                    method_id,
                })
            }
        };
        Ok(method)
    }

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        match self {
            Self::Open => put_short_str(dst, "")?,
            Self::OpenOk => put_long_str(dst, &[])?,
            Self::Flow { active } | Self::FlowOk { active } => put_bit(dst, *active),
            Self::Close(close) => close.encode(dst)?,
            Self::CloseOk => {}
        }
        Ok(())
    }
}

/// The payload of a method frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// Method of the `connection` class
    Connection(ConnectionMethod),

    /// Method of the `channel` class
    Channel(ChannelMethod),

    /// Method of any other class, arguments left encoded
    Other {
        /// Class id
        class_id: u16,
        /// Method id
        method_id: u16,
        /// Encoded arguments
        arguments: Bytes,
    },
}

impl From<ConnectionMethod> for Method {
    fn from(value: ConnectionMethod) -> Self {
        Self::Connection(value)
    }
}

impl From<ChannelMethod> for Method {
    fn from(value: ChannelMethod) -> Self {
        Self::Channel(value)
    }
}

impl Method {
    /// Class id of the method
    pub fn class_id(&self) -> u16 {
        match self {
            Self::Connection(_) => CLASS_CONNECTION,
            Self::Channel(_) => CLASS_CHANNEL,
            Self::Other { class_id, .. } => *class_id,
        }
    }

    /// Method id of the method
    pub fn method_id(&self) -> u16 {
        match self {
            Self::Connection(method) => method.method_id(),
            Self::Channel(method) => method.method_id(),
            Self::Other { method_id, .. } => *method_id,
        }
    }

    /// Decodes a complete method frame payload
    pub fn decode(mut payload: Bytes) -> Result<Self, Error> {
        let class_id = get_u16(&mut payload)?;
        let method_id = get_u16(&mut payload)?;

        let method = match class_id {
            CLASS_CONNECTION => Self::Connection(ConnectionMethod::decode(method_id, &mut payload)?),
            CLASS_CHANNEL => Self::Channel(ChannelMethod::decode(method_id, &mut payload)?),
            _ => {
                return Ok(Self::Other {
                    class_id,
                    method_id,
                    arguments: payload,
                })
            }
        };

        match payload.remaining() {
            0 => Ok(method),
            n => Err(Error::TrailingBytes(n)),
        }
    }

    /// Encodes the method frame payload
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(self.class_id());
        dst.put_u16(self.method_id());
        match self {
            Self::Connection(method) => method.encode(dst),
            Self::Channel(method) => method.encode(dst),
            Self::Other { arguments, .. } => {
                dst.put_slice(arguments);
                Ok(())
            }
        }
    }
}
