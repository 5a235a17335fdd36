#![deny(missing_docs, missing_debug_implementations)]

//! Implements the AMQP 0-9-1 frame layer as defined in the
//! [specification](https://www.rabbitmq.com/resources/specs/amqp0-9-1.pdf).
//!
//! Only the pieces needed to drive a connection are modelled in detail: the
//! protocol header, the frame envelope, and the methods of the `connection`
//! and `channel` classes. Methods of every other class, content headers and
//! field tables are carried as opaque encoded bytes.

pub mod codec;
pub mod constants;
pub mod error;
pub mod frame;
pub mod method;
pub mod primitives;
pub mod protocol_header;

pub use codec::FrameCodec;
pub use error::Error;
pub use frame::{decode, ContentHeader, Frame, FrameBody, ReceivedFrame};
pub use method::{ChannelMethod, Close, ConnectionMethod, Method, Start, StartOk, Tune};
pub use primitives::FieldTable;
pub use protocol_header::ProtocolHeader;
