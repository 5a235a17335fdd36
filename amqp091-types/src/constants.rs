//! Constants of the AMQP 0-9-1 wire format

/// Frame type of a method frame
pub const FRAME_METHOD: u8 = 1;

/// Frame type of a content header frame
pub const FRAME_HEADER: u8 = 2;

/// Frame type of a content body frame
pub const FRAME_BODY: u8 = 3;

/// Frame type of a heartbeat frame
pub const FRAME_HEARTBEAT: u8 = 8;

/// Octet that terminates every frame except the protocol header
pub const FRAME_END: u8 = 0xCE;

/// Size of `[type:1][channel:2][payload_size:4]`
pub const FRAME_HEADER_SIZE: usize = 7;

/// Smallest frame-max a peer may propose. Both peers must accept frames up
/// to this size before tuning completes.
pub const FRAME_MIN_SIZE: u32 = 4096;

/// Reply code of a normal shutdown
pub const REPLY_SUCCESS: u16 = 200;

/// Class id of the `connection` class
pub const CLASS_CONNECTION: u16 = 10;

/// Class id of the `channel` class
pub const CLASS_CHANNEL: u16 = 20;
