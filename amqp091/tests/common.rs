#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use amqp091::{
    types::{
        decode, ChannelMethod, Close, ConnectionMethod, FieldTable, Frame, Start, Tune,
    },
    Channel, ChannelHandler, Connection, ConnectionHandler,
};
use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Data(Vec<u8>),
    Connected,
    Error(String),
    Closed,
    Blocked(String),
    Unblocked,
}

type Trigger = Box<dyn Fn(&Event) -> bool>;

/// Records every callback, optionally destroying the connection once
#[derive(Default)]
pub struct Recorder {
    events: RefCell<Vec<Event>>,
    destroy_when: RefCell<Option<Trigger>>,
    heartbeat: Cell<Option<u16>>,
}

impl Recorder {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn destroy_when(&self, trigger: impl Fn(&Event) -> bool + 'static) {
        *self.destroy_when.borrow_mut() = Some(Box::new(trigger));
    }

    pub fn choose_heartbeat(&self, interval: u16) {
        self.heartbeat.set(Some(interval));
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    pub fn errors(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Error(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, expected: &Event) -> usize {
        self.events.borrow().iter().filter(|e| *e == expected).count()
    }

    /// All bytes handed to `on_data`, concatenated
    pub fn sent(&self) -> Vec<u8> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Data(data) => Some(data.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Frames handed to `on_data`, after the protocol header
    pub fn sent_frames(&self) -> Vec<Frame> {
        let sent = self.sent();
        let mut src = match sent.starts_with(b"AMQP") {
            true => &sent[8..],
            false => &sent[..],
        };

        let mut frames = Vec::new();
        while let Some(received) = decode(src, 0).unwrap() {
            frames.push(received.frame);
            src = &src[received.total_size..];
        }
        assert!(src.is_empty(), "trailing bytes in output");
        frames
    }

    fn record(&self, connection: &Connection, event: Event) {
        let fire = self
            .destroy_when
            .borrow()
            .as_ref()
            .map_or(false, |trigger| trigger(&event));
        self.events.borrow_mut().push(event);

        if fire {
            self.destroy_when.borrow_mut().take();
            connection.destroy();
        }
    }
}

impl ConnectionHandler for Recorder {
    fn on_data(&self, connection: &Connection, data: &[u8]) {
        self.record(connection, Event::Data(data.to_vec()));
    }

    fn on_connected(&self, connection: &Connection) {
        self.record(connection, Event::Connected);
    }

    fn on_error(&self, connection: &Connection, message: &str) {
        self.record(connection, Event::Error(message.to_string()));
    }

    fn on_closed(&self, connection: &Connection) {
        self.record(connection, Event::Closed);
    }

    fn on_negotiate(&self, _connection: &Connection, interval: u16) -> u16 {
        self.heartbeat.get().unwrap_or(interval)
    }

    fn on_blocked(&self, connection: &Connection, reason: &str) {
        self.record(connection, Event::Blocked(reason.to_string()));
    }

    fn on_unblocked(&self, connection: &Connection) {
        self.record(connection, Event::Unblocked);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Ready,
    Error(String),
    Closed,
    Frame(amqp091::types::FrameBody),
    Flow(bool),
}

#[derive(Default)]
pub struct ChannelRecorder {
    events: RefCell<Vec<ChannelEvent>>,
}

impl ChannelRecorder {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ChannelEvent> {
        self.events.borrow().clone()
    }
}

impl ChannelHandler for ChannelRecorder {
    fn on_ready(&self, _channel: &Channel) {
        self.events.borrow_mut().push(ChannelEvent::Ready);
    }

    fn on_error(&self, _channel: &Channel, message: &str) {
        self.events
            .borrow_mut()
            .push(ChannelEvent::Error(message.to_string()));
    }

    fn on_closed(&self, _channel: &Channel) {
        self.events.borrow_mut().push(ChannelEvent::Closed);
    }

    fn on_frame(&self, _channel: &Channel, body: amqp091::types::FrameBody) {
        self.events.borrow_mut().push(ChannelEvent::Frame(body));
    }

    fn on_flow(&self, _channel: &Channel, active: bool) {
        self.events.borrow_mut().push(ChannelEvent::Flow(active));
    }
}

/* ----------------------------- Server frames ------------------------------ */

pub fn wire(frame: Frame) -> Vec<u8> {
    let mut buf = BytesMut::new();
    frame.encode(&mut buf).unwrap();
    buf.put_u8(0xCE);
    buf.to_vec()
}

pub fn concat(frames: impl IntoIterator<Item = Frame>) -> Vec<u8> {
    frames.into_iter().flat_map(wire).collect()
}

pub fn start() -> Frame {
    start_with(0, 9, "AMQPLAIN PLAIN")
}

pub fn start_with(major: u8, minor: u8, mechanisms: &'static str) -> Frame {
    Frame::method(
        0,
        ConnectionMethod::Start(Start {
            version_major: major,
            version_minor: minor,
            server_properties: FieldTable::empty(),
            mechanisms: Bytes::from_static(mechanisms.as_bytes()),
            locales: Bytes::from_static(b"en_US"),
        }),
    )
}

pub fn tune(channel_max: u16, frame_max: u32, heartbeat: u16) -> Frame {
    Frame::method(
        0,
        ConnectionMethod::Tune(Tune {
            channel_max,
            frame_max,
            heartbeat,
        }),
    )
}

pub fn open_ok() -> Frame {
    Frame::method(0, ConnectionMethod::OpenOk)
}

pub fn close(code: u16, text: &str) -> Frame {
    Frame::method(0, ConnectionMethod::Close(Close::new(code, text)))
}

pub fn close_ok() -> Frame {
    Frame::method(0, ConnectionMethod::CloseOk)
}

pub fn channel_open_ok(channel: u16) -> Frame {
    Frame::method(channel, ChannelMethod::OpenOk)
}

pub fn channel_close(channel: u16, code: u16, text: &str) -> Frame {
    Frame::method(channel, ChannelMethod::Close(Close::new(code, text)))
}

pub fn channel_close_ok(channel: u16) -> Frame {
    Frame::method(channel, ChannelMethod::CloseOk)
}

/// Frames a server sends to bring a connection to `Connected`
pub fn handshake() -> Vec<u8> {
    concat([start(), tune(2047, 131_072, 60), open_ok()])
}

pub fn connect(recorder: &Rc<Recorder>) -> Connection {
    let connection = Connection::builder().connect(recorder.clone());
    let wire = handshake();
    assert_eq!(connection.parse(&wire), wire.len());
    connection
}
