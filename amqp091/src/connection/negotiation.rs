//! Connection class methods received from the server

use std::cmp::min;

use amqp091_types::{
    constants::{CLASS_CONNECTION, FRAME_MIN_SIZE},
    method::{Close, ConnectionMethod, Start, StartOk, Tune},
    FieldTable, Frame,
};

use super::{outbound::OutBuffer, Connection, ConnectionState, Error, CHANNEL_MAX_EXCEEDED};

const LOCALE: &str = "en_US";

/// Agrees on a limit where 0 stands for "no limit" on either side
fn negotiate<T>(local: T, remote: T) -> T
where
    T: Copy + Ord + Default,
{
    let unbounded = T::default();
    if local == unbounded {
        remote
    } else if remote == unbounded {
        local
    } else {
        min(local, remote)
    }
}

impl Connection {
    pub(super) fn on_connection_method(&self, method: ConnectionMethod) -> Result<(), Error> {
        let method_id = method.method_id();

        match method {
            ConnectionMethod::Start(start) => {
                self.expect_state(ConnectionState::NegotiatingProtocol, method_id)?;
                self.on_start(start)
            }
            ConnectionMethod::Secure { .. } => Err(Error::ChallengeNotSupported),
            ConnectionMethod::Tune(tune) => {
                self.expect_state(ConnectionState::NegotiatingTuning, method_id)?;
                self.on_tune(tune)
            }
            ConnectionMethod::OpenOk => {
                self.expect_state(ConnectionState::NegotiatingTuning, method_id)?;
                self.set_connected();
                Ok(())
            }
            ConnectionMethod::Close(close) => self.on_remote_close(close),
            ConnectionMethod::CloseOk => {
                self.expect_state(ConnectionState::Closing, method_id)?;
                self.on_close_ok();
                Ok(())
            }
            ConnectionMethod::Blocked { reason } => {
                self.inner.handler.on_blocked(self, &reason);
                Ok(())
            }
            ConnectionMethod::Unblocked => {
                self.inner.handler.on_unblocked(self);
                Ok(())
            }
            // sent by clients only
            ConnectionMethod::StartOk(_)
            | ConnectionMethod::SecureOk { .. }
            | ConnectionMethod::TuneOk(_)
            | ConnectionMethod::Open { .. } => Err(self.unexpected(method_id)),
        }
    }

    fn unexpected(&self, method_id: u16) -> Error {
        Error::UnexpectedMethod {
            class_id: CLASS_CONNECTION,
            method_id,
            state: self.state(),
        }
    }

    fn expect_state(&self, expected: ConnectionState, method_id: u16) -> Result<(), Error> {
        match self.state() == expected {
            true => Ok(()),
            false => Err(self.unexpected(method_id)),
        }
    }

    fn on_start(&self, start: Start) -> Result<(), Error> {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            major = start.version_major,
            minor = start.version_minor,
            "RECV connection.start"
        );
        #[cfg(feature = "log")]
        log::debug!(
            "RECV connection.start {}-{}",
            start.version_major,
            start.version_minor
        );

        if (start.version_major, start.version_minor) != (0, 9) {
            return Err(Error::VersionMismatch {
                major: start.version_major,
                minor: start.version_minor,
            });
        }

        let login = self.login();
        if !start.supports_mechanism(login.mechanism()) {
            return Err(Error::MechanismNotSupported(login.mechanism()));
        }

        let start_ok = StartOk {
            client_properties: FieldTable::empty(),
            mechanism: login.mechanism().to_string(),
            response: login.initial_response(),
            locale: LOCALE.to_string(),
        };

        self.set_state(ConnectionState::NegotiatingTuning);
        self.send(Frame::method(0, ConnectionMethod::StartOk(start_ok)))?;
        Ok(())
    }

    fn on_tune(&self, tune: Tune) -> Result<(), Error> {
        #[cfg(feature = "tracing")]
        tracing::debug!(?tune, "RECV connection.tune");
        #[cfg(feature = "log")]
        log::debug!("RECV connection.tune {:?}", tune);

        let options = &self.inner.options;
        let channel_max = negotiate(options.channel_max, tune.channel_max);
        let frame_max = match negotiate(options.max_frame_size, tune.frame_max) {
            0 => 0,
            size => size.max(FRAME_MIN_SIZE),
        };
        let heartbeat = negotiate(options.heartbeat, tune.heartbeat);

        let monitor = self.monitor();
        let heartbeat = self.inner.handler.on_negotiate(self, heartbeat);
        if !monitor.is_valid() {
            return Ok(());
        }

        self.inner.max_frame_size.set(frame_max);
        self.inner.heartbeat.set(heartbeat);
        self.inner
            .registry
            .borrow_mut()
            .set_channel_max(channel_max);

        // channels registered during negotiation may exceed the agreed limit
        let evicted = self.inner.registry.borrow_mut().evict_over_limit();
        for (id, channel) in evicted {
            #[cfg(feature = "tracing")]
            tracing::warn!(channel = id, channel_max, "Channel exceeds channel-max");
            #[cfg(feature = "log")]
            log::warn!("Channel {} exceeds channel-max {}", id, channel_max);

            self.inner.queue.borrow_mut().discard(id);
            if let Some(channel) = channel.upgrade() {
                channel.reject(self, CHANNEL_MAX_EXCEEDED);
                if !monitor.is_valid() {
                    return Ok(());
                }
            }
        }

        let tune_ok = Tune {
            channel_max,
            frame_max,
            heartbeat,
        };
        self.send(Frame::method(0, ConnectionMethod::TuneOk(tune_ok)))?;
        if !monitor.is_valid() {
            return Ok(());
        }

        let virtual_host = options.virtual_host.clone();
        self.send(Frame::method(0, ConnectionMethod::Open { virtual_host }))?;
        Ok(())
    }

    fn on_remote_close(&self, close: Close) -> Result<(), Error> {
        #[cfg(feature = "tracing")]
        tracing::debug!(code = close.reply_code, text = %close.reply_text, "RECV connection.close");
        #[cfg(feature = "log")]
        log::debug!(
            "RECV connection.close {} {}",
            close.reply_code,
            close.reply_text
        );

        // the reply goes out even while closing, so it bypasses `send`
        let close_ok = OutBuffer::from_frame(&Frame::method(0, ConnectionMethod::CloseOk))?;

        let monitor = self.monitor();
        self.inner.handler.on_data(self, &close_ok);
        if !monitor.is_valid() {
            return Ok(());
        }

        self.set_closed();

        if !close.is_success() {
            self.inner.handler.on_error(self, &close.reply_text);
            if !monitor.is_valid() {
                return Ok(());
            }
        }

        self.inner.handler.on_closed(self);
        Ok(())
    }

    fn on_close_ok(&self) {
        let monitor = self.monitor();
        self.set_closed();
        if monitor.is_valid() {
            self.inner.handler.on_closed(self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::negotiate;

    #[test]
    fn zero_means_no_limit() {
        assert_eq!(negotiate(0u16, 0), 0);
        assert_eq!(negotiate(0u16, 2047), 2047);
        assert_eq!(negotiate(16u16, 0), 16);
        assert_eq!(negotiate(16u16, 2047), 16);
        assert_eq!(negotiate(131_072u32, 4096), 4096);
    }
}
