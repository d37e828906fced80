//! Response interpretation state machine.
//!
//! Lines from the device drive [`DeviceState`] through two transitions, both
//! into live TV. A channel queued while the device was elsewhere is keyed in
//! as part of the same update that reaches live TV.

use log::{debug, info, trace, warn};

use tivo_protocol::{decode_line, ClientError, DeviceMessage, Mode, ProtocolError};

use crate::client::state::DeviceState;
use crate::client::translator::{is_channel_number, CommandTranslator, WireWriter};

/// State change caused by one device line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// `LIVETV_READY` was received.
    LiveTvReady,
    /// `CH_STATUS` was received.
    ChannelStatus { channel: String },
    /// The line's command has no defined transition.
    NoTransition { command: String },
}

/// Result of applying one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub transition: Transition,
    /// Channel whose tuning sequence was issued by this update.
    pub tuned: Option<String>,
}

/// Applies device lines and caller tune requests to a [`DeviceState`].
pub struct ResponseInterpreter<'a> {
    device: &'a str,
}

impl<'a> ResponseInterpreter<'a> {
    pub fn new(device: &'a str) -> Self {
        Self { device }
    }

    /// Decode and apply one line.
    ///
    /// Unknown commands and empty lines yield [`Transition::NoTransition`].
    /// A line that names a known command but cannot be decoded returns the
    /// protocol error and leaves the state untouched.
    pub fn apply_line<W: WireWriter>(
        &self,
        state: &mut DeviceState,
        line: &str,
        writer: &mut W,
    ) -> Result<Outcome, ProtocolError> {
        match decode_line(line) {
            Ok(message) => Ok(self.apply(state, message, writer)),
            Err(ProtocolError::EmptyLine) => Ok(Outcome {
                transition: Transition::NoTransition {
                    command: String::new(),
                },
                tuned: None,
            }),
            Err(e) => Err(e),
        }
    }

    /// Apply an already decoded message.
    pub fn apply<W: WireWriter>(
        &self,
        state: &mut DeviceState,
        message: DeviceMessage,
        writer: &mut W,
    ) -> Outcome {
        trace!("[{}] Applying {}", self.device, message.command());
        let transition = match message {
            DeviceMessage::LiveTvReady => {
                state.mode = Mode::LiveTv;
                state.channel = None;
                state.reason = None;
                Transition::LiveTvReady
            }
            DeviceMessage::ChannelStatus { channel, reason } => {
                state.mode = Mode::LiveTv;
                state.channel = Some(channel.clone());
                state.reason = reason;
                Transition::ChannelStatus { channel }
            }
            DeviceMessage::Unrecognized(command) => {
                debug!("[{}] No transition for {}", self.device, command);
                Transition::NoTransition { command }
            }
        };

        let tuned = self.flush_pending(state, writer);
        Outcome { transition, tuned }
    }

    /// Tune `num` now if the device is on live TV, otherwise bring up live
    /// TV and remember `num` until the device reports it.
    ///
    /// Returns true if the tuning sequence was issued immediately.
    pub fn tune_live<W: WireWriter>(
        &self,
        state: &mut DeviceState,
        num: &str,
        force: bool,
        writer: &mut W,
    ) -> Result<bool, ClientError> {
        if !is_channel_number(num) {
            return Err(ClientError::InvalidCommand(num.to_string()));
        }

        let mut translator = CommandTranslator::new(self.device, writer);
        if state.is_live() {
            translator.channel(num, force)?;
            return Ok(true);
        }

        translator.ircode("LIVETV")?;
        info!("[{}] Channel {} queued until live TV is ready", self.device, num);
        state.pending_channel_set = Some(num.to_string());
        Ok(false)
    }

    /// Issue the queued channel once live TV is reached.
    ///
    /// The pending value is cleared even if the write fails so no update
    /// leaves a queued channel behind in live TV.
    fn flush_pending<W: WireWriter>(
        &self,
        state: &mut DeviceState,
        writer: &mut W,
    ) -> Option<String> {
        if !state.is_live() {
            return None;
        }
        let channel = state.pending_channel_set.take()?;

        match CommandTranslator::new(self.device, writer).channel(&channel, false) {
            Ok(()) => {
                info!("[{}] Live TV ready, tuning queued channel {}", self.device, channel);
                Some(channel)
            }
            Err(e) => {
                warn!("[{}] Dropping queued channel {}: {}", self.device, channel, e);
                None
            }
        }
    }
}
