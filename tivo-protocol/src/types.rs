//! Message type definitions for the TiVo remote-control protocol.

use serde::{Deserialize, Serialize};

/// TCP port the TiVo listens on for remote-control connections.
pub const TIVO_PORT: u16 = 31339;

/// Line delimiter used in both directions.
pub const LINE_DELIMITER: u8 = b'\r';

/// Maximum length of a buffered partial line before it is discarded.
pub const MAX_LINE_LEN: usize = 4096;

/// Prefix of every outbound IR command.
pub const IRCODE_PREFIX: &str = "IRCODE";

/// The closed set of IR code names accepted by the device.
pub const IR_CODES: [&str; 57] = [
    // Navigation
    "UP", "DOWN", "LEFT", "RIGHT", "SELECT", "TIVO", "LIVETV", "GUIDE", "INFO", "EXIT",
    "THUMBSUP", "THUMBSDOWN", "CHANNELUP", "CHANNELDOWN", "MUTE", "VOLUMEUP", "VOLUMEDOWN",
    "TVINPUT",
    // Video modes
    "VIDEO_MODE_FIXED_480i", "VIDEO_MODE_FIXED_480p", "VIDEO_MODE_FIXED_720p",
    "VIDEO_MODE_FIXED_1080i", "VIDEO_MODE_HYBRID", "VIDEO_MODE_HYBRID_720p",
    "VIDEO_MODE_HYBRID_1080i", "VIDEO_MODE_NATIVE",
    // Closed captions
    "CC_ON", "CC_OFF",
    "OPTIONS",
    // Aspect correction
    "ASPECT_CORRECTION_FULL", "ASPECT_CORRECTION_PANEL", "ASPECT_CORRECTION_ZOOM",
    "ASPECT_CORRECTION_WIDE_ZOOM",
    // Transport
    "PLAY", "FORWARD", "REVERSE", "PAUSE", "SLOW", "REPLAY", "ADVANCE", "RECORD",
    // Numeric keys
    "NUM0", "NUM1", "NUM2", "NUM3", "NUM4", "NUM5", "NUM6", "NUM7", "NUM8", "NUM9",
    "ENTER", "CLEAR",
    // Action buttons
    "ACTION_A", "ACTION_B", "ACTION_C", "ACTION_D",
];

/// Returns true if `code` is a member of the IR code table.
pub fn is_ir_code(code: &str) -> bool {
    IR_CODES.contains(&code)
}

/// Device viewing mode as reported by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Mode {
    /// Nothing reported yet (menus, playback, or a fresh connection).
    #[default]
    #[serde(rename = "UNKNOWN")]
    Unknown,
    /// Tuned to a live channel.
    #[serde(rename = "LIVETV")]
    LiveTv,
}

/// Messages sent by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMessage {
    /// `LIVETV_READY`: live TV is up.
    LiveTvReady,
    /// `CH_STATUS <channel> <reason>`: current channel report.
    ChannelStatus {
        channel: String,
        reason: Option<String>,
    },
    /// Any command token without a defined meaning. Carries the token.
    Unrecognized(String),
}

impl DeviceMessage {
    /// Wire token for `LIVETV_READY`.
    pub const LIVETV_READY: &'static str = "LIVETV_READY";
    /// Wire token for `CH_STATUS`.
    pub const CH_STATUS: &'static str = "CH_STATUS";

    /// Returns the command token this message was decoded from.
    pub fn command(&self) -> &str {
        match self {
            DeviceMessage::LiveTvReady => Self::LIVETV_READY,
            DeviceMessage::ChannelStatus { .. } => Self::CH_STATUS,
            DeviceMessage::Unrecognized(token) => token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ir_code_membership() {
        assert!(is_ir_code("MUTE"));
        assert!(is_ir_code("NUM0"));
        assert!(is_ir_code("VIDEO_MODE_FIXED_480i"));
        assert!(is_ir_code("ACTION_D"));
        assert!(!is_ir_code("mute"));
        assert!(!is_ir_code("NOT_A_CODE"));
        assert!(!is_ir_code("NUM10"));
        assert!(!is_ir_code(""));
    }

    #[test]
    fn test_every_digit_has_a_key() {
        for d in '0'..='9' {
            assert!(is_ir_code(&format!("NUM{}", d)));
        }
    }

    #[test]
    fn test_mode_serialization() {
        assert_eq!(serde_json::to_string(&Mode::LiveTv).unwrap(), "\"LIVETV\"");
        assert_eq!(serde_json::to_string(&Mode::Unknown).unwrap(), "\"UNKNOWN\"");
        assert_eq!(Mode::default(), Mode::Unknown);
    }

    #[test]
    fn test_message_command_token() {
        assert_eq!(DeviceMessage::LiveTvReady.command(), "LIVETV_READY");
        let status = DeviceMessage::ChannelStatus {
            channel: "0007".to_string(),
            reason: None,
        };
        assert_eq!(status.command(), "CH_STATUS");
        assert_eq!(DeviceMessage::Unrecognized("CH_FAILED".to_string()).command(), "CH_FAILED");
    }
}
