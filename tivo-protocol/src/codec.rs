//! Line framing and command encoding.
//!
//! Both directions carry ASCII lines terminated by a carriage return:
//! ```text
//! device -> client:  LIVETV_READY\r
//!                    CH_STATUS 0007 LOCAL\r
//! client -> device:  IRCODE MUTE\r
//! ```

use bytes::{Buf, BufMut, BytesMut};
use log::warn;

use crate::error::ProtocolError;
use crate::types::*;

/// Splits a byte stream into carriage-return terminated lines.
///
/// Bytes after the last delimiter are kept until a later chunk completes
/// the line. A partial line that grows past [`MAX_LINE_LEN`] is dropped
/// along with the rest of that line up to its delimiter.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: BytesMut,
    /// Skipping the remainder of an oversized line.
    discarding: bool,
}

impl LineFramer {
    /// Create an empty framer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            discarding: false,
        }
    }

    /// Append `chunk` and return every line it completed, in arrival order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut chunk = chunk;
        if self.discarding {
            match chunk.iter().position(|&b| b == LINE_DELIMITER) {
                Some(pos) => {
                    self.discarding = false;
                    chunk = &chunk[pos + 1..];
                }
                None => return Vec::new(),
            }
        }
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(line) = self.next_line() {
            lines.push(line);
        }

        if self.buf.len() > MAX_LINE_LEN {
            warn!(
                "Discarding {} bytes of unterminated input (limit {})",
                self.buf.len(),
                MAX_LINE_LEN
            );
            self.buf.clear();
            self.discarding = true;
        }

        lines
    }

    /// Split off the first complete line, if any.
    fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == LINE_DELIMITER)?;
        let line = self.buf.split_to(pos);
        self.buf.advance(1);
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Bytes of the trailing partial line.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Drop any buffered partial line.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }
}

/// Decode one line (delimiter already stripped) into a device message.
///
/// Tokens are separated by single spaces. Unknown command tokens decode to
/// [`DeviceMessage::Unrecognized`] rather than an error.
pub fn decode_line(line: &str) -> Result<DeviceMessage, ProtocolError> {
    let mut tokens = line.split(' ');
    let command = match tokens.next() {
        Some(c) if !c.is_empty() => c,
        _ => return Err(ProtocolError::EmptyLine),
    };

    match command {
        DeviceMessage::LIVETV_READY => Ok(DeviceMessage::LiveTvReady),
        DeviceMessage::CH_STATUS => {
            let channel = tokens
                .next()
                .filter(|t| !t.is_empty())
                .ok_or(ProtocolError::MissingField {
                    command: DeviceMessage::CH_STATUS,
                    field: "channel",
                })?;
            let reason = tokens.next().filter(|t| !t.is_empty());
            Ok(DeviceMessage::ChannelStatus {
                channel: channel.to_string(),
                reason: reason.map(str::to_string),
            })
        }
        other => Ok(DeviceMessage::Unrecognized(other.to_string())),
    }
}

/// Build the wire command for an IR code: `IRCODE <code>`.
pub fn ircode_command(code: &str) -> String {
    format!("{} {}", IRCODE_PREFIX, code)
}

/// Append an encoded command line to an existing buffer.
pub fn encode_command_into(command: &str, out: &mut BytesMut) {
    out.reserve(command.len() + 1);
    out.put_slice(command.as_bytes());
    out.put_u8(LINE_DELIMITER);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_single_line() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"LIVETV_READY\r"), vec!["LIVETV_READY"]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_feed_two_lines_in_one_chunk() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"LIVETV_READY\rCH_STATUS 0007 OK\r");
        assert_eq!(lines, vec!["LIVETV_READY", "CH_STATUS 0007 OK"]);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn test_partial_line_is_retained() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"CH_STAT").is_empty());
        assert_eq!(framer.pending(), b"CH_STAT");

        let lines = framer.feed(b"US 0012 LOCAL\rLIVE");
        assert_eq!(lines, vec!["CH_STATUS 0012 LOCAL"]);
        assert_eq!(framer.pending(), b"LIVE");

        assert_eq!(framer.feed(b"TV_READY\r"), vec!["LIVETV_READY"]);
    }

    #[test]
    fn test_empty_lines_are_emitted() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"\r\rX\r"), vec!["", "", "X"]);
    }

    #[test]
    fn test_newline_is_not_a_delimiter() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"A\nB\r"), vec!["A\nB"]);
    }

    #[test]
    fn test_oversized_partial_line_is_discarded() {
        let mut framer = LineFramer::new();
        let junk = vec![b'x'; MAX_LINE_LEN + 1];
        assert!(framer.feed(&junk).is_empty());
        assert!(framer.pending().is_empty());
        assert_eq!(framer.feed(b"LIVETV_READY\r"), vec!["LIVETV_READY"]);
    }

    #[test]
    fn test_oversized_line_tail_is_skipped() {
        let mut framer = LineFramer::new();
        let junk = vec![b'x'; MAX_LINE_LEN + 1];
        assert!(framer.feed(&junk).is_empty());
        assert!(framer.feed(b"xxxxMORE").is_empty());
        assert!(framer.pending().is_empty());

        let lines = framer.feed(b"xxxxGARBAGE_TAIL\rLIVETV_READY\r");
        assert_eq!(lines, vec!["LIVETV_READY"]);
        assert_eq!(framer.feed(b"CH_STATUS 0007 OK\r"), vec!["CH_STATUS 0007 OK"]);
    }

    #[test]
    fn test_clear_stops_skipping() {
        let mut framer = LineFramer::new();
        framer.feed(&vec![b'x'; MAX_LINE_LEN + 1]);
        framer.clear();
        assert_eq!(framer.feed(b"LIVETV_READY\r"), vec!["LIVETV_READY"]);
    }

    #[test]
    fn test_clear() {
        let mut framer = LineFramer::new();
        framer.feed(b"CH_STATUS 00");
        framer.clear();
        assert_eq!(framer.feed(b"07 OK\r"), vec!["07 OK"]);
    }

    #[test]
    fn test_decode_livetv_ready() {
        assert_eq!(decode_line("LIVETV_READY").unwrap(), DeviceMessage::LiveTvReady);
    }

    #[test]
    fn test_decode_channel_status() {
        assert_eq!(
            decode_line("CH_STATUS 0007 OK").unwrap(),
            DeviceMessage::ChannelStatus {
                channel: "0007".to_string(),
                reason: Some("OK".to_string()),
            }
        );
        assert_eq!(
            decode_line("CH_STATUS 0007").unwrap(),
            DeviceMessage::ChannelStatus {
                channel: "0007".to_string(),
                reason: None,
            }
        );
    }

    #[test]
    fn test_decode_channel_status_without_channel() {
        assert_eq!(
            decode_line("CH_STATUS"),
            Err(ProtocolError::MissingField {
                command: "CH_STATUS",
                field: "channel",
            })
        );
    }

    #[test]
    fn test_decode_unknown_token() {
        assert_eq!(
            decode_line("CH_FAILED NO_LIVE").unwrap(),
            DeviceMessage::Unrecognized("CH_FAILED".to_string())
        );
        assert_eq!(decode_line(""), Err(ProtocolError::EmptyLine));
    }

    #[test]
    fn test_encode_ircode() {
        assert_eq!(ircode_command("MUTE"), "IRCODE MUTE");

        let mut out = BytesMut::new();
        encode_command_into("IRCODE NUM0", &mut out);
        encode_command_into("IRCODE ENTER", &mut out);
        assert_eq!(&out[..], b"IRCODE NUM0\rIRCODE ENTER\r");
    }
}
