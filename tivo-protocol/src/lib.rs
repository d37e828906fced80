//! Wire protocol definitions for the TiVo TCP remote-control interface.
//!
//! The device listens on TCP port 31339 and speaks ASCII lines terminated by
//! a carriage return in both directions.
//!
//! # Example
//!
//! ```rust
//! use tivo_protocol::{decode_line, ircode_command, DeviceMessage, LineFramer};
//!
//! let mut framer = LineFramer::new();
//! let lines = framer.feed(b"LIVETV_READY\rCH_STATUS 0007 OK\r");
//! assert_eq!(lines.len(), 2);
//!
//! assert_eq!(decode_line(&lines[0]).unwrap(), DeviceMessage::LiveTvReady);
//! assert_eq!(ircode_command("MUTE"), "IRCODE MUTE");
//! ```

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{decode_line, encode_command_into, ircode_command, LineFramer};
pub use error::{ClientError, ProtocolError};
pub use types::{
    is_ir_code, DeviceMessage, Mode, IRCODE_PREFIX, IR_CODES, LINE_DELIMITER, MAX_LINE_LEN,
    TIVO_PORT,
};
