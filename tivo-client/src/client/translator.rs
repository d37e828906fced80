//! Translation of remote-control intents into IR wire commands.

use log::{debug, trace};

use tivo_protocol::{ircode_command, is_ir_code, ClientError};

/// Destination for outbound command lines.
///
/// Implementors queue one line per call; the delimiter is added on the wire.
pub trait WireWriter {
    fn write_line(&mut self, command: &str) -> Result<(), ClientError>;
}

/// Converts caller commands into `IRCODE` lines on a [`WireWriter`].
pub struct CommandTranslator<'a, W: WireWriter> {
    device: &'a str,
    writer: &'a mut W,
}

impl<'a, W: WireWriter> CommandTranslator<'a, W> {
    pub fn new(device: &'a str, writer: &'a mut W) -> Self {
        Self { device, writer }
    }

    /// Dispatch a caller command.
    ///
    /// `arg` is either a code from the IR table or a channel number with a
    /// leading zero. `kind` is carried for logging only.
    pub fn command(&mut self, kind: &str, arg: &str) -> Result<(), ClientError> {
        debug!("[{}] command {} {}", self.device, kind, arg);

        if is_ir_code(arg) {
            self.ircode(arg)
        } else if arg.starts_with('0') {
            self.channel(arg, false)
        } else {
            Err(ClientError::InvalidCommand(arg.to_string()))
        }
    }

    /// Tune to `num` by keying each digit and then `ENTER`.
    ///
    /// `force` is reserved and has no effect on the keys sent.
    pub fn channel(&mut self, num: &str, force: bool) -> Result<(), ClientError> {
        if !is_channel_number(num) {
            return Err(ClientError::InvalidCommand(num.to_string()));
        }
        debug!("[{}] channel {} (force={})", self.device, num, force);

        for digit in num.chars() {
            self.ircode(&format!("NUM{}", digit))?;
        }
        self.ircode("ENTER")
    }

    /// Send a single IR code.
    pub fn ircode(&mut self, code: &str) -> Result<(), ClientError> {
        if !is_ir_code(code) {
            return Err(ClientError::InvalidCommand(code.to_string()));
        }
        let command = ircode_command(code);
        trace!("[{}] ircode {}", self.device, command);
        self.writer.write_line(&command)
    }
}

/// Returns true if every key of `num` has a `NUM` code.
pub fn is_channel_number(num: &str) -> bool {
    !num.is_empty() && num.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
impl WireWriter for Vec<String> {
    fn write_line(&mut self, command: &str) -> Result<(), ClientError> {
        self.push(command.to_string());
        Ok(())
    }
}
