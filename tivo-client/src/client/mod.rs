//! Device connection and protocol state machine.

pub mod backoff;
pub mod connection;
pub mod interpreter;
pub mod state;
pub mod translator;

pub use backoff::Backoff;
pub use connection::{ConnectionConfig, TivoClient};
pub use interpreter::{Outcome, ResponseInterpreter, Transition};
pub use state::{ConnectionState, DeviceState, Mode};
pub use translator::{is_channel_number, CommandTranslator, WireWriter};
