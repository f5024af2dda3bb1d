use thiserror::Error;

use crate::command::error::CommandError;
use crate::config::Version;
use crate::link::error::LinkError;

///
/// All errors emitted from session startup and lifecycle.
///
/// - `BadFirmwareVersion`: The device reported a firmware version below the configured minimum.
///     Parameters:
///     - `reported`: The version the device reported
///     - `minimum`: The configured minimum supported version
/// - `HandshakeInterrupted`: The foreground thread was interrupted mid-handshake.
/// - `Link`: A lower-level serial link failure while opening the port.
/// - `Command`: A lower-level command/transport failure during VERSION/INIT.
///
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Firmware version {}.{} is below the minimum supported {}.{}", .reported.major, .reported.minor, .minimum.major, .minimum.minor)]
    BadFirmwareVersion { reported: Version, minimum: Version },

    #[error("Handshake was interrupted before the device responded")]
    HandshakeInterrupted,

    #[error("Serial link error: {0}")]
    Link(#[from] LinkError),

    #[error("Command error during handshake: {0}")]
    Command(#[from] CommandError),
}
