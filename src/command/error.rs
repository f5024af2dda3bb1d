use thiserror::Error;

use crate::transport::error::TransportError;
use crate::transport::response::ResponseCode;

///
/// All errors emitted from the command layer.
///
/// - `Unsupported`: The device replied UNSUPPORTED for a command that does not swallow it.
/// - `UnexpectedResponse`: The device replied with a response code (CRC_MISMATCH,
///     QUERY_OVERFLOW) that the caller's payload cannot be parsed against.
///     Parameters:
///     - `code`: The response code actually received
/// - `Transport`: Any lower-level transport failure.
///
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Device does not support this command")]
    Unsupported,

    #[error("Device reported an unexpected response code: {:?}", .code)]
    UnexpectedResponse { code: ResponseCode },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
