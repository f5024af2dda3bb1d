use thiserror::Error;

use crate::codec::error::CodecError;
use crate::link::error::LinkError;

///
/// All errors emitted from the request/response transport.
///
/// - `Link`: A lower-level serial link failure (open/IO/timeout).
/// - `Codec`: A framing failure while decoding the response.
/// - `DeviceError`: The device replied with `GENERIC_ERROR` or an unrecognised response code.
///     Parameters:
///     - `code`: The raw response code byte
///
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Serial link error: {0}")]
    Link(#[from] LinkError),

    #[error("Packet framing error: {0}")]
    Codec(#[from] CodecError),

    #[error("Device reported an error (response code {:#04x})", .code)]
    DeviceError { code: u8 },
}
