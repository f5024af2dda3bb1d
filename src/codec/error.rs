use thiserror::Error;

///
/// All errors emitted from the packet codec.
///
/// - `CrcMismatch`: When a framed packet's trailing CRC byte does not match the CRC
///     computed over its payload.
///     Parameters:
///     - `expected`: The CRC byte actually present on the wire
///     - `computed`: The CRC the decoder computed over the payload it collected
/// - `PayloadTooLarge`: When an encode is attempted with a payload longer than a single
///     byte can address.
///     Parameters:
///     - `len`: The requested payload length
///
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("CRC mismatch: device sent {:#04x}, computed {:#04x} over the payload", .expected, .computed)]
    CrcMismatch { expected: u8, computed: u8 },

    #[error("Payload of {} bytes cannot be framed, maximum is 255", .len)]
    PayloadTooLarge { len: usize },
}
