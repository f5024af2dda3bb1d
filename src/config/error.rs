use thiserror::Error;

///
/// All errors emitted from the configuration surface.
///
/// - `InvalidDataBits`: When a data bit count other than 8 is requested. The protocol
///     requires exactly 8 data bits; anything else cannot carry the wire framing.
///     Parameters:
///     - `requested`: The data bit count that was supplied
///
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Data bits must be 8, got {}", .requested)]
    InvalidDataBits { requested: u8 },
}
