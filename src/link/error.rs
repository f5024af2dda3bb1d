use thiserror::Error;

///
/// All errors emitted from the serial link.
///
/// - `PortNotFound`: When the configured port name does not match any enumerated serial device.
///     Parameters:
///     - `name`: The requested port name
/// - `PortInUse`: When the port exists but is already claimed by another process.
///     Parameters:
///     - `name`: The requested port name
/// - `PortOpenError`: When opening the port failed for any other reason.
///     Parameters:
///     - `name`: The requested port name
///     - `reason`: The underlying error message
/// - `IoError`: A transient read/write failure once the port is open.
///     Parameters:
///     - `reason`: The underlying error message
/// - `Timeout`: A `read_one` call exceeded its configured timeout.
///
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Serial port '{}' was not found", .name)]
    PortNotFound { name: String },

    #[error("Serial port '{}' is already in use", .name)]
    PortInUse { name: String },

    #[error("Failed to open serial port '{}': {}", .name, .reason)]
    PortOpenError { name: String, reason: String },

    #[error("Serial I/O error: {}", .reason)]
    IoError { reason: String },

    #[error("Read timed out")]
    Timeout,
}
