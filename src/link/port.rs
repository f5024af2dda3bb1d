//!
//! The boundary between this crate and the real OS serial stack, so tests can
//! drive the link against a mock without opening actual hardware.
//!

use std::io;
use std::time::Duration;

///
/// The subset of serial-port operations the link needs. The production implementation
/// is `Box<dyn serialport::SerialPort>`; tests substitute an in-memory mock.
///
pub trait LinkPort: Send {
    ///
    /// Reads whatever bytes are currently available into `buf`, blocking up to the
    /// port's configured read timeout. Returns `Ok(0)` (or a `TimedOut` error,
    /// depending on the backend) when nothing arrived in time.
    ///
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    ///
    /// Writes the full buffer and flushes it to the wire.
    ///
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    ///
    /// Installs the read timeout used by subsequent `read` calls.
    ///
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    ///
    /// Drives the DTR modem-control line.
    ///
    fn write_data_terminal_ready(&mut self, level: bool) -> io::Result<()>;
}

impl LinkPort for Box<dyn serialport::SerialPort> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(self.as_mut(), buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        io::Write::write_all(self.as_mut(), buf)?;
        io::Write::flush(self.as_mut())
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        serialport::SerialPort::set_timeout(self.as_mut(), timeout)
    }

    fn write_data_terminal_ready(&mut self, level: bool) -> io::Result<()> {
        serialport::SerialPort::write_data_terminal_ready(self.as_mut(), level)
    }
}

///
/// Opens the named OS serial port with the given line parameters.
///
/// # Parameters:
/// - `name`: The OS-visible device path, e.g. `/dev/ttyACM0` or `COM3`
/// - `baud_rate`: The requested baud rate
/// - `parity`: N/E/O
/// - `data_bits`: Must be 8, enforced by the caller before this is reached
/// - `stop_bits`: 1, 1.5, or 2
///
/// # Returns:
/// - A boxed `serialport::SerialPort` trait object
/// - An `io::Error` describing why the port could not be opened
///
pub fn open_os_port(
    name: &str,
    baud_rate: u32,
    parity: serialport::Parity,
    data_bits: serialport::DataBits,
    stop_bits: serialport::StopBits,
) -> serialport::Result<Box<dyn serialport::SerialPort>> {
    serialport::new(name, baud_rate)
        .parity(parity)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .timeout(Duration::from_millis(0))
        .open()
}

///
/// Lists the OS-visible serial ports, used to check a configured port name actually
/// exists before attempting to open it.
///
pub fn port_exists(name: &str) -> bool {
    serialport::available_ports()
        .map(|ports| ports.iter().any(|p| p.port_name == name))
        .unwrap_or(false)
}
