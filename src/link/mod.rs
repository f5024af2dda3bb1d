//!
//! Ownership of the physical serial device: buffered reads, blocking writes, and
//! the DTR reset pulse.
//!

pub mod buffer;
pub mod error;
pub mod port;

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use buffer::ReceiveBuffer;
use error::LinkError;
use port::LinkPort;

use crate::config::LinkConfig;

/// How long the background reader blocks on a single OS read before checking the stop flag.
const READER_POLL_INTERVAL: Duration = Duration::from_millis(50);

///
/// Owns a serial device: a background thread drains bytes from it into a shared
/// receive buffer, while `write`/`read_one`/`pulse_reset_low` give the foreground
/// command thread blocking access.
///
/// # Fields:
/// - `device`: The underlying OS (or mock) port, guarded so the reader and the
///   foreground writer never touch it at the same time
/// - `buffer`: The FIFO of bytes the reader has delivered but nothing has consumed yet
/// - `buffer_cv`: Signalled whenever the reader appends to `buffer`
/// - `stop`: Set to stop the reader thread on `close`
/// - `reader`: The background reader's join handle, taken on close
/// - `read_timeout_ms`: The timeout `read_one` honours; 0 means block indefinitely
///
pub struct SerialLink {
    device: Arc<Mutex<Option<Box<dyn LinkPort>>>>,
    buffer: Arc<Mutex<ReceiveBuffer>>,
    buffer_cv: Arc<Condvar>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    read_timeout_ms: Arc<AtomicU64>,
}

impl SerialLink {
    ///
    /// Opens the OS serial port named in `config` and starts the background reader.
    ///
    /// # Parameters:
    /// - `config`: Port name, baud rate, and line parameters
    ///
    /// # Returns:
    /// - A `SerialLink` ready for `write`/`read_one`
    /// - `LinkError::PortNotFound`/`PortInUse`/`PortOpenError` if the port could not be opened
    ///
    pub fn open(config: &LinkConfig) -> Result<SerialLink, LinkError> {
        if !port::port_exists(config.port_name()) {
            return Err(LinkError::PortNotFound { name: config.port_name().clone() });
        }

        let opened = port::open_os_port(
            config.port_name(),
            *config.baud_rate(),
            config.parity().to_serialport(),
            serialport::DataBits::Eight,
            config.stop_bits().to_serialport(),
        )
        .map_err(|err| classify_open_error(config.port_name(), err))?;

        Ok(SerialLink::from_port(Box::new(opened)))
    }

    ///
    /// Wraps an already-open port (real or mock) and starts the background reader.
    /// Used directly by tests to drive the link against an in-memory mock port.
    ///
    pub fn from_port(port: Box<dyn LinkPort>) -> SerialLink {
        let device = Arc::new(Mutex::new(Some(port)));
        let buffer = Arc::new(Mutex::new(ReceiveBuffer::new()));
        let buffer_cv = Arc::new(Condvar::new());
        let stop = Arc::new(AtomicBool::new(false));
        let read_timeout_ms = Arc::new(AtomicU64::new(0));

        let reader = {
            let device = Arc::clone(&device);
            let buffer = Arc::clone(&buffer);
            let buffer_cv = Arc::clone(&buffer_cv);
            let stop = Arc::clone(&stop);

            thread::spawn(move || reader_loop(device, buffer, buffer_cv, stop))
        };

        SerialLink { device, buffer, buffer_cv, stop, reader: Some(reader), read_timeout_ms }
    }

    ///
    /// Writes every byte of `bytes` to the device, then flushes.
    ///
    /// # Parameters:
    /// - `bytes`: The framed packet to transmit
    ///
    pub fn write(&self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut guard = self.device.lock().expect("serial device mutex poisoned");
        match guard.as_mut() {
            Some(port) => port.write_all(bytes).map_err(|err| LinkError::IoError { reason: err.to_string() }),
            None => Err(LinkError::IoError { reason: "link is closed".to_owned() }),
        }
    }

    ///
    /// Returns the next buffered byte, waiting up to the configured read timeout if
    /// the buffer is currently empty. A timeout of 0 waits indefinitely.
    ///
    /// # Returns:
    /// - `Some(byte)` once a byte becomes available
    /// - `None` if the timeout elapsed first
    ///
    pub fn read_one(&self) -> Option<u8> {
        let timeout_ms = self.read_timeout_ms.load(Ordering::SeqCst);
        let mut guard = self.buffer.lock().expect("receive buffer mutex poisoned");

        if timeout_ms == 0 {
            loop {
                if let Some(byte) = guard.pop() {
                    return Some(byte);
                }
                guard = self.buffer_cv.wait(guard).expect("receive buffer condvar poisoned");
            }
        }

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if let Some(byte) = guard.pop() {
                return Some(byte);
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }

            let (next_guard, result) = self
                .buffer_cv
                .wait_timeout(guard, deadline - now)
                .expect("receive buffer condvar poisoned");
            guard = next_guard;

            if result.timed_out() && guard.available() == 0 {
                return None;
            }
        }
    }

    ///
    /// # Returns:
    /// - The number of bytes currently pending in the receive buffer
    ///
    pub fn available(&self) -> usize {
        self.buffer.lock().expect("receive buffer mutex poisoned").available()
    }

    ///
    /// Discards any pending bytes in the receive buffer.
    ///
    pub fn clear(&self) {
        self.buffer.lock().expect("receive buffer mutex poisoned").clear();
    }

    ///
    /// Installs the read timeout (milliseconds) used by subsequent `read_one` calls.
    /// 0 means "no timeout" (block indefinitely).
    ///
    pub fn set_timeout(&self, ms: u64) {
        self.read_timeout_ms.store(ms, Ordering::SeqCst);
    }

    ///
    /// Drives DTR low, sleeps `settle_ms`, then drives it high again to hard-reset
    /// the attached device.
    ///
    pub fn pulse_reset_low(&self, settle_ms: u64) -> Result<(), LinkError> {
        {
            let mut guard = self.device.lock().expect("serial device mutex poisoned");
            let port = guard.as_mut().ok_or_else(|| LinkError::IoError { reason: "link is closed".to_owned() })?;
            port.write_data_terminal_ready(false).map_err(|err| LinkError::IoError { reason: err.to_string() })?;
        }

        thread::sleep(Duration::from_millis(settle_ms));

        let mut guard = self.device.lock().expect("serial device mutex poisoned");
        let port = guard.as_mut().ok_or_else(|| LinkError::IoError { reason: "link is closed".to_owned() })?;
        port.write_data_terminal_ready(true).map_err(|err| LinkError::IoError { reason: err.to_string() })
    }

    ///
    /// Closes input then output then the port, in that order; idempotent.
    ///
    pub fn close(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.buffer_cv.notify_all();

        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }

        // input (reader) is stopped above; output/port close together since this
        // backend exposes one bidirectional handle rather than split streams.
        let mut guard = self.device.lock().expect("serial device mutex poisoned");
        *guard = None;
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
    }
}

fn reader_loop(
    device: Arc<Mutex<Option<Box<dyn LinkPort>>>>,
    buffer: Arc<Mutex<ReceiveBuffer>>,
    buffer_cv: Arc<Condvar>,
    stop: Arc<AtomicBool>,
) {
    let mut scratch = [0u8; 256];

    while !stop.load(Ordering::SeqCst) {
        let read_result = {
            let mut guard = device.lock().expect("serial device mutex poisoned");
            match guard.as_mut() {
                Some(port) => {
                    let _ = port.set_timeout(READER_POLL_INTERVAL);
                    port.read(&mut scratch)
                }
                None => return,
            }
        };

        match read_result {
            Ok(0) => continue,
            Ok(count) => {
                let mut buf_guard = buffer.lock().expect("receive buffer mutex poisoned");
                for &byte in &scratch[..count] {
                    buf_guard.push(byte);
                }
                drop(buf_guard);
                buffer_cv.notify_all();
            }
            Err(err) if err.kind() == io::ErrorKind::TimedOut || err.kind() == io::ErrorKind::WouldBlock => {
                continue;
            }
            Err(_) => {
                // transient I/O hiccup; back off briefly rather than spinning
                thread::sleep(Duration::from_millis(5));
            }
        }
    }
}

fn classify_open_error(name: &str, err: serialport::Error) -> LinkError {
    match err.kind() {
        serialport::ErrorKind::NoDevice => LinkError::PortNotFound { name: name.to_owned() },
        serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) | serialport::ErrorKind::Io(io::ErrorKind::AlreadyExists) => {
            LinkError::PortInUse { name: name.to_owned() }
        }
        _ => LinkError::PortOpenError { name: name.to_owned(), reason: err.to_string() },
    }
}
