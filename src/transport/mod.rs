//!
//! Request/response orchestration: write a framed packet, decode the reply,
//! interpret its response code, and apply BUFFER_OVERFLOW backpressure.
//!

pub mod error;
pub mod response;

use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::codec::{self, Decoder};
use crate::link::error::LinkError;
use crate::link::SerialLink;

use error::TransportError;
use response::{Response, ResponseCode};

///
/// Serializes request/response exchanges over a `SerialLink`, retrying
/// BUFFER_OVERFLOW replies with a fixed-delay resend of the same packet.
///
/// # Fields:
/// - `link`: The underlying serial link
/// - `exchange`: Held for the full duration of a `run_command` call — this is the
///   "port lock" of the protocol design: it prevents two commands from interleaving
///   bytes on the wire, independently of the buffer lock inside `link`
/// - `overflow_backoff_ms`: Sleep between BUFFER_OVERFLOW resends
///
pub struct Transport {
    link: SerialLink,
    exchange: Mutex<()>,
    overflow_backoff_ms: u64,
}

impl Transport {
    ///
    /// Wraps a `SerialLink`, ready to drive request/response exchanges.
    ///
    pub fn new(link: SerialLink, overflow_backoff_ms: u64) -> Transport {
        Transport { link, exchange: Mutex::new(()), overflow_backoff_ms }
    }

    ///
    /// # Returns:
    /// - The underlying serial link, for operations outside the command path
    ///   (e.g. `Session::pulse reset, set_timeout`)
    ///
    pub fn link(&self) -> &SerialLink {
        &self.link
    }

    ///
    /// Sends `payload` as a framed packet and returns the decoded response.
    ///
    /// # Parameters:
    /// - `payload`: The request bytes, command byte first
    ///
    /// # Returns:
    /// - `Ok(response)` for OK and any non-retried response code (caller decides what
    ///   to do with CRC_MISMATCH, QUERY_OVERFLOW, UNSUPPORTED)
    /// - `Err(TransportError::DeviceError)` for GENERIC_ERROR or an unrecognised code
    /// - `Err(TransportError::Link)`/`Codec` on transport or framing failure
    ///
    pub fn run_command(&self, payload: &[u8]) -> Result<Response, TransportError> {
        let _guard = self.exchange.lock().expect("transport exchange mutex poisoned");
        let framed = codec::encode(payload)?;

        loop {
            self.link.write(&framed)?;

            let packet = self.read_packet()?;
            let response = Response::from_decoded(packet);

            match response.code() {
                ResponseCode::BufferOverflow => {
                    log::warn!("device reported BUFFER_OVERFLOW, retrying after {} ms", self.overflow_backoff_ms);
                    thread::sleep(Duration::from_millis(self.overflow_backoff_ms));
                    continue;
                }
                ResponseCode::GenericError => return Err(TransportError::DeviceError { code: 0x80 }),
                ResponseCode::Unknown(code) => return Err(TransportError::DeviceError { code }),
                _ => return Ok(response),
            }
        }
    }

    fn read_packet(&self) -> Result<codec::DecodedPacket, TransportError> {
        let mut decoder = Decoder::new();
        loop {
            let byte = self.link.read_one().ok_or(LinkError::Timeout)?;
            if let Some(result) = decoder.push_byte(byte) {
                return Ok(result?);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::mock::MockPort;
    use std::time::Instant;

    fn transport_with(mock: MockPort) -> Transport {
        let link = SerialLink::from_port(Box::new(mock));
        link.set_timeout(500);
        Transport::new(link, 25)
    }

    #[test]
    fn ok_response_round_trips_version_scenario() {
        let mock = MockPort::new();
        mock.push_inbound(&codec::encode(&[0x81, 0x65, 0x00]).unwrap());
        let transport = transport_with(mock.clone());

        let mut response = transport.run_command(&[0x00, 0x64, 0x00]).unwrap();
        assert_eq!(response.code(), ResponseCode::Ok);
        assert_eq!(response.get_u16(), 0x0065);
        assert_eq!(mock.writes(), vec![vec![0xD5, 0x03, 0x00, 0x64, 0x00, 0xCB]]);
    }

    #[test]
    fn buffer_overflow_resends_until_ok_with_backoff() {
        let mock = MockPort::new();
        mock.push_inbound(&codec::encode(&[0x82]).unwrap());
        mock.push_inbound(&codec::encode(&[0x82]).unwrap());
        mock.push_inbound(&codec::encode(&[0x81]).unwrap());
        let transport = transport_with(mock.clone());

        let start = Instant::now();
        let response = transport.run_command(&[137, 0x87]).unwrap();
        let elapsed = start.elapsed();

        assert_eq!(response.code(), ResponseCode::Ok);
        assert_eq!(mock.writes().len(), 3);
        assert!(mock.writes().iter().all(|w| *w == mock.writes()[0]));
        assert!(elapsed >= Duration::from_millis(50), "expected at least two 25ms backoffs, got {:?}", elapsed);
    }

    #[test]
    fn crc_mismatch_is_surfaced_without_retry() {
        let mock = MockPort::new();
        let mut framed = codec::encode(&[0x81]).unwrap();
        let last = framed.len() - 1;
        framed[last] ^= 0xFF;
        mock.push_inbound(&framed);
        let transport = transport_with(mock.clone());

        let err = transport.run_command(&[0x00, 0x64, 0x00]).unwrap_err();
        assert!(matches!(err, TransportError::Codec(_)));
        assert_eq!(mock.writes().len(), 1);
    }

    #[test]
    fn generic_error_is_surfaced_as_device_error() {
        let mock = MockPort::new();
        mock.push_inbound(&codec::encode(&[0x80]).unwrap());
        let transport = transport_with(mock);

        let err = transport.run_command(&[7]).unwrap_err();
        assert!(matches!(err, TransportError::DeviceError { code: 0x80 }));
    }

    #[test]
    fn read_timeout_surfaces_as_link_error() {
        let mock = MockPort::new();
        let transport = transport_with(mock);
        let err = transport.run_command(&[0]).unwrap_err();
        assert!(matches!(err, TransportError::Link(LinkError::Timeout)));
    }

    #[test]
    fn unsupported_response_is_returned_as_is() {
        let mock = MockPort::new();
        mock.push_inbound(&codec::encode(&[0x85, 0x00]).unwrap());
        let transport = transport_with(mock);

        let response = transport.run_command(&[11]).unwrap();
        assert_eq!(response.code(), ResponseCode::Unsupported);
    }
}
