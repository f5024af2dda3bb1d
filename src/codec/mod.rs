//!
//! Wire framing: packet encoding, CRC-8/iButton, and the byte-at-a-time decoder
//!

pub mod error;

use once_cell::sync::Lazy;

use error::CodecError;

/// Start-of-frame marker for every packet on the wire.
pub const START_BYTE: u8 = 0xD5;

/// iButton/Dallas CRC-8 lookup table, polynomial 0x8C reflected, built once on first use.
static CRC_TABLE: Lazy<[u8; 256]> = Lazy::new(|| {
    let mut table = [0u8; 256];
    let mut byte: usize = 0;
    while byte < 256 {
        let mut acc = byte as u8;
        let mut bit = 0;
        while bit < 8 {
            acc = if acc & 0x01 != 0 { (acc >> 1) ^ 0x8C } else { acc >> 1 };
            bit += 1;
        }
        table[byte] = acc;
        byte += 1;
    }
    table
});

///
/// Computes the iButton CRC-8 of a byte slice, seeded at 0.
///
/// # Parameters:
/// - `bytes`: The bytes to checksum
///
/// # Returns:
/// - The 8-bit CRC
///
pub fn crc8(bytes: &[u8]) -> u8 {
    let mut acc: u8 = 0;
    for &byte in bytes {
        acc ^= byte;
        acc = CRC_TABLE[acc as usize];
    }
    acc
}

///
/// Builds a complete outbound packet from a request payload.
/// Layout: `START(0xD5) | LEN | payload... | CRC(payload)`.
///
/// # Parameters:
/// - `payload`: The request bytes, command byte first
///
/// # Returns:
/// - The framed bytes ready to write to the serial link
/// - An error if the payload cannot be addressed by a single length byte
///
pub fn encode(payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    if payload.len() > u8::MAX as usize {
        return Err(CodecError::PayloadTooLarge { len: payload.len() });
    }

    let mut framed = Vec::with_capacity(payload.len() + 3);
    framed.push(START_BYTE);
    framed.push(payload.len() as u8);
    framed.extend_from_slice(payload);
    framed.push(crc8(payload));

    Ok(framed)
}

///
/// A fully framed and validated response payload, decoded from the wire.
///
/// # Fields:
/// - `code`: The response code byte (first byte of the payload)
/// - `data`: Any bytes following the response code
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    pub code: u8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    AwaitStart,
    AwaitLength,
    InPayload { remaining: usize },
    AwaitCrc,
}

///
/// Byte-at-a-time framing state machine for inbound packets. Feed bytes with
/// `push_byte` until it reports a complete frame via `Some(..)`.
///
pub struct Decoder {
    state: DecoderState,
    payload: Vec<u8>,
}

impl Decoder {
    ///
    /// Creates a fresh decoder, ready to scan for a start byte.
    ///
    pub fn new() -> Decoder {
        Decoder { state: DecoderState::AwaitStart, payload: Vec::new() }
    }

    ///
    /// Feeds a single byte into the decoder.
    ///
    /// # Parameters:
    /// - `byte`: The next byte read from the serial link
    ///
    /// # Returns:
    /// - `None` if the packet is not yet complete
    /// - `Some(Ok(packet))` once a CRC-valid packet has been framed
    /// - `Some(Err(CodecError::CrcMismatch))` once a packet framed but failed its CRC check
    ///
    pub fn push_byte(&mut self, byte: u8) -> Option<Result<DecodedPacket, CodecError>> {
        match self.state {
            DecoderState::AwaitStart => {
                if byte == START_BYTE {
                    self.state = DecoderState::AwaitLength;
                }
                None
            }

            DecoderState::AwaitLength => {
                self.payload.clear();
                self.payload.reserve(byte as usize);
                self.state = if byte == 0 {
                    DecoderState::AwaitCrc
                } else {
                    DecoderState::InPayload { remaining: byte as usize }
                };
                None
            }

            DecoderState::InPayload { remaining } => {
                self.payload.push(byte);
                if remaining == 1 {
                    self.state = DecoderState::AwaitCrc;
                } else {
                    self.state = DecoderState::InPayload { remaining: remaining - 1 };
                }
                None
            }

            DecoderState::AwaitCrc => {
                let computed = crc8(&self.payload);
                self.state = DecoderState::AwaitStart;

                if byte != computed {
                    return Some(Err(CodecError::CrcMismatch { expected: byte, computed }));
                }

                if self.payload.is_empty() {
                    // a zero-length payload has no response code; protocol never sends this,
                    // but the decoder should not panic on it.
                    return Some(Ok(DecodedPacket { code: 0, data: Vec::new() }));
                }

                let code = self.payload[0];
                let data = self.payload[1..].to_vec();
                Some(Ok(DecodedPacket { code, data }))
            }
        }
    }
}

impl Default for Decoder {
    fn default() -> Decoder {
        Decoder::new()
    }
}
