//!
//! Response codes and a cursor-based reader over a decoded response payload.
//!

use byteorder::{ByteOrder, LittleEndian};

use crate::codec::DecodedPacket;

/// Response codes a master or slave controller may reply with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    GenericError,
    Ok,
    BufferOverflow,
    CrcMismatch,
    QueryOverflow,
    Unsupported,
    /// Anything outside the known range; the raw byte is kept for error reporting.
    Unknown(u8),
}

impl ResponseCode {
    pub fn from_byte(byte: u8) -> ResponseCode {
        match byte {
            0x80 => ResponseCode::GenericError,
            0x81 => ResponseCode::Ok,
            0x82 => ResponseCode::BufferOverflow,
            0x83 => ResponseCode::CrcMismatch,
            0x84 => ResponseCode::QueryOverflow,
            0x85 => ResponseCode::Unsupported,
            other => ResponseCode::Unknown(other),
        }
    }
}

///
/// A decoded response, with a read cursor over the bytes following the response code.
///
/// # Fields:
/// - `code`: The interpreted response code
/// - `data`: The bytes following the response code
/// - `cursor`: The next unread offset into `data`
///
#[derive(Debug, Clone)]
pub struct Response {
    code: ResponseCode,
    data: Vec<u8>,
    cursor: usize,
}

impl Response {
    pub(crate) fn from_decoded(packet: DecodedPacket) -> Response {
        Response { code: ResponseCode::from_byte(packet.code), data: packet.data, cursor: 0 }
    }

    pub fn code(&self) -> ResponseCode {
        self.code
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn get_u8(&mut self) -> u8 {
        let value = self.data[self.cursor];
        self.cursor += 1;
        value
    }

    pub fn get_i8(&mut self) -> i8 {
        self.get_u8() as i8
    }

    pub fn get_u16(&mut self) -> u16 {
        let value = LittleEndian::read_u16(&self.data[self.cursor..self.cursor + 2]);
        self.cursor += 2;
        value
    }

    pub fn get_i16(&mut self) -> i16 {
        let value = LittleEndian::read_i16(&self.data[self.cursor..self.cursor + 2]);
        self.cursor += 2;
        value
    }

    pub fn get_u32(&mut self) -> u32 {
        let value = LittleEndian::read_u32(&self.data[self.cursor..self.cursor + 4]);
        self.cursor += 4;
        value
    }

    pub fn get_i32(&mut self) -> i32 {
        let value = LittleEndian::read_i32(&self.data[self.cursor..self.cursor + 4]);
        self.cursor += 4;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with(bytes: Vec<u8>) -> Response {
        Response::from_decoded(DecodedPacket { code: 0x81, data: bytes })
    }

    #[test]
    fn little_endian_roundtrip_u32() {
        let mut buf = vec![0u8; 4];
        LittleEndian::write_u32(&mut buf, 0xDEADBEEF);
        let mut resp = response_with(buf);
        assert_eq!(resp.get_u32(), 0xDEADBEEF);
    }

    #[test]
    fn little_endian_roundtrip_mixed_widths() {
        let mut buf = vec![0u8; 1 + 2 + 4];
        buf[0] = 0xAB;
        LittleEndian::write_i16(&mut buf[1..3], -5);
        LittleEndian::write_u32(&mut buf[3..7], 123456);

        let mut resp = response_with(buf);
        assert_eq!(resp.get_u8(), 0xAB);
        assert_eq!(resp.get_i16(), -5);
        assert_eq!(resp.get_u32(), 123456);
    }

    #[test]
    fn classifies_known_codes() {
        assert_eq!(ResponseCode::from_byte(0x81), ResponseCode::Ok);
        assert_eq!(ResponseCode::from_byte(0x82), ResponseCode::BufferOverflow);
        assert_eq!(ResponseCode::from_byte(0x99), ResponseCode::Unknown(0x99));
    }
}
