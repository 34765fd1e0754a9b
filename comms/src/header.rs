use std::io;

use bytes::{Buf, BufMut};

/// Size in bytes of the fixed frame header: kind (1), iteration (4), payload length (4).
pub const HEADER_SIZE: usize = 1 + 4 + 4;

/// Frames announcing a bigger payload are rejected before allocating for them.
pub const MAX_PAYLOAD_LEN: u32 = 1 << 28;

/// The message type tag of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Kind {
    Hello = 0,
    Init = 1,
    Boundary = 2,
    Ghost = 3,
    Decision = 4,
    Result = 5,
    Terminate = 6,
}

impl Kind {
    /// Human readable name, used in logs and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Kind::Hello => "hello",
            Kind::Init => "init",
            Kind::Boundary => "boundary",
            Kind::Ghost => "ghost",
            Kind::Decision => "decision",
            Kind::Result => "result",
            Kind::Terminate => "terminate",
        }
    }
}

impl TryFrom<u8> for Kind {
    type Error = io::Error;

    fn try_from(byte: u8) -> io::Result<Self> {
        let kind = match byte {
            0 => Kind::Hello,
            1 => Kind::Init,
            2 => Kind::Boundary,
            3 => Kind::Ghost,
            4 => Kind::Decision,
            5 => Kind::Result,
            6 => Kind::Terminate,
            byte => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("received an invalid kind byte {byte}"),
                ));
            }
        };

        Ok(kind)
    }
}

/// The fixed-size header preceding every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub kind: Kind,
    pub iteration: u32,
    pub payload_len: u32,
}

impl Header {
    /// Writes this header, big-endian, into the first `HEADER_SIZE` bytes of `buf`.
    pub fn write(&self, mut buf: &mut [u8]) {
        buf.put_u8(self.kind as u8);
        buf.put_u32(self.iteration);
        buf.put_u32(self.payload_len);
    }

    /// Parses a header, rejecting unknown kinds and oversized payloads.
    pub fn read(bytes: &[u8; HEADER_SIZE]) -> io::Result<Self> {
        let mut buf = &bytes[..];
        let kind = Kind::try_from(buf.get_u8())?;
        let iteration = buf.get_u32();
        let payload_len = buf.get_u32();

        if payload_len > MAX_PAYLOAD_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("payload of {payload_len} bytes exceeds the {MAX_PAYLOAD_LEN} bytes limit"),
            ));
        }

        Ok(Self {
            kind,
            iteration,
            payload_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_big_endian() {
        let header = Header {
            kind: Kind::Ghost,
            iteration: 0x0102_0304,
            payload_len: 17,
        };

        let mut bytes = [0; HEADER_SIZE];
        header.write(&mut bytes);

        assert_eq!(bytes, [3, 1, 2, 3, 4, 0, 0, 0, 17]);
        assert_eq!(Header::read(&bytes).unwrap(), header);
    }

    #[test]
    fn unknown_kind_is_invalid_data() {
        let bytes = [42, 0, 0, 0, 0, 0, 0, 0, 0];
        let err = Header::read(&bytes).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let mut bytes = [0; HEADER_SIZE];
        Header {
            kind: Kind::Result,
            iteration: 0,
            payload_len: MAX_PAYLOAD_LEN + 1,
        }
        .write(&mut bytes);

        assert!(Header::read(&bytes).is_err());
    }
}
