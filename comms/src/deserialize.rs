use std::io;

use crate::Header;

/// A message that can be rebuilt from a frame header and its payload.
pub trait Deserialize: Sized {
    /// Decodes `payload`, which must be consumed entirely.
    ///
    /// # Errors
    /// An `io::ErrorKind::InvalidData` error if the payload does not match the header's kind.
    fn deserialize(header: &Header, payload: &[u8]) -> io::Result<Self>;
}
