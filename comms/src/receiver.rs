use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{Deserialize, HEADER_SIZE, Header};

/// The receiving end handle of the communication.
pub struct WireReceiver<R: AsyncRead + Unpin> {
    rx: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> WireReceiver<R> {
    /// Creates a new `WireReceiver` instance.
    ///
    /// # Arguments
    /// * `rx` - The underlying reader.
    pub(super) fn new(rx: R) -> Self {
        Self {
            rx,
            buf: Vec::new(),
        }
    }

    /// Waits to receive a new message from the inner receiver.
    ///
    /// Reads exactly one header and then exactly the amount of payload bytes it announces.
    ///
    /// # Returns
    /// A result object that returns `T` on success or `io::Error` on failure. A clean
    /// end of stream surfaces as `io::ErrorKind::UnexpectedEof`, a malformed frame as
    /// `io::ErrorKind::InvalidData`.
    pub async fn recv<T: Deserialize>(&mut self) -> io::Result<T> {
        let mut header_buf = [0; HEADER_SIZE];
        self.rx.read_exact(&mut header_buf).await?;
        let header = Header::read(&header_buf)?;

        self.buf.clear();
        self.buf.resize(header.payload_len as usize, 0);
        self.rx.read_exact(&mut self.buf).await?;

        T::deserialize(&header, &self.buf)
    }
}
