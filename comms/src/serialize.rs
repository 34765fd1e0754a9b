use crate::Kind;

/// A message that can be framed and written onto the wire.
pub trait Serialize {
    /// The kind tag written in the frame header.
    fn kind(&self) -> Kind;

    /// The iteration index written in the frame header.
    fn iteration(&self) -> u32;

    /// Appends the payload bytes (header excluded) into `buf`.
    fn serialize(&self, buf: &mut Vec<u8>);
}
