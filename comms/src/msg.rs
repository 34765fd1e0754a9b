use std::io;

use bytes::{Buf, BufMut};

use crate::{Deserialize, Header, Kind, Serialize};

const F64_SIZE: usize = size_of::<f64>();

/// Which edge of a partition a row belongs to.
///
/// In a `Boundary` message it names the sender's own edge row, in a `Ghost`
/// message it names the receiver's ghost row being refreshed. `Solo` is only
/// valid in `Boundary` messages from a worker without neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Top,
    Bottom,
    Solo,
}

impl Edge {
    fn to_byte(self) -> u8 {
        match self {
            Edge::Top => 0,
            Edge::Bottom => 1,
            Edge::Solo => 2,
        }
    }

    fn from_byte(byte: u8) -> io::Result<Self> {
        match byte {
            0 => Ok(Edge::Top),
            1 => Ok(Edge::Bottom),
            2 => Ok(Edge::Solo),
            byte => Err(invalid_data(format!("invalid edge byte {byte}"))),
        }
    }
}

/// The per-iteration verdict broadcast by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Converge,
    Abort,
}

impl Outcome {
    fn to_byte(self) -> u8 {
        match self {
            Outcome::Continue => 0,
            Outcome::Converge => 1,
            Outcome::Abort => 2,
        }
    }

    fn from_byte(byte: u8) -> io::Result<Self> {
        match byte {
            0 => Ok(Outcome::Continue),
            1 => Ok(Outcome::Converge),
            2 => Ok(Outcome::Abort),
            byte => Err(invalid_data(format!("invalid outcome byte {byte}"))),
        }
    }
}

/// Partition assignment sent to a worker right after its `Hello`.
#[derive(Debug, Clone, PartialEq)]
pub struct InitSpec {
    /// Index of the receiving worker in the partition plan.
    pub worker: u32,
    /// Total amount of workers taking part in the run.
    pub workers: u32,
    /// First owned global row.
    pub row_start: u32,
    /// One past the last owned global row.
    pub row_end: u32,
    /// Amount of columns of the grid.
    pub width: u32,
    pub epsilon: f64,
    /// Diffusion coefficient of the stencil.
    pub alpha: f64,
    pub has_prev: bool,
    pub has_next: bool,
    /// Initial values of the local block, ghost rows included, row-major.
    pub rows: Vec<f64>,
}

impl InitSpec {
    /// Amount of rows owned by the receiving worker.
    pub fn owned_rows(&self) -> usize {
        self.row_end.saturating_sub(self.row_start) as usize
    }

    /// Amount of rows in the local block, ghosts included.
    pub fn block_rows(&self) -> usize {
        self.owned_rows() + usize::from(self.has_prev) + usize::from(self.has_next)
    }
}

/// The application layer message for the entire system.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Worker identity, first message on every connection.
    Hello { name: String },
    Init(InitSpec),
    /// A worker's fresh edge row and its local max-delta for `iteration`.
    Boundary {
        iteration: u32,
        edge: Edge,
        row: Vec<f64>,
        max_delta: f64,
    },
    /// A neighbor's edge row relayed by the coordinator.
    Ghost {
        iteration: u32,
        edge: Edge,
        row: Vec<f64>,
    },
    Decision { iteration: u32, outcome: Outcome },
    /// A worker's final owned rows, row-major.
    Result { iteration: u32, rows: Vec<f64> },
    Terminate,
}

impl Msg {
    /// Short name of this message's kind.
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }
}

impl Serialize for Msg {
    fn kind(&self) -> Kind {
        match self {
            Msg::Hello { .. } => Kind::Hello,
            Msg::Init(_) => Kind::Init,
            Msg::Boundary { .. } => Kind::Boundary,
            Msg::Ghost { .. } => Kind::Ghost,
            Msg::Decision { .. } => Kind::Decision,
            Msg::Result { .. } => Kind::Result,
            Msg::Terminate => Kind::Terminate,
        }
    }

    fn iteration(&self) -> u32 {
        match self {
            Msg::Boundary { iteration, .. }
            | Msg::Ghost { iteration, .. }
            | Msg::Decision { iteration, .. }
            | Msg::Result { iteration, .. } => *iteration,
            Msg::Hello { .. } | Msg::Init(_) | Msg::Terminate => 0,
        }
    }

    fn serialize(&self, buf: &mut Vec<u8>) {
        match self {
            Msg::Hello { name } => buf.put_slice(name.as_bytes()),
            Msg::Init(spec) => {
                buf.put_u32(spec.worker);
                buf.put_u32(spec.workers);
                buf.put_u32(spec.row_start);
                buf.put_u32(spec.row_end);
                buf.put_u32(spec.width);
                buf.put_f64(spec.epsilon);
                buf.put_f64(spec.alpha);
                buf.put_u8(u8::from(spec.has_prev));
                buf.put_u8(u8::from(spec.has_next));
                put_values(buf, &spec.rows);
            }
            Msg::Boundary {
                edge,
                row,
                max_delta,
                ..
            } => {
                buf.put_u8(edge.to_byte());
                put_values(buf, row);
                buf.put_f64(*max_delta);
            }
            Msg::Ghost { edge, row, .. } => {
                buf.put_u8(edge.to_byte());
                put_values(buf, row);
            }
            Msg::Decision { outcome, .. } => buf.put_u8(outcome.to_byte()),
            Msg::Result { rows, .. } => put_values(buf, rows),
            Msg::Terminate => {}
        }
    }
}

impl Deserialize for Msg {
    fn deserialize(header: &Header, mut payload: &[u8]) -> io::Result<Self> {
        if payload.len() != header.payload_len as usize {
            return Err(invalid_data(format!(
                "payload length mismatch, header says {} bytes, got {}",
                header.payload_len,
                payload.len()
            )));
        }

        let iteration = header.iteration;
        let buf = &mut payload;

        let msg = match header.kind {
            Kind::Hello => {
                let name = std::str::from_utf8(buf.chunk()).map_err(invalid_data)?.to_string();
                let rest = buf.remaining();
                buf.advance(rest);
                Msg::Hello { name }
            }
            Kind::Init => {
                let worker = take_u32(buf)?;
                let workers = take_u32(buf)?;
                let row_start = take_u32(buf)?;
                let row_end = take_u32(buf)?;
                let width = take_u32(buf)?;
                let epsilon = take_f64(buf)?;
                let alpha = take_f64(buf)?;
                let has_prev = take_flag(buf)?;
                let has_next = take_flag(buf)?;
                let count = buf.remaining() / F64_SIZE;
                let rows = take_values(buf, count)?;

                Msg::Init(InitSpec {
                    worker,
                    workers,
                    row_start,
                    row_end,
                    width,
                    epsilon,
                    alpha,
                    has_prev,
                    has_next,
                    rows,
                })
            }
            Kind::Boundary => {
                let edge = Edge::from_byte(take_u8(buf)?)?;
                let count = buf.remaining().saturating_sub(F64_SIZE) / F64_SIZE;
                let row = take_values(buf, count)?;
                let max_delta = take_f64(buf)?;

                Msg::Boundary {
                    iteration,
                    edge,
                    row,
                    max_delta,
                }
            }
            Kind::Ghost => {
                let edge = Edge::from_byte(take_u8(buf)?)?;
                if edge == Edge::Solo {
                    return Err(invalid_data("a ghost row must name the top or bottom edge"));
                }

                let count = buf.remaining() / F64_SIZE;
                let row = take_values(buf, count)?;
                Msg::Ghost {
                    iteration,
                    edge,
                    row,
                }
            }
            Kind::Decision => {
                let outcome = Outcome::from_byte(take_u8(buf)?)?;
                Msg::Decision { iteration, outcome }
            }
            Kind::Result => {
                let count = buf.remaining() / F64_SIZE;
                let rows = take_values(buf, count)?;
                Msg::Result { iteration, rows }
            }
            Kind::Terminate => Msg::Terminate,
        };

        if buf.has_remaining() {
            return Err(invalid_data(format!(
                "{} trailing bytes after a {} payload",
                buf.remaining(),
                header.kind.name()
            )));
        }

        Ok(msg)
    }
}

fn invalid_data<E>(err: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, err)
}

fn truncated(needed: usize, remaining: usize) -> io::Error {
    invalid_data(format!(
        "truncated payload, needed {needed} more bytes but only {remaining} remain"
    ))
}

fn ensure(buf: &[u8], needed: usize) -> io::Result<()> {
    if buf.len() < needed {
        return Err(truncated(needed, buf.len()));
    }

    Ok(())
}

fn take_u8(buf: &mut &[u8]) -> io::Result<u8> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

fn take_flag(buf: &mut &[u8]) -> io::Result<bool> {
    match take_u8(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        byte => Err(invalid_data(format!("invalid flag byte {byte}"))),
    }
}

fn take_u32(buf: &mut &[u8]) -> io::Result<u32> {
    ensure(buf, size_of::<u32>())?;
    Ok(buf.get_u32())
}

fn take_f64(buf: &mut &[u8]) -> io::Result<f64> {
    ensure(buf, F64_SIZE)?;
    Ok(buf.get_f64())
}

fn take_values(buf: &mut &[u8], count: usize) -> io::Result<Vec<f64>> {
    ensure(buf, count * F64_SIZE)?;
    Ok((0..count).map(|_| buf.get_f64()).collect())
}

fn put_values(buf: &mut Vec<u8>, values: &[f64]) {
    buf.reserve(values.len() * F64_SIZE);
    for &value in values {
        buf.put_f64(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(msg: &Msg) -> (Header, Vec<u8>) {
        let mut payload = Vec::new();
        msg.serialize(&mut payload);

        let header = Header {
            kind: msg.kind(),
            iteration: msg.iteration(),
            payload_len: payload.len() as u32,
        };

        (header, payload)
    }

    #[test]
    fn boundary_payload_layout() {
        let msg = Msg::Boundary {
            iteration: 7,
            edge: Edge::Bottom,
            row: vec![1.0, 2.5],
            max_delta: 0.125,
        };

        let (header, payload) = encode(&msg);
        assert_eq!(header.iteration, 7);
        assert_eq!(payload.len(), 1 + 2 * 8 + 8);
        assert_eq!(payload[0], 1);
        assert_eq!(&payload[1..9], &1.0f64.to_be_bytes());

        assert_eq!(Msg::deserialize(&header, &payload).unwrap(), msg);
    }

    #[test]
    fn solo_boundary_carries_only_the_delta() {
        let msg = Msg::Boundary {
            iteration: 0,
            edge: Edge::Solo,
            row: Vec::new(),
            max_delta: 3.0,
        };

        let (header, payload) = encode(&msg);
        assert_eq!(payload.len(), 1 + 8);
        assert_eq!(Msg::deserialize(&header, &payload).unwrap(), msg);
    }

    #[test]
    fn init_keeps_flags_and_rows() {
        let msg = Msg::Init(InitSpec {
            worker: 1,
            workers: 3,
            row_start: 4,
            row_end: 6,
            width: 2,
            epsilon: 1e-3,
            alpha: 0.25,
            has_prev: true,
            has_next: false,
            rows: vec![0.0; 6],
        });

        let (header, payload) = encode(&msg);
        let Msg::Init(spec) = Msg::deserialize(&header, &payload).unwrap() else {
            panic!("expected init");
        };

        assert_eq!(spec.owned_rows(), 2);
        assert_eq!(spec.block_rows(), 3);
        assert!(spec.has_prev && !spec.has_next);
    }

    #[test]
    fn ragged_row_payload_is_rejected() {
        let (mut header, mut payload) = encode(&Msg::Result {
            iteration: 1,
            rows: vec![1.0, 2.0],
        });
        payload.push(0);
        header.payload_len += 1;

        let err = Msg::deserialize(&header, &payload).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let (mut header, payload) = encode(&Msg::Terminate);
        header.payload_len = 4;
        assert!(Msg::deserialize(&header, &payload).is_err());
    }

    #[test]
    fn solo_ghost_is_rejected() {
        let (header, mut payload) = encode(&Msg::Ghost {
            iteration: 0,
            edge: Edge::Top,
            row: vec![1.0],
        });
        payload[0] = 2;
        assert!(Msg::deserialize(&header, &payload).is_err());
    }

    #[test]
    fn bad_outcome_byte_is_rejected() {
        let header = Header {
            kind: Kind::Decision,
            iteration: 0,
            payload_len: 1,
        };
        assert!(Msg::deserialize(&header, &[9]).is_err());
    }
}
