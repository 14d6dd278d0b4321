//! Framed message layer: turns a raw byte stream into discrete, length-prefixed messages.
//!
//! Wire format for a single frame:
//!
//! ```text
//! header   : u16 little-endian   (message type)
//! reserved : u16 little-endian   (must be zero, reserved for future use)
//! size     : u32 little-endian   (payload length in bytes)
//! payload  : [u8; size]
//! ```

use std::io::{self, Read, Write};

use crate::error::{Error, Result};
use crate::stream::DuplexStream;

/// Frames with a declared payload larger than this are rejected outright, to keep a
/// misbehaving or malicious peer from forcing an unbounded allocation.
pub const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

const HEADER_LEN: usize = 8;

/// The decoded fixed-size prefix of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub header: u16,
    pub size: u32,
}

impl FrameHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..2].copy_from_slice(&self.header.to_le_bytes());
        // bytes 2..4 are the reserved field, left zeroed
        buf[4..8].copy_from_slice(&self.size.to_le_bytes());
        buf
    }

    pub fn decode(buf: [u8; HEADER_LEN]) -> Self {
        FrameHeader {
            header: u16::from_le_bytes([buf[0], buf[1]]),
            size: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }
}

/// Accumulates a single outgoing message in memory before it is flushed to the stream in one
/// write, mirroring the C++ `SendBuffer`.
#[derive(Default)]
pub struct SendBuffer {
    buf: Vec<u8>,
}

impl SendBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Write for SendBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A fully received message payload, readable in order for deserialization.
pub struct ReceiveBuffer {
    buf: Vec<u8>,
    cursor: usize,
}

impl ReceiveBuffer {
    pub fn new(buf: Vec<u8>) -> Self {
        Self { buf, cursor: 0 }
    }

    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.cursor..]
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl Read for ReceiveBuffer {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let n = usize::min(out.len(), self.buf.len() - self.cursor);
        out[..n].copy_from_slice(&self.buf[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(n)
    }
}

/// Writes a complete frame (header + the bytes accumulated in `send_buf`) to `stream` in two
/// `write_all` calls.
pub fn write_frame(stream: &dyn DuplexStream, header: u16, payload: &[u8]) -> Result<()> {
    let frame_header = FrameHeader {
        header,
        size: payload.len() as u32,
    };
    stream.write_all(&frame_header.encode())?;
    stream.write_all(payload)?;
    Ok(())
}

/// Blocks until a full frame has been read from `stream`, returning its header and payload.
/// Returns `Ok(None)` if the stream was closed cleanly before a new frame began. Equivalent
/// to [`read_frame_limited`] with [`MAX_FRAME_SIZE`].
pub fn read_frame(stream: &dyn DuplexStream) -> Result<Option<(u16, Vec<u8>)>> {
    read_frame_limited(stream, MAX_FRAME_SIZE)
}

/// Like [`read_frame`], but rejects a declared payload size larger than `max_size` instead
/// of the crate-wide default. Used by [`crate::transport::Transport`], which carries its own
/// configured limit.
pub fn read_frame_limited(stream: &dyn DuplexStream, max_size: u32) -> Result<Option<(u16, Vec<u8>)>> {
    let mut header_buf = [0u8; HEADER_LEN];
    if let Err(e) = read_exact_or_eof(stream, &mut header_buf)? {
        let _ = e;
        return Ok(None);
    }
    let header = FrameHeader::decode(header_buf);
    if header.size > max_size {
        return Err(Error::FrameTooLarge(header.size));
    }
    let mut payload = vec![0u8; header.size as usize];
    stream.read_exact(&mut payload)?;
    Ok(Some((header.header, payload)))
}

/// Like `DuplexStream::read_exact`, but treats a clean EOF on the very first byte as "no more
/// frames" rather than an error, returning `Ok(Err(()))` in that case.
fn read_exact_or_eof(stream: &dyn DuplexStream, buf: &mut [u8]) -> Result<std::result::Result<(), ()>> {
    let first = stream.read(&mut buf[..1])?;
    if first == 0 {
        return Ok(Err(()));
    }
    stream.read_exact(&mut buf[1..])?;
    Ok(Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::PairedBuffer;

    #[test]
    fn header_round_trips() {
        let h = FrameHeader {
            header: 0x1234,
            size: 0xdead_beef,
        };
        assert_eq!(FrameHeader::decode(h.encode()), h);
    }

    #[test]
    fn write_then_read_frame() {
        let (a, b) = PairedBuffer::pair();
        write_frame(&a, 7, b"payload").unwrap();
        let (header, payload) = read_frame(&b).unwrap().unwrap();
        assert_eq!(header, 7);
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn empty_payload_round_trips() {
        let (a, b) = PairedBuffer::pair();
        write_frame(&a, 42, &[]).unwrap();
        let (header, payload) = read_frame(&b).unwrap().unwrap();
        assert_eq!(header, 42);
        assert!(payload.is_empty());
    }

    #[test]
    fn clean_close_before_next_frame_yields_none() {
        let (a, b) = PairedBuffer::pair();
        a.close().unwrap();
        assert!(read_frame(&b).unwrap().is_none());
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let (a, b) = PairedBuffer::pair();
        let header = FrameHeader {
            header: 1,
            size: MAX_FRAME_SIZE + 1,
        };
        a.write_all(&header.encode()).unwrap();
        let err = read_frame(&b).unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge(_)));
    }
}
