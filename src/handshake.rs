//! The one-time magic+version handshake performed before a [`crate::transport::Transport`]
//! is handed the stream, per spec §6.
//!
//! This is deliberately not part of `Transport` itself: the handshake is a fixed exchange of
//! four scalars with no framing, run once while the stream is otherwise untouched, while
//! `Transport` only ever speaks the length-prefixed frame format from `Transport::start`
//! onward. Keeping them separate means `Transport` has exactly one wire format to reason
//! about.

use crate::error::{Error, Result};
use crate::stream::DuplexStream;

/// `"XRTP"` read as a little-endian `u32`.
pub const MAGIC: u32 = 0x5054_5258;

/// The protocol version this crate speaks. Bumped only on a wire-incompatible change to the
/// handshake or frame format themselves, not on additions to the function surface layered on
/// top (that versioning, if any, is the generated dispatch table's concern).
pub const PROTOCOL_VERSION: u32 = 1;

fn write_u32(stream: &dyn DuplexStream, v: u32) -> Result<()> {
    stream.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn read_u32(stream: &dyn DuplexStream) -> Result<u32> {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn write_u64(stream: &dyn DuplexStream, v: u64) -> Result<()> {
    stream.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn read_u64(stream: &dyn DuplexStream) -> Result<u64> {
    let mut buf = [0u8; 8];
    stream.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Runs the client side of the handshake: sends our magic/versions first, matching the wire
/// diagram in spec §6 where the client's arrows (`→`) lead.
pub fn client_handshake(stream: &dyn DuplexStream, xr_api_version: u64) -> Result<()> {
    write_u32(stream, MAGIC)?;
    let peer_magic = read_u32(stream)?;
    if peer_magic != MAGIC {
        return Err(Error::BadMagic {
            expected: MAGIC,
            actual: peer_magic,
        });
    }

    write_u64(stream, xr_api_version)?;
    write_u32(stream, PROTOCOL_VERSION)?;
    let peer_xr_api_version = read_u64(stream)?;
    let peer_protocol_version = read_u32(stream)?;

    let ok = xr_api_version == peer_xr_api_version && peer_protocol_version == PROTOCOL_VERSION;
    write_u32(stream, ok as u32)?;
    let peer_ok = read_u32(stream)?;

    if !ok || peer_ok == 0 {
        return Err(Error::HandshakeFailed(format!(
            "version mismatch: ours xr_api={xr_api_version} proto={PROTOCOL_VERSION}, \
             theirs xr_api={peer_xr_api_version} proto={peer_protocol_version}"
        )));
    }
    Ok(())
}

/// Runs the server side of the handshake: replies to the client's magic/versions first.
pub fn server_handshake(stream: &dyn DuplexStream, xr_api_version: u64) -> Result<()> {
    let peer_magic = read_u32(stream)?;
    if peer_magic != MAGIC {
        return Err(Error::BadMagic {
            expected: MAGIC,
            actual: peer_magic,
        });
    }
    write_u32(stream, MAGIC)?;

    let peer_xr_api_version = read_u64(stream)?;
    let peer_protocol_version = read_u32(stream)?;
    write_u64(stream, xr_api_version)?;
    write_u32(stream, PROTOCOL_VERSION)?;

    let ok = xr_api_version == peer_xr_api_version && peer_protocol_version == PROTOCOL_VERSION;
    let peer_ok = read_u32(stream)?;
    write_u32(stream, ok as u32)?;

    if !ok || peer_ok == 0 {
        return Err(Error::HandshakeFailed(format!(
            "version mismatch: ours xr_api={xr_api_version} proto={PROTOCOL_VERSION}, \
             theirs xr_api={peer_xr_api_version} proto={peer_protocol_version}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::PairedBuffer;
    use std::thread;

    #[test]
    fn matching_versions_succeed_on_both_sides() {
        let (client, server) = PairedBuffer::pair();
        let server_thread = thread::spawn(move || server_handshake(&server, 42));
        client_handshake(&client, 42).unwrap();
        server_thread.join().unwrap().unwrap();
    }

    #[test]
    fn mismatched_api_version_fails_both_sides() {
        let (client, server) = PairedBuffer::pair();
        let server_thread = thread::spawn(move || server_handshake(&server, 99));
        let client_result = client_handshake(&client, 42);
        assert!(client_result.is_err());
        assert!(server_thread.join().unwrap().is_err());
    }
}
