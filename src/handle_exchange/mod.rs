//! Handle Exchange (HX): the auxiliary side channel that carries OS handles (file
//! descriptors on Unix, `HANDLE`s on Windows) alongside the RPC byte stream, per spec §4.4.
//!
//! `Transport` never sees an `OsHandle`; the two are deliberately kept apart so that no
//! platform type leaks into the core engine (spec §9, "cross-boundary OS handles" re-
//! architecture note). A module that needs to move a handle sends a TX message requesting
//! the exchange first (ordering guarantee from spec §4.4), then calls [`HandleExchange::send`]
//! or [`HandleExchange::recv`] on the side channel.

use crate::error::Result;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::UnixHandleExchange;
#[cfg(windows)]
pub use windows::WindowsHandleExchange;

/// An OS handle in flight between client and server. On Unix this is a raw file descriptor;
/// on Windows, a raw `HANDLE` value already duplicated into the receiver's process. Either
/// way it fits in a `u64`, matching the wire-sized `xrtp_Handle` in the original design
/// (widened from the original's `u32` so a 64-bit Windows `HANDLE` round-trips losslessly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsHandle(pub u64);

/// One send must be matched by exactly one receive on the peer (spec §4.4). Implementations
/// transfer ownership: the sender's copy is only valid to close after [`HandleExchange::send`]
/// returns, and the receiver becomes responsible for releasing whatever `send` handed it.
pub trait HandleExchange: Send + Sync {
    /// Sends one dummy byte with `handle` attached out-of-band. Blocks until accepted by the
    /// side channel.
    fn send(&self, handle: OsHandle) -> Result<()>;

    /// Blocks until a handle sent by the peer's matching `send` arrives.
    fn recv(&self) -> Result<OsHandle>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_handle_is_copy_and_comparable() {
        let a = OsHandle(7);
        let b = a;
        assert_eq!(a, b);
    }
}
