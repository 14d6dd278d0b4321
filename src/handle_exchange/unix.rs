//! Unix implementation of [`HandleExchange`]: a connected `AF_UNIX` socket carrying one
//! dummy byte plus an `SCM_RIGHTS` ancillary message per exchange.
//!
//! Grounded directly on
//! `original_source/src/modules/handle_exchange_linux/{client,server}_handle_exchange_linux.cpp`,
//! reimplemented with the `nix` crate's `sendmsg`/`recvmsg` instead of the original's raw
//! `sendmsg(2)`/`cmsg` macros.

use std::io::{IoSlice, IoSliceMut};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Mutex;

use nix::cmsg_space;
use nix::sys::socket::{recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags};

use crate::error::{Error, Result};

use super::{HandleExchange, OsHandle};

/// A connected Unix-domain handle-exchange channel. `send` and `recv` are each serialized by
/// their own mutex so two logical exchanges on the same channel (which the spec says never
/// interleave, because the owning TX message brackets them) cannot scribble over each other's
/// dummy byte if a caller violates that discipline.
pub struct UnixHandleExchange {
    socket: UnixStream,
    send_lock: Mutex<()>,
    recv_lock: Mutex<()>,
}

impl UnixHandleExchange {
    /// Wraps an already-connected socket (the server's `accept()`ed peer, or the client's
    /// `connect()`ed socket to the path the server advertised over TX).
    pub fn new(socket: UnixStream) -> Self {
        UnixHandleExchange {
            socket,
            send_lock: Mutex::new(()),
            recv_lock: Mutex::new(()),
        }
    }

    /// Server-side helper: binds `path`, removing a stale socket file first, and accepts
    /// exactly one client connection. Mirrors
    /// `xrtp_on_instance`/`XRTP_MSG_HANDLE_EXCHANGE_LINUX_CLIENT_CONNECTING` in the original,
    /// collapsed into one blocking call since this crate has no module-discovery phase to
    /// interleave it with.
    pub fn bind_and_accept(path: &str) -> Result<Self> {
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path)
            .map_err(|e| Error::ImportFailed(format!("bind {path}: {e}")))?;
        let (socket, _addr) = listener
            .accept()
            .map_err(|e| Error::ImportFailed(format!("accept on {path}: {e}")))?;
        Ok(Self::new(socket))
    }

    /// Client-side helper: connects to the path the server advertised.
    pub fn connect(path: &str) -> Result<Self> {
        let socket = UnixStream::connect(path)
            .map_err(|e| Error::ImportFailed(format!("connect to {path}: {e}")))?;
        Ok(Self::new(socket))
    }

    fn raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

impl HandleExchange for UnixHandleExchange {
    fn send(&self, handle: OsHandle) -> Result<()> {
        let _guard = self.send_lock.lock()?;
        let fd = handle.0 as RawFd;
        let dummy = [0u8; 1];
        let iov = [IoSlice::new(&dummy)];
        let fds = [fd];
        let cmsg = [ControlMessage::ScmRights(&fds)];
        sendmsg::<()>(self.raw_fd(), &iov, &cmsg, MsgFlags::empty(), None)
            .map_err(|e| Error::ImportFailed(format!("sendmsg with SCM_RIGHTS failed: {e}")))?;
        // Safe to close our copy only now that sendmsg has returned (spec §3, ownership).
        nix::unistd::close(fd).ok();
        Ok(())
    }

    fn recv(&self) -> Result<OsHandle> {
        let _guard = self.recv_lock.lock()?;
        let mut dummy = [0u8; 1];
        let mut iov = [IoSliceMut::new(&mut dummy)];
        let mut cmsg_buf = cmsg_space!(RawFd);
        let msg = recvmsg::<()>(self.raw_fd(), &mut iov, Some(&mut cmsg_buf), MsgFlags::empty())
            .map_err(|e| Error::ImportFailed(format!("recvmsg failed: {e}")))?;

        for cmsg in msg.cmsgs() {
            if let ControlMessageOwned::ScmRights(fds) = cmsg {
                if let Some(&fd) = fds.first() {
                    return Ok(OsHandle(fd as u64));
                }
            }
        }
        Err(Error::ImportFailed(
            "recvmsg completed without an SCM_RIGHTS control message".to_string(),
        ))
    }
}
