use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::socket::{self, MsgFlags};

use super::DuplexStream;

/// A [`DuplexStream`] backed by a connected Unix domain socket.
pub struct UnixDuplexStream {
    inner: UnixStream,
    open: AtomicBool,
}

impl UnixDuplexStream {
    pub fn new(inner: UnixStream) -> Self {
        Self {
            inner,
            open: AtomicBool::new(true),
        }
    }
}

impl DuplexStream for UnixDuplexStream {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.inner).read(buf)
    }

    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        (&self.inner).write_all(buf)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) -> io::Result<()> {
        self.open.store(false, Ordering::Release);
        match self.inner.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn shutdown_write(&self) -> io::Result<()> {
        match self.inner.shutdown(Shutdown::Write) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn available(&self) -> io::Result<usize> {
        let mut probe = [0u8; 1];
        match socket::recv(self.inner.as_raw_fd(), &mut probe, MsgFlags::MSG_PEEK | MsgFlags::MSG_DONTWAIT) {
            Ok(n) => Ok(n),
            Err(nix::errno::Errno::EAGAIN) => Ok(0),
            Err(e) => Err(io::Error::from_raw_os_error(e as i32)),
        }
    }
}
