use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};

use super::DuplexStream;

/// A [`DuplexStream`] backed by a connected [`TcpStream`].
pub struct TcpDuplexStream {
    inner: TcpStream,
    open: AtomicBool,
}

impl TcpDuplexStream {
    pub fn new(inner: TcpStream) -> io::Result<Self> {
        inner.set_nodelay(true)?;
        Ok(Self {
            inner,
            open: AtomicBool::new(true),
        })
    }
}

impl DuplexStream for TcpDuplexStream {
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
            // Already disconnected; closing is idempotent from our point of view.
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
        // `peek` does not consume the bytes, so repeated calls (from `wait_readable`'s poll
        // loop, or a caller just curious) never race with the producer's real read.
        let mut probe = [0u8; 1];
        match self.inner.peek(&mut probe) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }
}
