//! Stream abstraction: the lowest layer of the bridge.
//!
//! Everything above this module talks to a [`DuplexStream`] and does not care whether the
//! bytes travel over TCP, a Unix domain socket, or an in-memory pipe used in tests.
//!
//! Methods take `&self` rather than `&mut self` because the transport layer reads and writes
//! concurrently from two different threads (one dedicated to reading frames off the wire, one
//! driven by whichever caller currently holds the message lock and wants to send). This mirrors
//! how a raw socket fd behaves: reads and writes are independent directions and the OS already
//! serializes each one, so the abstraction does not need a `Mutex` around the whole stream.

use std::io;
use std::sync::Arc;

mod paired;
mod tcp;
#[cfg(unix)]
mod unix;

pub use paired::PairedBuffer;
pub use tcp::TcpDuplexStream;
#[cfg(unix)]
pub use unix::UnixDuplexStream;

/// A stream that can be read from and written to concurrently from different threads, and shut
/// down to interrupt a blocked read.
pub trait DuplexStream: Send + Sync {
    /// Reads at least one byte into `buf`, blocking until data is available. Returns `Ok(0)`
    /// only once the peer has closed the connection.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes `buf` in full, blocking until every byte has been accepted by the stream.
    fn write_all(&self, buf: &[u8]) -> io::Result<()>;

    /// Returns whether the stream is still usable. Once `false`, all future reads and writes
    /// should fail.
    fn is_open(&self) -> bool;

    /// Closes both halves of the stream, interrupting any in-flight blocking read.
    fn close(&self) -> io::Result<()>;

    /// Half-closes the write side only, if the underlying transport supports it. The default
    /// implementation falls back to a full [`DuplexStream::close`].
    fn shutdown_write(&self) -> io::Result<()> {
        self.close()
    }

    /// Reads exactly `buf.len()` bytes, returning `UnexpectedEof` if the peer closes early.
    fn read_exact(&self, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read(buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "stream closed before the expected number of bytes were read",
                    ))
                }
                Ok(n) => buf = &mut buf[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Number of bytes immediately readable without blocking. The default implementation
    /// reports nothing available; backends that can cheaply query this (e.g. `MSG_PEEK`)
    /// override it.
    fn available(&self) -> io::Result<usize> {
        Ok(0)
    }
}

/// The async "wait until readable" capability from spec §4.1. Split from [`DuplexStream`]
/// because the in-memory test harness and the real socket backends satisfy it in
/// completely different ways, and because nothing in the Transport itself needs it (the
/// producer thread just does a blocking read); it exists for callers layered on top (e.g. an
/// acceptor loop polling several not-yet-started transports) that want to avoid dedicating a
/// thread per connection before there is any traffic to dispatch.
pub trait StreamWait: Send + Sync {
    /// Invokes `cb` exactly once, from an unspecified thread, once at least one byte is
    /// readable on the stream or the stream has failed/closed. Implementations must not
    /// consume the byte that made the stream readable; callers still read it normally
    /// afterwards.
    fn wait_readable(&self, cb: Box<dyn FnOnce() + Send>);
}

/// Spawns a dedicated thread that polls [`DuplexStream::available`] (backed by a
/// non-consuming peek on real sockets) until it is nonzero or the stream closes, then invokes
/// the callback. This is the "spawned thread" option `SPEC_FULL.md` calls out for
/// [`StreamWait`], since a `poll`/`select`-based reactor is out of scope for this crate (the
/// Transport's own worker pool is the concurrency model).
pub fn spawn_wait_readable<S>(stream: Arc<S>, cb: Box<dyn FnOnce() + Send>)
where
    S: DuplexStream + 'static,
{
    std::thread::Builder::new()
        .name("xrbridge-wait-readable".into())
        .spawn(move || {
            loop {
                match stream.available() {
                    Ok(0) if stream.is_open() => {
                        std::thread::sleep(std::time::Duration::from_millis(1));
                        continue;
                    }
                    _ => break,
                }
            }
            cb();
        })
        .expect("failed to spawn wait_readable thread");
}

impl<S> StreamWait for Arc<S>
where
    S: DuplexStream + 'static,
{
    fn wait_readable(&self, cb: Box<dyn FnOnce() + Send>) {
        spawn_wait_readable(self.clone(), cb);
    }
}
