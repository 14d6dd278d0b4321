//! Move-only guard types that tie possession of the Transport's message lock to the
//! borrow checker: each one wraps a [`parking_lot::ReentrantMutexGuard`] and is therefore
//! `!Clone`, so the only way to hold the lock is to hold one of these.

use std::io::{self, Read, Write};

use parking_lot::ReentrantMutexGuard;

use crate::error::Result;
use crate::framed::{ReceiveBuffer, SendBuffer};
use crate::stream::DuplexStream;

use super::Transport;

/// Holds the message lock with nothing else attached, for callers that need to bracket
/// several Transport calls (e.g. a send immediately followed by an await) without another
/// thread's traffic interleaving between them. Obtained from
/// [`Transport::acquire_message_lock`].
pub struct MessageLock<'t> {
    transport: &'t Transport,
    _guard: ReentrantMutexGuard<'t, ()>,
}

impl<'t> MessageLock<'t> {
    pub(super) fn new(transport: &'t Transport, guard: ReentrantMutexGuard<'t, ()>) -> Self {
        MessageLock {
            transport,
            _guard: guard,
        }
    }

    /// Re-entrant: the caller already holds the lock, so this cannot deadlock.
    pub fn start_message(&self, header: u16) -> Result<MessageLockOut<'t>> {
        self.transport.start_message(header)
    }

    /// Re-entrant: the caller already holds the lock, so this cannot deadlock.
    pub fn await_message(&self, header: u16) -> Result<MessageLockIn<'t>> {
        self.transport.await_message(header)
    }
}

/// An in-flight outgoing message. Write the payload to it with [`std::io::Write`], then
/// either call [`MessageLockOut::flush`] or simply drop the guard; either way the frame is
/// written to the stream as one contiguous header-then-payload write (no other writer can
/// interleave, since the message lock is held until then) and the message lock is released.
pub struct MessageLockOut<'t> {
    _guard: ReentrantMutexGuard<'t, ()>,
    stream: std::sync::Arc<dyn DuplexStream>,
    header: u16,
    buf: SendBuffer,
    flushed: bool,
}

impl<'t> MessageLockOut<'t> {
    pub(super) fn new(
        _transport: &'t Transport,
        guard: ReentrantMutexGuard<'t, ()>,
        stream: std::sync::Arc<dyn DuplexStream>,
        header: u16,
    ) -> Self {
        MessageLockOut {
            _guard: guard,
            stream,
            header,
            buf: SendBuffer::new(),
            flushed: false,
        }
    }

    /// The header this message was started with.
    pub fn header(&self) -> u16 {
        self.header
    }

    /// Back-patches the frame's size and writes the header then the payload to the stream.
    /// Consumes the guard, releasing the message lock.
    pub fn flush(mut self) -> Result<()> {
        self.do_flush()
    }

    fn do_flush(&mut self) -> Result<()> {
        if self.flushed {
            return Ok(());
        }
        self.flushed = true;
        crate::framed::write_frame(self.stream.as_ref(), self.header, self.buf.data())
    }
}

impl<'t> Write for MessageLockOut<'t> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(&mut self.buf)
    }
}

impl<'t> Drop for MessageLockOut<'t> {
    fn drop(&mut self) {
        if !self.flushed {
            if let Err(e) = self.do_flush() {
                log::error!("failed to flush message with header {}: {e}", self.header);
            }
        }
    }
}

/// A received message, still holding the message lock. Read the payload with
/// [`std::io::Read`].
pub struct MessageLockIn<'t> {
    _guard: ReentrantMutexGuard<'t, ()>,
    header: u16,
    buf: ReceiveBuffer,
}

impl<'t> MessageLockIn<'t> {
    pub(super) fn new(
        _transport: &'t Transport,
        guard: ReentrantMutexGuard<'t, ()>,
        header: u16,
        buf: ReceiveBuffer,
    ) -> Self {
        MessageLockIn {
            _guard: guard,
            header,
            buf,
        }
    }

    /// The header this message was received with.
    pub fn header(&self) -> u16 {
        self.header
    }

    /// The number of payload bytes not yet consumed via [`std::io::Read`].
    pub fn remaining(&self) -> usize {
        self.buf.remaining().len()
    }

    /// Consumes the guard and returns the raw, possibly partially-read, payload bytes.
    pub fn into_payload(self) -> Vec<u8> {
        self.buf.into_inner()
    }
}

impl<'t> Read for MessageLockIn<'t> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.buf.read(out)
    }
}
