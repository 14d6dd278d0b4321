//! The concurrent engine that turns a framed byte stream into request/reply and
//! fire-and-forget messaging: a producer thread that drains the stream into a queue, a
//! consumer thread that drains the queue into handlers, and a recursive message lock that
//! lets a synchronous caller "steal" dispatch duty until the message it is waiting for
//! arrives.
//!
//! See `DESIGN.md` for why the lock must be reentrant and why the consumer's
//! release-then-wait ordering is the thing that makes graceful shutdown race-free.

mod guard;
mod status;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use parking_lot::ReentrantMutex;

use crate::error::{Error, Result};
use crate::framed::{self, ReceiveBuffer};
use crate::header;
use crate::stream::DuplexStream;

pub use guard::{MessageLock, MessageLockIn, MessageLockOut};
pub use status::Status;

/// A handler invoked with the message lock already held, on whichever thread noticed the
/// message first (the consumer thread, or a caller stealing dispatch duty from inside
/// `await_message`/`handle_message`).
pub type Handler = dyn for<'t> Fn(&'t Transport, MessageLockIn<'t>) + Send + Sync;

struct QueueState {
    status: Status,
    messages: VecDeque<(u16, Vec<u8>)>,
}

struct Workers {
    producer: JoinHandle<()>,
    consumer: JoinHandle<()>,
}

/// The bidirectional framed message transport described in the module doc. Cheap to clone
/// (an `Arc` internally would be redundant, so `Transport` itself is meant to live behind one
/// `Arc<Transport>`, since the worker threads each need a handle to it).
pub struct Transport {
    stream: Mutex<Option<Arc<dyn DuplexStream>>>,
    message_lock: ReentrantMutex<()>,
    queue: Mutex<QueueState>,
    queue_cv: Condvar,
    handlers: Mutex<HashMap<u16, Arc<Handler>>>,
    workers: Mutex<Option<Workers>>,
    max_frame_size: u32,
}

impl Transport {
    /// Creates a transport in the `CREATED` state. Call [`Transport::start`] to begin reading
    /// and writing.
    pub fn new() -> Arc<Self> {
        Self::with_max_frame_size(framed::MAX_FRAME_SIZE)
    }

    /// Like [`Transport::new`], but with a custom cap on the payload size of a single frame.
    pub fn with_max_frame_size(max_frame_size: u32) -> Arc<Self> {
        Arc::new(Transport {
            stream: Mutex::new(None),
            message_lock: ReentrantMutex::new(()),
            queue: Mutex::new(QueueState {
                status: Status::Created,
                messages: VecDeque::new(),
            }),
            queue_cv: Condvar::new(),
            handlers: Mutex::new(HashMap::new()),
            workers: Mutex::new(None),
            max_frame_size,
        })
    }

    /// Begins using `stream`: spawns the producer and consumer threads and transitions
    /// `CREATED -> OPEN`. Fails with [`Error::AlreadyStarted`] if called twice.
    pub fn start(self: &Arc<Self>, stream: Arc<dyn DuplexStream>) -> Result<()> {
        {
            let mut q = self.queue.lock()?;
            if q.status != Status::Created {
                return Err(Error::AlreadyStarted);
            }
            q.status = Status::Open;
        }
        *self.stream.lock()? = Some(stream);
        log::debug!("transport starting: CREATED -> OPEN");

        let producer_handle = {
            let transport = self.clone();
            std::thread::Builder::new()
                .name("xrbridge-tx-producer".into())
                .spawn(move || transport.run_producer())
                .expect("failed to spawn transport producer thread")
        };
        let consumer_handle = {
            let transport = self.clone();
            std::thread::Builder::new()
                .name("xrbridge-tx-consumer".into())
                .spawn(move || transport.run_consumer())
                .expect("failed to spawn transport consumer thread")
        };
        *self.workers.lock()? = Some(Workers {
            producer: producer_handle,
            consumer: consumer_handle,
        });
        Ok(())
    }

    /// Current lifecycle state. Never blocks.
    pub fn status(&self) -> Status {
        self.queue.lock().map(|q| q.status).unwrap_or(Status::Closed)
    }

    fn stream(&self) -> Option<Arc<dyn DuplexStream>> {
        self.stream.lock().ok().and_then(|s| s.clone())
    }

    /// Begins a new outgoing message with the given header, taking the message lock for the
    /// duration of the returned guard. Appending payload bytes and dropping (or explicitly
    /// flushing) the guard writes the header then the payload to the stream as one contiguous
    /// frame, uninterleaved with any other writer.
    pub fn start_message<'t>(&'t self, header: u16) -> Result<MessageLockOut<'t>> {
        let guard = self.message_lock.lock();
        let status = self.status();
        match status {
            Status::Created => return Err(Error::NotStarted),
            Status::WriteClosed | Status::Closed => return Err(Error::WriteClosed),
            Status::Open => {}
        }
        let stream = self.stream().ok_or(Error::NotStarted)?;
        Ok(MessageLockOut::new(self, guard, stream, header))
    }

    /// Takes the message lock without starting or awaiting a message, for callers that need
    /// to bracket several transport operations atomically (e.g. a handler that must send a
    /// request and await its reply without another thread's traffic interleaving).
    pub fn acquire_message_lock<'t>(&'t self) -> MessageLock<'t> {
        let guard = self.message_lock.lock();
        MessageLock::new(self, guard)
    }

    /// Blocks until a message with header `h` is received, dispatching every other message
    /// to its registered handler (while still holding the message lock) along the way.
    /// Returns the matching message, still holding the message lock.
    pub fn await_message<'t>(&'t self, h: u16) -> Result<MessageLockIn<'t>> {
        if h == header::SHUTDOWN {
            return Err(Error::Shutdown(h));
        }
        let guard = self.message_lock.lock();
        loop {
            match self.pop_or_wait(h)? {
                PopResult::Matched(payload) => {
                    return Ok(MessageLockIn::new(self, guard, h, ReceiveBuffer::new(payload)))
                }
                PopResult::Dispatch(header, payload) => {
                    self.dispatch(header, payload);
                }
            }
        }
    }

    /// Like [`Transport::await_message`], but the matching message is itself dispatched to
    /// its registered handler rather than returned to the caller.
    pub fn handle_message(&self, h: u16) -> Result<()> {
        if h == header::SHUTDOWN {
            return Err(Error::Shutdown(h));
        }
        let _guard = self.message_lock.lock();
        loop {
            match self.pop_or_wait(h)? {
                PopResult::Matched(payload) => {
                    self.dispatch(h, payload);
                    return Ok(());
                }
                PopResult::Dispatch(header, payload) => {
                    self.dispatch(header, payload);
                }
            }
        }
    }

    /// Pops the next queued message, blocking on the queue condition variable when empty.
    /// Returns `Matched` if its header is `h`, `Dispatch` otherwise. Never returns while the
    /// queue is empty and the transport is still open.
    fn pop_or_wait(&self, h: u16) -> Result<PopResult> {
        let mut q = self.queue.lock()?;
        loop {
            if q.status == Status::Closed {
                return Err(Error::Closed);
            }
            if let Some(front) = q.messages.front() {
                let matched = front.0 == h;
                let (header, payload) = q.messages.pop_front().unwrap();
                return Ok(if matched {
                    PopResult::Matched(payload)
                } else {
                    PopResult::Dispatch(header, payload)
                });
            }
            q = self.queue_cv.wait(q)?;
        }
    }

    /// Registers `f` to run, with the message lock held, whenever a message with header `h`
    /// is dispatched. Replaces any previously registered handler for the same header.
    /// Registering for [`header::SHUTDOWN`] is rejected; that header's handling is internal.
    pub fn register_handler<F>(&self, h: u16, f: F) -> Result<()>
    where
        F: for<'t> Fn(&'t Transport, MessageLockIn<'t>) + Send + Sync + 'static,
    {
        if h == header::SHUTDOWN {
            return Err(Error::Shutdown(h));
        }
        self.handlers.lock()?.insert(h, Arc::new(f));
        Ok(())
    }

    /// Removes the handler registered for `h`, if any.
    pub fn unregister_handler(&self, h: u16) -> Result<()> {
        self.handlers.lock()?.remove(&h);
        Ok(())
    }

    /// Removes every registered handler.
    pub fn clear_handlers(&self) -> Result<()> {
        self.handlers.lock()?.clear();
        Ok(())
    }

    /// Sends the `SHUTDOWN` frame and transitions `OPEN -> WRITE_CLOSED`. After this call,
    /// `start_message` fails; inbound handling continues until the peer answers with its own
    /// `SHUTDOWN`, at which point the transport closes.
    pub fn shutdown(&self) -> Result<()> {
        let _guard = self.message_lock.lock();
        {
            let mut q = self.queue.lock()?;
            match q.status {
                Status::Created => return Err(Error::NotStarted),
                Status::WriteClosed | Status::Closed => return Err(Error::WriteClosed),
                Status::Open => q.status = Status::WriteClosed,
            }
        }
        log::debug!("transport shutdown initiated: OPEN -> WRITE_CLOSED");
        let stream = self.stream().ok_or(Error::NotStarted)?;
        framed::write_frame(stream.as_ref(), header::SHUTDOWN, &[])
    }

    /// Forces the transport to `CLOSED`: releases every waiter on the queue condition
    /// (with [`Error::Closed`]) and closes the underlying stream, which unblocks the
    /// producer's in-flight read. Idempotent.
    pub fn close(&self) {
        {
            let mut q = match self.queue.lock() {
                Ok(q) => q,
                Err(poisoned) => poisoned.into_inner(),
            };
            if q.status == Status::Closed {
                return;
            }
            q.status = Status::Closed;
            q.messages.clear();
        }
        self.queue_cv.notify_all();
        if let Some(stream) = self.stream() {
            if let Err(e) = stream.close() {
                log::warn!("error closing transport stream: {e}");
            }
        }
        log::debug!("transport closed");
    }

    /// Blocks until both worker threads have exited (i.e. until the transport is `CLOSED`).
    pub fn join(&self) {
        let workers = self.workers.lock().ok().and_then(|mut w| w.take());
        if let Some(workers) = workers {
            let _ = workers.producer.join();
            let _ = workers.consumer.join();
        }
    }

    fn enqueue(&self, header: u16, payload: Vec<u8>) {
        let mut q = match self.queue.lock() {
            Ok(q) => q,
            Err(poisoned) => poisoned.into_inner(),
        };
        if q.status == Status::Closed {
            return;
        }
        q.messages.push_back((header, payload));
        drop(q);
        self.queue_cv.notify_all();
    }

    /// Invoked only by a thread that already holds the message lock: the consumer, or a
    /// caller inside `await_message`/`handle_message`. Debug builds assert this via a
    /// `try_lock` that must succeed precisely because a reentrant mutex lets the *same*
    /// thread re-acquire it.
    fn dispatch(&self, header: u16, payload: Vec<u8>) {
        debug_assert!(
            self.message_lock.try_lock().is_some(),
            "dispatch() called without the message lock held by the current thread"
        );
        if header == crate::header::SHUTDOWN {
            self.handle_shutdown();
            return;
        }
        let handler = self.handlers.lock().ok().and_then(|h| h.get(&header).cloned());
        match handler {
            Some(f) => {
                let guard = self.message_lock.lock();
                let min = MessageLockIn::new(self, guard, header, ReceiveBuffer::new(payload));
                f(self, min);
            }
            None => {
                log::warn!(
                    "no handler registered for header {header}; dropping {len}-byte payload",
                    len = payload.len()
                );
            }
        }
    }

    fn handle_shutdown(&self) {
        let status = self.status();
        match status {
            Status::Open => {
                log::debug!("peer initiated shutdown; answering and closing");
                if let Some(stream) = self.stream() {
                    if let Err(e) = framed::write_frame(stream.as_ref(), header::SHUTDOWN, &[]) {
                        log::warn!("failed to send answering SHUTDOWN: {e}");
                    }
                }
                self.close();
            }
            Status::WriteClosed => {
                log::debug!("peer answered our shutdown; closing");
                self.close();
            }
            Status::Created | Status::Closed => {}
        }
    }

    fn run_producer(self: Arc<Self>) {
        loop {
            let stream = match self.stream() {
                Some(s) => s,
                None => break,
            };
            match framed::read_frame_limited(stream.as_ref(), self.max_frame_size) {
                Ok(Some((header, payload))) => {
                    let is_shutdown = header == crate::header::SHUTDOWN;
                    self.enqueue(header, payload);
                    if is_shutdown {
                        break;
                    }
                }
                Ok(None) => {
                    log::debug!("peer closed the stream cleanly");
                    self.close();
                    break;
                }
                Err(e) => {
                    log::warn!("transport stream failed: {e}");
                    self.close();
                    break;
                }
            }
            if self.status() == Status::Closed {
                break;
            }
        }
    }

    fn run_consumer(self: Arc<Self>) {
        loop {
            let guard = self.message_lock.lock();
            let mut q = match self.queue.lock() {
                Ok(q) => q,
                Err(poisoned) => poisoned.into_inner(),
            };
            if q.status == Status::Closed {
                break;
            }
            if let Some((header, payload)) = q.messages.pop_front() {
                drop(q);
                self.dispatch(header, payload);
                drop(guard);
                continue;
            }
            // Release the message lock before parking on the condition variable: this is
            // the "release-then-wait" ordering that lets a caller blocked in
            // `start_message`/`await_message` make progress while the consumer is idle, and
            // that guarantees `close()`'s notify (issued under the same `queue` mutex we are
            // about to wait on) can never be missed.
            drop(guard);
            match self.queue_cv.wait(q) {
                Ok(_woken) => {}
                Err(_poisoned) => break,
            }
        }
    }
}

enum PopResult {
    Matched(Vec<u8>),
    Dispatch(u16, Vec<u8>),
}
