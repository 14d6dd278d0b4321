/// Transport lifecycle state. Transitions are monotonic: a `Transport` only ever moves
/// forward through this order, never back.
///
/// ```text
///        start()         shutdown()             peer SHUTDOWN, or stream error
///  CREATED ────▶  OPEN ─────────────▶ WRITE_CLOSED ─────────────▶ CLOSED
///                  │                                              ▲
///                  └──────────── close() ────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Status {
    /// Constructed, `start` not yet called.
    Created,
    /// Reading and writing normally.
    Open,
    /// `shutdown()` was called locally; `start_message` now fails, but inbound messages are
    /// still dispatched until the peer's answering `SHUTDOWN` arrives.
    WriteClosed,
    /// Terminal. The queue has been drained and every blocked waiter released with
    /// [`crate::error::Error::Closed`].
    Closed,
}
