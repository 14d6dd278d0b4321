//! A bidirectional transport bridging an XR application process and the runtime process that
//! serves it: a framed message channel with request/reply and fire-and-forget messaging
//! ([`transport`]), an out-of-band channel for handing OS handles across the process boundary
//! ([`handle_exchange`]), and a GPU-memory mirror that keeps a swapchain image rendered in one
//! process consistent with its mirror in the other ([`swapchain`]).
//!
//! [`session`] and [`runtime`] tie the lower layers together into the per-session and
//! per-process state a client or server binary actually holds.

pub mod config;
pub mod error;
pub mod framed;
pub mod handle_exchange;
pub mod handshake;
pub mod header;
pub mod runtime;
pub mod session;
pub mod stream;
pub mod swapchain;
pub mod transport;
pub mod vulkan;

pub use error::{Error, Result};
