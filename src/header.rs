//! Reserved message headers and the custom-header allocation boundary.
//!
//! A [`FrameHeader`](crate::framed::FrameHeader)'s `header` field is an opaque `u16` as far as
//! [`Transport`](crate::transport::Transport) is concerned; this module just names the values
//! the Transport itself interprets, plus the band the Swapchain Mirror claims above
//! [`CUSTOM_BASE`].

/// A client has sent a function call and expects a matching [`FUNCTION_RETURN`].
pub const FUNCTION_CALL: u16 = 1;
/// Reply to a [`FUNCTION_CALL`].
pub const FUNCTION_RETURN: u16 = 2;
/// A synchronous, out-of-band request (not part of the ordinary call/return pairing).
pub const SYNC_REQUEST: u16 = 3;
/// Reply to a [`SYNC_REQUEST`].
pub const SYNC_RESPONSE: u16 = 4;
/// Server-originated event the client did not ask for (e.g. a polled XR event).
pub const POLL_EVENT: u16 = 5;
/// Acknowledges a [`POLL_EVENT`] was delivered.
pub const POLL_EVENT_RETURN: u16 = 6;
/// Initiates graceful shutdown. Handled internally by [`Transport`](crate::transport::Transport);
/// callers may never register a handler for it or await it directly.
pub const SHUTDOWN: u16 = 99;
/// First header value available for modules layered on top of the Transport.
pub const CUSTOM_BASE: u16 = 100;

/// Header band reserved by the Swapchain Mirror, starting at [`CUSTOM_BASE`].
pub mod swapchain {
    use super::CUSTOM_BASE;

    pub const CREATE_SWAPCHAIN: u16 = CUSTOM_BASE;
    pub const CREATE_SWAPCHAIN_RETURN: u16 = CUSTOM_BASE + 1;
    pub const DESTROY_SWAPCHAIN: u16 = CUSTOM_BASE + 2;
    pub const DESTROY_SWAPCHAIN_RETURN: u16 = CUSTOM_BASE + 3;
    pub const RELEASE_IMAGE: u16 = CUSTOM_BASE + 4;
    pub const RELEASE_IMAGE_RETURN: u16 = CUSTOM_BASE + 5;
    /// Brackets the handle-exchange triples that follow a [`CREATE_SWAPCHAIN_RETURN`], so HX
    /// sends from two concurrent swapchain creations can never interleave on the wire.
    pub const IMPORT_HANDLES: u16 = CUSTOM_BASE + 6;
    pub const IMPORT_HANDLES_RETURN: u16 = CUSTOM_BASE + 7;

    /// One past the last header this module reserves (100..=111 per the wire spec).
    pub const RESERVED_END: u16 = CUSTOM_BASE + 11;
}
