//! Exposes the xrbridge error type

use std::io;
use std::sync::PoisonError;

use thiserror::Error;

/// Error type that xrbridge can return.
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying I/O error on the transport stream.
    #[error("I/O error: `{0}`")]
    Io(#[from] io::Error),
    /// Generic Vulkan error type.
    #[error("Vulkan error: `{0}`")]
    VkError(ash::vk::Result),
    /// Failed to load the Vulkan library.
    #[error("Failed to load Vulkan.")]
    LoadFailed(ash::LoadingError),
    /// No suitable GPU found.
    #[error("No physical device found matching requirements.")]
    NoGPU,
    /// No queue was found for the requested domain.
    #[error("No queue found that supports graphics and transfer.")]
    NoCapableQueue,
    /// The peer's handshake did not present the expected magic value.
    #[error("Bad handshake magic: expected `{expected:#x}`, got `{actual:#x}`")]
    BadMagic { expected: u32, actual: u32 },
    /// The peer is speaking a protocol version we cannot talk to.
    #[error("Incompatible protocol version: ours is `{ours}`, peer's is `{theirs}`")]
    IncompatibleVersion { ours: u16, theirs: u16 },
    /// Transport API misuse, mirroring `TransportException` in the wire spec.
    #[error("Transport error: {0}")]
    Transport(String),
    /// Tried to use the transport before [`crate::transport::Transport::start`] was called.
    #[error("Transport has not been started yet.")]
    NotStarted,
    /// Tried to start the transport twice.
    #[error("Transport has already been started.")]
    AlreadyStarted,
    /// Tried to send a message after the transport's write side was closed.
    #[error("Cannot send message: transport write side is closed.")]
    WriteClosed,
    /// `await_message` or `handle_message` aborted because the transport closed underneath it,
    /// or a call was made against a transport that already reached `CLOSED`.
    #[error("Transport closed.")]
    Closed,
    /// Caller tried to await or register a handler for the internal shutdown header; its
    /// semantics are owned by the Transport itself.
    #[error("Cannot await or handle the shutdown message (header {0}) directly.")]
    Shutdown(u16),
    /// A frame declared a payload larger than the configured limit.
    #[error("Frame payload size `{0}` exceeds the configured maximum")]
    FrameTooLarge(u32),
    /// The peer rejected or never completed the connection handshake.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),
    /// A swapchain image index was out of the acquire/wait/release protocol order.
    #[error("Swapchain call order invalid: {0}")]
    CallOrderInvalid(&'static str),
    /// Waiting for a swapchain image timed out.
    #[error("Timed out waiting for swapchain image")]
    TimeoutExpired,
    /// An application-submitted composition layer referenced a rectangle outside the
    /// swapchain's extent.
    #[error("Swapchain rect invalid: {0}")]
    SwapchainRectInvalid(&'static str),
    /// An application-submitted composition layer was otherwise malformed.
    #[error("Layer invalid: {0}")]
    LayerInvalid(&'static str),
    /// Importing a shared memory block or semaphore handle failed on either peer.
    #[error("Failed to import shared resource: {0}")]
    ImportFailed(String),
    /// Handle exchange side channel is not connected.
    #[error("Handle exchange channel not established: {0}")]
    HandleExchangeUnavailable(&'static str),
    /// A required environment variable was missing or invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),
    /// Poisoned mutex; recovering the guard is not possible in a sound way.
    #[error("Poisoned mutex")]
    PoisonError,
    /// Uncategorized error, for exceptional paths that don't deserve their own variant.
    #[error("Uncategorized error: `{0}`")]
    Uncategorized(&'static str),
}

impl From<ash::vk::Result> for Error {
    fn from(value: ash::vk::Result) -> Self {
        Error::VkError(value)
    }
}

impl From<ash::LoadingError> for Error {
    fn from(value: ash::LoadingError) -> Self {
        Error::LoadFailed(value)
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Error::PoisonError
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
