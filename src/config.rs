//! Runtime configuration, read from the environment rather than a config file.
//!
//! The spec explicitly leaves "configuration parsing" for the XR function surface out of
//! scope, but the bridge itself still needs to know where to listen/connect and how big a
//! frame it is willing to accept; this is that ambient piece. Grounded on
//! `original_source/src/common/config/config.cpp`, which reads the handle-exchange socket
//! path from `XRTP_SERVER_FD_EXCHANGE_PATH`/`XRTP_CLIENT_FD_EXCHANGE_PATH` environment
//! variables rather than a file.

use std::env;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::framed::MAX_FRAME_SIZE;

/// Default path used for the handle-exchange side channel when no environment override is
/// present. Matches the shape (not the exact value) of the original's `/tmp/xrtp-*` sockets.
pub const DEFAULT_HX_SOCKET_PATH: &str = "/tmp/xrbridge-hx.sock";

/// Environment variable naming the TCP/Unix address the server listens on and the client
/// connects to.
pub const ENV_LISTEN_ADDR: &str = "XRBRIDGE_LISTEN_ADDR";
/// Environment variable naming the handle-exchange side channel's Unix socket path.
pub const ENV_HX_SOCKET: &str = "XRBRIDGE_HX_SOCKET";
/// Environment variable overriding the per-frame payload size cap.
pub const ENV_MAX_FRAME_SIZE: &str = "XRBRIDGE_MAX_FRAME_SIZE";
/// Environment variable overriding the default swapchain fence timeout, in milliseconds.
pub const ENV_FENCE_TIMEOUT_MS: &str = "XRBRIDGE_FENCE_TIMEOUT_MS";

/// Default timeout for a swapchain `wait_image` call that does not supply its own.
const DEFAULT_FENCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bridge-wide configuration, resolved once at process start.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the RPC stream listens on (server) or connects to (client).
    pub listen_addr: String,
    /// Path to the handle-exchange side channel's Unix socket.
    pub hx_socket_path: String,
    /// Upper bound on a single frame's payload size, enforced by [`crate::framed`].
    pub max_frame_size: u32,
    /// Default timeout passed to [`crate::swapchain::client::ClientSwapchain::wait_image`]
    /// when the caller does not specify one.
    pub fence_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: "127.0.0.1:42420".to_string(),
            hx_socket_path: DEFAULT_HX_SOCKET_PATH.to_string(),
            max_frame_size: MAX_FRAME_SIZE,
            fence_timeout: DEFAULT_FENCE_TIMEOUT,
        }
    }
}

impl Config {
    /// Builds a [`Config`] from environment variables, falling back to defaults for any
    /// that are unset. Fails only if a set variable cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        if let Ok(addr) = env::var(ENV_LISTEN_ADDR) {
            config.listen_addr = addr;
        }
        if let Ok(path) = env::var(ENV_HX_SOCKET) {
            config.hx_socket_path = path;
        }
        if let Ok(raw) = env::var(ENV_MAX_FRAME_SIZE) {
            config.max_frame_size = raw.parse().map_err(|_| {
                Error::Config(format!("{ENV_MAX_FRAME_SIZE} must be a u32, got `{raw}`"))
            })?;
        }
        if let Ok(raw) = env::var(ENV_FENCE_TIMEOUT_MS) {
            let ms: u64 = raw.parse().map_err(|_| {
                Error::Config(format!("{ENV_FENCE_TIMEOUT_MS} must be a u64, got `{raw}`"))
            })?;
            config.fence_timeout = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let config = Config::default();
        assert!(config.max_frame_size > 0);
        assert!(config.fence_timeout > Duration::ZERO);
    }
}
