//! Shared test-context builder, in the teacher's `tests/framework/mod.rs` style: one
//! function each integration test file pulls in via `mod framework;` to stand up a working
//! pair of transports without touching a real socket.

use std::sync::Arc;
use std::time::Duration;

use xrbridge::stream::PairedBuffer;
use xrbridge::transport::Transport;

/// A connected pair of started transports, each driven by its own producer/consumer
/// threads over an in-memory [`PairedBuffer`].
pub struct TransportPair {
    pub client: Arc<Transport>,
    pub server: Arc<Transport>,
}

pub fn make_pair() -> TransportPair {
    let (client_stream, server_stream) = PairedBuffer::pair();
    let client = Transport::new();
    let server = Transport::new();
    client.start(Arc::new(client_stream)).unwrap();
    server.start(Arc::new(server_stream)).unwrap();
    TransportPair { client, server }
}

/// Generous bound for anything that should complete almost immediately; long enough to never
/// flake under CI scheduling jitter, short enough that a genuine deadlock still fails the test
/// run instead of hanging it.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(5);
