//! Minimal acceptor binary: binds the RPC and handle-exchange channels, performs the
//! handshake, and spins up a [`Transport`]. Wiring a [`xrbridge::runtime::ServerRuntime`] on
//! top (registering the Swapchain Mirror handlers against a real `VkInstance`/`VkDevice` and a
//! concrete [`xrbridge::runtime::XrRuntime`]) is the job of the real XR runtime process that
//! embeds this crate as a library, not of this binary.

use std::net::TcpListener;
use std::sync::Arc;

use clap::Parser;

use xrbridge::config::Config;
#[cfg(unix)]
use xrbridge::handle_exchange::UnixHandleExchange;
use xrbridge::handshake;
use xrbridge::stream::TcpDuplexStream;
use xrbridge::transport::Transport;

#[derive(Parser)]
#[command(name = "xrbridge-server", about = "Accepts one xrbridge client connection")]
struct Cli {
    /// Address to listen on for the RPC stream, e.g. `127.0.0.1:42420`.
    #[arg(long)]
    listen: Option<String>,

    /// Unix socket path for the handle-exchange side channel.
    #[arg(long)]
    hx_socket: Option<String>,

    /// `XrVersion` this runtime reports during the handshake.
    #[arg(long, default_value_t = 0x1_0000)]
    xr_api_version: u64,

    /// Cap on a single frame's payload size, in bytes.
    #[arg(long)]
    max_frame_size: Option<u32>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(listen) = cli.listen {
        config.listen_addr = listen;
    }
    if let Some(hx_socket) = cli.hx_socket {
        config.hx_socket_path = hx_socket;
    }
    if let Some(max_frame_size) = cli.max_frame_size {
        config.max_frame_size = max_frame_size;
    }

    log::info!("xrbridge-server listening on {}", config.listen_addr);
    let listener = TcpListener::bind(&config.listen_addr)?;
    let (tcp_stream, peer) = listener.accept()?;
    log::info!("accepted connection from {peer}");
    let stream: Arc<dyn xrbridge::stream::DuplexStream> =
        Arc::new(TcpDuplexStream::new(tcp_stream)?);

    handshake::server_handshake(stream.as_ref(), cli.xr_api_version)?;
    log::info!("handshake complete");

    #[cfg(unix)]
    {
        log::info!("accepting handle-exchange connection on {}", config.hx_socket_path);
        // Kept open for the embedding runtime to hand to a `ServerRuntime`; this binary only
        // proves out the accept path, so it is dropped once the connection is established.
        let _hx = UnixHandleExchange::bind_and_accept(&config.hx_socket_path)?;
    }
    #[cfg(windows)]
    log::info!(
        "handle-exchange on Windows rides the RPC transport itself; deferred to the \
         embedding runtime, which resolves the peer process handle"
    );

    let transport = Transport::with_max_frame_size(config.max_frame_size);
    transport.start(stream)?;
    log::info!("transport open; serving until shutdown");
    transport.join();
    log::info!("transport closed, exiting");
    Ok(())
}
