//! Windows implementation of [`HandleExchange`].
//!
//! Per spec §4.4: "on Windows, the sender duplicates into the receiver's process and ships
//! the resulting value inside an ordinary TX payload" (there is no separate side-channel
//! socket the way there is on Unix). `WindowsHandleExchange` therefore needs the
//! [`crate::transport::Transport`] itself rather than an independent connection, and uses a
//! reserved header pair to carry the duplicated value.

use std::sync::Arc;

use windows::Win32::Foundation::{CloseHandle, DuplicateHandle, DUPLICATE_SAME_ACCESS, HANDLE};
use windows::Win32::System::Threading::GetCurrentProcess;

use crate::error::{Error, Result};
use crate::transport::Transport;

use super::{HandleExchange, OsHandle};

/// Header this module uses to carry a duplicated handle value inside an ordinary TX payload,
/// since Windows has no separate `SCM_RIGHTS`-style side channel. Distinct from the
/// Swapchain Mirror's own header band; handle-exchange headers are a core-level concern that
/// any module layered above can use, not just SM.
pub const HX_HANDLE_HEADER: u16 = crate::header::CUSTOM_BASE - 1;

/// Windows handle-exchange channel: rides on the shared [`Transport`] rather than a private
/// connection. The peer process handle is needed to duplicate into its address space, which
/// on this platform is obtained out-of-band (e.g. the client reports its PID during the
/// application-level handshake); this type accepts it already resolved.
pub struct WindowsHandleExchange {
    transport: Arc<Transport>,
    peer_process: HANDLE,
}

// SAFETY: `HANDLE` is an opaque process handle; Windows process handles may be used from any
// thread, and this type does not mutate shared OS state beyond what `DuplicateHandle` itself
// synchronizes.
unsafe impl Send for WindowsHandleExchange {}
unsafe impl Sync for WindowsHandleExchange {}

impl WindowsHandleExchange {
    pub fn new(transport: Arc<Transport>, peer_process: HANDLE) -> Self {
        WindowsHandleExchange {
            transport,
            peer_process,
        }
    }
}

impl HandleExchange for WindowsHandleExchange {
    fn send(&self, handle: OsHandle) -> Result<()> {
        let source = HANDLE(handle.0 as isize);
        let mut duplicated = HANDLE::default();
        // SAFETY: `source` is a handle this process owns; `self.peer_process` is a handle
        // with `PROCESS_DUP_HANDLE` access resolved when this exchange was constructed.
        unsafe {
            DuplicateHandle(
                GetCurrentProcess(),
                source,
                self.peer_process,
                &mut duplicated,
                0,
                false,
                DUPLICATE_SAME_ACCESS,
            )
            .map_err(|e| Error::ImportFailed(format!("DuplicateHandle failed: {e}")))?;
            // Ownership transfers to the receiver once the duplicated value is on the wire;
            // our original copy is unaffected and stays ours to close as usual.
        }
        let mut msg = self.transport.start_message(HX_HANDLE_HEADER)?;
        std::io::Write::write_all(&mut msg, &(duplicated.0 as u64).to_le_bytes())?;
        msg.flush()
    }

    fn recv(&self) -> Result<OsHandle> {
        let mut msg = self.transport.await_message(HX_HANDLE_HEADER)?;
        let mut buf = [0u8; 8];
        std::io::Read::read_exact(&mut msg, &mut buf)?;
        Ok(OsHandle(u64::from_le_bytes(buf)))
    }
}

impl Drop for WindowsHandleExchange {
    fn drop(&mut self) {
        // SAFETY: `peer_process` was opened specifically for duplication by this exchange's
        // owner; closing it here matches the handle's acquisition site.
        unsafe {
            let _ = CloseHandle(self.peer_process);
        }
    }
}
