//! Thin `VkFence` wrapper, in the same destroy-on-drop style as `phobos::sync::fence::Fence`.
//!
//! Unlike the teacher's `Fence<T>`, this one carries no attached value and no `Future` impl:
//! the mirror protocol only ever needs a CPU-blocking wait with a timeout
//! (`ClientSwapchain::wait_image`) or a fire-and-forget completion signal
//! (the server's per-image copy fence), never an async continuation.

use ash::vk;

use crate::error::{Error, Result};

/// Wrapper around a `VkFence`. Used both for the client's `copying_done_fence` (spec §3,
/// "per image (client side)") and the server's per-image copy-completion fence (spec §4.5
/// step 2, "wait on the server-side per-image completion fence").
pub struct Fence {
    device: ash::Device,
    handle: vk::Fence,
}

impl Fence {
    /// Creates a new fence. `signaled` should be `true` for a client's `copying_done_fence`
    /// (spec §4.5: "created signaled so the first `wait_image` returns immediately") and
    /// `false` for the server's per-image completion fence.
    pub fn new(device: ash::Device, signaled: bool) -> Result<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags);
        let handle = unsafe { device.create_fence(&info, None)? };
        #[cfg(feature = "log-objects")]
        log::trace!("created VkFence {handle:?}");
        Ok(Fence { device, handle })
    }

    /// Raw handle, for submitting it alongside a queue submission.
    pub fn handle(&self) -> vk::Fence {
        self.handle
    }

    /// Blocks until the fence is signaled or `timeout` elapses. Returns `Ok(true)` if
    /// signaled, `Ok(false)` on timeout; never resets the fence itself (callers reset when
    /// the protocol says to, per spec §4.5 release: "Reset `copying_done_fence`").
    pub fn wait(&self, timeout: std::time::Duration) -> Result<bool> {
        let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        match unsafe { self.device.wait_for_fences(&[self.handle], true, timeout_ns) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(Error::VkError(e)),
        }
    }

    /// Resets the fence to the unsignaled state.
    pub fn reset(&self) -> Result<()> {
        unsafe { self.device.reset_fences(&[self.handle])? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        log::trace!("destroying VkFence {:?}", self.handle);
        unsafe {
            self.device.destroy_fence(self.handle, None);
        }
    }
}
