//! Thin `VkSemaphore` wrapper, grounded on `phobos::sync::semaphore::Semaphore` but widened
//! with the exportable-handle constructor the mirror protocol needs (phobos never shares a
//! semaphore across processes; `crate::vulkan::external` supplies the export/import calls
//! that work with the raw handle exposed here).

use ash::vk;

use crate::error::Result;

/// A binary semaphore. Used for both `rendering_done` and `copying_done` per swapchain image
/// (spec §3, "Per image (client side)... two imported binary semaphores").
pub struct Semaphore {
    device: ash::Device,
    handle: vk::Semaphore,
}

impl Semaphore {
    /// Creates an ordinary, non-exportable binary semaphore.
    pub fn new(device: ash::Device) -> Result<Self> {
        let info = vk::SemaphoreCreateInfo::builder();
        let handle = unsafe { device.create_semaphore(&info, None)? };
        #[cfg(feature = "log-objects")]
        log::trace!("created VkSemaphore {handle:?}");
        Ok(Semaphore { device, handle })
    }

    /// Wraps an already-created handle (used by [`crate::vulkan::external::import_semaphore`],
    /// which needs to chain an import struct onto the create info before calling
    /// `vkCreateSemaphore`, unlike the plain path above).
    pub(crate) fn from_handle(device: ash::Device, handle: vk::Semaphore) -> Self {
        Semaphore { device, handle }
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        log::trace!("destroying VkSemaphore {:?}", self.handle);
        unsafe {
            self.device.destroy_semaphore(self.handle, None);
        }
    }
}
