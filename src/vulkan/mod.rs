//! Thin Vulkan wrappers used by the Swapchain Mirror.
//!
//! This is deliberately not a general Vulkan abstraction layer the way `phobos`'s `core` and
//! `sync` modules are: the application (client side) and the real XR runtime (server side)
//! already own their `VkInstance`/`VkDevice`; per spec §3 ("Session state... Client:
//! `graphics_binding`") this crate is handed a device to operate on, never creates one
//! itself. What lives here is only the handful of object wrappers the mirror protocol needs
//! on top of that device: fences and semaphores with the teacher's `Drop`-destroys-the-handle
//! discipline (`phobos::sync::fence::Fence`, `phobos::sync::semaphore::Semaphore`), plus the
//! external-memory/semaphore import and command-buffer recording helpers that are new surface
//! relative to the teacher (phobos never shares GPU memory across processes).

mod fence;
mod semaphore;

pub mod external;

pub use fence::Fence;
pub use semaphore::Semaphore;

use ash::vk;

/// The graphics/transfer queue and device the application's side of the mirror was told to
/// use, per spec §3 "Session state (mirrored)... Client: `graphics_binding`". Constructed by
/// the application and handed to [`crate::session::ClientSession::new`]; this crate never
/// creates a `VkInstance`/`VkDevice` itself.
#[derive(Clone)]
pub struct GraphicsBinding {
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue_family_index: u32,
    pub queue_index: u32,
}

impl GraphicsBinding {
    /// Resolves the `VkQueue` this binding names. Cheap; Vulkan queues are not reference
    /// counted, so this can be called as often as needed.
    pub fn queue(&self) -> vk::Queue {
        unsafe { self.device.get_device_queue(self.queue_family_index, self.queue_index) }
    }
}

/// The server's equivalent of [`GraphicsBinding`]: the runtime's own device, plus the queue
/// the server chose at session creation for shared-image copies (spec §3, "Server: `VkQueue`
/// chosen at session creation").
#[derive(Clone)]
pub struct ServerGraphicsContext {
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue: vk::Queue,
    pub queue_family_index: u32,
}

/// Picks a `DEVICE_LOCAL` memory type compatible with `requirements`, for the shared images
/// both peers allocate (spec §4.5 step 2/4: the server allocates, the client imports with
/// the matching `memory_type_index` it was told about).
pub fn find_device_local_memory_type(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    requirements: &vk::MemoryRequirements,
) -> crate::error::Result<u32> {
    let props = unsafe { instance.get_physical_device_memory_properties(physical_device) };
    (0..props.memory_type_count)
        .find(|&i| {
            let supported = requirements.memory_type_bits & (1 << i) != 0;
            let local = props.memory_types[i as usize]
                .property_flags
                .contains(vk::MemoryPropertyFlags::DEVICE_LOCAL);
            supported && local
        })
        .ok_or(crate::error::Error::NoGPU)
}
