//! Server-side half of the Swapchain Mirror (spec §4.5): owns the shared images copied into
//! from the client, and drives the copy pass that moves a released client image into the
//! real XR runtime's own acquired image.

use std::sync::{Arc, Mutex};

use ash::vk;

use crate::error::{Error, Result};
use crate::handle_exchange::OsHandle;
use crate::vulkan::{external, Fence, Semaphore};

use super::{ImageType, SwapchainCreateInfo};

/// Abstracts "the real XR runtime" this module copies into, per spec §1's "out of scope"
/// list (the XR function dispatch table) and §9's open question about `vulkan`/`vulkan2`:
/// this crate never talks to a concrete runtime directly, only through whatever the
/// surrounding application wires up. A production binary's implementation of this trait
/// forwards to the actual `xrAcquireSwapchainImage`/`xrWaitSwapchainImage`/
/// `xrReleaseSwapchainImage` entry points; tests use an in-memory fake.
pub trait RuntimeSwapchain: Send + Sync {
    /// The runtime's own `VkImage` at `index` (returned by [`RuntimeSwapchain::acquire`]),
    /// used as the copy destination.
    fn runtime_image(&self, index: usize) -> vk::Image;
    /// `xrAcquireSwapchainImage`: returns the runtime-chosen index to copy into.
    fn acquire(&self) -> Result<usize>;
    /// `xrWaitSwapchainImage(INFINITE)`.
    fn wait(&self) -> Result<()>;
    /// `xrReleaseSwapchainImage`.
    fn release(&self) -> Result<()>;
}

/// Per-image state the server owns for one mirrored swapchain image (spec §3, "Per image
/// (server side)").
struct ServerImage {
    vk_image: vk::Image,
    memory: vk::DeviceMemory,
    rendering_done: Semaphore,
    copying_done: Semaphore,
    /// Completion fence for this image's most recent copy submission; also doubles as the
    /// "safety against misbehaving clients" wait in spec §4.5 release step 2.
    fence: Fence,
    cmd_buffer: vk::CommandBuffer,
    memory_handle: OsHandle,
    rendering_done_handle: OsHandle,
    copying_done_handle: OsHandle,
}

struct Inner {
    device: ash::Device,
    queue: vk::Queue,
    queue_family_index: u32,
    cmd_pool: vk::CommandPool,
    images: Vec<ServerImage>,
    image_type: ImageType,
    extent: vk::Extent3D,
    runtime: Arc<dyn RuntimeSwapchain>,
}

/// The server's mirror of one swapchain. Cheap to share: internally synchronized so the
/// `RELEASE_IMAGE` handler (running on the Transport's consumer or a stolen-dispatch thread)
/// can be invoked concurrently with destruction bookkeeping elsewhere in the session.
pub struct ServerSwapchain {
    inner: Mutex<Inner>,
}

/// Result of [`ServerSwapchain::create`]: the swapchain itself plus the fields the
/// `CREATE_SWAPCHAIN_RETURN` reply needs (spec §4.5 step 2).
pub struct CreatedServerSwapchain {
    pub swapchain: Arc<ServerSwapchain>,
    pub image_count: u32,
    pub memory_size: u64,
    pub memory_type_index: u32,
}

impl ServerSwapchain {
    /// Allocates one shared image/semaphore-pair/fence/command-buffer per runtime image,
    /// per spec §4.5 step 2. `runtime_images` is the already-created set of images the real
    /// runtime's `CreateSwapchain` returned (obtaining them is outside this crate's scope).
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queue: vk::Queue,
        queue_family_index: u32,
        runtime: Arc<dyn RuntimeSwapchain>,
        runtime_images: &[vk::Image],
        info: SwapchainCreateInfo,
    ) -> Result<CreatedServerSwapchain> {
        if runtime_images.is_empty() {
            return Err(Error::SwapchainRectInvalid("runtime returned zero images"));
        }

        let cmd_pool = {
            let pool_info = vk::CommandPoolCreateInfo::builder()
                .queue_family_index(queue_family_index)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            unsafe { device.create_command_pool(&pool_info, None)? }
        };

        let extent = vk::Extent3D {
            width: info.width,
            height: info.height,
            depth: 1,
        };
        let usage = vk::ImageUsageFlags::TRANSFER_SRC | info.image_type.usage_flags();

        let mut images = Vec::with_capacity(runtime_images.len());
        let mut memory_size = 0u64;
        let mut memory_type_index = 0u32;

        for _ in runtime_images {
            let vk_image = external::create_exportable_image(&device, extent, info.format, usage)?;
            let requirements = unsafe { device.get_image_memory_requirements(vk_image) };
            memory_type_index = crate::vulkan::find_device_local_memory_type(
                instance,
                physical_device,
                &requirements,
            )?;
            let (memory, size) = external::allocate_exportable_memory(
                &device,
                requirements,
                memory_type_index,
            )?;
            memory_size = size;
            unsafe { device.bind_image_memory(vk_image, memory, 0)? };

            let rendering_done = external::create_exportable_semaphore(&device)?;
            let copying_done = external::create_exportable_semaphore(&device)?;
            let fence = Fence::new(device.clone(), false)?;

            let cmd_buffer = {
                let alloc_info = vk::CommandBufferAllocateInfo::builder()
                    .command_pool(cmd_pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1);
                unsafe { device.allocate_command_buffers(&alloc_info)?[0] }
            };

            let memory_handle = external::export_memory_handle(instance, &device, memory)?;
            let rendering_done_handle =
                external::export_semaphore_handle(instance, &device, rendering_done.handle())?;
            let copying_done_handle =
                external::export_semaphore_handle(instance, &device, copying_done.handle())?;

            images.push(ServerImage {
                vk_image,
                memory,
                rendering_done,
                copying_done,
                fence,
                cmd_buffer,
                memory_handle,
                rendering_done_handle,
                copying_done_handle,
            });
        }

        let image_count = images.len() as u32;
        let swapchain = Arc::new(ServerSwapchain {
            inner: Mutex::new(Inner {
                device,
                queue,
                queue_family_index,
                cmd_pool,
                images,
                image_type: info.image_type,
                extent,
                runtime,
            }),
        });

        Ok(CreatedServerSwapchain {
            swapchain,
            image_count,
            memory_size,
            memory_type_index,
        })
    }

    /// The `(memory, rendering_done, copying_done)` handle triples to hand to
    /// [`crate::handle_exchange::HandleExchange::send`], one per image, in index order (spec
    /// §4.5 step 3: "writes `N` handle triples... to HX").
    pub fn export_handle_triples(&self) -> Result<Vec<(OsHandle, OsHandle, OsHandle)>> {
        let inner = self.inner.lock()?;
        Ok(inner
            .images
            .iter()
            .map(|img| (img.memory_handle, img.rendering_done_handle, img.copying_done_handle))
            .collect())
    }

    /// Implements the `RELEASE_IMAGE` server-side handler, spec §4.5 release steps 1-6.
    /// `release_index` is the index the client reports it just released.
    pub fn handle_release_image(&self, release_index: u32) -> Result<()> {
        let inner = self.inner.lock()?;
        let index = release_index as usize;
        let image = inner
            .images
            .get(index)
            .ok_or(Error::SwapchainRectInvalid("release index out of range"))?;

        // Step 1: ask the runtime for its own next image.
        let runtime_index = inner.runtime.acquire()?;
        let dst_image = inner.runtime.runtime_image(runtime_index);

        // Step 2: guard against a client that released the same image twice concurrently.
        image.fence.wait(std::time::Duration::from_secs(30))?;
        image.fence.reset()?;

        // Step 3: record the copy, including the ownership-transfer barriers the
        // queue-family release/acquire pair (glossary) requires on both images.
        unsafe {
            inner.device.reset_command_buffer(
                image.cmd_buffer,
                vk::CommandBufferResetFlags::empty(),
            )?;
            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            inner.device.begin_command_buffer(image.cmd_buffer, &begin_info)?;

            let subresource = vk::ImageSubresourceRange::builder()
                .aspect_mask(inner.image_type.aspect_mask())
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1)
                .build();

            let acquire_src_barrier = vk::ImageMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_READ)
                .old_layout(inner.image_type.attachment_layout())
                .new_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_EXTERNAL)
                .dst_queue_family_index(inner.queue_family_index)
                .image(image.vk_image)
                .subresource_range(subresource)
                .build();
            let dst_layout_barrier = vk::ImageMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(dst_image)
                .subresource_range(subresource)
                .build();
            inner.device.cmd_pipeline_barrier(
                image.cmd_buffer,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[acquire_src_barrier, dst_layout_barrier],
            );

            let copy_region = vk::ImageCopy::builder()
                .src_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: inner.image_type.aspect_mask(),
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .dst_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: inner.image_type.aspect_mask(),
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .extent(inner.extent)
                .build();
            inner.device.cmd_copy_image(
                image.cmd_buffer,
                image.vk_image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[copy_region],
            );

            let final_barrier = vk::ImageMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::empty())
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(inner.image_type.attachment_layout())
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(dst_image)
                .subresource_range(subresource)
                .build();
            let release_src_barrier = vk::ImageMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::TRANSFER_READ)
                .dst_access_mask(vk::AccessFlags::empty())
                .old_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                .new_layout(inner.image_type.attachment_layout())
                .src_queue_family_index(inner.queue_family_index)
                .dst_queue_family_index(vk::QUEUE_FAMILY_EXTERNAL)
                .image(image.vk_image)
                .subresource_range(subresource)
                .build();
            inner.device.cmd_pipeline_barrier(
                image.cmd_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[final_barrier, release_src_barrier],
            );

            inner.device.end_command_buffer(image.cmd_buffer)?;
        }

        // Step 4: submit with wait = rendering_done, signal = copying_done.
        let wait_semaphores = [image.rendering_done.handle()];
        let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];
        let signal_semaphores = [image.copying_done.handle()];
        let cmd_buffers = [image.cmd_buffer];
        let submit = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&cmd_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();
        unsafe {
            inner
                .device
                .queue_submit(inner.queue, &[submit], image.fence.handle())?;
        }

        // Steps 5-6: hand the copied image back to the runtime.
        inner.runtime.wait()?;
        inner.runtime.release()?;
        Ok(())
    }

    /// Waits the queue idle and frees every per-image Vulkan object. Called by
    /// [`crate::session::ServerSession::destroy_swapchain`].
    pub fn destroy(&self) -> Result<()> {
        let mut inner = self.inner.lock()?;
        unsafe {
            inner.device.queue_wait_idle(inner.queue)?;
            for image in inner.images.drain(..) {
                inner.device.destroy_image(image.vk_image, None);
                inner.device.free_memory(image.memory, None);
                // `rendering_done`/`copying_done`/`fence` destroy themselves on drop.
            }
            inner.device.destroy_command_pool(inner.cmd_pool, None);
        }
        Ok(())
    }
}
