//! Client-side half of the Swapchain Mirror (spec §4.5): imports the server's shared images
//! and drives the three-phase acquire/wait/release cycle the application calls into.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ash::vk;

use crate::error::{Error, Result};
use crate::handle_exchange::HandleExchange;
use crate::header;
use crate::transport::Transport;
use crate::vulkan::{external, Fence, Semaphore};

use super::ring::RingState;
use super::wire::{CreateSwapchainRequest, CreateSwapchainReturn, DestroySwapchainRequest, DestroySwapchainReturn, ReleaseImageRequest};
use super::{ImageType, SwapchainCreateInfo};

/// Per-image state the client owns (spec §3, "Per image (client side)").
struct ClientImage {
    vk_image: vk::Image,
    device_memory: vk::DeviceMemory,
    rendering_done: Semaphore,
    copying_done: Semaphore,
    copying_done_fence: Fence,
    acquire_cmd: vk::CommandBuffer,
    release_cmd: vk::CommandBuffer,
}

struct State {
    ring: RingState,
    images: Vec<ClientImage>,
}

/// The application-visible swapchain. Cheap to share across threads (internally
/// synchronized), matching the fact that an XR application may call `wait_image` from a
/// render thread while another thread tears the session down.
pub struct ClientSwapchain {
    transport: Arc<Transport>,
    device: ash::Device,
    queue: vk::Queue,
    swapchain_id: u64,
    image_type: ImageType,
    state: Mutex<State>,
}

impl ClientSwapchain {
    /// Runs the full creation handshake (spec §4.5 "Creation"): `CREATE_SWAPCHAIN` /
    /// `CREATE_SWAPCHAIN_RETURN` over TX, then one HX triple per image, importing each into
    /// a local `VkImage` and pre-recording `acquire_cmd`/`release_cmd`.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        transport: Arc<Transport>,
        hx: &dyn HandleExchange,
        instance: &ash::Instance,
        device: ash::Device,
        queue: vk::Queue,
        queue_family_index: u32,
        cmd_pool: vk::CommandPool,
        session: u64,
        info: SwapchainCreateInfo,
    ) -> Result<Arc<Self>> {
        let request = CreateSwapchainRequest {
            session,
            width: info.width,
            height: info.height,
            image_type: info.image_type,
            is_static: info.is_static,
            format: info.format.as_raw(),
        };
        {
            let mut msg = transport.start_message(header::swapchain::CREATE_SWAPCHAIN)?;
            request.encode(&mut msg)?;
            msg.flush()?;
        }
        let reply = {
            let mut msg = transport.await_message(header::swapchain::CREATE_SWAPCHAIN_RETURN)?;
            CreateSwapchainReturn::decode(&mut msg)?
        };
        if reply.result != 0 {
            return Err(Error::ImportFailed(format!(
                "server failed to create swapchain (result {})",
                reply.result
            )));
        }

        let extent = vk::Extent3D {
            width: info.width,
            height: info.height,
            depth: 1,
        };
        let usage = info.image_type.usage_flags();
        let aspect = info.image_type.aspect_mask();
        let attachment_layout = info.image_type.attachment_layout();

        let mut images = Vec::with_capacity(reply.image_count as usize);
        for _ in 0..reply.image_count {
            let memory_handle = hx.recv()?;
            let rendering_done_handle = hx.recv()?;
            let copying_done_handle = hx.recv()?;

            let vk_image = external::create_exportable_image(&device, extent, info.format, usage)?;
            let device_memory = external::import_memory_handle(
                instance,
                &device,
                memory_handle,
                reply.memory_size,
                reply.memory_type_index,
            )?;
            unsafe { device.bind_image_memory(vk_image, device_memory, 0)? };

            let rendering_done = Semaphore::new(device.clone())?;
            external::import_semaphore_handle(
                instance,
                &device,
                rendering_done.handle(),
                rendering_done_handle,
            )?;
            let copying_done = Semaphore::new(device.clone())?;
            external::import_semaphore_handle(
                instance,
                &device,
                copying_done.handle(),
                copying_done_handle,
            )?;

            // Created signaled: the very first `wait_image` must return immediately, since
            // there is no prior server copy to wait for (spec §4.5, design notes).
            let copying_done_fence = Fence::new(device.clone(), true)?;

            let [acquire_cmd, release_cmd] = {
                let alloc_info = vk::CommandBufferAllocateInfo::builder()
                    .command_pool(cmd_pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(2);
                let bufs = unsafe { device.allocate_command_buffers(&alloc_info)? };
                [bufs[0], bufs[1]]
            };

            let subresource = vk::ImageSubresourceRange::builder()
                .aspect_mask(aspect)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1)
                .build();

            unsafe {
                let begin_info = vk::CommandBufferBeginInfo::builder()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

                // acquire_cmd: layout transition UNDEFINED -> attachment, paired with the
                // queue-family acquire matching the server's release barrier at the end of
                // its copy pass (spec glossary, "queue-family release/acquire barrier").
                device.begin_command_buffer(acquire_cmd, &begin_info)?;
                let barrier = vk::ImageMemoryBarrier::builder()
                    .src_access_mask(vk::AccessFlags::empty())
                    .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                    .old_layout(vk::ImageLayout::UNDEFINED)
                    .new_layout(attachment_layout)
                    .src_queue_family_index(vk::QUEUE_FAMILY_EXTERNAL)
                    .dst_queue_family_index(queue_family_index)
                    .image(vk_image)
                    .subresource_range(subresource)
                    .build();
                device.cmd_pipeline_barrier(
                    acquire_cmd,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier],
                );
                device.end_command_buffer(acquire_cmd)?;

                // release_cmd: queue-family release from the client's family to EXTERNAL,
                // handing the image back to the server for its copy pass.
                device.begin_command_buffer(release_cmd, &begin_info)?;
                let barrier = vk::ImageMemoryBarrier::builder()
                    .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                    .dst_access_mask(vk::AccessFlags::empty())
                    .old_layout(attachment_layout)
                    .new_layout(attachment_layout)
                    .src_queue_family_index(queue_family_index)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_EXTERNAL)
                    .image(vk_image)
                    .subresource_range(subresource)
                    .build();
                device.cmd_pipeline_barrier(
                    release_cmd,
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier],
                );
                device.end_command_buffer(release_cmd)?;
            }

            images.push(ClientImage {
                vk_image,
                device_memory,
                rendering_done,
                copying_done,
                copying_done_fence,
                acquire_cmd,
                release_cmd,
            });
        }

        Ok(Arc::new(ClientSwapchain {
            transport,
            device,
            queue,
            swapchain_id: reply.swapchain,
            image_type: info.image_type,
            state: Mutex::new(State {
                ring: RingState::new(images.len(), info.is_static),
                images,
            }),
        }))
    }

    pub fn swapchain_id(&self) -> u64 {
        self.swapchain_id
    }

    pub fn image_type(&self) -> ImageType {
        self.image_type
    }

    /// `acquire_image` (spec §4.5 "Acquire"). Submits `acquire_cmd`, waiting on the image's
    /// `copying_done` semaphore unless this is the very first acquire of that image.
    pub fn acquire_image(&self) -> Result<u32> {
        let mut state = self.state.lock()?;
        let first = state.ring.is_first_acquire_of_current_image();
        let index = state.ring.acquire()?;
        let image = &state.images[index];

        let cmd_buffers = [image.acquire_cmd];
        let wait_semaphores = [image.copying_done.handle()];
        let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];
        let submit = if first {
            vk::SubmitInfo::builder().command_buffers(&cmd_buffers).build()
        } else {
            vk::SubmitInfo::builder()
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .command_buffers(&cmd_buffers)
                .build()
        };
        unsafe {
            self.device
                .queue_submit(self.queue, &[submit], image.copying_done_fence.handle())?;
        }
        Ok(index as u32)
    }

    /// `wait_image` (spec §4.5 "Wait"). Blocks on `copying_done_fence` with `timeout`.
    pub fn wait_image(&self, timeout: Duration) -> Result<()> {
        let index = {
            let mut state = self.state.lock()?;
            state.ring.begin_wait()?
        };
        let signaled = {
            let state = self.state.lock()?;
            state.images[index].copying_done_fence.wait(timeout)?
        };
        if !signaled {
            return Err(Error::TimeoutExpired);
        }
        let mut state = self.state.lock()?;
        state.ring.commit_wait();
        Ok(())
    }

    /// `release_image` (spec §4.5 "Release"). Submits `release_cmd` signalling
    /// `rendering_done`, then reports the release to the server over TX. Does not wait for
    /// `RELEASE_IMAGE_RETURN`: the server's copy runs asynchronously with respect to the
    /// application, which is free to go on and acquire the next image immediately.
    pub fn release_image(&self) -> Result<()> {
        let index = {
            let mut state = self.state.lock()?;
            state.ring.begin_release()?
        };
        {
            let state = self.state.lock()?;
            let image = &state.images[index];
            image.copying_done_fence.reset()?;
            let cmd_buffers = [image.release_cmd];
            let signal_semaphores = [image.rendering_done.handle()];
            let submit = vk::SubmitInfo::builder()
                .command_buffers(&cmd_buffers)
                .signal_semaphores(&signal_semaphores)
                .build();
            unsafe {
                self.device.queue_submit(self.queue, &[submit], vk::Fence::null())?;
            }
        }

        let request = ReleaseImageRequest {
            swapchain: self.swapchain_id,
            release_index: index as u32,
        };
        let mut msg = self.transport.start_message(header::swapchain::RELEASE_IMAGE)?;
        request.encode(&mut msg)?;
        msg.flush()?;

        let mut state = self.state.lock()?;
        state.ring.commit_release();
        Ok(())
    }

    /// Destroys every per-image Vulkan object and tells the server to drop its half (spec
    /// §4.5 "Cleanup": "waits the queue to idle, frees per-image resources in both
    /// processes").
    pub fn destroy(&self) -> Result<()> {
        {
            let mut msg = self.transport.start_message(header::swapchain::DESTROY_SWAPCHAIN)?;
            DestroySwapchainRequest {
                swapchain: self.swapchain_id,
            }
            .encode(&mut msg)?;
            msg.flush()?;
        }
        let reply = {
            let mut msg = self
                .transport
                .await_message(header::swapchain::DESTROY_SWAPCHAIN_RETURN)?;
            DestroySwapchainReturn::decode(&mut msg)?
        };
        if reply.result != 0 {
            log::warn!(
                "server reported failure {} destroying swapchain {}",
                reply.result,
                self.swapchain_id
            );
        }

        let mut state = self.state.lock()?;
        unsafe {
            self.device.queue_wait_idle(self.queue)?;
            for image in state.images.drain(..) {
                self.device.destroy_image(image.vk_image, None);
                self.device.free_memory(image.device_memory, None);
                // Semaphores and the fence destroy themselves on drop.
            }
        }
        Ok(())
    }
}
