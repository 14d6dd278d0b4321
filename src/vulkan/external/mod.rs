//! Cross-process GPU memory and semaphore export/import: the Vulkan half of what
//! [`crate::handle_exchange`] moves between processes.
//!
//! Nothing in `phobos` does this (a single-process renderer never needs to share device
//! memory with another process), so this module is new surface grounded directly on
//! `original_source`'s Vulkan modules (`vulkan/` per spec §9) and on the platform-appropriate
//! `VK_KHR_external_memory_fd`/`VK_KHR_external_semaphore_fd` (Unix) or
//! `VK_KHR_external_memory_win32`/`VK_KHR_external_semaphore_win32` (Windows) extensions.
//! The platform split mirrors [`crate::handle_exchange`]'s `unix`/`windows` submodules.

use ash::vk;

use crate::error::Result;
use crate::handle_exchange::OsHandle;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
use self::unix as platform;
#[cfg(windows)]
use self::windows as platform;

/// The external memory handle type this build exports/imports: an opaque POSIX fd on Unix,
/// an opaque `HANDLE` on Windows. Every allocation and import call in this module agrees on
/// this single type, matching the single-magic/single-version simplicity the spec keeps for
/// the rest of the wire protocol (no capability negotiation).
pub fn external_memory_handle_type() -> vk::ExternalMemoryHandleTypeFlags {
    platform::MEMORY_HANDLE_TYPE
}

/// The external semaphore handle type counterpart of [`external_memory_handle_type`].
pub fn external_semaphore_handle_type() -> vk::ExternalSemaphoreHandleTypeFlags {
    platform::SEMAPHORE_HANDLE_TYPE
}

/// Creates a `VkImage` of `extent`/`format`/`usage` whose backing memory will be exportable,
/// by chaining `VkExternalMemoryImageCreateInfo` onto the ordinary create info. Used by the
/// server to allocate the shared image per spec §4.5 step 2 ("allocates a server-side
/// 'shared' `VkImage`... with... an exportable dedicated memory block").
pub fn create_exportable_image(
    device: &ash::Device,
    extent: vk::Extent3D,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
) -> Result<vk::Image> {
    let mut external_info =
        vk::ExternalMemoryImageCreateInfo::builder().handle_types(external_memory_handle_type());
    let info = vk::ImageCreateInfo::builder()
        .push_next(&mut external_info)
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(extent)
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);
    let image = unsafe { device.create_image(&info, None)? };
    Ok(image)
}

/// Allocates device memory bound to `image`'s requirements, exportable as
/// [`external_memory_handle_type`]. Returns the allocation alongside its size, since the
/// peer needs the size to validate its own import (spec §4.5 step 2: "`(result, swapchain,
/// N, memory_size, memory_type_index)`").
pub fn allocate_exportable_memory(
    device: &ash::Device,
    requirements: vk::MemoryRequirements,
    memory_type_index: u32,
) -> Result<(vk::DeviceMemory, u64)> {
    let mut export_info =
        vk::ExportMemoryAllocateInfo::builder().handle_types(external_memory_handle_type());
    let info = vk::MemoryAllocateInfo::builder()
        .push_next(&mut export_info)
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);
    let memory = unsafe { device.allocate_memory(&info, None)? };
    Ok((memory, requirements.size))
}

/// Exports `memory` as an [`OsHandle`] suitable for [`crate::handle_exchange::HandleExchange`].
pub fn export_memory_handle(
    instance: &ash::Instance,
    device: &ash::Device,
    memory: vk::DeviceMemory,
) -> Result<OsHandle> {
    platform::export_memory_handle(instance, device, memory)
}

/// Imports a memory handle received over [`crate::handle_exchange::HandleExchange`] into a
/// fresh `VkDeviceMemory` of the given size and memory type index. Used by the client when
/// importing the server's shared image memory (spec §4.5 step 4: "imports the memory").
pub fn import_memory_handle(
    instance: &ash::Instance,
    device: &ash::Device,
    handle: OsHandle,
    size: u64,
    memory_type_index: u32,
) -> Result<vk::DeviceMemory> {
    platform::import_memory_handle(instance, device, handle, size, memory_type_index)
}

/// Creates a binary semaphore whose signal can be exported as an [`OsHandle`].
pub fn create_exportable_semaphore(device: &ash::Device) -> Result<crate::vulkan::Semaphore> {
    let mut export_info =
        vk::ExportSemaphoreCreateInfo::builder().handle_types(external_semaphore_handle_type());
    let info = vk::SemaphoreCreateInfo::builder().push_next(&mut export_info);
    let handle = unsafe { device.create_semaphore(&info, None)? };
    Ok(crate::vulkan::Semaphore::from_handle(device.clone(), handle))
}

/// Exports `semaphore`'s signal as an [`OsHandle`].
pub fn export_semaphore_handle(
    instance: &ash::Instance,
    device: &ash::Device,
    semaphore: vk::Semaphore,
) -> Result<OsHandle> {
    platform::export_semaphore_handle(instance, device, semaphore)
}

/// Imports a semaphore handle received over HX into an *existing* semaphore object (unlike
/// memory, Vulkan imports a semaphore payload into a handle the importer already created
/// with `vkCreateSemaphore`, temporarily replacing its payload). Used by the client when
/// importing `rendering_done`/`copying_done` (spec §4.5 step 4: "imports both semaphores").
pub fn import_semaphore_handle(
    instance: &ash::Instance,
    device: &ash::Device,
    semaphore: vk::Semaphore,
    handle: OsHandle,
) -> Result<()> {
    platform::import_semaphore_handle(instance, device, semaphore, handle)
}
