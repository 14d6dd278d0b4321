//! Unix backend for [`super`]: `VK_KHR_external_memory_fd` / `VK_KHR_external_semaphore_fd`.

use std::os::unix::io::{FromRawFd, OwnedFd, RawFd};

use ash::extensions::khr::{ExternalMemoryFd, ExternalSemaphoreFd};
use ash::vk;

use crate::error::Result;
use crate::handle_exchange::OsHandle;

pub const MEMORY_HANDLE_TYPE: vk::ExternalMemoryHandleTypeFlags =
    vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD;
pub const SEMAPHORE_HANDLE_TYPE: vk::ExternalSemaphoreHandleTypeFlags =
    vk::ExternalSemaphoreHandleTypeFlags::OPAQUE_FD;

pub fn export_memory_handle(
    instance: &ash::Instance,
    device: &ash::Device,
    memory: vk::DeviceMemory,
) -> Result<OsHandle> {
    let loader = ExternalMemoryFd::new(instance, device);
    let info = vk::MemoryGetFdInfoKHR::builder()
        .memory(memory)
        .handle_type(MEMORY_HANDLE_TYPE);
    let fd = unsafe { loader.get_memory_fd(&info)? };
    Ok(OsHandle(fd as u64))
}

pub fn import_memory_handle(
    instance: &ash::Instance,
    device: &ash::Device,
    handle: OsHandle,
    size: u64,
    memory_type_index: u32,
) -> Result<vk::DeviceMemory> {
    // `vkImportMemoryFdInfoKHR` takes ownership of the fd on success; on failure Vulkan
    // leaves it to us to close, mirroring HX's sender-closes-after-transfer discipline.
    let fd = handle.0 as RawFd;
    let mut import_info = vk::ImportMemoryFdInfoKHR::builder()
        .handle_type(MEMORY_HANDLE_TYPE)
        .fd(fd);
    let info = vk::MemoryAllocateInfo::builder()
        .push_next(&mut import_info)
        .allocation_size(size)
        .memory_type_index(memory_type_index);
    match unsafe { device.allocate_memory(&info, None) } {
        Ok(memory) => Ok(memory),
        Err(e) => {
            // SAFETY: ownership of `fd` reverts to us since the import failed.
            unsafe {
                let _ = OwnedFd::from_raw_fd(fd);
            }
            Err(e.into())
        }
    }
}

pub fn export_semaphore_handle(
    instance: &ash::Instance,
    device: &ash::Device,
    semaphore: vk::Semaphore,
) -> Result<OsHandle> {
    let loader = ExternalSemaphoreFd::new(instance, device);
    let info = vk::SemaphoreGetFdInfoKHR::builder()
        .semaphore(semaphore)
        .handle_type(SEMAPHORE_HANDLE_TYPE);
    let fd = unsafe { loader.get_semaphore_fd(&info)? };
    Ok(OsHandle(fd as u64))
}

pub fn import_semaphore_handle(
    instance: &ash::Instance,
    device: &ash::Device,
    semaphore: vk::Semaphore,
    handle: OsHandle,
) -> Result<()> {
    let loader = ExternalSemaphoreFd::new(instance, device);
    let fd = handle.0 as RawFd;
    let info = vk::ImportSemaphoreFdInfoKHR::builder()
        .semaphore(semaphore)
        .handle_type(SEMAPHORE_HANDLE_TYPE)
        .fd(fd);
    unsafe { loader.import_semaphore_fd(&info)? };
    Ok(())
}
