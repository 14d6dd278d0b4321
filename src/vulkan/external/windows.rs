//! Windows backend for [`super`]: `VK_KHR_external_memory_win32` / `VK_KHR_external_semaphore_win32`.

use ash::extensions::khr::{ExternalMemoryWin32, ExternalSemaphoreWin32};
use ash::vk;
use windows::Win32::Foundation::{CloseHandle, HANDLE};

use crate::error::Result;
use crate::handle_exchange::OsHandle;

pub const MEMORY_HANDLE_TYPE: vk::ExternalMemoryHandleTypeFlags =
    vk::ExternalMemoryHandleTypeFlags::OPAQUE_WIN32;
pub const SEMAPHORE_HANDLE_TYPE: vk::ExternalSemaphoreHandleTypeFlags =
    vk::ExternalSemaphoreHandleTypeFlags::OPAQUE_WIN32;

pub fn export_memory_handle(
    instance: &ash::Instance,
    device: &ash::Device,
    memory: vk::DeviceMemory,
) -> Result<OsHandle> {
    let loader = ExternalMemoryWin32::new(instance, device);
    let info = vk::MemoryGetWin32HandleInfoKHR::builder()
        .memory(memory)
        .handle_type(MEMORY_HANDLE_TYPE);
    let handle = unsafe { loader.get_memory_win32_handle(&info)? };
    Ok(OsHandle(handle.0 as u64))
}

pub fn import_memory_handle(
    instance: &ash::Instance,
    device: &ash::Device,
    handle: OsHandle,
    size: u64,
    memory_type_index: u32,
) -> Result<vk::DeviceMemory> {
    let win32_handle = HANDLE(handle.0 as isize);
    let mut import_info = vk::ImportMemoryWin32HandleInfoKHR::builder()
        .handle_type(MEMORY_HANDLE_TYPE)
        .handle(win32_handle.0 as *mut std::ffi::c_void);
    let info = vk::MemoryAllocateInfo::builder()
        .push_next(&mut import_info)
        .allocation_size(size)
        .memory_type_index(memory_type_index);
    match unsafe { device.allocate_memory(&info, None) } {
        Ok(memory) => Ok(memory),
        Err(e) => {
            // Windows does not transfer ownership of the handle into the failed import;
            // close our copy, matching HX's sender-closes-on-failure discipline.
            unsafe {
                let _ = CloseHandle(win32_handle);
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
    let loader = ExternalSemaphoreWin32::new(instance, device);
    let info = vk::SemaphoreGetWin32HandleInfoKHR::builder()
        .semaphore(semaphore)
        .handle_type(SEMAPHORE_HANDLE_TYPE);
    let handle = unsafe { loader.get_semaphore_win32_handle(&info)? };
    Ok(OsHandle(handle.0 as u64))
}

pub fn import_semaphore_handle(
    instance: &ash::Instance,
    device: &ash::Device,
    semaphore: vk::Semaphore,
    handle: OsHandle,
) -> Result<()> {
    let loader = ExternalSemaphoreWin32::new(instance, device);
    let win32_handle = HANDLE(handle.0 as isize);
    let info = vk::ImportSemaphoreWin32HandleInfoKHR::builder()
        .semaphore(semaphore)
        .handle_type(SEMAPHORE_HANDLE_TYPE)
        .handle(win32_handle.0 as *mut std::ffi::c_void);
    unsafe { loader.import_semaphore_win32_handle(&info)? };
    Ok(())
}
