//! Swapchain Mirror (SM): maintains per-swapchain GPU state on both peers so a swapchain
//! image the application renders into on the client is kept consistent with the real XR
//! runtime's own swapchain image on the server, without either side touching the other's
//! process memory directly (spec §4.5, "the other hard piece").
//!
//! [`client::ClientSwapchain`] and [`server::ServerSwapchain`] are the two mirrored halves;
//! [`ring::RingState`] is the acquire/wait/release cursor bookkeeping shared in spirit by
//! both (only the client ring advances under direct application control, but the server's
//! per-image fence plays an equivalent completion-ordering role).

pub mod client;
pub mod ring;
pub mod server;
pub(crate) mod wire;

use crate::error::Error;

pub use client::ClientSwapchain;
pub use server::ServerSwapchain;

/// The two Vulkan image kinds a swapchain can mirror (spec §3: `image_type in {Color,
/// DepthStencil}`). Distinct cases because the server's copy pass (spec §4.5 step 3) needs to
/// know which aspect mask and final layout to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Color,
    DepthStencil,
}

impl ImageType {
    /// The Vulkan image aspect this image type's views and barriers use.
    pub fn aspect_mask(self) -> ash::vk::ImageAspectFlags {
        match self {
            ImageType::Color => ash::vk::ImageAspectFlags::COLOR,
            ImageType::DepthStencil => {
                ash::vk::ImageAspectFlags::DEPTH | ash::vk::ImageAspectFlags::STENCIL
            }
        }
    }

    /// The layout a released image should end up in after the client's `release_cmd` (the
    /// layout the application is expected to have left the image in) and the layout the
    /// server's copy destination transitions into afterwards (spec §4.5 step 3: "final
    /// barrier `TRANSFER_DST_OPTIMAL -> ColorAttachment` or `DepthStencilAttachment` per
    /// `image_type`").
    pub fn attachment_layout(self) -> ash::vk::ImageLayout {
        match self {
            ImageType::Color => ash::vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ImageType::DepthStencil => ash::vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    }

    /// The image usage bits the server force-adds on top of whatever the application asked
    /// for, so the runtime's own images can serve as the copy source or destination (spec
    /// §4.5 step 2: "force-adding `TRANSFER_DST` usage"; the shared image additionally needs
    /// `TRANSFER_SRC` since the server copies *from* it into the runtime's image).
    pub fn usage_flags(self) -> ash::vk::ImageUsageFlags {
        match self {
            ImageType::Color => ash::vk::ImageUsageFlags::COLOR_ATTACHMENT,
            ImageType::DepthStencil => ash::vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        }
    }
}

impl From<ImageType> for u32 {
    fn from(value: ImageType) -> Self {
        match value {
            ImageType::Color => 0,
            ImageType::DepthStencil => 1,
        }
    }
}

impl TryFrom<u32> for ImageType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ImageType::Color),
            1 => Ok(ImageType::DepthStencil),
            _ => Err(Error::LayerInvalid("image_type out of range")),
        }
    }
}

/// Application-supplied swapchain creation parameters (spec §3, `Swapchain state`: `width`,
/// `height`, `image_type`, `is_static`), plus the Vulkan format ambient to this crate's
/// Vulkan-facing surface.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainCreateInfo {
    pub width: u32,
    pub height: u32,
    pub image_type: ImageType,
    pub is_static: bool,
    pub format: ash::vk::Format,
}
