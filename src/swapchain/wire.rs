//! Payload (de)serialization for the swapchain header band (`header::swapchain`, spec §6:
//! "the Swapchain Mirror reserves 100-111 for its exchanges").
//!
//! Per spec §1, "one serializer per struct" is mechanical and out of scope for the generated
//! XR function surface; these few structs are hand-written because they belong to this
//! crate's own protocol, not the generated one.

use std::io::{Read, Write};

use crate::error::Result;
use crate::swapchain::ImageType;

fn write_u32(w: &mut impl Write, v: u32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn read_u32(r: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn write_u64(w: &mut impl Write, v: u64) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn read_u64(r: &mut impl Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn write_bool(w: &mut impl Write, v: bool) -> Result<()> {
    w.write_all(&[v as u8])?;
    Ok(())
}

fn read_bool(r: &mut impl Read) -> Result<bool> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0] != 0)
}

/// `CREATE_SWAPCHAIN` request body (spec §4.5 step 1).
pub struct CreateSwapchainRequest {
    pub session: u64,
    pub width: u32,
    pub height: u32,
    pub image_type: ImageType,
    pub is_static: bool,
    /// `VkFormat` as its raw integer value. Ambient relative to spec §3's data model (which
    /// names only width/height/image_type/is_static), added because the server cannot pick a
    /// Vulkan format for the client's imported image out of thin air.
    pub format: i32,
}

impl CreateSwapchainRequest {
    pub fn encode(&self, w: &mut impl Write) -> Result<()> {
        write_u64(w, self.session)?;
        write_u32(w, self.width)?;
        write_u32(w, self.height)?;
        write_u32(w, self.image_type.into())?;
        write_bool(w, self.is_static)?;
        write_u32(w, self.format as u32)?;
        Ok(())
    }

    pub fn decode(r: &mut impl Read) -> Result<Self> {
        Ok(CreateSwapchainRequest {
            session: read_u64(r)?,
            width: read_u32(r)?,
            height: read_u32(r)?,
            image_type: ImageType::try_from(read_u32(r)?)?,
            is_static: read_bool(r)?,
            format: read_u32(r)? as i32,
        })
    }
}

/// `CREATE_SWAPCHAIN_RETURN` reply body (spec §4.5 step 2: "returns `(result, swapchain, N,
/// memory_size, memory_type_index)`").
pub struct CreateSwapchainReturn {
    pub result: i32,
    pub swapchain: u64,
    pub image_count: u32,
    pub memory_size: u64,
    pub memory_type_index: u32,
}

impl CreateSwapchainReturn {
    pub fn encode(&self, w: &mut impl Write) -> Result<()> {
        write_u32(w, self.result as u32)?;
        write_u64(w, self.swapchain)?;
        write_u32(w, self.image_count)?;
        write_u64(w, self.memory_size)?;
        write_u32(w, self.memory_type_index)?;
        Ok(())
    }

    pub fn decode(r: &mut impl Read) -> Result<Self> {
        Ok(CreateSwapchainReturn {
            result: read_u32(r)? as i32,
            swapchain: read_u64(r)?,
            image_count: read_u32(r)?,
            memory_size: read_u64(r)?,
            memory_type_index: read_u32(r)?,
        })
    }
}

/// `DESTROY_SWAPCHAIN` request body.
pub struct DestroySwapchainRequest {
    pub swapchain: u64,
}

impl DestroySwapchainRequest {
    pub fn encode(&self, w: &mut impl Write) -> Result<()> {
        write_u64(w, self.swapchain)
    }

    pub fn decode(r: &mut impl Read) -> Result<Self> {
        Ok(DestroySwapchainRequest {
            swapchain: read_u64(r)?,
        })
    }
}

/// `DESTROY_SWAPCHAIN_RETURN` reply body.
pub struct DestroySwapchainReturn {
    pub result: i32,
}

impl DestroySwapchainReturn {
    pub fn encode(&self, w: &mut impl Write) -> Result<()> {
        write_u32(w, self.result as u32)
    }

    pub fn decode(r: &mut impl Read) -> Result<Self> {
        Ok(DestroySwapchainReturn {
            result: read_u32(r)? as i32,
        })
    }
}

/// `RELEASE_IMAGE` request body (spec §4.5 release, client side: "Send `RELEASE_IMAGE
/// (swapchain, release_head)` on TX").
pub struct ReleaseImageRequest {
    pub swapchain: u64,
    pub release_index: u32,
}

impl ReleaseImageRequest {
    pub fn encode(&self, w: &mut impl Write) -> Result<()> {
        write_u64(w, self.swapchain)?;
        write_u32(w, self.release_index)?;
        Ok(())
    }

    pub fn decode(r: &mut impl Read) -> Result<Self> {
        Ok(ReleaseImageRequest {
            swapchain: read_u64(r)?,
            release_index: read_u32(r)?,
        })
    }
}

/// `RELEASE_IMAGE_RETURN` reply body (spec §4.5 release, server side step 6).
pub struct ReleaseImageReturn {
    pub result: i32,
}

impl ReleaseImageReturn {
    pub fn encode(&self, w: &mut impl Write) -> Result<()> {
        write_u32(w, self.result as u32)
    }

    pub fn decode(r: &mut impl Read) -> Result<Self> {
        Ok(ReleaseImageReturn {
            result: read_u32(r)? as i32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_swapchain_request_round_trips() {
        let req = CreateSwapchainRequest {
            session: 0xdead_beef,
            width: 1920,
            height: 1080,
            image_type: ImageType::Color,
            is_static: false,
            format: 43,
        };
        let mut buf = Vec::new();
        req.encode(&mut buf).unwrap();
        let decoded = CreateSwapchainRequest::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded.session, req.session);
        assert_eq!(decoded.width, req.width);
        assert_eq!(decoded.height, req.height);
        assert_eq!(decoded.image_type, req.image_type);
        assert_eq!(decoded.is_static, req.is_static);
        assert_eq!(decoded.format, req.format);
    }

    #[test]
    fn release_image_request_round_trips() {
        let req = ReleaseImageRequest {
            swapchain: 7,
            release_index: 2,
        };
        let mut buf = Vec::new();
        req.encode(&mut buf).unwrap();
        let decoded = ReleaseImageRequest::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded.swapchain, req.swapchain);
        assert_eq!(decoded.release_index, req.release_index);
    }
}
