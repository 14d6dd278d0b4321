//! Per-process `Runtime` values: the replacement for the source's module-level singletons
//! (spec §9, "Shared global transport/runtime singletons... The replacement is a
//! per-process `Runtime` value created at initialization and threaded explicitly to each
//! module's entry-point; module state becomes a struct owned by the Runtime").
//!
//! [`ClientRuntime`] and [`ServerRuntime`] own the [`Transport`], the
//! [`HandleExchange`](crate::handle_exchange::HandleExchange) side channel, and the session
//! table, and register the swapchain header-band handlers described in spec §4.5 on top of
//! it. The application-layer `FUNCTION_CALL`/`FUNCTION_RETURN` dispatch itself is the
//! generated surface spec §1 calls out of scope; only the Swapchain Mirror's own messages
//! are wired up here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ash::vk;

use crate::error::{Error, Result};
use crate::handle_exchange::HandleExchange;
use crate::header;
use crate::session::{ClientSession, ServerSession};
use crate::swapchain::server::RuntimeSwapchain;
use crate::swapchain::wire::{
    CreateSwapchainRequest, CreateSwapchainReturn, DestroySwapchainRequest, DestroySwapchainReturn,
    ReleaseImageRequest, ReleaseImageReturn,
};
use crate::swapchain::{ServerSwapchain, SwapchainCreateInfo};
use crate::transport::{MessageLockIn, Transport};
use crate::vulkan::GraphicsBinding;

/// The real XR runtime this process hosts, abstracted to the one capability the Swapchain
/// Mirror needs from it: creating a runtime-native swapchain for a session (spec §1, "the XR
/// function dispatch table" is out of scope; everything else the server does to a runtime
/// swapchain goes through the narrower [`RuntimeSwapchain`] trait instead).
pub trait XrRuntime: Send + Sync {
    /// Calls the real `xrCreateSwapchain` (force-adding `TRANSFER_DST` usage per spec §4.5
    /// step 2, which is this trait implementation's responsibility, not this crate's), and
    /// returns the runtime's own images plus a handle for driving its acquire/wait/release
    /// calls.
    fn create_swapchain(
        &self,
        session: u64,
        info: &SwapchainCreateInfo,
    ) -> Result<(Vec<vk::Image>, Arc<dyn RuntimeSwapchain>)>;
}

/// Owns the application-process side of the bridge: the [`Transport`] to the server, the HX
/// side channel, and every [`ClientSession`] created on top of them.
pub struct ClientRuntime {
    pub transport: Arc<Transport>,
    pub hx: Arc<dyn HandleExchange>,
    next_session_id: AtomicU64,
    sessions: Mutex<HashMap<u64, Arc<ClientSession>>>,
}

impl ClientRuntime {
    pub fn new(transport: Arc<Transport>, hx: Arc<dyn HandleExchange>) -> Result<Arc<Self>> {
        let runtime = Arc::new(ClientRuntime {
            transport,
            hx,
            next_session_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
        });
        runtime.register_handlers()?;
        Ok(runtime)
    }

    fn register_handlers(self: &Arc<Self>) -> Result<()> {
        // The server's RELEASE_IMAGE_RETURN is not awaited by anything (spec §4.5 release is
        // fire-and-forget from the client's perspective); register a silent handler so it
        // doesn't log as an unknown header on every release.
        self.transport
            .register_handler(header::swapchain::RELEASE_IMAGE_RETURN, |_t, msg| {
                let _ = msg;
                log::trace!("RELEASE_IMAGE_RETURN acknowledged");
            })?;
        Ok(())
    }

    /// Creates a new session and allocates it an id. The session id is this crate's own
    /// concern (spec §3 names no particular id scheme); a generated dispatch table layered
    /// on top would typically hand back the XR session handle itself as `id` instead.
    pub fn create_session(self: &Arc<Self>, binding: GraphicsBinding) -> Result<Arc<ClientSession>> {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let session = ClientSession::new(self.transport.clone(), self.hx.clone(), binding, id)?;
        self.sessions.lock()?.insert(id, session.clone());
        Ok(session)
    }

    pub fn destroy_session(&self, id: u64) -> Result<()> {
        if let Some(session) = self.sessions.lock()?.remove(&id) {
            session.destroy()?;
        }
        Ok(())
    }
}

/// Owns the server process side: the [`Transport`] to the application, the HX side channel,
/// the real [`XrRuntime`] this process hosts, and every [`ServerSession`].
pub struct ServerRuntime {
    transport: Arc<Transport>,
    hx: Arc<dyn HandleExchange>,
    xr_runtime: Arc<dyn XrRuntime>,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    next_session_id: AtomicU64,
    next_swapchain_id: AtomicU64,
    sessions: Mutex<HashMap<u64, Arc<ServerSession>>>,
    /// Maps a swapchain id back to the session that owns it, since `DESTROY_SWAPCHAIN` and
    /// `RELEASE_IMAGE` only carry the swapchain id on the wire (spec §4.5, those messages'
    /// payloads).
    swapchain_owner: Mutex<HashMap<u64, u64>>,
}

impl ServerRuntime {
    pub fn new(
        transport: Arc<Transport>,
        hx: Arc<dyn HandleExchange>,
        xr_runtime: Arc<dyn XrRuntime>,
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
    ) -> Result<Arc<Self>> {
        let runtime = Arc::new(ServerRuntime {
            transport,
            hx,
            xr_runtime,
            instance,
            physical_device,
            device,
            next_session_id: AtomicU64::new(1),
            next_swapchain_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
            swapchain_owner: Mutex::new(HashMap::new()),
        });
        runtime.register_handlers()?;
        Ok(runtime)
    }

    fn register_handlers(self: &Arc<Self>) -> Result<()> {
        let me = self.clone();
        self.transport
            .register_handler(header::swapchain::CREATE_SWAPCHAIN, move |t, msg| {
                if let Err(e) = me.handle_create_swapchain(t, msg) {
                    log::error!("CREATE_SWAPCHAIN handler failed: {e}");
                }
            })?;
        let me = self.clone();
        self.transport
            .register_handler(header::swapchain::DESTROY_SWAPCHAIN, move |t, msg| {
                if let Err(e) = me.handle_destroy_swapchain(t, msg) {
                    log::error!("DESTROY_SWAPCHAIN handler failed: {e}");
                }
            })?;
        let me = self.clone();
        self.transport
            .register_handler(header::swapchain::RELEASE_IMAGE, move |t, msg| {
                if let Err(e) = me.handle_release_image(t, msg) {
                    log::error!("RELEASE_IMAGE handler failed: {e}");
                }
            })?;
        Ok(())
    }

    pub fn create_session(self: &Arc<Self>, queue: vk::Queue, queue_family_index: u32) -> Result<Arc<ServerSession>> {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let session = ServerSession::new(id, queue, queue_family_index);
        self.sessions.lock()?.insert(id, session.clone());
        Ok(session)
    }

    pub fn destroy_session(&self, id: u64) -> Result<()> {
        if let Some(session) = self.sessions.lock()?.remove(&id) {
            session.destroy()?;
        }
        Ok(())
    }

    fn handle_create_swapchain(&self, t: &Transport, mut msg: MessageLockIn<'_>) -> Result<()> {
        let req = CreateSwapchainRequest::decode(&mut msg)?;
        let session = self
            .sessions
            .lock()?
            .get(&req.session)
            .cloned()
            .ok_or(Error::Uncategorized("CREATE_SWAPCHAIN for unknown session"))?;

        let info = SwapchainCreateInfo {
            width: req.width,
            height: req.height,
            image_type: req.image_type,
            is_static: req.is_static,
            format: vk::Format::from_raw(req.format),
        };

        let (runtime_images, runtime_swapchain) =
            self.xr_runtime.create_swapchain(req.session, &info)?;

        let created = ServerSwapchain::create(
            &self.instance,
            self.physical_device,
            self.device.clone(),
            session.queue(),
            session.queue_family_index(),
            runtime_swapchain,
            &runtime_images,
            info,
        )?;

        let swapchain_id = self.next_swapchain_id.fetch_add(1, Ordering::Relaxed);
        session.track_swapchain(swapchain_id, created.swapchain.clone())?;
        self.swapchain_owner.lock()?.insert(swapchain_id, req.session);

        let triples = created.swapchain.export_handle_triples()?;

        let mut out = t.start_message(header::swapchain::CREATE_SWAPCHAIN_RETURN)?;
        CreateSwapchainReturn {
            result: 0,
            swapchain: swapchain_id,
            image_count: created.image_count,
            memory_size: created.memory_size,
            memory_type_index: created.memory_type_index,
        }
        .encode(&mut out)?;
        out.flush()?;

        for (memory, rendering_done, copying_done) in triples {
            self.hx.send(memory)?;
            self.hx.send(rendering_done)?;
            self.hx.send(copying_done)?;
        }
        Ok(())
    }

    fn handle_destroy_swapchain(&self, t: &Transport, mut msg: MessageLockIn<'_>) -> Result<()> {
        let req = DestroySwapchainRequest::decode(&mut msg)?;
        let result = match self.remove_swapchain(req.swapchain)? {
            Some(swapchain) => {
                swapchain.destroy()?;
                0
            }
            None => {
                log::warn!("DESTROY_SWAPCHAIN for unknown swapchain {}", req.swapchain);
                1
            }
        };
        let mut out = t.start_message(header::swapchain::DESTROY_SWAPCHAIN_RETURN)?;
        DestroySwapchainReturn { result }.encode(&mut out)?;
        out.flush()
    }

    fn handle_release_image(&self, t: &Transport, mut msg: MessageLockIn<'_>) -> Result<()> {
        let req = ReleaseImageRequest::decode(&mut msg)?;
        let result = match self.find_swapchain(req.swapchain)? {
            Some(swapchain) => match swapchain.handle_release_image(req.release_index) {
                Ok(()) => 0,
                Err(e) => {
                    log::error!("RELEASE_IMAGE failed for swapchain {}: {e}", req.swapchain);
                    1
                }
            },
            None => {
                log::warn!("RELEASE_IMAGE for unknown swapchain {}", req.swapchain);
                1
            }
        };
        let mut out = t.start_message(header::swapchain::RELEASE_IMAGE_RETURN)?;
        ReleaseImageReturn { result }.encode(&mut out)?;
        out.flush()
    }

    fn find_swapchain(&self, swapchain_id: u64) -> Result<Option<Arc<ServerSwapchain>>> {
        let owner = match self.swapchain_owner.lock()?.get(&swapchain_id).copied() {
            Some(owner) => owner,
            None => return Ok(None),
        };
        let session = self.sessions.lock()?.get(&owner).cloned();
        match session {
            Some(session) => session.get_swapchain(swapchain_id),
            None => Ok(None),
        }
    }

    fn remove_swapchain(&self, swapchain_id: u64) -> Result<Option<Arc<ServerSwapchain>>> {
        let owner = match self.swapchain_owner.lock()?.remove(&swapchain_id) {
            Some(owner) => owner,
            None => return Ok(None),
        };
        let session = self.sessions.lock()?.get(&owner).cloned();
        match session {
            Some(session) => session.take_swapchain(swapchain_id),
            None => Ok(None),
        }
    }
}
