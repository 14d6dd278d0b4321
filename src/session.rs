//! Per-session state, mirrored on both peers (spec §3, "Session state (mirrored)").
//!
//! Per spec §9's "shared global transport/runtime singletons" re-architecture note, a
//! session here is an ordinary owned value threaded explicitly from
//! [`crate::runtime::ClientRuntime`]/[`crate::runtime::ServerRuntime`], not a module-level
//! global; destroying it destroys every swapchain it owns first (spec §3, "Ownership").

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ash::vk;

use crate::error::Result;
use crate::handle_exchange::HandleExchange;
use crate::swapchain::{ClientSwapchain, ServerSwapchain, SwapchainCreateInfo};
use crate::transport::Transport;
use crate::vulkan::GraphicsBinding;

/// Client-side session: the application's graphics binding plus the swapchains it created
/// through this session (spec §3: "Client: `graphics_binding`... session-private
/// `VkCommandPool`, set of owned swapchains").
pub struct ClientSession {
    id: u64,
    binding: GraphicsBinding,
    cmd_pool: vk::CommandPool,
    transport: Arc<Transport>,
    hx: Arc<dyn HandleExchange>,
    swapchains: Mutex<HashMap<u64, Arc<ClientSwapchain>>>,
}

impl ClientSession {
    pub fn new(
        transport: Arc<Transport>,
        hx: Arc<dyn HandleExchange>,
        binding: GraphicsBinding,
        id: u64,
    ) -> Result<Arc<Self>> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(binding.queue_family_index)
            .flags(
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER
                    | vk::CommandPoolCreateFlags::TRANSIENT,
            );
        let cmd_pool = unsafe { binding.device.create_command_pool(&pool_info, None)? };
        Ok(Arc::new(ClientSession {
            id,
            binding,
            cmd_pool,
            transport,
            hx,
            swapchains: Mutex::new(HashMap::new()),
        }))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Runs the client half of swapchain creation (spec §4.5 "Creation") and tracks the
    /// result as owned by this session.
    pub fn create_swapchain(&self, info: SwapchainCreateInfo) -> Result<Arc<ClientSwapchain>> {
        let swapchain = ClientSwapchain::create(
            self.transport.clone(),
            self.hx.as_ref(),
            &self.binding.instance,
            self.binding.device.clone(),
            self.binding.queue(),
            self.binding.queue_family_index,
            self.cmd_pool,
            self.id,
            info,
        )?;
        self.swapchains
            .lock()?
            .insert(swapchain.swapchain_id(), swapchain.clone());
        Ok(swapchain)
    }

    /// Destroys one swapchain owned by this session (spec §4.5 "Cleanup":
    /// `destroy_swapchain`).
    pub fn destroy_swapchain(&self, swapchain_id: u64) -> Result<()> {
        let swapchain = self.swapchains.lock()?.remove(&swapchain_id);
        if let Some(swapchain) = swapchain {
            swapchain.destroy()?;
        }
        Ok(())
    }

    /// Destroys every swapchain this session owns, then the session's command pool (spec
    /// §4.5 "Cleanup": "`destroy_session` iterates swapchains first").
    pub fn destroy(&self) -> Result<()> {
        let ids: Vec<u64> = self.swapchains.lock()?.keys().copied().collect();
        for id in ids {
            self.destroy_swapchain(id)?;
        }
        unsafe {
            self.binding.device.destroy_command_pool(self.cmd_pool, None);
        }
        Ok(())
    }
}

/// Server-side session: the queue chosen for this session's shared-image copies plus the
/// swapchains created under it (spec §3: "Server: `VkQueue` chosen at session creation, set
/// of owned swapchains").
pub struct ServerSession {
    id: u64,
    queue: vk::Queue,
    queue_family_index: u32,
    swapchains: Mutex<HashMap<u64, Arc<ServerSwapchain>>>,
}

impl ServerSession {
    pub fn new(id: u64, queue: vk::Queue, queue_family_index: u32) -> Arc<Self> {
        Arc::new(ServerSession {
            id,
            queue,
            queue_family_index,
            swapchains: Mutex::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    pub(crate) fn track_swapchain(&self, id: u64, swapchain: Arc<ServerSwapchain>) -> Result<()> {
        self.swapchains.lock()?.insert(id, swapchain);
        Ok(())
    }

    pub(crate) fn take_swapchain(&self, id: u64) -> Result<Option<Arc<ServerSwapchain>>> {
        Ok(self.swapchains.lock()?.remove(&id))
    }

    pub(crate) fn get_swapchain(&self, id: u64) -> Result<Option<Arc<ServerSwapchain>>> {
        Ok(self.swapchains.lock()?.get(&id).cloned())
    }

    /// Destroys every swapchain this session owns.
    pub fn destroy(&self) -> Result<()> {
        let swapchains: Vec<Arc<ServerSwapchain>> =
            self.swapchains.lock()?.drain().map(|(_, s)| s).collect();
        for swapchain in swapchains {
            swapchain.destroy()?;
        }
        Ok(())
    }
}
