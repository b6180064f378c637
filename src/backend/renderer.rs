// Vulkan renderer - the single context object
//
// Owns every GPU object for the lifetime of the window. Construction order:
//   device (instance, surface, queues) -> command pool -> generation -> semaphores
// Destruction runs the other way round in Drop.

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use super::commands;
use super::error::RendererError;
use super::frame::{
    self, AcquireOutcome, FrameStatus, GenerationInfo, PresentOutcome, PresentTarget, ResizeEvent,
};
use super::generation::{Generation, ShaderPaths};
use super::sync::FrameSync;
use super::VulkanDevice;

/// Current framebuffer size of the window, in physical pixels
pub type SurfaceSizeFn = Box<dyn Fn() -> vk::Extent2D>;

pub struct RendererDesc<'a> {
    pub app_name: &'a str,
    pub enable_validation: bool,
    pub display_handle: RawDisplayHandle,
    pub window_handle: RawWindowHandle,
    pub shaders: ShaderPaths,
    pub surface_size: SurfaceSizeFn,
}

pub struct VulkanRenderer {
    sync: Option<FrameSync>,
    generation: Option<Generation>,
    command_pool: vk::CommandPool,
    shaders: ShaderPaths,
    surface_size: SurfaceSizeFn,
    wait_stages: [vk::PipelineStageFlags; 1],
    device: VulkanDevice,
}

impl VulkanRenderer {
    pub fn new(desc: RendererDesc<'_>) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let device = VulkanDevice::new(
            desc.app_name,
            desc.enable_validation,
            desc.display_handle,
            desc.window_handle,
        )?;

        let command_pool =
            commands::create_command_pool(&device.device, device.graphics_queue_family)?;

        let mut renderer = Self {
            sync: None,
            generation: None,
            command_pool,
            shaders: desc.shaders,
            surface_size: desc.surface_size,
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            device,
        };

        // Drop cleans up whatever was built if either step fails
        renderer.create_generation()?;
        renderer.sync = Some(FrameSync::new(&renderer.device.device)?);

        log::info!("Vulkan initialized successfully!");
        Ok(renderer)
    }

    /// Acquire, submit and present one frame, recreating the swapchain if it went stale
    pub fn draw_frame(&mut self) -> Result<FrameStatus> {
        frame::draw_frame(self)
    }

    /// Rebuild the swapchain for a new window size; zero sizes are ignored
    pub fn handle_resize(&mut self, event: ResizeEvent) -> Result<bool> {
        frame::handle_resize(self, event)
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }

    fn parts(&self) -> Result<(&Generation, &FrameSync)> {
        let generation = self.generation.as_ref().context("Swapchain not initialized")?;
        let sync = self.sync.as_ref().context("Semaphores not initialized")?;
        Ok((generation, sync))
    }
}

impl PresentTarget for VulkanRenderer {
    fn wait_present_idle(&mut self) -> Result<()> {
        self.device.wait_present_idle()
    }

    fn acquire_next_image(&mut self) -> Result<AcquireOutcome> {
        let (generation, sync) = self.parts()?;
        let swapchain = &generation.swapchain;

        let result = unsafe {
            swapchain.loader.acquire_next_image(
                swapchain.swapchain,
                u64::MAX,
                sync.image_available,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(RendererError::AcquireFailed(e).into()),
        }
    }

    fn submit(&mut self, image_index: u32) -> Result<()> {
        let (generation, sync) = self.parts()?;
        let cmd = *generation
            .command_buffers
            .get(image_index as usize)
            .with_context(|| format!("No command buffer for image {}", image_index))?;

        let wait_semaphores = [sync.image_available];
        let signal_semaphores = [sync.render_finished];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .device
                .queue_submit(self.device.graphics_queue, &[submit_info.build()], vk::Fence::null())
                .context("Failed to submit draw command buffer")?;
        }

        Ok(())
    }

    fn present(&mut self, image_index: u32) -> Result<PresentOutcome> {
        let (generation, sync) = self.parts()?;

        let wait_semaphores = [sync.render_finished];
        let swapchains = [generation.swapchain.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            generation
                .swapchain
                .loader
                .queue_present(self.device.present_queue, &present_info)
        };

        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                Ok(PresentOutcome::NeedsRecreation)
            }
            Err(e) => Err(RendererError::PresentFailed(e).into()),
        }
    }

    fn wait_device_idle(&mut self) -> Result<()> {
        self.device.wait_idle()
    }

    fn destroy_generation(&mut self) {
        if let Some(mut generation) = self.generation.take() {
            generation.destroy(&self.device.device, self.command_pool);
        }
    }

    fn create_generation(&mut self) -> Result<GenerationInfo> {
        let window_size = (self.surface_size)();
        let generation =
            Generation::create(&self.device, self.command_pool, &self.shaders, window_size)?;
        let info = generation.info();
        self.generation = Some(generation);
        Ok(info)
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        if let Err(e) = self.device.wait_idle() {
            log::warn!("{:#}", e);
        }

        self.destroy_generation();

        if let Some(sync) = self.sync.take() {
            sync.destroy(&self.device.device);
        }

        unsafe {
            self.device.device.destroy_command_pool(self.command_pool, None);
        }

        // `device` drops next: logical device, surface, messenger, instance
        log::info!("Cleanup complete");
    }
}
