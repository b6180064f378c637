// Swapchain generation
//
// Everything that depends on the swapchain's format or extent: the swapchain,
// its image views, render pass, pipeline layout, pipeline, framebuffers and
// command buffers. These are created together and destroyed together.

use anyhow::Result;
use ash::vk;
use std::path::PathBuf;

use super::frame::GenerationInfo;
use super::{commands, pipeline, Swapchain, VulkanDevice};

/// Where the compiled shaders live
#[derive(Clone, Debug)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

pub struct Generation {
    pub swapchain: Swapchain,
    pub render_pass: vk::RenderPass,
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub command_buffers: Vec<vk::CommandBuffer>,
}

impl Generation {
    /// Build in dependency order: swapchain, image views, render pass, pipeline,
    /// framebuffers, command buffers. On failure the partial set is torn down.
    pub fn create(
        device: &VulkanDevice,
        command_pool: vk::CommandPool,
        shaders: &ShaderPaths,
        window_size: vk::Extent2D,
    ) -> Result<Self> {
        let swapchain = Swapchain::new(device, window_size)?;

        let mut generation = Self {
            swapchain,
            render_pass: vk::RenderPass::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            framebuffers: Vec::new(),
            command_buffers: Vec::new(),
        };

        if let Err(e) = generation.build_dependents(&device.device, command_pool, shaders) {
            generation.destroy(&device.device, command_pool);
            return Err(e);
        }

        Ok(generation)
    }

    fn build_dependents(
        &mut self,
        device: &ash::Device,
        command_pool: vk::CommandPool,
        shaders: &ShaderPaths,
    ) -> Result<()> {
        let extent = self.swapchain.extent;

        self.swapchain.create_image_views(device)?;
        self.render_pass = pipeline::create_render_pass(device, self.swapchain.format)?;
        self.pipeline_layout = pipeline::create_pipeline_layout(device)?;
        self.pipeline = pipeline::create_graphics_pipeline(
            device,
            self.render_pass,
            self.pipeline_layout,
            extent,
            &shaders.vertex,
            &shaders.fragment,
        )?;
        self.framebuffers = pipeline::create_framebuffers(
            device,
            &self.swapchain.image_views,
            self.render_pass,
            extent,
        )?;
        self.command_buffers =
            commands::allocate_command_buffers(device, command_pool, self.framebuffers.len())?;
        commands::record_draw_commands(
            device,
            &self.command_buffers,
            &self.framebuffers,
            self.render_pass,
            self.pipeline,
            extent,
        )?;

        Ok(())
    }

    /// Tear down in order: framebuffers, command buffers, pipeline, layout,
    /// render pass, image views, swapchain. Null handles are skipped by Vulkan.
    pub fn destroy(&mut self, device: &ash::Device, command_pool: vk::CommandPool) {
        pipeline::destroy_framebuffers(device, &mut self.framebuffers);
        commands::free_command_buffers(device, command_pool, &mut self.command_buffers);

        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.destroy_render_pass(self.render_pass, None);
        }
        self.pipeline = vk::Pipeline::null();
        self.pipeline_layout = vk::PipelineLayout::null();
        self.render_pass = vk::RenderPass::null();

        self.swapchain.destroy_image_views(device);
        self.swapchain.destroy();
    }

    pub fn info(&self) -> GenerationInfo {
        GenerationInfo {
            extent: self.swapchain.extent,
            image_count: self.swapchain.images.len(),
            image_views: self.swapchain.image_views.len(),
            framebuffers: self.framebuffers.len(),
            command_buffers: self.command_buffers.len(),
        }
    }
}
