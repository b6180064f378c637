// Command pool and pre-recorded command buffers
//
// One primary buffer per framebuffer, recorded once per swapchain generation and
// resubmitted every frame. Re-recording only happens on swapchain recreation.

use anyhow::{Context, Result};
use ash::vk;

/// Opaque black
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Hardcoded in the vertex shader
pub const TRIANGLE_VERTEX_COUNT: u32 = 3;

/// Pool bound to the graphics family; lives across recreations
pub fn create_command_pool(device: &ash::Device, graphics_family: u32) -> Result<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo::builder()
        .queue_family_index(graphics_family)
        .flags(vk::CommandPoolCreateFlags::empty());

    unsafe {
        device
            .create_command_pool(&pool_info, None)
            .context("Failed to create command pool")
    }
}

pub fn allocate_command_buffers(
    device: &ash::Device,
    command_pool: vk::CommandPool,
    count: usize,
) -> Result<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count as u32);

    unsafe {
        device
            .allocate_command_buffers(&alloc_info)
            .context("Failed to allocate command buffers")
    }
}

/// Record begin pass -> bind pipeline -> draw 3 -> end pass into each buffer.
///
/// `command_buffers[i]` targets `framebuffers[i]`.
pub fn record_draw_commands(
    device: &ash::Device,
    command_buffers: &[vk::CommandBuffer],
    framebuffers: &[vk::Framebuffer],
    render_pass: vk::RenderPass,
    pipeline: vk::Pipeline,
    extent: vk::Extent2D,
) -> Result<()> {
    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: CLEAR_COLOR,
        },
    }];

    let render_area = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };

    for (&cmd, &framebuffer) in command_buffers.iter().zip(framebuffers) {
        // May be pending on one image while submitted again for another
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);

        unsafe {
            device
                .begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin recording command buffer")?;

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
            device.cmd_draw(cmd, TRIANGLE_VERTEX_COUNT, 1, 0, 0);
            device.cmd_end_render_pass(cmd);

            device
                .end_command_buffer(cmd)
                .context("Failed to record command buffer")?;
        }
    }

    log::debug!("Recorded {} command buffers", command_buffers.len());
    Ok(())
}

pub fn free_command_buffers(
    device: &ash::Device,
    command_pool: vk::CommandPool,
    command_buffers: &mut Vec<vk::CommandBuffer>,
) {
    if !command_buffers.is_empty() {
        unsafe { device.free_command_buffers(command_pool, command_buffers) };
        command_buffers.clear();
    }
}
