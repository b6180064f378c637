// Synchronization primitives
//
// Exactly two binary semaphores, signaled and waited on by the GPU only.
// Created once at startup and kept across swapchain recreations.

use anyhow::{Context, Result};
use ash::vk;

pub struct FrameSync {
    /// Signaled by acquire, waited on by the graphics submit
    pub image_available: vk::Semaphore,
    /// Signaled by the graphics submit, waited on by present
    pub render_finished: vk::Semaphore,
}

impl FrameSync {
    pub fn new(device: &ash::Device) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();

        unsafe {
            let image_available = device
                .create_semaphore(&semaphore_info, None)
                .context("Failed to create image-available semaphore")?;

            let render_finished = match device.create_semaphore(&semaphore_info, None) {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    device.destroy_semaphore(image_available, None);
                    return Err(e).context("Failed to create render-finished semaphore");
                }
            };

            Ok(Self {
                image_available,
                render_finished,
            })
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_semaphore(self.image_available, None);
        }
    }
}
