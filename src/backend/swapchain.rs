// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// The image views are owned here but have their own lifetime: they are
// destroyed separately, before the swapchain handle itself.

use anyhow::{Context, Result};
use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::vk;

use super::probe::SwapchainSupport;
use super::VulkanDevice;

/// Format used when the surface has no preference
pub const FALLBACK_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Present modes preferred over FIFO, best first
const PRESENT_MODE_PRIORITY: [vk::PresentModeKHR; 2] =
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE];

pub struct Swapchain {
    pub loader: SwapchainLoader,
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain for `window_size` (used only when the surface leaves
    /// the extent up to us). Image views are created separately.
    pub fn new(device: &VulkanDevice, window_size: vk::Extent2D) -> Result<Self> {
        let support = SwapchainSupport::query(
            &device.surface_loader,
            device.physical_device,
            device.surface,
        )?;
        let caps = &support.capabilities;

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(caps, window_size);
        let image_count = choose_image_count(caps);

        let (sharing_mode, family_indices) =
            choose_sharing_mode(device.graphics_queue_family, device.present_queue_family);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(device.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let loader = SwapchainLoader::new(&device.instance, &device.device);

        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;

        // The driver may hand back more images than we asked for
        let images = unsafe { loader.get_swapchain_images(swapchain) }
            .context("Failed to get swapchain images")?;

        log::info!(
            "Created swapchain: {}x{}, {:?}/{:?}, {:?}, {} images (requested {})",
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            present_mode,
            images.len(),
            image_count,
        );

        Ok(Self {
            loader,
            swapchain,
            images,
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
        })
    }

    /// One 2D color view per swapchain image
    pub fn create_image_views(&mut self, device: &ash::Device) -> Result<()> {
        let mut views = Vec::with_capacity(self.images.len());

        for &image in &self.images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe { device.create_image_view(&create_info, None) }
                .context("Failed to create image view");

            match view {
                Ok(view) => views.push(view),
                Err(e) => {
                    for view in views {
                        unsafe { device.destroy_image_view(view, None) };
                    }
                    return Err(e);
                }
            }
        }

        self.image_views = views;
        Ok(())
    }

    pub fn destroy_image_views(&mut self, device: &ash::Device) {
        for view in self.image_views.drain(..) {
            unsafe { device.destroy_image_view(view, None) };
        }
    }

    /// Release the swapchain handle. Images go with it; views must already be gone.
    pub fn destroy(&mut self) {
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
            self.swapchain = vk::SwapchainKHR::null();
        }
        self.images.clear();
    }
}

/// Use the surface's extent when it has one; otherwise clamp the window size
/// into the supported range.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window_size: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: window_size
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: window_size
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 = no maximum)
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && count > caps.max_image_count {
        caps.max_image_count
    } else {
        count
    }
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    // A lone UNDEFINED entry means any format is fine
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return FALLBACK_SURFACE_FORMAT;
        }
    }

    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == FALLBACK_SURFACE_FORMAT.format
                && f.color_space == FALLBACK_SURFACE_FORMAT.color_space
        })
        .or_else(|| formats.first().copied())
        .unwrap_or(FALLBACK_SURFACE_FORMAT)
}

/// MAILBOX, then IMMEDIATE, then FIFO (always available)
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    PRESENT_MODE_PRIORITY
        .iter()
        .copied()
        .find(|preferred| modes.contains(preferred))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Concurrent across two distinct families, exclusive for a shared one
pub fn choose_sharing_mode(
    graphics_family: u32,
    present_family: u32,
) -> (vk::SharingMode, Vec<u32>) {
    if graphics_family != present_family {
        (vk::SharingMode::CONCURRENT, vec![graphics_family, present_family])
    } else {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    }
}
