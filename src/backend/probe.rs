// Capability probing
//
// Read-only queries against the loader, instance and physical devices.
// Nothing in here creates or mutates Vulkan objects.

use anyhow::{Context, Result};
use ash::extensions::khr::Surface;
use ash::vk;
use ash::{Entry, Instance};
use std::ffi::{c_char, CStr};

/// Surface capabilities, formats and present modes for one (device, surface) pair.
///
/// Queried fresh whenever it is needed; never cached across recreations.
#[derive(Clone, Debug)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(
        surface_loader: &Surface,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .context("Failed to query surface capabilities")?,
                formats: surface_loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .context("Failed to query surface formats")?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .context("Failed to query surface present modes")?,
            })
        }
    }

    /// At least one format and one present mode
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Names of all instance extensions the loader exposes
pub fn instance_extensions(entry: &Entry) -> Result<Vec<String>> {
    let properties = entry
        .enumerate_instance_extension_properties(None)
        .context("Failed to enumerate instance extensions")?;
    Ok(properties.iter().map(|p| name_to_string(&p.extension_name)).collect())
}

/// Names of all instance layers the loader exposes
pub fn instance_layers(entry: &Entry) -> Result<Vec<String>> {
    let properties = entry
        .enumerate_instance_layer_properties()
        .context("Failed to enumerate instance layers")?;
    Ok(properties.iter().map(|p| name_to_string(&p.layer_name)).collect())
}

pub fn device_extensions(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<Vec<String>> {
    let properties = unsafe { instance.enumerate_device_extension_properties(physical_device) }
        .context("Failed to enumerate device extensions")?;
    Ok(properties.iter().map(|p| name_to_string(&p.extension_name)).collect())
}

pub fn queue_families(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
) -> Vec<vk::QueueFamilyProperties> {
    unsafe { instance.get_physical_device_queue_family_properties(physical_device) }
}

/// Required names absent from `available`, in the order they were required
pub fn missing_names(required: &[&CStr], available: &[String]) -> Vec<String> {
    required
        .iter()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !available.iter().any(|a| a == name))
        .collect()
}

/// Log each queue family's capability bits (debug level)
pub fn log_queue_families(families: &[vk::QueueFamilyProperties]) {
    log::debug!("  {} queue families", families.len());
    for (index, family) in families.iter().enumerate() {
        let flags = family.queue_flags;
        log::debug!(
            "  family {}: graphics={} compute={} transfer={} queues={}",
            index,
            flags.contains(vk::QueueFlags::GRAPHICS),
            flags.contains(vk::QueueFlags::COMPUTE),
            flags.contains(vk::QueueFlags::TRANSFER),
            family.queue_count,
        );
    }
}

/// Fixed-size, NUL-terminated name array from a Vulkan properties struct
pub fn name_to_string(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_name(name: &str) -> [c_char; 256] {
        let mut raw = [0 as c_char; 256];
        for (dst, src) in raw.iter_mut().zip(name.bytes()) {
            *dst = src as c_char;
        }
        raw
    }

    #[test]
    fn name_to_string_stops_at_nul() {
        assert_eq!(name_to_string(&raw_name("VK_KHR_swapchain")), "VK_KHR_swapchain");
        assert_eq!(name_to_string(&raw_name("")), "");
    }

    #[test]
    fn missing_names_reports_only_absent_entries() {
        let available = vec!["VK_KHR_swapchain".to_string(), "VK_KHR_maintenance1".to_string()];
        let required = [c"VK_KHR_swapchain", c"VK_KHR_dynamic_rendering"];

        assert_eq!(missing_names(&required, &available), vec!["VK_KHR_dynamic_rendering"]);
        assert!(missing_names(&required[..1], &available).is_empty());
    }

    #[test]
    fn support_needs_a_format_and_a_present_mode() {
        let mut support = SwapchainSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![],
        };
        assert!(!support.is_adequate());

        support.present_modes.push(vk::PresentModeKHR::FIFO);
        assert!(support.is_adequate());

        support.formats.clear();
        assert!(!support.is_adequate());
    }
}
