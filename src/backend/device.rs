// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation (window-system extensions, optional validation)
// - Debug messenger (optional, fails closed)
// - Surface creation for the window supplied by the caller
// - Physical device selection (discrete GPU only, see selector.rs)
// - Logical device + graphics/present queue retrieval

use anyhow::{Context, Result};
use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Surface;
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::collections::BTreeSet;
use std::ffi::{c_char, CString};

use super::debug::{DebugMessenger, VALIDATION_LAYER};
use super::error::RendererError;
use super::probe;
use super::selector::{self, SelectedDevice};

/// Instance, surface and logical device with its queues.
///
/// Owns the objects that live for the whole run. Everything created from the
/// logical device (swapchain, pipeline, pools, semaphores) must be destroyed by
/// its owner before this is dropped.
pub struct VulkanDevice {
    pub device: ash::Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub present_queue_family: u32,

    pub physical_device: vk::PhysicalDevice,

    pub surface: vk::SurfaceKHR,
    pub surface_loader: Surface,

    debug: Option<DebugMessenger>,
    pub instance: ash::Instance,
    _entry: Entry,
}

impl VulkanDevice {
    /// Create the device for a window.
    ///
    /// # Arguments
    /// * `app_name` - Application name reported to the driver
    /// * `enable_validation` - Request the Khronos validation layer and debug messenger
    /// * `display_handle` / `window_handle` - Native handles from the windowing layer
    pub fn new(
        app_name: &str,
        enable_validation: bool,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> Result<Self> {
        log::info!("Creating Vulkan device: {}", app_name);

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        let (instance, debug_enabled) =
            Self::create_instance(&entry, app_name, enable_validation, display_handle)?;

        let debug = if debug_enabled {
            DebugMessenger::new(&entry, &instance)
        } else {
            None
        };

        let surface_loader = Surface::new(&entry, &instance);

        // Nothing owns the instance yet; a failure below must release it here
        let surface = or_teardown(
            unsafe {
                ash_window::create_surface(&entry, &instance, display_handle, window_handle, None)
            }
            .context("Failed to create window surface"),
            || destroy_instance_objects(&instance, &surface_loader, None, debug.as_ref()),
        )?;

        let (selected, device, graphics_queue, present_queue) = or_teardown(
            Self::select_and_create_device(&instance, &surface_loader, surface),
            || destroy_instance_objects(&instance, &surface_loader, Some(surface), debug.as_ref()),
        )?;

        let properties = selected.properties;
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            graphics_queue_family: selected.graphics_family,
            present_queue_family: selected.present_family,
            physical_device: selected.physical_device,
            surface,
            surface_loader,
            debug,
            instance,
            _entry: entry,
        })
    }

    /// Returns the instance and whether the debug-utils extension was enabled on it
    fn create_instance(
        entry: &Entry,
        app_name: &str,
        enable_validation: bool,
        display_handle: RawDisplayHandle,
    ) -> Result<(ash::Instance, bool)> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = c"Experiment Engine";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let available_extensions = probe::instance_extensions(entry)?;
        log::debug!("Supported instance extensions:");
        for name in &available_extensions {
            log::debug!("  {}", name);
        }

        // Surface extensions for this window system
        let mut extensions: Vec<*const c_char> =
            ash_window::enumerate_required_extensions(display_handle)
                .context("Failed to query required surface extensions")?
                .to_vec();

        let mut layer_names: Vec<*const c_char> = Vec::new();
        let mut debug_enabled = false;

        if enable_validation {
            let layers = probe::instance_layers(entry)?;
            let missing = probe::missing_names(&[VALIDATION_LAYER], &layers);
            if !missing.is_empty() {
                return Err(RendererError::ValidationLayersUnavailable(missing).into());
            }
            layer_names.push(VALIDATION_LAYER.as_ptr());

            if DebugMessenger::is_available(&available_extensions) {
                extensions.push(DebugUtils::name().as_ptr());
                debug_enabled = true;
            } else {
                log::warn!("VK_EXT_debug_utils not available, debug reporting disabled");
            }
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        log::info!(
            "Created Vulkan instance ({} extensions, validation {})",
            extensions.len(),
            if enable_validation { "on" } else { "off" }
        );

        Ok((instance, debug_enabled))
    }

    fn select_and_create_device(
        instance: &ash::Instance,
        surface_loader: &Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<(SelectedDevice, ash::Device, vk::Queue, vk::Queue)> {
        let selected = selector::select_physical_device(instance, surface_loader, surface)?;
        let (device, graphics_queue, present_queue) =
            Self::create_logical_device(instance, &selected)?;
        Ok((selected, device, graphics_queue, present_queue))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        selected: &SelectedDevice,
    ) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
        let queue_priorities = [1.0];

        // One create-info per distinct family
        let unique_families: BTreeSet<u32> = [selected.graphics_family, selected.present_family]
            .into_iter()
            .collect();

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions: Vec<*const c_char> = selector::required_device_extensions()
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe {
            instance.create_device(selected.physical_device, &create_info, None)
        }
        .context("Failed to create logical device")?;

        let (graphics_queue, present_queue) = unsafe {
            (
                device.get_device_queue(selected.graphics_family, 0),
                device.get_device_queue(selected.present_family, 0),
            )
        };

        Ok((device, graphics_queue, present_queue))
    }

    /// Wait for device to be idle (e.g., before cleanup or recreation)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.context("Failed to wait for device idle")?;
        Ok(())
    }

    /// Wait until everything submitted to the present queue has drained
    pub fn wait_present_idle(&self) -> Result<()> {
        unsafe { self.device.queue_wait_idle(self.present_queue) }
            .context("Failed to wait for present queue idle")?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        if let Err(e) = self.wait_idle() {
            log::warn!("{:#}", e);
        }

        // Reverse creation order: device, surface, messenger, instance
        unsafe { self.device.destroy_device(None) };
        let debug = self.debug.take();
        destroy_instance_objects(
            &self.instance,
            &self.surface_loader,
            Some(self.surface),
            debug.as_ref(),
        );
    }
}

/// Release the surface, messenger and instance, in that order
fn destroy_instance_objects(
    instance: &ash::Instance,
    surface_loader: &Surface,
    surface: Option<vk::SurfaceKHR>,
    debug: Option<&DebugMessenger>,
) {
    unsafe {
        if let Some(surface) = surface {
            surface_loader.destroy_surface(surface, None);
        }
        if let Some(debug) = debug {
            debug.destroy();
        }
        instance.destroy_instance(None);
    }
}

/// Run `teardown` when `result` is an error, then hand the result back
fn or_teardown<T>(result: Result<T>, teardown: impl FnOnce()) -> Result<T> {
    if result.is_err() {
        teardown();
    }
    result
}
