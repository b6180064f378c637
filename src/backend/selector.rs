// Physical device selection
//
// Policy: only discrete GPUs are accepted. A device qualifies when it has a
// graphics queue family and a family that can present to the surface (they may
// be the same), exposes every required device extension, and reports at least
// one surface format and present mode. The first qualifying device wins.

use anyhow::Result;
use ash::extensions::khr::{Surface, Swapchain};
use ash::vk;
use ash::Instance;
use std::ffi::CStr;
use thiserror::Error;

use super::error::RendererError;
use super::probe::{self, SwapchainSupport};

/// Device extensions every candidate must expose
pub fn required_device_extensions() -> [&'static CStr; 1] {
    [Swapchain::name()]
}

/// Graphics and present queue family indices; complete once both are known
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Walk the families in order, taking the first graphics-capable and the
    /// first present-capable one. `supports_present` is asked per family index.
    pub fn find<F>(families: &[vk::QueueFamilyProperties], mut supports_present: F) -> Result<Self>
    where
        F: FnMut(u32) -> Result<bool>,
    {
        let mut indices = Self::default();

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            if family.queue_count == 0 {
                continue;
            }

            if indices.graphics_family.is_none()
                && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            {
                indices.graphics_family = Some(index);
            }

            if indices.present_family.is_none() && supports_present(index)? {
                indices.present_family = Some(index);
            }

            if indices.is_complete() {
                break;
            }
        }

        Ok(indices)
    }

    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// (graphics, present) or `IncompleteQueueFamilies`
    pub fn resolve(&self) -> Result<(u32, u32), RendererError> {
        match (self.graphics_family, self.present_family) {
            (Some(graphics), Some(present)) => Ok((graphics, present)),
            _ => Err(RendererError::IncompleteQueueFamilies),
        }
    }
}

/// Why a physical device was skipped
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Rejection {
    #[error("not a discrete GPU ({0:?})")]
    NotDiscrete(vk::PhysicalDeviceType),

    #[error("missing a graphics or present queue family")]
    IncompleteQueueFamilies,

    #[error("missing device extensions: {}", .0.join(", "))]
    MissingExtensions(Vec<String>),

    #[error("no surface formats or present modes")]
    InadequateSwapchainSupport,
}

/// Everything the suitability policy looks at for one device
#[derive(Clone, Debug)]
pub struct DeviceReport {
    pub device_type: vk::PhysicalDeviceType,
    pub indices: QueueFamilyIndices,
    pub extensions: Vec<String>,
    /// Only queried once the extension check has passed
    pub swapchain_support: Option<SwapchainSupport>,
}

impl DeviceReport {
    pub fn evaluate(&self) -> Result<(), Rejection> {
        if self.device_type != vk::PhysicalDeviceType::DISCRETE_GPU {
            return Err(Rejection::NotDiscrete(self.device_type));
        }

        if !self.indices.is_complete() {
            return Err(Rejection::IncompleteQueueFamilies);
        }

        let missing = probe::missing_names(&required_device_extensions(), &self.extensions);
        if !missing.is_empty() {
            return Err(Rejection::MissingExtensions(missing));
        }

        match &self.swapchain_support {
            Some(support) if support.is_adequate() => Ok(()),
            _ => Err(Rejection::InadequateSwapchainSupport),
        }
    }
}

/// The chosen GPU and its queue families
pub struct SelectedDevice {
    pub physical_device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub graphics_family: u32,
    pub present_family: u32,
}

pub fn select_physical_device(
    instance: &Instance,
    surface_loader: &Surface,
    surface: vk::SurfaceKHR,
) -> Result<SelectedDevice> {
    let devices = unsafe { instance.enumerate_physical_devices() }?;
    log::debug!("Found {} physical device(s)", devices.len());

    let candidates: Vec<(vk::PhysicalDevice, vk::PhysicalDeviceProperties)> = devices
        .into_iter()
        .map(|physical_device| {
            let properties = unsafe { instance.get_physical_device_properties(physical_device) };
            (physical_device, properties)
        })
        .collect();

    for (index, (_, properties)) in candidates.iter().enumerate() {
        log::debug!(
            "Device {} '{}': vendor {}, type {:?}, driver {}",
            index,
            probe::name_to_string(&properties.device_name),
            vendor_name(properties.vendor_id),
            properties.device_type,
            properties.driver_version,
        );
    }

    // Lazy: devices after the first suitable one are never queried
    let reports = candidates.iter().map(|(physical_device, properties)| {
        inspect_device(instance, surface_loader, surface, *physical_device, properties)
    });
    let (index, report) = first_suitable(reports)?;

    let (physical_device, properties) = candidates[index];
    let (graphics_family, present_family) = report.indices.resolve()?;
    log::info!(
        "Selected GPU: {} ({}), graphics family {}, present family {}",
        probe::name_to_string(&properties.device_name),
        vendor_name(properties.vendor_id),
        graphics_family,
        present_family,
    );

    Ok(SelectedDevice {
        physical_device,
        properties,
        graphics_family,
        present_family,
    })
}

/// Index and report of the first device that passes `evaluate`, in order.
///
/// A device whose capability queries failed is skipped like any other
/// rejection. No scoring: later devices are never compared.
pub fn first_suitable<I>(reports: I) -> Result<(usize, DeviceReport), RendererError>
where
    I: IntoIterator<Item = Result<DeviceReport>>,
{
    for (index, report) in reports.into_iter().enumerate() {
        match report {
            Ok(report) => match report.evaluate() {
                Ok(()) => return Ok((index, report)),
                Err(reason) => log::warn!("Skipping device {}: {}", index, reason),
            },
            Err(e) => log::warn!("Skipping device {}: query failed: {:#}", index, e),
        }
    }

    Err(RendererError::NoSuitableDevice)
}

/// Gather what `DeviceReport::evaluate` needs. Non-discrete devices are
/// reported by type alone, without touching any other query.
fn inspect_device(
    instance: &Instance,
    surface_loader: &Surface,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
    properties: &vk::PhysicalDeviceProperties,
) -> Result<DeviceReport> {
    if properties.device_type != vk::PhysicalDeviceType::DISCRETE_GPU {
        return Ok(DeviceReport {
            device_type: properties.device_type,
            indices: QueueFamilyIndices::default(),
            extensions: Vec::new(),
            swapchain_support: None,
        });
    }

    let families = probe::queue_families(instance, physical_device);
    probe::log_queue_families(&families);

    let indices = QueueFamilyIndices::find(&families, |index| unsafe {
        Ok(surface_loader.get_physical_device_surface_support(physical_device, index, surface)?)
    })?;

    let extensions = probe::device_extensions(instance, physical_device)?;
    let extensions_ok =
        probe::missing_names(&required_device_extensions(), &extensions).is_empty();

    let swapchain_support = if extensions_ok {
        Some(SwapchainSupport::query(surface_loader, physical_device, surface)?)
    } else {
        None
    };

    Ok(DeviceReport {
        device_type: properties.device_type,
        indices,
        extensions,
        swapchain_support,
    })
}

/// Human-readable vendor for a PCI vendor id
pub fn vendor_name(vendor_id: u32) -> &'static str {
    match vendor_id {
        0x1002 => "AMD",
        0x1010 => "ImgTec",
        0x10DE => "NVIDIA",
        0x13B5 => "ARM",
        0x5143 => "Qualcomm",
        0x8086 => "Intel",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    fn adequate_support() -> SwapchainSupport {
        SwapchainSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        }
    }

    fn suitable_report() -> DeviceReport {
        DeviceReport {
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            indices: QueueFamilyIndices {
                graphics_family: Some(0),
                present_family: Some(0),
            },
            extensions: vec!["VK_KHR_swapchain".to_string()],
            swapchain_support: Some(adequate_support()),
        }
    }

    #[test]
    fn same_family_can_serve_graphics_and_present() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 16)];
        let indices = QueueFamilyIndices::find(&families, |_| Ok(true)).unwrap();

        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(0));
        assert_eq!(indices.resolve().unwrap(), (0, 0));
    }

    #[test]
    fn graphics_and_present_may_come_from_different_families() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 2),
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::COMPUTE, 1),
        ];
        let indices = QueueFamilyIndices::find(&families, |index| Ok(index == 2)).unwrap();

        assert_eq!(indices.resolve().unwrap(), (1, 2));
    }

    #[test]
    fn families_without_queues_are_skipped() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 0),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];
        let indices = QueueFamilyIndices::find(&families, |_| Ok(true)).unwrap();

        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(1));
    }

    #[test]
    fn missing_present_support_is_incomplete() {
        let families = [family(vk::QueueFlags::GRAPHICS, 1)];
        let indices = QueueFamilyIndices::find(&families, |_| Ok(false)).unwrap();

        assert!(!indices.is_complete());
        assert!(matches!(indices.resolve(), Err(RendererError::IncompleteQueueFamilies)));
    }

    #[test]
    fn present_query_errors_propagate() {
        let families = [family(vk::QueueFlags::GRAPHICS, 1)];
        let result = QueueFamilyIndices::find(&families, |_| {
            Err(anyhow::anyhow!("surface lost"))
        });
        assert!(result.is_err());
    }

    #[test]
    fn discrete_gpu_with_everything_is_accepted() {
        assert_eq!(suitable_report().evaluate(), Ok(()));
    }

    #[test]
    fn non_discrete_devices_are_rejected_even_if_capable() {
        for device_type in [
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            vk::PhysicalDeviceType::VIRTUAL_GPU,
            vk::PhysicalDeviceType::CPU,
            vk::PhysicalDeviceType::OTHER,
        ] {
            let report = DeviceReport {
                device_type,
                ..suitable_report()
            };
            assert_eq!(report.evaluate(), Err(Rejection::NotDiscrete(device_type)));
        }
    }

    #[test]
    fn incomplete_queue_families_are_rejected() {
        let report = DeviceReport {
            indices: QueueFamilyIndices {
                graphics_family: Some(0),
                present_family: None,
            },
            ..suitable_report()
        };
        assert_eq!(report.evaluate(), Err(Rejection::IncompleteQueueFamilies));
    }

    #[test]
    fn missing_swapchain_extension_is_rejected() {
        let report = DeviceReport {
            extensions: vec!["VK_KHR_maintenance1".to_string()],
            swapchain_support: None,
            ..suitable_report()
        };
        assert_eq!(
            report.evaluate(),
            Err(Rejection::MissingExtensions(vec!["VK_KHR_swapchain".to_string()]))
        );
    }

    #[test]
    fn empty_swapchain_support_is_rejected() {
        let mut support = adequate_support();
        support.present_modes.clear();
        let report = DeviceReport {
            swapchain_support: Some(support),
            ..suitable_report()
        };
        assert_eq!(report.evaluate(), Err(Rejection::InadequateSwapchainSupport));
    }

    #[test]
    fn first_suitable_device_wins_without_scoring() {
        let second = DeviceReport {
            indices: QueueFamilyIndices {
                graphics_family: Some(1),
                present_family: Some(2),
            },
            ..suitable_report()
        };

        let reports: Vec<Result<DeviceReport>> = vec![Ok(suitable_report()), Ok(second)];
        let (index, report) = first_suitable(reports).unwrap();

        assert_eq!(index, 0);
        assert_eq!(report.indices.resolve().unwrap(), (0, 0));
    }

    #[test]
    fn failed_queries_skip_the_device_not_the_selection() {
        let reports = vec![
            Err(anyhow::anyhow!("surface lost")),
            Ok(DeviceReport {
                device_type: vk::PhysicalDeviceType::INTEGRATED_GPU,
                ..suitable_report()
            }),
            Ok(suitable_report()),
        ];

        let (index, _) = first_suitable(reports).unwrap();
        assert_eq!(index, 2);
    }

    #[test]
    fn later_devices_are_not_inspected_once_one_qualifies() {
        let mut inspected = 0;
        let reports = (0..3).map(|_| {
            inspected += 1;
            Ok::<_, anyhow::Error>(suitable_report())
        });

        assert_eq!(first_suitable(reports).unwrap().0, 0);
        assert_eq!(inspected, 1);
    }

    #[test]
    fn all_rejected_means_no_suitable_device() {
        let reports = vec![
            Ok(DeviceReport {
                device_type: vk::PhysicalDeviceType::CPU,
                ..suitable_report()
            }),
            Err(anyhow::anyhow!("device lost")),
            Ok(DeviceReport {
                swapchain_support: None,
                ..suitable_report()
            }),
        ];

        assert!(matches!(
            first_suitable(reports),
            Err(RendererError::NoSuitableDevice)
        ));
        assert!(matches!(
            first_suitable(Vec::<Result<DeviceReport>>::new()),
            Err(RendererError::NoSuitableDevice)
        ));
    }

    #[test]
    fn vendor_names() {
        assert_eq!(vendor_name(0x10DE), "NVIDIA");
        assert_eq!(vendor_name(0x1002), "AMD");
        assert_eq!(vendor_name(0x8086), "Intel");
        assert_eq!(vendor_name(0xFFFF), "Unknown");
    }
}
