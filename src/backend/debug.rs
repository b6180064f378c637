// Validation / debug reporting
//
// The debug-utils messenger is optional. It is only created when the instance
// was built with VK_EXT_debug_utils enabled; any failure leaves reporting off
// rather than aborting startup.

use ash::extensions::ext::DebugUtils;
use ash::vk;
use ash::{Entry, Instance};
use std::ffi::CStr;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub struct DebugMessenger {
    loader: DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    /// Whether the loader exposes the extension the messenger needs
    pub fn is_available(instance_extensions: &[String]) -> bool {
        let name = DebugUtils::name().to_string_lossy();
        instance_extensions.iter().any(|ext| ext.as_str() == &*name)
    }

    /// Register the callback. Returns `None` if the driver refuses it.
    pub fn new(entry: &Entry, instance: &Instance) -> Option<Self> {
        let loader = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        match unsafe { loader.create_debug_utils_messenger(&create_info, None) } {
            Ok(messenger) => {
                log::info!("Debug messenger enabled");
                Some(Self { loader, messenger })
            }
            Err(e) => {
                log::warn!("Debug messenger unavailable ({}), continuing without it", e);
                None
            }
        }
    }

    /// Must run before the instance is destroyed
    pub fn destroy(&self) {
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan {:?}] {}", message_type, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan {:?}] {}", message_type, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::info!("[Vulkan {:?}] {}", message_type, message);
        }
        _ => {
            log::debug!("[Vulkan {:?}] {}", message_type, message);
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_follows_the_extension_list() {
        let mut extensions = vec!["VK_KHR_surface".to_string()];
        assert!(!DebugMessenger::is_available(&extensions));

        extensions.push("VK_EXT_debug_utils".to_string());
        assert!(DebugMessenger::is_available(&extensions));
    }
}
