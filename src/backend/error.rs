// Renderer errors - the unrecoverable conditions
//
// Recoverable swapchain states (out-of-date, suboptimal) are not errors;
// they travel as `AcquireOutcome` / `PresentOutcome` values instead.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions that stop startup or the render loop
#[derive(Error, Debug)]
pub enum RendererError {
    #[error("No suitable GPU found (need a discrete GPU with graphics, present and swapchain support)")]
    NoSuitableDevice,

    #[error("Selected GPU is missing a graphics or present queue family")]
    IncompleteQueueFamilies,

    #[error("Validation layers requested but not available: {}", .0.join(", "))]
    ValidationLayersUnavailable(Vec<String>),

    #[error("Failed to load shader {path:?}: {source}")]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to acquire swapchain image: {0}")]
    AcquireFailed(vk::Result),

    #[error("Failed to present swapchain image: {0}")]
    PresentFailed(vk::Result),
}
