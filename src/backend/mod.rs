// Backend module - Vulkan presentation core
//
// Design: Thin wrapper around ash. One context object (`VulkanRenderer`) owns
// every GPU object; the frame loop and recreation logic in `frame` only talk to
// it through the `PresentTarget` trait.

pub mod commands;
pub mod debug;
pub mod device;
pub mod error;
pub mod frame;
pub mod generation;
pub mod pipeline;
pub mod probe;
pub mod renderer;
pub mod selector;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use frame::{FrameStatus, ResizeEvent};
pub use generation::ShaderPaths;
pub use renderer::{RendererDesc, VulkanRenderer};
pub use swapchain::Swapchain;
