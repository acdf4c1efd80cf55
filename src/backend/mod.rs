// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash. Ownership follows creation order: the device
// outlives everything created from it, per-swapchain objects are torn down
// and rebuilt together on resize.

pub mod buffer;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use swapchain::Swapchain;
