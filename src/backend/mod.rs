// Backend module - Vulkan abstraction layer
//
// Thin wrapper around ash: device setup, swapchain, pipelines, buffers and
// per-frame synchronization. Everything above this layer speaks in elements.

pub mod buffer;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use swapchain::Swapchain;
