// Element framework
//
// An element is a unit of per-frame behavior with lifecycle hooks
// (initialize, update, render) driven by the render loop. The composition
// is the ordered registry of elements for the application.

use anyhow::Result;
use ash::vk;
use std::sync::Arc;
use std::time::Duration;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::backend::VulkanDevice;
use crate::updater::Updater;

/// Context handed to [`Element::initialize`].
pub struct InitContext<'a> {
    pub device: &'a Arc<VulkanDevice>,
    pub window: &'a Window,
    /// The frame's first render pass; clears the color attachment.
    pub render_pass: vk::RenderPass,
    pub surface_format: vk::Format,
    pub extent: vk::Extent2D,
    pub command_pool: vk::CommandPool,
    pub frames_in_flight: usize,
    pub updater: &'a mut Updater,
}

/// Context handed to [`Element::update`] once per frame.
pub struct UpdateContext<'a> {
    pub window: &'a Window,
    /// Wall-clock time since the previous update tick.
    pub dt: Duration,
}

/// Context handed to [`Element::render`] once per frame.
///
/// The command buffer is in the recording state; each element records its
/// own render pass into it. Submission and presentation belong to the app
/// driver, not to elements.
pub struct RenderContext<'a> {
    pub device: &'a Arc<VulkanDevice>,
    pub window: &'a Window,
    pub command_buffer: vk::CommandBuffer,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    /// Index of the in-flight frame slot (0..frames_in_flight).
    pub frame_index: usize,
    pub clear_color: [f32; 4],
}

/// Why a rebuild is being dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildReason {
    /// The swapchain was recreated with a new extent.
    SwapchainResized,
    /// One or more watched shader source files changed on disk.
    ShaderFilesChanged(Vec<std::path::PathBuf>),
}

/// Context handed to [`Element::rebuild`].
///
/// The device is guaranteed idle while rebuilds run.
pub struct RebuildContext<'a> {
    pub device: &'a Arc<VulkanDevice>,
    pub render_pass: vk::RenderPass,
    pub extent: vk::Extent2D,
    pub reason: &'a RebuildReason,
}

/// A unit of per-frame behavior, invoked by the render loop.
pub trait Element {
    fn name(&self) -> &str;

    /// Called once, after the device and swapchain exist.
    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<()>;

    /// Per-frame logic tick. Runs before any render callback.
    fn update(&mut self, _ctx: &mut UpdateContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Record this element's rendering commands for the current frame.
    fn render(&mut self, ctx: &mut RenderContext<'_>) -> Result<()>;

    /// React to a swapchain resize or shader change. Default: ignore.
    fn rebuild(&mut self, _ctx: &RebuildContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Raw window events, for elements that track input state.
    fn window_event(&mut self, _window: &Window, _event: &WindowEvent) {}
}

/// Ordered collection of elements, invoked sequentially each frame.
#[derive(Default)]
pub struct Composition {
    elements: Vec<Box<dyn Element>>,
}

impl Composition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element; returns self for chaining at the call site.
    pub fn with(mut self, element: Box<dyn Element>) -> Self {
        self.elements.push(element);
        self
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Element names in invocation order.
    pub fn names(&self) -> Vec<&str> {
        self.elements.iter().map(|e| e.name()).collect()
    }

    pub fn initialize_all(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
        for element in &mut self.elements {
            log::info!("Initializing element: {}", element.name());
            element.initialize(ctx)?;
        }
        Ok(())
    }

    pub fn update_all(&mut self, ctx: &mut UpdateContext<'_>) -> Result<()> {
        for element in &mut self.elements {
            element.update(ctx)?;
        }
        Ok(())
    }

    pub fn render_all(&mut self, ctx: &mut RenderContext<'_>) -> Result<()> {
        for element in &mut self.elements {
            element.render(ctx)?;
        }
        Ok(())
    }

    pub fn rebuild_all(&mut self, ctx: &RebuildContext<'_>) -> Result<()> {
        for element in &mut self.elements {
            element.rebuild(ctx)?;
        }
        Ok(())
    }

    pub fn window_event_all(&mut self, window: &Window, event: &WindowEvent) {
        for element in &mut self.elements {
            element.window_event(window, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl Element for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<()> {
            Ok(())
        }

        fn render(&mut self, _ctx: &mut RenderContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn elements_keep_registration_order() {
        // Invocation order is the Vec order, so registration order is what
        // update_all/render_all will follow.
        let composition = Composition::new()
            .with(Box::new(Named("triangle")))
            .with(Box::new(Named("ui overlay")));

        assert_eq!(composition.names(), vec!["triangle", "ui overlay"]);
    }

    #[test]
    fn empty_composition() {
        let composition = Composition::new();
        assert!(composition.is_empty());
        assert_eq!(composition.len(), 0);
    }
}
