// UI overlay element
//
// A Dear ImGui manager: owns the imgui context, the winit platform glue and
// the Vulkan renderer, and runs registered per-frame callbacks inside an
// imgui frame. The overlay renders into its own load-preserving render pass
// after the scene elements, so it composites on top of their output.

use anyhow::{Context as _, Result};
use ash::vk;
use imgui_rs_vulkan_renderer::{Options, Renderer};
use imgui_winit_support::{HiDpiMode, WinitPlatform};
use std::sync::Arc;
use winit::event::{Event, WindowEvent};
use winit::window::Window;

use crate::backend::pipeline::{self, AttachmentLoad};
use crate::backend::VulkanDevice;
use crate::composition::{Element, InitContext, RenderContext, UpdateContext};

type UiCallback = Box<dyn FnMut(&imgui::Ui)>;

pub struct UiOverlay {
    imgui: imgui::Context,
    platform: WinitPlatform,
    renderer: Option<Renderer>,
    render_pass: Option<vk::RenderPass>,
    device: Option<Arc<VulkanDevice>>,
    callbacks: Vec<UiCallback>,
}

impl UiOverlay {
    pub fn new() -> Self {
        let mut imgui = imgui::Context::create();
        imgui.set_ini_filename(None);
        let platform = WinitPlatform::new(&mut imgui);

        Self {
            imgui,
            platform,
            renderer: None,
            render_pass: None,
            device: None,
            callbacks: Vec::new(),
        }
    }

    /// Register a callback to run once per frame inside the imgui frame.
    pub fn add_callback(&mut self, callback: impl FnMut(&imgui::Ui) + 'static) {
        self.callbacks.push(Box::new(callback));
    }
}

impl Default for UiOverlay {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for UiOverlay {
    fn name(&self) -> &str {
        "ui overlay"
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
        self.platform
            .attach_window(self.imgui.io_mut(), ctx.window, HiDpiMode::Default);

        // The scene pass already cleared the attachment; this pass keeps it
        let render_pass =
            pipeline::create_render_pass(ctx.device, ctx.surface_format, AttachmentLoad::Load)?;

        let renderer = Renderer::with_default_allocator(
            &ctx.device.instance,
            ctx.device.physical_device,
            ctx.device.device.clone(),
            ctx.device.graphics_queue,
            ctx.command_pool,
            render_pass,
            &mut self.imgui,
            Some(Options {
                in_flight_frames: ctx.frames_in_flight,
                ..Default::default()
            }),
        )
        .context("Failed to create imgui renderer")?;

        self.render_pass = Some(render_pass);
        self.renderer = Some(renderer);
        self.device = Some(ctx.device.clone());
        Ok(())
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) -> Result<()> {
        self.imgui.io_mut().update_delta_time(ctx.dt);
        Ok(())
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) -> Result<()> {
        let device = self.device.as_ref().context("Overlay not initialized")?;
        let render_pass = self.render_pass.context("Overlay render pass missing")?;
        let renderer = self.renderer.as_mut().context("Overlay renderer missing")?;

        self.platform
            .prepare_frame(self.imgui.io_mut(), ctx.window)
            .context("Failed to prepare imgui frame")?;

        let ui = self.imgui.new_frame();
        for callback in &mut self.callbacks {
            callback(ui);
        }
        self.platform.prepare_render(ui, ctx.window);
        let draw_data = self.imgui.render();

        let render_pass_begin = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(ctx.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: ctx.extent,
            });

        unsafe {
            device.device.cmd_begin_render_pass(
                ctx.command_buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );
        }

        let result = renderer
            .cmd_draw(ctx.command_buffer, draw_data)
            .context("Failed to record imgui draw");

        unsafe {
            device.device.cmd_end_render_pass(ctx.command_buffer);
        }

        result
    }

    fn window_event(&mut self, window: &Window, event: &WindowEvent) {
        // The platform layer wants the full winit event
        let event: Event<()> = Event::WindowEvent {
            window_id: window.id(),
            event: event.clone(),
        };
        self.platform
            .handle_event(self.imgui.io_mut(), window, &event);
    }
}

impl Drop for UiOverlay {
    fn drop(&mut self) {
        // The renderer's own Drop frees its resources; it only needs the
        // device to still be alive, which the Arc guarantees.
        if let (Some(device), Some(render_pass)) = (&self.device, self.render_pass.take()) {
            let _ = device.wait_idle();
            unsafe {
                device.device.destroy_render_pass(render_pass, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callbacks_accumulate() {
        let mut overlay = UiOverlay::new();
        assert!(overlay.callbacks.is_empty());

        overlay.add_callback(|_ui| {});
        overlay.add_callback(|_ui| {});
        assert_eq!(overlay.callbacks.len(), 2);
    }
}
