// =============================================================================
// HELLO TRIANGLE - one window, one vertex buffer, one draw call per frame
// =============================================================================
//
// The demo is organized as "elements": units of per-frame behavior with
// initialize/update/render hooks, invoked in order by the render loop.
//
// FRAME FLOW:
// 1. Recreate swapchain if the window was resized
// 2. Rebuild pipelines if a watched shader file changed
// 3. Wait for this frame slot's fence, acquire a swapchain image
// 4. Record the frame: every element records into one command buffer
// 5. Submit (ordered after image availability) and present
//
// =============================================================================

mod backend;
mod composition;
mod config;
mod elements;
mod updater;

use anyhow::{Context, Result};
use ash::vk;
use backend::{pipeline, sync::FrameSync, Swapchain, VulkanDevice};
use composition::{
    Composition, InitContext, RebuildContext, RebuildReason, RenderContext, UpdateContext,
};
use config::Config;
use elements::{TriangleElement, UiOverlay};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use updater::Updater;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("Fatal: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    init_logging();

    let config = Config::load();
    log::info!("Starting hello-triangle");
    log::info!(
        "Window: {}x{}, present mode: {}, frames in flight: {}",
        config.window.width,
        config.window.height,
        config.graphics.present_mode,
        config.graphics.frames_in_flight
    );

    // The triangle does the drawing; the overlay manager runs the UI frame.
    let triangle = TriangleElement::new();

    let mut ui = UiOverlay::new();
    ui.add_callback(|_ui| {
        /*
        _ui.window("Info & Settings")
            .position([1.0, 1.0], imgui::Condition::FirstUseEver)
            .build(|| {
                let io = _ui.io();
                _ui.text(format!("{:.3} ms/frame", 1000.0 / io.framerate));
                _ui.text(format!("{:.1} FPS", io.framerate));
                _ui.text_colored(
                    [0.0, 0.6, 0.8, 1.0],
                    "[F1]: Toggle input-mode",
                );
            });
        */
    });

    let composition = Composition::new()
        .with(Box::new(triangle))
        .with(Box::new(ui));

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config, composition);
    event_loop.run_app(&mut app)?;

    // Errors raised inside event handlers surface as the exit status
    match app.error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.parse_default_env();
    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Main application struct holding the window, the Vulkan resources shared by
/// all elements, and the composition itself.
///
/// Resources are destroyed in reverse order of creation; see Drop at the
/// bottom of this file.
struct App {
    config: Config,

    // Window & surface
    window: Option<Arc<Window>>,
    surface: Option<vk::SurfaceKHR>,
    surface_instance: Option<ash::khr::surface::Instance>,

    // Vulkan core
    device: Option<Arc<VulkanDevice>>,
    swapchain: Option<Swapchain>,
    /// First pass of the frame; clears the color attachment.
    render_pass: Option<vk::RenderPass>,
    framebuffers: Vec<vk::Framebuffer>,

    // Commands: one re-recorded command buffer per frame in flight
    command_pool: Option<vk::CommandPool>,
    command_buffers: Vec<vk::CommandBuffer>,

    // Synchronization: one slot per frame in flight
    frame_sync: Vec<FrameSync>,
    current_frame: usize,

    // Elements
    composition: Composition,
    updater: Updater,

    // State flags
    needs_resize: bool,
    is_minimized: bool,

    // FPS tracking
    frame_count: u32,
    last_fps_update: Instant,
    last_update_tick: Instant,

    /// First error raised inside an event handler; turned into the process
    /// exit status after the loop ends.
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config, composition: Composition) -> Self {
        let now = Instant::now();
        Self {
            config,
            window: None,
            surface: None,
            surface_instance: None,
            device: None,
            swapchain: None,
            render_pass: None,
            framebuffers: Vec::new(),
            command_pool: None,
            command_buffers: Vec::new(),
            frame_sync: Vec::new(),
            current_frame: 0,
            composition,
            updater: Updater::new(),
            needs_resize: false,
            is_minimized: false,
            frame_count: 0,
            last_fps_update: now,
            last_update_tick: now,
            error: None,
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Set up the device, swapchain, per-frame resources, and initialize
    /// every element. Called once when the window first exists.
    fn init_vulkan(&mut self, window: Arc<Window>) -> Result<()> {
        log::info!("Initializing Vulkan...");

        let enable_validation = cfg!(debug_assertions) && self.config.debug.validation_layers;
        let display_handle = window.display_handle()?.as_raw();

        let device = VulkanDevice::new(&self.config.window.title, enable_validation, display_handle)?;

        let surface_instance = ash::khr::surface::Instance::new(device.entry(), &device.instance);
        let surface = unsafe {
            ash_window::create_surface(
                device.entry(),
                &device.instance,
                display_handle,
                window.window_handle()?.as_raw(),
                None,
            )
            .context("Failed to create window surface")?
        };

        let surface_support = unsafe {
            surface_instance.get_physical_device_surface_support(
                device.physical_device,
                device.graphics_queue_family,
                surface,
            )?
        };
        if !surface_support {
            anyhow::bail!("GPU doesn't support presenting to this surface");
        }

        let size = window.inner_size();
        let swapchain = Swapchain::new(
            device.clone(),
            surface,
            &surface_instance,
            size.width,
            size.height,
            self.config.present_mode(),
            self.config.graphics.frames_in_flight as u32,
        )?;

        let render_pass =
            pipeline::create_render_pass(&device, swapchain.format, pipeline::AttachmentLoad::Clear)?;

        let framebuffers = pipeline::create_framebuffers(
            &device,
            &swapchain.image_views,
            render_pass,
            swapchain.extent,
        )?;

        // TRANSIENT: command buffers are re-recorded every frame
        // RESET: begin_command_buffer implicitly resets them
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.graphics_queue_family)
            .flags(
                vk::CommandPoolCreateFlags::TRANSIENT
                    | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            );
        let command_pool = unsafe { device.device.create_command_pool(&pool_info, None)? };

        let frames_in_flight = self.config.graphics.frames_in_flight;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(frames_in_flight as u32);
        let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info)? };

        let frame_sync = (0..frames_in_flight)
            .map(|_| FrameSync::new(&device))
            .collect::<Result<Vec<_>>>()?;

        // Bring up the elements now that every shared resource exists
        let mut init_ctx = InitContext {
            device: &device,
            window: &window,
            render_pass,
            surface_format: swapchain.format,
            extent: swapchain.extent,
            command_pool,
            frames_in_flight,
            updater: &mut self.updater,
        };
        self.composition.initialize_all(&mut init_ctx)?;

        self.device = Some(device);
        self.surface = Some(surface);
        self.surface_instance = Some(surface_instance);
        self.swapchain = Some(swapchain);
        self.render_pass = Some(render_pass);
        self.framebuffers = framebuffers;
        self.command_pool = Some(command_pool);
        self.command_buffers = command_buffers;
        self.frame_sync = frame_sync;

        log::info!("Vulkan initialized");
        Ok(())
    }

    /// Recreate the swapchain after a resize, then let elements rebuild
    /// anything that depends on the framebuffer extent.
    fn recreate_swapchain(&mut self) -> Result<()> {
        let device = self.device.clone().context("Device not initialized")?;
        let window = self.window.clone().context("Window not created")?;

        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            self.is_minimized = true;
            return Ok(());
        }
        self.is_minimized = false;

        device.wait_idle()?;

        for framebuffer in self.framebuffers.drain(..) {
            unsafe { device.device.destroy_framebuffer(framebuffer, None) };
        }
        // The surface can only have one swapchain at a time
        self.swapchain = None;

        let surface = self.surface.context("Surface not initialized")?;
        let surface_instance = self
            .surface_instance
            .as_ref()
            .context("Surface loader not initialized")?;

        let swapchain = Swapchain::new(
            device.clone(),
            surface,
            surface_instance,
            size.width,
            size.height,
            self.config.present_mode(),
            self.config.graphics.frames_in_flight as u32,
        )?;

        let render_pass = self.render_pass.context("Render pass not created")?;
        self.framebuffers = pipeline::create_framebuffers(
            &device,
            &swapchain.image_views,
            render_pass,
            swapchain.extent,
        )?;

        let extent = swapchain.extent;
        self.swapchain = Some(swapchain);
        self.needs_resize = false;

        let reason = RebuildReason::SwapchainResized;
        let rebuild_ctx = RebuildContext {
            device: &device,
            render_pass,
            extent,
            reason: &reason,
        };
        self.composition.rebuild_all(&rebuild_ctx)?;

        Ok(())
    }

    /// Rebuild pipelines whose shader sources changed on disk.
    fn process_shader_changes(&mut self) -> Result<()> {
        let changed = self.updater.poll();
        if changed.is_empty() {
            return Ok(());
        }

        for path in &changed {
            log::info!("Shader changed: {}", path.display());
        }

        let device = self.device.clone().context("Device not initialized")?;
        let swapchain = self.swapchain.as_ref().context("Swapchain missing")?;
        let extent = swapchain.extent;
        let render_pass = self.render_pass.context("Render pass not created")?;

        // Old pipelines may still be referenced by in-flight frames
        device.wait_idle()?;

        let reason = RebuildReason::ShaderFilesChanged(changed);
        let rebuild_ctx = RebuildContext {
            device: &device,
            render_pass,
            extent,
            reason: &reason,
        };
        self.composition.rebuild_all(&rebuild_ctx)
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Render a single frame. Returns false when nothing was rendered
    /// (minimized, or the swapchain needs recreation first).
    fn render_frame(&mut self) -> Result<bool> {
        if self.is_minimized {
            return Ok(false);
        }

        if self.needs_resize {
            self.recreate_swapchain()?;
            if self.is_minimized {
                return Ok(false);
            }
        }

        self.process_shader_changes()?;

        let device = self.device.clone().context("Device not initialized")?;
        let window = self.window.clone().context("Window not created")?;

        // Update tick for all elements before any recording happens
        let now = Instant::now();
        let dt = now.duration_since(self.last_update_tick);
        self.last_update_tick = now;
        let mut update_ctx = UpdateContext { window: &window, dt };
        self.composition.update_all(&mut update_ctx)?;

        // Wait for the frame that last used this sync slot
        let sync = &self.frame_sync[self.current_frame];
        unsafe {
            device
                .device
                .wait_for_fences(&[sync.in_flight_fence], true, u64::MAX)?;
        }

        let swapchain = self.swapchain.as_ref().context("Swapchain missing")?;
        let acquired = swapchain.acquire_next_image(u64::MAX, sync.image_available)?;
        let Some((image_index, suboptimal)) = acquired else {
            self.needs_resize = true;
            return Ok(false);
        };
        if suboptimal {
            self.needs_resize = true;
        }

        unsafe {
            device.device.reset_fences(&[sync.in_flight_fence])?;
        }

        // Record the frame: each element appends to the same command buffer
        let cmd = self.command_buffers[self.current_frame];
        let framebuffer = self.framebuffers[image_index as usize];
        let extent = swapchain.extent;

        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.device.begin_command_buffer(cmd, &begin_info)?;
        }

        let mut render_ctx = RenderContext {
            device: &device,
            window: &window,
            command_buffer: cmd,
            framebuffer,
            extent,
            frame_index: self.current_frame,
            clear_color: self.config.graphics.clear_color,
        };
        self.composition.render_all(&mut render_ctx)?;

        unsafe {
            device.device.end_command_buffer(cmd)?;
        }

        // Rendering may only start once the image is actually available
        let sync = &self.frame_sync[self.current_frame];
        let wait_semaphores = [sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [cmd];
        let signal_semaphores = [sync.render_finished];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device.device.queue_submit(
                device.graphics_queue,
                &[submit_info],
                sync.in_flight_fence,
            )?;
        }

        let swapchain = self.swapchain.as_ref().context("Swapchain missing")?;
        let needs_recreate =
            swapchain.present(device.graphics_queue, image_index, &signal_semaphores)?;
        if needs_recreate {
            self.needs_resize = true;
        }

        self.current_frame = (self.current_frame + 1) % self.config.graphics.frames_in_flight;

        Ok(true)
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        self.frame_count += 1;

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                window.set_title(&format!("{} - {:.0} FPS", self.config.window.title, fps));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }

    /// Record a handler error and stop the loop; run() turns it into the
    /// process exit status.
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{:#}", err);
        if self.error.is_none() {
            self.error = Some(err);
        }
        event_loop.exit();
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_resizable(self.config.window.resizable)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        self.window = Some(window.clone());

        if let Err(e) = self.init_vulkan(window) {
            self.fail(event_loop, e.context("Failed to initialize Vulkan"));
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        // Elements see every event; the overlay feeds them to imgui
        if let Some(window) = self.window.clone() {
            self.composition.window_event_all(&window, &event);
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(ref device) = self.device {
                    let _ = device.wait_idle();
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);

                if size.width == 0 || size.height == 0 {
                    self.is_minimized = true;
                } else {
                    self.is_minimized = false;
                    self.needs_resize = true;
                }
            }

            WindowEvent::RedrawRequested => {
                match self.render_frame() {
                    Ok(rendered) => {
                        if rendered {
                            self.update_fps();
                        }
                    }
                    Err(e) => {
                        self.fail(event_loop, e.context("Render error"));
                    }
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(KeyCode::Escape) = event.physical_key {
                        log::info!("ESC pressed, exiting...");
                        event_loop.exit();
                    }
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws; the presentation mode paces the loop.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        if let Some(device) = self.device.clone() {
            let _ = device.wait_idle();

            // Elements own pipelines and buffers; drop them first
            self.composition = Composition::new();

            unsafe {
                for sync in &self.frame_sync {
                    sync.destroy(&device.device);
                }

                if let Some(pool) = self.command_pool.take() {
                    device.device.destroy_command_pool(pool, None);
                }

                for framebuffer in self.framebuffers.drain(..) {
                    device.device.destroy_framebuffer(framebuffer, None);
                }

                if let Some(render_pass) = self.render_pass.take() {
                    device.device.destroy_render_pass(render_pass, None);
                }

                // Swapchain before the surface it belongs to
                self.swapchain = None;

                if let (Some(surface), Some(ref loader)) =
                    (self.surface.take(), &self.surface_instance)
                {
                    loader.destroy_surface(surface, None);
                }
            }
        }

        log::info!("Cleanup complete");
    }
}
