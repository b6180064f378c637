// =============================================================================
// HELLO VULKAN - one triangle, one swapchain, resize-safe
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit window, input, resize events)                       │
// │    └── VulkanRenderer (single owner of every GPU object)        │
// │          ├── VulkanDevice (instance, surface, device, queues)   │
// │          ├── Command pool + two semaphores (live for the run)   │
// │          └── Generation (swapchain ... command buffers)         │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Wait for the present queue to drain
// 2. Acquire swapchain image (signals image-available)
// 3. Submit the pre-recorded command buffer for that image
// 4. Present (waits on render-finished)
// 5. Out-of-date / suboptimal / resize -> rebuild the generation
//
// =============================================================================

mod backend;
mod config;

use anyhow::{Context, Result};
use ash::vk;
use backend::renderer::SurfaceSizeFn;
use backend::{FrameStatus, RendererDesc, ResizeEvent, VulkanRenderer};
use config::Config;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    init_logging();

    let config = Config::load();
    log::info!("Starting Vulkan renderer");
    log::info!("Window: {}x{}", config.window.width, config.window.height);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// `RUST_LOG` overrides the default `info` level
fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Windowing side of the program.
///
/// Field order matters for Drop: the renderer (and its surface) must go
/// before the window it was created from.
struct App {
    config: Config,
    renderer: Option<VulkanRenderer>,
    window: Option<Arc<Window>>,

    /// Last resize reported a zero dimension - skip drawing
    is_minimized: bool,
    /// First unrecoverable error; returned from `main`
    fatal: Option<anyhow::Error>,

    frame_count: u32,
    last_fps_update: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            is_minimized: false,
            fatal: None,
            frame_count: 0,
            last_fps_update: Instant::now(),
        }
    }

    fn create_renderer(&self, window: &Arc<Window>) -> Result<VulkanRenderer> {
        let size_source = Arc::clone(window);
        let surface_size: SurfaceSizeFn = Box::new(move || {
            let size = size_source.inner_size();
            vk::Extent2D {
                width: size.width,
                height: size.height,
            }
        });

        VulkanRenderer::new(RendererDesc {
            app_name: &self.config.window.title,
            enable_validation: self.config.validation_enabled(),
            display_handle: window.raw_display_handle(),
            window_handle: window.raw_window_handle(),
            shaders: self.config.shader_paths(),
            surface_size,
        })
        .context("Failed to initialize Vulkan")
    }

    /// Record the error and stop the event loop
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
        self.renderer = None;
        event_loop.exit();
    }

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        self.frame_count += 1;
        let elapsed = self.last_fps_update.elapsed().as_secs_f32();

        // Update title every second
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;
            if let Some(ref window) = self.window {
                window.set_title(&format!("{} - {:.0} FPS", self.config.window.title, fps));
            }
            self.frame_count = 0;
            self.last_fps_update = Instant::now();
        }
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
                self.fail(event_loop, anyhow::anyhow!("Failed to create window: {}", e));
                return;
            }
        };

        match self.create_renderer(&window) {
            Ok(renderer) => {
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(ref renderer) = self.renderer {
                    if let Err(e) = renderer.wait_idle() {
                        log::warn!("{:#}", e);
                    }
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                let resize = ResizeEvent {
                    width: size.width,
                    height: size.height,
                };
                self.is_minimized = resize.is_minimized();

                if let Some(renderer) = self.renderer.as_mut() {
                    if let Err(e) = renderer.handle_resize(resize) {
                        self.fail(event_loop, e);
                    }
                }
            }

            WindowEvent::RedrawRequested => {
                if self.is_minimized {
                    return;
                }
                let Some(renderer) = self.renderer.as_mut() else {
                    return;
                };

                match renderer.draw_frame() {
                    Ok(FrameStatus::Presented) | Ok(FrameStatus::PresentedAndRecreated) => {
                        self.update_fps();
                    }
                    Ok(FrameStatus::Skipped) => {}
                    Err(e) => self.fail(event_loop, e),
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    /// Tear down GPU state while the window still exists
    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.renderer = None;
    }
}
