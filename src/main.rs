// =============================================================================
// VULKAN PRESENTATION BOOTSTRAP
// =============================================================================
//
// Opens a window and brings up everything a renderer needs before its
// first frame: instance, surface, physical device, logical device,
// swapchain and per-image views.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit event loop (window, input)                               │
// │    └── RenderTarget                                             │
// │          └── ImageViewSet -> Swapchain -> ExecutionContext      │
// │                └── Surface -> Instance                          │
// └─────────────────────────────────────────────────────────────────┘
//
// Each arrow points at the object the left side was created from and
// keeps alive. Teardown runs left to right.
//
// =============================================================================

mod backend;
mod config;

use anyhow::{anyhow, Result};
use backend::RenderTarget;
use config::Config;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting Vulkan bootstrap");
    log::info!(
        "Window: {}x{} \"{}\"",
        config.window.width,
        config.window.height,
        config.window.title
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(failure) => Err(failure),
        None => Ok(()),
    }
}

/// Initialize logging. RUST_LOG takes precedence over the configured level.
fn init_logging(config: &Config) {
    use env_logger::Builder;

    let mut builder = Builder::new();
    builder.filter_level(config.get_log_level());
    builder.parse_env("RUST_LOG");
    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Field order matters for Drop: the render target goes before the window
/// it presents to.
struct App {
    config: Config,
    render_target: Option<RenderTarget>,
    window: Option<Arc<Window>>,
    /// Set when bootstrap fails; turned into the process exit status.
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            render_target: None,
            window: None,
            failure: None,
        }
    }

    fn init_vulkan(&mut self, window: Arc<Window>) -> Result<()> {
        let settings = self.config.bootstrap_settings();
        let target = RenderTarget::bootstrap(window, &settings)?;

        let swapchain = target.config();
        log::info!("Device: {}", target.device_name());
        log::debug!(
            "Swapchain {:?}, graphics queue {:?}, present queue {:?}",
            target.swapchain(),
            target.graphics_queue(),
            target.present_queue()
        );
        log::debug!(
            "Instance extensions: {:?}",
            target.instance().enabled_extensions()
        );
        log::info!(
            "Swapchain: {:?} / {:?}, {:?}, {}x{}, {} images ({} views), {:?}",
            target.format(),
            swapchain.color_space,
            swapchain.present_mode,
            target.extent().width,
            target.extent().height,
            target.images().len(),
            target.image_views().len(),
            swapchain.sharing
        );
        log::info!("Ready ({})", target.stage());

        self.render_target = Some(target);
        Ok(())
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        // Swapchain recreation is out of scope, so the window never resizes
        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                self.failure = Some(anyhow!(e).context("failed to create window"));
                event_loop.exit();
                return;
            }
        };

        self.window = Some(window.clone());

        if let Err(e) = self.init_vulkan(window) {
            log::error!("Failed to initialize Vulkan: {:?}", e);
            self.failure = Some(e);
            event_loop.exit();
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
                event_loop.exit();
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

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Tear down while the window still exists
        self.render_target = None;
        log::info!("Cleanup complete");
    }
}
