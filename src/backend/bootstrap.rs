// Bootstrap sequence
//
// Instance -> surface -> device selection -> execution context ->
// swapchain -> image views. Each step consumes the previous step's
// output; the first failure ends the sequence and everything already
// built is torn down in reverse order before the error surfaces.

use ash::vk;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::catalog::{DeviceCatalog, DeviceFeature};
use super::context::{DeviceRequirements, ExecutionContext};
use super::debug::DebugMessengerConfig;
use super::error::{BootstrapError, Result};
use super::image_views::ImageViewSet;
use super::instance::{Instance, InstanceConfig};
use super::selector::DeviceSelector;
use super::surface::{self, PresentationWindow, Surface};
use super::swapchain::{Swapchain, SwapchainConfig, SwapchainNegotiator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Uninitialized,
    InstanceReady,
    SurfaceReady,
    DeviceSelected,
    ExecutionContextReady,
    SwapchainReady,
    ImageViewsReady,
    Running,
}

impl Stage {
    pub fn next(self) -> Option<Stage> {
        Some(match self {
            Self::Uninitialized => Self::InstanceReady,
            Self::InstanceReady => Self::SurfaceReady,
            Self::SurfaceReady => Self::DeviceSelected,
            Self::DeviceSelected => Self::ExecutionContextReady,
            Self::ExecutionContextReady => Self::SwapchainReady,
            Self::SwapchainReady => Self::ImageViewsReady,
            Self::ImageViewsReady => Self::Running,
            Self::Running => return None,
        })
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::InstanceReady => "instance",
            Self::SurfaceReady => "window surface",
            Self::DeviceSelected => "device selection",
            Self::ExecutionContextReady => "logical device",
            Self::SwapchainReady => "swapchain",
            Self::ImageViewsReady => "image views",
            Self::Running => "running",
        };
        f.write_str(name)
    }
}

/// The sequence stopped while trying to reach `stage`.
#[derive(Debug, Error)]
#[error("bootstrap failed at stage '{stage}'")]
pub struct BootstrapFailure {
    pub stage: Stage,
    #[source]
    pub source: BootstrapError,
}

/// Tracks how far the sequence got.
#[derive(Debug)]
struct Progress {
    stage: Stage,
}

impl Progress {
    fn new() -> Self {
        Self {
            stage: Stage::Uninitialized,
        }
    }

    /// Records the outcome of building the next stage.
    fn advance<T>(&mut self, outcome: Result<T>) -> Result<T, BootstrapFailure> {
        let target = self.stage.next().unwrap_or(Stage::Running);
        match outcome {
            Ok(value) => {
                log::info!("Bootstrap: {} -> {}", self.stage, target);
                self.stage = target;
                Ok(value)
            }
            Err(source) => {
                log::error!("Bootstrap: {} failed: {}", target, source);
                Err(BootstrapFailure {
                    stage: target,
                    source,
                })
            }
        }
    }
}

/// Knobs the application hands to the bootstrap.
#[derive(Debug, Clone)]
pub struct BootstrapSettings {
    pub app_name: String,
    pub present_mode: vk::PresentModeKHR,
    pub required_features: Vec<DeviceFeature>,
    pub debug: Option<DebugMessengerConfig>,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            app_name: "present-bootstrap".to_owned(),
            present_mode: vk::PresentModeKHR::FIFO,
            required_features: vec![DeviceFeature::GeometryShader],
            debug: None,
        }
    }
}

/// Everything the renderer needs to start drawing into the window.
///
/// Fields are dropped in declaration order, which is the reverse of
/// creation order.
pub struct RenderTarget {
    image_views: ImageViewSet,
    swapchain: Arc<Swapchain>,
    context: Arc<ExecutionContext>,
    _surface: Arc<Surface>,
    instance: Arc<Instance>,
    stage: Stage,
}

impl RenderTarget {
    pub fn bootstrap(
        window: Arc<dyn PresentationWindow>,
        settings: &BootstrapSettings,
    ) -> Result<Self, BootstrapFailure> {
        let mut progress = Progress::new();

        let instance = progress.advance(surface::required_extensions(window.as_ref()).and_then(
            |extensions| {
                Instance::new(InstanceConfig {
                    app_name: settings.app_name.clone(),
                    extensions,
                    debug: settings.debug,
                })
            },
        ))?;

        let surface = progress.advance(Surface::new(instance.clone(), window))?;

        let selector = DeviceSelector::new(&settings.required_features);
        let candidate = progress.advance(
            DeviceCatalog::enumerate(&instance, &surface).and_then(|all| selector.select(all)),
        )?;

        let requirements =
            DeviceRequirements::presentation().with_features(&settings.required_features);
        let context =
            progress.advance(ExecutionContext::new(instance.clone(), candidate, requirements))?;

        let negotiator = SwapchainNegotiator::new(settings.present_mode);
        let swapchain =
            progress.advance(Swapchain::new(context.clone(), surface.clone(), &negotiator))?;

        let image_views = progress.advance(ImageViewSet::new(swapchain.clone()))?;

        progress.advance(Ok(()))?;

        Ok(Self {
            image_views,
            swapchain,
            context,
            _surface: surface,
            instance,
            stage: progress.stage,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain.raw()
    }

    pub fn config(&self) -> &SwapchainConfig {
        self.swapchain.config()
    }

    pub fn images(&self) -> &[vk::Image] {
        self.swapchain.images()
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        self.image_views.views()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.config().extent
    }

    pub fn format(&self) -> vk::Format {
        self.config().format
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.context.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.context.present_queue
    }

    pub fn device_name(&self) -> &str {
        self.context.candidate().name()
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        log::info!("Tearing down render target");
        if let Err(e) = self.context.wait_idle() {
            log::warn!("Device did not go idle before teardown: {}", e);
        }
    }
}
