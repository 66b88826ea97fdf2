// Bootstrap errors
//
// One enum for every way the bring-up sequence can fail. Each variant
// carries enough detail to print a single useful message.

use ash::vk;
use thiserror::Error;

use super::catalog::DeviceFeature;

pub type Result<T, E = BootstrapError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("instance extension {0} is not available")]
    ExtensionUnavailable(String),

    #[error("validation layer {0} was requested but is not available")]
    ValidationLayerUnavailable(String),

    #[error("failed to create Vulkan instance")]
    InstanceCreationFailed(#[source] vk::Result),

    #[error("failed to create debug messenger")]
    DebugMessengerCreationFailed(#[source] vk::Result),

    #[error("failed to create window surface: {0}")]
    SurfaceCreationFailed(String),

    /// `enumerated` is the number of devices reported before filtering.
    #[error("no suitable physical device ({enumerated} enumerated)")]
    NoSuitableDevice { enumerated: usize },

    #[error("device '{device}' has no {capability} queue family")]
    NoQueueFamily {
        device: String,
        capability: &'static str,
    },

    #[error("device '{device}' does not support extension {extension}")]
    DeviceExtensionMissing { device: String, extension: String },

    #[error("device '{device}' does not support feature {feature:?}")]
    DeviceFeatureMissing {
        device: String,
        feature: DeviceFeature,
    },

    #[error("failed to create logical device")]
    DeviceCreationFailed(#[source] vk::Result),

    #[error("surface reports no supported formats")]
    NoSurfaceFormat,

    #[error("no usable present mode (FIFO missing from {0:?})")]
    NoPresentMode(Vec<vk::PresentModeKHR>),

    #[error("failed to create swapchain")]
    SwapchainCreationFailed(#[source] vk::Result),

    #[error("swapchain delivered no images")]
    EmptySwapchain,

    #[error("failed to create view for swapchain image {index}")]
    ImageViewCreationFailed {
        index: usize,
        #[source]
        source: vk::Result,
    },

    #[error("{what} query failed")]
    Query {
        what: &'static str,
        #[source]
        source: vk::Result,
    },
}

impl BootstrapError {
    /// Adapter for `map_err` on raw query results.
    pub(crate) fn query(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |source| Self::Query { what, source }
    }
}
