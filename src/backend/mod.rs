// Backend module - Vulkan bootstrap layer
//
// Design: thin wrappers around ash, each owning one Vulkan object and an
// Arc to the object it was created from.
// Flow: instance -> surface -> device -> swapchain -> image views

pub mod bootstrap;
pub mod catalog;
pub mod context;
pub mod debug;
pub mod error;
pub mod image_views;
pub mod instance;
pub mod selector;
pub mod surface;
pub mod swapchain;

pub use bootstrap::{BootstrapSettings, RenderTarget};
pub use catalog::DeviceFeature;
pub use debug::{DebugMessengerConfig, MessageSeverity};
