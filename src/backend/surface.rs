// Window surface - the presentation target
//
// Binds a platform window to the instance. The window itself belongs to
// the windowing layer; we only need its raw handles, the instance
// extensions its platform requires, and its current framebuffer size.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{CStr, CString};
use std::sync::Arc;

use super::error::{BootstrapError, Result};
use super::instance::Instance;

/// What the bootstrap needs from the windowing layer.
pub trait PresentationWindow: HasWindowHandle + HasDisplayHandle {
    /// Current framebuffer size in pixels.
    fn framebuffer_size(&self) -> vk::Extent2D;
}

impl PresentationWindow for winit::window::Window {
    fn framebuffer_size(&self) -> vk::Extent2D {
        let size = self.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }
}

/// Instance extensions the window's platform needs for presentation.
pub fn required_extensions(window: &dyn PresentationWindow) -> Result<Vec<CString>> {
    let display = window
        .display_handle()
        .map_err(|e| BootstrapError::SurfaceCreationFailed(e.to_string()))?
        .as_raw();
    let names = ash_window::enumerate_required_extensions(display)
        .map_err(|e| BootstrapError::SurfaceCreationFailed(format!("unsupported platform: {e}")))?;

    Ok(names
        .iter()
        .map(|&ptr| unsafe { CStr::from_ptr(ptr) }.to_owned())
        .collect())
}

pub struct Surface {
    raw: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
    window: Arc<dyn PresentationWindow>,
    _instance: Arc<Instance>,
}

impl Surface {
    pub fn new(instance: Arc<Instance>, window: Arc<dyn PresentationWindow>) -> Result<Arc<Self>> {
        let display = window
            .display_handle()
            .map_err(|e| BootstrapError::SurfaceCreationFailed(format!("display handle: {e}")))?
            .as_raw();
        let handle = window
            .window_handle()
            .map_err(|e| BootstrapError::SurfaceCreationFailed(format!("window handle: {e}")))?
            .as_raw();

        let raw = unsafe {
            ash_window::create_surface(instance.entry(), instance.raw(), display, handle, None)
        }
        .map_err(|e| BootstrapError::SurfaceCreationFailed(e.to_string()))?;

        let loader = ash::khr::surface::Instance::new(instance.entry(), instance.raw());

        log::info!("Window surface created");

        Ok(Arc::new(Self {
            raw,
            loader,
            window,
            _instance: instance,
        }))
    }

    pub fn raw(&self) -> vk::SurfaceKHR {
        self.raw
    }

    /// Live framebuffer size of the bound window.
    pub fn framebuffer_size(&self) -> vk::Extent2D {
        self.window.framebuffer_size()
    }

    pub fn supports_queue_family(&self, device: vk::PhysicalDevice, family: u32) -> Result<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(device, family, self.raw)
        }
        .map_err(BootstrapError::query("surface support"))
    }

    pub fn capabilities(&self, device: vk::PhysicalDevice) -> Result<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.loader
                .get_physical_device_surface_capabilities(device, self.raw)
        }
        .map_err(BootstrapError::query("surface capabilities"))
    }

    pub fn formats(&self, device: vk::PhysicalDevice) -> Result<Vec<vk::SurfaceFormatKHR>> {
        unsafe { self.loader.get_physical_device_surface_formats(device, self.raw) }
            .map_err(BootstrapError::query("surface format"))
    }

    pub fn present_modes(&self, device: vk::PhysicalDevice) -> Result<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_present_modes(device, self.raw)
        }
        .map_err(BootstrapError::query("present mode"))
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        log::info!("Destroying window surface");
        unsafe { self.loader.destroy_surface(self.raw, None) };
    }
}
