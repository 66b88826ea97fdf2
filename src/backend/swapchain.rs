// Swapchain - negotiated presentable image queue
//
// Query what the device and surface support, reconcile it into one
// SwapchainConfig, and build the swapchain from that config alone.
// The individual choices are plain functions over the queried values.

use ash::vk;
use std::ffi::{CStr, CString};
use std::sync::Arc;

use super::catalog::{device_extensions, QueueFamilies};
use super::context::ExecutionContext;
use super::error::{BootstrapError, Result};
use super::instance::first_missing;
use super::surface::Surface;

const PREFERRED_FORMAT: vk::Format = vk::Format::B8G8R8A8_SRGB;
const PREFERRED_COLOR_SPACE: vk::ColorSpaceKHR = vk::ColorSpaceKHR::SRGB_NONLINEAR;

/// Everything the device and surface report about presentation.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub extensions: Vec<CString>,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(context: &ExecutionContext, surface: &Surface) -> Result<Self> {
        let device = context.physical_device();
        Ok(Self {
            extensions: device_extensions(context.instance(), device)?,
            capabilities: surface.capabilities(device)?,
            formats: surface.formats(device)?,
            present_modes: surface.present_modes(device)?,
        })
    }
}

/// How swapchain images are shared between queue families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingMode {
    Exclusive,
    /// Graphics and presentation family, in that order.
    Concurrent([u32; 2]),
}

impl SharingMode {
    pub fn for_families(families: QueueFamilies) -> Self {
        if families.is_shared() {
            Self::Exclusive
        } else {
            Self::Concurrent([families.graphics, families.presentation])
        }
    }

    pub fn as_vk(&self) -> vk::SharingMode {
        match self {
            Self::Exclusive => vk::SharingMode::EXCLUSIVE,
            Self::Concurrent(_) => vk::SharingMode::CONCURRENT,
        }
    }

    pub fn queue_family_indices(&self) -> &[u32] {
        match self {
            Self::Exclusive => &[],
            Self::Concurrent(indices) => indices,
        }
    }
}

/// Fully determines swapchain construction.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainConfig {
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub sharing: SharingMode,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// BGRA8 sRGB with the non-linear sRGB color space if offered anywhere in
/// the list, else whatever comes first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| f.format == PREFERRED_FORMAT && f.color_space == PREFERRED_COLOR_SPACE)
        .or_else(|| formats.first())
        .copied()
        .ok_or(BootstrapError::NoSurfaceFormat)
}

/// The preferred mode when supported, otherwise FIFO. A list without FIFO
/// means a non-conformant driver and is an error.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> Result<vk::PresentModeKHR> {
    if modes.contains(&preferred) {
        return Ok(preferred);
    }
    if modes.contains(&vk::PresentModeKHR::FIFO) {
        log::warn!("Present mode {:?} not supported, falling back to FIFO", preferred);
        return Ok(vk::PresentModeKHR::FIFO);
    }
    Err(BootstrapError::NoPresentMode(modes.to_vec()))
}

/// A current extent of `u32::MAX` means the surface takes whatever size
/// the swapchain picks; otherwise it must match exactly. An inverted
/// min/max range from the driver resolves to the max.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, framebuffer: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: framebuffer
                .width
                .max(caps.min_image_extent.width)
                .min(caps.max_image_extent.width),
            height: framebuffer
                .height
                .max(caps.min_image_extent.height)
                .min(caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum; a maximum of zero means unbounded.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count.saturating_add(1);
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

pub struct SwapchainNegotiator {
    preferred_present_mode: vk::PresentModeKHR,
    required_extensions: Vec<&'static CStr>,
}

impl Default for SwapchainNegotiator {
    fn default() -> Self {
        Self::new(vk::PresentModeKHR::FIFO)
    }
}

impl SwapchainNegotiator {
    pub fn new(preferred_present_mode: vk::PresentModeKHR) -> Self {
        Self {
            preferred_present_mode,
            required_extensions: vec![ash::khr::swapchain::NAME],
        }
    }

    pub fn negotiate(
        &self,
        device_name: &str,
        support: &SurfaceSupport,
        families: QueueFamilies,
        framebuffer: vk::Extent2D,
    ) -> Result<SwapchainConfig> {
        if let Some(missing) = first_missing(&self.required_extensions, &support.extensions) {
            return Err(BootstrapError::DeviceExtensionMissing {
                device: device_name.to_owned(),
                extension: missing.to_string_lossy().into_owned(),
            });
        }

        let surface_format = choose_surface_format(&support.formats)?;
        let present_mode = choose_present_mode(&support.present_modes, self.preferred_present_mode)?;

        Ok(SwapchainConfig {
            format: surface_format.format,
            color_space: surface_format.color_space,
            present_mode,
            extent: choose_extent(&support.capabilities, framebuffer),
            image_count: choose_image_count(&support.capabilities),
            sharing: SharingMode::for_families(families),
            pre_transform: support.capabilities.current_transform,
        })
    }
}

pub struct Swapchain {
    raw: vk::SwapchainKHR,
    loader: ash::khr::swapchain::Device,
    images: Vec<vk::Image>,
    config: SwapchainConfig,
    _surface: Arc<Surface>,
    context: Arc<ExecutionContext>,
}

impl Swapchain {
    pub fn new(
        context: Arc<ExecutionContext>,
        surface: Arc<Surface>,
        negotiator: &SwapchainNegotiator,
    ) -> Result<Arc<Self>> {
        let support = SurfaceSupport::query(&context, &surface)?;
        let framebuffer = surface.framebuffer_size();
        let config = negotiator.negotiate(
            context.candidate().name(),
            &support,
            context.queue_families,
            framebuffer,
        )?;

        log::info!(
            "Creating swapchain: {}x{}, {:?}/{:?}, {:?}, {} images, {:?}",
            config.extent.width,
            config.extent.height,
            config.format,
            config.color_space,
            config.present_mode,
            config.image_count,
            config.sharing
        );

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.raw())
            .min_image_count(config.image_count)
            .image_format(config.format)
            .image_color_space(config.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(config.sharing.as_vk())
            .queue_family_indices(config.sharing.queue_family_indices())
            .pre_transform(config.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true);

        let loader = ash::khr::swapchain::Device::new(context.instance().raw(), context.device());
        let raw = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(BootstrapError::SwapchainCreationFailed)?;

        // The driver may hand back a different number than requested
        let images = match unsafe { loader.get_swapchain_images(raw) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { loader.destroy_swapchain(raw, None) };
                return Err(BootstrapError::query("swapchain image")(e));
            }
        };

        if images.len() as u32 != config.image_count {
            log::debug!(
                "Requested {} swapchain images, driver delivered {}",
                config.image_count,
                images.len()
            );
        }
        log::info!("Created swapchain with {} images", images.len());

        Ok(Arc::new(Self {
            raw,
            loader,
            images,
            config,
            _surface: surface,
            context,
        }))
    }

    pub fn raw(&self) -> vk::SwapchainKHR {
        self.raw
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn config(&self) -> &SwapchainConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        log::info!("Destroying swapchain");
        unsafe { self.loader.destroy_swapchain(self.raw, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn caps(min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    fn support() -> SurfaceSupport {
        SurfaceSupport {
            extensions: vec![ash::khr::swapchain::NAME.to_owned()],
            capabilities: caps(2, 0),
            formats: vec![
                format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
                format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    const SHARED: QueueFamilies = QueueFamilies {
        graphics: 0,
        presentation: 0,
    };

    const FRAMEBUFFER: vk::Extent2D = vk::Extent2D {
        width: 1024,
        height: 768,
    };

    #[test]
    fn image_count_unbounded_max() {
        assert_eq!(choose_image_count(&caps(2, 0)), 3);
    }

    #[test]
    fn image_count_clamped_to_max() {
        assert_eq!(choose_image_count(&caps(2, 2)), 2);
        assert_eq!(choose_image_count(&caps(1, 8)), 2);
    }

    #[test]
    fn any_extent_uses_framebuffer_size() {
        let mut caps = caps(2, 0);
        caps.current_extent = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        caps.min_image_extent = vk::Extent2D {
            width: 64,
            height: 64,
        };
        let extent = choose_extent(&caps, FRAMEBUFFER);
        assert_eq!((extent.width, extent.height), (1024, 768));
    }

    #[test]
    fn any_extent_is_clamped() {
        let mut caps = caps(2, 0);
        caps.current_extent.width = u32::MAX;
        caps.min_image_extent = vk::Extent2D {
            width: 64,
            height: 64,
        };
        caps.max_image_extent = vk::Extent2D {
            width: 1000,
            height: 4096,
        };
        let tiny = vk::Extent2D {
            width: 2000,
            height: 10,
        };
        let extent = choose_extent(&caps, tiny);
        assert_eq!((extent.width, extent.height), (1000, 64));
    }

    #[test]
    fn inverted_extent_range_does_not_panic() {
        let mut caps = caps(2, 0);
        caps.current_extent.width = u32::MAX;
        caps.min_image_extent = vk::Extent2D {
            width: 2048,
            height: 2048,
        };
        caps.max_image_extent = vk::Extent2D {
            width: 512,
            height: 512,
        };
        let extent = choose_extent(&caps, FRAMEBUFFER);
        assert_eq!((extent.width, extent.height), (512, 512));
    }

    #[test]
    fn image_count_saturates() {
        assert_eq!(choose_image_count(&caps(u32::MAX, 0)), u32::MAX);
    }

    #[test]
    fn fixed_extent_is_used_verbatim() {
        let extent = choose_extent(&caps(2, 0), FRAMEBUFFER);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn preferred_format_found_anywhere() {
        let preferred = format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let others = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        for position in 0..=others.len() {
            let mut formats = others.to_vec();
            formats.insert(position, preferred);
            let chosen = choose_surface_format(&formats).unwrap();
            assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
            assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        }
    }

    #[test]
    fn format_falls_back_to_first() {
        let formats = [
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R16G16B16A16_SFLOAT);
    }

    #[test]
    fn no_formats_is_an_error() {
        assert!(matches!(choose_surface_format(&[]), Err(BootstrapError::NoSurfaceFormat)));
    }

    #[test]
    fn present_mode_choices() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX).unwrap(),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::IMMEDIATE).unwrap(),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn missing_fifo_is_an_error() {
        let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE];
        assert!(matches!(
            choose_present_mode(&modes, vk::PresentModeKHR::FIFO_RELAXED),
            Err(BootstrapError::NoPresentMode(_))
        ));
        assert!(matches!(
            choose_present_mode(&[], vk::PresentModeKHR::FIFO),
            Err(BootstrapError::NoPresentMode(_))
        ));
    }

    #[test]
    fn sharing_follows_queue_families() {
        assert_eq!(SharingMode::for_families(SHARED), SharingMode::Exclusive);
        assert!(SharingMode::Exclusive.queue_family_indices().is_empty());

        let split = QueueFamilies {
            graphics: 0,
            presentation: 2,
        };
        let sharing = SharingMode::for_families(split);
        assert_eq!(sharing.as_vk(), vk::SharingMode::CONCURRENT);
        assert_eq!(sharing.queue_family_indices(), &[0, 2]);
    }

    #[test]
    fn negotiates_full_config() {
        let negotiator = SwapchainNegotiator::default();
        let config = negotiator
            .negotiate("gpu", &support(), SHARED, FRAMEBUFFER)
            .unwrap();
        assert_eq!(config.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(config.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        assert_eq!(config.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!((config.extent.width, config.extent.height), (800, 600));
        assert_eq!(config.image_count, 3);
        assert_eq!(config.sharing, SharingMode::Exclusive);
        assert_eq!(config.pre_transform, vk::SurfaceTransformFlagsKHR::IDENTITY);
    }

    #[test]
    fn honours_preferred_present_mode() {
        let negotiator = SwapchainNegotiator::new(vk::PresentModeKHR::MAILBOX);
        let config = negotiator
            .negotiate("gpu", &support(), SHARED, FRAMEBUFFER)
            .unwrap();
        assert_eq!(config.present_mode, vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn extension_check_precedes_negotiation() {
        let mut support = support();
        support.extensions.clear();
        support.formats.clear();
        let result = SwapchainNegotiator::default().negotiate("gpu", &support, SHARED, FRAMEBUFFER);
        assert!(matches!(result, Err(BootstrapError::DeviceExtensionMissing { .. })));
    }
}
