// Swapchain image views
//
// One 2D color view per delivered swapchain image, in the swapchain's
// negotiated format. Either every view is created or none stays alive.

use ash::vk;
use std::sync::Arc;

use super::error::{BootstrapError, Result};
use super::swapchain::Swapchain;

/// Creates one handle per input in order. If any creation fails, every
/// handle made by this call is released before the error (tagged with the
/// failing index) is returned.
pub(crate) fn create_all<T, H, E>(
    inputs: &[T],
    mut create: impl FnMut(&T) -> Result<H, E>,
    mut release: impl FnMut(H),
) -> Result<Vec<H>, (usize, E)> {
    let mut created = Vec::with_capacity(inputs.len());
    for (index, input) in inputs.iter().enumerate() {
        match create(input) {
            Ok(handle) => created.push(handle),
            Err(e) => {
                for handle in created.drain(..).rev() {
                    release(handle);
                }
                return Err((index, e));
            }
        }
    }
    Ok(created)
}

/// A swapchain that delivered no images has nothing to view.
fn require_images(images: &[vk::Image]) -> Result<&[vk::Image]> {
    if images.is_empty() {
        Err(BootstrapError::EmptySwapchain)
    } else {
        Ok(images)
    }
}

fn view_create_info(image: vk::Image, format: vk::Format) -> vk::ImageViewCreateInfo<'static> {
    vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
}

pub struct ImageViewSet {
    views: Vec<vk::ImageView>,
    swapchain: Arc<Swapchain>,
}

impl ImageViewSet {
    pub fn new(swapchain: Arc<Swapchain>) -> Result<Self> {
        let images = require_images(swapchain.images())?;

        let device = swapchain.context().device();
        let format = swapchain.config().format;

        let views = create_all(
            images,
            |&image| unsafe { device.create_image_view(&view_create_info(image, format), None) },
            |view| unsafe { device.destroy_image_view(view, None) },
        )
        .map_err(|(index, source)| BootstrapError::ImageViewCreationFailed { index, source })?;

        log::info!("Created {} swapchain image views", views.len());

        Ok(Self { views, swapchain })
    }

    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }
}

impl Drop for ImageViewSet {
    fn drop(&mut self) {
        let device = self.swapchain.context().device();
        unsafe {
            for &view in &self.views {
                device.destroy_image_view(view, None);
            }
        }
    }
}
