// Execution context - logical device and its queues
//
// Opens the selected device with exactly the features and extensions the
// caller asked for, and one queue per distinct family among graphics and
// presentation.

use ash::vk;
use std::collections::BTreeSet;
use std::ffi::CStr;
use std::sync::Arc;

use super::catalog::{DeviceCandidate, DeviceFeature, QueueFamilies};
use super::error::{BootstrapError, Result};
use super::instance::{first_missing, Instance};

/// Devices that advertise this extension must have it enabled.
pub const PORTABILITY_SUBSET: &CStr = c"VK_KHR_portability_subset";

/// What a logical device must provide.
#[derive(Debug, Clone, Default)]
pub struct DeviceRequirements {
    pub features: Vec<DeviceFeature>,
    pub extensions: Vec<&'static CStr>,
}

impl DeviceRequirements {
    /// Requirements for a device that presents to a window.
    pub fn presentation() -> Self {
        Self {
            features: Vec::new(),
            extensions: vec![ash::khr::swapchain::NAME],
        }
    }

    pub fn with_features(mut self, features: &[DeviceFeature]) -> Self {
        for &feature in features {
            if !self.features.contains(&feature) {
                self.features.push(feature);
            }
        }
        self
    }

    /// Checks `candidate` against these requirements and returns the full
    /// extension list to enable.
    pub fn check(&self, candidate: &DeviceCandidate) -> Result<Vec<&'static CStr>> {
        if let Some(missing) = first_missing(&self.extensions, &candidate.extensions) {
            return Err(BootstrapError::DeviceExtensionMissing {
                device: candidate.name().to_owned(),
                extension: missing.to_string_lossy().into_owned(),
            });
        }

        if let Some(&feature) = self
            .features
            .iter()
            .find(|&&feature| !candidate.supports(feature))
        {
            return Err(BootstrapError::DeviceFeatureMissing {
                device: candidate.name().to_owned(),
                feature,
            });
        }

        let mut extensions = self.extensions.clone();
        let has_subset = candidate
            .extensions
            .iter()
            .any(|name| name.as_c_str() == PORTABILITY_SUBSET);
        if has_subset && !extensions.contains(&PORTABILITY_SUBSET) {
            extensions.push(PORTABILITY_SUBSET);
        }
        Ok(extensions)
    }
}

/// Distinct families to create queues on, in ascending order.
fn unique_families(families: QueueFamilies) -> Vec<u32> {
    [families.graphics, families.presentation]
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub struct ExecutionContext {
    device: ash::Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub queue_families: QueueFamilies,
    candidate: DeviceCandidate,
    instance: Arc<Instance>,
}

impl ExecutionContext {
    pub fn new(
        instance: Arc<Instance>,
        candidate: DeviceCandidate,
        requirements: DeviceRequirements,
    ) -> Result<Arc<Self>> {
        let queue_families = candidate.queue_families.resolve(candidate.name())?;
        let extensions = requirements.check(&candidate)?;

        let priorities = [1.0_f32];
        let queue_infos: Vec<_> = unique_families(queue_families)
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
            })
            .collect();

        let extension_ptrs: Vec<_> = extensions.iter().map(|name| name.as_ptr()).collect();
        let features = DeviceFeature::enable_all(&requirements.features);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features);

        let device = unsafe { instance.raw().create_device(candidate.handle, &create_info, None) }
            .map_err(BootstrapError::DeviceCreationFailed)?;

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.presentation, 0) };

        log::info!(
            "Logical device ready: {} queue family(s), graphics {} / presentation {}",
            queue_infos.len(),
            queue_families.graphics,
            queue_families.presentation
        );

        Ok(Arc::new(Self {
            device,
            graphics_queue,
            present_queue,
            queue_families,
            candidate,
            instance,
        }))
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn candidate(&self) -> &DeviceCandidate {
        &self.candidate
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.candidate.handle
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.map_err(BootstrapError::query("device idle"))
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        log::info!("Destroying logical device");
        unsafe { self.device.destroy_device(None) };
    }
}
