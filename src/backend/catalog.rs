// Device catalog - what GPUs are there and what can they do
//
// Every physical device is queried once per selection round for its
// properties, features, extensions and queue-family layout against the
// target surface. Nothing here is cached across rounds.

use ash::vk;
use serde::Deserialize;
use std::ffi::{CStr, CString};

use super::error::{BootstrapError, Result};
use super::instance::Instance;
use super::surface::Surface;

/// Boolean device features that can be required of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFeature {
    GeometryShader,
    TessellationShader,
    ShaderFloat64,
    ShaderInt64,
    SamplerAnisotropy,
    FillModeNonSolid,
    WideLines,
    MultiDrawIndirect,
}

impl DeviceFeature {
    fn flag(self, features: &vk::PhysicalDeviceFeatures) -> vk::Bool32 {
        match self {
            Self::GeometryShader => features.geometry_shader,
            Self::TessellationShader => features.tessellation_shader,
            Self::ShaderFloat64 => features.shader_float64,
            Self::ShaderInt64 => features.shader_int64,
            Self::SamplerAnisotropy => features.sampler_anisotropy,
            Self::FillModeNonSolid => features.fill_mode_non_solid,
            Self::WideLines => features.wide_lines,
            Self::MultiDrawIndirect => features.multi_draw_indirect,
        }
    }

    fn flag_mut(self, features: &mut vk::PhysicalDeviceFeatures) -> &mut vk::Bool32 {
        match self {
            Self::GeometryShader => &mut features.geometry_shader,
            Self::TessellationShader => &mut features.tessellation_shader,
            Self::ShaderFloat64 => &mut features.shader_float64,
            Self::ShaderInt64 => &mut features.shader_int64,
            Self::SamplerAnisotropy => &mut features.sampler_anisotropy,
            Self::FillModeNonSolid => &mut features.fill_mode_non_solid,
            Self::WideLines => &mut features.wide_lines,
            Self::MultiDrawIndirect => &mut features.multi_draw_indirect,
        }
    }

    pub fn is_supported(self, features: &vk::PhysicalDeviceFeatures) -> bool {
        self.flag(features) == vk::TRUE
    }

    /// Builds a feature struct with exactly the listed features turned on.
    pub fn enable_all(requested: &[DeviceFeature]) -> vk::PhysicalDeviceFeatures {
        let mut features = vk::PhysicalDeviceFeatures::default();
        for feature in requested {
            *feature.flag_mut(&mut features) = vk::TRUE;
        }
        features
    }
}

/// Queue families of one device, relative to one surface.
///
/// Both fields are resolved independently and may name the same family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub presentation: Option<u32>,
}

/// Queue families after resolution; both are guaranteed to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub presentation: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.presentation
    }
}

impl QueueFamilyIndices {
    /// Linear scan: first family with graphics support, and independently
    /// the first family `supports_present` accepts.
    pub fn find<F>(families: &[vk::QueueFamilyProperties], mut supports_present: F) -> Result<Self>
    where
        F: FnMut(u32) -> Result<bool>,
    {
        let mut indices = Self::default();
        for (index, family) in (0u32..).zip(families) {
            if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(index);
            }
            if indices.presentation.is_none() && supports_present(index)? {
                indices.presentation = Some(index);
            }
        }
        Ok(indices)
    }

    pub fn resolve(&self, device: &str) -> Result<QueueFamilies> {
        let missing = |capability| BootstrapError::NoQueueFamily {
            device: device.to_owned(),
            capability,
        };
        Ok(QueueFamilies {
            graphics: self.graphics.ok_or_else(|| missing("graphics"))?,
            presentation: self.presentation.ok_or_else(|| missing("presentation"))?,
        })
    }

    pub fn shares_family(&self) -> bool {
        matches!((self.graphics, self.presentation), (Some(g), Some(p)) if g == p)
    }
}

#[derive(Debug, Clone)]
pub struct DeviceProperties {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub vendor_id: u32,
    pub device_id: u32,
    pub pipeline_cache_uuid: [u8; vk::UUID_SIZE],
    pub max_image_dimension_2d: u32,
}

impl From<&vk::PhysicalDeviceProperties> for DeviceProperties {
    fn from(props: &vk::PhysicalDeviceProperties) -> Self {
        Self {
            name: props
                .device_name_as_c_str()
                .unwrap_or(c"unknown")
                .to_string_lossy()
                .into_owned(),
            device_type: props.device_type,
            api_version: props.api_version,
            vendor_id: props.vendor_id,
            device_id: props.device_id,
            pipeline_cache_uuid: props.pipeline_cache_uuid,
            max_image_dimension_2d: props.limits.max_image_dimension2_d,
        }
    }
}

/// One physical device and everything we learned about it.
///
/// The handle stays valid only while the instance that enumerated it lives.
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub properties: DeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub extensions: Vec<CString>,
    pub queue_families: QueueFamilyIndices,
}

impl DeviceCandidate {
    pub fn name(&self) -> &str {
        &self.properties.name
    }

    pub fn supports(&self, feature: DeviceFeature) -> bool {
        feature.is_supported(&self.features)
    }
}

pub struct DeviceCatalog;

impl DeviceCatalog {
    /// Enumerates and queries every device the instance can see.
    pub fn enumerate(instance: &Instance, surface: &Surface) -> Result<Vec<DeviceCandidate>> {
        let raw = instance.raw();
        let devices = unsafe { raw.enumerate_physical_devices() }
            .map_err(BootstrapError::query("physical device"))?;

        log::debug!("Found {} physical device(s)", devices.len());

        devices
            .into_iter()
            .map(|handle| Self::query(instance, surface, handle))
            .collect()
    }

    fn query(instance: &Instance, surface: &Surface, handle: vk::PhysicalDevice) -> Result<DeviceCandidate> {
        let raw = instance.raw();
        let properties = unsafe { raw.get_physical_device_properties(handle) };
        let features = unsafe { raw.get_physical_device_features(handle) };
        let families = unsafe { raw.get_physical_device_queue_family_properties(handle) };
        let extensions = device_extensions(instance, handle)?;

        let queue_families = QueueFamilyIndices::find(&families, |index| {
            surface.supports_queue_family(handle, index)
        })?;

        let candidate = DeviceCandidate {
            handle,
            properties: DeviceProperties::from(&properties),
            features,
            extensions,
            queue_families,
        };

        log::debug!(
            "  {} ({:?}): graphics {:?}, presentation {:?}",
            candidate.name(),
            candidate.properties.device_type,
            queue_families.graphics,
            queue_families.presentation
        );

        Ok(candidate)
    }
}

pub(crate) fn device_extensions(instance: &Instance, handle: vk::PhysicalDevice) -> Result<Vec<CString>> {
    let properties = unsafe { instance.raw().enumerate_device_extension_properties(handle) }
        .map_err(BootstrapError::query("device extension"))?;
    Ok(properties
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok())
        .map(CStr::to_owned)
        .collect())
}
