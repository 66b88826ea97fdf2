// Device selection
//
// Filter the catalog by what rendering to a window needs, then rank the
// survivors. Ranking is a plain lexicographic key so the order is total
// and transitive:
//   1. discrete GPU
//   2. larger max 2D image dimension
//   3. graphics and presentation on the same queue family
//   4. 64-bit float shader support

use ash::vk;

use super::catalog::{DeviceCandidate, DeviceFeature};
use super::error::{BootstrapError, Result};

pub struct DeviceSelector {
    required_features: Vec<DeviceFeature>,
}

impl Default for DeviceSelector {
    fn default() -> Self {
        Self {
            required_features: vec![DeviceFeature::GeometryShader],
        }
    }
}

type RankKey = (bool, u32, bool, bool);

impl DeviceSelector {
    /// A selector requiring `required_features` on top of geometry shaders.
    pub fn new(required_features: &[DeviceFeature]) -> Self {
        let mut selector = Self::default();
        for &feature in required_features {
            if !selector.required_features.contains(&feature) {
                selector.required_features.push(feature);
            }
        }
        selector
    }

    pub fn is_suitable(&self, candidate: &DeviceCandidate) -> bool {
        let class_ok = matches!(
            candidate.properties.device_type,
            vk::PhysicalDeviceType::DISCRETE_GPU | vk::PhysicalDeviceType::INTEGRATED_GPU
        );
        let features_ok = self
            .required_features
            .iter()
            .all(|&feature| candidate.supports(feature));
        let queues_ok = candidate.queue_families.resolve(candidate.name()).is_ok();

        if !(class_ok && features_ok && queues_ok) {
            log::debug!(
                "Rejecting {}: class ok {}, features ok {}, graphics+presentation {}",
                candidate.name(),
                class_ok,
                features_ok,
                queues_ok
            );
        }

        class_ok && features_ok && queues_ok
    }

    fn rank(candidate: &DeviceCandidate) -> RankKey {
        (
            candidate.properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU,
            candidate.properties.max_image_dimension_2d,
            candidate.queue_families.shares_family(),
            candidate.supports(DeviceFeature::ShaderFloat64),
        )
    }

    /// Picks the best suitable candidate. On equal rank the device
    /// enumerated first wins.
    pub fn select(&self, candidates: Vec<DeviceCandidate>) -> Result<DeviceCandidate> {
        let enumerated = candidates.len();

        let best = candidates
            .into_iter()
            .enumerate()
            .filter(|(_, candidate)| self.is_suitable(candidate))
            .max_by(|(ia, a), (ib, b)| Self::rank(a).cmp(&Self::rank(b)).then(ib.cmp(ia)))
            .map(|(_, candidate)| candidate)
            .ok_or(BootstrapError::NoSuitableDevice { enumerated })?;

        log::info!(
            "Selected GPU: {} ({:?}, max 2D image {})",
            best.name(),
            best.properties.device_type,
            best.properties.max_image_dimension_2d
        );

        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::catalog::{DeviceProperties, QueueFamilyIndices};

    fn candidate(
        name: &str,
        device_type: vk::PhysicalDeviceType,
        max_dim: u32,
        graphics: Option<u32>,
        presentation: Option<u32>,
        float64: bool,
    ) -> DeviceCandidate {
        let mut features = DeviceFeature::enable_all(&[DeviceFeature::GeometryShader]);
        if float64 {
            features.shader_float64 = vk::TRUE;
        }
        DeviceCandidate {
            handle: vk::PhysicalDevice::null(),
            properties: DeviceProperties {
                name: name.to_owned(),
                device_type,
                api_version: vk::API_VERSION_1_0,
                vendor_id: 0,
                device_id: 0,
                pipeline_cache_uuid: [0; vk::UUID_SIZE],
                max_image_dimension_2d: max_dim,
            },
            features,
            extensions: Vec::new(),
            queue_families: QueueFamilyIndices {
                graphics,
                presentation,
            },
        }
    }

    const DISCRETE: vk::PhysicalDeviceType = vk::PhysicalDeviceType::DISCRETE_GPU;
    const INTEGRATED: vk::PhysicalDeviceType = vk::PhysicalDeviceType::INTEGRATED_GPU;

    #[test]
    fn empty_list_fails() {
        let result = DeviceSelector::default().select(Vec::new());
        assert!(matches!(result, Err(BootstrapError::NoSuitableDevice { enumerated: 0 })));
    }

    #[test]
    fn everything_filtered_fails() {
        let cpu = candidate("cpu", vk::PhysicalDeviceType::CPU, 16384, Some(0), Some(0), true);
        let headless = candidate("headless", DISCRETE, 16384, Some(0), None, true);
        let result = DeviceSelector::default().select(vec![cpu, headless]);
        assert!(matches!(result, Err(BootstrapError::NoSuitableDevice { enumerated: 2 })));
    }

    #[test]
    fn discrete_beats_integrated() {
        let devices = vec![
            candidate("igpu-a", INTEGRATED, 16384, Some(0), Some(0), true),
            candidate("igpu-b", INTEGRATED, 32768, Some(0), Some(0), true),
            candidate("dgpu", DISCRETE, 8192, Some(0), Some(1), false),
            candidate("igpu-c", INTEGRATED, 16384, Some(0), Some(0), true),
        ];
        let best = DeviceSelector::default().select(devices).unwrap();
        assert_eq!(best.name(), "dgpu");
    }

    #[test]
    fn never_returns_device_without_presentation() {
        let devices = vec![
            candidate("fast-headless", DISCRETE, 32768, Some(0), None, true),
            candidate("slow-presenting", INTEGRATED, 4096, Some(0), Some(0), false),
        ];
        let best = DeviceSelector::default().select(devices).unwrap();
        assert_eq!(best.name(), "slow-presenting");
        assert!(best.queue_families.presentation.is_some());
    }

    #[test]
    fn device_without_graphics_family_is_rejected() {
        let devices = vec![
            candidate("present-only", DISCRETE, 32768, None, Some(0), true),
            candidate("viable", INTEGRATED, 4096, Some(0), Some(0), false),
        ];
        let best = DeviceSelector::default().select(devices).unwrap();
        assert_eq!(best.name(), "viable");
        assert!(best.queue_families.resolve(best.name()).is_ok());
    }

    #[test]
    fn geometry_shader_is_required() {
        let mut no_geometry = candidate("no-geom", DISCRETE, 32768, Some(0), Some(0), true);
        no_geometry.features.geometry_shader = vk::FALSE;
        let ok = candidate("ok", INTEGRATED, 4096, Some(0), Some(0), false);
        let best = DeviceSelector::default().select(vec![no_geometry, ok]).unwrap();
        assert_eq!(best.name(), "ok");
    }

    #[test]
    fn extra_required_features_filter() {
        let selector = DeviceSelector::new(&[DeviceFeature::ShaderFloat64]);
        let devices = vec![
            candidate("no-f64", DISCRETE, 32768, Some(0), Some(0), false),
            candidate("f64", INTEGRATED, 4096, Some(0), Some(0), true),
        ];
        assert_eq!(selector.select(devices).unwrap().name(), "f64");
    }

    #[test]
    fn image_dimension_breaks_class_ties() {
        let devices = vec![
            candidate("small", DISCRETE, 8192, Some(0), Some(0), true),
            candidate("large", DISCRETE, 16384, Some(0), Some(1), false),
        ];
        assert_eq!(DeviceSelector::default().select(devices).unwrap().name(), "large");
    }

    #[test]
    fn shared_family_then_float64_break_remaining_ties() {
        let devices = vec![
            candidate("split", DISCRETE, 16384, Some(0), Some(1), true),
            candidate("shared", DISCRETE, 16384, Some(0), Some(0), false),
        ];
        assert_eq!(DeviceSelector::default().select(devices).unwrap().name(), "shared");

        let devices = vec![
            candidate("no-f64", DISCRETE, 16384, Some(0), Some(0), false),
            candidate("f64", DISCRETE, 16384, Some(0), Some(0), true),
        ];
        assert_eq!(DeviceSelector::default().select(devices).unwrap().name(), "f64");
    }

    #[test]
    fn result_does_not_depend_on_input_order() {
        let devices = vec![
            candidate("a", INTEGRATED, 16384, Some(0), Some(0), true),
            candidate("b", DISCRETE, 4096, Some(0), Some(1), false),
            candidate("c", DISCRETE, 4096, Some(0), Some(0), false),
            candidate("d", INTEGRATED, 32768, Some(0), Some(0), true),
        ];
        let forward = DeviceSelector::default().select(devices.clone()).unwrap();
        let reversed = DeviceSelector::default()
            .select(devices.into_iter().rev().collect())
            .unwrap();
        assert_eq!(forward.name(), "c");
        assert_eq!(reversed.name(), "c");
    }

    #[test]
    fn equal_rank_keeps_enumeration_order() {
        let devices = vec![
            candidate("first", DISCRETE, 16384, Some(0), Some(0), true),
            candidate("second", DISCRETE, 16384, Some(0), Some(0), true),
        ];
        assert_eq!(DeviceSelector::default().select(devices).unwrap().name(), "first");
    }
}
