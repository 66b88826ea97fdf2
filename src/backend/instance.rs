// Vulkan Instance - process-wide entry point
//
// Responsibilities:
// - Load the Vulkan library
// - Verify requested extensions and the validation layer exist
// - Create the instance (portability enumeration when the loader offers it)
// - Own the optional debug messenger

use ash::{vk, Entry};
use std::ffi::{CStr, CString};
use std::sync::Arc;

use super::debug::DebugMessengerConfig;
use super::error::{BootstrapError, Result};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Everything instance creation needs to know.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    pub app_name: String,
    /// Instance extensions the caller needs (usually the window platform's).
    pub extensions: Vec<CString>,
    /// `Some` turns on the validation layer and a messenger with this filter.
    pub debug: Option<DebugMessengerConfig>,
}

pub struct Instance {
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    raw: ash::Instance,
    entry: Entry,
    extensions: Vec<CString>,
}

impl Instance {
    pub fn new(config: InstanceConfig) -> Result<Arc<Self>> {
        let entry = unsafe { Entry::load() }?;
        Self::with_entry(entry, config)
    }

    pub fn with_entry(entry: Entry, config: InstanceConfig) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan instance for {}", config.app_name);

        let available: Vec<CString> = unsafe { entry.enumerate_instance_extension_properties(None) }
            .map_err(BootstrapError::query("instance extension"))?
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok())
            .map(CStr::to_owned)
            .collect();

        let mut extensions = config.extensions.clone();
        if config.debug.is_some() {
            extensions.push(ash::ext::debug_utils::NAME.to_owned());
        }
        if let Some(missing) = first_missing(&extensions, &available) {
            return Err(BootstrapError::ExtensionUnavailable(
                missing.to_string_lossy().into_owned(),
            ));
        }

        let mut flags = vk::InstanceCreateFlags::empty();
        let portability = ash::khr::portability_enumeration::NAME;
        if available.iter().any(|name| name.as_c_str() == portability) {
            log::debug!("Enabling {:?}", portability);
            extensions.push(portability.to_owned());
            flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        }

        let layers: Vec<CString> = if config.debug.is_some() {
            let available_layers: Vec<CString> =
                unsafe { entry.enumerate_instance_layer_properties() }
                    .map_err(BootstrapError::query("instance layer"))?
                    .iter()
                    .filter_map(|layer| layer.layer_name_as_c_str().ok())
                    .map(CStr::to_owned)
                    .collect();
            let wanted = [VALIDATION_LAYER.to_owned()];
            if let Some(missing) = first_missing(&wanted, &available_layers) {
                return Err(BootstrapError::ValidationLayerUnavailable(
                    missing.to_string_lossy().into_owned(),
                ));
            }
            wanted.to_vec()
        } else {
            Vec::new()
        };

        let app_name = CString::new(config.app_name.as_str()).unwrap_or_default();
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"present-bootstrap")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let extension_ptrs: Vec<_> = extensions.iter().map(|name| name.as_ptr()).collect();
        let layer_ptrs: Vec<_> = layers.iter().map(|name| name.as_ptr()).collect();

        // Chained so instance creation and destruction are covered too
        let mut instance_debug_info = config.debug.map(|debug| debug.create_info());

        let mut create_info = vk::InstanceCreateInfo::default()
            .flags(flags)
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);
        if let Some(debug_info) = instance_debug_info.as_mut() {
            create_info = create_info.push_next(debug_info);
        }

        let raw = unsafe { entry.create_instance(&create_info, None) }
            .map_err(BootstrapError::InstanceCreationFailed)?;

        let debug_utils = match config.debug {
            Some(debug) => match Self::create_messenger(&entry, &raw, &debug) {
                Ok(pair) => Some(pair),
                Err(e) => {
                    unsafe { raw.destroy_instance(None) };
                    return Err(e);
                }
            },
            None => None,
        };

        log::info!(
            "Instance ready ({} extensions, validation {})",
            extensions.len(),
            if debug_utils.is_some() { "on" } else { "off" }
        );

        Ok(Arc::new(Self {
            debug_utils,
            raw,
            entry,
            extensions,
        }))
    }

    fn create_messenger(
        entry: &Entry,
        instance: &ash::Instance,
        config: &DebugMessengerConfig,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);
        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&config.create_info(), None) }
            .map_err(BootstrapError::DebugMessengerCreationFailed)?;
        Ok((debug_utils, messenger))
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn raw(&self) -> &ash::Instance {
        &self.raw
    }

    /// Extensions the instance was actually created with.
    pub fn enabled_extensions(&self) -> &[CString] {
        &self.extensions
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance");
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.raw.destroy_instance(None);
        }
    }
}

/// First entry of `wanted` that does not appear in `available`.
pub(crate) fn first_missing<'a, S: AsRef<CStr>>(
    wanted: &'a [S],
    available: &[CString],
) -> Option<&'a CStr> {
    wanted
        .iter()
        .map(<S as AsRef<CStr>>::as_ref)
        .find(|name| !available.iter().any(|have| have.as_c_str() == *name))
}
