// Diagnostic messenger configuration
//
// The validation layer reports through a VK_EXT_debug_utils messenger.
// Which messages get through and where they go is decided by a plain
// value handed to instance construction.

use ash::vk;
use std::ffi::{c_void, CStr};

/// Lowest severity forwarded by the messenger. Everything at or above it
/// passes the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageSeverity {
    Verbose,
    Info,
    Warning,
    Error,
}

impl MessageSeverity {
    pub fn and_above(self) -> vk::DebugUtilsMessageSeverityFlagsEXT {
        use vk::DebugUtilsMessageSeverityFlagsEXT as S;
        match self {
            Self::Verbose => S::VERBOSE | S::INFO | S::WARNING | S::ERROR,
            Self::Info => S::INFO | S::WARNING | S::ERROR,
            Self::Warning => S::WARNING | S::ERROR,
            Self::Error => S::ERROR,
        }
    }
}

#[derive(Clone, Copy)]
pub struct DebugMessengerConfig {
    pub severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    pub message_types: vk::DebugUtilsMessageTypeFlagsEXT,
    pub callback: vk::PFN_vkDebugUtilsMessengerCallbackEXT,
}

impl DebugMessengerConfig {
    pub fn with_min_severity(min: MessageSeverity) -> Self {
        Self {
            severity: min.and_above(),
            ..Self::default()
        }
    }

    pub fn create_info(&self) -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(self.severity)
            .message_type(self.message_types)
            .pfn_user_callback(self.callback)
    }
}

impl Default for DebugMessengerConfig {
    fn default() -> Self {
        Self {
            severity: MessageSeverity::Warning.and_above(),
            message_types: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            callback: Some(log_callback),
        }
    }
}

impl std::fmt::Debug for DebugMessengerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugMessengerConfig")
            .field("severity", &self.severity)
            .field("message_types", &self.message_types)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

fn log_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::Level::Info
    } else {
        log::Level::Trace
    }
}

fn message_kind(types: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if types.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if types.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

/// Default callback: forwards every message into the `log` facade.
unsafe extern "system" fn log_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_types: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    log::log!(
        log_level(message_severity),
        "[Vulkan {}] {}",
        message_kind(message_types),
        message.to_string_lossy()
    );

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::DebugUtilsMessageSeverityFlagsEXT as S;

    #[test]
    fn warning_filter_excludes_info_and_verbose() {
        let flags = MessageSeverity::Warning.and_above();
        assert!(flags.contains(S::WARNING | S::ERROR));
        assert!(!flags.intersects(S::INFO | S::VERBOSE));
    }

    #[test]
    fn verbose_filter_covers_everything() {
        let flags = MessageSeverity::Verbose.and_above();
        assert_eq!(flags, S::VERBOSE | S::INFO | S::WARNING | S::ERROR);
    }

    #[test]
    fn severities_map_to_log_levels() {
        assert_eq!(log_level(S::ERROR), log::Level::Error);
        assert_eq!(log_level(S::WARNING), log::Level::Warn);
        assert_eq!(log_level(S::INFO), log::Level::Info);
        assert_eq!(log_level(S::VERBOSE), log::Level::Trace);
    }

    #[test]
    fn default_config_routes_to_log() {
        let config = DebugMessengerConfig::default();
        assert!(config.callback.is_some());
        assert!(config
            .message_types
            .contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION));
    }
}
