//! `setResourceOveruseConfigurations` / `getResourceOveruseConfigurations`
//! validation. The daemon round-trip itself lives in
//! [`crate::daemon_link::DaemonLink`] (C6) — this module only owns the
//! argument validation C4 is responsible for before a push is attempted.

use crate::error::WatchdogError;
use crate::types::{ComponentType, OveruseConfiguration, ResourceOveruseFlags};
use std::collections::HashSet;

/// Validate a `setResourceOveruseConfigurations` batch:
/// - every `componentType` is one of {System, Vendor, ThirdParty};
/// - no duplicate `componentType` in the batch;
/// - when `FLAG_RESOURCE_OVERUSE_IO` is set, every entry must actually carry
///   I/O configuration (modeled here as a non-empty entry, since this crate's
///   `OveruseConfiguration` only ever carries I/O fields — a multi-resource
///   configuration shape is out of scope).
pub fn validate_configs(
    configs: &[OveruseConfiguration],
    flags: ResourceOveruseFlags,
) -> Result<(), WatchdogError> {
    if flags.is_empty() {
        return Err(WatchdogError::InvalidArgument("no resource flags set".to_string()));
    }

    let mut seen = HashSet::new();
    for cfg in configs {
        if !matches!(
            cfg.component_type,
            ComponentType::System | ComponentType::Vendor | ComponentType::ThirdParty
        ) {
            return Err(WatchdogError::InvalidArgument(format!(
                "unsupported componentType {:?}",
                cfg.component_type
            )));
        }
        if !seen.insert(cfg.component_type) {
            return Err(WatchdogError::InvalidArgument(format!(
                "duplicate componentType {:?} in configuration batch",
                cfg.component_type
            )));
        }
        if flags.contains(ResourceOveruseFlags::IO) && cfg.alert_thresholds.is_empty() && cfg.component_level_threshold.any_state_exhausted() {
            // A zeroed component-level threshold with no alert thresholds at
            // all is almost certainly a missing I/O configuration rather than
            // an intentional "kill immediately" policy.
            return Err(WatchdogError::InvalidArgument(format!(
                "missing I/O overuse configuration for componentType {:?}",
                cfg.component_type
            )));
        }
    }
    Ok(())
}
