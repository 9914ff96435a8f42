//! Threshold/safe-to-kill configuration, as pushed by `setResourceOveruseConfigurations`.

use super::package::{ApplicationCategory, ComponentType, PerStateBytes};
use std::collections::{HashMap, HashSet};

/// Rate-based system-wide alert threshold: if a package sustains writes at
/// or above `bytes_per_second` for `duration_in_seconds`, an alert fires.
/// Purely advisory; not part of the kill decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoOveruseAlertThreshold {
    pub duration_in_seconds: u64,
    pub bytes_per_second: u64,
}

/// Flags accepted by `setResourceOveruseConfigurations` /
/// `getResourceOveruseConfigurations`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceOveruseFlags(u32);

impl ResourceOveruseFlags {
    pub const IO: ResourceOveruseFlags = ResourceOveruseFlags(1 << 0);

    pub fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub fn contains(self, other: ResourceOveruseFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for ResourceOveruseFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        ResourceOveruseFlags(self.0 | rhs.0)
    }
}

/// One componentType's full overuse configuration record: write-byte
/// thresholds, the safe-to-kill set, and vendor-only category/prefix maps.
#[derive(Debug, Clone)]
pub struct OveruseConfiguration {
    pub component_type: ComponentType,
    pub safe_to_kill_packages: HashSet<String>,
    /// Vendor-only: package name prefixes classified as Vendor even when
    /// flagged System/Product/SystemExt.
    pub vendor_package_prefixes: Vec<String>,
    /// Vendor-only: package name to app-category assignment.
    pub package_to_category: HashMap<String, ApplicationCategory>,
    pub component_level_threshold: PerStateBytes,
    pub package_specific_thresholds: HashMap<String, PerStateBytes>,
    pub category_specific_thresholds: HashMap<ApplicationCategory, PerStateBytes>,
    pub alert_thresholds: Vec<IoOveruseAlertThreshold>,
}

impl OveruseConfiguration {
    pub fn new(component_type: ComponentType, component_level_threshold: PerStateBytes) -> Self {
        Self {
            component_type,
            safe_to_kill_packages: HashSet::new(),
            vendor_package_prefixes: Vec::new(),
            package_to_category: HashMap::new(),
            component_level_threshold,
            package_specific_thresholds: HashMap::new(),
            category_specific_thresholds: HashMap::new(),
            alert_thresholds: Vec::new(),
        }
    }
}
