//! Threshold Configuration Cache (C1).
//!
//! An in-memory, copy-on-write snapshot of per-component / per-package /
//! per-app-category I/O write thresholds and safe-to-kill sets. Readers are
//! hot (`fetchThreshold` / `isSafeToKill` on every stats push); writers
//! (`set`) are rare — so the snapshot is swapped atomically behind an
//! [`arc_swap::ArcSwap`], the same lock-free pattern `arc-swap` is meant
//! for: hot-reloadable config with hot reads and rare full-replace writes.

use crate::types::{ApplicationCategory, ComponentType, OveruseConfiguration, PerStateBytes};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct ConfigSnapshot {
    by_component: HashMap<ComponentType, OveruseConfiguration>,
}

/// C1: the threshold-configuration cache.
pub struct ThresholdConfigurationCache {
    snapshot: ArcSwap<ConfigSnapshot>,
}

impl Default for ThresholdConfigurationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ThresholdConfigurationCache {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(ConfigSnapshot::default()),
        }
    }

    /// Fully replace the snapshot. After this returns, any subsequent
    /// `fetch_threshold` / `is_safe_to_kill` / `vendor_prefixes` call
    /// reflects only the new snapshot — no partial visibility.
    pub fn set(&self, configs: Vec<OveruseConfiguration>) {
        let mut by_component = HashMap::with_capacity(configs.len());
        for cfg in configs {
            by_component.insert(cfg.component_type, cfg);
        }
        self.snapshot
            .store(Arc::new(ConfigSnapshot { by_component }));
    }

    /// Resolve the write-byte threshold for `generic_package_name` under
    /// `component_type`, in precedence order: package-specific (System/Vendor
    /// only), then category-specific, then component-level, then
    /// [`PerStateBytes::DEFAULT_THRESHOLD`].
    ///
    /// The returned value is an owned copy; mutating it cannot alias into
    /// the cache.
    pub fn fetch_threshold(
        &self,
        generic_package_name: &str,
        component_type: ComponentType,
    ) -> PerStateBytes {
        let snapshot = self.snapshot.load();

        if matches!(component_type, ComponentType::System | ComponentType::Vendor) {
            if let Some(cfg) = snapshot.by_component.get(&component_type) {
                if let Some(threshold) = cfg.package_specific_thresholds.get(generic_package_name)
                {
                    return *threshold;
                }
            }
        }

        if let Some(category) = snapshot
            .by_component
            .get(&ComponentType::Vendor)
            .and_then(|vendor| vendor.package_to_category.get(generic_package_name))
        {
            if let Some(cfg) = snapshot.by_component.get(&component_type) {
                if let Some(threshold) = cfg.category_specific_thresholds.get(category) {
                    return *threshold;
                }
            }
        }

        if let Some(cfg) = snapshot.by_component.get(&component_type) {
            return cfg.component_level_threshold;
        }

        PerStateBytes::DEFAULT_THRESHOLD
    }

    /// Whether `generic_package_name` (or any member of `shared_packages`)
    /// may be killed under `component_type`'s policy.
    pub fn is_safe_to_kill(
        &self,
        generic_package_name: &str,
        component_type: ComponentType,
        shared_packages: &[String],
    ) -> bool {
        match component_type {
            ComponentType::ThirdParty => true,
            ComponentType::System => {
                let snapshot = self.snapshot.load();
                Self::in_safe_set(&snapshot.by_component, ComponentType::System, generic_package_name, shared_packages)
            }
            ComponentType::Vendor => {
                let snapshot = self.snapshot.load();
                Self::in_safe_set(&snapshot.by_component, ComponentType::Vendor, generic_package_name, shared_packages)
                    || Self::in_safe_set(&snapshot.by_component, ComponentType::System, generic_package_name, shared_packages)
            }
            ComponentType::Unknown => false,
        }
    }

    fn in_safe_set(
        by_component: &HashMap<ComponentType, OveruseConfiguration>,
        which: ComponentType,
        generic_package_name: &str,
        shared_packages: &[String],
    ) -> bool {
        let Some(cfg) = by_component.get(&which) else {
            return false;
        };
        cfg.safe_to_kill_packages.contains(generic_package_name)
            || shared_packages
                .iter()
                .any(|pkg| cfg.safe_to_kill_packages.contains(pkg))
    }

    /// Defensive copy of the vendor component's package-name prefixes.
    pub fn vendor_prefixes(&self) -> Vec<String> {
        self.snapshot
            .load()
            .by_component
            .get(&ComponentType::Vendor)
            .map(|cfg| cfg.vendor_package_prefixes.clone())
            .unwrap_or_default()
    }

    /// Pass-through accessor used by `getResourceOveruseConfigurations`
    /// (C4) to reconstruct the public config shape for a given component.
    pub fn configuration_for(&self, component_type: ComponentType) -> Option<OveruseConfiguration> {
        self.snapshot.load().by_component.get(&component_type).cloned()
    }

    pub fn configured_component_types(&self) -> Vec<ComponentType> {
        self.snapshot.load().by_component.keys().copied().collect()
    }

    /// Package→category assignment, defined only on the vendor record.
    pub fn category_for_package(&self, generic_package_name: &str) -> Option<ApplicationCategory> {
        self.snapshot
            .load()
            .by_component
            .get(&ComponentType::Vendor)
            .and_then(|cfg| cfg.package_to_category.get(generic_package_name))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn per_state(fg: u64, bg: u64, gm: u64) -> PerStateBytes {
        PerStateBytes::new(fg, bg, gm)
    }

    #[test]
    fn scenario_threshold_precedence() {
        let cache = ThresholdConfigurationCache::new();
        let mut system_cfg = OveruseConfiguration::new(ComponentType::System, per_state(100, 50, 200));
        system_cfg
            .package_specific_thresholds
            .insert("com.x".to_string(), per_state(10, 10, 10));
        cache.set(vec![system_cfg]);

        assert_eq!(
            cache.fetch_threshold("com.x", ComponentType::System),
            per_state(10, 10, 10)
        );
        assert_eq!(
            cache.fetch_threshold("com.y", ComponentType::System),
            per_state(100, 50, 200)
        );
        assert_eq!(
            cache.fetch_threshold("com.x", ComponentType::ThirdParty),
            PerStateBytes::DEFAULT_THRESHOLD
        );
    }

    #[test]
    fn category_threshold_applies_before_component_level() {
        let cache = ThresholdConfigurationCache::new();
        let mut vendor_cfg = OveruseConfiguration::new(ComponentType::Vendor, per_state(40, 40, 40));
        vendor_cfg
            .package_to_category
            .insert("com.maps".to_string(), ApplicationCategory::Maps);
        vendor_cfg
            .category_specific_thresholds
            .insert(ApplicationCategory::Maps, per_state(5, 5, 5));
        cache.set(vec![vendor_cfg]);

        assert_eq!(
            cache.fetch_threshold("com.maps", ComponentType::Vendor),
            per_state(5, 5, 5)
        );
        assert_eq!(
            cache.fetch_threshold("com.other", ComponentType::Vendor),
            per_state(40, 40, 40)
        );
    }

    #[test]
    fn isolation_of_cache_mutation() {
        let cache = ThresholdConfigurationCache::new();
        let mut system_cfg = OveruseConfiguration::new(ComponentType::System, per_state(1, 1, 1));
        system_cfg
            .package_specific_thresholds
            .insert("com.x".to_string(), per_state(10, 10, 10));
        cache.set(vec![system_cfg]);

        let mut returned = cache.fetch_threshold("com.x", ComponentType::System);
        returned.foreground_bytes = 999;

        assert_eq!(
            cache.fetch_threshold("com.x", ComponentType::System),
            per_state(10, 10, 10)
        );
    }

    #[test]
    fn is_safe_to_kill_third_party_always_true() {
        let cache = ThresholdConfigurationCache::new();
        assert!(cache.is_safe_to_kill("com.any", ComponentType::ThirdParty, &[]));
    }

    #[test]
    fn is_safe_to_kill_vendor_checks_both_sets() {
        let cache = ThresholdConfigurationCache::new();
        let mut system_cfg = OveruseConfiguration::new(ComponentType::System, PerStateBytes::ZERO);
        system_cfg.safe_to_kill_packages.insert("com.sys".to_string());
        let vendor_cfg = OveruseConfiguration::new(ComponentType::Vendor, PerStateBytes::ZERO);
        cache.set(vec![system_cfg, vendor_cfg]);

        // Shared-uid vendor attribution hiding a system member.
        assert!(cache.is_safe_to_kill(
            "shared:1000",
            ComponentType::Vendor,
            &["com.sys".to_string()]
        ));
        assert!(!cache.is_safe_to_kill("shared:1000", ComponentType::Vendor, &["com.other".to_string()]));
    }

    #[test]
    fn set_fully_replaces_snapshot() {
        let cache = ThresholdConfigurationCache::new();
        cache.set(vec![OveruseConfiguration::new(
            ComponentType::System,
            per_state(1, 1, 1),
        )]);
        cache.set(vec![OveruseConfiguration::new(
            ComponentType::Vendor,
            per_state(2, 2, 2),
        )]);

        // The System record from the first `set` must not leak through.
        assert_eq!(
            cache.fetch_threshold("com.x", ComponentType::System),
            PerStateBytes::DEFAULT_THRESHOLD
        );
        assert_eq!(
            cache.fetch_threshold("com.x", ComponentType::Vendor),
            per_state(2, 2, 2)
        );
    }
}
