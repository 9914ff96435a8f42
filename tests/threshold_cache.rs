//! Scenario coverage for the threshold configuration cache (C1) that spans
//! multiple public methods per scenario, complementing the inline unit
//! tests in `threshold_cache.rs`.

use io_watchdog::threshold_cache::ThresholdConfigurationCache;
use io_watchdog::types::{ApplicationCategory, ComponentType, OveruseConfiguration, PerStateBytes};

fn vendor_config() -> OveruseConfiguration {
    let mut cfg = OveruseConfiguration::new(
        ComponentType::Vendor,
        PerStateBytes::new(1_000, 500, 200),
    );
    cfg.vendor_package_prefixes.push("com.vendor.".to_string());
    cfg.package_to_category
        .insert("com.vendor.nav".to_string(), ApplicationCategory::Maps);
    cfg.category_specific_thresholds
        .insert(ApplicationCategory::Maps, PerStateBytes::new(5_000, 0, 0));
    cfg.package_specific_thresholds
        .insert("com.vendor.special".to_string(), PerStateBytes::new(9_999, 0, 0));
    cfg.safe_to_kill_packages.insert("com.vendor.nav".to_string());
    cfg
}

fn system_config() -> OveruseConfiguration {
    let mut cfg = OveruseConfiguration::new(
        ComponentType::System,
        PerStateBytes::new(2_000, 1_000, 0),
    );
    cfg.safe_to_kill_packages.insert("com.android.shared".to_string());
    cfg
}

#[test]
fn threshold_resolution_prefers_package_then_category_then_component() {
    let cache = ThresholdConfigurationCache::new();
    cache.set(vec![vendor_config()]);

    assert_eq!(
        cache.fetch_threshold("com.vendor.special", ComponentType::Vendor),
        PerStateBytes::new(9_999, 0, 0)
    );
    assert_eq!(
        cache.fetch_threshold("com.vendor.nav", ComponentType::Vendor),
        PerStateBytes::new(5_000, 0, 0)
    );
    assert_eq!(
        cache.fetch_threshold("com.vendor.unknown", ComponentType::Vendor),
        PerStateBytes::new(1_000, 500, 200)
    );
}

#[test]
fn third_party_is_always_safe_to_kill_regardless_of_configuration() {
    let cache = ThresholdConfigurationCache::new();
    cache.set(vec![vendor_config(), system_config()]);
    assert!(cache.is_safe_to_kill("com.example.anything", ComponentType::ThirdParty, &[]));
}

#[test]
fn vendor_inherits_system_safe_to_kill_set() {
    let cache = ThresholdConfigurationCache::new();
    cache.set(vec![vendor_config(), system_config()]);

    assert!(cache.is_safe_to_kill("com.vendor.nav", ComponentType::Vendor, &[]));
    assert!(cache.is_safe_to_kill("com.android.shared", ComponentType::Vendor, &[]));
    assert!(!cache.is_safe_to_kill("com.vendor.unlisted", ComponentType::Vendor, &[]));
}

#[test]
fn shared_uid_membership_extends_safe_to_kill_lookup() {
    let cache = ThresholdConfigurationCache::new();
    cache.set(vec![system_config()]);

    let shared = vec!["com.android.shared".to_string()];
    assert!(cache.is_safe_to_kill("com.android.primary", ComponentType::System, &shared));
    assert!(!cache.is_safe_to_kill("com.android.primary", ComponentType::System, &[]));
}

#[test]
fn unknown_component_is_never_safe_to_kill() {
    let cache = ThresholdConfigurationCache::new();
    assert!(!cache.is_safe_to_kill("anything", ComponentType::Unknown, &[]));
}

#[test]
fn full_replace_clears_stale_entries() {
    let cache = ThresholdConfigurationCache::new();
    cache.set(vec![vendor_config()]);
    assert_eq!(cache.configured_component_types(), vec![ComponentType::Vendor]);

    cache.set(vec![system_config()]);
    assert_eq!(cache.configured_component_types(), vec![ComponentType::System]);
    assert_eq!(
        cache.fetch_threshold("com.vendor.special", ComponentType::Vendor),
        PerStateBytes::DEFAULT_THRESHOLD
    );
}

#[test]
fn vendor_prefixes_and_category_lookups_round_trip() {
    let cache = ThresholdConfigurationCache::new();
    cache.set(vec![vendor_config()]);

    assert_eq!(cache.vendor_prefixes(), vec!["com.vendor.".to_string()]);
    assert_eq!(
        cache.category_for_package("com.vendor.nav"),
        Some(ApplicationCategory::Maps)
    );
    assert_eq!(cache.category_for_package("com.vendor.unlisted"), None);
}
