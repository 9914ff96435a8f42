//! Package Classifier (C2).
//!
//! Resolves a numeric uid to a generic package name, a [`ComponentType`],
//! and the set of packages sharing that uid. Consults an external
//! application-info source ([`PackageInfoProvider`] — the package-manager
//! collaborator stays out of scope, modeled here as a trait boundary) and
//! caches uid→genericPackageName resolutions for the lifetime of a boot.

use crate::types::{ComponentType, PackageFlags, PackageRecord};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("no package info for uid {0}")]
    NotFound(i32),
}

/// External collaborator: the platform package manager, modeled as an
/// opaque lookup interface.
pub trait PackageInfoProvider: Send + Sync {
    /// Look up every package sharing `uid`. Returns `None` when the uid is
    /// unknown to the package manager (classifier maps this to
    /// `ComponentType::Unknown`).
    fn lookup(&self, uid: i32) -> Option<PackageRecord>;
}

impl PackageInfoProvider for Box<dyn PackageInfoProvider> {
    fn lookup(&self, uid: i32) -> Option<PackageRecord> {
        (**self).lookup(uid)
    }
}

/// An in-memory [`PackageInfoProvider`] for tests and local bring-up.
#[derive(Default)]
pub struct StaticPackageInfoProvider {
    records: HashMap<i32, PackageRecord>,
}

impl StaticPackageInfoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, uid: i32, record: PackageRecord) -> &mut Self {
        self.records.insert(uid, record);
        self
    }
}

impl PackageInfoProvider for StaticPackageInfoProvider {
    fn lookup(&self, uid: i32) -> Option<PackageRecord> {
        self.records.get(&uid).cloned()
    }
}

/// C2: the package classifier.
pub struct PackageClassifier<P: PackageInfoProvider> {
    provider: P,
    uid_cache: Mutex<HashMap<i32, String>>,
}

/// Result of classifying one uid.
pub struct Classification {
    pub component_type: ComponentType,
    pub generic_package_name: String,
    pub member_packages: Vec<String>,
}

impl<P: PackageInfoProvider> PackageClassifier<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            uid_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve uid → genericPackageName, consulting the first-miss cache
    /// before falling back to the package-info provider. Cache entries are
    /// filled on first miss and never evicted during a boot.
    pub fn resolve_generic_package_name(&self, uid: i32) -> Option<String> {
        if let Some(cached) = self.uid_cache.lock().expect("lock").get(&uid) {
            return Some(cached.clone());
        }
        let record = self.provider.lookup(uid)?;
        self.uid_cache
            .lock()
            .expect("lock")
            .insert(uid, record.generic_package_name.clone());
        Some(record.generic_package_name)
    }

    /// Resolve every uid in `uids` that the package-info provider knows
    /// about, dropping unknown ones rather than failing the whole batch.
    pub fn lookup_many(&self, uids: &[i32]) -> Vec<(i32, PackageRecord)> {
        uids.iter()
            .filter_map(|&uid| self.provider.lookup(uid).map(|record| (uid, record)))
            .collect()
    }

    /// Full classification: componentType, genericPackageName, and the
    /// uid's shared-package membership.
    pub fn component_type(
        &self,
        uid: i32,
        vendor_prefixes: &[String],
    ) -> Result<Classification, ClassifierError> {
        let record = self
            .provider
            .lookup(uid)
            .ok_or(ClassifierError::NotFound(uid))?;

        self.uid_cache
            .lock()
            .expect("lock")
            .entry(uid)
            .or_insert_with(|| record.generic_package_name.clone());

        let component_type = ComponentType::most_restrictive(
            record
                .members
                .iter()
                .map(|flags| classify_flags(flags, vendor_prefixes)),
        );

        Ok(Classification {
            component_type,
            generic_package_name: record.generic_package_name,
            member_packages: record.member_names(),
        })
    }
}

/// Per-user uid range, matching the platform's own uid-partitioning scheme:
/// `uid = userId * PER_USER_RANGE + appId`. Used to recover the owning user
/// from a daemon-reported uid without a second external lookup.
pub const PER_USER_RANGE: i32 = 100_000;

pub fn user_id_for_uid(uid: i32) -> i32 {
    uid / PER_USER_RANGE
}

pub fn app_id_for_uid(uid: i32) -> i32 {
    uid % PER_USER_RANGE
}

/// Classify a single package's installer flags, first-match-wins:
/// 1. Private {OEM, VENDOR, ODM} → Vendor.
/// 2. Public System/Updated-System, or private Product/SystemExt → check
///    vendor prefixes; a match → Vendor, else System.
/// 3. Anything else → ThirdParty.
fn classify_flags(flags: &PackageFlags, vendor_prefixes: &[String]) -> ComponentType {
    if flags.is_private_oem || flags.is_private_vendor || flags.is_private_odm {
        return ComponentType::Vendor;
    }

    if flags.is_public_system
        || flags.is_public_updated_system
        || flags.is_private_product
        || flags.is_private_system_ext
    {
        return if vendor_prefixes
            .iter()
            .any(|prefix| flags.package_name.starts_with(prefix.as_str()))
        {
            ComponentType::Vendor
        } else {
            ComponentType::System
        };
    }

    ComponentType::ThirdParty
}
