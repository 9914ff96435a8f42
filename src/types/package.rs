//! Package identity, component classification, and per-state byte counters.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Policy class of a package, derived from installation flags and shared-uid
/// membership. See the package classifier (C2) for how this is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentType {
    System,
    Vendor,
    ThirdParty,
    Unknown,
}

impl ComponentType {
    /// Lower values are more restrictive; used to collapse a shared uid's
    /// member component types to the single most restrictive one.
    fn restrictiveness_rank(self) -> u8 {
        match self {
            ComponentType::Vendor => 0,
            ComponentType::System => 1,
            ComponentType::ThirdParty => 2,
            ComponentType::Unknown => 3,
        }
    }

    /// Collapse an iterator of member component types to the most
    /// restrictive one (Vendor > System > ThirdParty > Unknown).
    pub fn most_restrictive<I: IntoIterator<Item = ComponentType>>(types: I) -> ComponentType {
        types
            .into_iter()
            .min_by_key(|t| t.restrictiveness_rank())
            .unwrap_or(ComponentType::ThirdParty)
    }
}

/// App category used for category-level threshold overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationCategory {
    Maps,
    Media,
}

/// Whether a package may be terminated on resource overuse.
///
/// `Never` is daemon-enforced and sticky: it is set exclusively from a
/// `killableOnOveruse = false` push and cleared only when the daemon later
/// reports the package safe-to-kill again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KillableState {
    Yes,
    No,
    Never,
}

/// Non-negative per-power-state write-byte counts. Used for thresholds,
/// written totals, remaining budgets, and forgiven bytes.
///
/// All returned instances are owned `Copy` values — mutating one never
/// affects any cache or store-held value (the "isolation of cache mutation"
/// invariant holds automatically).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerStateBytes {
    pub foreground_bytes: u64,
    pub background_bytes: u64,
    pub garage_mode_bytes: u64,
}

impl PerStateBytes {
    pub const ZERO: PerStateBytes = PerStateBytes {
        foreground_bytes: 0,
        background_bytes: 0,
        garage_mode_bytes: 0,
    };

    /// Sentinel returned by the threshold cache when no rule matches.
    pub const DEFAULT_THRESHOLD: PerStateBytes = PerStateBytes {
        foreground_bytes: u64::MAX,
        background_bytes: u64::MAX,
        garage_mode_bytes: u64::MAX,
    };

    pub fn new(foreground_bytes: u64, background_bytes: u64, garage_mode_bytes: u64) -> Self {
        Self {
            foreground_bytes,
            background_bytes,
            garage_mode_bytes,
        }
    }

    /// Component-wise saturating add; sums clamp at `u64::MAX`.
    pub fn saturating_add(&self, other: &PerStateBytes) -> PerStateBytes {
        PerStateBytes {
            foreground_bytes: self.foreground_bytes.saturating_add(other.foreground_bytes),
            background_bytes: self.background_bytes.saturating_add(other.background_bytes),
            garage_mode_bytes: self
                .garage_mode_bytes
                .saturating_add(other.garage_mode_bytes),
        }
    }

    /// True if any of the three states is exactly zero — the "remaining
    /// budget fully exhausted" condition that triggers overuse handling.
    pub fn any_state_exhausted(&self) -> bool {
        self.foreground_bytes == 0 || self.background_bytes == 0 || self.garage_mode_bytes == 0
    }
}

impl Default for PerStateBytes {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Uniquely identifies a `UserPackage`: (userId, genericPackageName).
///
/// `generic_package_name` is either the installed package's real name or the
/// synthetic string `shared:<appId>` when multiple packages share a uid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserPackageKey {
    pub user_id: i32,
    pub generic_package_name: String,
}

impl UserPackageKey {
    pub fn new(user_id: i32, generic_package_name: impl Into<String>) -> Self {
        Self {
            user_id,
            generic_package_name: generic_package_name.into(),
        }
    }

    /// Composite map key used by the overuse engine's in-memory usage map:
    /// `"userId:genericPackageName"`.
    pub fn composite_key(&self) -> String {
        format!("{}:{}", self.user_id, self.generic_package_name)
    }
}

/// Raw installer flags for a single installed package, as reported by the
/// external package-info source. The classifier (C2) reduces these to a
/// [`ComponentType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFlags {
    pub package_name: String,
    pub is_private_oem: bool,
    pub is_private_vendor: bool,
    pub is_private_odm: bool,
    pub is_public_system: bool,
    pub is_public_updated_system: bool,
    pub is_private_product: bool,
    pub is_private_system_ext: bool,
}

impl PackageFlags {
    pub fn third_party(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            is_private_oem: false,
            is_private_vendor: false,
            is_private_odm: false,
            is_public_system: false,
            is_public_updated_system: false,
            is_private_product: false,
            is_private_system_ext: false,
        }
    }
}

/// Result of an external package-info lookup for one uid: the generic
/// package name to use as a storage key, plus the flags of every package
/// sharing that uid (a single-element list for non-shared uids).
#[derive(Debug, Clone)]
pub struct PackageRecord {
    pub generic_package_name: String,
    pub members: Vec<PackageFlags>,
}

impl PackageRecord {
    pub fn member_names(&self) -> Vec<String> {
        self.members.iter().map(|m| m.package_name.clone()).collect()
    }
}

/// The process-wide set of packages that default to `KillableState::No`
/// unless explicitly toggled by the user. Populated at startup from store
/// rows with `KillableState::No` and kept live by `setKillablePackageAsUser`'s
/// "all users" path.
pub type DefaultNotKillableSet = HashSet<String>;
