//! Controller identity.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::hash::Hasher;

use rustc_hash::FxHasher;

// ============================================================================
// Constants
// ============================================================================

const PROPNAME: &str = "PROPNAME";
const VER: &str = "VER";
const MODE: &str = "MODE";
const SNAME: &str = "SNAME";

/// `MODE` value of a controller configured for metric units.
const METRIC: &str = "METRIC";

// ============================================================================
// SystemInfo
// ============================================================================

/// Identity of the connected controller, read from the system object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SystemInfo {
    property_name: String,
    software_version: String,
    uses_metric: bool,
    unique_id: String,
}

impl SystemInfo {
    /// Builds the identity from the system object's attributes.
    #[must_use]
    pub fn from_attributes(attributes: &BTreeMap<String, String>) -> Self {
        let mut info = Self::default();
        info.update(attributes);
        info
    }

    /// Refreshes fields whose attributes are present in `attributes`.
    ///
    /// Returns `true` if anything changed.
    pub fn update(&mut self, attributes: &BTreeMap<String, String>) -> bool {
        let before = self.clone();

        if let Some(name) = attributes.get(PROPNAME) {
            self.property_name.clone_from(name);
        }
        if let Some(version) = attributes.get(VER) {
            self.software_version.clone_from(version);
        }
        if let Some(mode) = attributes.get(MODE) {
            self.uses_metric = mode == METRIC;
        }
        if let Some(sname) = attributes.get(SNAME) {
            self.unique_id = unique_id_for(sname);
        }

        *self != before
    }

    /// Installation name (`PROPNAME`).
    #[inline]
    #[must_use]
    pub fn property_name(&self) -> &str {
        &self.property_name
    }

    /// Firmware version (`VER`).
    #[inline]
    #[must_use]
    pub fn software_version(&self) -> &str {
        &self.software_version
    }

    /// Returns `true` if the controller reports metric units.
    #[inline]
    #[must_use]
    pub fn uses_metric(&self) -> bool {
        self.uses_metric
    }

    /// Stable 16-hex-digit identifier derived from the system name.
    #[inline]
    #[must_use]
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }
}

/// Hashes the system name into a fixed-width identifier.
fn unique_id_for(sname: &str) -> String {
    let mut hasher = FxHasher::default();
    hasher.write(sname.as_bytes());
    format!("{:016x}", hasher.finish())
}

// ============================================================================
// Tests
// ============================================================================
