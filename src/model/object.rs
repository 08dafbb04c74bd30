//! A single object in the controller's configuration.

// ============================================================================
// Imports
// ============================================================================

use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Constants
// ============================================================================

/// Attribute holding the object type.
pub const OBJTYP: &str = "OBJTYP";

/// Attribute holding the object subtype.
pub const SUBTYP: &str = "SUBTYP";

/// Attribute holding the user-visible name.
pub const SNAME: &str = "SNAME";

/// Attribute holding the parent object name.
pub const PARENT: &str = "PARENT";

/// Attribute holding the on/off status.
pub const STATUS: &str = "STATUS";

// ============================================================================
// PoolObject
// ============================================================================

/// Mirror of one remote object: circuit, body, pump, heater, sensor...
///
/// Attribute values are kept as the strings the device sent, after the
/// attribute policy has normalized them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolObject {
    name: String,
    attributes: BTreeMap<String, String>,
}

impl PoolObject {
    /// Creates an object with no attributes.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Object name (`objnam`).
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type classification, once known.
    #[inline]
    #[must_use]
    pub fn object_type(&self) -> Option<&str> {
        self.get(OBJTYP)
    }

    /// Subtype classification, once known.
    #[inline]
    #[must_use]
    pub fn subtype(&self) -> Option<&str> {
        self.get(SUBTYP)
    }

    /// User-visible name.
    #[inline]
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.get(SNAME)
    }

    /// Name of the containing object.
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.get(PARENT)
    }

    /// Returns `true` if `STATUS` is `ON`.
    #[inline]
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.get(STATUS) == Some("ON")
    }

    /// Gets one attribute value.
    #[inline]
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.attributes.get(attribute).map(String::as_str)
    }

    /// All known attributes.
    #[inline]
    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Applies new values and returns the names of the attributes that
    /// actually changed.
    pub fn update<I>(&mut self, values: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut changed = BTreeSet::new();
        for (key, value) in values {
            if self.attributes.get(&key) == Some(&value) {
                continue;
            }
            self.attributes.insert(key.clone(), value);
            changed.insert(key);
        }
        changed
    }
}

// ============================================================================
// Tests
// ============================================================================
