//! The local mirror of every known object.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::protocol::command::SYSTEM_OBJECT;

use super::object::PoolObject;
use super::system::SystemInfo;

// ============================================================================
// PoolModel
// ============================================================================

/// Object name to object, plus the controller identity.
///
/// Entries survive reconnects; they are refreshed by the queries issued on
/// every new connection.
#[derive(Debug, Clone, Default)]
pub struct PoolModel {
    objects: FxHashMap<String, PoolObject>,
    system: Option<SystemInfo>,
}

impl PoolModel {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an object.
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PoolObject> {
        self.objects.get(name)
    }

    /// Returns `true` if the object is known.
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    /// Number of known objects.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if no object is known.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterates over all objects in no particular order.
    pub fn objects(&self) -> impl Iterator<Item = &PoolObject> {
        self.objects.values()
    }

    /// Objects of the given type, sorted by name.
    #[must_use]
    pub fn objects_of_type(&self, object_type: &str) -> Vec<&PoolObject> {
        let mut found: Vec<_> = self
            .objects
            .values()
            .filter(|obj| obj.object_type() == Some(object_type))
            .collect();
        found.sort_by(|a, b| a.name().cmp(b.name()));
        found
    }

    /// Controller identity, once the system object has been read.
    #[inline]
    #[must_use]
    pub fn system_info(&self) -> Option<&SystemInfo> {
        self.system.as_ref()
    }

    /// Applies values to an object, creating it if needed.
    ///
    /// Returns the attributes that changed. Changes to the system object also
    /// refresh [`SystemInfo`].
    pub fn update_object<I>(&mut self, name: &str, values: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let object = self
            .objects
            .entry(name.to_string())
            .or_insert_with(|| PoolObject::new(name));
        let changed = object.update(values);

        if name == SYSTEM_OBJECT && !changed.is_empty() {
            let attributes = object.attributes();
            match &mut self.system {
                Some(info) => {
                    info.update(attributes);
                }
                None => self.system = Some(SystemInfo::from_attributes(attributes)),
            }
        }

        changed
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_unknown_object_is_created() {
        let mut model = PoolModel::new();
        let changed = model.update_object("C0001", pairs(&[("STATUS", "OFF")]));
        assert_eq!(changed.len(), 1);
        assert!(model.contains("C0001"));
        assert_eq!(model.get("C0001").and_then(|o| o.get("STATUS")), Some("OFF"));
    }

    #[test]
    fn test_objects_of_type_sorted() {
        let mut model = PoolModel::new();
        model.update_object("C0002", pairs(&[("OBJTYP", "CIRCUIT")]));
        model.update_object("B1101", pairs(&[("OBJTYP", "BODY")]));
        model.update_object("C0001", pairs(&[("OBJTYP", "CIRCUIT")]));

        let names: Vec<_> = model
            .objects_of_type("CIRCUIT")
            .into_iter()
            .map(PoolObject::name)
            .collect();
        assert_eq!(names, ["C0001", "C0002"]);
        assert_eq!(model.len(), 3);
    }

    #[test]
    fn test_system_object_refreshes_identity() {
        let mut model = PoolModel::new();
        assert!(model.system_info().is_none());

        model.update_object("INCR", pairs(&[("PROPNAME", "Backyard"), ("MODE", "ENGLISH")]));
        assert_eq!(model.system_info().map(SystemInfo::property_name), Some("Backyard"));

        model.update_object("INCR", pairs(&[("MODE", "METRIC")]));
        assert_eq!(model.system_info().map(SystemInfo::uses_metric), Some(true));
    }
}
