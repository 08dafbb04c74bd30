//! Model synchronization.
//!
//! The [`Synchronizer`] is the only writer of the shared [`PoolModel`]. It
//! turns incoming object lists into model updates and reports what changed:
//!
//! 1. pairs the device echoed back as `key == value` (undefined attributes)
//!    are dropped
//! 2. values are normalized by the [`AttributePolicy`]
//! 3. each remaining pair is compared with the model; equal values are
//!    suppressed
//! 4. one [`ClientEvent::AttributesChanged`] is produced per object per
//!    message, with every changed attribute name
//!
//! It also owns the subscription set and splits it into request batches.

// ============================================================================
// Imports
// ============================================================================

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::events::ClientEvent;
use crate::protocol::{Command, ObjectParams, ObjectQuery};

use super::policy::AttributePolicy;
use super::pool::PoolModel;

// ============================================================================
// Types
// ============================================================================

/// One subscribed `(object, attribute)` pair.
pub type Subscription = (String, String);

// ============================================================================
// Synchronizer
// ============================================================================

/// Applies device data to the model and tracks subscriptions.
#[derive(Debug)]
pub struct Synchronizer {
    model: Arc<RwLock<PoolModel>>,
    policy: AttributePolicy,
    subscriptions: BTreeSet<Subscription>,
    batch_size: usize,
}

impl Synchronizer {
    /// Creates a synchronizer writing into `model`.
    ///
    /// A `batch_size` of zero is treated as one.
    #[must_use]
    pub fn new(model: Arc<RwLock<PoolModel>>, policy: AttributePolicy, batch_size: usize) -> Self {
        Self {
            model,
            policy,
            subscriptions: BTreeSet::new(),
            batch_size: batch_size.max(1),
        }
    }

    /// Shared handle to the model.
    #[inline]
    #[must_use]
    pub fn model(&self) -> &Arc<RwLock<PoolModel>> {
        &self.model
    }

    /// Every pair currently subscribed.
    #[inline]
    #[must_use]
    pub fn subscriptions(&self) -> &BTreeSet<Subscription> {
        &self.subscriptions
    }

    /// Adds pairs to the subscription set.
    ///
    /// Returns the pairs that were not already subscribed, in order.
    pub fn subscribe<I>(&mut self, pairs: I) -> Vec<Subscription>
    where
        I: IntoIterator<Item = Subscription>,
    {
        pairs
            .into_iter()
            .filter(|pair| self.subscriptions.insert(pair.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Subscription requests covering the whole set, for a fresh connection.
    #[must_use]
    pub fn resubscribe_commands(&self) -> Vec<Command> {
        self.batch_commands(&self.subscriptions.iter().cloned().collect::<Vec<_>>())
    }

    /// Subscription requests for `pairs`, at most `batch_size` pairs each.
    #[must_use]
    pub fn batch_commands(&self, pairs: &[Subscription]) -> Vec<Command> {
        pairs
            .chunks(self.batch_size)
            .map(|chunk| Command::request_param_list(group_by_object(chunk)))
            .collect()
    }

    /// Applies object lists from one incoming message.
    ///
    /// Returns one event per object that changed, in first-seen order.
    pub fn apply(&self, updates: Vec<ObjectParams>) -> Vec<ClientEvent> {
        let mut changes: Vec<(String, BTreeSet<String>)> = Vec::new();
        let mut index: FxHashMap<String, usize> = FxHashMap::default();

        {
            let mut model = self.model.write();
            for update in updates {
                let values = self.normalize(update.params);
                if values.is_empty() {
                    continue;
                }

                let changed = model.update_object(&update.name, values);
                if changed.is_empty() {
                    continue;
                }

                match index.get(&update.name) {
                    Some(&i) => changes[i].1.extend(changed),
                    None => {
                        index.insert(update.name.clone(), changes.len());
                        changes.push((update.name, changed));
                    }
                }
            }
        }

        changes
            .into_iter()
            .map(|(object, attributes)| ClientEvent::AttributesChanged { object, attributes })
            .collect()
    }

    /// Drops undefined attributes and applies rounding rules.
    fn normalize(&self, params: BTreeMap<String, String>) -> Vec<(String, String)> {
        params
            .into_iter()
            .filter(|(key, value)| key != value)
            .map(|(key, value)| {
                let value = self.policy.normalize(&key, &value).into_owned();
                (key, value)
            })
            .collect()
    }
}

/// Groups consecutive pairs of the same object into one query entry.
fn group_by_object(pairs: &[Subscription]) -> Vec<ObjectQuery> {
    let mut queries: Vec<ObjectQuery> = Vec::new();
    for (object, attribute) in pairs {
        match queries.last_mut() {
            Some(last) if last.object == *object => last.keys.push(attribute.clone()),
            _ => queries.push(ObjectQuery::new(object.clone(), [attribute.clone()])),
        }
    }
    queries
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ParamCommand;

    fn synchronizer() -> Synchronizer {
        Synchronizer::new(
            Arc::new(RwLock::new(PoolModel::new())),
            AttributePolicy::default(),
            50,
        )
    }

    fn update(name: &str, params: &[(&str, &str)]) -> ObjectParams {
        ObjectParams::new(name, params.iter().copied())
    }

    fn changed(object: &str, attributes: &[&str]) -> ClientEvent {
        ClientEvent::AttributesChanged {
            object: object.to_string(),
            attributes: attributes.iter().map(|a| (*a).to_string()).collect(),
        }
    }

    fn pair_count(command: &Command) -> usize {
        match command {
            Command::Param(ParamCommand::RequestParamList { object_list }) => {
                object_list.iter().map(|q| q.keys.len()).sum()
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_unchanged_value_is_suppressed() {
        let sync = synchronizer();

        let first = sync.apply(vec![update("C0001", &[("STATUS", "ON")])]);
        assert_eq!(first, [changed("C0001", &["STATUS"])]);

        let second = sync.apply(vec![update("C0001", &[("STATUS", "ON")])]);
        assert!(second.is_empty());

        let third = sync.apply(vec![update("C0001", &[("STATUS", "OFF")])]);
        assert_eq!(third, [changed("C0001", &["STATUS"])]);
    }

    #[test]
    fn test_status_off_to_on() {
        let sync = synchronizer();
        sync.apply(vec![update("C0001", &[("STATUS", "OFF"), ("SNAME", "Spa")])]);

        let events = sync.apply(vec![update("C0001", &[("STATUS", "ON"), ("SNAME", "Spa")])]);
        assert_eq!(events, [changed("C0001", &["STATUS"])]);
        assert_eq!(
            sync.model().read().get("C0001").and_then(|o| o.get("STATUS")),
            Some("ON")
        );
    }

    #[test]
    fn test_one_event_per_object_per_message() {
        let sync = synchronizer();
        let events = sync.apply(vec![
            update("C0001", &[("STATUS", "ON")]),
            update("B1101", &[("TEMP", "80")]),
            update("C0001", &[("SNAME", "Spa")]),
        ]);

        assert_eq!(
            events,
            [changed("C0001", &["SNAME", "STATUS"]), changed("B1101", &["TEMP"])]
        );
    }

    #[test]
    fn test_undefined_attributes_are_pruned() {
        let sync = synchronizer();
        let events = sync.apply(vec![update("C0001", &[("SNAME", "SNAME"), ("STATUS", "ON")])]);

        assert_eq!(events, [changed("C0001", &["STATUS"])]);
        assert!(sync.model().read().get("C0001").and_then(|o| o.get("SNAME")).is_none());
    }

    #[test]
    fn test_fully_pruned_update_does_not_create_object() {
        let sync = synchronizer();
        assert!(sync.apply(vec![update("X0001", &[("SNAME", "SNAME")])]).is_empty());
        assert!(!sync.model().read().contains("X0001"));
    }

    #[test]
    fn test_rounding_suppresses_noise() {
        let sync = synchronizer();
        sync.apply(vec![update("PMP01", &[("PWR", "1201"), ("RPM", "2998")])]);

        assert!(sync.apply(vec![update("PMP01", &[("PWR", "1210"), ("RPM", "3002")])]).is_empty());

        let events = sync.apply(vec![update("PMP01", &[("PWR", "1260")])]);
        assert_eq!(events, [changed("PMP01", &["PWR"])]);
        assert_eq!(
            sync.model().read().get("PMP01").and_then(|o| o.get("PWR")),
            Some("1250")
        );
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let mut sync = synchronizer();
        let pairs = [
            ("C0001".to_string(), "STATUS".to_string()),
            ("C0001".to_string(), "SNAME".to_string()),
        ];

        assert_eq!(sync.subscribe(pairs.clone()).len(), 2);
        assert!(sync.subscribe(pairs).is_empty());
        assert_eq!(sync.subscriptions().len(), 2);
    }

    #[test]
    fn test_130_pairs_make_three_batches() {
        let mut sync = synchronizer();
        let pairs: Vec<Subscription> = (0..26)
            .flat_map(|obj| {
                ["STATUS", "SNAME", "OBJTYP", "SUBTYP", "PARENT"]
                    .into_iter()
                    .map(move |attr| (format!("C{obj:04}"), attr.to_string()))
            })
            .collect();
        assert_eq!(pairs.len(), 130);

        let added = sync.subscribe(pairs);
        let batches = sync.batch_commands(&added);
        let sizes: Vec<usize> = batches.iter().map(pair_count).collect();
        assert_eq!(sizes, [50, 50, 30]);

        let resubscribe: Vec<usize> = sync.resubscribe_commands().iter().map(pair_count).collect();
        assert_eq!(resubscribe, [50, 50, 30]);
    }

    #[test]
    fn test_batches_group_keys_by_object() {
        let mut sync = synchronizer();
        let added = sync.subscribe([
            ("C0001".to_string(), "STATUS".to_string()),
            ("C0001".to_string(), "SNAME".to_string()),
            ("B1101".to_string(), "TEMP".to_string()),
        ]);

        let batches = sync.batch_commands(&added);
        assert_eq!(batches.len(), 1);
        let Command::Param(ParamCommand::RequestParamList { object_list }) = &batches[0] else {
            panic!("expected subscription request");
        };
        assert_eq!(
            object_list,
            &[
                ObjectQuery::new("B1101", ["TEMP"]),
                ObjectQuery::new("C0001", ["SNAME", "STATUS"]),
            ]
        );
    }
}
