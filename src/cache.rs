//! Instance caches: lazily populated, at most one retained value per key.

use crate::error::InjectError;
use crate::key::{Instance, ServiceKey};
use crate::qualifier::Qualifier;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::any::TypeId;

/// The singleton cache (type → instance) and the qualified-instance cache
/// ((type, qualifier) → instance).
///
/// All publications use atomic insert-if-absent: under a race two builders
/// may both construct, but only one value is ever retained for lookups. The
/// guards of the underlying maps are never held across recursive resolution.
#[derive(Default)]
pub(crate) struct InstanceCaches {
    singletons: DashMap<TypeId, Instance>,
    qualified: DashMap<(TypeId, Qualifier), Instance>,
}

impl InstanceCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Singleton cache lookup.
    pub fn singleton(&self, key: ServiceKey) -> Option<Instance> {
        self.singletons.get(&key.id()).map(|entry| entry.clone())
    }

    /// Qualified-instance cache lookup.
    pub fn qualified(&self, key: ServiceKey, qualifier: &Qualifier) -> Option<Instance> {
        self.qualified
            .get(&(key.id(), qualifier.clone()))
            .map(|entry| entry.clone())
    }

    /// Inserts a pre-built singleton, failing on duplicates.
    pub fn put(&self, key: ServiceKey, instance: Instance) -> Result<(), InjectError> {
        match self.singletons.entry(key.id()) {
            Entry::Occupied(..) => Err(InjectError::Configuration(format!(
                "duplicate singleton instance for `{key}`"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(instance);
                Ok(())
            }
        }
    }

    /// Inserts a pre-built qualified instance, failing on duplicates.
    pub fn put_qualified(
        &self,
        key: ServiceKey,
        qualifier: Qualifier,
        instance: Instance,
    ) -> Result<(), InjectError> {
        match self.qualified.entry((key.id(), qualifier.clone())) {
            Entry::Occupied(..) => Err(InjectError::Configuration(format!(
                "duplicate qualified instance for `{key}` with qualifier {qualifier}"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(instance);
                Ok(())
            }
        }
    }

    /// Publishes a freshly built singleton; returns the retained value,
    /// which is the existing one if another builder won the race.
    pub fn publish(&self, key: ServiceKey, instance: Instance) -> Instance {
        self.singletons
            .entry(key.id())
            .or_insert(instance)
            .clone()
    }

    /// Publishes a freshly built qualified instance; returns the retained
    /// value.
    pub fn publish_qualified(
        &self,
        key: ServiceKey,
        qualifier: Qualifier,
        instance: Instance,
    ) -> Instance {
        self.qualified
            .entry((key.id(), qualifier))
            .or_insert(instance)
            .clone()
    }

    /// Number of cached singletons.
    #[cfg(test)]
    pub fn singleton_count(&self) -> usize {
        self.singletons.len()
    }
}

///////////////////////////////////////////////////////////////////////////////
// Tests
///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::erase;
    use std::sync::Arc;

    #[test]
    fn put_rejects_duplicates() {
        let caches = InstanceCaches::new();
        let key = ServiceKey::of::<u32>();

        caches.put(key, erase(Arc::new(1u32))).unwrap();
        assert!(caches.put(key, erase(Arc::new(2u32))).is_err());
        assert_eq!(caches.singleton_count(), 1);
    }

    #[test]
    fn publish_retains_first_value() {
        let caches = InstanceCaches::new();
        let key = ServiceKey::of::<u32>();

        let first = erase(Arc::new(1u32));
        let retained = caches.publish(key, first.clone());
        assert!(Arc::ptr_eq(&retained, &first));

        // The loser of a publish race is discarded.
        let second = erase(Arc::new(2u32));
        let retained = caches.publish(key, second);
        assert!(Arc::ptr_eq(&retained, &first));
    }

    #[test]
    fn qualified_entries_are_keyed_by_tag() {
        let caches = InstanceCaches::new();
        let key = ServiceKey::of::<u32>();

        caches
            .put_qualified(key, "a".into(), erase(Arc::new(1u32)))
            .unwrap();
        assert!(caches.qualified(key, &"a".into()).is_some());
        assert!(caches.qualified(key, &"b".into()).is_none());
        assert!(caches.singleton(key).is_none());

        let again = caches.put_qualified(key, "a".into(), erase(Arc::new(3u32)));
        assert!(again.is_err());
    }
}
