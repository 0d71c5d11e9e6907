//! The binding registry: durable (parent, qualifier) → concrete mappings.

use crate::error::InjectError;
use crate::key::{extract, Instance, ServiceKey};
use crate::qualifier::Qualifier;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fnv::FnvHashMap;
use std::any::TypeId;
use std::sync::Arc;

///////////////////////////////////////////////////////////////////////////////
// Bindings
///////////////////////////////////////////////////////////////////////////////

/// Converts a concrete instance into a handle of the parent type.
///
/// Captured at registration time, when both types are statically known.
pub(crate) type UpcastFn = Arc<dyn Fn(&Instance) -> Option<Instance> + Send + Sync>;

/// A registered mapping to a concrete, constructible type.
#[derive(Clone)]
pub(crate) struct Binding {
    pub concrete: ServiceKey,
    pub upcast: UpcastFn,
}

impl Binding {
    /// Builds a binding from parent `P` to concrete `T`.
    ///
    /// `upcast` is a plain coercion, `|concrete| concrete`, checked by the
    /// compiler against `P` at the registration call site.
    pub fn new<P, T>(upcast: fn(Arc<T>) -> Arc<P>) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let erased: UpcastFn = Arc::new(move |instance| {
            let concrete = extract::<T>(instance)?;
            Some(crate::key::erase(upcast(concrete)))
        });
        Self {
            concrete: ServiceKey::of::<T>(),
            upcast: erased,
        }
    }
}

///////////////////////////////////////////////////////////////////////////////
// Registry
///////////////////////////////////////////////////////////////////////////////

/// Durable mapping from (parent type, qualifier) to concrete type, plus the
/// bare mapping used by unqualified singleton registrations.
///
/// Entries are created during bootstrap and never mutated; duplicate
/// registration is a configuration error.
#[derive(Default)]
pub(crate) struct BindingRegistry {
    /// parent → qualifier → binding
    qualified: DashMap<TypeId, FnvHashMap<Qualifier, Binding>>,
    /// parent → binding, for unqualified singleton registrations
    bare: DashMap<TypeId, Binding>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `binding` for (`parent`, `qualifier`).
    pub fn register_qualified(
        &self,
        parent: ServiceKey,
        qualifier: Qualifier,
        binding: Binding,
    ) -> Result<(), InjectError> {
        let mut entry = self.qualified.entry(parent.id()).or_default();
        if entry.contains_key(&qualifier) {
            return Err(InjectError::Configuration(format!(
                "duplicate binding for `{parent}` with qualifier {qualifier}"
            )));
        }
        entry.insert(qualifier, binding);
        Ok(())
    }

    /// Registers the bare `binding` for `parent`.
    pub fn register_bare(&self, parent: ServiceKey, binding: Binding) -> Result<(), InjectError> {
        match self.bare.entry(parent.id()) {
            Entry::Occupied(..) => Err(InjectError::Configuration(format!(
                "duplicate singleton registration for `{parent}`"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(binding);
                Ok(())
            }
        }
    }

    /// Returns all qualified bindings of `parent`, possibly empty.
    pub fn qualified_of(&self, parent: ServiceKey) -> FnvHashMap<Qualifier, Binding> {
        self.qualified
            .get(&parent.id())
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    /// Returns the bare binding of `parent`, if any.
    pub fn bare_of(&self, parent: ServiceKey) -> Option<Binding> {
        self.bare.get(&parent.id()).map(|entry| entry.clone())
    }

    /// True if `concrete` was registered through the bare map, which marks
    /// it singleton-scoped even without a descriptor flag.
    pub fn is_bare_singleton(&self, concrete: ServiceKey) -> bool {
        self.bare
            .get(&concrete.id())
            .map(|entry| entry.concrete == concrete)
            .unwrap_or(false)
    }
}

///////////////////////////////////////////////////////////////////////////////
// Tests
///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::erase;

    trait Animal: Send + Sync {
        fn noise(&self) -> &'static str;
    }

    struct Dog;
    impl Animal for Dog {
        fn noise(&self) -> &'static str {
            "woof"
        }
    }

    #[test]
    fn duplicate_qualified_binding_rejected() {
        let registry = BindingRegistry::new();
        let parent = ServiceKey::of::<dyn Animal>();

        registry
            .register_qualified(parent, "dog".into(), Binding::new::<dyn Animal, Dog>(|d| d))
            .unwrap();
        let again =
            registry.register_qualified(parent, "dog".into(), Binding::new::<dyn Animal, Dog>(|d| d));
        assert!(matches!(again, Err(InjectError::Configuration(..))));

        // A different qualifier for the same parent is fine.
        registry
            .register_qualified(parent, "hound".into(), Binding::new::<dyn Animal, Dog>(|d| d))
            .unwrap();
        assert_eq!(registry.qualified_of(parent).len(), 2);
    }

    #[test]
    fn duplicate_bare_binding_rejected() {
        let registry = BindingRegistry::new();
        let parent = ServiceKey::of::<Dog>();

        registry
            .register_bare(parent, Binding::new::<Dog, Dog>(|d| d))
            .unwrap();
        assert!(registry.register_bare(parent, Binding::new::<Dog, Dog>(|d| d)).is_err());
        assert!(registry.is_bare_singleton(parent));
    }

    #[test]
    fn upcast_produces_parent_handle() {
        let binding = Binding::new::<dyn Animal, Dog>(|d| d);
        let concrete = erase(Arc::new(Dog));
        let parent = (binding.upcast)(&concrete).unwrap();
        let animal = extract::<dyn Animal>(&parent).unwrap();
        assert_eq!(animal.noise(), "woof");
    }

    #[test]
    fn lookup_on_unknown_parent_is_empty() {
        let registry = BindingRegistry::new();
        assert!(registry.qualified_of(ServiceKey::of::<dyn Animal>()).is_empty());
        assert!(registry.bare_of(ServiceKey::of::<Dog>()).is_none());
    }
}
