//! Type identity and type-erased instances.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

///////////////////////////////////////////////////////////////////////////////
// Service Key
///////////////////////////////////////////////////////////////////////////////

/// Identity of a declared service type.
///
/// Valid for any `'static` type, sized or not, so trait objects can serve
/// as abstract parent types: `ServiceKey::of::<dyn Repository>()`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    id: TypeId,
    name: &'static str,
}

impl ServiceKey {
    /// Returns the key of the type `D`.
    pub fn of<D: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<D>(),
            name: type_name::<D>(),
        }
    }

    /// The underlying `TypeId`, used as the cache/registry key.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The full type name, used in error messages and logs.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceKey({})", self.name)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

///////////////////////////////////////////////////////////////////////////////
// Erased Instances
///////////////////////////////////////////////////////////////////////////////

/// A type-erased, shared instance of a service.
///
/// The payload is always the handle `Arc<D>` of the declared type `D` the
/// instance was resolved for. The handle itself is a sized value even when
/// `D` is a trait object, which is what makes erasure uniform.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Erases a typed handle into an [`Instance`].
pub(crate) fn erase<D: ?Sized + Send + Sync + 'static>(handle: Arc<D>) -> Instance {
    Arc::new(handle)
}

/// Recovers the typed handle from an [`Instance`].
///
/// Returns `None` if the payload is not `Arc<D>`.
pub(crate) fn extract<D: ?Sized + Send + Sync + 'static>(instance: &Instance) -> Option<Arc<D>> {
    instance.downcast_ref::<Arc<D>>().cloned()
}

///////////////////////////////////////////////////////////////////////////////
// Tests
///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> &'static str;
    }

    struct English;
    impl Greeter for English {
        fn greet(&self) -> &'static str {
            "hello"
        }
    }

    #[test]
    fn keys_are_distinct_per_type() {
        assert_eq!(ServiceKey::of::<u32>(), ServiceKey::of::<u32>());
        assert_ne!(ServiceKey::of::<u32>(), ServiceKey::of::<u64>());
        assert_ne!(ServiceKey::of::<dyn Greeter>(), ServiceKey::of::<English>());
    }

    #[test]
    fn erase_and_extract_sized() {
        let instance = erase(Arc::new(7u32));
        assert_eq!(*extract::<u32>(&instance).unwrap(), 7);
        assert!(extract::<u64>(&instance).is_none());
    }

    #[test]
    fn erase_and_extract_trait_object() {
        let handle: Arc<dyn Greeter> = Arc::new(English);
        let instance = erase(handle);
        let back = extract::<dyn Greeter>(&instance).unwrap();
        assert_eq!(back.greet(), "hello");
    }
}
