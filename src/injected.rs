//! The field cell that receives injected dependencies.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// A slot for a dependency that is assigned by the injector after
/// construction.
///
/// Declare injectable fields with this wrapper and describe them in the
/// type's descriptor. The injector fills the slot during the field-injection
/// pass; a slot that takes part in a field-level dependency cycle may be
/// left empty, so reads go through [`get`].
///
/// ```
/// use wirebox::Injected;
///
/// struct AuditLog;
///
/// struct Service {
///     log: Injected<AuditLog>,
/// }
///
/// let service = Service { log: Injected::empty() };
/// assert!(service.log.get().is_none());
/// ```
///
/// [`get`]: Injected::get
pub struct Injected<D: ?Sized> {
    slot: RwLock<Option<Arc<D>>>,
}

impl<D: ?Sized> Injected<D> {
    /// Creates an empty slot.
    pub fn empty() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// Creates a slot that already holds a value.
    ///
    /// Use this when a constructor satisfies the field itself; the injector
    /// skips occupied singleton-scoped fields.
    pub fn with(value: Arc<D>) -> Self {
        Self {
            slot: RwLock::new(Some(value)),
        }
    }

    /// Returns a handle to the injected value, if one has been assigned.
    pub fn get(&self) -> Option<Arc<D>> {
        self.slot.read().clone()
    }

    /// Assigns the value, replacing any previous one.
    pub fn set(&self, value: Arc<D>) {
        *self.slot.write() = Some(value);
    }

    /// Returns true if a value has been assigned.
    pub fn is_set(&self) -> bool {
        self.slot.read().is_some()
    }
}

impl<D: ?Sized> Default for Injected<D> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<D: ?Sized> fmt::Debug for Injected<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injected")
            .field("set", &self.is_set())
            .finish()
    }
}

///////////////////////////////////////////////////////////////////////////////
// Tests
///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_then_set() {
        let cell: Injected<u32> = Injected::empty();
        assert!(!cell.is_set());
        assert!(cell.get().is_none());

        cell.set(Arc::new(5));
        assert!(cell.is_set());
        assert_eq!(*cell.get().unwrap(), 5);
    }

    #[test]
    fn with_is_occupied() {
        let cell = Injected::with(Arc::new("seed"));
        assert!(cell.is_set());
    }

    #[test]
    fn set_replaces() {
        let cell: Injected<u32> = Injected::empty();
        cell.set(Arc::new(1));
        cell.set(Arc::new(2));
        assert_eq!(*cell.get().unwrap(), 2);
    }
}
