//! Type descriptors: precomputed construction and injection metadata.
//!
//! A [`TypeDescriptor`] replaces runtime reflection. It carries the single
//! eligible constructor of a type (its ordered parameter specs plus a
//! construct delegate) and the set of injectable fields (each with a setter
//! delegate targeting an [`Injected`] cell). Descriptors are built once,
//! when a type is registered, and served through a [`DescriptorProvider`].

use crate::error::{BoxError, InjectError};
use crate::injected::Injected;
use crate::key::{erase, extract, Instance, ServiceKey};
use crate::qualifier::Qualifier;
use dashmap::DashMap;
use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

///////////////////////////////////////////////////////////////////////////////
// Delegates
///////////////////////////////////////////////////////////////////////////////

/// Invokes the constructor with already-resolved arguments.
pub(crate) type ConstructFn = Arc<dyn Fn(&Args) -> Result<Instance, BoxError> + Send + Sync>;

/// Assigns a resolved value into a field cell of the target instance.
pub(crate) type AssignFn = Arc<dyn Fn(&Instance, &Instance) -> Result<(), String> + Send + Sync>;

/// Reports whether a field cell already holds a value.
pub(crate) type OccupiedFn = Arc<dyn Fn(&Instance) -> bool + Send + Sync>;

///////////////////////////////////////////////////////////////////////////////
// Constructor Arguments
///////////////////////////////////////////////////////////////////////////////

/// Resolved constructor arguments, in declared parameter order.
pub struct Args {
    values: Vec<Instance>,
}

impl Args {
    pub(crate) fn new(values: Vec<Instance>) -> Self {
        Self { values }
    }

    /// Number of resolved arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the constructor takes no arguments.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the argument at `index` as a handle of the declared type.
    pub fn get<D: ?Sized + Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> Result<Arc<D>, InjectError> {
        let instance = self.values.get(index).ok_or_else(|| {
            InjectError::Configuration(format!("constructor argument {index} out of range"))
        })?;
        extract::<D>(instance).ok_or_else(|| {
            InjectError::Configuration(format!(
                "constructor argument {index} is not `{}`",
                type_name::<D>()
            ))
        })
    }
}

///////////////////////////////////////////////////////////////////////////////
// Parameter and Field Specs
///////////////////////////////////////////////////////////////////////////////

/// A constructor parameter: its declared type and optional qualifier.
#[derive(Clone, Debug)]
pub struct ParamSpec {
    key: ServiceKey,
    qualifier: Option<Qualifier>,
}

impl ParamSpec {
    /// An unqualified parameter of type `D`.
    pub fn of<D: ?Sized + 'static>() -> Self {
        Self {
            key: ServiceKey::of::<D>(),
            qualifier: None,
        }
    }

    /// A parameter of type `D` restricted to the given qualifier.
    pub fn qualified<D: ?Sized + 'static>(qualifier: impl Into<Qualifier>) -> Self {
        Self {
            key: ServiceKey::of::<D>(),
            qualifier: Some(qualifier.into()),
        }
    }

    /// The declared type of the parameter.
    pub fn key(&self) -> ServiceKey {
        self.key
    }

    /// The qualifier restriction, if any.
    pub fn qualifier(&self) -> Option<&Qualifier> {
        self.qualifier.as_ref()
    }
}

/// An injectable field: declared type, optional qualifier, scope flag and
/// the delegates that probe and assign its [`Injected`] cell.
#[derive(Clone)]
pub struct FieldSpec {
    name: &'static str,
    key: ServiceKey,
    qualifier: Option<Qualifier>,
    singleton: bool,
    pub(crate) assign: AssignFn,
    pub(crate) occupied: OccupiedFn,
}

impl FieldSpec {
    /// The field name, used in error messages.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The declared type of the field.
    pub fn key(&self) -> ServiceKey {
        self.key
    }

    /// The qualifier restriction, if any.
    pub fn qualifier(&self) -> Option<&Qualifier> {
        self.qualifier.as_ref()
    }

    /// True if the resolved value is published as a singleton of the
    /// field's declared type.
    pub fn is_singleton(&self) -> bool {
        self.singleton
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("qualifier", &self.qualifier)
            .field("singleton", &self.singleton)
            .finish()
    }
}

///////////////////////////////////////////////////////////////////////////////
// Type Descriptor
///////////////////////////////////////////////////////////////////////////////

/// Per-type metadata: the single eligible constructor and the injectable
/// fields.
pub struct TypeDescriptor {
    key: ServiceKey,
    qualifier: Option<Qualifier>,
    singleton: bool,
    params: Vec<ParamSpec>,
    pub(crate) construct: ConstructFn,
    fields: Vec<FieldSpec>,
}

impl TypeDescriptor {
    /// Starts building a descriptor for `T`.
    pub fn builder<T: Send + Sync + 'static>() -> DescriptorBuilder<T> {
        DescriptorBuilder::new()
    }

    /// The described type.
    pub fn key(&self) -> ServiceKey {
        self.key
    }

    /// The qualifier the type declares for itself, if any.
    pub fn qualifier(&self) -> Option<&Qualifier> {
        self.qualifier.as_ref()
    }

    /// True if instances of this type are singleton-scoped.
    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    /// Ordered constructor parameter specs.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Injectable field specs.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("key", &self.key)
            .field("qualifier", &self.qualifier)
            .field("singleton", &self.singleton)
            .field("params", &self.params)
            .field("fields", &self.fields)
            .finish()
    }
}

///////////////////////////////////////////////////////////////////////////////
// Builder
///////////////////////////////////////////////////////////////////////////////

enum CtorSlot {
    /// No constructor registered yet.
    Unset,
    /// The synthesized zero-argument fallback.
    Fallback(ConstructFn),
    /// An explicitly marked constructor.
    Marked(Vec<ParamSpec>, ConstructFn),
}

/// Builds a [`TypeDescriptor`] for `T`.
///
/// Constructor rules follow the one-eligible-constructor invariant: marking
/// two constructors is a configuration error, surfaced by [`build`]; the
/// zero-argument fallback registered with [`default_constructor`] is used
/// only when no marked constructor exists.
///
/// [`build`]: DescriptorBuilder::build
/// [`default_constructor`]: DescriptorBuilder::default_constructor
pub struct DescriptorBuilder<T> {
    qualifier: Option<Qualifier>,
    singleton: bool,
    ctor: CtorSlot,
    fields: Vec<FieldSpec>,
    defect: Option<InjectError>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> DescriptorBuilder<T> {
    fn new() -> Self {
        Self {
            qualifier: None,
            singleton: false,
            ctor: CtorSlot::Unset,
            fields: Vec::new(),
            defect: None,
            _marker: std::marker::PhantomData,
        }
    }

    /// Declares the type singleton-scoped.
    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    /// Declares the qualifier tag of the type itself, used when the type is
    /// bound against the interfaces it implements.
    pub fn qualifier(mut self, qualifier: impl Into<Qualifier>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// Marks the constructor for injection.
    ///
    /// `params` lists the constructor parameters in order; `construct`
    /// receives them resolved. Marking a second constructor is a
    /// configuration error.
    pub fn constructor<F>(mut self, params: Vec<ParamSpec>, construct: F) -> Self
    where
        F: Fn(&Args) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let erased: ConstructFn =
            Arc::new(move |args| construct(args).map(|value| erase(Arc::new(value))));
        match self.ctor {
            CtorSlot::Marked(..) => {
                self.defect.get_or_insert(InjectError::Configuration(format!(
                    "more than one constructor marked for injection on `{}`",
                    type_name::<T>()
                )));
            }
            _ => self.ctor = CtorSlot::Marked(params, erased),
        }
        self
    }

    /// Registers the zero-argument fallback constructor.
    ///
    /// It is only used if no constructor is explicitly marked.
    pub fn default_constructor(mut self) -> Self
    where
        T: Default,
    {
        if matches!(self.ctor, CtorSlot::Unset) {
            self.ctor = CtorSlot::Fallback(Arc::new(|_| Ok(erase(Arc::new(T::default())))));
        }
        self
    }

    /// Declares an unqualified, transient-scoped injectable field.
    pub fn field<D: ?Sized + Send + Sync + 'static>(
        self,
        name: &'static str,
        access: fn(&T) -> &Injected<D>,
    ) -> Self {
        self.field_full(name, None, false, access)
    }

    /// Declares an injectable field restricted to a qualifier.
    pub fn qualified_field<D: ?Sized + Send + Sync + 'static>(
        self,
        name: &'static str,
        qualifier: impl Into<Qualifier>,
        access: fn(&T) -> &Injected<D>,
    ) -> Self {
        self.field_full(name, Some(qualifier.into()), false, access)
    }

    /// Declares a singleton-scoped injectable field.
    pub fn singleton_field<D: ?Sized + Send + Sync + 'static>(
        self,
        name: &'static str,
        access: fn(&T) -> &Injected<D>,
    ) -> Self {
        self.field_full(name, None, true, access)
    }

    /// Declares an injectable field with explicit qualifier and scope.
    pub fn field_full<D: ?Sized + Send + Sync + 'static>(
        mut self,
        name: &'static str,
        qualifier: Option<Qualifier>,
        singleton: bool,
        access: fn(&T) -> &Injected<D>,
    ) -> Self {
        let assign: AssignFn = Arc::new(move |target, value| {
            let target = target
                .downcast_ref::<Arc<T>>()
                .ok_or_else(|| format!("target is not `{}`", type_name::<T>()))?;
            let value = extract::<D>(value)
                .ok_or_else(|| format!("value is not `{}`", type_name::<D>()))?;
            access(target).set(value);
            Ok(())
        });
        let occupied: OccupiedFn = Arc::new(move |target| {
            target
                .downcast_ref::<Arc<T>>()
                .map(|t| access(t).is_set())
                .unwrap_or(false)
        });
        self.fields.push(FieldSpec {
            name,
            key: ServiceKey::of::<D>(),
            qualifier,
            singleton,
            assign,
            occupied,
        });
        self
    }

    /// Finishes the descriptor.
    ///
    /// Fails if no constructor was registered at all, or if a defect was
    /// recorded while building.
    pub fn build(self) -> Result<TypeDescriptor, InjectError> {
        if let Some(defect) = self.defect {
            return Err(defect);
        }
        let (params, construct) = match self.ctor {
            CtorSlot::Unset => {
                return Err(InjectError::Configuration(format!(
                    "no eligible constructor for injection type `{}`",
                    type_name::<T>()
                )))
            }
            CtorSlot::Fallback(construct) => (Vec::new(), construct),
            CtorSlot::Marked(params, construct) => (params, construct),
        };
        Ok(TypeDescriptor {
            key: ServiceKey::of::<T>(),
            qualifier: self.qualifier,
            singleton: self.singleton,
            params,
            construct,
            fields: self.fields,
        })
    }
}

///////////////////////////////////////////////////////////////////////////////
// Provider Contract
///////////////////////////////////////////////////////////////////////////////

/// A type that can describe itself to the injector.
pub trait Injectable: Send + Sync + 'static {
    /// Produces the descriptor of this type.
    ///
    /// Configuration defects (for example two marked constructors) must be
    /// surfaced here, at extraction time, not during resolution.
    fn descriptor() -> Result<TypeDescriptor, InjectError>;
}

/// Serves descriptors to the resolver.
///
/// The default implementation is the [`DescriptorTable`]; an external
/// metadata source can stand in by implementing this trait.
pub trait DescriptorProvider: Send + Sync {
    /// Returns the descriptor for `key`, or `None` if the type is unknown
    /// (and therefore not constructible).
    fn describe(&self, key: ServiceKey) -> Option<Arc<TypeDescriptor>>;
}

/// The default, table-backed descriptor provider.
///
/// Populated once per type at registration time and read concurrently by
/// the resolver.
#[derive(Default)]
pub struct DescriptorTable {
    entries: DashMap<TypeId, Arc<TypeDescriptor>>,
}

impl DescriptorTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the descriptor of `T`.
    pub fn register<T: Injectable>(&self) -> Result<(), InjectError> {
        self.insert(T::descriptor()?)
    }

    /// Inserts a prebuilt descriptor.
    ///
    /// Fails if the type is already described.
    pub fn insert(&self, descriptor: TypeDescriptor) -> Result<(), InjectError> {
        use dashmap::mapref::entry::Entry;

        let key = descriptor.key();
        match self.entries.entry(key.id()) {
            Entry::Occupied(..) => Err(InjectError::Configuration(format!(
                "duplicate descriptor registration for `{key}`"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(descriptor));
                Ok(())
            }
        }
    }

    /// Returns true if `key` is described.
    pub fn contains(&self, key: ServiceKey) -> bool {
        self.entries.contains_key(&key.id())
    }
}

impl DescriptorProvider for DescriptorTable {
    fn describe(&self, key: ServiceKey) -> Option<Arc<TypeDescriptor>> {
        self.entries.get(&key.id()).map(|entry| entry.clone())
    }
}

///////////////////////////////////////////////////////////////////////////////
// Tests
///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Widget {
        label: Injected<String>,
    }

    #[test]
    fn builder_requires_a_constructor() {
        let result = TypeDescriptor::builder::<Widget>().build();
        assert!(matches!(result, Err(InjectError::Configuration(..))));
    }

    #[test]
    fn two_marked_constructors_is_a_defect() {
        let result = TypeDescriptor::builder::<Widget>()
            .constructor(Vec::new(), |_| Ok(Widget::default()))
            .constructor(Vec::new(), |_| Ok(Widget::default()))
            .build();
        assert!(matches!(result, Err(InjectError::Configuration(..))));
    }

    #[test]
    fn fallback_yields_to_marked_constructor() {
        let descriptor = TypeDescriptor::builder::<u32>()
            .default_constructor()
            .constructor(Vec::new(), |_| Ok(42u32))
            .build()
            .unwrap();
        let instance = (descriptor.construct)(&Args::new(Vec::new())).unwrap();
        assert_eq!(*extract::<u32>(&instance).unwrap(), 42);
    }

    #[test]
    fn descriptor_carries_field_metadata() {
        let descriptor = TypeDescriptor::builder::<Widget>()
            .singleton()
            .qualifier("main")
            .default_constructor()
            .qualified_field("label", "greeting", |w: &Widget| &w.label)
            .build()
            .unwrap();

        assert!(descriptor.is_singleton());
        assert_eq!(descriptor.qualifier(), Some(&Qualifier::named("main")));
        assert_eq!(descriptor.fields().len(), 1);
        let field = &descriptor.fields()[0];
        assert_eq!(field.name(), "label");
        assert_eq!(field.key(), ServiceKey::of::<String>());
        assert!(!field.is_singleton());
    }

    #[test]
    fn assign_and_occupied_delegates() {
        let descriptor = TypeDescriptor::builder::<Widget>()
            .default_constructor()
            .field("label", |w: &Widget| &w.label)
            .build()
            .unwrap();
        let field = &descriptor.fields()[0];

        let target = erase(Arc::new(Widget::default()));
        assert!(!(field.occupied)(&target));

        let value = erase(Arc::new("hi".to_string()));
        (field.assign)(&target, &value).unwrap();
        assert!((field.occupied)(&target));

        let wrong = erase(Arc::new(5u8));
        assert!((field.assign)(&target, &wrong).is_err());
    }

    #[test]
    fn table_rejects_duplicates() {
        let table = DescriptorTable::new();
        let build = || {
            TypeDescriptor::builder::<Widget>()
                .default_constructor()
                .build()
                .unwrap()
        };
        table.insert(build()).unwrap();
        assert!(table.contains(ServiceKey::of::<Widget>()));
        assert!(table.insert(build()).is_err());
    }

    #[test]
    fn args_type_mismatch() {
        let args = Args::new(vec![erase(Arc::new(1u32))]);
        assert!(args.get::<u32>(0).is_ok());
        assert!(args.get::<String>(0).is_err());
        assert!(args.get::<u32>(1).is_err());
    }
}
