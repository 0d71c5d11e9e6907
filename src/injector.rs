//! The resolver core: caches, qualifier disambiguation, the construction
//! pipeline and cycle detection.

use crate::cache::InstanceCaches;
use crate::descriptor::{
    Args, DescriptorProvider, DescriptorTable, Injectable, TypeDescriptor,
};
use crate::error::InjectError;
use crate::key::{erase, extract, Instance, ServiceKey};
use crate::qualifier::Qualifier;
use crate::registry::{Binding, BindingRegistry};
use fnv::FnvHashSet;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

///////////////////////////////////////////////////////////////////////////////
// Resolution Chain
///////////////////////////////////////////////////////////////////////////////

/// Which edge of the graph is being followed when a resolution recurses.
///
/// Re-entering a type that is still under construction is fatal on the
/// constructor path and tolerated on the field path, where the field is
/// simply left unset.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Path {
    Constructor,
    Field,
}

/// The set of types currently under construction in one top-level call and
/// its recursive descendants.
///
/// Threaded explicitly through the recursion, never shared between
/// independent top-level calls, so concurrent resolutions cannot report
/// cycles against each other.
struct ResolutionChain {
    root: ServiceKey,
    in_progress: FnvHashSet<TypeId>,
}

impl ResolutionChain {
    fn new(root: ServiceKey) -> Self {
        Self {
            root,
            in_progress: FnvHashSet::default(),
        }
    }

    fn root(&self) -> ServiceKey {
        self.root
    }

    fn contains(&self, key: ServiceKey) -> bool {
        self.in_progress.contains(&key.id())
    }

    fn push(&mut self, key: ServiceKey) {
        self.in_progress.insert(key.id());
    }

    fn pop(&mut self, key: ServiceKey) {
        self.in_progress.remove(&key.id());
    }
}

/// Outcome of the qualifier-disambiguation step.
enum Adoption {
    /// A binding to a different concrete type was adopted; the qualifier is
    /// the matched tag for qualified bindings, `None` for bare ones.
    Bound {
        binding: Binding,
        qualifier: Option<Qualifier>,
    },
    /// The requested type itself is concrete and gets constructed.
    Concrete(Arc<TypeDescriptor>),
}

///////////////////////////////////////////////////////////////////////////////
// Injector
///////////////////////////////////////////////////////////////////////////////

/// The dependency-resolution engine.
///
/// Resolves a requested type into a fully constructed, fully wired instance
/// by recursively resolving constructor parameters and injectable fields,
/// honoring singleton/transient scope and qualifier-based disambiguation.
///
/// ```
/// use wirebox::{Injectable, InjectError, Injector, TypeDescriptor};
///
/// struct Clock;
///
/// impl Injectable for Clock {
///     fn descriptor() -> Result<TypeDescriptor, InjectError> {
///         TypeDescriptor::builder::<Clock>()
///             .singleton()
///             .constructor(Vec::new(), |_| Ok(Clock))
///             .build()
///     }
/// }
///
/// let injector = Injector::new();
/// injector.register::<Clock>().unwrap();
///
/// let first = injector.get_instance::<Clock>().unwrap();
/// let second = injector.get_instance::<Clock>().unwrap();
/// assert!(std::sync::Arc::ptr_eq(&first, &second));
/// ```
///
/// All methods take `&self`; independent resolutions may run concurrently
/// from multiple threads.
#[derive(Default)]
pub struct Injector {
    registry: BindingRegistry,
    caches: InstanceCaches,
    descriptors: DescriptorTable,
    fallback: Option<Arc<dyn DescriptorProvider>>,
}

impl Injector {
    ///////////////////////////////////////////////////////////////////////////
    // Construction
    ///////////////////////////////////////////////////////////////////////////

    /// Creates an empty injector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an injector that falls back to an external descriptor
    /// provider for types not registered in its own table.
    pub fn with_provider(provider: Arc<dyn DescriptorProvider>) -> Self {
        Self {
            fallback: Some(provider),
            ..Self::default()
        }
    }

    ///////////////////////////////////////////////////////////////////////////
    // Registration
    ///////////////////////////////////////////////////////////////////////////

    /// Registers the descriptor of `T`, built once at this point.
    pub fn register<T: Injectable>(&self) -> Result<(), InjectError> {
        self.descriptors.register::<T>()
    }

    /// Registers a prebuilt descriptor.
    pub fn register_descriptor(&self, descriptor: TypeDescriptor) -> Result<(), InjectError> {
        self.descriptors.insert(descriptor)
    }

    /// Binds (`P`, `qualifier`) to the concrete type `T`.
    ///
    /// `upcast` converts a concrete handle into a parent handle; pass
    /// `|concrete| concrete` and let coercion do the work. Fails if the
    /// (parent, qualifier) pair is already bound.
    pub fn register_binding<P, T>(
        &self,
        qualifier: impl Into<Qualifier>,
        upcast: fn(Arc<T>) -> Arc<P>,
    ) -> Result<(), InjectError>
    where
        P: ?Sized + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.registry.register_qualified(
            ServiceKey::of::<P>(),
            qualifier.into(),
            Binding::new(upcast),
        )
    }

    /// Binds `P` to `T` under the qualifier `T` declares for itself.
    ///
    /// Fails if `T` has no registered descriptor or declares no qualifier.
    pub fn register_binding_auto<P, T>(
        &self,
        upcast: fn(Arc<T>) -> Arc<P>,
    ) -> Result<(), InjectError>
    where
        P: ?Sized + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let concrete = ServiceKey::of::<T>();
        let descriptor = self.describe(concrete).ok_or_else(|| {
            InjectError::Configuration(format!("no descriptor registered for `{concrete}`"))
        })?;
        let qualifier = descriptor.qualifier().cloned().ok_or_else(|| {
            InjectError::Configuration(format!("type `{concrete}` declares no qualifier"))
        })?;
        self.register_binding(qualifier, upcast)
    }

    /// Registers `T` as an unqualified singleton.
    pub fn register_singleton<T: Send + Sync + 'static>(&self) -> Result<(), InjectError> {
        self.registry
            .register_bare(ServiceKey::of::<T>(), Binding::new::<T, T>(|t| t))
    }

    /// Registers `T` as the unqualified singleton implementation of `P`.
    pub fn register_singleton_as<P, T>(
        &self,
        upcast: fn(Arc<T>) -> Arc<P>,
    ) -> Result<(), InjectError>
    where
        P: ?Sized + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.registry
            .register_bare(ServiceKey::of::<P>(), Binding::new(upcast))
    }

    /// Injects a pre-built instance directly into the singleton cache.
    ///
    /// Fails if the type already has a cached singleton.
    pub fn put_instance<D: ?Sized + Send + Sync + 'static>(
        &self,
        instance: Arc<D>,
    ) -> Result<(), InjectError> {
        self.caches.put(ServiceKey::of::<D>(), erase(instance))
    }

    /// Injects a pre-built instance into the qualified-instance cache.
    ///
    /// Fails if the (type, qualifier) pair already has a cached instance.
    pub fn put_qualified_instance<D: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: impl Into<Qualifier>,
        instance: Arc<D>,
    ) -> Result<(), InjectError> {
        self.caches
            .put_qualified(ServiceKey::of::<D>(), qualifier.into(), erase(instance))
    }

    /// Returns the known qualifier → concrete-type bindings of `P`,
    /// possibly empty.
    pub fn lookup_bindings<P: ?Sized + 'static>(&self) -> HashMap<Qualifier, ServiceKey> {
        self.registry
            .qualified_of(ServiceKey::of::<P>())
            .into_iter()
            .map(|(qualifier, binding)| (qualifier, binding.concrete))
            .collect()
    }

    ///////////////////////////////////////////////////////////////////////////
    // Resolution
    ///////////////////////////////////////////////////////////////////////////

    /// Resolves a ready instance of `D`, constructing and wiring whatever
    /// is missing.
    pub fn get_instance<D: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Arc<D>, InjectError> {
        let key = ServiceKey::of::<D>();
        let mut chain = ResolutionChain::new(key);
        let instance = self
            .resolve(key, None, &mut chain, Path::Constructor)?
            .ok_or_else(|| {
                InjectError::Configuration(format!("resolution of `{key}` produced no instance"))
            })?;
        extract::<D>(&instance).ok_or_else(|| {
            InjectError::Configuration(format!("cached instance for `{key}` has unexpected type"))
        })
    }

    /// Runs the field-injection pass on an existing instance.
    pub fn inject_members<T: Send + Sync + 'static>(
        &self,
        target: &Arc<T>,
    ) -> Result<(), InjectError> {
        let key = ServiceKey::of::<T>();
        let descriptor = self.describe(key).ok_or_else(|| {
            InjectError::Configuration(format!("no descriptor registered for `{key}`"))
        })?;
        let mut chain = ResolutionChain::new(key);
        self.inject_fields(&descriptor, &erase(target.clone()), &mut chain)
    }

    ///////////////////////////////////////////////////////////////////////////
    // Core Algorithm
    ///////////////////////////////////////////////////////////////////////////

    fn describe(&self, key: ServiceKey) -> Option<Arc<TypeDescriptor>> {
        if let Some(descriptor) = self.descriptors.describe(key) {
            return Some(descriptor);
        }
        self.fallback.as_ref()?.describe(key)
    }

    /// Resolves `key` under an optional qualifier hint.
    ///
    /// Returns `Ok(None)` only on the field path, when the target type is
    /// still under construction in this chain.
    fn resolve(
        &self,
        key: ServiceKey,
        hint: Option<&Qualifier>,
        chain: &mut ResolutionChain,
        path: Path,
    ) -> Result<Option<Instance>, InjectError> {
        if let Some(hit) = self.caches.singleton(key) {
            trace!("singleton cache hit for `{}`", key);
            return Ok(Some(hit));
        }
        if let Some(qualifier) = hint {
            if let Some(hit) = self.caches.qualified(key, qualifier) {
                trace!("qualified cache hit for `{}` {}", key, qualifier);
                return Ok(Some(hit));
            }
        }

        match self.disambiguate(key, hint)? {
            Adoption::Concrete(descriptor) => self.construct(key, &descriptor, chain, path),
            Adoption::Bound { binding, qualifier } => {
                trace!(
                    "adopting `{}` for `{}` (qualifier {:?})",
                    binding.concrete,
                    key,
                    qualifier
                );
                let Some(inner) = self.resolve(binding.concrete, None, chain, path)? else {
                    return Ok(None);
                };
                let upcast = (binding.upcast)(&inner).ok_or_else(|| {
                    InjectError::Configuration(format!(
                        "binding of `{key}` to `{}` produced a mismatched instance",
                        binding.concrete
                    ))
                })?;
                let retained = match qualifier {
                    Some(qualifier) => self.caches.publish_qualified(key, qualifier, upcast),
                    None => self.caches.publish(key, upcast),
                };
                Ok(Some(retained))
            }
        }
    }

    /// The qualifier-disambiguation step.
    ///
    /// A hint matches at most the one binding registered under its tag; an
    /// absent hint matches no qualified binding at all, and is ambiguous
    /// when several distinct candidates exist. With no match the bare map
    /// is consulted, then the type itself if it is constructible.
    fn disambiguate(
        &self,
        key: ServiceKey,
        hint: Option<&Qualifier>,
    ) -> Result<Adoption, InjectError> {
        let candidates = self.registry.qualified_of(key);
        match hint {
            Some(qualifier) => {
                if let Some(binding) = candidates.get(qualifier) {
                    if binding.concrete != key {
                        return Ok(Adoption::Bound {
                            binding: binding.clone(),
                            qualifier: Some(qualifier.clone()),
                        });
                    }
                }
            }
            None => {
                let distinct: FnvHashSet<TypeId> =
                    candidates.values().map(|b| b.concrete.id()).collect();
                if distinct.len() > 1 {
                    return Err(InjectError::AmbiguousBinding {
                        parent: key.name(),
                        count: distinct.len(),
                    });
                }
            }
        }
        if let Some(binding) = self.registry.bare_of(key) {
            if binding.concrete != key {
                return Ok(Adoption::Bound {
                    binding,
                    qualifier: None,
                });
            }
        }
        match self.describe(key) {
            Some(descriptor) => Ok(Adoption::Concrete(descriptor)),
            None => Err(InjectError::Configuration(format!(
                "no binding matches `{key}` (hint {hint:?}) and the type is not constructible"
            ))),
        }
    }

    /// Constructs a concrete type: cycle check, parameter resolution,
    /// constructor call, singleton publication and field injection.
    fn construct(
        &self,
        key: ServiceKey,
        descriptor: &TypeDescriptor,
        chain: &mut ResolutionChain,
        path: Path,
    ) -> Result<Option<Instance>, InjectError> {
        if chain.contains(key) {
            return match path {
                Path::Constructor => Err(InjectError::CircularDependency {
                    root: chain.root().name(),
                    offending: key.name(),
                }),
                // Field-level cycles are tolerated: the field stays unset.
                Path::Field => Ok(None),
            };
        }

        trace!("constructing `{}`", key);
        // The in-progress window covers parameter resolution and the
        // constructor call; removal is guaranteed on success and failure.
        chain.push(key);
        let built = self.construct_in_window(key, descriptor, chain);
        chain.pop(key);
        let built = built?;

        let singleton = descriptor.is_singleton() || self.registry.is_bare_singleton(key);
        if !singleton {
            self.inject_fields(descriptor, &built, chain)?;
            return Ok(Some(built));
        }

        let retained = self.caches.publish(key, built.clone());
        if !Arc::ptr_eq(&retained, &built) {
            // Lost a publication race: the winner owns field injection and
            // this instance is discarded.
            trace!("discarding racing build of `{}`", key);
            return Ok(Some(retained));
        }
        self.inject_fields(descriptor, &retained, chain)?;
        Ok(Some(retained))
    }

    fn construct_in_window(
        &self,
        key: ServiceKey,
        descriptor: &TypeDescriptor,
        chain: &mut ResolutionChain,
    ) -> Result<Instance, InjectError> {
        let mut values = Vec::with_capacity(descriptor.params().len());
        for param in descriptor.params() {
            let value = self
                .resolve(param.key(), param.qualifier(), chain, Path::Constructor)?
                .ok_or_else(|| {
                    InjectError::Configuration(format!(
                        "parameter `{}` of `{key}` resolved to nothing",
                        param.key()
                    ))
                })?;
            values.push(value);
        }
        let args = Args::new(values);
        (descriptor.construct)(&args).map_err(|source| InjectError::Construction {
            type_name: key.name(),
            source,
        })
    }

    /// The field-injection pass.
    fn inject_fields(
        &self,
        descriptor: &TypeDescriptor,
        target: &Instance,
        chain: &mut ResolutionChain,
    ) -> Result<(), InjectError> {
        for field in descriptor.fields() {
            // Already satisfied by constructor injection.
            if field.is_singleton() && (field.occupied)(target) {
                continue;
            }
            let resolved = self.resolve(field.key(), field.qualifier(), chain, Path::Field)?;
            let Some(value) = resolved else {
                trace!(
                    "leaving field `{}` of `{}` unset: target is still under construction",
                    field.name(),
                    descriptor.key()
                );
                continue;
            };
            let value = if field.is_singleton() {
                self.caches.publish(field.key(), value)
            } else {
                value
            };
            let value = match field.qualifier() {
                Some(qualifier) => {
                    self.caches
                        .publish_qualified(field.key(), qualifier.clone(), value)
                }
                None => value,
            };
            (field.assign)(target, &value).map_err(|reason| InjectError::FieldAssignment {
                field: field.name(),
                declaring: descriptor.key().name(),
                reason,
            })?;
        }
        Ok(())
    }
}

///////////////////////////////////////////////////////////////////////////////
// Tests
///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ParamSpec;

    struct Engine;

    impl Injectable for Engine {
        fn descriptor() -> Result<TypeDescriptor, InjectError> {
            TypeDescriptor::builder::<Engine>()
                .constructor(Vec::new(), |_| Ok(Engine))
                .build()
        }
    }

    trait Port: Send + Sync {
        fn id(&self) -> u16;
    }

    struct Http;
    impl Port for Http {
        fn id(&self) -> u16 {
            80
        }
    }
    impl Injectable for Http {
        fn descriptor() -> Result<TypeDescriptor, InjectError> {
            TypeDescriptor::builder::<Http>()
                .qualifier("http")
                .constructor(Vec::new(), |_| Ok(Http))
                .build()
        }
    }

    struct Https;
    impl Port for Https {
        fn id(&self) -> u16 {
            443
        }
    }
    impl Injectable for Https {
        fn descriptor() -> Result<TypeDescriptor, InjectError> {
            TypeDescriptor::builder::<Https>()
                .qualifier("https")
                .constructor(Vec::new(), |_| Ok(Https))
                .build()
        }
    }

    #[test]
    fn transient_instances_are_fresh() {
        let injector = Injector::new();
        injector.register::<Engine>().unwrap();

        let first = injector.get_instance::<Engine>().unwrap();
        let second = injector.get_instance::<Engine>().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn put_instance_short_circuits_construction() {
        let injector = Injector::new();
        let seeded = Arc::new(7u64);
        injector.put_instance(seeded.clone()).unwrap();

        let resolved = injector.get_instance::<u64>().unwrap();
        assert!(Arc::ptr_eq(&seeded, &resolved));
        assert!(injector.put_instance(Arc::new(9u64)).is_err());
    }

    #[test]
    fn abstract_type_without_binding_is_a_configuration_error() {
        let injector = Injector::new();
        let result = injector.get_instance::<dyn Port>();
        assert!(matches!(result, Err(InjectError::Configuration(..))));
    }

    #[test]
    fn unqualified_request_amid_multiple_bindings_is_ambiguous() {
        let injector = Injector::new();
        injector.register::<Http>().unwrap();
        injector.register::<Https>().unwrap();
        injector.register_binding_auto::<dyn Port, Http>(|c| c).unwrap();
        injector.register_binding_auto::<dyn Port, Https>(|c| c).unwrap();

        let result = injector.get_instance::<dyn Port>();
        assert!(matches!(
            result,
            Err(InjectError::AmbiguousBinding { count: 2, .. })
        ));
    }

    #[test]
    fn qualified_parameter_selects_the_tagged_implementation() {
        struct Client {
            port: Arc<dyn Port>,
        }
        impl Injectable for Client {
            fn descriptor() -> Result<TypeDescriptor, InjectError> {
                TypeDescriptor::builder::<Client>()
                    .constructor(vec![ParamSpec::qualified::<dyn Port>("https")], |args| {
                        Ok(Client {
                            port: args.get::<dyn Port>(0)?,
                        })
                    })
                    .build()
            }
        }

        let injector = Injector::new();
        injector.register::<Http>().unwrap();
        injector.register::<Https>().unwrap();
        injector.register::<Client>().unwrap();
        injector.register_binding_auto::<dyn Port, Http>(|c| c).unwrap();
        injector.register_binding_auto::<dyn Port, Https>(|c| c).unwrap();

        let client = injector.get_instance::<Client>().unwrap();
        assert_eq!(client.port.id(), 443);
    }

    #[test]
    fn auto_binding_requires_a_declared_qualifier() {
        let injector = Injector::new();
        injector.register::<Engine>().unwrap();

        let result = injector.register_binding_auto::<Engine, Engine>(|c| c);
        assert!(result.unwrap_err().is_configuration());
    }

    #[test]
    fn bare_singleton_registration_pins_scope() {
        let injector = Injector::new();
        injector.register::<Engine>().unwrap();
        injector.register_singleton::<Engine>().unwrap();

        let first = injector.get_instance::<Engine>().unwrap();
        let second = injector.get_instance::<Engine>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn lookup_bindings_reports_the_qualifier_map() {
        let injector = Injector::new();
        injector.register::<Http>().unwrap();
        injector.register::<Https>().unwrap();
        injector.register_binding_auto::<dyn Port, Http>(|c| c).unwrap();
        injector.register_binding_auto::<dyn Port, Https>(|c| c).unwrap();

        let bindings = injector.lookup_bindings::<dyn Port>();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[&Qualifier::named("http")], ServiceKey::of::<Http>());
        assert_eq!(bindings[&Qualifier::named("https")], ServiceKey::of::<Https>());
    }
}
