//! Qualifier-aware dependency resolution for Rust.
//!
//! # Features
//!
//! * Automatic construction of objects which depend on other objects
//! * Recursive constructor and field injection
//! * Storage and management of singleton and qualified instances
//! * Qualifier tags to disambiguate multiple implementations of one trait
//! * Cycle detection: constructor cycles fail fast, field cycles are
//!   tolerated as partially-wired graphs
//! * No reflection: construction metadata lives in precomputed descriptors
//!
//! # Describing a type
//!
//! A type takes part in resolution by providing a [`TypeDescriptor`]: the
//! single eligible constructor with its ordered parameters, and the set of
//! injectable fields. Implement [`Injectable`] to register it by type.
//!
//! ```
//! use wirebox::{Injectable, InjectError, Injector, ParamSpec, TypeDescriptor};
//! use std::sync::Arc;
//!
//! struct Config {
//!     url: String,
//! }
//!
//! impl Injectable for Config {
//!     fn descriptor() -> Result<TypeDescriptor, InjectError> {
//!         TypeDescriptor::builder::<Config>()
//!             .singleton()
//!             .constructor(Vec::new(), |_| Ok(Config { url: "localhost".into() }))
//!             .build()
//!     }
//! }
//!
//! struct Repository {
//!     config: Arc<Config>,
//! }
//!
//! impl Injectable for Repository {
//!     fn descriptor() -> Result<TypeDescriptor, InjectError> {
//!         TypeDescriptor::builder::<Repository>()
//!             .constructor(vec![ParamSpec::of::<Config>()], |args| {
//!                 Ok(Repository { config: args.get::<Config>(0)? })
//!             })
//!             .build()
//!     }
//! }
//!
//! let injector = Injector::new();
//! injector.register::<Config>().unwrap();
//! injector.register::<Repository>().unwrap();
//!
//! let repository = injector.get_instance::<Repository>().unwrap();
//! assert_eq!(repository.config.url, "localhost");
//! ```
//!
//! # Singletons and qualifiers
//!
//! A singleton-scoped type resolves to the identical instance on every
//! request; a transient type resolves to a fresh instance each time. When
//! several implementations of one trait are bound, each carries a
//! [`Qualifier`] tag, and consumers pick one by declaring the tag on the
//! parameter or field:
//!
//! ```text
//! injector.register_binding::<dyn Node, NodeA>("a", |c| c)?;
//! injector.register_binding::<dyn Node, NodeB>("b", |c| c)?;
//! // ParamSpec::qualified::<dyn Node>("b") resolves to NodeB
//! ```
//!
//! An unqualified dependency on a trait with several bound implementations
//! is ambiguous and fails; a qualifier never matches "all" candidates.
//!
//! # Injected fields
//!
//! Fields that receive dependencies after construction are declared as
//! [`Injected<D>`] cells. Field injection is what makes mutually-referencing
//! types linkable: a back-reference through a field is filled in once the
//! other instance becomes available, or left empty if the cycle cannot be
//! closed, while constructor cycles always fail with
//! [`InjectError::CircularDependency`].

mod cache;
mod descriptor;
mod error;
mod injected;
mod injector;
mod key;
mod qualifier;
mod registry;


pub use crate::descriptor::{
    Args, DescriptorBuilder, DescriptorProvider, DescriptorTable, FieldSpec, Injectable,
    ParamSpec, TypeDescriptor,
};
pub use crate::error::{BoxError, InjectError};
pub use crate::injected::Injected;
pub use crate::injector::Injector;
pub use crate::key::{Instance, ServiceKey};
pub use crate::qualifier::Qualifier;
