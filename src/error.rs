//! Errors raised while registering and resolving services.

use std::error::Error;
use thiserror::Error;

/// Boxed cause of a construction failure.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Error raised by registration and resolution.
///
/// All variants are fatal to the triggering call: no partially-built
/// instance is ever returned, and nothing is retried. They signal defects
/// in the dependency graph or its configuration, not transient faults.
#[derive(Debug, Error)]
pub enum InjectError {
    /// Duplicate registration, missing derivable qualifier, zero or
    /// multiple eligible constructors, or an abstract type with no binding.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Qualifier disambiguation produced more than one candidate.
    ///
    /// Only raised for unhinted requests: a qualifier hint matches at most
    /// the one binding registered under its tag.
    #[error("ambiguous binding for `{parent}`: {count} qualified candidates and no qualifier hint")]
    AmbiguousBinding {
        parent: &'static str,
        count: usize,
    },

    /// A constructor parameter re-entered a type that is still under
    /// construction in the same resolution chain.
    #[error("circular dependency on constructor of `{offending}` while resolving `{root}`")]
    CircularDependency {
        root: &'static str,
        offending: &'static str,
    },

    /// The construct delegate of a concrete type failed.
    #[error("failed to construct `{type_name}`")]
    Construction {
        type_name: &'static str,
        #[source]
        source: BoxError,
    },

    /// A field setter delegate failed.
    #[error("failed to assign field `{field}` of `{declaring}`: {reason}")]
    FieldAssignment {
        field: &'static str,
        declaring: &'static str,
        reason: String,
    },
}

impl InjectError {
    /// Returns true for the `Configuration` variant.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(..))
    }
}
