//! Qualifier tags for disambiguating implementations.

use std::borrow::Cow;
use std::fmt;

/// An opaque, value-equal tag that distinguishes multiple implementations
/// of one parent type.
///
/// Two qualifiers are equal iff their tag content is equal. The tag is
/// usually a name:
///
/// ```
/// use wirebox::Qualifier;
///
/// let a = Qualifier::named("primary");
/// let b = Qualifier::from("primary");
/// assert_eq!(a, b);
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Qualifier(Cow<'static, str>);

impl Qualifier {
    /// Creates a qualifier from a name.
    pub fn named(tag: impl Into<Cow<'static, str>>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag content.
    pub fn tag(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for Qualifier {
    fn from(tag: &'static str) -> Self {
        Self(Cow::Borrowed(tag))
    }
}

impl From<String> for Qualifier {
    fn from(tag: String) -> Self {
        Self(Cow::Owned(tag))
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl fmt::Debug for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Qualifier({:?})", self.0)
    }
}

///////////////////////////////////////////////////////////////////////////////
// Tests
///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_equality() {
        assert_eq!(Qualifier::named("a"), Qualifier::from("a"));
        assert_ne!(Qualifier::named("a"), Qualifier::named("b"));
        assert_eq!(Qualifier::from("x".to_string()), Qualifier::from("x"));
    }

    #[test]
    fn display() {
        assert_eq!(Qualifier::named("a").to_string(), "@a");
    }
}
