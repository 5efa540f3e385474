//! Method and class identities.
//!
//! Classes are addressed by their qualified internal name (`"demo/Worker"`,
//! slash-separated). Methods are addressed by name plus descriptor, where a
//! descriptor is `(args)ret` built from the type letters `I` (int) and `V`
//! (void). The engine only ever inspects arity and void-ness, so nothing
//! richer is needed.

use std::fmt;
use std::sync::Arc;

/// Qualified internal class name, shared across the session registry.
pub type ClassName = Arc<str>;

// =============================================================================
// Method Signature
// =============================================================================

/// A method signature: name plus descriptor.
///
/// Two methods with the same `MethodSig` in related classes are override
/// candidates of one another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSig {
    /// Method name.
    pub name: Arc<str>,
    /// Descriptor in `(args)ret` form, e.g. `"(II)I"`.
    pub descriptor: Arc<str>,
}

impl MethodSig {
    /// Create a signature from a name and descriptor.
    pub fn new(name: impl Into<Arc<str>>, descriptor: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    /// Number of declared parameters (not counting any receiver).
    pub fn arg_count(&self) -> usize {
        let d = self.descriptor.as_ref();
        match (d.find('('), d.find(')')) {
            (Some(open), Some(close)) if open < close => d[open + 1..close].len(),
            _ => 0,
        }
    }

    /// Whether the method pushes a return value.
    pub fn returns_value(&self) -> bool {
        !self.descriptor.ends_with('V')
    }
}

impl fmt::Display for MethodSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}

// =============================================================================
// Method Reference
// =============================================================================

/// A fully qualified method reference: owning class plus signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Owning class name.
    pub owner: ClassName,
    /// Method signature within the owner.
    pub sig: MethodSig,
}

impl MethodRef {
    /// Create a reference from owner, name, and descriptor.
    pub fn new(
        owner: impl Into<ClassName>,
        name: impl Into<Arc<str>>,
        descriptor: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            owner: owner.into(),
            sig: MethodSig::new(name, descriptor),
        }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.sig)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_count() {
        assert_eq!(MethodSig::new("f", "()V").arg_count(), 0);
        assert_eq!(MethodSig::new("f", "(I)V").arg_count(), 1);
        assert_eq!(MethodSig::new("f", "(III)I").arg_count(), 3);
    }

    #[test]
    fn test_returns_value() {
        assert!(!MethodSig::new("f", "()V").returns_value());
        assert!(MethodSig::new("f", "()I").returns_value());
    }

    #[test]
    fn test_malformed_descriptor_has_no_args() {
        assert_eq!(MethodSig::new("f", "broken").arg_count(), 0);
    }

    #[test]
    fn test_display() {
        let r = MethodRef::new("demo/Worker", "step", "(I)I");
        assert_eq!(r.to_string(), "demo/Worker.step(I)I");
    }

    #[test]
    fn test_sig_equality_is_name_and_descriptor() {
        assert_eq!(MethodSig::new("f", "(I)V"), MethodSig::new("f", "(I)V"));
        assert_ne!(MethodSig::new("f", "(I)V"), MethodSig::new("f", "(II)V"));
        assert_ne!(MethodSig::new("f", "(I)V"), MethodSig::new("g", "(I)V"));
    }
}
