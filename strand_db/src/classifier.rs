//! The pluggable suspendability classifier.
//!
//! The classifier seeds the initial "is this method suspendable" signal from
//! external metadata; the database only propagates it. The engine ships one
//! list-driven implementation; drivers with richer metadata (annotations,
//! naming conventions) provide their own.

use rustc_hash::FxHashSet;
use strand_core::{MethodRef, MethodSig, rt};

// =============================================================================
// Classifier Interface
// =============================================================================

/// The classifier's verdict for one method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Definitely suspendable.
    Suspendable,
    /// Explicitly pinned not-suspendable.
    NonSuspendable,
    /// No opinion; the database resolves via hierarchy and call graph.
    Unknown,
}

/// Initial classification source, consulted at registration time and for
/// outside-scope call targets.
pub trait SuspendableClassifier: Send + Sync {
    /// Classify `owner.sig`.
    fn classify(&self, owner: &str, sig: &MethodSig) -> Classification;
}

// =============================================================================
// List Classifier
// =============================================================================

/// A classifier driven by explicit method lists.
///
/// `treat_blocking_as_suspendable` folds the blocking-call list into the
/// suspendable set, for runtimes that park strands around blocking platform
/// calls.
#[derive(Debug, Default)]
pub struct ListClassifier {
    suspendable: FxHashSet<MethodRef>,
    pinned_not_suspendable: FxHashSet<MethodRef>,
    blocking: FxHashSet<MethodRef>,
    treat_blocking_as_suspendable: bool,
}

impl ListClassifier {
    /// An empty classifier with no opinions.
    pub fn new() -> Self {
        Self::default()
    }

    /// A classifier pre-seeded with the runtime's own suspension primitive.
    pub fn with_runtime_defaults() -> Self {
        let mut c = Self::new();
        c.mark_suspendable(rt::park_ref());
        c
    }

    /// Add a method to the suspendable list.
    pub fn mark_suspendable(&mut self, method: MethodRef) -> &mut Self {
        self.suspendable.insert(method);
        self
    }

    /// Pin a method as never-suspendable.
    pub fn pin_not_suspendable(&mut self, method: MethodRef) -> &mut Self {
        self.pinned_not_suspendable.insert(method);
        self
    }

    /// Add a method to the blocking-call list.
    pub fn mark_blocking(&mut self, method: MethodRef) -> &mut Self {
        self.blocking.insert(method);
        self
    }

    /// Toggle whether blocking calls count as suspendable.
    pub fn set_treat_blocking_as_suspendable(&mut self, enabled: bool) -> &mut Self {
        self.treat_blocking_as_suspendable = enabled;
        self
    }
}

impl SuspendableClassifier for ListClassifier {
    fn classify(&self, owner: &str, sig: &MethodSig) -> Classification {
        let key = MethodRef {
            owner: owner.into(),
            sig: sig.clone(),
        };
        if self.suspendable.contains(&key) {
            return Classification::Suspendable;
        }
        if self.treat_blocking_as_suspendable && self.blocking.contains(&key) {
            return Classification::Suspendable;
        }
        if self.pinned_not_suspendable.contains(&key) {
            return Classification::NonSuspendable;
        }
        Classification::Unknown
    }
}

// =============================================================================
// Tests
// =============================================================================
