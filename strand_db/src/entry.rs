//! Class and method records.
//!
//! A [`ClassEntry`] exists from the first time a class name is seen,
//! whether it was submitted for instrumentation or merely referenced as a
//! superclass, interface, or call target, and persists for the session.
//! Entries are shared (`Arc`) and internally locked, so mutation of one
//! class never serializes against another.

use parking_lot::RwLock;
use smallvec::SmallVec;
use strand_bytecode::{CallSite, MethodFlags};
use strand_core::{ClassName, MethodRef, MethodSig, SuspendableType};

use rustc_hash::FxHashMap;

// =============================================================================
// Method Record
// =============================================================================

/// Per-method classification state.
#[derive(Debug, Clone)]
pub struct MethodRecord {
    /// Current classification; only ever strengthened.
    pub suspendable: SuspendableType,
    /// The classifier explicitly pinned this method `NonSuspendable`.
    /// A pinned method inheriting a suspendable contract is a policy error.
    pub pinned: bool,
    /// Derived call-graph fixpoint property: the method is, or transitively
    /// calls, something suspendable.
    pub requires_instrumentation: bool,
    /// Declaration flags (`FINAL` narrows virtual dispatch).
    pub flags: MethodFlags,
    /// Deduplicated direct call sites of the body.
    pub calls: Vec<CallSite>,
}

impl MethodRecord {
    /// A fresh unresolved record.
    pub fn new(flags: MethodFlags, calls: Vec<CallSite>) -> Self {
        Self {
            suspendable: SuspendableType::Unknown,
            pinned: false,
            requires_instrumentation: false,
            flags,
            calls,
        }
    }

    /// Whether callers must treat call sites binding here as suspension
    /// points: the method is suspendable by contract or can transitively
    /// reach a suspension.
    #[inline]
    pub fn effectively_suspendable(&self) -> bool {
        self.suspendable.is_suspendable() || self.requires_instrumentation
    }
}

// =============================================================================
// Class Entry
// =============================================================================

/// Mutable per-class state behind the entry's lock.
#[derive(Debug, Default)]
pub struct ClassInfo {
    /// True once the class's real declarations were registered; false while
    /// the entry exists only as a reference target.
    pub resolved: bool,
    /// Superclass name, if any.
    pub super_name: Option<ClassName>,
    /// Implemented interface names.
    pub interfaces: SmallVec<[ClassName; 2]>,
    /// Declared methods by signature.
    pub methods: FxHashMap<MethodSig, MethodRecord>,
    /// Known direct subtypes (classes that named this one as superclass or
    /// interface). Drives conservative virtual-dispatch candidate sets.
    pub subclasses: SmallVec<[ClassName; 4]>,
}

/// One class in the session registry.
#[derive(Debug)]
pub struct ClassEntry {
    name: ClassName,
    info: RwLock<ClassInfo>,
}

impl ClassEntry {
    /// Create an unresolved (reference-only) entry.
    pub fn referenced(name: ClassName) -> Self {
        Self {
            name,
            info: RwLock::new(ClassInfo::default()),
        }
    }

    /// The class's qualified name.
    #[inline]
    pub fn name(&self) -> &ClassName {
        &self.name
    }

    /// Shared read access to the class state.
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, ClassInfo> {
        self.info.read()
    }

    /// Exclusive write access to the class state.
    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, ClassInfo> {
        self.info.write()
    }

    /// Whether any declared method requires instrumentation.
    pub fn requires_instrumentation(&self) -> bool {
        self.read()
            .methods
            .values()
            .any(|m| m.requires_instrumentation)
    }
}

// =============================================================================
// Worklist
// =============================================================================

/// A deferred resolution task: a method whose classification could not be
/// finalized when first requested, typically because its owning class had
/// not yet been presented to the database. Every registration of a class
/// with that name re-evaluates (and, if resolvable, removes) the entry, and
/// the propagation pass carries the result to dependents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkListEntry {
    /// The unresolved method; its owner is the class being awaited.
    pub method: MethodRef,
}

impl WorkListEntry {
    /// Create an entry awaiting `method`'s owning class.
    pub fn new(method: MethodRef) -> Self {
        Self { method }
    }

    /// The class whose registration unblocks this entry.
    #[inline]
    pub fn awaiting(&self) -> &ClassName {
        &self.method.owner
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_record_is_unknown() {
        let r = MethodRecord::new(MethodFlags::empty(), Vec::new());
        assert_eq!(r.suspendable, SuspendableType::Unknown);
        assert!(!r.pinned);
        assert!(!r.requires_instrumentation);
        assert!(!r.effectively_suspendable());
    }

    #[test]
    fn test_effectively_suspendable() {
        let mut r = MethodRecord::new(MethodFlags::empty(), Vec::new());
        r.suspendable = SuspendableType::SuspendableSuper;
        assert!(r.effectively_suspendable());

        let mut r = MethodRecord::new(MethodFlags::empty(), Vec::new());
        r.requires_instrumentation = true;
        assert!(r.effectively_suspendable());
    }

    #[test]
    fn test_referenced_entry_is_unresolved() {
        let e = ClassEntry::referenced("demo/Worker".into());
        assert!(!e.read().resolved);
        assert!(!e.requires_instrumentation());
    }
}
