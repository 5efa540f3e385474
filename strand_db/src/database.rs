//! The shared method database.
//!
//! One [`MethodDatabase`] spans one analysis session. Classes may arrive in
//! any order, streamed one at a time or in batches, from any thread; every
//! query answers with the best currently-known classification and records a
//! worklist entry for anything it could not finalize.
//!
//! Locking discipline: the registry is a `DashMap` of `Arc<ClassEntry>`;
//! each entry carries its own `RwLock`. No code path holds two entry locks
//! at once, and no lock is held across a registry insertion.

use crate::classifier::{Classification, SuspendableClassifier};
use crate::entry::{ClassEntry, MethodRecord, WorkListEntry};
use crate::propagate;
use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use strand_bytecode::{CallKind, CallSite, ClassModel, MethodBody};
use strand_core::{
    ClassName, InstrumentConfig, InstrumentError, InstrumentResult, LogLevel, Logger, MethodRef,
    MethodSig, SuspendableType,
};

// =============================================================================
// Target Status
// =============================================================================

/// Aggregated suspendability of a call site over its whole candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    /// Some candidate target can suspend; the call is a suspension point.
    Suspendable,
    /// Every candidate is resolved and none can suspend.
    NotSuspendable,
    /// At least one candidate is unresolved; no conclusion yet.
    Unknown,
}

/// Result of an upward method resolution.
pub(crate) enum Lookup {
    /// The resolving record's state.
    Found {
        suspendable: SuspendableType,
        requires_instrumentation: bool,
        is_final: bool,
    },
    /// Resolution crossed a class that is not (yet) in the database.
    Gap(ClassName),
    /// The hierarchy is fully known and nothing declares the signature.
    Absent,
}

// =============================================================================
// Method Database
// =============================================================================

/// Process-wide classification state for one analysis session.
pub struct MethodDatabase {
    classes: DashMap<ClassName, Arc<ClassEntry>>,
    worklist: Mutex<Vec<WorkListEntry>>,
    classifier: Arc<dyn SuspendableClassifier>,
    config: InstrumentConfig,
    logger: Logger,
}

impl MethodDatabase {
    /// Create a database for one session.
    pub fn new(
        classifier: Arc<dyn SuspendableClassifier>,
        config: InstrumentConfig,
        logger: Logger,
    ) -> Self {
        Self {
            classes: DashMap::new(),
            worklist: Mutex::new(Vec::new()),
            classifier,
            config,
            logger,
        }
    }

    /// The session configuration.
    #[inline]
    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    /// The session diagnostics handle.
    #[inline]
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Look up a class entry without creating one.
    pub fn class_entry(&self, name: &str) -> Option<Arc<ClassEntry>> {
        self.classes.get(name).map(|e| Arc::clone(e.value()))
    }

    /// Whether a class has been registered with its real declarations.
    pub fn is_resolved(&self, name: &str) -> bool {
        self.class_entry(name)
            .map(|e| e.read().resolved)
            .unwrap_or(false)
    }

    /// Get or create the entry for `name`; a created entry is a bare
    /// reference until `register_class` resolves it. Concurrent creation
    /// collapses to one winner.
    pub(crate) fn entry_or_reference(&self, name: &ClassName) -> Arc<ClassEntry> {
        Arc::clone(
            self.classes
                .entry(name.clone())
                .or_insert_with(|| Arc::new(ClassEntry::referenced(name.clone())))
                .value(),
        )
    }

    /// Snapshot of all current entries, for iteration without holding
    /// registry locks.
    pub(crate) fn entries(&self) -> Vec<Arc<ClassEntry>> {
        self.classes
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register one class's declarations. Idempotent: re-registering the
    /// same content changes no classification and grows no worklist. If the
    /// class was previously only referenced, the real declarations are
    /// merged in and every pending entry naming this class is re-evaluated.
    pub fn register_class(&self, model: &ClassModel) -> InstrumentResult<()> {
        let entry = self.entry_or_reference(&model.name);
        {
            let mut info = entry.write();
            if !info.resolved {
                info.resolved = true;
                info.super_name = model.super_name.clone();
                info.interfaces = model.interfaces.clone();
            }
            for body in &model.methods {
                info.methods
                    .entry(body.sig.clone())
                    .or_insert_with(|| MethodRecord::new(body.flags, dedup_calls(body)));
            }
        }

        // Reverse hierarchy edges drive conservative virtual dispatch.
        for parent in model.super_name.iter().chain(model.interfaces.iter()) {
            let parent_entry = self.entry_or_reference(parent);
            let mut info = parent_entry.write();
            if !info.subclasses.contains(&model.name) {
                info.subclasses.push(model.name.clone());
            }
        }

        // Seed classifications from the pluggable classifier.
        for body in &model.methods {
            let classification = self.classifier.classify(&model.name, &body.sig);
            self.apply_seed(&entry, &model.name, &body.sig, classification)?;
        }

        self.logger.log(
            LogLevel::Info,
            &format!(
                "registered {} ({} methods)",
                model.name,
                model.methods.len()
            ),
        );

        propagate::run(self)
    }

    /// Fold one classifier verdict into a record, surfacing conflicts.
    fn apply_seed(
        &self,
        entry: &ClassEntry,
        class: &ClassName,
        sig: &MethodSig,
        classification: Classification,
    ) -> InstrumentResult<()> {
        let mut info = entry.write();
        let Some(record) = info.methods.get_mut(sig) else {
            return Ok(());
        };
        match classification {
            Classification::Suspendable => {
                if record.pinned {
                    return Err(InstrumentError::InconsistentClassification {
                        method: MethodRef {
                            owner: class.clone(),
                            sig: sig.clone(),
                        },
                        existing: SuspendableType::NonSuspendable,
                        conflicting: SuspendableType::Suspendable,
                    });
                }
                record.suspendable = record.suspendable.strengthen(SuspendableType::Suspendable);
            }
            Classification::NonSuspendable => {
                if record.suspendable.is_suspendable() {
                    return Err(InstrumentError::InconsistentClassification {
                        method: MethodRef {
                            owner: class.clone(),
                            sig: sig.clone(),
                        },
                        existing: record.suspendable,
                        conflicting: SuspendableType::NonSuspendable,
                    });
                }
                record.pinned = true;
                record.suspendable = record
                    .suspendable
                    .strengthen(SuspendableType::NonSuspendable);
            }
            Classification::Unknown => {}
        }
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Best currently-known classification of `class.sig`, resolving
    /// inherited methods upward. Returns `Unknown` and records a worklist
    /// entry when the answer depends on a class not yet in the database.
    pub fn classify(&self, class: &str, sig: &MethodSig) -> SuspendableType {
        match self.find_up(class, sig) {
            Lookup::Found { suspendable, .. } => suspendable,
            Lookup::Gap(awaiting) => {
                self.push_worklist(WorkListEntry::new(MethodRef {
                    owner: awaiting,
                    sig: sig.clone(),
                }));
                SuspendableType::Unknown
            }
            // Fully known hierarchy, no such method: outside-scope fallback.
            Lookup::Absent => SuspendableType::NonSuspendable,
        }
    }

    /// Whether `class.sig` must be rewritten: it is, or transitively calls,
    /// something suspendable.
    pub fn requires_instrumentation(&self, class: &str, sig: &MethodSig) -> bool {
        match self.find_up(class, sig) {
            Lookup::Found {
                requires_instrumentation,
                ..
            } => requires_instrumentation,
            _ => false,
        }
    }

    /// Aggregate suspendability of one call site over all dispatch
    /// candidates. Virtual sites include every known override of the named
    /// target unless the resolving method is final; all candidates must be
    /// resolved before the answer is `NotSuspendable`.
    pub fn call_target_status(&self, site: &CallSite) -> TargetStatus {
        // An explicit classifier opinion covers outside-scope targets (the
        // allow-list for platform methods) without requiring registration.
        match self
            .classifier
            .classify(&site.target.owner, &site.target.sig)
        {
            Classification::Suspendable => return TargetStatus::Suspendable,
            Classification::NonSuspendable => return TargetStatus::NotSuspendable,
            Classification::Unknown => {}
        }

        let mut unresolved = false;
        let mut resolving_is_final = false;
        match self.find_up(&site.target.owner, &site.target.sig) {
            Lookup::Found {
                suspendable,
                requires_instrumentation,
                is_final,
            } => {
                if suspendable.is_suspendable() || requires_instrumentation {
                    return TargetStatus::Suspendable;
                }
                resolving_is_final = is_final;
                if suspendable == SuspendableType::Unknown {
                    unresolved = true;
                }
            }
            Lookup::Gap(_) => unresolved = true,
            Lookup::Absent => {}
        }

        if site.kind == CallKind::Virtual && !resolving_is_final {
            for sub in self.transitive_subclasses(&site.target.owner) {
                let info = sub.read();
                if let Some(record) = info.methods.get(&site.target.sig) {
                    if record.effectively_suspendable() {
                        return TargetStatus::Suspendable;
                    }
                    if record.suspendable == SuspendableType::Unknown {
                        unresolved = true;
                    }
                }
            }
        }

        if unresolved {
            TargetStatus::Unknown
        } else {
            TargetStatus::NotSuspendable
        }
    }

    /// Force another propagation pass and report the entries that remain
    /// unresolved. Intended after a batch of registrations, and at session
    /// end, where every survivor is logged as a warning.
    pub fn resolve_pending(&self) -> InstrumentResult<Vec<WorkListEntry>> {
        propagate::run(self)?;
        let remaining = self.work_list();
        for entry in &remaining {
            self.logger.log(
                LogLevel::Warning,
                &format!("unresolved dependency: {}", entry.method),
            );
        }
        Ok(remaining)
    }

    /// Snapshot of the current worklist.
    pub fn work_list(&self) -> Vec<WorkListEntry> {
        self.worklist.lock().clone()
    }

    // =========================================================================
    // Resolution Helpers
    // =========================================================================

    /// Resolve `sig` starting at `class`, walking the superclass chain and
    /// all implemented interfaces (transitively, diamonds visited once).
    /// The first record found in breadth-first order resolves the call; a
    /// branch crossing an unknown class reports a gap unless a record was
    /// found first.
    pub(crate) fn find_up(&self, class: &str, sig: &MethodSig) -> Lookup {
        let mut queue: VecDeque<ClassName> = VecDeque::new();
        let mut visited: FxHashSet<ClassName> = FxHashSet::default();
        let mut gap: Option<ClassName> = None;
        queue.push_back(class.into());

        while let Some(name) = queue.pop_front() {
            if !visited.insert(name.clone()) {
                continue;
            }
            let Some(entry) = self.class_entry(&name) else {
                gap.get_or_insert(name);
                continue;
            };
            let info = entry.read();
            if !info.resolved {
                gap.get_or_insert(name);
                continue;
            }
            if let Some(record) = info.methods.get(sig) {
                return Lookup::Found {
                    suspendable: record.suspendable,
                    requires_instrumentation: record.requires_instrumentation,
                    is_final: record.flags.contains(strand_bytecode::MethodFlags::FINAL),
                };
            }
            if let Some(super_name) = &info.super_name {
                queue.push_back(super_name.clone());
            }
            for interface in &info.interfaces {
                queue.push_back(interface.clone());
            }
        }

        match gap {
            Some(name) => Lookup::Gap(name),
            None => Lookup::Absent,
        }
    }

    /// All registered transitive subtypes of `class`. Diamonds through
    /// interfaces are visited once.
    pub(crate) fn transitive_subclasses(&self, class: &str) -> Vec<Arc<ClassEntry>> {
        let mut out = Vec::new();
        let mut visited: FxHashSet<ClassName> = FxHashSet::default();
        let mut queue: VecDeque<ClassName> = VecDeque::new();
        let root: ClassName = class.into();
        visited.insert(root.clone());
        queue.push_back(root);

        while let Some(name) = queue.pop_front() {
            let Some(entry) = self.class_entry(&name) else {
                continue;
            };
            let subs: Vec<ClassName> = entry.read().subclasses.iter().cloned().collect();
            for sub in subs {
                if visited.insert(sub.clone()) {
                    if let Some(sub_entry) = self.class_entry(&sub) {
                        out.push(sub_entry);
                    }
                    queue.push_back(sub);
                }
            }
        }
        out
    }

    /// Whether every ancestor of `class` (transitively) is resolved.
    pub(crate) fn hierarchy_complete(&self, class: &str) -> bool {
        let mut queue: VecDeque<ClassName> = VecDeque::new();
        let mut visited: FxHashSet<ClassName> = FxHashSet::default();
        queue.push_back(class.into());

        while let Some(name) = queue.pop_front() {
            if !visited.insert(name.clone()) {
                continue;
            }
            let Some(entry) = self.class_entry(&name) else {
                return false;
            };
            let info = entry.read();
            if !info.resolved {
                return false;
            }
            if let Some(super_name) = &info.super_name {
                queue.push_back(super_name.clone());
            }
            for interface in &info.interfaces {
                queue.push_back(interface.clone());
            }
        }
        true
    }

    /// Record a deferred entry, deduplicated.
    pub(crate) fn push_worklist(&self, entry: WorkListEntry) {
        let mut worklist = self.worklist.lock();
        if !worklist.contains(&entry) {
            worklist.push(entry);
        }
    }

    /// Drop entries whose awaited class has been resolved and fold in the
    /// gaps discovered by the latest propagation pass.
    pub(crate) fn rebuild_worklist(&self, gaps: Vec<WorkListEntry>) {
        let mut worklist = self.worklist.lock();
        worklist.retain(|e| !self.is_resolved(e.awaiting()));
        for gap in gaps {
            if !self.is_resolved(gap.awaiting()) && !worklist.contains(&gap) {
                worklist.push(gap);
            }
        }
    }
}

/// Collect a body's call sites in program order, deduplicated.
fn dedup_calls(body: &MethodBody) -> Vec<CallSite> {
    let mut seen: FxHashSet<&CallSite> = FxHashSet::default();
    let mut calls = Vec::new();
    for (_, site) in body.call_sites() {
        if seen.insert(site) {
            calls.push(site.clone());
        }
    }
    calls
}

// =============================================================================
// Tests
// =============================================================================
