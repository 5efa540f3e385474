//! Fixpoint propagation over the hierarchy and call graphs.
//!
//! Three monotonic passes iterate until nothing changes:
//!
//! 1. **Hierarchy**: a method overriding a `Suspendable`/`SuspendableSuper`
//!    contract anywhere in its ancestry is upgraded to at least
//!    `SuspendableSuper`. A pinned `NonSuspendable` method inheriting such a
//!    contract is an inconsistent classification and fails immediately.
//! 2. **Resolution**: a classifier-silent method whose ancestry is fully
//!    known and whose call targets are all resolved settles to
//!    `NonSuspendable`.
//! 3. **Call graph**: `requires_instrumentation` spreads from suspendable
//!    targets to their callers, transitively; mutual recursion converges
//!    because the flag only flips one way.
//!
//! Every classification update is idempotent and only strengthens, so the
//! fixpoint is independent of registration order. Gaps discovered along the
//! way (branches crossing classes not yet in the database) rebuild the
//! worklist; they are re-examined on every later registration.

use crate::database::{MethodDatabase, TargetStatus};
use crate::entry::WorkListEntry;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use strand_bytecode::CallSite;
use strand_core::{
    ClassName, InstrumentError, InstrumentResult, MethodRef, MethodSig, SuspendableType,
};

/// Run propagation to a fixpoint and rebuild the worklist from the gaps of
/// the final (stable) iteration.
pub(crate) fn run(db: &MethodDatabase) -> InstrumentResult<()> {
    let mut gaps: Vec<WorkListEntry> = Vec::new();
    loop {
        gaps.clear();
        let mut changed = false;
        changed |= hierarchy_pass(db, &mut gaps)?;
        changed |= resolution_pass(db, &mut gaps);
        changed |= callgraph_pass(db, &mut gaps);
        if !changed {
            break;
        }
    }
    db.rebuild_worklist(gaps);
    Ok(())
}

// =============================================================================
// Hierarchy Pass
// =============================================================================

fn hierarchy_pass(db: &MethodDatabase, gaps: &mut Vec<WorkListEntry>) -> InstrumentResult<bool> {
    let mut changed = false;
    for entry in db.entries() {
        let sigs: Vec<MethodSig> = {
            let info = entry.read();
            if !info.resolved {
                continue;
            }
            info.methods.keys().cloned().collect()
        };

        for sig in sigs {
            let (contract, gap) = ancestor_contract(db, entry.name(), &sig);
            if let Some(awaiting) = gap {
                gaps.push(WorkListEntry::new(MethodRef {
                    owner: awaiting,
                    sig: sig.clone(),
                }));
            }
            if !contract.is_suspendable() {
                continue;
            }

            let mut info = entry.write();
            let Some(record) = info.methods.get_mut(&sig) else {
                continue;
            };
            if record.pinned {
                return Err(InstrumentError::InconsistentClassification {
                    method: MethodRef {
                        owner: entry.name().clone(),
                        sig,
                    },
                    existing: SuspendableType::NonSuspendable,
                    conflicting: SuspendableType::SuspendableSuper,
                });
            }
            let upgraded = record
                .suspendable
                .strengthen(SuspendableType::SuspendableSuper);
            if upgraded != record.suspendable {
                record.suspendable = upgraded;
                changed = true;
            }
        }
    }
    Ok(changed)
}

/// The strongest suspendability contract declared by any ancestor of
/// `class` for `sig` (superclass chain and all interfaces, transitively),
/// plus the first class the walk could not resolve.
fn ancestor_contract(
    db: &MethodDatabase,
    class: &ClassName,
    sig: &MethodSig,
) -> (SuspendableType, Option<ClassName>) {
    let mut queue: VecDeque<ClassName> = VecDeque::new();
    let mut visited: FxHashSet<ClassName> = FxHashSet::default();
    visited.insert(class.clone());

    if let Some(entry) = db.class_entry(class) {
        let info = entry.read();
        queue.extend(info.super_name.iter().cloned());
        queue.extend(info.interfaces.iter().cloned());
    }

    let mut contract = SuspendableType::Unknown;
    let mut gap: Option<ClassName> = None;

    while let Some(name) = queue.pop_front() {
        if !visited.insert(name.clone()) {
            continue;
        }
        let Some(entry) = db.class_entry(&name) else {
            gap.get_or_insert(name);
            continue;
        };
        let info = entry.read();
        if !info.resolved {
            gap.get_or_insert(name);
            continue;
        }
        if let Some(record) = info.methods.get(sig) {
            contract = contract.strengthen(record.suspendable);
        }
        queue.extend(info.super_name.iter().cloned());
        queue.extend(info.interfaces.iter().cloned());
    }

    (contract, gap)
}

// =============================================================================
// Resolution Pass
// =============================================================================

/// Settle classifier-silent methods to `NonSuspendable` once nothing can
/// strengthen them anymore: the ancestry is fully known and no call target
/// is pending.
fn resolution_pass(db: &MethodDatabase, gaps: &mut Vec<WorkListEntry>) -> bool {
    let mut changed = false;
    for entry in db.entries() {
        let pending: Vec<(MethodSig, Vec<CallSite>)> = {
            let info = entry.read();
            if !info.resolved {
                continue;
            }
            info.methods
                .iter()
                .filter(|(_, r)| r.suspendable == SuspendableType::Unknown)
                .map(|(sig, r)| (sig.clone(), r.calls.clone()))
                .collect()
        };
        if pending.is_empty() {
            continue;
        }

        let hierarchy_known = db.hierarchy_complete(entry.name());
        for (sig, calls) in pending {
            let mut blocked = !hierarchy_known;
            for site in &calls {
                if db.call_target_status(site) == TargetStatus::Unknown {
                    gaps.push(WorkListEntry::new(site.target.clone()));
                    blocked = true;
                }
            }
            if blocked {
                continue;
            }
            let mut info = entry.write();
            if let Some(record) = info.methods.get_mut(&sig) {
                if record.suspendable == SuspendableType::Unknown {
                    record.suspendable = SuspendableType::NonSuspendable;
                    changed = true;
                }
            }
        }
    }
    changed
}

// =============================================================================
// Call-Graph Pass
// =============================================================================

fn callgraph_pass(db: &MethodDatabase, gaps: &mut Vec<WorkListEntry>) -> bool {
    let mut changed = false;
    for entry in db.entries() {
        let candidates: Vec<(MethodSig, SuspendableType, bool, Vec<CallSite>)> = {
            let info = entry.read();
            if !info.resolved {
                continue;
            }
            info.methods
                .iter()
                .map(|(sig, r)| {
                    (
                        sig.clone(),
                        r.suspendable,
                        r.requires_instrumentation,
                        r.calls.clone(),
                    )
                })
                .collect()
        };

        for (sig, own, already, calls) in candidates {
            let mut requires = own.is_suspendable();
            // Gaps are recorded for every unresolved target, even in methods
            // already flagged: the transform still needs those answers to
            // place suspension points.
            for site in &calls {
                match db.call_target_status(site) {
                    TargetStatus::Suspendable => requires = true,
                    TargetStatus::Unknown => {
                        gaps.push(WorkListEntry::new(site.target.clone()));
                    }
                    TargetStatus::NotSuspendable => {}
                }
            }
            if requires && !already {
                let mut info = entry.write();
                if let Some(record) = info.methods.get_mut(&sig) {
                    if !record.requires_instrumentation {
                        record.requires_instrumentation = true;
                        changed = true;
                    }
                }
            }
        }
    }
    changed
}
