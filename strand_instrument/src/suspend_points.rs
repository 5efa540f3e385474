//! Suspension-point discovery.
//!
//! A suspension point is a call site whose candidate target set can
//! suspend, per the Method Database. Each point carries the facts the
//! rewrite needs: operand-stack depth at the call and the locals live after
//! it.

use crate::liveness::compute_local_liveness;
use strand_bytecode::{CallSite, Insn, MethodBody, MethodFlags, compute_stack_depths};
use strand_core::{
    Construct, InstrumentError, InstrumentResult, LogLevel, MethodRef, UnknownPolicy,
};
use strand_db::{MethodDatabase, TargetStatus};

/// Local slots beyond this cannot be described by the save bitmap.
pub const MAX_LIVENESS_SLOTS: u16 = 64;

// =============================================================================
// Suspension Point
// =============================================================================

/// One call site the rewrite must split the method around.
#[derive(Debug, Clone)]
pub struct SuspensionPoint {
    /// Instruction index of the call in the original body.
    pub pc: u32,
    /// The call site itself.
    pub site: CallSite,
    /// Operand-stack depth at the call (pending values plus arguments).
    pub stack_count: u16,
    /// Locals live after the call returns; exactly these are saved.
    pub liveness: u64,
}

// =============================================================================
// Discovery
// =============================================================================

/// Find the suspension points of `body`, in program order.
///
/// Unreachable call sites are not points: they cannot execute, and the
/// depth simulation has no facts about them. A body with points must fit
/// the 64-slot save bitmap and, unless permitted, must not suspend while
/// holding a monitor.
pub fn find_suspension_points(
    owner: &str,
    body: &MethodBody,
    db: &MethodDatabase,
) -> InstrumentResult<Vec<SuspensionPoint>> {
    if body.is_bodyless() {
        return Ok(Vec::new());
    }

    let method = || MethodRef {
        owner: owner.into(),
        sig: body.sig.clone(),
    };

    let mut point_pcs: Vec<(u32, CallSite)> = Vec::new();
    for (pc, site) in body.call_sites() {
        let suspendable = match db.call_target_status(site) {
            TargetStatus::Suspendable => true,
            TargetStatus::NotSuspendable => false,
            TargetStatus::Unknown => {
                let defensive =
                    db.config().unknown_policy == UnknownPolicy::TreatAsSuspendable;
                db.logger().log(
                    LogLevel::Info,
                    &format!(
                        "unresolved call target {} in {}; {}",
                        site.target,
                        method(),
                        if defensive {
                            "instrumenting defensively"
                        } else {
                            "assuming not suspendable"
                        }
                    ),
                );
                defensive
            }
        };
        if suspendable {
            point_pcs.push((pc, site.clone()));
        }
    }
    if point_pcs.is_empty() {
        return Ok(Vec::new());
    }

    if body.max_locals > MAX_LIVENESS_SLOTS {
        return Err(InstrumentError::UnsupportedConstruct {
            method: method(),
            pc: point_pcs[0].0,
            construct: Construct::TooManyLocals(body.max_locals as u32),
        });
    }

    let depths = compute_stack_depths(body).map_err(|e| InstrumentError::FailedVerification {
        method: method(),
        pc: e.pc,
        reason: format!("input body: {e}"),
    })?;
    let live_in = compute_local_liveness(body);
    let monitors = monitor_depths(body);

    let mut points = Vec::with_capacity(point_pcs.len());
    for (pc, site) in point_pcs {
        let Some(stack_count) = depths[pc as usize] else {
            continue; // unreachable call site
        };
        if monitors[pc as usize] > 0 && !db.config().allow_monitors {
            return Err(InstrumentError::UnsupportedConstruct {
                method: method(),
                pc,
                construct: Construct::SuspendInsideMonitor,
            });
        }
        // Locals needed after resumption are those live at the
        // fall-through successor; the call touches no locals itself.
        let liveness = live_in
            .get(pc as usize + 1)
            .copied()
            .unwrap_or(0);
        points.push(SuspensionPoint {
            pc,
            site,
            stack_count,
            liveness,
        });
    }
    Ok(points)
}

/// Forward monitor-depth analysis: how many monitors are held at each pc.
///
/// Merge points take the maximum, which over-approximates on unbalanced
/// shapes; that only makes the monitor policy stricter, never unsound. A
/// synchronized method holds one monitor for its whole body.
fn monitor_depths(body: &MethodBody) -> Vec<u16> {
    let len = body.instructions.len();
    let base = body.flags.contains(MethodFlags::SYNCHRONIZED) as u16;
    let mut depth: Vec<u16> = vec![base; len];
    if len == 0 {
        return depth;
    }

    let mut changed = true;
    while changed {
        changed = false;
        for (pc, insn) in body.instructions.iter().enumerate() {
            let here = depth[pc];
            let after = match insn {
                Insn::MonitorEnter => here.saturating_add(1),
                Insn::MonitorExit => here.saturating_sub(1),
                _ => here,
            };
            for succ in insn.successors(pc as u32) {
                if (succ as usize) < len && depth[succ as usize] < after {
                    depth[succ as usize] = after;
                    changed = true;
                }
            }
        }
    }
    depth
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use strand_bytecode::{CallKind, ClassModel};
    use strand_core::{InstrumentConfig, Logger, MethodSig, rt};
    use strand_db::ListClassifier;

    fn db(config: InstrumentConfig) -> MethodDatabase {
        MethodDatabase::new(
            Arc::new(ListClassifier::with_runtime_defaults()),
            config,
            Logger::nop(),
        )
    }

    fn park() -> Insn {
        Insn::Invoke(CallSite::of_static(rt::park_ref()))
    }

    fn worker(insns: Vec<Insn>, max_locals: u16, flags: MethodFlags) -> (ClassModel, MethodBody) {
        let mut body = MethodBody::new(MethodSig::new("run", "()V"), flags, max_locals);
        body.instructions = insns;
        let model = ClassModel::new("demo/Worker").with_method(body.clone());
        (model, body)
    }

    #[test]
    fn test_park_call_is_a_point_with_facts() {
        let database = db(InstrumentConfig::default());
        let (model, body) = worker(
            vec![
                Insn::Const(5),
                Insn::Store(0),
                park(),
                Insn::Load(0),
                Insn::Pop,
                Insn::Return,
            ],
            1,
            MethodFlags::STATIC,
        );
        database.register_class(&model).unwrap();

        let points = find_suspension_points("demo/Worker", &body, &database).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].pc, 2);
        assert_eq!(points[0].stack_count, 0);
        assert_eq!(points[0].liveness, 0b1, "slot 0 is read after the call");
    }

    #[test]
    fn test_dead_local_is_not_saved() {
        let database = db(InstrumentConfig::default());
        let (model, body) = worker(
            vec![
                Insn::Const(5),
                Insn::Store(0),
                park(),
                Insn::Return, // slot 0 never read again
            ],
            1,
            MethodFlags::STATIC,
        );
        database.register_class(&model).unwrap();
        let points = find_suspension_points("demo/Worker", &body, &database).unwrap();
        assert_eq!(points[0].liveness, 0);
    }

    #[test]
    fn test_pending_stack_counts_toward_save() {
        // A pending value sits under the (empty) argument list.
        let database = db(InstrumentConfig::default());
        let (model, body) = worker(
            vec![
                Insn::Const(40),
                park(),
                Insn::Const(2),
                Insn::Add,
                Insn::Pop,
                Insn::Return,
            ],
            0,
            MethodFlags::STATIC,
        );
        database.register_class(&model).unwrap();
        let points = find_suspension_points("demo/Worker", &body, &database).unwrap();
        assert_eq!(points[0].stack_count, 1);
    }

    #[test]
    fn test_non_suspendable_calls_are_not_points() {
        let database = db(InstrumentConfig::default());
        let helper = Insn::Invoke(CallSite {
            target: MethodRef::new("demo/Worker", "helper", "()V"),
            kind: CallKind::Static,
        });
        let mut helper_body =
            MethodBody::new(MethodSig::new("helper", "()V"), MethodFlags::STATIC, 0);
        helper_body.instructions = vec![Insn::Return];
        let (mut model, body) = worker(
            vec![helper, Insn::Return],
            0,
            MethodFlags::STATIC,
        );
        model.methods.push(helper_body);
        database.register_class(&model).unwrap();
        let points = find_suspension_points("demo/Worker", &body, &database).unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn test_unknown_target_follows_policy() {
        let mystery = Insn::Invoke(CallSite::of_static(MethodRef::new(
            "demo/NeverLoaded",
            "g",
            "()V",
        )));

        let database = db(InstrumentConfig::default());
        let (model, body) = worker(vec![mystery.clone(), Insn::Return], 0, MethodFlags::STATIC);
        database.register_class(&model).unwrap();
        assert!(
            find_suspension_points("demo/Worker", &body, &database)
                .unwrap()
                .is_empty()
        );

        let defensive = db(InstrumentConfig {
            unknown_policy: UnknownPolicy::TreatAsSuspendable,
            ..InstrumentConfig::default()
        });
        defensive.register_class(&model).unwrap();
        assert_eq!(
            find_suspension_points("demo/Worker", &body, &defensive)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_suspend_inside_monitor_is_rejected() {
        let database = db(InstrumentConfig::default());
        let (model, body) = worker(
            vec![
                Insn::Const(1),
                Insn::MonitorEnter,
                park(),
                Insn::Const(1),
                Insn::MonitorExit,
                Insn::Return,
            ],
            0,
            MethodFlags::STATIC,
        );
        database.register_class(&model).unwrap();
        let err = find_suspension_points("demo/Worker", &body, &database).unwrap_err();
        assert!(matches!(
            err,
            InstrumentError::UnsupportedConstruct {
                construct: Construct::SuspendInsideMonitor,
                pc: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_allow_monitors_permits_it() {
        let database = db(InstrumentConfig {
            allow_monitors: true,
            ..InstrumentConfig::default()
        });
        let (model, body) = worker(
            vec![
                Insn::Const(1),
                Insn::MonitorEnter,
                park(),
                Insn::Const(1),
                Insn::MonitorExit,
                Insn::Return,
            ],
            0,
            MethodFlags::STATIC,
        );
        database.register_class(&model).unwrap();
        assert_eq!(
            find_suspension_points("demo/Worker", &body, &database)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_synchronized_method_counts_as_monitor() {
        let database = db(InstrumentConfig::default());
        let (model, body) = worker(
            vec![park(), Insn::Return],
            0,
            MethodFlags::STATIC | MethodFlags::SYNCHRONIZED,
        );
        database.register_class(&model).unwrap();
        let err = find_suspension_points("demo/Worker", &body, &database).unwrap_err();
        assert!(matches!(
            err,
            InstrumentError::UnsupportedConstruct {
                construct: Construct::SuspendInsideMonitor,
                ..
            }
        ));
    }

    #[test]
    fn test_too_many_locals_is_rejected() {
        let database = db(InstrumentConfig::default());
        let (model, body) = worker(vec![park(), Insn::Return], 65, MethodFlags::STATIC);
        database.register_class(&model).unwrap();
        let err = find_suspension_points("demo/Worker", &body, &database).unwrap_err();
        assert!(matches!(
            err,
            InstrumentError::UnsupportedConstruct {
                construct: Construct::TooManyLocals(65),
                ..
            }
        ));
    }

    #[test]
    fn test_abstract_method_has_no_points() {
        let database = db(InstrumentConfig::default());
        let body = MethodBody::new(MethodSig::new("run", "()V"), MethodFlags::ABSTRACT, 0);
        assert!(
            find_suspension_points("demo/Worker", &body, &database)
                .unwrap()
                .is_empty()
        );
    }
}
