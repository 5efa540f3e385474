//! The dispatch-table state-machine rewrite.
//!
//! States are `{0 .. N}` for a method with `N` suspension points: state 0
//! is the fresh-call entry, and a suspend at point `k` parks the method in
//! state `k`. Re-entry dispatches on the stored state, restores the live
//! locals and operand stack, and re-issues the call at point `k`; the
//! callee, itself instrumented, fast-forwards the same way, so the whole
//! chain re-enters down to the original suspension site.
//!
//! Original instructions are copied in order with branch targets, switch
//! tables, and exception ranges remapped through per-pc labels. Resume
//! stubs are appended after the original code; a stub belonging to a
//! protected call site gets its own exception-table entry so resumption
//! re-enters inside the correct handler scope.

use crate::suspend_points::SuspensionPoint;
use rustc_hash::FxHashMap;
use strand_bytecode::{BodyBuilder, BuildError, Insn, Label, MethodBody};
use strand_core::{InstrumentError, InstrumentResult, MethodRef};

/// Rewrite `body` into a resumable state machine around `points`.
///
/// `points` must be non-empty, in program order, and discovered by
/// [`crate::find_suspension_points`] against the same body.
pub fn instrument_body(
    owner: &str,
    body: &MethodBody,
    points: &[SuspensionPoint],
) -> InstrumentResult<MethodBody> {
    let method = MethodRef {
        owner: owner.into(),
        sig: body.sig.clone(),
    };
    rewrite(body, points).map_err(|e| InstrumentError::FailedVerification {
        method,
        pc: 0,
        reason: format!("state machine emission: {e}"),
    })
}

fn rewrite(body: &MethodBody, points: &[SuspensionPoint]) -> Result<MethodBody, BuildError> {
    let len = body.instructions.len();
    let mut b = BodyBuilder::new(body.sig.clone(), body.flags, body.max_locals);
    // One added local holds the dispatch state; original slots are reused
    // as-is.
    let state_slot = b.alloc_local();

    // A label per original pc (plus one for the end, so exclusive exception
    // ranges remap cleanly), bound as the copy proceeds.
    let old: Vec<Label> = (0..=len).map(|_| b.new_label()).collect();
    let resume: Vec<Label> = points.iter().map(|_| b.new_label()).collect();
    let stub_end: Vec<Label> = points.iter().map(|_| b.new_label()).collect();

    let point_at: FxHashMap<u32, u16> = points
        .iter()
        .enumerate()
        .map(|(i, p)| (p.pc, (i + 1) as u16))
        .collect();

    // Dispatch prologue: state 0 falls into the original entry, state k
    // resumes at point k. An out-of-range state re-enters fresh.
    b.emit(Insn::FrameEnter);
    b.emit(Insn::Store(state_slot));
    b.emit(Insn::Load(state_slot));
    let mut cases = Vec::with_capacity(points.len() + 1);
    cases.push(old[0]);
    cases.extend(resume.iter().copied());
    b.table_switch(&cases, old[0]);

    // Copy the original instructions, expanding each suspension point.
    for (pc, insn) in body.instructions.iter().enumerate() {
        b.bind(old[pc])?;
        if let Some(&k) = point_at.get(&(pc as u32)) {
            let point = &points[(k - 1) as usize];
            b.emit(Insn::FrameSave {
                point: k,
                liveness: point.liveness,
                stack_count: point.stack_count,
            });
            b.emit(insn.clone());
            b.emit(Insn::FrameSuspended);
            let normal = b.new_label();
            b.branch_if_zero(normal);
            b.emit(Insn::FrameSuspendExit { point: k });
            if body.sig.returns_value() {
                b.emit(Insn::Const(0));
            }
            b.emit(Insn::Return);
            b.bind(normal)?;
            b.emit(Insn::FrameDrop);
        } else {
            match insn {
                Insn::Jump(t) => b.jump(old[*t as usize]),
                Insn::BranchIfZero(t) => b.branch_if_zero(old[*t as usize]),
                Insn::TableSwitch { targets, default } => {
                    let targets: Vec<Label> =
                        targets.iter().map(|t| old[*t as usize]).collect();
                    b.table_switch(&targets, old[*default as usize]);
                }
                other => b.emit(other.clone()),
            }
        }
    }
    b.bind(old[len])?;

    // Resume stubs: restore, then re-enter the point's save/call block.
    for (i, point) in points.iter().enumerate() {
        b.bind(resume[i])?;
        b.emit(Insn::FrameRestore {
            point: (i + 1) as u16,
            liveness: point.liveness,
            stack_count: point.stack_count,
        });
        b.jump(old[point.pc as usize]);
        b.bind(stub_end[i])?;
    }

    // Exception ranges remap through the per-pc labels; a range covering a
    // suspension point also covers that point's resume stub.
    for entry in &body.exception_table {
        b.guard(
            old[entry.start_pc as usize],
            old[entry.end_pc as usize],
            old[entry.handler_pc as usize],
        );
        for (i, point) in points.iter().enumerate() {
            if entry.covers(point.pc) {
                b.guard(resume[i], stub_end[i], old[entry.handler_pc as usize]);
            }
        }
    }

    b.finish()
}

// =============================================================================
// Tests
// =============================================================================
