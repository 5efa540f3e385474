//! Structural verification.
//!
//! A worklist simulation propagates operand-stack depth along every
//! control-flow edge (fall-through, branch, switch, and exception edges)
//! and checks that merge points agree, targets are in bounds, locals are in
//! range, and control never falls off the end of the body.
//!
//! After a rewrite, any failure here is a defect in the Transformation
//! Engine, and the result must never be emitted.

use crate::body::MethodBody;
use crate::instruction::Insn;
use std::collections::VecDeque;
use std::fmt;

// =============================================================================
// Verify Error
// =============================================================================

/// A structural defect at a specific instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyError {
    /// Instruction index of the defect.
    pub pc: u32,
    /// What went wrong.
    pub kind: VerifyErrorKind,
}

/// The specific structural defect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyErrorKind {
    /// An instruction pops more values than the stack holds.
    Underflow,
    /// Two paths reach the same pc with different stack depths.
    DepthMismatch {
        /// Depth recorded first.
        expected: u16,
        /// Depth arriving on the conflicting path.
        found: u16,
    },
    /// A branch or switch target is out of bounds.
    BadTarget(u32),
    /// A local slot index is outside `max_locals`.
    BadLocal(u16),
    /// Control can fall through past the last instruction.
    FallsOffEnd,
    /// An exception-table range or handler is out of bounds.
    BadExceptionEntry,
    /// A `FrameSave` declares a stack count different from the actual depth.
    SaveCountMismatch {
        /// Count declared by the instruction.
        declared: u16,
        /// Actual simulated depth.
        actual: u16,
    },
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            VerifyErrorKind::Underflow => write!(f, "stack underflow at pc {}", self.pc),
            VerifyErrorKind::DepthMismatch { expected, found } => write!(
                f,
                "inconsistent stack depth at pc {}: {} vs {}",
                self.pc, expected, found
            ),
            VerifyErrorKind::BadTarget(t) => {
                write!(f, "branch target {} out of bounds at pc {}", t, self.pc)
            }
            VerifyErrorKind::BadLocal(slot) => {
                write!(f, "local slot {} out of bounds at pc {}", slot, self.pc)
            }
            VerifyErrorKind::FallsOffEnd => {
                write!(f, "control falls off the end of the body at pc {}", self.pc)
            }
            VerifyErrorKind::BadExceptionEntry => {
                write!(f, "malformed exception table entry at pc {}", self.pc)
            }
            VerifyErrorKind::SaveCountMismatch { declared, actual } => write!(
                f,
                "frame save at pc {} declares {} stack values but depth is {}",
                self.pc, declared, actual
            ),
        }
    }
}

impl std::error::Error for VerifyError {}

fn err(pc: u32, kind: VerifyErrorKind) -> VerifyError {
    VerifyError { pc, kind }
}

// =============================================================================
// Depth Simulation
// =============================================================================

/// Compute the operand-stack depth at every reachable pc.
///
/// Returns one entry per instruction; `None` marks unreachable code. The
/// Transformation Engine shares this with the verifier to learn the depth at
/// each suspension point.
pub fn compute_stack_depths(body: &MethodBody) -> Result<Vec<Option<u16>>, VerifyError> {
    let len = body.instructions.len() as u32;
    let mut depths: Vec<Option<u16>> = vec![None; len as usize];
    if len == 0 {
        return Ok(depths);
    }

    for entry in &body.exception_table {
        if entry.start_pc >= entry.end_pc || entry.end_pc > len || entry.handler_pc >= len {
            return Err(err(entry.start_pc, VerifyErrorKind::BadExceptionEntry));
        }
    }

    let mut worklist: VecDeque<(u32, u16)> = VecDeque::new();
    worklist.push_back((0, 0));

    while let Some((pc, depth)) = worklist.pop_front() {
        match depths[pc as usize] {
            Some(existing) if existing == depth => continue,
            Some(existing) => {
                return Err(err(
                    pc,
                    VerifyErrorKind::DepthMismatch {
                        expected: existing,
                        found: depth,
                    },
                ));
            }
            None => depths[pc as usize] = Some(depth),
        }

        let insn = &body.instructions[pc as usize];
        let after = apply_effect(body, pc, insn, depth)?;

        for succ in insn.successors(pc) {
            if succ >= len {
                let kind = if succ == pc + 1 && !insn.is_terminator() {
                    VerifyErrorKind::FallsOffEnd
                } else {
                    VerifyErrorKind::BadTarget(succ)
                };
                return Err(err(pc, kind));
            }
            worklist.push_back((succ, after));
        }

        // Exception edges: the handler is entered with the stack replaced by
        // the raised value.
        for entry in &body.exception_table {
            if entry.covers(pc) {
                worklist.push_back((entry.handler_pc, 1));
            }
        }
    }

    Ok(depths)
}

/// Simulate one instruction's stack effect, checking underflow and local
/// bounds.
fn apply_effect(body: &MethodBody, pc: u32, insn: &Insn, depth: u16) -> Result<u16, VerifyError> {
    let need = |n: u16| -> Result<(), VerifyError> {
        if depth < n {
            Err(err(pc, VerifyErrorKind::Underflow))
        } else {
            Ok(())
        }
    };
    let slot_ok = |slot: u16| -> Result<(), VerifyError> {
        if slot >= body.max_locals {
            Err(err(pc, VerifyErrorKind::BadLocal(slot)))
        } else {
            Ok(())
        }
    };

    let after = match insn {
        Insn::Const(_) | Insn::FrameEnter | Insn::FrameSuspended => depth + 1,
        Insn::Load(slot) => {
            slot_ok(*slot)?;
            depth + 1
        }
        Insn::Store(slot) => {
            slot_ok(*slot)?;
            need(1)?;
            depth - 1
        }
        Insn::Pop
        | Insn::BranchIfZero(_)
        | Insn::TableSwitch { .. }
        | Insn::Throw
        | Insn::MonitorEnter
        | Insn::MonitorExit => {
            need(1)?;
            depth - 1
        }
        Insn::Dup => {
            need(1)?;
            depth + 1
        }
        Insn::Add | Insn::Sub | Insn::Mul => {
            need(2)?;
            depth - 1
        }
        Insn::Jump(_) | Insn::FrameSuspendExit { .. } | Insn::FrameDrop => depth,
        Insn::Return => {
            let pops = body.sig.returns_value() as u16;
            need(pops)?;
            depth - pops
        }
        Insn::Invoke(site) => {
            let pops = site.pops() as u16;
            need(pops)?;
            depth - pops + site.pushes() as u16
        }
        Insn::FrameSave { stack_count, .. } => {
            if *stack_count != depth {
                return Err(err(
                    pc,
                    VerifyErrorKind::SaveCountMismatch {
                        declared: *stack_count,
                        actual: depth,
                    },
                ));
            }
            depth
        }
        Insn::FrameRestore { stack_count, .. } => depth + stack_count,
    };
    Ok(after)
}

/// Structurally validate a body.
pub fn verify_body(body: &MethodBody) -> Result<(), VerifyError> {
    compute_stack_depths(body).map(|_| ())
}

// =============================================================================
// Tests
// =============================================================================
