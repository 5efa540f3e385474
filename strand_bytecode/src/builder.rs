//! Label-based body construction.
//!
//! The builder lets passes emit instructions against [`Label`]s instead of
//! absolute pcs; forward references are patched when the body is finished.
//! Adapted from the code-object builder pattern: emit, bind, patch.

use crate::body::{ExceptionEntry, MethodBody, MethodFlags};
use crate::instruction::Insn;
use rustc_hash::FxHashMap;
use std::fmt;
use strand_core::MethodSig;

/// Placeholder pc written into unpatched branch operands.
const UNRESOLVED: u32 = u32::MAX;

/// A jump target to be resolved at finish time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

/// Which operand of an emitted instruction a label patch targets.
#[derive(Debug, Clone, Copy)]
enum RefSlot {
    Jump,
    Branch,
    SwitchCase(usize),
    SwitchDefault,
}

#[derive(Debug)]
struct ForwardRef {
    insn_index: usize,
    slot: RefSlot,
    label: Label,
}

// =============================================================================
// Build Error
// =============================================================================

/// A malformed emission sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    /// A label was referenced but never bound.
    UnboundLabel,
    /// A label was bound twice.
    ReboundLabel,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnboundLabel => f.write_str("label referenced but never bound"),
            Self::ReboundLabel => f.write_str("label bound twice"),
        }
    }
}

impl std::error::Error for BuildError {}

// =============================================================================
// Body Builder
// =============================================================================

/// Builder for one [`MethodBody`].
pub struct BodyBuilder {
    sig: MethodSig,
    flags: MethodFlags,
    max_locals: u16,
    instructions: Vec<Insn>,
    labels: FxHashMap<Label, u32>,
    next_label: u32,
    forward_refs: Vec<ForwardRef>,
    /// Protected ranges as (start, end, handler) labels.
    guards: Vec<(Label, Label, Label)>,
}

impl BodyBuilder {
    /// Start building a body.
    pub fn new(sig: MethodSig, flags: MethodFlags, max_locals: u16) -> Self {
        Self {
            sig,
            flags,
            max_locals,
            instructions: Vec::new(),
            labels: FxHashMap::default(),
            next_label: 0,
            forward_refs: Vec::new(),
            guards: Vec::new(),
        }
    }

    /// Current instruction index.
    #[inline]
    pub fn pc(&self) -> u32 {
        self.instructions.len() as u32
    }

    /// Allocate a fresh local slot and return it.
    pub fn alloc_local(&mut self) -> u16 {
        let slot = self.max_locals;
        self.max_locals += 1;
        slot
    }

    /// Allocate an unbound label.
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Bind `label` to the current pc.
    pub fn bind(&mut self, label: Label) -> Result<(), BuildError> {
        if self.labels.insert(label, self.pc()).is_some() {
            return Err(BuildError::ReboundLabel);
        }
        Ok(())
    }

    /// Emit a non-branching instruction.
    pub fn emit(&mut self, insn: Insn) {
        self.instructions.push(insn);
    }

    /// Emit an unconditional jump to `label`.
    pub fn jump(&mut self, label: Label) {
        self.forward_refs.push(ForwardRef {
            insn_index: self.instructions.len(),
            slot: RefSlot::Jump,
            label,
        });
        self.instructions.push(Insn::Jump(UNRESOLVED));
    }

    /// Emit a branch-if-zero to `label`.
    pub fn branch_if_zero(&mut self, label: Label) {
        self.forward_refs.push(ForwardRef {
            insn_index: self.instructions.len(),
            slot: RefSlot::Branch,
            label,
        });
        self.instructions.push(Insn::BranchIfZero(UNRESOLVED));
    }

    /// Emit a table switch over `cases` with the given default.
    pub fn table_switch(&mut self, cases: &[Label], default: Label) {
        let index = self.instructions.len();
        for (i, case) in cases.iter().enumerate() {
            self.forward_refs.push(ForwardRef {
                insn_index: index,
                slot: RefSlot::SwitchCase(i),
                label: *case,
            });
        }
        self.forward_refs.push(ForwardRef {
            insn_index: index,
            slot: RefSlot::SwitchDefault,
            label: default,
        });
        self.instructions.push(Insn::TableSwitch {
            targets: vec![UNRESOLVED; cases.len()],
            default: UNRESOLVED,
        });
    }

    /// Record a protected range `[start, end)` with the given handler.
    pub fn guard(&mut self, start: Label, end: Label, handler: Label) {
        self.guards.push((start, end, handler));
    }

    /// Resolve all labels and produce the body.
    pub fn finish(mut self) -> Result<MethodBody, BuildError> {
        for fref in &self.forward_refs {
            let pc = *self
                .labels
                .get(&fref.label)
                .ok_or(BuildError::UnboundLabel)?;
            let insn = &mut self.instructions[fref.insn_index];
            match (fref.slot, insn) {
                (RefSlot::Jump, Insn::Jump(t)) => *t = pc,
                (RefSlot::Branch, Insn::BranchIfZero(t)) => *t = pc,
                (RefSlot::SwitchCase(i), Insn::TableSwitch { targets, .. }) => targets[i] = pc,
                (RefSlot::SwitchDefault, Insn::TableSwitch { default, .. }) => *default = pc,
                // Slots are recorded at emission; a mismatch cannot happen.
                _ => unreachable!("forward reference does not match its instruction"),
            }
        }

        let mut exception_table = Vec::with_capacity(self.guards.len());
        for (start, end, handler) in &self.guards {
            let resolve = |label: &Label| self.labels.get(label).copied();
            exception_table.push(ExceptionEntry {
                start_pc: resolve(start).ok_or(BuildError::UnboundLabel)?,
                end_pc: resolve(end).ok_or(BuildError::UnboundLabel)?,
                handler_pc: resolve(handler).ok_or(BuildError::UnboundLabel)?,
            });
        }

        Ok(MethodBody {
            sig: self.sig,
            flags: self.flags,
            max_locals: self.max_locals,
            instructions: self.instructions,
            exception_table,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
