//! Instruction representation.
//!
//! Instructions are a plain editable enum rather than a packed execution
//! format: the engine's job is structural rewriting, and every pass works in
//! terms of instruction indices ("pcs") into a method's instruction vector.
//!
//! The `Frame*` variants are the instrumentation intrinsics. They never
//! appear in input bodies; the Transformation Engine inserts them and the
//! host runtime interprets them against the current strand's frame stack.

use smallvec::SmallVec;
use std::fmt;
use strand_core::MethodRef;

// =============================================================================
// Call Sites
// =============================================================================

/// Dispatch kind of a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Statically bound; the named owner's method is the only target.
    Static,
    /// Bound through the receiver's dynamic class; any override of the named
    /// method is a possible target.
    Virtual,
}

/// One call site: the referenced method plus how it is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSite {
    /// The statically named target.
    pub target: MethodRef,
    /// Dispatch kind.
    pub kind: CallKind,
}

impl CallSite {
    /// Create a statically dispatched call site.
    pub fn of_static(target: MethodRef) -> Self {
        Self {
            target,
            kind: CallKind::Static,
        }
    }

    /// Create a virtually dispatched call site.
    pub fn virtual_(target: MethodRef) -> Self {
        Self {
            target,
            kind: CallKind::Virtual,
        }
    }

    /// Values popped from the operand stack: the arguments, plus the
    /// receiver for virtual dispatch.
    pub fn pops(&self) -> usize {
        let receiver = matches!(self.kind, CallKind::Virtual) as usize;
        self.target.sig.arg_count() + receiver
    }

    /// Values pushed after the call returns normally.
    pub fn pushes(&self) -> usize {
        self.target.sig.returns_value() as usize
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CallKind::Static => write!(f, "static {}", self.target),
            CallKind::Virtual => write!(f, "virtual {}", self.target),
        }
    }
}

// =============================================================================
// Instructions
// =============================================================================

/// One instruction of a method body.
///
/// Branch operands are absolute instruction indices into the owning body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insn {
    /// Push a constant.
    Const(i64),
    /// Push local slot `n`.
    Load(u16),
    /// Pop into local slot `n`.
    Store(u16),
    /// Discard the top of stack.
    Pop,
    /// Duplicate the top of stack.
    Dup,
    /// Pop two, push sum.
    Add,
    /// Pop two, push difference.
    Sub,
    /// Pop two, push product.
    Mul,
    /// Unconditional branch.
    Jump(u32),
    /// Pop; branch if the value is zero, else fall through.
    BranchIfZero(u32),
    /// Pop an index; branch to `targets[index]`, or `default` when out of
    /// range. The dispatch prologue of instrumented methods is one of these.
    TableSwitch {
        /// Per-index targets.
        targets: Vec<u32>,
        /// Target for indices outside `0..targets.len()`.
        default: u32,
    },
    /// Return from the method (popping a value iff the descriptor says so).
    Return,
    /// Pop a value and raise it as an exception.
    Throw,
    /// Pop a reference and acquire its monitor.
    MonitorEnter,
    /// Pop a reference and release its monitor.
    MonitorExit,
    /// Invoke a method; pops per [`CallSite::pops`], pushes per
    /// [`CallSite::pushes`].
    Invoke(CallSite),

    /// Push the resume state: 0 for a fresh call, `k >= 1` when re-entering
    /// to resume at suspension point `k`. When resuming, also selects the
    /// strand's next saved record as the restore source.
    FrameEnter,
    /// Snapshot the live locals and the whole operand stack into the
    /// frame's pending save record. Non-destructive.
    FrameSave {
        /// Suspension point index (1-based).
        point: u16,
        /// Bitmap of live local slots (bit `n` = slot `n`).
        liveness: u64,
        /// Operand stack depth at this point.
        stack_count: u16,
    },
    /// Restore the saved locals and re-push the saved operand stack from the
    /// record selected by `FrameEnter`. Only reachable on the resume path.
    FrameRestore {
        /// Suspension point index (1-based).
        point: u16,
        /// Bitmap of live local slots to restore.
        liveness: u64,
        /// Number of operand stack values to re-push.
        stack_count: u16,
    },
    /// Push 1 if the call that just returned suspended rather than
    /// completed, else 0.
    FrameSuspended,
    /// Tag the pending save record with the next dispatch state and park it
    /// on the strand's frame stack; the following instructions return early.
    FrameSuspendExit {
        /// State to resume into (1-based suspension point index).
        point: u16,
    },
    /// Discard the pending save record on the normal completion path.
    FrameDrop,
}

impl Insn {
    /// Whether control never falls through to the next instruction.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Insn::Jump(_) | Insn::TableSwitch { .. } | Insn::Return | Insn::Throw
        )
    }

    /// Control-flow successors of this instruction at `pc`, not counting
    /// exception edges.
    pub fn successors(&self, pc: u32) -> SmallVec<[u32; 4]> {
        match self {
            Insn::Jump(t) => SmallVec::from_slice(&[*t]),
            Insn::BranchIfZero(t) => SmallVec::from_slice(&[*t, pc + 1]),
            Insn::TableSwitch { targets, default } => {
                let mut out: SmallVec<[u32; 4]> = targets.iter().copied().collect();
                out.push(*default);
                out
            }
            Insn::Return | Insn::Throw => SmallVec::new(),
            _ => SmallVec::from_slice(&[pc + 1]),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
