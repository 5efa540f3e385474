//! The Transformation Engine: rewrites methods that can suspend into
//! dispatch-table state machines.
//!
//! ```text
//! original body                     instrumented body
//! ─────────────                     ─────────────────
//!                                   FrameEnter
//!                                   Store state; Load state
//!                                   TableSwitch [fresh, R1 .. RN]
//! <code before call>            =>  <code before call>
//!                                   FrameSave k          ── live locals + stack
//! Invoke suspendable                Invoke suspendable
//!                                   FrameSuspended
//!                                   BranchIfZero Nk
//!                                   FrameSuspendExit k   ── park record, then
//!                                   Return               ── propagate upward
//! <code after call>             Nk: FrameDrop
//!                                   <code after call>
//!                               Rk: FrameRestore k       ── resume stub
//!                                   Jump <FrameSave k>
//! ```
//!
//! The non-suspending path executes the original instructions in the
//! original order; saves are non-destructive and dropped on normal
//! completion, so observable behavior is bit-for-bit identical.

pub mod instrumentor;
pub mod liveness;
pub mod state_machine;
pub mod suspend_points;

pub use instrumentor::{ClassOutcome, Instrumentor};
pub use liveness::compute_local_liveness;
pub use state_machine::instrument_body;
pub use suspend_points::{SuspensionPoint, find_suspension_points};
