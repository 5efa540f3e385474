//! Session configuration.
//!
//! One immutable struct resolved up front, passed to the database and the
//! instrumentor. No setting is consulted from the environment at transform
//! time.

// =============================================================================
// Unknown Policy
// =============================================================================

/// What to do when a call target's classification is still `Unknown` at the
/// moment the Transformation Engine needs a decision (the owning class never
/// became available in scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownPolicy {
    /// Assume the target cannot suspend. Matches the outside-scope fallback:
    /// platform-library methods are not suspendable unless listed.
    #[default]
    TreatAsNotSuspendable,
    /// Instrument defensively, treating the call as a suspension point.
    TreatAsSuspendable,
}

// =============================================================================
// Instrument Config
// =============================================================================

/// Complete configuration for one analysis/instrumentation session.
#[derive(Debug, Clone)]
pub struct InstrumentConfig {
    /// Permit suspension points inside monitor regions and synchronized
    /// methods. Off by default: parking a strand while holding a monitor is
    /// almost always a deadlock in waiting.
    pub allow_monitors: bool,

    /// Treat methods on the classifier's blocking-call list as suspendable.
    pub allow_blocking: bool,

    /// Run the structural verifier over every transformed body.
    pub check: bool,

    /// Emit `Info` diagnostics for per-class decisions.
    pub verbose: bool,

    /// Emit `Debug` diagnostics, including disassembly of traced classes.
    pub debug: bool,

    /// Fallback when a call target is still unresolved at transform time.
    pub unknown_policy: UnknownPolicy,

    /// Dump the disassembly of this class's transformed methods at `Debug`
    /// level.
    pub trace_class: Option<String>,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            allow_monitors: false,
            allow_blocking: false,
            check: false,
            verbose: false,
            debug: false,
            unknown_policy: UnknownPolicy::default(),
            trace_class: None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
