//! Error taxonomy for analysis and transformation.
//!
//! Unresolved dependencies are never errors; the database defers them via
//! its worklist. Everything here aborts processing of the single class in
//! question and leaves other classes' results untouched.

use crate::name::MethodRef;
use crate::suspendable::SuspendableType;
use std::fmt;

/// Convenience alias used throughout the engine.
pub type InstrumentResult<T> = Result<T, InstrumentError>;

// =============================================================================
// Instrument Error
// =============================================================================

/// A per-class failure during analysis or rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrumentError {
    /// The same method received conflicting explicit classifications. This
    /// is a configuration/policy error and is surfaced immediately: the
    /// correctness of suspension depends on a consistent contract.
    InconsistentClassification {
        /// The method with the conflicting contract.
        method: MethodRef,
        /// The classification already recorded.
        existing: SuspendableType,
        /// The conflicting classification that arrived later.
        conflicting: SuspendableType,
    },

    /// The structural verifier rejected a transformed body. Always an
    /// implementation bug in the rewrite, never a recoverable condition.
    FailedVerification {
        /// The method whose transformed body failed.
        method: MethodRef,
        /// Instruction index the verifier flagged.
        pc: u32,
        /// Verifier diagnostic.
        reason: String,
    },

    /// The method contains a shape the engine cannot safely split.
    UnsupportedConstruct {
        /// The offending method.
        method: MethodRef,
        /// Instruction index of the offending suspension point.
        pc: u32,
        /// The specific construct.
        construct: Construct,
    },
}

/// The specific control-flow shapes the engine refuses to split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Construct {
    /// A suspension point inside a monitor region (or a synchronized
    /// method), disallowed unless `allow_monitors` is set.
    SuspendInsideMonitor,
    /// More local slots than the 64-bit liveness bitmap covers.
    TooManyLocals(u32),
}

impl fmt::Display for InstrumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InconsistentClassification {
                method,
                existing,
                conflicting,
            } => write!(
                f,
                "inconsistent classification for {method}: {existing:?} vs {conflicting:?}"
            ),
            Self::FailedVerification { method, pc, reason } => {
                write!(f, "verification of {method} failed at pc {pc}: {reason}")
            }
            Self::UnsupportedConstruct {
                method,
                pc,
                construct,
            } => match construct {
                Construct::SuspendInsideMonitor => write!(
                    f,
                    "suspension point at pc {pc} in {method} lies inside a monitor region"
                ),
                Construct::TooManyLocals(n) => write!(
                    f,
                    "{method} uses {n} local slots at pc {pc}; at most 64 are supported"
                ),
            },
        }
    }
}

impl std::error::Error for InstrumentError {}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn method() -> MethodRef {
        MethodRef::new("demo/Worker", "step", "(I)I")
    }

    #[test]
    fn test_inconsistent_display() {
        let e = InstrumentError::InconsistentClassification {
            method: method(),
            existing: SuspendableType::Suspendable,
            conflicting: SuspendableType::NonSuspendable,
        };
        let s = e.to_string();
        assert!(s.contains("demo/Worker.step(I)I"));
        assert!(s.contains("Suspendable"));
    }

    #[test]
    fn test_unsupported_monitor_display() {
        let e = InstrumentError::UnsupportedConstruct {
            method: method(),
            pc: 7,
            construct: Construct::SuspendInsideMonitor,
        };
        assert!(e.to_string().contains("monitor region"));
        assert!(e.to_string().contains("pc 7"));
    }

    #[test]
    fn test_too_many_locals_display() {
        let e = InstrumentError::UnsupportedConstruct {
            method: method(),
            pc: 0,
            construct: Construct::TooManyLocals(80),
        };
        assert!(e.to_string().contains("80"));
    }
}
