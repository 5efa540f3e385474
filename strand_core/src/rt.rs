//! Well-known runtime support names.
//!
//! The host runtime ships a small support package that instrumented code
//! cooperates with. Its classes are never rewritten, and its `park` method
//! is the canonical suspension primitive every classifier seeds.

use crate::name::MethodRef;

/// Package prefix of the runtime support classes; never instrumented.
pub const RUNTIME_PREFIX: &str = "strand/rt/";

/// Platform library prefix; outside analysis scope, never instrumented.
pub const PLATFORM_PREFIX: &str = "platform/";

/// The strand runtime facade class.
pub const FIBER_CLASS: &str = "strand/rt/Fiber";

/// The canonical suspension primitive: parks the current strand.
pub fn park_ref() -> MethodRef {
    MethodRef::new(FIBER_CLASS, "park", "()V")
}
