//! Structural instruction model for compiled methods.
//!
//! This crate is the container-library surface the analysis and
//! transformation engines work against:
//!
//! - [`Insn`] - editable instruction representation, including the
//!   frame intrinsics inserted by the Transformation Engine
//! - [`MethodBody`] / [`ClassModel`] - one method's compiled body and one
//!   class's declarations
//! - [`BodyBuilder`] - label-based emission with forward-reference patching
//! - [`verify`] - structural validation (stack depth, branch targets)

pub mod body;
pub mod builder;
pub mod instruction;
pub mod verify;

pub use body::{ClassModel, ExceptionEntry, MethodBody, MethodFlags, disassemble};
pub use builder::{BodyBuilder, BuildError, Label};
pub use instruction::{CallKind, CallSite, Insn};
pub use verify::{VerifyError, compute_stack_depths, verify_body};
