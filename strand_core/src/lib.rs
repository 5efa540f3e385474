//! Shared leaf types for the Strand instrumentation engine.
//!
//! Strand rewrites compiled method bodies so that lightweight cooperative
//! threads ("strands") can suspend mid-execution and later resume at the
//! same instruction with equivalent local state. This crate holds the types
//! every other Strand crate speaks in:
//!
//! - [`MethodSig`] / [`MethodRef`]: method identities
//! - [`SuspendableType`]: the monotonic classification lattice
//! - [`InstrumentError`]: the error taxonomy
//! - [`Log`] / [`Logger`]: the diagnostics sink
//! - [`InstrumentConfig`]: session configuration

pub mod config;
pub mod error;
pub mod log;
pub mod name;
pub mod rt;
pub mod suspendable;

pub use config::{InstrumentConfig, UnknownPolicy};
pub use error::{Construct, InstrumentError, InstrumentResult};
pub use log::{Log, LogLevel, Logger, NopLog, StderrLog};
pub use name::{ClassName, MethodRef, MethodSig};
pub use suspendable::SuspendableType;
