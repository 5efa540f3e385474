//! The Method Database: class-hierarchy graph, per-method classification
//! records, and the worklist fixpoint that resolves suspendability across
//! registration order, inheritance, interface dispatch, and call graphs.
//!
//! The database is an explicit context object tied to one analysis session
//! (no ambient singleton). It is process-wide shared state: registration and
//! queries may race from concurrent loading, and serialization is per entry.

pub mod classifier;
pub mod database;
pub mod entry;
mod propagate;

pub use classifier::{Classification, ListClassifier, SuspendableClassifier};
pub use database::{MethodDatabase, TargetStatus};
pub use entry::{ClassEntry, ClassInfo, MethodRecord, WorkListEntry};
