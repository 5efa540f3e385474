//! The per-session instrumentation facade.
//!
//! Drivers hand each candidate class to [`Instrumentor::instrument_class`]
//! and persist the outcome. The facade owns nothing the database does not:
//! it consults classifications, drives the rewrite, optionally re-verifies,
//! and reports one outcome per class. One class's failure never contaminates
//! another's result.

use crate::state_machine::instrument_body;
use crate::suspend_points::find_suspension_points;
use std::sync::Arc;
use strand_bytecode::{ClassModel, MethodBody, disassemble, verify_body};
use strand_core::{
    InstrumentConfig, InstrumentError, InstrumentResult, Log, LogLevel, Logger, MethodRef, rt,
};
use strand_db::{MethodDatabase, SuspendableClassifier, WorkListEntry};

// =============================================================================
// Class Outcome
// =============================================================================

/// Per-class result reported to the driver. Failures
/// (verification, inconsistent classification, unsupported constructs)
/// surface as [`InstrumentError`]s instead.
#[derive(Debug, Clone)]
pub enum ClassOutcome {
    /// No method needed rewriting; persist the input unchanged.
    Unchanged,
    /// At least one method was rewritten.
    Transformed(ClassModel),
}

// =============================================================================
// Instrumentor
// =============================================================================

/// Session facade over the database and the Transformation Engine.
pub struct Instrumentor {
    db: Arc<MethodDatabase>,
}

impl Instrumentor {
    /// Create an instrumentor with a fresh database for one session.
    pub fn new(
        classifier: Arc<dyn SuspendableClassifier>,
        config: InstrumentConfig,
        sink: Arc<dyn Log>,
    ) -> Self {
        let logger = Logger::new(sink, config.verbose, config.debug);
        Self {
            db: Arc::new(MethodDatabase::new(classifier, config, logger)),
        }
    }

    /// Create an instrumentor over an existing (possibly shared) database.
    pub fn with_database(db: Arc<MethodDatabase>) -> Self {
        Self { db }
    }

    /// The session database.
    #[inline]
    pub fn database(&self) -> &Arc<MethodDatabase> {
        &self.db
    }

    /// Still-unresolved deferred entries (for session-end reporting).
    pub fn work_list(&self) -> Vec<WorkListEntry> {
        self.db.work_list()
    }

    /// Whether a class is eligible for rewriting at all. The runtime
    /// support package and the platform library are never touched.
    pub fn should_instrument(name: &str) -> bool {
        !name.starts_with(rt::RUNTIME_PREFIX) && !name.starts_with(rt::PLATFORM_PREFIX)
    }

    /// Analyze and, where required, rewrite one class.
    ///
    /// Registers the class if the database has not seen its declarations
    /// yet, so single-class (streamed) use needs no separate registration
    /// step.
    pub fn instrument_class(&self, model: &ClassModel) -> InstrumentResult<ClassOutcome> {
        let logger = self.db.logger();
        if !Self::should_instrument(&model.name) {
            logger.log(LogLevel::Debug, &format!("skipping {}", model.name));
            return Ok(ClassOutcome::Unchanged);
        }

        if !self.db.is_resolved(&model.name) {
            self.db.register_class(model)?;
        }

        let mut methods: Vec<MethodBody> = Vec::with_capacity(model.methods.len());
        let mut transformed = 0usize;
        for body in &model.methods {
            match self.instrument_method(&model.name, body)? {
                Some(rewritten) => {
                    transformed += 1;
                    methods.push(rewritten);
                }
                None => methods.push(body.clone()),
            }
        }

        if transformed == 0 {
            return Ok(ClassOutcome::Unchanged);
        }

        logger.log(
            LogLevel::Info,
            &format!("transformed {} ({transformed} methods)", model.name),
        );
        Ok(ClassOutcome::Transformed(ClassModel {
            name: model.name.clone(),
            super_name: model.super_name.clone(),
            interfaces: model.interfaces.clone(),
            methods,
        }))
    }

    /// Rewrite one method if it requires instrumentation; `None` leaves the
    /// original body in place.
    fn instrument_method(
        &self,
        owner: &strand_core::ClassName,
        body: &MethodBody,
    ) -> InstrumentResult<Option<MethodBody>> {
        let logger = self.db.logger();
        if body.is_bodyless() || !self.db.requires_instrumentation(owner, &body.sig) {
            return Ok(None);
        }

        let points = find_suspension_points(owner, body, &self.db)?;
        if points.is_empty() {
            // Suspendable by contract but nothing in the body can suspend;
            // callers still treat call sites to it as suspension points.
            logger.log(
                LogLevel::Debug,
                &format!("{owner}.{} has no suspension points", body.sig),
            );
            return Ok(None);
        }

        let rewritten = instrument_body(owner, body, &points)?;

        if self.db.config().check {
            verify_body(&rewritten).map_err(|e| InstrumentError::FailedVerification {
                method: MethodRef {
                    owner: owner.clone(),
                    sig: body.sig.clone(),
                },
                pc: e.pc,
                reason: e.to_string(),
            })?;
        }

        logger.log(
            LogLevel::Info,
            &format!(
                "instrumented {owner}.{} ({} suspension points)",
                body.sig,
                points.len()
            ),
        );
        if logger.debug_enabled()
            && self
                .db
                .config()
                .trace_class
                .as_deref()
                .is_some_and(|traced| traced == owner.as_ref())
        {
            logger.log(LogLevel::Debug, &disassemble(&rewritten));
        }

        Ok(Some(rewritten))
    }
}

// =============================================================================
// Tests
// =============================================================================
