//! Method bodies and class models.
//!
//! A [`ClassModel`] is the unit handed to the engine: one compiled class's
//! qualified name, hierarchy references, and method bodies. Bodies are
//! mutable only through replacement: the Transformation Engine builds a new
//! body and swaps it in, so a class's output is all-or-nothing.

use crate::instruction::Insn;
use smallvec::SmallVec;
use std::fmt::Write as _;
use strand_core::{ClassName, MethodSig};

// =============================================================================
// Method Flags
// =============================================================================

bitflags::bitflags! {
    /// Access and shape flags of a method declaration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MethodFlags: u32 {
        /// No receiver; dispatch is static.
        const STATIC = 1 << 0;
        /// Cannot be overridden; virtual call sites bind exactly.
        const FINAL = 1 << 1;
        /// Declared without a body (interface/abstract contract).
        const ABSTRACT = 1 << 2;
        /// Implemented outside the analyzed container format.
        const NATIVE = 1 << 3;
        /// The whole body is a monitor region.
        const SYNCHRONIZED = 1 << 4;
    }
}

// =============================================================================
// Exception Table
// =============================================================================

/// One protected range: exceptions raised in `[start_pc, end_pc)` transfer
/// control to `handler_pc` with the operand stack replaced by the raised
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry {
    /// First covered instruction index (inclusive).
    pub start_pc: u32,
    /// Last covered instruction index (exclusive).
    pub end_pc: u32,
    /// Handler entry point.
    pub handler_pc: u32,
}

impl ExceptionEntry {
    /// Whether `pc` lies inside the protected range.
    #[inline]
    pub fn covers(&self, pc: u32) -> bool {
        self.start_pc <= pc && pc < self.end_pc
    }
}

// =============================================================================
// Method Body
// =============================================================================

/// One method's compiled body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBody {
    /// Signature within the owning class.
    pub sig: MethodSig,
    /// Access and shape flags.
    pub flags: MethodFlags,
    /// Number of local slots, parameters included.
    pub max_locals: u16,
    /// The instruction vector; branch operands index into it.
    pub instructions: Vec<Insn>,
    /// Protected ranges, innermost first.
    pub exception_table: Vec<ExceptionEntry>,
}

impl MethodBody {
    /// Create a body with no instructions.
    pub fn new(sig: MethodSig, flags: MethodFlags, max_locals: u16) -> Self {
        Self {
            sig,
            flags,
            max_locals,
            instructions: Vec::new(),
            exception_table: Vec::new(),
        }
    }

    /// Whether this declaration carries no instructions to rewrite.
    #[inline]
    pub fn is_bodyless(&self) -> bool {
        self.flags
            .intersects(MethodFlags::ABSTRACT | MethodFlags::NATIVE)
    }

    /// Iterate the call sites of this body in program order.
    pub fn call_sites(&self) -> impl Iterator<Item = (u32, &crate::instruction::CallSite)> {
        self.instructions
            .iter()
            .enumerate()
            .filter_map(|(pc, insn)| match insn {
                Insn::Invoke(site) => Some((pc as u32, site)),
                _ => None,
            })
    }
}

// =============================================================================
// Class Model
// =============================================================================

/// One compiled class: name, hierarchy references, and declared methods.
///
/// Superclass and interfaces are referenced by name only; resolution is the
/// Method Database's concern and may happen after this model is built.
#[derive(Debug, Clone)]
pub struct ClassModel {
    /// Qualified internal name.
    pub name: ClassName,
    /// Superclass name, if any.
    pub super_name: Option<ClassName>,
    /// Implemented interface names.
    pub interfaces: SmallVec<[ClassName; 2]>,
    /// Declared methods.
    pub methods: Vec<MethodBody>,
}

impl ClassModel {
    /// Create a class with no methods.
    pub fn new(name: impl Into<ClassName>) -> Self {
        Self {
            name: name.into(),
            super_name: None,
            interfaces: SmallVec::new(),
            methods: Vec::new(),
        }
    }

    /// Set the superclass name.
    pub fn with_super(mut self, super_name: impl Into<ClassName>) -> Self {
        self.super_name = Some(super_name.into());
        self
    }

    /// Add an implemented interface name.
    pub fn with_interface(mut self, interface: impl Into<ClassName>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Add a declared method.
    pub fn with_method(mut self, body: MethodBody) -> Self {
        self.methods.push(body);
        self
    }

    /// Find a declared method by signature.
    pub fn method(&self, sig: &MethodSig) -> Option<&MethodBody> {
        self.methods.iter().find(|m| &m.sig == sig)
    }
}

// =============================================================================
// Disassembly
// =============================================================================

/// Render a body as one instruction per line, for trace diagnostics.
pub fn disassemble(body: &MethodBody) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} flags={:?} max_locals={}",
        body.sig, body.flags, body.max_locals
    );
    for (pc, insn) in body.instructions.iter().enumerate() {
        let _ = writeln!(out, "  {pc:4}: {insn:?}");
    }
    for entry in &body.exception_table {
        let _ = writeln!(
            out,
            "  try [{}, {}) -> handler {}",
            entry.start_pc, entry.end_pc, entry.handler_pc
        );
    }
    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{CallSite, Insn};
    use strand_core::MethodRef;

    #[test]
    fn test_exception_entry_covers() {
        let e = ExceptionEntry {
            start_pc: 2,
            end_pc: 5,
            handler_pc: 9,
        };
        assert!(!e.covers(1));
        assert!(e.covers(2));
        assert!(e.covers(4));
        assert!(!e.covers(5));
    }

    #[test]
    fn test_bodyless() {
        let sig = MethodSig::new("f", "()V");
        assert!(MethodBody::new(sig.clone(), MethodFlags::ABSTRACT, 0).is_bodyless());
        assert!(MethodBody::new(sig.clone(), MethodFlags::NATIVE, 0).is_bodyless());
        assert!(!MethodBody::new(sig, MethodFlags::STATIC, 0).is_bodyless());
    }

    #[test]
    fn test_call_sites_in_program_order() {
        let mut body = MethodBody::new(MethodSig::new("f", "()V"), MethodFlags::STATIC, 0);
        body.instructions = vec![
            Insn::Invoke(CallSite::of_static(MethodRef::new("a/A", "x", "()V"))),
            Insn::Const(1),
            Insn::Pop,
            Insn::Invoke(CallSite::of_static(MethodRef::new("a/A", "y", "()V"))),
            Insn::Return,
        ];
        let pcs: Vec<u32> = body.call_sites().map(|(pc, _)| pc).collect();
        assert_eq!(pcs, vec![0, 3]);
    }

    #[test]
    fn test_class_model_lookup() {
        let sig = MethodSig::new("step", "(I)I");
        let model = ClassModel::new("demo/Worker")
            .with_super("demo/Base")
            .with_interface("demo/Task")
            .with_method(MethodBody::new(sig.clone(), MethodFlags::empty(), 2));
        assert_eq!(model.super_name.as_deref(), Some("demo/Base"));
        assert_eq!(model.interfaces.len(), 1);
        assert!(model.method(&sig).is_some());
        assert!(model.method(&MethodSig::new("other", "()V")).is_none());
    }

    #[test]
    fn test_disassemble_mentions_every_pc() {
        let mut body = MethodBody::new(MethodSig::new("f", "()I"), MethodFlags::STATIC, 1);
        body.instructions = vec![Insn::Const(7), Insn::Return];
        let text = disassemble(&body);
        assert!(text.contains("0: Const(7)"));
        assert!(text.contains("1: Return"));
    }
}
