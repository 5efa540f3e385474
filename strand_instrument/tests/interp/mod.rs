//! Reference interpreter for instrumented bodies.
//!
//! Executes the instruction model the way a host runtime would: one strand,
//! a frame stack of saved records, and the `strand/rt/Fiber.park` intrinsic
//! as the suspension primitive. `park` can be armed to suspend after a given
//! number of completed calls, which lets tests force a suspend at an exact
//! suspension point and then resume.

use rustc_hash::FxHashMap;
use strand_bytecode::{ClassModel, Insn, MethodBody};
use strand_core::{MethodRef, rt};

/// One parked activation: the dispatch state to resume into plus the saved
/// locals and operand stack.
#[derive(Debug)]
pub struct SavedFrame {
    state: u16,
    locals: Vec<(u16, i64)>,
    stack: Vec<i64>,
}

/// Result of driving an entry method.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The call ran to completion.
    Completed(Option<i64>),
    /// Some suspension point fired; resume to continue.
    Suspended,
}

/// A single-strand machine over a set of class models.
pub struct Machine {
    classes: FxHashMap<String, ClassModel>,
    /// Saved records, outermost frame last.
    saved: Vec<SavedFrame>,
    /// Record selected by `FrameEnter` for the frame being re-entered.
    restore_source: Option<SavedFrame>,
    suspending: bool,
    resuming: bool,
    /// `Some(n)`: park completes normally `n` times, then suspends.
    /// `None`: park never suspends.
    park_after: Option<u32>,
    /// Values observed by `platform/Trace.record`, in call order.
    pub trace: Vec<i64>,
}

impl Machine {
    pub fn new(models: impl IntoIterator<Item = ClassModel>) -> Self {
        Self {
            classes: models
                .into_iter()
                .map(|m| (m.name.as_ref().to_string(), m))
                .collect(),
            saved: Vec::new(),
            restore_source: None,
            suspending: false,
            resuming: false,
            park_after: None,
            trace: Vec::new(),
        }
    }

    /// Suspend at the `n`-th park call (0 = the first one).
    pub fn arm_park(&mut self, completed_before_suspend: u32) {
        self.park_after = Some(completed_before_suspend);
    }

    /// Let every park call complete normally.
    pub fn disarm_park(&mut self) {
        self.park_after = None;
    }

    /// Invoke `entry` fresh.
    pub fn call(&mut self, entry: &MethodRef, args: &[i64]) -> Outcome {
        self.suspending = false;
        let ret = self.invoke(entry, args);
        self.finish(ret)
    }

    /// Re-invoke `entry` to resume the parked chain.
    pub fn resume(&mut self, entry: &MethodRef, args: &[i64]) -> Outcome {
        assert!(!self.saved.is_empty(), "nothing to resume");
        self.suspending = false;
        self.resuming = true;
        let ret = self.invoke(entry, args);
        self.finish(ret)
    }

    fn finish(&mut self, ret: Option<i64>) -> Outcome {
        if self.suspending {
            Outcome::Suspended
        } else {
            Outcome::Completed(ret)
        }
    }

    fn invoke(&mut self, target: &MethodRef, args: &[i64]) -> Option<i64> {
        // Runtime intrinsics.
        if target.owner.as_ref() == rt::FIBER_CLASS && target.sig.name.as_ref() == "park" {
            if self.resuming {
                self.resuming = false;
            } else {
                match self.park_after {
                    Some(0) => self.suspending = true,
                    Some(n) => self.park_after = Some(n - 1),
                    None => {}
                }
            }
            return None;
        }
        if target.owner.as_ref() == "platform/Trace" && target.sig.name.as_ref() == "record" {
            self.trace.push(args[0]);
            return None;
        }

        let body = self
            .resolve(target)
            .unwrap_or_else(|| panic!("unresolved method {target}"))
            .clone();
        self.run(&body, args)
    }

    /// Resolve a method by walking the superclass chain.
    fn resolve(&self, target: &MethodRef) -> Option<&MethodBody> {
        let mut current = target.owner.as_ref().to_string();
        loop {
            let class = self.classes.get(&current)?;
            if let Some(body) = class.method(&target.sig) {
                return Some(body);
            }
            current = class.super_name.clone()?.as_ref().to_string();
        }
    }

    fn run(&mut self, body: &MethodBody, args: &[i64]) -> Option<i64> {
        let mut locals = vec![0i64; body.max_locals as usize];
        locals[..args.len()].copy_from_slice(args);
        let mut stack: Vec<i64> = Vec::new();
        let mut pending: Option<SavedFrame> = None;
        let mut pc: usize = 0;

        loop {
            match &body.instructions[pc] {
                Insn::Const(v) => stack.push(*v),
                Insn::Load(slot) => stack.push(locals[*slot as usize]),
                Insn::Store(slot) => locals[*slot as usize] = stack.pop().unwrap(),
                Insn::Pop => {
                    stack.pop().unwrap();
                }
                Insn::Dup => stack.push(*stack.last().unwrap()),
                Insn::Add => {
                    let (b, a) = (stack.pop().unwrap(), stack.pop().unwrap());
                    stack.push(a + b);
                }
                Insn::Sub => {
                    let (b, a) = (stack.pop().unwrap(), stack.pop().unwrap());
                    stack.push(a - b);
                }
                Insn::Mul => {
                    let (b, a) = (stack.pop().unwrap(), stack.pop().unwrap());
                    stack.push(a * b);
                }
                Insn::Jump(t) => {
                    pc = *t as usize;
                    continue;
                }
                Insn::BranchIfZero(t) => {
                    if stack.pop().unwrap() == 0 {
                        pc = *t as usize;
                        continue;
                    }
                }
                Insn::TableSwitch { targets, default } => {
                    let index = stack.pop().unwrap();
                    pc = targets
                        .get(index as usize)
                        .copied()
                        .unwrap_or(*default) as usize;
                    continue;
                }
                Insn::Return => {
                    return if body.sig.returns_value() {
                        Some(stack.pop().unwrap())
                    } else {
                        None
                    };
                }
                Insn::Throw => {
                    let thrown = stack.pop().unwrap();
                    let handler = body
                        .exception_table
                        .iter()
                        .find(|e| e.covers(pc as u32))
                        .unwrap_or_else(|| panic!("uncaught exception {thrown} at pc {pc}"));
                    pc = handler.handler_pc as usize;
                    stack.clear();
                    stack.push(thrown);
                    continue;
                }
                Insn::MonitorEnter | Insn::MonitorExit => {
                    stack.pop().unwrap();
                }
                Insn::Invoke(site) => {
                    let argc = site.pops();
                    let call_args: Vec<i64> = stack.split_off(stack.len() - argc);
                    let ret = self.invoke(&site.target, &call_args);
                    if site.target.sig.returns_value() {
                        stack.push(ret.expect("value-returning callee produced no value"));
                    }
                }
                Insn::FrameEnter => {
                    if self.resuming {
                        let record = self.saved.pop().expect("resume without a saved frame");
                        stack.push(record.state as i64);
                        self.restore_source = Some(record);
                    } else {
                        stack.push(0);
                    }
                }
                Insn::FrameSave {
                    point,
                    liveness,
                    stack_count,
                } => {
                    let mut record = SavedFrame {
                        state: *point,
                        locals: Vec::new(),
                        stack: stack[stack.len() - *stack_count as usize..].to_vec(),
                    };
                    for slot in 0..64u16 {
                        if (liveness >> slot) & 1 == 1 {
                            record.locals.push((slot, locals[slot as usize]));
                        }
                    }
                    pending = Some(record);
                }
                Insn::FrameRestore { .. } => {
                    let record = self
                        .restore_source
                        .take()
                        .expect("restore without a selected record");
                    for (slot, value) in &record.locals {
                        locals[*slot as usize] = *value;
                    }
                    stack.extend_from_slice(&record.stack);
                }
                Insn::FrameSuspended => stack.push(self.suspending as i64),
                Insn::FrameSuspendExit { point } => {
                    let mut record = pending.take().expect("suspend exit without a pending save");
                    record.state = *point;
                    self.saved.push(record);
                }
                Insn::FrameDrop => pending = None,
            }
            pc += 1;
        }
    }
}
