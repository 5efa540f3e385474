//! Backward liveness analysis of local slots.
//!
//! A 64-bit bitmap per pc (bit `n` = slot `n` live on entry), computed by a
//! backward worklist over the CFG including exception edges. The save code
//! at a suspension point snapshots exactly the locals live after the call:
//! restoring anything more would be wasted work, anything less would be a
//! correctness bug on resume.

use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use strand_bytecode::{Insn, MethodBody};

/// Compute per-pc live-in bitmaps for `body`'s local slots.
///
/// Slots at index 64 and beyond are not representable; callers enforce the
/// 64-slot bound before asking.
pub fn compute_local_liveness(body: &MethodBody) -> Vec<u64> {
    let len = body.instructions.len();
    let mut live_in: Vec<u64> = vec![0; len];
    if len == 0 {
        return live_in;
    }

    // Predecessor edges, including exception edges (any covered pc may
    // transfer to its handler).
    let mut preds: Vec<Vec<u32>> = vec![Vec::new(); len];
    for (pc, insn) in body.instructions.iter().enumerate() {
        for succ in insn.successors(pc as u32) {
            if (succ as usize) < len {
                preds[succ as usize].push(pc as u32);
            }
        }
        for entry in &body.exception_table {
            if entry.covers(pc as u32) && (entry.handler_pc as usize) < len {
                preds[entry.handler_pc as usize].push(pc as u32);
            }
        }
    }

    let mut worklist: VecDeque<u32> = (0..len as u32).rev().collect();
    let mut queued: FxHashSet<u32> = worklist.iter().copied().collect();

    while let Some(pc) = worklist.pop_front() {
        queued.remove(&pc);
        let insn = &body.instructions[pc as usize];

        let mut out = 0u64;
        for succ in insn.successors(pc) {
            if (succ as usize) < len {
                out |= live_in[succ as usize];
            }
        }
        for entry in &body.exception_table {
            if entry.covers(pc) && (entry.handler_pc as usize) < len {
                out |= live_in[entry.handler_pc as usize];
            }
        }

        let new_in = match insn {
            Insn::Load(slot) if *slot < 64 => out | (1 << slot),
            Insn::Store(slot) if *slot < 64 => out & !(1 << slot),
            _ => out,
        };

        if new_in != live_in[pc as usize] {
            live_in[pc as usize] = new_in;
            for &pred in &preds[pc as usize] {
                if queued.insert(pred) {
                    worklist.push_back(pred);
                }
            }
        }
    }

    live_in
}

// =============================================================================
// Tests
// =============================================================================
