//! Substitution resolver
//!
//! Optimizations retire a value by pointing its substitution link at a
//! replacement. This pass makes those links unobservable: every data input
//! and every state slot is rewritten to its resolved target, and retired
//! instructions are unlinked from their block's instruction list.

use super::{HirGraph, ValueId};
use crate::logging::MERGE_TARGET;
use log::debug;

/// What [`HirGraph::resolve_substitutions`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubstitutionStats {
    /// Input slots of instructions that now name the replacement
    pub inputs: usize,
    /// Slots of captured states (instruction, block, handler and caller
    /// states)
    pub state_slots: usize,
    /// Substituted instructions removed from instruction lists
    pub unlinked: usize,
}

impl SubstitutionStats {
    pub fn is_empty(&self) -> bool {
        *self == SubstitutionStats::default()
    }
}

impl HirGraph {
    /// Rewrite all uses to resolved substitution targets.
    ///
    /// Running it twice is a no-op the second time.
    pub fn resolve_substitutions(&mut self) -> SubstitutionStats {
        let targets: Vec<ValueId> = (0..self.values.len())
            .map(|i| self.values.resolve(ValueId(i as u32)))
            .collect();
        let resolve = |slot: &mut ValueId, count: &mut usize| {
            if let Some(&target) = targets.get(slot.index()) {
                if target != *slot {
                    *slot = target;
                    *count += 1;
                }
            }
        };

        let mut stats = SubstitutionStats::default();
        for value in self.values.iter_mut() {
            value.op.input_values_mut(|v| resolve(v, &mut stats.inputs));
            value.other_values_mut(|v| resolve(v, &mut stats.state_slots));
        }
        for block in &mut self.blocks {
            if let Some(state) = block.state.as_mut() {
                state.values_mut(|v| resolve(v, &mut stats.state_slots));
            }
            for state in &mut block.exception_states {
                state.values_mut(|v| resolve(v, &mut stats.state_slots));
            }
        }
        for scope in &mut self.scopes {
            if let Some(state) = scope.caller_state_mut() {
                state.values_mut(|v| resolve(v, &mut stats.state_slots));
            }
        }

        stats.unlinked = self.unlink_substituted();
        if !stats.is_empty() {
            debug!(
                target: MERGE_TARGET,
                "resolved substitutions: {} inputs, {} state slots, {} unlinked",
                stats.inputs,
                stats.state_slots,
                stats.unlinked
            );
        }
        stats
    }

    /// Drop substituted instructions from every block's list.
    fn unlink_substituted(&mut self) -> usize {
        let mut unlinked = 0;
        for b in 0..self.blocks.len() {
            let mut prev = self.blocks[b].begin();
            let mut remaining = self.values.len();
            while let Some(next) = self.values.get(prev).next {
                if remaining == 0 {
                    break;
                }
                remaining -= 1;
                let node = self.values.get(next);
                if node.has_subst() && !node.op.is_block_end() {
                    let after = node.next;
                    self.values.get_mut(prev).next = after;
                    self.values.get_mut(next).next = None;
                    unlinked += 1;
                } else {
                    prev = next;
                }
            }
        }
        unlinked
    }
}
