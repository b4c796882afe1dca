//! Join point reconciliation
//!
//! [`HirGraph::try_merge`] is called by the builder each time control reaches
//! a block. The first arrival installs a private copy of the incoming state
//! (with dead locals cleared and loop phis in place); later arrivals are
//! merged slot by slot into it.

use super::{BlockId, FrameState, HirGraph, IrScope, JoinPoint, ValueArena};
use crate::error::{HirError, HirResult, StructuralError};
use crate::logging::MERGE_TARGET;
use log::{debug, trace};

impl HirGraph {
    /// Reconcile `incoming` with the state already attached to `block`.
    ///
    /// Returns a bailout error for shapes the merge cannot represent. The
    /// block's state is left untouched when the merge fails before any slot is
    /// changed.
    pub fn try_merge(&mut self, block: BlockId, incoming: &FrameState) -> HirResult<()> {
        if block.index() >= self.blocks.len() {
            return Err(StructuralError::new("try_merge", None, format!("unknown block {}", block)).into());
        }
        let assume_verified = self.options().assume_verified_bytecode;
        let extra_phi_checking = self.options().extra_phi_checking;
        let merge_constants = self.options().merge_equivalent_constants;

        let HirGraph {
            values,
            blocks,
            scopes,
            ..
        } = self;
        let target = &mut blocks[block.index()];
        let at = JoinPoint::new(block, target.bci());
        let visited = target.was_visited();
        let loop_header = target.is_parser_loop_header();

        let existing = match target.state.as_mut() {
            None => {
                if visited {
                    return Err(HirError::unsupported(block, "jsr/ret too complex"));
                }
                let state = first_arrival(values, scopes, incoming, at, loop_header)?;
                debug!(
                    target: MERGE_TARGET,
                    "{}: first state, {} locals, {} stack{}",
                    block,
                    state.locals_size(),
                    state.stack_size(),
                    if loop_header { ", loop phis installed" } else { "" }
                );
                target.state = Some(state);
                return Ok(());
            }
            Some(existing) => existing,
        };

        if !assume_verified && !existing.is_same_across_scopes(values, incoming) {
            return Err(HirError::merge_conflict(
                block,
                at.bci,
                "stack or locks do not match",
            ));
        }

        // inlined arrivals are compared in the scope the block belongs to
        let mut incoming = incoming;
        while existing.scope() != incoming.scope() {
            incoming = incoming.caller_state(scopes).ok_or_else(|| {
                StructuralError::at("try_merge", block, "could not match scopes")
            })?;
        }
        existing.check_size(incoming, at)?;

        if visited {
            if !loop_header {
                return Err(HirError::unsupported(block, "jsr/ret too complicated"));
            }
            if !assume_verified {
                existing.invalidate_mismatched_local_phis(values, incoming, at)?;
                if extra_phi_checking {
                    existing.check_phis(values, incoming, at)?;
                }
            }
            trace!(target: MERGE_TARGET, "{}: back edge checked against loop phis", block);
        } else {
            existing.merge(values, incoming, at, merge_constants)?;
            trace!(target: MERGE_TARGET, "{}: merged", block);
        }
        Ok(())
    }
}

fn first_arrival(
    values: &mut ValueArena,
    scopes: &[IrScope],
    incoming: &FrameState,
    at: JoinPoint,
    loop_header: bool,
) -> HirResult<FrameState> {
    let mut state = incoming.clone();
    let method = scopes.get(state.scope().index()).map(|scope| &scope.method);

    if let Some(live) = method.and_then(|m| m.liveness(at.bci)) {
        for i in 0..state.locals_size() {
            if let Some(x) = state.local_at(i) {
                if values.get(x).kind().is_illegal() || !live.get(i) {
                    state.invalidate_local(i);
                }
            }
        }
    }

    if loop_header {
        for i in 0..state.stack_size() {
            state.setup_phi_for_stack(values, at.block, i)?;
        }
        let requires_phi = method.and_then(|m| m.stores_in_loops());
        for i in 0..state.locals_size() {
            let x = match state.local_at(i) {
                Some(x) => x,
                None => continue,
            };
            let needed = match requires_phi {
                Some(stores) => {
                    stores.get(i) || (values.get(x).kind().is_double_word() && stores.get(i + 1))
                }
                None => true,
            };
            if needed {
                state.setup_phi_for_local(values, at.block, i)?;
            }
        }
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BlockFlags, ConstantValue, MethodInfo, ValueKind};
    use crate::util::BitMap;
    use crate::HirOptions;

    fn graph(method: MethodInfo) -> HirGraph {
        HirGraph::new(method, HirOptions::default())
    }

    #[test]
    fn test_first_arrival_copies_state() {
        let mut g = graph(MethodInfo::new("m", 2, 2));
        let b = g.new_block(4);
        let one = g.values_mut().new_constant(ConstantValue::Int(1));
        let mut state = g.new_state();
        state.store_local(g.values(), 0, one);

        g.try_merge(b, &state).unwrap();
        assert_eq!(g.block(b).state().unwrap().local_at(0), Some(one));

        // the attached state is a private copy
        state.invalidate_local(0);
        assert_eq!(g.block(b).state().unwrap().local_at(0), Some(one));
    }

    #[test]
    fn test_dead_locals_are_cleared() {
        let mut method = MethodInfo::new("m", 2, 0);
        method.set_liveness(4, BitMap::from_indices(2, [1]));
        let mut g = graph(method);
        let b = g.new_block(4);
        let x = g.values_mut().new_constant(ConstantValue::Int(1));
        let y = g.values_mut().new_constant(ConstantValue::Int(2));
        let mut state = g.new_state();
        state.store_local(g.values(), 0, x);
        state.store_local(g.values(), 1, y);

        g.try_merge(b, &state).unwrap();
        let merged = g.block(b).state().unwrap();
        assert_eq!(merged.local_at(0), None);
        assert_eq!(merged.local_at(1), Some(y));
    }

    #[test]
    fn test_loop_header_phis_follow_stores_in_loops() {
        let mut method = MethodInfo::new("m", 3, 1);
        method.set_stores_in_loops(BitMap::from_indices(3, [1]));
        let mut g = graph(method);
        let header = g.new_block_with_flags(0, BlockFlags::PARSER_LOOP_HEADER);
        let values: Vec<_> = (0..4)
            .map(|i| g.values_mut().new_constant(ConstantValue::Int(i)))
            .collect();
        let mut state = g.new_state();
        for i in 0..3 {
            state.store_local(g.values(), i, values[i]);
        }
        state.push(ValueKind::Int, values[3]);

        g.try_merge(header, &state).unwrap();
        let merged = g.block(header).state().unwrap();
        assert_eq!(merged.local_at(0), Some(values[0]));
        assert_eq!(merged.local_at(2), Some(values[2]));
        let local_phi = merged.local_at(1).unwrap();
        assert_eq!(g.value(local_phi).op.as_phi().unwrap().local_index(), Some(1));
        let stack_phi = merged.stack_at(0).unwrap();
        assert_eq!(g.value(stack_phi).op.as_phi().unwrap().stack_index(), Some(0));
    }

    #[test]
    fn test_loop_header_without_bitmap_gets_phis_everywhere() {
        let mut g = graph(MethodInfo::new("m", 2, 0));
        let header = g.new_block_with_flags(0, BlockFlags::PARSER_LOOP_HEADER);
        let x = g.values_mut().new_constant(ConstantValue::Int(1));
        let mut state = g.new_state();
        state.store_local(g.values(), 0, x);

        g.try_merge(header, &state).unwrap();
        let merged = g.block(header).state().unwrap();
        assert!(g.value(merged.local_at(0).unwrap()).op.as_phi().is_some());
        assert_eq!(merged.local_at(1), None);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut g = graph(MethodInfo::new("m", 1, 0));
        let b = g.new_block(0);
        let x = g.values_mut().new_constant(ConstantValue::Int(1));
        let y = g.values_mut().new_constant(ConstantValue::Int(2));
        let mut first = g.new_state();
        first.store_local(g.values(), 0, x);
        let mut second = g.new_state();
        second.store_local(g.values(), 0, y);

        g.try_merge(b, &first).unwrap();
        g.try_merge(b, &second).unwrap();
        let once = g.block(b).state().unwrap().clone();
        g.try_merge(b, &second).unwrap();
        assert_eq!(g.block(b).state().unwrap(), &once);
        assert!(g.value(once.local_at(0).unwrap()).op.as_phi().is_some());
    }

    #[test]
    fn test_stack_mismatch_is_a_conflict() {
        let mut g = graph(MethodInfo::new("m", 1, 2));
        let b = g.new_block(7);
        let x = g.values_mut().new_constant(ConstantValue::Int(1));
        let empty = g.new_state();
        let mut pushed = g.new_state();
        pushed.push(ValueKind::Int, x);

        g.try_merge(b, &empty).unwrap();
        let err = g.try_merge(b, &pushed).unwrap_err();
        assert!(err.is_bailout());
        assert!(matches!(err, HirError::MergeConflict { bci: 7, .. }));
        assert!(err.to_string().contains("bytecode too complex"));
    }

    #[test]
    fn test_revisited_blocks() {
        let mut g = graph(MethodInfo::new("m", 1, 0));
        let plain = g.new_block(0);
        let state = g.new_state();

        g.block_mut(plain).set_was_visited(true);
        let err = g.try_merge(plain, &state).unwrap_err();
        assert!(matches!(err, HirError::UnsupportedControlFlow { .. }));

        let joined = g.new_block(1);
        g.try_merge(joined, &state).unwrap();
        g.block_mut(joined).set_was_visited(true);
        let err = g.try_merge(joined, &state).unwrap_err();
        assert!(matches!(err, HirError::UnsupportedControlFlow { .. }));

        let header = g.new_block_with_flags(2, BlockFlags::PARSER_LOOP_HEADER);
        g.try_merge(header, &state).unwrap();
        g.block_mut(header).set_was_visited(true);
        g.try_merge(header, &state).unwrap();
    }

    #[test]
    fn test_back_edge_with_mismatched_kind_drops_the_phi() {
        let mut g = graph(MethodInfo::new("m", 1, 0));
        let header = g.new_block_with_flags(0, BlockFlags::PARSER_LOOP_HEADER);
        let int = g.values_mut().new_constant(ConstantValue::Int(1));
        let obj = g.values_mut().new_constant(ConstantValue::Null);
        let mut entry = g.new_state();
        entry.store_local(g.values(), 0, int);
        let mut back = g.new_state();
        back.store_local(g.values(), 0, obj);

        g.try_merge(header, &entry).unwrap();
        g.block_mut(header).set_was_visited(true);
        g.try_merge(header, &back).unwrap();
        assert_eq!(g.block(header).state().unwrap().local_at(0), None);
    }
}
