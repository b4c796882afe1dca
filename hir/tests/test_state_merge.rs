/// Join point merging through the builder
///
/// These tests drive `HirBuilder::merge_into` the way a bytecode parser does:
/// every edge into a block merges the state it carries, and the terminator
/// of each predecessor keeps that state for phi operand lookup.

use hir::ir::{
    validate_graph, ArithmeticOpcode, BlockFlags, Condition, ConstantValue, FrameState,
    HirBuilder, MethodInfo, ValueKind,
};
use hir::util::BitMap;
use hir::{logging, HirError, HirOptions};

fn builder(max_locals: usize, max_stack: usize) -> HirBuilder {
    logging::init_test();
    HirBuilder::new(MethodInfo::new("merge", max_locals, max_stack), HirOptions::default())
}

#[test]
fn test_diamond_join_inserts_phi_for_disagreeing_local() {
    let mut b = builder(2, 0);
    let entry = b.create_block(0);
    let left = b.create_block(4);
    let right = b.create_block(8);
    let join = b.create_block(12);

    b.switch_to_block(entry).unwrap();
    let one = b.constant(ConstantValue::Int(1)).unwrap();
    let two = b.constant(ConstantValue::Int(2)).unwrap();
    let mut state = b.graph().new_state();
    state.store_local(b.graph().values(), 0, one);
    state.store_local(b.graph().values(), 1, one);
    b.merge_into(left, &state).unwrap();
    b.merge_into(right, &state).unwrap();
    b.if_(one, Condition::Ne, two, left, right, state.clone()).unwrap();

    b.switch_to_block(left).unwrap();
    b.merge_into(join, &state).unwrap();
    b.goto(join, state.clone()).unwrap();

    b.switch_to_block(right).unwrap();
    let mut right_state = state.clone();
    right_state.store_local(b.graph().values(), 1, two);
    b.merge_into(join, &right_state).unwrap();
    b.goto(join, right_state).unwrap();

    b.switch_to_block(join).unwrap();
    b.return_(None).unwrap();
    b.finish_start(entry, None).unwrap();
    let graph = b.finish();

    let merged = graph.block(join).state().unwrap();
    assert_eq!(merged.local_at(0), Some(one));
    let phi_id = merged.local_at(1).unwrap();
    assert_eq!(graph.value(phi_id).kind(), ValueKind::Int);
    let phi = graph.value(phi_id).op.as_phi().unwrap();
    assert_eq!(phi.block, join);
    assert_eq!(phi.local_index(), Some(1));

    assert_eq!(graph.phi_operand_count(phi), 2);
    assert_eq!(graph.phi_operand_at(phi, 0).unwrap(), Some(one));
    assert_eq!(graph.phi_operand_at(phi, 1).unwrap(), Some(two));
    assert!(validate_graph(&graph).is_ok());
}

#[test]
fn test_kind_mismatch_empties_the_local() {
    let mut b = builder(1, 0);
    let join = b.create_block(0);
    let int = b.graph_mut().values_mut().new_constant(ConstantValue::Int(7));
    let obj = b.graph_mut().values_mut().new_constant(ConstantValue::Null);

    let mut first = b.graph().new_state();
    first.store_local(b.graph().values(), 0, int);
    let mut second = b.graph().new_state();
    second.store_local(b.graph().values(), 0, obj);

    b.merge_into(join, &first).unwrap();
    b.merge_into(join, &second).unwrap();
    assert_eq!(b.graph().block(join).state().unwrap().local_at(0), None);
}

#[test]
fn test_stack_depth_conflict_is_a_bailout() {
    let mut b = builder(0, 2);
    let join = b.create_block(16);
    let x = b.graph_mut().values_mut().new_constant(ConstantValue::Int(1));

    let empty = b.graph().new_state();
    let mut pushed = b.graph().new_state();
    pushed.push(ValueKind::Int, x);

    b.merge_into(join, &empty).unwrap();
    let err = b.merge_into(join, &pushed).unwrap_err();
    assert!(err.is_bailout());
    assert_eq!(err.block(), Some(join));
    assert!(matches!(err, HirError::MergeConflict { .. }));
    assert!(err.to_string().starts_with("bytecode too complex"));

    // the failed merge left the first state in place
    assert_eq!(b.graph().block(join).state().unwrap().stack_size(), 0);
}

#[test]
fn test_loop_header_keeps_phi_across_back_edge() {
    logging::init_test();
    let mut method = MethodInfo::new("loop", 2, 0);
    method.set_stores_in_loops(BitMap::from_indices(2, [0]));
    let mut b = HirBuilder::new(method, HirOptions::development());
    let entry = b.create_block(0);
    let header = b.create_block_with_flags(2, BlockFlags::PARSER_LOOP_HEADER);
    let body = b.create_block(6);
    let exit = b.create_block(12);

    b.switch_to_block(entry).unwrap();
    let zero = b.constant(ConstantValue::Int(0)).unwrap();
    let limit = b.constant(ConstantValue::Int(10)).unwrap();
    let mut state = b.graph().new_state();
    state.store_local(b.graph().values(), 0, zero);
    state.store_local(b.graph().values(), 1, limit);
    b.merge_into(header, &state).unwrap();
    b.goto(header, state).unwrap();

    // only the counter was stored in the loop, so only it gets a phi
    let header_state: FrameState = b.graph().block(header).state().unwrap().clone();
    let counter = header_state.local_at(0).unwrap();
    assert!(b.graph().value(counter).op.as_phi().is_some());
    assert_eq!(header_state.local_at(1), Some(limit));
    b.graph_mut().block_mut(header).set_was_visited(true);

    b.switch_to_block(header).unwrap();
    b.merge_into(body, &header_state).unwrap();
    b.merge_into(exit, &header_state).unwrap();
    b.if_(counter, Condition::Lt, limit, body, exit, header_state.clone())
        .unwrap();

    b.switch_to_block(body).unwrap();
    let next = b
        .arithmetic(ArithmeticOpcode::Add, ValueKind::Int, counter, zero)
        .unwrap();
    let mut back = header_state.clone();
    back.store_local(b.graph().values(), 0, next);
    b.merge_into(header, &back).unwrap();
    b.goto(header, back).unwrap();

    b.switch_to_block(exit).unwrap();
    b.return_(Some(counter)).unwrap();
    b.finish_start(entry, None).unwrap();
    let mut graph = b.finish();

    let phi = graph.value(counter).op.as_phi().copied().unwrap();
    assert_eq!(graph.phi_operand_at(&phi, 0).unwrap(), Some(zero));
    assert_eq!(graph.phi_operand_at(&phi, 1).unwrap(), Some(next));
    assert!(validate_graph(&graph).is_ok());

    let order = graph.compute_linear_scan_order().unwrap();
    assert_eq!(order.num_loops(), 1);
    assert_eq!(order.loop_blocks(0), vec![header, body]);
}

// ============================================================================
// Inlined Scopes
// ============================================================================

#[test]
fn test_inlined_arrival_merges_through_caller_state() {
    let mut b = builder(2, 1);
    let join = b.create_block(20);
    let one = b.graph_mut().values_mut().new_constant(ConstantValue::Int(1));
    let two = b.graph_mut().values_mut().new_constant(ConstantValue::Int(2));

    let mut root_state = b.graph().new_state();
    root_state.store_local(b.graph().values(), 0, one);
    root_state.store_local(b.graph().values(), 1, one);
    b.merge_into(join, &root_state).unwrap();

    // the callee returns to `join`; its caller had stored `two` in local 1
    let mut at_call = root_state.clone();
    at_call.store_local(b.graph().values(), 1, two);
    let root = b.graph().root_scope();
    let callee = b
        .graph_mut()
        .add_inlined_scope(root, MethodInfo::new("callee", 3, 1), 9, at_call);
    let inlined = root_state.push_scope(b.graph().scope(callee));
    assert_eq!(inlined.scope(), callee);
    assert_eq!(inlined.locals_size(), 3);

    b.merge_into(join, &inlined).unwrap();
    let merged = b.graph().block(join).state().unwrap();
    assert_eq!(merged.scope(), root);
    assert_eq!(merged.local_at(0), Some(one));
    let phi_id = merged.local_at(1).unwrap();
    let phi = b.graph().value(phi_id).op.as_phi().unwrap();
    assert_eq!(phi.block, join);
    assert_eq!(phi.local_index(), Some(1));
}

#[test]
fn test_unrelated_scopes_are_a_structural_error() {
    let mut b = builder(1, 0);
    let join = b.create_block(4);
    let root = b.graph().root_scope();
    let at_call = b.graph().new_state();
    let callee = b
        .graph_mut()
        .add_inlined_scope(root, MethodInfo::new("callee", 1, 0), 2, at_call);
    let inlined = b.graph().new_state().push_scope(b.graph().scope(callee));

    // the block belongs to the callee; a root state never reaches it
    b.merge_into(join, &inlined).unwrap();
    let root_state = b.graph().new_state();
    let err = b.merge_into(join, &root_state).unwrap_err();
    assert!(!err.is_bailout());
    assert!(matches!(err, HirError::Structural(ref e) if e.phase == "try_merge"));
}

#[test]
fn test_scope_transitions_keep_caller_stack_and_locals() {
    let mut b = builder(1, 2);
    let obj = b.graph_mut().values_mut().new_constant(ConstantValue::Null);
    let arg = b.graph_mut().values_mut().new_constant(ConstantValue::Int(3));

    let mut at_call = b.graph().new_state();
    at_call.store_local(b.graph().values(), 0, arg);
    at_call.push(ValueKind::Object, obj);
    let root = b.graph().root_scope();
    let callee = b
        .graph_mut()
        .add_inlined_scope(root, MethodInfo::new("callee", 2, 2), 5, at_call.clone());

    let mut inside = at_call.push_scope(b.graph().scope(callee));
    assert_eq!(inside.local_at(0), None);
    assert_eq!(inside.stack_size(), 1);
    inside.push(ValueKind::Int, arg);
    assert_eq!(inside.lock(obj), 0);

    // an exception site keeps only the caller's part of the stack
    let scopes = b.graph().scopes();
    let at_throw = inside.copy_locks(scopes);
    assert!(at_throw.is_lock_stack());
    assert_eq!(at_throw.stack_size(), 1);
    assert_eq!(at_throw.stack_at(0), Some(obj));
    assert_eq!(at_throw.locks_size(), 1);

    let returned = inside.pop_scope(scopes).unwrap();
    assert_eq!(returned.scope(), root);
    assert_eq!(returned.local_at(0), Some(arg));
    assert_eq!(returned.stack_size(), 2);
    assert!(b.graph().new_state().pop_scope(scopes).is_err());
}
