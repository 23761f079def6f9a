use super::*;
use crate::expr::Expr;

fn symbolic_byte(array: &str) -> Expr {
    let idx = Expr::constant(0, 32);
    Expr::read(array, &idx)
}

#[test]
fn must_be_true_on_tautology() {
    let mut ctx = SolverContext::new(SolverConfig::default());
    let x = symbolic_byte("x");
    let tautology = Expr::eq(&x, &x);
    assert!(ctx.must_be_true(&[], &tautology).unwrap());
}

#[test]
fn must_be_false_under_contradictory_constraint() {
    let mut ctx = SolverContext::new(SolverConfig::default());
    let x = symbolic_byte("x");
    let constraint = Expr::eq(&x, &Expr::constant(1, 8));
    let target = Expr::eq(&x, &Expr::constant(2, 8));
    assert!(ctx.must_be_false(&[constraint], &target).unwrap());
}

#[test]
fn must_be_true_is_not_fooled_by_underconstrained_values() {
    let mut ctx = SolverContext::new(SolverConfig::default());
    let x = symbolic_byte("x");
    // With no constraint pinning `x`, "x == 1" isn't a tautology.
    let target = Expr::eq(&x, &Expr::constant(1, 8));
    assert!(!ctx.must_be_true(&[], &target).unwrap());
}

#[test]
fn get_value_respects_constraints() {
    let mut ctx = SolverContext::new(SolverConfig::default());
    let x = symbolic_byte("x");
    let constraint = Expr::eq(&x, &Expr::constant(42, 8));
    let value = ctx.get_value(&[constraint], &x).unwrap();
    assert_eq!(value, 42);
}

#[test]
fn get_value_on_constant_short_circuits() {
    let mut ctx = SolverContext::new(SolverConfig::default());
    let c = Expr::constant(7, 16);
    assert_eq!(ctx.get_value(&[], &c).unwrap(), 7);
}

#[test]
fn are_exprs_always_equal_short_circuits_on_identical_nodes() {
    let mut ctx = SolverContext::new(SolverConfig::default());
    let x = symbolic_byte("x");
    assert!(ctx.are_exprs_always_equal(&x, &[], &x, &[]).unwrap());
}

#[test]
fn are_exprs_always_equal_rejects_unreconciled_different_arrays() {
    let mut ctx = SolverContext::new(SolverConfig::default());
    let x = symbolic_byte("left_frame_var");
    let y = symbolic_byte("right_frame_var");
    // Same-valued under their respective constraints, but nothing has told
    // the checker these two array names denote the same callee symbol, so
    // they must not be conflated.
    let c1 = Expr::eq(&x, &Expr::constant(9, 8));
    let c2 = Expr::eq(&y, &Expr::constant(9, 8));
    assert!(!ctx
        .are_exprs_always_equal(&x, std::slice::from_ref(&c1), &y, std::slice::from_ref(&c2))
        .unwrap());
}

#[test]
fn are_exprs_always_equal_after_renaming_onto_a_shared_array() {
    let mut ctx = SolverContext::new(SolverConfig::default());
    let x = symbolic_byte("left_frame_var");
    let y = symbolic_byte("right_frame_var");

    let mut renamer = RenameSymbols::new();
    renamer.add_translation("right_frame_var", "left_frame_var");
    let y_renamed = renamer.rename(&y);

    let c1 = Expr::eq(&x, &Expr::constant(9, 8));
    let c2 = Expr::eq(&y, &Expr::constant(9, 8));
    assert!(ctx
        .are_exprs_always_equal(&x, std::slice::from_ref(&c1), &y_renamed, std::slice::from_ref(&c2))
        .unwrap());
}

#[test]
fn rename_symbols_retargets_array_name() {
    let mut renamer = RenameSymbols::new();
    renamer.add_translation("packet_chunks", "packet_chunks_renamed");
    let e = symbolic_byte("packet_chunks");
    let renamed = renamer.rename(&e);
    match renamed.view() {
        crate::expr::ExprView::Read { array, .. } => assert_eq!(array.as_ref(), "packet_chunks_renamed"),
        _ => panic!("expected a Read node"),
    }
}
