//! Cross-context equality (spec.md §4.2): `are_exprs_always_equal`.

use super::SolverContext;
use crate::error::Result;
use crate::expr::{fold_expr, rebuild_expr, Expr, ExprView};

/// Collects every distinct `Read` node in `e`, deduplicated by hash-consed
/// id so a shared subtree contributes once.
fn collect_reads(e: &Expr) -> Vec<Expr> {
    fold_expr(e, &mut |orig, view, children: &[Vec<Expr>]| -> Vec<Expr> {
        let mut acc: Vec<Expr> = Vec::new();
        let mut seen: std::collections::HashSet<u64> = std::collections::HashSet::new();
        for child in children {
            for r in child {
                if seen.insert(r.node_id()) {
                    acc.push(r.clone());
                }
            }
        }
        if matches!(view, ExprView::Read { .. }) && seen.insert(orig.node_id()) {
            acc.push(orig.clone());
        }
        acc
    })
}

/// Rewrites every `Read` in `e` that structurally matches one of `reads`
/// (same array name, same index expression) to that exact node — fixing one
/// side of an equality check while retargeting the other, per spec.md's
/// description of `ReplaceSymbols`.
fn replace_with(e: &Expr, reads: &[Expr]) -> Expr {
    fold_expr(e, &mut |orig, view, children: &[Expr]| match &view {
        ExprView::Read { array, index } => {
            let found = reads.iter().find(|r| match r.view() {
                ExprView::Read {
                    array: ra,
                    index: ri,
                } => ra == *array && ri == *index,
                _ => false,
            });
            match found {
                Some(r) => r.clone(),
                None => rebuild_expr(orig, &view, children),
            }
        }
        _ => rebuild_expr(orig, &view, children),
    })
}

/// `true` iff `e1` (under `c1`) and `e2` (under `c2`) are provably equal in
/// both directions after retargeting each into the other's symbolic
/// universe. When `e1 == e2` as hash-consed nodes (the common same-call-path
/// case), this short-circuits without touching the solver at all.
pub(super) fn are_exprs_always_equal(
    ctx: &mut SolverContext,
    e1: &Expr,
    c1: &[Expr],
    e2: &Expr,
    c2: &[Expr],
) -> Result<bool> {
    debug_assert_eq!(e1.width(), e2.width(), "equivalence check between mismatched widths");
    if e1 == e2 {
        return Ok(true);
    }

    let r1 = collect_reads(e1);
    let e2_retargeted = replace_with(e2, &r1);
    let left_holds = ctx.must_be_true(c1, &Expr::eq(e1, &e2_retargeted))?;
    if !left_holds {
        return Ok(false);
    }

    let r2 = collect_reads(e2);
    let e1_retargeted = replace_with(e1, &r2);
    let right_holds = ctx.must_be_true(c2, &Expr::eq(&e1_retargeted, e2))?;

    Ok(right_holds)
}
