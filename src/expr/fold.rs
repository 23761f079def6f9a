//! Post-order traversal support shared by the pretty-printer, symbol
//! retrieval, and the solver's lowering/rewriting visitors.
//!
//! `ExprView` exposes a node's shape with owned child `Expr` handles so
//! callers can match on it without reaching past the crate boundary into
//! the arena. `visit_post_order` walks a DAG exactly once per distinct
//! node (memoized by arena id), which is what keeps the symbol-replacing
//! and renaming visitors in `solver` linear on shared subtrees.

use super::arena::{BinOp, ExprKind};
use super::Expr;
use std::collections::HashMap;
use std::sync::Arc;

/// A structural view of one `Expr` node, with `Expr` children rather than
/// raw arena ids.
#[derive(Clone)]
pub enum ExprView {
    Constant(u128),
    Read { array: Arc<str>, index: Expr },
    Concat(Expr, Expr),
    Extract { src: Expr, offset: u32 },
    ZExt(Expr),
    SExt(Expr),
    Not(Expr),
    Binary(BinOp, Expr, Expr),
    Select { cond: Expr, then_branch: Expr, else_branch: Expr },
}

pub(super) fn view_of(e: &Expr) -> ExprView {
    let node = e.node();
    match node.kind {
        ExprKind::Constant(v) => ExprView::Constant(v),
        ExprKind::Read { array, index } => ExprView::Read {
            array,
            index: e.child(index),
        },
        ExprKind::Concat(hi, lo) => ExprView::Concat(e.child(hi), e.child(lo)),
        ExprKind::Extract { src, offset } => ExprView::Extract {
            src: e.child(src),
            offset,
        },
        ExprKind::ZExt(src) => ExprView::ZExt(e.child(src)),
        ExprKind::SExt(src) => ExprView::SExt(e.child(src)),
        ExprKind::Not(src) => ExprView::Not(e.child(src)),
        ExprKind::Binary(op, a, b) => ExprView::Binary(op, e.child(a), e.child(b)),
        ExprKind::Select {
            cond,
            then_branch,
            else_branch,
        } => ExprView::Select {
            cond: e.child(cond),
            then_branch: e.child(then_branch),
            else_branch: e.child(else_branch),
        },
    }
}

/// Walks `root` post-order, invoking `visit` once per distinct node
/// (memoized on arena id) with its already-visited children's results.
pub(crate) fn fold<T: Clone>(root: &Expr, visit: &mut impl FnMut(&Expr, ExprView, &[T]) -> T) -> T {
    let mut memo: HashMap<u64, T> = HashMap::new();
    fold_rec(root, visit, &mut memo)
}

fn fold_rec<T: Clone>(
    e: &Expr,
    visit: &mut impl FnMut(&Expr, ExprView, &[T]) -> T,
    memo: &mut HashMap<u64, T>,
) -> T {
    if let Some(v) = memo.get(&e.node_id()) {
        return v.clone();
    }
    let view = e.view();
    let children: Vec<Expr> = match &view {
        ExprView::Constant(_) => vec![],
        ExprView::Read { index, .. } => vec![index.clone()],
        ExprView::Concat(a, b) | ExprView::Binary(_, a, b) => vec![a.clone(), b.clone()],
        ExprView::Extract { src, .. } | ExprView::ZExt(src) | ExprView::SExt(src) | ExprView::Not(src) => {
            vec![src.clone()]
        }
        ExprView::Select {
            cond,
            then_branch,
            else_branch,
        } => vec![cond.clone(), then_branch.clone(), else_branch.clone()],
    };
    let child_results: Vec<T> = children.iter().map(|c| fold_rec(c, visit, memo)).collect();
    let result = visit(e, view, &child_results);
    memo.insert(e.node_id(), result.clone());
    result
}

/// Reconstructs a node of the same kind as `view` over `children`, routing
/// through the normal simplifying constructors. Used by rewriting visitors
/// (solver's `ReplaceSymbols`/`RenameSymbols`/`SwapPacketEndianness`) that
/// need to swap out a subset of leaves while preserving every other node's
/// canonical-simplification behavior.
pub(crate) fn rebuild(original: &Expr, view: &ExprView, children: &[Expr]) -> Expr {
    match view {
        ExprView::Constant(_) => original.clone(),
        ExprView::Read { array, .. } => Expr::read(Arc::clone(array), &children[0]),
        ExprView::Concat(_, _) => Expr::concat(&children[0], &children[1]),
        ExprView::Extract { offset, .. } => Expr::extract(&children[0], *offset, original.width()),
        ExprView::ZExt(_) => Expr::zext(&children[0], original.width()),
        ExprView::SExt(_) => Expr::sext(&children[0], original.width()),
        ExprView::Not(_) => Expr::not(&children[0]),
        ExprView::Binary(op, _, _) => super::apply_binop(*op, &children[0], &children[1]),
        ExprView::Select { .. } => Expr::select(&children[0], &children[1], &children[2]),
    }
}
