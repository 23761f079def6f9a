//! Lowers an [`Expr`] into a `z3::ast::BV`.
//!
//! Every `Expr`, including comparisons, is a bit-vector (width 1 for
//! comparisons, matching the klee-style semantics spec.md §3 describes
//! rather than native SMT-LIB `Bool`s); [`to_bool`] is the one place that
//! crosses into `z3::ast::Bool` for asserting a formula on a `Solver`.
//! `Read`s are modeled as `z3::ast::Array<BV32, BV8>` selects, one array per
//! distinct symbolic name, cached in `arrays` across an entire query so
//! repeated reads of the same array stay a single Z3 sort.

use crate::expr::{Expr, ExprBinOp, ExprView};
use std::collections::HashMap;
use std::sync::Arc;
use z3::ast::{Array, Ast, Bool, BV};
use z3::{Context, Sort};

pub(super) type ArrayCache<'ctx> = HashMap<Arc<str>, Array<'ctx>>;

fn array_for<'ctx>(ctx: &'ctx Context, arrays: &mut ArrayCache<'ctx>, name: &Arc<str>) -> Array<'ctx> {
    arrays
        .entry(Arc::clone(name))
        .or_insert_with(|| {
            let domain = Sort::bitvector(ctx, 32);
            let range = Sort::bitvector(ctx, 8);
            Array::new_const(ctx, name.as_ref(), &domain, &range)
        })
        .clone()
}

fn lower_constant<'ctx>(ctx: &'ctx Context, value: u128, width: u32) -> BV<'ctx> {
    if width <= 64 {
        return BV::from_u64(ctx, value as u64, width);
    }
    let low_width = 64u32;
    let high_width = width - low_width;
    let low = BV::from_u64(ctx, (value & u64::MAX as u128) as u64, low_width);
    let high = BV::from_u64(ctx, (value >> low_width) as u64, high_width);
    high.concat(&low)
}

/// Converts a width-1 `BV` (this crate's boolean encoding) into a native
/// `z3::ast::Bool` for assertion on a `Solver`.
pub(super) fn to_bool<'ctx>(ctx: &'ctx Context, bv: &BV<'ctx>) -> Bool<'ctx> {
    let zero = BV::from_u64(ctx, 0, bv.get_size());
    bv._eq(&zero).not()
}

fn from_bool<'ctx>(ctx: &'ctx Context, cond: &Bool<'ctx>, width: u32) -> BV<'ctx> {
    let one = BV::from_u64(ctx, 1, width);
    let zero = BV::from_u64(ctx, 0, width);
    cond.ite(&one, &zero)
}

pub(super) fn lower<'ctx>(ctx: &'ctx Context, arrays: &mut ArrayCache<'ctx>, e: &Expr) -> BV<'ctx> {
    crate::expr::fold_expr(e, &mut |node, view, children: &[BV<'ctx>]| -> BV<'ctx> {
        match view {
            ExprView::Constant(v) => lower_constant(ctx, v, node.width()),
            ExprView::Read { array, .. } => {
                let arr = array_for(ctx, arrays, &array);
                arr.select(&children[0]).as_bv().expect("packet arrays only ever hold bytes")
            }
            ExprView::Concat(_, _) => children[0].concat(&children[1]),
            ExprView::Extract { offset, .. } => {
                let width = node.width();
                children[0].extract(offset + width - 1, offset)
            }
            ExprView::ZExt(_) => children[0].zero_ext(node.width() - children[0].get_size()),
            ExprView::SExt(_) => children[0].sign_ext(node.width() - children[0].get_size()),
            ExprView::Not(_) => children[0].bvnot(),
            ExprView::Binary(op, _, _) => lower_binop(ctx, op, &children[0], &children[1], node.width()),
            ExprView::Select { .. } => {
                let cond = to_bool(ctx, &children[0]);
                cond.ite(&children[1], &children[2])
            }
        }
    })
}

fn lower_binop<'ctx>(ctx: &'ctx Context, op: ExprBinOp, a: &BV<'ctx>, b: &BV<'ctx>, result_width: u32) -> BV<'ctx> {
    use crate::expr::ExprBinOp::*;
    match op {
        Add => a.bvadd(b),
        Sub => a.bvsub(b),
        Mul => a.bvmul(b),
        UDiv => a.bvudiv(b),
        SDiv => a.bvsdiv(b),
        URem => a.bvurem(b),
        SRem => a.bvsrem(b),
        And => a.bvand(b),
        Or => a.bvor(b),
        Xor => a.bvxor(b),
        Shl => a.bvshl(b),
        LShr => a.bvlshr(b),
        AShr => a.bvashr(b),
        Eq => from_bool(ctx, &a._eq(b), result_width),
        Ne => from_bool(ctx, &a._eq(b).not(), result_width),
        Ult => from_bool(ctx, &a.bvult(b), result_width),
        Ule => from_bool(ctx, &a.bvule(b), result_width),
        Ugt => from_bool(ctx, &a.bvugt(b), result_width),
        Uge => from_bool(ctx, &a.bvuge(b), result_width),
        Slt => from_bool(ctx, &a.bvslt(b), result_width),
        Sle => from_bool(ctx, &a.bvsle(b), result_width),
        Sgt => from_bool(ctx, &a.bvsgt(b), result_width),
        Sge => from_bool(ctx, &a.bvsge(b), result_width),
    }
}

/// Reads a constant value back out of a model evaluation. Z3's `Display`
/// for a bitvector literal is `#x...` (hex, width a multiple of 4) or
/// `#b...` (binary); both are decoded directly rather than going through
/// `as_u64`, which only covers widths up to 64.
pub(super) fn model_value_to_u128(bv: &BV<'_>) -> u128 {
    let text = bv.to_string();
    if let Some(hex) = text.strip_prefix("#x") {
        u128::from_str_radix(hex, 16).expect("Z3 hex literal")
    } else if let Some(bin) = text.strip_prefix("#b") {
        u128::from_str_radix(bin, 2).expect("Z3 binary literal")
    } else {
        bv.as_u64().expect("small constant literal") as u128
    }
}
