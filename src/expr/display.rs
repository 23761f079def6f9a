//! Human-readable rendering of `Expr` trees. Diagnostics only, as spec.md
//! §4.1 says -- this output has no semantic role and is never re-parsed.

use super::fold::ExprView;
use super::Expr;

pub(super) fn pretty(e: &Expr) -> String {
    super::fold::fold(e, &mut |e, view, children: &[String]| match view {
        ExprView::Constant(v) => {
            if e.width() <= 64 {
                format!("{:#x}:w{}", v as u64, e.width())
            } else {
                format!("{:#x}:w{}", v, e.width())
            }
        }
        ExprView::Read { array, .. } => format!("{}[{}]", array, children[0]),
        ExprView::Concat(_, _) => format!("({} . {})", children[0], children[1]),
        ExprView::Extract { offset, .. } => {
            format!("Extract({}, {}, {})", children[0], offset, e.width())
        }
        ExprView::ZExt(_) => format!("ZExt({}, {})", children[0], e.width()),
        ExprView::SExt(_) => format!("SExt({}, {})", children[0], e.width()),
        ExprView::Not(_) => format!("~{}", children[0]),
        ExprView::Binary(op, _, _) => format!("({} {} {})", children[0], op.symbol(), children[1]),
        ExprView::Select { .. } => format!("({} ? {} : {})", children[0], children[1], children[2]),
    })
}
