//! Symbol retrieval and the ReadLSB canonical-shape check.

use super::fold::ExprView;
use super::Expr;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Every symbolic byte-array name read anywhere within `e` (spec.md §4.1,
/// used by the solver's independence cache and by C3's discriminating
/// constraint search to decide which path constraints are even relevant).
pub fn retrieve_symbols(e: &Expr) -> BTreeSet<Arc<str>> {
    super::fold::fold(e, &mut |_e, view, children: &[BTreeSet<Arc<str>>]| {
        let mut acc: BTreeSet<Arc<str>> = children.iter().flatten().cloned().collect();
        if let ExprView::Read { array, .. } = view {
            acc.insert(array);
        }
        acc
    })
}

/// `true` iff `e` is a byte-ascending `Concat` cascade of single-byte
/// `Read`s into a single array, covering indices `[0, width/8 - 1]` in
/// strictly descending order from the top of the tree down (the shape
/// `Expr::read_lsb` always produces): the canonical multi-byte
/// little-endian read this domain's chunk-borrows are parsed into.
pub fn is_readlsb_complete(e: &Expr) -> bool {
    let width = e.width();
    if width % 8 != 0 {
        return false;
    }
    let n_bytes = width / 8;
    let mut bytes = Vec::with_capacity(n_bytes as usize);
    if !collect_concat_bytes(e, &mut bytes) {
        return false;
    }
    if bytes.len() as u32 != n_bytes {
        return false;
    }
    let array = match bytes[0].0.clone() {
        Some(a) => a,
        None => return false,
    };
    for (i, (arr, index)) in bytes.iter().enumerate() {
        let expected_index = n_bytes as u64 - 1 - i as u64;
        match (arr, index) {
            (Some(a), Some(idx)) if *a == array && *idx == expected_index => continue,
            _ => return false,
        }
    }
    true
}

/// Decomposes a right-leaning `Concat` cascade into its leaf `Read`s,
/// returning `(array name, constant index)` per byte in high-to-low order.
/// Returns `false` if any leaf isn't a single-byte `Read` with a constant
/// index.
fn collect_concat_bytes(e: &Expr, out: &mut Vec<(Option<Arc<str>>, Option<u64>)>) -> bool {
    match e.view() {
        ExprView::Concat(hi, lo) => collect_concat_bytes(&hi, out) && collect_concat_bytes(&lo, out),
        ExprView::Read { array, index } => {
            if e.width() != 8 {
                out.push((None, None));
                return false;
            }
            let idx = index.as_constant().map(|v| v as u64);
            out.push((Some(array), idx));
            true
        }
        _ => {
            out.push((None, None));
            false
        }
    }
}
