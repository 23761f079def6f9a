//! `RenameSymbols`: rewrites `Read`s against a translated array name while
//! preserving index and layout (spec.md §4.2). Used both standalone (e.g. to
//! retarget a callee's private array names onto a caller's) and as the
//! building block for [`super::swap_packet_endianness`].

use crate::expr::{fold_expr, rebuild_expr, Expr, ExprView};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct RenameSymbols {
    translations: HashMap<Arc<str>, Arc<str>>,
}

impl RenameSymbols {
    pub fn new() -> RenameSymbols {
        RenameSymbols::default()
    }

    pub fn add_translation(&mut self, before: impl Into<Arc<str>>, after: impl Into<Arc<str>>) {
        self.translations.insert(before.into(), after.into());
    }

    pub fn remove_translation(&mut self, before: &str) {
        self.translations.remove(before);
    }

    /// Rewrites every `Read` into a translated array, leaving everything
    /// else (including reads into untranslated arrays) untouched. Memoized
    /// per distinct node by `fold_expr`, so shared subtrees are visited once
    /// regardless of how many times they're referenced.
    pub fn rename(&self, e: &Expr) -> Expr {
        fold_expr(e, &mut |orig, view, children: &[Expr]| match &view {
            ExprView::Read { array, .. } => match self.translations.get(array) {
                Some(new_name) => Expr::read(Arc::clone(new_name), &children[0]),
                None => rebuild_expr(orig, &view, children),
            },
            _ => rebuild_expr(orig, &view, children),
        })
    }
}
