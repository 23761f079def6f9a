//! The call-path data model (spec.md §3): `Call`, `CallPath`, and `Symbol`,
//! plus in-memory builders so tests and embedders can construct them
//! without depending on the upstream call-path grammar (SPEC_FULL.md §3).

use crate::expr::Expr;
use std::sync::Arc;

/// One argument to a [`Call`]. `in_`/`out` carry the before/after value of a
/// pointer argument the callee may mutate in place; `fn_ptr_name` marks a
/// function-pointer argument (its `expr` is usually a don't-care constant).
#[derive(Debug, Clone)]
pub struct Arg {
    pub expr: Expr,
    pub in_: Option<Expr>,
    pub out: Option<Expr>,
    pub fn_ptr_name: Option<Arc<str>>,
}

impl Arg {
    pub fn new(expr: Expr) -> Arg {
        Arg {
            expr,
            in_: None,
            out: None,
            fn_ptr_name: None,
        }
    }

    pub fn with_in_out(in_: Expr, out: Expr) -> Arg {
        Arg {
            expr: in_.clone(),
            in_: Some(in_),
            out: Some(out),
            fn_ptr_name: None,
        }
    }

    pub fn fn_ptr(expr: Expr, name: impl Into<Arc<str>>) -> Arg {
        Arg {
            expr,
            in_: None,
            out: None,
            fn_ptr_name: Some(name.into()),
        }
    }

    /// `true` for arguments the callee writes rather than reads — C3's
    /// grouper never compares these across call paths (spec.md §4.3).
    pub fn is_out_pointer(&self) -> bool {
        self.out.is_some()
    }
}

/// A named fresh symbol a callee produced (spec.md §3). Structural equality
/// (`PartialEq`/`Hash`) is a cheap syntactic approximation used for
/// dedup inside a single BDD node's `generated_symbols` set; the solver's
/// `are_exprs_always_equal` is the authoritative semantic check the grouper
/// and equivalence-collapsing passes actually rely on — see
/// [`Symbol::semantically_equal`].
#[derive(Debug, Clone)]
pub struct Symbol {
    pub label: Arc<str>,
    pub label_base: Arc<str>,
    pub expr: Expr,
    pub addr: Option<Expr>,
}

impl Symbol {
    pub fn new(label: impl Into<Arc<str>>, label_base: impl Into<Arc<str>>, expr: Expr) -> Symbol {
        Symbol {
            label: label.into(),
            label_base: label_base.into(),
            expr,
            addr: None,
        }
    }

    pub fn with_addr(mut self, addr: Expr) -> Symbol {
        self.addr = Some(addr);
        self
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label && self.label_base == other.label_base && self.expr == other.expr && self.addr == other.addr
    }
}
impl Eq for Symbol {}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.label.hash(state);
        self.label_base.hash(state);
        self.expr.hash(state);
    }
}

/// A single LibVig/DPDK call recorded on a call path: a function name, its
/// arguments in declaration order, any extra frame variables the upstream
/// symbolic executor exported, and the call's return expression (if it
/// returns a value).
#[derive(Debug, Clone)]
pub struct Call {
    pub function: Arc<str>,
    args: Vec<(Arc<str>, Arg)>,
    extra_vars: Vec<(Arc<str>, (Expr, Expr))>,
    pub ret: Option<Expr>,
}

impl Call {
    pub fn arg(&self, name: &str) -> Option<&Arg> {
        self.args.iter().find(|(n, _)| n.as_ref() == name).map(|(_, a)| a)
    }

    pub fn args(&self) -> impl Iterator<Item = (&Arc<str>, &Arg)> {
        self.args.iter().map(|(n, a)| (n, a))
    }

    pub fn extra_var(&self, name: &str) -> Option<&(Expr, Expr)> {
        self.extra_vars.iter().find(|(n, _)| n.as_ref() == name).map(|(_, v)| v)
    }

    pub fn extra_vars(&self) -> impl Iterator<Item = (&Arc<str>, &(Expr, Expr))> {
        self.extra_vars.iter().map(|(n, v)| (n, v))
    }
}

/// In-memory assembler for [`Call`] values (SPEC_FULL.md §3).
#[derive(Debug, Clone, Default)]
pub struct CallBuilder {
    function: Option<Arc<str>>,
    args: Vec<(Arc<str>, Arg)>,
    extra_vars: Vec<(Arc<str>, (Expr, Expr))>,
    ret: Option<Expr>,
}

impl CallBuilder {
    pub fn new(function: impl Into<Arc<str>>) -> CallBuilder {
        CallBuilder {
            function: Some(function.into()),
            args: Vec::new(),
            extra_vars: Vec::new(),
            ret: None,
        }
    }

    pub fn arg(mut self, name: impl Into<Arc<str>>, arg: Arg) -> CallBuilder {
        self.args.push((name.into(), arg));
        self
    }

    pub fn extra_var(mut self, name: impl Into<Arc<str>>, before: Expr, after: Expr) -> CallBuilder {
        self.extra_vars.push((name.into(), (before, after)));
        self
    }

    pub fn ret(mut self, ret: Expr) -> CallBuilder {
        self.ret = Some(ret);
        self
    }

    pub fn build(self) -> Call {
        Call {
            function: self.function.expect("CallBuilder::build called without a function name"),
            args: self.args,
            extra_vars: self.extra_vars,
            ret: self.ret,
        }
    }
}

/// One call path: the source filename (for provenance and diagnostics), its
/// path constraints, and the ordered calls the upstream symbolic executor
/// recorded along it (spec.md §3).
#[derive(Debug, Clone)]
pub struct CallPath {
    pub filename: Arc<str>,
    pub constraints: Vec<Expr>,
    pub calls: Vec<Call>,
}

impl CallPath {
    /// All calls from `cursor` onward that haven't yet been consumed by the
    /// BDD constructor (spec.md §4.4 advances a per-path cursor).
    pub fn remaining(&self, cursor: usize) -> &[Call] {
        &self.calls[cursor.min(self.calls.len())..]
    }
}

/// In-memory assembler for [`CallPath`] values.
#[derive(Debug, Clone, Default)]
pub struct CallPathBuilder {
    filename: Option<Arc<str>>,
    constraints: Vec<Expr>,
    calls: Vec<Call>,
}

impl CallPathBuilder {
    pub fn new(filename: impl Into<Arc<str>>) -> CallPathBuilder {
        CallPathBuilder {
            filename: Some(filename.into()),
            constraints: Vec::new(),
            calls: Vec::new(),
        }
    }

    pub fn constraint(mut self, c: Expr) -> CallPathBuilder {
        debug_assert_eq!(c.width(), 1, "path constraints must be boolean (width 1)");
        self.constraints.push(c);
        self
    }

    pub fn call(mut self, c: Call) -> CallPathBuilder {
        self.calls.push(c);
        self
    }

    pub fn build(self) -> CallPath {
        CallPath {
            filename: self.filename.expect("CallPathBuilder::build called without a filename"),
            constraints: self.constraints,
            calls: self.calls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet_expr() -> Expr {
        let idx = Expr::constant(0, 32);
        Expr::read("packet_chunks", &idx)
    }

    #[test]
    fn call_builder_preserves_argument_order_and_lookup() {
        let call = CallBuilder::new("map_get")
            .arg("map", Arg::new(Expr::constant(1, 64)))
            .arg("key", Arg::new(packet_expr()))
            .ret(Expr::constant(0, 32))
            .build();

        let names: Vec<&str> = call.args().map(|(n, _)| n.as_ref()).collect();
        assert_eq!(names, vec!["map", "key"]);
        assert!(call.arg("key").is_some());
        assert!(call.arg("nonexistent").is_none());
    }

    #[test]
    fn out_pointer_arg_is_flagged() {
        let before = Expr::constant(0, 32);
        let after = Expr::constant(1, 32);
        let arg = Arg::with_in_out(before, after);
        assert!(arg.is_out_pointer());

        let plain = Arg::new(Expr::constant(5, 8));
        assert!(!plain.is_out_pointer());
    }

    #[test]
    fn call_path_builder_tracks_remaining_calls() {
        let path = CallPathBuilder::new("test.call_path")
            .constraint(Expr::eq(&Expr::constant(1, 8), &Expr::constant(1, 8)))
            .call(CallBuilder::new("packet_borrow_next_chunk").build())
            .call(CallBuilder::new("packet_return_chunk").build())
            .build();

        assert_eq!(path.remaining(0).len(), 2);
        assert_eq!(path.remaining(1).len(), 1);
        assert_eq!(path.remaining(1)[0].function.as_ref(), "packet_return_chunk");
        assert_eq!(path.remaining(5).len(), 0);
    }

    #[test]
    fn symbol_structural_equality() {
        let e = packet_expr();
        let s1 = Symbol::new("s1", "s", e.clone());
        let s2 = Symbol::new("s1", "s", e.clone());
        assert_eq!(s1, s2);

        let s3 = Symbol::new("s1", "s", Expr::constant(9, 8));
        assert_ne!(s1, s3);
    }
}
