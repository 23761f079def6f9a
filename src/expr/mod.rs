//! Symbolic bit-vector expression trees (component C1).
//!
//! An [`Expr`] is a cheap handle (an arena id plus its cached width) into a
//! process-wide hash-consing arena: building the same expression twice
//! always yields the same handle, so structural equality is an id
//! comparison and sharing is automatic. Every public constructor
//! type-checks operand widths against the operator's bit-vector semantics
//! and performs the canonical simplifications spec.md §4.1 calls out
//! (constant folding, single-sibling `Concat` stripping, `Extract` of
//! `Concat` when the slice aligns with a component, `Eq` of a comparison
//! with its own polarity).

mod arena;
mod display;
mod fold;
mod symbols;

#[cfg(test)]
mod tests;

use arena::{BinOp, ExprArena, ExprKind, Node, NodeId};
use std::sync::{Arc, RwLock};

pub(crate) use arena::BinOp as ExprBinOp;
pub(crate) use fold::fold as fold_expr;
pub(crate) use fold::rebuild as rebuild_expr;
pub use fold::ExprView;
pub use symbols::{is_readlsb_complete, retrieve_symbols};

/// A symbolic bit-vector expression. Two `Expr` values are `==` iff they
/// denote the same hash-consed node.
#[derive(Clone)]
pub struct Expr {
    arena: Arc<RwLock<ExprArena>>,
    id: NodeId,
    width: u32,
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.arena, &other.arena) && self.id == other.id
    }
}
impl Eq for Expr {}

impl std::hash::Hash for Expr {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Expr {
    fn from_kind(width: u32, kind: ExprKind) -> Expr {
        assert!(width > 0, "expression width must be nonzero");
        let arena = ExprArena::get_or_create();
        let id = {
            let mut guard = arena.write().unwrap();
            guard.intern(Node { kind, width })
        };
        Expr { arena, id, width }
    }

    /// The bit-width mandated by this node's operator (spec.md §8 property 1).
    pub fn width(&self) -> u32 {
        self.width
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    fn node(&self) -> arena::Node {
        self.arena.read().unwrap().node(self.id).clone()
    }

    /// A stable, process-local identifier for this expression's hash-consed
    /// node. Used as the memoization key by visitors (the solver's
    /// `ReplaceSymbols`/`RenameSymbols`, the expression pretty-printer).
    pub fn node_id(&self) -> u64 {
        self.id as u64
    }

    fn child(&self, id: NodeId) -> Expr {
        // Children always live in the same arena the parent was built in.
        let width = self.arena.read().unwrap().node(id).width;
        Expr {
            arena: Arc::clone(&self.arena),
            id,
            width,
        }
    }

    // ---- Factory functions -------------------------------------------------

    pub fn constant(value: u128, width: u32) -> Expr {
        assert!(width > 0 && width <= 128, "constant width out of range: {}", width);
        let masked = if width == 128 {
            value
        } else {
            value & ((1u128 << width) - 1)
        };
        Expr::from_kind(width, ExprKind::Constant(masked))
    }

    pub fn read(array: impl Into<Arc<str>>, index: &Expr) -> Expr {
        Expr::from_kind(
            8,
            ExprKind::Read {
                array: array.into(),
                index: index.id,
            },
        )
    }

    /// Builds the canonical little-endian multi-byte read: a descending
    /// cascade of single-byte `Read`s concatenated high-to-low, i.e.
    /// `Concat(Read[n-1], Concat(Read[n-2], ..., Read[0]))`. The result
    /// always satisfies [`is_readlsb_complete`].
    pub fn read_lsb(array: impl Into<Arc<str>>, base_index: u64, width: u32) -> Expr {
        assert!(width % 8 == 0 && width > 0, "read_lsb width must be a positive multiple of 8");
        let array: Arc<str> = array.into();
        let n = (width / 8) as u64;
        let mut acc: Option<Expr> = None;
        for offset in (0..n).rev() {
            let idx = Expr::constant((base_index + offset) as u128, 32);
            let byte = Expr::read(Arc::clone(&array), &idx);
            acc = Some(match acc {
                None => byte,
                Some(hi) => Expr::concat(&hi, &byte),
            });
        }
        acc.expect("read_lsb width must be > 0")
    }

    pub fn concat(hi: &Expr, lo: &Expr) -> Expr {
        // Canonical simplification: Concat(Extract(hi-bits of x), Extract(lo-bits of x)) == x.
        if let (ExprKind::Extract { src: hs, offset: ho }, ExprKind::Extract { src: ls, offset: lo_off }) =
            (&hi.node().kind, &lo.node().kind)
        {
            if hs == ls && *lo_off == 0 && *ho == lo.width {
                return hi.child(*hs);
            }
        }
        Expr::from_kind(hi.width + lo.width, ExprKind::Concat(hi.id, lo.id))
    }

    pub fn extract(src: &Expr, offset_bits: u32, width: u32) -> Expr {
        assert!(
            offset_bits + width <= src.width,
            "extract [{}, {}) out of range for width {}",
            offset_bits,
            offset_bits + width,
            src.width
        );
        if offset_bits == 0 && width == src.width {
            return src.clone();
        }
        // Extract of a Concat: route to the component the slice lies wholly within.
        if let ExprKind::Concat(hi, lo) = src.node().kind {
            let lo_width = src.child(lo).width;
            let hi_width = src.child(hi).width;
            if offset_bits + width <= lo_width {
                return Expr::extract(&src.child(lo), offset_bits, width);
            }
            if offset_bits >= lo_width {
                return Expr::extract(&src.child(hi), offset_bits - lo_width, width);
            }
            debug_assert_eq!(lo_width + hi_width, src.width);
        }
        if let ExprKind::Extract { src: inner, offset } = src.node().kind {
            return Expr::extract(&src.child(inner), offset + offset_bits, width);
        }
        Expr::from_kind(
            width,
            ExprKind::Extract {
                src: src.id,
                offset: offset_bits,
            },
        )
    }

    pub fn zext(src: &Expr, width: u32) -> Expr {
        assert!(width >= src.width, "zext cannot shrink a value");
        if width == src.width {
            return src.clone();
        }
        Expr::from_kind(width, ExprKind::ZExt(src.id))
    }

    pub fn sext(src: &Expr, width: u32) -> Expr {
        assert!(width >= src.width, "sext cannot shrink a value");
        if width == src.width {
            return src.clone();
        }
        Expr::from_kind(width, ExprKind::SExt(src.id))
    }

    pub fn not(src: &Expr) -> Expr {
        if let ExprKind::Not(inner) = src.node().kind {
            return src.child(inner);
        }
        if let ExprKind::Constant(v) = src.node().kind {
            return Expr::constant(!v, src.width);
        }
        Expr::from_kind(src.width, ExprKind::Not(src.id))
    }

    fn binary(op: BinOp, a: &Expr, b: &Expr) -> Expr {
        assert_eq!(
            a.width, b.width,
            "operands of {} disagree on width ({} vs {})",
            op.symbol(),
            a.width,
            b.width
        );
        let width = if op.is_comparison() { 1 } else { a.width };

        if let (ExprKind::Constant(x), ExprKind::Constant(y)) = (a.node().kind, b.node().kind) {
            if let Some(folded) = fold_constants(op, x, y, a.width) {
                return Expr::constant(folded, width);
            }
        }

        // Eq(0, Eq(x, y)) / Eq(Eq(x,y), 0) simplifies to Ne(x, y), and vice
        // versa -- the comparison-of-a-comparison idiom this domain's path
        // conditions produce constantly (negated branch guards).
        if op == BinOp::Eq {
            if let ExprKind::Constant(0) = a.node().kind {
                if let ExprKind::Binary(inner_op, x, y) = b.node().kind {
                    if inner_op.is_comparison() {
                        if let Some(negated) = negate_comparison(inner_op) {
                            return Expr::binary(negated, &b.child(x), &b.child(y));
                        }
                    }
                }
            }
            if let ExprKind::Constant(0) = b.node().kind {
                if let ExprKind::Binary(inner_op, x, y) = a.node().kind {
                    if inner_op.is_comparison() {
                        if let Some(negated) = negate_comparison(inner_op) {
                            return Expr::binary(negated, &a.child(x), &a.child(y));
                        }
                    }
                }
            }
        }

        Expr::from_kind(width, ExprKind::Binary(op, a.id, b.id))
    }

    pub fn add(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::Add, a, b)
    }
    pub fn sub(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::Sub, a, b)
    }
    pub fn mul(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::Mul, a, b)
    }
    pub fn udiv(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::UDiv, a, b)
    }
    pub fn sdiv(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::SDiv, a, b)
    }
    pub fn urem(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::URem, a, b)
    }
    pub fn srem(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::SRem, a, b)
    }
    pub fn and(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::And, a, b)
    }
    pub fn or(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::Or, a, b)
    }
    pub fn xor(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::Xor, a, b)
    }
    pub fn shl(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::Shl, a, b)
    }
    pub fn lshr(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::LShr, a, b)
    }
    pub fn ashr(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::AShr, a, b)
    }
    pub fn eq(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::Eq, a, b)
    }
    pub fn ne(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::Ne, a, b)
    }
    pub fn ult(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::Ult, a, b)
    }
    pub fn ule(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::Ule, a, b)
    }
    pub fn ugt(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::Ugt, a, b)
    }
    pub fn uge(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::Uge, a, b)
    }
    pub fn slt(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::Slt, a, b)
    }
    pub fn sle(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::Sle, a, b)
    }
    pub fn sgt(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::Sgt, a, b)
    }
    pub fn sge(a: &Expr, b: &Expr) -> Expr {
        Expr::binary(BinOp::Sge, a, b)
    }

    pub fn select(cond: &Expr, then_branch: &Expr, else_branch: &Expr) -> Expr {
        assert_eq!(cond.width, 1, "select condition must have width 1");
        assert_eq!(
            then_branch.width, else_branch.width,
            "select branches disagree on width"
        );
        if let ExprKind::Constant(c) = cond.node().kind {
            return if c == 1 {
                then_branch.clone()
            } else {
                else_branch.clone()
            };
        }
        if then_branch == else_branch {
            return then_branch.clone();
        }
        Expr::from_kind(
            then_branch.width,
            ExprKind::Select {
                cond: cond.id,
                then_branch: then_branch.id,
                else_branch: else_branch.id,
            },
        )
    }

    /// `true` iff this node is a `Constant`.
    pub fn as_constant(&self) -> Option<u128> {
        match self.node().kind {
            ExprKind::Constant(v) => Some(v),
            _ => None,
        }
    }

    /// Structured, read-only view of this node's shape, for visitors that
    /// want to match on kind without reaching into the arena themselves.
    pub fn view(&self) -> ExprView {
        fold::view_of(self)
    }
}

/// Applies a [`BinOp`] by name. Used by the solver's rewriting visitors
/// (`ReplaceSymbols`, `RenameSymbols`, `SwapPacketEndianness`), which rebuild
/// a node's children and need to reapply the original operator through the
/// normal simplifying constructors rather than bypassing them.
pub(crate) fn apply_binop(op: BinOp, a: &Expr, b: &Expr) -> Expr {
    match op {
        BinOp::Add => Expr::add(a, b),
        BinOp::Sub => Expr::sub(a, b),
        BinOp::Mul => Expr::mul(a, b),
        BinOp::UDiv => Expr::udiv(a, b),
        BinOp::SDiv => Expr::sdiv(a, b),
        BinOp::URem => Expr::urem(a, b),
        BinOp::SRem => Expr::srem(a, b),
        BinOp::And => Expr::and(a, b),
        BinOp::Or => Expr::or(a, b),
        BinOp::Xor => Expr::xor(a, b),
        BinOp::Shl => Expr::shl(a, b),
        BinOp::LShr => Expr::lshr(a, b),
        BinOp::AShr => Expr::ashr(a, b),
        BinOp::Eq => Expr::eq(a, b),
        BinOp::Ne => Expr::ne(a, b),
        BinOp::Ult => Expr::ult(a, b),
        BinOp::Ule => Expr::ule(a, b),
        BinOp::Ugt => Expr::ugt(a, b),
        BinOp::Uge => Expr::uge(a, b),
        BinOp::Slt => Expr::slt(a, b),
        BinOp::Sle => Expr::sle(a, b),
        BinOp::Sgt => Expr::sgt(a, b),
        BinOp::Sge => Expr::sge(a, b),
    }
}

fn negate_comparison(op: BinOp) -> Option<BinOp> {
    Some(match op {
        BinOp::Eq => BinOp::Ne,
        BinOp::Ne => BinOp::Eq,
        _ => return None,
    })
}

fn fold_constants(op: BinOp, x: u128, y: u128, width: u32) -> Option<u128> {
    let mask = if width == 128 { u128::MAX } else { (1u128 << width) - 1 };
    let wrap = |v: u128| v & mask;
    let to_signed = |v: u128| -> i128 {
        if width == 128 {
            v as i128
        } else if v & (1u128 << (width - 1)) != 0 {
            (v as i128) - (1i128 << width)
        } else {
            v as i128
        }
    };
    Some(match op {
        BinOp::Add => wrap(x.wrapping_add(y)),
        BinOp::Sub => wrap(x.wrapping_sub(y)),
        BinOp::Mul => wrap(x.wrapping_mul(y)),
        BinOp::UDiv => {
            if y == 0 {
                return None;
            }
            wrap(x / y)
        }
        BinOp::URem => {
            if y == 0 {
                return None;
            }
            wrap(x % y)
        }
        BinOp::SDiv => {
            if y == 0 {
                return None;
            }
            wrap((to_signed(x) / to_signed(y)) as u128)
        }
        BinOp::SRem => {
            if y == 0 {
                return None;
            }
            wrap((to_signed(x) % to_signed(y)) as u128)
        }
        BinOp::And => wrap(x & y),
        BinOp::Or => wrap(x | y),
        BinOp::Xor => wrap(x ^ y),
        BinOp::Shl => wrap(x.wrapping_shl(y as u32)),
        BinOp::LShr => wrap(x.wrapping_shr(y as u32)),
        BinOp::AShr => wrap((to_signed(x) >> y) as u128),
        BinOp::Eq => (x == y) as u128,
        BinOp::Ne => (x != y) as u128,
        BinOp::Ult => (x < y) as u128,
        BinOp::Ule => (x <= y) as u128,
        BinOp::Ugt => (x > y) as u128,
        BinOp::Uge => (x >= y) as u128,
        BinOp::Slt => (to_signed(x) < to_signed(y)) as u128,
        BinOp::Sle => (to_signed(x) <= to_signed(y)) as u128,
        BinOp::Sgt => (to_signed(x) > to_signed(y)) as u128,
        BinOp::Sge => (to_signed(x) >= to_signed(y)) as u128,
    })
}

impl std::fmt::Debug for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", display::pretty(self))
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", display::pretty(self))
    }
}
