//! Hash-consing arena for `Expr` nodes
//!
//! Mirrors the `BddManager` unique-table pattern this lineage already uses
//! for its boolean BDD nodes, generalized from single-bit decision nodes to
//! full bit-vector expression nodes: a global weak singleton, an
//! append-only node `Vec` (ids are stable and never reused), and a
//! `HashMap` unique table keyed by the node's own (kind, width) so that
//! structurally identical expressions always resolve to the same id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};

pub(crate) type NodeId = u32;

/// Global weak reference to the arena, recreated lazily. Upgradeable while
/// any `Expr` (which holds a strong `Arc`) is alive; dropped once the last
/// one goes away so hash-consing does not pin memory forever across
/// unrelated test cases or pipeline runs.
static GLOBAL_EXPR_ARENA: Mutex<Weak<RwLock<ExprArena>>> = Mutex::new(Weak::new());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl BinOp {
    pub(crate) fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq
                | BinOp::Ne
                | BinOp::Ult
                | BinOp::Ule
                | BinOp::Ugt
                | BinOp::Uge
                | BinOp::Slt
                | BinOp::Sle
                | BinOp::Sgt
                | BinOp::Sge
        )
    }

    pub(crate) fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::UDiv => "/u",
            BinOp::SDiv => "/s",
            BinOp::URem => "%u",
            BinOp::SRem => "%s",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Shl => "<<",
            BinOp::LShr => ">>u",
            BinOp::AShr => ">>s",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Ult => "<u",
            BinOp::Ule => "<=u",
            BinOp::Ugt => ">u",
            BinOp::Uge => ">=u",
            BinOp::Slt => "<s",
            BinOp::Sle => "<=s",
            BinOp::Sgt => ">s",
            BinOp::Sge => ">=s",
        }
    }
}

/// The kind of a single hash-consed node. Operands are `NodeId`s, not
/// owned `Expr` values, so the whole node stays cheap to hash and clone
/// for the unique table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ExprKind {
    Constant(u128),
    Read {
        array: Arc<str>,
        index: NodeId,
    },
    Concat(NodeId, NodeId),
    Extract {
        src: NodeId,
        offset: u32,
    },
    ZExt(NodeId),
    SExt(NodeId),
    Not(NodeId),
    Binary(BinOp, NodeId, NodeId),
    Select {
        cond: NodeId,
        then_branch: NodeId,
        else_branch: NodeId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Node {
    pub(crate) kind: ExprKind,
    pub(crate) width: u32,
}

#[derive(Debug, Default)]
pub(crate) struct ExprArena {
    pub(crate) nodes: Vec<Node>,
    pub(crate) unique_table: HashMap<Node, NodeId>,
}

impl ExprArena {
    pub(crate) fn get_or_create() -> Arc<RwLock<Self>> {
        let mut guard = GLOBAL_EXPR_ARENA.lock().unwrap();
        if let Some(arena) = guard.upgrade() {
            arena
        } else {
            let arena = Arc::new(RwLock::new(ExprArena::default()));
            *guard = Arc::downgrade(&arena);
            arena
        }
    }

    /// Hash-cons `node`, returning the existing id if an identical node was
    /// already built, or appending and returning a fresh id otherwise.
    pub(crate) fn intern(&mut self, node: Node) -> NodeId {
        if let Some(&id) = self.unique_table.get(&node) {
            return id;
        }
        let id = self.nodes.len() as NodeId;
        self.unique_table.insert(node.clone(), id);
        self.nodes.push(node);
        id
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }
}
