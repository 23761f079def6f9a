//! The BDD data structure (component C4, spec.md §3 & §9): `Branch`,
//! `Call`, `ReturnInit`, `ReturnProcess` nodes in a flat arena indexed by
//! [`NodeId`]. Ownership is one-directional — the arena owns every node;
//! "previous node" navigation is a provenance list or an explicit
//! side-table (see [`layering`]), never a live parent pointer, per spec.md
//! §9's Design Note.

mod group;
mod layering;
mod populate;
mod serialize;

#[cfg(test)]
mod tests;

use crate::call::{Call, CallPath, Symbol};
use crate::error::{Error, InvariantError, Result};
use crate::expr::Expr;
use crate::solver::SolverContext;
use std::collections::HashMap;
use std::sync::Arc;

pub use layering::{BorrowRecord, PacketLayering};
pub(crate) use populate::constraints_for;
pub use serialize::{deserialize, serialize};

/// A handle into a [`Bdd`]'s node arena. Stable for the lifetime of the
/// `Bdd` that produced it; renumbered only by [`Bdd::clone_with_renumbering`].
pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnInitValue {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnProcessOp {
    Fwd(u32),
    Drop,
    Broadcast,
    Err,
}

/// One node of a finalized BDD (spec.md §3). `ReturnRaw`, the
/// construction-only variant, never appears here — see
/// [`populate`](self::populate)'s private `RawNode`.
#[derive(Debug, Clone)]
pub enum Node {
    Branch {
        id: NodeId,
        condition: Expr,
        on_true: NodeId,
        on_false: NodeId,
        provenance: Vec<Arc<str>>,
    },
    Call {
        id: NodeId,
        call: Call,
        generated_symbols: Vec<Symbol>,
        next: NodeId,
        provenance: Vec<Arc<str>>,
    },
    ReturnInit {
        id: NodeId,
        value: ReturnInitValue,
        provenance: Vec<Arc<str>>,
    },
    ReturnProcess {
        id: NodeId,
        operation: ReturnProcessOp,
        provenance: Vec<Arc<str>>,
    },
}

impl Node {
    pub fn id(&self) -> NodeId {
        match self {
            Node::Branch { id, .. } | Node::Call { id, .. } | Node::ReturnInit { id, .. } | Node::ReturnProcess { id, .. } => *id,
        }
    }

    pub fn provenance(&self) -> &[Arc<str>] {
        match self {
            Node::Branch { provenance, .. }
            | Node::Call { provenance, .. }
            | Node::ReturnInit { provenance, .. }
            | Node::ReturnProcess { provenance, .. } => provenance,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::ReturnInit { .. } | Node::ReturnProcess { .. })
    }

    /// This node's immediate successors, in order. Used by
    /// [`Bdd::check_shape`] (spec.md §8 property 3) and by traversals that
    /// don't need to match on the node kind.
    pub fn successors(&self) -> Vec<NodeId> {
        match self {
            Node::Branch { on_true, on_false, .. } => vec![*on_true, *on_false],
            Node::Call { next, .. } => vec![*next],
            Node::ReturnInit { .. } | Node::ReturnProcess { .. } => vec![],
        }
    }
}

/// The finalized, immutable BDD: a flat node arena plus the two
/// distinguished roots `init_root`/`process_root` (spec.md §3), split by
/// the first occurrence of the marker call `start_time` on every path.
#[derive(Debug, Clone)]
pub struct Bdd {
    nodes: Vec<Node>,
    init_root: NodeId,
    process_root: NodeId,
}

impl Bdd {
    pub(crate) fn from_parts(nodes: Vec<Node>, init_root: NodeId, process_root: NodeId) -> Bdd {
        Bdd {
            nodes,
            init_root,
            process_root,
        }
    }

    pub fn init_root(&self) -> NodeId {
        self.init_root
    }

    pub fn process_root(&self) -> NodeId {
        self.process_root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Builds a BDD from call paths, driving C3's grouper (spec.md §4.4).
    pub fn build(paths: &[CallPath], solver: &mut SolverContext) -> Result<Bdd> {
        log::debug!("building BDD from {} call paths", paths.len());
        let bdd = populate::build(paths, solver)?;
        log::info!(
            "built BDD with {} nodes (init_root={}, process_root={})",
            bdd.len(),
            bdd.init_root,
            bdd.process_root
        );
        Ok(bdd)
    }

    /// Checks spec.md §8 property 3: every node has the arity its kind
    /// mandates, every successor id is in range, and every `Branch`'s
    /// condition has width 1.
    pub fn check_shape(&self) -> Result<()> {
        for (i, n) in self.nodes.iter().enumerate() {
            if n.id() != i {
                return Err(Error::from(InvariantError::WrongArity {
                    node: i,
                    kind: "id",
                    expected: i,
                    found: n.id(),
                }));
            }
            for succ in n.successors() {
                if succ >= self.nodes.len() {
                    return Err(Error::from(InvariantError::WrongArity {
                        node: i,
                        kind: "successor",
                        expected: self.nodes.len(),
                        found: succ,
                    }));
                }
            }
            if let Node::Branch { condition, .. } = n {
                if condition.width() != 1 {
                    return Err(Error::from(InvariantError::WidthMismatch {
                        op: "Branch.condition",
                        expected: 1,
                        found: condition.width(),
                    }));
                }
            }
        }
        Ok(())
    }

    /// Produces a standalone copy of the subgraph reachable from `root`,
    /// with freshly assigned, densely packed node ids (spec.md §3's only
    /// sanctioned mutator on an otherwise-immutable BDD). Used by the
    /// synthesizer's `SendToController` module to detach the unconsumed
    /// remainder of a BDD into its own x86 sub-plan.
    pub fn clone_with_renumbering(&self, root: NodeId) -> (Bdd, NodeId) {
        let mut new_nodes: Vec<Node> = Vec::new();
        let mut mapping: HashMap<NodeId, NodeId> = HashMap::new();
        let new_root = self.renumber_rec(root, &mut new_nodes, &mut mapping);
        let bdd = Bdd {
            nodes: new_nodes,
            init_root: new_root,
            process_root: new_root,
        };
        (bdd, new_root)
    }

    fn renumber_rec(&self, id: NodeId, out: &mut Vec<Node>, mapping: &mut HashMap<NodeId, NodeId>) -> NodeId {
        if let Some(&new_id) = mapping.get(&id) {
            return new_id;
        }
        let new_id = match &self.nodes[id] {
            Node::Branch {
                condition,
                on_true,
                on_false,
                provenance,
                ..
            } => {
                let nt = self.renumber_rec(*on_true, out, mapping);
                let nf = self.renumber_rec(*on_false, out, mapping);
                let new_id = out.len();
                out.push(Node::Branch {
                    id: new_id,
                    condition: condition.clone(),
                    on_true: nt,
                    on_false: nf,
                    provenance: provenance.clone(),
                });
                new_id
            }
            Node::Call {
                call,
                generated_symbols,
                next,
                provenance,
                ..
            } => {
                let nn = self.renumber_rec(*next, out, mapping);
                let new_id = out.len();
                out.push(Node::Call {
                    id: new_id,
                    call: call.clone(),
                    generated_symbols: generated_symbols.clone(),
                    next: nn,
                    provenance: provenance.clone(),
                });
                new_id
            }
            Node::ReturnInit { value, provenance, .. } => {
                let new_id = out.len();
                out.push(Node::ReturnInit {
                    id: new_id,
                    value: *value,
                    provenance: provenance.clone(),
                });
                new_id
            }
            Node::ReturnProcess { operation, provenance, .. } => {
                let new_id = out.len();
                out.push(Node::ReturnProcess {
                    id: new_id,
                    operation: *operation,
                    provenance: provenance.clone(),
                });
                new_id
            }
        };
        mapping.insert(id, new_id);
        new_id
    }

    /// A Graphviz rendering of the whole arena (spec.md §6's `--gv` output,
    /// exposed here as a library function per SPEC_FULL.md §6 since the CLI
    /// layer itself is out of scope).
    pub fn write_graphviz(&self, out: &mut impl std::fmt::Write) -> std::fmt::Result {
        writeln!(out, "digraph bdd {{")?;
        for n in &self.nodes {
            match n {
                Node::Branch { id, condition, on_true, on_false, .. } => {
                    writeln!(out, "  n{} [label=\"{}\", shape=diamond];", id, condition)?;
                    writeln!(out, "  n{} -> n{} [label=\"true\"];", id, on_true)?;
                    writeln!(out, "  n{} -> n{} [label=\"false\"];", id, on_false)?;
                }
                Node::Call { id, call, next, .. } => {
                    writeln!(out, "  n{} [label=\"{}\", shape=box];", id, call.function)?;
                    writeln!(out, "  n{} -> n{};", id, next)?;
                }
                Node::ReturnInit { id, value, .. } => {
                    writeln!(out, "  n{} [label=\"init:{:?}\", shape=ellipse];", id, value)?;
                }
                Node::ReturnProcess { id, operation, .. } => {
                    writeln!(out, "  n{} [label=\"process:{:?}\", shape=ellipse];", id, operation)?;
                }
            }
        }
        writeln!(out, "  root_init -> n{};", self.init_root)?;
        writeln!(out, "  root_process -> n{};", self.process_root)?;
        writeln!(out, "}}")
    }
}
