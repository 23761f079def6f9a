//! Execution-plan synthesizer (component C5, spec.md §4.5): lowers a
//! [`Bdd`](crate::bdd::Bdd) into a tree of target-specific [`Module`]s via a
//! best-first search over partial plans.
//!
//! Modules are a tagged-variant-plus-trait-object registry, per spec.md
//! §9's Design Note — the same shape this lineage uses for its
//! [`Minimizable`](crate::call) family of transparent, `&self`-returning
//! traits, generalized here from "one trait, many implementing types" to
//! "one trait, a per-target ordered list of candidate implementations".
//! Plan nodes are owned by a flat arena and reference each other (including
//! upward, for modules like `IPv4Consume` that need to know whether an
//! `EthernetConsume` precedes them) only via [`EpNodeId`] handles, never
//! live references — the same arena-plus-`NodeId` discipline spec.md §9
//! mandates for the BDD itself.

pub mod modifications;
pub mod p4;
pub mod x86;

#[cfg(test)]
mod tests;

use crate::bdd::{constraints_for, Bdd, Node, NodeId};
use crate::call::CallPath;
use crate::error::{Error, NoPlanError, Result};
use crate::expr::Expr;
use crate::solver::SolverContext;
use std::any::Any;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    X86,
    Tofino,
    BMv2SimpleSwitchgRPC,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::X86 => write!(f, "x86"),
            Target::Tofino => write!(f, "Tofino"),
            Target::BMv2SimpleSwitchgRPC => write!(f, "BMv2SimpleSwitchgRPC"),
        }
    }
}

/// One module of a target's catalogue (spec.md §4.5): recognizes a shape
/// at the head of the remaining BDD and lowers it into a plan fragment.
/// `equals`/`clone_box`/`as_any` exist purely so `Box<dyn Module>` can
/// support spec.md §8 property 7 (`module.equals(module.clone())`) without
/// every module author hand-rolling a `PartialEq` impl for a trait object.
pub trait Module: fmt::Debug {
    fn target(&self) -> Target;
    fn name(&self) -> &'static str;
    /// `Some(target)` if matching this module hands subsequent leaves to a
    /// different target's catalogue (spec.md §4.5's cross-target
    /// transitions; `SendToController` is the only module that uses this).
    fn next_target(&self) -> Option<Target> {
        None
    }
    fn clone_box(&self) -> Box<dyn Module>;
    fn as_any(&self) -> &dyn Any;
    fn equals(&self, other: &dyn Module) -> bool;
}

impl Clone for Box<dyn Module> {
    fn clone(&self) -> Box<dyn Module> {
        self.clone_box()
    }
}

/// Boilerplate for a `Module` impl: `clone_box`/`as_any`/`equals` are
/// mechanical once the struct derives `Clone` and `PartialEq`.
macro_rules! impl_module_plumbing {
    ($ty:ty) => {
        fn clone_box(&self) -> Box<dyn Module> {
            Box::new(self.clone())
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn equals(&self, other: &dyn Module) -> bool {
            other.as_any().downcast_ref::<$ty>() == Some(self)
        }
    };
}
pub(crate) use impl_module_plumbing;

pub type EpNodeId = usize;

/// A leaf a module chain still has to continue through, either carrying on
/// at the same target (the common case) or wrapped in a fixed module of its
/// own — `If`'s `Then`/`Else` children are the only catalogue entries that
/// need the latter.
pub enum NextLeaf {
    Continue(NodeId, Target),
    Wrapped(Box<dyn Module>, NodeId, Target),
}

/// What `Module::try_match` hands back for one non-deterministic way a
/// match could extend the plan (spec.md §4.5: "each successor plan
/// corresponds to one non-deterministic way the match could extend the
/// plan").
pub struct ModuleMatch {
    pub module: Box<dyn Module>,
    pub next: Vec<NextLeaf>,
}

#[derive(Clone)]
enum EpNode {
    Module {
        module: Box<dyn Module>,
        parent: Option<EpNodeId>,
        children: Vec<EpNodeId>,
    },
    Pending {
        bdd_node: NodeId,
        target: Target,
        parent: Option<EpNodeId>,
    },
}

/// A tree of modules mirroring the BDD's branching structure (spec.md
/// glossary), under construction or finished. `pending` tracks every
/// not-yet-matched leaf so the search loop doesn't have to re-scan the
/// arena on every iteration.
#[derive(Clone)]
pub struct ExecutionPlan {
    nodes: Vec<EpNode>,
    pending: Vec<EpNodeId>,
}

impl ExecutionPlan {
    pub fn new(bdd_root: NodeId, target: Target) -> ExecutionPlan {
        ExecutionPlan {
            nodes: vec![EpNode::Pending {
                bdd_node: bdd_root,
                target,
                parent: None,
            }],
            pending: vec![0],
        }
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    /// The BDD node and active target a given pending leaf still has to
    /// match against.
    fn leaf_info(&self, leaf: EpNodeId) -> (NodeId, Target) {
        match &self.nodes[leaf] {
            EpNode::Pending { bdd_node, target, .. } => (*bdd_node, *target),
            EpNode::Module { .. } => panic!("leaf_info called on a non-pending node"),
        }
    }

    /// Modules along the root-to-`leaf` path, in root-first order — what
    /// `EthernetConsume`/`IPv4Consume`/`TcpUdpConsume` need to check "no
    /// other packet_borrow_next_chunk on the prev chain" without the BDD
    /// or the plan ever carrying a live parent reference.
    pub fn ancestors(&self, leaf: EpNodeId) -> Vec<&dyn Module> {
        let mut out = Vec::new();
        let mut cur = match &self.nodes[leaf] {
            EpNode::Pending { parent, .. } => *parent,
            EpNode::Module { parent, .. } => *parent,
        };
        while let Some(id) = cur {
            match &self.nodes[id] {
                EpNode::Module { module, parent, .. } => {
                    out.push(module.as_ref());
                    cur = *parent;
                }
                EpNode::Pending { parent, .. } => cur = *parent,
            }
        }
        out.reverse();
        out
    }

    /// Every module placed in the plan so far, in arena order (used by
    /// `TableLookup`'s same-table merge search, which needs to find a
    /// prior lookup anywhere in the plan, not just on the current leaf's
    /// ancestor chain).
    pub fn modules(&self) -> impl Iterator<Item = &dyn Module> {
        self.nodes.iter().filter_map(|n| match n {
            EpNode::Module { module, .. } => Some(module.as_ref()),
            EpNode::Pending { .. } => None,
        })
    }

    /// Replaces `leaf` with `m.module`, wiring up whatever continuation
    /// leaves `m.next` describes. Returns a new, independent plan — search
    /// explores a frontier of whole plans, so every match forks one.
    pub fn apply(&self, leaf: EpNodeId, m: ModuleMatch) -> ExecutionPlan {
        let mut plan = self.clone();
        plan.pending.retain(|&id| id != leaf);

        let parent = match &plan.nodes[leaf] {
            EpNode::Pending { parent, .. } => *parent,
            EpNode::Module { .. } => panic!("apply called on a non-pending node"),
        };

        let mut children = Vec::with_capacity(m.next.len());
        for leaf_spec in m.next {
            match leaf_spec {
                NextLeaf::Continue(bdd_node, target) => {
                    let id = plan.nodes.len();
                    plan.nodes.push(EpNode::Pending {
                        bdd_node,
                        target,
                        parent: Some(leaf),
                    });
                    plan.pending.push(id);
                    children.push(id);
                }
                NextLeaf::Wrapped(inner, bdd_node, target) => {
                    let wrap_id = plan.nodes.len();
                    plan.nodes.push(EpNode::Module {
                        module: inner,
                        parent: Some(leaf),
                        children: Vec::new(),
                    });
                    let pending_id = plan.nodes.len();
                    plan.nodes.push(EpNode::Pending {
                        bdd_node,
                        target,
                        parent: Some(wrap_id),
                    });
                    if let EpNode::Module { children: wrap_children, .. } = &mut plan.nodes[wrap_id] {
                        wrap_children.push(pending_id);
                    }
                    plan.pending.push(pending_id);
                    children.push(wrap_id);
                }
            }
        }

        plan.nodes[leaf] = EpNode::Module {
            module: m.module,
            parent,
            children,
        };
        plan
    }

    /// spec.md §8 property 6: every leaf of the plan is terminal. A
    /// `Module` node with no children already *is* terminal by
    /// construction (it absorbed a `ReturnInit`/`ReturnProcess` or chose
    /// not to continue); the only way a leaf can fail to be terminal is a
    /// `Pending` node the search never got to, so this reduces to "no
    /// pending leaves remain".
    pub fn leaves_are_terminal(&self) -> bool {
        self.pending.is_empty()
    }

    /// Count of modules placed whose target isn't plain `x86` — the
    /// "maximize hardware offload" heuristic's score.
    fn hardware_offload_score(&self) -> usize {
        self.modules().filter(|m| m.target() != Target::X86).count()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// A total order on plans (spec.md §4.5): pure, side-effect-free, picks
/// which pending plan in the frontier to expand next.
pub trait Heuristic {
    fn pick(&self, frontier: &[ExecutionPlan]) -> Option<usize>;
}

/// Prefers the plan that has pushed the most logic into non-`x86`
/// (hardware) modules so far, breaking ties toward the smallest plan —
/// spec.md §4.5's example heuristic ("maximizing the number of BDD nodes
/// absorbed by P4 modules").
#[derive(Debug, Clone, Copy, Default)]
pub struct MaximizeHardwareOffload;

impl Heuristic for MaximizeHardwareOffload {
    fn pick(&self, frontier: &[ExecutionPlan]) -> Option<usize> {
        frontier
            .iter()
            .enumerate()
            .max_by_key(|(_, p)| (p.hardware_offload_score(), std::cmp::Reverse(p.node_count())))
            .map(|(i, _)| i)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchConfig {
    /// Caps the number of frontier expansions; `0` means unbounded (the
    /// search still terminates per spec.md §8 property 6's finiteness
    /// argument, but a cap avoids runaway exploration on a malformed BDD).
    pub max_iterations: usize,
}

impl Default for SearchConfig {
    fn default() -> SearchConfig {
        SearchConfig { max_iterations: 100_000 }
    }
}

pub type ModuleFn = fn(&mut MatchContext, &ExecutionPlan, EpNodeId) -> Result<Option<Vec<ModuleMatch>>>;

/// Everything a module's `try_match` needs besides the plan and the leaf
/// it's being asked about.
pub struct MatchContext<'a> {
    pub bdd: &'a Bdd,
    pub paths: &'a [CallPath],
    pub solver: &'a mut SolverContext,
}

impl<'a> MatchContext<'a> {
    pub fn node(&self, id: NodeId) -> &Node {
        self.bdd.node(id)
    }

    pub fn constraints(&self, node: NodeId) -> &[Expr] {
        constraints_for(self.paths, self.bdd.node(node).provenance())
    }
}

fn catalogue(target: Target) -> &'static [ModuleFn] {
    match target {
        Target::X86 => x86::CATALOGUE,
        Target::Tofino | Target::BMv2SimpleSwitchgRPC => p4::CATALOGUE,
    }
}

/// Drives the best-first search of spec.md §4.5 to a complete plan, or
/// `no_plan_for_target` if the frontier empties first.
pub fn synthesize(
    bdd: &Bdd,
    paths: &[CallPath],
    root: NodeId,
    initial_target: Target,
    solver: &mut SolverContext,
    heuristic: &dyn Heuristic,
    config: &SearchConfig,
) -> Result<ExecutionPlan> {
    log::debug!("starting synthesis for target {} at BDD node {}", initial_target, root);
    let mut frontier = vec![ExecutionPlan::new(root, initial_target)];
    let mut iterations = 0usize;
    // The most recent call name no catalogue module recognized (spec.md §7's
    // "unhandled call" error kind is more actionable than a bare
    // `no_plan_for_target`, so we surface it when the frontier empties with
    // one on record).
    let mut last_unhandled_call: Option<String> = None;

    while let Some(idx) = heuristic.pick(&frontier) {
        if config.max_iterations != 0 && iterations >= config.max_iterations {
            log::warn!("synthesis for target {} hit max_iterations={}", initial_target, config.max_iterations);
            break;
        }
        iterations += 1;

        let plan = frontier.swap_remove(idx);
        if plan.is_complete() {
            log::info!(
                "synthesized a {}-module plan for target {} after {} iteration(s)",
                plan.node_count(),
                initial_target,
                iterations
            );
            return Ok(plan);
        }

        let leaf = plan.pending[0];
        let (bdd_node, target) = plan.leaf_info(leaf);
        let mut ctx = MatchContext { bdd, paths, solver: &mut *solver };

        let mut matched = false;
        for module_fn in catalogue(target) {
            if let Some(matches) = module_fn(&mut ctx, &plan, leaf)? {
                matched = true;
                for m in matches {
                    frontier.push(plan.apply(leaf, m));
                }
            }
        }

        if !matched {
            if let Node::Call { call, .. } = bdd.node(bdd_node) {
                log::debug!("no {} module matched call `{}`", target, call.function);
                last_unhandled_call = Some(call.function.to_string());
            }
        }
    }

    if let Some(function) = last_unhandled_call {
        log::error!("synthesis for target {} could not absorb call `{}`", initial_target, function);
        return Err(Error::from(crate::error::UnhandledCallError { function }));
    }

    log::error!("synthesis frontier emptied for target {} after {} iteration(s)", initial_target, iterations);
    Err(Error::from(NoPlanError {
        target: initial_target.to_string(),
        deepest_common_prefix: 0,
    }))
}
