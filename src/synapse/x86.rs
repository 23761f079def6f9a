//! The x86 (software dataplane) module catalogue, spec.md §4.5: "one
//! module per LibVig call, plus control flow." x86 is also the target
//! every `SendToController` escape hatch lands on, so `ControllerHandoff`
//! lives here as the x86-side half of that cross-target edge.

use super::modifications::build_modifications;
use super::{impl_module_plumbing, MatchContext, Module, ModuleFn, ModuleMatch, NextLeaf, Target};
use crate::bdd::{Node, ReturnInitValue, ReturnProcessOp};
use crate::error::Result;
use crate::expr::Expr;

pub(crate) static CATALOGUE: &[ModuleFn] = &[
    match_if,
    match_forward,
    match_drop,
    match_broadcast,
    match_init_result,
    match_current_time,
    match_packet_borrow_next_chunk,
    match_packet_return_chunk,
    match_map_get,
    match_map_put,
    match_vector_borrow,
    match_vector_return,
    match_dchain_allocate_new_index,
    match_expire_items_single_map,
    match_controller_handoff,
    match_packet_receive,
];

#[derive(Debug, Clone, PartialEq)]
pub struct Forward {
    pub port: u32,
}
impl Module for Forward {
    fn target(&self) -> Target {
        Target::X86
    }
    fn name(&self) -> &'static str {
        "Forward"
    }
    impl_module_plumbing!(Forward);
}

fn match_forward(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    let (node_id, _) = plan.leaf_info(leaf);
    match ctx.node(node_id) {
        Node::ReturnProcess { operation: ReturnProcessOp::Fwd(port), .. } => Ok(Some(vec![ModuleMatch {
            module: Box::new(Forward { port: *port }),
            next: vec![],
        }])),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Drop;
impl Module for Drop {
    fn target(&self) -> Target {
        Target::X86
    }
    fn name(&self) -> &'static str {
        "Drop"
    }
    impl_module_plumbing!(Drop);
}

fn match_drop(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    let (node_id, _) = plan.leaf_info(leaf);
    match ctx.node(node_id) {
        Node::ReturnProcess { operation: ReturnProcessOp::Drop, .. } => Ok(Some(vec![ModuleMatch {
            module: Box::new(Drop),
            next: vec![],
        }])),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast;
impl Module for Broadcast {
    fn target(&self) -> Target {
        Target::X86
    }
    fn name(&self) -> &'static str {
        "Broadcast"
    }
    impl_module_plumbing!(Broadcast);
}

fn match_broadcast(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    let (node_id, _) = plan.leaf_info(leaf);
    match ctx.node(node_id) {
        Node::ReturnProcess { operation: ReturnProcessOp::Broadcast, .. } => Ok(Some(vec![ModuleMatch {
            module: Box::new(Broadcast),
            next: vec![],
        }])),
        _ => Ok(None),
    }
}

/// Absorbs the `init` phase's terminal `ReturnInit` node — not itself one
/// of spec.md §4.5's catalogue entries, but without it no x86 plan rooted
/// at `Bdd::init_root` could ever complete.
#[derive(Debug, Clone, PartialEq)]
pub struct InitResult {
    pub succeeded: bool,
}
impl Module for InitResult {
    fn target(&self) -> Target {
        Target::X86
    }
    fn name(&self) -> &'static str {
        "InitResult"
    }
    impl_module_plumbing!(InitResult);
}

fn match_init_result(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    let (node_id, _) = plan.leaf_info(leaf);
    match ctx.node(node_id) {
        Node::ReturnInit { value, .. } => Ok(Some(vec![ModuleMatch {
            module: Box::new(InitResult {
                succeeded: *value == ReturnInitValue::Success,
            }),
            next: vec![],
        }])),
        _ => Ok(None),
    }
}

/// `If`/`Then`/`Else`: one `Branch` BDD node lowers into an `If` module
/// whose two children are fixed `Then`/`Else` wrappers (spec.md §4.5),
/// built directly by [`super::ExecutionPlan::apply`] from the
/// `NextLeaf::Wrapped` entries below rather than re-entering the catalogue.
#[derive(Debug, Clone, PartialEq)]
pub struct If {
    pub condition: Expr,
}
impl Module for If {
    fn target(&self) -> Target {
        Target::X86
    }
    fn name(&self) -> &'static str {
        "If"
    }
    impl_module_plumbing!(If);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Then;
impl Module for Then {
    fn target(&self) -> Target {
        Target::X86
    }
    fn name(&self) -> &'static str {
        "Then"
    }
    impl_module_plumbing!(Then);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Else;
impl Module for Else {
    fn target(&self) -> Target {
        Target::X86
    }
    fn name(&self) -> &'static str {
        "Else"
    }
    impl_module_plumbing!(Else);
}

fn match_if(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    let (node_id, target) = plan.leaf_info(leaf);
    match ctx.node(node_id) {
        Node::Branch {
            condition,
            on_true,
            on_false,
            ..
        } => Ok(Some(vec![ModuleMatch {
            module: Box::new(If { condition: condition.clone() }),
            next: vec![
                NextLeaf::Wrapped(Box::new(Then), *on_true, target),
                NextLeaf::Wrapped(Box::new(Else), *on_false, target),
            ],
        }])),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentTime;
impl Module for CurrentTime {
    fn target(&self) -> Target {
        Target::X86
    }
    fn name(&self) -> &'static str {
        "CurrentTime"
    }
    impl_module_plumbing!(CurrentTime);
}

fn match_current_time(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    match_generic_call(ctx, plan, leaf, "current_time", || Box::new(CurrentTime))
}

#[derive(Debug, Clone, PartialEq)]
pub struct PacketBorrowNextChunk {
    pub length: u32,
}
impl Module for PacketBorrowNextChunk {
    fn target(&self) -> Target {
        Target::X86
    }
    fn name(&self) -> &'static str {
        "PacketBorrowNextChunk"
    }
    impl_module_plumbing!(PacketBorrowNextChunk);
}

fn match_packet_borrow_next_chunk(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    let (node_id, target) = plan.leaf_info(leaf);
    let Node::Call { call, next, .. } = ctx.node(node_id) else {
        return Ok(None);
    };
    if call.function.as_ref() != "packet_borrow_next_chunk" {
        return Ok(None);
    }
    let length = call.arg("length").and_then(|a| a.expr.as_constant()).unwrap_or(0) as u32;
    Ok(Some(vec![ModuleMatch {
        module: Box::new(PacketBorrowNextChunk { length }),
        next: vec![NextLeaf::Continue(*next, target)],
    }]))
}

#[derive(Debug, Clone, PartialEq)]
pub struct PacketReturnChunk;
impl Module for PacketReturnChunk {
    fn target(&self) -> Target {
        Target::X86
    }
    fn name(&self) -> &'static str {
        "PacketReturnChunk"
    }
    impl_module_plumbing!(PacketReturnChunk);
}

fn match_packet_return_chunk(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    let (node_id, target) = plan.leaf_info(leaf);
    let Node::Call { call, next, .. } = ctx.node(node_id) else {
        return Ok(None);
    };
    if call.function.as_ref() != "packet_return_chunk" {
        return Ok(None);
    }
    let Some(chunk) = call.arg("the_chunk") else {
        return Ok(None);
    };
    let (Some(prev), Some(curr)) = (&chunk.in_, &chunk.out) else {
        return Ok(None);
    };

    let constraints = ctx.constraints(node_id).to_vec();
    let modifications = build_modifications(prev, curr, &constraints, ctx.solver)?;
    let module: Box<dyn Module> = if modifications.is_empty() { Box::new(Ignore) } else { Box::new(PacketReturnChunk) };

    Ok(Some(vec![ModuleMatch {
        module,
        next: vec![NextLeaf::Continue(*next, target)],
    }]))
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapGet;
impl Module for MapGet {
    fn target(&self) -> Target {
        Target::X86
    }
    fn name(&self) -> &'static str {
        "MapGet"
    }
    impl_module_plumbing!(MapGet);
}

fn match_map_get(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    match_generic_call(ctx, plan, leaf, "map_get", || Box::new(MapGet))
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapPut;
impl Module for MapPut {
    fn target(&self) -> Target {
        Target::X86
    }
    fn name(&self) -> &'static str {
        "MapPut"
    }
    impl_module_plumbing!(MapPut);
}

fn match_map_put(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    match_generic_call(ctx, plan, leaf, "map_put", || Box::new(MapPut))
}

/// `vector` identifies which `dchain`-backed vector was borrowed;
/// `borrowed_cell` is the cell's content at borrow time, diffed by
/// [`match_vector_return`] against the value a later `vector_return` writes
/// back to decide whether the return is a no-op.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorBorrow {
    pub vector: Expr,
    pub borrowed_cell: Expr,
}
impl Module for VectorBorrow {
    fn target(&self) -> Target {
        Target::X86
    }
    fn name(&self) -> &'static str {
        "VectorBorrow"
    }
    impl_module_plumbing!(VectorBorrow);
}

fn match_vector_borrow(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    let (node_id, target) = plan.leaf_info(leaf);
    let Node::Call { call, next, .. } = ctx.node(node_id) else {
        return Ok(None);
    };
    if call.function.as_ref() != "vector_borrow" {
        return Ok(None);
    }
    let (Some(vector), Some(&(_, ref borrowed_cell))) = (call.arg("vector").map(|a| a.expr.clone()), call.extra_var("borrowed_cell")) else {
        return Ok(None);
    };
    Ok(Some(vec![ModuleMatch {
        module: Box::new(VectorBorrow { vector, borrowed_cell: borrowed_cell.clone() }),
        next: vec![NextLeaf::Continue(*next, target)],
    }]))
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorReturn;
impl Module for VectorReturn {
    fn target(&self) -> Target {
        Target::X86
    }
    fn name(&self) -> &'static str {
        "VectorReturn"
    }
    impl_module_plumbing!(VectorReturn);
}

fn match_vector_return(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    let (node_id, target) = plan.leaf_info(leaf);
    let Node::Call { call, next, .. } = ctx.node(node_id) else {
        return Ok(None);
    };
    if call.function.as_ref() != "vector_return" {
        return Ok(None);
    }
    let Some(vector) = call.arg("vector") else {
        return Ok(None);
    };
    let Some(cell_after) = call.arg("value").and_then(|a| a.in_.as_ref()) else {
        return Ok(None);
    };
    let ancestors = plan.ancestors(leaf);
    let Some(borrow) = ancestors.iter().rev().find_map(|m| m.as_any().downcast_ref::<VectorBorrow>()).filter(|b| b.vector.node_id() == vector.expr.node_id()) else {
        return Ok(None);
    };

    let constraints = ctx.constraints(node_id).to_vec();
    let modifications = build_modifications(&borrow.borrowed_cell, cell_after, &constraints, ctx.solver)?;
    let module: Box<dyn Module> = if modifications.is_empty() { Box::new(Ignore) } else { Box::new(VectorReturn) };

    Ok(Some(vec![ModuleMatch {
        module,
        next: vec![NextLeaf::Continue(*next, target)],
    }]))
}

#[derive(Debug, Clone, PartialEq)]
pub struct DchainAllocateNewIndex;
impl Module for DchainAllocateNewIndex {
    fn target(&self) -> Target {
        Target::X86
    }
    fn name(&self) -> &'static str {
        "DchainAllocateNewIndex"
    }
    impl_module_plumbing!(DchainAllocateNewIndex);
}

fn match_dchain_allocate_new_index(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    match_generic_call(ctx, plan, leaf, "dchain_allocate_new_index", || Box::new(DchainAllocateNewIndex))
}

/// Sweeps a dchain's expired flows out of its map and vector in one shot;
/// only x86 has a module for it (spec.md §8 scenario S4's escape hatch),
/// so a P4 plan carrying this call falls through to `SendToController`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpireItemsSingleMap;
impl Module for ExpireItemsSingleMap {
    fn target(&self) -> Target {
        Target::X86
    }
    fn name(&self) -> &'static str {
        "ExpireItemsSingleMap"
    }
    impl_module_plumbing!(ExpireItemsSingleMap);
}

fn match_expire_items_single_map(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    match_generic_call(ctx, plan, leaf, "expire_items_single_map", || Box::new(ExpireItemsSingleMap))
}

/// The x86-side half of `SendToController`'s cross-target edge: once a P4
/// plan hands its remainder BDD to x86 (spec.md §4.5), this is the module
/// that recognizes `send_to_controller` itself and absorbs it like any
/// other LibVig call, rather than requiring a dedicated P4 counterpart.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerHandoff;
impl Module for ControllerHandoff {
    fn target(&self) -> Target {
        Target::X86
    }
    fn name(&self) -> &'static str {
        "ControllerHandoff"
    }
    impl_module_plumbing!(ControllerHandoff);
}

fn match_controller_handoff(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    match_generic_call(ctx, plan, leaf, "send_to_controller", || Box::new(ControllerHandoff))
}

/// `packet_receive` is a bookkeeping call: it only exists in a process-phase
/// trail so [`infer_return_process`](super::super::bdd) can tell a `Drop`
/// outcome from an `Err` one (spec.md §4.4). It carries no dataplane action
/// of its own, so it is absorbed the same way P4's `Ignore` absorbs a no-op
/// `packet_return_chunk` — silently, leaving no trace in the finished plan
/// besides the bookkeeping module itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Ignore;
impl Module for Ignore {
    fn target(&self) -> Target {
        Target::X86
    }
    fn name(&self) -> &'static str {
        "Ignore"
    }
    impl_module_plumbing!(Ignore);
}

fn match_packet_receive(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    match_generic_call(ctx, plan, leaf, "packet_receive", || Box::new(Ignore))
}

/// Shared shape for the many x86 modules that just recognize one LibVig
/// call by name, absorb it unconditionally, and continue at its successor.
fn match_generic_call(
    ctx: &mut MatchContext,
    plan: &super::ExecutionPlan,
    leaf: super::EpNodeId,
    function: &str,
    module: impl FnOnce() -> Box<dyn Module>,
) -> Result<Option<Vec<ModuleMatch>>> {
    let (node_id, target) = plan.leaf_info(leaf);
    let Node::Call { call, next, .. } = ctx.node(node_id) else {
        return Ok(None);
    };
    if call.function.as_ref() != function {
        return Ok(None);
    }
    Ok(Some(vec![ModuleMatch {
        module: module(),
        next: vec![NextLeaf::Continue(*next, target)],
    }]))
}
