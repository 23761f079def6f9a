//! The Tofino/BMv2 module catalogue, spec.md §4.5: header parsers
//! (`EthernetConsume`/`Modify`, `IPv4Consume`/`Modify`, `TcpUdpConsume`/
//! `Modify`), table lifting (`TableLookup`/`CachedTableLookup`), the
//! `dchain_allocate_new_index`-derived `PortAllocatorAllocate`, control
//! flow, and `SendToController`, the escape hatch that hands a P4 plan's
//! unconsumable remainder to x86.

use super::modifications::{build_modifications, ByteModification};
use super::{impl_module_plumbing, MatchContext, Module, ModuleFn, ModuleMatch, NextLeaf, Target};
use crate::bdd::{Node, NodeId, ReturnProcessOp};
use crate::error::Result;
use crate::expr::Expr;
use std::any::Any;

pub(crate) static CATALOGUE: &[ModuleFn] = &[
    match_if,
    match_forward,
    match_drop,
    match_ethernet_consume,
    match_ipv4_consume,
    match_tcp_udp_consume,
    match_return_chunk,
    match_table_lookup,
    match_port_allocator_allocate,
    match_packet_receive,
    match_send_to_controller,
];

/// The three header layers this catalogue parses, in borrow order — used
/// to reconstruct the LIFO "which borrow is this return closing" stack
/// from a plan's ancestor chain without consulting the packet-layering
/// side table (that table is for `VectorReturn`/`PacketReturnChunk` on
/// x86; here we only need per-plan ancestry, already at hand).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    Ethernet,
    Ipv4,
    TcpUdp,
}

fn open_borrow_stack(ancestors: &[&dyn Module]) -> Vec<Layer> {
    let mut stack = Vec::new();
    for m in ancestors {
        match m.name() {
            "EthernetConsume" => stack.push(Layer::Ethernet),
            "IPv4Consume" => stack.push(Layer::Ipv4),
            "TcpUdpConsume" => stack.push(Layer::TcpUdp),
            "EthernetModify" | "IPv4Modify" | "TcpUdpModify" | "Ignore" => {
                stack.pop();
            }
            _ => {}
        }
    }
    stack
}

fn has_borrow_ancestor(ancestors: &[&dyn Module], name: &str) -> bool {
    ancestors.iter().any(|m| m.name() == name)
}

#[derive(Debug, Clone, PartialEq)]
pub struct EthernetConsume;
impl Module for EthernetConsume {
    fn target(&self) -> Target {
        Target::BMv2SimpleSwitchgRPC
    }
    fn name(&self) -> &'static str {
        "EthernetConsume"
    }
    impl_module_plumbing!(EthernetConsume);
}

fn match_ethernet_consume(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    let (node_id, target) = plan.leaf_info(leaf);
    let Node::Call { call, next, .. } = ctx.node(node_id) else {
        return Ok(None);
    };
    if call.function.as_ref() != "packet_borrow_next_chunk" {
        return Ok(None);
    }
    if call.arg("length").and_then(|a| a.expr.as_constant()) != Some(14) {
        return Ok(None);
    }
    let ancestors = plan.ancestors(leaf);
    if has_borrow_ancestor(&ancestors, "EthernetConsume") || has_borrow_ancestor(&ancestors, "IPv4Consume") || has_borrow_ancestor(&ancestors, "TcpUdpConsume") {
        return Ok(None);
    }
    Ok(Some(vec![ModuleMatch {
        module: Box::new(EthernetConsume),
        next: vec![NextLeaf::Continue(*next, target)],
    }]))
}

#[derive(Debug, Clone, PartialEq)]
pub struct IPv4Consume;
impl Module for IPv4Consume {
    fn target(&self) -> Target {
        Target::BMv2SimpleSwitchgRPC
    }
    fn name(&self) -> &'static str {
        "IPv4Consume"
    }
    impl_module_plumbing!(IPv4Consume);
}

/// `14` bytes of Ethernet header precede the IPv4 one; `ether_type` lives
/// at byte offset 12, big-endian 16 bits (spec.md §4.6).
const ETHER_TYPE_OFFSET: u64 = 12;
const ETHER_TYPE_IPV4: u128 = 0x0800;
/// IPv4's `next_proto_id` sits at byte 9 of its own header, i.e. absolute
/// offset 14 + 9 from the start of the packet.
const IPV4_PROTO_OFFSET: u64 = 14 + 9;
const IPPROTO_TCP: u128 = 6;
const IPPROTO_UDP: u128 = 17;

fn match_ipv4_consume(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    let (node_id, target) = plan.leaf_info(leaf);
    let Node::Call { call, next, .. } = ctx.node(node_id) else {
        return Ok(None);
    };
    if call.function.as_ref() != "packet_borrow_next_chunk" {
        return Ok(None);
    }
    let ancestors = plan.ancestors(leaf);
    let stack = open_borrow_stack(&ancestors);
    if stack.last() != Some(&Layer::Ethernet) {
        return Ok(None);
    }

    let constraints = ctx.constraints(node_id).to_vec();
    let ether_type = Expr::read_lsb("packet_chunks", ETHER_TYPE_OFFSET, 16);
    let is_ipv4 = Expr::eq(&ether_type, &Expr::constant(ETHER_TYPE_IPV4, 16));
    if !ctx.solver.must_be_true(&constraints, &is_ipv4)? {
        return Ok(None);
    }

    Ok(Some(vec![ModuleMatch {
        module: Box::new(IPv4Consume),
        next: vec![NextLeaf::Continue(*next, target)],
    }]))
}

#[derive(Debug, Clone, PartialEq)]
pub struct TcpUdpConsume;
impl Module for TcpUdpConsume {
    fn target(&self) -> Target {
        Target::BMv2SimpleSwitchgRPC
    }
    fn name(&self) -> &'static str {
        "TcpUdpConsume"
    }
    impl_module_plumbing!(TcpUdpConsume);
}

fn match_tcp_udp_consume(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    let (node_id, target) = plan.leaf_info(leaf);
    let Node::Call { call, next, .. } = ctx.node(node_id) else {
        return Ok(None);
    };
    if call.function.as_ref() != "packet_borrow_next_chunk" {
        return Ok(None);
    }
    let ancestors = plan.ancestors(leaf);
    let stack = open_borrow_stack(&ancestors);
    if stack.last() != Some(&Layer::Ipv4) {
        return Ok(None);
    }

    let constraints = ctx.constraints(node_id).to_vec();
    let next_proto = Expr::read_lsb("packet_chunks", IPV4_PROTO_OFFSET, 8);
    let is_tcp = Expr::eq(&next_proto, &Expr::constant(IPPROTO_TCP, 8));
    let is_udp = Expr::eq(&next_proto, &Expr::constant(IPPROTO_UDP, 8));
    let is_tcp_or_udp = Expr::or(&is_tcp, &is_udp);
    if !ctx.solver.must_be_true(&constraints, &is_tcp_or_udp)? {
        return Ok(None);
    }

    Ok(Some(vec![ModuleMatch {
        module: Box::new(TcpUdpConsume),
        next: vec![NextLeaf::Continue(*next, target)],
    }]))
}

#[derive(Debug, Clone, PartialEq)]
pub struct EthernetModify {
    pub modifications: Vec<ByteModification>,
}
impl Module for EthernetModify {
    fn target(&self) -> Target {
        Target::BMv2SimpleSwitchgRPC
    }
    fn name(&self) -> &'static str {
        "EthernetModify"
    }
    impl_module_plumbing!(EthernetModify);
}

#[derive(Debug, Clone, PartialEq)]
pub struct IPv4Modify {
    pub modifications: Vec<ByteModification>,
}
impl Module for IPv4Modify {
    fn target(&self) -> Target {
        Target::BMv2SimpleSwitchgRPC
    }
    fn name(&self) -> &'static str {
        "IPv4Modify"
    }
    impl_module_plumbing!(IPv4Modify);
}

#[derive(Debug, Clone, PartialEq)]
pub struct TcpUdpModify {
    pub modifications: Vec<ByteModification>,
}
impl Module for TcpUdpModify {
    fn target(&self) -> Target {
        Target::BMv2SimpleSwitchgRPC
    }
    fn name(&self) -> &'static str {
        "TcpUdpModify"
    }
    impl_module_plumbing!(TcpUdpModify);
}

/// An unmodified return: the diff between what was borrowed and what was
/// returned came up empty, so the call is dropped from the plan entirely
/// rather than emitted as a no-op write (spec.md §4.5).
#[derive(Debug, Clone, PartialEq)]
pub struct Ignore;
impl Module for Ignore {
    fn target(&self) -> Target {
        Target::BMv2SimpleSwitchgRPC
    }
    fn name(&self) -> &'static str {
        "Ignore"
    }
    impl_module_plumbing!(Ignore);
}

fn match_return_chunk(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    let (node_id, target) = plan.leaf_info(leaf);
    let Node::Call { call, next, .. } = ctx.node(node_id) else {
        return Ok(None);
    };
    if call.function.as_ref() != "packet_return_chunk" {
        return Ok(None);
    }
    let ancestors = plan.ancestors(leaf);
    let stack = open_borrow_stack(&ancestors);
    let Some(&layer) = stack.last() else {
        return Ok(None);
    };
    let Some(chunk) = call.arg("the_chunk") else {
        return Ok(None);
    };
    let (Some(prev), Some(curr)) = (&chunk.in_, &chunk.out) else {
        return Ok(None);
    };

    let constraints = ctx.constraints(node_id).to_vec();
    let modifications = build_modifications(prev, curr, &constraints, ctx.solver)?;

    let module: Box<dyn Module> = if modifications.is_empty() {
        Box::new(Ignore)
    } else {
        match layer {
            Layer::Ethernet => Box::new(EthernetModify { modifications }),
            Layer::Ipv4 => Box::new(IPv4Modify { modifications }),
            Layer::TcpUdp => Box::new(TcpUdpModify { modifications }),
        }
    };

    Ok(Some(vec![ModuleMatch {
        module,
        next: vec![NextLeaf::Continue(*next, target)],
    }]))
}

/// `TableLookup` (BMv2) / `CachedTableLookup` (Tofino): both lift a
/// `map_get`/`vector_borrow` into a match-action table keyed by `key`
/// against `table`. `merged` marks the alternative where this key joined
/// a table already opened earlier in the plan rather than opening a new
/// one (spec.md §4.5's "optionally emits a merged plan").
#[derive(Debug, Clone, PartialEq)]
pub struct TableLookup {
    pub table: Expr,
    pub key: Expr,
    pub merged: bool,
}
impl Module for TableLookup {
    fn target(&self) -> Target {
        Target::BMv2SimpleSwitchgRPC
    }
    fn name(&self) -> &'static str {
        "TableLookup"
    }
    impl_module_plumbing!(TableLookup);
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedTableLookup {
    pub table: Expr,
    pub key: Expr,
    pub merged: bool,
}
impl Module for CachedTableLookup {
    fn target(&self) -> Target {
        Target::Tofino
    }
    fn name(&self) -> &'static str {
        "CachedTableLookup"
    }
    impl_module_plumbing!(CachedTableLookup);
}

fn table_identity(m: &dyn Module) -> Option<u64> {
    if let Some(t) = m.as_any().downcast_ref::<TableLookup>() {
        return Some(t.table.node_id());
    }
    if let Some(t) = m.as_any().downcast_ref::<CachedTableLookup>() {
        return Some(t.table.node_id());
    }
    None
}

fn match_table_lookup(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    let (node_id, target) = plan.leaf_info(leaf);
    let Node::Call { call, next, .. } = ctx.node(node_id) else {
        return Ok(None);
    };
    let (table, key) = match call.function.as_ref() {
        "map_get" => match (call.arg("map"), call.arg("key")) {
            (Some(t), Some(k)) => (t.expr.clone(), k.expr.clone()),
            _ => return Ok(None),
        },
        "vector_borrow" => match (call.arg("vector"), call.arg("index")) {
            (Some(t), Some(k)) => (t.expr.clone(), k.expr.clone()),
            _ => return Ok(None),
        },
        _ => return Ok(None),
    };

    let ancestors = plan.ancestors(leaf);
    let touched_on_prefix = ancestors.iter().any(|m| table_identity(*m) == Some(table.node_id()));
    if touched_on_prefix {
        return Ok(None);
    }

    let merged_available = plan.modules().any(|m| table_identity(m) == Some(table.node_id()));

    let mk: fn(Expr, Expr, bool) -> Box<dyn Module> = match target {
        Target::Tofino => |table, key, merged| Box::new(CachedTableLookup { table, key, merged }),
        _ => |table, key, merged| Box::new(TableLookup { table, key, merged }),
    };

    let mut matches = vec![ModuleMatch {
        module: mk(table.clone(), key.clone(), false),
        next: vec![NextLeaf::Continue(*next, target)],
    }];
    if merged_available {
        matches.push(ModuleMatch {
            module: mk(table, key, true),
            next: vec![NextLeaf::Continue(*next, target)],
        });
    }
    Ok(Some(matches))
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortAllocatorAllocate;
impl Module for PortAllocatorAllocate {
    fn target(&self) -> Target {
        Target::BMv2SimpleSwitchgRPC
    }
    fn name(&self) -> &'static str {
        "PortAllocatorAllocate"
    }
    impl_module_plumbing!(PortAllocatorAllocate);
}

fn match_port_allocator_allocate(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    let (node_id, target) = plan.leaf_info(leaf);
    let Node::Call { call, next, .. } = ctx.node(node_id) else {
        return Ok(None);
    };
    if call.function.as_ref() != "dchain_allocate_new_index" {
        return Ok(None);
    }
    let Some(ret) = &call.ret else {
        return Ok(None);
    };
    let constraints = ctx.constraints(node_id).to_vec();
    if !ctx.solver.must_be_true(&constraints, ret)? {
        return Ok(None);
    }
    Ok(Some(vec![ModuleMatch {
        module: Box::new(PortAllocatorAllocate),
        next: vec![NextLeaf::Continue(*next, target)],
    }]))
}

#[derive(Debug, Clone, PartialEq)]
pub struct If {
    pub target: Target,
    pub condition: Expr,
}
impl Module for If {
    fn target(&self) -> Target {
        self.target
    }
    fn name(&self) -> &'static str {
        "If"
    }
    impl_module_plumbing!(If);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Then {
    pub target: Target,
}
impl Module for Then {
    fn target(&self) -> Target {
        self.target
    }
    fn name(&self) -> &'static str {
        "Then"
    }
    impl_module_plumbing!(Then);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Else {
    pub target: Target,
}
impl Module for Else {
    fn target(&self) -> Target {
        self.target
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
            module: Box::new(If { target, condition: condition.clone() }),
            next: vec![
                NextLeaf::Wrapped(Box::new(Then { target }), *on_true, target),
                NextLeaf::Wrapped(Box::new(Else { target }), *on_false, target),
            ],
        }])),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Forward {
    pub target: Target,
    pub port: u32,
}
impl Module for Forward {
    fn target(&self) -> Target {
        self.target
    }
    fn name(&self) -> &'static str {
        "Forward"
    }
    impl_module_plumbing!(Forward);
}

fn match_forward(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    let (node_id, target) = plan.leaf_info(leaf);
    match ctx.node(node_id) {
        Node::ReturnProcess { operation: ReturnProcessOp::Fwd(port), .. } => Ok(Some(vec![ModuleMatch {
            module: Box::new(Forward { target, port: *port }),
            next: vec![],
        }])),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Drop {
    pub target: Target,
}
impl Module for Drop {
    fn target(&self) -> Target {
        self.target
    }
    fn name(&self) -> &'static str {
        "Drop"
    }
    impl_module_plumbing!(Drop);
}

fn match_drop(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    let (node_id, target) = plan.leaf_info(leaf);
    match ctx.node(node_id) {
        Node::ReturnProcess { operation: ReturnProcessOp::Drop, .. } => Ok(Some(vec![ModuleMatch {
            module: Box::new(Drop { target }),
            next: vec![],
        }])),
        _ => Ok(None),
    }
}

/// The escape hatch (spec.md §4.5): clones the remainder of the BDD from
/// `node_id` into a standalone snapshot for external inspection, then
/// hands the *live* search a `next_target` transition so synthesis
/// continues against x86's catalogue from the very same node.
#[derive(Debug, Clone)]
pub struct SendToController {
    pub from: Target,
    pub detached: crate::bdd::Bdd,
    pub detached_root: NodeId,
}
impl Module for SendToController {
    fn target(&self) -> Target {
        self.from
    }
    fn name(&self) -> &'static str {
        "SendToController"
    }
    fn next_target(&self) -> Option<Target> {
        Some(Target::X86)
    }
    fn clone_box(&self) -> Box<dyn Module> {
        Box::new(self.clone())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn equals(&self, other: &dyn Module) -> bool {
        match other.as_any().downcast_ref::<SendToController>() {
            Some(o) => self.from == o.from && self.detached_root == o.detached_root && self.detached.len() == o.detached.len(),
            None => false,
        }
    }
}

/// `packet_receive` is the same process-phase bookkeeping marker described
/// on the x86 side (spec.md §4.4's `Drop`-vs-`Err` inference): it carries no
/// wire-level action, so it is absorbed into `Ignore` just like a no-op
/// header return.
fn match_packet_receive(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    let (node_id, target) = plan.leaf_info(leaf);
    let Node::Call { call, next, .. } = ctx.node(node_id) else {
        return Ok(None);
    };
    if call.function.as_ref() != "packet_receive" {
        return Ok(None);
    }
    Ok(Some(vec![ModuleMatch {
        module: Box::new(Ignore),
        next: vec![NextLeaf::Continue(*next, target)],
    }]))
}

fn match_send_to_controller(ctx: &mut MatchContext, plan: &super::ExecutionPlan, leaf: super::EpNodeId) -> Result<Option<Vec<ModuleMatch>>> {
    let (node_id, target) = plan.leaf_info(leaf);
    if target == Target::X86 {
        return Ok(None);
    }
    let (detached, detached_root) = ctx.bdd.clone_with_renumbering(node_id);
    Ok(Some(vec![ModuleMatch {
        module: Box::new(SendToController {
            from: target,
            detached,
            detached_root,
        }),
        next: vec![NextLeaf::Continue(node_id, Target::X86)],
    }]))
}
