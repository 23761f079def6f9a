//! BDD constructor (component C4, spec.md §4.4): repeatedly applies C3's
//! grouper to build a single raw branching tree, then splits that tree into
//! the `init`/`process` sub-BDDs at the `start_time` marker call.

use super::group::{self, Split};
use super::{Node, NodeId, ReturnInitValue, ReturnProcessOp};
use crate::call::{Call, CallPath, Symbol};
use crate::error::{Error, InvariantError, Result};
use crate::expr::{retrieve_symbols, Expr};
use crate::solver::SolverContext;
use std::sync::Arc;

const MARKER_CALL: &str = "start_time";
const SKIP_SYMBOLS: [&str; 2] = ["received_a_packet", "loop_termination"];

/// The un-split branching tree spec.md §3 calls `ReturnRaw` internally:
/// every call from every path has a place in this tree, with no notion yet
/// of "init" vs "process". Never exposed outside this module.
enum RawNode {
    Branch {
        condition: Expr,
        on_true: Box<RawNode>,
        on_false: Box<RawNode>,
        provenance: Vec<Arc<str>>,
    },
    Call {
        call: Call,
        generated_symbols: Vec<Symbol>,
        next: Box<RawNode>,
        provenance: Vec<Arc<str>>,
    },
    /// All call paths reaching here have no calls left to consume.
    Leaf { provenance: Vec<Arc<str>> },
}

fn filenames(all: &[CallPath], indices: &[usize]) -> Vec<Arc<str>> {
    indices.iter().map(|&i| Arc::clone(&all[i].filename)).collect()
}

/// The fresh symbols a call produces: its out-pointer arguments' `out`
/// values, its extra-variables' `after` values, and its return value —
/// the callee-exported symbols spec.md §3 says a `Call` node carries.
pub(super) fn generated_symbols_of(call: &Call) -> Vec<Symbol> {
    let mut out = Vec::new();
    for (name, arg) in call.args() {
        if let Some(expr) = &arg.out {
            out.push(Symbol::new(Arc::clone(name), Arc::clone(name), expr.clone()));
        }
    }
    for (name, (_before, after)) in call.extra_vars() {
        out.push(Symbol::new(Arc::clone(name), Arc::clone(name), after.clone()));
    }
    if let Some(ret) = &call.ret {
        out.push(Symbol::new(format!("{}_ret", call.function), Arc::clone(&call.function), ret.clone()));
    }
    out
}

/// Prefers a call whose return is not always-zero under its constraints,
/// so the BDD doesn't canonicalize on a call whose observed return is the
/// error branch (spec.md §4.4).
fn get_successful_call(solver: &mut SolverContext, all: &[CallPath], indices: &[usize], cursors: &[usize]) -> Result<usize> {
    for &i in indices {
        let call = &all[i].remaining(cursors[i])[0];
        match &call.ret {
            Some(ret) if solver.must_be_false(&all[i].constraints, ret)? => continue,
            _ => return Ok(i),
        }
    }
    Ok(indices[0])
}

fn build_raw(solver: &mut SolverContext, all: &[CallPath], indices: Vec<usize>, mut cursors: Vec<usize>) -> Result<RawNode> {
    if all[indices[0]].remaining(cursors[indices[0]]).is_empty() {
        return Ok(RawNode::Leaf {
            provenance: filenames(all, &indices),
        });
    }

    match group::split(solver, all, &indices, &cursors)? {
        Split::AllAgree => {
            let winner = get_successful_call(solver, all, &indices, &cursors)?;
            let call = all[winner].remaining(cursors[winner])[0].clone();
            let generated_symbols = generated_symbols_of(&call);
            let provenance = filenames(all, &indices);
            for &i in &indices {
                cursors[i] += 1;
            }
            let next = build_raw(solver, all, indices, cursors)?;
            Ok(RawNode::Call {
                call,
                generated_symbols,
                next: Box::new(next),
                provenance,
            })
        }
        Split::Branch {
            condition,
            on_true,
            on_false,
        } => {
            let provenance = filenames(all, &indices);
            let on_true_raw = build_raw(solver, all, on_true, cursors.clone())?;
            let on_false_raw = build_raw(solver, all, on_false, cursors)?;
            Ok(RawNode::Branch {
                condition,
                on_true: Box::new(on_true_raw),
                on_false: Box::new(on_false_raw),
                provenance,
            })
        }
    }
}

/// A finalized node arena under construction. Nodes are appended in
/// whatever order the split pass discovers them (post-order for `Branch`,
/// since equivalence collapsing needs both children's finished nodes first)
/// — `NodeId`s are dense but not otherwise meaningful.
struct Builder {
    nodes: Vec<Node>,
}

impl Builder {
    fn alloc(&mut self, mk: impl FnOnce(NodeId) -> Node) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(mk(id));
        id
    }
}

fn split_init(raw: &RawNode, builder: &mut Builder) -> NodeId {
    match raw {
        RawNode::Call { call, provenance, .. } if call.function.as_ref() == MARKER_CALL => {
            builder.alloc(|id| Node::ReturnInit {
                id,
                value: ReturnInitValue::Success,
                provenance: provenance.clone(),
            })
        }
        RawNode::Call {
            call,
            generated_symbols,
            next,
            provenance,
        } => {
            let next_id = split_init(next, builder);
            builder.alloc(|id| Node::Call {
                id,
                call: call.clone(),
                generated_symbols: generated_symbols.clone(),
                next: next_id,
                provenance: provenance.clone(),
            })
        }
        RawNode::Branch {
            condition,
            on_true,
            on_false,
            provenance,
        } => {
            let t = split_init(on_true, builder);
            let f = split_init(on_false, builder);
            builder.alloc(|id| Node::Branch {
                id,
                condition: condition.clone(),
                on_true: t,
                on_false: f,
                provenance: provenance.clone(),
            })
        }
        // A path that never reached `start_time` failed to initialize.
        RawNode::Leaf { provenance } => builder.alloc(|id| Node::ReturnInit {
            id,
            value: ReturnInitValue::Failure,
            provenance: provenance.clone(),
        }),
    }
}

fn infer_return_process(trail: &[&Call], solver: &mut SolverContext, constraints: &[Expr]) -> Result<ReturnProcessOp> {
    let sends: Vec<&&Call> = trail.iter().filter(|c| c.function.as_ref() == "packet_send").collect();
    if sends.len() > 1 {
        return Ok(ReturnProcessOp::Broadcast);
    }
    if let Some(send) = sends.first() {
        let port_arg = send.arg("dst_device").ok_or_else(|| {
            Error::from(InvariantError::MissingArgument {
                node: 0,
                function: "packet_send".to_string(),
                argument: "dst_device",
            })
        })?;
        let port = solver.get_value(constraints, &port_arg.expr)?;
        return Ok(ReturnProcessOp::Fwd(port as u32));
    }
    if trail.iter().any(|c| c.function.as_ref() == "packet_receive") {
        return Ok(ReturnProcessOp::Drop);
    }
    Ok(ReturnProcessOp::Err)
}

pub(crate) fn constraints_for<'a>(all: &'a [CallPath], provenance: &[Arc<str>]) -> &'a [Expr] {
    let Some(first) = provenance.first() else {
        return &[];
    };
    all.iter()
        .find(|p| p.filename == *first)
        .map(|p| p.constraints.as_slice())
        .unwrap_or(&[])
}

#[allow(clippy::too_many_arguments)]
fn split_process<'a>(
    raw: &'a RawNode,
    started: bool,
    trail: &mut Vec<&'a Call>,
    all: &[CallPath],
    solver: &mut SolverContext,
    builder: &mut Builder,
) -> Result<NodeId> {
    match raw {
        RawNode::Call {
            call,
            generated_symbols,
            next,
            provenance,
        } => {
            if !started {
                let now_started = call.function.as_ref() == MARKER_CALL;
                return split_process(next, now_started, trail, all, solver, builder);
            }
            trail.push(call);
            let next_id = split_process(next, true, trail, all, solver, builder)?;
            trail.pop();
            Ok(builder.alloc(|id| Node::Call {
                id,
                call: call.clone(),
                generated_symbols: generated_symbols.clone(),
                next: next_id,
                provenance: provenance.clone(),
            }))
        }
        RawNode::Branch {
            condition,
            on_true,
            on_false,
            provenance,
        } => {
            // Before `start_time`, or on a skip-condition (a branch whose
            // condition only reads known-static bookkeeping flags), the
            // branch itself is elided: both children are walked (since
            // `start_time` or the real continuation may live on either
            // side) and whichever one isn't already a terminal leaf is
            // kept as the real continuation.
            let skip = started && retrieve_symbols(condition).iter().all(|s| SKIP_SYMBOLS.contains(&s.as_ref()));
            if !started || skip {
                let mut trail_t = trail.clone();
                let t = split_process(on_true, started, &mut trail_t, all, solver, builder)?;
                let mut trail_f = trail.clone();
                let f = split_process(on_false, started, &mut trail_f, all, solver, builder)?;
                return Ok(pick_feasible_child(builder, t, f));
            }

            let mut trail_t = trail.clone();
            let t = split_process(on_true, true, &mut trail_t, all, solver, builder)?;
            let mut trail_f = trail.clone();
            let f = split_process(on_false, true, &mut trail_f, all, solver, builder)?;

            if let (
                Node::ReturnProcess { operation: op_t, .. },
                Node::ReturnProcess { operation: op_f, .. },
            ) = (&builder.nodes[t], &builder.nodes[f])
            {
                if op_t == op_f {
                    return Ok(t);
                }
            }

            Ok(builder.alloc(|id| Node::Branch {
                id,
                condition: condition.clone(),
                on_true: t,
                on_false: f,
                provenance: provenance.clone(),
            }))
        }
        RawNode::Leaf { provenance } => {
            if !started {
                return Ok(builder.alloc(|id| Node::ReturnProcess {
                    id,
                    operation: ReturnProcessOp::Err,
                    provenance: provenance.clone(),
                }));
            }
            let constraints = constraints_for(all, provenance);
            let op = infer_return_process(trail, solver, constraints)?;
            Ok(builder.alloc(|id| Node::ReturnProcess {
                id,
                operation: op,
                provenance: provenance.clone(),
            }))
        }
    }
}

/// An elided branch's two children are expected to diverge in exactly one
/// of them already being a terminal leaf; the other carries the real
/// continuation. Favors `on_true` when both (or neither) are terminal,
/// matching the reference splitter's `on_false_empty ? on_true : on_false`.
fn pick_feasible_child(builder: &Builder, on_true: NodeId, on_false: NodeId) -> NodeId {
    if matches!(builder.nodes[on_false], Node::ReturnProcess { .. }) {
        on_true
    } else {
        on_false
    }
}

fn offset_node(n: Node, offset: usize) -> Node {
    match n {
        Node::Branch {
            id,
            condition,
            on_true,
            on_false,
            provenance,
        } => Node::Branch {
            id: id + offset,
            condition,
            on_true: on_true + offset,
            on_false: on_false + offset,
            provenance,
        },
        Node::Call {
            id,
            call,
            generated_symbols,
            next,
            provenance,
        } => Node::Call {
            id: id + offset,
            call,
            generated_symbols,
            next: next + offset,
            provenance,
        },
        Node::ReturnInit { id, value, provenance } => Node::ReturnInit {
            id: id + offset,
            value,
            provenance,
        },
        Node::ReturnProcess { id, operation, provenance } => Node::ReturnProcess {
            id: id + offset,
            operation,
            provenance,
        },
    }
}

/// Builds a finalized [`super::Bdd`] from call paths (spec.md §4.4): one
/// raw pass driven by C3's grouper, then two copies of the result split at
/// the `start_time` marker into `init_root`/`process_root`.
pub fn build(all: &[CallPath], solver: &mut SolverContext) -> Result<super::Bdd> {
    assert!(!all.is_empty(), "cannot build a BDD from zero call paths");

    let indices: Vec<usize> = (0..all.len()).collect();
    let cursors = vec![0usize; all.len()];
    let raw = build_raw(solver, all, indices, cursors)?;

    let mut init_builder = Builder { nodes: Vec::new() };
    let init_root = split_init(&raw, &mut init_builder);

    let mut process_builder = Builder { nodes: Vec::new() };
    let mut trail: Vec<&Call> = Vec::new();
    let process_root_local = split_process(&raw, false, &mut trail, all, solver, &mut process_builder)?;

    let offset = init_builder.nodes.len();
    let mut nodes = init_builder.nodes;
    nodes.extend(process_builder.nodes.into_iter().map(|n| offset_node(n, offset)));
    let process_root = process_root_local + offset;

    let bdd = super::Bdd::from_parts(nodes, init_root, process_root);
    bdd.check_shape()?;
    Ok(bdd)
}
