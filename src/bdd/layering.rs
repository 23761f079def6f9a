//! Packet-layering analyzer (supports C4 and C5, spec.md §4.6). A single
//! left-to-right pass over one call path's `packet_borrow_next_chunk`/
//! `packet_return_chunk` calls that reconstructs protocol-header layering
//! and records an explicit borrow/return side table.
//!
//! Per the Open Question in spec.md §9, borrow/return pairing is *not*
//! recovered by walking cyclic BDD parent pointers (there are none in this
//! crate's arena-plus-`NodeId` design). Instead this analyzer builds the
//! side table directly from the call path during a single pass, and
//! `VectorReturn`/`PacketReturnChunk` synthesizer modules consult it rather
//! than scanning the BDD backward.

use crate::call::CallPath;
use crate::error::Result;
use crate::expr::{fold_expr, retrieve_symbols, Expr, ExprView};
use crate::solver::SolverContext;

const PACKET_CHUNKS: &str = "packet_chunks";
const ETHERTYPE_IPV4: u128 = 0x0800;
const IPPROTO_TCP: u128 = 6;
const IPPROTO_UDP: u128 = 17;

/// One `packet_borrow_next_chunk`/`packet_return_chunk` pairing, plus the
/// layering metadata spec.md §4.6 describes.
#[derive(Debug, Clone)]
pub struct BorrowRecord {
    /// 2 for Ethernet, 3 for the network layer, 4 for the transport layer,
    /// and so on — chunks are assumed pushed in strictly increasing layer
    /// order, which holds for every call path this analyzer has to
    /// consume (a borrow always demuxes on the previous chunk's protocol
    /// field, never re-parses an earlier layer).
    pub layer: u32,
    /// This chunk's starting byte offset within the packet, as far as the
    /// analyzer can establish it (`None` once a preceding chunk's length
    /// was symbolic, e.g. an IP-options chunk of dynamic length).
    pub byte_offset: Option<u32>,
    /// The chunk's declared length in bytes, or `None` if the
    /// `packet_borrow_next_chunk` call's `length` argument isn't a
    /// constant (the canonical shape of a variable-length IP-options
    /// chunk, spec.md §4.5's `IPOptionsConsume`).
    pub length: Option<u32>,
    /// Protocol codes for the *next* layer that are feasible under this
    /// call path's constraints, checked against the handful of demux
    /// fields this domain actually uses (Ethernet ethertype, IP
    /// `next_proto_id`). More than one feasible candidate is the fork
    /// spec.md §4.6 describes; synthesizer modules still re-derive their
    /// own validity checks directly against the BDD node's constraints
    /// (spec.md §4.5) rather than trusting this list as authoritative.
    pub protocol_candidates: Vec<u128>,
    pub borrow_call_index: usize,
    pub return_call_index: Option<usize>,
}

/// A reference from a non-packet libVig call's argument into a specific
/// packet byte offset — e.g. a `map_get` keyed by a MAC address read out of
/// the Ethernet chunk. Downstream emitters use this to express table keys
/// as header-field references instead of raw byte offsets.
#[derive(Debug, Clone, Copy)]
pub struct FieldDependency {
    pub call_index: usize,
    pub byte_offset: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PacketLayering {
    pub borrows: Vec<BorrowRecord>,
    pub field_dependencies: Vec<FieldDependency>,
}

impl PacketLayering {
    /// Runs the analyzer over `path`, starting at Ethernet (layer 2).
    pub fn analyze(path: &CallPath, solver: &mut SolverContext) -> Result<PacketLayering> {
        let mut layering = PacketLayering::default();
        let mut stack: Vec<usize> = Vec::new();
        let mut byte_cursor: Option<u32> = Some(0);

        for (i, call) in path.calls.iter().enumerate() {
            match call.function.as_ref() {
                "packet_borrow_next_chunk" => {
                    let length = call
                        .arg("length")
                        .and_then(|a| a.expr.as_constant())
                        .map(|v| v as u32);
                    let layer = 2 + stack.len() as u32;
                    let byte_offset = byte_cursor;

                    let protocol_candidates = demux_candidates(solver, path, layer)?;

                    byte_cursor = match (byte_cursor, length) {
                        (Some(b), Some(l)) => Some(b + l),
                        _ => None,
                    };

                    let record_idx = layering.borrows.len();
                    layering.borrows.push(BorrowRecord {
                        layer,
                        byte_offset,
                        length,
                        protocol_candidates,
                        borrow_call_index: i,
                        return_call_index: None,
                    });
                    stack.push(record_idx);
                }
                "packet_return_chunk" => {
                    if let Some(record_idx) = stack.pop() {
                        layering.borrows[record_idx].return_call_index = Some(i);
                    }
                }
                _ => {
                    for (_, arg) in call.args() {
                        for offset in packet_chunk_offsets(&arg.expr) {
                            layering.field_dependencies.push(FieldDependency { call_index: i, byte_offset: offset });
                        }
                    }
                }
            }
        }

        Ok(layering)
    }
}

/// Checks the small set of demux byte values this domain actually uses
/// (Ethernet ethertype at byte 12 for a layer-2 chunk, IP `next_proto_id`
/// at byte 9 for a layer-3 chunk) and returns every one feasible under
/// `path`'s constraints.
fn demux_candidates(solver: &mut SolverContext, path: &CallPath, layer: u32) -> Result<Vec<u128>> {
    let (byte_index, width, candidates): (u64, u32, &[u128]) = match layer {
        2 => (12, 16, &[ETHERTYPE_IPV4]),
        3 => (9, 8, &[IPPROTO_TCP, IPPROTO_UDP]),
        _ => return Ok(Vec::new()),
    };

    let idx = Expr::constant(byte_index as u128, 32);
    let field = if width == 8 {
        Expr::read(PACKET_CHUNKS, &idx)
    } else {
        Expr::read_lsb(PACKET_CHUNKS, byte_index, width)
    };

    let mut feasible = Vec::new();
    for &candidate in candidates {
        let eq = Expr::eq(&field, &Expr::constant(candidate, width));
        if !solver.must_be_false(&path.constraints, &eq)? {
            feasible.push(candidate);
        }
    }
    Ok(feasible)
}

/// Every constant byte offset into `packet_chunks` that `e` reads.
fn packet_chunk_offsets(e: &Expr) -> Vec<u64> {
    if !retrieve_symbols(e).iter().any(|a| a.as_ref() == PACKET_CHUNKS) {
        return Vec::new();
    }
    fold_expr(e, &mut |_orig, view, children: &[Vec<u64>]| -> Vec<u64> {
        let mut acc: Vec<u64> = children.iter().flatten().copied().collect();
        if let ExprView::Read { array, index } = view {
            if array.as_ref() == PACKET_CHUNKS {
                if let Some(v) = index.as_constant() {
                    acc.push(v as u64);
                }
            }
        }
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{Arg, CallBuilder, CallPathBuilder};
    use crate::solver::{SolverConfig, SolverContext};

    #[test]
    fn pairs_borrow_and_return_in_lifo_order() {
        let path = CallPathBuilder::new("s1.call_path")
            .call(CallBuilder::new("packet_borrow_next_chunk").arg("length", Arg::new(Expr::constant(14, 32))).build())
            .call(CallBuilder::new("packet_return_chunk").build())
            .build();
        let mut solver = SolverContext::new(SolverConfig::default());
        let layering = PacketLayering::analyze(&path, &mut solver).unwrap();
        assert_eq!(layering.borrows.len(), 1);
        assert_eq!(layering.borrows[0].layer, 2);
        assert_eq!(layering.borrows[0].byte_offset, Some(0));
        assert_eq!(layering.borrows[0].return_call_index, Some(1));
    }

    #[test]
    fn records_field_dependency_on_packet_bytes() {
        let idx = Expr::constant(0, 32);
        let key_expr = Expr::read(PACKET_CHUNKS, &idx);
        let path = CallPathBuilder::new("s3.call_path")
            .call(CallBuilder::new("packet_borrow_next_chunk").arg("length", Arg::new(Expr::constant(14, 32))).build())
            .call(CallBuilder::new("map_get").arg("key", Arg::new(key_expr)).build())
            .build();
        let mut solver = SolverContext::new(SolverConfig::default());
        let layering = PacketLayering::analyze(&path, &mut solver).unwrap();
        assert_eq!(layering.field_dependencies.len(), 1);
        assert_eq!(layering.field_dependencies[0].call_index, 1);
        assert_eq!(layering.field_dependencies[0].byte_offset, 0);
    }
}
