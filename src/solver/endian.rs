//! `SwapPacketEndianness` (spec.md §4.2): reorders `Read` indices into the
//! `packet_chunks` array to flip between the wire byte order the upstream
//! symbolic executor records and the host-friendly order comparisons expect.
//! The index permutation table is hardcoded for the Ethernet/IPv4/L4 header
//! byte positions the upstream tool's C++ toolbox hardcodes; anything
//! outside those ranges passes through unchanged.

use crate::expr::{fold_expr, rebuild_expr, Expr, ExprView};
use std::sync::Arc;

const PACKET_CHUNKS: &str = "packet_chunks";

fn swapped_index(i: u64) -> u64 {
    match i {
        0..=5 => 5 - i,
        6..=11 => 17 - i,
        53..=56 => 109 - i,
        57..=60 => 117 - i,
        82..=83 => 165 - i,
        84..=85 => 169 - i,
        _ => i,
    }
}

/// Swaps every constant-indexed `Read` into `packet_chunks` according to the
/// wire-to-host byte permutation; applied before equality checks that
/// compare expressions referencing packet bytes in different endianness
/// conventions.
pub fn swap_packet_endianness(e: &Expr) -> Expr {
    fold_expr(e, &mut |orig, view, children: &[Expr]| match &view {
        ExprView::Read { array, index } if array.as_ref() == PACKET_CHUNKS => {
            match index.as_constant() {
                Some(v) => {
                    let new_v = swapped_index(v as u64);
                    if new_v as u128 == v {
                        rebuild_expr(orig, &view, children)
                    } else {
                        let new_index = Expr::constant(new_v as u128, index.width());
                        Expr::read(Arc::clone(array), &new_index)
                    }
                }
                None => rebuild_expr(orig, &view, children),
            }
        }
        _ => rebuild_expr(orig, &view, children),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swaps_ethernet_header_bytes() {
        let idx = Expr::constant(0, 32);
        let read0 = Expr::read(PACKET_CHUNKS, &idx);
        let swapped = swap_packet_endianness(&read0);
        match swapped.view() {
            ExprView::Read { index, .. } => assert_eq!(index.as_constant(), Some(5)),
            _ => panic!("expected a Read node"),
        }
    }

    #[test]
    fn leaves_untabled_indices_unchanged() {
        let idx = Expr::constant(200, 32);
        let read = Expr::read(PACKET_CHUNKS, &idx);
        let swapped = swap_packet_endianness(&read);
        assert_eq!(swapped, read);
    }

    #[test]
    fn leaves_other_arrays_unchanged() {
        let idx = Expr::constant(0, 32);
        let read = Expr::read("pkt_len", &idx);
        let swapped = swap_packet_endianness(&read);
        assert_eq!(swapped, read);
    }
}
