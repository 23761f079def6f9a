//! `build_modifications` (spec.md §4.5): the byte-diff helper behind
//! `EthernetModify`/`IPv4Modify`/`TcpUdpModify`. Compares a chunk's
//! pre-state against its post-state one byte at a time and records every
//! byte the callee actually changed.

use crate::error::Result;
use crate::expr::Expr;
use crate::solver::SolverContext;

#[derive(Debug, Clone, PartialEq)]
pub struct ByteModification {
    pub byte: u32,
    pub expr: Expr,
}

/// `prev`/`curr` must have equal, byte-aligned widths (a borrowed chunk's
/// `in` value and a returned chunk's `in` value over the same borrow).
/// Returns one [`ByteModification`] per byte offset where `prev`'s and
/// `curr`'s bytes aren't provably equal under `constraints` — an empty
/// result means the call is a no-op and should lower to `Ignore`.
pub fn build_modifications(prev: &Expr, curr: &Expr, constraints: &[Expr], solver: &mut SolverContext) -> Result<Vec<ByteModification>> {
    assert_eq!(prev.width(), curr.width(), "build_modifications requires equal-width chunks");
    assert_eq!(prev.width() % 8, 0, "build_modifications requires a byte-aligned chunk");

    let n_bytes = prev.width() / 8;
    let mut out = Vec::new();
    for i in 0..n_bytes {
        let offset = i * 8;
        let prev_byte = Expr::extract(prev, offset, 8);
        let curr_byte = Expr::extract(curr, offset, 8);
        if prev_byte == curr_byte {
            continue;
        }
        let unchanged = Expr::eq(&prev_byte, &curr_byte);
        if !solver.must_be_true(constraints, &unchanged)? {
            out.push(ByteModification { byte: i, expr: curr_byte });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::SolverConfig;

    #[test]
    fn identical_chunks_yield_no_modifications() {
        let chunk = Expr::read_lsb("packet_chunks", 0, 16);
        let mut solver = SolverContext::new(SolverConfig::default());
        let mods = build_modifications(&chunk, &chunk, &[], &mut solver).unwrap();
        assert!(mods.is_empty());
    }

    #[test]
    fn a_single_changed_byte_is_reported() {
        let prev = Expr::read_lsb("packet_chunks", 0, 16);
        let low_byte = Expr::extract(&prev, 0, 8);
        let high_byte = Expr::extract(&prev, 8, 8);
        let new_high = Expr::add(&high_byte, &Expr::constant(1, 8));
        let curr = Expr::concat(&new_high, &low_byte);

        let mut solver = SolverContext::new(SolverConfig::default());
        let mods = build_modifications(&prev, &curr, &[], &mut solver).unwrap();
        assert_eq!(mods.len(), 1);
        assert_eq!(mods[0].byte, 1);
    }
}
