//! Call-path grouper (component C3, spec.md §4.3): partitions a set of call
//! paths that share a prefix into an on-true/on-false split plus a single
//! discriminating `Expr`, using the call-equality relaxation spec.md
//! describes (the `"p"`/`"src_devices"` ignore-list, the output-pointer
//! skip, and `packet_return_chunk`'s `the_chunk.in` special case).
//!
//! The combinatorial (`comb(n,k)`) subset-enumeration fallback the legacy
//! C++ tool uses when this direct search fails is *not* implemented here —
//! SPEC_FULL.md §4.3 and DESIGN.md record that as a rejected alternative,
//! per spec.md §9's own recommendation to treat the direct grouper as
//! canonical.

use crate::call::{Call, CallPath};
use crate::error::{Error, Result, UnsplittableError};
use crate::expr::Expr;
use crate::solver::SolverContext;

const IGNORED_ARGS: [&str; 2] = ["p", "src_devices"];

pub(super) enum Split {
    AllAgree,
    Branch {
        condition: Expr,
        on_true: Vec<usize>,
        on_false: Vec<usize>,
    },
}

/// Two calls are equal under C3's relaxation (spec.md §4.3): same function
/// name, and every non-ignored argument's `expr` is always-equal under the
/// solver across the two calls' (possibly distinct) symbolic contexts —
/// except output-pointer arguments, which are never compared, and
/// `packet_return_chunk`'s `the_chunk` argument, whose `in` value *is*
/// compared even though it is an output pointer (the chunk must be
/// mutated identically for the calls to be interchangeable).
pub(super) fn calls_equal(solver: &mut SolverContext, a: &Call, ca: &[Expr], b: &Call, cb: &[Expr]) -> Result<bool> {
    if a.function != b.function {
        return Ok(false);
    }
    for (name, arg_a) in a.args() {
        if IGNORED_ARGS.contains(&name.as_ref()) {
            continue;
        }
        let arg_b = match b.arg(name) {
            Some(arg) => arg,
            None => return Ok(false),
        };

        if a.function.as_ref() == "packet_return_chunk" && name.as_ref() == "the_chunk" {
            let ia = arg_a
                .in_
                .as_ref()
                .expect("packet_return_chunk's the_chunk argument must carry an `in` value");
            let ib = arg_b
                .in_
                .as_ref()
                .expect("packet_return_chunk's the_chunk argument must carry an `in` value");
            if !solver.are_exprs_always_equal(ia, ca, ib, cb)? {
                return Ok(false);
            }
            continue;
        }

        if arg_a.is_out_pointer() || arg_b.is_out_pointer() {
            continue;
        }

        if !solver.are_exprs_always_equal(&arg_a.expr, ca, &arg_b.expr, cb)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Splits the call paths named by `indices` (each at its own `cursors[i]`)
/// per spec.md's algorithm: try each path in turn as the splitting witness;
/// stop at the first trivial (all-agree) partition, or the first witness
/// for which a discriminating constraint exists. Every path in `indices`
/// must have at least one call remaining at its cursor.
pub(super) fn split(solver: &mut SolverContext, all: &[CallPath], indices: &[usize], cursors: &[usize]) -> Result<Split> {
    for &witness in indices {
        let witness_call = &all[witness].remaining(cursors[witness])[0];
        let witness_constraints = &all[witness].constraints;

        let mut on_true = Vec::new();
        let mut on_false = Vec::new();
        for &i in indices {
            let call = &all[i].remaining(cursors[i])[0];
            if calls_equal(solver, witness_call, witness_constraints, call, &all[i].constraints)? {
                on_true.push(i);
            } else {
                on_false.push(i);
            }
        }

        if on_false.is_empty() {
            return Ok(Split::AllAgree);
        }

        if let Some(condition) = find_discriminator(solver, all, &on_true, &on_false)? {
            return Ok(Split::Branch {
                condition,
                on_true,
                on_false,
            });
        }
    }

    let filenames: Vec<String> = indices.iter().map(|&i| all[i].filename.to_string()).collect();
    log::warn!("no discriminating constraint found among {} call paths: {:?}", filenames.len(), filenames);
    Err(Error::from(UnsplittableError { filenames }))
}

/// Searches `on_true[0]`'s own path constraints for a boolean predicate
/// that every `on_true` path entails and every `on_false` path refutes
/// (spec.md §4.3 step 2). Call-path constraints live in the shared global
/// array namespace (`packet_chunks`, `pkt_len`, ...), so no cross-context
/// rewriting is needed here the way C2's `are_exprs_always_equal` needs it
/// for per-call argument symbols.
fn find_discriminator(solver: &mut SolverContext, all: &[CallPath], on_true: &[usize], on_false: &[usize]) -> Result<Option<Expr>> {
    let candidates = &all[on_true[0]].constraints;
    'candidate: for c in candidates {
        if c.width() != 1 {
            continue;
        }
        for &i in on_true {
            if !solver.must_be_true(&all[i].constraints, c)? {
                continue 'candidate;
            }
        }
        for &i in on_false {
            if !solver.must_be_false(&all[i].constraints, c)? {
                continue 'candidate;
            }
        }
        return Ok(Some(c.clone()));
    }
    Ok(None)
}
