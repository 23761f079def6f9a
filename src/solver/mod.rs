//! SMT solver toolbox (component C2): `SolverContext` answers the three
//! primitive bit-vector queries spec.md §4.2 specifies, backed by `z3` and
//! memoized at three cache layers (independence, cex, results).

mod endian;
mod equivalence;
mod lowering;
mod rename;

#[cfg(test)]
mod tests;

use crate::error::{Error, Result, SolverError};
use crate::expr::{retrieve_symbols, Expr};
use lowering::{lower, model_value_to_u128, to_bool, ArrayCache};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use z3::{Config, Context, SatResult, Solver};

pub use endian::swap_packet_endianness;
pub use rename::RenameSymbols;

/// Tunables for the cache layers. There is no query timeout knob on the
/// underlying `z3::Solver` wired up here (the crate is synchronous and has
/// no cooperative-cancellation mechanism); `query_timeout_ms` is honored by
/// setting Z3's own `timeout` parameter.
#[derive(Debug, Clone, Copy)]
pub struct SolverConfig {
    pub independence_cache: bool,
    pub cex_cache: bool,
    pub results_cache: bool,
    pub query_timeout_ms: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            independence_cache: true,
            cex_cache: true,
            results_cache: true,
            query_timeout_ms: 10_000,
        }
    }
}

type QueryKey = (Vec<u64>, u64);

/// Owns the Z3 context and the three memoization layers. Passed explicitly
/// to every component that issues a query (spec.md §9's "represent it as an
/// explicit context", not a global) — the hash-consing `Expr` arena is the
/// one deliberate exception, per §5.
pub struct SolverContext {
    z3_ctx: Context,
    config: SolverConfig,
    independence_cache: HashMap<(u64, u64), bool>,
    cex_cache: HashMap<(QueryKey, bool), bool>,
    results_cache: HashMap<QueryKey, u128>,
}

impl SolverContext {
    pub fn new(config: SolverConfig) -> SolverContext {
        let mut z3_config = Config::new();
        z3_config.set_timeout_msec(config.query_timeout_ms);
        SolverContext {
            z3_ctx: Context::new(&z3_config),
            config,
            independence_cache: HashMap::new(),
            cex_cache: HashMap::new(),
            results_cache: HashMap::new(),
        }
    }

    /// The independence cache: drops constraints whose symbol set is
    /// disjoint from `target`'s before a query is even built, shrinking
    /// what Z3 sees.
    fn relevant<'a>(&mut self, constraints: &'a [Expr], target: &Expr) -> Vec<&'a Expr> {
        let target_symbols = retrieve_symbols(target);
        let mut hasher = DefaultHasher::new();
        for s in &target_symbols {
            s.hash(&mut hasher);
        }
        let target_key = hasher.finish();

        constraints
            .iter()
            .filter(|c| {
                let key = (c.node_id(), target_key);
                if self.config.independence_cache {
                    if let Some(&cached) = self.independence_cache.get(&key) {
                        return cached;
                    }
                }
                let relevant = !retrieve_symbols(c).is_disjoint(&target_symbols);
                if self.config.independence_cache {
                    self.independence_cache.insert(key, relevant);
                }
                relevant
            })
            .collect()
    }

    fn query_key(&mut self, constraints: &[Expr], target: &Expr) -> QueryKey {
        let relevant = self.relevant(constraints, target);
        let mut ids: Vec<u64> = relevant.iter().map(|c| c.node_id()).collect();
        ids.sort_unstable();
        ids.dedup();
        (ids, target.node_id())
    }

    fn assert_all(&self, solver: &Solver<'_>, arrays: &mut ArrayCache<'_>, constraints: &[&Expr]) {
        for c in constraints {
            let bv = lower(&self.z3_ctx, arrays, c);
            solver.assert(&to_bool(&self.z3_ctx, &bv));
        }
    }

    fn decide(&mut self, constraints: &[Expr], e: &Expr, want_true: bool) -> Result<bool> {
        let key = self.query_key(constraints, e);
        if self.config.cex_cache {
            if let Some(&cached) = self.cex_cache.get(&(key.clone(), want_true)) {
                log::trace!("cex cache hit for query of width {}", e.width());
                return Ok(cached);
            }
        }

        let relevant = self.relevant(constraints, e);
        let solver = Solver::new(&self.z3_ctx);
        let mut arrays = ArrayCache::new();
        self.assert_all(&solver, &mut arrays, &relevant);

        let target_bv = lower(&self.z3_ctx, &mut arrays, e);
        let target_bool = to_bool(&self.z3_ctx, &target_bv);
        if want_true {
            solver.assert(&target_bool.not());
        } else {
            solver.assert(&target_bool);
        }

        let answer = match solver.check() {
            SatResult::Unsat => true,
            SatResult::Sat => false,
            SatResult::Unknown => {
                log::error!("solver returned unknown deciding `{}` under {} constraint(s)", e, relevant.len());
                return Err(Error::from(SolverError::Unavailable {
                    query: format!("{}", e),
                }))
            }
        };

        if self.config.cex_cache {
            self.cex_cache.insert((key, want_true), answer);
        }
        Ok(answer)
    }

    /// `true` iff `e` evaluates to nonzero under every model satisfying
    /// `constraints`.
    pub fn must_be_true(&mut self, constraints: &[Expr], e: &Expr) -> Result<bool> {
        if let Some(v) = e.as_constant() {
            return Ok(v != 0);
        }
        self.decide(constraints, e, true)
    }

    /// `true` iff `e` evaluates to zero under every model satisfying
    /// `constraints`.
    pub fn must_be_false(&mut self, constraints: &[Expr], e: &Expr) -> Result<bool> {
        if let Some(v) = e.as_constant() {
            return Ok(v == 0);
        }
        self.decide(constraints, e, false)
    }

    /// A concretization witness for `e` under `constraints`: a value some
    /// model satisfying the constraints assigns to `e`. Not necessarily the
    /// only one if `e` isn't already pinned down by `must_be_true`/`false`.
    pub fn get_value(&mut self, constraints: &[Expr], e: &Expr) -> Result<u128> {
        if let Some(v) = e.as_constant() {
            return Ok(v);
        }
        let key = self.query_key(constraints, e);
        if self.config.results_cache {
            if let Some(&cached) = self.results_cache.get(&key) {
                return Ok(cached);
            }
        }

        let relevant = self.relevant(constraints, e);
        let solver = Solver::new(&self.z3_ctx);
        let mut arrays = ArrayCache::new();
        self.assert_all(&solver, &mut arrays, &relevant);
        let target_bv = lower(&self.z3_ctx, &mut arrays, e);

        let value = match solver.check() {
            SatResult::Sat => {
                let model = solver.get_model().expect("Sat result must carry a model");
                let evaluated = model
                    .eval(&target_bv, true)
                    .expect("model must assign every free variable in a Sat query");
                model_value_to_u128(&evaluated)
            }
            SatResult::Unsat => {
                return Err(Error::from(SolverError::Unavailable {
                    query: format!("(infeasible constraints) {}", e),
                }))
            }
            SatResult::Unknown => {
                return Err(Error::from(SolverError::Unavailable {
                    query: format!("{}", e),
                }))
            }
        };

        if self.config.results_cache {
            self.results_cache.insert(key, value);
        }
        Ok(value)
    }

    /// Cross-context equality (spec.md §4.2): when `e1`/`e2` come from
    /// different call paths, retargets each into the other's symbolic
    /// universe before checking, to guard against same-named reads with
    /// different updates or widths.
    pub fn are_exprs_always_equal(
        &mut self,
        e1: &Expr,
        c1: &[Expr],
        e2: &Expr,
        c2: &[Expr],
    ) -> Result<bool> {
        equivalence::are_exprs_always_equal(self, e1, c1, e2, c2)
    }
}
