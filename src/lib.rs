//! Call-path consolidation into a canonical BDD, and cross-target
//! execution-plan synthesis (SPEC_FULL.md §1-2).
//!
//! This crate implements the middle tier of a network-function synthesis
//! toolchain: given the symbolic call paths a KLEE-style executor produced
//! for a packet-processing program, [`bdd::Bdd::build`] folds them into a
//! single branching program, and [`synapse::synthesize`] lowers that
//! program onto a target's module catalogue (x86 software dataplane,
//! Tofino/BMv2 P4 pipelines). The upstream loader that parses call-path
//! text files, the downstream code emitters, and any CLI front-end are
//! explicitly out of scope (spec.md §1) — embedders drive this crate
//! through [`call::CallPathBuilder`] and the functions re-exported below.
//!
//! This crate never installs a logger; embedders wire up `log`'s facade
//! (e.g. `env_logger` reading `RUST_LOG`) to see the `debug!`/`warn!`
//! diagnostics emitted at construction and synthesis time.

pub mod bdd;
pub mod call;
pub mod error;
pub mod expr;
pub mod solver;
pub mod synapse;

pub use bdd::Bdd;
pub use call::{Call, CallPath, CallPathBuilder, Symbol};
pub use error::{Error, Result};
pub use expr::Expr;
pub use solver::{SolverConfig, SolverContext};
pub use synapse::{synthesize, ExecutionPlan, Heuristic, SearchConfig, Target};
