//! Error types for the call-path/BDD/synthesis pipeline
//!
//! Mirrors the error taxonomy of spec §7: one enum per error source, each
//! implementing `Display`/`std::error::Error`. Every variant here is fatal —
//! there is no retry or recovery path inside this crate; recovery (feed
//! different call paths, pick another target, fix the upstream trace) is
//! the caller's job.

use std::fmt;
use std::path::PathBuf;

/// Errors raised while parsing a call-path file or a serialized BDD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The input did not match the expected grammar.
    Syntax {
        file: Option<PathBuf>,
        line: usize,
        message: String,
    },
    /// A section of the serialized BDD referenced a pool index that does
    /// not exist.
    DanglingReference { section: &'static str, index: usize },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Syntax {
                file,
                line,
                message,
            } => match file {
                Some(path) => write!(f, "{}:{}: {}", path.display(), line, message),
                None => write!(f, "line {}: {}", line, message),
            },
            ParseError::DanglingReference { section, index } => write!(
                f,
                "{} section references pool index {} which was never emitted",
                section, index
            ),
        }
    }
}

impl std::error::Error for ParseError {}

/// A structural invariant the data model guarantees was broken. These are
/// programmer bugs (a malformed caller, not malformed input) and must not
/// be silently recovered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantError {
    /// Two operands of an operator disagree on bit-width.
    WidthMismatch {
        op: &'static str,
        expected: u32,
        found: u32,
    },
    /// A call is missing an argument its function name requires.
    MissingArgument { node: usize, function: String, argument: &'static str },
    /// A BDD node has the wrong number of successors for its kind.
    WrongArity {
        node: usize,
        kind: &'static str,
        expected: usize,
        found: usize,
    },
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantError::WidthMismatch {
                op,
                expected,
                found,
            } => write!(
                f,
                "width mismatch building {}: expected width {}, found {}",
                op, expected, found
            ),
            InvariantError::MissingArgument {
                node,
                function,
                argument,
            } => write!(
                f,
                "node {}: call to `{}` is missing required argument `{}`",
                node, function, argument
            ),
            InvariantError::WrongArity {
                node,
                kind,
                expected,
                found,
            } => write!(
                f,
                "node {} ({}): expected {} successor(s), found {}",
                node, kind, expected, found
            ),
        }
    }
}

impl std::error::Error for InvariantError {}

/// The SMT backend failed to produce a definite answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    /// Z3 returned `Unknown` (resource exhaustion, timeout, or an
    /// unsupported formula shape).
    Unavailable { query: String },
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::Unavailable { query } => write!(
                f,
                "solver unavailable: could not decide `{}` (timeout or resource limit)",
                query
            ),
        }
    }
}

impl std::error::Error for SolverError {}

/// C3 could not find a discriminating constraint for a set of call paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsplittableError {
    pub filenames: Vec<String>,
}

impl fmt::Display for UnsplittableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no discriminating constraint separates call paths: {}",
            self.filenames.join(", ")
        )
    }
}

impl std::error::Error for UnsplittableError {}

/// C5's search frontier emptied before a complete plan was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoPlanError {
    pub target: String,
    pub deepest_common_prefix: usize,
}

impl fmt::Display for NoPlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no execution plan found for target {} (reached depth {})",
            self.target, self.deepest_common_prefix
        )
    }
}

impl std::error::Error for NoPlanError {}

/// A call name that no module of the selected target could absorb, and
/// which is not on the skip-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnhandledCallError {
    pub function: String,
}

impl fmt::Display for UnhandledCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no module handles call `{}`", self.function)
    }
}

impl std::error::Error for UnhandledCallError {}

/// Umbrella error returned by the top-level pipeline operations
/// (`Bdd::build`, `ExecutionPlan::synthesize`, serialization round-trips).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Parse(ParseError),
    Invariant(InvariantError),
    Solver(SolverError),
    Unsplittable(UnsplittableError),
    NoPlan(NoPlanError),
    UnhandledCall(UnhandledCallError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(e) => write!(f, "{}", e),
            Error::Invariant(e) => write!(f, "{}", e),
            Error::Solver(e) => write!(f, "{}", e),
            Error::Unsplittable(e) => write!(f, "{}", e),
            Error::NoPlan(e) => write!(f, "{}", e),
            Error::UnhandledCall(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Parse(e) => Some(e),
            Error::Invariant(e) => Some(e),
            Error::Solver(e) => Some(e),
            Error::Unsplittable(e) => Some(e),
            Error::NoPlan(e) => Some(e),
            Error::UnhandledCall(e) => Some(e),
        }
    }
}

macro_rules! from_variant {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for Error {
            fn from(e: $ty) -> Self {
                Error::$variant(e)
            }
        }
    };
}

from_variant!(Parse, ParseError);
from_variant!(Invariant, InvariantError);
from_variant!(Solver, SolverError);
from_variant!(Unsplittable, UnsplittableError);
from_variant!(NoPlan, NoPlanError);
from_variant!(UnhandledCall, UnhandledCallError);

pub type Result<T> = std::result::Result<T, Error>;
