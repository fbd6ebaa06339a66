//! laydiff-core: layout-trace parsing and structural comparison.
//!
//! Two independently implemented document-layout engines emit free-form
//! diagnostic traces describing the same hierarchy of layout objects
//! (block groups, blocks, word pools, words, lines) with different label
//! vocabularies and formatting. This crate reconstructs a common
//! structural model from each trace and compares the two models with
//! numeric tolerance.
//!
//! # Public API
//!
//! Key types are re-exported at the crate root for convenience:
//!
//! - [`parse_trace()`] / [`parse_trace_file()`] -- text to [`Trace`]
//! - [`compare()`] -- two traces to an ordered list of [`Divergence`]s
//! - [`Report`] -- bounded text/JSON rendering of a [`Comparison`]
//! - [`LineClassifier`] -- the stateless single-line pattern matcher
//! - [`ParseError`] / [`CompareError`] -- fatal error types

pub mod classify;
pub mod compare;
pub mod error;
pub mod model;
pub mod parser;
pub mod report;

// ── Convenience re-exports: key types ────────────────────────────────

pub use classify::{EntryFields, Header, LineClassifier};
pub use compare::{
    Comparison, CompareOptions, Divergence, DivergenceKind, Strategy, DEFAULT_EPSILON,
    DEFAULT_NOISE_MARKERS,
};
pub use error::{CompareError, ParseError};
pub use model::{Block, BlockGroup, Child, Geometry, LineEntry, Pool, Trace, TraceLine, WordEntry};
pub use parser::{ParseMode, ParseOptions};
pub use report::{Report, ReportOptions, DEFAULT_WINDOW};

// ── Convenience re-exports: entry points ─────────────────────────────

pub use compare::compare;
pub use parser::{parse_trace, parse_trace_file};
