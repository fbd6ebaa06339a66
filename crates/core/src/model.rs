//! Shared trace-model types.
//!
//! These types are produced by the parser and consumed by the comparator
//! and reporter. They live here so that both can import them without
//! depending on the parser.

use serde::Serialize;

// ──────────────────────────────────────────────
// Source provenance
// ──────────────────────────────────────────────

/// A raw input line with its 1-based line number, retained for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceLine {
    pub number: u32,
    pub text: String,
}

// ──────────────────────────────────────────────
// Geometry
// ──────────────────────────────────────────────

/// Bounding box as printed in the traces: left, right, bottom, top.
///
/// A `None` field is the explicit "not computed" sentinel (`-` in the trace
/// text). It is distinct from 0.0, which is a legitimate coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Geometry {
    pub left: Option<f64>,
    pub right: Option<f64>,
    pub bottom: Option<f64>,
    pub top: Option<f64>,
}

impl Geometry {
    /// Field names in print order, for per-field divergence reporting.
    pub const FIELDS: [&'static str; 4] = ["left", "right", "bottom", "top"];

    pub fn field(&self, name: &str) -> Option<f64> {
        match name {
            "left" => self.left,
            "right" => self.right,
            "bottom" => self.bottom,
            "top" => self.top,
            _ => None,
        }
    }
}

// ──────────────────────────────────────────────
// Leaf entries
// ──────────────────────────────────────────────

/// A single word as emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordEntry {
    pub index: i64,
    pub base: Option<f64>,
    pub geometry: Geometry,
    pub font_size: Option<f64>,
    pub text: String,
    pub source: TraceLine,
}

/// An aggregated text line. Same attribute shape as [`WordEntry`], one
/// structural level up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineEntry {
    pub index: i64,
    pub base: Option<f64>,
    pub geometry: Geometry,
    pub font_size: Option<f64>,
    pub text: String,
    pub source: TraceLine,
}

// ──────────────────────────────────────────────
// Containers
// ──────────────────────────────────────────────

/// A group of words sharing a baseline index within a block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pool {
    pub index: i64,
    pub base_index: Option<i64>,
    pub declared_word_count: u32,
    pub words: Vec<WordEntry>,
    pub source: TraceLine,
}

/// A block child: either a word pool or a flat line entry, depending on
/// which trace flavor produced the block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Child {
    Pool(Pool),
    Line(LineEntry),
}

impl Child {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Child::Pool(_) => "pool",
            Child::Line(_) => "line",
        }
    }
}

/// A rectangular layout region with declared child counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub index: i64,
    pub rotation: i64,
    pub geometry: Geometry,
    /// The `lines=` counter. `None` when printed as `-`.
    pub declared_line_count: Option<u32>,
    /// The `pools=` counter; only the pools flavor prints it.
    pub declared_pool_count: Option<u32>,
    pub children: Vec<Child>,
    pub source: TraceLine,
}

impl Block {
    /// The count that drives sealing: `pools=` when present, else `lines=`.
    pub fn declared_child_count(&self) -> Option<u32> {
        self.declared_pool_count.or(self.declared_line_count)
    }
}

/// A labeled top-level section of a trace, e.g. one sorting pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockGroup {
    pub label: String,
    pub blocks: Vec<Block>,
}

/// The full parsed structural model of one input file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    pub file: String,
    pub groups: Vec<BlockGroup>,
    pub lines_scanned: u32,
    /// Set when input ended (or, in lenient mode, resynchronized) while a
    /// node's declared child count was still unmet. The partial data is
    /// kept rather than dropped.
    pub truncated: bool,
}

impl Trace {
    /// Total blocks across all groups, for the `<path> <N> blocks` summary.
    pub fn block_count(&self) -> usize {
        self.groups.iter().map(|g| g.blocks.len()).sum()
    }

    /// Total leaf entries (words and flat lines) across the trace.
    pub fn leaf_count(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|g| &g.blocks)
            .flat_map(|b| &b.children)
            .map(|c| match c {
                Child::Pool(p) => p.words.len(),
                Child::Line(_) => 1,
            })
            .sum()
    }
}
