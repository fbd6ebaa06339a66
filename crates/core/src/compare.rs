//! Structural comparison of two parsed traces.
//!
//! The comparator is a pure function: it walks both trees in lock-step,
//! bounded by `min(count_left, count_right)` at every level, and produces
//! an ordered list of [`Divergence`] records. Divergences are data, not
//! errors; the whole purpose of the tool is to surface them.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::CompareError;
use crate::model::{Block, BlockGroup, Child, Geometry, Pool, Trace, TraceLine};

/// Default numeric tolerance, matching the engines' two-decimal output.
pub const DEFAULT_EPSILON: f64 = 0.1;

/// Control-character artifacts the rendering pipeline emits for glyphs it
/// cannot name. A marker on exactly one side may still be a real
/// difference, so the mismatch is reported, but flagged for filtering.
pub const DEFAULT_NOISE_MARKERS: [char; 2] = ['\u{13}', '\u{19}'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DivergenceKind {
    /// Integer-family fields disagree: indices, rotations, declared counts.
    CountMismatch,
    /// A coordinate or baseline differs beyond tolerance.
    GeometryMismatch,
    TextMismatch,
    FontSizeMismatch,
    /// Actual child counts (or child kinds) disagree. One record per short
    /// node, not one per missing leaf.
    StructuralGap,
}

impl std::fmt::Display for DivergenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DivergenceKind::CountMismatch => "CountMismatch",
            DivergenceKind::GeometryMismatch => "GeometryMismatch",
            DivergenceKind::TextMismatch => "TextMismatch",
            DivergenceKind::FontSizeMismatch => "FontSizeMismatch",
            DivergenceKind::StructuralGap => "StructuralGap",
        };
        f.write_str(s)
    }
}

/// One side's contribution to a divergence: the compared value and the
/// source line it came from, when the node has one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Context {
    pub value: String,
    pub line: Option<TraceLine>,
}

/// A recorded disagreement between two otherwise-aligned trace nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Divergence {
    pub kind: DivergenceKind,
    /// Indices identifying the node: group, block, child, word, as deep
    /// as the node sits.
    pub path: Vec<usize>,
    pub field: Option<&'static str>,
    /// Set when a configured noise marker appears on exactly one side of a
    /// text mismatch.
    pub noisy: bool,
    /// Position of the node in the lock-step walk. Drives the reporter's
    /// output window.
    pub ordinal: usize,
    pub left: Context,
    pub right: Context,
}

/// How leaf entries are aligned between the two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Strategy {
    /// Entry i on the left is compared with entry i on the right.
    #[default]
    Positional,
    /// Entries are additionally matched by content key; displaced entries
    /// are reported as permutation cycles.
    Keyed,
}

#[derive(Debug, Clone)]
pub struct CompareOptions {
    /// Restrict the walk to groups with this label. The label must exist
    /// on both sides or the comparison fails outright.
    pub group_label: Option<String>,
    pub eps_geometry: f64,
    pub eps_base: f64,
    pub eps_font: f64,
    pub ignore_case: bool,
    pub ignore_whitespace: bool,
    pub noise_markers: Vec<char>,
    pub strategy: Strategy,
}

impl Default for CompareOptions {
    fn default() -> Self {
        CompareOptions {
            group_label: None,
            eps_geometry: DEFAULT_EPSILON,
            eps_base: DEFAULT_EPSILON,
            eps_font: DEFAULT_EPSILON,
            ignore_case: false,
            ignore_whitespace: false,
            noise_markers: DEFAULT_NOISE_MARKERS.to_vec(),
            strategy: Strategy::Positional,
        }
    }
}

/// The result of comparing two traces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub divergences: Vec<Divergence>,
    pub nodes_compared: usize,
    /// Leaf entries whose comparison produced no divergence.
    pub leaves_matched: usize,
    /// Permutation cycles among displaced leaf entries, as flat entry
    /// indices. Filled by the keyed strategy only.
    pub cycles: Vec<Vec<usize>>,
}

impl Comparison {
    pub fn is_clean(&self) -> bool {
        self.divergences.is_empty()
    }

    pub fn first_divergence_ordinal(&self) -> Option<usize> {
        self.divergences.first().map(|d| d.ordinal)
    }
}

/// Compare two traces. Pure: no mutation of inputs, deterministic given
/// identical arguments.
pub fn compare(
    left: &Trace,
    right: &Trace,
    options: &CompareOptions,
) -> Result<Comparison, CompareError> {
    let lg = select_groups(left, options)?;
    let rg = select_groups(right, options)?;
    let mut walker = Walker::new(options);
    match options.strategy {
        Strategy::Positional => walker.walk_groups(&lg, &rg),
        Strategy::Keyed => walker.walk_keyed(&lg, &rg),
    }
    Ok(Comparison {
        divergences: walker.out,
        nodes_compared: walker.ordinal,
        leaves_matched: walker.leaves_matched,
        cycles: walker.cycles,
    })
}

fn select_groups<'t>(
    trace: &'t Trace,
    options: &CompareOptions,
) -> Result<Vec<&'t BlockGroup>, CompareError> {
    match &options.group_label {
        None => Ok(trace.groups.iter().collect()),
        Some(label) => {
            let picked: Vec<&BlockGroup> =
                trace.groups.iter().filter(|g| g.label == *label).collect();
            if picked.is_empty() {
                Err(CompareError::GroupNotFound {
                    label: label.clone(),
                    file: trace.file.clone(),
                })
            } else {
                Ok(picked)
            }
        }
    }
}

// ──────────────────────────────────────────────
// Lock-step walker
// ──────────────────────────────────────────────

struct Walker<'o> {
    o: &'o CompareOptions,
    out: Vec<Divergence>,
    ordinal: usize,
    leaves_matched: usize,
    cycles: Vec<Vec<usize>>,
}

/// A leaf entry viewed uniformly, whether word or flat line.
struct Leaf<'t> {
    path: Vec<usize>,
    index: i64,
    base: Option<f64>,
    geometry: Geometry,
    font_size: Option<f64>,
    text: &'t str,
    source: &'t TraceLine,
}

impl<'o> Walker<'o> {
    fn new(o: &'o CompareOptions) -> Self {
        Walker {
            o,
            out: Vec::new(),
            ordinal: 0,
            leaves_matched: 0,
            cycles: Vec::new(),
        }
    }

    fn walk_groups(&mut self, left: &[&BlockGroup], right: &[&BlockGroup]) {
        if left.len() != right.len() {
            self.gap(Vec::new(), Some("groups"), left.len(), right.len(), None, None);
        }
        for (i, (lg, rg)) in left.iter().zip(right.iter()).enumerate() {
            self.ordinal += 1;
            let ordinal = self.ordinal;
            if !self.text_eq(&lg.label, &rg.label) {
                let noisy = self.noisy(&lg.label, &rg.label);
                self.push(Divergence {
                    kind: DivergenceKind::TextMismatch,
                    path: vec![i],
                    field: Some("label"),
                    noisy,
                    ordinal,
                    left: Context {
                        value: lg.label.clone(),
                        line: None,
                    },
                    right: Context {
                        value: rg.label.clone(),
                        line: None,
                    },
                });
            }
            self.walk_blocks(&lg.blocks, &rg.blocks, vec![i]);
        }
    }

    fn walk_blocks(&mut self, left: &[Block], right: &[Block], path: Vec<usize>) {
        if left.len() != right.len() {
            self.gap(path.clone(), Some("blocks"), left.len(), right.len(), None, None);
        }
        for (i, (lb, rb)) in left.iter().zip(right.iter()).enumerate() {
            let mut p = path.clone();
            p.push(i);
            self.compare_block(lb, rb, p);
        }
    }

    fn compare_block(&mut self, l: &Block, r: &Block, path: Vec<usize>) {
        self.ordinal += 1;
        let src = (Some(&l.source), Some(&r.source));
        self.int_field(&path, "index", Some(l.index), Some(r.index), src);
        self.int_field(&path, "rotation", Some(l.rotation), Some(r.rotation), src);
        self.int_field(
            &path,
            "lines",
            l.declared_line_count.map(i64::from),
            r.declared_line_count.map(i64::from),
            src,
        );
        self.int_field(
            &path,
            "pools",
            l.declared_pool_count.map(i64::from),
            r.declared_pool_count.map(i64::from),
            src,
        );
        self.geometry(&path, &l.geometry, &r.geometry, src);

        if l.children.len() != r.children.len() {
            self.gap(
                path.clone(),
                Some("children"),
                l.children.len(),
                r.children.len(),
                Some(&l.source),
                Some(&r.source),
            );
        }
        for (i, (lc, rc)) in l.children.iter().zip(r.children.iter()).enumerate() {
            let mut p = path.clone();
            p.push(i);
            match (lc, rc) {
                (Child::Pool(lp), Child::Pool(rp)) => self.compare_pool(lp, rp, p),
                (Child::Line(ll), Child::Line(rl)) => {
                    self.ordinal += 1;
                    self.compare_leaf(&line_leaf(ll, p.clone()), &line_leaf(rl, p));
                }
                (lc, rc) => {
                    self.ordinal += 1;
                    let ordinal = self.ordinal;
                    self.push(Divergence {
                        kind: DivergenceKind::StructuralGap,
                        path: p,
                        field: Some("kind"),
                        noisy: false,
                        ordinal,
                        left: Context {
                            value: lc.kind_name().to_owned(),
                            line: None,
                        },
                        right: Context {
                            value: rc.kind_name().to_owned(),
                            line: None,
                        },
                    });
                }
            }
        }
    }

    fn compare_pool(&mut self, l: &Pool, r: &Pool, path: Vec<usize>) {
        self.ordinal += 1;
        let src = (Some(&l.source), Some(&r.source));
        self.int_field(&path, "index", Some(l.index), Some(r.index), src);
        self.int_field(&path, "baseIdx", l.base_index, r.base_index, src);
        self.int_field(
            &path,
            "len",
            Some(i64::from(l.declared_word_count)),
            Some(i64::from(r.declared_word_count)),
            src,
        );

        if l.words.len() != r.words.len() {
            self.gap(
                path.clone(),
                Some("words"),
                l.words.len(),
                r.words.len(),
                Some(&l.source),
                Some(&r.source),
            );
        }
        for (i, (lw, rw)) in l.words.iter().zip(r.words.iter()).enumerate() {
            let mut p = path.clone();
            p.push(i);
            self.ordinal += 1;
            self.compare_leaf(
                &Leaf {
                    path: p.clone(),
                    index: lw.index,
                    base: lw.base,
                    geometry: lw.geometry,
                    font_size: lw.font_size,
                    text: &lw.text,
                    source: &lw.source,
                },
                &Leaf {
                    path: p,
                    index: rw.index,
                    base: rw.base,
                    geometry: rw.geometry,
                    font_size: rw.font_size,
                    text: &rw.text,
                    source: &rw.source,
                },
            );
        }
    }

    /// Compare one aligned pair of leaf entries. The caller has already
    /// charged the ordinal for this node.
    fn compare_leaf(&mut self, l: &Leaf<'_>, r: &Leaf<'_>) {
        let before = self.out.len();
        let src = (Some(l.source), Some(r.source));
        self.int_field(&l.path, "index", Some(l.index), Some(r.index), src);
        self.num_field(
            &l.path,
            DivergenceKind::GeometryMismatch,
            "base",
            l.base,
            r.base,
            self.o.eps_base,
            src,
        );
        self.geometry(&l.path, &l.geometry, &r.geometry, src);
        self.num_field(
            &l.path,
            DivergenceKind::FontSizeMismatch,
            "fontsize",
            l.font_size,
            r.font_size,
            self.o.eps_font,
            src,
        );
        if !self.text_eq(l.text, r.text) {
            let ordinal = self.ordinal;
            let noisy = self.noisy(l.text, r.text);
            self.push(Divergence {
                kind: DivergenceKind::TextMismatch,
                path: l.path.clone(),
                field: Some("text"),
                noisy,
                ordinal,
                left: Context {
                    value: l.text.to_owned(),
                    line: Some(l.source.clone()),
                },
                right: Context {
                    value: r.text.to_owned(),
                    line: Some(r.source.clone()),
                },
            });
        }
        if self.out.len() == before {
            self.leaves_matched += 1;
        }
    }

    // ── Keyed strategy ───────────────────────────────────────────

    /// Flatten both sides to leaf sequences, compare positionally, then
    /// match the mismatched entries by content key and report the
    /// permutation cycles of the resulting displacement bijection.
    fn walk_keyed(&mut self, left: &[&BlockGroup], right: &[&BlockGroup]) {
        let lv = flatten(left);
        let rv = flatten(right);
        if lv.len() != rv.len() {
            self.gap(Vec::new(), Some("entries"), lv.len(), rv.len(), None, None);
        }

        let n = lv.len().min(rv.len());
        let mut displaced: Vec<usize> = Vec::new();
        for i in 0..n {
            self.ordinal += 1;
            let before = self.out.len();
            self.compare_leaf(&lv[i], &rv[i]);
            if self.out.len() > before {
                displaced.push(i);
            }
        }

        // Secondary lookup: content key -> right-side flat indices, taken
        // in order so duplicate keys pair off deterministically.
        let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();
        for &i in displaced.iter() {
            by_key.entry(leaf_key(&rv[i])).or_default().push(i);
        }
        let mut edges: HashMap<usize, usize> = HashMap::new();
        for &i in displaced.iter() {
            if let Some(slots) = by_key.get_mut(&leaf_key(&lv[i])) {
                if !slots.is_empty() {
                    edges.insert(i, slots.remove(0));
                }
            }
        }

        let mut visited: Vec<usize> = Vec::new();
        for &start in displaced.iter() {
            if visited.contains(&start) || !edges.contains_key(&start) {
                continue;
            }
            let mut cycle = vec![start];
            let mut j = edges[&start];
            while j != start {
                cycle.push(j);
                match edges.get(&j) {
                    Some(&next) => j = next,
                    // Dead end: the chain leaves the displaced set, so it
                    // is not a cycle.
                    None => {
                        cycle.clear();
                        break;
                    }
                }
                if cycle.len() > edges.len() {
                    cycle.clear();
                    break;
                }
            }
            if cycle.len() > 1 {
                visited.extend(cycle.iter().copied());
                self.cycles.push(cycle);
            }
        }
    }

    // ── Field helpers ────────────────────────────────────────────

    fn push(&mut self, d: Divergence) {
        self.out.push(d);
    }

    fn gap(
        &mut self,
        path: Vec<usize>,
        field: Option<&'static str>,
        left: usize,
        right: usize,
        lline: Option<&TraceLine>,
        rline: Option<&TraceLine>,
    ) {
        let ordinal = self.ordinal;
        self.push(Divergence {
            kind: DivergenceKind::StructuralGap,
            path,
            field,
            noisy: false,
            ordinal,
            left: Context {
                value: left.to_string(),
                line: lline.cloned(),
            },
            right: Context {
                value: right.to_string(),
                line: rline.cloned(),
            },
        });
    }

    fn int_field(
        &mut self,
        path: &[usize],
        field: &'static str,
        l: Option<i64>,
        r: Option<i64>,
        src: (Option<&TraceLine>, Option<&TraceLine>),
    ) {
        if l != r {
            let ordinal = self.ordinal;
            self.push(Divergence {
                kind: DivergenceKind::CountMismatch,
                path: path.to_vec(),
                field: Some(field),
                noisy: false,
                ordinal,
                left: Context {
                    value: fmt_opt_int(l),
                    line: src.0.cloned(),
                },
                right: Context {
                    value: fmt_opt_int(r),
                    line: src.1.cloned(),
                },
            });
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn num_field(
        &mut self,
        path: &[usize],
        kind: DivergenceKind,
        field: &'static str,
        l: Option<f64>,
        r: Option<f64>,
        eps: f64,
        src: (Option<&TraceLine>, Option<&TraceLine>),
    ) {
        if !num_eq(l, r, eps) {
            let ordinal = self.ordinal;
            self.push(Divergence {
                kind,
                path: path.to_vec(),
                field: Some(field),
                noisy: false,
                ordinal,
                left: Context {
                    value: fmt_opt_num(l),
                    line: src.0.cloned(),
                },
                right: Context {
                    value: fmt_opt_num(r),
                    line: src.1.cloned(),
                },
            });
        }
    }

    fn geometry(
        &mut self,
        path: &[usize],
        l: &Geometry,
        r: &Geometry,
        src: (Option<&TraceLine>, Option<&TraceLine>),
    ) {
        for name in Geometry::FIELDS {
            self.num_field(
                path,
                DivergenceKind::GeometryMismatch,
                name,
                l.field(name),
                r.field(name),
                self.o.eps_geometry,
                src,
            );
        }
    }

    fn text_eq(&self, a: &str, b: &str) -> bool {
        normalize(a, self.o) == normalize(b, self.o)
    }

    fn noisy(&self, a: &str, b: &str) -> bool {
        let has = |s: &str| s.chars().any(|c| self.o.noise_markers.contains(&c));
        has(a) != has(b)
    }
}

/// Tolerance equality: two absent values are equal, an absent value never
/// equals a present one, and present values compare with strict `<`
/// (a difference of exactly eps is divergent).
fn num_eq(a: Option<f64>, b: Option<f64>, eps: f64) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => (a - b).abs() < eps,
        _ => false,
    }
}

fn normalize(s: &str, o: &CompareOptions) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if o.ignore_whitespace && c.is_whitespace() {
            continue;
        }
        if o.ignore_case {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn fmt_opt_num(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{}", v),
        None => "-".to_owned(),
    }
}

fn fmt_opt_int(v: Option<i64>) -> String {
    match v {
        Some(v) => v.to_string(),
        None => "-".to_owned(),
    }
}

fn line_leaf<'t>(l: &'t crate::model::LineEntry, path: Vec<usize>) -> Leaf<'t> {
    Leaf {
        path,
        index: l.index,
        base: l.base,
        geometry: l.geometry,
        font_size: l.font_size,
        text: &l.text,
        source: &l.source,
    }
}

fn flatten<'t>(groups: &[&'t BlockGroup]) -> Vec<Leaf<'t>> {
    let mut out = Vec::new();
    for (gi, g) in groups.iter().enumerate() {
        for (bi, b) in g.blocks.iter().enumerate() {
            for (ci, c) in b.children.iter().enumerate() {
                match c {
                    Child::Line(l) => out.push(line_leaf(l, vec![gi, bi, ci])),
                    Child::Pool(p) => {
                        for (wi, w) in p.words.iter().enumerate() {
                            out.push(Leaf {
                                path: vec![gi, bi, ci, wi],
                                index: w.index,
                                base: w.base,
                                geometry: w.geometry,
                                font_size: w.font_size,
                                text: &w.text,
                                source: &w.source,
                            });
                        }
                    }
                }
            }
        }
    }
    out
}

/// Content key for the keyed strategy: baseline quantized to the printed
/// precision, plus the verbatim text.
fn leaf_key(l: &Leaf<'_>) -> String {
    match l.base {
        Some(b) => format!("{:.2}|{}", b, l.text),
        None => format!("-|{}", l.text),
    }
}
