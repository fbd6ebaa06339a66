//! Report rendering for comparison results.
//!
//! The reporter prints global counts, then a window of divergences around
//! the first one. Detailed output stops a fixed number of walk nodes after
//! the first divergence so a badly diverged pair of traces cannot produce
//! unbounded output.

use serde_json::Value;

use crate::compare::{Comparison, Divergence};
use crate::model::Trace;

/// Stop printing divergences this many walk nodes after the first one.
pub const DEFAULT_WINDOW: usize = 6;

#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    pub window: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            window: DEFAULT_WINDOW,
        }
    }
}

/// A comparison result bound to the two traces it came from.
pub struct Report<'a> {
    left: &'a Trace,
    right: &'a Trace,
    comparison: &'a Comparison,
}

impl<'a> Report<'a> {
    pub fn new(left: &'a Trace, right: &'a Trace, comparison: &'a Comparison) -> Self {
        Report {
            left,
            right,
            comparison,
        }
    }

    /// Divergences inside the reporting window, and the number suppressed.
    fn windowed(&self, options: &ReportOptions) -> (Vec<&Divergence>, usize) {
        let Some(first) = self.comparison.first_divergence_ordinal() else {
            return (Vec::new(), 0);
        };
        let cutoff = first + options.window;
        let (shown, hidden): (Vec<&Divergence>, Vec<&Divergence>) = self
            .comparison
            .divergences
            .iter()
            .partition(|d| d.ordinal <= cutoff);
        (shown, hidden.len())
    }

    pub fn to_text(&self, options: &ReportOptions) -> String {
        let c = self.comparison;
        let mut lines = Vec::new();
        lines.push(format!("{} {} blocks", self.left.file, self.left.block_count()));
        lines.push(format!(
            "{} {} blocks",
            self.right.file,
            self.right.block_count()
        ));
        lines.push(format!(
            "lines scanned: {} / {}",
            self.left.lines_scanned, self.right.lines_scanned
        ));
        for t in [self.left, self.right] {
            if t.truncated {
                lines.push(format!("note: {} is truncated", t.file));
            }
        }
        lines.push(format!("nodes compared: {}", c.nodes_compared));
        lines.push(format!("leaves matched: {}", c.leaves_matched));

        match c.first_divergence_ordinal() {
            None => lines.push("divergences: none".to_owned()),
            Some(first) => {
                lines.push(format!(
                    "divergences: {} (first at node {})",
                    c.divergences.len(),
                    first
                ));
                let (shown, suppressed) = self.windowed(options);
                for d in shown {
                    render_divergence(d, &mut lines);
                }
                if suppressed > 0 {
                    lines.push(format!(
                        "(stopped {} nodes after the first divergence; {} more suppressed)",
                        options.window, suppressed
                    ));
                }
            }
        }

        if !c.cycles.is_empty() {
            lines.push(format!("permutation cycles: {}", c.cycles.len()));
            for cycle in &c.cycles {
                let mut parts: Vec<String> = cycle.iter().map(|i| i.to_string()).collect();
                parts.push(cycle[0].to_string());
                lines.push(format!("  {}", parts.join(" -> ")));
            }
        }

        lines.join("\n")
    }

    pub fn to_json(&self, options: &ReportOptions) -> Value {
        let c = self.comparison;
        let (shown, suppressed) = self.windowed(options);
        let divergences: Vec<Value> = shown
            .iter()
            .map(|d| serde_json::to_value(d).unwrap_or(Value::Null))
            .collect();
        serde_json::json!({
            "left": side_json(self.left),
            "right": side_json(self.right),
            "nodes_compared": c.nodes_compared,
            "leaves_matched": c.leaves_matched,
            "divergence_count": c.divergences.len(),
            "first_divergence": c.first_divergence_ordinal(),
            "divergences": divergences,
            "suppressed": suppressed,
            "cycles": c.cycles,
        })
    }
}

fn side_json(t: &Trace) -> Value {
    serde_json::json!({
        "file": t.file,
        "blocks": t.block_count(),
        "lines_scanned": t.lines_scanned,
        "truncated": t.truncated,
    })
}

/// Render one divergence as an indented two-to-three line stanza.
fn render_divergence(d: &Divergence, out: &mut Vec<String>) {
    let field = d.field.unwrap_or("value");
    let marker = if d.noisy { " (noise marker)" } else { "" };
    out.push(format!(
        "  [{}] {} {}: {} vs {}{}",
        d.kind,
        render_path(&d.path),
        field,
        d.left.value,
        d.right.value,
        marker
    ));
    if let Some(line) = &d.left.line {
        out.push(format!("      left  {}: >>{}<<", line.number, line.text));
    }
    if let Some(line) = &d.right.line {
        out.push(format!("      right {}: >>{}<<", line.number, line.text));
    }
}

/// Path indices rendered by tree depth: group, block, child, word.
fn render_path(path: &[usize]) -> String {
    const LEVELS: [&str; 4] = ["groups", "blocks", "children", "words"];
    if path.is_empty() {
        return "trace".to_owned();
    }
    let mut out = String::new();
    for (depth, idx) in path.iter().enumerate() {
        if depth > 0 {
            out.push('.');
        }
        let level = LEVELS.get(depth).unwrap_or(&"nodes");
        out.push_str(&format!("{}[{}]", level, idx));
    }
    out
}
