//! Line classification for layout-engine trace text.
//!
//! One raw line in, one [`Header`] out. Classification is pure and
//! stateless; the nesting context lives in the parser. The two engines
//! print the same structure with different field spellings (`fontsize` /
//! `fontSize`, optional `serial=`, `"` or `` ` `` quoting), so each pattern
//! here is the tolerant union of the observed flavors.

use crate::model::Geometry;
use regex::Regex;

/// Fields shared by line and word headers.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryFields {
    pub index: i64,
    pub base: Option<f64>,
    pub geometry: Geometry,
    pub font_size: Option<f64>,
    pub text: String,
}

/// The classification of one trace line.
#[derive(Debug, Clone, PartialEq)]
pub enum Header {
    /// A group-title marker opening (or continuing) a labeled section.
    /// `block_hint` is the announced block index when the flavor prints one.
    BlockGroup {
        label: String,
        block_hint: Option<i64>,
    },
    Block {
        index: i64,
        rotation: i64,
        geometry: Geometry,
        line_count: Option<u32>,
        pool_count: Option<u32>,
    },
    Pool {
        index: i64,
        base_index: Option<i64>,
        word_count: u32,
    },
    Line(EntryFields),
    Word(EntryFields),
    /// Blank lines and engine log noise. Ignored by the parser.
    Unrecognized,
}

/// Stateless pattern matcher over single trace lines.
///
/// All patterns are compiled once at construction and owned by the
/// instance; the same line always classifies the same way.
pub struct LineClassifier {
    group_block: Regex,
    group_marked: Regex,
    block: Regex,
    pool: Regex,
    line: Regex,
    word: Regex,
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LineClassifier {
    pub fn new() -> Self {
        LineClassifier {
            // textBlock: lines built blk=3--------------------------
            group_block: Regex::new(r"textBlock:\s+(.*?)\s+blk=(\d+)").expect("group pattern"),
            // text.go:1325 *@* initial words *#*
            group_marked: Regex::new(r"\*@\*\s+(.*?)\s+\*#\*").expect("group marker pattern"),
            // block 0: rot=0 {54.00 91.85 697.92 755.88} col=0 nCols=0 lines=1 [pools=1 ...]
            block: Regex::new(
                r"\bblock\s+(\d+):+\s+rot=(-?\d+)\s+\{\s*(\S+)\s+(\S+)\s+(\S+)\s+(\S+)\s*\}(?:.*?\blines=(-?\d+|-))?(?:.*?\bpools=(-?\d+|-))?",
            )
            .expect("block pattern"),
            // pool 0: baseIdx=24 len=5
            pool: Regex::new(r"\bpool\s+(\d+)\s*:\s*baseIdx=(-?\d+|-)\s+len=(\d+)")
                .expect("pool pattern"),
            line: Regex::new(
                r#"\bline\s+(\d+)\s*:\s*(?:serial\s*=\s*\d+\s+)?base\s*=\s*(\S+)\s+\{\s*(\S+)\s+(\S+)\s+(\S+)\s+(\S+)\s*\}\s*[fF]ont[sS]ize\s*=\s*(\S+)\s*["`](.*)["`]"#,
            )
            .expect("line pattern"),
            // word 0: serial=0 base=99.96 {143.54 177.69 741.93 756.27} fontsize=14.35 "High"
            word: Regex::new(
                r#"\bword\s+(\d+)\s*:\s*(?:serial\s*=\s*\d+\s+)?base\s*=\s*(\S+)\s+\{\s*(\S+)\s+(\S+)\s+(\S+)\s+(\S+)\s*\}\s*[fF]ont[sS]ize\s*=\s*(\S+)\s*["`](.*)["`]"#,
            )
            .expect("word pattern"),
        }
    }

    /// Classify one line of trace text.
    pub fn classify(&self, line: &str) -> Header {
        // Group markers first: a `textBlock:` line may mention other
        // keywords in its free-form label.
        if let Some(c) = self.group_block.captures(line) {
            let hint = c[2].parse::<i64>().ok();
            return Header::BlockGroup {
                label: c[1].to_string(),
                block_hint: hint,
            };
        }
        if let Some(c) = self.group_marked.captures(line) {
            return Header::BlockGroup {
                label: c[1].to_string(),
                block_hint: None,
            };
        }
        if let Some(c) = self.block.captures(line) {
            let geometry = match geometry(&c[3], &c[4], &c[5], &c[6]) {
                Some(g) => g,
                None => return Header::Unrecognized,
            };
            let (index, rotation) = match (c[1].parse(), c[2].parse()) {
                (Ok(i), Ok(r)) => (i, r),
                _ => return Header::Unrecognized,
            };
            return Header::Block {
                index,
                rotation,
                geometry,
                line_count: count(c.get(7).map(|m| m.as_str())),
                pool_count: count(c.get(8).map(|m| m.as_str())),
            };
        }
        if let Some(c) = self.pool.captures(line) {
            let (index, word_count) = match (c[1].parse(), c[3].parse()) {
                (Ok(i), Ok(n)) => (i, n),
                _ => return Header::Unrecognized,
            };
            return Header::Pool {
                index,
                base_index: int_or_absent(&c[2]),
                word_count,
            };
        }
        if let Some(c) = self.line.captures(line) {
            return match entry_fields(&c) {
                Some(e) => Header::Line(e),
                None => Header::Unrecognized,
            };
        }
        if let Some(c) = self.word.captures(line) {
            return match entry_fields(&c) {
                Some(e) => Header::Word(e),
                None => Header::Unrecognized,
            };
        }
        Header::Unrecognized
    }
}

/// `-` is the explicit absent sentinel; anything else must parse as f64.
fn measure(s: &str) -> Option<Option<f64>> {
    if s == "-" {
        return Some(None);
    }
    s.parse::<f64>().ok().map(Some)
}

fn int_or_absent(s: &str) -> Option<i64> {
    if s == "-" {
        None
    } else {
        s.parse().ok()
    }
}

/// Counter fields: `-` and negative values both mean "not specified".
fn count(s: Option<&str>) -> Option<u32> {
    let s = s?;
    if s == "-" {
        return None;
    }
    s.parse::<i64>().ok().and_then(|n| u32::try_from(n).ok())
}

fn geometry(l: &str, r: &str, b: &str, t: &str) -> Option<Geometry> {
    Some(Geometry {
        left: measure(l)?,
        right: measure(r)?,
        bottom: measure(b)?,
        top: measure(t)?,
    })
}

fn entry_fields(c: &regex::Captures<'_>) -> Option<EntryFields> {
    Some(EntryFields {
        index: c[1].parse().ok()?,
        base: measure(&c[2])?,
        geometry: geometry(&c[3], &c[4], &c[5], &c[6])?,
        font_size: measure(&c[7])?,
        // Verbatim between the outer quotes: never trimmed.
        text: c[8].to_string(),
    })
}
