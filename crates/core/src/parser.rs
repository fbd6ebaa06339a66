//! Trace parsing: classified lines driving a nesting-depth state machine.
//!
//! The parser consumes one file in a single pass. A node (pool, block,
//! group) is *open* while its declared child count is unmet and is sealed
//! into its parent the instant the count is satisfied. A sibling or group
//! header arriving before that point is a structural gap: fatal in strict
//! mode, a truncate-and-resynchronize in lenient mode. Running out of input
//! is never fatal; partial data is kept and the trace is marked truncated.

use std::path::Path;

use crate::classify::{EntryFields, Header, LineClassifier};
use crate::error::ParseError;
use crate::model::{Block, BlockGroup, Child, Geometry, LineEntry, Pool, Trace, TraceLine, WordEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Fail fast on structural gaps. Upstream producers are assumed
    /// well-formed, so a gap means the trace cannot be trusted.
    #[default]
    Strict,
    /// Discard incomplete nodes, mark the trace truncated, and
    /// resynchronize at the next recognized header. For logs cut off
    /// mid-run.
    Lenient,
}

#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub mode: ParseMode,
    /// When set, groups with any other label are discarded at header time.
    pub group_filter: Option<String>,
}

/// Read and parse one trace file. Invalid UTF-8 bytes are replaced rather
/// than rejected; the engines occasionally emit raw glyph bytes.
pub fn parse_trace_file(path: &Path, options: &ParseOptions) -> Result<Trace, ParseError> {
    let file = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|e| ParseError::Io {
        file: file.clone(),
        source: e,
    })?;
    let src = String::from_utf8_lossy(&bytes);
    parse_trace(&src, &file, options)
}

/// Parse trace text already in memory.
pub fn parse_trace(src: &str, file: &str, options: &ParseOptions) -> Result<Trace, ParseError> {
    Parser::new(file, options).run(src)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    AwaitingBlock,
    InBlock,
    InPool,
}

struct Parser<'o> {
    classifier: LineClassifier,
    options: &'o ParseOptions,
    file: String,
    state: State,
    groups: Vec<BlockGroup>,
    open_group: Option<BlockGroup>,
    open_block: Option<Block>,
    open_pool: Option<Pool>,
    truncated: bool,
}

impl<'o> Parser<'o> {
    fn new(file: &str, options: &'o ParseOptions) -> Self {
        Parser {
            classifier: LineClassifier::new(),
            options,
            file: file.to_owned(),
            state: State::Idle,
            groups: Vec::new(),
            open_group: None,
            open_block: None,
            open_pool: None,
            truncated: false,
        }
    }

    fn run(mut self, src: &str) -> Result<Trace, ParseError> {
        let mut lines_scanned: u32 = 0;
        for (i, raw) in src.lines().enumerate() {
            let number = (i + 1) as u32;
            lines_scanned = number;
            match self.classifier.classify(raw) {
                Header::Unrecognized => {}
                Header::BlockGroup { label, block_hint } => {
                    self.on_group(label, block_hint, number)?
                }
                Header::Block {
                    index,
                    rotation,
                    geometry,
                    line_count,
                    pool_count,
                } => self.on_block(
                    index, rotation, geometry, line_count, pool_count, number, raw,
                )?,
                Header::Pool {
                    index,
                    base_index,
                    word_count,
                } => self.on_pool(index, base_index, word_count, number, raw)?,
                Header::Line(fields) => self.on_line(fields, number, raw)?,
                Header::Word(fields) => self.on_word(fields, number, raw)?,
            }
        }
        Ok(self.finish(lines_scanned))
    }

    // ── Transitions ──────────────────────────────────────────────

    fn on_group(
        &mut self,
        label: String,
        block_hint: Option<i64>,
        number: u32,
    ) -> Result<(), ParseError> {
        self.close_pool(number)?;
        self.close_block(number)?;

        // The observed formats announce every block with its own
        // group-title line. A header that keeps the label and continues
        // the block sequence extends the open group; a restart at 0 is a
        // new pass, hence a new group.
        let continues = match (&self.open_group, block_hint) {
            (Some(g), Some(h)) => g.label == label && h == g.blocks.len() as i64,
            _ => false,
        };
        if continues {
            self.state = State::AwaitingBlock;
            return Ok(());
        }

        if let Some(g) = self.open_group.take() {
            self.groups.push(g);
        }
        if let Some(filter) = &self.options.group_filter {
            if *filter != label {
                self.state = State::Idle;
                return Ok(());
            }
        }
        self.open_group = Some(BlockGroup {
            label,
            blocks: Vec::new(),
        });
        self.state = State::AwaitingBlock;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn on_block(
        &mut self,
        index: i64,
        rotation: i64,
        geometry: Geometry,
        line_count: Option<u32>,
        pool_count: Option<u32>,
        number: u32,
        raw: &str,
    ) -> Result<(), ParseError> {
        if self.state == State::Idle {
            return Ok(());
        }
        self.close_pool(number)?;
        self.close_block(number)?;

        let expected = self
            .open_group
            .as_ref()
            .map(|g| g.blocks.len() as i64)
            .unwrap_or(0);
        if index != expected && self.options.mode == ParseMode::Strict {
            return Err(self.malformed(
                number,
                raw,
                format!("block index {} out of sequence (expected {})", index, expected),
            ));
        }

        self.open_block = Some(Block {
            index,
            rotation,
            geometry,
            declared_line_count: line_count,
            declared_pool_count: pool_count,
            children: Vec::new(),
            source: TraceLine {
                number,
                text: raw.to_owned(),
            },
        });
        self.state = State::InBlock;
        self.seal_block_if_complete();
        Ok(())
    }

    fn on_pool(
        &mut self,
        index: i64,
        base_index: Option<i64>,
        word_count: u32,
        number: u32,
        raw: &str,
    ) -> Result<(), ParseError> {
        match self.state {
            State::Idle => return Ok(()),
            State::AwaitingBlock => {
                return self.unexpected(number, raw, "pool header before any block header")
            }
            State::InPool => self.close_pool(number)?,
            State::InBlock => {}
        }
        self.open_pool = Some(Pool {
            index,
            base_index,
            declared_word_count: word_count,
            words: Vec::new(),
            source: TraceLine {
                number,
                text: raw.to_owned(),
            },
        });
        self.state = State::InPool;
        self.seal_pool_if_complete();
        Ok(())
    }

    fn on_line(&mut self, fields: EntryFields, number: u32, raw: &str) -> Result<(), ParseError> {
        match self.state {
            State::Idle => return Ok(()),
            State::AwaitingBlock => {
                return self.unexpected(number, raw, "line header before any block header")
            }
            State::InPool => self.close_pool(number)?,
            State::InBlock => {}
        }
        if let Some(block) = self.open_block.as_mut() {
            block.children.push(Child::Line(LineEntry {
                index: fields.index,
                base: fields.base,
                geometry: fields.geometry,
                font_size: fields.font_size,
                text: fields.text,
                source: TraceLine {
                    number,
                    text: raw.to_owned(),
                },
            }));
        }
        self.state = State::InBlock;
        self.seal_block_if_complete();
        Ok(())
    }

    fn on_word(&mut self, fields: EntryFields, number: u32, raw: &str) -> Result<(), ParseError> {
        match self.state {
            State::Idle => return Ok(()),
            State::AwaitingBlock => {
                return self.unexpected(number, raw, "word header outside any block")
            }
            State::InBlock => return self.unexpected(number, raw, "word header outside any pool"),
            State::InPool => {}
        }
        if let Some(pool) = self.open_pool.as_mut() {
            pool.words.push(WordEntry {
                index: fields.index,
                base: fields.base,
                geometry: fields.geometry,
                font_size: fields.font_size,
                text: fields.text,
                source: TraceLine {
                    number,
                    text: raw.to_owned(),
                },
            });
        }
        self.seal_pool_if_complete();
        Ok(())
    }

    // ── Sealing ──────────────────────────────────────────────────

    fn seal_pool_if_complete(&mut self) {
        let complete = self
            .open_pool
            .as_ref()
            .map(|p| p.words.len() as u32 >= p.declared_word_count)
            .unwrap_or(false);
        if complete {
            let pool = self.open_pool.take();
            if let (Some(pool), Some(block)) = (pool, self.open_block.as_mut()) {
                block.children.push(Child::Pool(pool));
            }
            self.state = State::InBlock;
            self.seal_block_if_complete();
        }
    }

    fn seal_block_if_complete(&mut self) {
        let complete = self
            .open_block
            .as_ref()
            .and_then(|b| {
                b.declared_child_count()
                    .map(|d| b.children.len() as u32 >= d)
            })
            .unwrap_or(false);
        if complete {
            let block = self.open_block.take();
            if let (Some(block), Some(group)) = (block, self.open_group.as_mut()) {
                group.blocks.push(block);
            }
            self.state = State::AwaitingBlock;
        }
    }

    /// Close a still-open pool at a structural boundary. The pool is
    /// necessarily short of its declared count, since a satisfied count
    /// seals eagerly.
    fn close_pool(&mut self, number: u32) -> Result<(), ParseError> {
        let Some(pool) = self.open_pool.take() else {
            return Ok(());
        };
        let actual = pool.words.len() as u32;
        if actual < pool.declared_word_count {
            match self.options.mode {
                ParseMode::Strict => {
                    return Err(ParseError::StructuralGap {
                        file: self.file.clone(),
                        line: number,
                        node: format!("pool {}", pool.index),
                        declared: pool.declared_word_count,
                        actual,
                    });
                }
                ParseMode::Lenient => {
                    self.truncated = true;
                    self.state = State::InBlock;
                    return Ok(());
                }
            }
        }
        if let Some(block) = self.open_block.as_mut() {
            block.children.push(Child::Pool(pool));
        }
        self.state = State::InBlock;
        Ok(())
    }

    /// Close a still-open block at a structural boundary.
    fn close_block(&mut self, number: u32) -> Result<(), ParseError> {
        let Some(block) = self.open_block.take() else {
            return Ok(());
        };
        if let Some(declared) = block.declared_child_count() {
            let actual = block.children.len() as u32;
            if actual < declared {
                match self.options.mode {
                    ParseMode::Strict => {
                        return Err(ParseError::StructuralGap {
                            file: self.file.clone(),
                            line: number,
                            node: format!("block {}", block.index),
                            declared,
                            actual,
                        });
                    }
                    ParseMode::Lenient => {
                        self.truncated = true;
                        return Ok(());
                    }
                }
            }
        }
        if let Some(group) = self.open_group.as_mut() {
            group.blocks.push(block);
        }
        Ok(())
    }

    /// End of input. Unmet counts are a truncation, not an error, in both
    /// modes; the partial data is kept rather than dropped.
    fn finish(mut self, lines_scanned: u32) -> Trace {
        if let Some(pool) = self.open_pool.take() {
            if (pool.words.len() as u32) < pool.declared_word_count {
                self.truncated = true;
            }
            if let Some(block) = self.open_block.as_mut() {
                block.children.push(Child::Pool(pool));
            }
        }
        if let Some(block) = self.open_block.take() {
            if let Some(declared) = block.declared_child_count() {
                if (block.children.len() as u32) < declared {
                    self.truncated = true;
                }
            }
            if let Some(group) = self.open_group.as_mut() {
                group.blocks.push(block);
            }
        }
        if let Some(group) = self.open_group.take() {
            self.groups.push(group);
        }
        Trace {
            file: self.file,
            groups: self.groups,
            lines_scanned,
            truncated: self.truncated,
        }
    }

    // ── Errors ───────────────────────────────────────────────────

    fn malformed(&self, number: u32, raw: &str, reason: String) -> ParseError {
        ParseError::Malformed {
            file: self.file.clone(),
            line: number,
            text: raw.to_owned(),
            reason,
        }
    }

    /// A recognized header in a state that does not admit it: fatal in
    /// strict mode, skipped in lenient mode.
    fn unexpected(&self, number: u32, raw: &str, reason: &str) -> Result<(), ParseError> {
        match self.options.mode {
            ParseMode::Strict => Err(self.malformed(number, raw, reason.to_owned())),
            ParseMode::Lenient => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict() -> ParseOptions {
        ParseOptions::default()
    }

    fn lenient() -> ParseOptions {
        ParseOptions {
            mode: ParseMode::Lenient,
            ..ParseOptions::default()
        }
    }

    const LINES_TRACE: &str = "\
textBlock: lines built blk=0--------------------------
block 0: rot=0 {42.52 481.88 639.63 694.63} col=0 nCols=0 lines=2
  line 0: base=120.24 {42.52 422.51 670.63 694.63} fontSize=24.00 \"How people decide\"
  line 1: base=144.24 {42.52 401.10 646.63 670.63} fontSize=24.00 \"what they want to\"
textBlock: lines built blk=1--------------------------
block 1: rot=0 {54.00 91.85 697.92 755.88} col=0 nCols=0 lines=1
  line 0: base=98.00 {54.00 91.85 697.92 721.92} fontSize=10.00 \"Print\"
";

    const POOLS_TRACE: &str = "\
[INFO]  text_block.go:276 textBlock: before discardDuplicatedText blk=0--------------------------
 block 0: rot=0 {143.54 468.45 741.93 756.27} col=0 nCols=0 lines=0 pools=1 minBaseIdx=24 maxBaseIdx=24
 pool 0: baseIdx=24 len=2
  word 0: serial=0 base=99.96 {143.54 177.69 741.93 756.27} fontsize=14.35 \"High\"
  word 1: serial=0 base=99.96 {183.07 271.98 741.93 756.27} fontsize=14.35 \"Performance\"
[INFO]  text_block.go:278 ----------xxxx------------
";

    #[test]
    fn parses_flat_line_children() {
        let t = parse_trace(LINES_TRACE, "lines.log", &strict()).unwrap();
        assert_eq!(t.groups.len(), 1);
        let g = &t.groups[0];
        assert_eq!(g.label, "lines built");
        assert_eq!(g.blocks.len(), 2);
        assert_eq!(g.blocks[0].children.len(), 2);
        assert_eq!(g.blocks[1].children.len(), 1);
        assert!(!t.truncated);
        match &g.blocks[0].children[0] {
            Child::Line(l) => {
                assert_eq!(l.base, Some(120.24));
                assert_eq!(l.text, "How people decide");
            }
            other => panic!("expected line child, got {:?}", other),
        }
    }

    #[test]
    fn parses_nested_pools() {
        let t = parse_trace(POOLS_TRACE, "pools.log", &strict()).unwrap();
        assert_eq!(t.groups.len(), 1);
        let b = &t.groups[0].blocks[0];
        assert_eq!(b.declared_pool_count, Some(1));
        assert_eq!(b.children.len(), 1);
        match &b.children[0] {
            Child::Pool(p) => {
                assert_eq!(p.base_index, Some(24));
                assert_eq!(p.declared_word_count, 2);
                assert_eq!(p.words.len(), 2);
                assert_eq!(p.words[1].text, "Performance");
            }
            other => panic!("expected pool child, got {:?}", other),
        }
    }

    #[test]
    fn sealed_nodes_satisfy_declared_counts() {
        let t = parse_trace(POOLS_TRACE, "pools.log", &strict()).unwrap();
        for g in &t.groups {
            for b in &g.blocks {
                if let Some(declared) = b.declared_child_count() {
                    assert_eq!(b.children.len() as u32, declared);
                }
                for c in &b.children {
                    if let Child::Pool(p) = c {
                        assert_eq!(p.words.len() as u32, p.declared_word_count);
                    }
                }
            }
        }
    }

    #[test]
    fn new_block_before_child_count_met_is_a_structural_gap() {
        let src = "\
textBlock: lines built blk=0--------------------------
block 0: rot=0 {54.00 91.85 697.92 755.88} col=0 nCols=0 lines=1
textBlock: lines built blk=1--------------------------
block 1: rot=0 {54.00 91.85 697.92 755.88} col=0 nCols=0 lines=1
";
        let err = parse_trace(src, "gap.log", &strict()).unwrap_err();
        match err {
            ParseError::StructuralGap {
                node,
                declared,
                actual,
                line,
                ..
            } => {
                assert_eq!(node, "block 0");
                assert_eq!(declared, 1);
                assert_eq!(actual, 0);
                assert_eq!(line, 3);
            }
            other => panic!("expected StructuralGap, got {:?}", other),
        }
    }

    #[test]
    fn lenient_mode_discards_short_node_and_marks_truncated() {
        let src = "\
textBlock: lines built blk=0--------------------------
block 0: rot=0 {54.00 91.85 697.92 755.88} col=0 nCols=0 lines=2
  line 0: base=98.00 {54.00 91.85 697.92 721.92} fontSize=10.00 \"Print\"
textBlock: lines built blk=0--------------------------
block 0: rot=0 {10.00 20.00 30.00 40.00} col=0 nCols=0 lines=1
  line 0: base=98.00 {54.00 91.85 697.92 721.92} fontSize=10.00 \"Again\"
";
        let t = parse_trace(src, "short.log", &lenient()).unwrap();
        assert!(t.truncated);
        // The short block is discarded; parsing resynchronizes at the next
        // header and the replacement block lands in the same-label group.
        assert_eq!(t.groups.len(), 1);
        assert_eq!(t.groups[0].blocks.len(), 1);
        match &t.groups[0].blocks[0].children[0] {
            Child::Line(l) => assert_eq!(l.text, "Again"),
            other => panic!("expected line child, got {:?}", other),
        }
    }

    #[test]
    fn truncated_input_keeps_partial_data() {
        let src = "\
[INFO] textBlock: before discardDuplicatedText blk=0--------------------------
 block 0: rot=0 {143.54 468.45 741.93 756.27} col=0 nCols=0 lines=0 pools=2 minBaseIdx=24 maxBaseIdx=24
 pool 0: baseIdx=24 len=3
  word 0: serial=0 base=99.96 {143.54 177.69 741.93 756.27} fontsize=14.35 \"High\"
";
        let t = parse_trace(src, "cut.log", &strict()).unwrap();
        assert!(t.truncated);
        let b = &t.groups[0].blocks[0];
        assert_eq!(b.children.len(), 1);
        match &b.children[0] {
            Child::Pool(p) => assert_eq!(p.words.len(), 1),
            other => panic!("expected pool child, got {:?}", other),
        }
    }

    #[test]
    fn same_label_headers_continue_one_group() {
        let t = parse_trace(LINES_TRACE, "lines.log", &strict()).unwrap();
        assert_eq!(t.groups.len(), 1);
        assert_eq!(t.groups[0].blocks.len(), 2);
        assert_eq!(t.groups[0].blocks[0].index, 0);
        assert_eq!(t.groups[0].blocks[1].index, 1);
    }

    #[test]
    fn repeated_pass_restarting_at_zero_opens_new_group() {
        let src = format!("{}{}", LINES_TRACE, LINES_TRACE);
        let t = parse_trace(&src, "two_pass.log", &strict()).unwrap();
        assert_eq!(t.groups.len(), 2);
        assert_eq!(t.groups[0].label, "lines built");
        assert_eq!(t.groups[1].label, "lines built");
        assert_eq!(t.groups[1].blocks.len(), 2);
    }

    #[test]
    fn group_filter_discards_other_labels() {
        let src = "\
textBlock: unsorted blk=0--------------------------
block 0: rot=0 {1.00 2.00 3.00 4.00} col=0 nCols=0 lines=1
  line 0: base=1.00 {1.00 2.00 3.00 4.00} fontSize=1.00 \"skip me\"
textBlock: sorted blk=0--------------------------
block 0: rot=0 {1.00 2.00 3.00 4.00} col=0 nCols=0 lines=1
  line 0: base=1.00 {1.00 2.00 3.00 4.00} fontSize=1.00 \"keep me\"
";
        let opts = ParseOptions {
            group_filter: Some("sorted".to_owned()),
            ..ParseOptions::default()
        };
        let t = parse_trace(src, "filter.log", &opts).unwrap();
        assert_eq!(t.groups.len(), 1);
        assert_eq!(t.groups[0].label, "sorted");
        match &t.groups[0].blocks[0].children[0] {
            Child::Line(l) => assert_eq!(l.text, "keep me"),
            other => panic!("expected line child, got {:?}", other),
        }
    }

    #[test]
    fn zero_child_block_seals_immediately() {
        let src = "\
textBlock: lines built blk=0--------------------------
block 0: rot=0 {1.00 2.00 3.00 4.00} col=0 nCols=0 lines=0
textBlock: lines built blk=1--------------------------
block 1: rot=0 {1.00 2.00 3.00 4.00} col=0 nCols=0 lines=0
";
        let t = parse_trace(src, "empty.log", &strict()).unwrap();
        assert_eq!(t.groups[0].blocks.len(), 2);
        assert!(!t.truncated);
    }

    #[test]
    fn word_outside_pool_is_malformed_in_strict_mode() {
        let src = "\
textBlock: lines built blk=0--------------------------
block 0: rot=0 {1.00 2.00 3.00 4.00} col=0 nCols=0 lines=1
  word 0: serial=0 base=1.00 {1.00 2.00 3.00 4.00} fontsize=1.00 \"stray\"
";
        let err = parse_trace(src, "stray.log", &strict()).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { line: 3, .. }));
        // Lenient mode skips the stray word; the block then runs out of
        // input one child short.
        let t = parse_trace(src, "stray.log", &lenient()).unwrap();
        assert!(t.truncated);
    }

    #[test]
    fn noise_lines_between_headers_are_ignored() {
        let src = "\
random preamble
textBlock: lines built blk=0--------------------------
[DEBUG] something unrelated
block 0: rot=0 {1.00 2.00 3.00 4.00} col=0 nCols=0 lines=1

  line 0: base=1.00 {1.00 2.00 3.00 4.00} fontSize=1.00 \"ok\"
trailer
";
        let t = parse_trace(src, "noise.log", &strict()).unwrap();
        assert_eq!(t.groups[0].blocks[0].children.len(), 1);
        assert_eq!(t.lines_scanned, 7);
    }

    #[test]
    fn io_error_is_reported_before_parsing() {
        let err = parse_trace_file(Path::new("/nonexistent/trace.log"), &strict()).unwrap_err();
        assert!(matches!(err, ParseError::Io { .. }));
    }
}
