//! Round-trip property: well-formed trace text generated from a parsed
//! model renders back to the identical text, and reparsing that text
//! recovers an identical model (counts, geometries, text, ordering).

use laydiff_core::{
    parse_trace, Child, Geometry, ParseOptions, Trace,
};

/// Render a trace back to canonical text, one announcement header per
/// block, mirroring the engines' own output format.
fn render(t: &Trace) -> String {
    let mut out = String::new();
    for g in &t.groups {
        for (i, b) in g.blocks.iter().enumerate() {
            out.push_str(&format!(
                "textBlock: {} blk={}--------------------------\n",
                g.label, i
            ));
            out.push_str(&format!(
                "block {}: rot={} {} col=0 nCols=0 lines={}",
                b.index,
                b.rotation,
                geom(&b.geometry),
                cnt(b.declared_line_count)
            ));
            if let Some(pools) = b.declared_pool_count {
                out.push_str(&format!(" pools={}", pools));
            }
            out.push('\n');
            for c in &b.children {
                match c {
                    Child::Pool(p) => {
                        out.push_str(&format!(
                            "pool {}: baseIdx={} len={}\n",
                            p.index,
                            p.base_index
                                .map(|v| v.to_string())
                                .unwrap_or_else(|| "-".to_owned()),
                            p.declared_word_count
                        ));
                        for w in &p.words {
                            out.push_str(&format!(
                                "word {}: serial=0 base={} {} fontsize={} \"{}\"\n",
                                w.index,
                                num(w.base),
                                geom(&w.geometry),
                                num(w.font_size),
                                w.text
                            ));
                        }
                    }
                    Child::Line(l) => {
                        out.push_str(&format!(
                            "line {}: base={} {} fontSize={} \"{}\"\n",
                            l.index,
                            num(l.base),
                            geom(&l.geometry),
                            num(l.font_size),
                            l.text
                        ));
                    }
                }
            }
        }
    }
    out
}

fn num(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{:.2}", v),
        None => "-".to_owned(),
    }
}

fn cnt(v: Option<u32>) -> String {
    match v {
        Some(v) => v.to_string(),
        None => "-".to_owned(),
    }
}

fn geom(g: &Geometry) -> String {
    format!(
        "{{{} {} {} {}}}",
        num(g.left),
        num(g.right),
        num(g.bottom),
        num(g.top)
    )
}

const CANONICAL: &str = "\
textBlock: sorted blk=0--------------------------
block 0: rot=0 {143.54 468.45 741.93 756.27} col=0 nCols=0 lines=0 pools=2
pool 0: baseIdx=24 len=2
word 0: serial=0 base=99.96 {143.54 177.69 741.93 756.27} fontsize=14.35 \"High\"
word 1: serial=0 base=99.96 {183.07 271.98 741.93 756.27} fontsize=14.35 \"Performance\"
pool 1: baseIdx=- len=1
word 0: serial=0 base=- {409.23 468.45 741.93 756.27} fontsize=14.35 \"Analysis\"
textBlock: sorted blk=1--------------------------
block 1: rot=0 {42.52 481.88 639.63 694.63} col=0 nCols=0 lines=2
line 0: base=120.24 {42.52 422.51 670.63 694.63} fontSize=24.00 \"How people decide\"
line 1: base=144.24 {42.52 401.10 646.63 670.63} fontSize=24.00 \"what they want to\"
textBlock: lines built blk=0--------------------------
block 0: rot=0 {- - 1.00 2.00} col=0 nCols=0 lines=1
line 0: base=10.00 {1.00 2.00 3.00 4.00} fontSize=9.00 \"  spaced  out  \"
";

#[test]
fn canonical_text_round_trips_exactly() {
    let t1 = parse_trace(CANONICAL, "round.log", &ParseOptions::default()).unwrap();
    assert!(!t1.truncated);
    assert_eq!(render(&t1), CANONICAL);

    let t2 = parse_trace(&render(&t1), "round.log", &ParseOptions::default()).unwrap();
    assert_eq!(t1, t2);
}

#[test]
fn parsed_model_matches_the_source_values() {
    let t = parse_trace(CANONICAL, "round.log", &ParseOptions::default()).unwrap();
    assert_eq!(t.groups.len(), 2);
    assert_eq!(t.groups[0].label, "sorted");
    assert_eq!(t.groups[0].blocks.len(), 2);
    assert_eq!(t.groups[1].label, "lines built");

    let b0 = &t.groups[0].blocks[0];
    assert_eq!(b0.declared_pool_count, Some(2));
    assert_eq!(b0.children.len(), 2);
    match &b0.children[1] {
        Child::Pool(p) => {
            assert_eq!(p.base_index, None);
            assert_eq!(p.words[0].base, None);
            assert_eq!(p.words[0].text, "Analysis");
        }
        other => panic!("expected pool, got {:?}", other),
    }

    // Partially absent geometry survives with the absent sides distinct
    // from zero.
    let b = &t.groups[1].blocks[0];
    assert_eq!(b.geometry.left, None);
    assert_eq!(b.geometry.right, None);
    assert_eq!(b.geometry.bottom, Some(1.00));
    match &b.children[0] {
        Child::Line(l) => assert_eq!(l.text, "  spaced  out  "),
        other => panic!("expected line, got {:?}", other),
    }
}

#[test]
fn every_sealed_node_meets_its_declared_count() {
    let t = parse_trace(CANONICAL, "round.log", &ParseOptions::default()).unwrap();
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
