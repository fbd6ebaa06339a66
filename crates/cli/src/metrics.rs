//! Flat per-line metric comparison.
//!
//! Unlike the structural trace model, a metric is one tuple per matching
//! line, extracted with a single pattern and compared per-index between
//! the two files. No nested state is involved; this is a thin layer over
//! the same windowed-table reporting idea as the structural report.

use std::path::Path;
use std::process;

use clap::ValueEnum;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MetricName {
    /// Left-most word selection per pool: poolMinBaseIdx / startBaseIdx
    LeftMostWord,
    /// Words-added-to-block counters: cnt / dnt / minBase / maxBase
    BlockFill,
}

struct MetricSpec {
    pattern: &'static str,
    columns: &'static [&'static str],
}

fn spec(name: MetricName) -> MetricSpec {
    match name {
        MetricName::LeftMostWord => MetricSpec {
            pattern: r"leftMostWord:\s+poolMinBaseIdx=(\d+)\s+startBaseIdx=(\d+)",
            columns: &["poolMinBaseIdx", "startBaseIdx"],
        },
        MetricName::BlockFill => MetricSpec {
            pattern: r"###1 Adding words to block\s+cnt=(\d+)\s+dnt=(\d+)\s+minBase=(\S+)\s+maxBase=(\S+)",
            columns: &["cnt", "dnt", "minBase", "maxBase"],
        },
    }
}

struct Row {
    line: u32,
    values: Vec<f64>,
    raw: String,
}

fn scan(path: &Path, re: &Regex) -> Result<Vec<Row>, String> {
    let bytes =
        std::fs::read(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let src = String::from_utf8_lossy(&bytes);
    let mut rows = Vec::new();
    for (i, line) in src.lines().enumerate() {
        let Some(caps) = re.captures(line) else {
            continue;
        };
        let mut values = Vec::with_capacity(caps.len() - 1);
        let mut ok = true;
        for g in 1..caps.len() {
            match caps.get(g).map(|m| m.as_str().parse::<f64>()) {
                Some(Ok(v)) => values.push(v),
                _ => {
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            rows.push(Row {
                line: (i + 1) as u32,
                values,
                raw: line.to_owned(),
            });
        }
    }
    Ok(rows)
}

pub fn cmd_metric(name: MetricName, left: &Path, right: &Path, window: usize, quiet: bool) {
    let spec = spec(name);
    let re = Regex::new(spec.pattern).expect("metric pattern");

    let left_rows = scan_or_exit(left, &re);
    let right_rows = scan_or_exit(right, &re);

    println!("{} {} matches", left.display(), left_rows.len());
    println!("{} {} matches", right.display(), right_rows.len());

    let n = left_rows.len().min(right_rows.len());
    let mut compared = 0usize;
    let mut bad_rows = 0usize;
    let mut first_bad: Option<usize> = None;
    if !quiet {
        println!("        {:<30} {}", left.display(), right.display());
    }
    for i in 0..n {
        let l = &left_rows[i];
        let r = &right_rows[i];
        compared += 1;
        let bad = l.values != r.values;
        if bad {
            bad_rows += 1;
            if first_bad.is_none() {
                first_bad = Some(i);
            }
        }
        if !quiet {
            let marker = if bad { " ******" } else { "" };
            println!(
                "{:3}: ({}) ({}){}",
                i,
                render_values(&l.values),
                render_values(&r.values),
                marker
            );
            if bad {
                println!("     {:6}: {}", l.line, l.raw);
                println!("     {:6}: {}", r.line, r.raw);
            }
        }
        // Bound the table: stop shortly after the first differing row.
        if let Some(first) = first_bad {
            if i > first + window {
                if !quiet {
                    println!("(stopped {} rows after the first difference)", window);
                }
                break;
            }
        }
    }
    println!(
        "{} differing of {} compared ({})",
        bad_rows,
        compared,
        spec.columns.join("/")
    );
}

fn scan_or_exit(path: &Path, re: &Regex) -> Vec<Row> {
    match scan(path, re) {
        Ok(rows) => rows,
        Err(msg) => {
            eprintln!("error: {}", msg);
            process::exit(1);
        }
    }
}

fn render_values(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{:6.2}", v))
        .collect::<Vec<_>>()
        .join(" ")
}
