mod metrics;

use std::path::{Path, PathBuf};
use std::process;
use std::thread;

use clap::{Parser, Subcommand, ValueEnum};
use laydiff_core::{
    compare, parse_trace_file, CompareOptions, Comparison, ParseError, ParseMode, ParseOptions,
    Report, ReportOptions, Strategy, Trace, DEFAULT_EPSILON, DEFAULT_WINDOW,
};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Layout-engine trace comparison toolchain.
#[derive(Parser)]
#[command(name = "laydiff", version, about = "Layout-engine trace comparison tool")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse one trace file and print its structure
    Parse {
        /// Path to the trace file
        file: PathBuf,
        /// Restrict to block groups with this label
        #[arg(long)]
        group: Option<String>,
        /// Tolerate truncated traces instead of failing fast
        #[arg(long)]
        lenient: bool,
    },

    /// Compare two trace files structurally
    Compare {
        /// Path to the first trace file
        left: PathBuf,
        /// Path to the second trace file
        right: PathBuf,
        /// Restrict comparison to block groups with this label
        #[arg(long)]
        group: Option<String>,
        /// Tolerate truncated traces instead of failing fast
        #[arg(long)]
        lenient: bool,
        /// Numeric tolerance for geometry fields
        #[arg(long, default_value_t = DEFAULT_EPSILON)]
        epsilon: f64,
        /// Tolerance for baselines (defaults to --epsilon)
        #[arg(long)]
        epsilon_base: Option<f64>,
        /// Tolerance for font sizes (defaults to --epsilon)
        #[arg(long)]
        epsilon_font: Option<f64>,
        /// Compare text case-insensitively
        #[arg(long)]
        ignore_case: bool,
        /// Remove all whitespace from text before comparing
        #[arg(long)]
        ignore_whitespace: bool,
        /// Match leaf entries by content key and report permutation cycles
        #[arg(long)]
        by_key: bool,
        /// Stop printing divergences this many nodes after the first
        #[arg(long, default_value_t = DEFAULT_WINDOW)]
        window: usize,
        /// Exit with status 2 when any divergence is found
        #[arg(long)]
        fail_on_divergence: bool,
    },

    /// Compare a flat per-line metric between two trace files
    Metric {
        /// Built-in metric to extract
        #[arg(value_enum)]
        name: metrics::MetricName,
        /// Path to the first trace file
        left: PathBuf,
        /// Path to the second trace file
        right: PathBuf,
        /// Stop the table this many rows after the first differing row
        #[arg(long, default_value_t = 5)]
        window: usize,
    },
}

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Commands::Parse {
            file,
            group,
            lenient,
        } => cmd_parse(&file, group, lenient, cli.output, cli.quiet),
        Commands::Compare {
            left,
            right,
            group,
            lenient,
            epsilon,
            epsilon_base,
            epsilon_font,
            ignore_case,
            ignore_whitespace,
            by_key,
            window,
            fail_on_divergence,
        } => {
            let parse_options = ParseOptions {
                mode: if lenient {
                    ParseMode::Lenient
                } else {
                    ParseMode::Strict
                },
                group_filter: None,
            };
            let compare_options = CompareOptions {
                group_label: group,
                eps_geometry: epsilon,
                eps_base: epsilon_base.unwrap_or(epsilon),
                eps_font: epsilon_font.unwrap_or(epsilon),
                ignore_case,
                ignore_whitespace,
                strategy: if by_key {
                    Strategy::Keyed
                } else {
                    Strategy::Positional
                },
                ..CompareOptions::default()
            };
            cmd_compare(
                &left,
                &right,
                &parse_options,
                &compare_options,
                ReportOptions { window },
                fail_on_divergence,
                cli.output,
                cli.quiet,
            )
        }
        Commands::Metric {
            name,
            left,
            right,
            window,
        } => metrics::cmd_metric(name, &left, &right, window, cli.quiet),
    }
}

fn cmd_parse(
    file: &Path,
    group: Option<String>,
    lenient: bool,
    output: OutputFormat,
    quiet: bool,
) {
    let options = ParseOptions {
        mode: if lenient {
            ParseMode::Lenient
        } else {
            ParseMode::Strict
        },
        group_filter: group,
    };
    match parse_trace_file(file, &options) {
        Ok(trace) => match output {
            OutputFormat::Json => {
                let pretty = serde_json::to_string_pretty(&trace)
                    .unwrap_or_else(|e| format!("serialization error: {}", e));
                println!("{}", pretty);
            }
            OutputFormat::Text => {
                println!("{} {} blocks", trace.file, trace.block_count());
                if !quiet {
                    for g in &trace.groups {
                        println!("  group \"{}\": {} blocks", g.label, g.blocks.len());
                    }
                    if trace.truncated {
                        println!("  (truncated)");
                    }
                }
            }
        },
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_compare(
    left: &Path,
    right: &Path,
    parse_options: &ParseOptions,
    compare_options: &CompareOptions,
    report_options: ReportOptions,
    fail_on_divergence: bool,
    output: OutputFormat,
    quiet: bool,
) {
    // The two files are independent; parse them on separate threads and
    // join both results before comparing.
    let (left_result, right_result) = thread::scope(|s| {
        let lh = s.spawn(|| parse_trace_file(left, parse_options));
        let rh = s.spawn(|| parse_trace_file(right, parse_options));
        (lh.join(), rh.join())
    });
    let left_trace = unwrap_parse(left_result, output, quiet);
    let right_trace = unwrap_parse(right_result, output, quiet);

    let comparison = match compare(&left_trace, &right_trace, compare_options) {
        Ok(c) => c,
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
    };

    print_report(
        &left_trace,
        &right_trace,
        &comparison,
        &report_options,
        output,
    );
    if fail_on_divergence && !comparison.is_clean() {
        process::exit(2);
    }
}

fn unwrap_parse(
    result: thread::Result<Result<Trace, ParseError>>,
    output: OutputFormat,
    quiet: bool,
) -> Trace {
    match result {
        Ok(Ok(trace)) => trace,
        Ok(Err(e)) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
        Err(_) => {
            report_error("internal error: parser thread panicked", output, quiet);
            process::exit(1);
        }
    }
}

fn print_report(
    left: &Trace,
    right: &Trace,
    comparison: &Comparison,
    options: &ReportOptions,
    output: OutputFormat,
) {
    let report = Report::new(left, right, comparison);
    match output {
        OutputFormat::Text => println!("{}", report.to_text(options)),
        OutputFormat::Json => {
            let pretty = serde_json::to_string_pretty(&report.to_json(options))
                .unwrap_or_else(|e| format!("serialization error: {}", e));
            println!("{}", pretty);
        }
    }
}

fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    match output {
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
        OutputFormat::Text => {
            if !quiet {
                eprintln!("error: {}", msg);
            }
        }
    }
}
