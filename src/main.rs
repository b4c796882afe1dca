//! hirscan - build, check and order HIR block graphs
//!
//! Graphs are read from JSON descriptions (see `hir::ir::description`).
//! Each file gets its own graph, so several files are processed in parallel.
//!
//! # Usage
//!
//! ```bash
//! # Print the linear-scan order of a graph
//! hirscan order hir/tests/fixtures/natural_loop.json
//!
//! # Validate, order and verify several graphs, dumping the blocks
//! hirscan order --verify --dump hir/tests/fixtures/*.json
//!
//! # Trace the ordering pass
//! hirscan order --trace 3 graph.json
//!
//! # Only run the structural validator
//! hirscan check graph.json
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use hir::ir::{dump, validate_graph, DescribedGraph, GraphDescription, LinearScanOrder};
use hir::{logging, HirOptions};
use log::{debug, LevelFilter};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "hirscan")]
#[command(version = "0.1.0")]
#[command(about = "Build, check and order HIR block graphs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Worker threads (defaults to one per core)
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the linear-scan block order of each graph
    Order {
        /// Graph description files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Option preset
        #[arg(long, value_enum, default_value = "production")]
        preset: Preset,

        /// Validate the graph before ordering and verify the order after
        #[arg(long)]
        verify: bool,

        /// Print every block's instructions after the order table
        #[arg(long)]
        dump: bool,

        /// Trace level for the ordering pass (0-4)
        #[arg(long, default_value = "0")]
        trace: u8,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Run the structural validator over each graph
    Check {
        /// Graph description files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show the option presets
    Info,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Preset {
    Development,
    Production,
    Stress,
}

impl Preset {
    fn options(self) -> HirOptions {
        match self {
            Preset::Development => HirOptions::development(),
            Preset::Production => HirOptions::production(),
            Preset::Stress => HirOptions::stress(),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Text,
    Json,
}

/// Everything `order` needs per file.
struct OrderRequest {
    options: HirOptions,
    verify: bool,
    dump: bool,
    format: OutputFormat,
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let trace = match &cli.command {
        Commands::Order { trace, .. } => *trace,
        _ => 0,
    };
    match (cli.verbose, trace) {
        (_, t) if t >= 2 => logging::init_with_level(LevelFilter::Trace),
        (true, _) | (_, 1) => logging::init_with_level(LevelFilter::Debug),
        _ => logging::init_from_env(),
    }

    let result = match cli.command {
        Commands::Order {
            files,
            preset,
            verify,
            dump,
            trace,
            format,
        } => {
            let mut options = preset.options().with_trace_level(trace);
            options.verify_linear_scan_order |= verify;
            let request = OrderRequest {
                options,
                verify,
                dump,
                format,
                verbose: cli.verbose,
            };
            run_parallel(cli.jobs, &files, |path| order_file(path, &request))
        }
        Commands::Check { files } => run_parallel(cli.jobs, &files, check_file),
        Commands::Info => {
            show_info();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Run `job` over every file on a rayon pool, then print the reports in
/// command-line order. Fails if any file failed.
fn run_parallel<F>(jobs: Option<usize>, files: &[PathBuf], job: F) -> Result<(), String>
where
    F: Fn(&Path) -> Result<String, String> + Sync,
{
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(jobs) = jobs {
        builder = builder.num_threads(jobs);
    }
    let pool = builder
        .build()
        .map_err(|e| format!("Failed to start worker pool: {}", e))?;

    let results: Vec<Result<String, String>> =
        pool.install(|| files.par_iter().map(|path| job(path.as_path())).collect());

    let mut failed = 0;
    for (path, result) in files.iter().zip(results) {
        match result {
            Ok(report) => print!("{}", report),
            Err(e) => {
                eprintln!("❌ {}: {}", path.display(), e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        return Err(format!("{} of {} graphs failed", failed, files.len()));
    }
    Ok(())
}

fn load(path: &Path, options: HirOptions) -> Result<DescribedGraph, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read file: {}", e))?;
    let desc = GraphDescription::from_json(&text).map_err(|e| e.to_string())?;
    desc.build(options).map_err(|e| e.to_string())
}

fn validation_report(built: &DescribedGraph) -> Result<(), String> {
    match validate_graph(&built.graph) {
        Ok(()) => Ok(()),
        Err(errors) => {
            let lines: Vec<String> = errors.iter().map(|e| format!("  {}", e)).collect();
            Err(format!(
                "{} validation errors:\n{}",
                errors.len(),
                lines.join("\n")
            ))
        }
    }
}

fn check_file(path: &Path) -> Result<String, String> {
    let built = load(path, HirOptions::default())?;
    validation_report(&built)?;
    Ok(format!(
        "✓ {}: {} blocks, {} values\n",
        path.display(),
        built.graph.num_blocks(),
        built.graph.values().len()
    ))
}

fn order_file(path: &Path, request: &OrderRequest) -> Result<String, String> {
    let started = Instant::now();
    let mut built = load(path, request.options.clone())?;
    if request.verify {
        validation_report(&built)?;
    }

    let order = built
        .graph
        .compute_linear_scan_order()
        .map_err(|e| e.to_string())?;
    if request.verify {
        order.verify(&built.graph).map_err(|e| e.to_string())?;
    }
    debug!(
        "{}: ordered {} blocks in {:?}",
        path.display(),
        order.len(),
        started.elapsed()
    );

    match request.format {
        OutputFormat::Text => Ok(text_report(path, &built, &order, request)),
        OutputFormat::Json => json_report(&built, &order),
    }
}

fn text_report(
    path: &Path,
    built: &DescribedGraph,
    order: &LinearScanOrder,
    request: &OrderRequest,
) -> String {
    let graph = &built.graph;
    let mut out = format!(
        "== {} ({}): {} blocks, {} loops{}\n",
        graph.scope(graph.root_scope()).method.name,
        path.display(),
        order.len(),
        order.num_loops(),
        if order.iterative_dominators() {
            format!(", dominators iterated {}x", order.dominator_iterations())
        } else {
            String::new()
        }
    );
    out.push_str(&format!("order: {}\n", built.labels_of(order.blocks()).join(" ")));
    if request.verbose {
        out.push_str(&dump::loop_table(graph, order));
    }
    out.push_str(&dump::linear_scan_table(graph, order));
    if request.dump {
        out.push_str("----- blocks:\n");
        out.push_str(&dump::dump_graph(graph));
    }
    out.push('\n');
    out
}

fn json_report(built: &DescribedGraph, order: &LinearScanOrder) -> Result<String, String> {
    let graph = &built.graph;
    let label = |b| built.labels_of(&[b]).remove(0);
    let blocks: Vec<serde_json::Value> = order
        .blocks()
        .iter()
        .map(|&b| {
            let block = graph.block(b);
            serde_json::json!({
                "block": label(b),
                "loop_index": block.loop_index(),
                "loop_depth": block.loop_depth(),
                "dominator": block.dominator().map(&label),
            })
        })
        .collect();
    let loops: Vec<Vec<String>> = (0..order.num_loops())
        .map(|i| built.labels_of(&order.loop_blocks(i)))
        .collect();
    let report = serde_json::json!({
        "name": graph.scope(graph.root_scope()).method.name,
        "order": blocks,
        "loops": loops,
        "iterative_dominators": order.iterative_dominators(),
    });
    serde_json::to_string_pretty(&report)
        .map(|mut s| {
            s.push('\n');
            s
        })
        .map_err(|e| e.to_string())
}

fn show_info() {
    println!("hirscan {}", env!("CARGO_PKG_VERSION"));
    println!();
    for (name, options) in [
        ("development", HirOptions::development()),
        ("production", HirOptions::production()),
        ("stress", HirOptions::stress()),
    ] {
        println!("{}:", name);
        println!("  assume_verified_bytecode: {}", options.assume_verified_bytecode);
        println!("  extra_phi_checking:       {}", options.extra_phi_checking);
        println!("  merge_equivalent_constants: {}", options.merge_equivalent_constants);
        println!("  trace_linear_scan_level:  {}", options.trace_linear_scan_level);
        println!("  stress_linear_scan:       {}", options.stress_linear_scan);
        println!("  verify_linear_scan_order: {}", options.verify_linear_scan_order);
    }
}
