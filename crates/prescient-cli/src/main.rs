//! Prescient CLI
//!
//! Command-line tools for the predictive prefetch cache.

mod replay;
mod simulated;

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use prescient_core::{
    FetcherConfig, MemoryStore, PatternAnalyzer, PatternStore, SqliteStore,
    DEFAULT_ANALYSIS_WINDOW, PATTERNS_KEY,
};
use tracing_subscriber::EnvFilter;

use crate::replay::{ReplayOptions, ReplayReport};
use crate::simulated::SimulatedClient;

/// Prescient - Predictive Prefetch Cache CLI
#[derive(Parser)]
#[command(name = "prescient")]
#[command(author = "Prescient Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CLI for the Prescient predictive prefetch cache")]
#[command(long_about = "Prescient learns which queries a user runs next and fetches them ahead of time.\n\nReplay recorded sessions against a simulated backend, inspect what was learned, or start over.")]
struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines action log through a prefetching fetcher
    Replay {
        /// Path to the action log
        file: PathBuf,
        /// Simulated backend latency in milliseconds
        #[arg(long, default_value = "50")]
        latency_ms: u64,
        /// Fraction of distinct queries the simulated backend fails (0.0 - 1.0)
        #[arg(long, default_value = "0.0")]
        fail_rate: f64,
        /// Override the prefetch threshold (0.0 - 1.0)
        #[arg(long)]
        threshold: Option<f64>,
        /// Pause between actions in milliseconds
        #[arg(long, default_value = "250")]
        pace_ms: u64,
        /// Pattern database path (defaults to the platform data directory)
        #[arg(long)]
        db: Option<PathBuf>,
        /// Learn in memory only, leaving the pattern database untouched
        #[arg(long, conflicts_with = "db")]
        ephemeral: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show learned transition, context and time patterns
    Patterns {
        /// Pattern database path (defaults to the platform data directory)
        #[arg(long)]
        db: Option<PathBuf>,
        /// Number of transitions and contexts to list
        #[arg(long, default_value = "10")]
        top: usize,
    },

    /// Forget all learned patterns
    Reset {
        /// Pattern database path (defaults to the platform data directory)
        #[arg(long)]
        db: Option<PathBuf>,
        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    match cli.command {
        Commands::Replay {
            file,
            latency_ms,
            fail_rate,
            threshold,
            pace_ms,
            db,
            ephemeral,
            json,
        } => run_replay(ReplayArgs {
            file,
            latency: Duration::from_millis(latency_ms),
            fail_rate,
            threshold,
            pace: Duration::from_millis(pace_ms),
            db,
            ephemeral,
            json,
        }),
        Commands::Patterns { db, top } => run_patterns(db, top),
        Commands::Reset { db, yes } => run_reset(db, yes),
    }
}

/// Logs go to stderr so reports on stdout stay clean
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_store(db: Option<PathBuf>) -> anyhow::Result<SqliteStore> {
    Ok(SqliteStore::new(db)?)
}

// ============================================================================
// REPLAY
// ============================================================================

struct ReplayArgs {
    file: PathBuf,
    latency: Duration,
    fail_rate: f64,
    threshold: Option<f64>,
    pace: Duration,
    db: Option<PathBuf>,
    ephemeral: bool,
    json: bool,
}

fn run_replay(args: ReplayArgs) -> anyhow::Result<()> {
    let actions = replay::read_log(&args.file)?;
    if actions.is_empty() {
        println!("{}", "Action log is empty, nothing to replay.".yellow());
        return Ok(());
    }

    let mut config = FetcherConfig::from_env();
    if let Some(threshold) = args.threshold {
        config.prefetch_threshold = threshold;
    }
    config.validate()?;

    let store: Arc<dyn PatternStore> = if args.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(open_store(args.db)?)
    };
    let client = Arc::new(SimulatedClient::new(args.latency, args.fail_rate));
    let options = ReplayOptions {
        pace: args.pace,
        ..Default::default()
    };

    if !args.json {
        println!("{}", "=== Prescient Replay ===".cyan().bold());
        println!();
        println!("{}: {}", "Log".white().bold(), args.file.display());
        println!("{}: {}", "Actions".white().bold(), actions.len());
        println!("{}: {}ms", "Latency".white().bold(), args.latency.as_millis());
        println!("{}: {:.2}", "Threshold".white().bold(), config.prefetch_threshold);
        println!();
        println!("{}", "Replaying...".dimmed());
    }

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(replay::run(&actions, client, config, store, options))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &ReplayReport) {
    println!();
    println!("{}", "=== Results ===".cyan().bold());
    println!("{}: {}", "Requests".white().bold(), report.requests);
    print_distribution_bar("Warm hits", report.warm_hits, report.requests, "green");
    print_distribution_bar("In flight", report.in_flight_hits, report.requests, "yellow");
    let cold = report
        .requests
        .saturating_sub(report.warm_hits + report.in_flight_hits);
    print_distribution_bar("Cold", cold, report.requests, "red");
    println!(
        "{}: {:.1}%",
        "Prediction accuracy".white().bold(),
        report.prediction_accuracy() * 100.0
    );
    println!();
    println!("{}: {}", "Predictions queued".white().bold(), report.predictions_queued);
    println!("{}: {}", "Prefetches completed".white().bold(), report.prefetches_completed);
    println!(
        "{}: {} ({} failed)",
        "Backend calls".white().bold(),
        report.client_calls,
        report.client_failures
    );
    if report.request_errors > 0 {
        println!(
            "{}: {}",
            "Request errors".red().bold(),
            report.request_errors
        );
    }
    println!(
        "{}: {} ({:.1}% hit rate)",
        "Cached results".white().bold(),
        report.final_stats.cache_size,
        report.final_stats.cache_hit_rate * 100.0
    );
    println!(
        "{}: {}",
        "Known transitions".white().bold(),
        report.final_stats.patterns.transition_observations
    );
    if report.patterns_saved {
        println!("{}", "Patterns saved.".green());
    } else {
        println!("{}", "Patterns could not be saved, see logs.".yellow());
    }
}

fn print_distribution_bar(label: &str, count: usize, total: usize, color: &str) {
    let percentage = if total > 0 {
        (count as f64 / total as f64) * 100.0
    } else {
        0.0
    };

    let bar_width: usize = 30;
    let filled = ((percentage / 100.0) * bar_width as f64) as usize;
    let empty = bar_width.saturating_sub(filled);

    let bar = format!("{}{}", "#".repeat(filled), "-".repeat(empty));
    let colored_bar = match color {
        "green" => bar.green(),
        "yellow" => bar.yellow(),
        "red" => bar.red(),
        _ => bar.white(),
    };

    println!(
        "  {:12} [{:30}] {:>4} ({:>5.1}%)",
        label, colored_bar, count, percentage
    );
}

// ============================================================================
// PATTERNS
// ============================================================================

fn run_patterns(db: Option<PathBuf>, top: usize) -> anyhow::Result<()> {
    let store = Arc::new(open_store(db)?);
    let location = store
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "in-memory".to_string());
    let analyzer = PatternAnalyzer::new(store, DEFAULT_ANALYSIS_WINDOW);
    let stats = analyzer.stats();

    println!("{}", "=== Prescient Patterns ===".cyan().bold());
    println!();
    println!("{}: {}", "Store".white().bold(), location);
    println!("{}: {}", "Source actions".white().bold(), stats.transition_model_size);
    println!("{}: {}", "Transitions observed".white().bold(), stats.transition_observations);
    println!("{}: {}", "Contexts".white().bold(), stats.context_model_size);

    let time = analyzer.time_model();
    match time.peak_hour() {
        Some(hour) => println!("{}: {:02}:00 UTC", "Busiest hour".white().bold(), hour),
        None => println!("{}: {}", "Busiest hour".white().bold(), "n/a".dimmed()),
    }

    if analyzer.transitions().is_empty() {
        println!();
        println!("{}", "Nothing learned yet. Run `prescient replay` first.".dimmed());
        return Ok(());
    }

    let mut transitions: Vec<(&str, &str, u64, u64)> = analyzer
        .transitions()
        .iter()
        .flat_map(|(from, next)| {
            next.iter()
                .map(move |(to, count)| (from, to, count, next.total()))
        })
        .collect();
    transitions.sort_by(|a, b| {
        b.2.cmp(&a.2)
            .then_with(|| a.0.cmp(b.0))
            .then_with(|| a.1.cmp(b.1))
    });

    println!();
    println!("{}", "=== Top Transitions ===".yellow().bold());
    for (from, to, count, total) in transitions.into_iter().take(top) {
        println!(
            "  {} {} {}  {} ({:.0}%)",
            from.white(),
            "->".dimmed(),
            to.green(),
            count,
            count as f64 / total.max(1) as f64 * 100.0
        );
    }

    let mut contexts: Vec<(&str, u64, Option<(String, f64)>)> = analyzer
        .contexts()
        .iter()
        .map(|(key, actions)| (key, actions.total(), actions.distribution().into_iter().next()))
        .collect();
    contexts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    println!();
    println!("{}", "=== Busiest Contexts ===".yellow().bold());
    for (key, total, favourite) in contexts.into_iter().take(top) {
        match favourite {
            Some((action, p)) => println!(
                "  {:30} {:>5} actions, mostly {} ({:.0}%)",
                key,
                total,
                action.green(),
                p * 100.0
            ),
            None => println!("  {:30} {:>5} actions", key, total),
        }
    }

    Ok(())
}

// ============================================================================
// RESET
// ============================================================================

fn run_reset(db: Option<PathBuf>, yes: bool) -> anyhow::Result<()> {
    let store = open_store(db)?;

    if store.get_item(PATTERNS_KEY)?.is_none() {
        println!("{}", "No stored patterns, nothing to reset.".green());
        return Ok(());
    }

    // Confirmation prompt (unless --yes)
    if !yes {
        print!(
            "{} Forget all learned patterns? This cannot be undone. [y/N] ",
            "WARNING:".red().bold()
        );
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input != "y" && input != "yes" {
            println!("{}", "Aborted.".yellow());
            return Ok(());
        }
    }

    store.remove_item(PATTERNS_KEY)?;
    println!("{}", "Learned patterns cleared.".green().bold());
    Ok(())
}
