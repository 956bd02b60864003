//! Cortex CLI: runs a single scan task against a probe catalogue and
//! prints the results as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use cortex_core::{parse_port_range, Mode, ProbeCatalogue};
use cortex_scanner::{connect, syn, udp, WorkerFn};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Run a Cortex scan against one or more hosts.
#[derive(Debug, Parser)]
#[command(name = "cortex", version, about)]
struct Args {
    /// Target hosts (repeatable).
    #[arg(short = 'H', long = "host", required = true)]
    hosts: Vec<String>,

    /// Port expression, e.g. "22-80" or "443".
    #[arg(short, long, default_value = "1-1024")]
    ports: String,

    /// Scan mode.
    #[arg(short, long, value_enum, default_value = "connect")]
    mode: CliMode,

    /// Path to an nmap-service-probes-format file. Falls back to the
    /// small embedded catalogue when omitted.
    #[arg(long)]
    probe_file: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliMode {
    Connect,
    Syn,
    Udp,
}

impl From<CliMode> for Mode {
    fn from(m: CliMode) -> Self {
        match m {
            CliMode::Connect => Mode::Connect,
            CliMode::Syn => Mode::Syn,
            CliMode::Udp => Mode::Udp,
        }
    }
}

fn init_logging(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = match verbose {
        0 => "error",
        1 => "warn",
        2 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let (start, end) = parse_port_range(&args.ports).context("invalid port expression")?;

    let (catalogue, stats) = match &args.probe_file {
        Some(path) => {
            let (catalogue, stats) = ProbeCatalogue::load_from_file(path)
                .with_context(|| format!("loading probe file {}", path.display()))?;
            (catalogue, stats)
        }
        None => ProbeCatalogue::load_embedded(),
    };
    info!(
        probes = stats.probe_count,
        matches = stats.match_count,
        errors = stats.error_lines.len(),
        "loaded probe catalogue"
    );

    let (worker_fn, worker_count): (WorkerFn, usize) = match Mode::from(args.mode) {
        Mode::Connect => (connect::worker(), 100),
        Mode::Syn => (syn::init().context("SYN worker initialization failed")?, 50),
        Mode::Udp => (udp::worker(), 50),
    };

    let results = cortex_scanner::execute(
        &args.hosts,
        start,
        end,
        worker_fn,
        worker_count,
        Arc::new(catalogue),
    )
    .await;

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
