//! Leakprobe - command line entry point
//!
//! Runs the context retention scenarios and exits non-zero when any of them
//! leaves its probe target reachable.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use leakprobe::harness::{default_scenarios, run_suite};
use leakprobe::HarnessConfig;
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(name = "leakprobe")]
#[command(about = "Context retention harness for async GraphQL clients", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Harness configuration file (TOML)
    #[arg(short, long, env = "LEAKPROBE_CONFIG")]
    config: Option<PathBuf>,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Directory for diagnostic snapshots (overrides the config file)
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Skip diagnostic snapshots
    #[arg(long)]
    no_snapshots: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run leak scenarios
    Run {
        /// Only run the named scenario (repeatable)
        #[arg(short, long = "scenario")]
        scenarios: Vec<String>,
    },

    /// List the available scenarios
    List,
}

fn load_config(cli: &Cli) -> anyhow::Result<HarnessConfig> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => HarnessConfig::default(),
    };

    if let Some(dir) = &cli.snapshot_dir {
        config.diagnostics.output_dir = dir.clone();
    }
    if cli.no_snapshots {
        config.diagnostics.enabled = false;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::new(format!("leakprobe={}", level.as_str().to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Write logs to stderr, not stdout
        .init();

    debug!("Leakprobe v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;

    match cli.command {
        Commands::List => {
            for spec in default_scenarios(&config.scenarios) {
                println!(
                    "{:<30} {:<18} timeout {}s",
                    spec.name,
                    spec.shape.to_string(),
                    spec.timeout.as_secs()
                );
            }
            Ok(())
        }
        Commands::Run { scenarios } => {
            let report = run_suite(&config, &scenarios).await?;

            for scenario in &report.scenarios {
                let mark = if scenario.outcome.is_passed() { "ok" } else { "FAIL" };
                println!(
                    "{:<4} {:<30} {} ({} ms)",
                    mark,
                    scenario.name,
                    scenario.outcome,
                    scenario.elapsed.as_millis()
                );
                for path in &scenario.snapshots {
                    println!("       snapshot {}", path.display());
                }
            }
            for path in &report.delayed_snapshots {
                println!("       snapshot {}", path.display());
            }

            let failed = report.failures().count();
            if failed > 0 {
                anyhow::bail!(
                    "{} of {} scenarios left their context reachable or failed",
                    failed,
                    report.scenarios.len()
                );
            }

            println!("All {} scenarios passed", report.scenarios.len());
            Ok(())
        }
    }
}
