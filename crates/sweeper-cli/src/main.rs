//! sweeper CLI - mirror remote datasets, skipping unchanged content.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use sweeper::{Config, JobHistory, Orchestrator, SweepError, SweepResult, SweepStatus};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "sweeper")]
#[command(about = "Mirror remote datasets into file servers, object storage and data catalogues")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "jobs.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one job
    Run {
        /// Job name from the configuration file
        job: String,
    },

    /// Load the configuration and resolve every job's adapters
    Check,

    /// Show recent runs and the latest resource records of a job
    History {
        /// Job name from the configuration file
        job: String,

        /// Number of runs to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), SweepError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run { job } => {
            let orchestrator = Orchestrator::new(config)?;
            let cancel_token = setup_signal_handler();

            let result = orchestrator.run_job(&job, cancel_token).await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                print_result(&result);
            }
        }

        Commands::Check => {
            let orchestrator = Orchestrator::new(config)?;
            let jobs: Vec<&str> = orchestrator.job_names().collect();

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else {
                println!("Configuration OK: {} job(s)", jobs.len());
                for name in jobs {
                    let job = orchestrator.config().job(name)?;
                    let destinations: Vec<&str> =
                        job.destinations.iter().map(|d| d.r#type.as_str()).collect();
                    println!(
                        "  {}: {} -> {}",
                        name,
                        job.source.r#type,
                        destinations.join(", ")
                    );
                }
            }
        }

        Commands::History { job, limit } => {
            let orchestrator = Orchestrator::new(config)?;
            let history = orchestrator.history(&job, limit).await?;

            if cli.output_json {
                println!("{}", history.to_json()?);
            } else {
                print_history(&history);
            }
        }
    }

    Ok(())
}

fn print_result(result: &SweepResult) {
    let headline = match result.status {
        SweepStatus::Completed => "Job completed!",
        SweepStatus::CompletedWithErrors => "Job completed with errors",
        SweepStatus::Cancelled => "Job cancelled",
    };
    println!("\n{}", headline);
    println!("  Job: {}", result.job);
    println!("  Run ID: {}", result.run_id);
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!("  Listed: {}", result.stats.listed);
    println!(
        "  Transferred: {} ({} bytes)",
        result.stats.transferred, result.stats.bytes
    );
    println!("  Unchanged: {}", result.stats.unchanged);
    println!("  Skipped: {}", result.stats.skipped);
    if !result.errors.is_empty() {
        println!("  Failed resources:");
        for e in &result.errors {
            println!("    {}: {}", e.name, e.error);
        }
    }
}

fn print_history(history: &JobHistory) {
    println!("Runs of {}:", history.job);
    if history.runs.is_empty() {
        println!("  (none)");
    }
    for run in &history.runs {
        let outcome = match (&run.ended_at, &run.error) {
            (None, _) => "running".to_string(),
            (Some(_), Some(e)) => format!("failed: {}", e),
            (Some(_), None) if run.has_partial_errors => "completed with errors".to_string(),
            (Some(_), None) => "completed".to_string(),
        };
        println!(
            "  #{} {} {}",
            run.id,
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            outcome
        );
    }

    println!("\nResources:");
    if history.resources.is_empty() {
        println!("  (none)");
    }
    for resource in &history.resources {
        match &resource.error {
            Some(e) => println!("  {} error: {}", resource.name, e),
            None => println!(
                "  {} size={} hash={}",
                resource.name,
                resource.size.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
                resource.content_hash.as_deref().unwrap_or("-")
            ),
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the returned token on SIGINT (Ctrl-C) or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, label) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            let mut stream = match signal(kind) {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Failed to set up {} handler: {}", label, e);
                    return;
                }
            };
            stream.recv().await;
            eprintln!("\nReceived {}. Finishing the current run...", label);
            token.cancel();
        });
    }

    cancel_token
}

/// Ctrl-C only.
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to set up Ctrl-C handler: {}", e);
            return;
        }
        eprintln!("\nReceived Ctrl-C. Finishing the current run...");
        token.cancel();
    });

    cancel_token
}
