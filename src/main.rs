mod cli;

use clipforge::batch::{BatchRunner, GcsLister};
use clipforge::catalog::CandidateOutcome;
use clipforge::normalize::normalize_value;
use clipforge::retry::RetryPolicy;
use clipforge::{config, Orchestrator};

use anyhow::{Context, Result};
use cf_pipeline::ProgressSender;
use clap::Parser;
use cli::{Cli, Commands};
use serde_json::Value;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "clipforge=trace,cf_pipeline=trace,cf_core=debug,reqwest=debug".to_string()
        } else {
            "clipforge=info,cf_pipeline=info,cf_core=info".to_string()
        }
    });

    // Reports go to stdout; keep logs on stderr.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run { request, record } => {
            let rt = tokio::runtime::Runtime::new()?;
            let complete = rt.block_on(run_request(&request, config_path, record))?;
            if !complete {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Batch { count, prefix } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_batch(config_path, count, prefix))
        }
        Commands::Search { phrase, run } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(search(&phrase, config_path, run))
        }
        Commands::Normalize { request } => normalize(&request),
        Commands::Validate { config } => validate_config(config.as_deref().or(config_path)),
        Commands::Version => {
            println!("clipforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Read a request from a file path, inline JSON, or stdin (`-`).
fn read_request(arg: &str) -> Result<Value> {
    let text = if arg == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read request from stdin")?;
        buf
    } else if arg.trim_start().starts_with('{') {
        arg.to_string()
    } else {
        std::fs::read_to_string(arg)
            .with_context(|| format!("Failed to read request file: {:?}", arg))?
    };
    serde_json::from_str(&text).context("Request is not valid JSON")
}

/// Cancel between stages on Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping after the current stage");
            child.cancel();
        }
    });
    token
}

fn build_orchestrator(config: &config::Config) -> Result<Orchestrator> {
    let orchestrator = Orchestrator::from_config(config)
        .context("Failed to initialize orchestrator")?
        .with_cancellation(shutdown_token())
        .with_progress(ProgressSender::new(|pct, stage| {
            tracing::info!(stage, "[{:.0}%] {} finished", pct, stage);
        }));
    Ok(orchestrator)
}

async fn run_request(request: &str, config_path: Option<&Path>, print_record: bool) -> Result<bool> {
    let config = config::load_config_or_default(config_path)?;
    let request = read_request(request)?;
    let orchestrator = build_orchestrator(&config)?;

    let outcome = orchestrator.run(&request).await;
    println!("{}", serde_json::to_string_pretty(&outcome.report)?);

    if print_record {
        if let Some(record) = &outcome.record {
            println!("{}", serde_json::to_string_pretty(&record.to_payload()?)?);
        }
    }
    Ok(outcome.report.is_complete())
}

async fn run_batch(
    config_path: Option<&Path>,
    count: Option<usize>,
    prefix: Option<String>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    if let Some(count) = count {
        config.batch.count = count;
    }
    if let Some(prefix) = prefix {
        config.batch.prefix = prefix;
    }

    let orchestrator = build_orchestrator(&config)?;
    let lister = GcsLister::from_config(&config.batch, RetryPolicy::from_config(&config.retry))?;
    let runner = BatchRunner::new(Arc::new(lister), config.batch.clone());

    let summary = runner.run(&orchestrator).await?;
    if summary.remaining == 0 {
        println!("No unprocessed files left.");
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn search(phrase: &str, config_path: Option<&Path>, run: bool) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let orchestrator = build_orchestrator(&config)?;
    let resolver = orchestrator
        .resolver()
        .context("Catalog is not configured (set catalog.api_key)")?;

    let found = resolver.search_candidate(phrase).await?;
    for candidate in &found.candidates {
        let outcome = match &candidate.outcome {
            CandidateOutcome::Resolved(source) => format!("resolved ({source})"),
            CandidateOutcome::SkippedConsumed => "skipped (already used)".to_string(),
            CandidateOutcome::Failed(diagnostic) => format!("unusable: {diagnostic}"),
            CandidateOutcome::NotAttempted => "not attempted".to_string(),
        };
        println!("  page {} {}: {}", candidate.page, candidate.catalog_id, outcome);
    }
    println!("\nSelected: {} ({})", found.resource.catalog_id, found.resource.source);
    println!("URL: {}", found.resource.url);

    if run {
        // Acquire reuses the resource held by the search.
        let request = serde_json::json!({ "catalog_id": found.resource.catalog_id });
        let outcome = orchestrator.run(&request).await;
        println!("{}", serde_json::to_string_pretty(&outcome.report)?);
    }
    Ok(())
}

fn normalize(request: &str) -> Result<()> {
    let request = read_request(request)?;
    let descriptor = normalize_value(&request)?;
    println!("{}", serde_json::to_string_pretty(&descriptor)?);
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, checking default locations");
            config::load_config_or_default(None)?
        }
    };

    println!("✓ Configuration is valid");
    for (name, endpoint) in config.stages.iter() {
        println!("  Stage {}: {}", name, endpoint.url);
    }
    println!("  Identity: {:?}", config.identity.mode);
    println!("  Retry: {} attempts", config.retry.max_attempts);
    println!("  Catalog enabled: {}", config.catalog.is_enabled());
    println!(
        "  Analysis: full media up to {} bytes, {} frames max",
        config.analysis.full_media_max_bytes, config.analysis.max_frames
    );
    match &config.batch.bucket {
        Some(bucket) => println!("  Batch: gs://{}/{}", bucket, config.batch.prefix),
        None => println!("  Batch: not configured"),
    }
    for warning in config.validate() {
        println!("  ⚠ {}", warning);
    }

    Ok(())
}
