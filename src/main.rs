//! shortgen - vertical Shorts generation and YouTube publishing
//!
//! Entry point: parses arguments, wires the credential store, quota tracker
//! and upload client together, then runs the generation workflow.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shortgen::auth::{
    BrowserAcquirer, ClientDescriptor, CredentialStore, FileTokenStore, GoogleTokenEndpoint,
};
use shortgen::cli::Args;
use shortgen::clock::{Clock, SystemClock};
use shortgen::config::Config;
use shortgen::media::FfmpegShortGenerator;
use shortgen::publish::{PublishOrchestrator, UploadResult};
use shortgen::quota::QuotaTracker;
use shortgen::upload::{HttpTransport, UploadClient, VideoMetadata};
use shortgen::workflow::{JobOutcome, PublishTarget, Workflow};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _guard = match setup_logging(args.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Run the requested work. `Ok(false)` means at least one job failed.
async fn run(args: Args) -> Result<bool> {
    let started = Instant::now();
    let config = load_config(&args)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight work");
            on_interrupt.cancel();
        }
    });

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    if args.revoke {
        let credentials = credential_store(&config, clock)?;
        return match credentials.load()? {
            Some(credential) => {
                credentials.revoke(&credential).await?;
                println!("Stored credential revoked");
                Ok(true)
            }
            None => {
                println!("No stored credential");
                Ok(true)
            }
        };
    }

    let Some(input) = args.input.as_deref() else {
        anyhow::bail!("an input file or directory is required");
    };

    let generator = FfmpegShortGenerator::new(config.media.clone());
    generator.check_availability().await?;

    let mut workflow = Workflow::new(Arc::new(generator)).with_jobs(args.jobs);
    let mut quota_report = None;
    if args.upload {
        let descriptor = ClientDescriptor::from_file(&config.auth.credentials_path)?;
        let credentials = Arc::new(credential_store(&config, clock.clone())?);
        let quota = Arc::new(QuotaTracker::new(&config.quota, clock));
        quota_report = Some(quota.clone());
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        let client = Arc::new(UploadClient::new(
            Arc::new(HttpTransport::new(http, config.upload.upload_base_url.clone())),
            &config.upload,
        ));
        let orchestrator = PublishOrchestrator::new(credentials, quota, client, &config.upload)
            .interactive(config.auth.interactive);

        workflow = workflow.with_publish(PublishTarget {
            orchestrator: Arc::new(orchestrator),
            descriptor,
            metadata: VideoMetadata {
                title: args.title.clone(),
                description: args.description.clone(),
                privacy_level: args.privacy,
                category: args.category.clone(),
                tags: args.tag_list(),
                ..VideoMetadata::default()
            },
        });
    }

    let outcomes = workflow.run(input, &args.output, &cancel).await?;
    let succeeded = report(&outcomes);

    info!(
        "shortgen finished in {}: {}/{} succeeded",
        format_duration(started.elapsed().as_secs()),
        outcomes.iter().filter(|o| o.succeeded()).count(),
        outcomes.len()
    );
    if let Some(quota) = quota_report {
        let ledger = quota.snapshot();
        info!(
            "Quota for {}: {} of {} units used, {} remaining",
            ledger.date,
            ledger.units_consumed,
            ledger.units_cap,
            ledger.remaining()
        );
    }
    Ok(succeeded && !cancel.is_cancelled())
}

/// Config file (explicit, or `config.toml` in the working directory) with
/// command line overrides applied.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    if let Some(path) = &args.credentials {
        config.auth.credentials_path = path.clone();
    }
    if let Some(path) = &args.token_store {
        config.auth.token_store_path = Some(path.clone());
    }
    if let Some(duration) = args.duration {
        config.media.duration_secs = duration;
    }
    if args.headless {
        config.auth.interactive = false;
    }
    config.validate()?;
    Ok(config)
}

fn credential_store(config: &Config, clock: Arc<dyn Clock>) -> Result<CredentialStore> {
    let margin = chrono::Duration::try_seconds(config.auth.refresh_margin_secs)
        .context("auth.refresh_margin_secs is out of range")?;
    let store = FileTokenStore::new(config.auth.token_store_path());
    let endpoint = GoogleTokenEndpoint::new()?;
    Ok(CredentialStore::new(
        Arc::new(store),
        Arc::new(endpoint),
        Arc::new(BrowserAcquirer::default()),
        clock,
    )
    .with_refresh_margin(margin))
}

/// Print one line per job: the short or watch URL on stdout, failures on
/// stderr. Returns whether every job succeeded.
fn report(outcomes: &[JobOutcome]) -> bool {
    for outcome in outcomes {
        match outcome {
            JobOutcome::Generated(short) => println!("{}", short.local_file_path.display()),
            JobOutcome::Published { result, .. } => match result {
                UploadResult::Published { watch_url, .. } => println!("{}", watch_url),
                UploadResult::Failed { .. } => eprintln!("error: {}", result),
            },
            JobOutcome::GenerationFailed { input, error } => {
                eprintln!("error: generation failed for {}: {}", input.display(), error)
            }
        }
    }
    outcomes.iter().all(JobOutcome::succeeded)
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<WorkerGuard> {
    let log_dir = std::env::current_dir()?.join(".shortgen").join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "shortgen.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // stdout carries results only
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("shortgen.log").display()
    );
    Ok(guard)
}

/// Format duration in seconds to human readable string
fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
