// ABOUTME: Command-line entry point for the EEG-to-music backend client
// ABOUTME: Uploads recordings, starts jobs, watches their status and fetches results

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use eegmusic_client::artifacts::{
    group_outputs, render_groups, ArtifactKind, ArtifactSink, ConsoleSink, DownloadSink,
};
use eegmusic_client::job::require_job_id;
use eegmusic_client::{
    ClientConfig, JobPhase, JobPoller, JobStatusRecord, PollError, PollerOptions, RemoteClient,
    ResultsOutcome,
};

#[derive(Parser)]
#[command(name = "eegmusic")]
#[command(
    about = "Turn EEG recordings into music with the remote processing backend",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Backend base URL (e.g., http://localhost:8000), overrides EEGMUSIC_BACKEND_URL
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload an EEG recording
    Upload {
        /// EEG file to upload
        file: PathBuf,
    },
    /// Start processing an uploaded file
    Process {
        /// File id returned by `upload`
        file_id: String,
    },
    /// Check a job's status once
    Status {
        job_id: String,
        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Follow a job until it completes or fails
    Watch { job_id: String },
    /// Upload, process and watch in one go, then list the results
    Run {
        file: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// List or download the artifacts of a completed job
    Results {
        job_id: String,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct OutputArgs {
    /// Download artifacts into this directory instead of listing them
    #[arg(long, value_name = "DIR")]
    download: Option<PathBuf>,

    /// Only include artifacts of this kind
    #[arg(long, value_enum)]
    kind: Option<ArtifactKind>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(url) = &cli.backend_url {
        config.set_backend_url(url);
        config.validate()?;
    }
    tracing::debug!("Using backend {}", config.backend_url);

    let client = Arc::new(RemoteClient::new(&config)?);

    match cli.command {
        Commands::Upload { file } => {
            let upload = client.upload_file(&file).await?;
            println!("Uploaded {} as file {}", upload.filename, upload.file_id);
        }
        Commands::Process { file_id } => {
            let process = client.start_processing(&file_id).await?;
            println!("Started job {} ({})", process.job_id, process.status);
        }
        Commands::Status { job_id, json } => {
            let job_id = require_job_id(&job_id)?;
            let status = client
                .get_job_status(job_id)
                .await
                .context("Failed to check job status")?;
            let mut record = JobStatusRecord::pending(job_id);
            record.reconcile(&status)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("{}: {}", job_id, record.status_text());
            }
        }
        Commands::Watch { job_id } => {
            let record = watch_job(Arc::clone(&client), &config, &job_id).await?;
            finish(&record)?;
        }
        Commands::Run { file, output } => {
            let upload = client.upload_file(&file).await?;
            println!("Uploaded {} as file {}", upload.filename, upload.file_id);
            let process = client.start_processing(&upload.file_id).await?;
            let record = watch_job(Arc::clone(&client), &config, &process.job_id).await?;
            finish(&record)?;
            show_results(&client, &record, &output).await?;
        }
        Commands::Results { job_id, output } => match client.fetch_results(&job_id).await? {
            ResultsOutcome::Ready(record) => show_results(&client, &record, &output).await?,
            ResultsOutcome::NotReady(phase) => {
                anyhow::bail!(
                    "Job {} is {}, not completed yet. Run `eegmusic watch {}` to follow it",
                    job_id,
                    phase,
                    job_id
                );
            }
        },
    }

    Ok(())
}

/// Poll `job_id` with a progress bar until it reaches a terminal phase.
async fn watch_job(
    client: Arc<RemoteClient>,
    config: &ClientConfig,
    job_id: &str,
) -> Result<JobStatusRecord> {
    let mut poller = JobPoller::new(client, PollerOptions::from(config));
    let mut updates = poller.subscribe();
    let mut errors = poller.errors();
    poller.start(job_id)?;

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    bar.set_message(poller.snapshot().status_text());

    loop {
        tokio::select! {
            changed = updates.changed() => {
                changed.context("Status poller stopped unexpectedly")?;
                let record = updates.borrow_and_update().clone();
                bar.set_position(u64::from(record.progress));
                bar.set_message(record.status_text());
                if record.phase.is_terminal() {
                    bar.finish();
                    return Ok(record);
                }
            }
            error = errors.recv() => match error {
                Ok(PollError::GaveUp(attempts)) => {
                    bar.abandon_with_message("Could not check status");
                    anyhow::bail!(
                        "Gave up checking job {} after {} failed attempts; it may still be running",
                        job_id,
                        attempts
                    );
                }
                Ok(e) => bar.set_message(format!("Couldn't check status: {} (retrying)", e)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Skipped {} poll errors", skipped);
                }
                Err(RecvError::Closed) => anyhow::bail!("Status poller stopped unexpectedly"),
            },
            _ = tokio::signal::ctrl_c() => {
                poller.stop();
                bar.abandon_with_message("Stopped");
                anyhow::bail!("Interrupted while watching job {}", job_id);
            }
        }
    }
}

fn finish(record: &JobStatusRecord) -> Result<()> {
    match record.phase {
        JobPhase::Completed => {
            println!("{}", record.status_text());
            Ok(())
        }
        _ => anyhow::bail!("{}", record.status_text()),
    }
}

async fn show_results(
    client: &RemoteClient,
    record: &JobStatusRecord,
    output: &OutputArgs,
) -> Result<()> {
    let outputs = record
        .outputs
        .as_ref()
        .context("Completed job has no output files")?;
    let groups = group_outputs(outputs, client.base_url());

    match &output.download {
        Some(dir) => {
            let mut sink = DownloadSink::new(client, dir)?;
            let count = render_groups(&groups, output.kind, &mut sink).await?;
            let manifest = sink.finish()?;
            println!("Downloaded {} files, manifest at {}", count, manifest.display());
        }
        None => {
            let mut sink = ConsoleSink::new(std::io::stdout());
            for group in &groups {
                let visible: Vec<_> = group
                    .artifacts
                    .iter()
                    .filter(|a| output.kind.is_none_or(|k| a.kind == k))
                    .collect();
                if visible.is_empty() {
                    continue;
                }
                sink.heading(group.title)?;
                for artifact in visible {
                    sink.render(artifact).await?;
                }
            }
        }
    }
    Ok(())
}
