use anyhow::{Context, Result};
use bucket_scan::definitions::{self, DefinitionsLocation};
use bucket_scan::manager::{
    serve_request, ArcWorker, AuditWorker, ProcessWorker, RescanWorker, ScanManager, WorkerMode,
    WorkerResponse,
};
use bucket_scan::store::{ArcStore, S3Store};
use bucket_scan::Settings;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

/// Virus scanning and scan-status reconciliation for S3 buckets.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan one object and tag it with the result
    ScanFile {
        /// Bucket holding the object
        #[arg(long)]
        bucket: String,
        /// Object key
        #[arg(long)]
        key: String,
    },
    /// Rescan a whole bucket and correct disagreeing tags
    Audit {
        /// Bucket to audit (overrides AUDIT_BUCKET_NAME)
        #[arg(long)]
        bucket: Option<String>,
        /// Run chunks in child processes of this program instead of in-process
        #[arg(long)]
        worker: Option<PathBuf>,
    },
    /// Rescan untagged and ERROR objects
    Rescan {
        /// Bucket to rescan (overrides AUDIT_BUCKET_NAME)
        #[arg(long)]
        bucket: Option<String>,
        /// Run batches in child processes of this program instead of in-process
        #[arg(long)]
        worker: Option<PathBuf>,
    },
    /// Serve one worker request: JSON on stdin, JSON on stdout
    Worker {
        /// audit or rescan
        #[arg(long)]
        mode: WorkerMode,
    },
    /// Fetch fresh virus definitions and publish them
    RefreshDefinitions {
        /// Skip the refresh if the published set is younger than this
        #[arg(long)]
        if_older_than_hours: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries worker responses, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("reading settings")?;
    let store: ArcStore = Arc::new(S3Store::from_config(&settings.s3_config()).await);

    match cli.command {
        Command::ScanFile { bucket, key } => {
            let manager = build_manager(&settings, &store).await?;
            let status = manager
                .scan_file(&bucket, &key)
                .await
                .with_context(|| format!("scanning s3://{bucket}/{key}"))?;
            println!("{status}");
        }
        Command::Audit { bucket, worker } => {
            let bucket = target_bucket(&settings, bucket)?;
            let manager = build_manager(&settings, &store).await?;
            let worker: ArcWorker = match worker {
                Some(program) => Arc::new(ProcessWorker::new(program, WorkerMode::Audit)),
                None => Arc::new(AuditWorker::new(Arc::clone(&manager))),
            };
            let corrected = manager
                .audit_bucket(&bucket, worker)
                .await
                .with_context(|| format!("auditing bucket {bucket}"))?;
            println!("{}", serde_json::to_string(&corrected)?);
        }
        Command::Rescan { bucket, worker } => {
            let bucket = target_bucket(&settings, bucket)?;
            let manager = build_manager(&settings, &store).await?;
            let worker: ArcWorker = match worker {
                Some(program) => Arc::new(ProcessWorker::new(program, WorkerMode::Rescan)),
                None => Arc::new(RescanWorker::new(Arc::clone(&manager))),
            };
            let infected = manager
                .rescan_failed_files(&bucket, worker.as_ref())
                .await
                .with_context(|| format!("rescanning bucket {bucket}"))?;
            println!("{}", serde_json::to_string(&infected)?);
        }
        Command::Worker { mode } => {
            let mut input = String::new();
            tokio::io::stdin()
                .read_to_string(&mut input)
                .await
                .context("reading worker request")?;

            let response = match build_manager(&settings, &store).await {
                Ok(manager) => {
                    let worker: ArcWorker = match mode {
                        WorkerMode::Audit => Arc::new(AuditWorker::new(manager)),
                        WorkerMode::Rescan => Arc::new(RescanWorker::new(manager)),
                    };
                    serve_request(worker.as_ref(), &input).await
                }
                Err(e) => WorkerResponse::from_result(Err(bucket_scan::WorkflowError::worker(
                    "setup",
                    format!("{e:#}"),
                ))),
            };
            println!("{}", serde_json::to_string(&response)?);
        }
        Command::RefreshDefinitions { if_older_than_hours } => {
            let location = settings.definitions_location()?;
            let updater = settings.updater();
            let scratch = settings.scratch_dir.as_deref();
            match if_older_than_hours {
                Some(hours) => {
                    let refreshed = definitions::refresh_if_stale(
                        store.as_ref(),
                        &updater,
                        &location,
                        scratch,
                        chrono::Duration::hours(hours),
                    )
                    .await
                    .context("refreshing definitions")?;
                    tracing::info!(refreshed, "Definitions check finished");
                }
                None => {
                    let uploaded =
                        definitions::refresh_definitions(store.as_ref(), &updater, &location, scratch)
                            .await
                            .context("refreshing definitions")?;
                    tracing::info!(files = uploaded.len(), "Definitions published");
                }
            }
        }
    }

    Ok(())
}

fn target_bucket(settings: &Settings, bucket: Option<String>) -> Result<String> {
    match bucket {
        Some(bucket) => Ok(bucket),
        None => Ok(settings.require_audit_bucket()?.to_string()),
    }
}

/// Fetches definitions for the standalone scanner, then builds the manager.
async fn build_manager(settings: &Settings, store: &ArcStore) -> Result<Arc<ScanManager>> {
    if !settings.use_daemon {
        let location: DefinitionsLocation = settings.definitions_location()?;
        definitions::download_definitions(store.as_ref(), &location, &settings.definitions_dir)
            .await
            .context("downloading virus definitions")?;
    }

    let manager = ScanManager::builder()
        .with_arc_store(Arc::clone(store))
        .with_arc_scanner(settings.clamav_config().build())
        .with_config(settings.manager_config())
        .build()?;
    Ok(Arc::new(manager))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_mode_flag() {
        let cli = Cli::try_parse_from(["bucket-scan", "worker", "--mode", "rescan"]).unwrap();
        assert!(matches!(cli.command, Command::Worker { mode: WorkerMode::Rescan }));

        assert!(Cli::try_parse_from(["bucket-scan", "worker", "--mode", "sideways"]).is_err());
    }
}
