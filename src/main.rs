//! Scan Worker CLI
//!
//! Polls the scans table and processes one scan at a time.
//! Every option can also be supplied through the environment or a `.env` file.

use anyhow::Result;
use clap::Parser;
use scan_worker::worker::{run_until_terminated, TerminationSignals};
use scan_worker::{
    ArtifactTransfer, ExternalCommand, JobStore, PgJobStore, ScanProcessor, ScanRunner,
    SupabaseStorage, WorkerConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "scan-worker")]
#[command(about = "Turn uploaded photo bundles into STL meshes")]
#[command(version)]
struct Cli {
    /// PostgreSQL connection string for the scans table
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    /// Supabase project URL
    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: String,

    /// Service-role key for storage access
    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY", hide_env_values = true)]
    service_key: String,

    /// Poll interval in seconds
    #[arg(long, env = "POLL_SECONDS", default_value = "10")]
    poll_seconds: u64,

    /// Bucket holding uploaded bundles
    #[arg(long, env = "BUCKET_ZIPS", default_value = "scan-zips")]
    bucket_zips: String,

    /// Bucket receiving STL results
    #[arg(long, env = "BUCKET_RESULTS", default_value = "scan-results")]
    bucket_results: String,

    /// Characters of pipeline output kept in log_text
    #[arg(long, env = "MAX_LOG_CHARS", default_value = "20000")]
    max_log_chars: usize,

    /// Reconstruction command; images and output directories are appended
    #[arg(long, env = "PIPELINE_COMMAND", default_value = "bash pipeline.sh")]
    pipeline_command: ExternalCommand,

    /// Mesh conversion command; input mesh and output STL are appended
    #[arg(long, env = "CONVERTER_COMMAND", default_value = "python3 convert_to_stl.py")]
    converter_command: ExternalCommand,

    /// Kill the pipeline after this many seconds (no limit when unset)
    #[arg(long, env = "PIPELINE_TIMEOUT_SECS")]
    pipeline_timeout_secs: Option<u64>,

    /// Validity of the signed download URL in seconds
    #[arg(long, env = "SIGNED_URL_TTL_SECS", default_value = "300")]
    signed_url_ttl_secs: u64,

    /// Bundle download timeout in seconds
    #[arg(long, env = "DOWNLOAD_TIMEOUT_SECS", default_value = "300")]
    download_timeout_secs: u64,

    /// Parent directory for per-scan working directories
    #[arg(long, env = "WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Process at most one scan and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = WorkerConfig::builder()
        .poll_interval_secs(cli.poll_seconds)
        .bucket_zips(&cli.bucket_zips)
        .bucket_results(&cli.bucket_results)
        .max_log_chars(cli.max_log_chars)
        .pipeline_command(cli.pipeline_command)
        .converter_command(cli.converter_command)
        .pipeline_timeout(cli.pipeline_timeout_secs.map(Duration::from_secs))
        .signed_url_ttl(Duration::from_secs(cli.signed_url_ttl_secs))
        .download_timeout(Duration::from_secs(cli.download_timeout_secs))
        .work_dir(cli.work_dir)
        .build();

    info!("Initializing worker...");

    let mut signals = TerminationSignals::register()?;

    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::connect(&cli.database_url).await?);
    info!("Database connection established");

    let storage = SupabaseStorage::new(&cli.supabase_url, &cli.service_key)?;
    let transfer = ArtifactTransfer::new(
        Arc::new(storage),
        &config.bucket_zips,
        &config.bucket_results,
        config.signed_url_ttl,
        config.download_timeout,
    )?;

    let processor = ScanProcessor::new(Arc::clone(&store), transfer, config.clone());
    let runner = ScanRunner::new(Arc::clone(&store), processor, config);

    let current = runner.current_job();
    let work = async {
        if cli.once {
            runner.run_once().await.map(|found| {
                if found {
                    println!("Scan processed");
                } else {
                    println!("No uploaded scans found");
                }
            })
        } else {
            runner.run().await
        }
    };

    match run_until_terminated(work, signals.recv(), store.as_ref(), &current).await {
        Ok(result) => Ok(result?),
        Err(terminated) => {
            info!(
                "Exiting after {} (scan: {:?}, marked failed: {})",
                terminated.signal, terminated.job_id, terminated.marked
            );
            std::process::exit(1);
        }
    }
}
