use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use stega_queue::config::AppConfig;
use stega_queue::models::job::{JobFile, JobOrigin, JobStatus};
use stega_queue::queue::TaskQueue;
use stega_queue::services::gallery::DirGallery;
use stega_queue::services::stego::HttpStegoClient;

const USAGE: &str =
    "usage: stega-queue encode <short-id> <image>... | decode <image>... | models | ping";

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");

    // Register application metrics
    metrics::describe_counter!(
        "stega_jobs_enqueued_total",
        "Total jobs submitted to the queue"
    );
    metrics::describe_counter!("stega_jobs_completed", "Total jobs finished successfully");
    metrics::describe_counter!("stega_jobs_failed", "Total jobs that ended in failure");
    metrics::describe_gauge!("stega_queue_depth", "Jobs currently waiting for execution");
    metrics::describe_histogram!(
        "stega_job_processing_seconds",
        "Time from claim to terminal state"
    );

    let client = Arc::new(HttpStegoClient::new(config.api()));

    let mut args = std::env::args().skip(1);
    let command = args.next().unwrap_or_else(|| {
        eprintln!("{USAGE}");
        std::process::exit(2);
    });
    let rest: Vec<String> = args.collect();

    match command.as_str() {
        "ping" => {
            let ok = client
                .ping(Duration::from_millis(config.ping_timeout_ms))
                .await;
            println!("{}", if ok { "ok" } else { "unreachable" });
            if !ok {
                std::process::exit(1);
            }
        }
        "models" => {
            let models = client.list_models().await.expect("Failed to list models");
            for model in models {
                println!("{model}");
            }
        }
        "encode" | "decode" => {
            run_jobs(&config, client, &command, rest).await;
            tracing::debug!(metrics = %prometheus_handle.render(), "run metrics");
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
}

/// Queue the requested jobs, wait for the queue to drain and report
/// per-job outcomes. Exits non-zero if any job failed.
async fn run_jobs(
    config: &AppConfig,
    client: Arc<HttpStegoClient>,
    command: &str,
    rest: Vec<String>,
) {
    let (short_id, files) = if command == "encode" {
        let (first, files) = rest.split_first().unwrap_or_else(|| {
            eprintln!("{USAGE}");
            std::process::exit(2)
        });
        (Some(first.clone()), files.to_vec())
    } else {
        (None, rest)
    };

    if files.is_empty() {
        eprintln!("{USAGE}");
        std::process::exit(2);
    }

    let job_files: Vec<JobFile> = files
        .iter()
        .map(|path| {
            let mut file = JobFile::new(PathBuf::from(path));
            file.size_bytes = std::fs::metadata(path).ok().map(|meta| meta.len());
            file
        })
        .collect();

    let gallery = Arc::new(DirGallery::new(&config.gallery_dir));
    let queue = TaskQueue::new(client, gallery);

    let ids = match &short_id {
        Some(short_id) => queue.enqueue_encode(job_files, short_id, JobOrigin::Gallery),
        None => queue.enqueue_decode(job_files, JobOrigin::Gallery),
    };
    if ids.is_empty() {
        eprintln!("nothing queued (short id must be exactly 7 characters)");
        std::process::exit(2);
    }

    tracing::info!(count = ids.len(), "jobs queued, waiting for completion");
    queue.join_idle().await;

    let mut failed = 0;
    for job in queue.snapshot() {
        match job.status {
            JobStatus::Success => {
                tracing::info!(
                    job_id = %job.id,
                    file = %job.file.path.display(),
                    result = ?job.result,
                    "job finished"
                );
            }
            JobStatus::Failed => {
                failed += 1;
                tracing::error!(
                    job_id = %job.id,
                    file = %job.file.path.display(),
                    error = job.error.as_deref().unwrap_or("unknown"),
                    "job failed"
                );
            }
            _ => {}
        }
    }

    if failed > 0 {
        std::process::exit(1);
    }
}
